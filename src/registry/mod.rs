//! Access to the CHPL REST API.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

pub mod client;
#[cfg(test)]
pub mod fixture;

pub use client::{make_chpl_url, ChplClient};

pub const CERTIFIED_PRODUCTS_PATH: &str = "/collections/certified_products";
pub const DEVELOPERS_PATH: &str = "/developers";
pub const CERTIFICATION_CRITERIA_PATH: &str = "/data/certification-criteria";

/// One request against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryQuery {
    CertifiedProducts,
    Developers,
    CertificationCriteria,
    /// A published service-base-URL list, fetched from an absolute URL.
    EndpointList { url: String },
}

impl RegistryQuery {
    /// API path below `/rest`, or `None` for absolute URLs.
    pub fn path(&self) -> Option<&'static str> {
        match self {
            RegistryQuery::CertifiedProducts => Some(CERTIFIED_PRODUCTS_PATH),
            RegistryQuery::Developers => Some(DEVELOPERS_PATH),
            RegistryQuery::CertificationCriteria => Some(CERTIFICATION_CRITERIA_PATH),
            RegistryQuery::EndpointList { .. } => None,
        }
    }
}

impl fmt::Display for RegistryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryQuery::EndpointList { url } => write!(f, "endpoint list {}", url),
            other => f.write_str(other.path().unwrap_or_default()),
        }
    }
}

/// Fetch raw response bytes for a registry query.
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    async fn fetch_batch(&self, query: &RegistryQuery) -> Result<Vec<u8>>;
}
