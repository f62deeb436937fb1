use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::types::Location;

/// A provider-directory organization, loaded in bulk from NPPES.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    // NPI identifier, the organization's external identity
    pub npi_id: String,

    pub primary_name: String,

    // "doing business as" or other organization name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default)]
    pub taxonomy: String,
}

impl OrganizationRecord {
    pub fn new(npi_id: &str, primary_name: &str) -> Self {
        OrganizationRecord {
            id: None,
            npi_id: npi_id.to_string(),
            primary_name: primary_name.to_string(),
            secondary_name: None,
            location: None,
            taxonomy: String::new(),
        }
    }

    pub fn with_secondary_name(mut self, name: &str) -> Self {
        self.secondary_name = Some(name.to_string());
        self
    }
}

/// A FHIR endpoint as discovered by the endpoint ingestion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    pub organization_name: String,

    // Extra names published for the same endpoint
    #[serde(default)]
    pub alternate_names: Vec<String>,

    // NPI ids the endpoint declares outright
    #[serde(default)]
    pub npi_ids: Vec<String>,
}

impl EndpointRecord {
    pub fn new(url: &str, organization_name: &str) -> Self {
        EndpointRecord {
            id: None,
            url: url.to_string(),
            organization_name: organization_name.to_string(),
            alternate_names: Vec::new(),
            npi_ids: Vec::new(),
        }
    }

    pub fn with_npi_ids(mut self, ids: &[&str]) -> Self {
        self.npi_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_alternate_name(mut self, name: &str) -> Self {
        self.alternate_names.push(name.to_string());
        self
    }

    /// Primary name first, then alternates, skipping blanks.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.organization_name.as_str())
            .chain(self.alternate_names.iter().map(String::as_str))
            .filter(|name| !name.trim().is_empty())
    }
}

/// One candidate link between an endpoint and an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    pub organization_id: String,
    pub confidence: f64,
}

/// Organization id to confidence for a set of links.
pub fn confidence_by_id(links: &[LinkResult]) -> HashMap<String, f64> {
    links
        .iter()
        .map(|link| (link.organization_id.clone(), link.confidence))
        .collect()
}

/// Counters reported at the end of a linking run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkingSummary {
    pub endpoints: usize,
    pub matched_endpoints: usize,
    pub endpoints_failed: usize,
    pub links_written: usize,
    pub links_failed: usize,
    pub unmatchable: Vec<String>,
}
