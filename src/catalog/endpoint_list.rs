//! Diff of the CHPL service-base-URL list against a locally kept endpoint list.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use super::chpl::decode_batch;
use super::TARGET_CATALOG;
use crate::error::ReconcileError;

/// One entry of the endpoint resource list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointListEntry {
    #[serde(rename = "FormatType")]
    pub format_type: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "EndpointName")]
    pub endpoint_name: String,
    #[serde(rename = "FileName")]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceBaseUrlList {
    #[serde(default)]
    pub results: Vec<ServiceBaseUrlEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBaseUrlEntry {
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub service_base_url_list: Vec<String>,
}

/// The endpoint list being extended. Owned by the caller and passed in
/// explicitly, so successive diffs see each other's additions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointListAccumulator {
    entries: Vec<EndpointListEntry>,
    known: HashSet<String>,
}

impl EndpointListAccumulator {
    pub fn new(entries: Vec<EndpointListEntry>) -> Self {
        let known = entries.iter().map(|e| e.url.clone()).collect();
        Self { entries, known }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ReconcileError> {
        Ok(Self::new(decode_batch(bytes)?))
    }

    pub fn entries(&self) -> &[EndpointListEntry] {
        &self.entries
    }

    /// Add every unseen URL in `published` and return the new URLs in order.
    pub fn absorb(&mut self, published: &[ServiceBaseUrlEntry]) -> Vec<String> {
        let mut added = Vec::new();
        for entry in published {
            for raw in &entry.service_base_url_list {
                let Some(url) = clean_service_url(raw) else {
                    debug!(target: TARGET_CATALOG, "Skipping unusable service base URL '{}'", raw);
                    continue;
                };
                if !self.known.insert(url.clone()) {
                    continue;
                }
                self.entries.push(EndpointListEntry {
                    format_type: String::new(),
                    url: url.clone(),
                    endpoint_name: entry.developer.trim().to_string(),
                    file_name: source_file_name(&url),
                });
                added.push(url);
            }
        }
        added
    }
}

/// Trim, drop anything before the scheme, and require a parsable URL.
pub fn clean_service_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let start = trimmed.find("http")?;
    let candidate = &trimmed[start..];
    Url::parse(candidate).ok()?;
    Some(candidate.to_string())
}

/// `https://fhir.epic.com/...` becomes `epicEndpointSources.json`.
fn source_file_name(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    let name = if labels.len() > 2 { labels[1] } else { labels[0] };
    format!("{}EndpointSources.json", name)
}
