use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{RegistryFetcher, RegistryQuery};

/// Serves canned responses; queries without one fail like an unreachable host.
#[derive(Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<RegistryQuery, Vec<u8>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, query: RegistryQuery, body: &str) -> Self {
        self.set(query, body);
        self
    }

    /// Swap a response between runs.
    pub fn set(&self, query: RegistryQuery, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(query, body.as_bytes().to_vec());
    }
}

#[async_trait]
impl RegistryFetcher for StaticFetcher {
    async fn fetch_batch(&self, query: &RegistryQuery) -> Result<Vec<u8>> {
        self.responses
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused for {}", query))
    }
}
