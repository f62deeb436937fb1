//! HTTP client for the CHPL REST API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{RegistryFetcher, RegistryQuery};
use crate::catalog::chpl::PRODUCT_FIELDS;
use crate::environment::Settings;
use crate::TARGET_WEB_REQUEST;

pub const CHPL_API_PATH: &str = "/rest";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a CHPL API URL: `{domain}/rest{path}?api_key=…` plus any extra
/// arguments. Catalog collections are fetched whole, unpaged.
pub fn make_chpl_url(
    domain: &str,
    path: &str,
    api_key: Option<&str>,
    query_args: &[(&str, String)],
) -> Result<Url> {
    let api_key = api_key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("the CHPL API Key is not set"))?;

    let mut url = Url::parse(domain).with_context(|| format!("invalid CHPL domain {}", domain))?;
    url.set_path(&format!("{}{}", CHPL_API_PATH, path));
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("api_key", api_key);
        for (key, value) in query_args {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Rate-limited CHPL client. Every request waits `request_delay` first;
/// CHPL allows about one request per second.
pub struct ChplClient {
    client: reqwest::Client,
    domain: String,
    api_key: Option<String>,
    user_agent: String,
    request_delay: Duration,
}

impl ChplClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            domain: settings.chpl_domain.clone(),
            api_key: settings.chpl_api_key.clone(),
            user_agent: settings.chpl_user_agent.clone(),
            request_delay: settings.chpl_request_delay,
        })
    }

    fn url_for(&self, query: &RegistryQuery) -> Result<Url> {
        match query {
            RegistryQuery::EndpointList { url } => {
                Url::parse(url).with_context(|| format!("invalid endpoint list URL {}", url))
            }
            RegistryQuery::CertifiedProducts => make_chpl_url(
                &self.domain,
                super::CERTIFIED_PRODUCTS_PATH,
                self.api_key.as_deref(),
                &[("fields", PRODUCT_FIELDS.join(","))],
            ),
            RegistryQuery::Developers | RegistryQuery::CertificationCriteria => make_chpl_url(
                &self.domain,
                query.path().unwrap_or_default(),
                self.api_key.as_deref(),
                &[],
            ),
        }
    }
}

#[async_trait]
impl RegistryFetcher for ChplClient {
    async fn fetch_batch(&self, query: &RegistryQuery) -> Result<Vec<u8>> {
        let url = self.url_for(query)?;

        tokio::time::sleep(self.request_delay).await;
        debug!(target: TARGET_WEB_REQUEST, "Requesting {}", query);

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .context("making the GET request to the CHPL server failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("CHPL request responded with status: {}", status));
        }

        let body = response
            .bytes()
            .await
            .context("reading the CHPL response body failed")?;
        info!(target: TARGET_WEB_REQUEST, "Fetched {} bytes for {}", body.len(), query);
        Ok(body.to_vec())
    }
}
