use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::matching::DEFAULT_LINK_THRESHOLD;

pub const DEFAULT_CHPL_DOMAIN: &str = "https://chpl.healthit.gov";
pub const DEFAULT_PRUNING_THRESHOLD_MINUTES: i64 = 30;
// CHPL allows one request per second
pub const DEFAULT_CHPL_REQUEST_DELAY_MS: u64 = 1500;

/// Parses an environment variable, falling back to `default` when it is unset.
/// A value that is present but unparsable is an error rather than a silent default.
pub fn get_env_var_or<T: FromStr>(var: &str, default: T) -> Result<T> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("environment variable {} has an invalid value: {}", var, value)),
        _ => Ok(default),
    }
}

/// Runtime configuration for the reconcile jobs.
#[derive(Clone, Debug)]
pub struct Settings {
    pub database_path: String,
    pub chpl_domain: String,
    pub chpl_api_key: Option<String>,
    pub chpl_user_agent: String,
    pub chpl_request_delay: Duration,
    pub link_threshold: f64,
    pub pruning_threshold_minutes: i64,
    pub pruning_lookback_minutes: Option<i64>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let link_threshold = get_env_var_or("LINK_THRESHOLD", DEFAULT_LINK_THRESHOLD)?;
        if !(0.0..=1.0).contains(&link_threshold) {
            return Err(anyhow!(
                "LINK_THRESHOLD must be between 0 and 1, got {}",
                link_threshold
            ));
        }

        let lookback: i64 = get_env_var_or("PRUNING_LOOKBACK_MINUTES", 0)?;

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "reconcile.db".to_string()),
            chpl_domain: env::var("CHPL_DOMAIN")
                .unwrap_or_else(|_| DEFAULT_CHPL_DOMAIN.to_string()),
            chpl_api_key: env::var("CHPL_API_KEY").ok().filter(|k| !k.is_empty()),
            chpl_user_agent: env::var("CHPL_USER_AGENT").unwrap_or_else(|_| {
                format!("reconcile/{}", env!("CARGO_PKG_VERSION"))
            }),
            chpl_request_delay: Duration::from_millis(get_env_var_or(
                "CHPL_REQUEST_DELAY_MS",
                DEFAULT_CHPL_REQUEST_DELAY_MS,
            )?),
            link_threshold,
            pruning_threshold_minutes: get_env_var_or(
                "PRUNING_THRESHOLD_MINUTES",
                DEFAULT_PRUNING_THRESHOLD_MINUTES,
            )?,
            pruning_lookback_minutes: (lookback > 0).then_some(lookback),
        })
    }
}
