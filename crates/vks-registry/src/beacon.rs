//! Beacon node REST oracle
//!
//! `GET {beacon_url}/eth/v1/beacon/states/head/validators/{pubkey}`
//!   200 → the validator exists in the head state (any status counts)
//!   404 → not registered
//!   5xx / transport error → retried with exponential backoff, then
//!         `RegistryUnavailable`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::RegistrationOracle;
use vks_core::config::RegistryConfig;
use vks_core::{VksError, VksResult};

const BASE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct ValidatorResponse {
    data: ValidatorData,
}

#[derive(Debug, Deserialize)]
struct ValidatorData {
    #[serde(default)]
    index: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Registration oracle backed by a beacon node's standard REST API.
pub struct BeaconOracle {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl BeaconOracle {
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> VksResult<Self> {
        if base_url.starts_with("http://") {
            warn!(
                url = %base_url,
                "beacon endpoint uses plaintext HTTP; registry answers can be spoofed in transit"
            );
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VksError::Config(format!("building beacon HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    pub fn from_config(config: &RegistryConfig) -> VksResult<Self> {
        Self::new(
            &config.beacon_url,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    fn validator_url(&self, public_key: &str) -> String {
        format!(
            "{}/eth/v1/beacon/states/head/validators/{}",
            self.base_url, public_key
        )
    }
}

#[async_trait]
impl RegistrationOracle for BeaconOracle {
    async fn is_registered(&self, public_key: &str) -> VksResult<bool> {
        let url = self.validator_url(public_key);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = BASE_BACKOFF * 2u32.saturating_pow(attempt - 1);
                debug!(attempt, ?delay, public_key, "retrying beacon query");
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("request failed: {e}");
                    continue;
                }
            };

            match response.status() {
                StatusCode::OK => {
                    match response.json::<ValidatorResponse>().await {
                        Ok(body) => debug!(
                            public_key,
                            index = body.data.index.as_deref().unwrap_or("?"),
                            status = body.data.status.as_deref().unwrap_or("?"),
                            "validator registered"
                        ),
                        Err(e) => debug!(public_key, "registered (unparsed body: {e})"),
                    }
                    return Ok(true);
                }
                StatusCode::NOT_FOUND => return Ok(false),
                status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                    last_error = format!("beacon node returned {status}");
                }
                status => {
                    return Err(VksError::RegistryUnavailable(format!(
                        "beacon node returned {status} for {public_key}"
                    )));
                }
            }
        }

        Err(VksError::RegistryUnavailable(format!(
            "{public_key}: {last_error} (after {} attempts)",
            self.max_retries + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_url_trims_slash() {
        let oracle = BeaconOracle::new("http://beacon:5052/", Duration::from_secs(1), 0).unwrap();
        assert_eq!(
            oracle.validator_url("0xabc"),
            "http://beacon:5052/eth/v1/beacon/states/head/validators/0xabc"
        );
    }

    #[test]
    fn test_from_config() {
        let oracle = BeaconOracle::from_config(&RegistryConfig::default()).unwrap();
        assert_eq!(oracle.base_url, "http://localhost:5052");
        assert_eq!(oracle.max_retries, 3);
    }
}
