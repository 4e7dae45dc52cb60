use log::warn;
use reqwest::Client;
use std::time::Duration;

use crate::config::OfficialSourceConfig;
use crate::error::{Error, Result};

/// Thin retrying fetcher for a single upstream page. Purely functional from
/// the caller's perspective: no state beyond the pooled client.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    url: String,
    retries: u32,
}

impl PageFetcher {
    pub fn new(config: &OfficialSourceConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!(
                "TLS certificate validation DISABLED for {} (scoped to this client only)",
                config.url
            );
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            retries: config.retries.max(1),
        })
    }

    /// GET the configured page, retrying up to the bound. No backoff beyond
    /// the per-attempt timeout; the last failure is surfaced when every
    /// attempt is spent.
    pub async fn fetch(&self) -> Result<String> {
        let mut last_err = Error::Network("no fetch attempted".to_string());
        for attempt in 1..=self.retries {
            match self.fetch_once().await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(
                        "fetch attempt {}/{} for {} failed: {}",
                        attempt, self.retries, self.url, e
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn fetch_once(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }
}
