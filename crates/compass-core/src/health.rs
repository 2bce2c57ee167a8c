//! Bounded-time reachability check for the companion memory service.
//!
//! A probe is a single HTTP GET to the service's `/health` endpoint. The
//! whole check, including client setup, is capped at [`PROBE_BUDGET`]; any
//! error, non-2xx status or timeout means unhealthy.

use std::time::Duration;

use crate::config::HookConfig;

/// TCP connect limit.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Per-request limit enforced by the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

/// Hard upper bound on [`HealthProbe::is_healthy`].
pub const PROBE_BUDGET: Duration = Duration::from_millis(2250);

/// Health probe for the memory service.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    url: String,
    force_unhealthy: bool,
}

impl HealthProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            force_unhealthy: false,
        }
    }

    pub fn from_config(config: &HookConfig) -> Self {
        Self {
            url: config.health_url(),
            force_unhealthy: config.force_unhealthy,
        }
    }

    /// A probe that always reports unhealthy without touching the network.
    pub fn forced_unhealthy() -> Self {
        Self {
            url: String::new(),
            force_unhealthy: true,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true only after a complete 2xx round trip. Never fails.
    pub async fn is_healthy(&self) -> bool {
        if self.force_unhealthy {
            tracing::debug!("Memory service forced unhealthy; skipping probe");
            return false;
        }

        match tokio::time::timeout(PROBE_BUDGET, self.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::debug!("Memory service probe to {} failed: {}", self.url, err);
                false
            }
            Err(_) => {
                tracing::debug!(
                    "Memory service probe to {} exceeded {:?}",
                    self.url,
                    PROBE_BUDGET
                );
                false
            }
        }
    }

    async fn probe(&self) -> Result<(), reqwest::Error> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let response = client.get(&self.url).send().await?.error_for_status()?;
        response.bytes().await?;
        Ok(())
    }
}
