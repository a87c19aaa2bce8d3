//! Statistics Service Reporting
//!
//! Posts final match results to the user service's internal dashboard
//! endpoint. A failed report never blocks resolution; callers log it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::MatchReport;

/// Path of the dashboard endpoint on the user service.
pub const DASHBOARD_PATH: &str = "/_internal/dashboard";

/// Statistics client configuration.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Base URL of the user service (`USER_URL`).
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl StatsConfig {
    /// Full URL results are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), DASHBOARD_PATH)
    }
}

/// Statistics reporting errors.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Service answered with a non-2xx status.
    #[error("service returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

/// Receives final match results.
#[async_trait]
pub trait StatsReporter: Send + Sync {
    /// Report one result.
    async fn report(&self, report: &MatchReport) -> Result<(), StatsError>;
}

/// Reports results over HTTP.
pub struct HttpStatsReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatsReporter {
    /// Build a reporter from configuration.
    pub fn new(config: &StatsConfig) -> Result<Self, StatsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
        })
    }
}

#[async_trait]
impl StatsReporter for HttpStatsReporter {
    async fn report(&self, report: &MatchReport) -> Result<(), StatsError> {
        debug!(endpoint = %self.endpoint, winner = %report.winner_id, "posting match result");

        let response = self.client.post(&self.endpoint).json(report).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Rejected { status: status.as_u16(), body });
        }

        Ok(())
    }
}
