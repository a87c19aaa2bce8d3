//! Process configuration read from the environment.

use std::time::Duration;

use thiserror::Error;

use crate::game::rally::RallyConfig;
use crate::session::SessionConfig;
use crate::store::StatsConfig;

/// Base URL of the statistics service. Results stay local when unset.
pub const USER_URL_VAR: &str = "USER_URL";
/// Grace period in seconds.
pub const GRACE_PERIOD_VAR: &str = "GRACE_PERIOD_SECS";
/// Points needed to win a rally match.
pub const WINNING_SCORE_VAR: &str = "WINNING_SCORE";
/// Milliseconds between rallies.
pub const RALLY_INTERVAL_VAR: &str = "RALLY_INTERVAL_MS";
/// Statistics request timeout in seconds.
pub const STATS_TIMEOUT_VAR: &str = "STATS_TIMEOUT_SECS";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Variable is set but empty.
    #[error("{0} is set but empty")]
    Empty(&'static str),

    /// Variable could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Everything the server binary needs.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Session settings.
    pub session: SessionConfig,
    /// Statistics service, if configured.
    pub stats: Option<StatsConfig>,
    /// Rally runner settings.
    pub rally: RallyConfig,
}

impl AppConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let grace_period = parse(&lookup, GRACE_PERIOD_VAR)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.session.grace_period);
        let winning_score = parse(&lookup, WINNING_SCORE_VAR)?.unwrap_or(defaults.rally.winning_score);
        let rally_interval = parse(&lookup, RALLY_INTERVAL_VAR)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.rally.rally_interval);

        if winning_score == 0 {
            return Err(ConfigError::Invalid {
                var: WINNING_SCORE_VAR,
                value: "0".to_string(),
            });
        }

        let stats = match lookup(USER_URL_VAR) {
            None => None,
            Some(url) if url.trim().is_empty() => return Err(ConfigError::Empty(USER_URL_VAR)),
            Some(url) => Some(StatsConfig {
                base_url: url.trim().trim_end_matches('/').to_string(),
                timeout: parse(&lookup, STATS_TIMEOUT_VAR)?
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(10)),
            }),
        };

        Ok(Self {
            session: SessionConfig { grace_period },
            stats,
            rally: RallyConfig {
                winning_score,
                rally_interval,
            },
        })
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
