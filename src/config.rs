//! Runtime tuning knobs for the recipient service.
//!
//! Uses the following environment variables:
//! - `TIDEMARK_DONOR_SELECTION_TIMEOUT_MS`: donor member selection timeout (default: 15000)
//! - `TIDEMARK_DONOR_SELECTION_RETRY_MS`: delay between topology re-evaluations (default: 50)
//! - `TIDEMARK_SHUTDOWN_GRACE_MS`: grace period for in-flight work on step-down (default: 5000)

use std::env;
use std::time::Duration;

/// Default donor member selection timeout in milliseconds.
pub const DEFAULT_DONOR_SELECTION_TIMEOUT_MS: u64 = 15_000;

/// Default delay between topology re-evaluations in milliseconds.
pub const DEFAULT_DONOR_SELECTION_RETRY_MS: u64 = 50;

/// Default step-down grace period in milliseconds.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Recipient service configuration.
#[derive(Debug, Clone)]
pub struct RecipientConfig {
    /// How long member selection may keep re-evaluating donor topology
    /// before failing the connection attempt.
    pub donor_selection_timeout: Duration,

    /// Delay between topology re-evaluations while selecting a donor
    /// member.
    pub donor_selection_retry_interval: Duration,

    /// Grace period a cancelled instance gets to abort in-flight work and
    /// resolve its completion result.
    pub shutdown_grace: Duration,
}

impl Default for RecipientConfig {
    fn default() -> Self {
        Self {
            donor_selection_timeout: Duration::from_millis(DEFAULT_DONOR_SELECTION_TIMEOUT_MS),
            donor_selection_retry_interval: Duration::from_millis(DEFAULT_DONOR_SELECTION_RETRY_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

impl RecipientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            donor_selection_timeout: env_duration_ms(
                "TIDEMARK_DONOR_SELECTION_TIMEOUT_MS",
                defaults.donor_selection_timeout,
            ),
            donor_selection_retry_interval: env_duration_ms(
                "TIDEMARK_DONOR_SELECTION_RETRY_MS",
                defaults.donor_selection_retry_interval,
            ),
            shutdown_grace: env_duration_ms("TIDEMARK_SHUTDOWN_GRACE_MS", defaults.shutdown_grace),
        }
    }
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
