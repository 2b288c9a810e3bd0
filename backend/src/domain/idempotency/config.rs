//! Environment-driven configuration for the idempotency protocol.

use std::time::Duration;

use mockable::{DefaultEnv, Env};
use tracing::warn;

/// Environment variable holding the staleness window in seconds.
pub const IDEMPOTENCY_STALENESS_SECS_ENV: &str = "IDEMPOTENCY_STALENESS_SECS";
/// Environment variable holding the `Retry-After` hint in seconds.
pub const IDEMPOTENCY_RETRY_AFTER_SECS_ENV: &str = "IDEMPOTENCY_RETRY_AFTER_SECS";

/// Tunables for claim staleness and client back-off.
///
/// # Example
///
/// ```
/// # use backend::domain::IdempotencyConfig;
/// # use std::time::Duration;
/// let config = IdempotencyConfig::default();
/// assert_eq!(config.staleness_window(), Duration::from_secs(30));
/// assert_eq!(config.retry_after(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyConfig {
    staleness_window: Duration,
    retry_after: Duration,
}

impl IdempotencyConfig {
    const DEFAULT_STALENESS_SECS: u64 = 30;
    const MIN_STALENESS_SECS: u64 = 1;
    const MAX_STALENESS_SECS: u64 = 86_400;

    const DEFAULT_RETRY_AFTER_SECS: u64 = 1;
    const MIN_RETRY_AFTER_SECS: u64 = 1;
    const MAX_RETRY_AFTER_SECS: u64 = 300;

    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(&DefaultEnv::new())
    }

    /// Load configuration from a custom environment source.
    ///
    /// Unparseable values fall back to the defaults. The staleness window is
    /// clamped to 1..=86400 seconds and the retry hint to 1..=300.
    pub fn from_env_with(env: &impl Env) -> Self {
        let staleness = read_secs(
            env,
            IDEMPOTENCY_STALENESS_SECS_ENV,
            Self::DEFAULT_STALENESS_SECS,
        )
        .clamp(Self::MIN_STALENESS_SECS, Self::MAX_STALENESS_SECS);
        let retry_after = read_secs(
            env,
            IDEMPOTENCY_RETRY_AFTER_SECS_ENV,
            Self::DEFAULT_RETRY_AFTER_SECS,
        )
        .clamp(Self::MIN_RETRY_AFTER_SECS, Self::MAX_RETRY_AFTER_SECS);
        Self {
            staleness_window: Duration::from_secs(staleness),
            retry_after: Duration::from_secs(retry_after),
        }
    }

    /// Override the staleness window (tests and tooling).
    #[must_use]
    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Override the retry hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// How long a pending claim blocks other attempts.
    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Back-off hint returned with in-flight conflicts.
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(Self::DEFAULT_STALENESS_SECS),
            retry_after: Duration::from_secs(Self::DEFAULT_RETRY_AFTER_SECS),
        }
    }
}

fn read_secs(env: &impl Env, name: &str, default: u64) -> u64 {
    match env.string(name) {
        None => default,
        Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "ignoring unparseable idempotency setting");
            default
        }),
    }
}
