//! Service configuration.
//!
//! Defaults suit a long-running service; `from_env` lets tools and tests
//! shorten timers without new flags.

use std::env;
use std::time::Duration;
use tracing::warn;

pub const READINESS_INTERVAL_ENV: &str = "MODULE_RESOLVER_READINESS_INTERVAL_MS";

const DEFAULT_READINESS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// How often the readiness sweep logs sources that have not gone idle
    /// while bindings are waiting.
    pub readiness_log_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            readiness_log_interval: DEFAULT_READINESS_INTERVAL,
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `MODULE_RESOLVER_READINESS_INTERVAL_MS`.
    ///
    /// Unparseable or zero values keep the default and log a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(READINESS_INTERVAL_ENV) {
            match parse_interval_ms(&raw) {
                Some(interval) => config.readiness_log_interval = interval,
                None => warn!(
                    value = %raw,
                    "ignoring {READINESS_INTERVAL_ENV}; expected a positive millisecond count"
                ),
            }
        }
        config
    }

    pub fn with_readiness_log_interval(mut self, interval: Duration) -> Self {
        self.readiness_log_interval = interval;
        self
    }
}

fn parse_interval_ms(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(ms) => Some(Duration::from_millis(ms)),
    }
}
