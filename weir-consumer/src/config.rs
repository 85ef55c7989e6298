//! Consumer configuration.
//!
//! Three layers, highest precedence first:
//!
//! 1. **Explicit options**: fields set by the caller, directly or through the
//!    `with_*` builders.
//! 2. **Process environment**: `WEIR_*` variables, applied by
//!    [`ConsumerOptions::from_env`].
//! 3. **Hard-coded defaults**: [`ConsumerOptions::default`].
//!
//! `from_env` produces the environment layer over the defaults; builders
//! applied afterwards are the explicit layer on top. Options are validated
//! once, at consumer start.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;
use thiserror::Error;

use crate::broker::FetchOptions;
use crate::commit::{CommitConfig, CommitStrategy};

/// Policy when a fetch offset falls outside the broker's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoOffsetReset {
    /// Fail the partition consumer.
    #[default]
    None,
    /// Restart from the earliest available offset.
    Earliest,
    /// Restart from the latest offset (only new records).
    Latest,
}

impl fmt::Display for AutoOffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Earliest => write!(f, "earliest"),
            Self::Latest => write!(f, "latest"),
        }
    }
}

/// Error parsing an [`AutoOffsetReset`] from text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown offset reset policy {0:?}; expected none, earliest, or latest")]
pub struct ParseAutoOffsetResetError(String);

impl FromStr for AutoOffsetReset {
    type Err = ParseAutoOffsetResetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            other => Err(ParseAutoOffsetResetError(other.to_string())),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid consumer option {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value is rejected.
        reason: &'static str,
    },

    /// The environment layer could not be read or parsed.
    #[error("environment configuration error: {0}")]
    Env(#[from] envconfig::Error),
}

/// Environment layer, parsed from `WEIR_*` variables.
#[derive(Envconfig)]
struct EnvLayer {
    #[envconfig(from = "WEIR_COMMIT_INTERVAL_MS", default = "5000")]
    commit_interval_ms: u64,

    #[envconfig(from = "WEIR_COMMIT_THRESHOLD", default = "100")]
    commit_threshold: u64,

    #[envconfig(from = "WEIR_COMMIT_STRATEGY", default = "async_commit")]
    commit_strategy: CommitStrategy,

    #[envconfig(from = "WEIR_AUTO_OFFSET_RESET", default = "none")]
    auto_offset_reset: AutoOffsetReset,

    #[envconfig(from = "WEIR_FETCH_MAX_WAIT_MS", default = "1000")]
    fetch_max_wait_ms: u32,

    #[envconfig(from = "WEIR_FETCH_MIN_BYTES", default = "1")]
    fetch_min_bytes: u32,

    #[envconfig(from = "WEIR_FETCH_MAX_BYTES", default = "1048576")]
    fetch_max_bytes: u32,

    #[envconfig(from = "WEIR_BROKER_URIS", default = "localhost:9092")]
    broker_uris: String,
}

/// Options for one partition consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Async commit bounds (interval and threshold).
    pub commit: CommitConfig,
    /// The configured commit strategy.
    pub commit_strategy: CommitStrategy,
    /// Recovery policy for out-of-range fetch offsets.
    pub auto_offset_reset: AutoOffsetReset,
    /// Options forwarded to broker fetches. `auto_commit` is forced off on
    /// every fetch the consumer issues, whatever is configured here.
    pub fetch: FetchOptions,
    /// Broker endpoints used to create the dedicated session.
    pub uris: Vec<String>,
    /// Capacity (in batches) of the downstream delivery channel.
    pub delivery_buffer: usize,
    /// Delay before the tick that follows a demand signal.
    pub first_tick: Duration,
    /// Delay before re-entering the fetch loop while demand remains.
    pub retick: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            commit: CommitConfig::default(),
            commit_strategy: CommitStrategy::default(),
            auto_offset_reset: AutoOffsetReset::default(),
            fetch: FetchOptions::default(),
            uris: vec!["localhost:9092".to_string()],
            delivery_buffer: 8,
            first_tick: Duration::from_millis(5),
            retick: Duration::from_millis(10),
        }
    }
}

impl ConsumerOptions {
    /// Builds options from the process environment over the hard-coded
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is present but
    /// unparseable. Unparseable values never fall back silently.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = EnvLayer::init_from_env()?;
        Ok(Self {
            commit: CommitConfig {
                interval: Duration::from_millis(env.commit_interval_ms),
                threshold: env.commit_threshold,
            },
            commit_strategy: env.commit_strategy,
            auto_offset_reset: env.auto_offset_reset,
            fetch: FetchOptions {
                max_wait_ms: env.fetch_max_wait_ms,
                min_bytes: env.fetch_min_bytes,
                max_bytes: env.fetch_max_bytes,
                auto_commit: false,
            },
            uris: env
                .broker_uris
                .split(',')
                .map(|uri| uri.trim().to_string())
                .filter(|uri| !uri.is_empty())
                .collect(),
            ..Self::default()
        })
    }

    /// Options with tick delays short enough for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            first_tick: Duration::from_millis(1),
            retick: Duration::from_millis(1),
            ..Self::default()
        }
    }

    /// Sets the commit interval.
    #[must_use]
    pub const fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit.interval = interval;
        self
    }

    /// Sets the commit threshold.
    #[must_use]
    pub const fn with_commit_threshold(mut self, threshold: u64) -> Self {
        self.commit.threshold = threshold;
        self
    }

    /// Sets the commit strategy.
    #[must_use]
    pub const fn with_commit_strategy(mut self, strategy: CommitStrategy) -> Self {
        self.commit_strategy = strategy;
        self
    }

    /// Sets the offset reset policy.
    #[must_use]
    pub const fn with_auto_offset_reset(mut self, reset: AutoOffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    /// Sets the fetch options.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    /// Sets the broker endpoint list.
    #[must_use]
    pub fn with_uris(mut self, uris: Vec<String>) -> Self {
        self.uris = uris;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error for values the consumer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit.interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "commit.interval",
                reason: "must be positive",
            });
        }
        if self.commit.threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "commit.threshold",
                reason: "must be positive",
            });
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch.max_bytes",
                reason: "must be positive",
            });
        }
        if self.uris.is_empty() {
            return Err(ConfigError::Invalid {
                field: "uris",
                reason: "at least one broker endpoint is required",
            });
        }
        if self.delivery_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "delivery_buffer",
                reason: "must be positive",
            });
        }
        if self.first_tick.is_zero() || self.retick.is_zero() {
            return Err(ConfigError::Invalid {
                field: "first_tick/retick",
                reason: "tick delays must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let options = ConsumerOptions::default();
        assert_eq!(options.commit.interval, Duration::from_millis(5000));
        assert_eq!(options.commit.threshold, 100);
        assert_eq!(options.commit_strategy, CommitStrategy::Async);
        assert_eq!(options.auto_offset_reset, AutoOffsetReset::None);
        assert!(options.validate().is_ok());
    }

    // One test for the whole environment layer: the variables are process
    // globals, so the cases run sequentially.
    #[test]
    fn test_env_layer_precedence() {
        // Environment beats the hard-coded default.
        std::env::set_var("WEIR_COMMIT_INTERVAL_MS", "250");
        std::env::set_var("WEIR_BROKER_URIS", "b1:9092, b2:9092");
        let options = ConsumerOptions::from_env().unwrap();
        assert_eq!(options.commit.interval, Duration::from_millis(250));
        assert_eq!(
            options.uris,
            vec!["b1:9092".to_string(), "b2:9092".to_string()]
        );

        // Explicit options beat the environment.
        std::env::set_var("WEIR_COMMIT_THRESHOLD", "7");
        let options = ConsumerOptions::from_env()
            .unwrap()
            .with_commit_threshold(42);
        assert_eq!(options.commit.threshold, 42);

        // Unparseable values are an error, never a silent default.
        std::env::set_var("WEIR_COMMIT_STRATEGY", "eventually");
        assert!(ConsumerOptions::from_env().is_err());

        for key in [
            "WEIR_COMMIT_INTERVAL_MS",
            "WEIR_BROKER_URIS",
            "WEIR_COMMIT_THRESHOLD",
            "WEIR_COMMIT_STRATEGY",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let options = ConsumerOptions::default().with_commit_threshold(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_uris() {
        let options = ConsumerOptions::default().with_uris(Vec::new());
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_reset_policy_parsing() {
        assert_eq!("earliest".parse(), Ok(AutoOffsetReset::Earliest));
        assert_eq!("latest".parse(), Ok(AutoOffsetReset::Latest));
        assert_eq!("none".parse(), Ok(AutoOffsetReset::None));
        assert!("middle".parse::<AutoOffsetReset>().is_err());
    }
}
