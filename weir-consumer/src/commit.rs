//! Commit policy.
//!
//! Decides when acked progress should be flushed to the broker. The decision
//! is a pure function of the strategy, the policy configuration, and the
//! tracker's pending/elapsed numbers; executing the commit RPC is the
//! consumer's business.
//!
//! Three strategies:
//!
//! - `None`: never commits. The caller drives commits through
//!   `trigger_commit` re-entries with an explicit strategy.
//! - `Sync`: commits at every opportunity that has pending progress.
//! - `Async` (default): commits when pending progress reaches the threshold,
//!   or when the commit interval has elapsed with any progress pending. With
//!   nothing pending it restarts the interval clock instead of calling the
//!   broker.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// When the consumer flushes acked progress to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitStrategy {
    /// Never commit; the caller drives commits externally.
    None,
    /// Commit at every opportunity with pending progress.
    Sync,
    /// Commit on a progress threshold or a time interval.
    #[default]
    Async,
}

impl fmt::Display for CommitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sync => write!(f, "sync_commit"),
            Self::Async => write!(f, "async_commit"),
        }
    }
}

/// Error parsing a [`CommitStrategy`] from text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown commit strategy {0:?}; expected none, sync_commit, or async_commit")]
pub struct ParseCommitStrategyError(String);

impl FromStr for CommitStrategy {
    type Err = ParseCommitStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "sync_commit" | "sync" => Ok(Self::Sync),
            "async_commit" | "async" => Ok(Self::Async),
            other => Err(ParseCommitStrategyError(other.to_string())),
        }
    }
}

/// Bounds for the async commit strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitConfig {
    /// Time bound: commit pending progress at least this often.
    pub interval: Duration,
    /// Progress bound: commit once this many offsets are pending.
    pub threshold: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            threshold: 100,
        }
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// Nothing to do this step.
    Skip,
    /// No broker call, but restart the interval clock.
    Touch,
    /// Flush the ack watermark to the broker.
    Commit,
}

/// Evaluates the commit policy for one step.
///
/// `pending` is the count of acked-but-uncommitted offsets and
/// `since_last_commit` the time since the last successful commit (or the
/// initial load).
#[must_use]
pub fn decide(
    strategy: CommitStrategy,
    config: &CommitConfig,
    pending: u64,
    since_last_commit: Duration,
) -> CommitDecision {
    match strategy {
        CommitStrategy::None => CommitDecision::Skip,
        CommitStrategy::Sync => {
            if pending > 0 {
                CommitDecision::Commit
            } else {
                CommitDecision::Skip
            }
        }
        CommitStrategy::Async => {
            if pending == 0 {
                CommitDecision::Touch
            } else if pending >= config.threshold || since_last_commit >= config.interval {
                CommitDecision::Commit
            } else {
                CommitDecision::Skip
            }
        }
    }
}
