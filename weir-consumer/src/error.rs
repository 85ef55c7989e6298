//! Consumer error types.
//!
//! Only fatal conditions surface here; transient broker trouble is logged and
//! absorbed by the tick loop. A partition consumer's task resolves with
//! `Result<(), ConsumerError>`, which is what the consumer-group runtime
//! observes to decide on restart.

use thiserror::Error;
use weir_core::{ErrorCode, Offset, TopicPartition};

use crate::broker::BrokerError;
use crate::config::ConfigError;

/// Fatal partition consumer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The initial committed-offset load failed with a protocol error.
    #[error("failed to load initial offset for {tp}: {code}")]
    OffsetLoad {
        /// The partition being served.
        tp: TopicPartition,
        /// The protocol error returned.
        code: ErrorCode,
    },

    /// A fetch returned an unrecoverable protocol error.
    #[error("fetch failed for {tp}: {code}")]
    Fetch {
        /// The partition being served.
        tp: TopicPartition,
        /// The protocol error returned.
        code: ErrorCode,
    },

    /// The fetch offset fell out of range and offset reset is disabled.
    #[error("offset {offset} out of range for {tp} and auto offset reset is disabled")]
    OffsetOutOfRange {
        /// The partition being served.
        tp: TopicPartition,
        /// The offset that fell out of range.
        offset: Offset,
    },

    /// The linked subscriber died (panicked or was aborted).
    #[error("subscriber for {tp} died")]
    SubscriberDied {
        /// The partition being served.
        tp: TopicPartition,
    },

    /// A broker transport failure in a context with no retry path.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The consumer is no longer running (returned by handle operations).
    #[error("partition consumer has terminated")]
    Terminated,
}

/// Errors starting a partition consumer.
#[derive(Debug, Error)]
pub enum StartError {
    /// The options failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dedicated broker session could not be created.
    #[error("failed to create broker session: {0}")]
    Connect(#[source] BrokerError),
}
