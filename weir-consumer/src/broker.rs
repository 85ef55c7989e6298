//! Broker capability traits.
//!
//! The wire-protocol client is not this crate's business. The partition
//! consumer sees the broker through two seams:
//!
//! - [`BrokerConnector`]: creates one dedicated session per consumer at
//!   start time. Connection failure fails the start.
//! - [`BrokerSession`]: the five RPCs the consumer drives (fetch, committed
//!   offset, commit, earliest/latest offset) plus `close`.
//!
//! Production code implements these over a real Kafka client; tests implement
//! them over scripted in-memory state. The session handle is owned
//! exclusively by one partition consumer for its whole life.
//!
//! # Error Surfaces
//!
//! Protocol-level outcomes (including per-partition error codes) arrive
//! inside the response types. Transport-level failures arrive as
//! [`BrokerError`] and are treated as transient by the consumer: the step is
//! abandoned without mutating offsets, and a later tick retries.

use async_trait::async_trait;
use thiserror::Error;
use weir_core::{ErrorCode, GroupId, Offset, PartitionId, Record, Topic};

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Transport-level broker failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The underlying transport failed (timeout, refused connection, reset).
    #[error("broker transport failure during {operation}: {message}")]
    Transport {
        /// The RPC that failed.
        operation: &'static str,
        /// Failure description from the transport.
        message: String,
    },

    /// The session was closed and can serve no further requests.
    #[error("broker session closed")]
    SessionClosed,
}

/// Options applied to each fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum time the broker may hold the request waiting for data.
    pub max_wait_ms: u32,
    /// Minimum bytes to accumulate before responding.
    pub min_bytes: u32,
    /// Maximum bytes to return in one response.
    pub max_bytes: u32,
    /// Whether the broker session should auto-commit consumed offsets.
    ///
    /// The consumer forces this to `false` on every fetch it issues: commit
    /// authority belongs to the commit policy alone.
    pub auto_commit: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_wait_ms: 1000,
            min_bytes: 1,
            max_bytes: 1024 * 1024,
            auto_commit: false,
        }
    }
}

/// Response to a fetch request for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionData {
    /// Protocol outcome for this partition.
    pub error_code: ErrorCode,
    /// Records fetched, in ascending offset order.
    pub records: Vec<Record>,
    /// The partition's high watermark at response time.
    pub high_watermark: Offset,
}

impl PartitionData {
    /// Creates a successful response carrying records.
    #[must_use]
    pub fn ok(records: Vec<Record>, high_watermark: Offset) -> Self {
        Self {
            error_code: ErrorCode::NoError,
            records,
            high_watermark,
        }
    }

    /// Creates an error response with no records.
    #[must_use]
    pub fn error(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            records: Vec::new(),
            high_watermark: Offset::default(),
        }
    }
}

/// Response to a committed-offset (offset-fetch) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetFetch {
    /// Protocol outcome.
    pub error_code: ErrorCode,
    /// The committed offset, meaningful only when `error_code` is `NoError`.
    pub offset: Offset,
}

impl OffsetFetch {
    /// Creates a successful offset-fetch response.
    #[must_use]
    pub const fn ok(offset: Offset) -> Self {
        Self {
            error_code: ErrorCode::NoError,
            offset,
        }
    }

    /// Creates an error offset-fetch response.
    #[must_use]
    pub const fn error(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            offset: Offset::new(0),
        }
    }
}

/// A dedicated broker-client session owned by one partition consumer.
///
/// Implementations must be `Send + Sync`; the consumer is the only caller,
/// but the session is also closed from the terminate path.
#[async_trait]
pub trait BrokerSession: Send + Sync + 'static {
    /// Fetches records for one partition starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request never produced a protocol
    /// response. Protocol errors arrive in [`PartitionData::error_code`].
    async fn fetch(
        &self,
        topic: &Topic,
        partition: PartitionId,
        offset: Offset,
        options: &FetchOptions,
    ) -> BrokerResult<PartitionData>;

    /// Queries the committed offset for a group on one partition.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request never produced a response.
    async fn committed_offset(
        &self,
        group: &GroupId,
        topic: &Topic,
        partition: PartitionId,
    ) -> BrokerResult<OffsetFetch>;

    /// Commits `offset` for a group on one partition.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request never produced a response;
    /// protocol rejection arrives as a non-ok [`ErrorCode`].
    async fn commit_offset(
        &self,
        group: &GroupId,
        topic: &Topic,
        partition: PartitionId,
        offset: Offset,
    ) -> BrokerResult<ErrorCode>;

    /// Queries the earliest offset held for one partition.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request never produced a response.
    async fn earliest_offset(&self, topic: &Topic, partition: PartitionId)
        -> BrokerResult<Offset>;

    /// Queries the latest (log-end) offset for one partition.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request never produced a response.
    async fn latest_offset(&self, topic: &Topic, partition: PartitionId) -> BrokerResult<Offset>;

    /// Releases the session. Called exactly once, from the terminate path.
    async fn close(&self);
}

/// Creates broker sessions from an endpoint list.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// The session type this connector produces.
    type Session: BrokerSession;

    /// Connects a dedicated session against the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint could be reached. The caller treats
    /// this as a fatal start failure.
    async fn connect(&self, uris: &[String]) -> BrokerResult<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_options_default_disables_auto_commit() {
        let options = FetchOptions::default();
        assert!(!options.auto_commit);
        assert_eq!(options.min_bytes, 1);
    }

    #[test]
    fn test_partition_data_error_is_empty() {
        let data = PartitionData::error(ErrorCode::OffsetOutOfRange);
        assert!(data.records.is_empty());
        assert_eq!(data.error_code, ErrorCode::OffsetOutOfRange);
    }

    #[test]
    fn test_offset_fetch_ok() {
        let fetch = OffsetFetch::ok(Offset::new(17));
        assert!(fetch.error_code.is_ok());
        assert_eq!(fetch.offset, Offset::new(17));
    }
}
