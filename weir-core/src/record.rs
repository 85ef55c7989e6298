//! Record and offset types.
//!
//! Records are the unit of delivery: what the broker returns from a fetch and
//! what the consumer forwards downstream. They follow the Kafka record shape
//! with offset, timestamp, key, value, and headers.
//!
//! The broker assigns offsets; a record travels with the offset it was fetched
//! at. A record whose offset the broker did not populate carries `None`, and
//! the consumer treats a batch ending in such a record as unpositioned (it
//! delivers the records but does not move its own cursor past them).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Offset of a record in a partition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the number of offsets between `self` and `later`, or zero if
    /// `later` is not ahead of `self`.
    #[must_use]
    pub const fn distance_to(self, later: Self) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// Record timestamp: milliseconds since the Unix epoch.
///
/// Brokers report `-1` for records produced without a timestamp, so the
/// sentinel is kept in-band instead of widening every record by an `Option`
/// discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Wraps a raw millisecond value.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value. Negative means absent.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// The current wall-clock time. A clock before the epoch reads as 0.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// The absent-timestamp sentinel.
    #[must_use]
    pub const fn none() -> Self {
        Self(-1)
    }

    /// Returns true for the absent-timestamp sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::none()
    }
}

/// A record header (key-value metadata).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header key.
    pub key: Bytes,
    /// Header value.
    pub value: Bytes,
}

impl Header {
    /// Creates a new header.
    #[must_use]
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single record as fetched from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Offset in the partition, or `None` if the broker left it unassigned.
    pub offset: Option<Offset>,
    /// Timestamp of the record.
    pub timestamp: Timestamp,
    /// Optional key.
    pub key: Option<Bytes>,
    /// The record payload.
    pub value: Bytes,
    /// Optional headers.
    pub headers: Vec<Header>,
}

impl Record {
    /// Creates a record at an offset with just a value.
    #[must_use]
    pub fn new(offset: Offset, value: impl Into<Bytes>) -> Self {
        Self {
            offset: Some(offset),
            timestamp: Timestamp::now(),
            key: None,
            value: value.into(),
            headers: Vec::new(),
        }
    }

    /// Creates a record with key and value.
    #[must_use]
    pub fn with_key(offset: Offset, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            offset: Some(offset),
            timestamp: Timestamp::now(),
            key: Some(key.into()),
            value: value.into(),
            headers: Vec::new(),
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Clears the offset, producing a record the broker never positioned.
    #[must_use]
    pub fn without_offset(mut self) -> Self {
        self.offset = None;
        self
    }
}
