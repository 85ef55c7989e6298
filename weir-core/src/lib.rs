//! Weir Core - Shared vocabulary types for the weir partition consumer.
//!
//! This crate provides the types every other weir crate speaks: strongly-typed
//! identifiers, the record/offset model, and the broker error-code vocabulary.
//! It performs no I/O and holds no policy.
//!
//! # Design Principles
//!
//! - **Strongly-typed identifiers**: a `PartitionId` cannot be confused with a
//!   raw integer or another id type.
//! - **Plain values**: records and offsets are data; fetching, delivering, and
//!   committing them is the consumer crate's business.
//! - **No unsafe code**: safety over performance.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod record;
mod types;

pub use error::ErrorCode;
pub use record::{Header, Offset, Record, Timestamp};
pub use types::{GroupId, PartitionId, Topic, TopicPartition};
