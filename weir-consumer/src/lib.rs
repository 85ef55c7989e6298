//! Weir Consumer - demand-driven Kafka partition consumer with backpressure.
//!
//! One [`PartitionConsumerHandle`]-fronted task per `(group, topic,
//! partition)`, created by a consumer-group runtime on assignment and torn
//! down on revocation. The consumer fetches from the broker only while its
//! downstream subscriber has declared capacity, delivers bounded batches in
//! ascending offset order, and flushes offset commits on its own policy
//! clock, independent of delivery.
//!
//! # Architecture
//!
//! ```text
//!  Subscriber ──demand──▶ ┌────────────────────┐ ──fetch───▶ BrokerSession
//!      ▲                  │ PartitionConsumer  │ ◀──records──
//!      └─────records───── │  (one tokio task)  │ ──commit──▶
//!                         └────────────────────┘
//! ```
//!
//! The broker is a capability ([`BrokerConnector`] / [`BrokerSession`]), not
//! a dependency: production code implements it over a real Kafka client,
//! tests over scripted in-memory state. Partition assignment, rebalancing,
//! and heartbeats belong to the runtime that starts consumers; this crate
//! guarantees only the per-partition contract:
//!
//! - records are delivered in strictly ascending offset order,
//! - delivery never outruns cumulative demand,
//! - an offset becomes commit-eligible only after its batch was delivered
//!   (at-least-once; duplication on restart is bounded by the commit policy),
//! - the committed offset never regresses.
//!
//! # Example
//!
//! ```ignore
//! let options = ConsumerOptions::from_env()?
//!     .with_commit_strategy(CommitStrategy::Async)
//!     .with_auto_offset_reset(AutoOffsetReset::Earliest);
//!
//! let (handle, task) = weir_consumer::start(
//!     &connector,
//!     "billing",
//!     "invoices",
//!     PartitionId::new(3),
//!     |ctx: SubscriberContext| {
//!         tokio::spawn(async move {
//!             let mut ctx = ctx;
//!             ctx.consumer.demand(100).await.ok();
//!             while let Some(batch) = ctx.deliveries.recv().await {
//!                 process(batch).await;
//!                 ctx.consumer.demand(100).await.ok();
//!             }
//!         })
//!     },
//!     options,
//! )
//! .await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod broker;
mod commit;
mod config;
mod consumer;
mod error;
mod offsets;
mod subscriber;

pub use broker::{
    BrokerConnector, BrokerError, BrokerResult, BrokerSession, FetchOptions, OffsetFetch,
    PartitionData,
};
pub use commit::{CommitConfig, CommitStrategy, ParseCommitStrategyError};
pub use config::{AutoOffsetReset, ConfigError, ConsumerOptions, ParseAutoOffsetResetError};
pub use consumer::{start, PartitionConsumerHandle};
pub use error::{ConsumerError, StartError};
pub use offsets::OffsetTracker;
pub use subscriber::{DeliveryReceiver, StartSubscriber, SubscriberContext};
