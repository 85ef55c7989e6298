//! The subscriber side of the delivery contract.
//!
//! A partition consumer owns exactly one subscriber: the user task that
//! absorbs record batches. The subscriber is spawned by a user-supplied
//! factory at consumer start and linked to the consumer for life:
//!
//! - subscriber death (panic or abort) terminates the consumer,
//! - consumer termination closes the delivery channel and aborts the
//!   subscriber task.
//!
//! The factory receives a [`SubscriberContext`]: a handle for signaling
//! demand (and driving external commits), the partition identity, and the
//! receiving end of the delivery channel. Anything else the subscriber needs
//! is captured by the factory closure.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use weir_core::{PartitionId, Record, Topic};

use crate::consumer::PartitionConsumerHandle;

/// Receiving end of the delivery channel: batches of records in ascending
/// offset order, bounded by the configured delivery buffer.
pub type DeliveryReceiver = mpsc::Receiver<Vec<Record>>;

/// Everything a subscriber task needs to run.
pub struct SubscriberContext {
    /// Handle to the partition consumer, for demand signals and
    /// `trigger_commit`.
    pub consumer: PartitionConsumerHandle,
    /// Topic being served.
    pub topic: Topic,
    /// Partition being served.
    pub partition: PartitionId,
    /// Incoming record batches. When this channel closes, the consumer is
    /// gone and the subscriber should wind down.
    pub deliveries: DeliveryReceiver,
}

impl std::fmt::Debug for SubscriberContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberContext")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// User-supplied subscriber factory.
///
/// Invoked exactly once, at consumer start, on the starting task. Must spawn
/// the subscriber and return its join handle; the consumer watches the handle
/// for the life of the partition.
pub trait StartSubscriber: Send + 'static {
    /// Spawns the subscriber task for one partition.
    fn start_subscriber(self, ctx: SubscriberContext) -> JoinHandle<()>;
}

impl<F> StartSubscriber for F
where
    F: FnOnce(SubscriberContext) -> JoinHandle<()> + Send + 'static,
{
    fn start_subscriber(self, ctx: SubscriberContext) -> JoinHandle<()> {
        self(ctx)
    }
}
