//! Reusable scenario helpers.
//!
//! Wires a partition consumer to a scripted session and a collecting
//! subscriber, and provides the polling helpers the tests assert with.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use weir_consumer::{
    ConsumerError, ConsumerOptions, PartitionConsumerHandle, StartError, SubscriberContext,
};
use weir_core::{Offset, PartitionId, Record};

use crate::scripted_session::{ScriptedConnector, ScriptedSession};

/// Group name used by every scenario.
pub const GROUP: &str = "g";
/// Topic name used by every scenario.
pub const TOPIC: &str = "events";
/// Partition served by every scenario.
pub const PARTITION: PartitionId = PartitionId::new(0);

/// Everything a scenario needs to drive and observe one consumer.
pub struct Harness {
    /// The scripted session the consumer talks to.
    pub session: ScriptedSession,
    /// Handle to the running consumer.
    pub handle: PartitionConsumerHandle,
    /// The consumer task.
    pub task: JoinHandle<Result<(), ConsumerError>>,
    /// Batches delivered to the subscriber so far.
    pub delivered: Delivered,
}

/// Observable record of everything delivered downstream.
#[derive(Clone, Default)]
pub struct Delivered {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl Delivered {
    /// Returns the delivered batches, in delivery order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().expect("lock poisoned").clone()
    }

    /// Returns every delivered record's offset, flattened in delivery order.
    #[must_use]
    pub fn offsets(&self) -> Vec<u64> {
        self.batches()
            .iter()
            .flatten()
            .filter_map(|record| record.offset.map(Offset::get))
            .collect()
    }

    /// Returns the total number of records delivered.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.batches().iter().map(Vec::len).sum()
    }
}

/// Starts a consumer against `session` with a subscriber that signals
/// `initial_demand` once and then only collects deliveries.
///
/// # Panics
///
/// Panics if the consumer fails to start; scenarios that exercise start
/// failures call [`weir_consumer::start`] directly.
pub async fn start_harness(
    session: ScriptedSession,
    options: ConsumerOptions,
    initial_demand: u64,
) -> Harness {
    try_start_harness(session, options, initial_demand)
        .await
        .expect("consumer failed to start")
}

/// Same as [`start_harness`], surfacing start failures.
///
/// # Errors
///
/// Returns the start failure unchanged.
pub async fn try_start_harness(
    session: ScriptedSession,
    options: ConsumerOptions,
    initial_demand: u64,
) -> Result<Harness, StartError> {
    let connector = ScriptedConnector::new(session.clone());
    let delivered = Delivered::default();
    let sink = delivered.clone();

    let (handle, task) = weir_consumer::start(
        &connector,
        GROUP,
        TOPIC,
        PARTITION,
        move |ctx: SubscriberContext| {
            tokio::spawn(async move {
                let SubscriberContext {
                    consumer,
                    mut deliveries,
                    ..
                } = ctx;
                if initial_demand > 0 {
                    let _ = consumer.demand(initial_demand).await;
                }
                while let Some(batch) = deliveries.recv().await {
                    sink.batches.lock().expect("lock poisoned").push(batch);
                }
            })
        },
        options,
    )
    .await?;

    Ok(Harness {
        session,
        handle,
        task,
        delivered,
    })
}

/// Polls `predicate` until it holds, panicking after a generous timeout.
/// Works under both real and paused clocks; under a paused clock the sleeps
/// auto-advance virtual time.
///
/// # Panics
///
/// Panics if the predicate never holds.
pub async fn eventually(what: &str, predicate: impl Fn() -> bool) {
    for _ in 0..1000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Sleeps long enough for the consumer to drain already-queued commands.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
