//! The partition consumer actor.
//!
//! One tokio task per `(group, topic, partition)`, owning all consumption
//! state exclusively. Three independent pressures feed it:
//!
//! - **demand** from the downstream subscriber,
//! - **fetch results** from the dedicated broker session,
//! - **commit timing** from the policy clock,
//!
//! and the run loop serializes them: commands, the subscriber's join handle,
//! and the single self-scheduled tick are raced in one `select!`, so no two
//! state mutations ever interleave.
//!
//! # Message Flow
//!
//! 1. `Demand(n)`: first demand loads the initial offsets, later ones update
//!    the outstanding count; a short tick is scheduled either way.
//! 2. Tick: while demand is positive, run exactly one fetch step, then
//!    re-arm the tick if demand remains.
//! 3. `TriggerCommit`: raise the ack watermark and re-run the policy with a
//!    caller-chosen strategy.
//! 4. `Stop` / subscriber exit / fatal error: the terminate path makes one
//!    final commit attempt and releases the broker session.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use weir_core::{ErrorCode, GroupId, Offset, PartitionId, Record, Topic, TopicPartition};

use crate::broker::{BrokerConnector, BrokerSession, FetchOptions};
use crate::commit::{self, CommitDecision, CommitStrategy};
use crate::config::{AutoOffsetReset, ConsumerOptions};
use crate::error::{ConsumerError, StartError};
use crate::offsets::OffsetTracker;
use crate::subscriber::{StartSubscriber, SubscriberContext};

/// Command channel capacity. Commands are small and the producers are few
/// (one subscriber, occasional external callers).
const COMMAND_BUFFER: usize = 64;

/// Commands accepted by the partition consumer.
#[derive(Debug)]
enum ConsumerCommand {
    /// The subscriber wants this many records.
    Demand(u64),
    /// Raise the ack watermark and re-run the commit policy.
    TriggerCommit {
        strategy: CommitStrategy,
        offset: Offset,
    },
    /// Orderly shutdown; replied to after the final commit attempt.
    Stop { reply: oneshot::Sender<()> },
}

/// What woke the run loop.
enum Wake {
    Command(Option<ConsumerCommand>),
    Tick,
    Subscriber(Result<(), tokio::task::JoinError>),
}

/// Whether the run loop keeps serving after a command.
enum Flow {
    Continue,
    Stop,
}

/// Handle for talking to a running partition consumer.
///
/// Clones share one underlying channel. The subscriber holds one clone for
/// demand signals; the consumer-group runtime holds another for lifecycle
/// and external commits.
#[derive(Clone)]
pub struct PartitionConsumerHandle {
    tx: mpsc::Sender<ConsumerCommand>,
    tp: TopicPartition,
}

impl PartitionConsumerHandle {
    /// Returns the topic and partition this consumer serves.
    #[must_use]
    pub const fn partition(&self) -> &TopicPartition {
        &self.tp
    }

    /// Signals that the subscriber wants `count` more records.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Terminated`] if the consumer is gone.
    pub async fn demand(&self, count: u64) -> Result<(), ConsumerError> {
        self.tx
            .send(ConsumerCommand::Demand(count))
            .await
            .map_err(|_| ConsumerError::Terminated)
    }

    /// Raises the ack watermark to `offset` and runs the commit policy with
    /// the given strategy. Fire-and-forget; offsets at or below the current
    /// watermark are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Terminated`] if the consumer is gone.
    pub async fn trigger_commit(
        &self,
        strategy: CommitStrategy,
        offset: Offset,
    ) -> Result<(), ConsumerError> {
        self.tx
            .send(ConsumerCommand::TriggerCommit { strategy, offset })
            .await
            .map_err(|_| ConsumerError::Terminated)
    }

    /// Requests an orderly shutdown and waits for the final commit attempt
    /// to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Terminated`] if the consumer is already gone.
    pub async fn stop(&self) -> Result<(), ConsumerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ConsumerCommand::Stop { reply: reply_tx })
            .await
            .map_err(|_| ConsumerError::Terminated)?;
        reply_rx.await.map_err(|_| ConsumerError::Terminated)
    }
}

impl std::fmt::Debug for PartitionConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionConsumerHandle")
            .field("tp", &self.tp)
            .finish_non_exhaustive()
    }
}

/// Starts a partition consumer.
///
/// Creates the dedicated broker session, spawns and links the subscriber,
/// and spawns the consumer task. No offsets are loaded until the first
/// demand signal arrives.
///
/// Returns the handle and the consumer task's join handle; the task resolves
/// with `Err` only on the fatal conditions of the error taxonomy.
///
/// # Errors
///
/// Fails if the options are invalid or the broker session cannot be created.
pub async fn start<C, F>(
    connector: &C,
    group: impl Into<GroupId>,
    topic: impl Into<Topic>,
    partition: PartitionId,
    subscriber: F,
    options: ConsumerOptions,
) -> Result<(PartitionConsumerHandle, JoinHandle<Result<(), ConsumerError>>), StartError>
where
    C: BrokerConnector,
    F: StartSubscriber,
{
    options.validate()?;

    let group = group.into();
    let tp = TopicPartition::new(topic, partition);

    let mut fetch_options = options.fetch.clone();
    if fetch_options.auto_commit {
        debug!(%tp, "auto_commit requested in fetch options; forcing it off");
        fetch_options.auto_commit = false;
    }

    let session = connector
        .connect(&options.uris)
        .await
        .map_err(StartError::Connect)?;

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (delivery_tx, delivery_rx) = mpsc::channel(options.delivery_buffer);

    let handle = PartitionConsumerHandle {
        tx: command_tx,
        tp: tp.clone(),
    };

    let subscriber_join = subscriber.start_subscriber(SubscriberContext {
        consumer: handle.clone(),
        topic: tp.topic.clone(),
        partition,
        deliveries: delivery_rx,
    });

    info!(%group, %tp, strategy = %options.commit_strategy, "partition consumer starting");

    let consumer = PartitionConsumer {
        group,
        tp,
        session,
        options,
        fetch_options,
        tracker: None,
        deliveries: delivery_tx,
        rx: command_rx,
        next_tick: None,
        stop_reply: None,
    };
    let join = tokio::spawn(consumer.run(subscriber_join));

    Ok((handle, join))
}

/// The actor state. Owned by exactly one task; every mutation happens
/// between two awaits of the same run loop.
struct PartitionConsumer<S: BrokerSession> {
    group: GroupId,
    tp: TopicPartition,
    session: S,
    options: ConsumerOptions,
    fetch_options: FetchOptions,
    /// `None` until the first demand signal triggers the initial offset load.
    tracker: Option<OffsetTracker>,
    deliveries: mpsc::Sender<Vec<Record>>,
    rx: mpsc::Receiver<ConsumerCommand>,
    /// The single outstanding tick, if any. Overwriting a pending tick is
    /// harmless; ticks observe demand before acting.
    next_tick: Option<time::Instant>,
    stop_reply: Option<oneshot::Sender<()>>,
}

impl<S: BrokerSession> PartitionConsumer<S> {
    async fn run(mut self, mut subscriber: JoinHandle<()>) -> Result<(), ConsumerError> {
        let result = self.serve(&mut subscriber).await;
        self.finalize(&result).await;

        // The link is bidirectional: the consumer going down takes the
        // subscriber with it. Dropping `self.deliveries` closes the polite
        // path; abort covers subscribers that are not draining.
        drop(self.deliveries);
        subscriber.abort();

        if let Some(reply) = self.stop_reply.take() {
            let _ = reply.send(());
        }
        result
    }

    async fn serve(&mut self, subscriber: &mut JoinHandle<()>) -> Result<(), ConsumerError> {
        loop {
            match self.next_wake(subscriber).await {
                Wake::Command(Some(command)) => match self.handle_command(command).await? {
                    Flow::Continue => {}
                    Flow::Stop => {
                        info!(tp = %self.tp, "stop requested");
                        return Ok(());
                    }
                },
                Wake::Command(None) => {
                    info!(tp = %self.tp, "all consumer handles dropped");
                    return Ok(());
                }
                Wake::Tick => {
                    self.next_tick = None;
                    self.try_to_meet_demand().await?;
                }
                Wake::Subscriber(Ok(())) => {
                    info!(tp = %self.tp, "subscriber finished");
                    return Ok(());
                }
                Wake::Subscriber(Err(join_error)) => {
                    error!(tp = %self.tp, %join_error, "subscriber died");
                    return Err(ConsumerError::SubscriberDied {
                        tp: self.tp.clone(),
                    });
                }
            }
        }
    }

    async fn next_wake(&mut self, subscriber: &mut JoinHandle<()>) -> Wake {
        if let Some(deadline) = self.next_tick {
            tokio::select! {
                command = self.rx.recv() => Wake::Command(command),
                result = &mut *subscriber => Wake::Subscriber(result),
                () = time::sleep_until(deadline) => Wake::Tick,
            }
        } else {
            tokio::select! {
                command = self.rx.recv() => Wake::Command(command),
                result = &mut *subscriber => Wake::Subscriber(result),
            }
        }
    }

    async fn handle_command(&mut self, command: ConsumerCommand) -> Result<Flow, ConsumerError> {
        match command {
            ConsumerCommand::Demand(count) => {
                self.on_demand(count).await?;
                Ok(Flow::Continue)
            }
            ConsumerCommand::TriggerCommit { strategy, offset } => {
                self.on_trigger_commit(strategy, offset).await;
                Ok(Flow::Continue)
            }
            ConsumerCommand::Stop { reply } => {
                self.stop_reply = Some(reply);
                Ok(Flow::Stop)
            }
        }
    }

    /// Stores a demand signal. The first signal ever also loads the initial
    /// offsets; no fetch happens here, only a tick gets scheduled.
    async fn on_demand(&mut self, count: u64) -> Result<(), ConsumerError> {
        if self.tracker.is_none() {
            self.load_initial_offsets().await?;
        }
        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(());
        };
        tracker.set_demand(count);
        if count > 0 {
            debug!(tp = %self.tp, demand = count, "demand stored");
            self.next_tick = Some(time::Instant::now() + self.options.first_tick);
        }
        Ok(())
    }

    /// Resolves the starting offset from the broker's committed offset for
    /// the group, falling back to the earliest offset when the group has
    /// never committed on this partition.
    async fn load_initial_offsets(&mut self) -> Result<(), ConsumerError> {
        let fetched = self
            .session
            .committed_offset(&self.group, &self.tp.topic, self.tp.partition)
            .await?;

        let start = match fetched.error_code {
            ErrorCode::NoError => fetched.offset,
            ErrorCode::UnknownTopicOrPartition => {
                let earliest = self
                    .session
                    .earliest_offset(&self.tp.topic, self.tp.partition)
                    .await?;
                debug!(tp = %self.tp, offset = %earliest, "no committed offset; starting from earliest");
                earliest
            }
            code => {
                error!(group = %self.group, tp = %self.tp, %code, "initial offset load failed");
                return Err(ConsumerError::OffsetLoad {
                    tp: self.tp.clone(),
                    code,
                });
            }
        };

        info!(group = %self.group, tp = %self.tp, offset = %start, "loaded initial offset");
        self.tracker = Some(OffsetTracker::new(start, Instant::now()));
        Ok(())
    }

    /// Runs one fetch step if demand is positive, then re-arms the tick while
    /// demand remains. A tick with zero demand is a no-op.
    async fn try_to_meet_demand(&mut self) -> Result<(), ConsumerError> {
        if !self.tracker.as_ref().is_some_and(OffsetTracker::has_demand) {
            return Ok(());
        }
        self.fetch_step().await?;
        if self.tracker.as_ref().is_some_and(OffsetTracker::has_demand) {
            self.next_tick = Some(time::Instant::now() + self.options.retick);
        }
        Ok(())
    }

    /// One fetch step: issue the fetch, classify the outcome, advance past a
    /// positioned batch, deliver downstream, then run the commit policy once.
    async fn fetch_step(&mut self) -> Result<(), ConsumerError> {
        let Some(fetch_offset) = self.tracker.as_ref().map(OffsetTracker::current) else {
            return Ok(());
        };

        let data = match self
            .session
            .fetch(
                &self.tp.topic,
                self.tp.partition,
                fetch_offset,
                &self.fetch_options,
            )
            .await
        {
            Ok(data) => data,
            Err(err) => {
                warn!(tp = %self.tp, error = %err, "fetch failed; retrying on a later tick");
                return Ok(());
            }
        };

        match data.error_code {
            ErrorCode::NoError => {}
            ErrorCode::OffsetOutOfRange => {
                self.reset_offsets(fetch_offset).await?;
                // The reset step yields zero records but still runs the
                // policy, so the interval clock stays honest.
                self.run_commit_policy(CommitStrategy::Async).await;
                return Ok(());
            }
            code if code.is_retriable() => {
                warn!(tp = %self.tp, %code, "fetch returned a retriable error");
                return Ok(());
            }
            code => {
                error!(tp = %self.tp, %code, "fetch returned an unrecoverable error");
                return Err(ConsumerError::Fetch {
                    tp: self.tp.clone(),
                    code,
                });
            }
        }

        let batch = data.records;
        let effective_strategy = match (batch_tail(&batch), self.tracker.as_mut()) {
            (Some(last), Some(tracker)) => {
                let delivered = batch.len() as u64;
                if delivered > tracker.demand() {
                    debug!(tp = %self.tp, delivered, demand = tracker.demand(), "broker over-delivered; demand clamps at zero");
                }
                tracker.advance(delivered, last);
                debug!(
                    tp = %self.tp,
                    from = %fetch_offset,
                    count = delivered,
                    lag = tracker.lag(data.high_watermark),
                    "fetched batch"
                );
                self.options.commit_strategy
            }
            _ => {
                // Empty batch, or a tail record the broker never positioned:
                // the cursor stays put and the step never escalates to a
                // forced sync commit.
                if !batch.is_empty() {
                    debug!(tp = %self.tp, count = batch.len(), "batch tail has no offset; cursor unchanged");
                }
                CommitStrategy::Async
            }
        };

        // Every step's batch goes downstream, empty or not; only the offset
        // advance and the commit-strategy escalation are conditional on a
        // positioned tail.
        if self.deliveries.send(batch).await.is_err() {
            return Err(ConsumerError::SubscriberDied {
                tp: self.tp.clone(),
            });
        }

        self.run_commit_policy(effective_strategy).await;
        Ok(())
    }

    /// Recovers from an out-of-range fetch offset per the configured policy.
    async fn reset_offsets(&mut self, out_of_range: Offset) -> Result<(), ConsumerError> {
        let target = match self.options.auto_offset_reset {
            AutoOffsetReset::Earliest => {
                self.session
                    .earliest_offset(&self.tp.topic, self.tp.partition)
                    .await
            }
            AutoOffsetReset::Latest => {
                self.session
                    .latest_offset(&self.tp.topic, self.tp.partition)
                    .await
            }
            AutoOffsetReset::None => {
                error!(tp = %self.tp, offset = %out_of_range, "offset out of range and reset is disabled");
                return Err(ConsumerError::OffsetOutOfRange {
                    tp: self.tp.clone(),
                    offset: out_of_range,
                });
            }
        };

        match target {
            Ok(offset) => {
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.reset(offset);
                }
                warn!(
                    tp = %self.tp,
                    from = %out_of_range,
                    to = %offset,
                    policy = %self.options.auto_offset_reset,
                    "offset out of range; reset"
                );
                Ok(())
            }
            Err(err) => {
                warn!(tp = %self.tp, error = %err, "offset reset query failed; retrying on a later tick");
                Ok(())
            }
        }
    }

    /// Raises the ack watermark from an external `trigger_commit`. A
    /// watermark that does not move leaves all state untouched.
    async fn on_trigger_commit(&mut self, strategy: CommitStrategy, offset: Offset) {
        let moved = match self.tracker.as_mut() {
            Some(tracker) => tracker.mark_acked(offset),
            None => {
                debug!(tp = %self.tp, %offset, "trigger_commit before offsets loaded; ignored");
                return;
            }
        };
        if moved {
            debug!(tp = %self.tp, acked = %offset, %strategy, "ack watermark raised externally");
            self.run_commit_policy(strategy).await;
        }
    }

    /// Evaluates the commit policy once and acts on the decision.
    async fn run_commit_policy(&mut self, strategy: CommitStrategy) {
        let now = Instant::now();
        let decision = match self.tracker.as_ref() {
            Some(tracker) => commit::decide(
                strategy,
                &self.options.commit,
                tracker.pending(),
                tracker.since_last_commit(now),
            ),
            None => return,
        };
        match decision {
            CommitDecision::Skip => {}
            CommitDecision::Touch => {
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.touch(now);
                }
            }
            CommitDecision::Commit => self.commit_to_broker().await,
        }
    }

    /// Flushes the ack watermark to the broker. Failure keeps the progress
    /// pending so a later policy run retries.
    async fn commit_to_broker(&mut self) {
        let Some(acked) = self.tracker.as_ref().map(OffsetTracker::acked) else {
            return;
        };
        match self
            .session
            .commit_offset(&self.group, &self.tp.topic, self.tp.partition, acked)
            .await
        {
            Ok(code) if code.is_ok() => {
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.record_commit(acked, Instant::now());
                }
                debug!(group = %self.group, tp = %self.tp, offset = %acked, "committed offset");
            }
            Ok(code) => {
                warn!(tp = %self.tp, offset = %acked, %code, "offset commit rejected; keeping progress pending");
            }
            Err(err) => {
                warn!(tp = %self.tp, offset = %acked, error = %err, "offset commit failed; keeping progress pending");
            }
        }
    }

    /// The terminate path: one best-effort final commit, then release the
    /// broker session.
    async fn finalize(&mut self, result: &Result<(), ConsumerError>) {
        if self.tracker.as_ref().is_some_and(|t| t.pending() > 0) {
            self.commit_to_broker().await;
        }
        self.session.close().await;
        match result {
            Ok(()) => info!(group = %self.group, tp = %self.tp, "partition consumer stopped"),
            Err(err) => {
                error!(group = %self.group, tp = %self.tp, error = %err, "partition consumer terminated");
            }
        }
    }
}

/// The offset of the final record in a batch, if the broker positioned it.
fn batch_tail(batch: &[Record]) -> Option<Offset> {
    batch.last().and_then(|record| record.offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_tail_of_positioned_batch() {
        let batch = vec![
            Record::new(Offset::new(3), "a"),
            Record::new(Offset::new(4), "b"),
        ];
        assert_eq!(batch_tail(&batch), Some(Offset::new(4)));
    }

    #[test]
    fn test_batch_tail_of_empty_batch() {
        assert_eq!(batch_tail(&[]), None);
    }

    #[test]
    fn test_batch_tail_missing_offset() {
        let batch = vec![
            Record::new(Offset::new(3), "a"),
            Record::new(Offset::new(4), "b").without_offset(),
        ];
        assert_eq!(batch_tail(&batch), None);
    }
}
