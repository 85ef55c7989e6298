//! Scripted broker session for integration tests.
//!
//! Implements the consumer's broker capability over in-memory state: fetch
//! outcomes are scripted as a queue, offset queries return configured values,
//! and every commit RPC is recorded for assertions. This stands in for the
//! production session the same way a simulated transport stands in for TCP.
//!
//! A session with an exhausted fetch script behaves like a long-polling
//! broker with no new data: it honors `max_wait_ms` from the fetch options,
//! then returns an empty response.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use weir_consumer::{
    BrokerConnector, BrokerError, BrokerResult, BrokerSession, FetchOptions, OffsetFetch,
    PartitionData,
};
use weir_core::{ErrorCode, GroupId, Offset, PartitionId, Record, Topic};

/// One scripted fetch outcome.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Return these records successfully.
    Records(Vec<Record>),
    /// Return a protocol error code.
    Error(ErrorCode),
    /// Fail at the transport level.
    Transport,
}

/// Shared state behind a [`ScriptedSession`].
struct Inner {
    /// Response to committed-offset queries.
    committed: Mutex<OffsetFetch>,
    /// Response to earliest-offset queries.
    earliest: Mutex<Offset>,
    /// Response to latest-offset queries.
    latest: Mutex<Offset>,
    /// Scripted fetch outcomes, consumed front to back.
    fetch_script: Mutex<VecDeque<FetchOutcome>>,
    /// Offsets the consumer fetched from, in order.
    fetch_log: Mutex<Vec<Offset>>,
    /// Offsets the consumer attempted to commit, in order.
    commit_log: Mutex<Vec<Offset>>,
    /// Protocol outcome for commit attempts.
    commit_response: Mutex<ErrorCode>,
    /// Whether the session was closed.
    closed: AtomicBool,
    /// High watermark floor reported on fetches.
    high_watermark: Mutex<Offset>,
}

/// A broker session whose behavior is fully scripted by the test.
#[derive(Clone)]
pub struct ScriptedSession {
    inner: Arc<Inner>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    /// Creates a session with no committed offset, empty logs, and an empty
    /// fetch script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: Mutex::new(OffsetFetch::error(ErrorCode::UnknownTopicOrPartition)),
                earliest: Mutex::new(Offset::new(0)),
                latest: Mutex::new(Offset::new(0)),
                fetch_script: Mutex::new(VecDeque::new()),
                fetch_log: Mutex::new(Vec::new()),
                commit_log: Mutex::new(Vec::new()),
                commit_response: Mutex::new(ErrorCode::NoError),
                closed: AtomicBool::new(false),
                high_watermark: Mutex::new(Offset::new(0)),
            }),
        }
    }

    /// Sets the committed offset returned to the initial load.
    #[must_use]
    pub fn with_committed(self, offset: u64) -> Self {
        *self.inner.committed.lock().expect("lock poisoned") = OffsetFetch::ok(Offset::new(offset));
        self
    }

    /// Makes the initial load fail with a protocol error.
    #[must_use]
    pub fn with_committed_error(self, code: ErrorCode) -> Self {
        *self.inner.committed.lock().expect("lock poisoned") = OffsetFetch::error(code);
        self
    }

    /// Sets the earliest offset.
    #[must_use]
    pub fn with_earliest(self, offset: u64) -> Self {
        *self.inner.earliest.lock().expect("lock poisoned") = Offset::new(offset);
        self
    }

    /// Sets the latest offset.
    #[must_use]
    pub fn with_latest(self, offset: u64) -> Self {
        *self.inner.latest.lock().expect("lock poisoned") = Offset::new(offset);
        self
    }

    /// Appends a batch of consecutive records to the fetch script.
    #[must_use]
    pub fn then_records(self, offsets: std::ops::Range<u64>) -> Self {
        self.push_fetch(FetchOutcome::Records(records(offsets)));
        self
    }

    /// Appends a protocol error to the fetch script.
    #[must_use]
    pub fn then_error(self, code: ErrorCode) -> Self {
        self.push_fetch(FetchOutcome::Error(code));
        self
    }

    /// Appends a transport failure to the fetch script.
    #[must_use]
    pub fn then_transport_error(self) -> Self {
        self.push_fetch(FetchOutcome::Transport);
        self
    }

    /// Appends an arbitrary outcome to the fetch script.
    pub fn push_fetch(&self, outcome: FetchOutcome) {
        self.inner
            .fetch_script
            .lock()
            .expect("lock poisoned")
            .push_back(outcome);
    }

    /// Sets the protocol outcome of subsequent commit attempts.
    pub fn respond_to_commits_with(&self, code: ErrorCode) {
        *self.inner.commit_response.lock().expect("lock poisoned") = code;
    }

    /// Returns the offsets the consumer attempted to commit, in order.
    #[must_use]
    pub fn commit_attempts(&self) -> Vec<Offset> {
        self.inner.commit_log.lock().expect("lock poisoned").clone()
    }

    /// Returns the offsets the consumer fetched from, in order.
    #[must_use]
    pub fn fetched_from(&self) -> Vec<Offset> {
        self.inner.fetch_log.lock().expect("lock poisoned").clone()
    }

    /// Returns whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn fetch(
        &self,
        _topic: &Topic,
        _partition: PartitionId,
        offset: Offset,
        options: &FetchOptions,
    ) -> BrokerResult<PartitionData> {
        assert!(
            !options.auto_commit,
            "the consumer must force auto_commit off on every fetch"
        );
        self.inner
            .fetch_log
            .lock()
            .expect("lock poisoned")
            .push(offset);

        let outcome = self
            .inner
            .fetch_script
            .lock()
            .expect("lock poisoned")
            .pop_front();

        match outcome {
            Some(FetchOutcome::Records(batch)) => {
                let floor = *self.inner.high_watermark.lock().expect("lock poisoned");
                let tail = batch.last().and_then(|r| r.offset).map_or(floor, Offset::next);
                Ok(PartitionData::ok(batch, tail.max(floor)))
            }
            Some(FetchOutcome::Error(code)) => Ok(PartitionData::error(code)),
            Some(FetchOutcome::Transport) => Err(BrokerError::Transport {
                operation: "fetch",
                message: "scripted transport failure".to_string(),
            }),
            None => {
                // No new data: long-poll like a real broker, then come back
                // empty.
                tokio::time::sleep(Duration::from_millis(u64::from(options.max_wait_ms))).await;
                let floor = *self.inner.high_watermark.lock().expect("lock poisoned");
                Ok(PartitionData::ok(Vec::new(), floor))
            }
        }
    }

    async fn committed_offset(
        &self,
        _group: &GroupId,
        _topic: &Topic,
        _partition: PartitionId,
    ) -> BrokerResult<OffsetFetch> {
        Ok(*self.inner.committed.lock().expect("lock poisoned"))
    }

    async fn commit_offset(
        &self,
        _group: &GroupId,
        _topic: &Topic,
        _partition: PartitionId,
        offset: Offset,
    ) -> BrokerResult<ErrorCode> {
        self.inner
            .commit_log
            .lock()
            .expect("lock poisoned")
            .push(offset);
        Ok(*self.inner.commit_response.lock().expect("lock poisoned"))
    }

    async fn earliest_offset(
        &self,
        _topic: &Topic,
        _partition: PartitionId,
    ) -> BrokerResult<Offset> {
        Ok(*self.inner.earliest.lock().expect("lock poisoned"))
    }

    async fn latest_offset(&self, _topic: &Topic, _partition: PartitionId) -> BrokerResult<Offset> {
        Ok(*self.inner.latest.lock().expect("lock poisoned"))
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out clones of one prepared session.
pub struct ScriptedConnector {
    session: ScriptedSession,
    fail: bool,
    connected_uris: Mutex<Vec<Vec<String>>>,
}

impl ScriptedConnector {
    /// Creates a connector that hands out `session`.
    #[must_use]
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session,
            fail: false,
            connected_uris: Mutex::new(Vec::new()),
        }
    }

    /// Creates a connector whose `connect` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            session: ScriptedSession::new(),
            fail: true,
            connected_uris: Mutex::new(Vec::new()),
        }
    }

    /// Returns the endpoint lists passed to `connect`, in order.
    #[must_use]
    pub fn connected_uris(&self) -> Vec<Vec<String>> {
        self.connected_uris.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&self, uris: &[String]) -> BrokerResult<Self::Session> {
        self.connected_uris
            .lock()
            .expect("lock poisoned")
            .push(uris.to_vec());
        if self.fail {
            return Err(BrokerError::Transport {
                operation: "connect",
                message: "scripted connect failure".to_string(),
            });
        }
        Ok(self.session.clone())
    }
}

/// Builds consecutive records covering `offsets`, one record per offset.
#[must_use]
pub fn records(offsets: std::ops::Range<u64>) -> Vec<Record> {
    offsets
        .map(|offset| Record::new(Offset::new(offset), format!("record-{offset}")))
        .collect()
}
