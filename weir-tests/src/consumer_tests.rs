//! End-to-end partition consumer scenarios.
//!
//! Each test wires a consumer to a scripted session and drives it through
//! one story: cold start, commit bounds, offset reset, external commits,
//! termination, and the fatal paths.

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::uninlined_format_args)]

use weir_consumer::{
    AutoOffsetReset, CommitStrategy, ConsumerError, ConsumerOptions, StartError,
    SubscriberContext,
};
use weir_core::{ErrorCode, Offset};

use crate::scenarios::{
    eventually, settle, start_harness, try_start_harness, GROUP, PARTITION, TOPIC,
};
use crate::scripted_session::{ScriptedConnector, ScriptedSession};

fn options() -> ConsumerOptions {
    ConsumerOptions::for_testing()
}

#[tokio::test]
async fn test_cold_start_serves_first_demand() {
    let session = ScriptedSession::new()
        .with_committed(0)
        .then_records(0..10)
        .then_records(10..13);

    let harness = start_harness(session, options(), 10).await;

    eventually("first batch delivered", || {
        harness.delivered.record_count() == 10
    })
    .await;

    // Threshold is 100 and the interval has not elapsed: no commit yet.
    assert_eq!(harness.delivered.offsets(), (0..10).collect::<Vec<_>>());
    assert!(harness.session.commit_attempts().is_empty());

    // The cursor moved to 10: the next demand fetches from there.
    harness.handle.demand(3).await.unwrap();
    eventually("second batch delivered", || {
        harness.delivered.record_count() == 13
    })
    .await;
    assert_eq!(
        harness.session.fetched_from()[..2],
        [Offset::new(0), Offset::new(10)]
    );
    assert!(harness.session.commit_attempts().is_empty());
}

#[tokio::test]
async fn test_async_commit_on_threshold() {
    let session = ScriptedSession::new().with_committed(0).then_records(0..5);
    let opts = options()
        .with_commit_threshold(5)
        .with_commit_interval(std::time::Duration::from_secs(60));

    let harness = start_harness(session, opts, 20).await;

    eventually("threshold commit", || {
        harness.session.commit_attempts() == vec![Offset::new(5)]
    })
    .await;
    assert_eq!(harness.delivered.record_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_async_commit_on_interval() {
    let session = ScriptedSession::new().with_committed(0).then_records(0..3);
    let opts = options()
        .with_commit_threshold(1000)
        .with_commit_interval(std::time::Duration::from_millis(100));

    let harness = start_harness(session, opts, 10).await;

    eventually("batch delivered", || harness.delivered.record_count() == 3).await;
    assert!(harness.session.commit_attempts().is_empty());

    // Demand is unsatisfied, so the consumer keeps polling; once the interval
    // elapses, the next empty fetch flushes the pending progress.
    eventually("interval commit", || {
        harness.session.commit_attempts().first() == Some(&Offset::new(3))
    })
    .await;
}

#[tokio::test]
async fn test_offset_reset_earliest() {
    let session = ScriptedSession::new()
        .with_committed(50)
        .with_earliest(100)
        .then_error(ErrorCode::OffsetOutOfRange)
        .then_records(100..105);
    let opts = options().with_auto_offset_reset(AutoOffsetReset::Earliest);

    let harness = start_harness(session, opts, 5).await;

    eventually("records after reset", || {
        harness.delivered.record_count() == 5
    })
    .await;

    // The reset step emitted nothing; the next fetch restarted at 100.
    assert_eq!(
        harness.session.fetched_from()[..2],
        [Offset::new(50), Offset::new(100)]
    );
    assert_eq!(harness.delivered.offsets(), (100..105).collect::<Vec<_>>());
    assert!(harness.session.commit_attempts().is_empty());

    // Committed was reset to 100, so stopping flushes acked=105.
    harness.handle.stop().await.unwrap();
    assert_eq!(harness.session.commit_attempts(), vec![Offset::new(105)]);
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_offset_reset_disabled_is_fatal() {
    let session = ScriptedSession::new()
        .with_committed(50)
        .then_error(ErrorCode::OffsetOutOfRange);

    let harness = start_harness(session, options(), 1).await;

    let result = harness.task.await.unwrap();
    assert!(matches!(
        result,
        Err(ConsumerError::OffsetOutOfRange { offset, .. }) if offset == Offset::new(50)
    ));
    assert!(harness.session.is_closed());
}

#[tokio::test]
async fn test_trigger_commit_raises_ack() {
    let session = ScriptedSession::new().with_committed(20);
    let harness = start_harness(session, options(), 0).await;

    // A zero-demand signal still performs the initial offset load.
    harness.handle.demand(0).await.unwrap();
    settle().await;
    assert!(harness.session.fetched_from().is_empty());

    harness
        .handle
        .trigger_commit(CommitStrategy::Sync, Offset::new(30))
        .await
        .unwrap();
    eventually("external commit", || {
        harness.session.commit_attempts() == vec![Offset::new(30)]
    })
    .await;

    // At or below the ack watermark: idempotent, no further commits.
    harness
        .handle
        .trigger_commit(CommitStrategy::Sync, Offset::new(25))
        .await
        .unwrap();
    harness
        .handle
        .trigger_commit(CommitStrategy::Sync, Offset::new(30))
        .await
        .unwrap();
    settle().await;
    assert_eq!(harness.session.commit_attempts(), vec![Offset::new(30)]);
}

#[tokio::test]
async fn test_final_commit_on_stop() {
    let session = ScriptedSession::new().with_committed(40).then_records(40..42);
    let harness = start_harness(session, options(), 2).await;

    eventually("batch delivered", || harness.delivered.record_count() == 2).await;
    assert!(harness.session.commit_attempts().is_empty());

    harness.handle.stop().await.unwrap();

    assert_eq!(harness.session.commit_attempts(), vec![Offset::new(42)]);
    assert!(harness.session.is_closed());
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_initial_load_falls_back_to_earliest() {
    let session = ScriptedSession::new()
        .with_committed_error(ErrorCode::UnknownTopicOrPartition)
        .with_earliest(7)
        .then_records(7..8);

    let harness = start_harness(session, options(), 1).await;

    eventually("record delivered", || harness.delivered.record_count() == 1).await;
    assert_eq!(harness.session.fetched_from()[..1], [Offset::new(7)]);
}

#[tokio::test]
async fn test_initial_load_fatal_on_unexpected_error() {
    let session = ScriptedSession::new().with_committed_error(ErrorCode::Unknown(42));
    let harness = start_harness(session, options(), 1).await;

    let result = harness.task.await.unwrap();
    assert!(matches!(
        result,
        Err(ConsumerError::OffsetLoad { code: ErrorCode::Unknown(42), .. })
    ));
    assert!(harness.session.is_closed());
}

#[tokio::test]
async fn test_connect_failure_fails_start() {
    let connector = ScriptedConnector::failing();
    let result = weir_consumer::start(
        &connector,
        GROUP,
        TOPIC,
        PARTITION,
        |_ctx: SubscriberContext| tokio::spawn(async {}),
        options(),
    )
    .await;

    assert!(matches!(result, Err(StartError::Connect(_))));
    assert_eq!(
        connector.connected_uris(),
        vec![vec!["localhost:9092".to_string()]]
    );
}

#[tokio::test]
async fn test_transient_fetch_errors_retry_in_place() {
    let session = ScriptedSession::new()
        .with_committed(0)
        .then_transport_error()
        .then_error(ErrorCode::NotLeaderForPartition)
        .then_records(0..2);

    let harness = start_harness(session, options(), 2).await;

    eventually("records after retries", || {
        harness.delivered.record_count() == 2
    })
    .await;
    // Three fetches, all from the same unmoved cursor.
    assert_eq!(
        harness.session.fetched_from()[..3],
        [Offset::new(0), Offset::new(0), Offset::new(0)]
    );
}

#[tokio::test]
async fn test_unrecoverable_fetch_error_is_fatal() {
    let session = ScriptedSession::new()
        .with_committed(0)
        .then_error(ErrorCode::Unknown(99));

    let harness = start_harness(session, options(), 1).await;

    let result = harness.task.await.unwrap();
    assert!(matches!(
        result,
        Err(ConsumerError::Fetch { code: ErrorCode::Unknown(99), .. })
    ));
    assert!(harness.session.is_closed());
}

#[tokio::test]
async fn test_subscriber_finishing_stops_consumer() {
    let session = ScriptedSession::new().with_committed(0).then_records(0..1);
    let connector = ScriptedConnector::new(session.clone());

    // A subscriber that takes one batch and returns.
    let (handle, task) = weir_consumer::start(
        &connector,
        GROUP,
        TOPIC,
        PARTITION,
        |ctx: SubscriberContext| {
            tokio::spawn(async move {
                let SubscriberContext {
                    consumer,
                    mut deliveries,
                    ..
                } = ctx;
                consumer.demand(1).await.unwrap();
                let _ = deliveries.recv().await;
            })
        },
        options(),
    )
    .await
    .unwrap();

    assert!(task.await.unwrap().is_ok());
    assert!(session.is_closed());
    drop(handle);
}

#[tokio::test]
async fn test_subscriber_panic_terminates_consumer() {
    let session = ScriptedSession::new().with_committed(0);
    let connector = ScriptedConnector::new(session.clone());

    let (_handle, task) = weir_consumer::start(
        &connector,
        GROUP,
        TOPIC,
        PARTITION,
        |_ctx: SubscriberContext| tokio::spawn(async { panic!("subscriber crash") }),
        options(),
    )
    .await
    .unwrap();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ConsumerError::SubscriberDied { .. })));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_delivery_order_and_demand_bound() {
    let session = ScriptedSession::new()
        .with_committed(0)
        .then_records(0..4)
        .then_records(4..9);

    let harness = start_harness(session, options(), 9).await;

    eventually("all records delivered", || {
        harness.delivered.record_count() == 9
    })
    .await;

    let offsets = harness.delivered.offsets();
    assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
    // Never more records than cumulative demand.
    assert!(harness.delivered.record_count() as u64 <= 9);
}

#[tokio::test]
async fn test_zero_demand_never_fetches() {
    let session = ScriptedSession::new().with_committed(0);
    let harness = start_harness(session, options(), 0).await;

    harness.handle.demand(0).await.unwrap();
    settle().await;

    assert!(harness.session.fetched_from().is_empty());
    assert!(harness.delivered.batches().is_empty());
}

#[tokio::test]
async fn test_partition_query() {
    let session = ScriptedSession::new();
    let harness = start_harness(session, options(), 0).await;

    let tp = harness.handle.partition();
    assert_eq!(tp.topic.as_str(), TOPIC);
    assert_eq!(tp.partition, PARTITION);
}
