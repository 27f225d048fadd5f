//! End-to-end delivery scenarios over a real store.

use fieldlog_core::{Event, MemorySink, SeqNo, Timestamp};
use fieldlog_sync_engine::{
    ChannelError, MockChannel, RetryConfig, SyncConfig, SyncEngine, SyncOutcome,
};
use fieldlog_testkit::{config_for, marker_flash, open_store, ring_flash, volt};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[test]
fn ack_crash_recover_retries_the_unacked_suffix() {
    init_tracing();
    let config = config_for(4, 2);
    let ring = ring_flash(&config);
    let marker = marker_flash();
    let sink = Arc::new(MemorySink::new());

    // Session one: append three records, remote acks up to 2
    {
        let store = Arc::new(open_store(
            ring.clone(),
            marker.clone(),
            config.clone(),
            sink.clone(),
        ));
        for i in 0..3 {
            store
                .append(Timestamp::from_millis(i), 0, &volt(3_300))
                .unwrap();
        }

        let channel = MockChannel::new();
        channel.enqueue_ack_up_to(SeqNo::new(2));
        let engine = SyncEngine::new(store.clone(), channel, SyncConfig::default(), sink.clone());

        let outcome = engine.run_once(Timestamp::from_millis(10)).unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Delivered {
                up_to: SeqNo::new(2),
                count: 2
            }
        );

        let cursors = store.cursors();
        assert_eq!(cursors.ack, SeqNo::new(2));
        assert_eq!(cursors.sync, SeqNo::new(3));
    }

    // Session two (after reboot): records 2 and 3 are the retry window
    let store = Arc::new(open_store(ring, marker, config, sink.clone()));
    let cursors = store.cursors();
    assert_eq!(cursors.ack, SeqNo::new(2));
    assert_eq!(cursors.sync, SeqNo::new(3));

    let records = store.read_range(SeqNo::new(1), 10).unwrap();
    let seqs: Vec<u64> = records.iter().map(|r| r.seq.as_u64()).collect();
    assert_eq!(seqs, vec![3]);

    // Delivery resumes at-least-once from the acknowledged cursor
    let engine = SyncEngine::new(store.clone(), MockChannel::new(), SyncConfig::default(), sink);
    let outcome = engine.run_once(Timestamp::from_millis(20)).unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Delivered {
            up_to: SeqNo::new(3),
            count: 1
        }
    );
    assert_eq!(store.cursors().ack, SeqNo::new(3));
}

#[test]
fn five_transient_failures_back_off_bounded_and_non_decreasing() {
    init_tracing();
    let config = config_for(4, 4);
    let (store, _, _) = fieldlog_testkit::fresh_store(config);
    let store = Arc::new(store);
    for i in 0..3 {
        store
            .append(Timestamp::from_millis(i), 0, &volt(1_000))
            .unwrap();
    }

    let channel = MockChannel::new();
    for _ in 0..5 {
        channel.enqueue_failure(ChannelError::Timeout);
    }

    let sink = Arc::new(MemorySink::new());
    let engine = SyncEngine::new(
        store.clone(),
        channel,
        SyncConfig::new().with_retry(
            RetryConfig::new()
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(30)),
        ),
        sink,
    );

    let cap = Duration::from_secs(30);
    let mut now = Timestamp::from_millis(0);
    let mut delays: Vec<Duration> = Vec::new();

    for _ in 0..5 {
        match engine.run_once(now).unwrap() {
            SyncOutcome::Backoff { until, .. } => {
                delays.push(until.saturating_since(now));
                now = until;
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The cursor never moves on failure
        assert_eq!(store.cursors().sync, SeqNo::new(1));
        assert_eq!(store.cursors().ack, SeqNo::ZERO);
    }

    for pair in delays.windows(2) {
        assert!(pair[0] <= pair[1], "delays decreased: {delays:?}");
    }
    for delay in &delays {
        assert!(*delay <= cap, "delay {delay:?} above the cap");
    }

    // The sixth attempt succeeds and clears the backlog
    let outcome = engine.run_once(now).unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Delivered {
            up_to: SeqNo::new(3),
            count: 3
        }
    );
}

#[test]
fn sync_cursor_never_passes_unacknowledged_records() {
    init_tracing();
    let config = config_for(4, 4);
    let (store, _, _) = fieldlog_testkit::fresh_store(config);
    let store = Arc::new(store);
    for i in 0..8 {
        store
            .append(Timestamp::from_millis(i), 0, &volt(2_000))
            .unwrap();
    }

    let channel = MockChannel::new();
    // Batches of 2: ack, fail, ack, fail...
    channel.enqueue_ack_up_to(SeqNo::new(2));
    channel.enqueue_failure(ChannelError::Disconnected);
    channel.enqueue_ack_up_to(SeqNo::new(4));

    let sink = Arc::new(MemorySink::new());
    let engine = SyncEngine::new(
        store.clone(),
        channel,
        SyncConfig::new()
            .batch_size(2)
            .with_retry(RetryConfig::new().no_jitter()),
        sink,
    );

    let mut now = Timestamp::from_millis(0);
    for _ in 0..8 {
        let cursors = store.cursors();
        assert!(cursors.sync <= cursors.ack.next(), "sync ran ahead of ack");
        match engine.run_once(now).unwrap() {
            SyncOutcome::Backoff { until, .. } | SyncOutcome::Waiting { until } => now = until,
            SyncOutcome::Idle => break,
            _ => {}
        }
    }

    assert_eq!(store.cursors().ack, SeqNo::new(8));
    assert_eq!(store.cursors().sync, SeqNo::new(9));
}

#[test]
fn skipped_window_is_reported_and_ring_drains() {
    init_tracing();
    let config = config_for(2, 2);
    let (store, _, _) = fieldlog_testkit::fresh_store(config);
    let store = Arc::new(store);

    // Fill the ring completely
    for i in 0..4 {
        store
            .append(Timestamp::from_millis(i), 0, &volt(500))
            .unwrap();
    }
    assert!(store.append(Timestamp::from_millis(9), 0, &volt(500)).is_err());

    let channel = MockChannel::new();
    channel.enqueue_failure(ChannelError::Rejected {
        reason: "unsupported schema".into(),
    });

    let sink = Arc::new(MemorySink::new());
    let engine = SyncEngine::new(
        store.clone(),
        channel,
        SyncConfig::new()
            .batch_size(4)
            .reject_budget(1)
            .with_retry(RetryConfig::new().no_jitter()),
        sink.clone(),
    );

    let outcome = engine.run_once(Timestamp::from_millis(0)).unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Skipped {
            from: SeqNo::new(1),
            to: SeqNo::new(4)
        }
    );

    // The loss is documented, and the ring accepts appends again
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, Event::WindowSkipped { from, to }
            if *from == SeqNo::new(1) && *to == SeqNo::new(4))));
    assert!(store.append(Timestamp::from_millis(10), 0, &volt(500)).is_ok());
}
