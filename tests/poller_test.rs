//! Poller lifecycle tests
//!
//! Run on a paused clock so interval ticks are deterministic.

use futures_util::FutureExt;
use serde_json::json;
use smartctl_exporter::error::{CommandError, ExporterError};
use smartctl_exporter::poller::{OnNewDataFn, Poller, PollerState, QueryDeviceFn};
use smartctl_exporter::smartctl::Data;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(10);

fn sample_data(device: &str) -> Data {
    Data::from_json(&json!({
        "device": {"name": device, "type": "nvme", "protocol": "NVMe"},
        "nvme_smart_health_information_log": {"temperature": 35}
    }))
    .expect("Sample data must parse")
}

/// Counts queries; returns data unless `fail` is set
fn counting_query(queries: Arc<AtomicUsize>, fail: Arc<AtomicBool>) -> QueryDeviceFn {
    Arc::new(move |_ctx: CancellationToken, device: String| {
        let queries = Arc::clone(&queries);
        let fail = Arc::clone(&fail);
        async move {
            queries.fetch_add(1, Ordering::SeqCst);
            if fail.load(Ordering::SeqCst) {
                Err(ExporterError::Command {
                    command: format!("smartctl --json -x {device}"),
                    source: CommandError::Diagnostic("Permission denied".to_string()),
                })
            } else {
                Ok(sample_data(&device))
            }
        }
        .boxed()
    })
}

fn recording_callback(received: Arc<Mutex<Vec<String>>>) -> OnNewDataFn {
    Arc::new(move |_ctx: CancellationToken, data: Data| {
        let received = Arc::clone(&received);
        async move {
            received.lock().unwrap().push(data.device.name);
        }
        .boxed()
    })
}

struct Harness {
    poller: Poller,
    queries: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(device: &str) -> Self {
        let queries = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let received = Arc::new(Mutex::new(Vec::new()));
        let poller = Poller::new(
            counting_query(Arc::clone(&queries), Arc::clone(&fail)),
            recording_callback(Arc::clone(&received)),
            device,
        );
        Self {
            poller,
            queries,
            fail,
            received,
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn received(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_is_immediate() {
    // Given: A freshly started poller
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);

    // When: Letting the task run without advancing past the interval
    settle().await;

    // Then: Exactly one poll happened and its data reached the callback
    assert_eq!(h.poller.state(), PollerState::Running);
    assert_eq!(h.queries(), 1);
    assert_eq!(h.received.lock().unwrap().as_slice(), ["/dev/sda"]);

    h.poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_polls_once_per_interval() {
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);

    // Immediate poll plus ticks at 10s and 20s
    tokio::time::sleep(Duration::from_secs(25)).await;

    assert_eq!(h.queries(), 3);
    assert_eq!(h.received(), 3);

    h.poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_query_skips_callback_and_retries_next_tick() {
    // Given: A query that fails
    let h = Harness::new("/dev/sdb");
    h.fail.store(true, Ordering::SeqCst);
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);

    // When: The first cycle fails
    settle().await;

    // Then: No data is reported and the poller keeps running
    assert_eq!(h.queries(), 1);
    assert_eq!(h.received(), 0);
    assert_eq!(h.poller.state(), PollerState::Running);

    // When: The device recovers before the next tick
    h.fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(INTERVAL).await;

    // Then: The next cycle reports normally
    assert_eq!(h.queries(), 2);
    assert_eq!(h.received(), 1);

    h.poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_polling() {
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);
    settle().await;

    h.poller.stop().await;
    assert_eq!(h.poller.state(), PollerState::Stopped);

    let before = h.queries();
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(h.queries(), before);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);
    settle().await;

    h.poller.stop().await;
    h.poller.stop().await;

    assert_eq!(h.poller.state(), PollerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stops_all_return() {
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);
    settle().await;

    tokio::join!(h.poller.stop(), h.poller.stop(), h.poller.stop());

    assert_eq!(h.poller.state(), PollerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_poller() {
    // Given: A running poller
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);
    settle().await;

    // When: The caller's token is cancelled
    ctx.cancel();
    settle().await;

    // Then: The task has exited on its own and stop returns at once
    assert_eq!(h.poller.state(), PollerState::Stopped);
    h.poller.stop().await;

    let before = h.queries();
    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.queries(), before);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start() {
    // Given: A poller that was never started
    let h = Harness::new("/dev/sda");

    // When: Stopping it
    h.poller.stop().await;

    // Then: It is stopped and a later start is ignored
    assert_eq!(h.poller.state(), PollerState::Stopped);

    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);
    settle().await;
    assert_eq!(h.queries(), 0);
    assert_eq!(h.poller.state(), PollerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored() {
    let h = Harness::new("/dev/sda");
    let ctx = CancellationToken::new();
    h.poller.start(&ctx, INTERVAL);
    h.poller.start(&ctx, Duration::from_secs(1));

    tokio::time::sleep(Duration::from_secs(5)).await;

    // Only the first start's interval applies
    assert_eq!(h.queries(), 1);
    assert_eq!(h.poller.device(), "/dev/sda");

    h.poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_callback_receives_cancellable_context() {
    // Given: A callback that blocks until its context is cancelled
    let finished = Arc::new(AtomicBool::new(false));
    let on_new_data: OnNewDataFn = {
        let finished = Arc::clone(&finished);
        Arc::new(move |ctx: CancellationToken, _data: Data| {
            let finished = Arc::clone(&finished);
            async move {
                ctx.cancelled().await;
                finished.store(true, Ordering::SeqCst);
            }
            .boxed()
        })
    };
    let poller = Poller::new(
        counting_query(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicBool::new(false))),
        on_new_data,
        "/dev/sda",
    );
    let ctx = CancellationToken::new();
    poller.start(&ctx, INTERVAL);
    settle().await;

    // When: Stopping while the callback is in flight
    poller.stop().await;

    // Then: The callback observed the cancellation before stop returned
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(poller.state(), PollerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_passes_through_stopping() {
    // Given: A poller whose query ignores cancellation and takes a minute
    let on_new_data = recording_callback(Arc::new(Mutex::new(Vec::new())));
    let query: QueryDeviceFn = Arc::new(|_ctx: CancellationToken, device: String| {
        async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(sample_data(&device))
        }
        .boxed()
    });
    let poller = Poller::new(query, on_new_data, "/dev/sda");
    let ctx = CancellationToken::new();
    poller.start(&ctx, INTERVAL);
    settle().await;

    // When: The caller's token is cancelled mid-query
    ctx.cancel();
    settle().await;

    // Then: The poller reports Stopping until the query returns
    assert_eq!(poller.state(), PollerState::Stopping);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(poller.state(), PollerState::Stopped);
    poller.stop().await;
}
