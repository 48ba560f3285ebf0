//! Metric Submission
//!
//! Decouples metric production (per device, at each poller's pace) from metric
//! submission (one fixed cadence for all devices).
//!
//! # Architecture
//!
//! - **Ingestion queue**: bounded `mpsc` channel fed by [`Submitter::update`]
//! - **Snapshot store**: latest [`DeviceMetrics`] per device, owned by the loop task
//! - **Submission tick**: every period the whole store is written to the [`MetricSink`]
//!
//! Snapshots are never evicted. A device whose poller stalled or stopped keeps having
//! its last known values re-submitted on every tick.
//!
//! # Error Handling
//!
//! Sink failures do not interrupt a tick. They are counted, the first one is kept as
//! a sample, and a single [`SubmissionError`] is handed to the error handler once the
//! tick completes. A failed sink flush counts as one more failure of that tick.

use crate::converter::DeviceMetrics;
use crate::error::{SinkError, SubmissionError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const UPDATE_QUEUE_CAPACITY: usize = 16;

/// Sample rate passed with every gauge
pub const SAMPLE_RATE: f64 = 1.0;

/// Destination accepting one named gauge at a time
pub trait MetricSink: Send + Sync {
    fn gauge(
        &self,
        name: &str,
        value: f64,
        tags: &[String],
        sample_rate: f64,
    ) -> Result<(), SinkError>;

    /// Push out anything buffered; called after every tick and on stop
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Receives the aggregated failure of a submission tick
pub type ErrorHandler = Arc<dyn Fn(SubmissionError) + Send + Sync>;

/// Latest metrics per device, in first-seen order
#[derive(Debug, Default, Clone)]
pub struct SnapshotStore {
    devices: Vec<DeviceMetrics>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot of the same device, or append a new one
    pub fn upsert(&mut self, update: DeviceMetrics) {
        match self
            .devices
            .iter_mut()
            .find(|existing| existing.device_name == update.device_name)
        {
            Some(existing) => *existing = update,
            None => self.devices.push(update),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, device_name: &str) -> Option<&DeviceMetrics> {
        self.devices.iter().find(|d| d.device_name == device_name)
    }

    /// Send every metric of every device; returns how many gauges were accepted
    pub fn submit(&self, sink: &dyn MetricSink) -> Result<usize, SubmissionError> {
        let mut submitted = 0;
        let mut failures = 0;
        let mut sample: Option<SinkError> = None;

        for device in &self.devices {
            for metric in &device.entries {
                let value = metric.value as f64;
                match sink.gauge(&metric.name, value, &device.tags, SAMPLE_RATE) {
                    Ok(()) => submitted += 1,
                    Err(e) => {
                        failures += 1;
                        if sample.is_none() {
                            sample = Some(e);
                        }
                    }
                }
            }
        }

        if let Err(e) = sink.flush() {
            failures += 1;
            if sample.is_none() {
                sample = Some(e);
            }
        }

        match sample {
            Some(sample) => Err(SubmissionError {
                count: failures,
                sample,
            }),
            None => Ok(submitted),
        }
    }
}

/// Loop inputs held until [`Submitter::run`] moves them into the task
struct PendingLoop {
    updates: mpsc::Receiver<DeviceMetrics>,
    sink: Arc<dyn MetricSink>,
    on_error: ErrorHandler,
}

pub struct Submitter {
    updates: mpsc::Sender<DeviceMetrics>,
    pending: Mutex<Option<PendingLoop>>,
    stop: CancellationToken,
    exited: CancellationToken,
}

impl Submitter {
    pub fn new(sink: Arc<dyn MetricSink>, on_error: ErrorHandler) -> Self {
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        Self {
            updates: tx,
            pending: Mutex::new(Some(PendingLoop {
                updates: rx,
                sink,
                on_error,
            })),
            stop: CancellationToken::new(),
            exited: CancellationToken::new(),
        }
    }

    fn take_pending(&self) -> Option<PendingLoop> {
        self.pending.lock().ok().and_then(|mut guard| guard.take())
    }

    /// Spawn the submission loop; the first flush happens one period from now
    pub fn run(&self, period: Duration) {
        let Some(pending) = self.take_pending() else {
            warn!("Submitter already running or stopped, ignoring run");
            return;
        };

        let stop = self.stop.clone();
        let exited = self.exited.clone();
        tokio::spawn(async move {
            submit_loop(pending, stop, period).await;
            exited.cancel();
        });
    }

    /// Queue metrics for the next tick
    ///
    /// Waits for queue capacity, unless `ctx` is cancelled first, in which case the
    /// update is dropped.
    pub async fn update(&self, ctx: &CancellationToken, metrics: DeviceMetrics) {
        let device = metrics.device_name.clone();
        tokio::select! {
            result = self.updates.send(metrics) => {
                if result.is_err() {
                    debug!(device = %device, "Submitter stopped, dropping metrics update");
                }
            }
            _ = ctx.cancelled() => {
                debug!(device = %device, "Cancelled before metrics update was queued");
            }
        }
    }

    /// Stop the loop and wait for it to exit
    ///
    /// The store is not submitted one last time; only lines already handed to the
    /// sink are flushed.
    pub async fn stop(&self) {
        self.stop.cancel();
        if self.take_pending().is_some() {
            // Never ran, nothing to wait for.
            self.exited.cancel();
        }
        self.exited.cancelled().await;
        debug!("Submitter stopped");
    }
}

async fn submit_loop(pending: PendingLoop, stop: CancellationToken, period: Duration) {
    let PendingLoop {
        mut updates,
        sink,
        on_error,
    } = pending;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut store = SnapshotStore::new();

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            update = updates.recv() => match update {
                Some(metrics) => {
                    debug!(
                        device = %metrics.device_name,
                        metrics = metrics.entries.len(),
                        "Storing metrics snapshot"
                    );
                    store.upsert(metrics);
                }
                None => break,
            },
            _ = ticker.tick() => match store.submit(sink.as_ref()) {
                Ok(submitted) => debug!(
                    devices = store.len(),
                    submitted,
                    "Submitted metrics"
                ),
                Err(e) => on_error(e),
            },
        }
    }

    if let Err(e) = sink.flush() {
        warn!(error = %e, "statsd client flush failed");
    }
}
