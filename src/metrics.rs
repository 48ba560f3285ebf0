//! Exporter Self-Metrics
//!
//! Prometheus metrics describing the exporter itself, served on `/metrics`. The
//! SMART telemetry goes to DogStatsD; these let operators tell a device that
//! cannot be queried apart from a statsd backend that rejects submissions.
//!
//! # Metrics
//!
//! - `smartctl_exporter_up` - 1 once the pipeline is running
//! - `smartctl_exporter_devices_configured` - Number of polled devices
//! - `smartctl_exporter_device_polls_total` - Poll cycles by outcome
//!   - Labels: device, outcome (`success`, `failure`, `cancelled`)
//! - `smartctl_exporter_device_last_success_timestamp_seconds` - Unix time of the last
//!   successful poll
//!   - Labels: device
//! - `smartctl_exporter_device_metrics_forwarded` - Metrics produced by the last poll
//!   - Labels: device
//! - `smartctl_exporter_submission_failed_ticks_total` - Submission ticks with failures
//! - `smartctl_exporter_submission_failures_total` - Individual rejected gauges

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const NAMESPACE: &str = "smartctl_exporter";

/// Outcome label of a poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failure,
    Cancelled,
}

impl PollOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PollOutcome::Success => "success",
            PollOutcome::Failure => "failure",
            PollOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Arc<Registry>,

    pub up: Arc<Gauge>,
    pub devices_configured: Arc<IntGauge>,

    // Polling
    pub device_polls_total: Arc<IntCounterVec>,
    pub device_last_success_timestamp_seconds: Arc<GaugeVec>,
    pub device_metrics_forwarded: Arc<IntGaugeVec>,

    // Submission
    pub submission_failed_ticks_total: Arc<IntCounter>,
    pub submission_failures_total: Arc<IntCounter>,

    any_poll_succeeded: Arc<AtomicBool>,
}

impl ExporterMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let up = Gauge::with_opts(
            Opts::new("up", "Whether the exporter pipeline is running (1=running)")
                .namespace(NAMESPACE),
        )?;

        let devices_configured = IntGauge::with_opts(
            Opts::new("devices_configured", "Number of devices being polled").namespace(NAMESPACE),
        )?;

        let device_polls_total = IntCounterVec::new(
            Opts::new("device_polls_total", "smartctl poll cycles by outcome")
                .namespace(NAMESPACE),
            &["device", "outcome"],
        )?;

        let device_last_success_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "device_last_success_timestamp_seconds",
                "Unix timestamp of the last successful smartctl poll",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let device_metrics_forwarded = IntGaugeVec::new(
            Opts::new(
                "device_metrics_forwarded",
                "Number of metrics produced by the last successful poll",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let submission_failed_ticks_total = IntCounter::with_opts(
            Opts::new(
                "submission_failed_ticks_total",
                "Submission ticks during which at least one gauge was rejected",
            )
            .namespace(NAMESPACE),
        )?;

        let submission_failures_total = IntCounter::with_opts(
            Opts::new(
                "submission_failures_total",
                "Gauges rejected by the statsd sink",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(devices_configured.clone()))?;
        registry.register(Box::new(device_polls_total.clone()))?;
        registry.register(Box::new(device_last_success_timestamp_seconds.clone()))?;
        registry.register(Box::new(device_metrics_forwarded.clone()))?;
        registry.register(Box::new(submission_failed_ticks_total.clone()))?;
        registry.register(Box::new(submission_failures_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            up: Arc::new(up),
            devices_configured: Arc::new(devices_configured),
            device_polls_total: Arc::new(device_polls_total),
            device_last_success_timestamp_seconds: Arc::new(device_last_success_timestamp_seconds),
            device_metrics_forwarded: Arc::new(device_metrics_forwarded),
            submission_failed_ticks_total: Arc::new(submission_failed_ticks_total),
            submission_failures_total: Arc::new(submission_failures_total),
            any_poll_succeeded: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Record the outcome of one poll cycle
    pub fn record_poll(&self, device: &str, outcome: PollOutcome) {
        self.device_polls_total
            .with_label_values(&[device, outcome.as_str()])
            .inc();

        if outcome == PollOutcome::Success {
            self.any_poll_succeeded.store(true, Ordering::Relaxed);
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            self.device_last_success_timestamp_seconds
                .with_label_values(&[device])
                .set(now);
        }
    }

    /// Record an aggregated submission failure
    pub fn record_submission_failure(&self, count: usize) {
        self.submission_failed_ticks_total.inc();
        self.submission_failures_total.inc_by(count as u64);
    }

    /// True once any device has been polled successfully
    pub fn any_poll_succeeded(&self) -> bool {
        self.any_poll_succeeded.load(Ordering::Relaxed)
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create exporter metrics")
    }
}
