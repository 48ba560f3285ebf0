//! Pipeline Wiring and HTTP Server
//!
//! This module assembles the polling pipeline and exposes the exporter's own metrics.
//!
//! # Architecture
//!
//! - **Pollers**: one background task per configured device, querying smartctl
//! - **Submitter**: one background task flushing the latest snapshots to DogStatsD
//! - **HTTP Server**: Axum-based server exposing `/metrics`, `/health`, and `/`
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to metrics and health
//! - `GET /metrics` - Exporter self-metrics in Prometheus text format
//! - `GET /health` - 200 once any device has been polled successfully, 503 otherwise
//!
//! # Shutdown
//!
//! On SIGINT/SIGTERM the root cancellation token is cancelled. Pollers are stopped
//! first so no producer outlives the submitter, then the submitter is stopped and
//! the HTTP server finishes its graceful shutdown.

use crate::config::Config;
use crate::converter::Converter;
use crate::error::{ExporterError, SubmissionError};
use crate::metrics::{ExporterMetrics, PollOutcome};
use crate::poller::{OnNewDataFn, Poller, QueryDeviceFn};
use crate::smartctl::{Data, SmartctlCommand};
use crate::statsd::StatsdClient;
use crate::submitter::{ErrorHandler, MetricSink, Submitter};
use anyhow::Context;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct AppState {
    metrics: ExporterMetrics,
}

/// Running pollers and submitter
pub struct Pipeline {
    pollers: Vec<Poller>,
    submitter: Arc<Submitter>,
}

impl Pipeline {
    /// Build and start one poller per device plus the submitter
    pub fn start(
        config: &Config,
        sink: Arc<dyn MetricSink>,
        metrics: ExporterMetrics,
        shutdown: &CancellationToken,
    ) -> Self {
        let on_error = submission_error_handler(metrics.clone());
        let submitter = Arc::new(Submitter::new(sink, on_error));
        submitter.run(config.statsd.report_interval());

        let command = Arc::new(config.smartctl.command());
        let query_device = device_querier(command, metrics.clone());

        let pollers = config
            .devices
            .iter()
            .map(|device| {
                let converter = Converter::new(device.converter_config(&config.statsd));
                let poller = Poller::new(
                    Arc::clone(&query_device),
                    data_translator(converter, Arc::clone(&submitter), metrics.clone()),
                    device.path.clone(),
                );
                poller.start(shutdown, config.smartctl.polling_interval());
                poller
            })
            .collect::<Vec<_>>();

        metrics.devices_configured.set(pollers.len() as i64);
        metrics.up.set(1.0);

        Self { pollers, submitter }
    }

    /// Stop all pollers, then the submitter
    pub async fn stop(&self) {
        for poller in &self.pollers {
            poller.stop().await;
        }
        info!("All pollers stopped");
        self.submitter.stop().await;
        info!("Submitter stopped");
    }
}

/// Query function shared by all pollers, logging and recording each outcome
pub fn device_querier(command: Arc<SmartctlCommand>, metrics: ExporterMetrics) -> QueryDeviceFn {
    Arc::new(move |ctx: CancellationToken, device: String| {
        let command = Arc::clone(&command);
        let metrics = metrics.clone();
        async move {
            info!(device = %device, "Querying SMART information");
            let result = command.query_device(&ctx, &device).await;
            match &result {
                Ok(_) => metrics.record_poll(&device, PollOutcome::Success),
                Err(ExporterError::Cancelled) => {
                    debug!(device = %device, "SMART query cancelled");
                    metrics.record_poll(&device, PollOutcome::Cancelled);
                }
                Err(e) => {
                    warn!(device = %device, error = %e, "Querying SMART information failed");
                    metrics.record_poll(&device, PollOutcome::Failure);
                }
            }
            result
        }
        .boxed()
    })
}

/// Callback converting fresh data and queueing it for submission
pub fn data_translator(
    converter: Converter,
    submitter: Arc<Submitter>,
    metrics: ExporterMetrics,
) -> OnNewDataFn {
    let converter = Arc::new(converter);
    Arc::new(move |ctx: CancellationToken, data: Data| {
        let converter = Arc::clone(&converter);
        let submitter = Arc::clone(&submitter);
        let metrics = metrics.clone();
        async move {
            let device_metrics = converter.convert(&data);
            metrics
                .device_metrics_forwarded
                .with_label_values(&[device_metrics.device_name.as_str()])
                .set(device_metrics.entries.len() as i64);
            submitter.update(&ctx, device_metrics).await;
        }
        .boxed()
    })
}

fn submission_error_handler(metrics: ExporterMetrics) -> ErrorHandler {
    Arc::new(move |err: SubmissionError| {
        warn!(failures = err.count, error = %err, "Submitter error");
        metrics.record_submission_failure(err.count);
    })
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let metrics = ExporterMetrics::new()?;
    let sink = StatsdClient::connect(&config.statsd.url).with_context(|| {
        format!("Failed to initialize statsd client for {}", config.statsd.url)
    })?;
    info!("Sending metrics to DogStatsD at {}", sink.target());

    // Bind first: a bad address must not leave pollers running.
    let listener = if config.server.enabled {
        let addr = format!("{}:{}", config.server.addr, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ExporterError::Server(format!("failed to bind {addr}: {e}")))?;
        info!("Metrics server listening on {}", addr);
        info!("Metrics available at http://{}/metrics", addr);
        Some(listener)
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let pipeline = Pipeline::start(&config, Arc::new(sink), metrics.clone(), &shutdown);

    let server = listener.map(|listener| {
        let app = router(AppState {
            metrics: metrics.clone(),
        });
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        })
    });

    wait_for_signal().await;
    shutdown.cancel();
    metrics.up.set(0.0);

    pipeline.stop().await;

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => info!("Metrics server stopped"),
            Ok(Err(e)) => error!("Server error: {}", e),
            Err(e) => error!("Server task failed: {}", e),
        }
    }

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Caught SIGINT, exiting"),
                    _ = sigterm.recv() => info!("Caught SIGTERM, exiting"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Caught signal, exiting");
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>smartctl Exporter</title></head>
<body>
<h1>smartctl DogStatsD Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#,
    )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.metrics.any_poll_succeeded() {
        (axum::http::StatusCode::OK, "OK")
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "No device polled successfully yet",
        )
    }
}
