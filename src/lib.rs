//! smartctl DogStatsD Exporter
//!
//! Periodically queries disk health telemetry with `smartctl` and ships selected
//! attributes as tagged gauges to a DogStatsD agent.
//!
//! # Overview
//!
//! Each configured device gets its own poller running `smartctl --json -x`. The JSON
//! output is normalized per protocol (ATA or NVMe), the configured attributes are
//! turned into metrics, and a single submitter flushes the latest snapshot of every
//! device on its own schedule. A failed query or submission only affects its own
//! cycle; the next scheduled cycle starts from scratch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  query   ┌──────────┐  JSON  ┌───────────┐  Data  ┌───────────┐
//! │  Poller  │ ───────► │ smartctl │ ─────► │ Extractor │ ─────► │ Converter │
//! │ (device) │          └──────────┘        └───────────┘        └─────┬─────┘
//! └──────────┘                                                         │ DeviceMetrics
//!                                                                      ▼
//!                      ┌───────────┐   gauges (UDP)   ┌───────────┐
//!                      │ DogStatsD │ ◄─────────────── │ Submitter │
//!                      └───────────┘                  └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`smartctl`] - Command execution and JSON extraction
//! - [`converter`] - Attribute selection, metric naming and tags
//! - [`poller`] - Per-device polling task
//! - [`submitter`] - Snapshot store and periodic submission
//! - [`statsd`] - DogStatsD UDP sink
//! - [`metrics`] - Exporter self-metrics (Prometheus)
//! - [`server`] - Pipeline wiring and HTTP server
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use smartctl_exporter::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     server::start(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod server;
pub mod smartctl;
pub mod statsd;
pub mod submitter;
