use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("command {command} failed: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("query cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single smartctl invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("process error: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("timed out after {0:?}, process killed")]
    TimedOut(Duration),

    #[error("{0}")]
    Exit(ExitStatus),

    #[error("{output} (error: {status})")]
    ExitWithOutput { status: ExitStatus, output: String },

    /// Messages reported by smartctl itself, joined with `"; "`.
    #[error("{0}")]
    Diagnostic(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("undetected device protocol, empty or missing device.protocol JSON field")]
    UndetectedProtocol,

    #[error("unsupported device protocol {0} (expected ATA or NVMe)")]
    UnsupportedProtocol(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("statsd IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("statsd client error: {0}")]
    Client(#[from] cadence::MetricError),

    #[error("invalid metric {name}: {reason}")]
    InvalidMetric { name: String, reason: String },
}

/// All sink failures of one submission tick, folded into one report.
#[derive(Debug, Error)]
#[error("statsd submission failed {count} times, sample error: {sample}")]
pub struct SubmissionError {
    pub count: usize,
    #[source]
    pub sample: SinkError,
}

pub type Result<T> = std::result::Result<T, ExporterError>;
