//! DogStatsD Client
//!
//! Gauges are written through a [`cadence`] client backed by a buffered UDP sink,
//! producing lines in the DogStatsD format:
//!
//! ```text
//! smartctl.ata_smart_attributes.temperature_celsius:26|g|#device_name:/dev/sda,model_name:WDC
//! ```
//!
//! Lines are batched into datagrams. The buffer is flushed once per submission tick
//! and when the submitter stops.

use crate::error::SinkError;
use crate::submitter::MetricSink;
use cadence::prelude::*;
use cadence::{BufferedUdpMetricSink, StatsdClient as CadenceClient};
use std::net::UdpSocket;
use tracing::debug;

/// Datagram buffer size; stays below common MTUs
const BUFFER_CAPACITY: usize = 1432;

pub struct StatsdClient {
    client: CadenceClient,
    target: String,
}

impl StatsdClient {
    /// Bind an ephemeral local socket sending to `host:port`
    pub fn connect(target: &str) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_nonblocking(true)?;
        let sink = BufferedUdpMetricSink::with_capacity(target, socket, BUFFER_CAPACITY)?;

        // Names arrive fully prefixed from the converter.
        let client = CadenceClient::from_sink("", sink);
        debug!(target, "DogStatsD client connected");
        Ok(Self {
            client,
            target: target.to_string(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl MetricSink for StatsdClient {
    fn gauge(
        &self,
        name: &str,
        value: f64,
        tags: &[String],
        sample_rate: f64,
    ) -> Result<(), SinkError> {
        validate_gauge(name, value, sample_rate)?;

        let mut builder = self.client.gauge_with_tags(name, value);
        for tag in tags {
            builder = match tag.split_once(':') {
                Some((key, val)) => builder.with_tag(key, val),
                None => builder.with_tag_value(tag),
            };
        }
        builder.try_send()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.client.flush()?;
        Ok(())
    }
}

/// Reject gauges the DogStatsD line format cannot carry
///
/// Gauges are never sampled by the agent, so only a rate of exactly 1.0 is accepted.
pub fn validate_gauge(name: &str, value: f64, sample_rate: f64) -> Result<(), SinkError> {
    let invalid = |reason: &str| SinkError::InvalidMetric {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty metric name"));
    }
    if name.contains([':', '|', '@', '\n']) {
        return Err(invalid("metric name contains a reserved character"));
    }
    if !value.is_finite() {
        return Err(invalid("value is not finite"));
    }
    if sample_rate != 1.0 {
        return Err(invalid("gauges do not support sampling"));
    }
    Ok(())
}
