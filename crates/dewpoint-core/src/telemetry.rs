//! Telemetry sink boundary.
//!
//! Publishing is fire-and-forget from the worker's perspective: a delivery
//! failure is logged and the next cycle retries with fresh data. The actual
//! cloud client lives behind this trait.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::measurement::SensorReadings;

/// A publish attempt failed. Never escalated past a log line.
#[derive(Debug, Clone, Error)]
#[error("telemetry publish failed: {message}")]
pub struct TelemetryError {
    /// Sink-supplied description, for logs only.
    pub message: String,
}

impl TelemetryError {
    /// Wrap a sink failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outbound measurement delivery.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Publish the latest merged readings under the device's credentials.
    async fn publish(
        &self,
        channel_id: &str,
        write_key: &str,
        readings: &SensorReadings,
    ) -> Result<(), TelemetryError>;
}

/// Sink for deployments without a configured uplink: writes each sample to
/// the log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn publish(
        &self,
        channel_id: &str,
        _write_key: &str,
        readings: &SensorReadings,
    ) -> Result<(), TelemetryError> {
        info!(
            channel_id,
            temperature = readings.temperature,
            humidity = readings.humidity,
            battery = readings.battery,
            pressure = readings.pressure,
            light = readings.light,
            "publishing readings"
        );
        Ok(())
    }
}
