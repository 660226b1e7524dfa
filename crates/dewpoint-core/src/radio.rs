//! Radio driver boundary.
//!
//! Everything the engine needs from the platform BLE stack, expressed as one
//! async trait so the engine runs against the BlueZ backend in production
//! and scripted in-memory drivers in tests. The driver performs operations;
//! serializing them is the arbiter's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload;

#[cfg(feature = "bluetooth")]
pub mod bluez;

/// A radio operation failed.
///
/// The engine does not distinguish driver sub-errors; connection drops,
/// timeouts, and adapter failures all surface as this single kind.
#[derive(Debug, Clone, Error)]
#[error("radio error: {message}")]
pub struct RadioError {
    /// Driver-supplied description, for logs only.
    pub message: String,
}

impl RadioError {
    /// Wrap a driver failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A specialized result for radio operations.
pub type RadioResult<T> = std::result::Result<T, RadioError>;

/// A short unsolicited broadcast frame emitted by a sensor.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Stable radio address, e.g. `AA:BB:CC:DD:EE:01`.
    pub address: String,
    /// Advertised local name, if the device broadcasts one.
    pub local_name: Option<String>,
    /// Signal strength in dBm at scan time.
    pub rssi: Option<i16>,
    /// Vendor service-data frame, when present.
    pub service_data: Option<Vec<u8>>,
}

/// Opaque handle to an open device connection.
///
/// Exclusively owned by the device's worker; the driver resolves it back to
/// its own connection object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// The sensor channels a device can expose.
///
/// Each channel announces its payload format through a discriminator byte;
/// which channels a device actually carries varies by model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    /// Temperature only.
    Temperature,
    /// Relative humidity only.
    Humidity,
    /// Battery level.
    Battery,
    /// Combined temperature and humidity.
    Combined,
}

impl SensorChannel {
    /// The discriminator byte selecting this channel's payload format.
    #[must_use]
    pub const fn discriminator(self) -> u8 {
        match self {
            Self::Temperature => payload::FORMAT_TEMPERATURE,
            Self::Humidity => payload::FORMAT_HUMIDITY,
            Self::Battery => payload::FORMAT_BATTERY,
            Self::Combined => payload::FORMAT_TEMPERATURE_HUMIDITY,
        }
    }
}

/// Platform radio operations.
///
/// Implementations must be safe to call from multiple tasks, but callers
/// are expected to reach the driver only through the arbiter, which admits
/// one operation sequence at a time.
#[async_trait]
pub trait RadioDriver: Send + Sync + 'static {
    /// Scan for advertisements for at most `timeout`.
    async fn scan(&self, timeout: Duration) -> RadioResult<Vec<Advertisement>>;

    /// Open a connection to the device at `address`.
    async fn connect(&self, address: &str) -> RadioResult<ConnectionHandle>;

    /// Enable a sensor channel. Reads return valid data only after the
    /// settle delay has elapsed.
    async fn enable(&self, handle: ConnectionHandle, channel: SensorChannel) -> RadioResult<()>;

    /// Read the raw payload frame for an enabled channel.
    async fn read(&self, handle: ConnectionHandle, channel: SensorChannel) -> RadioResult<Vec<u8>>;

    /// Disable a sensor channel.
    async fn disable(&self, handle: ConnectionHandle, channel: SensorChannel) -> RadioResult<()>;

    /// Close a connection and invalidate its handle.
    async fn disconnect(&self, handle: ConnectionHandle) -> RadioResult<()>;

    /// Power-cycle the adapter. Only the recovery path calls this.
    async fn reset_adapter(&self) -> RadioResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_discriminators_match_payload_formats() {
        assert_eq!(SensorChannel::Temperature.discriminator(), 0x04);
        assert_eq!(SensorChannel::Humidity.discriminator(), 0x06);
        assert_eq!(SensorChannel::Battery.discriminator(), 0x0A);
        assert_eq!(SensorChannel::Combined.discriminator(), 0x0D);
    }

    #[test]
    fn test_radio_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<RadioError>();
        assert_sync::<RadioError>();
    }
}
