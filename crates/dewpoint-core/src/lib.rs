//! # dewpoint-core
//!
//! Discovery and fault-tolerant polling engine for BLE environmental
//! sensors.
//!
//! The engine scans for sensors matching a configured advertisement
//! signature, runs one polling worker per discovered device, decodes the
//! vendor payloads into physical measurements, and relays them to a
//! telemetry sink using per-device credentials from a small key-value
//! store. It is built around an unreliable radio: device faults retire the
//! device's worker for rediscovery, and sustained faults across devices
//! power-cycle the adapter.
//!
//! ## Architecture
//!
//! - [`payload`] - pure decoding of vendor payload frames
//! - [`measurement`] - measurement samples and merge semantics
//! - [`radio`] - the platform radio driver boundary (BlueZ behind the
//!   `bluetooth` feature)
//! - [`arbiter`] - exclusive, one-operation-at-a-time radio access
//! - [`worker`] - the per-device polling state machine
//! - [`registry`] - the tracked-device set and the discovery scanner
//! - [`supervisor`] - systemic fault detection and adapter recovery
//! - [`credentials`] - credential gateway over the key-value store
//! - [`telemetry`] - the outbound sink boundary
//! - [`engine`] - assembly of all of the above
//! - [`config`] - engine configuration loading and validation
//! - [`error`] - the unified error type

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod arbiter;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod measurement;
pub mod payload;
pub mod radio;
pub mod registry;
pub mod supervisor;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export primary types for convenience
pub use arbiter::{RadioArbiter, RadioGuard};
pub use config::{ConfigError, DeviceSignature, EngineConfig};
pub use credentials::{
    CredentialGateway, Credentials, FileStore, KeyValueStore, MemoryStore, StoreError,
};
pub use engine::{Engine, EngineHandle};
pub use error::{Error, Result};
pub use measurement::{MeasurementSample, SensorReadings};
pub use payload::{decode, decode_frame, DecodeError};
pub use radio::{
    Advertisement, ConnectionHandle, RadioDriver, RadioError, RadioResult, SensorChannel,
};
pub use registry::{
    DeviceHealth, DeviceRegistry, DeviceState, RegistryGuard, Scanner, SharedDeviceState,
};
pub use supervisor::RecoverySupervisor;
pub use telemetry::{LogSink, TelemetryError, TelemetrySink};
pub use worker::{DeviceWorker, WorkerContext, WorkerHandle};

#[cfg(feature = "bluetooth")]
pub use radio::bluez::BluezRadio;
