//! Unified error type for the engine.
//!
//! Each boundary keeps its own error type (`RadioError`, `DecodeError`,
//! `ConfigError`, `StoreError`, `TelemetryError`); this module folds them
//! into one enum for callers that cross boundaries, with classification
//! helpers for the propagation policy: decode and telemetry failures are
//! transient log-lines, radio failures retire a worker, and nothing here is
//! fatal to the process.

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::StoreError;
use crate::payload::DecodeError;
use crate::radio::RadioError;
use crate::telemetry::TelemetryError;

/// Any failure the engine can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// A radio operation failed. Terminal for the worker that hit it.
    #[error(transparent)]
    Radio(#[from] RadioError),

    /// A payload could not be decoded. The sample is discarded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A telemetry publish failed. The next cycle retries naturally.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// A low-level I/O error occurred.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this error came from the radio layer.
    #[inline]
    #[must_use]
    pub const fn is_radio(&self) -> bool {
        matches!(self, Self::Radio(_))
    }

    /// Returns `true` if this error is transient: the operation is dropped
    /// and the next cycle retries with fresh data.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Telemetry(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
