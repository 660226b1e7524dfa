//! Vendor advertisement payload decoding.
//!
//! Sensors broadcast a fixed-layout service-data frame. One byte in the
//! frame, the discriminator, selects which measurement format follows:
//!
//! | discriminator | format                 | value bytes          |
//! |---------------|------------------------|----------------------|
//! | `0x04`        | temperature            | LE i16 at offset 16  |
//! | `0x06`        | humidity               | LE u16 at offset 16  |
//! | `0x0A`        | battery                | u8 at offset 16      |
//! | `0x0D`        | temperature + humidity | LE i16 at 16, LE u16 at 18 |
//!
//! All values are tenths of a unit. Decoding is pure and touches no shared
//! state; truncated or unrecognized frames are reported as recoverable
//! errors and never panic.

use thiserror::Error;

use crate::measurement::MeasurementSample;

/// Offset of the discriminator byte within the frame.
pub const DISCRIMINATOR_OFFSET: usize = 13;

/// Offset of the first measurement byte within the frame.
const VALUE_OFFSET: usize = 16;

/// Discriminator values for the known payload formats.
pub const FORMAT_TEMPERATURE: u8 = 0x04;
/// Humidity-only format.
pub const FORMAT_HUMIDITY: u8 = 0x06;
/// Battery-level format.
pub const FORMAT_BATTERY: u8 = 0x0A;
/// Combined temperature and humidity format.
pub const FORMAT_TEMPERATURE_HUMIDITY: u8 = 0x0D;

/// A payload could not be decoded. Both variants are transient: the sample
/// is discarded and the next advertisement or read retries naturally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame is shorter than the minimum its discriminator requires.
    #[error("insufficient data: need {needed} bytes, got {actual}")]
    TooShort {
        /// Minimum frame length for the discriminator.
        needed: usize,
        /// Actual frame length.
        actual: usize,
    },

    /// The discriminator does not match any known format.
    #[error("unknown payload format {0:#04x}")]
    UnknownFormat(u8),
}

/// Decode a frame whose format is selected by `discriminator`.
///
/// Returns a partial [`MeasurementSample`] carrying only the fields the
/// format encodes.
///
/// # Errors
///
/// [`DecodeError::TooShort`] if the frame is truncated,
/// [`DecodeError::UnknownFormat`] for an unrecognized discriminator.
pub fn decode(discriminator: u8, frame: &[u8]) -> Result<MeasurementSample, DecodeError> {
    let mut sample = MeasurementSample::default();
    match discriminator {
        FORMAT_TEMPERATURE => {
            sample.temperature = Some(f64::from(le_i16(frame, VALUE_OFFSET)?) / 10.0);
        }
        FORMAT_HUMIDITY => {
            sample.humidity = Some(f64::from(le_u16(frame, VALUE_OFFSET)?) / 10.0);
        }
        FORMAT_BATTERY => {
            sample.battery = Some(f64::from(byte_at(frame, VALUE_OFFSET)?) / 10.0);
        }
        FORMAT_TEMPERATURE_HUMIDITY => {
            sample.temperature = Some(f64::from(le_i16(frame, VALUE_OFFSET)?) / 10.0);
            sample.humidity = Some(f64::from(le_u16(frame, VALUE_OFFSET + 2)?) / 10.0);
        }
        other => return Err(DecodeError::UnknownFormat(other)),
    }
    Ok(sample)
}

/// Decode a frame, reading the discriminator out of the frame itself.
///
/// # Errors
///
/// Same as [`decode`], plus [`DecodeError::TooShort`] when the frame does
/// not even reach the discriminator byte.
pub fn decode_frame(frame: &[u8]) -> Result<MeasurementSample, DecodeError> {
    let discriminator = byte_at(frame, DISCRIMINATOR_OFFSET)?;
    decode(discriminator, frame)
}

fn byte_at(frame: &[u8], offset: usize) -> Result<u8, DecodeError> {
    frame.get(offset).copied().ok_or(DecodeError::TooShort {
        needed: offset + 1,
        actual: frame.len(),
    })
}

fn le_u16(frame: &[u8], offset: usize) -> Result<u16, DecodeError> {
    match frame.get(offset..offset + 2) {
        Some([lo, hi]) => Ok(u16::from_le_bytes([*lo, *hi])),
        _ => Err(DecodeError::TooShort {
            needed: offset + 2,
            actual: frame.len(),
        }),
    }
}

fn le_i16(frame: &[u8], offset: usize) -> Result<i16, DecodeError> {
    le_u16(frame, offset).map(|raw| raw as i16)
}
