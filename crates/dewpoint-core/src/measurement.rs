//! Measurement model shared by the payload decoder, the device workers, and
//! the telemetry sink.

use serde::Serialize;

/// A partial set of physical quantities decoded from a single payload.
///
/// Which fields are present depends on the payload variant; richer device
/// models also report pressure and light. Produced by the decoder, consumed
/// immediately by the owning worker, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeasurementSample {
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Percent relative humidity.
    pub humidity: Option<f64>,
    /// Percent charge.
    pub battery: Option<f64>,
    /// Hectopascals.
    pub pressure: Option<f64>,
    /// Lux.
    pub light: Option<f64>,
}

impl MeasurementSample {
    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.battery.is_none()
            && self.pressure.is_none()
            && self.light.is_none()
    }

    /// Overlay another partial sample onto this one. Fields present in
    /// `other` win; absent fields are left untouched.
    pub fn extend(&mut self, other: &Self) {
        overlay(&mut self.temperature, other.temperature);
        overlay(&mut self.humidity, other.humidity);
        overlay(&mut self.battery, other.battery);
        overlay(&mut self.pressure, other.pressure);
        overlay(&mut self.light, other.light);
    }
}

/// Latest known-good readings for one device.
///
/// A zero or unset field in an incoming sample means "sensor not updated
/// this cycle" and never clobbers a previously known value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorReadings {
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Percent relative humidity.
    pub humidity: Option<f64>,
    /// Percent charge.
    pub battery: Option<f64>,
    /// Hectopascals.
    pub pressure: Option<f64>,
    /// Lux.
    pub light: Option<f64>,
}

impl SensorReadings {
    /// Merge a decoded sample into the stored readings.
    pub fn apply(&mut self, sample: &MeasurementSample) {
        merge(&mut self.temperature, sample.temperature);
        merge(&mut self.humidity, sample.humidity);
        merge(&mut self.battery, sample.battery);
        merge(&mut self.pressure, sample.pressure);
        merge(&mut self.light, sample.light);
    }

    /// Returns `true` if no reading has been recorded yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.battery.is_none()
            && self.pressure.is_none()
            && self.light.is_none()
    }
}

fn overlay(current: &mut Option<f64>, incoming: Option<f64>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

fn merge(current: &mut Option<f64>, incoming: Option<f64>) {
    match incoming {
        Some(value) if value != 0.0 => *current = Some(value),
        _ => {}
    }
}
