//! Exclusive access to the radio.
//!
//! The adapter cannot perform concurrent operations; interleaved scans and
//! reads corrupt results at the driver layer. The arbiter owns the driver
//! behind an async mutex, so the only way to reach the radio is to hold the
//! guard: exclusivity holds by construction, and the guard drop releases it
//! on every exit path, including failure.

use std::ops::Deref;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::radio::RadioDriver;

/// Serializes all radio operations behind a single exclusive section.
pub struct RadioArbiter {
    driver: Mutex<Box<dyn RadioDriver>>,
    settle: Duration,
}

impl RadioArbiter {
    /// Take ownership of the driver.
    ///
    /// `settle` is the hardware's minimum wait between enabling a sensor
    /// channel and reading it.
    pub fn new(driver: Box<dyn RadioDriver>, settle: Duration) -> Self {
        Self {
            driver: Mutex::new(driver),
            settle,
        }
    }

    /// Acquire the radio for a whole operation sequence.
    ///
    /// Hold the guard for the full sequence, settle delay included. Callers
    /// must not await a worker's exit while holding it.
    pub async fn lock(&self) -> RadioGuard<'_> {
        RadioGuard {
            driver: self.driver.lock().await,
            settle: self.settle,
        }
    }
}

/// Exclusive hold on the radio, dereferencing to the driver.
pub struct RadioGuard<'a> {
    driver: MutexGuard<'a, Box<dyn RadioDriver>>,
    settle: Duration,
}

impl RadioGuard<'_> {
    /// Wait out the post-enable settle delay without releasing the radio.
    pub async fn settle(&self) {
        tokio::time::sleep(self.settle).await;
    }
}

impl Deref for RadioGuard<'_> {
    type Target = dyn RadioDriver;

    fn deref(&self) -> &Self::Target {
        self.driver.as_ref()
    }
}
