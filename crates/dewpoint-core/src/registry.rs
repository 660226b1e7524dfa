//! Device registry and discovery scanner.
//!
//! The registry is the single tracked-device set: the scanner adds devices
//! as advertisements arrive, the supervisor removes them in bulk during
//! recovery. Both hold the registry lock for the whole mutation, worker
//! spawn/stop included, so at most one worker ever owns an address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeviceSignature, EngineConfig};
use crate::error::Result;
use crate::measurement::SensorReadings;
use crate::radio::Advertisement;
use crate::worker::{DeviceWorker, WorkerContext, WorkerHandle};

/// Health of a tracked device, written by its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHealth {
    /// Polling normally.
    Healthy,
    /// The worker hit a device fault and retired itself; the next scan
    /// pass recreates the device.
    NeedsRefresh,
    /// The device is gone for good and must not be recreated.
    Dead,
}

impl DeviceHealth {
    /// Returns `true` if the device should be torn down and rediscovered.
    #[must_use]
    pub const fn needs_refresh(self) -> bool {
        matches!(self, Self::NeedsRefresh | Self::Dead)
    }
}

/// Mutable per-device state.
///
/// The owning worker is the sole writer; the registry and supervisor read
/// under the shared lock.
#[derive(Debug)]
pub struct DeviceState {
    /// Latest known-good readings.
    pub readings: SensorReadings,
    /// Worker-reported health.
    pub health: DeviceHealth,
    /// Signal strength recorded at discovery, informational only.
    pub signal_strength: Option<i16>,
    /// When the device was last discovered.
    pub discovered_at: DateTime<Utc>,
}

impl DeviceState {
    pub(crate) fn new(signal_strength: Option<i16>) -> Self {
        Self {
            readings: SensorReadings::default(),
            health: DeviceHealth::Healthy,
            signal_strength,
            discovered_at: Utc::now(),
        }
    }
}

/// Shared handle to one device's state.
pub type SharedDeviceState = Arc<RwLock<DeviceState>>;

struct TrackedDevice {
    state: SharedDeviceState,
    worker: WorkerHandle,
}

/// The set of currently tracked devices.
#[derive(Default)]
pub struct DeviceRegistry {
    tracked: Mutex<HashMap<String, TrackedDevice>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked devices.
    pub async fn len(&self) -> usize {
        self.tracked.lock().await.len()
    }

    /// Returns `true` if nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.tracked.lock().await.is_empty()
    }

    /// The state handle for one tracked device.
    pub async fn state_of(&self, address: &str) -> Option<SharedDeviceState> {
        self.tracked
            .lock()
            .await
            .get(address)
            .map(|device| device.state.clone())
    }

    /// Returns `true` if any tracked device reports a fault.
    pub async fn any_needs_refresh(&self) -> bool {
        let tracked = self.tracked.lock().await;
        for device in tracked.values() {
            if device.state.read().await.health.needs_refresh() {
                return true;
            }
        }
        false
    }

    /// Admit a discovered device: persist its signal strength, open a
    /// connection, and spawn its worker.
    ///
    /// Holds the registry lock throughout, so a duplicate address in the
    /// same scan pass cannot produce a second worker. A tracked device
    /// reporting a fault is stopped and recreated; a healthy one is left
    /// alone.
    ///
    /// Returns `true` if a worker was spawned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write or the connection attempt fails;
    /// the device stays untracked and the next scan pass retries.
    pub async fn admit(
        &self,
        advertisement: &Advertisement,
        ctx: &Arc<WorkerContext>,
    ) -> Result<bool> {
        let mut tracked = self.tracked.lock().await;

        if let Some(existing) = tracked.get(&advertisement.address) {
            if !existing.state.read().await.health.needs_refresh() {
                return Ok(false);
            }
            info!(address = %advertisement.address, "recreating faulted device");
            if let Some(stale) = tracked.remove(&advertisement.address) {
                stale.worker.stop().await;
            }
        }

        ctx.gateway
            .store_signal(&advertisement.address, advertisement.rssi.unwrap_or(0))
            .await?;

        let handle = {
            let radio = ctx.arbiter.lock().await;
            radio.connect(&advertisement.address).await?
        };

        let state: SharedDeviceState =
            Arc::new(RwLock::new(DeviceState::new(advertisement.rssi)));
        let worker = DeviceWorker::spawn(
            advertisement.address.clone(),
            handle,
            state.clone(),
            ctx.clone(),
        );
        tracked.insert(advertisement.address.clone(), TrackedDevice { state, worker });
        Ok(true)
    }

    /// Take the registry lock for a bulk teardown.
    ///
    /// The supervisor holds this guard across the adapter reset so no scan
    /// pass can admit a device in between.
    pub async fn exclusive(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            tracked: self.tracked.lock().await,
        }
    }

    /// Stop every worker, wait for each to release its connection, and
    /// clear the tracked set.
    pub async fn teardown(&self) {
        self.exclusive().await.stop_all().await;
    }
}

/// Exclusive hold on the tracked set.
pub struct RegistryGuard<'a> {
    tracked: tokio::sync::MutexGuard<'a, HashMap<String, TrackedDevice>>,
}

impl RegistryGuard<'_> {
    /// Stop every worker and clear the set. Workers release their
    /// connections through the arbiter, so the caller must not hold the
    /// radio while awaiting this.
    pub async fn stop_all(&mut self) {
        for (address, device) in self.tracked.drain() {
            debug!(%address, "stopping worker");
            device.worker.stop().await;
        }
    }
}

/// Discovery loop: scans for advertisements and admits matching devices.
pub struct Scanner {
    registry: Arc<DeviceRegistry>,
    ctx: Arc<WorkerContext>,
    signature: DeviceSignature,
    scan_timeout: Duration,
    scan_interval: Duration,
    rescan_interval: Duration,
}

impl Scanner {
    /// Build the scanner from the engine configuration.
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        ctx: Arc<WorkerContext>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            ctx,
            signature: config.signature.clone(),
            scan_timeout: config.scan_timeout(),
            scan_interval: config.scan_interval(),
            rescan_interval: config.rescan_interval(),
        }
    }

    /// Run scan passes until cancelled. Scans back off to the longer
    /// interval once at least one device is tracked.
    pub async fn run(self, stop: CancellationToken) {
        loop {
            if stop.is_cancelled() {
                break;
            }
            if let Err(error) = self.scan_pass().await {
                warn!(%error, "scan pass failed");
            }
            let pause = if self.registry.is_empty().await {
                self.scan_interval
            } else {
                self.rescan_interval
            };
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = stop.cancelled() => break,
            }
        }
        debug!("scanner stopped");
    }

    /// One scan pass: discover advertisements and admit matching devices.
    ///
    /// # Errors
    ///
    /// Returns an error only when the scan itself fails; per-device
    /// admission failures are logged and skipped.
    pub async fn scan_pass(&self) -> Result<()> {
        debug!("scanning for sensors");
        let advertisements = {
            let radio = self.ctx.arbiter.lock().await;
            radio.scan(self.scan_timeout).await?
        };

        for advertisement in advertisements {
            if !self.signature.matches(&advertisement) {
                continue;
            }
            match self.registry.admit(&advertisement, &self.ctx).await {
                Ok(true) => {
                    info!(
                        address = %advertisement.address,
                        rssi = ?advertisement.rssi,
                        "tracking new sensor"
                    );
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(address = %advertisement.address, %error, "failed to admit device");
                }
            }
        }
        Ok(())
    }
}
