//! Systemic fault detection and adapter recovery.
//!
//! Individual device faults are handled by the scanner recreating the
//! device. When faults persist across checks, the adapter itself is the
//! suspect: every worker is stopped, the registry cleared, and the radio
//! power-cycled so discovery restarts from a clean slate. This is the only
//! path that touches the adapter's power state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arbiter::RadioArbiter;
use crate::config::EngineConfig;
use crate::registry::DeviceRegistry;

/// Watches aggregate worker health and recycles the adapter on sustained
/// faults.
pub struct RecoverySupervisor {
    registry: Arc<DeviceRegistry>,
    arbiter: Arc<RadioArbiter>,
    check_interval: Duration,
    fault_threshold: u32,
    reset_settle: Duration,
}

impl RecoverySupervisor {
    /// Build the supervisor from the engine configuration.
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        arbiter: Arc<RadioArbiter>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            arbiter,
            check_interval: config.check_interval(),
            fault_threshold: config.fault_threshold,
            reset_settle: config.reset_settle(),
        }
    }

    /// Run health checks until cancelled.
    ///
    /// The rolling counter increments on every check that finds at least
    /// one faulted worker and resets to zero otherwise; recovery fires on
    /// the Nth consecutive failed check.
    pub async fn run(self, stop: CancellationToken) {
        let mut strikes: u32 = 0;
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.check_interval) => {}
                () = stop.cancelled() => break,
            }
            if self.registry.any_needs_refresh().await {
                strikes += 1;
                warn!(strikes, threshold = self.fault_threshold, "faulted devices detected");
            } else {
                strikes = 0;
            }
            if strikes >= self.fault_threshold {
                self.recover().await;
                strikes = 0;
            }
        }
        debug!("supervisor stopped");
    }

    /// Tear down every worker and power-cycle the adapter.
    ///
    /// The registry stays locked across the reset so no scan pass can admit
    /// a device in between. Worker joins complete before the arbiter is
    /// taken: a worker mid-cycle needs the radio to finish and release its
    /// connection.
    pub async fn recover(&self) {
        warn!("sustained device faults, recycling the adapter");
        let mut registry = self.registry.exclusive().await;
        registry.stop_all().await;

        let radio = self.arbiter.lock().await;
        tokio::time::sleep(self.reset_settle).await;
        if let Err(error) = radio.reset_adapter().await {
            warn!(%error, "adapter reset failed");
        }
        tokio::time::sleep(self.reset_settle).await;
        info!("adapter reset complete, discovery restarts from empty");
    }
}
