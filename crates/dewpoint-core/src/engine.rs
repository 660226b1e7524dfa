//! Engine assembly.
//!
//! Wires the radio driver, arbiter, registry, scanner, supervisor,
//! credential gateway, and telemetry sink together, and owns the long-lived
//! tasks. The daemon and the integration tests both start the engine this
//! way.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::arbiter::RadioArbiter;
use crate::config::EngineConfig;
use crate::credentials::{CredentialGateway, KeyValueStore};
use crate::radio::RadioDriver;
use crate::registry::{DeviceRegistry, Scanner};
use crate::supervisor::RecoverySupervisor;
use crate::telemetry::TelemetrySink;
use crate::worker::WorkerContext;

/// Everything needed to run the polling engine.
pub struct Engine {
    config: EngineConfig,
    driver: Box<dyn RadioDriver>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn TelemetrySink>,
}

impl Engine {
    /// Assemble an engine from its boundary implementations.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        driver: Box<dyn RadioDriver>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            driver,
            store,
            sink,
        }
    }

    /// Spawn the scanner and supervisor loops and hand back the controls.
    #[must_use]
    pub fn start(self) -> EngineHandle {
        let arbiter = Arc::new(RadioArbiter::new(self.driver, self.config.settle_delay()));
        let registry = Arc::new(DeviceRegistry::new());
        let gateway = Arc::new(CredentialGateway::new(self.store));

        let ctx = Arc::new(WorkerContext {
            arbiter: arbiter.clone(),
            gateway,
            sink: self.sink,
            cycle: self.config.measure_interval(),
            channels: self.config.channels.clone(),
        });

        let scanner = Scanner::new(registry.clone(), ctx, &self.config);
        let supervisor = RecoverySupervisor::new(registry.clone(), arbiter, &self.config);

        let stop = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(scanner.run(stop.child_token())),
            tokio::spawn(supervisor.run(stop.child_token())),
        ];
        info!("engine started");

        EngineHandle {
            stop,
            tasks,
            registry,
        }
    }
}

/// A running engine. Stops nothing on drop; call [`EngineHandle::shutdown`].
pub struct EngineHandle {
    stop: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    registry: Arc<DeviceRegistry>,
}

impl EngineHandle {
    /// The tracked-device registry, for inspection.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Stop the discovery and supervision loops, then stop every worker
    /// and release its connection.
    pub async fn shutdown(self) {
        self.stop.cancel();
        for task in self.tasks {
            if let Err(error) = task.await {
                warn!(%error, "engine task failed");
            }
        }
        self.registry.teardown().await;
        info!("engine stopped");
    }
}
