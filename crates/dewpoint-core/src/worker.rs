//! Per-device polling worker.
//!
//! One worker task per tracked device. Each cycle it resolves publish
//! credentials, measures through the radio arbiter, merges the decoded
//! sample into the device's readings, and publishes. A radio fault retires
//! the worker: it flags the device for refresh and stops; recreation is the
//! scanner's job, and the supervisor handles faults the scanner cannot fix.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arbiter::RadioArbiter;
use crate::credentials::CredentialGateway;
use crate::measurement::MeasurementSample;
use crate::payload;
use crate::radio::{ConnectionHandle, RadioError, SensorChannel};
use crate::registry::{DeviceHealth, SharedDeviceState};
use crate::telemetry::TelemetrySink;

/// Dependencies and tuning shared by every worker.
pub struct WorkerContext {
    /// Exclusive gate to the radio.
    pub arbiter: Arc<RadioArbiter>,
    /// Resolves addresses to publish credentials.
    pub gateway: Arc<CredentialGateway>,
    /// Outbound measurement delivery.
    pub sink: Arc<dyn TelemetrySink>,
    /// Pause between measurement cycles.
    pub cycle: Duration,
    /// Channels polled each cycle.
    pub channels: Vec<SensorChannel>,
}

/// Handle held by the registry to stop a worker and await its exit.
pub struct WorkerHandle {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait until it has released its
    /// connection. The worker observes the signal within one cycle.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(error) = self.join.await {
            warn!(%error, "worker task failed");
        }
    }
}

enum Phase {
    AwaitingCredentials,
    Publishing,
}

/// The polling state machine for one device.
pub struct DeviceWorker {
    address: String,
    handle: ConnectionHandle,
    state: SharedDeviceState,
    ctx: Arc<WorkerContext>,
}

impl DeviceWorker {
    /// Spawn the worker task for a freshly connected device.
    #[must_use]
    pub fn spawn(
        address: String,
        handle: ConnectionHandle,
        state: SharedDeviceState,
        ctx: Arc<WorkerContext>,
    ) -> WorkerHandle {
        let stop = CancellationToken::new();
        let worker = Self {
            address,
            handle,
            state,
            ctx,
        };
        let join = tokio::spawn(worker.run(stop.clone()));
        WorkerHandle { stop, join }
    }

    async fn run(self, stop: CancellationToken) {
        let mut phase = Phase::AwaitingCredentials;
        loop {
            if stop.is_cancelled() {
                break;
            }
            if let Err(error) = self.cycle(&mut phase).await {
                warn!(address = %self.address, %error, "device fault, retiring worker");
                self.state.write().await.health = DeviceHealth::NeedsRefresh;
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(self.ctx.cycle) => {}
                () = stop.cancelled() => break,
            }
        }
        self.release().await;
    }

    /// One measure-and-publish cycle. Only radio failures propagate; they
    /// are terminal for this worker.
    async fn cycle(&self, phase: &mut Phase) -> Result<(), RadioError> {
        // Credentials can appear or change externally at any time, so every
        // cycle re-reads the store.
        let credentials = match self.ctx.gateway.lookup(&self.address).await {
            Ok(credentials) => credentials,
            Err(error) => {
                warn!(address = %self.address, %error, "credential lookup failed");
                return Ok(());
            }
        };
        let Some((channel_id, write_key)) = credentials.into_complete() else {
            debug!(address = %self.address, "credentials not configured, waiting");
            *phase = Phase::AwaitingCredentials;
            return Ok(());
        };
        if matches!(phase, Phase::AwaitingCredentials) {
            info!(address = %self.address, channel_id, "credentials configured, publishing");
            *phase = Phase::Publishing;
        }

        let sample = self.measure().await?;

        let readings = {
            let mut state = self.state.write().await;
            state.readings.apply(&sample);
            state.readings
        };
        if readings.is_empty() {
            debug!(address = %self.address, "no decodable reading yet, skipping publish");
            return Ok(());
        }

        if let Err(error) = self
            .ctx
            .sink
            .publish(&channel_id, &write_key, &readings)
            .await
        {
            // Not retried; the next cycle publishes fresh data anyway.
            warn!(address = %self.address, %error, "publish failed");
        }
        Ok(())
    }

    /// Poll every configured channel while holding the radio.
    async fn measure(&self) -> Result<MeasurementSample, RadioError> {
        let radio = self.ctx.arbiter.lock().await;
        let mut sample = MeasurementSample::default();
        for &channel in &self.ctx.channels {
            radio.enable(self.handle, channel).await?;
            radio.settle().await;
            let frame = radio.read(self.handle, channel).await?;
            radio.disable(self.handle, channel).await?;
            match payload::decode(channel.discriminator(), &frame) {
                Ok(decoded) => sample.extend(&decoded),
                Err(error) => {
                    debug!(address = %self.address, ?channel, %error, "discarding sample");
                }
            }
        }
        Ok(sample)
    }

    /// Release the connection. Runs on every exit path.
    async fn release(&self) {
        let radio = self.ctx.arbiter.lock().await;
        if let Err(error) = radio.disconnect(self.handle).await {
            debug!(address = %self.address, %error, "disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::RwLock;

    use super::*;
    use crate::credentials::{KeyValueStore, FIELD_CHANNEL_ID, FIELD_WRITE_KEY};
    use crate::registry::DeviceState;
    use crate::testkit::{battery_frame, combined_frame, test_context, FakeRadio};

    const ADDR: &str = "AA:BB:CC:DD:EE:01";

    fn fresh_state() -> SharedDeviceState {
        Arc::new(RwLock::new(DeviceState::new(Some(-60))))
    }

    async fn configure(store: &crate::credentials::MemoryStore) {
        store.hash_set(ADDR, FIELD_CHANNEL_ID, "123").await.unwrap();
        store.hash_set(ADDR, FIELD_WRITE_KEY, "xyz").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_without_credentials_and_never_touches_radio() {
        let radio = FakeRadio::new();
        let (ctx, _store, sink) = test_context(&radio, &[SensorChannel::Combined]);
        let state = fresh_state();

        let handle = DeviceWorker::spawn(ADDR.to_owned(), ConnectionHandle(1), state.clone(), ctx);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(radio.reads.load(Ordering::SeqCst), 0);
        assert_eq!(sink.count(), 0);
        assert_eq!(state.read().await.health, DeviceHealth::Healthy);

        handle.stop().await;
        assert_eq!(radio.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_once_credentials_appear() {
        let radio = FakeRadio::new();
        radio.set_frame(SensorChannel::Combined, combined_frame(213, 452));
        radio.set_frame(SensorChannel::Battery, battery_frame(226));
        let (ctx, store, sink) = test_context(
            &radio,
            &[SensorChannel::Combined, SensorChannel::Battery],
        );
        let state = fresh_state();

        let handle = DeviceWorker::spawn(ADDR.to_owned(), ConnectionHandle(1), state.clone(), ctx);

        // First cycle runs with an empty store: nothing published.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.count(), 0);

        configure(&store).await;
        tokio::time::sleep(Duration::from_secs(240)).await;

        assert!(sink.count() >= 1);
        let (channel_id, write_key, readings) = sink.last().unwrap();
        assert_eq!(channel_id, "123");
        assert_eq!(write_key, "xyz");
        assert_eq!(readings.temperature, Some(21.3));
        assert_eq!(readings.humidity, Some(45.2));
        assert_eq!(readings.battery, Some(22.6));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_faults_exactly_once() {
        let radio = FakeRadio::new();
        radio.fail_reads.store(true, Ordering::SeqCst);
        let (ctx, store, sink) = test_context(&radio, &[SensorChannel::Combined]);
        configure(&store).await;
        let state = fresh_state();

        let _handle = DeviceWorker::spawn(ADDR.to_owned(), ConnectionHandle(1), state.clone(), ctx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.read().await.health, DeviceHealth::NeedsRefresh);
        assert_eq!(radio.reads.load(Ordering::SeqCst), 1);
        // Connection released on the fault path.
        assert_eq!(radio.disconnects.load(Ordering::SeqCst), 1);

        // Many cycles later the retired worker still has not retried.
        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(radio.reads.load(Ordering::SeqCst), 1);
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_decode_error_does_not_fault() {
        let radio = FakeRadio::new();
        // Truncated frame: decodes to "insufficient data" every cycle.
        radio.set_frame(SensorChannel::Combined, vec![0u8; 4]);
        let (ctx, store, sink) = test_context(&radio, &[SensorChannel::Combined]);
        configure(&store).await;
        let state = fresh_state();

        let handle = DeviceWorker::spawn(ADDR.to_owned(), ConnectionHandle(1), state.clone(), ctx);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(state.read().await.health, DeviceHealth::Healthy);
        assert!(radio.reads.load(Ordering::SeqCst) > 1);
        // Nothing decodable, nothing published.
        assert_eq!(sink.count(), 0);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_reading_keeps_previous_value() {
        let radio = FakeRadio::new();
        radio.set_frame(SensorChannel::Combined, combined_frame(213, 452));
        let (ctx, store, sink) = test_context(&radio, &[SensorChannel::Combined]);
        configure(&store).await;
        let state = fresh_state();

        let handle = DeviceWorker::spawn(ADDR.to_owned(), ConnectionHandle(1), state.clone(), ctx);
        tokio::time::sleep(Duration::from_secs(30)).await;

        // Sensor goes quiet: zero temperature, fresh humidity.
        radio.set_frame(SensorChannel::Combined, combined_frame(0, 50));
        tokio::time::sleep(Duration::from_secs(240)).await;

        let (_, _, readings) = sink.last().unwrap();
        assert_eq!(readings.temperature, Some(21.3));
        assert_eq!(readings.humidity, Some(5.0));

        handle.stop().await;
    }
}
