//! Shared test doubles: a scriptable radio driver, a recording sink, and a
//! ready-made worker context.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::arbiter::RadioArbiter;
use crate::credentials::{CredentialGateway, MemoryStore};
use crate::measurement::SensorReadings;
use crate::payload::DISCRIMINATOR_OFFSET;
use crate::radio::{
    Advertisement, ConnectionHandle, RadioDriver, RadioError, RadioResult, SensorChannel,
};
use crate::telemetry::{TelemetryError, TelemetrySink};
use crate::worker::WorkerContext;

/// Scriptable in-memory radio.
///
/// Scan results are queued; the last queued pass keeps repeating, modelling
/// a device that keeps advertising. Reads return the frame scripted for the
/// channel, or fail wholesale while `fail_reads` is set.
#[derive(Default)]
pub struct FakeRadio {
    scan_results: Mutex<VecDeque<Vec<Advertisement>>>,
    frames: Mutex<HashMap<u8, Vec<u8>>>,
    /// Fail every read with a radio error while set.
    pub fail_reads: AtomicBool,
    /// Clear `fail_reads` when the adapter is reset.
    pub heal_on_reset: AtomicBool,
    /// Opened connections.
    pub connects: AtomicUsize,
    /// Released connections.
    pub disconnects: AtomicUsize,
    /// Attempted reads, failed ones included.
    pub reads: AtomicUsize,
    /// Adapter power-cycles.
    pub resets: AtomicUsize,
    next_handle: AtomicU64,
}

impl FakeRadio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the result of the next scan pass.
    pub fn push_scan(&self, advertisements: Vec<Advertisement>) {
        self.scan_results.lock().unwrap().push_back(advertisements);
    }

    /// Script the frame returned for a channel's reads.
    pub fn set_frame(&self, channel: SensorChannel, frame: Vec<u8>) {
        self.frames
            .lock()
            .unwrap()
            .insert(channel.discriminator(), frame);
    }
}

#[async_trait]
impl RadioDriver for Arc<FakeRadio> {
    async fn scan(&self, _timeout: Duration) -> RadioResult<Vec<Advertisement>> {
        let mut queue = self.scan_results.lock().unwrap();
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }

    async fn connect(&self, _address: &str) -> RadioResult<ConnectionHandle> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    async fn enable(&self, _: ConnectionHandle, _: SensorChannel) -> RadioResult<()> {
        Ok(())
    }

    async fn read(&self, _: ConnectionHandle, channel: SensorChannel) -> RadioResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RadioError::new("read timed out"));
        }
        Ok(self
            .frames
            .lock()
            .unwrap()
            .get(&channel.discriminator())
            .cloned()
            .unwrap_or_default())
    }

    async fn disable(&self, _: ConnectionHandle, _: SensorChannel) -> RadioResult<()> {
        Ok(())
    }

    async fn disconnect(&self, _: ConnectionHandle) -> RadioResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset_adapter(&self) -> RadioResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.heal_on_reset.load(Ordering::SeqCst) {
            self.fail_reads.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Sink that records every publish.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, String, SensorReadings)>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(String, String, SensorReadings)> {
        self.published.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn publish(
        &self,
        channel_id: &str,
        write_key: &str,
        readings: &SensorReadings,
    ) -> Result<(), TelemetryError> {
        self.published
            .lock()
            .unwrap()
            .push((channel_id.to_owned(), write_key.to_owned(), *readings));
        Ok(())
    }
}

/// A worker context over the fake radio with a fast-but-realistic cycle.
pub fn test_context(
    radio: &Arc<FakeRadio>,
    channels: &[SensorChannel],
) -> (Arc<WorkerContext>, Arc<MemoryStore>, Arc<RecordingSink>) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let ctx = Arc::new(WorkerContext {
        arbiter: Arc::new(RadioArbiter::new(
            Box::new(radio.clone()),
            Duration::from_secs(1),
        )),
        gateway: Arc::new(CredentialGateway::new(store.clone())),
        sink: sink.clone(),
        cycle: Duration::from_secs(120),
        channels: channels.to_vec(),
    });
    (ctx, store, sink)
}

/// A matching advertisement for `address`.
pub fn advert(address: &str, name: &str) -> Advertisement {
    Advertisement {
        address: address.to_owned(),
        local_name: Some(name.to_owned()),
        rssi: Some(-60),
        service_data: None,
    }
}

/// A combined temperature+humidity frame in tenths of a unit.
pub fn combined_frame(temp_tenths: i16, hum_tenths: u16) -> Vec<u8> {
    let mut frame = vec![0u8; 16];
    frame[DISCRIMINATOR_OFFSET] = SensorChannel::Combined.discriminator();
    frame.extend_from_slice(&temp_tenths.to_le_bytes());
    frame.extend_from_slice(&hum_tenths.to_le_bytes());
    frame
}

/// A battery frame in tenths of a percent.
pub fn battery_frame(tenths: u8) -> Vec<u8> {
    let mut frame = vec![0u8; 16];
    frame[DISCRIMINATOR_OFFSET] = SensorChannel::Battery.discriminator();
    frame.push(tenths);
    frame
}
