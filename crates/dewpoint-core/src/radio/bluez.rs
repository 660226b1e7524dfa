//! BlueZ-backed radio driver.
//!
//! Thin adapter from the [`RadioDriver`](crate::radio::RadioDriver)
//! boundary onto `bluer`. Sensor channels map to the vendor GATT services:
//! a config characteristic armed with `0x01`/`0x00` and a data
//! characteristic holding the payload frame. Battery uses the standard
//! battery service, which needs no arming.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::{pin_mut, StreamExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::radio::{
    Advertisement, ConnectionHandle, RadioDriver, RadioError, RadioResult, SensorChannel,
};

/// Vendor 128-bit UUID carrying a 16-bit short code.
const fn vendor_uuid(short: u128) -> Uuid {
    Uuid::from_u128(0xF000_0000_0451_4000_B000_0000_0000_0000 | (short << 96))
}

/// Bluetooth SIG base UUID carrying a 16-bit short code.
const fn sig_uuid(short: u128) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5F9B_34FB | (short << 96))
}

/// Service-data key under which the sensors broadcast their payload frame.
const ENVIRONMENT_SERVICE: Uuid = sig_uuid(0xFE95);

const ENABLE: [u8; 1] = [0x01];
const DISABLE: [u8; 1] = [0x00];

struct ChannelUuids {
    service: Uuid,
    data: Uuid,
    config: Option<Uuid>,
}

const fn channel_uuids(channel: SensorChannel) -> ChannelUuids {
    match channel {
        SensorChannel::Temperature => ChannelUuids {
            service: vendor_uuid(0xAA00),
            data: vendor_uuid(0xAA01),
            config: Some(vendor_uuid(0xAA02)),
        },
        // The humidity service reports both quantities; the combined
        // channel reads the same characteristic.
        SensorChannel::Humidity | SensorChannel::Combined => ChannelUuids {
            service: vendor_uuid(0xAA20),
            data: vendor_uuid(0xAA21),
            config: Some(vendor_uuid(0xAA22)),
        },
        SensorChannel::Battery => ChannelUuids {
            service: sig_uuid(0x180F),
            data: sig_uuid(0x2A19),
            config: None,
        },
    }
}

impl From<bluer::Error> for RadioError {
    fn from(error: bluer::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Radio driver over the system BlueZ daemon.
pub struct BluezRadio {
    adapter: Adapter,
    connections: Mutex<HashMap<u64, Device>>,
    next_handle: AtomicU64,
}

impl BluezRadio {
    /// Open the default adapter and power it on.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError`] if no adapter is present or it cannot be
    /// powered.
    pub async fn new() -> RadioResult<Self> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(Self {
            adapter,
            connections: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    async fn device_for(&self, handle: ConnectionHandle) -> RadioResult<Device> {
        self.connections
            .lock()
            .await
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| RadioError::new(format!("unknown connection handle {}", handle.0)))
    }

    async fn characteristic(
        &self,
        device: &Device,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> RadioResult<Characteristic> {
        for service in device.services().await? {
            if service.uuid().await? != service_uuid {
                continue;
            }
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == characteristic_uuid {
                    return Ok(characteristic);
                }
            }
        }
        Err(RadioError::new(format!(
            "characteristic {characteristic_uuid} not found"
        )))
    }

    async fn advertisement_of(&self, address: Address) -> RadioResult<Advertisement> {
        let device = self.adapter.device(address)?;
        let local_name = device.name().await.ok().flatten();
        let rssi = device.rssi().await.ok().flatten();
        let service_data = device
            .service_data()
            .await
            .ok()
            .flatten()
            .and_then(|mut data| data.remove(&ENVIRONMENT_SERVICE));
        Ok(Advertisement {
            address: address.to_string(),
            local_name,
            rssi,
            service_data,
        })
    }
}

#[async_trait]
impl RadioDriver for BluezRadio {
    async fn scan(&self, timeout: Duration) -> RadioResult<Vec<Advertisement>> {
        let events = self.adapter.discover_devices().await?;
        pin_mut!(events);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut advertisements = Vec::new();
        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        match self.advertisement_of(address).await {
                            Ok(advertisement) => advertisements.push(advertisement),
                            Err(error) => {
                                tracing::debug!(%address, %error, "skipping advertisement");
                            }
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        Ok(advertisements)
    }

    async fn connect(&self, address: &str) -> RadioResult<ConnectionHandle> {
        let address: Address = address
            .parse()
            .map_err(|_| RadioError::new(format!("invalid address {address}")))?;
        let device = self.adapter.device(address)?;
        device.connect().await?;

        let handle = ConnectionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.connections.lock().await.insert(handle.0, device);
        Ok(handle)
    }

    async fn enable(&self, handle: ConnectionHandle, channel: SensorChannel) -> RadioResult<()> {
        let uuids = channel_uuids(channel);
        let Some(config) = uuids.config else {
            return Ok(());
        };
        let device = self.device_for(handle).await?;
        let characteristic = self.characteristic(&device, uuids.service, config).await?;
        characteristic.write(&ENABLE).await?;
        Ok(())
    }

    async fn read(&self, handle: ConnectionHandle, channel: SensorChannel) -> RadioResult<Vec<u8>> {
        let uuids = channel_uuids(channel);
        let device = self.device_for(handle).await?;
        let characteristic = self
            .characteristic(&device, uuids.service, uuids.data)
            .await?;
        Ok(characteristic.read().await?)
    }

    async fn disable(&self, handle: ConnectionHandle, channel: SensorChannel) -> RadioResult<()> {
        let uuids = channel_uuids(channel);
        let Some(config) = uuids.config else {
            return Ok(());
        };
        let device = self.device_for(handle).await?;
        let characteristic = self.characteristic(&device, uuids.service, config).await?;
        characteristic.write(&DISABLE).await?;
        Ok(())
    }

    async fn disconnect(&self, handle: ConnectionHandle) -> RadioResult<()> {
        let device = self.connections.lock().await.remove(&handle.0);
        match device {
            Some(device) => {
                device.disconnect().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn reset_adapter(&self) -> RadioResult<()> {
        self.adapter.set_powered(false).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.adapter.set_powered(true).await?;
        Ok(())
    }
}
