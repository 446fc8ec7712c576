//! [`BluetoothBackend`] on the system Bluetooth stack.

use async_trait::async_trait;
use btleplug::api::{Central, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::characteristics::BtleplugGattLink;
use super::classic;
use super::scanner::{describe_peripheral, spawn_event_pump, PeripheralRegistry};
use crate::backend::{BluetoothBackend, GattLink, PlatformEventSender, SerialStream};
use crate::device::Device;
use crate::error::{Error, Result};

/// The first system adapter, driven through btleplug for BLE and BlueZ
/// for Classic.
pub struct BtleplugBackend {
    adapter: Adapter,
    registry: PeripheralRegistry,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugBackend {
    /// Open the first system adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothDisabled`] if no adapter is present.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BluetoothDisabled)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            registry: Arc::new(parking_lot::RwLock::new(HashMap::new())),
            pump: Mutex::new(None),
        }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn find_peripheral(&self, device: &Device) -> Result<Peripheral> {
        if let Some(peripheral) = self.registry.read().get(&device.id).cloned() {
            return Ok(peripheral);
        }

        for peripheral in self.adapter.peripherals().await? {
            if let Some(found) = describe_peripheral(&peripheral).await {
                if found.id == device.id {
                    self.registry
                        .write()
                        .insert(found.id, peripheral.clone());
                    return Ok(peripheral);
                }
            }
        }

        Err(Error::DeviceNotFound {
            identifier: device.id.clone(),
        })
    }
}

#[async_trait]
impl BluetoothBackend for BtleplugBackend {
    fn attach(&self, events: PlatformEventSender) {
        let handle = spawn_event_pump(self.adapter.clone(), self.registry.clone(), events);
        if let Some(old) = self.pump.lock().replace(handle) {
            old.abort();
        }
    }

    async fn is_enabled(&self) -> bool {
        match self.adapter.adapter_state().await {
            Ok(state) => state == CentralState::PoweredOn,
            Err(e) => {
                debug!("Could not read adapter state: {}", e);
                false
            }
        }
    }

    async fn has_permissions(&self) -> bool {
        // Desktop stacks gate access at the adapter, not per operation.
        self.adapter.adapter_info().await.is_ok()
    }

    async fn request_permissions(&self) -> bool {
        self.has_permissions().await
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>> {
        classic::bonded_devices().await
    }

    async fn start_scan(&self) -> Result<()> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| match e {
                btleplug::Error::PermissionDenied => Error::PermissionDenied,
                other => {
                    debug!("Scan start failed: {}", other);
                    Error::ScanFailed { code: -1 }
                }
            })
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn open_serial(&self, device: &Device, channel: u8) -> Result<SerialStream> {
        classic::open_serial(device, channel).await
    }

    async fn connect_gatt(&self, device: &Device) -> Result<Arc<dyn GattLink>> {
        let peripheral = self.find_peripheral(device).await?;

        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral.connect().await.map_err(|e| match e {
                btleplug::Error::PermissionDenied => Error::PermissionDenied,
                other => Error::ConnectionFailed {
                    reason: other.to_string(),
                },
            })?;
        }

        debug!("GATT link up to {}", device.id);
        Ok(Arc::new(BtleplugGattLink::new(peripheral)))
    }
}

impl Drop for BtleplugBackend {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}
