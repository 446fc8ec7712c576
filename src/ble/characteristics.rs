//! GATT link over a btleplug peripheral.

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::backend::{CharacteristicProperties, GattCharacteristic, GattLink};
use crate::error::{Error, Result};

/// A connected peripheral with its characteristics cached by UUID.
pub struct BtleplugGattLink {
    peripheral: Peripheral,
    characteristics: RwLock<HashMap<(Uuid, Uuid), Characteristic>>,
}

impl BtleplugGattLink {
    /// Wrap a peripheral whose link is already up.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }
}

fn convert(characteristic: &Characteristic) -> GattCharacteristic {
    GattCharacteristic {
        service: characteristic.service_uuid,
        uuid: characteristic.uuid,
        properties: CharacteristicProperties {
            write: characteristic.properties.contains(CharPropFlags::WRITE),
            write_without_response: characteristic
                .properties
                .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        },
    }
}

#[async_trait]
impl GattLink for BtleplugGattLink {
    async fn discover_characteristics(&self) -> Result<Vec<GattCharacteristic>> {
        self.peripheral.discover_services().await?;

        let mut found = Vec::new();
        let mut cache = self.characteristics.write();
        cache.clear();

        for service in self.peripheral.services() {
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {} ({:?})",
                    characteristic.uuid, service.uuid, characteristic.properties
                );
                found.push(convert(&characteristic));
                cache.insert((service.uuid, characteristic.uuid), characteristic);
            }
        }

        debug!("Discovered {} characteristics", found.len());
        Ok(found)
    }

    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8]) -> Result<()> {
        let target = self
            .characteristics
            .read()
            .get(&(characteristic.service, characteristic.uuid))
            .cloned()
            .ok_or_else(|| Error::WriteError {
                reason: format!("characteristic {} not discovered", characteristic.uuid),
            })?;

        let write_type = if characteristic.prefers_response() {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(Error::write_error)?;

        trace!("Wrote {} bytes to characteristic {}", data.len(), target.uuid);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
