//! Platform seam between the connection manager and a Bluetooth stack.
//!
//! A backend translates its platform's callbacks into [`PlatformEvent`]s
//! pushed onto a single queue that the manager drains in order. Callbacks
//! that complete a request (link up, services enumerated, write acknowledged)
//! are modelled as the resolution of the corresponding async method instead.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::device::Device;
use crate::error::Result;

/// Unsolicited notifications from the platform Bluetooth stack.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// The adapter was powered on or off.
    StateUpdate {
        /// Whether the radio is now on.
        powered: bool,
    },
    /// An advertisement or inquiry result was received.
    DeviceDiscovered(Device),
    /// The radio stopped an active scan on its own.
    ScanFailed {
        /// Platform-specific failure code.
        code: i32,
    },
    /// A link to a device came up.
    Connected {
        /// Device identifier.
        id: String,
    },
    /// A link to a device went down.
    Disconnected {
        /// Device identifier.
        id: String,
    },
}

/// Sending half of the platform event queue.
pub type PlatformEventSender = mpsc::UnboundedSender<PlatformEvent>;

/// A byte sink backed by a serial-profile socket.
pub type SerialStream = Box<dyn AsyncWrite + Send + Unpin>;

/// GATT characteristic properties relevant for printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharacteristicProperties {
    /// Supports write with response.
    pub write: bool,
    /// Supports write without response.
    pub write_without_response: bool,
}

/// A characteristic found during capability discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    /// Owning service.
    pub service: Uuid,
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Supported operations.
    pub properties: CharacteristicProperties,
}

impl GattCharacteristic {
    /// Whether any form of write is supported.
    pub fn is_writable(&self) -> bool {
        self.properties.write || self.properties.write_without_response
    }

    /// Whether writes should wait for an acknowledgement.
    pub fn prefers_response(&self) -> bool {
        self.properties.write
    }
}

/// Pick the first characteristic with a writable property.
pub fn select_write_endpoint(characteristics: &[GattCharacteristic]) -> Option<GattCharacteristic> {
    characteristics.iter().find(|c| c.is_writable()).cloned()
}

/// An established GATT link.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Enumerate services and characteristics.
    async fn discover_characteristics(&self) -> Result<Vec<GattCharacteristic>>;

    /// Write one chunk. Resolves once the platform confirms the write.
    async fn write(&self, characteristic: &GattCharacteristic, data: &[u8]) -> Result<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<()>;
}

/// A platform Bluetooth stack.
#[async_trait]
pub trait BluetoothBackend: Send + Sync + 'static {
    /// Hand the backend the queue for unsolicited events. Called once.
    fn attach(&self, events: PlatformEventSender);

    /// Whether the radio is powered on.
    async fn is_enabled(&self) -> bool;

    /// Whether the permissions needed to scan and connect are granted.
    async fn has_permissions(&self) -> bool;

    /// Ask the platform for scan/connect permissions.
    async fn request_permissions(&self) -> bool;

    /// Devices already paired with this host.
    async fn bonded_devices(&self) -> Result<Vec<Device>>;

    /// Begin advertisement/inquiry listening. Results arrive as
    /// [`PlatformEvent::DeviceDiscovered`].
    async fn start_scan(&self) -> Result<()>;

    /// Stop listening.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a serial-profile socket on `channel`.
    async fn open_serial(&self, device: &Device, channel: u8) -> Result<SerialStream>;

    /// Bring up a GATT link.
    async fn connect_gatt(&self, device: &Device) -> Result<Arc<dyn GattLink>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(n: u128, write: bool, without: bool) -> GattCharacteristic {
        GattCharacteristic {
            service: Uuid::from_u128(0x18f0),
            uuid: Uuid::from_u128(n),
            properties: CharacteristicProperties {
                write,
                write_without_response: without,
            },
        }
    }

    #[test]
    fn test_select_first_writable() {
        let chars = vec![
            characteristic(1, false, false),
            characteristic(2, false, true),
            characteristic(3, true, false),
        ];
        let endpoint = select_write_endpoint(&chars).unwrap();
        assert_eq!(endpoint.uuid, Uuid::from_u128(2));
        assert!(!endpoint.prefers_response());
    }

    #[test]
    fn test_select_none_writable() {
        let chars = vec![characteristic(1, false, false)];
        assert!(select_write_endpoint(&chars).is_none());
        assert!(select_write_endpoint(&[]).is_none());
    }
}
