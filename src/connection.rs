//! Connection lifecycle state and the single active printer link.

use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::backend::{GattCharacteristic, GattLink, SerialStream};
use crate::device::Device;
use crate::error::Error;

/// Why the state machine ended in [`ConnectionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureReason {
    /// Permissions were missing.
    PermissionDenied,
    /// The radio was off.
    BluetoothDisabled,
    /// The target never showed up during lookup.
    DeviceNotFound,
    /// BLE, the last transport tried, failed or timed out.
    ConnectionTimeout,
    /// Any other failure, including cancellation.
    ConnectionFailed,
}

impl From<&Error> for FailureReason {
    fn from(error: &Error) -> Self {
        match error {
            Error::PermissionDenied => Self::PermissionDenied,
            Error::BluetoothDisabled => Self::BluetoothDisabled,
            Error::DeviceNotFound { .. } => Self::DeviceNotFound,
            Error::ConnectionTimeout => Self::ConnectionTimeout,
            _ => Self::ConnectionFailed,
        }
    }
}

/// State of the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Nothing happening.
    #[default]
    Idle,
    /// Listening for advertisements. `target` is set while `connect` looks
    /// for an unknown identifier, and `None` for a caller-initiated scan.
    Scanning {
        /// Identifier being looked up, if any.
        target: Option<String>,
    },
    /// Opening a serial-profile socket.
    ConnectingClassic,
    /// Establishing a GATT link.
    ConnectingBle,
    /// Enumerating services and characteristics on the GATT link.
    DiscoveringCapabilities,
    /// Connected; jobs can be submitted.
    Ready,
    /// A previously ready connection was closed.
    Disconnected,
    /// The last connection attempt failed.
    Failed(FailureReason),
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if a connection attempt is underway.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Scanning { target: Some(_) }
                | Self::ConnectingClassic
                | Self::ConnectingBle
                | Self::DiscoveringCapabilities
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning { target: Some(id) } => write!(f, "Scanning({})", id),
            Self::Scanning { target: None } => write!(f, "Scanning"),
            Self::ConnectingClassic => write!(f, "ConnectingClassic"),
            Self::ConnectingBle => write!(f, "ConnectingBLE"),
            Self::DiscoveringCapabilities => write!(f, "DiscoveringCapabilities"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Failed(reason) => write!(f, "Failed({:?})", reason),
        }
    }
}

/// Which transport carries the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportKind {
    /// Serial Port Profile over RFCOMM.
    Classic,
    /// GATT over Bluetooth Low Energy.
    Ble,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classic => write!(f, "Classic"),
            Self::Ble => write!(f, "BLE"),
        }
    }
}

/// Transport-specific handle to the write endpoint.
pub(crate) enum Transport {
    Classic(SerialStream),
    Ble {
        link: Arc<dyn GattLink>,
        endpoint: Option<GattCharacteristic>,
    },
}

/// The single active connection, owned by the manager.
pub struct Connection {
    device: Device,
    kind: TransportKind,
    has_endpoint: bool,
    /// Held for the duration of a transmission.
    pub(crate) transport: Mutex<Transport>,
    /// Flipped to `true` once the link is gone.
    pub(crate) lost: watch::Sender<bool>,
    pub(crate) chunk_size: usize,
}

impl Connection {
    pub(crate) fn classic(device: Device, stream: SerialStream) -> Self {
        Self::new(device, TransportKind::Classic, true, Transport::Classic(stream), 0)
    }

    pub(crate) fn ble(
        device: Device,
        link: Arc<dyn GattLink>,
        endpoint: Option<GattCharacteristic>,
        chunk_size: usize,
    ) -> Self {
        let has_endpoint = endpoint.is_some();
        Self::new(
            device,
            TransportKind::Ble,
            has_endpoint,
            Transport::Ble { link, endpoint },
            chunk_size,
        )
    }

    fn new(
        device: Device,
        kind: TransportKind,
        has_endpoint: bool,
        transport: Transport,
        chunk_size: usize,
    ) -> Self {
        let (lost, _) = watch::channel(false);
        Self {
            device,
            kind,
            has_endpoint,
            transport: Mutex::new(transport),
            lost,
            chunk_size,
        }
    }

    /// The connected device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The transport in use.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Whether a write endpoint was located.
    pub fn has_write_endpoint(&self) -> bool {
        self.has_endpoint
    }

    /// Whether the link has been torn down.
    pub fn is_lost(&self) -> bool {
        *self.lost.borrow()
    }

    /// Fail any in-flight transmission with `ConnectionLost`.
    pub(crate) fn mark_lost(&self) {
        self.lost.send_replace(true);
    }

    /// Release transport resources. Waits for an in-flight transmission to
    /// observe the lost flag first.
    pub(crate) async fn close(&self) {
        self.mark_lost();
        let mut transport = self.transport.lock().await;
        match &mut *transport {
            Transport::Classic(stream) => {
                if let Err(e) = stream.shutdown().await {
                    debug!("Serial socket shutdown for {}: {}", self.device.id, e);
                }
            }
            Transport::Ble { link, .. } => {
                if let Err(e) = link.disconnect().await {
                    warn!("Error disconnecting GATT link to {}: {}", self.device.id, e);
                }
            }
        }
        debug!("Released {} transport for {}", self.kind, self.device.id);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.device.id)
            .field("kind", &self.kind)
            .field("has_write_endpoint", &self.has_endpoint)
            .field("lost", &self.is_lost())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Disconnected.is_ready());

        assert!(ConnectionState::ConnectingClassic.is_connecting());
        assert!(ConnectionState::DiscoveringCapabilities.is_connecting());
        assert!(ConnectionState::Scanning {
            target: Some("AA".into())
        }
        .is_connecting());
        assert!(!ConnectionState::Scanning { target: None }.is_connecting());
        assert!(!ConnectionState::Failed(FailureReason::DeviceNotFound).is_connecting());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::ConnectingBle.to_string(), "ConnectingBLE");
        assert_eq!(
            ConnectionState::Failed(FailureReason::ConnectionTimeout).to_string(),
            "Failed(ConnectionTimeout)"
        );
    }

    #[test]
    fn test_failure_reason_from_error() {
        assert_eq!(
            FailureReason::from(&Error::ConnectionTimeout),
            FailureReason::ConnectionTimeout
        );
        assert_eq!(
            FailureReason::from(&Error::WriteError {
                reason: "x".into()
            }),
            FailureReason::ConnectionFailed
        );
    }

    #[tokio::test]
    async fn test_classic_close_marks_lost() {
        let stream: SerialStream = Box::new(tokio::io::sink());
        let device = Device::new("AA:BB:CC:DD:EE:FF", Some("Printer".into()));
        let connection = Connection::classic(device, stream);

        assert!(connection.has_write_endpoint());
        assert!(!connection.is_lost());

        connection.close().await;
        assert!(connection.is_lost());
    }
}
