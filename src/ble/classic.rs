//! Bluetooth Classic: bonded devices and serial-profile sockets.
//!
//! Backed by BlueZ on Linux. Other platforms report no bonded devices and
//! fail to open sockets, which sends every connection down the BLE path.

use crate::backend::SerialStream;
use crate::device::Device;
use crate::error::Result;

#[cfg(target_os = "linux")]
mod imp {
    use bluer::rfcomm::{SocketAddr, Stream};
    use bluer::{Address, Session};
    use tracing::{debug, info};

    use crate::backend::SerialStream;
    use crate::device::{BondState, Device};
    use crate::error::{Error, Result};

    fn session_error(e: bluer::Error) -> Error {
        Error::ConnectionFailed {
            reason: format!("BlueZ: {}", e),
        }
    }

    async fn default_adapter() -> Result<bluer::Adapter> {
        let session = Session::new().await.map_err(session_error)?;
        session.default_adapter().await.map_err(session_error)
    }

    pub(super) async fn bonded_devices() -> Result<Vec<Device>> {
        let adapter = default_adapter().await?;
        let mut bonded = Vec::new();

        for address in adapter.device_addresses().await.map_err(session_error)? {
            let device = adapter.device(address).map_err(session_error)?;
            if !device.is_paired().await.unwrap_or(false) {
                continue;
            }

            let mut entry = Device::new(address.to_string(), device.name().await.ok().flatten())
                .with_bond_state(BondState::Bonded);
            if let Ok(Some(class)) = device.class().await {
                entry = entry.with_class(class);
            }
            if let Ok(Some(rssi)) = device.rssi().await {
                entry = entry.with_rssi(rssi);
            }
            bonded.push(entry);
        }

        debug!("{} bonded device(s)", bonded.len());
        Ok(bonded)
    }

    pub(super) async fn open_serial(device: &Device, channel: u8) -> Result<SerialStream> {
        let address: Address = device.id.parse().map_err(|_| Error::ConnectionFailed {
            reason: format!("{} is not a Classic address", device.id),
        })?;

        let stream = Stream::connect(SocketAddr::new(address, channel))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
                _ => Error::ConnectionFailed {
                    reason: format!("RFCOMM channel {}: {}", channel, e),
                },
            })?;

        info!("Serial socket open to {} on channel {}", address, channel);
        Ok(Box::new(stream))
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use crate::backend::SerialStream;
    use crate::device::Device;
    use crate::error::{Error, Result};

    pub(super) async fn bonded_devices() -> Result<Vec<Device>> {
        Ok(Vec::new())
    }

    pub(super) async fn open_serial(_device: &Device, _channel: u8) -> Result<SerialStream> {
        Err(Error::ConnectionFailed {
            reason: "serial profile not supported on this platform".to_string(),
        })
    }
}

/// Devices paired with this host.
pub(crate) async fn bonded_devices() -> Result<Vec<Device>> {
    imp::bonded_devices().await
}

/// Open a serial-profile socket to `device` on `channel`.
pub(crate) async fn open_serial(device: &Device, channel: u8) -> Result<SerialStream> {
    imp::open_serial(device, channel).await
}
