//! Adapter event pump.
//!
//! Translates btleplug central events into [`PlatformEvent`]s and keeps a
//! registry of the peripherals seen so far for later connection.

use btleplug::api::{BDAddr, Central, CentralEvent, CentralState, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, trace};

use crate::backend::{PlatformEvent, PlatformEventSender};
use crate::device::{normalize_identifier, Device};

/// Peripherals seen by the adapter, keyed by device identifier.
pub(crate) type PeripheralRegistry = Arc<RwLock<HashMap<String, Peripheral>>>;

/// Stable identifier for a peripheral.
///
/// The hardware address where the platform exposes one, otherwise the
/// platform's opaque peripheral id.
pub(crate) fn peripheral_identifier(address: BDAddr, id: &PeripheralId) -> String {
    if address == BDAddr::default() {
        normalize_identifier(&id.to_string())
    } else {
        normalize_identifier(&address.to_string())
    }
}

/// Read a peripheral's advertised properties into a [`Device`].
pub(crate) async fn describe_peripheral(peripheral: &Peripheral) -> Option<Device> {
    let properties = match peripheral.properties().await {
        Ok(Some(p)) => p,
        Ok(None) => return None,
        Err(e) => {
            trace!("Failed to read peripheral properties: {}", e);
            return None;
        }
    };

    let identifier = peripheral_identifier(properties.address, &peripheral.id());
    let mut device = Device::new(identifier, properties.local_name);
    if let Some(rssi) = properties.rssi {
        device = device.with_rssi(rssi);
    }
    if let Some(class) = properties.class {
        device = device.with_class(class);
    }
    Some(device)
}

/// Spawn the task that forwards adapter events until the queue closes.
pub(crate) fn spawn_event_pump(
    adapter: Adapter,
    registry: PeripheralRegistry,
    events: PlatformEventSender,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = stream.next().await {
            let Some(translated) = translate(event, &adapter, &registry).await else {
                continue;
            };
            if events.send(translated).is_err() {
                break;
            }
        }

        debug!("Adapter event pump ended");
    })
}

async fn translate(
    event: CentralEvent,
    adapter: &Adapter,
    registry: &PeripheralRegistry,
) -> Option<PlatformEvent> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let peripheral = adapter.peripheral(&id).await.ok()?;
            let device = describe_peripheral(&peripheral).await?;
            trace!("Advertisement from {}", device);
            registry.write().insert(device.id.clone(), peripheral);
            Some(PlatformEvent::DeviceDiscovered(device))
        }
        CentralEvent::DeviceConnected(id) => Some(PlatformEvent::Connected {
            id: lookup_identifier(registry, &id),
        }),
        CentralEvent::DeviceDisconnected(id) => Some(PlatformEvent::Disconnected {
            id: lookup_identifier(registry, &id),
        }),
        CentralEvent::StateUpdate(state) => {
            debug!("Adapter state update: {:?}", state);
            Some(PlatformEvent::StateUpdate {
                powered: state == CentralState::PoweredOn,
            })
        }
        _ => None,
    }
}

/// Map a platform peripheral id back to the identifier it was registered under.
fn lookup_identifier(registry: &PeripheralRegistry, id: &PeripheralId) -> String {
    registry
        .read()
        .iter()
        .find(|(_, p)| p.id() == *id)
        .map(|(key, _)| key.clone())
        .unwrap_or_else(|| normalize_identifier(&id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_prefers_address() {
        let address = BDAddr::from([0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc]);
        assert_eq!(address.to_string().to_uppercase(), "00:11:22:AA:BB:CC");
        assert_eq!(normalize_identifier(&address.to_string()), "00:11:22:AA:BB:CC");
    }
}
