//! System Bluetooth backend.
//!
//! BLE scanning and GATT writes go through btleplug. Bonded-device lookup
//! and serial-profile sockets go through BlueZ where available.

mod backend;
pub mod characteristics;
mod classic;
mod scanner;

pub use backend::BtleplugBackend;
pub use characteristics::BtleplugGattLink;
