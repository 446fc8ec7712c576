//! # thermal-printer-ble
//!
//! A cross-platform Rust driver layer for ESC/POS thermal receipt printers
//! over Bluetooth.
//!
//! Printers that look like serial-profile devices are opened over Bluetooth
//! Classic first, falling back to a BLE GATT link when that fails. Payloads
//! are delivered in order, in fixed-size chunks over BLE, with one job in
//! flight at a time.
//!
//! ## Features
//!
//! - **Discovery**: Time-bounded scans that merge bonded printers with live advertisements
//! - **Transport Fallback**: Classic serial profile first, BLE GATT second
//! - **Raster Graphics**: Base64 images and QR codes thresholded to 1-bit `GS v 0` frames
//! - **Receipt Layout**: Styled text, two-column lines, and paper cuts
//! - **Events**: Device and connection notifications via channels or callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use thermal_printer_ble::{PrinterManager, Result, TextStyle};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = PrinterManager::new().await?;
//!
//!     let printers = manager.scan_devices().await?;
//!     let Some(printer) = printers.first() else {
//!         return Ok(());
//!     };
//!
//!     manager.connect(&printer.id).await?;
//!     manager.print_text("Hello", TextStyle::centered()).await?;
//!     manager.print_two_columns("Coffee x2", "$5.00", 58).await?;
//!     manager.print_qr_code("https://example.com", 58).await?;
//!     manager.cut_paper().await?;
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. Bonded-device lookup and Classic sockets use BlueZ
//! directly. The user may need to be in the `bluetooth` group.
//!
//! ### macOS and Windows
//! Only BLE is available, so every connection takes the GATT path.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod backend;
pub mod ble;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod transmit;

// Re-exports for convenience
pub use backend::{
    BluetoothBackend, CharacteristicProperties, GattCharacteristic, GattLink, PlatformEvent,
    PlatformEventSender, SerialStream,
};
pub use ble::BtleplugBackend;
pub use config::ManagerConfig;
pub use connection::{ConnectionState, FailureReason, TransportKind};
pub use device::{BondState, Device};
pub use error::{Error, Result};
pub use events::{CallbackHandle, ConnectionStatus, PrinterEvent};
pub use manager::PrinterManager;
pub use protocol::{Alignment, PaperWidth, PrintJob, TextStyle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<PrinterManager>();
        let _ = std::any::TypeId::of::<ManagerConfig>();
        let _ = std::any::TypeId::of::<Device>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<ConnectionState>();
        let _ = std::any::TypeId::of::<PrinterEvent>();
        let _ = std::any::TypeId::of::<PrintJob>();
    }
}
