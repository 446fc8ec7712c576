//! Basic example: Discover nearby thermal printers
//!
//! Run with: cargo run --example discover_printers

use std::time::Duration;
use thermal_printer_ble::{ManagerConfig, PrinterManager, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thermal_printer_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Starting printer discovery...");
    println!("Make sure your printer is switched on!\n");

    let config = ManagerConfig::default().with_scan_timeout(Duration::from_secs(15));
    let manager = PrinterManager::with_config(config).await?;

    if !manager.is_bluetooth_enabled().await {
        println!("Bluetooth is off. Turn it on and try again.");
        return Ok(());
    }

    // Register callback for discovered devices
    let _handle = manager.on_device_found(|device| {
        println!("\nDiscovered device:");
        println!("  Name: {}", device.display_name());
        println!("  ID: {}", device.id);
        println!("  RSSI: {:?} dBm", device.rssi);
        println!("  Bonded: {}", device.is_bonded());
        println!("  Serial-profile printer: {}", device.is_printer_like());
    });

    println!("Scanning for 15 seconds...");
    println!("Press Ctrl+C to exit early.\n");

    let devices = tokio::select! {
        result = manager.scan_devices() => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
            manager.stop_scan().await
        }
    };

    println!("\n--- Scan Complete ---");
    println!("Total devices found: {}", devices.len());

    for device in &devices {
        println!("  {} (RSSI: {:?})", device, device.rssi);
    }

    manager.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
