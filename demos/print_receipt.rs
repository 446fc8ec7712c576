//! Example: Connect to a printer and print a sample receipt
//!
//! Run with: cargo run --example print_receipt -- <DEVICE_ID> [PAPER_MM]

use thermal_printer_ble::protocol::{Alignment, PaperWidth, PrintJob};
use thermal_printer_ble::{PrinterManager, Result, TextStyle};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thermal_printer_ble=debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(device_id) = args.next() else {
        eprintln!("usage: print_receipt <DEVICE_ID> [PAPER_MM]");
        return Ok(());
    };
    let paper_mm: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(58);
    let paper = PaperWidth::from_mm(paper_mm);

    let manager = PrinterManager::new().await?;

    let _handle = manager.on_connection_change(|status, id, error| match error {
        Some(error) => println!("[{}] {}: {}", status, id, error),
        None => println!("[{}] {}", status, id),
    });

    println!("Connecting to {}...", device_id);
    manager.connect(&device_id).await?;
    println!("Connected over {:?}\n", manager.transport_kind());

    let header = PrintJob::new()
        .init()
        .styled_text("CORNER CAFE", TextStyle::centered())
        .styled_text("Receipt #0042", TextStyle::centered())
        .feed(1)
        .two_columns("Coffee x2", "$5.00", paper)
        .two_columns("Blueberry muffin", "$3.25", paper)
        .two_columns("Oat milk", "$0.50", paper)
        .feed(1)
        .bold(true)
        .two_columns("TOTAL", "$8.75", paper)
        .bold(false)
        .align(Alignment::Center)
        .text_line("Thank you!")
        .align(Alignment::Left);
    manager.print_job(header).await?;

    manager.print_qr_code("https://example.com/r/0042", paper_mm).await?;
    manager.print_job(PrintJob::new().feed(3)).await?;
    manager.cut_paper().await?;

    println!("Receipt sent.");

    manager.shutdown().await?;
    Ok(())
}
