//! usb-printer
//!
//! Sends pre-encoded print data (ESC/POS or any other printer language) to a
//! USB receipt printer.

mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::{ConnectOptions, PrinterEvent, setup_logging};
use config::{AppConfig, parse_usb_id};
use printer::{Printer, PrinterError, RawJob, RusbBus};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-printer")]
#[command(author, version, about = "Send raw print jobs to a USB receipt printer")]
#[command(long_about = "
Claims a USB receipt printer, writes each given file to its bulk OUT endpoint
and releases the printer again. Files must already be encoded in the printer's
command language.

EXAMPLES:
    # Print a receipt with the configured printer
    usb-printer receipt.bin

    # Print from stdin to a specific printer
    usb-printer --vendor-id 0x04b8 --product-id 0x0e15 - < receipt.bin

    # List attached USB devices
    usb-printer --list-devices

    # Run with debug logging
    usb-printer --log-level debug receipt.bin

CONFIGURATION:
    The tool looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-printer/config.toml
    3. /etc/usb-printer/config.toml
    4. Built-in defaults (Epson TM printer 04b8:0202, endpoint 1)
")]
struct Args {
    /// Files with print data, `-` reads stdin
    #[arg(value_name = "FILE", required_unless_present_any = ["list_devices", "save_config"])]
    files: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// USB vendor ID of the printer (decimal, or hex with 0x)
    #[arg(long, value_name = "VID", value_parser = parse_usb_id)]
    vendor_id: Option<u16>,

    /// USB product ID of the printer (decimal, or hex with 0x)
    #[arg(long, value_name = "PID", value_parser = parse_usb_id)]
    product_id: Option<u16>,

    /// Bulk OUT endpoint number
    #[arg(long, value_name = "NUM", value_parser = clap::value_parser!(u8).range(1..=15))]
    endpoint: Option<u8>,

    /// Interface number to claim
    #[arg(long, value_name = "NUM")]
    interface: Option<u8>,

    /// Bulk transfer timeout in milliseconds (0 waits forever)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let path = AppConfig::default_path();
        AppConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match args.config {
        Some(ref path) => config::load_config(path),
        None => AppConfig::load(None),
    }
    .context("Failed to load configuration")?;

    // Use CLI log level if specified, otherwise use config value
    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    setup_logging(log_level).context("Failed to setup logging")?;

    if args.list_devices {
        return list_devices();
    }

    let mut printer_config = config.printer.clone();
    if let Some(interface) = args.interface {
        printer_config.interface = interface;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        printer_config.transfer_timeout_ms = timeout_ms;
    }

    let options = ConnectOptions {
        vendor_id: args.vendor_id,
        product_id: args.product_id,
        endpoint: args.endpoint,
    };

    let jobs = args
        .files
        .iter()
        .map(|path| load_job(path).map(|job| (path.as_path(), job)))
        .collect::<Result<Vec<_>>>()?;

    let (printer, worker_thread) =
        Printer::open(printer_config).context("Failed to start printer worker")?;

    let mut events = printer.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PrinterEvent::Connected {
                    vendor_id,
                    product_id,
                } => info!("Connected to {:04x}:{:04x}", vendor_id, product_id),
                PrinterEvent::Printed { bytes } => info!("Printed {} bytes", bytes),
                PrinterEvent::Disconnected => info!("Disconnected"),
                PrinterEvent::Error(e) => error!("Printer error: {}", e),
            }
        }
    });

    let result = print_jobs(&printer, options, &jobs).await;

    if let Err(e) = printer.shutdown().await {
        warn!("Printer worker already stopped: {}", e);
    }
    tokio::task::spawn_blocking(move || worker_thread.join())
        .await
        .context("Failed to join printer worker")?
        .map_err(|_| anyhow::anyhow!("Printer worker panicked"))?;
    event_logger.abort();

    result
}

/// Connect, print every job, disconnect
async fn print_jobs(
    printer: &Printer,
    options: ConnectOptions,
    jobs: &[(&Path, RawJob)],
) -> Result<()> {
    printer
        .connect(options)
        .await
        .context("Failed to connect to printer")?;

    let mut printed = Ok(());
    for (path, job) in jobs {
        if job.is_empty() {
            warn!("Skipping empty print job: {}", path.display());
            continue;
        }
        if let Err(e) = printer.print(job).await {
            printed = Err(e).with_context(|| format!("Failed to print {}", path.display()));
            break;
        }
    }

    match printer.disconnect().await {
        Ok(()) => {}
        Err(e @ PrinterError::Release { .. }) => {
            warn!("Forcing printer closed: {}", e);
            printer.force_close().await.context("Failed to close printer")?;
            if printed.is_ok() {
                bail!("Failed to release printer: {}", e);
            }
        }
        Err(e) => return Err(e).context("Failed to disconnect printer"),
    }

    printed
}

fn load_job(path: &Path) -> Result<RawJob> {
    if path == Path::new("-") {
        RawJob::from_reader(std::io::stdin().lock()).context("Failed to read print data from stdin")
    } else {
        RawJob::from_file(path)
            .with_context(|| format!("Failed to read print data: {}", path.display()))
    }
}

fn list_devices() -> Result<()> {
    let bus = RusbBus::new().context("Failed to initialize USB")?;
    let devices = bus.list_devices().context("Failed to list USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found");
        return Ok(());
    }

    println!("{:<5} {:<5} {:<10}", "BUS", "ADDR", "ID");
    for device in devices {
        println!(
            "{:<5} {:<5} {:04x}:{:04x}",
            device.bus_number, device.address, device.vendor_id, device.product_id
        );
    }
    Ok(())
}
