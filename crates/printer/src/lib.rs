//! USB receipt printer sessions
//!
//! Locates a printer by vendor/product ID, claims one of its interfaces
//! (detaching and later reattaching a kernel driver where one is bound),
//! writes pre-encoded print data to a bulk OUT endpoint and releases the
//! device again.
//!
//! The USB subsystem runs in a dedicated thread (worker) so blocking libusb
//! calls never stall the Tokio runtime:
//! - [`PrinterSession`]: the connect/print/disconnect state machine
//! - [`worker`]: the thread owning the session
//! - [`Printer`]: the async, cloneable handle callers use
//!
//! # Example
//!
//! ```no_run
//! use printer::{ConnectOptions, Printer, PrinterConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (printer, _thread) = Printer::open(PrinterConfig::default())?;
//! printer.connect(ConnectOptions::default()).await?;
//! printer.print(&[0x1bu8, 0x40]).await?;
//! printer.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod handle;
pub mod interface;
pub mod job;
pub mod locator;
pub mod session;
pub mod test_utils;
pub mod transfer;
pub mod usb;
pub mod worker;

// Re-export public types
pub use common::{
    ClaimStage, ConnectOptions, ConnectionState, PrinterConfig, PrinterError, PrinterEvent,
    Target, UsbError,
};
pub use handle::Printer;
pub use job::{PrintJob, RawJob};
pub use session::PrinterSession;
pub use usb::{RusbBus, UsbBus, UsbDevice, UsbHandle};
pub use worker::{PrinterWorkerThread, spawn_printer_worker};
