//! Common types for usb-receipt-printer
//!
//! This crate provides the types shared between the printer library and the
//! command-line tool: printer configuration, session errors and events, the
//! async channel bridge for USB thread communication, and logging setup.

pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod types;

pub use channel::{PrinterBridge, PrinterCommand, PrinterWorker, Reply, create_printer_bridge};
pub use config::{ConnectOptions, PrinterConfig, Target};
pub use error::{Error, PrinterError, Result};
pub use logging::setup_logging;
pub use types::{ClaimStage, ConnectionState, PrinterEvent, UsbError};
