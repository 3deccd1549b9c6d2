//! Common error types

use crate::types::{ClaimStage, UsbError};
use thiserror::Error;

/// Ambient errors (configuration, channels, I/O)
#[derive(Debug, Error)]
pub enum Error {
    #[error("USB error: {0}")]
    Usb(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by printer session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrinterError {
    /// No attached device matches the identifiers
    #[error("No USB device found with VID={vendor_id:04x} PID={product_id:04x}")]
    NotFound { vendor_id: u16, product_id: u16 },

    /// A step of the interface claim protocol failed
    #[error("Failed to {stage}: {source}")]
    Claim {
        stage: ClaimStage,
        #[source]
        source: UsbError,
    },

    /// The claimed interface could not be released
    #[error("Failed to release interface {interface}: {source}")]
    Release {
        interface: u8,
        #[source]
        source: UsbError,
    },

    /// The bulk write failed
    #[error("Bulk transfer to endpoint {endpoint:#04x} failed: {source}")]
    Transfer {
        endpoint: u8,
        #[source]
        source: UsbError,
    },

    /// The device accepted fewer bytes than were sent
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Operation requires a connected printer
    #[error("Printer is not connected")]
    NotConnected,

    /// Connect called on a connected session
    #[error("Printer is already connected")]
    AlreadyConnected,

    /// Interface release failed earlier; only a forced close is accepted
    #[error("Printer session is degraded, force close required")]
    Degraded,

    /// USB access layer failure outside the claim/transfer/release steps
    #[error("USB error: {0}")]
    Usb(UsbError),

    /// The USB worker thread is gone
    #[error("Printer worker is not running")]
    WorkerUnavailable,
}
