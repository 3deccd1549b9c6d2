//! Shared printer session types
//!
//! These types cross the boundary between the async caller side and the
//! USB worker thread, so they are all `Clone + Send`.

use crate::error::PrinterError;
use std::fmt;

/// USB-level error
///
/// Mirrors the libusb error codes that matter to a printer session. The
/// USB layer converts its native errors into this type so that errors can be
/// cloned, compared and published on the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbError {
    /// Transfer timed out
    Timeout,
    /// Endpoint stalled (protocol error)
    Pipe,
    /// Device was disconnected
    NoDevice,
    /// Device, interface or endpoint not found
    NotFound,
    /// Device or interface is busy
    Busy,
    /// Buffer overflow
    Overflow,
    /// I/O error
    Io,
    /// Invalid parameter
    InvalidParam,
    /// Access denied (permissions)
    Access,
    /// Operation not supported on this platform
    NotSupported,
    /// Other error with message
    Other { message: String },
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::Timeout => write!(f, "operation timed out"),
            UsbError::Pipe => write!(f, "endpoint stalled"),
            UsbError::NoDevice => write!(f, "device disconnected"),
            UsbError::NotFound => write!(f, "entity not found"),
            UsbError::Busy => write!(f, "resource busy"),
            UsbError::Overflow => write!(f, "overflow"),
            UsbError::Io => write!(f, "input/output error"),
            UsbError::InvalidParam => write!(f, "invalid parameter"),
            UsbError::Access => write!(f, "access denied (insufficient permissions)"),
            UsbError::NotSupported => write!(f, "operation not supported on this platform"),
            UsbError::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for UsbError {}

/// Step of the interface claim protocol that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStage {
    /// Opening the device
    Open,
    /// Selecting the interface in the active configuration
    SelectInterface,
    /// Detaching the kernel driver bound to the interface
    DetachKernelDriver,
    /// Claiming the interface
    Claim,
}

impl fmt::Display for ClaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ClaimStage::Open => "open device",
            ClaimStage::SelectInterface => "select interface",
            ClaimStage::DetachKernelDriver => "detach kernel driver",
            ClaimStage::Claim => "claim interface",
        };
        f.write_str(stage)
    }
}

/// Observable connection state of a printer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No device handle is held
    #[default]
    Disconnected,
    /// Interface claimed, ready to print
    Connected,
    /// Interface release failed; the device handle is still held and only
    /// a forced close is accepted
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
        };
        f.write_str(state)
    }
}

/// Lifecycle notification published by a printer session
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterEvent {
    /// Interface claimed on the printer with these identifiers
    Connected { vendor_id: u16, product_id: u16 },
    /// A print job was written to the printer
    Printed { bytes: usize },
    /// The device was released and closed
    Disconnected,
    /// An operation failed after the device was touched
    Error(PrinterError),
}
