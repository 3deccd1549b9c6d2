//! USB access layer
//!
//! The printer session talks to USB hardware only through the traits in this
//! module. `rusb_backend` implements them on top of libusb; the in-memory
//! implementation in `crate::test_utils` backs the tests.
//!
//! The traits mirror the small set of libusb operations a printer session
//! needs: enumerate, open, query/detach/attach the kernel driver, claim and
//! release an interface, and write a bulk endpoint. Closing a device is
//! dropping its handle.

pub mod rusb_backend;

pub use rusb_backend::{RusbBus, map_rusb_error};

use common::UsbError;
use std::time::Duration;

/// Identifiers read from a device descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIds {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Summary of an attached device, for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Endpoint descriptor of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Endpoint address (bit 7 set for IN endpoints)
    pub address: u8,
    /// Transfer type of the endpoint
    pub transfer_type: rusb::TransferType,
}

impl EndpointInfo {
    /// Bulk OUT endpoint with the given address
    pub fn bulk_out(address: u8) -> Self {
        Self {
            address: address & 0x7f,
            transfer_type: rusb::TransferType::Bulk,
        }
    }

    /// Bulk IN endpoint with the given address
    pub fn bulk_in(address: u8) -> Self {
        Self {
            address: address | 0x80,
            transfer_type: rusb::TransferType::Bulk,
        }
    }

    /// Endpoint number (address without the direction bit)
    pub fn number(&self) -> u8 {
        self.address & 0x0f
    }

    pub fn is_bulk_out(&self) -> bool {
        self.transfer_type == rusb::TransferType::Bulk && (self.address & 0x80) == 0
    }
}

/// Source of attached USB devices
pub trait UsbBus: Send + 'static {
    type Device: UsbDevice;

    /// Snapshot of the currently attached devices
    fn devices(&self) -> Result<Vec<Self::Device>, UsbError>;
}

/// An attached, not yet opened USB device
pub trait UsbDevice: Send {
    type Handle: UsbHandle;

    /// Vendor and product ID from the device descriptor
    fn ids(&self) -> Result<DeviceIds, UsbError>;

    fn bus_number(&self) -> u8;

    fn address(&self) -> u8;

    /// Open the device
    fn open(&self) -> Result<Self::Handle, UsbError>;

    /// Endpoints of `interface` in the active configuration
    ///
    /// Returns `None` if the active configuration has no such interface.
    fn interface_endpoints(&self, interface: u8) -> Result<Option<Vec<EndpointInfo>>, UsbError>;
}

/// An opened USB device; dropping it closes the device
pub trait UsbHandle: Send {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, UsbError>;

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), UsbError>;

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), UsbError>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), UsbError>;

    fn release_interface(&mut self, interface: u8) -> Result<(), UsbError>;

    /// Write `data` to the bulk OUT endpoint at `endpoint`, returning the
    /// number of bytes the device accepted
    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, UsbError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_direction() {
        let out = EndpointInfo::bulk_out(0x01);
        assert!(out.is_bulk_out());
        assert_eq!(out.number(), 1);

        let input = EndpointInfo::bulk_in(0x02);
        assert!(!input.is_bulk_out());
        assert_eq!(input.address, 0x82);
        assert_eq!(input.number(), 2);
    }

    #[test]
    fn test_interrupt_endpoint_is_not_bulk_out() {
        let endpoint = EndpointInfo {
            address: 0x03,
            transfer_type: rusb::TransferType::Interrupt,
        };
        assert!(!endpoint.is_bulk_out());
    }
}
