//! libusb-backed USB access layer
//!
//! Implements the USB traits for `rusb` devices and handles, mapping rusb
//! errors to `common::UsbError`.

use super::{DeviceIds, DeviceSummary, EndpointInfo, UsbBus, UsbDevice, UsbHandle};
use common::UsbError;
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::debug;

/// USB bus backed by a libusb context
pub struct RusbBus {
    context: Context,
}

impl RusbBus {
    /// Create a new libusb context
    pub fn new() -> Result<Self, UsbError> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self { context })
    }

    /// List every attached device
    ///
    /// Devices whose descriptor cannot be read are skipped.
    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;

        Ok(devices
            .iter()
            .filter_map(|device| {
                let descriptor = device.device_descriptor().ok()?;
                Some(DeviceSummary {
                    bus_number: device.bus_number(),
                    address: device.address(),
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                })
            })
            .collect())
    }
}

impl UsbBus for RusbBus {
    type Device = Device<Context>;

    fn devices(&self) -> Result<Vec<Self::Device>, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        debug!("Enumerated {} USB devices", devices.len());
        Ok(devices.iter().collect())
    }
}

impl UsbDevice for Device<Context> {
    type Handle = DeviceHandle<Context>;

    fn ids(&self) -> Result<DeviceIds, UsbError> {
        let descriptor = self.device_descriptor().map_err(map_rusb_error)?;
        Ok(DeviceIds {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
        })
    }

    fn bus_number(&self) -> u8 {
        Device::bus_number(self)
    }

    fn address(&self) -> u8 {
        Device::address(self)
    }

    fn open(&self) -> Result<Self::Handle, UsbError> {
        Device::open(self).map_err(map_rusb_error)
    }

    fn interface_endpoints(&self, interface: u8) -> Result<Option<Vec<EndpointInfo>>, UsbError> {
        let config = self.active_config_descriptor().map_err(map_rusb_error)?;

        let Some(found) = config.interfaces().find(|i| i.number() == interface) else {
            return Ok(None);
        };

        // Printers expose a single alternate setting; use the first one.
        let endpoints: Vec<EndpointInfo> = found
            .descriptors()
            .next()
            .map(|descriptor| {
                descriptor
                    .endpoint_descriptors()
                    .map(|endpoint| EndpointInfo {
                        address: endpoint.address(),
                        transfer_type: endpoint.transfer_type(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(endpoints))
    }
}

impl UsbHandle for DeviceHandle<Context> {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, UsbError> {
        DeviceHandle::kernel_driver_active(self, interface).map_err(map_rusb_error)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), UsbError> {
        DeviceHandle::detach_kernel_driver(self, interface).map_err(map_rusb_error)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), UsbError> {
        DeviceHandle::attach_kernel_driver(self, interface).map_err(map_rusb_error)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        DeviceHandle::claim_interface(self, interface).map_err(map_rusb_error)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        DeviceHandle::release_interface(self, interface).map_err(map_rusb_error)
    }

    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, UsbError> {
        DeviceHandle::write_bulk(self, endpoint, data, timeout).map_err(map_rusb_error)
    }
}

/// Map rusb::Error to common::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        rusb::Error::NotSupported => UsbError::NotSupported,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}
