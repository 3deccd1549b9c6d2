//! Device lookup by vendor and product ID

use crate::usb::{UsbBus, UsbDevice};
use common::PrinterError;
use tracing::debug;

/// Find the first attached device with the given vendor and product ID
///
/// Devices whose descriptor cannot be read are skipped.
pub fn locate<B: UsbBus>(
    bus: &B,
    vendor_id: u16,
    product_id: u16,
) -> Result<B::Device, PrinterError> {
    let devices = bus.devices().map_err(PrinterError::Usb)?;

    devices
        .into_iter()
        .find(|device| match device.ids() {
            Ok(ids) => ids.vendor_id == vendor_id && ids.product_id == product_id,
            Err(e) => {
                debug!(
                    "Skipping device bus={} addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                false
            }
        })
        .inspect(|device| {
            debug!(
                "Found device {:04x}:{:04x} at bus={} addr={}",
                vendor_id,
                product_id,
                device.bus_number(),
                device.address()
            )
        })
        .ok_or(PrinterError::NotFound {
            vendor_id,
            product_id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBus, MockDeviceSpec};
    use common::UsbError;

    #[test]
    fn test_locate_matching_device() {
        let bus = MockBus::with_devices(vec![
            MockDeviceSpec::printer(0x046d, 0xc52b),
            MockDeviceSpec::printer(0x04b8, 0x0202),
        ]);

        let device = locate(&bus, 0x04b8, 0x0202).unwrap();
        assert_eq!(device.address(), 2);
    }

    #[test]
    fn test_locate_returns_first_match() {
        let bus = MockBus::with_devices(vec![
            MockDeviceSpec::printer(0x04b8, 0x0202),
            MockDeviceSpec::printer(0x04b8, 0x0202),
        ]);

        let device = locate(&bus, 0x04b8, 0x0202).unwrap();
        assert_eq!(device.address(), 1);
    }

    #[test]
    fn test_locate_not_found() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);

        let err = locate(&bus, 0x04b8, 0x0e15).err().unwrap();
        assert_eq!(
            err,
            PrinterError::NotFound {
                vendor_id: 0x04b8,
                product_id: 0x0e15,
            }
        );
    }

    #[test]
    fn test_locate_has_no_side_effects() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        let _ = locate(&bus, 0x04b8, 0x0202).unwrap();
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_locate_enumeration_failure() {
        let bus = MockBus::with_printer(0x04b8, 0x0202);
        bus.fail(|f| f.enumerate = Some(UsbError::NoDevice));

        let err = locate(&bus, 0x04b8, 0x0202).err().unwrap();
        assert_eq!(err, PrinterError::Usb(UsbError::NoDevice));
    }
}
