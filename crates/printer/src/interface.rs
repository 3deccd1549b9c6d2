//! Interface claim and release
//!
//! Claiming an interface on Linux requires detaching any kernel driver bound
//! to it first (usblp binds to most receipt printers). The driver is
//! reattached when the interface is released so the device is handed back
//! to the OS in the state we found it.

use crate::usb::{EndpointInfo, UsbDevice, UsbHandle};
use common::{ClaimStage, PrinterError, UsbError};
use tracing::{debug, warn};

/// An interface with exclusive user-space access established
///
/// Owns the device handle; dropping a `ClaimedInterface` closes the device
/// without releasing the interface or reattaching the kernel driver, so it
/// should be consumed by [`release`] or [`force_close`] instead.
pub struct ClaimedInterface<H: UsbHandle> {
    handle: H,
    interface: u8,
    endpoints: Vec<EndpointInfo>,
    kernel_driver_detached: bool,
}

impl<H: UsbHandle> ClaimedInterface<H> {
    /// Interface number
    pub fn interface(&self) -> u8 {
        self.interface
    }

    /// Endpoints of the claimed interface
    pub fn endpoints(&self) -> &[EndpointInfo] {
        &self.endpoints
    }

    /// Whether claiming detached a kernel driver that must be reattached
    pub fn kernel_driver_detached(&self) -> bool {
        self.kernel_driver_detached
    }

    /// Address of the bulk OUT endpoint with the given number
    pub fn bulk_out_endpoint(&self, number: u8) -> Option<u8> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.is_bulk_out() && endpoint.number() == number)
            .map(|endpoint| endpoint.address)
    }

    pub(crate) fn handle(&self) -> &H {
        &self.handle
    }
}

/// Release failed; the interface is still claimed and the handle still open
pub struct ReleaseFailure<H: UsbHandle> {
    pub claimed: ClaimedInterface<H>,
    pub error: PrinterError,
}

/// Open `device` and claim `interface` for exclusive access
///
/// On failure nothing stays claimed, a detached kernel driver is
/// reattached and the handle is closed.
pub fn claim<D: UsbDevice>(
    device: &D,
    interface: u8,
) -> Result<ClaimedInterface<D::Handle>, PrinterError> {
    let mut handle = device.open().map_err(|e| {
        warn!("Failed to open device: {}", e);
        claim_error(ClaimStage::Open)(e)
    })?;

    debug!(
        "Opened device bus={} addr={}",
        device.bus_number(),
        device.address()
    );

    let endpoints = device
        .interface_endpoints(interface)
        .map_err(claim_error(ClaimStage::SelectInterface))?
        .ok_or_else(|| {
            warn!("Interface {} not present in active configuration", interface);
            claim_error(ClaimStage::SelectInterface)(UsbError::NotFound)
        })?;

    let kernel_driver_detached = detach_kernel_driver(&mut handle, interface)?;

    if let Err(e) = handle.claim_interface(interface) {
        warn!("Failed to claim interface {}: {}", interface, e);
        if kernel_driver_detached {
            reattach_kernel_driver(&mut handle, interface);
        }
        return Err(claim_error(ClaimStage::Claim)(e));
    }

    debug!("Claimed interface {}", interface);

    Ok(ClaimedInterface {
        handle,
        interface,
        endpoints,
        kernel_driver_detached,
    })
}

/// Release the interface, reattach the kernel driver and close the device
///
/// If the release itself fails the claimed interface is handed back inside
/// the [`ReleaseFailure`]; the caller decides what happens to the handle.
pub fn release<H: UsbHandle>(mut claimed: ClaimedInterface<H>) -> Result<(), ReleaseFailure<H>> {
    let interface = claimed.interface;

    if let Err(source) = claimed.handle.release_interface(interface) {
        warn!("Failed to release interface {}: {}", interface, source);
        return Err(ReleaseFailure {
            claimed,
            error: PrinterError::Release { interface, source },
        });
    }

    debug!("Released interface {}", interface);

    if claimed.kernel_driver_detached {
        reattach_kernel_driver(&mut claimed.handle, interface);
    }

    drop(claimed);
    debug!("Closed device");
    Ok(())
}

/// Close the device even if the interface cannot be released
///
/// Release and kernel driver reattach are attempted once; failures are
/// logged and ignored.
pub fn force_close<H: UsbHandle>(mut claimed: ClaimedInterface<H>) {
    let interface = claimed.interface;

    match claimed.handle.release_interface(interface) {
        Ok(()) => {
            debug!("Released interface {}", interface);
            if claimed.kernel_driver_detached {
                reattach_kernel_driver(&mut claimed.handle, interface);
            }
        }
        Err(e) => {
            warn!(
                "Closing device with interface {} still claimed: {}",
                interface, e
            );
            if claimed.kernel_driver_detached {
                warn!(
                    "Kernel driver for interface {} is not reattached; replug the printer to restore it",
                    interface
                );
            }
        }
    }

    drop(claimed);
    debug!("Force closed device");
}

fn claim_error(stage: ClaimStage) -> impl Fn(UsbError) -> PrinterError {
    move |source| PrinterError::Claim { stage, source }
}

/// Detach the kernel driver from `interface` if one is bound
///
/// Returns whether a driver was detached.
fn detach_kernel_driver<H: UsbHandle>(handle: &mut H, interface: u8) -> Result<bool, PrinterError> {
    match handle.kernel_driver_active(interface) {
        Ok(true) => {
            debug!("Detaching kernel driver from interface {}", interface);
            handle.detach_kernel_driver(interface).map_err(|source| {
                warn!(
                    "Failed to detach kernel driver from interface {}: {}",
                    interface, source
                );
                PrinterError::Claim {
                    stage: ClaimStage::DetachKernelDriver,
                    source,
                }
            })?;
            Ok(true)
        }
        Ok(false) => {
            debug!("No kernel driver active on interface {}", interface);
            Ok(false)
        }
        // Platforms without kernel driver support never auto-bind one
        Err(UsbError::NotSupported) => {
            debug!("Kernel driver query not supported on this platform");
            Ok(false)
        }
        Err(source) => Err(PrinterError::Claim {
            stage: ClaimStage::DetachKernelDriver,
            source,
        }),
    }
}

fn reattach_kernel_driver<H: UsbHandle>(handle: &mut H, interface: u8) {
    match handle.attach_kernel_driver(interface) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", interface),
        Err(e) => warn!(
            "Could not reattach kernel driver to interface {}: {}",
            interface, e
        ),
    }
}
