//! In-memory USB bus for testing
//!
//! `MockBus` implements the USB access layer traits without hardware. Every
//! call made through it is recorded, kernel driver and claim state are
//! tracked like the kernel would, and individual operations can be made to
//! fail.
//!
//! # Example
//!
//! ```
//! use printer::test_utils::MockBus;
//! use printer::{PrinterSession, PrinterConfig, ConnectOptions};
//!
//! let bus = MockBus::with_printer(0x04b8, 0x0202);
//! let (events, _) = tokio::sync::broadcast::channel(16);
//! let mut session = PrinterSession::new(bus.clone(), PrinterConfig::default(), events);
//!
//! session.connect(ConnectOptions::default()).unwrap();
//! session.print(&[0x1bu8, 0x40]).unwrap();
//! assert_eq!(bus.written(0x01), vec![0x1b, 0x40]);
//! ```

use crate::usb::{DeviceIds, EndpointInfo, UsbBus, UsbDevice, UsbHandle};
use common::UsbError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A USB operation recorded by the mock bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbCall {
    Open,
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    AttachKernelDriver(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    WriteBulk { endpoint: u8, data: Vec<u8> },
    Close,
}

/// Failures to inject into mock USB operations
#[derive(Debug, Clone, Default)]
pub struct MockFailures {
    pub enumerate: Option<UsbError>,
    pub open: Option<UsbError>,
    pub kernel_driver_query: Option<UsbError>,
    pub detach: Option<UsbError>,
    pub claim: Option<UsbError>,
    pub release: Option<UsbError>,
    pub attach: Option<UsbError>,
    pub write: Option<UsbError>,
    /// Accept only this many bytes per bulk write
    pub short_write: Option<usize>,
}

/// Shared state of the mock bus
#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<UsbCall>,
    /// A kernel driver is bound to the printer interface
    pub kernel_driver_bound: bool,
    /// Interfaces currently claimed
    pub claimed: Vec<u8>,
    /// Handles opened and not yet dropped
    pub open_handles: usize,
    pub failures: MockFailures,
}

/// Description of one attached mock device
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub endpoints: Vec<EndpointInfo>,
}

impl MockDeviceSpec {
    /// A receipt printer with bulk OUT endpoint 0x01 and bulk IN 0x82 on interface 0
    pub fn printer(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            interface: 0,
            endpoints: vec![EndpointInfo::bulk_out(0x01), EndpointInfo::bulk_in(0x82)],
        }
    }
}

/// In-memory USB bus
#[derive(Clone, Default)]
pub struct MockBus {
    devices: Vec<MockDeviceSpec>,
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// Bus without any attached device
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bus with one printer attached and its kernel driver bound
    pub fn with_printer(vendor_id: u16, product_id: u16) -> Self {
        Self::with_devices(vec![MockDeviceSpec::printer(vendor_id, product_id)])
    }

    /// Bus with the given devices attached and the kernel driver bound
    pub fn with_devices(devices: Vec<MockDeviceSpec>) -> Self {
        let bus = Self {
            devices,
            state: Arc::default(),
        };
        bus.state().kernel_driver_bound = true;
        bus
    }

    /// Lock the shared mock state
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Modify the injected failures
    pub fn fail(&self, f: impl FnOnce(&mut MockFailures)) {
        f(&mut self.state().failures);
    }

    /// Start without a kernel driver bound (platforms that do not auto-bind)
    pub fn unbind_kernel_driver(&self) {
        self.state().kernel_driver_bound = false;
    }

    pub fn calls(&self) -> Vec<UsbCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls equal to `call`
    pub fn count(&self, call: &UsbCall) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    /// Number of bulk writes performed
    pub fn write_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, UsbCall::WriteBulk { .. }))
            .count()
    }

    /// All bytes written to `endpoint`, concatenated
    pub fn written(&self, endpoint: u8) -> Vec<u8> {
        self.writes(endpoint).concat()
    }

    /// Individual bulk writes to `endpoint`, in order
    pub fn writes(&self, endpoint: u8) -> Vec<Vec<u8>> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                UsbCall::WriteBulk { endpoint: ep, data } if *ep == endpoint => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn kernel_driver_bound(&self) -> bool {
        self.state().kernel_driver_bound
    }

    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    pub fn claimed(&self) -> Vec<u8> {
        self.state().claimed.clone()
    }
}

impl UsbBus for MockBus {
    type Device = MockDevice;

    fn devices(&self) -> Result<Vec<MockDevice>, UsbError> {
        if let Some(err) = self.state().failures.enumerate.clone() {
            return Err(err);
        }

        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, spec)| MockDevice {
                spec: spec.clone(),
                address: index as u8 + 1,
                state: Arc::clone(&self.state),
            })
            .collect())
    }
}

/// Attached mock device
pub struct MockDevice {
    spec: MockDeviceSpec,
    address: u8,
    state: Arc<Mutex<MockState>>,
}

impl UsbDevice for MockDevice {
    type Handle = MockHandle;

    fn ids(&self) -> Result<DeviceIds, UsbError> {
        Ok(DeviceIds {
            vendor_id: self.spec.vendor_id,
            product_id: self.spec.product_id,
        })
    }

    fn bus_number(&self) -> u8 {
        1
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn open(&self) -> Result<MockHandle, UsbError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.calls.push(UsbCall::Open);
        if let Some(err) = state.failures.open.clone() {
            return Err(err);
        }
        state.open_handles += 1;

        Ok(MockHandle {
            state: Arc::clone(&self.state),
        })
    }

    fn interface_endpoints(&self, interface: u8) -> Result<Option<Vec<EndpointInfo>>, UsbError> {
        Ok((interface == self.spec.interface).then(|| self.spec.endpoints.clone()))
    }
}

/// Opened mock device
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl UsbHandle for MockHandle {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, UsbError> {
        let mut state = self.state();
        state.calls.push(UsbCall::KernelDriverActive(interface));
        match state.failures.kernel_driver_query.clone() {
            Some(err) => Err(err),
            None => Ok(state.kernel_driver_bound),
        }
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), UsbError> {
        let mut state = self.state();
        state.calls.push(UsbCall::DetachKernelDriver(interface));
        if let Some(err) = state.failures.detach.clone() {
            return Err(err);
        }
        if !state.kernel_driver_bound {
            return Err(UsbError::NotFound);
        }
        state.kernel_driver_bound = false;
        Ok(())
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), UsbError> {
        let mut state = self.state();
        state.calls.push(UsbCall::AttachKernelDriver(interface));
        if let Some(err) = state.failures.attach.clone() {
            return Err(err);
        }
        if state.kernel_driver_bound || state.claimed.contains(&interface) {
            return Err(UsbError::Busy);
        }
        state.kernel_driver_bound = true;
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        let mut state = self.state();
        state.calls.push(UsbCall::ClaimInterface(interface));
        if let Some(err) = state.failures.claim.clone() {
            return Err(err);
        }
        // The kernel refuses a claim while its own driver holds the interface
        if state.kernel_driver_bound || state.claimed.contains(&interface) {
            return Err(UsbError::Busy);
        }
        state.claimed.push(interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        let mut state = self.state();
        state.calls.push(UsbCall::ReleaseInterface(interface));
        if let Some(err) = state.failures.release.clone() {
            return Err(err);
        }
        if !state.claimed.contains(&interface) {
            return Err(UsbError::NotFound);
        }
        state.claimed.retain(|i| *i != interface);
        Ok(())
    }

    fn write_bulk(&self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, UsbError> {
        let mut state = self.state();
        if let Some(err) = state.failures.write.clone() {
            state.calls.push(UsbCall::WriteBulk {
                endpoint,
                data: Vec::new(),
            });
            return Err(err);
        }
        let accepted = state
            .failures
            .short_write
            .map_or(data.len(), |limit| limit.min(data.len()));
        state.calls.push(UsbCall::WriteBulk {
            endpoint,
            data: data[..accepted].to_vec(),
        });
        Ok(accepted)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(UsbCall::Close);
            state.open_handles = state.open_handles.saturating_sub(1);
            // Closing a handle releases whatever it still claims
            state.claimed.clear();
        }
    }
}
