//! Printer session state machine
//!
//! A session starts `Disconnected`. `connect` locates the printer and claims
//! its interface, `print` writes jobs to the claimed interface and
//! `disconnect` releases it again. If the release fails the session becomes
//! `Degraded`: the device handle is still held, every operation except
//! `force_close` is rejected, and `force_close` drops the handle
//! unconditionally.
//!
//! The device handle lives inside the `Connected`/`Degraded` state variants,
//! so a session holds a handle exactly when it is not `Disconnected`.
//!
//! Lifecycle events are published on a broadcast channel. A session has no
//! internal locking; the worker thread owning it runs one operation at a
//! time.

use crate::interface::{self, ClaimedInterface, ReleaseFailure};
use crate::job::PrintJob;
use crate::locator;
use crate::transfer;
use crate::usb::{UsbBus, UsbDevice};
use common::{ConnectOptions, ConnectionState, PrinterConfig, PrinterError, PrinterEvent, Target};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

type HandleOf<B> = <<B as UsbBus>::Device as UsbDevice>::Handle;

/// A claimed printer interface and the target it was resolved from
struct Connection<B: UsbBus> {
    claimed: ClaimedInterface<HandleOf<B>>,
    target: Target,
}

enum SessionState<B: UsbBus> {
    Disconnected,
    Connected(Connection<B>),
    Degraded(Connection<B>),
}

/// Lifecycle of one USB receipt printer
pub struct PrinterSession<B: UsbBus> {
    bus: B,
    config: PrinterConfig,
    state: SessionState<B>,
    events: broadcast::Sender<PrinterEvent>,
}

impl<B: UsbBus> PrinterSession<B> {
    /// Create a disconnected session
    pub fn new(bus: B, config: PrinterConfig, events: broadcast::Sender<PrinterEvent>) -> Self {
        Self {
            bus,
            config,
            state: SessionState::Disconnected,
            events,
        }
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        match self.state {
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Connected(_) => ConnectionState::Connected,
            SessionState::Degraded(_) => ConnectionState::Degraded,
        }
    }

    /// Target of the current connection, if any
    pub fn target(&self) -> Option<Target> {
        match &self.state {
            SessionState::Disconnected => None,
            SessionState::Connected(connection) | SessionState::Degraded(connection) => {
                Some(connection.target)
            }
        }
    }

    /// Locate the printer and claim its interface
    ///
    /// Overrides in `options` replace the configured identifiers for this
    /// connection. On failure the session stays `Disconnected` and no event
    /// is published.
    pub fn connect(&mut self, options: ConnectOptions) -> Result<(), PrinterError> {
        match self.state {
            SessionState::Disconnected => {}
            SessionState::Connected(_) => return Err(PrinterError::AlreadyConnected),
            SessionState::Degraded(_) => return Err(PrinterError::Degraded),
        }

        let target = self.config.resolve(&options);
        info!(
            "Connecting to printer {:04x}:{:04x} (interface {}, endpoint {})",
            target.vendor_id, target.product_id, target.interface, target.endpoint
        );

        let device = locator::locate(&self.bus, target.vendor_id, target.product_id)
            .inspect_err(|e| warn!("Connect failed: {}", e))?;
        let claimed = interface::claim(&device, target.interface)
            .inspect_err(|e| warn!("Connect failed: {}", e))?;
        debug!(
            "Interface {} endpoints: {:?} (kernel driver detached: {})",
            claimed.interface(),
            claimed.endpoints(),
            claimed.kernel_driver_detached()
        );

        self.state = SessionState::Connected(Connection { claimed, target });
        info!(
            "Printer {:04x}:{:04x} connected",
            target.vendor_id, target.product_id
        );

        self.emit(PrinterEvent::Connected {
            vendor_id: target.vendor_id,
            product_id: target.product_id,
        });
        Ok(())
    }

    /// Write a print job to the printer
    ///
    /// Rejected without any USB I/O unless the session is `Connected`.
    /// Returns the number of bytes written.
    pub fn print<J: PrintJob + ?Sized>(&mut self, job: &J) -> Result<usize, PrinterError> {
        let connection = match &self.state {
            SessionState::Connected(connection) => connection,
            SessionState::Disconnected => return Err(PrinterError::NotConnected),
            SessionState::Degraded(_) => return Err(PrinterError::Degraded),
        };

        let data = job.print_data();
        let result = transfer::transfer(
            &connection.claimed,
            connection.target.endpoint,
            &data,
            self.config.transfer_timeout(),
        );

        match result {
            Ok(bytes) => {
                debug!("Printed {} bytes", bytes);
                self.emit(PrinterEvent::Printed { bytes });
                Ok(bytes)
            }
            Err(e) => {
                warn!("Print failed: {}", e);
                self.emit(PrinterEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    /// Release the interface, reattach the kernel driver and close the device
    ///
    /// If the interface cannot be released the session becomes `Degraded`,
    /// keeps the handle, and the error is both returned and published once.
    pub fn disconnect(&mut self) -> Result<(), PrinterError> {
        let connection = match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Connected(connection) => connection,
            SessionState::Disconnected => return Err(PrinterError::NotConnected),
            degraded @ SessionState::Degraded(_) => {
                self.state = degraded;
                return Err(PrinterError::Degraded);
            }
        };

        let Connection { claimed, target } = connection;
        match interface::release(claimed) {
            Ok(()) => {
                info!(
                    "Printer {:04x}:{:04x} disconnected",
                    target.vendor_id, target.product_id
                );
                self.emit(PrinterEvent::Disconnected);
                Ok(())
            }
            Err(ReleaseFailure { claimed, error }) => {
                error!("Disconnect failed, session degraded: {}", error);
                self.state = SessionState::Degraded(Connection { claimed, target });
                self.emit(PrinterEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Close the device unconditionally
    ///
    /// The only way out of `Degraded`. Also accepted while `Connected`.
    pub fn force_close(&mut self) -> Result<(), PrinterError> {
        let connection = match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Disconnected => return Err(PrinterError::NotConnected),
            SessionState::Connected(connection) | SessionState::Degraded(connection) => connection,
        };

        interface::force_close(connection.claimed);
        info!(
            "Printer {:04x}:{:04x} force closed",
            connection.target.vendor_id, connection.target.product_id
        );
        self.emit(PrinterEvent::Disconnected);
        Ok(())
    }

    fn emit(&self, event: PrinterEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscribers");
        }
    }
}

impl<B: UsbBus> Drop for PrinterSession<B> {
    fn drop(&mut self) {
        match self.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected => {
                debug!("Session dropped while connected, disconnecting");
                if self.disconnect().is_err() {
                    let _ = self.force_close();
                }
            }
            ConnectionState::Degraded => {
                let _ = self.force_close();
            }
        }
    }
}
