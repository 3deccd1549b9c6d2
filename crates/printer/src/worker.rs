//! Printer USB worker thread
//!
//! Dedicated thread owning the printer session. USB calls block, so they
//! run here instead of on the Tokio runtime; callers talk to the thread
//! through the channel bridge.
//!
//! Commands are processed strictly one at a time in arrival order. This is
//! what keeps concurrent `print` calls from interleaving on the bulk
//! endpoint.

use crate::session::PrinterSession;
use crate::usb::UsbBus;
use common::{PrinterCommand, PrinterConfig, PrinterWorker};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Printer worker thread
///
/// Owns the session and processes commands from the Tokio runtime.
pub struct PrinterWorkerThread<B: UsbBus> {
    /// Session state machine
    session: PrinterSession<B>,
    /// Communication channel with Tokio runtime
    worker: PrinterWorker,
}

impl<B: UsbBus> PrinterWorkerThread<B> {
    /// Create a new worker owning a disconnected session
    pub fn new(worker: PrinterWorker, bus: B, config: PrinterConfig) -> Self {
        let session = PrinterSession::new(bus, config, worker.event_tx.clone());
        Self { session, worker }
    }

    /// Run the worker loop
    ///
    /// Returns on `Shutdown` or once every bridge handle is dropped. A live
    /// connection is torn down when the session is dropped on return.
    pub fn run(mut self) {
        info!("Printer worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(PrinterCommand::Shutdown) => {
                    info!("Printer worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => {
                    debug!("All printer handles dropped");
                    break;
                }
            }
        }

        info!("Printer worker thread stopped");
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: PrinterCommand) {
        // Wrap in catch_unwind to prevent panics from crashing the USB thread
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in printer command handler: {:?}", e);
        }
    }

    /// Inner command handler (can panic, caught by handle_command)
    fn handle_command_inner(&mut self, cmd: PrinterCommand) {
        match cmd {
            PrinterCommand::Connect { options, response } => {
                debug!("Connect with {:?}", options);
                reply(response, self.session.connect(options), "connect");
            }

            PrinterCommand::Print { data, response } => {
                debug!("Print job of {} bytes", data.len());
                reply(response, self.session.print(&data), "print");
            }

            PrinterCommand::Disconnect { response } => {
                debug!("Disconnect");
                reply(response, self.session.disconnect(), "disconnect");
            }

            PrinterCommand::ForceClose { response } => {
                debug!("Force close");
                reply(response, self.session.force_close(), "force close");
            }

            PrinterCommand::State { response } => {
                reply(response, self.session.state(), "state");
            }

            PrinterCommand::Shutdown => {
                // Already handled in run loop
                unreachable!()
            }
        }
    }
}

/// Send an operation result back to its caller
///
/// The operation has already taken effect even if the caller stopped
/// waiting for it.
fn reply<T>(response: oneshot::Sender<T>, result: T, operation: &str) {
    if response.send(result).is_err() {
        debug!("Caller gone before {} completed, result dropped", operation);
    }
}

/// Spawn the printer worker thread
///
/// The thread runs until a Shutdown command is received or every bridge
/// handle is dropped.
pub fn spawn_printer_worker<B: UsbBus>(
    worker: PrinterWorker,
    bus: B,
    config: PrinterConfig,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("printer-usb".to_string())
        .spawn(move || PrinterWorkerThread::new(worker, bus, config).run())
}
