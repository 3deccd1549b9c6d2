//! Async printer handle
//!
//! `Printer` is the caller-facing API. Each operation is sent to the worker
//! thread and the returned future resolves when the worker has finished it;
//! the `Result` is the completion signal. Lifecycle events are available
//! through [`Printer::subscribe`].

use crate::job::PrintJob;
use crate::usb::{RusbBus, UsbBus};
use crate::worker::spawn_printer_worker;
use common::{
    ConnectOptions, ConnectionState, PrinterBridge, PrinterCommand, PrinterConfig, PrinterError,
    PrinterEvent, Reply, create_printer_bridge,
};
use std::thread::JoinHandle;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

/// Cloneable async handle to a printer session running on its worker thread
#[derive(Clone)]
pub struct Printer {
    bridge: PrinterBridge,
}

impl Printer {
    /// Start a worker thread driving a session on `bus`
    ///
    /// The worker stops after [`Printer::shutdown`] or when the last clone
    /// of the handle is dropped.
    pub fn spawn<B: UsbBus>(
        bus: B,
        config: PrinterConfig,
    ) -> common::Result<(Self, JoinHandle<()>)> {
        config.validate()?;
        let (bridge, worker) = create_printer_bridge();
        let thread = spawn_printer_worker(worker, bus, config)?;
        Ok((Self { bridge }, thread))
    }

    /// Start a worker thread on the system USB bus
    pub fn open(config: PrinterConfig) -> common::Result<(Self, JoinHandle<()>)> {
        let bus = RusbBus::new().map_err(|e| common::Error::Usb(e.to_string()))?;
        Self::spawn(bus, config)
    }

    /// Subscribe to lifecycle events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.bridge.subscribe()
    }

    /// Locate the printer and claim its interface
    pub async fn connect(&self, options: ConnectOptions) -> Result<(), PrinterError> {
        self.request(|response| PrinterCommand::Connect { options, response })
            .await
    }

    /// Write a print job to the printer, returning the number of bytes written
    ///
    /// Concurrent calls are written one after another in the order they
    /// reach the worker.
    pub async fn print<J: PrintJob + ?Sized>(&self, job: &J) -> Result<usize, PrinterError> {
        let data = job.print_data();
        self.request(|response| PrinterCommand::Print { data, response })
            .await
    }

    /// Release the interface and close the device
    pub async fn disconnect(&self) -> Result<(), PrinterError> {
        self.request(|response| PrinterCommand::Disconnect { response })
            .await
    }

    /// Close the device even if the interface cannot be released
    pub async fn force_close(&self) -> Result<(), PrinterError> {
        self.request(|response| PrinterCommand::ForceClose { response })
            .await
    }

    pub async fn state(&self) -> Result<ConnectionState, PrinterError> {
        let (tx, rx) = oneshot::channel();
        self.send(PrinterCommand::State { response: tx }).await?;
        rx.await.map_err(|_| PrinterError::WorkerUnavailable)
    }

    /// Stop the worker thread, tearing down any live connection
    pub async fn shutdown(&self) -> Result<(), PrinterError> {
        self.send(PrinterCommand::Shutdown).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> PrinterCommand,
    ) -> Result<T, PrinterError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| PrinterError::WorkerUnavailable)?
    }

    async fn send(&self, command: PrinterCommand) -> Result<(), PrinterError> {
        self.bridge.send_command(command).await.map_err(|e| {
            debug!("Printer worker unavailable: {}", e);
            PrinterError::WorkerUnavailable
        })
    }
}
