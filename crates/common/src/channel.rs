//! Async channel bridge between Tokio runtime and the printer USB thread

use crate::config::ConnectOptions;
use crate::error::PrinterError;
use crate::types::{ConnectionState, PrinterEvent};
use async_channel::{Receiver, Sender, bounded};
use bytes::Bytes;
use tokio::sync::{broadcast, oneshot};

/// Capacity of the lifecycle event channel per subscriber
const EVENT_CAPACITY: usize = 64;

/// Reply channel for a session operation
pub type Reply<T> = oneshot::Sender<Result<T, PrinterError>>;

/// Commands from Tokio runtime to the USB thread
#[derive(Debug)]
pub enum PrinterCommand {
    /// Locate the printer and claim its interface
    Connect {
        /// Call-site overrides of the configured identifiers
        options: ConnectOptions,
        /// Channel to send response back
        response: Reply<()>,
    },

    /// Write one print job to the printer
    Print {
        /// Raw printer data
        data: Bytes,
        /// Channel to send response back (number of bytes written)
        response: Reply<usize>,
    },

    /// Release the interface and close the device
    Disconnect {
        /// Channel to send response back
        response: Reply<()>,
    },

    /// Close the device regardless of release failures
    ForceClose {
        /// Channel to send response back
        response: Reply<()>,
    },

    /// Query the connection state
    State {
        /// Channel to send response back
        response: oneshot::Sender<ConnectionState>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct PrinterBridge {
    cmd_tx: Sender<PrinterCommand>,
    event_tx: broadcast::Sender<PrinterEvent>,
}

impl PrinterBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: PrinterCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a command to the USB thread from outside the runtime (blocking)
    pub fn send_command_blocking(&self, cmd: PrinterCommand) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Subscribe to lifecycle events
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.event_tx.subscribe()
    }

    /// Check whether the USB thread has stopped receiving commands
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Handle for USB thread (blocking)
pub struct PrinterWorker {
    pub(crate) cmd_rx: Receiver<PrinterCommand>,
    /// Event sender (public for the session to publish on)
    pub event_tx: broadcast::Sender<PrinterEvent>,
}

impl PrinterWorker {
    /// Receive a command from Tokio runtime (blocking)
    ///
    /// Fails once every `PrinterBridge` has been dropped.
    pub fn recv_command(&self) -> crate::Result<PrinterCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the USB thread
///
/// Returns (PrinterBridge for Tokio, PrinterWorker for USB thread)
pub fn create_printer_bridge() -> (PrinterBridge, PrinterWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

    (
        PrinterBridge {
            cmd_tx,
            event_tx: event_tx.clone(),
        },
        PrinterWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_printer_bridge();

        // Spawn a thread to simulate USB worker
        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, PrinterCommand::Disconnect { .. })
        });

        // Send command from async context
        let (tx, _rx) = oneshot::channel();
        bridge
            .send_command(PrinterCommand::Disconnect { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_send_fails_after_worker_dropped() {
        let (bridge, worker) = create_printer_bridge();
        drop(worker);

        assert!(bridge.is_closed());
        let result = bridge.send_command(PrinterCommand::Shutdown).await;
        assert!(matches!(result, Err(crate::Error::Channel(_))));
    }

    #[test]
    fn test_recv_fails_after_bridge_dropped() {
        let (bridge, worker) = create_printer_bridge();
        drop(bridge);

        assert!(worker.recv_command().is_err());
    }

    #[test]
    fn test_events_reach_subscribers() {
        let (bridge, worker) = create_printer_bridge();
        let mut first = bridge.subscribe();
        let mut second = bridge.subscribe();

        worker.event_tx.send(PrinterEvent::Disconnected).unwrap();

        assert_eq!(first.try_recv().unwrap(), PrinterEvent::Disconnected);
        assert_eq!(second.try_recv().unwrap(), PrinterEvent::Disconnected);
    }
}
