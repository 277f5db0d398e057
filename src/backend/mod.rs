//! Backend module for tracer acquisition
//!
//! This module runs all serial communication and frame processing on a
//! separate thread so rendering never waits on the transport. It uses
//! crossbeam channels for thread-safe communication with the frontend.
//!
//! # Architecture
//!
//! - [`BackendCommand`] - Messages sent from UI to backend (connect, operator commands)
//! - [`BackendMessage`] - Messages sent from backend to UI (status, snapshots, errors)
//! - [`FrontendReceiver`] - UI-side handle for sending commands and receiving messages
//! - [`SnapshotHandle`] - Always holds the latest committed [`DisplaySnapshot`]
//! - [`TracerBackend`] - Backend entry point that runs the worker loop
//!
//! # Components
//!
//! - [`TracerLink`] - Transport trait
//! - [`SerialLink`] - Serial transport for real hardware
//! - [`MockTracerLink`] - Synthetic tracer (feature-gated)
//! - [`AcquisitionWorker`] - The acquisition loop
//!
//! # Example
//!
//! ```ignore
//! use curvebug_rs::backend::TracerBackend;
//! use curvebug_rs::config::TracerConfig;
//!
//! let (backend, frontend) = TracerBackend::new(TracerConfig::default());
//! std::thread::spawn(move || backend.run());
//!
//! frontend.connect(None);
//! frontend.apply(TracerCommand::CycleExcitationMode);
//!
//! let snapshot = frontend.latest_snapshot();
//! for trace in snapshot.render_plan(Viewport::new(800.0, 600.0)) {
//!     // draw trace.points, dimmed when trace.slot is Previous
//! }
//! ```

pub mod link;
#[cfg(feature = "mock-tracer")]
pub mod mock_link;
pub mod serial;
pub mod worker;

pub use link::{LinkStats, TracerLink};
#[cfg(feature = "mock-tracer")]
pub use mock_link::{synthesize_frame, MockTracerLink, MOCK_PORT_NAME};
pub use serial::{list_ports, rank_ports, PortCandidate, SerialLink};
pub use worker::AcquisitionWorker;

use crate::config::TracerConfig;
use crate::error::DecodeError;
use crate::tracer::{DisplaySnapshot, TracerCommand};
use crate::types::{AcquisitionStats, ConnectionStatus};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// Message sent from the UI to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Open the link
    Connect {
        /// Port to open, `None` to auto-detect
        port: Option<String>,
    },
    /// Close the link and stop reconnecting
    Disconnect,
    /// Operator command for the tracer core
    Apply(TracerCommand),
    /// Publish a snapshot even if nothing changed
    RequestSnapshot,
    /// Request current statistics
    RequestStats,
    /// Set the acquisition cadence in Hz (0 = unpaced)
    SetCycleRate(u32),
    /// Shutdown the backend
    Shutdown,
    /// Use the mock tracer instead of real hardware
    #[cfg(feature = "mock-tracer")]
    UseMockLink(bool),
}

/// Message sent from the backend to the UI
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Connection status changed
    ConnectionStatus(ConnectionStatus),
    /// Connection error occurred
    ConnectionError(String),
    /// A port connected successfully
    PortConnected(String),
    /// New committed display state
    Snapshot(Arc<DisplaySnapshot>),
    /// A received buffer failed to decode and was discarded
    DecodeError(DecodeError),
    /// Statistics update
    Stats(AcquisitionStats),
    /// Backend is shutting down
    Shutdown,
}

/// Shared slots holding the latest committed snapshot and connection status
///
/// Publishing swaps in a new `Arc`, so a reader always sees one complete
/// snapshot even if queued messages were dropped. A renderer that never
/// drains the message channel still sees every state change here.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    latest: Arc<Mutex<Arc<DisplaySnapshot>>>,
    status: Arc<Mutex<ConnectionStatus>>,
}

impl SnapshotHandle {
    /// Replace the latest snapshot and return the shared copy
    pub fn publish(&self, snapshot: DisplaySnapshot) -> Arc<DisplaySnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut slot = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::clone(&snapshot);
        snapshot
    }

    /// The most recently published snapshot
    pub fn latest(&self) -> Arc<DisplaySnapshot> {
        let slot = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*slot)
    }

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Frontend receiver for backend messages
pub struct FrontendReceiver {
    /// Receiver for backend messages
    pub receiver: Receiver<BackendMessage>,
    /// Sender for commands to the backend
    pub command_sender: Sender<BackendCommand>,
    /// Latest committed display state
    pub snapshot: SnapshotHandle,
}

impl FrontendReceiver {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<BackendMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<BackendMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send a command to the backend
    pub fn send_command(&self, cmd: BackendCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Latest committed display state
    pub fn latest_snapshot(&self) -> Arc<DisplaySnapshot> {
        self.snapshot.latest()
    }

    /// Current link state, independent of the message queue
    pub fn connection_status(&self) -> ConnectionStatus {
        self.snapshot.connection_status()
    }

    /// Request connection, auto-detecting the port when `None`
    pub fn connect(&self, port: Option<String>) {
        let _ = self.command_sender.send(BackendCommand::Connect { port });
    }

    /// Request disconnection
    pub fn disconnect(&self) {
        let _ = self.command_sender.send(BackendCommand::Disconnect);
    }

    /// Forward an operator command to the tracer core
    pub fn apply(&self, command: TracerCommand) {
        let _ = self.command_sender.send(BackendCommand::Apply(command));
    }

    /// Request a statistics update
    pub fn request_stats(&self) {
        let _ = self.command_sender.send(BackendCommand::RequestStats);
    }

    /// Set whether to use the mock tracer
    #[cfg(feature = "mock-tracer")]
    pub fn use_mock_link(&self, use_mock: bool) {
        let _ = self
            .command_sender
            .send(BackendCommand::UseMockLink(use_mock));
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(BackendCommand::Shutdown);
    }
}

/// The tracer backend that runs in a separate thread
pub struct TracerBackend {
    /// Configuration
    config: TracerConfig,
    /// Receiver for commands from the UI
    command_receiver: Receiver<BackendCommand>,
    /// Sender for messages to the UI
    message_sender: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Latest committed display state
    snapshot: SnapshotHandle,
    /// Transport override; the serial link is used when absent
    link: Option<Box<dyn TracerLink>>,
}

impl TracerBackend {
    /// Create a new backend with communication channels
    pub fn new(config: TracerConfig) -> (Self, FrontendReceiver) {
        let (cmd_tx, cmd_rx) = bounded(256);
        // Bounded for backpressure; snapshots that do not fit are dropped and
        // the UI falls back to the snapshot handle
        let (msg_tx, msg_rx) = bounded(config.acquisition.channel_buffer_size.max(1));
        let snapshot = SnapshotHandle::default();

        let backend = Self {
            config,
            command_receiver: cmd_rx,
            message_sender: msg_tx,
            running: Arc::new(AtomicBool::new(true)),
            snapshot: snapshot.clone(),
            link: None,
        };

        let frontend = FrontendReceiver {
            receiver: msg_rx,
            command_sender: cmd_tx,
            snapshot,
        };

        (backend, frontend)
    }

    /// Create a backend that talks through the given transport
    pub fn with_link(config: TracerConfig, link: Box<dyn TracerLink>) -> (Self, FrontendReceiver) {
        let (mut backend, frontend) = Self::new(config);
        backend.link = Some(link);
        (backend, frontend)
    }

    /// Run the backend loop
    pub fn run(self) {
        let mut worker = match self.link {
            Some(link) => AcquisitionWorker::with_link(
                self.config,
                self.command_receiver,
                self.message_sender,
                self.running,
                self.snapshot,
                link,
            ),
            None => AcquisitionWorker::new(
                self.config,
                self.command_receiver,
                self.message_sender,
                self.running,
                self.snapshot,
            ),
        };
        worker.run();
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}
