//! Acquisition Worker Thread Implementation
//!
//! This module contains the cooperative acquisition loop. It runs on its own
//! thread, owns the [`TracerCore`] and the transport, and talks to the UI
//! through crossbeam channels.
//!
//! # Responsibilities
//!
//! - **Command processing**: connect/disconnect and operator commands, applied
//!   between acquisitions so they never interleave with frame processing
//! - **Acquisition**: request one frame per cycle with the drive the
//!   excitation controller plans, skipped entirely while paused
//! - **Connection tracking**: repeated timeouts or I/O errors mark the link
//!   as lost ("Serial: NOT CONNECTED"); retained traces stay on screen
//! - **Reconnect**: retried on a fixed interval while a connection is wanted
//! - **Publishing**: an immutable [`DisplaySnapshot`] after every committed change
//!
//! # Rate Limiting
//!
//! Each loop iteration sleeps for whatever remains of the configured cycle
//! interval (20 Hz by default), so the loop never busy-waits, even when
//! paused or disconnected.

use crate::backend::link::TracerLink;
use crate::backend::{BackendCommand, BackendMessage, SerialLink, SnapshotHandle};
use crate::config::TracerConfig;
use crate::error::CurveBugError;
use crate::tracer::{FrameDisposition, TracerCommand, TracerCore};
use crate::types::{AcquisitionStats, ConnectionStatus};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "mock-tracer")]
use crate::backend::MockTracerLink;

/// How often statistics are pushed to the UI
const STATS_INTERVAL: Duration = Duration::from_millis(500);

/// Window over which the effective cycle rate is measured
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// The worker that runs the acquisition loop
pub struct AcquisitionWorker {
    /// Application configuration
    config: TracerConfig,
    /// Command receiver from the UI
    command_rx: Receiver<BackendCommand>,
    /// Message sender to the UI
    message_tx: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Latest committed display state
    snapshot: SnapshotHandle,
    /// Transport to the tracer (real or mock)
    link: Box<dyn TracerLink>,
    /// Whether currently using the mock tracer
    #[cfg(feature = "mock-tracer")]
    is_mock_link: bool,
    /// Serial port to prefer again when leaving the mock tracer
    #[cfg(feature = "mock-tracer")]
    remembered_port: Option<String>,
    /// Decoding, mode, history and view state
    core: TracerCore,
    /// Current connection status
    connection_status: ConnectionStatus,
    /// Port requested by the last connect command
    requested_port: Option<String>,
    /// Whether the operator wants a connection (drives auto-reconnect)
    wants_connection: bool,
    /// Timeouts since the last complete frame
    consecutive_timeouts: u32,
    /// Time of the last failed or lost connection
    last_connect_attempt: Option<Instant>,
    /// Cycle interval, `None` for unpaced
    cycle_interval: Option<Duration>,
    /// Statistics
    stats: AcquisitionStats,
    /// Last loop iteration time for rate limiting
    last_cycle_time: Instant,
    /// Last time stats were sent to the UI
    last_stats_time: Instant,
    /// Start of the current cycle rate window
    rate_window_start: Instant,
    /// Frames committed in the current cycle rate window
    rate_window_frames: u32,
}

impl AcquisitionWorker {
    /// Create a worker talking to the serial tracer
    pub fn new(
        config: TracerConfig,
        command_rx: Receiver<BackendCommand>,
        message_tx: Sender<BackendMessage>,
        running: Arc<AtomicBool>,
        snapshot: SnapshotHandle,
    ) -> Self {
        let link: Box<dyn TracerLink> = Box::new(SerialLink::new(config.serial.clone()));
        Self::with_link(config, command_rx, message_tx, running, snapshot, link)
    }

    /// Create a worker with a specific transport
    pub fn with_link(
        config: TracerConfig,
        command_rx: Receiver<BackendCommand>,
        message_tx: Sender<BackendMessage>,
        running: Arc<AtomicBool>,
        snapshot: SnapshotHandle,
        link: Box<dyn TracerLink>,
    ) -> Self {
        let core = TracerCore::from_config(&config);
        let cycle_interval = config.acquisition.cycle_interval();
        snapshot.publish(core.snapshot());

        Self {
            config,
            command_rx,
            message_tx,
            running,
            snapshot,
            link,
            #[cfg(feature = "mock-tracer")]
            is_mock_link: false,
            #[cfg(feature = "mock-tracer")]
            remembered_port: None,
            core,
            connection_status: ConnectionStatus::Disconnected,
            requested_port: None,
            wants_connection: false,
            consecutive_timeouts: 0,
            last_connect_attempt: None,
            cycle_interval,
            stats: AcquisitionStats::default(),
            last_cycle_time: Instant::now(),
            last_stats_time: Instant::now(),
            rate_window_start: Instant::now(),
            rate_window_frames: 0,
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Acquisition worker started");

        while self.running.load(Ordering::SeqCst) {
            self.step();
            self.rate_limit();
        }

        self.link.disconnect();
        // Nobody may be draining the channel; never block on the way out
        let _ = self.message_tx.try_send(BackendMessage::Shutdown);
        tracing::info!("Acquisition worker stopped");
    }

    /// One loop iteration without pacing
    pub fn step(&mut self) {
        self.process_commands();
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        if self.connection_status == ConnectionStatus::Connected {
            if !self.core.is_paused() {
                self.acquire_cycle();
            }
        } else {
            self.maybe_reconnect();
        }

        if self.last_stats_time.elapsed() >= STATS_INTERVAL {
            self.send_stats();
            self.last_stats_time = Instant::now();
        }
    }

    /// Current tracer state
    pub fn core(&self) -> &TracerCore {
        &self.core
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Process pending commands from the UI
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::Connect { port } => {
                self.wants_connection = true;
                self.requested_port = port;
                self.attempt_connect();
            }
            BackendCommand::Disconnect => {
                self.handle_disconnect();
            }
            BackendCommand::Apply(command) => {
                self.apply(command);
            }
            BackendCommand::RequestSnapshot => {
                self.publish_snapshot();
            }
            BackendCommand::RequestStats => {
                self.send_stats();
            }
            BackendCommand::SetCycleRate(hz) => {
                self.cycle_interval =
                    (hz > 0).then(|| Duration::from_micros(1_000_000 / u64::from(hz)));
            }
            BackendCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
            #[cfg(feature = "mock-tracer")]
            BackendCommand::UseMockLink(use_mock) => {
                if self.connection_status != ConnectionStatus::Disconnected {
                    self.link.disconnect();
                    self.update_connection_status(ConnectionStatus::Disconnected);
                }

                if use_mock && !self.is_mock_link {
                    self.remembered_port = self.link.preferred_port();
                    self.link = Box::new(MockTracerLink::new());
                    self.is_mock_link = true;
                    tracing::info!("Switched to mock tracer");
                } else if !use_mock && self.is_mock_link {
                    self.link = Box::new(
                        SerialLink::new(self.config.serial.clone())
                            .with_preferred_port(self.remembered_port.take()),
                    );
                    self.is_mock_link = false;
                    tracing::info!("Switched to serial tracer");
                }
            }
        }
    }

    /// Apply an operator command and publish the result
    fn apply(&mut self, command: TracerCommand) {
        let was_paused = self.core.is_paused();
        self.core.apply(command);
        if was_paused && !self.core.is_paused() {
            // Do not count the paused stretch against the cycle rate
            self.rate_window_start = Instant::now();
            self.rate_window_frames = 0;
        }
        self.publish_snapshot();
    }

    /// Try to open the link
    fn attempt_connect(&mut self) {
        self.update_connection_status(ConnectionStatus::Connecting);

        match self.link.connect(self.requested_port.as_deref()) {
            Ok(()) => {
                self.consecutive_timeouts = 0;
                self.last_connect_attempt = None;
                self.update_connection_status(ConnectionStatus::Connected);
                if let Some(port) = self.link.port_name() {
                    self.try_send_message(BackendMessage::PortConnected(port));
                }
            }
            Err(e) => {
                self.last_connect_attempt = Some(Instant::now());
                self.update_connection_status(ConnectionStatus::Error);
                let error_msg = format!("Failed to connect: {}", e);
                tracing::error!("{}", error_msg);
                self.try_send_message(BackendMessage::ConnectionError(error_msg));
            }
        }
    }

    /// Retry the connection if it is wanted and the interval has passed
    fn maybe_reconnect(&mut self) {
        if !self.wants_connection || !self.config.serial.auto_reconnect {
            return;
        }
        let due = self
            .last_connect_attempt
            .map_or(true, |t| t.elapsed() >= self.config.serial.reconnect_interval());
        if due {
            tracing::debug!("Attempting reconnect");
            self.attempt_connect();
        }
    }

    /// Handle disconnect command
    fn handle_disconnect(&mut self) {
        self.wants_connection = false;
        self.link.disconnect();
        self.update_connection_status(ConnectionStatus::Disconnected);
        tracing::info!("Disconnected from tracer");
    }

    /// Drop the link after a transport failure; retained traces are untouched
    fn connection_lost(&mut self, reason: String) {
        tracing::error!("Connection lost: {}", reason);
        self.link.disconnect();
        self.consecutive_timeouts = 0;
        self.last_connect_attempt = Some(Instant::now());
        self.update_connection_status(ConnectionStatus::Disconnected);
        self.try_send_message(BackendMessage::ConnectionError(reason));
    }

    /// Acquire, decode and commit one frame
    fn acquire_cycle(&mut self) {
        let excitation = self.core.next_excitation();
        let timeout = self.config.acquisition.frame_timeout();

        match self.link.acquire(excitation, timeout) {
            Ok(bytes) => {
                self.consecutive_timeouts = 0;
                match self.core.ingest(&bytes) {
                    Ok(FrameDisposition::Committed { .. }) => {
                        self.stats.frames_acquired += 1;
                        self.tick_cycle_rate();
                        self.publish_snapshot();
                    }
                    Ok(FrameDisposition::DiscardedWhilePaused) => {
                        self.stats.frames_discarded += 1;
                    }
                    Err(e) => {
                        self.stats.decode_errors += 1;
                        tracing::warn!("Discarding frame ({}): {}", excitation, e);
                        self.try_send_message(BackendMessage::DecodeError(e));
                    }
                }
            }
            Err(CurveBugError::Timeout(detail)) => {
                self.stats.timeouts += 1;
                self.consecutive_timeouts += 1;
                tracing::warn!(
                    "Acquisition timed out ({} in a row): {}",
                    self.consecutive_timeouts,
                    detail
                );
                let limit = self.config.acquisition.disconnect_after_timeouts.max(1);
                if self.consecutive_timeouts >= limit {
                    self.connection_lost(format!("{} consecutive timeouts", limit));
                }
            }
            Err(e) if e.is_connection_loss() => {
                self.connection_lost(e.to_string());
            }
            Err(e) => {
                tracing::warn!("Acquisition failed: {}", e);
                self.try_send_message(BackendMessage::ConnectionError(e.to_string()));
            }
        }

        self.stats.avg_acquire_time_us = self.link.stats().avg_acquire_time_us();
    }

    fn tick_cycle_rate(&mut self) {
        self.rate_window_frames += 1;
        let elapsed = self.rate_window_start.elapsed();
        if elapsed >= RATE_WINDOW {
            self.stats.effective_cycle_rate =
                f64::from(self.rate_window_frames) / elapsed.as_secs_f64();
            self.rate_window_frames = 0;
            self.rate_window_start = Instant::now();
        }
    }

    /// Rate limit the acquisition loop
    fn rate_limit(&mut self) {
        let Some(target_interval) = self.cycle_interval else {
            std::thread::yield_now();
            return;
        };

        let elapsed = self.last_cycle_time.elapsed();
        if elapsed < target_interval {
            std::thread::sleep(target_interval - elapsed);
        }

        self.last_cycle_time = Instant::now();
    }

    /// Publish the current display state
    fn publish_snapshot(&mut self) {
        let snapshot = self.snapshot.publish(self.core.snapshot());
        self.try_send_message(BackendMessage::Snapshot(snapshot));
    }

    /// Update connection status and notify UI
    fn update_connection_status(&mut self, status: ConnectionStatus) {
        if self.connection_status != status {
            tracing::info!("{}", status.serial_banner());
        }
        self.connection_status = status;
        self.snapshot.set_connection_status(status);
        self.try_send_message(BackendMessage::ConnectionStatus(status));
    }

    /// Send statistics to UI (using try_send for backpressure)
    fn send_stats(&mut self) {
        let stats = self.stats.clone();
        self.try_send_message(BackendMessage::Stats(stats));
    }

    /// Try to send a message, tracking dropped messages if queue is full
    fn try_send_message(&mut self, msg: BackendMessage) {
        if self.message_tx.try_send(msg).is_err() {
            self.stats.dropped_messages += 1;
        }
    }
}
