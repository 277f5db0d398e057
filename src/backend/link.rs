//! TracerLink trait for a unified transport interface
//!
//! Implemented by the serial transport and by the synthetic mock tracer, so
//! the acquisition worker never cares which one it is talking to.

use crate::error::Result;
use crate::types::Excitation;
use std::collections::VecDeque;
use std::time::Duration;

/// Size of the rolling window for recent acquisition times
const RECENT_WINDOW_SIZE: usize = 100;

/// Statistics for link operations
#[derive(Debug, Clone)]
pub struct LinkStats {
    /// Complete frames received
    pub frames_received: u64,
    /// Acquisitions that failed for any reason
    pub failed_acquisitions: u64,
    /// Acquisitions that hit their deadline
    pub timeouts: u64,
    /// Total bytes received in complete frames
    pub total_bytes_read: u64,
    /// Total acquisition time in microseconds
    pub total_acquire_time_us: u64,
    /// Last acquisition time in microseconds
    pub last_acquire_time_us: u64,
    /// Rolling window of recent acquisition times
    pub recent_acquire_times: VecDeque<u64>,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self {
            frames_received: 0,
            failed_acquisitions: 0,
            timeouts: 0,
            total_bytes_read: 0,
            total_acquire_time_us: 0,
            last_acquire_time_us: 0,
            recent_acquire_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl LinkStats {
    /// Average acquisition time in microseconds
    pub fn avg_acquire_time_us(&self) -> f64 {
        if self.frames_received == 0 {
            0.0
        } else {
            self.total_acquire_time_us as f64 / self.frames_received as f64
        }
    }

    /// Record a complete frame
    pub fn record_frame(&mut self, time_us: u64, bytes: u64) {
        self.frames_received += 1;
        self.total_acquire_time_us += time_us;
        self.last_acquire_time_us = time_us;
        self.total_bytes_read += bytes;

        self.recent_acquire_times.push_back(time_us);
        if self.recent_acquire_times.len() > RECENT_WINDOW_SIZE {
            self.recent_acquire_times.pop_front();
        }
    }

    /// Record an acquisition that ran out of time
    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
        self.failed_acquisitions += 1;
    }

    /// Record any other failed acquisition
    pub fn record_failure(&mut self) {
        self.failed_acquisitions += 1;
    }

    /// Spread (max - min) of recent acquisition times in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_acquire_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_acquire_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Unified interface for curve tracer transports
///
/// Implementations must be `Send` so the link can live on the acquisition
/// thread.
///
/// # Example
///
/// ```ignore
/// fn grab(link: &mut dyn TracerLink) -> Result<Vec<u8>> {
///     link.acquire(Excitation::Standard, Duration::from_millis(500))
/// }
/// ```
pub trait TracerLink: Send {
    /// Open the link
    ///
    /// # Arguments
    /// * `port` - Port to open, or `None` to auto-detect
    fn connect(&mut self, port: Option<&str>) -> Result<()>;

    /// Close the link
    fn disconnect(&mut self);

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Run one acquisition cycle
    ///
    /// Discards stale input, sends the excitation's command byte and returns
    /// exactly one frame's worth of bytes. Fails with
    /// [`CurveBugError::Timeout`](crate::error::CurveBugError::Timeout) if the
    /// frame is not complete before `timeout`; partial frames are never
    /// returned.
    fn acquire(&mut self, excitation: Excitation, timeout: Duration) -> Result<Vec<u8>>;

    /// Name of the open port, if any
    fn port_name(&self) -> Option<String>;

    /// Port auto-detection tries first, kept while disconnected
    fn preferred_port(&self) -> Option<String> {
        None
    }

    /// Get link operation statistics
    fn stats(&self) -> &LinkStats;

    /// Get mutable reference to link statistics
    fn stats_mut(&mut self) -> &mut LinkStats;

    /// Reset link statistics
    fn reset_stats(&mut self) {
        self.stats_mut().reset();
    }
}
