//! Core data types for the CurveBug tracer
//!
//! This module contains the fundamental data structures and constants used
//! throughout the application for describing acquisitions, channels and
//! coordinates.
//!
//! # Main Types
//!
//! - [`ExcitationMode`] - Display-level stimulus scheme (4.7K, 100K weak, alternating)
//! - [`Excitation`] - Physical sub-mode that produced a frame (T or W command)
//! - [`DutId`] / [`TraceSlot`] - Addressing for retained traces
//! - [`DataPoint`] / [`ScreenPoint`] / [`Viewport`] - Coordinate spaces
//! - [`AcquisitionStats`] - Counters reported by the acquisition worker
//!
//! # Frame Layout
//!
//! One acquisition is [`FRAME_BYTES`] bytes: [`FRAME_SAMPLES`] little-endian
//! 16-bit words interleaved as CH0, CH1, CH2, CH0, ... Each word is masked to
//! 12 bits; bit 15 of the first word carries the sync flag.

use serde::{Deserialize, Serialize};

/// Number of bytes in one raw acquisition buffer
pub const FRAME_BYTES: usize = 2016;

/// Number of 16-bit samples in one acquisition
pub const FRAME_SAMPLES: usize = FRAME_BYTES / 2;

/// Number of interleaved channels (drive, DUT1, DUT2)
pub const CHANNEL_COUNT: usize = 3;

/// Points per channel after de-interleaving
pub const POINTS_PER_CHANNEL: usize = FRAME_SAMPLES / CHANNEL_COUNT;

/// Mask selecting the 12 data bits of a sample word
pub const SAMPLE_MASK: u16 = 0x0FFF;

/// Sync flag carried on the first word of an acquisition
pub const SYNC_FLAG: u16 = 0x8000;

/// Right edge of the fixed-scale voltage axis in ADC units
pub const ADC_MAX: f64 = 2800.0;

/// Mid-scale ADC reference (12-bit center) where the fixed-scale origin sits
pub const ADC_ORIGIN: f64 = 2048.0;

/// Span of the fixed-scale current axis in ADC units
pub const Y_RANGE: f64 = ADC_MAX - 700.0;

/// Position of the zero-current floor, measured from the top of the viewport
pub const FLOOR_RATIO: f64 = 7.0 / 8.0;

/// Stimulus scheme selected by the operator
///
/// `Alternating` is never sampled directly: the hardware is driven with T and W
/// commands on consecutive cycles and both traces are kept for overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExcitationMode {
    /// 4.7 kOhm standard drive (T command)
    #[default]
    Mode4K7,
    /// 100 kOhm weak drive (W command)
    Mode100KWeak,
    /// T and W alternating each cycle
    Alternating,
}

impl ExcitationMode {
    /// All modes in cycle order
    pub const ALL: [ExcitationMode; 3] = [
        ExcitationMode::Mode4K7,
        ExcitationMode::Mode100KWeak,
        ExcitationMode::Alternating,
    ];

    /// The mode that follows this one in the circular cycle
    pub fn next(self) -> Self {
        match self {
            ExcitationMode::Mode4K7 => ExcitationMode::Mode100KWeak,
            ExcitationMode::Mode100KWeak => ExcitationMode::Alternating,
            ExcitationMode::Alternating => ExcitationMode::Mode4K7,
        }
    }

    /// Short label used in the status line
    pub fn short_name(self) -> &'static str {
        match self {
            ExcitationMode::Mode4K7 => "4.7K(T)",
            ExcitationMode::Mode100KWeak => "100K WEAK(W)",
            ExcitationMode::Alternating => "ALT",
        }
    }

    pub fn is_alternating(self) -> bool {
        self == ExcitationMode::Alternating
    }
}

impl std::fmt::Display for ExcitationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExcitationMode::Mode4K7 => write!(f, "4.7K Ohm (T)"),
            ExcitationMode::Mode100KWeak => write!(f, "100K Ohm WEAK (W)"),
            ExcitationMode::Alternating => write!(f, "Alternating (T+W)"),
        }
    }
}

/// Physical drive that produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Excitation {
    /// 4.7 kOhm drive
    #[default]
    Standard,
    /// 100 kOhm weak drive
    Weak,
}

impl Excitation {
    /// Command byte that requests an acquisition with this drive
    pub fn command_byte(self) -> u8 {
        match self {
            Excitation::Standard => b'T',
            Excitation::Weak => b'W',
        }
    }

    /// The other sub-mode
    pub fn toggled(self) -> Self {
        match self {
            Excitation::Standard => Excitation::Weak,
            Excitation::Weak => Excitation::Standard,
        }
    }
}

impl std::fmt::Display for Excitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Excitation::Standard => write!(f, "T"),
            Excitation::Weak => write!(f, "W"),
        }
    }
}

/// Device under test, one per test lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DutId {
    /// CH1, black lead
    Dut1,
    /// CH2, red lead
    Dut2,
}

impl DutId {
    pub const ALL: [DutId; 2] = [DutId::Dut1, DutId::Dut2];
}

impl std::fmt::Display for DutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DutId::Dut1 => write!(f, "DUT1 (CH1 - Black Lead)"),
            DutId::Dut2 => write!(f, "DUT2 (CH2 - Red Lead)"),
        }
    }
}

/// Which retained trace of a DUT is addressed
///
/// `Previous` only exists in alternating mode and is drawn dimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceSlot {
    Current,
    Previous,
}

/// A point in data space: x is DUT voltage, y is current, both in ADC units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

impl DataPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point in caller-supplied screen units, origin at the viewport's top-left
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Size of the drawing area, supplied on every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True if both extents are positive and finite
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Represents the connection status to the tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected to any tracer
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection error occurred
    Error,
}

impl ConnectionStatus {
    /// Banner shown by the status bar
    pub fn serial_banner(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Serial: CONNECTED",
            ConnectionStatus::Connecting => "Serial: CONNECTING",
            ConnectionStatus::Disconnected | ConnectionStatus::Error => "Serial: NOT CONNECTED",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Statistics about the acquisition loop
#[derive(Debug, Clone, Default)]
pub struct AcquisitionStats {
    /// Frames decoded and committed to the trace history
    pub frames_acquired: u64,
    /// Buffers rejected by the frame decoder
    pub decode_errors: u64,
    /// Acquisitions that hit their deadline
    pub timeouts: u64,
    /// Frames discarded because the display was paused
    pub frames_discarded: u64,
    /// Average acquisition time in microseconds
    pub avg_acquire_time_us: f64,
    /// Current effective cycle rate in Hz
    pub effective_cycle_rate: f64,
    /// Number of messages dropped due to queue backpressure
    pub dropped_messages: u64,
}

impl AcquisitionStats {
    /// Percentage of received buffers that decoded cleanly
    pub fn success_rate(&self) -> f64 {
        let total = self.frames_acquired + self.decode_errors;
        if total == 0 {
            100.0
        } else {
            (self.frames_acquired as f64 / total as f64) * 100.0
        }
    }
}
