//! Mock tracer for running without hardware
//!
//! Answers acquisitions with synthetic frames shaped like real device
//! responses to a swept drive:
//!
//! - **DUT1**: a plain resistor, so the I-V trace is a straight line
//! - **DUT2**: a diode that clamps once forward biased past its knee
//!
//! The weak (W) drive swings far less than the standard one, so both DUTs
//! draw visibly less current than under T. Timeouts and short frames can be
//! injected to exercise error handling.
//!
//! # Enabling
//!
//! The mock tracer is only available when the `mock-tracer` feature is enabled:
//!
//! ```bash
//! cargo run --features mock-tracer -- --mock
//! ```

use crate::backend::link::{LinkStats, TracerLink};
use crate::error::{CurveBugError, Result};
use crate::tracer::encode_words;
use crate::types::{Excitation, ADC_ORIGIN, FRAME_BYTES, POINTS_PER_CHANNEL};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Name reported as the connected port
pub const MOCK_PORT_NAME: &str = "mock://curvebug";

/// Most recent drives kept for inspection
pub const COMMAND_LOG_LEN: usize = 64;

/// Peak drive swing either side of the origin, in ADC units
const DRIVE_AMPLITUDE: f64 = 1900.0;

/// Fraction of the drive swing that appears across DUT1
const DUT1_DIVIDER: f64 = 0.6;

/// Diode knee voltage in ADC units above the origin
const DIODE_KNEE: f64 = 450.0;

/// Diode slope past the knee, relative to the drive
const DIODE_SLOPE: f64 = 0.04;

fn drive_scale(excitation: Excitation) -> f64 {
    match excitation {
        Excitation::Standard => 1.0,
        Excitation::Weak => 0.3,
    }
}

/// Build one synthetic acquisition buffer
///
/// `phase` shifts the sweep slightly so consecutive frames are not identical.
pub fn synthesize_frame(excitation: Excitation, phase: u64) -> Vec<u8> {
    let amplitude = DRIVE_AMPLITUDE * drive_scale(excitation);
    let offset = (phase % 8) as f64;

    let mut words = Vec::with_capacity(POINTS_PER_CHANNEL * 3);
    for i in 0..POINTS_PER_CHANNEL {
        let t = i as f64 / POINTS_PER_CHANNEL as f64;
        let swing = amplitude * (2.0 * std::f64::consts::PI * t).sin();
        let drive = ADC_ORIGIN + swing + offset;

        let dut1 = ADC_ORIGIN + swing * DUT1_DIVIDER;
        let dut2 = if swing > DIODE_KNEE {
            ADC_ORIGIN + DIODE_KNEE + (swing - DIODE_KNEE) * DIODE_SLOPE
        } else {
            drive
        };

        words.push(to_code(drive));
        words.push(to_code(dut1));
        words.push(to_code(dut2));
    }
    encode_words(&words)
}

fn to_code(value: f64) -> u16 {
    value.round().clamp(0.0, 4095.0) as u16
}

/// Synthetic tracer implementing [`TracerLink`]
#[derive(Debug, Default)]
pub struct MockTracerLink {
    connected: bool,
    acquisitions: u64,
    timeout_every: Option<u64>,
    short_frame_every: Option<u64>,
    commands: VecDeque<Excitation>,
    stats: LinkStats,
}

impl MockTracerLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `n`th acquisition with a timeout
    pub fn with_timeout_every(mut self, n: u64) -> Self {
        self.timeout_every = (n > 0).then_some(n);
        self
    }

    /// Return a truncated buffer on every `n`th acquisition
    pub fn with_short_frame_every(mut self, n: u64) -> Self {
        self.short_frame_every = (n > 0).then_some(n);
        self
    }

    /// Number of acquisition requests received
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    /// The last [`COMMAND_LOG_LEN`] drives requested, oldest first
    pub fn commands(&self) -> Vec<Excitation> {
        self.commands.iter().copied().collect()
    }
}

fn hits(every: Option<u64>, count: u64) -> bool {
    every.is_some_and(|n| count % n == 0)
}

impl TracerLink for MockTracerLink {
    fn connect(&mut self, port: Option<&str>) -> Result<()> {
        if let Some(port) = port {
            tracing::debug!("Mock tracer ignoring requested port {}", port);
        }
        self.connected = true;
        tracing::info!("Connected to mock tracer");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn acquire(&mut self, excitation: Excitation, _timeout: Duration) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(CurveBugError::NotConnected);
        }
        let start = Instant::now();
        self.acquisitions += 1;
        if self.commands.len() == COMMAND_LOG_LEN {
            self.commands.pop_front();
        }
        self.commands.push_back(excitation);

        if hits(self.timeout_every, self.acquisitions) {
            self.stats.record_timeout();
            return Err(CurveBugError::Timeout(format!(
                "received 0 of {} bytes",
                FRAME_BYTES
            )));
        }

        let mut frame = synthesize_frame(excitation, self.acquisitions);
        if hits(self.short_frame_every, self.acquisitions) {
            frame.truncate(FRAME_BYTES - 2);
        }

        self.stats
            .record_frame(start.elapsed().as_micros() as u64, frame.len() as u64);
        Ok(frame)
    }

    fn port_name(&self) -> Option<String> {
        self.connected.then(|| MOCK_PORT_NAME.to_string())
    }

    fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut LinkStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::decode_frame;
    use crate::types::DutId;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_synthetic_frame_decodes() {
        let frame = decode_frame(&synthesize_frame(Excitation::Standard, 0)).unwrap();
        assert!(frame.sync_flag());
        assert_eq!(frame.len(), POINTS_PER_CHANNEL);
    }

    #[test]
    fn test_weak_drive_draws_less_current() {
        let peak = |excitation| {
            let frame = decode_frame(&synthesize_frame(excitation, 0)).unwrap();
            frame
                .current(DutId::Dut1)
                .iter()
                .map(|c| c.abs())
                .max()
                .unwrap_or(0)
        };
        assert!(peak(Excitation::Weak) < peak(Excitation::Standard));
    }

    #[test]
    fn test_diode_conducts_one_way() {
        let frame = decode_frame(&synthesize_frame(Excitation::Standard, 0)).unwrap();
        let currents = frame.current(DutId::Dut2);
        assert!(currents.iter().any(|&c| c > 100));
        assert!(currents.iter().all(|&c| c >= 0));
    }

    #[test]
    fn test_requires_connection() {
        let mut link = MockTracerLink::new();
        assert!(matches!(
            link.acquire(Excitation::Standard, TIMEOUT),
            Err(CurveBugError::NotConnected)
        ));
        assert!(link.port_name().is_none());

        link.connect(None).unwrap();
        assert_eq!(link.port_name().as_deref(), Some(MOCK_PORT_NAME));
        assert_eq!(link.acquire(Excitation::Weak, TIMEOUT).unwrap().len(), FRAME_BYTES);
        assert_eq!(link.commands(), vec![Excitation::Weak]);
    }

    #[test]
    fn test_command_log_is_capped() {
        let mut link = MockTracerLink::new();
        link.connect(None).unwrap();
        link.acquire(Excitation::Weak, TIMEOUT).unwrap();
        for _ in 0..COMMAND_LOG_LEN + 10 {
            link.acquire(Excitation::Standard, TIMEOUT).unwrap();
        }

        let commands = link.commands();
        assert_eq!(commands.len(), COMMAND_LOG_LEN);
        assert!(commands.iter().all(|&e| e == Excitation::Standard));
        assert_eq!(link.acquisitions(), COMMAND_LOG_LEN as u64 + 11);
    }

    #[test]
    fn test_injected_faults() {
        let mut link = MockTracerLink::new()
            .with_timeout_every(3)
            .with_short_frame_every(2);
        link.connect(None).unwrap();

        assert_eq!(link.acquire(Excitation::Standard, TIMEOUT).unwrap().len(), FRAME_BYTES);
        assert_eq!(
            link.acquire(Excitation::Standard, TIMEOUT).unwrap().len(),
            FRAME_BYTES - 2
        );
        assert!(matches!(
            link.acquire(Excitation::Standard, TIMEOUT),
            Err(CurveBugError::Timeout(_))
        ));
        assert_eq!(link.stats().timeouts, 1);
        assert_eq!(link.stats().frames_received, 2);
    }
}
