//! Serial transport for the CurveBug hardware
//!
//! The tracer answers a single command byte (`T` for 4.7K drive, `W` for
//! 100K weak drive) with one [`FRAME_BYTES`]-byte acquisition. Reads are
//! polled in short slices so the per-acquisition deadline is honored even
//! when the device stops answering mid-frame.
//!
//! # Auto-detection
//!
//! With no explicit port, candidates are tried in this order: the port that
//! last connected successfully, then USB serial ports, then everything else.

use crate::backend::link::{LinkStats, TracerLink};
use crate::config::SerialConfig;
use crate::error::{CurveBugError, Result, ResultExt};
use crate::types::{Excitation, FRAME_BYTES};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Read timeout for a single poll of the port
const READ_SLICE: Duration = Duration::from_millis(20);

/// A serial port visible to the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    pub is_usb: bool,
}

/// List serial ports visible to the system
pub fn list_ports() -> Vec<PortCandidate> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| PortCandidate {
                is_usb: matches!(p.port_type, SerialPortType::UsbPort(_)),
                name: p.port_name,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Could not enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

/// Order ports for auto-detection
pub fn rank_ports(preferred: Option<&str>, ports: &[PortCandidate]) -> Vec<String> {
    let mut ranked: Vec<&PortCandidate> = ports.iter().collect();
    // Stable sort keeps system order within each group
    ranked.sort_by_key(|p| {
        if Some(p.name.as_str()) == preferred {
            0
        } else if p.is_usb {
            1
        } else {
            2
        }
    });
    ranked.into_iter().map(|p| p.name.clone()).collect()
}

/// Serial link to a CurveBug tracer
pub struct SerialLink {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
    /// Tried first during auto-detection
    preferred_port: Option<String>,
    stats: LinkStats,
}

impl SerialLink {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: None,
            port_name: None,
            preferred_port: None,
            stats: LinkStats::default(),
        }
    }

    /// Prefer a port (typically the last one that worked) during auto-detection
    pub fn with_preferred_port(mut self, port: Option<String>) -> Self {
        self.preferred_port = port;
        self
    }

    fn open(&self, name: &str) -> Result<Box<dyn SerialPort>> {
        let port = serialport::new(name, self.config.baud_rate)
            .timeout(READ_SLICE)
            .open()
            .with_context(|| format!("Failed to open {}", name))?;

        // The tracer resets when the port opens; give it time before flushing
        std::thread::sleep(self.config.settle_time());
        port.clear(ClearBuffer::Input)
            .with_context(|| format!("Failed to flush {}", name))?;
        Ok(port)
    }

    /// Count a failed request before passing the error on
    fn track_failure<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.stats.record_failure();
        }
        result
    }

    fn read_frame(&mut self, start: Instant, timeout: Duration) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(CurveBugError::NotConnected)?;
        let mut buffer = vec![0u8; FRAME_BYTES];
        let mut filled = 0;

        while filled < FRAME_BYTES {
            if start.elapsed() >= timeout {
                self.stats.record_timeout();
                return Err(CurveBugError::Timeout(format!(
                    "received {} of {} bytes",
                    filled, FRAME_BYTES
                )));
            }
            match port.read(&mut buffer[filled..]) {
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    self.stats.record_failure();
                    return Err(e.into());
                }
            }
        }

        Ok(buffer)
    }
}

/// Drop stale input and request one acquisition
fn send_command(port: &mut dyn SerialPort, excitation: Excitation) -> Result<()> {
    port.clear(ClearBuffer::Input)?;
    write_command(port, excitation)?;
    Ok(())
}

fn write_command<W: Write + ?Sized>(writer: &mut W, excitation: Excitation) -> std::io::Result<()> {
    writer.write_all(&[excitation.command_byte()])?;
    writer.flush()
}

impl TracerLink for SerialLink {
    fn connect(&mut self, port: Option<&str>) -> Result<()> {
        self.disconnect();

        let candidates = match port.or(self.config.port.as_deref()) {
            Some(name) => vec![name.to_string()],
            None => rank_ports(self.preferred_port.as_deref(), &list_ports()),
        };
        if candidates.is_empty() {
            return Err(CurveBugError::NotConnected.with_context("No serial ports found"));
        }

        let mut last_error = None;
        for name in candidates {
            tracing::debug!("Trying {} at {} baud", name, self.config.baud_rate);
            match self.open(&name) {
                Ok(opened) => {
                    tracing::info!("Connected to {}", name);
                    self.port = Some(opened);
                    self.preferred_port = Some(name.clone());
                    self.port_name = Some(name);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CurveBugError::NotConnected))
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            tracing::info!(
                "Closed {}",
                self.port_name.as_deref().unwrap_or("serial port")
            );
        }
        self.port_name = None;
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn acquire(&mut self, excitation: Excitation, timeout: Duration) -> Result<Vec<u8>> {
        let start = Instant::now();
        let port = self.port.as_mut().ok_or(CurveBugError::NotConnected)?;
        let sent = send_command(port.as_mut(), excitation);
        self.track_failure(sent)?;

        let frame = self.read_frame(start, timeout)?;
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.stats.record_frame(elapsed_us, frame.len() as u64);
        Ok(frame)
    }

    fn port_name(&self) -> Option<String> {
        self.port_name.clone()
    }

    fn preferred_port(&self) -> Option<String> {
        self.preferred_port.clone()
    }

    fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut LinkStats {
        &mut self.stats
    }
}
