//! Error handling for the CurveBug tracer
//!
//! This module defines the frame decoding error taxonomy, the crate-wide
//! error type and a Result alias for use throughout the application.

use thiserror::Error;

/// Failures while turning a raw acquisition buffer into a [`Frame`](crate::tracer::Frame)
///
/// Both variants are recoverable: the offending buffer is discarded and the
/// previously retained traces stay on screen.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer length did not match the expected frame size
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The buffer did not yield the expected number of samples
    #[error("Expected {expected} values, got {actual}")]
    SampleCountMismatch { expected: usize, actual: usize },
}

/// Main error type for CurveBug operations
#[derive(Error, Debug)]
pub enum CurveBugError {
    /// Frame decoding failed
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Errors reported by the serial port layer
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// The link is not connected to a tracer
    #[error("Serial: NOT CONNECTED")]
    NotConnected,

    /// An acquisition did not complete before its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CurveBugError>,
    },
}

impl CurveBugError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CurveBugError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error means the device is gone rather than a single bad cycle
    pub fn is_connection_loss(&self) -> bool {
        match self {
            CurveBugError::NotConnected | CurveBugError::Serial(_) | CurveBugError::Io(_) => true,
            CurveBugError::WithContext { source, .. } => source.is_connection_loss(),
            _ => false,
        }
    }
}

/// Result type alias for CurveBug operations
pub type Result<T> = std::result::Result<T, CurveBugError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, serialport::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CurveBugError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CurveBugError::from(e).with_context(f()))
    }
}
