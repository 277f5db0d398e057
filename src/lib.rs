//! # CurveBug-RS: Dual-DUT Curve Tracer Core
//!
//! Acquires raw frames from a CurveBug curve tracer over a serial link,
//! decodes them into drive/DUT1/DUT2 channels and maps the resulting I-V
//! traces into a caller-sized viewport with fixed or auto scaling.
//!
//! ## Architecture
//!
//! - **Tracer core**: frame decoding, excitation mode tracking, trace history,
//!   view transform and statistics, all owned by one [`TracerCore`]
//! - **Backend**: acquisition loop on its own thread, talking to the device
//!   through a [`TracerLink`](backend::TracerLink)
//! - **Communication**: crossbeam channels for commands and status, plus a
//!   shared slot holding the latest [`DisplaySnapshot`]
//!
//! ## Configuration
//!
//! `config.toml` lives in the platform config directory under
//! `dev.curvebug.curvebug-rs`; the last working port is remembered in
//! `app_state.json` in the platform data directory.
//!
//! ## Example
//!
//! ```ignore
//! use curvebug_rs::{backend::TracerBackend, config::TracerConfig, TracerCommand, Viewport};
//!
//! let (backend, frontend) = TracerBackend::new(TracerConfig::default());
//! std::thread::spawn(move || backend.run());
//! frontend.connect(None);
//!
//! // From the input layer
//! frontend.apply(TracerCommand::ToggleAutoScale);
//!
//! // From the render loop
//! let snapshot = frontend.latest_snapshot();
//! let plan = snapshot.render_plan(Viewport::new(1000.0, 800.0));
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod tracer;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendCommand, BackendMessage, FrontendReceiver, TracerBackend};
pub use config::{AppState, TracerConfig};
pub use error::{CurveBugError, DecodeError, Result};
pub use tracer::{DisplaySnapshot, Frame, FrameDecoder, RenderTrace, TracerCommand, TracerCore};
pub use types::{DataPoint, DutId, Excitation, ExcitationMode, ScreenPoint, TraceSlot, Viewport};
