//! Tracer core: decoding, mode tracking, trace retention and view mapping
//!
//! [`TracerCore`] owns every piece of mutable display state. Frames and
//! operator commands are applied to it one at a time from a single thread,
//! so no component ever observes another mid-update. Renderers on other
//! threads read an immutable [`DisplaySnapshot`] instead.
//!
//! # Components
//!
//! - [`decoder`] - raw buffer to [`Frame`]
//! - [`excitation`] - mode cycling and T/W stamping
//! - [`history`] - current and previous retained frames
//! - [`view`] - Fixed/Auto coordinate mapping with pan, zoom and fit
//! - [`statistics`] - per-DUT ranges for the info panel

pub mod decoder;
pub mod excitation;
pub mod history;
pub mod statistics;
pub mod view;

pub use decoder::{decode_frame, encode_words, Frame, FrameDecoder};
pub use excitation::{ExcitationController, StampedFrame};
pub use history::{DutTrace, TraceHistory};
pub use statistics::{DutStatistics, TraceStatistics, ValueRange};
pub use view::{DataBounds, ScaleMode, ViewLimits, ViewState, ViewTransform};

use crate::config::TracerConfig;
use crate::error::DecodeError;
use crate::types::{
    DataPoint, DutId, Excitation, ExcitationMode, ScreenPoint, TraceSlot, Viewport,
};

/// Operator command delivered by the input layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TracerCommand {
    /// Advance 4.7K -> 100K weak -> alternating -> 4.7K
    CycleExcitationMode,
    /// Freeze or resume trace updates
    TogglePause,
    /// Show only DUT1
    ToggleSingleChannel,
    /// Switch between Fixed and Auto scaling
    ToggleAutoScale,
    /// Commit a zoom/pan that frames the retained data
    FitToWindow,
    /// Zoom 1, no pan, Fixed mode
    ResetView,
    /// Shift the view in ADC units
    Pan { dx: f64, dy: f64 },
    /// Scale the view about a data-space anchor
    Zoom {
        factor: f64,
        anchor: Option<DataPoint>,
    },
}

/// What happened to an ingested buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Decoded and stored as the current frame
    Committed {
        sequence: u64,
        excitation: Excitation,
    },
    /// Dropped because the display is paused
    DiscardedWhilePaused,
}

/// Owned tracer state
#[derive(Debug, Clone)]
pub struct TracerCore {
    decoder: FrameDecoder,
    excitation: ExcitationController,
    history: TraceHistory,
    view: ViewState,
    statistics: TraceStatistics,
    paused: bool,
    single_channel: bool,
}

impl Default for TracerCore {
    fn default() -> Self {
        Self::new(ExcitationMode::default(), ViewState::default())
    }
}

impl TracerCore {
    pub fn new(mode: ExcitationMode, view: ViewState) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            excitation: ExcitationController::new(mode),
            history: TraceHistory::new(),
            view,
            statistics: TraceStatistics::default(),
            paused: false,
            single_channel: false,
        }
    }

    /// Build the initial state from configuration
    pub fn from_config(config: &TracerConfig) -> Self {
        let mut core = Self::new(
            config.acquisition.initial_mode,
            ViewState::from_config(&config.view),
        );
        core.single_channel = config.view.single_channel;
        core
    }

    /// Decode a raw buffer and commit it
    ///
    /// On a decode error the retained traces are left exactly as they were.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<FrameDisposition, DecodeError> {
        if self.paused {
            return Ok(FrameDisposition::DiscardedWhilePaused);
        }
        let frame = self.decoder.decode(bytes)?;
        Ok(self.commit(frame))
    }

    fn commit(&mut self, frame: Frame) -> FrameDisposition {
        let stamped = self.excitation.stamp(frame);
        let sequence = stamped.sequence;
        let excitation = stamped.excitation;

        if sequence == 1 {
            log_first_frame(&stamped);
        }

        self.history.push(stamped, self.excitation.mode());
        self.refresh_derived();

        FrameDisposition::Committed {
            sequence,
            excitation,
        }
    }

    fn refresh_derived(&mut self) {
        self.view.refresh_bounds(&self.history);
        self.statistics = TraceStatistics::from_history(&self.history);
    }

    /// Apply one operator command
    pub fn apply(&mut self, command: TracerCommand) {
        tracing::debug!("Applying {:?}", command);
        match command {
            TracerCommand::CycleExcitationMode => {
                let mode = self.excitation.cycle();
                self.history.on_mode_change(mode);
                self.refresh_derived();
            }
            TracerCommand::TogglePause => {
                self.paused = !self.paused;
                tracing::info!("Paused: {}", self.paused);
            }
            TracerCommand::ToggleSingleChannel => {
                self.single_channel = !self.single_channel;
                tracing::info!("Single channel (DUT1 only): {}", self.single_channel);
            }
            TracerCommand::ToggleAutoScale => {
                self.view.toggle_auto_scale();
            }
            TracerCommand::FitToWindow => {
                let bounds = self.view.auto_bounds();
                self.view.fit_to(bounds);
            }
            TracerCommand::ResetView => self.view.reset(),
            TracerCommand::Pan { dx, dy } => {
                self.view.pan_by(dx, dy);
            }
            TracerCommand::Zoom { factor, anchor } => {
                self.view.zoom_by(factor, anchor);
            }
        }
    }

    /// Screen points for one retained trace, in acquisition order
    ///
    /// Empty when the slot holds nothing or the DUT is hidden.
    pub fn viewport_points(
        &self,
        dut: DutId,
        slot: TraceSlot,
        viewport: Viewport,
    ) -> Vec<ScreenPoint> {
        visible_points(&self.history, &self.view, self.single_channel, dut, slot, viewport)
    }

    pub fn statistics(&self) -> &TraceStatistics {
        &self.statistics
    }

    pub fn active_mode(&self) -> ExcitationMode {
        self.excitation.mode()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_single_channel(&self) -> bool {
        self.single_channel
    }

    /// Drive the transport should request for the next acquisition
    pub fn next_excitation(&self) -> Excitation {
        self.excitation.planned_excitation()
    }

    pub fn history(&self) -> &TraceHistory {
        &self.history
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Frames committed since start
    pub fn frame_count(&self) -> u64 {
        self.excitation.frames_stamped()
    }

    /// Immutable copy of everything a renderer needs
    ///
    /// Retained frames are shared, not copied.
    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            history: self.history.clone(),
            view: self.view.clone(),
            statistics: self.statistics,
            mode: self.excitation.mode(),
            mode_label: self.excitation.status_label(),
            paused: self.paused,
            single_channel: self.single_channel,
            frame_count: self.frame_count(),
        }
    }
}

fn visible_points(
    history: &TraceHistory,
    view: &ViewState,
    single_channel: bool,
    dut: DutId,
    slot: TraceSlot,
    viewport: Viewport,
) -> Vec<ScreenPoint> {
    if single_channel && dut == DutId::Dut2 {
        return Vec::new();
    }
    match history.trace(dut, slot) {
        Some(trace) => view.transform().map_trace(&trace, viewport),
        None => Vec::new(),
    }
}

fn log_first_frame(stamped: &StampedFrame) {
    let frame = &stamped.frame;
    let range = |values: &[u16]| {
        let min = values.iter().min().copied().unwrap_or(0);
        let max = values.iter().max().copied().unwrap_or(0);
        (min, max)
    };
    let (d_min, d_max) = range(frame.drive());
    let (v1_min, v1_max) = range(frame.voltage(DutId::Dut1));
    let (v2_min, v2_max) = range(frame.voltage(DutId::Dut2));
    tracing::info!(
        "First acquisition ({}): {} points, CH0 {}-{}, CH1 {}-{}, CH2 {}-{}",
        stamped.excitation,
        frame.len(),
        d_min,
        d_max,
        v1_min,
        v1_max,
        v2_min,
        v2_max
    );
}

/// One trace ready for drawing
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTrace {
    pub dut: DutId,
    /// `Previous` traces are drawn dimmed
    pub slot: TraceSlot,
    pub excitation: Excitation,
    pub points: Vec<ScreenPoint>,
}

/// Committed display state handed to the renderer
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    pub history: TraceHistory,
    pub view: ViewState,
    pub statistics: TraceStatistics,
    pub mode: ExcitationMode,
    /// Status label, e.g. "ALT[W-bright T-dim]"
    pub mode_label: String,
    pub paused: bool,
    pub single_channel: bool,
    pub frame_count: u64,
}

impl Default for DisplaySnapshot {
    fn default() -> Self {
        TracerCore::default().snapshot()
    }
}

impl DisplaySnapshot {
    /// Screen points for one retained trace
    pub fn viewport_points(
        &self,
        dut: DutId,
        slot: TraceSlot,
        viewport: Viewport,
    ) -> Vec<ScreenPoint> {
        visible_points(&self.history, &self.view, self.single_channel, dut, slot, viewport)
    }

    /// Traces in draw order: dimmed previous first, then current
    pub fn render_plan(&self, viewport: Viewport) -> Vec<RenderTrace> {
        let transform = self.view.transform();
        self.history
            .traces()
            .filter(|trace| !(self.single_channel && trace.dut == DutId::Dut2))
            .map(|trace| RenderTrace {
                dut: trace.dut,
                slot: trace.slot,
                excitation: trace.excitation,
                points: transform.map_trace(&trace, viewport),
            })
            .collect()
    }

    /// Crosshair position
    pub fn origin_marker(&self, viewport: Viewport) -> ScreenPoint {
        self.view.origin_marker(viewport)
    }

    pub fn visible_domain(&self, viewport: Viewport) -> Option<DataBounds> {
        self.view.visible_domain(viewport)
    }

    /// Status bar text
    pub fn status_line(&self, fps: f64) -> String {
        let mut status = format!(
            "Frame: {}  |  FPS: {:.1}  |  Mode: {}",
            self.frame_count, fps, self.mode_label
        );
        if self.paused {
            status.push_str(" [PAUSED]");
        }
        if self.single_channel {
            status.push_str(" [SINGLE CH]");
        }
        status.push_str(match self.view.mode() {
            ScaleMode::Auto => " [AUTO]",
            ScaleMode::Fixed => " [FIXED]",
        });
        status
    }
}
