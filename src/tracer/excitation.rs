//! Excitation mode state machine
//!
//! The operator cycles Mode4K7 -> Mode100KWeak -> Alternating -> Mode4K7. The
//! controller tells the transport which drive to request next and tags every
//! decoded frame with the drive that produced it. In alternating mode the
//! planned drive flips after each stamped frame, starting with T.

use crate::tracer::decoder::Frame;
use crate::types::{Excitation, ExcitationMode};

/// A decoded frame tagged with the drive that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedFrame {
    /// Drive used for this acquisition
    pub excitation: Excitation,
    /// Monotonic frame number assigned at stamping time
    pub sequence: u64,
    /// Decoded channel data
    pub frame: Frame,
}

/// Tracks the active excitation mode and the alternating sub-mode
#[derive(Debug, Clone)]
pub struct ExcitationController {
    mode: ExcitationMode,
    next_alternate: Excitation,
    last_excitation: Option<Excitation>,
    stamped: u64,
}

impl Default for ExcitationController {
    fn default() -> Self {
        Self::new(ExcitationMode::default())
    }
}

impl ExcitationController {
    pub fn new(mode: ExcitationMode) -> Self {
        Self {
            mode,
            next_alternate: Excitation::Standard,
            last_excitation: None,
            stamped: 0,
        }
    }

    /// Currently selected mode
    pub fn mode(&self) -> ExcitationMode {
        self.mode
    }

    /// Advance to the next mode in the cycle and return it
    pub fn cycle(&mut self) -> ExcitationMode {
        self.set_mode(self.mode.next());
        self.mode
    }

    /// Jump directly to a mode
    pub fn set_mode(&mut self, mode: ExcitationMode) {
        if mode.is_alternating() && !self.mode.is_alternating() {
            self.next_alternate = Excitation::Standard;
        }
        self.mode = mode;
        tracing::info!("Excitation mode: {}", mode);
    }

    /// Drive the next acquisition should use
    pub fn planned_excitation(&self) -> Excitation {
        match self.mode {
            ExcitationMode::Mode4K7 => Excitation::Standard,
            ExcitationMode::Mode100KWeak => Excitation::Weak,
            ExcitationMode::Alternating => self.next_alternate,
        }
    }

    /// Tag a freshly decoded frame with the planned drive
    pub fn stamp(&mut self, frame: Frame) -> StampedFrame {
        let excitation = self.planned_excitation();
        if self.mode.is_alternating() {
            self.next_alternate = excitation.toggled();
        }
        self.last_excitation = Some(excitation);
        self.stamped += 1;

        StampedFrame {
            excitation,
            sequence: self.stamped,
            frame,
        }
    }

    /// Drive that produced the most recent frame
    pub fn last_excitation(&self) -> Option<Excitation> {
        self.last_excitation
    }

    /// Number of frames stamped so far
    pub fn frames_stamped(&self) -> u64 {
        self.stamped
    }

    /// Mode label for the status line
    ///
    /// In alternating mode this names the bright (latest) and dim sub-modes.
    pub fn status_label(&self) -> String {
        match (self.mode, self.last_excitation) {
            (ExcitationMode::Alternating, Some(Excitation::Weak)) => {
                "ALT[W-bright T-dim]".to_string()
            }
            (ExcitationMode::Alternating, Some(Excitation::Standard)) => {
                "ALT[T-bright W-dim]".to_string()
            }
            (mode, _) => mode.short_name().to_string(),
        }
    }
}
