//! Trace history buffer
//!
//! Retains the current frame and, in alternating mode only, the frame that
//! was current before it. Frames are held behind `Arc` so display snapshots
//! can share them without copying; nothing outside this buffer mutates them.

use crate::tracer::excitation::StampedFrame;
use crate::types::{DutId, Excitation, ExcitationMode, TraceSlot};
use std::sync::Arc;

/// Borrowed view of one DUT's trace in one slot
#[derive(Debug, Clone, Copy)]
pub struct DutTrace<'a> {
    pub dut: DutId,
    pub slot: TraceSlot,
    pub excitation: Excitation,
    /// DUT voltage per point (x axis)
    pub voltage: &'a [u16],
    /// Derived current per point (y axis)
    pub current: &'a [i32],
}

impl DutTrace<'_> {
    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }
}

/// Current and previous retained frames
#[derive(Debug, Clone, Default)]
pub struct TraceHistory {
    current: Option<Arc<StampedFrame>>,
    previous: Option<Arc<StampedFrame>>,
}

impl TraceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a newly arrived frame
    ///
    /// In alternating mode the old current frame becomes previous; otherwise
    /// previous is dropped.
    pub fn push(&mut self, frame: StampedFrame, mode: ExcitationMode) {
        let old = self.current.replace(Arc::new(frame));
        self.previous = if mode.is_alternating() { old } else { None };
    }

    /// Apply a mode change; leaving alternating discards the dimmed trace
    pub fn on_mode_change(&mut self, mode: ExcitationMode) {
        if !mode.is_alternating() && self.previous.take().is_some() {
            tracing::debug!("Dropped previous trace on switch to {}", mode);
        }
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.current = None;
        self.previous = None;
    }

    pub fn current(&self) -> Option<&StampedFrame> {
        self.current.as_deref()
    }

    pub fn previous(&self) -> Option<&StampedFrame> {
        self.previous.as_deref()
    }

    /// Frame in the given slot
    pub fn frame(&self, slot: TraceSlot) -> Option<&StampedFrame> {
        match slot {
            TraceSlot::Current => self.current(),
            TraceSlot::Previous => self.previous(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// One DUT's trace from the given slot
    pub fn trace(&self, dut: DutId, slot: TraceSlot) -> Option<DutTrace<'_>> {
        self.frame(slot).map(|stamped| DutTrace {
            dut,
            slot,
            excitation: stamped.excitation,
            voltage: stamped.frame.voltage(dut),
            current: stamped.frame.current(dut),
        })
    }

    /// All retained traces, previous before current
    pub fn traces(&self) -> impl Iterator<Item = DutTrace<'_>> {
        [TraceSlot::Previous, TraceSlot::Current]
            .into_iter()
            .flat_map(move |slot| {
                DutId::ALL
                    .into_iter()
                    .filter_map(move |dut| self.trace(dut, slot))
            })
    }

    /// All retained traces of one DUT, previous before current
    pub fn traces_for(&self, dut: DutId) -> impl Iterator<Item = DutTrace<'_>> {
        [TraceSlot::Previous, TraceSlot::Current]
            .into_iter()
            .filter_map(move |slot| self.trace(dut, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::decoder::Frame;
    use crate::tracer::excitation::ExcitationController;
    use crate::types::POINTS_PER_CHANNEL;

    fn frame_with_level(level: u16) -> Frame {
        Frame::from_channels(
            vec![level; POINTS_PER_CHANNEL],
            vec![level / 2; POINTS_PER_CHANNEL],
            vec![level / 4; POINTS_PER_CHANNEL],
        )
        .unwrap()
    }

    #[test]
    fn test_non_alternating_never_keeps_previous() {
        let mut ctrl = ExcitationController::new(ExcitationMode::Mode4K7);
        let mut history = TraceHistory::new();

        for level in [100, 200, 300] {
            history.push(ctrl.stamp(frame_with_level(level)), ctrl.mode());
            assert!(history.previous().is_none());
        }
        assert_eq!(history.current().unwrap().frame.drive()[0], 300);
    }

    #[test]
    fn test_alternating_keeps_previous() {
        let mut ctrl = ExcitationController::new(ExcitationMode::Alternating);
        let mut history = TraceHistory::new();

        history.push(ctrl.stamp(frame_with_level(100)), ctrl.mode());
        assert!(history.previous().is_none());
        let first = history.current().cloned().unwrap();

        history.push(ctrl.stamp(frame_with_level(200)), ctrl.mode());
        assert_eq!(history.previous(), Some(&first));
        assert_eq!(history.previous().unwrap().excitation, Excitation::Standard);
        assert_eq!(history.current().unwrap().excitation, Excitation::Weak);
    }

    #[test]
    fn test_leaving_alternating_clears_previous() {
        let mut ctrl = ExcitationController::new(ExcitationMode::Alternating);
        let mut history = TraceHistory::new();
        history.push(ctrl.stamp(frame_with_level(100)), ctrl.mode());
        history.push(ctrl.stamp(frame_with_level(200)), ctrl.mode());
        assert!(history.previous().is_some());

        let mode = ctrl.cycle();
        history.on_mode_change(mode);
        assert!(history.previous().is_none());
        assert!(history.current().is_some());
    }

    #[test]
    fn test_trace_iteration_order() {
        let mut ctrl = ExcitationController::new(ExcitationMode::Alternating);
        let mut history = TraceHistory::new();
        assert_eq!(history.traces().count(), 0);

        history.push(ctrl.stamp(frame_with_level(100)), ctrl.mode());
        history.push(ctrl.stamp(frame_with_level(200)), ctrl.mode());

        let order: Vec<_> = history.traces().map(|t| (t.slot, t.dut)).collect();
        assert_eq!(
            order,
            vec![
                (TraceSlot::Previous, DutId::Dut1),
                (TraceSlot::Previous, DutId::Dut2),
                (TraceSlot::Current, DutId::Dut1),
                (TraceSlot::Current, DutId::Dut2),
            ]
        );

        let dut2 = history.trace(DutId::Dut2, TraceSlot::Current).unwrap();
        assert_eq!(dut2.voltage[0], 50);
        assert_eq!(dut2.current[0], 150);
        assert_eq!(history.traces_for(DutId::Dut1).count(), 2);
    }
}
