//! Integration tests for the acquisition-to-screen pipeline
//!
//! These tests drive a [`TracerCore`] with raw buffers and check what a
//! renderer would see:
//! - Alternating frames tagged and retained as bright/dim pairs
//! - Statistics over the retained traces
//! - Auto-scale placing the data box edges at the viewport margins
//! - Fixed-scale, fit-to-window and pause behaviour

mod common;

use common::assert_float_eq;
use common::builders::{flat, FrameBuilder};
use curvebug_rs::tracer::{FrameDisposition, ScaleMode};
use curvebug_rs::{
    DataPoint, DecodeError, DutId, Excitation, ExcitationMode, TraceSlot, TracerCommand, TracerCore,
    Viewport,
};

const VIEW: Viewport = Viewport {
    width: 1000.0,
    height: 800.0,
};

const MARGIN: f64 = 0.05;

/// Drive rises 4 codes per point, DUT1 follows at half slope, DUT2 falls
///
/// Currents: DUT1 = 100 + 10n + 2i, DUT2 = -1048 + 10n + 5i.
fn sweep(n: u16) -> Vec<u8> {
    FrameBuilder::new()
        .drive(move |i| 1000 + 4 * i as u16 + 10 * n)
        .dut1(|i| 900 + 2 * i as u16)
        .dut2(|i| 2048 - i as u16)
        .build()
}

fn alternating_auto_core() -> TracerCore {
    let mut core = TracerCore::default();
    core.apply(TracerCommand::CycleExcitationMode);
    core.apply(TracerCommand::CycleExcitationMode);
    core.apply(TracerCommand::ToggleAutoScale);
    assert_eq!(core.active_mode(), ExcitationMode::Alternating);
    assert_eq!(core.view().mode(), ScaleMode::Auto);
    core
}

#[test]
fn test_alternating_frames_are_tagged_and_retained() {
    let mut core = alternating_auto_core();

    let mut tags = Vec::new();
    let mut planned = Vec::new();
    for n in 0..3 {
        planned.push(core.next_excitation());
        match core.ingest(&sweep(n)).unwrap() {
            FrameDisposition::Committed { excitation, .. } => tags.push(excitation),
            other => panic!("unexpected {:?}", other),
        }
    }

    assert_eq!(tags, vec![Excitation::Standard, Excitation::Weak, Excitation::Standard]);
    assert_eq!(planned, tags);
    assert_eq!(core.frame_count(), 3);

    let history = core.history();
    assert_eq!(history.current().unwrap().excitation, Excitation::Standard);
    assert_eq!(history.previous().unwrap().excitation, Excitation::Weak);
    assert_eq!(history.current().unwrap().sequence, 3);
}

#[test]
fn test_statistics_cover_retained_traces() {
    let mut core = alternating_auto_core();
    for n in 0..3 {
        core.ingest(&sweep(n)).unwrap();
    }

    // Frames 1 and 2 are retained
    let stats = core.statistics();
    let dut1 = stats.dut(DutId::Dut1).unwrap();
    assert_eq!(dut1.current.min, 110);
    assert_eq!(dut1.current.max, 790);
    assert_eq!(dut1.voltage.min, 900);
    assert_eq!(dut1.voltage.max, 1570);
    assert_eq!(dut1.points, 2 * 336);

    let dut2 = stats.dut(DutId::Dut2).unwrap();
    assert_eq!(dut2.current.min, -1038);
    assert_eq!(dut2.current.max, 647);

    let drive = stats.drive.unwrap();
    assert_eq!(drive.min, 1020);
    assert_eq!(drive.max, 2360);
}

#[test]
fn test_auto_scale_puts_extremes_at_margins() {
    let mut core = alternating_auto_core();
    for n in 0..3 {
        core.ingest(&sweep(n)).unwrap();
    }

    // Highest voltage (DUT2 at rest) is drawn leftmost, lowest current topmost
    let dut2_prev = core.viewport_points(DutId::Dut2, TraceSlot::Previous, VIEW);
    assert_float_eq(dut2_prev[0].x, MARGIN * VIEW.width, 1e-6);
    assert_float_eq(dut2_prev[0].y, MARGIN * VIEW.height, 1e-6);

    let dut1_cur = core.viewport_points(DutId::Dut1, TraceSlot::Current, VIEW);
    assert_float_eq(dut1_cur[0].x, (1.0 - MARGIN) * VIEW.width, 1e-6);
    assert_float_eq(dut1_cur[335].y, (1.0 - MARGIN) * VIEW.height, 1e-6);

    let (x_lo, x_hi) = (MARGIN * VIEW.width - 1e-6, (1.0 - MARGIN) * VIEW.width + 1e-6);
    let (y_lo, y_hi) = (MARGIN * VIEW.height - 1e-6, (1.0 - MARGIN) * VIEW.height + 1e-6);
    for trace in core.snapshot().render_plan(VIEW) {
        for p in &trace.points {
            assert!(p.x >= x_lo && p.x <= x_hi);
            assert!(p.y >= y_lo && p.y <= y_hi);
        }
    }
}

#[test]
fn test_render_plan_order_and_single_channel() {
    let mut core = alternating_auto_core();
    for n in 0..2 {
        core.ingest(&sweep(n)).unwrap();
    }

    let plan = core.snapshot().render_plan(VIEW);
    let order: Vec<_> = plan.iter().map(|t| (t.slot, t.dut)).collect();
    assert_eq!(
        order,
        vec![
            (TraceSlot::Previous, DutId::Dut1),
            (TraceSlot::Previous, DutId::Dut2),
            (TraceSlot::Current, DutId::Dut1),
            (TraceSlot::Current, DutId::Dut2),
        ]
    );

    core.apply(TracerCommand::ToggleSingleChannel);
    let snapshot = core.snapshot();
    assert!(snapshot.render_plan(VIEW).iter().all(|t| t.dut == DutId::Dut1));
    assert!(snapshot
        .viewport_points(DutId::Dut2, TraceSlot::Current, VIEW)
        .is_empty());
    assert!(snapshot.status_line(0.0).contains("[SINGLE CH]"));
}

#[test]
fn test_leaving_alternating_drops_dim_trace() {
    let mut core = alternating_auto_core();
    for n in 0..2 {
        core.ingest(&sweep(n)).unwrap();
    }
    assert!(core.history().previous().is_some());

    core.apply(TracerCommand::CycleExcitationMode);
    assert_eq!(core.active_mode(), ExcitationMode::Mode4K7);
    assert!(core.history().previous().is_none());
    assert!(core.history().current().is_some());
    assert_eq!(core.statistics().dut(DutId::Dut1).unwrap().points, 336);
}

#[test]
fn test_fixed_scale_origin_and_resize() {
    let core = TracerCore::default();
    let snapshot = core.snapshot();

    let marker = snapshot.origin_marker(VIEW);
    assert_float_eq(marker.x, (1.0 - 2048.0 / 2800.0) * VIEW.width, 1e-9);
    assert_float_eq(marker.y, 0.875 * VIEW.height, 1e-9);

    // Same state, bigger window: positions scale with it
    let big = Viewport::new(2000.0, 1600.0);
    let marker_big = snapshot.origin_marker(big);
    assert_float_eq(marker_big.x, marker.x * 2.0, 1e-9);
    assert_float_eq(marker_big.y, marker.y * 2.0, 1e-9);
}

#[test]
fn test_fit_to_window_frames_data_in_fixed_mode() {
    let mut core = TracerCore::default();
    core.ingest(&sweep(0)).unwrap();
    core.apply(TracerCommand::Zoom {
        factor: 4.0,
        anchor: None,
    });
    core.apply(TracerCommand::FitToWindow);

    assert_eq!(core.view().mode(), ScaleMode::Fixed);
    for trace in core.snapshot().render_plan(VIEW) {
        for p in &trace.points {
            assert!(p.x >= -1e-6 && p.x <= VIEW.width + 1e-6, "x out of view: {}", p.x);
            assert!(p.y >= -1e-6 && p.y <= VIEW.height + 1e-6, "y out of view: {}", p.y);
        }
    }

    // Pan now applies again
    let before = core.view().pan();
    core.apply(TracerCommand::Pan { dx: 10.0, dy: 0.0 });
    assert_float_eq(core.view().pan().x, before.x + 10.0, 1e-9);
}

#[test]
fn test_pan_and_zoom_ignored_in_auto() {
    let mut core = TracerCore::default();
    core.ingest(&sweep(0)).unwrap();
    core.apply(TracerCommand::ToggleAutoScale);

    let before = core.viewport_points(DutId::Dut1, TraceSlot::Current, VIEW);
    core.apply(TracerCommand::Pan { dx: 100.0, dy: 50.0 });
    core.apply(TracerCommand::Zoom {
        factor: 3.0,
        anchor: Some(DataPoint::new(1000.0, 0.0)),
    });
    assert_eq!(core.viewport_points(DutId::Dut1, TraceSlot::Current, VIEW), before);
}

#[test]
fn test_pause_and_decode_errors_keep_traces() {
    let mut core = TracerCore::default();
    core.ingest(&sweep(0)).unwrap();
    let retained = core.history().current().unwrap().frame.clone();

    let err = core.ingest(&sweep(1)[..2014]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::SizeMismatch {
            expected: 2016,
            actual: 2014
        }
    );
    assert_eq!(core.history().current().unwrap().frame, retained);

    core.apply(TracerCommand::TogglePause);
    assert_eq!(
        core.ingest(&FrameBuilder::new().dut1(flat(0)).build()).unwrap(),
        FrameDisposition::DiscardedWhilePaused
    );
    assert_eq!(core.history().current().unwrap().frame, retained);
    assert_eq!(core.frame_count(), 1);
    assert!(core.snapshot().status_line(12.5).contains("[PAUSED]"));
}
