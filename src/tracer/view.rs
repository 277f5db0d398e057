//! View transform engine
//!
//! Maps data-space points (x = DUT voltage, y = current, both in ADC units)
//! into a caller-sized viewport. The viewport size is passed on every call and
//! never cached, so window resizes take effect immediately.
//!
//! # Scale Modes
//!
//! - **Fixed**: the hardware manual's constant mapping. X spans ADC 0..[`ADC_MAX`]
//!   and the zero-current floor sits at [`FLOOR_RATIO`] of the height, giving a
//!   window of roughly -1837..+262 current units. Pan and zoom apply here;
//!   zoom scales about ([`ADC_ORIGIN`], 0) unless an anchor is given.
//! - **Auto**: the box around every retained trace is stretched to fill the
//!   viewport, less a fixed margin. Pan and zoom are ignored.
//!
//! Both modes invert both axes after the linear scale: higher voltage moves
//! left and higher current moves down.
//!
//! # Fit To Window
//!
//! [`ViewState::fit_to`] takes the same box Auto mode would use and commits a
//! zoom and pan that frame it, then stays in Fixed mode. It is a one-shot
//! snapshot, not a per-frame recomputation.

use crate::config::ViewConfig;
use crate::tracer::history::{DutTrace, TraceHistory};
use crate::types::{
    DataPoint, ScreenPoint, Viewport, ADC_MAX, ADC_ORIGIN, FLOOR_RATIO, Y_RANGE,
};
use serde::{Deserialize, Serialize};

/// Higher DUT voltage is drawn further left
const INVERT_X: bool = true;

/// Higher current is drawn further down
const INVERT_Y: bool = true;

/// Smallest box edge accepted when the configured minimum is unusable
const MIN_SPAN_FLOOR: f64 = 1.0;

/// How data coordinates are turned into screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleMode {
    /// Hardware-manual constant mapping with pan/zoom
    #[default]
    Fixed,
    /// Data-driven mapping recomputed from retained traces
    Auto,
}

impl std::fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleMode::Fixed => write!(f, "FIXED"),
            ScaleMode::Auto => write!(f, "AUTO"),
        }
    }
}

/// Clamping limits and margins for the view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewLimits {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Largest absolute pan offset per axis, in ADC units
    pub pan_limit: f64,
    /// Fraction of the viewport left empty on each side in Auto mode
    pub auto_margin: f64,
    /// Smallest box edge used when every sample has the same value
    pub min_box_span: f64,
}

impl Default for ViewLimits {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 50.0,
            pan_limit: 8192.0,
            auto_margin: 0.05,
            min_box_span: 200.0,
        }
    }
}

impl ViewLimits {
    /// Build limits from configuration, repairing unusable values
    pub fn from_config(config: &ViewConfig) -> Self {
        Self {
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            pan_limit: config.pan_limit,
            auto_margin: config.auto_margin,
            min_box_span: config.min_box_span,
        }
        .sanitized()
    }

    fn sanitized(self) -> Self {
        let defaults = Self::default();
        let min_zoom = if self.min_zoom.is_finite() && self.min_zoom > 0.0 {
            self.min_zoom
        } else {
            defaults.min_zoom
        };
        let max_zoom = if self.max_zoom.is_finite() && self.max_zoom >= min_zoom {
            self.max_zoom
        } else {
            min_zoom.max(defaults.max_zoom)
        };
        let pan_limit = if self.pan_limit.is_finite() && self.pan_limit >= 0.0 {
            self.pan_limit
        } else {
            defaults.pan_limit
        };
        let auto_margin = if self.auto_margin.is_finite() {
            self.auto_margin.clamp(0.0, 0.45)
        } else {
            defaults.auto_margin
        };
        let min_box_span = if self.min_box_span.is_finite() {
            self.min_box_span.max(MIN_SPAN_FLOOR)
        } else {
            defaults.min_box_span
        };

        Self {
            min_zoom,
            max_zoom,
            pan_limit,
            auto_margin,
            min_box_span,
        }
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    fn clamp_pan(&self, value: f64) -> f64 {
        value.clamp(-self.pan_limit, self.pan_limit)
    }
}

/// Axis-aligned box in data space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl DataBounds {
    /// Box around every point of every retained trace, `None` when empty
    pub fn from_history(history: &TraceHistory) -> Option<Self> {
        Self::from_traces(history.traces())
    }

    /// Box around the given traces
    pub fn from_traces<'a>(traces: impl IntoIterator<Item = DutTrace<'a>>) -> Option<Self> {
        let mut bounds: Option<DataBounds> = None;
        for trace in traces {
            for (&v, &c) in trace.voltage.iter().zip(trace.current) {
                let point = DataPoint::new(f64::from(v), f64::from(c));
                match bounds.as_mut() {
                    Some(b) => b.include(point),
                    None => {
                        bounds = Some(DataBounds {
                            x_min: point.x,
                            x_max: point.x,
                            y_min: point.y,
                            y_max: point.y,
                        })
                    }
                }
            }
        }
        bounds
    }

    fn include(&mut self, point: DataPoint) {
        self.x_min = self.x_min.min(point.x);
        self.x_max = self.x_max.max(point.x);
        self.y_min = self.y_min.min(point.y);
        self.y_max = self.y_max.max(point.y);
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> DataPoint {
        DataPoint::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Inclusive containment test
    pub fn contains(&self, point: DataPoint) -> bool {
        point.x >= self.x_min
            && point.x <= self.x_max
            && point.y >= self.y_min
            && point.y <= self.y_max
    }

    /// Grow any axis narrower than `min_span` symmetrically about its center
    pub fn with_min_span(self, min_span: f64) -> Self {
        let min_span = min_span.max(MIN_SPAN_FLOOR);
        let center = self.center();
        let (x_min, x_max) = if self.width() < min_span {
            (center.x - min_span / 2.0, center.x + min_span / 2.0)
        } else {
            (self.x_min, self.x_max)
        };
        let (y_min, y_max) = if self.height() < min_span {
            (center.y - min_span / 2.0, center.y + min_span / 2.0)
        } else {
            (self.y_min, self.y_max)
        };
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }
}

/// Linear map from one data axis onto the unit interval of a screen axis
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisMap {
    scale: f64,
    offset: f64,
    /// Unit coordinate is `1 - linear` instead of `linear`
    flip: bool,
}

impl AxisMap {
    fn to_unit(self, value: f64) -> f64 {
        let linear = self.scale * value + self.offset;
        if self.flip {
            1.0 - linear
        } else {
            linear
        }
    }

    fn from_unit(self, unit: f64) -> Option<f64> {
        if self.scale == 0.0 || !self.scale.is_finite() {
            return None;
        }
        let linear = if self.flip { 1.0 - unit } else { unit };
        Some((linear - self.offset) / self.scale)
    }
}

/// Viewport-independent mapping for the current view state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    x: AxisMap,
    y: AxisMap,
}

impl ViewTransform {
    // Screen y grows downward, so a conventional current axis is flipped and
    // the tracer's inversion cancels that flip.
    const FLIP_X: bool = INVERT_X;
    const FLIP_Y: bool = !INVERT_Y;

    /// Fixed-scale mapping for a zoom and pan
    pub fn fixed(zoom: f64, pan: DataPoint) -> Self {
        Self {
            x: AxisMap {
                scale: zoom / ADC_MAX,
                offset: ((pan.x - ADC_ORIGIN) * zoom + ADC_ORIGIN) / ADC_MAX,
                flip: Self::FLIP_X,
            },
            y: AxisMap {
                scale: zoom / Y_RANGE,
                offset: FLOOR_RATIO + pan.y * zoom / Y_RANGE,
                flip: Self::FLIP_Y,
            },
        }
    }

    /// Mapping that stretches `bounds` across the viewport less `margin` per side
    pub fn fitted(bounds: DataBounds, margin: f64) -> Self {
        let usable = 1.0 - 2.0 * margin;
        let x_scale = usable / bounds.width();
        let y_scale = usable / bounds.height();
        Self {
            x: AxisMap {
                scale: x_scale,
                offset: margin - bounds.x_min * x_scale,
                flip: Self::FLIP_X,
            },
            y: AxisMap {
                scale: y_scale,
                offset: margin - bounds.y_min * y_scale,
                flip: Self::FLIP_Y,
            },
        }
    }

    /// Map a data point into the viewport
    pub fn map(&self, point: DataPoint, viewport: Viewport) -> ScreenPoint {
        ScreenPoint::new(
            self.x.to_unit(point.x) * viewport.width,
            self.y.to_unit(point.y) * viewport.height,
        )
    }

    /// Map a screen point back into data space
    ///
    /// Returns `None` for a degenerate viewport.
    pub fn unmap(&self, point: ScreenPoint, viewport: Viewport) -> Option<DataPoint> {
        if !viewport.is_valid() {
            return None;
        }
        Some(DataPoint::new(
            self.x.from_unit(point.x / viewport.width)?,
            self.y.from_unit(point.y / viewport.height)?,
        ))
    }

    /// Map every point of a trace, preserving acquisition order
    pub fn map_trace(&self, trace: &DutTrace<'_>, viewport: Viewport) -> Vec<ScreenPoint> {
        trace
            .voltage
            .iter()
            .zip(trace.current)
            .map(|(&v, &c)| self.map(DataPoint::new(f64::from(v), f64::from(c)), viewport))
            .collect()
    }
}

/// Mutable view state: scale mode, zoom, pan and the cached Auto box
#[derive(Debug, Clone)]
pub struct ViewState {
    mode: ScaleMode,
    zoom: f64,
    pan: DataPoint,
    auto_bounds: Option<DataBounds>,
    limits: ViewLimits,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(ViewLimits::default())
    }
}

impl ViewState {
    pub fn new(limits: ViewLimits) -> Self {
        Self {
            mode: ScaleMode::Fixed,
            zoom: 1.0,
            pan: DataPoint::default(),
            auto_bounds: None,
            limits: limits.sanitized(),
        }
    }

    /// Build the initial view from configuration
    pub fn from_config(config: &ViewConfig) -> Self {
        let mut view = Self::new(ViewLimits::from_config(config));
        if config.auto_scale {
            view.mode = ScaleMode::Auto;
        }
        view
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> DataPoint {
        self.pan
    }

    pub fn limits(&self) -> &ViewLimits {
        &self.limits
    }

    /// Cached box around the retained traces
    pub fn auto_bounds(&self) -> Option<DataBounds> {
        self.auto_bounds
    }

    /// Switch between Fixed and Auto, keeping the stored zoom and pan
    pub fn toggle_auto_scale(&mut self) -> ScaleMode {
        self.mode = match self.mode {
            ScaleMode::Fixed => ScaleMode::Auto,
            ScaleMode::Auto => ScaleMode::Fixed,
        };
        tracing::info!("Scale mode: {}", self.mode);
        self.mode
    }

    /// Shift the view by a data-space offset; ignored in Auto mode
    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        if self.mode == ScaleMode::Auto {
            tracing::debug!("Ignoring pan in auto-scale mode");
            return false;
        }
        if !dx.is_finite() || !dy.is_finite() {
            tracing::warn!("Ignoring non-finite pan ({}, {})", dx, dy);
            return false;
        }
        self.pan = DataPoint::new(
            self.limits.clamp_pan(self.pan.x + dx),
            self.limits.clamp_pan(self.pan.y + dy),
        );
        true
    }

    /// Multiply the zoom, keeping `anchor` at the same screen position
    ///
    /// Without an anchor the zoom is about ([`ADC_ORIGIN`], 0). Ignored in
    /// Auto mode and for non-positive factors.
    pub fn zoom_by(&mut self, factor: f64, anchor: Option<DataPoint>) -> bool {
        if self.mode == ScaleMode::Auto {
            tracing::debug!("Ignoring zoom in auto-scale mode");
            return false;
        }
        if !factor.is_finite() || factor <= 0.0 {
            tracing::warn!("Ignoring invalid zoom factor {}", factor);
            return false;
        }

        let anchor = anchor.unwrap_or(DataPoint::new(ADC_ORIGIN, 0.0));
        let old_zoom = self.zoom;
        let new_zoom = self.limits.clamp_zoom(old_zoom * factor);
        let ratio = old_zoom / new_zoom;

        // Solve for the pan that leaves the anchor's mapped position unchanged
        let pan_x = (anchor.x + self.pan.x - ADC_ORIGIN) * ratio - anchor.x + ADC_ORIGIN;
        let pan_y = (anchor.y + self.pan.y) * ratio - anchor.y;

        self.zoom = new_zoom;
        self.pan = DataPoint::new(self.limits.clamp_pan(pan_x), self.limits.clamp_pan(pan_y));
        true
    }

    /// Restore zoom 1, no pan, Fixed mode
    pub fn reset(&mut self) {
        self.mode = ScaleMode::Fixed;
        self.zoom = 1.0;
        self.pan = DataPoint::default();
    }

    /// Commit a zoom and pan that frame `bounds`, then stay in Fixed mode
    pub fn fit_to(&mut self, bounds: Option<DataBounds>) {
        self.mode = ScaleMode::Fixed;
        let Some(bounds) = bounds else {
            tracing::debug!("Fit requested with no retained data");
            return;
        };
        let bounds = bounds.with_min_span(self.limits.min_box_span);
        let usable = 1.0 - 2.0 * self.limits.auto_margin;

        let zoom_x = usable * ADC_MAX / bounds.width();
        let zoom_y = usable * Y_RANGE / bounds.height();
        let zoom = self.limits.clamp_zoom(zoom_x.min(zoom_y));

        let center = bounds.center();
        let pan_x = (0.5 * ADC_MAX - ADC_ORIGIN) / zoom + ADC_ORIGIN - center.x;
        let pan_y = (0.5 - FLOOR_RATIO) * Y_RANGE / zoom - center.y;

        self.zoom = zoom;
        self.pan = DataPoint::new(self.limits.clamp_pan(pan_x), self.limits.clamp_pan(pan_y));
        tracing::debug!(
            "Fit to window: zoom {:.3}, pan ({:.1}, {:.1})",
            self.zoom,
            self.pan.x,
            self.pan.y
        );
    }

    /// Recompute the cached Auto box from the retained traces
    pub fn refresh_bounds(&mut self, history: &TraceHistory) {
        self.auto_bounds = DataBounds::from_history(history);
    }

    /// Box the Auto mapping stretches across the viewport
    pub fn effective_auto_bounds(&self) -> Option<DataBounds> {
        self.auto_bounds
            .map(|b| b.with_min_span(self.limits.min_box_span))
    }

    /// Transform for the current state
    ///
    /// Auto mode with nothing retained falls back to the default Fixed mapping.
    pub fn transform(&self) -> ViewTransform {
        match self.mode {
            ScaleMode::Fixed => ViewTransform::fixed(self.zoom, self.pan),
            ScaleMode::Auto => match self.effective_auto_bounds() {
                Some(bounds) => ViewTransform::fitted(bounds, self.limits.auto_margin),
                None => ViewTransform::fixed(1.0, DataPoint::default()),
            },
        }
    }

    /// Map one data point into a viewport of the given size
    pub fn map_to_viewport(&self, point: DataPoint, viewport: Viewport) -> ScreenPoint {
        self.transform().map(point, viewport)
    }

    /// Inverse of [`map_to_viewport`](Self::map_to_viewport)
    pub fn viewport_to_data(&self, point: ScreenPoint, viewport: Viewport) -> Option<DataPoint> {
        self.transform().unmap(point, viewport)
    }

    /// Pan offset that makes content follow a screen-space drag
    pub fn pan_delta_for_drag(&self, dx: f64, dy: f64, viewport: Viewport) -> Option<DataPoint> {
        let transform = self.transform();
        let origin = transform.unmap(ScreenPoint::new(0.0, 0.0), viewport)?;
        let moved = transform.unmap(ScreenPoint::new(dx, dy), viewport)?;
        Some(DataPoint::new(moved.x - origin.x, moved.y - origin.y))
    }

    /// Screen position of the crosshair at ([`ADC_ORIGIN`], zero current)
    pub fn origin_marker(&self, viewport: Viewport) -> ScreenPoint {
        self.map_to_viewport(DataPoint::new(ADC_ORIGIN, 0.0), viewport)
    }

    /// Data-space box currently visible, for axis labels
    pub fn visible_domain(&self, viewport: Viewport) -> Option<DataBounds> {
        let transform = self.transform();
        let a = transform.unmap(ScreenPoint::new(0.0, 0.0), viewport)?;
        let b = transform.unmap(ScreenPoint::new(viewport.width, viewport.height), viewport)?;
        Some(DataBounds {
            x_min: a.x.min(b.x),
            x_max: a.x.max(b.x),
            y_min: a.y.min(b.y),
            y_max: a.y.max(b.y),
        })
    }
}
