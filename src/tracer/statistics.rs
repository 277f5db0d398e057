//! Per-frame min/max summaries for the info panel
//!
//! Stateless: everything is recomputed from the retained traces. An empty
//! history yields `None` entries rather than an error.

use crate::tracer::history::TraceHistory;
use crate::types::DutId;

/// Inclusive range of observed values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub min: i32,
    pub max: i32,
}

impl ValueRange {
    pub fn span(&self) -> i32 {
        self.max - self.min
    }

    fn include(&mut self, value: i32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn from_values(values: impl IntoIterator<Item = i32>) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let mut range = ValueRange {
            min: first,
            max: first,
        };
        for value in iter {
            range.include(value);
        }
        Some(range)
    }
}

impl std::fmt::Display for ValueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Summary for one DUT across its displayed traces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutStatistics {
    pub voltage: ValueRange,
    pub current: ValueRange,
    /// Mean current over all displayed points
    pub mean_current: f64,
    /// Number of points summarized
    pub points: usize,
}

/// Summary of everything currently displayed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TraceStatistics {
    pub dut1: Option<DutStatistics>,
    pub dut2: Option<DutStatistics>,
    /// Drive (CH0) voltage range of the current frame
    pub drive: Option<ValueRange>,
}

impl TraceStatistics {
    /// Compute statistics over the current (and previous, if retained) traces
    pub fn from_history(history: &TraceHistory) -> Self {
        let drive = history.current().and_then(|stamped| {
            ValueRange::from_values(stamped.frame.drive().iter().map(|&v| i32::from(v)))
        });

        Self {
            dut1: dut_statistics(history, DutId::Dut1),
            dut2: dut_statistics(history, DutId::Dut2),
            drive,
        }
    }

    /// Statistics for one DUT
    pub fn dut(&self, dut: DutId) -> Option<&DutStatistics> {
        match dut {
            DutId::Dut1 => self.dut1.as_ref(),
            DutId::Dut2 => self.dut2.as_ref(),
        }
    }

    /// True if there was nothing to summarize
    pub fn is_empty(&self) -> bool {
        self.dut1.is_none() && self.dut2.is_none()
    }

    /// Lines for the info panel
    pub fn info_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for dut in DutId::ALL {
            if let Some(stats) = self.dut(dut) {
                lines.push(format!(
                    "{} Current: {}  Mean: {}  Points: {}",
                    dut,
                    stats.current,
                    stats.mean_current as i64,
                    stats.points
                ));
            }
        }
        if let (Some(d1), Some(d2), Some(drive)) = (self.dut1, self.dut2, self.drive) {
            lines.push(format!(
                "DUT Voltages: V1={}, V2={}, Drive={}",
                d1.voltage, d2.voltage, drive
            ));
        }
        if lines.is_empty() {
            lines.push("No Data".to_string());
        }
        lines
    }
}

fn dut_statistics(history: &TraceHistory, dut: DutId) -> Option<DutStatistics> {
    let traces: Vec<_> = history.traces_for(dut).filter(|t| !t.is_empty()).collect();

    let voltage = ValueRange::from_values(
        traces
            .iter()
            .flat_map(|t| t.voltage.iter().map(|&v| i32::from(v))),
    )?;
    let current = ValueRange::from_values(traces.iter().flat_map(|t| t.current.iter().copied()))?;

    let points: usize = traces.iter().map(|t| t.len()).sum();
    let sum: i64 = traces
        .iter()
        .flat_map(|t| t.current.iter())
        .map(|&c| i64::from(c))
        .sum();

    Some(DutStatistics {
        voltage,
        current,
        mean_current: sum as f64 / points as f64,
        points,
    })
}
