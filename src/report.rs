//! Alert records and the per-run report handed to renderers
//!
//! Records carry data only; [`describe_deviation`] is the single text
//! rendering used by both the HTML report and the terminal summary.

use crate::baseline::BaselineStore;
use crate::deviation::{Comparison, DeviationThresholds};
use crate::machine::MachineId;
use crate::matrix::ProbeMatrix;
use crate::sample::LatencySample;

/// Sign of a flagged latency change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Latency decreased beyond the baseline minimum
    Improved,
    /// Latency increased beyond the baseline maximum
    Regressed,
}

/// One threshold-crossing pair
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationRecord {
    pub source: MachineId,
    pub target: MachineId,
    pub current: LatencySample,
    pub baseline: LatencySample,
    pub direction: Direction,
}

impl DeviationRecord {
    /// `100 * (1 - current.avg / baseline.avg)`; positive means faster
    pub fn deviation_percent(&self) -> Option<f64> {
        let cur = self.current.avg.positive()?;
        let reference = self.baseline.avg.positive()?;
        Some(100.0 * (1.0 - cur / reference))
    }
}

/// Regressions and improvements of one run, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertReport {
    regressions: Vec<DeviationRecord>,
    improvements: Vec<DeviationRecord>,
}

impl AlertReport {
    pub fn regressions(&self) -> &[DeviationRecord] {
        &self.regressions
    }

    pub fn improvements(&self) -> &[DeviationRecord] {
        &self.improvements
    }

    pub fn regression_count(&self) -> usize {
        self.regressions.len()
    }

    pub fn improvement_count(&self) -> usize {
        self.improvements.len()
    }

    pub fn has_any_alert(&self) -> bool {
        !self.regressions.is_empty() || !self.improvements.is_empty()
    }
}

/// Accumulator used while a classification pass is running
#[derive(Debug, Default)]
pub struct AlertCollector {
    report: AlertReport,
}

impl AlertCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: DeviationRecord) {
        match record.direction {
            Direction::Regressed => self.report.regressions.push(record),
            Direction::Improved => self.report.improvements.push(record),
        }
    }

    /// Close the pass; the report is read-only from here on
    pub fn finish(self) -> AlertReport {
        self.report
    }
}

/// Everything a renderer or notifier needs from one comparison run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub current: ProbeMatrix,
    pub baseline: BaselineStore,
    pub comparison: Comparison,
    /// Probe failures and skipped baseline lines, already formatted
    pub diagnostics: Vec<String>,
    pub thresholds: DeviationThresholds,
}

impl RunReport {
    pub fn alerts(&self) -> &AlertReport {
        &self.comparison.alerts
    }
}

/// Format microseconds as `X us`, or `X ms` above one millisecond
pub fn format_micros(value: f64) -> String {
    if value > 1000.0 {
        format!("{} ms", value / 1000.0)
    } else {
        format!("{} us", value)
    }
}

/// Human-readable one-line summary of a deviation
///
/// # Example
/// ```
/// use linkrtt::machine::MachineId;
/// use linkrtt::report::{describe_deviation, DeviationRecord, Direction};
/// use linkrtt::sample::LatencySample;
///
/// let record = DeviationRecord {
///     source: MachineId::new("a", "paris"),
///     target: MachineId::new("b", "london"),
///     current: LatencySample::from_micros(140.0, 150.0, 160.0, 3.0),
///     baseline: LatencySample::from_micros(90.0, 100.0, 110.0, 4.0),
///     direction: Direction::Regressed,
/// };
/// assert_eq!(
///     describe_deviation(&record),
///     "RTT from paris to london increased : from 100 us to 150 us (-50.0 %) | ref min : 90 us, ref max : 110 us"
/// );
/// ```
pub fn describe_deviation(record: &DeviationRecord) -> String {
    let verb = match record.direction {
        Direction::Regressed => "increased",
        Direction::Improved => "decreased",
    };
    let percent = record
        .deviation_percent()
        .map(|p| format!("{:.1}", p))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "RTT from {} to {} {} : from {} us to {} us ({} %) | ref min : {} us, ref max : {} us",
        record.source.zone,
        record.target.zone,
        verb,
        record.baseline.avg,
        record.current.avg,
        percent,
        record.baseline.min,
        record.baseline.max
    )
}
