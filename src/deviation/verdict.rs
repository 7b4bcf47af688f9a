// Per-pair deviation verdicts
//
// For each pair the current average is compared with the baseline average to
// pick a direction, then with the baseline extreme on that side (min for a
// speedup, max for a slowdown) to decide whether the change is beyond normal
// jitter.

use crate::baseline::BaselineStore;
use crate::deviation::thresholds::DeviationThresholds;
use crate::machine::MachineId;
use crate::matrix::ProbeMatrix;
use crate::report::{AlertCollector, AlertReport, DeviationRecord, Direction};
use crate::sample::{LatencySample, ProbeCell};
use std::collections::HashMap;

/// Outcome for one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Normal,
    Improved,
    Regressed,
}

/// Intermediate figures for a pair with comparable samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationMetrics {
    /// `100 * (1 - cur.avg / ref.avg)`; positive means latency went down
    pub deviation_percent: f64,
    /// `100 * (1 - cur.avg / anchor)` with anchor = ref.min or ref.max,
    /// or ref.avg when that extreme is missing
    pub margin_percent: f64,
    /// `|cur.avg - anchor|` in microseconds
    pub margin_micros: f64,
}

/// Compute deviation figures, or `None` when the pair is not comparable
///
/// Not comparable: either average unavailable or zero, or averages equal.
/// When the baseline extreme on the relevant side is unavailable or zero
/// (reduced `avg`-only baseline lines), the baseline average is the anchor.
/// Zero values are treated like missing ones so no division yields infinity.
///
/// # Example
/// ```
/// use linkrtt::deviation::deviation_metrics;
/// use linkrtt::sample::LatencySample;
///
/// let reference = LatencySample::from_micros(90.0, 100.0, 110.0, 4.0);
/// let current = LatencySample::from_micros(140.0, 150.0, 160.0, 2.0);
/// let m = deviation_metrics(&current, &reference).unwrap();
/// assert_eq!(m.deviation_percent, -50.0);
/// assert_eq!(m.margin_micros, 40.0);
/// ```
pub fn deviation_metrics(
    current: &LatencySample,
    reference: &LatencySample,
) -> Option<DeviationMetrics> {
    let cur = current.avg.positive()?;
    let ref_avg = reference.avg.positive()?;

    let deviation_percent = 100.0 * (1.0 - cur / ref_avg);
    let extreme = if deviation_percent > 0.0 {
        reference.min
    } else if deviation_percent < 0.0 {
        reference.max
    } else {
        return None;
    };
    let anchor = extreme.positive().unwrap_or(ref_avg);

    Some(DeviationMetrics {
        deviation_percent,
        margin_percent: 100.0 * (1.0 - cur / anchor),
        margin_micros: (cur - anchor).abs(),
    })
}

/// Classify one cell against its baseline sample
pub fn classify_pair(
    current: &ProbeCell,
    reference: &LatencySample,
    thresholds: &DeviationThresholds,
) -> Classification {
    let ProbeCell::Measured(sample) = current else {
        return Classification::Normal;
    };
    let Some(metrics) = deviation_metrics(sample, reference) else {
        return Classification::Normal;
    };

    if !thresholds.exceeded_by(metrics.margin_percent, metrics.margin_micros) {
        Classification::Normal
    } else if metrics.deviation_percent > 0.0 {
        Classification::Improved
    } else {
        Classification::Regressed
    }
}

/// Result of comparing a current matrix with a baseline
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    classifications: HashMap<(MachineId, MachineId), Classification>,
    pub alerts: AlertReport,
}

impl Comparison {
    /// Verdict for a pair; pairs outside the compared matrix are normal
    pub fn classification(&self, source: &MachineId, target: &MachineId) -> Classification {
        self.classifications
            .get(&(source.clone(), target.clone()))
            .copied()
            .unwrap_or(Classification::Normal)
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.classifications
            .values()
            .filter(|c| **c == classification)
            .count()
    }
}

/// Classify every pair of `current` against `baseline`
///
/// Alerts are recorded in matrix iteration order (source-major,
/// target-minor). Neither input is modified.
pub fn compare(
    current: &ProbeMatrix,
    baseline: &BaselineStore,
    thresholds: &DeviationThresholds,
) -> Comparison {
    let mut classifications = HashMap::with_capacity(current.len());
    let mut alerts = AlertCollector::new();

    for (source, target, cell) in current.iter() {
        let reference = baseline.lookup(source, target);
        let classification = classify_pair(cell, &reference, thresholds);

        let direction = match classification {
            Classification::Normal => None,
            Classification::Improved => Some(Direction::Improved),
            Classification::Regressed => Some(Direction::Regressed),
        };
        if let Some(direction) = direction {
            tracing::debug!(%source, %target, ?direction, "Deviation detected");
            alerts.record(DeviationRecord {
                source: source.clone(),
                target: target.clone(),
                current: cell.sample(),
                baseline: reference,
                direction,
            });
        }
        classifications.insert((source.clone(), target.clone()), classification);
    }

    let alerts = alerts.finish();
    tracing::info!(
        pairs = current.len(),
        regressions = alerts.regression_count(),
        improvements = alerts.improvement_count(),
        "Comparison complete"
    );

    Comparison {
        classifications,
        alerts,
    }
}
