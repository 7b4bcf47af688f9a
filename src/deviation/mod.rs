// Latency deviation detection against a stored baseline
//
// Each pair of the current matrix is classified as normal, improved or
// regressed:
//
// - The sign of `100 * (1 - cur.avg / ref.avg)` picks the direction
//   (positive: latency went down).
// - The margin is measured against the baseline extreme on that side,
//   `ref.min` for improvements and `ref.max` for regressions, so a run that
//   stays inside the historical spread is not reported.
// - A pair is flagged when the margin exceeds the percent threshold OR the
//   absolute threshold.
//
// Unavailable, zero-valued and not-probed samples are always normal.

mod thresholds;
mod verdict;

pub use thresholds::DeviationThresholds;
pub use verdict::{
    classify_pair, compare, deviation_metrics, Classification, Comparison, DeviationMetrics,
};
