// Deviation thresholds
//
// Two independent limits; crossing either one flags a pair.

use serde::{Deserialize, Serialize};

/// Limits beyond which a latency change is reported
///
/// # Example
/// ```
/// use linkrtt::deviation::DeviationThresholds;
///
/// let thresholds = DeviationThresholds::new(20.0, 50.0);
/// assert!(thresholds.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationThresholds {
    /// Relative change against the margin reference, in percent
    ///
    /// Compared with the magnitude of the margin percentage, so 20.0 flags
    /// both a 25% slowdown and a 25% speedup beyond the baseline extremes.
    pub percent: f64,

    /// Absolute change against the margin reference, in microseconds
    ///
    /// Catches large jumps on long links where the relative change stays
    /// small.
    pub micros: f64,
}

impl DeviationThresholds {
    pub fn new(percent: f64, micros: f64) -> Self {
        Self { percent, micros }
    }

    /// Validate thresholds
    pub fn validate(&self) -> Result<(), String> {
        if !self.percent.is_finite() || self.percent < 0.0 {
            return Err(format!(
                "deviation_percent must be a non-negative number, got {}",
                self.percent
            ));
        }

        if !self.micros.is_finite() || self.micros < 0.0 {
            return Err(format!(
                "deviation_micros must be a non-negative number, got {}",
                self.micros
            ));
        }

        Ok(())
    }

    /// True when either limit is strictly exceeded
    pub fn exceeded_by(&self, margin_percent: f64, margin_micros: f64) -> bool {
        margin_percent.abs() > self.percent || margin_micros > self.micros
    }
}
