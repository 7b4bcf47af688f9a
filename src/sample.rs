//! Latency samples and their tri-state numeric fields
//!
//! A probe either produces the four `ping` statistics (min/avg/max/mdev, in
//! microseconds) or nothing usable. "Nothing usable" is carried as
//! [`Measurement::Unavailable`] through every computation and is never
//! coerced to zero or NaN.

use std::fmt;
use std::str::FromStr;

/// Token written for an unavailable field
pub const UNAVAILABLE_TOKEN: &str = "N/A";

/// Token written for every field of a pair that was deliberately not probed
pub const NOT_PROBED_TOKEN: &str = "-";

/// One numeric statistic in microseconds, or the explicit absence of one
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Available(f64),
    Unavailable,
}

impl Measurement {
    /// Build from a raw value; negative or non-finite values are unavailable
    pub fn from_micros(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Measurement::Available(value)
        } else {
            Measurement::Unavailable
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Measurement::Available(v) => Some(v),
            Measurement::Unavailable => None,
        }
    }

    /// Value usable as a divisor: available and strictly positive
    pub fn positive(self) -> Option<f64> {
        self.value().filter(|v| *v > 0.0)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Available(v) => write!(f, "{}", v),
            Measurement::Unavailable => f.write_str(UNAVAILABLE_TOKEN),
        }
    }
}

/// Error returned when a baseline token is neither a number nor `N/A`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid measurement token '{0}'")]
pub struct InvalidMeasurement(pub String);

impl FromStr for Measurement {
    type Err = InvalidMeasurement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == UNAVAILABLE_TOKEN {
            return Ok(Measurement::Unavailable);
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(Measurement::Available(v)),
            _ => Err(InvalidMeasurement(s.to_string())),
        }
    }
}

/// The four-statistic summary of one probed pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub min: Measurement,
    pub avg: Measurement,
    pub max: Measurement,
    pub mdev: Measurement,
}

impl LatencySample {
    /// Canonical "no measurement" sample
    pub const UNAVAILABLE: LatencySample = LatencySample {
        min: Measurement::Unavailable,
        avg: Measurement::Unavailable,
        max: Measurement::Unavailable,
        mdev: Measurement::Unavailable,
    };

    pub fn from_micros(min: f64, avg: f64, max: f64, mdev: f64) -> Self {
        Self {
            min: Measurement::from_micros(min),
            avg: Measurement::from_micros(avg),
            max: Measurement::from_micros(max),
            mdev: Measurement::from_micros(mdev),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        *self == Self::UNAVAILABLE
    }
}

impl fmt::Display for LatencySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={} max={} avg={} mdev={}",
            self.min, self.max, self.avg, self.mdev
        )
    }
}

/// Content of one matrix cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeCell {
    /// The pair was probed; the sample may still be unavailable
    Measured(LatencySample),
    /// Self-pair skipped by configuration, the prober was never invoked
    NotProbed,
}

impl ProbeCell {
    /// Sample view of the cell; a skipped pair reads as unavailable
    pub fn sample(&self) -> LatencySample {
        match self {
            ProbeCell::Measured(sample) => *sample,
            ProbeCell::NotProbed => LatencySample::UNAVAILABLE,
        }
    }
}

impl fmt::Display for ProbeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeCell::Measured(sample) => sample.fmt(f),
            ProbeCell::NotProbed => write!(
                f,
                "min={t} max={t} avg={t} mdev={t}",
                t = NOT_PROBED_TOKEN
            ),
        }
    }
}
