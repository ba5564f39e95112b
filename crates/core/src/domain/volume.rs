//! Linear volume types shared by the resolver and the device layer
//!
//! All volumes in this crate are linear fractions where `1.0` is the
//! device's reference (100 %) level. Converting to a backend's native
//! encoding is the device layer's job.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a user-supplied adjustment
#[derive(Debug, Error, PartialEq)]
pub enum AdjustmentError {
    #[error("adjustment is empty")]
    Empty,

    #[error("adjustment `{0}` must end with a `+` or `-` sign")]
    MissingSign(String),

    #[error("adjustment `{0}` does not have a valid magnitude")]
    InvalidMagnitude(String),
}

/// Uniform signed offset applied to the target mean of a sink
///
/// Parsed from `<magnitude><sign>`, e.g. `5+` or `0.05-`. Magnitudes of one
/// or more are percentages; smaller magnitudes are taken as fractions.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Adjustment(f64);

impl Adjustment {
    pub const NONE: Adjustment = Adjustment(0.0);

    pub fn new(fraction: f64) -> Self {
        Self(fraction)
    }

    pub fn fraction(&self) -> f64 {
        self.0
    }
}

impl FromStr for Adjustment {
    type Err = AdjustmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(sign_char) = s.chars().last() else {
            return Err(AdjustmentError::Empty);
        };

        let sign = match sign_char {
            '+' => 1.0,
            '-' => -1.0,
            _ => return Err(AdjustmentError::MissingSign(s.to_string())),
        };

        let magnitude: f64 = s[..s.len() - 1]
            .trim()
            .parse()
            .map_err(|_| AdjustmentError::InvalidMagnitude(s.to_string()))?;

        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(AdjustmentError::InvalidMagnitude(s.to_string()));
        }

        let fraction = if magnitude >= 1.0 {
            magnitude / 100.0
        } else {
            magnitude
        };

        Ok(Self(sign * fraction))
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.1}%", self.0 * 100.0)
    }
}

/// Valid range of a device volume, `[0, max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRange {
    pub max: f64,
}

impl VolumeRange {
    /// Default ceiling, 150 % of the reference amplitude
    pub const DEFAULT_MAX: f64 = 1.5;

    /// Build a range from a percentage ceiling. The ceiling never drops
    /// below zero.
    pub fn from_percent(percent: f64) -> Self {
        Self {
            max: (percent / 100.0).max(0.0),
        }
    }
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self {
            max: Self::DEFAULT_MAX,
        }
    }
}
