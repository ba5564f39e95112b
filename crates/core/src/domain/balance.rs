//! Balance resolution
//!
//! Maps a sink's current channel volumes and a compiled profile to new
//! per-channel volumes. The overall loudness of the sink is kept: the
//! resolver works out the level every channel would sit at if the profile
//! were already satisfied, averages it into a target mean, shifts that mean
//! by the user adjustment, and scales it back out by each channel's
//! normalized weight.
//!
//! Resolution never fails. Anomalies are collected as [`BalanceWarning`]s
//! next to the clamped values, and the caller decides what to do with them.

use crate::domain::pattern::{weight_for, CompiledProfile, CompiledRule};
use crate::domain::sink::ChannelSnapshot;
use crate::domain::volume::{Adjustment, VolumeRange};
use std::fmt;
use tracing::trace;

/// Lowest level a weighted channel may reach, as a fraction of the target mean
pub const FLOOR_RATIO: f64 = 0.25;

/// New volume for one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTarget {
    /// Linear target volume, always within `[0, max]`
    pub target_volume: f64,
    /// Raised to the anti-distortion floor
    pub clamped: bool,
    /// Clipped to the top of the device range
    pub out_of_range: bool,
}

/// Non-fatal anomaly met while resolving a sink
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceWarning {
    /// Every channel has weight 0; all targets are 0
    NoEnabledChannels,
    /// The adjustment pushed the target mean below zero; the sink is muted
    MutedByAdjustment { requested: f64 },
    /// A channel was raised to the floor of `target_mean / 4`
    ChannelClamped {
        index: usize,
        position: String,
        requested: f64,
        floor: f64,
    },
    /// A channel target exceeded the device range and was clipped
    OutOfRange {
        index: usize,
        position: String,
        requested: f64,
        max: f64,
    },
}

impl fmt::Display for BalanceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceWarning::NoEnabledChannels => {
                write!(f, "profile disables every channel; sink will be silent")
            }
            BalanceWarning::MutedByAdjustment { requested } => write!(
                f,
                "adjusted level {:.1}% is below zero; sink muted",
                requested * 100.0
            ),
            BalanceWarning::ChannelClamped {
                index,
                position,
                requested,
                floor,
            } => write!(
                f,
                "channel {} ({}) raised from {:.1}% to {:.1}% to avoid distortion",
                index,
                position,
                requested * 100.0,
                floor * 100.0
            ),
            BalanceWarning::OutOfRange {
                index,
                position,
                requested,
                max,
            } => write!(
                f,
                "channel {} ({}) clipped from {:.1}% to {:.1}%",
                index,
                position,
                requested * 100.0,
                max * 100.0
            ),
        }
    }
}

/// Outcome of resolving one sink
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// One target per input channel, in input order
    pub channels: Vec<ChannelTarget>,
    /// Weight assigned by the first matching rule
    pub weights: Vec<f64>,
    /// Weights divided by the mean enabled weight; 0 for disabled channels
    pub normalized_weights: Vec<f64>,
    /// Overall level after adjustment, never negative
    pub target_mean: f64,
    pub warnings: Vec<BalanceWarning>,
}

impl Resolution {
    /// Target volumes in channel order
    pub fn volumes(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.target_volume).collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Resolves sinks against one compiled rule set
///
/// Holds only shared references, so one resolver can serve any number of
/// sinks, concurrently if needed.
#[derive(Debug, Clone, Copy)]
pub struct BalanceResolver<'a> {
    rules: &'a [CompiledRule],
    range: VolumeRange,
}

impl<'a> BalanceResolver<'a> {
    pub fn new(profile: &'a CompiledProfile) -> Self {
        Self::from_rules(&profile.rules)
    }

    pub fn from_rules(rules: &'a [CompiledRule]) -> Self {
        Self {
            rules,
            range: VolumeRange::default(),
        }
    }

    pub fn with_range(mut self, range: VolumeRange) -> Self {
        self.range = range;
        self
    }

    /// Compute target volumes for a sink's channels
    pub fn resolve(&self, channels: &[ChannelSnapshot], adjustment: Adjustment) -> Resolution {
        let mut warnings = Vec::new();

        let weights: Vec<f64> = channels
            .iter()
            .map(|channel| weight_for(self.rules, &channel.position))
            .collect();

        // A profile that disables everything still divides by one
        let enabled = weights.iter().filter(|w| **w != 0.0).count();
        if enabled == 0 && !channels.is_empty() {
            warnings.push(BalanceWarning::NoEnabledChannels);
        }
        let divisor = enabled.max(1) as f64;

        let mean_weight = weights.iter().sum::<f64>() / divisor;
        let normalized_weights: Vec<f64> = weights
            .iter()
            .map(|&w| if w != 0.0 { w / mean_weight } else { 0.0 })
            .collect();

        let implied_sum: f64 = channels
            .iter()
            .zip(&normalized_weights)
            .filter(|(_, n)| **n != 0.0)
            .map(|(channel, n)| current_volume(channel) / n)
            .sum();

        let mut target_mean = implied_sum / divisor + adjustment.fraction();
        // A NaN mean has no usable level either
        if target_mean.is_nan() || target_mean < 0.0 {
            warnings.push(BalanceWarning::MutedByAdjustment {
                requested: target_mean,
            });
            target_mean = 0.0;
        }

        let floor = target_mean * FLOOR_RATIO;
        let targets = channels
            .iter()
            .zip(&normalized_weights)
            .enumerate()
            .map(|(index, (channel, &normalized))| {
                let mut target = target_mean * normalized;
                let mut clamped = false;
                let mut out_of_range = false;

                if normalized != 0.0 && target_mean > 0.0 && target < floor {
                    warnings.push(BalanceWarning::ChannelClamped {
                        index,
                        position: channel.position.clone(),
                        requested: target,
                        floor,
                    });
                    target = floor;
                    clamped = true;
                }

                if target > self.range.max {
                    warnings.push(BalanceWarning::OutOfRange {
                        index,
                        position: channel.position.clone(),
                        requested: target,
                        max: self.range.max,
                    });
                    target = self.range.max;
                    out_of_range = true;
                }

                trace!(
                    index,
                    position = %channel.position,
                    current = channel.volume,
                    normalized,
                    target,
                    "Resolved channel"
                );

                ChannelTarget {
                    target_volume: target.max(0.0),
                    clamped,
                    out_of_range,
                }
            })
            .collect();

        Resolution {
            channels: targets,
            weights,
            normalized_weights,
            target_mean,
            warnings,
        }
    }
}

/// Resolve with the default device range
pub fn resolve(
    rules: &[CompiledRule],
    channels: &[ChannelSnapshot],
    adjustment: Adjustment,
) -> Resolution {
    BalanceResolver::from_rules(rules).resolve(channels, adjustment)
}

fn current_volume(channel: &ChannelSnapshot) -> f64 {
    // NaN.max(0.0) is 0.0
    channel.volume.max(0.0)
}
