//! Settings for the calibration pipeline

use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest inlier count RANSAC accepts; one more than the minimal fit size.
pub const MIN_VIABLE_INLIERS: usize = crate::fit::MIN_FIT_SAMPLES + 1;

/// RANSAC ellipsoid estimator settings
///
/// # Example
/// ```
/// use mag_cal::RansacSettings;
///
/// let settings = RansacSettings {
///     iterations: 250,
///     inlier_threshold: 0.5, // same units as the samples
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RansacSettings {
    /// Number of minimal-subset rounds
    pub iterations: usize,
    /// Maximum radial distance to a candidate surface for a sample to count as support
    ///
    /// Expressed in the units of the magnetometer samples.
    pub inlier_threshold: f64,
    /// Minimum number of inliers required to accept the best candidate
    ///
    /// Values at or below the 9-point fit minimum are raised by [`RansacSettings::validated`].
    pub min_inliers: usize,
    /// Seed for subset selection, so a given sample set always yields the same fit
    pub seed: u64,
}

impl Default for RansacSettings {
    fn default() -> Self {
        Self {
            iterations: 100,
            inlier_threshold: 2.0,
            min_inliers: MIN_VIABLE_INLIERS,
            seed: 0x5eed_ca11,
        }
    }
}

impl RansacSettings {
    /// Returns a copy with out-of-range values clamped to usable ones
    pub fn validated(self) -> Self {
        Self {
            iterations: self.iterations.max(1),
            min_inliers: self.min_inliers.max(MIN_VIABLE_INLIERS),
            ..self
        }
    }
}

/// Calibration session settings
///
/// Controls how long samples are collected, how the incoming stream is
/// decimated, and how the collected set is fitted.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use mag_cal::{CalibrationSettings, RansacSettings};
///
/// let settings = CalibrationSettings {
///     collection_duration: Duration::from_secs(30),
///     measurement_skip: 4, // keep every 5th sample
///     ransac: RansacSettings {
///         inlier_threshold: 1.5,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationSettings {
    /// How long to collect samples after a session starts
    pub collection_duration: Duration,
    /// Number of measurements dropped after each kept measurement
    ///
    /// Zero keeps every measurement.
    pub measurement_skip: u32,
    /// Largest per-axis difference at which a measurement counts as a repeat of the previous one
    ///
    /// Repeats indicate a stalled sensor feed. Zero means exact equality.
    pub duplicate_tolerance: f64,
    /// Robust fit settings
    pub ransac: RansacSettings,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            collection_duration: Duration::from_secs(60),
            measurement_skip: 20,
            duplicate_tolerance: 0.0,
            ransac: RansacSettings::default(),
        }
    }
}
