//! Sample collection with decimation and stalled-feed filtering

use nalgebra::Vector3;

use crate::math::Vector3Ext;
use crate::types::CalibrationSettings;

/// Accumulates magnetometer samples for one calibration session
///
/// The buffer keeps one measurement, then drops `measurement_skip`
/// measurements, and so on. A kept measurement that repeats the previous kept
/// one (within `duplicate_tolerance` on every axis) is discarded as a sign of a
/// stalled sensor feed.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use mag_cal::SampleBuffer;
///
/// let mut buffer = SampleBuffer::new(1, 0.0); // keep every other measurement
/// assert!(buffer.accept(Vector3::new(1.0, 2.0, 3.0)));
/// assert!(!buffer.accept(Vector3::new(1.1, 2.0, 3.0))); // decimated
/// assert!(buffer.accept(Vector3::new(1.2, 2.0, 3.0)));
/// assert_eq!(buffer.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Vec<Vector3<f64>>,
    measurement_skip: u32,
    duplicate_tolerance: f64,
    /// Measurements still to drop before the next one is considered
    skip_remaining: u32,
    previous: Option<Vector3<f64>>,
    decimated: usize,
    duplicates: usize,
}

impl SampleBuffer {
    /// Create an empty buffer
    pub fn new(measurement_skip: u32, duplicate_tolerance: f64) -> Self {
        Self {
            samples: Vec::new(),
            measurement_skip,
            duplicate_tolerance: duplicate_tolerance.max(0.0),
            skip_remaining: 0,
            previous: None,
            decimated: 0,
            duplicates: 0,
        }
    }

    /// Create an empty buffer configured from session settings
    pub fn from_settings(settings: &CalibrationSettings) -> Self {
        Self::new(settings.measurement_skip, settings.duplicate_tolerance)
    }

    /// Offer a measurement; returns whether it was stored
    pub fn accept(&mut self, measurement: Vector3<f64>) -> bool {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            self.decimated += 1;
            return false;
        }
        self.skip_remaining = self.measurement_skip;

        if measurement.iter().any(|v| !v.is_finite()) {
            return false;
        }

        let duplicate = self
            .previous
            .is_some_and(|prev| prev.max_abs_diff(&measurement) <= self.duplicate_tolerance);
        self.previous = Some(measurement);
        if duplicate {
            self.duplicates += 1;
            return false;
        }

        self.samples.push(measurement);
        true
    }

    /// Stored samples in arrival order
    pub fn samples(&self) -> &[Vector3<f64>] {
        &self.samples
    }

    /// Hand the stored samples off, consuming the buffer
    pub fn into_samples(self) -> Vec<Vector3<f64>> {
        self.samples
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are stored
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of measurements dropped by decimation
    pub fn decimated(&self) -> usize {
        self.decimated
    }

    /// Number of measurements dropped as repeats
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Discard all samples and reset the decimation and repeat state
    pub fn clear(&mut self) {
        self.samples.clear();
        self.skip_remaining = 0;
        self.previous = None;
        self.decimated = 0;
        self.duplicates = 0;
    }
}
