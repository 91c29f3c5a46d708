//! [![github]](https://github.com/wboayue/mag-cal)&ensp;[![crates-io]](https://crates.io/crates/mag-cal)&ensp;[![license]](https://opensource.org/licenses/MIT)
//!
//! [github]: https://img.shields.io/badge/github-8da0cb?style=for-the-badge&labelColor=555555&logo=github
//! [crates-io]: https://img.shields.io/badge/crates.io-fc8d62?style=for-the-badge&labelColor=555555&logo=rust
//! [license]: https://img.shields.io/badge/License-MIT-blue.svg?style=for-the-badge&labelColor=555555
//!
//! mag-cal - Robust magnetometer hard-iron and soft-iron calibration
//!
//! Raw magnetometer readings taken while a vehicle is rotated through many
//! orientations lie on an ellipsoid rather than on a sphere centered at the
//! origin. This library fits that ellipsoid with RANSAC around an
//! ellipsoid-specific least-squares fit (Li & Griffiths, 2004) and extracts a
//! symmetric soft-iron matrix `A` and a hard-iron offset `b` such that
//! `A * (raw - b)` has the magnitude of the local reference field.
//!
//! # Features
//!
//! - Ellipsoid-specific least-squares fitting that never returns hyperboloids
//! - RANSAC outlier rejection scored by radial distance to the fitted surface
//! - Closed-form hard-iron and soft-iron extraction
//! - Session controller with a collection window, decimation, and stalled-feed filtering
//! - Optional `serde` support for settings and results
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use mag_cal::{estimate_ellipsoid, extract_calibration, RansacSettings};
//!
//! // Readings of a 50 µT field, offset by a hard-iron bias
//! let bias = Vector3::new(2.0, -1.0, 3.0);
//! let samples: Vec<_> = (0..60)
//!     .map(|i| {
//!         let z = 1.0 - 2.0 * (i as f64 + 0.5) / 60.0;
//!         let r = (1.0 - z * z).sqrt();
//!         let theta = 2.4 * i as f64;
//!         bias + Vector3::new(r * theta.cos(), r * theta.sin(), z) * 50.0
//!     })
//!     .collect();
//!
//! let estimate = estimate_ellipsoid(&samples, &RansacSettings::default()).unwrap();
//! let calibration = extract_calibration(&estimate.model, 50.0).unwrap();
//!
//! assert!((calibration.hard_iron() - bias).norm() < 1e-6);
//! let corrected = calibration.apply(&samples[0]);
//! assert!((corrected.norm() - 50.0).abs() < 1e-6);
//! ```
//!
//! For a timed session driven by a live sensor feed, see [`MagCalibrator`].

pub mod buffer;
pub mod calibration;
pub mod calibrator;
pub mod eigen;
mod error;
pub mod fit;
pub mod math;
pub mod quadric;
pub mod ransac;
mod types;

// Re-export all public types and functions
pub use buffer::SampleBuffer;
pub use calibration::{CalibrationResult, PARAMETER_NAMES, calibrate_magnetic, extract_calibration};
pub use calibrator::{
    CalibratorState, Clock, MagCalibrator, ManualClock, MeasurementOutcome, MeasurementSource,
    MonotonicClock, ParameterSink, SessionReport,
};
pub use eigen::sort_eigen;
pub use error::{CalibrationError, Result};
pub use fit::{MIN_FIT_SAMPLES, fit_ellipsoid};
pub use math::Vector3Ext;
pub use quadric::QuadricModel;
pub use ransac::{EllipsoidEstimate, estimate_ellipsoid};
pub use types::*;
