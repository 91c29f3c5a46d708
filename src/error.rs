//! Error types for the calibration pipeline

use thiserror::Error;

/// Result type for calibration operations
pub type Result<T> = core::result::Result<T, CalibrationError>;

/// Errors that can occur while collecting samples, fitting, or publishing a calibration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Too few samples were supplied to the least-squares fitter
    #[error("Not enough samples for an ellipsoid fit: got {got}, need at least {required}")]
    NotEnoughSamples { got: usize, required: usize },

    /// The least-squares fit did not produce a closed, non-empty ellipsoid
    #[error("Degenerate fit: fitted quadric is not an ellipsoid")]
    DegenerateFit,

    /// RANSAC could not find a candidate with enough supporting samples
    #[error("Insufficient support: best candidate has {inliers} inliers, need at least {required}")]
    InsufficientSupport { inliers: usize, required: usize },

    /// Eigen-decomposition or inversion was unstable during parameter extraction
    #[error("Ill-conditioned model: {0}")]
    IllConditionedModel(&'static str),

    /// Reference field strength must be a positive, finite scalar
    #[error("Invalid reference field strength: {0}")]
    InvalidReferenceStrength(f64),

    /// A session is already collecting or computing
    #[error("Already calibrating")]
    AlreadyCalibrating,

    /// The parameter sink rejected a value
    #[error("Failed to set parameter {name}: {reason}")]
    ParameterPushFailed { name: &'static str, reason: String },
}
