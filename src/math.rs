//! Mathematical utilities and nalgebra extensions for the calibration pipeline

use nalgebra::{Matrix3, Vector3};

/// Relative tolerance used when judging eigenvalues and determinants against zero
pub const RELATIVE_EPSILON: f64 = 1e-12;

/// Iteration cap for the iterative eigen, Schur and SVD solvers
pub const MAX_EIGEN_ITERATIONS: usize = 1000;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Largest absolute per-axis difference to another vector
    fn max_abs_diff(&self, other: &Vector3<f64>) -> f64;

    /// Normalize the vector, returning `None` if magnitude is zero or not finite
    fn try_normalize_finite(&self) -> Option<Vector3<f64>>;
}

impl Vector3Ext for Vector3<f64> {
    fn max_abs_diff(&self, other: &Vector3<f64>) -> f64 {
        (self - other).amax()
    }

    fn try_normalize_finite(&self) -> Option<Vector3<f64>> {
        let norm = self.norm();
        if norm > 0.0 && norm.is_finite() {
            Some(*self / norm)
        } else {
            None
        }
    }
}

/// Similarity transform that centers a point cloud and scales it to unit RMS radius
///
/// Fitting in normalized coordinates keeps fourth-order monomials of µT or nT
/// readings within a range where the scatter matrix stays well conditioned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Centroid of the point cloud
    pub centroid: Vector3<f64>,
    /// RMS distance of the points from the centroid
    pub scale: f64,
}

impl Normalization {
    /// Compute centroid and RMS radius of a non-empty point set
    pub fn from_points(points: &[Vector3<f64>]) -> Self {
        if points.is_empty() {
            return Self::identity();
        }

        let n = points.len() as f64;
        let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;
        let mean_square = points
            .iter()
            .map(|p| (p - centroid).norm_squared())
            .sum::<f64>()
            / n;
        let scale = mean_square.sqrt();

        Self {
            centroid,
            scale: if scale > 0.0 && scale.is_finite() { scale } else { 1.0 },
        }
    }

    /// Transform that leaves points unchanged
    pub fn identity() -> Self {
        Self {
            centroid: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Map a raw point into normalized coordinates
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        (point - self.centroid) / self.scale
    }
}

/// Square root of a symmetric positive semi-definite matrix from its eigen-pair
///
/// Returns `V * sqrt(D) * Vᵀ`. Eigenvalues must be non-negative.
pub fn symmetric_sqrt(eigenvalues: &Vector3<f64>, eigenvectors: &Matrix3<f64>) -> Matrix3<f64> {
    let sqrt_d = Matrix3::from_diagonal(&eigenvalues.map(f64::sqrt));
    eigenvectors * sqrt_d * eigenvectors.transpose()
}
