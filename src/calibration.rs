//! Magnetometer calibration parameters
//!
//! Converts a fitted ellipsoid into a soft-iron correction matrix and a
//! hard-iron bias following section 5.3 of Renaudin, V., Afzal, M. H. and
//! Lachapelle, G., "Complete triaxis magnetometer calibration in the magnetic
//! domain", Journal of Sensors, 2010.

use nalgebra::{Matrix3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, Result};
use crate::math::{RELATIVE_EPSILON, symmetric_sqrt};
use crate::quadric::QuadricModel;

/// Parameter names in push order: soft-iron entries row-major, then the bias
pub const PARAMETER_NAMES: [&str; 12] = [
    "MAG_A11_COMP",
    "MAG_A12_COMP",
    "MAG_A13_COMP",
    "MAG_A21_COMP",
    "MAG_A22_COMP",
    "MAG_A23_COMP",
    "MAG_A31_COMP",
    "MAG_A32_COMP",
    "MAG_A33_COMP",
    "MAG_X_BIAS",
    "MAG_Y_BIAS",
    "MAG_Z_BIAS",
];

/// Completed magnetometer calibration
///
/// Corrected readings are `A * (raw - b)` with `A` the soft-iron matrix and
/// `b` the hard-iron bias.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationResult {
    soft_iron: Matrix3<f64>,
    hard_iron: Vector3<f64>,
    reference_field_strength: f64,
}

impl CalibrationResult {
    /// Build a result from known parameters
    pub fn new(soft_iron: Matrix3<f64>, hard_iron: Vector3<f64>, reference_field_strength: f64) -> Self {
        Self {
            soft_iron,
            hard_iron,
            reference_field_strength,
        }
    }

    /// Soft-iron correction matrix `A`
    pub fn soft_iron(&self) -> Matrix3<f64> {
        self.soft_iron
    }

    /// Hard-iron bias `b`
    pub fn hard_iron(&self) -> Vector3<f64> {
        self.hard_iron
    }

    /// Field strength the corrected readings are scaled to
    pub fn reference_field_strength(&self) -> f64 {
        self.reference_field_strength
    }

    /// Soft-iron entry at row 1, column 1
    pub fn a11(&self) -> f64 {
        self.soft_iron[(0, 0)]
    }
    /// Soft-iron entry at row 1, column 2
    pub fn a12(&self) -> f64 {
        self.soft_iron[(0, 1)]
    }
    /// Soft-iron entry at row 1, column 3
    pub fn a13(&self) -> f64 {
        self.soft_iron[(0, 2)]
    }
    /// Soft-iron entry at row 2, column 1
    pub fn a21(&self) -> f64 {
        self.soft_iron[(1, 0)]
    }
    /// Soft-iron entry at row 2, column 2
    pub fn a22(&self) -> f64 {
        self.soft_iron[(1, 1)]
    }
    /// Soft-iron entry at row 2, column 3
    pub fn a23(&self) -> f64 {
        self.soft_iron[(1, 2)]
    }
    /// Soft-iron entry at row 3, column 1
    pub fn a31(&self) -> f64 {
        self.soft_iron[(2, 0)]
    }
    /// Soft-iron entry at row 3, column 2
    pub fn a32(&self) -> f64 {
        self.soft_iron[(2, 1)]
    }
    /// Soft-iron entry at row 3, column 3
    pub fn a33(&self) -> f64 {
        self.soft_iron[(2, 2)]
    }
    /// Hard-iron bias along x
    pub fn bx(&self) -> f64 {
        self.hard_iron.x
    }
    /// Hard-iron bias along y
    pub fn by(&self) -> f64 {
        self.hard_iron.y
    }
    /// Hard-iron bias along z
    pub fn bz(&self) -> f64 {
        self.hard_iron.z
    }

    /// The 12 named scalars in push order
    pub fn parameters(&self) -> [(&'static str, f64); 12] {
        let values = [
            self.a11(),
            self.a12(),
            self.a13(),
            self.a21(),
            self.a22(),
            self.a23(),
            self.a31(),
            self.a32(),
            self.a33(),
            self.bx(),
            self.by(),
            self.bz(),
        ];
        core::array::from_fn(|i| (PARAMETER_NAMES[i], values[i]))
    }

    /// Correct one raw reading
    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        calibrate_magnetic(*raw, self.soft_iron, self.hard_iron)
    }

    /// Correct a batch of raw readings
    pub fn apply_all(&self, raw: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        raw.iter().map(|r| self.apply(r)).collect()
    }

    /// RMS deviation of corrected magnitudes from the reference field strength
    pub fn residual_rms(&self, raw: &[Vector3<f64>]) -> f64 {
        if raw.is_empty() {
            return 0.0;
        }
        let sum: f64 = raw
            .iter()
            .map(|r| (self.apply(r).norm() - self.reference_field_strength).powi(2))
            .sum();
        (sum / raw.len() as f64).sqrt()
    }
}

/// Extract soft- and hard-iron parameters from a fitted ellipsoid
///
/// With the centered form `(x - b)ᵀQ(x - b) = s`, the bias is the center
/// `b = -½ Q⁻¹u` and `A = (H / √s) · Q^½` maps the ellipsoid onto the sphere
/// of radius `H = reference_field_strength`. `Q^½` is built from the sorted
/// eigen-decomposition of `Q`, so `A` is symmetric.
///
/// # Errors
/// * [`CalibrationError::InvalidReferenceStrength`] if the strength is not positive and finite
/// * [`CalibrationError::IllConditionedModel`] if the model has non-finite coefficients,
///   `Q` is singular or has a non-positive eigenvalue, or the ellipsoid is empty
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use mag_cal::{QuadricModel, extract_calibration};
///
/// let center = Vector3::new(2.0, -1.0, 3.0);
/// let model = QuadricModel::axis_aligned_ellipsoid(center, Vector3::new(55.0, 45.0, 50.0));
/// let result = extract_calibration(&model, 50.0).unwrap();
///
/// assert!((result.hard_iron() - center).norm() < 1e-9);
/// let corrected = result.apply(&(center + Vector3::new(55.0, 0.0, 0.0)));
/// assert!((corrected.norm() - 50.0).abs() < 1e-9);
/// ```
pub fn extract_calibration(
    model: &QuadricModel,
    reference_field_strength: f64,
) -> Result<CalibrationResult> {
    if !(reference_field_strength > 0.0 && reference_field_strength.is_finite()) {
        return Err(CalibrationError::InvalidReferenceStrength(reference_field_strength));
    }

    if !model.is_finite() {
        return Err(CalibrationError::IllConditionedModel("non-finite model"));
    }

    let q_inv = model
        .quadratic
        .try_inverse()
        .ok_or(CalibrationError::IllConditionedModel("singular quadratic form"))?;

    let (eigenvalues, eigenvectors) = model
        .principal_axes()
        .ok_or(CalibrationError::IllConditionedModel("eigen-decomposition did not converge"))?;
    if !(eigenvalues[0] > eigenvalues[2].abs() * RELATIVE_EPSILON) {
        return Err(CalibrationError::IllConditionedModel("non-positive eigenvalue"));
    }

    let hard_iron = -0.5 * q_inv * model.linear;
    let level = hard_iron.dot(&(model.quadratic * hard_iron)) - model.offset;
    if !(level > 0.0 && level.is_finite()) {
        return Err(CalibrationError::IllConditionedModel("empty ellipsoid"));
    }

    let alpha = reference_field_strength * reference_field_strength / level;
    let soft_iron = symmetric_sqrt(&(eigenvalues * alpha), &eigenvectors);

    if soft_iron.iter().chain(hard_iron.iter()).any(|v| !v.is_finite()) {
        return Err(CalibrationError::IllConditionedModel("non-finite parameters"));
    }

    Ok(CalibrationResult::new(soft_iron, hard_iron, reference_field_strength))
}

/// Applies magnetometer calibration (hard and soft iron correction)
///
/// # Arguments
/// * `uncalibrated` - Raw magnetometer reading
/// * `soft_iron_matrix` - 3x3 soft iron correction matrix
/// * `hard_iron_offset` - Hard iron offset vector
///
/// # Returns
/// Calibrated magnetometer reading
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use mag_cal::calibration::calibrate_magnetic;
///
/// let raw = Vector3::new(100.0, 200.0, 300.0);
/// let soft_iron = Matrix3::identity();
/// let hard_iron = Vector3::new(10.0, 20.0, 30.0);
///
/// let calibrated = calibrate_magnetic(raw, soft_iron, hard_iron);
/// ```
pub fn calibrate_magnetic(
    uncalibrated: Vector3<f64>,
    soft_iron_matrix: Matrix3<f64>,
    hard_iron_offset: Vector3<f64>,
) -> Vector3<f64> {
    soft_iron_matrix * (uncalibrated - hard_iron_offset)
}
