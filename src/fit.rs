//! Least-squares ellipsoid-specific fitting
//!
//! Implements Li, Q. and Griffiths, J. G., "Least squares ellipsoid specific
//! fitting", Geometric Modeling and Processing, 2004. The general quadric
//!
//! `ax² + by² + cz² + 2fyz + 2gxz + 2hxy + 2px + 2qy + 2rz + d = 0`
//!
//! is fitted by minimizing the algebraic residual subject to `4J - I² = 1`,
//! where `I = a + b + c` and `J = ab + bc + ca - f² - g² - h²`. The constraint
//! only admits ellipsoids, which reduces the fit to a 6×6 generalized
//! eigenvalue problem.
//!
//! The `k = 4` constraint excludes elongated ellipsoids (shortest axis below
//! about half the longest). The unconstrained algebraic fit is therefore
//! solved as well, and whichever of the two is an ellipsoid with the smaller
//! residual is returned.

use nalgebra::{DMatrix, Matrix6, SMatrix, SVector, Vector3, Vector6};

use crate::eigen::sort_eigen;
use crate::error::{CalibrationError, Result};
use crate::math::{MAX_EIGEN_ITERATIONS, Normalization};
use crate::quadric::QuadricModel;

/// Minimum number of samples for a determined fit (10 coefficients up to scale)
pub const MIN_FIT_SAMPLES: usize = 9;

/// Shape parameter `k` of the Li–Griffiths constraint `kJ - I² = 1`
const SHAPE_CONSTRAINT: f64 = 4.0;

/// Relative size below which a scatter eigenvalue counts as zero
const RANK_TOLERANCE: f64 = 1e-10;

type Matrix10 = SMatrix<f64, 10, 10>;
type Vector10 = SVector<f64, 10>;

/// Fit an ellipsoid to a set of points
///
/// Points are normalized to zero mean and unit RMS radius before fitting and
/// the result is mapped back to raw coordinates in canonical scale (unit
/// coefficient norm, positive trace).
///
/// # Errors
/// * [`CalibrationError::NotEnoughSamples`] for fewer than [`MIN_FIT_SAMPLES`] points
/// * [`CalibrationError::DegenerateFit`] when the points are not finite, do not
///   determine a unique quadric (e.g. coplanar), a solver fails, or neither
///   solution is a closed ellipsoid
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use mag_cal::fit_ellipsoid;
///
/// // Points on an axis-aligned ellipsoid with radii (3, 2, 1)
/// let mut points = Vec::new();
/// for i in 0..6 {
///     for j in 1..5 {
///         let (theta, phi) = (i as f64 * 1.05, j as f64 * 0.6);
///         points.push(Vector3::new(
///             3.0 * phi.sin() * theta.cos(),
///             2.0 * phi.sin() * theta.sin(),
///             phi.cos(),
///         ));
///     }
/// }
///
/// let model = fit_ellipsoid(&points).unwrap();
/// assert!(model.center().unwrap().norm() < 1e-6);
/// ```
pub fn fit_ellipsoid(points: &[Vector3<f64>]) -> Result<QuadricModel> {
    if points.len() < MIN_FIT_SAMPLES {
        return Err(CalibrationError::NotEnoughSamples {
            got: points.len(),
            required: MIN_FIT_SAMPLES,
        });
    }
    if points.iter().flat_map(|p| p.iter()).any(|v| !v.is_finite()) {
        return Err(CalibrationError::DegenerateFit);
    }

    let normalization = Normalization::from_points(points);
    let scatter = scatter_matrix(points, &normalization);

    let unconstrained = unconstrained_fit(&scatter)?;
    let constrained = constrained_fit(&scatter);

    [Some(unconstrained), constrained.ok()]
        .into_iter()
        .flatten()
        .filter_map(|coefficients| {
            let coefficients = coefficients.try_normalize(f64::MIN_POSITIVE)?;
            let residual = (coefficients.transpose() * scatter * coefficients)[0];
            let model = to_model(&coefficients, &normalization)?;
            Some((residual, model))
        })
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, model)| model)
        .ok_or(CalibrationError::DegenerateFit)
}

/// `Σ ddᵀ` over the design rows of the normalized points
fn scatter_matrix(points: &[Vector3<f64>], normalization: &Normalization) -> Matrix10 {
    points.iter().fold(Matrix10::zeros(), |scatter, point| {
        let row = design_row(&normalization.apply(point));
        scatter + row * row.transpose()
    })
}

/// Smallest-eigenvalue eigenvector of the scatter matrix
///
/// Fails when the scatter has more than one (near) zero eigenvalue, i.e. the
/// points lie on many quadrics at once.
fn unconstrained_fit(scatter: &Matrix10) -> Result<Vector10> {
    let eigen = DMatrix::from_column_slice(10, 10, scatter.as_slice())
        .try_symmetric_eigen(f64::EPSILON, MAX_EIGEN_ITERATIONS)
        .ok_or(CalibrationError::DegenerateFit)?;
    let (values, vectors) = sort_eigen(
        &Vector10::from_iterator(eigen.eigenvalues.iter().copied()),
        &Matrix10::from_iterator(eigen.eigenvectors.iter().copied()),
    );

    if !(values[1] > values[9].abs() * RANK_TOLERANCE) {
        return Err(CalibrationError::DegenerateFit);
    }
    Ok(vectors.column(0).into_owned())
}

/// Li–Griffiths solution under `4J - I² = 1`
fn constrained_fit(scatter: &Matrix10) -> Result<Vector10> {
    let s11 = scatter.fixed_view::<6, 6>(0, 0).into_owned();
    let s12 = scatter.fixed_view::<6, 4>(0, 6).into_owned();
    let s22 = scatter.fixed_view::<4, 4>(6, 6).into_owned();

    // Linear part in terms of the quadratic part: v2 = -S22⁻¹ S21 v1
    let linear_solve = s22
        .try_inverse()
        .ok_or(CalibrationError::DegenerateFit)?
        * s12.transpose();
    let reduced = s11 - s12 * linear_solve;

    let constraint = constraint_matrix();
    let constraint_inv = constraint
        .try_inverse()
        .ok_or(CalibrationError::DegenerateFit)?;

    // The constraint admits exactly one non-negative eigenvalue; take the largest
    let lambda = (constraint_inv * reduced)
        .try_schur(f64::EPSILON, MAX_EIGEN_ITERATIONS)
        .ok_or(CalibrationError::DegenerateFit)?
        .complex_eigenvalues()
        .iter()
        .map(|z| z.re)
        .fold(f64::NEG_INFINITY, f64::max);
    if !lambda.is_finite() {
        return Err(CalibrationError::DegenerateFit);
    }

    let quadratic_part = null_vector(&(reduced - constraint * lambda))?;
    let linear_part = -linear_solve * quadratic_part;

    Ok(Vector10::from_iterator(
        quadratic_part.iter().chain(linear_part.iter()).copied(),
    ))
}

/// Raw-coordinate ellipsoid from normalized-coordinate coefficients, if it is one
fn to_model(coefficients: &Vector10, normalization: &Normalization) -> Option<QuadricModel> {
    if coefficients.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let coefficients: [f64; 10] = core::array::from_fn(|i| coefficients[i]);
    let model = QuadricModel::from_coefficients(&coefficients)
        .denormalize(normalization)
        .canonical();
    model.is_ellipsoid().then_some(model)
}

/// Root-mean-square algebraic residual of `points` against `model`
pub fn algebraic_rms(model: &QuadricModel, points: &[Vector3<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points.iter().map(|p| model.evaluate(p).powi(2)).sum();
    (sum / points.len() as f64).sqrt()
}

/// Quadratic monomials of one point in coefficient order `[a b c f g h p q r d]`
fn design_row(point: &Vector3<f64>) -> Vector10 {
    let (x, y, z) = (point.x, point.y, point.z);
    Vector10::from([
        x * x,
        y * y,
        z * z,
        2.0 * y * z,
        2.0 * x * z,
        2.0 * x * y,
        2.0 * x,
        2.0 * y,
        2.0 * z,
        1.0,
    ])
}

/// Constraint matrix `C1` with `v1ᵀ C1 v1 = kJ - I²`
fn constraint_matrix() -> Matrix6<f64> {
    let k = SHAPE_CONSTRAINT;
    let cross = k / 2.0 - 1.0;
    #[rustfmt::skip]
    let c1 = Matrix6::new(
        -1.0, cross, cross, 0.0, 0.0, 0.0,
        cross, -1.0, cross, 0.0, 0.0, 0.0,
        cross, cross, -1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, -k, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, -k, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0, -k,
    );
    c1
}

/// Right singular vector for the smallest singular value
fn null_vector(matrix: &Matrix6<f64>) -> Result<Vector6<f64>> {
    let svd = matrix
        .try_svd(false, true, f64::EPSILON, MAX_EIGEN_ITERATIONS)
        .ok_or(CalibrationError::DegenerateFit)?;
    let v_t = svd.v_t.ok_or(CalibrationError::DegenerateFit)?;
    let index = svd.singular_values.imin();
    Ok(v_t.row(index).transpose())
}
