//! Algebraic quadric surfaces and ray/surface intersection

use nalgebra::{Matrix3, Vector3};

use crate::eigen::sort_eigen;
use crate::error::{CalibrationError, Result};
use crate::math::{MAX_EIGEN_ITERATIONS, Normalization, RELATIVE_EPSILON, Vector3Ext};

/// General quadric surface `xᵀQx + uᵀx + k = 0`
///
/// A quadric is usable as a magnetometer model only when it is a closed,
/// non-empty ellipsoid; see [`QuadricModel::is_ellipsoid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadricModel {
    /// Symmetric quadratic-form matrix `Q`
    pub quadratic: Matrix3<f64>,
    /// Linear term `u`
    pub linear: Vector3<f64>,
    /// Constant offset `k`
    pub offset: f64,
}

impl QuadricModel {
    /// Build a model from its parts, symmetrizing `quadratic`
    pub fn new(quadratic: Matrix3<f64>, linear: Vector3<f64>, offset: f64) -> Self {
        Self {
            quadratic: (quadratic + quadratic.transpose()) * 0.5,
            linear,
            offset,
        }
    }

    /// Build a model from the ten coefficients `[a, b, c, f, g, h, p, q, r, d]` of
    ///
    /// `ax² + by² + cz² + 2fyz + 2gxz + 2hxy + 2px + 2qy + 2rz + d = 0`
    pub fn from_coefficients(coefficients: &[f64; 10]) -> Self {
        let [a, b, c, f, g, h, p, q, r, d] = *coefficients;
        #[rustfmt::skip]
        let quadratic = Matrix3::new(
            a, h, g,
            h, b, f,
            g, f, c,
        );
        Self {
            quadratic,
            linear: Vector3::new(2.0 * p, 2.0 * q, 2.0 * r),
            offset: d,
        }
    }

    /// Ten coefficients `[a, b, c, f, g, h, p, q, r, d]`; inverse of [`QuadricModel::from_coefficients`]
    pub fn coefficients(&self) -> [f64; 10] {
        let q = &self.quadratic;
        let u = &self.linear;
        [
            q[(0, 0)],
            q[(1, 1)],
            q[(2, 2)],
            q[(1, 2)],
            q[(0, 2)],
            q[(0, 1)],
            0.5 * u.x,
            0.5 * u.y,
            0.5 * u.z,
            self.offset,
        ]
    }

    /// Ellipsoid centered at `center` with semi-axes `radii` along the coordinate axes
    pub fn axis_aligned_ellipsoid(center: Vector3<f64>, radii: Vector3<f64>) -> Self {
        let quadratic = Matrix3::from_diagonal(&radii.map(|r| 1.0 / (r * r)));
        let linear = -2.0 * quadratic * center;
        let offset = (center.transpose() * quadratic * center)[0] - 1.0;
        Self {
            quadratic,
            linear,
            offset,
        }
    }

    /// Algebraic value `xᵀQx + uᵀx + k`; zero on the surface
    pub fn evaluate(&self, point: &Vector3<f64>) -> f64 {
        point.dot(&(self.quadratic * point)) + self.linear.dot(point) + self.offset
    }

    /// Same surface with every coefficient multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            quadratic: self.quadratic * factor,
            linear: self.linear * factor,
            offset: self.offset * factor,
        }
    }

    /// Same surface scaled so the coefficient vector has unit norm and `trace(Q) >= 0`
    ///
    /// Quadrics are only defined up to scale; canonical form makes two fits comparable.
    pub fn canonical(&self) -> Self {
        let coefficients = self.coefficients();
        let norm = coefficients.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return *self;
        }
        let sign = if self.quadratic.trace() < 0.0 { -1.0 } else { 1.0 };
        self.scaled(sign / norm)
    }

    /// Express a quadric fitted in normalized coordinates in raw coordinates
    pub fn denormalize(&self, normalization: &Normalization) -> Self {
        let mu = normalization.centroid;
        let s = normalization.scale;
        let q_mu = self.quadratic * mu;

        // Substitute x' = (x - mu) / s and multiply through by s²
        Self {
            quadratic: self.quadratic,
            linear: self.linear * s - 2.0 * q_mu,
            offset: mu.dot(&q_mu) - s * self.linear.dot(&mu) + s * s * self.offset,
        }
    }

    /// Center `-½ Q⁻¹ u` of a central quadric
    pub fn center(&self) -> Option<Vector3<f64>> {
        self.quadratic
            .try_inverse()
            .map(|q_inv| -0.5 * q_inv * self.linear)
            .filter(|c| c.iter().all(|v| v.is_finite()))
    }

    /// Right-hand side `¼ uᵀQ⁻¹u - k` of the centered form `(x-c)ᵀQ(x-c) = s`
    ///
    /// Positive for a real ellipsoid when `Q` is positive-definite.
    pub fn centered_level(&self) -> Option<f64> {
        self.center()
            .map(|c| c.dot(&(self.quadratic * c)) - self.offset)
    }

    /// Whether every coefficient is finite
    pub fn is_finite(&self) -> bool {
        self.quadratic
            .iter()
            .chain(self.linear.iter())
            .all(|v| v.is_finite())
            && self.offset.is_finite()
    }

    /// Principal axes as an eigen-pair of `Q`, sorted by ascending eigenvalue
    ///
    /// Returns `None` for a non-finite `Q` or if the decomposition does not converge.
    pub fn principal_axes(&self) -> Option<(Vector3<f64>, Matrix3<f64>)> {
        if !self.quadratic.iter().all(|v| v.is_finite()) {
            return None;
        }
        let eigen = self
            .quadratic
            .try_symmetric_eigen(f64::EPSILON, MAX_EIGEN_ITERATIONS)?;
        Some(sort_eigen(&eigen.eigenvalues, &eigen.eigenvectors))
    }

    /// Whether the quadric is a closed, non-empty ellipsoid
    ///
    /// Requires `Q` positive-definite (relative to its largest eigenvalue) and a
    /// positive centered level, otherwise the surface is open or imaginary.
    pub fn is_ellipsoid(&self) -> bool {
        if !self.is_finite() {
            return false;
        }
        let Some((eigenvalues, _)) = self.principal_axes() else {
            return false;
        };
        let largest = eigenvalues[2];
        if !(largest > 0.0) || eigenvalues[0] <= largest * RELATIVE_EPSILON {
            return false;
        }
        matches!(self.centered_level(), Some(level) if level > 0.0 && level.is_finite())
    }

    /// Semi-axis lengths along the sorted principal axes
    pub fn radii(&self) -> Result<Vector3<f64>> {
        if !self.is_ellipsoid() {
            return Err(CalibrationError::DegenerateFit);
        }
        let level = self
            .centered_level()
            .ok_or(CalibrationError::DegenerateFit)?;
        let (eigenvalues, _) = self
            .principal_axes()
            .ok_or(CalibrationError::DegenerateFit)?;
        Ok(eigenvalues.map(|lambda| (level / lambda).sqrt()))
    }

    /// Point where the ray from the model center through `sample` crosses the surface
    ///
    /// Returns `None` if the model has no center or the ray misses the surface.
    pub fn intersect(&self, sample: &Vector3<f64>) -> Option<Vector3<f64>> {
        let center = self.center()?;
        intersect(sample, &center, &self.quadratic, &self.linear, self.offset)
    }

    /// Radial deviation of `sample` from the surface, or `None` if undefined
    pub fn radial_distance(&self, sample: &Vector3<f64>) -> Option<f64> {
        self.intersect(sample)
            .map(|surface_point| (sample - surface_point).norm())
    }
}

/// Intersect the ray from `center` through `sample` with the quadric `(q, u, k)`
///
/// Substituting `x = center + t·d` (with `d` the unit ray direction) yields the
/// scalar quadratic `a t² + b t + c = 0`; the larger root is the forward crossing.
/// Returns `None` when the sample coincides with the center, the direction is
/// tangent to an open quadric, or the ray never meets the surface.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use mag_cal::quadric::intersect;
///
/// // Unit sphere: xᵀx - 1 = 0
/// let q = Matrix3::identity();
/// let u = Vector3::zeros();
/// let hit = intersect(&Vector3::new(3.0, 0.0, 0.0), &Vector3::zeros(), &q, &u, -1.0).unwrap();
/// assert!((hit - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
/// ```
pub fn intersect(
    sample: &Vector3<f64>,
    center: &Vector3<f64>,
    q: &Matrix3<f64>,
    u: &Vector3<f64>,
    k: f64,
) -> Option<Vector3<f64>> {
    let direction = (sample - center).try_normalize_finite()?;

    let q_dir = q * direction;
    let a = direction.dot(&q_dir);
    let b = 2.0 * center.dot(&q_dir) + u.dot(&direction);
    let c = center.dot(&(q * center)) + u.dot(center) + k;

    if a.abs() <= f64::EPSILON * q.norm() {
        return None;
    }

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrt_disc = discriminant.sqrt();
    let t = (-b + sqrt_disc) / (2.0 * a);
    let t = if t > 0.0 { t } else { (-b - sqrt_disc) / (2.0 * a) };
    if !(t > 0.0) {
        return None;
    }

    Some(center + direction * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tilted_ellipsoid() -> QuadricModel {
        // Axis-aligned ellipsoid rotated about z
        let base = QuadricModel::axis_aligned_ellipsoid(Vector3::zeros(), Vector3::new(3.0, 2.0, 1.0));
        let (s, c) = 0.4f64.sin_cos();
        #[rustfmt::skip]
        let rot = Matrix3::new(
            c, -s, 0.0,
            s, c, 0.0,
            0.0, 0.0, 1.0,
        );
        let quadratic = rot * base.quadratic * rot.transpose();
        let center = Vector3::new(1.0, -2.0, 0.5);
        QuadricModel::new(
            quadratic,
            -2.0 * quadratic * center,
            center.dot(&(quadratic * center)) - 1.0,
        )
    }

    #[test]
    fn test_coefficient_conversion() {
        let coefficients = [1.0, 2.0, 3.0, 0.1, 0.2, 0.3, -1.0, 0.5, 0.25, -4.0];
        let model = QuadricModel::from_coefficients(&coefficients);

        assert_eq!(model.quadratic[(0, 1)], 0.3);
        assert_eq!(model.quadratic[(0, 2)], 0.2);
        assert_eq!(model.quadratic[(1, 2)], 0.1);
        assert_eq!(model.linear, Vector3::new(-2.0, 1.0, 0.5));
        assert_eq!(model.coefficients(), coefficients);
    }

    #[test]
    fn test_center_and_level() {
        let model = QuadricModel::axis_aligned_ellipsoid(Vector3::new(2.0, -1.0, 3.0), Vector3::new(4.0, 5.0, 6.0));
        let center = model.center().unwrap();
        assert!((center - Vector3::new(2.0, -1.0, 3.0)).norm() < 1e-12);
        assert!((model.centered_level().unwrap() - 1.0).abs() < 1e-12);
        assert!(model.is_ellipsoid());

        let radii = model.radii().unwrap();
        // Ascending eigenvalues correspond to descending radii
        assert!((radii - Vector3::new(6.0, 5.0, 4.0)).norm() < 1e-10);
    }

    #[test]
    fn test_surface_points_evaluate_to_zero() {
        let model = tilted_ellipsoid();
        let hit = model.intersect(&Vector3::new(10.0, 4.0, -3.0)).unwrap();
        assert!(model.evaluate(&hit).abs() < 1e-10);
    }

    #[test]
    fn test_rejects_non_ellipsoids() {
        // Hyperboloid of one sheet: x² + y² - z² - 1 = 0
        let hyperboloid = QuadricModel::new(
            Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)),
            Vector3::zeros(),
            -1.0,
        );
        assert!(!hyperboloid.is_ellipsoid());
        assert_eq!(hyperboloid.radii(), Err(CalibrationError::DegenerateFit));

        // Imaginary ellipsoid: x² + y² + z² + 1 = 0
        let imaginary = QuadricModel::new(Matrix3::identity(), Vector3::zeros(), 1.0);
        assert!(!imaginary.is_ellipsoid());

        // Cylinder: x² + y² - 1 = 0 has a singular quadratic form
        let cylinder = QuadricModel::new(
            Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.0)),
            Vector3::zeros(),
            -1.0,
        );
        assert!(!cylinder.is_ellipsoid());
    }

    #[test]
    fn test_non_finite_models_are_rejected() {
        let mut quadratic = Matrix3::identity();
        quadratic[(1, 1)] = f64::NAN;
        let nan = QuadricModel::new(quadratic, Vector3::zeros(), -1.0);
        assert!(!nan.is_finite());
        assert!(nan.principal_axes().is_none());
        assert!(!nan.is_ellipsoid());
        assert_eq!(nan.radii(), Err(CalibrationError::DegenerateFit));

        let infinite_offset = QuadricModel::new(Matrix3::identity(), Vector3::zeros(), f64::NEG_INFINITY);
        assert!(!infinite_offset.is_ellipsoid());
    }

    #[test]
    fn test_principal_axes_are_sorted() {
        let (eigenvalues, eigenvectors) = tilted_ellipsoid().principal_axes().unwrap();
        assert!(eigenvalues[0] <= eigenvalues[1] && eigenvalues[1] <= eigenvalues[2]);
        assert!((eigenvalues - Vector3::new(1.0 / 9.0, 0.25, 1.0)).norm() < 1e-12);
        assert!((eigenvectors.column(2).abs() - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_canonical_form_is_scale_invariant() {
        let model = tilted_ellipsoid();
        let a = model.scaled(-7.5).canonical();
        let b = model.scaled(0.01).canonical();

        let diff: f64 = a
            .coefficients()
            .iter()
            .zip(b.coefficients().iter())
            .map(|(x, y)| (x - y).abs())
            .sum();
        assert!(diff < 1e-12);
        assert!(a.quadratic.trace() > 0.0);
    }

    #[test]
    fn test_denormalize_preserves_surface() {
        let model = tilted_ellipsoid();
        let normalization = Normalization {
            centroid: Vector3::new(0.5, -1.0, 2.0),
            scale: 3.0,
        };

        // Re-express the model in normalized coordinates: x = s x' + mu
        let mu = normalization.centroid;
        let s = normalization.scale;
        let normalized = QuadricModel::new(
            model.quadratic * s * s,
            (2.0 * model.quadratic * mu + model.linear) * s,
            model.evaluate(&mu),
        );

        let restored = normalized.denormalize(&normalization).canonical();
        let expected = model.canonical();
        for (x, y) in restored.coefficients().iter().zip(expected.coefficients().iter()) {
            assert!((x - y).abs() < 1e-12, "{} != {}", x, y);
        }
    }

    #[test]
    fn test_intersect_sphere() {
        let center = Vector3::new(1.0, 1.0, 1.0);
        let model = QuadricModel::axis_aligned_ellipsoid(center, Vector3::new(2.0, 2.0, 2.0));

        // Outside and inside the sphere both project onto radius 2 along the ray
        for sample in [Vector3::new(5.0, 1.0, 1.0), Vector3::new(1.0, 1.5, 1.0)] {
            let hit = model.intersect(&sample).unwrap();
            assert!(((hit - center).norm() - 2.0).abs() < 1e-12);
            let along = (sample - center).normalize();
            assert!(((hit - center).normalize() - along).norm() < 1e-12);
        }

        let distance = model.radial_distance(&Vector3::new(5.0, 1.0, 1.0)).unwrap();
        assert!((distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_intersect_at_center_is_undefined() {
        let model = QuadricModel::axis_aligned_ellipsoid(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0));
        assert!(model.intersect(&Vector3::zeros()).is_none());
    }

    #[test]
    fn test_intersect_misses_open_surface() {
        // Hyperboloid of two sheets: z² - x² - y² - 1 = 0 never meets rays in the xy-plane
        let q = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        let result = intersect(&Vector3::new(1.0, 0.0, 0.0), &Vector3::zeros(), &q, &Vector3::zeros(), -1.0);
        assert!(result.is_none());
    }
}
