//! RANSAC ellipsoid estimation
//!
//! Minimal subsets of [`MIN_FIT_SAMPLES`] points are fitted with the
//! least-squares fitter and every candidate is scored against the whole
//! sample set by radial distance to its surface. The best-supported
//! candidate's inliers are refitted to produce the final model.

use nalgebra::Vector3;
use rand::prelude::IndexedRandom;
use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, trace};

use crate::error::{CalibrationError, Result};
use crate::fit::{MIN_FIT_SAMPLES, fit_ellipsoid};
use crate::quadric::{QuadricModel, intersect};
use crate::types::RansacSettings;

/// Output of a successful RANSAC run
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsoidEstimate {
    /// Least-squares refit over the inliers of the best candidate
    pub model: QuadricModel,
    /// Best minimal-subset candidate, before refitting
    pub candidate: QuadricModel,
    /// Indices of samples supporting the best candidate, in ascending order
    pub inliers: Vec<usize>,
    /// Round (zero-based) in which the best candidate was found
    pub best_iteration: usize,
}

impl EllipsoidEstimate {
    /// Number of supporting samples
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }

    /// Fraction of `total` samples that support the model
    pub fn inlier_ratio(&self, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            self.inliers.len() as f64 / total as f64
        }
    }
}

/// Robustly fit an ellipsoid to `points`
///
/// Each of `settings.iterations` rounds draws [`MIN_FIT_SAMPLES`] distinct
/// points, skips degenerate fits, and counts samples whose radial distance to
/// the candidate is strictly below `settings.inlier_threshold`. The candidate
/// with the most inliers wins; ties go to the earliest round.
///
/// # Errors
/// * [`CalibrationError::InsufficientSupport`] if no round produced an ellipsoid or
///   the best candidate has fewer than `settings.min_inliers` inliers
/// * [`CalibrationError::DegenerateFit`] if the final refit fails
pub fn estimate_ellipsoid(
    points: &[Vector3<f64>],
    settings: &RansacSettings,
) -> Result<EllipsoidEstimate> {
    let settings = settings.validated();
    let insufficient = |inliers: usize| CalibrationError::InsufficientSupport {
        inliers,
        required: settings.min_inliers,
    };

    if points.len() < MIN_FIT_SAMPLES {
        return Err(insufficient(0));
    }

    let all_indices: Vec<usize> = (0..points.len()).collect();
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut subset = Vec::with_capacity(MIN_FIT_SAMPLES);
    let mut inliers = Vec::with_capacity(points.len());
    let mut best: Option<(QuadricModel, Vec<usize>, usize)> = None;

    for iteration in 0..settings.iterations {
        subset.clear();
        subset.extend(
            all_indices
                .choose_multiple(&mut rng, MIN_FIT_SAMPLES)
                .map(|&i| points[i]),
        );

        let candidate = match fit_ellipsoid(&subset) {
            Ok(model) => model,
            Err(err) => {
                trace!(iteration, %err, "skipping candidate");
                continue;
            }
        };

        let Some(center) = candidate.center() else {
            trace!(iteration, "skipping candidate without a center");
            continue;
        };

        inliers.clear();
        inliers.extend(all_indices.iter().copied().filter(|&i| {
            let sample = &points[i];
            intersect(sample, &center, &candidate.quadratic, &candidate.linear, candidate.offset)
                .is_some_and(|surface| (sample - surface).norm() < settings.inlier_threshold)
        }));

        if best
            .as_ref()
            .is_none_or(|(_, best_inliers, _)| inliers.len() > best_inliers.len())
        {
            debug!(iteration, inliers = inliers.len(), "new best ellipsoid candidate");
            best = Some((candidate, inliers.clone(), iteration));
        }
    }

    let Some((candidate, support, best_iteration)) = best else {
        return Err(insufficient(0));
    };
    if support.len() < settings.min_inliers {
        return Err(insufficient(support.len()));
    }

    let support_points: Vec<_> = support.iter().map(|&i| points[i]).collect();
    let model = fit_ellipsoid(&support_points)?;

    Ok(EllipsoidEstimate {
        model,
        candidate,
        inliers: support,
        best_iteration,
    })
}
