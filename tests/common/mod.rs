//! Synthetic magnetometer data shared by the integration tests

#![allow(dead_code)]

use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;

pub const EPSILON: f64 = 1e-9;

/// Distortion applied to an ideal field to model a mounted sensor
#[derive(Debug, Clone, Copy)]
pub struct Distortion {
    /// Maps the ideal field onto the distorted one (inverse of the soft-iron correction)
    pub soft_iron: Matrix3<f64>,
    pub hard_iron: Vector3<f64>,
}

impl Distortion {
    pub fn scale_and_bias(scale: Vector3<f64>, bias: Vector3<f64>) -> Self {
        Self {
            soft_iron: Matrix3::from_diagonal(&scale),
            hard_iron: bias,
        }
    }

    pub fn apply(&self, field: &Vector3<f64>) -> Vector3<f64> {
        self.soft_iron * field + self.hard_iron
    }
}

/// Uniformly distributed directions on the unit sphere
pub fn random_directions(count: usize, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = Pcg64::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let z: f64 = rng.random_range(-1.0..1.0);
            let theta: f64 = rng.random_range(0.0..core::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            Vector3::new(r * theta.cos(), r * theta.sin(), z)
        })
        .collect()
}

/// Distorted readings of a field of magnitude `strength`
pub fn distorted_readings(
    count: usize,
    strength: f64,
    distortion: &Distortion,
    seed: u64,
) -> Vec<Vector3<f64>> {
    random_directions(count, seed)
        .iter()
        .map(|d| distortion.apply(&(d * strength)))
        .collect()
}

/// Add uniform noise in `[-amplitude, amplitude)` to every axis
pub fn add_noise(readings: &mut [Vector3<f64>], amplitude: f64, seed: u64) {
    let mut rng = Pcg64::seed_from_u64(seed);
    for reading in readings {
        *reading += Vector3::new(
            rng.random_range(-amplitude..amplitude),
            rng.random_range(-amplitude..amplitude),
            rng.random_range(-amplitude..amplitude),
        );
    }
}
