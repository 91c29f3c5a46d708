//! Deterministic ordering of eigen-decompositions
//!
//! nalgebra's symmetric eigen solver returns eigenvalues in no particular
//! order. Sorting them ascending, with eigenvector columns permuted the same
//! way, gives principal axes a stable meaning across decompositions.

use nalgebra::{SMatrix, SVector};

/// Sort an eigen-pair by ascending eigenvalue
///
/// Eigenvector columns are permuted identically. Ties keep their original
/// index order, so the result is fully deterministic. NaN eigenvalues sort last.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use mag_cal::sort_eigen;
///
/// let values = Vector3::new(3.0, 1.0, 2.0);
/// let vectors = Matrix3::identity();
/// let (sorted, permuted) = sort_eigen(&values, &vectors);
///
/// assert_eq!(sorted, Vector3::new(1.0, 2.0, 3.0));
/// assert_eq!(permuted.column(0), vectors.column(1));
/// ```
pub fn sort_eigen<const D: usize>(
    eigenvalues: &SVector<f64, D>,
    eigenvectors: &SMatrix<f64, D, D>,
) -> (SVector<f64, D>, SMatrix<f64, D, D>) {
    let mut order: [usize; D] = core::array::from_fn(|i| i);
    // Stable sort: equal eigenvalues stay in original index order
    order.sort_by(|&a, &b| eigenvalues[a].total_cmp(&eigenvalues[b]));

    let sorted_values = SVector::<f64, D>::from_fn(|i, _| eigenvalues[order[i]]);
    let sorted_vectors = SMatrix::<f64, D, D>::from_fn(|r, c| eigenvectors[(r, order[c])]);

    (sorted_values, sorted_vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn sample_pair() -> (Vector3<f64>, Matrix3<f64>) {
        let values = Vector3::new(5.0, -1.0, 2.0);
        #[rustfmt::skip]
        let vectors = Matrix3::new(
            0.0, 1.0, 0.0,
            0.6, 0.0, 0.8,
            0.8, 0.0, -0.6,
        );
        (values, vectors)
    }

    #[test]
    fn test_sort_ascending() {
        let (values, vectors) = sample_pair();
        let (sorted, permuted) = sort_eigen(&values, &vectors);

        assert_eq!(sorted, Vector3::new(-1.0, 2.0, 5.0));
        assert_eq!(permuted.column(0), vectors.column(1));
        assert_eq!(permuted.column(1), vectors.column(2));
        assert_eq!(permuted.column(2), vectors.column(0));
    }

    #[test]
    fn test_sort_is_idempotent() {
        let (values, vectors) = sample_pair();
        let once = sort_eigen(&values, &vectors);
        let twice = sort_eigen(&once.0, &once.1);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_sort_ignores_input_permutation() {
        let (values, vectors) = sample_pair();
        let canonical = sort_eigen(&values, &vectors);

        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for perm in permutations {
            let shuffled_values = Vector3::from_fn(|i, _| values[perm[i]]);
            let shuffled_vectors = Matrix3::from_fn(|r, c| vectors[(r, perm[c])]);

            assert_eq!(
                sort_eigen(&shuffled_values, &shuffled_vectors),
                canonical,
                "permutation {:?} sorted differently",
                perm
            );
        }
    }

    #[test]
    fn test_ties_keep_original_order() {
        let values = Vector3::new(2.0, 1.0, 2.0);
        let vectors = Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 3.0));
        let (sorted, permuted) = sort_eigen(&values, &vectors);

        assert_eq!(sorted, Vector3::new(1.0, 2.0, 2.0));
        // Column 0 (value 2.0) precedes column 2 (value 2.0)
        assert_eq!(permuted[(0, 1)], 1.0);
        assert_eq!(permuted[(2, 2)], 3.0);
    }
}
