//! Constrained LKJ transform between a correlation matrix and its canonical
//! partial correlations.
//!
//! The sampling coordinates are the strictly-upper-triangle entries of a
//! matrix `Z` of canonical partial correlations, packed row-major. The model
//! coordinates are the strictly-upper-triangle entries of the corresponding
//! correlation matrix `R = W^T W`, where `W` is the upper-triangular Cholesky
//! factor built column by column from `Z`.

use crate::{HmcError, Result, Transform};

pub struct LkjTransform {
    dim: usize,
}

impl LkjTransform {
    /// `dim` is the side length of the correlation matrix, not the packed
    /// vector length.
    pub fn new(dim: usize) -> Self {
        assert!(dim >= 2, "a correlation matrix needs at least two rows");
        Self { dim }
    }

    /// Number of free entries, `dim * (dim - 1) / 2`.
    pub fn packed_len(&self) -> usize {
        self.dim * (self.dim - 1) / 2
    }

    /// Packed row-major index of strictly-upper entry `(i, j)`, `i < j`.
    fn upper_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < self.dim);
        i * (2 * self.dim - i - 1) / 2 + (j - i - 1)
    }

    fn upper_entry(&self, packed: &[f64], i: usize, j: usize) -> f64 {
        if i == j {
            1.0
        } else {
            packed[self.upper_index(i, j)]
        }
    }

    /// Cholesky columns of `R = W^T W` from the partial correlations.
    fn cholesky_columns(&self, partials: &[f64]) -> Vec<Vec<f64>> {
        let dim = self.dim;
        let mut w = vec![vec![0.0; dim]; dim];
        w[0][0] = 1.0;
        for j in 1..dim {
            let mut acc = 1.0;
            for i in 0..=j {
                let z = self.upper_entry(partials, i, j);
                w[j][i] = z * acc;
                acc *= (1.0 - z * z).sqrt();
            }
        }
        w
    }
}

/// Direction note: the classical LKJ construction is usually stated as
/// partials → correlations. Under this trait the sampling coordinates are
/// the partials, so that construction is [`inverse`](Transform::inverse)
/// here and `forward` is its reversal.
impl Transform for LkjTransform {
    /// Correlations to canonical partial correlations.
    fn forward(&self, values: &[f64]) -> Vec<f64> {
        assert_eq!(values.len(), self.packed_len());
        let dim = self.dim;
        let mut r = vec![vec![0.0; dim]; dim];
        for i in 0..dim {
            r[i][i] = 1.0;
            for j in (i + 1)..dim {
                let v = values[self.upper_index(i, j)];
                r[i][j] = v;
                r[j][i] = v;
            }
        }
        let l = cholesky_lower(&r).expect("correlation matrix is not positive definite");
        let mut partials = vec![0.0; self.packed_len()];
        for j in 1..dim {
            let mut acc = 1.0;
            for i in 0..j {
                // Column j of W is column j of L transposed: w[i][j] = l[j][i].
                let z = l[j][i] / acc;
                partials[self.upper_index(i, j)] = z;
                acc *= (1.0 - z * z).sqrt();
            }
        }
        partials
    }

    /// Canonical partial correlations to correlations.
    fn inverse(&self, values: &[f64]) -> Vec<f64> {
        assert_eq!(values.len(), self.packed_len());
        // |z| = 1 collapses a column and gives a singular, merely
        // positive-semidefinite matrix.
        assert!(
            values.iter().all(|z| z.abs() < 1.0),
            "partial correlations must lie strictly inside (-1, 1)"
        );
        let w = self.cholesky_columns(values);
        let mut out = vec![0.0; self.packed_len()];
        for i in 0..self.dim {
            for j in (i + 1)..self.dim {
                let dot: f64 = w[i].iter().zip(&w[j]).map(|(a, b)| a * b).sum();
                out[self.upper_index(i, j)] = dot;
            }
        }
        out
    }

    /// `log |det d(partials)/d(correlations)|` at a correlation point.
    ///
    /// The partials-to-correlations direction has the closed-form log
    /// determinant `0.5 * sum_{i<j} (dim - i - 2) * ln(1 - z_ij^2)`; this is
    /// the reverse direction, so the sign flips.
    fn log_jacobian(&self, values: &[f64]) -> f64 {
        let partials = self.forward(values);
        let mut total = 0.0;
        for i in 0..self.dim {
            for j in (i + 1)..self.dim {
                let z = partials[self.upper_index(i, j)];
                total += (self.dim as f64 - i as f64 - 2.0) * (1.0 - z * z).ln();
            }
        }
        -0.5 * total
    }

    fn transport_gradient(&self, _gradient: &[f64], _values: &[f64]) -> Result<Vec<f64>> {
        Err(HmcError::Unsupported(
            "gradient transport for the LKJ transform",
        ))
    }
}

/// Lower Cholesky factor of a symmetric positive-definite matrix, or `None`
/// if a pivot is not positive.
fn cholesky_lower(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}
