//! A matrix parameterized by its eigendecomposition, `M = V D V^{-1}`.
//!
//! Eigenvalues are stored directly; each eigenvector column is stored as
//! `dim - 1` spherical coordinates, so the basis stays away from degenerate
//! configurations under unconstrained updates. The composed matrix is cached
//! and rebuilt lazily after any coordinate write.

use faer::linalg::solvers::{PartialPivLu, Solve};
use faer::Mat;

use crate::{HmcError, Result};

#[derive(Debug)]
pub struct CompoundEigenMatrix {
    dim: usize,
    eigenvalues: Vec<f64>,
    spherical: Vec<f64>,
    composed: Mat<f64>,
    composition_known: bool,
}

impl CompoundEigenMatrix {
    /// `spherical` holds `dim - 1` angles per column, column-major, for a
    /// total of `dim * (dim - 1)` coordinates.
    pub fn new(eigenvalues: Vec<f64>, spherical: Vec<f64>) -> Result<Self> {
        let dim = eigenvalues.len();
        if spherical.len() != dim * (dim - 1) {
            return Err(HmcError::DimensionMismatch {
                expected: dim * (dim - 1),
                actual: spherical.len(),
            });
        }
        let mut matrix = Self {
            dim,
            eigenvalues,
            spherical,
            composed: Mat::zeros(dim, dim),
            composition_known: false,
        };
        matrix.recompose();
        Ok(matrix)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Entry of the composed matrix, recomposing first if a coordinate
    /// changed since the last read.
    pub fn entry(&mut self, row: usize, col: usize) -> f64 {
        if !self.composition_known {
            self.recompose();
        }
        self.composed[(row, col)]
    }

    pub fn eigenvalue(&self, index: usize) -> f64 {
        self.eigenvalues[index]
    }

    pub fn set_eigenvalue(&mut self, index: usize, value: f64) {
        self.eigenvalues[index] = value;
        self.invalidate();
    }

    pub fn set_spherical(&mut self, index: usize, value: f64) {
        self.spherical[index] = value;
        self.invalidate();
    }

    /// Mark the cached composition stale.
    pub fn invalidate(&mut self) {
        self.composition_known = false;
    }

    pub fn update_gradient_diagonal(&mut self, _gradient: &[f64]) -> Result<()> {
        Err(HmcError::Unsupported(
            "gradient updates of eigenvalue coordinates",
        ))
    }

    pub fn update_gradient_off_diagonal(&mut self, _gradient: &[f64]) -> Result<()> {
        Err(HmcError::Unsupported(
            "gradient updates of spherical coordinates",
        ))
    }

    fn recompose(&mut self) {
        let dim = self.dim;
        let basis = spherical_basis(&self.spherical, dim);
        let lu = PartialPivLu::new(basis.as_ref());
        let identity = Mat::from_fn(dim, dim, |i, j| if i == j { 1.0 } else { 0.0 });
        let basis_inv = lu.solve(identity.as_ref());
        let scaled = Mat::from_fn(dim, dim, |i, j| basis[(i, j)] * self.eigenvalues[j]);
        self.composed = scaled * basis_inv;
        self.composition_known = true;
    }
}

/// Unit-norm columns from spherical coordinates, `dim - 1` angles per column.
fn spherical_basis(coords: &[f64], dim: usize) -> Mat<f64> {
    let mut columns = vec![vec![0.0; dim]; dim];
    for (j, column) in columns.iter_mut().enumerate() {
        let angles = &coords[j * (dim - 1)..(j + 1) * (dim - 1)];
        let mut acc = 1.0;
        for (i, angle) in angles.iter().enumerate() {
            column[i] = acc * angle.cos();
            acc *= angle.sin();
        }
        column[dim - 1] = acc;
    }
    Mat::from_fn(dim, dim, |i, j| columns[j][i])
}
