//! Mass preconditioners for the momentum draw and kinetic energy.
//!
//! Momentum is drawn with covariance equal to the mass inverse, and the
//! kinetic energy is `0.5 * p^T M^{-1} p`. The Hessian-adaptive variants
//! refresh both matrices from curvature at the current position; how often
//! that happens is the operator's business, not theirs.

use faer::{Mat, MatRef, Side};
use rand_distr::StandardNormal;

use crate::math::mat_vec;
use crate::model::{HessianProvider, ParameterStore};
use crate::transform::Transform;
use crate::{HmcError, Result};

/// Diagonal mass-inverse entries are clamped to this range before and after
/// the mean rescale, so a single flat or spiked curvature estimate cannot
/// freeze a component.
const INV_MASS_LOWER: f64 = 1e-2;
const INV_MASS_UPPER: f64 = 1e2;

/// Eigenvalues of the dense Hessian estimate are clipped below this, keeping
/// the preconditioner negative definite near saddle points.
const MIN_EIGENVALUE: f64 = -0.5;

pub trait MassPreconditioner<M> {
    fn mass(&self) -> MatRef<'_, f64>;

    fn mass_inverse(&self) -> MatRef<'_, f64>;

    /// Refresh the matrices from the model's current position.
    fn update(&mut self, model: &mut M) -> Result<()>;

    /// Draw `momentum ~ N(0, mass_inverse)`.
    fn randomize_momentum<R: rand::Rng + ?Sized>(&self, momentum: &mut [f64], rng: &mut R);
}

/// Constant diagonal mass, the non-adaptive default.
pub struct FixedDiagMass {
    mass: Mat<f64>,
    mass_inverse: Mat<f64>,
    stds: Vec<f64>,
}

impl FixedDiagMass {
    /// `draw_variance` is the per-component variance of the momentum draw,
    /// i.e. the diagonal of the mass inverse.
    pub fn new(dim: usize, draw_variance: f64) -> Self {
        assert!(draw_variance > 0.0);
        Self {
            mass: diag_mat(dim, 1.0 / draw_variance),
            mass_inverse: diag_mat(dim, draw_variance),
            stds: vec![draw_variance.sqrt(); dim],
        }
    }
}

impl<M> MassPreconditioner<M> for FixedDiagMass {
    fn mass(&self) -> MatRef<'_, f64> {
        self.mass.as_ref()
    }

    fn mass_inverse(&self) -> MatRef<'_, f64> {
        self.mass_inverse.as_ref()
    }

    fn update(&mut self, _model: &mut M) -> Result<()> {
        Ok(())
    }

    fn randomize_momentum<R: rand::Rng + ?Sized>(&self, momentum: &mut [f64], rng: &mut R) {
        draw_scaled_normal(&self.stds, momentum, rng);
    }
}

/// Diagonal mass refreshed from the diagonal of the log-density Hessian.
pub struct HessianDiagMass {
    mass: Mat<f64>,
    mass_inverse: Mat<f64>,
    stds: Vec<f64>,
}

impl HessianDiagMass {
    /// Starts out identical to [`FixedDiagMass`]; the curvature takes over
    /// on the first [`update`](MassPreconditioner::update).
    pub fn new(dim: usize, draw_variance: f64) -> Self {
        assert!(draw_variance > 0.0);
        Self {
            mass: diag_mat(dim, 1.0 / draw_variance),
            mass_inverse: diag_mat(dim, draw_variance),
            stds: vec![draw_variance.sqrt(); dim],
        }
    }
}

impl<M: HessianProvider> MassPreconditioner<M> for HessianDiagMass {
    fn mass(&self) -> MatRef<'_, f64> {
        self.mass.as_ref()
    }

    fn mass_inverse(&self) -> MatRef<'_, f64> {
        self.mass_inverse.as_ref()
    }

    fn update(&mut self, model: &mut M) -> Result<()> {
        let dim = model.dim();
        let mut hessian = vec![0.0; dim];
        model.diagonal_hessian_log_density(&mut hessian);
        let bounded = bound_mass_inverse(&hessian);
        self.mass = Mat::from_fn(dim, dim, |i, j| if i == j { 1.0 / bounded[i] } else { 0.0 });
        self.mass_inverse =
            Mat::from_fn(dim, dim, |i, j| if i == j { bounded[i] } else { 0.0 });
        self.stds = bounded.iter().map(|v| v.sqrt()).collect();
        Ok(())
    }

    fn randomize_momentum<R: rand::Rng + ?Sized>(&self, momentum: &mut [f64], rng: &mut R) {
        draw_scaled_normal(&self.stds, momentum, rng);
    }
}

/// Mass-inverse diagonal from a Hessian diagonal: negate-and-invert each
/// entry, clamp, rescale so the reciprocals average to one, clamp again.
fn bound_mass_inverse(hessian: &[f64]) -> Vec<f64> {
    let mut bounded: Vec<f64> = hessian
        .iter()
        .map(|h| (-1.0 / h).clamp(INV_MASS_LOWER, INV_MASS_UPPER))
        .collect();
    let mean = bounded.iter().map(|b| b.recip()).sum::<f64>() / bounded.len() as f64;
    for b in bounded.iter_mut() {
        *b = (*b * mean).clamp(INV_MASS_LOWER, INV_MASS_UPPER);
    }
    bounded
}

/// Dense mass from a finite-difference Hessian of the transported gradient,
/// held as its eigendecomposition.
pub struct HessianDenseMass<T: Transform> {
    transform: T,
    dim: usize,
    mass: Mat<f64>,
    mass_inverse: Mat<f64>,
    eigenvectors: Mat<f64>,
    draw_scales: Vec<f64>,
}

impl<T: Transform> HessianDenseMass<T> {
    pub fn new(transform: T, dim: usize) -> Self {
        Self {
            transform,
            dim,
            mass: identity(dim),
            mass_inverse: identity(dim),
            eigenvectors: identity(dim),
            draw_scales: vec![1.0; dim],
        }
    }
}

impl<T, M> MassPreconditioner<M> for HessianDenseMass<T>
where
    T: Transform,
    M: HessianProvider + ParameterStore,
{
    fn mass(&self) -> MatRef<'_, f64> {
        self.mass.as_ref()
    }

    fn mass_inverse(&self) -> MatRef<'_, f64> {
        self.mass_inverse.as_ref()
    }

    fn update(&mut self, model: &mut M) -> Result<()> {
        let dim = self.dim;
        let hessian = numerical_hessian(model, &self.transform)?;
        let eigen = hessian
            .self_adjoint_eigen(Side::Lower)
            .map_err(|_| HmcError::NumericInstability)?;

        let mut eigenvalues: Vec<f64> = (0..dim).map(|i| eigen.S()[i]).collect();
        for lambda in eigenvalues.iter_mut() {
            if *lambda > MIN_EIGENVALUE {
                *lambda = MIN_EIGENVALUE;
            }
        }
        // Normalize so the spectrum averages to -1; only the shape of the
        // curvature matters, the overall scale belongs to the step size.
        let mean = -eigenvalues.iter().sum::<f64>() / dim as f64;
        for lambda in eigenvalues.iter_mut() {
            *lambda /= mean;
        }

        let u = eigen.U();
        self.mass = Mat::from_fn(dim, dim, |i, j| {
            -(0..dim).map(|k| u[(i, k)] * eigenvalues[k] * u[(j, k)]).sum::<f64>()
        });
        self.mass_inverse = Mat::from_fn(dim, dim, |i, j| {
            (0..dim).map(|k| -u[(i, k)] * u[(j, k)] / eigenvalues[k]).sum::<f64>()
        });
        self.eigenvectors = u.to_owned();
        self.draw_scales = eigenvalues.iter().map(|l| (-1.0 / l).sqrt()).collect();

        log::debug!(
            "dense mass refreshed, spectrum [{:.3e}, {:.3e}]",
            eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min),
            eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        );
        Ok(())
    }

    fn randomize_momentum<R: rand::Rng + ?Sized>(&self, momentum: &mut [f64], rng: &mut R) {
        let mut z = vec![0.0; self.dim];
        for (zi, scale) in z.iter_mut().zip(&self.draw_scales) {
            let draw: f64 = rng.sample(StandardNormal);
            *zi = scale * draw;
        }
        mat_vec(self.eigenvectors.as_ref(), &z, momentum);
    }
}

/// Restores the probed parameter to its saved values on scope exit, so a
/// failed gradient transport cannot leave the model at a probe point.
struct ProbeGuard<'a, M: ParameterStore> {
    model: &'a mut M,
    saved: &'a [f64],
}

impl<M: ParameterStore> Drop for ProbeGuard<'_, M> {
    fn drop(&mut self) {
        for (index, value) in self.saved.iter().enumerate() {
            self.model.set_value_quietly(index, *value);
        }
    }
}

fn probe_gradient<M, T>(
    model: &mut M,
    transform: &T,
    probe: &[f64],
) -> Result<Vec<f64>>
where
    M: HessianProvider + ParameterStore,
    T: Transform,
{
    let values = transform.inverse(probe);
    for (index, value) in values.iter().enumerate() {
        model.set_value_quietly(index, *value);
    }
    let mut gradient = vec![0.0; model.dim()];
    model.gradient_log_density(&mut gradient);
    transform.transport_gradient(&gradient, &values)
}

/// Central-difference Hessian of the transported gradient in sampling
/// coordinates, symmetrized across the two one-sided estimates of each
/// entry.
fn numerical_hessian<M, T>(model: &mut M, transform: &T) -> Result<Mat<f64>>
where
    M: HessianProvider + ParameterStore,
    T: Transform,
{
    let dim = model.dim();
    let saved = model.values();
    let transformed = transform.forward(&saved);

    let step_scale = f64::EPSILON.sqrt().sqrt();
    let steps: Vec<f64> = transformed.iter().map(|y| step_scale * (y.abs() + 1.0)).collect();

    let guard = ProbeGuard {
        model,
        saved: &saved,
    };

    let mut plus = Vec::with_capacity(dim);
    let mut minus = Vec::with_capacity(dim);
    for i in 0..dim {
        let mut probe = transformed.clone();
        probe[i] = transformed[i] + steps[i];
        plus.push(probe_gradient(guard.model, transform, &probe)?);
        probe[i] = transformed[i] - steps[i];
        minus.push(probe_gradient(guard.model, transform, &probe)?);
    }
    drop(guard);

    Ok(Mat::from_fn(dim, dim, |i, j| {
        (plus[i][j] - minus[i][j]) / (4.0 * steps[i])
            + (plus[j][i] - minus[j][i]) / (4.0 * steps[j])
    }))
}

fn diag_mat(dim: usize, value: f64) -> Mat<f64> {
    Mat::from_fn(dim, dim, |i, j| if i == j { value } else { 0.0 })
}

fn identity(dim: usize) -> Mat<f64> {
    diag_mat(dim, 1.0)
}

fn draw_scaled_normal<R: rand::Rng + ?Sized>(stds: &[f64], momentum: &mut [f64], rng: &mut R) {
    assert_eq!(stds.len(), momentum.len());
    for (p, std) in momentum.iter_mut().zip(stds) {
        let draw: f64 = rng.sample(StandardNormal);
        *p = std * draw;
    }
}
