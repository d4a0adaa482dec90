//! Coordinate transforms between the model's constrained space and the
//! unconstrained space the integrator moves in.

use crate::Result;

/// A bijection between model coordinates (constrained) and sampling
/// coordinates (unconstrained).
///
/// `log_jacobian` is evaluated at a *model* point and returns
/// `log |det d(sampling)/d(model)|`; the operator adds it to the energy on
/// both ends of a trajectory. `transport_gradient` takes a model-space
/// gradient at a model point and returns the full sampling-space gradient,
/// including the Jacobian correction term.
pub trait Transform {
    /// Model coordinates to sampling coordinates.
    fn forward(&self, values: &[f64]) -> Vec<f64>;

    /// Sampling coordinates back to model coordinates.
    fn inverse(&self, values: &[f64]) -> Vec<f64>;

    /// `log |det d(sampling)/d(model)|` at the model point `values`.
    fn log_jacobian(&self, values: &[f64]) -> f64;

    /// Push a model-space gradient at `values` forward to sampling space.
    ///
    /// Not every transform supports this; those that do not return
    /// [`HmcError::Unsupported`](crate::HmcError::Unsupported).
    fn transport_gradient(&self, gradient: &[f64], values: &[f64]) -> Result<Vec<f64>>;
}

/// The trivial transform for parameters sampled in their native space.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn forward(&self, values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    fn inverse(&self, values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    fn log_jacobian(&self, _values: &[f64]) -> f64 {
        0.0
    }

    fn transport_gradient(&self, gradient: &[f64], values: &[f64]) -> Result<Vec<f64>> {
        assert_eq!(gradient.len(), values.len());
        Ok(gradient.to_vec())
    }
}

/// Componentwise `ln` for positive parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransform;

impl Transform for LogTransform {
    fn forward(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| v.ln()).collect()
    }

    fn inverse(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| v.exp()).collect()
    }

    fn log_jacobian(&self, values: &[f64]) -> f64 {
        -values.iter().map(|v| v.ln()).sum::<f64>()
    }

    fn transport_gradient(&self, gradient: &[f64], values: &[f64]) -> Result<Vec<f64>> {
        assert_eq!(gradient.len(), values.len());
        Ok(gradient
            .iter()
            .zip(values)
            .map(|(g, v)| g * v + 1.0)
            .collect())
    }
}
