//! Metropolis-corrected Hamiltonian Monte Carlo proposals for
//! continuous-parameter Bayesian models.
//!
//! The crate implements one HMC proposal step: draw a momentum from the
//! current mass matrix, simulate the Hamiltonian dynamics with a leapfrog
//! integrator, and report the resulting log Hastings ratio to the MCMC
//! engine that owns the accept/reject decision. Sampling can run in a
//! transformed coordinate system (see [`Transform`]) and the mass matrix can
//! be held fixed or re-estimated from the model's Hessian (see
//! [`MassPreconditioner`]).
//!
//! The target density is supplied by the caller through capability traits: a
//! gradient (and optionally Hessian) evaluator plus a parameter store that
//! the position updates mutate in place. Everything is synchronous and
//! single-threaded per parameter block; independent blocks can run their own
//! operators on their own threads.

pub(crate) mod math;

mod eigen_matrix;
mod hmc;
mod leapfrog;
mod lkj;
mod mass_matrix;
mod model;
mod transform;

use thiserror::Error;

/// Errors raised by the proposal core.
///
/// [`HmcError::NumericInstability`] is recovered inside
/// [`HmcOperator::propose_step`] and reported to the caller as a rejecting
/// Hastings ratio. The remaining variants are configuration or usage errors
/// and propagate as hard failures.
#[derive(Error, Debug)]
pub enum HmcError {
    #[error("non-finite value in leapfrog update")]
    NumericInstability,
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, HmcError>;

pub use eigen_matrix::CompoundEigenMatrix;
pub use hmc::{HmcOperator, RuntimeOptions};
pub use leapfrog::{DefaultLeapfrog, InstabilityPolicy, LeapfrogEngine, TransformedLeapfrog};
pub use lkj::LkjTransform;
pub use mass_matrix::{FixedDiagMass, HessianDenseMass, HessianDiagMass, MassPreconditioner};
pub use model::{GradientProvider, HessianProvider, ParameterStore, VectorParameter};
pub use transform::{IdentityTransform, LogTransform, Transform};
