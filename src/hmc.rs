//! The Hamiltonian Monte Carlo proposal operator.
//!
//! Each proposal draws a momentum, runs a leapfrog trajectory, and returns
//! the log Hastings ratio `initial_energy - final_energy`, where the energy
//! is the kinetic term plus the engine's Jacobian correction. The embedding
//! engine owns the density ratio and the accept/reject decision; a
//! trajectory that goes numerically unstable returns negative infinity so
//! the proposal is refused without killing the chain.

use rand::Rng;

use crate::leapfrog::LeapfrogEngine;
use crate::mass_matrix::MassPreconditioner;
use crate::math::scaled_dot_product;
use crate::model::{GradientProvider, ParameterStore};
use crate::{HmcError, Result};

/// Tuning knobs for the operator.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Leapfrog step size.
    pub step_size: f64,
    /// Base number of leapfrog steps per trajectory.
    pub n_steps: usize,
    /// Fraction by which the step count is jittered uniformly around its
    /// base, `0.0` for none.
    pub random_step_count_fraction: f64,
    /// Refresh the preconditioner every this many proposals, `0` for never.
    pub preconditioning_update_frequency: u64,
    /// Acceptance rate an outer step-size tuner should aim for.
    pub target_acceptance_probability: f64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            n_steps: 10,
            random_step_count_fraction: 0.0,
            preconditioning_update_frequency: 0,
            target_acceptance_probability: 0.8,
        }
    }
}

pub struct HmcOperator<M, E, P> {
    model: M,
    engine: E,
    preconditioner: P,
    options: RuntimeOptions,
    proposals: u64,
}

impl<M, E, P> HmcOperator<M, E, P>
where
    M: GradientProvider + ParameterStore,
    E: LeapfrogEngine<M>,
    P: MassPreconditioner<M>,
{
    pub fn new(model: M, engine: E, preconditioner: P, options: RuntimeOptions) -> Result<Self> {
        assert!(options.step_size > 0.0);
        assert!(options.n_steps >= 1);
        let dim = model.dim();
        let mass_dim = preconditioner.mass_inverse().nrows();
        if mass_dim != dim {
            return Err(HmcError::DimensionMismatch {
                expected: dim,
                actual: mass_dim,
            });
        }
        Ok(Self {
            model,
            engine,
            preconditioner,
            options,
            proposals: 0,
        })
    }

    /// Run one proposal and return its log Hastings ratio.
    ///
    /// The model is left at the proposed position; on a rejected ratio of
    /// negative infinity the caller restores the previous state as for any
    /// refused proposal.
    pub fn propose_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        self.proposals += 1;
        match self.refresh_and_leapfrog(rng) {
            Err(HmcError::NumericInstability) => Ok(f64::NEG_INFINITY),
            other => other,
        }
    }

    /// An unstable preconditioner refresh rejects the proposal like any
    /// other instability; the previous mass matrices stay in effect.
    fn refresh_and_leapfrog<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        let frequency = self.options.preconditioning_update_frequency;
        if frequency > 0 && self.proposals % frequency == 0 {
            self.preconditioner.update(&mut self.model)?;
        }
        self.leapfrog(rng)
    }

    fn leapfrog<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        let dim = self.model.dim();
        let mut position = self.engine.initial_position(&self.model);
        let mut momentum = vec![0.0; dim];
        self.preconditioner.randomize_momentum(&mut momentum, rng);

        let initial_energy = scaled_dot_product(self.preconditioner.mass_inverse(), &momentum)
            + self.engine.log_jacobian();

        let n_steps = self.number_of_steps(rng);
        self.integrate(&mut position, &mut momentum, n_steps)?;

        let final_energy = scaled_dot_product(self.preconditioner.mass_inverse(), &momentum)
            + self.engine.log_jacobian();
        Ok(initial_energy - final_energy)
    }

    /// Half momentum step, `n_steps` position steps with full momentum
    /// steps between them, half momentum step.
    fn integrate(
        &mut self,
        position: &mut [f64],
        momentum: &mut [f64],
        n_steps: usize,
    ) -> Result<()> {
        let step = self.options.step_size;
        let mut gradient = vec![0.0; self.model.dim()];

        self.model.gradient_log_density(&mut gradient);
        self.engine
            .update_momentum(position, momentum, &gradient, 0.5 * step)?;

        for i in 0..n_steps {
            self.engine.update_position(
                &mut self.model,
                position,
                momentum,
                self.preconditioner.mass_inverse(),
                step,
            );
            if i < n_steps - 1 {
                self.model.gradient_log_density(&mut gradient);
                self.engine
                    .update_momentum(position, momentum, &gradient, step)?;
            }
        }

        self.model.gradient_log_density(&mut gradient);
        self.engine
            .update_momentum(position, momentum, &gradient, 0.5 * step)?;
        Ok(())
    }

    fn number_of_steps<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let base = self.options.n_steps;
        let fraction = self.options.random_step_count_fraction;
        if fraction <= 0.0 {
            return base;
        }
        let draw: f64 = rng.random();
        let jittered = (base as f64 * (1.0 + fraction * (draw - 0.5))).round() as i64;
        jittered.max(1) as usize
    }

    /// Step size on the log scale, for outer tuners that adapt there.
    pub fn log_step_size(&self) -> f64 {
        self.options.step_size.ln()
    }

    pub fn set_log_step_size(&mut self, value: f64) {
        self.options.step_size = value.exp();
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }
}
