//! Position and momentum updates for the leapfrog integrator, with and
//! without a coordinate transform between the model and the sampler.

use faer::MatRef;

use crate::math::{axpy, mat_vec};
use crate::model::ParameterStore;
use crate::transform::Transform;
use crate::{HmcError, Result};

/// What to do when a momentum component goes non-finite mid-trajectory.
///
/// All three policies leave the chain alive; `Reject` and `Warn` abort the
/// trajectory so the proposal is refused, `Ignore` lets the bad value
/// propagate (useful only when a wrapper handles it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstabilityPolicy {
    Reject,
    Warn,
    Ignore,
}

impl InstabilityPolicy {
    pub(crate) fn check(self, value: f64) -> Result<()> {
        if value.is_finite() {
            return Ok(());
        }
        match self {
            InstabilityPolicy::Reject => Err(HmcError::NumericInstability),
            InstabilityPolicy::Warn => {
                log::warn!("non-finite momentum component {value} in leapfrog update");
                Err(HmcError::NumericInstability)
            }
            InstabilityPolicy::Ignore => Ok(()),
        }
    }
}

/// One integrator step split into its two halves, so the operator can
/// interleave them in the usual half/full/half pattern.
///
/// `initial_position` must run once per trajectory before any update; the
/// transformed engine caches the model-space values it saw there.
pub trait LeapfrogEngine<M: ParameterStore> {
    /// Position in sampling coordinates at the start of a trajectory.
    fn initial_position(&mut self, model: &M) -> Vec<f64>;

    /// Jacobian correction added to the energy at the current position.
    fn log_jacobian(&self) -> f64;

    /// `p += scaled_step * gradient`, checking each component. `gradient`
    /// is the model-space gradient; an engine that integrates in other
    /// coordinates transports it first.
    fn update_momentum(
        &self,
        position: &[f64],
        momentum: &mut [f64],
        gradient: &[f64],
        scaled_step: f64,
    ) -> Result<()>;

    /// `q += scaled_step * M^{-1} p`, then push the new position into the
    /// model.
    fn update_position(
        &mut self,
        model: &mut M,
        position: &mut [f64],
        momentum: &[f64],
        mass_inverse: MatRef<'_, f64>,
        scaled_step: f64,
    );
}

/// Engine for parameters sampled in their native space.
pub struct DefaultLeapfrog {
    policy: InstabilityPolicy,
}

impl DefaultLeapfrog {
    pub fn new(policy: InstabilityPolicy) -> Self {
        Self { policy }
    }
}

impl<M: ParameterStore> LeapfrogEngine<M> for DefaultLeapfrog {
    fn initial_position(&mut self, model: &M) -> Vec<f64> {
        model.values()
    }

    fn log_jacobian(&self) -> f64 {
        0.0
    }

    fn update_momentum(
        &self,
        _position: &[f64],
        momentum: &mut [f64],
        gradient: &[f64],
        scaled_step: f64,
    ) -> Result<()> {
        axpy(gradient, momentum, scaled_step);
        for p in momentum.iter() {
            self.policy.check(*p)?;
        }
        Ok(())
    }

    fn update_position(
        &mut self,
        model: &mut M,
        position: &mut [f64],
        momentum: &[f64],
        mass_inverse: MatRef<'_, f64>,
        scaled_step: f64,
    ) {
        let mut velocity = vec![0.0; momentum.len()];
        mat_vec(mass_inverse, momentum, &mut velocity);
        axpy(&velocity, position, scaled_step);
        set_parameter(model, position);
    }
}

/// Engine that integrates in transformed coordinates while the model stays
/// in its native ones.
pub struct TransformedLeapfrog<T: Transform> {
    transform: T,
    policy: InstabilityPolicy,
    untransformed: Option<Vec<f64>>,
}

impl<T: Transform> TransformedLeapfrog<T> {
    pub fn new(transform: T, policy: InstabilityPolicy) -> Self {
        Self {
            transform,
            policy,
            untransformed: None,
        }
    }
}

impl<T: Transform, M: ParameterStore> LeapfrogEngine<M> for TransformedLeapfrog<T> {
    fn initial_position(&mut self, model: &M) -> Vec<f64> {
        let values = model.values();
        let position = self.transform.forward(&values);
        self.untransformed = Some(values);
        position
    }

    fn log_jacobian(&self) -> f64 {
        let values = self
            .untransformed
            .as_ref()
            .expect("initial_position must run before log_jacobian");
        self.transform.log_jacobian(values)
    }

    fn update_momentum(
        &self,
        _position: &[f64],
        momentum: &mut [f64],
        gradient: &[f64],
        scaled_step: f64,
    ) -> Result<()> {
        let values = self
            .untransformed
            .as_ref()
            .expect("initial_position must run before update_momentum");
        let transported = self.transform.transport_gradient(gradient, values)?;
        axpy(&transported, momentum, scaled_step);
        for p in momentum.iter() {
            self.policy.check(*p)?;
        }
        Ok(())
    }

    fn update_position(
        &mut self,
        model: &mut M,
        position: &mut [f64],
        momentum: &[f64],
        mass_inverse: MatRef<'_, f64>,
        scaled_step: f64,
    ) {
        let mut velocity = vec![0.0; momentum.len()];
        mat_vec(mass_inverse, momentum, &mut velocity);
        axpy(&velocity, position, scaled_step);
        let values = self.transform.inverse(position);
        set_parameter(model, &values);
        self.untransformed = Some(values);
    }
}

/// Quiet per-component writes followed by a single change notification.
fn set_parameter<M: ParameterStore>(model: &mut M, values: &[f64]) {
    for (index, value) in values.iter().enumerate() {
        model.set_value_quietly(index, *value);
    }
    model.fire_changed();
}
