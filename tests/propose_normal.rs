//! End-to-end proposals on known targets.
//!
//! The operator returns only the kinetic and Jacobian part of the Metropolis
//! log ratio; adding the density difference across the trajectory gives the
//! full log acceptance ratio, which leapfrog keeps near zero at a well-tuned
//! step size.

use hmc_core::{
    DefaultLeapfrog, FixedDiagMass, GradientProvider, HmcOperator, InstabilityPolicy,
    LogTransform, ParameterStore, RuntimeOptions, TransformedLeapfrog, VectorParameter,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

struct StdNormal {
    parameter: VectorParameter,
}

impl StdNormal {
    fn new(values: Vec<f64>) -> Self {
        Self {
            parameter: VectorParameter::new(values),
        }
    }

    fn log_density(&self) -> f64 {
        -0.5 * self.parameter.as_slice().iter().map(|x| x * x).sum::<f64>()
    }
}

impl GradientProvider for StdNormal {
    fn dim(&self) -> usize {
        self.parameter.as_slice().len()
    }

    fn gradient_log_density(&mut self, gradient: &mut [f64]) {
        for (g, x) in gradient.iter_mut().zip(self.parameter.as_slice()) {
            *g = -x;
        }
    }
}

impl ParameterStore for StdNormal {
    fn values(&self) -> Vec<f64> {
        self.parameter.values()
    }

    fn set_value_quietly(&mut self, index: usize, value: f64) {
        self.parameter.set_value_quietly(index, value);
    }

    fn fire_changed(&mut self) {
        self.parameter.fire_changed();
    }
}

/// Standard normal in log coordinates, supported on the positive orthant.
struct LogNormal {
    parameter: VectorParameter,
}

impl LogNormal {
    fn new(values: Vec<f64>) -> Self {
        assert!(values.iter().all(|v| *v > 0.0));
        Self {
            parameter: VectorParameter::new(values),
        }
    }

    fn log_density(&self) -> f64 {
        -0.5
            * self
                .parameter
                .as_slice()
                .iter()
                .map(|x| x.ln().powi(2))
                .sum::<f64>()
    }
}

impl GradientProvider for LogNormal {
    fn dim(&self) -> usize {
        self.parameter.as_slice().len()
    }

    fn gradient_log_density(&mut self, gradient: &mut [f64]) {
        for (g, x) in gradient.iter_mut().zip(self.parameter.as_slice()) {
            *g = -x.ln() / x;
        }
    }
}

impl ParameterStore for LogNormal {
    fn values(&self) -> Vec<f64> {
        self.parameter.values()
    }

    fn set_value_quietly(&mut self, index: usize, value: f64) {
        self.parameter.set_value_quietly(index, value);
    }

    fn fire_changed(&mut self) {
        self.parameter.fire_changed();
    }
}

#[test]
fn acceptance_ratio_is_near_zero_on_a_normal_target() {
    let mut operator = HmcOperator::new(
        StdNormal::new(vec![0.2, -0.9, 1.4, 0.0]),
        DefaultLeapfrog::new(InstabilityPolicy::Reject),
        FixedDiagMass::new(4, 1.0),
        RuntimeOptions::default(),
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..20 {
        let logp_before = operator.model().log_density();
        let ratio = operator.propose_step(&mut rng).unwrap();
        let logp_after = operator.model().log_density();

        let log_acceptance = ratio + (logp_after - logp_before);
        assert!(
            log_acceptance.abs() < 0.05,
            "energy drift {log_acceptance} too large"
        );
    }
}

#[test]
fn acceptance_ratio_is_near_zero_under_a_log_transform() {
    let mut operator = HmcOperator::new(
        LogNormal::new(vec![0.5, 1.0, 3.0]),
        TransformedLeapfrog::new(LogTransform, InstabilityPolicy::Reject),
        FixedDiagMass::new(3, 1.0),
        RuntimeOptions::default(),
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..20 {
        let logp_before = operator.model().log_density();
        let ratio = operator.propose_step(&mut rng).unwrap();
        let logp_after = operator.model().log_density();

        // Positions stay on the positive orthant throughout.
        assert!(operator.model().parameter.as_slice().iter().all(|v| *v > 0.0));

        let log_acceptance = ratio + (logp_after - logp_before);
        assert!(
            log_acceptance.abs() < 0.05,
            "energy drift {log_acceptance} too large"
        );
    }
}

#[test]
fn jittered_trajectories_stay_finite() {
    let options = RuntimeOptions {
        random_step_count_fraction: 0.5,
        ..RuntimeOptions::default()
    };
    let mut operator = HmcOperator::new(
        StdNormal::new(vec![1.0, -1.0]),
        DefaultLeapfrog::new(InstabilityPolicy::Reject),
        FixedDiagMass::new(2, 1.0),
        options,
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..50 {
        let ratio = operator.propose_step(&mut rng).unwrap();
        assert!(ratio.is_finite());
        assert!(operator.model().values().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn step_size_tuning_happens_on_the_log_scale() {
    let mut operator = HmcOperator::new(
        StdNormal::new(vec![0.0]),
        DefaultLeapfrog::new(InstabilityPolicy::Reject),
        FixedDiagMass::new(1, 1.0),
        RuntimeOptions::default(),
    )
    .unwrap();

    let shrunk = operator.log_step_size() - 0.5;
    operator.set_log_step_size(shrunk);
    assert!((operator.log_step_size() - shrunk).abs() < 1e-12);
    assert!(operator.options().step_size > 0.0);
}
