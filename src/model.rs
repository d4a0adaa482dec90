//! Capabilities the sampler consumes from the surrounding model.
//!
//! The proposal core never evaluates a density itself; it is handed a
//! gradient (and optionally Hessian) evaluator together with the parameter
//! store it mutates. All evaluators are called at the parameter's *current*
//! values, so a probe or position write must land in the store before the
//! next gradient call.

/// Gradient of the target log-density with respect to the sampled parameter.
pub trait GradientProvider {
    /// Dimension of the parameter block.
    fn dim(&self) -> usize;

    /// Write the gradient at the current parameter values into `gradient`.
    fn gradient_log_density(&mut self, gradient: &mut [f64]);
}

/// Second-order information required by the Hessian-adaptive
/// preconditioners.
pub trait HessianProvider: GradientProvider {
    /// Write the diagonal of the Hessian of the log-density into `hessian`.
    fn diagonal_hessian_log_density(&mut self, hessian: &mut [f64]);

    /// Log-likelihood at the current parameter values.
    fn log_likelihood(&mut self) -> f64;
}

/// The sampled parameter block.
///
/// Writes during a position update go through [`set_value_quietly`] for every
/// component, followed by exactly one [`fire_changed`]. Observers see one
/// batched notification per update, never one per component.
///
/// [`set_value_quietly`]: ParameterStore::set_value_quietly
/// [`fire_changed`]: ParameterStore::fire_changed
pub trait ParameterStore {
    /// Current values of the whole block.
    fn values(&self) -> Vec<f64>;

    /// Set one component without notifying observers.
    fn set_value_quietly(&mut self, index: usize, value: f64);

    /// Emit a single change notification covering all quiet writes since the
    /// last call.
    fn fire_changed(&mut self);
}

/// A plain in-memory parameter vector.
///
/// Counts batched change events instead of dispatching them; an embedding
/// engine that needs real observer wiring implements [`ParameterStore`] on
/// its own parameter type instead.
#[derive(Debug, Clone)]
pub struct VectorParameter {
    values: Vec<f64>,
    events: u64,
}

impl VectorParameter {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, events: 0 }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Number of change notifications fired so far.
    pub fn events(&self) -> u64 {
        self.events
    }
}

impl ParameterStore for VectorParameter {
    fn values(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn set_value_quietly(&mut self, index: usize, value: f64) {
        self.values[index] = value;
    }

    fn fire_changed(&mut self) {
        self.events += 1;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Independent standard normal target; gradient is `-x`.
    pub(crate) struct GaussianModel {
        pub(crate) parameter: VectorParameter,
    }

    impl GaussianModel {
        pub(crate) fn new(values: Vec<f64>) -> Self {
            Self {
                parameter: VectorParameter::new(values),
            }
        }

        pub(crate) fn log_density(&self) -> f64 {
            -0.5 * self.parameter.as_slice().iter().map(|x| x * x).sum::<f64>()
        }
    }

    impl GradientProvider for GaussianModel {
        fn dim(&self) -> usize {
            self.parameter.as_slice().len()
        }

        fn gradient_log_density(&mut self, gradient: &mut [f64]) {
            for (g, x) in gradient.iter_mut().zip(self.parameter.as_slice()) {
                *g = -x;
            }
        }
    }

    impl HessianProvider for GaussianModel {
        fn diagonal_hessian_log_density(&mut self, hessian: &mut [f64]) {
            hessian.fill(-1.0);
        }

        fn log_likelihood(&mut self) -> f64 {
            self.log_density()
        }
    }

    impl ParameterStore for GaussianModel {
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

    /// Positive-support target that is standard normal in log coordinates:
    /// `log p(x) = -0.5 * sum(ln(x)^2)`.
    pub(crate) struct LogNormalModel {
        pub(crate) parameter: VectorParameter,
    }

    impl LogNormalModel {
        pub(crate) fn new(values: Vec<f64>) -> Self {
            assert!(values.iter().all(|v| *v > 0.0));
            Self {
                parameter: VectorParameter::new(values),
            }
        }

        pub(crate) fn log_density(&self) -> f64 {
            -0.5
                * self
                    .parameter
                    .as_slice()
                    .iter()
                    .map(|x| x.ln().powi(2))
                    .sum::<f64>()
        }
    }

    impl GradientProvider for LogNormalModel {
        fn dim(&self) -> usize {
            self.parameter.as_slice().len()
        }

        fn gradient_log_density(&mut self, gradient: &mut [f64]) {
            for (g, x) in gradient.iter_mut().zip(self.parameter.as_slice()) {
                *g = -x.ln() / x;
            }
        }
    }

    impl HessianProvider for LogNormalModel {
        fn diagonal_hessian_log_density(&mut self, hessian: &mut [f64]) {
            for (h, x) in hessian.iter_mut().zip(self.parameter.as_slice()) {
                *h = (x.ln() - 1.0) / (x * x);
            }
        }

        fn log_likelihood(&mut self) -> f64 {
            self.log_density()
        }
    }

    impl ParameterStore for LogNormalModel {
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
}
