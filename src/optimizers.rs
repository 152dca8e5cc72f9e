use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// `param_id` keys any per-parameter state, so it must be stable across steps.
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn name(&self) -> &'static str;
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, AdamState>,
}

struct AdamState {
    t: i32,
    m: Array2<f64>,
    v: Array2<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam { learning_rate, beta1, beta2, epsilon, state: HashMap::new() }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self.state.entry(param_id.to_string()).or_insert_with(|| AdamState {
            t: 0,
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
        });
        state.t += 1;

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * &(gradient * gradient);

        let m_hat = &state.m / (1.0 - self.beta1.powi(state.t));
        let v_hat = &state.v / (1.0 - self.beta2.powi(state.t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}

/// RMSprop: v_t = ρv_{t-1} + (1-ρ)g_t²
///          θ_t = θ_{t-1} - η * g_t / (√v_t + ε)
pub struct RMSprop {
    learning_rate: f64,
    rho: f64,
    epsilon: f64,
    v: HashMap<String, Array2<f64>>,
}

impl RMSprop {
    /// ρ = 0.9, ε = 1e-6
    pub fn new(learning_rate: f64) -> Self {
        RMSprop::with_params(learning_rate, 0.9, 1e-6)
    }

    pub fn with_params(learning_rate: f64, rho: f64, epsilon: f64) -> Self {
        RMSprop { learning_rate, rho, epsilon, v: HashMap::new() }
    }
}

impl Optimizer for RMSprop {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let v_t = self.v.entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));

        *v_t = self.rho * &*v_t + (1.0 - self.rho) * &(gradient * gradient);

        let update = self.learning_rate * gradient / (v_t.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn name(&self) -> &'static str {
        "rmsprop"
    }
}

/// Optimizer selection as it appears in the configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    Sgd { learning_rate: f64 },
    Adam { learning_rate: f64 },
    Rmsprop { learning_rate: f64 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Rmsprop { learning_rate: 0.001 }
    }
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f64 {
        match *self {
            OptimizerConfig::Sgd { learning_rate }
            | OptimizerConfig::Adam { learning_rate }
            | OptimizerConfig::Rmsprop { learning_rate } => learning_rate,
        }
    }

    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd { learning_rate } => Box::new(SGD::new(learning_rate)),
            OptimizerConfig::Adam { learning_rate } => Box::new(Adam::new(learning_rate)),
            OptimizerConfig::Rmsprop { learning_rate } => Box::new(RMSprop::new(learning_rate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - &(0.1 * &gradient);
        assert!((param - expected).mapv(f64::abs).sum() < 1e-10);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut optimizer = Adam::new(0.001);
        let mut param = arr2(&[[1.0, 2.0]]);
        let gradient = arr2(&[[0.5, -3.0]]);

        optimizer.update("p", &mut param, &gradient);

        // Bias correction makes the first step ±lr regardless of gradient magnitude
        assert!((param[[0, 0]] - 0.999).abs() < 1e-6);
        assert!((param[[0, 1]] - 2.001).abs() < 1e-6);
    }

    #[test]
    fn test_adam_state_is_per_parameter() {
        let mut optimizer = Adam::new(0.001);
        let mut a = arr2(&[[1.0]]);
        let mut b = arr2(&[[1.0]]);
        let gradient = arr2(&[[1.0]]);

        optimizer.update("a", &mut a, &gradient);
        optimizer.update("b", &mut b, &gradient);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rmsprop_optimizer() {
        let mut optimizer = RMSprop::new(0.01);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        assert!((&param - &original_param).mapv(f64::abs).sum() > 1e-10);
        assert!(param.iter().zip(original_param.iter()).all(|(p, o)| p < o));
    }

    #[test]
    fn test_config_builds_named_optimizer() {
        assert_eq!(OptimizerConfig::default().build().name(), "rmsprop");
        let adam = OptimizerConfig::Adam { learning_rate: 0.01 };
        assert_eq!(adam.build().name(), "adam");
        assert_eq!(adam.learning_rate(), 0.01);
    }
}
