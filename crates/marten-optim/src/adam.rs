// Adam — Adaptive Moment Estimation
//
// Keeps two running averages per parameter element:
//
//   m ← β1·m + (1-β1)·g          first moment (mean of gradients)
//   v ← β2·v + (1-β2)·g²         second moment (uncentered variance)
//
// Both start at zero, which biases them toward zero early on. The bias
// correction divides by (1 - βᵗ) where t counts steps taken:
//
//   m̂ = m / (1 - β1ᵗ)     v̂ = v / (1 - β2ᵗ)
//   θ ← θ - lr · m̂ / (√v̂ + ε)
//
// With weight_decay > 0 the L2 term is folded into the gradient before the
// moment updates (g ← g + λθ), i.e. classic Adam with L2 regularization,
// not decoupled AdamW.

use marten_core::{unique_parameters, Error, Parameter, Result, Tensor};

use crate::optimizer::Optimizer;

/// Hyperparameters for [`Adam`].
#[derive(Debug, Clone)]
pub struct AdamConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamConfig {
    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn beta1(mut self, beta1: f64) -> Self {
        self.beta1 = beta1;
        self
    }

    pub fn beta2(mut self, beta2: f64) -> Self {
        self.beta2 = beta2;
        self
    }

    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::msg(format!("Adam: {name} must be in [0, 1), got {beta}")));
            }
        }
        if self.eps <= 0.0 {
            return Err(Error::msg(format!("Adam: eps must be positive, got {}", self.eps)));
        }
        Ok(())
    }
}

/// Per-parameter moment buffers, allocated on the first gradient.
#[derive(Debug, Clone)]
struct Moments {
    m: Tensor,
    v: Tensor,
}

/// The Adam optimizer.
pub struct Adam {
    params: Vec<Parameter>,
    config: AdamConfig,
    state: Vec<Option<Moments>>,
    t: u64,
}

impl Adam {
    /// Adam with default betas (0.9, 0.999) and eps 1e-8.
    pub fn new(params: Vec<Parameter>, lr: f64) -> Result<Self> {
        Self::with_config(params, AdamConfig::default().lr(lr))
    }

    pub fn with_config(params: Vec<Parameter>, config: AdamConfig) -> Result<Self> {
        config.validate()?;
        let params = unique_parameters(params);
        let state = vec![None; params.len()];
        Ok(Adam {
            params,
            config,
            state,
            t: 0,
        })
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Number of steps taken so far.
    pub fn step_count(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self) -> Result<()> {
        self.t += 1;
        let AdamConfig {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.config;
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let m_hat_scale = 1.0 / (1.0 - beta1.powi(t));
        let v_hat_scale = 1.0 / (1.0 - beta2.powi(t));

        for (param, state) in self.params.iter().zip(self.state.iter_mut()) {
            let mut node = param.node_mut();
            let (value, grad) = node.value_and_grad_mut();
            let grad = match grad {
                Some(g) => g,
                None => continue,
            };

            let mut g = grad.clone();
            if weight_decay != 0.0 {
                g.axpy(weight_decay, value)?;
            }
            let moments = state.get_or_insert_with(|| Moments {
                m: g.zeros_like(),
                v: g.zeros_like(),
            });

            let gs = g.as_slice();
            let m = moments.m.as_mut_slice();
            let v = moments.v.as_mut_slice();
            let theta = value.as_mut_slice();
            for j in 0..gs.len() {
                m[j] = beta1 * m[j] + (1.0 - beta1) * gs[j];
                v[j] = beta2 * v[j] + (1.0 - beta2) * gs[j] * gs[j];
                let m_hat = m[j] * m_hat_scale;
                let v_hat = v[j] * v_hat_scale;
                theta[j] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        }
        tracing::trace!(step = self.t, lr, "adam step");
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
    }

    fn params(&self) -> &[Parameter] {
        &self.params
    }
}
