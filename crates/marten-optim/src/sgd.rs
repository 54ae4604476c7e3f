// SGD — Stochastic Gradient Descent, with optional momentum
//
// Update rule, per parameter θ with gradient g:
//
//   g ← g + weight_decay · θ                 (L2 penalty, if set)
//   v ← momentum · v + g                     (if momentum > 0)
//   g ← g + momentum · v   (Nesterov)   or   g ← v
//   θ ← θ - lr · g
//
// The velocity buffer v starts at zero and is allocated for a parameter
// the first time it receives a gradient.

use marten_core::{unique_parameters, Error, Parameter, Result, Tensor};

use crate::optimizer::Optimizer;

/// Hyperparameters for [`SGD`].
#[derive(Debug, Clone)]
pub struct SgdConfig {
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub nesterov: bool,
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig {
            lr: 0.01,
            momentum: 0.0,
            weight_decay: 0.0,
            nesterov: false,
        }
    }
}

impl SgdConfig {
    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn nesterov(mut self, nesterov: bool) -> Self {
        self.nesterov = nesterov;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.nesterov && self.momentum <= 0.0 {
            return Err(Error::msg("SGD: Nesterov momentum requires momentum > 0"));
        }
        if self.momentum < 0.0 || self.weight_decay < 0.0 {
            return Err(Error::msg(format!(
                "SGD: momentum ({}) and weight_decay ({}) must be non-negative",
                self.momentum, self.weight_decay
            )));
        }
        Ok(())
    }
}

/// Stochastic gradient descent.
pub struct SGD {
    params: Vec<Parameter>,
    config: SgdConfig,
    velocity: Vec<Option<Tensor>>,
}

impl SGD {
    /// Create an SGD optimizer.
    ///
    /// # Arguments
    /// - `params`: parameters to optimize
    /// - `lr`: learning rate (typical: 0.01 to 0.1)
    /// - `momentum`: momentum coefficient (0.9, or 0.0 for none)
    /// - `weight_decay`: L2 penalty (1e-4, or 0.0 for none)
    pub fn new(params: Vec<Parameter>, lr: f64, momentum: f64, weight_decay: f64) -> Result<Self> {
        Self::with_config(
            params,
            SgdConfig::default()
                .lr(lr)
                .momentum(momentum)
                .weight_decay(weight_decay),
        )
    }

    pub fn with_config(params: Vec<Parameter>, config: SgdConfig) -> Result<Self> {
        config.validate()?;
        let params = unique_parameters(params);
        let velocity = vec![None; params.len()];
        Ok(SGD {
            params,
            config,
            velocity,
        })
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }
}

impl Optimizer for SGD {
    fn step(&mut self) -> Result<()> {
        let SgdConfig {
            lr,
            momentum,
            weight_decay,
            nesterov,
        } = self.config;

        for (param, velocity) in self.params.iter().zip(self.velocity.iter_mut()) {
            let mut node = param.node_mut();
            let (value, grad) = node.value_and_grad_mut();
            let grad = match grad {
                Some(g) => g,
                None => continue,
            };

            let mut d = grad.clone();
            if weight_decay != 0.0 {
                d.axpy(weight_decay, value)?;
            }
            if momentum != 0.0 {
                let v = match velocity.take() {
                    Some(v) => {
                        let mut v = v.scale(momentum);
                        v.add_assign(&d)?;
                        v
                    }
                    None => d.clone(),
                };
                if nesterov {
                    d.axpy(momentum, &v)?;
                } else {
                    d = v.clone();
                }
                *velocity = Some(v);
            }
            value.axpy(-lr, &d)?;
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn set_grad(p: &Parameter, g: &[f64]) {
        p.zero_grad();
        if let Some(mut grad) = p.grad_mut() {
            grad.as_mut_slice().copy_from_slice(g);
        }
    }

    #[test]
    fn test_sgd_plain_step() -> Result<()> {
        let w = Parameter::new(Tensor::from_vec(vec![1.0, 2.0], 2)?);
        let mut opt = SGD::new(vec![w.clone()], 0.1, 0.0, 0.0)?;
        set_grad(&w, &[1.0, 1.0]);
        opt.step()?;
        let v = w.value().to_vec();
        assert_abs_diff_eq!(v[0], 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 1.9, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_sgd_repeated_param_updated_once() -> Result<()> {
        let w = Parameter::new(Tensor::scalar(1.0));
        let mut opt = SGD::new(vec![w.clone(), w.clone()], 0.1, 0.9, 0.0)?;
        assert_eq!(opt.params().len(), 1);
        set_grad(&w, &[2.0]);
        opt.step()?;
        assert_abs_diff_eq!(w.value().item()?, 0.8, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_sgd_momentum() -> Result<()> {
        let w = Parameter::new(Tensor::scalar(1.0));
        let mut opt = SGD::new(vec![w.clone()], 0.1, 0.9, 0.0)?;

        // Step 1: v = 1.0, w = 1.0 - 0.1 = 0.9
        set_grad(&w, &[1.0]);
        opt.step()?;
        assert_abs_diff_eq!(w.value().item()?, 0.9, epsilon = 1e-12);

        // Step 2: v = 0.9 + 1.0 = 1.9, w = 0.9 - 0.19 = 0.71
        set_grad(&w, &[1.0]);
        opt.step()?;
        assert_abs_diff_eq!(w.value().item()?, 0.71, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_sgd_nesterov_and_weight_decay() -> Result<()> {
        let w = Parameter::new(Tensor::scalar(1.0));
        let config = SgdConfig::default()
            .lr(0.1)
            .momentum(0.5)
            .weight_decay(1.0)
            .nesterov(true);
        let mut opt = SGD::with_config(vec![w.clone()], config)?;

        // d = 1 + 1·1 = 2, v = 2, d = 2 + 0.5·2 = 3, w = 1 - 0.3 = 0.7
        set_grad(&w, &[1.0]);
        opt.step()?;
        assert_abs_diff_eq!(w.value().item()?, 0.7, epsilon = 1e-12);

        assert!(SGD::with_config(vec![], SgdConfig::default().nesterov(true)).is_err());
        Ok(())
    }

    #[test]
    fn test_sgd_skips_params_without_grad() -> Result<()> {
        let w1 = Parameter::new(Tensor::scalar(1.0));
        let w2 = Parameter::new(Tensor::scalar(2.0));
        let mut opt = SGD::new(vec![w1.clone(), w2.clone()], 0.1, 0.0, 0.0)?;
        set_grad(&w1, &[1.0]);
        opt.step()?;
        assert_abs_diff_eq!(w1.value().item()?, 0.9, epsilon = 1e-12);
        assert_eq!(w2.value().item()?, 2.0);

        opt.set_learning_rate(0.5);
        assert_eq!(opt.learning_rate(), 0.5);
        opt.zero_grad();
        assert_eq!(w2.grad().map(|g| g.to_vec()), Some(vec![0.0]));
        Ok(())
    }
}
