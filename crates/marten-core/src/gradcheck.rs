// Gradient checking: analytic backward vs central finite differences
//
// The output of an operator may be any shape, so the check works on the
// scalar projection
//
//   f(inputs) = Σ r ⊙ op.forward(inputs)
//
// where r is a fixed random tensor. The analytic gradient of f is exactly
// op.backward() seeded with grad_output = r; the numerical gradient is
//
//   df/dx_i ≈ (f(x + ε e_i) - f(x - ε e_i)) / 2ε
//
// for every element i of every input that backward says is differentiable
// (inputs for which backward returns `None`, e.g. loss targets, are
// skipped).
//
// An element passes when |analytic - numeric| <= atol + rtol · max(|a|, |n|),
// the same rule as numpy's allclose. Inputs should stay away from kinks
// (ReLU at 0, the hinge margin, the BCE clamp) where the derivative is not
// defined and no finite difference can agree with it.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::op::{BackwardContext, Operator};
use crate::tensor::Tensor;

/// Tolerances and step size for [`check_gradients`].
#[derive(Debug, Clone)]
pub struct GradCheckConfig {
    /// Finite-difference step.
    pub eps: f64,
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Seed for the random output projection.
    pub seed: u64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            eps: 1e-6,
            rtol: 1e-4,
            atol: 1e-6,
            seed: 0,
        }
    }
}

impl GradCheckConfig {
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    pub fn atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Outcome of a gradient check.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    /// Worst |a - n| / max(|a|, |n|) over elements where either is non-zero.
    pub max_rel_error: f64,
    /// Worst |a - n|.
    pub max_abs_error: f64,
    /// Number of input elements compared.
    pub checked: usize,
    /// True if every element was within tolerance.
    pub passed: bool,
}

fn projected(op: &dyn Operator, inputs: &[Tensor], r: &Tensor) -> Result<f64> {
    let refs: Vec<&Tensor> = inputs.iter().collect();
    let y = op.forward(&refs)?;
    Ok(y.mul(r)?.sum_all())
}

/// Compare `op`'s analytic gradients with central differences at `inputs`.
///
/// Fails only if the operator itself fails (bad shapes, wrong number of
/// gradients); a numerical disagreement is reported through
/// [`GradCheckReport::passed`].
pub fn check_gradients(
    op: &dyn Operator,
    inputs: &[Tensor],
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    let refs: Vec<&Tensor> = inputs.iter().collect();
    let output = op.forward(&refs)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let r = Tensor::random_normal(output.shape().clone(), &mut rng)?;

    let analytic = op.backward(&BackwardContext {
        inputs: &refs,
        output: &output,
        grad_output: &r,
    })?;
    if analytic.len() != inputs.len() {
        return Err(Error::msg(format!(
            "operator {} returned {} gradients for {} inputs",
            op.name(),
            analytic.len(),
            inputs.len()
        )));
    }

    let mut report = GradCheckReport {
        max_rel_error: 0.0,
        max_abs_error: 0.0,
        checked: 0,
        passed: true,
    };
    let mut probe = inputs.to_vec();

    for (k, grad) in analytic.iter().enumerate() {
        let grad = match grad {
            Some(g) => g,
            None => continue,
        };
        grad.check_same_shape(&inputs[k])?;

        for i in 0..inputs[k].elem_count() {
            let x = inputs[k].as_slice()[i];
            probe[k].as_mut_slice()[i] = x + config.eps;
            let plus = projected(op, &probe, &r)?;
            probe[k].as_mut_slice()[i] = x - config.eps;
            let minus = projected(op, &probe, &r)?;
            probe[k].as_mut_slice()[i] = x;

            let numeric = (plus - minus) / (2.0 * config.eps);
            let a = grad.as_slice()[i];
            let abs = (a - numeric).abs();
            let scale = a.abs().max(numeric.abs());

            report.checked += 1;
            report.max_abs_error = report.max_abs_error.max(abs);
            if scale > 0.0 {
                report.max_rel_error = report.max_rel_error.max(abs / scale);
            }
            if abs > config.atol + config.rtol * scale {
                tracing::debug!(
                    op = op.name(),
                    input = k,
                    element = i,
                    analytic = a,
                    numeric,
                    "gradient mismatch"
                );
                report.passed = false;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Mul, Relu};

    /// Deliberately wrong backward: reports twice the true gradient.
    #[derive(Debug)]
    struct DoubledRelu;

    impl Operator for DoubledRelu {
        fn name(&self) -> &'static str {
            "doubled_relu"
        }

        fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
            Relu.forward(inputs)
        }

        fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
            let grads = Relu.backward(ctx)?;
            Ok(grads.into_iter().map(|g| g.map(|t| t.scale(2.0))).collect())
        }
    }

    #[test]
    fn test_correct_operator_passes() -> Result<()> {
        let a = Tensor::from_vec(vec![0.5, -1.5, 2.0], 3)?;
        let b = Tensor::from_vec(vec![3.0, 0.25, -1.0], 3)?;
        let report = check_gradients(&Mul, &[a, b], &GradCheckConfig::default())?;
        assert!(report.passed, "{report:?}");
        assert_eq!(report.checked, 6);
        Ok(())
    }

    #[test]
    fn test_wrong_backward_is_caught() -> Result<()> {
        let x = Tensor::from_vec(vec![0.5, -1.5, 2.0], 3)?;
        let report = check_gradients(&DoubledRelu, &[x], &GradCheckConfig::default())?;
        assert!(!report.passed);
        assert!(report.max_rel_error > 0.4);
        Ok(())
    }
}
