// Loss operators
//
// Each loss takes (prediction, target) and reduces to a one-element [1]
// tensor. Targets are data, not functions of the parameters, so backward
// returns `None` for them.
//
// KEY LOSSES:
//
// 1. Softmax-cross-entropy (logits [B, C], one-hot targets [B, C]):
//      loss = (1/B) Σ_rows Σ_j t_j · (lse(x) - x_j)
//    with lse evaluated as m + ln Σ exp(x_j - m), m = max_j x_j, so no
//    exp() ever sees a large positive argument. The gradient is the fused
//    form (softmax(x)·Σt - t) / B, which is (softmax(x) - t) / B for
//    one-hot or normalized soft rows; the softmax Jacobian is never built.
//
// 2. Binary-cross-entropy (probabilities, {0,1} targets):
//      loss = -(1/N) Σ y·ln p + (1-y)·ln(1-p)
//    Predictions are clamped to [ε, 1-ε] first, so a saturated sigmoid
//    output of exactly 0.0 or 1.0 yields a large but finite loss.
//
// 3. MSE: mean((p - t)²).
//
// 4. Hinge (targets in {-1, +1}): mean(max(0, m - t·p)).
//
// All reductions are means over every element. Every backward multiplies
// by the upstream gradient, which is a one-element tensor.

use crate::error::Result;
use crate::op::{expect_arity, BackwardContext, Operator};
use crate::tensor::Tensor;

/// Check (prediction, target) arity and shapes; return the element count.
fn check_pair(op: &'static str, inputs: &[&Tensor]) -> Result<usize> {
    expect_arity(op, inputs, 2)?;
    inputs[0].check_same_shape(inputs[1])?;
    let n = inputs[0].elem_count();
    if n == 0 {
        crate::bail!("{op}: loss over an empty batch");
    }
    Ok(n)
}

/// Numerically stable log-sum-exp of one row.
fn log_sum_exp(row: &[f64]) -> f64 {
    let m = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    m + row.iter().map(|&x| (x - m).exp()).sum::<f64>().ln()
}

// Softmax-cross-entropy

/// Mean softmax cross-entropy between logits and one-hot (or soft) targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxCrossEntropy;

impl SoftmaxCrossEntropy {
    fn rows(inputs: &[&Tensor]) -> Result<(usize, usize)> {
        check_pair("softmax_cross_entropy", inputs)?;
        inputs[0].shape().dims2()
    }
}

impl Operator for SoftmaxCrossEntropy {
    fn name(&self) -> &'static str {
        "softmax_cross_entropy"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        let (batch, classes) = Self::rows(inputs)?;
        let (logits, targets) = (inputs[0].as_slice(), inputs[1].as_slice());
        let mut total = 0.0;
        for r in 0..batch {
            let x = &logits[r * classes..(r + 1) * classes];
            let t = &targets[r * classes..(r + 1) * classes];
            let lse = log_sum_exp(x);
            total += x.iter().zip(t).map(|(&xj, &tj)| tj * (lse - xj)).sum::<f64>();
        }
        Ok(Tensor::scalar(total / batch as f64))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let (batch, classes) = Self::rows(ctx.inputs)?;
        let g = ctx.grad_output.item()?;
        let (logits, targets) = (ctx.inputs[0].as_slice(), ctx.inputs[1].as_slice());
        let scale = g / batch as f64;

        let mut dx = Vec::with_capacity(batch * classes);
        for r in 0..batch {
            let x = &logits[r * classes..(r + 1) * classes];
            let t = &targets[r * classes..(r + 1) * classes];
            let lse = log_sum_exp(x);
            // Rows that do not sum to 1 still get the exact derivative.
            let mass: f64 = t.iter().sum();
            dx.extend(
                x.iter()
                    .zip(t)
                    .map(|(&xj, &tj)| ((xj - lse).exp() * mass - tj) * scale),
            );
        }
        let dx = Tensor::from_vec(dx, ctx.inputs[0].shape().clone())?;
        Ok(vec![Some(dx), None])
    }
}

// Binary-cross-entropy

/// Mean binary cross-entropy on probabilities, with clamping.
#[derive(Debug, Clone, Copy)]
pub struct BinaryCrossEntropy {
    eps: f64,
}

impl Default for BinaryCrossEntropy {
    fn default() -> Self {
        BinaryCrossEntropy { eps: 1e-7 }
    }
}

impl BinaryCrossEntropy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom clamp width. `eps` must lie in (0, 0.5).
    pub fn with_eps(eps: f64) -> Result<Self> {
        if !(eps > 0.0 && eps < 0.5) {
            crate::bail!("binary_cross_entropy: eps must be in (0, 0.5), got {eps}");
        }
        Ok(BinaryCrossEntropy { eps })
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    fn clamp(&self, p: &Tensor) -> Tensor {
        let (lo, hi) = (self.eps, 1.0 - self.eps);
        let clamped = p.map(|x| x.clamp(lo, hi));
        let hits = p
            .as_slice()
            .iter()
            .filter(|&&x| x < lo || x > hi)
            .count();
        if hits > 0 {
            tracing::debug!(count = hits, eps = self.eps, "bce clamped predictions");
        }
        clamped
    }
}

impl Operator for BinaryCrossEntropy {
    fn name(&self) -> &'static str {
        "binary_cross_entropy"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        let n = check_pair(self.name(), inputs)?;
        let p = self.clamp(inputs[0]);
        let total: f64 = p
            .as_slice()
            .iter()
            .zip(inputs[1].as_slice())
            .map(|(&p, &y)| -(y * p.ln() + (1.0 - y) * (1.0 - p).ln()))
            .sum();
        Ok(Tensor::scalar(total / n as f64))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let n = check_pair(self.name(), ctx.inputs)?;
        let scale = ctx.grad_output.item()? / n as f64;
        let p = self.clamp(ctx.inputs[0]);
        let dp = p.zip_map(ctx.inputs[1], |p, y| (p - y) / (p * (1.0 - p)) * scale)?;
        Ok(vec![Some(dp), None])
    }
}

// Mean squared error

/// Mean of squared differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl Operator for MeanSquaredError {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        let n = check_pair(self.name(), inputs)?;
        let total: f64 = inputs[0]
            .as_slice()
            .iter()
            .zip(inputs[1].as_slice())
            .map(|(&p, &t)| (p - t) * (p - t))
            .sum();
        Ok(Tensor::scalar(total / n as f64))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let n = check_pair(self.name(), ctx.inputs)?;
        let scale = 2.0 * ctx.grad_output.item()? / n as f64;
        let dp = ctx.inputs[0].zip_map(ctx.inputs[1], |p, t| (p - t) * scale)?;
        Ok(vec![Some(dp), None])
    }
}

// Hinge

/// Mean hinge loss for {-1, +1} targets.
#[derive(Debug, Clone, Copy)]
pub struct Hinge {
    margin: f64,
}

impl Default for Hinge {
    fn default() -> Self {
        Hinge { margin: 1.0 }
    }
}

impl Hinge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margin(margin: f64) -> Self {
        Hinge { margin }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }
}

impl Operator for Hinge {
    fn name(&self) -> &'static str {
        "hinge"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        let n = check_pair(self.name(), inputs)?;
        let m = self.margin;
        let total: f64 = inputs[0]
            .as_slice()
            .iter()
            .zip(inputs[1].as_slice())
            .map(|(&p, &t)| (m - t * p).max(0.0))
            .sum();
        Ok(Tensor::scalar(total / n as f64))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let n = check_pair(self.name(), ctx.inputs)?;
        let scale = ctx.grad_output.item()? / n as f64;
        let m = self.margin;
        let dp = ctx.inputs[0].zip_map(ctx.inputs[1], |p, t| {
            if m - t * p > 0.0 {
                -t * scale
            } else {
                0.0
            }
        })?;
        Ok(vec![Some(dp), None])
    }
}
