// Element-wise activations
//
//   ReLU:     y = max(0, x)          dx = dy  where x > 0, else 0
//   Sigmoid:  y = 1 / (1 + e^-x)     dx = dy · y · (1 - y)
//   Tanh:     y = tanh(x)            dx = dy · (1 - y²)
//
// The sub-gradient of ReLU at exactly x == 0 is fixed at 0.
//
// Sigmoid and Tanh reuse the forward output in backward instead of
// recomputing the exponential. Sigmoid is evaluated in the split form
// (e^x / (1 + e^x) for negative x) so that large |x| never overflows; for
// very large |x| it saturates to exactly 0.0 or 1.0 and its backward
// yields an exact 0.0 (never NaN).

use crate::error::Result;
use crate::op::{expect_arity, BackwardContext, Operator};
use crate::tensor::Tensor;

/// Numerically stable logistic function.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Rectified linear unit: max(0, x).
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Operator for Relu {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        expect_arity(self.name(), inputs, 1)?;
        Ok(inputs[0].map(|x| if x > 0.0 { x } else { 0.0 }))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let dx = ctx.inputs[0].zip_map(ctx.grad_output, |x, g| if x > 0.0 { g } else { 0.0 })?;
        Ok(vec![Some(dx)])
    }
}

/// Logistic sigmoid: 1 / (1 + e^-x).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Operator for Sigmoid {
    fn name(&self) -> &'static str {
        "sigmoid"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        expect_arity(self.name(), inputs, 1)?;
        Ok(inputs[0].map(sigmoid))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let dx = ctx.output.zip_map(ctx.grad_output, |y, g| g * y * (1.0 - y))?;
        Ok(vec![Some(dx)])
    }
}

/// Hyperbolic tangent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

impl Operator for Tanh {
    fn name(&self) -> &'static str {
        "tanh"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        expect_arity(self.name(), inputs, 1)?;
        Ok(inputs[0].map(f64::tanh))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let dx = ctx.output.zip_map(ctx.grad_output, |y, g| g * (1.0 - y * y))?;
        Ok(vec![Some(dx)])
    }
}
