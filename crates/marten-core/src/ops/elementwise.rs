// Element-wise combinators and reductions
//
//   Add:  y = a + b     da = dy          db = dy
//   Mul:  y = a * b     da = dy * b      db = dy * a
//   Sum:  y = [Σ x]     dx = dy[0] everywhere
//
// Add and Mul require identical shapes; there is no broadcasting.

use crate::error::Result;
use crate::op::{expect_arity, BackwardContext, Operator};
use crate::tensor::Tensor;

/// Element-wise sum of two same-shape tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl Operator for Add {
    fn name(&self) -> &'static str {
        "add"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        expect_arity(self.name(), inputs, 2)?;
        inputs[0].add(inputs[1])
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let g = ctx.grad_output;
        Ok(vec![Some(g.clone()), Some(g.clone())])
    }
}

/// Element-wise product of two same-shape tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl Operator for Mul {
    fn name(&self) -> &'static str {
        "mul"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        expect_arity(self.name(), inputs, 2)?;
        inputs[0].mul(inputs[1])
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let (a, b) = (ctx.inputs[0], ctx.inputs[1]);
        let da = ctx.grad_output.mul(b)?;
        let db = ctx.grad_output.mul(a)?;
        Ok(vec![Some(da), Some(db)])
    }
}

/// Sum of all elements, producing a `[1]` tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Operator for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        expect_arity(self.name(), inputs, 1)?;
        Ok(Tensor::scalar(inputs[0].sum_all()))
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let g = ctx.grad_output.item()?;
        Ok(vec![Some(Tensor::full(ctx.inputs[0].shape().clone(), g)?)])
    }
}
