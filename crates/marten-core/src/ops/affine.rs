// Affine — fully-connected transform y = xW + b
//
// SHAPES:
//
//   x: [B, in]    W: [in, out]    b: [out] (optional)    y: [B, out]
//
// The weight is stored [in, out] so that forward is a plain row-major
// matmul with no transpose. The bias is broadcast over the batch rows.
//
// BACKWARD (given dy = dL/dy, shape [B, out]):
//
//   dx = dy · Wᵀ          [B, out] @ [out, in] → [B, in]
//   dW = xᵀ · dy          [in, B]  @ [B, out]  → [in, out]
//   db = columnSum(dy)    [out]

use crate::error::{Error, Result};
use crate::op::{BackwardContext, Operator};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// `y = xW + b` with an optional bias input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Affine;

impl Affine {
    /// Check that x, W (and b) fit together; returns (batch, in, out).
    fn check_shapes(inputs: &[&Tensor]) -> Result<(usize, usize, usize)> {
        if !(2..=3).contains(&inputs.len()) {
            return Err(Error::ArityMismatch {
                op: "affine",
                expected: "2 or 3".to_string(),
                got: inputs.len(),
            });
        }
        let (batch, in_x) = inputs[0].shape().dims2()?;
        let (in_w, out) = inputs[1].shape().dims2()?;
        if in_x != in_w {
            return Err(Error::MatmulShapeMismatch {
                m: batch,
                k1: in_x,
                k2: in_w,
                n: out,
            });
        }
        if let Some(bias) = inputs.get(2) {
            let expected = Shape::from(out);
            if bias.shape() != &expected {
                return Err(Error::ShapeMismatch {
                    expected,
                    got: bias.shape().clone(),
                });
            }
        }
        Ok((batch, in_x, out))
    }
}

impl Operator for Affine {
    fn name(&self) -> &'static str {
        "affine"
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        let (_, _, out) = Self::check_shapes(inputs)?;
        let mut y = inputs[0].matmul(inputs[1])?;
        if let Some(bias) = inputs.get(2) {
            let b = bias.as_slice();
            if out > 0 {
                for row in y.as_mut_slice().chunks_mut(out) {
                    for (v, bv) in row.iter_mut().zip(b.iter()) {
                        *v += bv;
                    }
                }
            }
        }
        Ok(y)
    }

    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
        let x = ctx.inputs[0];
        let w = ctx.inputs[1];
        let dy = ctx.grad_output;

        let dx = dy.matmul(&w.transpose()?)?;
        let dw = x.transpose()?.matmul(dy)?;
        let mut grads = vec![Some(dx), Some(dw)];
        if ctx.inputs.len() == 3 {
            grads.push(Some(dy.sum_rows()?));
        }
        Ok(grads)
    }
}
