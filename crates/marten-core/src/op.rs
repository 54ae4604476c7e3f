// Operator — the differentiable unit of the computation graph
//
// Every non-leaf Node records HOW it was created: the Operator that computed
// it and the handles of the Nodes it consumed. backward() walks these
// records in reverse to apply the chain rule.
//
// Example: c = relu(affine(x, W, b))
//   x, W, b        → leaves (no producer)
//   h = affine     → Producer { op: Affine, inputs: [x, W, b] }
//   c = relu       → Producer { op: Relu,   inputs: [h] }
//
// When the engine reaches c with dL/dc it calls Relu::backward, which
// returns dL/dh; the engine adds that into h's gradient slot. When it
// reaches h it calls Affine::backward and adds dL/dx, dL/dW, dL/db into the
// three leaves.
//
// DISPATCH:
//
// The set of operators is open: layers and losses each bring their own
// forward/backward pair, stored as Box<dyn Operator>. The engine calls
// backward through the trait and never matches on operator kinds.
//
// Operators are stateless with respect to the graph: forward and backward
// are pure functions of the tensors they are handed. Configuration (a BCE
// epsilon, a hinge margin) lives in the operator value; learnable
// parameters live in the layer that applies it.

use std::fmt;

use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Everything an operator's backward needs, borrowed from the graph.
#[derive(Debug, Clone, Copy)]
pub struct BackwardContext<'a> {
    /// Values of the producing node's inputs, in application order.
    pub inputs: &'a [&'a Tensor],
    /// The value this operator produced during forward.
    pub output: &'a Tensor,
    /// dL/d(output), accumulated from every downstream consumer.
    pub grad_output: &'a Tensor,
}

/// A differentiable function with paired forward/backward implementations.
pub trait Operator: fmt::Debug {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Validate the inputs and compute the output value.
    ///
    /// Must fail (with a construction error) rather than coerce when the
    /// inputs do not fit together. Must never mutate its inputs.
    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor>;

    /// Compute dL/d(input) for every input, given dL/d(output).
    ///
    /// Returns one entry per input, in the same order as the inputs. `None`
    /// marks an input that receives no gradient (e.g. loss targets). Every
    /// `Some` tensor must have its input's shape.
    fn backward(&self, ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>>;
}

/// Fail with `ArityMismatch` unless exactly `expected` inputs were given.
pub fn expect_arity(op: &'static str, inputs: &[&Tensor], expected: usize) -> Result<()> {
    if inputs.len() != expected {
        return Err(Error::ArityMismatch {
            op,
            expected: expected.to_string(),
            got: inputs.len(),
        });
    }
    Ok(())
}
