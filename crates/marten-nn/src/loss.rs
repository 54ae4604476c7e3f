// Loss functions
//
// Thin helpers that record a loss operator on (prediction, target) and
// return the one-element loss node, ready for `graph.backward(loss)`.
//
//   mse_loss            mean((pred - target)²)            regression
//   bce_loss            binary cross-entropy on probs     binary classification
//   cross_entropy_loss  softmax + cross-entropy on logits multi-class
//   hinge_loss          mean(max(0, 1 - t·pred))          max-margin, t ∈ {-1, +1}
//
// The trainer never needs to know which loss it holds: any `Operator`
// taking (prediction, target) works through `loss_with`, and the engine
// differentiates it through the same trait.

use marten_core::ops::{BinaryCrossEntropy, Hinge, MeanSquaredError, SoftmaxCrossEntropy};
use marten_core::{Graph, NodeId, Operator, Result};

/// Record an arbitrary loss operator on (prediction, target).
pub fn loss_with<O: Operator + 'static>(
    graph: &mut Graph,
    loss: O,
    prediction: NodeId,
    target: NodeId,
) -> Result<NodeId> {
    graph.apply(loss, &[prediction, target])
}

/// Mean Squared Error: mean((prediction - target)²).
pub fn mse_loss(graph: &mut Graph, prediction: NodeId, target: NodeId) -> Result<NodeId> {
    loss_with(graph, MeanSquaredError, prediction, target)
}

/// Binary cross-entropy on probabilities in [0, 1] against {0, 1} targets.
///
/// Predictions are clamped to [1e-7, 1 - 1e-7] before taking logs.
pub fn bce_loss(graph: &mut Graph, prediction: NodeId, target: NodeId) -> Result<NodeId> {
    loss_with(graph, BinaryCrossEntropy::default(), prediction, target)
}

/// Softmax cross-entropy on raw logits `[batch, classes]` against one-hot
/// targets of the same shape.
pub fn cross_entropy_loss(graph: &mut Graph, logits: NodeId, target: NodeId) -> Result<NodeId> {
    loss_with(graph, SoftmaxCrossEntropy, logits, target)
}

/// Hinge loss with margin 1 against {-1, +1} targets.
pub fn hinge_loss(graph: &mut Graph, prediction: NodeId, target: NodeId) -> Result<NodeId> {
    loss_with(graph, Hinge::default(), prediction, target)
}
