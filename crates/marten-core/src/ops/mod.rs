// Built-in operators
//
// Each operator is a small value type implementing `Operator`. The
// `impl Graph` block below adds one typed helper per operator so that model
// code reads like ordinary function calls:
//
//   let h = graph.affine(x, w, Some(b))?;
//   let h = graph.relu(h)?;
//   let loss = graph.softmax_cross_entropy(h, targets)?;

pub mod activation;
pub mod affine;
pub mod elementwise;
pub mod loss;

pub use activation::{sigmoid, Relu, Sigmoid, Tanh};
pub use affine::Affine;
pub use elementwise::{Add, Mul, Sum};
pub use loss::{BinaryCrossEntropy, Hinge, MeanSquaredError, SoftmaxCrossEntropy};

use crate::error::Result;
use crate::graph::{Graph, NodeId};

impl Graph {
    /// `x @ w (+ b)`.
    pub fn affine(&mut self, x: NodeId, w: NodeId, b: Option<NodeId>) -> Result<NodeId> {
        match b {
            Some(b) => self.apply(Affine, &[x, w, b]),
            None => self.apply(Affine, &[x, w]),
        }
    }

    pub fn relu(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply(Relu, &[x])
    }

    pub fn sigmoid(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply(Sigmoid, &[x])
    }

    pub fn tanh(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply(Tanh, &[x])
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply(Add, &[a, b])
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply(Mul, &[a, b])
    }

    /// Sum of all elements, as a `[1]` node.
    pub fn sum(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply(Sum, &[x])
    }

    pub fn softmax_cross_entropy(&mut self, logits: NodeId, targets: NodeId) -> Result<NodeId> {
        self.apply(SoftmaxCrossEntropy, &[logits, targets])
    }

    /// Binary cross-entropy with the default clamp (ε = 1e-7).
    pub fn binary_cross_entropy(&mut self, probs: NodeId, targets: NodeId) -> Result<NodeId> {
        self.apply(BinaryCrossEntropy::default(), &[probs, targets])
    }

    pub fn mse(&mut self, pred: NodeId, targets: NodeId) -> Result<NodeId> {
        self.apply(MeanSquaredError, &[pred, targets])
    }

    /// Hinge loss with margin 1.
    pub fn hinge(&mut self, pred: NodeId, targets: NodeId) -> Result<NodeId> {
        self.apply(Hinge::default(), &[pred, targets])
    }
}
