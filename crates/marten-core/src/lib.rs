//! # marten-core
//!
//! Tensor primitive, computation graph and reverse-mode autograd for Marten.
//!
//! This crate provides:
//! - [`Tensor`] / [`Shape`]: dense row-major `f64` arrays
//! - [`Graph`] / [`Node`] / [`NodeId`]: the per-step computation graph
//! - [`Operator`]: differentiable forward/backward pairs, with the built-in
//!   set in [`ops`]
//! - [`Parameter`]: trainable leaves that outlive a single graph
//! - [`gradcheck`]: finite-difference verification of operators
//!
//! ```ignore
//! let mut g = Graph::new();
//! let x = g.leaf(batch);
//! let w = g.param(&weight);
//! let h = g.affine(x, w, None)?;
//! let y = g.leaf(targets);
//! let loss = g.mse(h, y)?;
//! g.backward(loss)?;
//! // weight.grad() now holds dL/dW
//! ```

// - Shape / Tensor: storage and math kernels
// - Operator: the forward/backward contract; ops: the built-in operators
// - Graph: node arena and lifecycle; backprop: the reverse traversal
// - Parameter: persistent leaves bound into each step's graph

pub mod backprop;
pub mod error;
pub mod gradcheck;
pub mod graph;
pub mod op;
pub mod ops;
pub mod param;
pub mod shape;
pub mod tensor;

pub use error::{Error, Result};
pub use gradcheck::{check_gradients, GradCheckConfig, GradCheckReport};
pub use graph::{Graph, GraphConfig, GraphId, GraphState, Node, NodeId, Producer};
pub use op::{BackwardContext, Operator};
pub use param::{unique_parameters, ParamId, Parameter};
pub use shape::Shape;
pub use tensor::Tensor;
