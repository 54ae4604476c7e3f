//! # Marten
//!
//! A minimal deep learning training core built from scratch in Rust:
//! dense `f64` tensors, a per-step computation graph with reverse-mode
//! automatic differentiation, layers and optimizers.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```ignore
//! use marten::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let model = Sequential::new()
//!     .add(Linear::new(2, 8, true, &mut rng)?)
//!     .add(ReLU)
//!     .add(Linear::new(8, 1, true, &mut rng)?)
//!     .add(Sigmoid);
//! let mut opt = Adam::new(model.parameters(), 0.1)?;
//!
//! for _ in 0..steps {
//!     opt.zero_grad();
//!     let mut g = Graph::new();
//!     let x = g.leaf(inputs.clone());
//!     let y = g.leaf(targets.clone());
//!     let p = model.forward(&mut g, x)?;
//!     let loss = bce_loss(&mut g, p, y)?;
//!     g.backward(loss)?;
//!     opt.step()?;
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `marten-core` | Tensor, Shape, Graph/Node, Operator, autograd, gradient checking |
//! | `marten-nn` | Module trait, Linear, activations, Sequential, losses, init, metrics |
//! | `marten-optim` | Optimizer trait, SGD, Adam, gradient clipping |

/// Re-export core types.
pub use marten_core::{
    check_gradients, ops, BackwardContext, Error, GradCheckConfig, GradCheckReport, Graph,
    GraphConfig, GraphState, Node, NodeId, Operator, ParamId, Parameter, Result, Shape, Tensor,
};

/// Re-export neural network modules.
pub mod nn {
    pub use marten_nn::*;
}

/// Re-export optimizers.
pub mod optim {
    pub use marten_optim::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{
        bce_loss, binary_accuracy, cross_entropy_loss, hinge_loss, mse_loss, Linear, Module,
        ReLU, Sequential, Sigmoid, Tanh,
    };
    pub use crate::optim::{clip_grad_norm, grad_norm, Adam, AdamConfig, Optimizer, SgdConfig, SGD};
    pub use crate::{Error, Graph, GraphConfig, NodeId, Operator, Parameter, Result, Shape, Tensor};
}
