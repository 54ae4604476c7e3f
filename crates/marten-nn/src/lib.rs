//! # marten-nn
//!
//! Neural network layers, activations and losses for Marten.
//!
//! Provides reusable building blocks following the [`Module`] trait pattern
//! (similar to PyTorch's `nn.Module`):
//!
//! 1. **Module trait**: every layer records its computation in a [`Graph`]
//! 2. **Linear**: fully connected `y = xW + b`
//! 3. **Activations**: ReLU, Sigmoid, Tanh as modules
//! 4. **Sequential**: chains modules
//! 5. **Loss functions**: MSE, BCE, cross-entropy, hinge
//! 6. **init / metrics**: parameter initializers and evaluation helpers
//!
//! Layers own [`Parameter`]s that outlive any single graph; each training
//! step builds a fresh graph and binds them into it.
//!
//! [`Graph`]: marten_core::Graph
//! [`Parameter`]: marten_core::Parameter

pub mod activation;
pub mod init;
pub mod linear;
pub mod loss;
pub mod metrics;
pub mod module;
pub mod sequential;

pub use activation::{ReLU, Sigmoid, Tanh};
pub use init::FanMode;
pub use linear::Linear;
pub use loss::{bce_loss, cross_entropy_loss, hinge_loss, loss_with, mse_loss};
pub use metrics::{accuracy, argmax_classes, binary_accuracy};
pub use module::Module;
pub use sequential::Sequential;
