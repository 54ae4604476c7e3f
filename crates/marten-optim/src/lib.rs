//! # marten-optim
//!
//! Optimizers for training Marten models.
//!
//! All optimizers implement the [`Optimizer`] trait:
//!
//! 1. Build a graph and call `graph.backward(loss)`, which flushes gradients
//!    into the model's [`Parameter`]s
//! 2. Call `optimizer.step()` to update the parameter values in place
//! 3. Call `optimizer.zero_grad()` before the next step
//!
//! Available:
//! - [`SGD`]: stochastic gradient descent with momentum and Nesterov
//! - [`Adam`]: adaptive moment estimation with bias correction
//! - [`clip_grad_norm`] / [`clip_grad_value`] / [`grad_norm`]: gradient clipping
//!
//! [`Parameter`]: marten_core::Parameter

pub mod adam;
pub mod clip;
pub mod optimizer;
pub mod sgd;

pub use adam::{Adam, AdamConfig};
pub use clip::{clip_grad_norm, clip_grad_value, grad_norm};
pub use optimizer::Optimizer;
pub use sgd::{SgdConfig, SGD};
