// Activation modules: parameter-free wrappers around the graph's activation
// operators, so they can sit inside a Sequential.
//
// Example:
//   let model = Sequential::new()
//       .add(linear1)
//       .add(ReLU)
//       .add(linear2);

use marten_core::{Graph, NodeId, Parameter, Result};

use crate::module::Module;

/// ReLU activation: max(0, x)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl Module for ReLU {
    fn forward(&self, graph: &mut Graph, x: NodeId) -> Result<NodeId> {
        graph.relu(x)
    }
    fn parameters(&self) -> Vec<Parameter> {
        vec![]
    }
}

/// Sigmoid activation: 1 / (1 + e^(-x))
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Module for Sigmoid {
    fn forward(&self, graph: &mut Graph, x: NodeId) -> Result<NodeId> {
        graph.sigmoid(x)
    }
    fn parameters(&self) -> Vec<Parameter> {
        vec![]
    }
}

/// Tanh activation
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

impl Module for Tanh {
    fn forward(&self, graph: &mut Graph, x: NodeId) -> Result<NodeId> {
        graph.tanh(x)
    }
    fn parameters(&self) -> Vec<Parameter> {
        vec![]
    }
}
