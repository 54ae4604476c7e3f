// Module — the interface every layer implements
//
// A layer owns its Parameters across training steps; a Graph lives for one
// step. forward() therefore takes the step's graph and the handle of the
// input node, binds the layer's parameters into that graph, and returns the
// handle of the output node:
//
//   let mut g = Graph::new();
//   let x = g.leaf(batch);
//   let y = model.forward(&mut g, x)?;
//
// parameters() hands the same Parameter handles to an optimizer, which
// reads the gradients backward() flushed into them.

use marten_core::{unique_parameters, Graph, NodeId, Parameter, Result};

/// The trait for all neural network layers.
///
/// # Example
/// ```ignore
/// struct TwoLayer {
///     fc1: Linear,
///     fc2: Linear,
/// }
///
/// impl Module for TwoLayer {
///     fn forward(&self, g: &mut Graph, x: NodeId) -> Result<NodeId> {
///         let h = self.fc1.forward(g, x)?;
///         let h = g.relu(h)?;
///         self.fc2.forward(g, h)
///     }
///     fn parameters(&self) -> Vec<Parameter> {
///         let mut p = self.fc1.parameters();
///         p.extend(self.fc2.parameters());
///         p
///     }
/// }
/// ```
pub trait Module {
    /// Record this layer's computation in `graph`, starting from `x`.
    fn forward(&self, graph: &mut Graph, x: NodeId) -> Result<NodeId>;

    /// All trainable parameters, for optimizer updates.
    fn parameters(&self) -> Vec<Parameter>;

    /// Total number of scalar parameters, counting shared ones once.
    fn num_parameters(&self) -> usize {
        unique_parameters(self.parameters())
            .iter()
            .map(|p| p.elem_count())
            .sum()
    }

    /// Parameters with human-readable names.
    ///
    /// Leaf layers override this with names like `"weight"` / `"bias"`;
    /// containers prefix their children's names (`"layers.0.weight"`). The
    /// default uses positional names (`param_0`, `param_1`, …).
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.parameters()
            .into_iter()
            .enumerate()
            .map(|(i, p)| (format!("param_{i}"), p))
            .collect()
    }

    /// Zero the gradient accumulator of every parameter.
    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }
}
