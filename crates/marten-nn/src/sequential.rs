// Sequential — A chain of modules applied one after another
//
// Example:
//   let model = Sequential::new()
//       .add(Linear::new(2, 8, true, &mut rng)?)
//       .add(ReLU)
//       .add(Linear::new(8, 1, true, &mut rng)?)
//       .add(Sigmoid);
//
//   let y = model.forward(&mut graph, x)?;
//
// The output node of each layer is the input node of the next.

use std::collections::HashSet;

use marten_core::{unique_parameters, Graph, NodeId, Parameter, Result};

use crate::module::Module;

/// A container that chains modules sequentially.
///
/// Sequential itself implements Module, so it can be nested.
pub struct Sequential {
    layers: Vec<Box<dyn Module>>,
}

impl Sequential {
    /// Create an empty Sequential.
    pub fn new() -> Self {
        Sequential { layers: Vec::new() }
    }

    /// Add a layer to the end of the sequence. Returns self for chaining.
    #[allow(clippy::should_implement_trait)]
    pub fn add<M: Module + 'static>(mut self, module: M) -> Self {
        self.layers.push(Box::new(module));
        self
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the sequential is empty.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sequential {
    fn forward(&self, graph: &mut Graph, x: NodeId) -> Result<NodeId> {
        let mut out = x;
        for layer in &self.layers {
            out = layer.forward(graph, out)?;
        }
        Ok(out)
    }

    // A layer added more than once shares its weights; list them once,
    // under the name of their first occurrence.
    fn parameters(&self) -> Vec<Parameter> {
        unique_parameters(self.layers.iter().flat_map(|l| l.parameters()))
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        let mut seen = HashSet::new();
        let mut named = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            for (k, v) in layer.named_parameters() {
                if seen.insert(v.id()) {
                    named.push((format!("layers.{i}.{k}"), v));
                }
            }
        }
        named
    }
}
