// Linear — Fully-connected (dense) layer
//
// y = xW + b, recorded in the graph as a single Affine node.
//
// WEIGHT INITIALIZATION:
//
// Kaiming (He) uniform with a = sqrt(5): weights and bias are drawn from
// U(-k, k) where k = sqrt(1/in_features). This keeps the scale of the
// activations roughly constant from layer to layer, so a stack of
// Linear → ReLU blocks neither vanishes nor explodes at initialization.
//
// PARAMETER SHAPES:
//
//   weight: [in_features, out_features]   (x @ weight needs no transpose)
//   bias:   [out_features]                (added to every row of the batch)
//
// COMPUTATION:
//
//   Input:  [batch, in_features]
//   Output: [batch, out_features]

use marten_core::{Error, Graph, NodeId, Parameter, Result, Tensor};
use rand::Rng;

use crate::init::{self, FanMode};
use crate::module::Module;

/// A fully-connected (dense) layer: y = xW + b.
///
/// # Examples
/// ```ignore
/// let mut rng = StdRng::seed_from_u64(0);
/// let fc = Linear::new(784, 128, true, &mut rng)?;
/// let mut g = Graph::new();
/// let x = g.leaf(batch);          // [32, 784]
/// let y = fc.forward(&mut g, x)?; // [32, 128]
/// ```
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weight matrix: [in_features, out_features]
    weight: Parameter,
    /// Optional bias vector: [out_features]
    bias: Option<Parameter>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a Linear layer with Kaiming-uniform initialization drawn from
    /// `rng`.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        use_bias: bool,
        rng: &mut R,
    ) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(Error::msg(format!(
                "Linear({in_features}, {out_features}): feature sizes must be non-zero"
            )));
        }
        let a = 5f64.sqrt();
        let weight = init::kaiming_uniform((in_features, out_features), a, FanMode::FanIn, rng)?;

        let bias = if use_bias {
            // Same bound as the weight: sqrt(1 / in_features).
            let k = (1.0 / in_features as f64).sqrt();
            Some(init::uniform(out_features, -k, k, rng)?)
        } else {
            None
        };

        Ok(Linear {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// Create a Linear layer from existing weight and bias tensors.
    pub fn from_tensors(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        let (in_features, out_features) = weight.shape().dims2()?;
        if let Some(b) = &bias {
            if b.dims() != [out_features] {
                return Err(Error::msg(format!(
                    "Linear bias must have shape [{out_features}], got {}",
                    b.shape()
                )));
            }
        }
        Ok(Linear {
            weight: Parameter::new(weight),
            bias: bias.map(Parameter::new),
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }
}

impl Module for Linear {
    fn forward(&self, graph: &mut Graph, x: NodeId) -> Result<NodeId> {
        let w = graph.param(&self.weight);
        let b = self.bias.as_ref().map(|b| graph.param(b));
        graph.affine(x, w, b)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            params.push(b.clone());
        }
        params
    }

    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        let mut named = vec![("weight".to_string(), self.weight.clone())];
        if let Some(b) = &self.bias {
            named.push(("bias".to_string(), b.clone()));
        }
        named
    }
}
