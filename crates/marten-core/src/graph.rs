// Graph — the per-step computation graph context
//
// The Graph is an arena of Nodes indexed by NodeId handles. Forward calls
// append Nodes; producer edges are lists of handles into the same arena.
// Because edges are plain indices there are no reference cycles, traversal
// needs no symbol table, and teardown is simply dropping (or resetting) the
// arena.
//
// ONE GRAPH PER STEP:
//
//   let mut graph = Graph::new();
//   let x = graph.leaf(batch);              // input data
//   let w = graph.param(&weight);           // persistent parameter
//   let y = graph.affine(x, w, None)?;      // records Producer { Affine, [x, w] }
//   let loss = graph.mse(y, target)?;
//   graph.backward(loss)?;                  // fills every grad slot
//
// STATE MACHINE:
//
//   Idle ──leaf/param/apply──▶ Building ──backward──▶ Backward ──▶ Consumed
//    ▲                                                               │
//    └──────────────────────────── reset ────────────────────────────┘
//
//   A second backward on a Consumed graph fails with GraphConsumed instead of
//   silently double-accumulating. zero_grad() clears every node gradient and
//   re-arms the graph (Consumed → Building).
//
// HANDLES:
//
//   Every NodeId carries the id of the graph that issued it. reset() draws a
//   fresh graph id, so handles from a previous step are rejected with
//   ForeignNode instead of silently aliasing a new node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::op::Operator;
use crate::param::{ParamId, Parameter};
use crate::tensor::Tensor;

/// Unique identifier of one graph generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        GraphId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a Node inside a specific graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    graph: GraphId,
    index: usize,
}

impl NodeId {
    /// Position of the node in its graph's arena (creation order).
    pub fn index(&self) -> usize {
        self.index
    }
}

/// The operation that produced a Node, plus the Nodes it consumed.
pub struct Producer {
    op: Box<dyn Operator>,
    inputs: Vec<NodeId>,
}

impl Producer {
    pub fn op(&self) -> &dyn Operator {
        self.op.as_ref()
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("op", &self.op.name())
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// A vertex of the computation graph.
///
/// Owns its value and its gradient accumulator. The gradient is allocated
/// lazily on first accumulation and always has the value's shape.
#[derive(Debug)]
pub struct Node {
    value: Tensor,
    grad: Option<Tensor>,
    producer: Option<Producer>,
}

impl Node {
    /// A node with no producer: input data or a trainable parameter.
    pub fn leaf(value: Tensor) -> Self {
        Node {
            value,
            grad: None,
            producer: None,
        }
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    /// Mutable access to the gradient, e.g. for clipping. Callers must keep
    /// the value's shape.
    pub fn grad_mut(&mut self) -> Option<&mut Tensor> {
        self.grad.as_mut()
    }

    pub fn producer(&self) -> Option<&Producer> {
        self.producer.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.producer.is_none()
    }

    /// Reset `grad` to zeros of the value's shape. Idempotent, and valid on
    /// a node whose gradient was never allocated.
    pub fn zero_grad(&mut self) {
        match &mut self.grad {
            Some(g) => g.zero(),
            None => self.grad = Some(self.value.zeros_like()),
        }
    }

    /// Drop the gradient accumulator.
    pub fn clear_grad(&mut self) {
        self.grad = None;
    }

    /// Split borrow: the value mutably, the gradient immutably.
    pub fn value_and_grad_mut(&mut self) -> (&mut Tensor, Option<&Tensor>) {
        (&mut self.value, self.grad.as_ref())
    }

    /// grad += contribution (allocating on first use).
    pub(crate) fn accumulate_grad(&mut self, contribution: &Tensor) -> Result<()> {
        self.value.check_same_shape(contribution)?;
        match &mut self.grad {
            Some(g) => g.add_assign(contribution),
            None => {
                self.grad = Some(contribution.clone());
                Ok(())
            }
        }
    }
}

/// Lifecycle state of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// No nodes recorded yet.
    Idle,
    /// Forward calls are recording nodes.
    Building,
    /// A backward traversal is in flight.
    Backward,
    /// backward() has run; another backward needs zero_grad() or reset().
    Consumed,
}

/// Configuration for a new graph.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Record producers so that backward() can run. Disable for inference.
    pub grad_enabled: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { grad_enabled: true }
    }
}

impl GraphConfig {
    pub fn grad_enabled(mut self, enabled: bool) -> Self {
        self.grad_enabled = enabled;
        self
    }
}

/// The scope owning all Nodes created during one forward/backward step.
pub struct Graph {
    pub(crate) id: GraphId,
    pub(crate) nodes: Vec<Node>,
    pub(crate) bindings: Vec<(NodeId, Parameter)>,
    bound: HashMap<ParamId, NodeId>,
    pub(crate) state: GraphState,
    grad_enabled: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("params", &self.bindings.len())
            .field("state", &self.state)
            .field("grad_enabled", &self.grad_enabled)
            .finish()
    }
}

impl Graph {
    /// A new, empty graph with gradient recording enabled.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Graph {
            id: GraphId::new(),
            nodes: Vec::new(),
            bindings: Vec::new(),
            bound: HashMap::new(),
            state: GraphState::Idle,
            grad_enabled: config.grad_enabled,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Number of nodes recorded.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_grad_enabled(&self) -> bool {
        self.grad_enabled
    }

    /// Toggle producer recording for subsequent apply() calls.
    pub fn set_grad_enabled(&mut self, enabled: bool) {
        self.grad_enabled = enabled;
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId {
            graph: self.id,
            index: self.nodes.len(),
        };
        self.nodes.push(node);
        if self.state == GraphState::Idle {
            self.state = GraphState::Building;
        }
        id
    }

    /// Record a leaf node holding `value`.
    pub fn leaf(&mut self, value: Tensor) -> NodeId {
        self.push(Node::leaf(value))
    }

    /// Bind a persistent parameter into this graph as a leaf.
    ///
    /// Binding the same parameter twice returns the same handle, so a
    /// weight shared by two layers accumulates its gradient inside the
    /// graph. After a successful backward the leaf's gradient is added into
    /// the parameter's accumulator.
    pub fn param(&mut self, param: &Parameter) -> NodeId {
        if let Some(&id) = self.bound.get(&param.id()) {
            return id;
        }
        let id = self.push(Node::leaf(param.snapshot()));
        self.bound.insert(param.id(), id);
        self.bindings.push((id, param.clone()));
        id
    }

    /// Apply an operator to existing nodes, recording the result.
    ///
    /// Forward runs immediately; shape errors surface here, before any node
    /// is created.
    pub fn apply<O: Operator + 'static>(&mut self, op: O, inputs: &[NodeId]) -> Result<NodeId> {
        self.apply_boxed(Box::new(op), inputs)
    }

    /// [`Graph::apply`] for an already boxed operator (e.g. a loss chosen
    /// at runtime).
    pub fn apply_boxed(&mut self, op: Box<dyn Operator>, inputs: &[NodeId]) -> Result<NodeId> {
        if self.state == GraphState::Consumed {
            return Err(Error::GraphConsumed);
        }
        let value = {
            let values = inputs
                .iter()
                .map(|&id| self.value(id))
                .collect::<Result<Vec<_>>>()?;
            op.forward(&values)?
        };
        let node = if self.grad_enabled {
            Node {
                value,
                grad: None,
                producer: Some(Producer {
                    op,
                    inputs: inputs.to_vec(),
                }),
            }
        } else {
            Node::leaf(value)
        };
        Ok(self.push(node))
    }

    fn check(&self, id: NodeId) -> Result<usize> {
        if id.graph != self.id || id.index >= self.nodes.len() {
            return Err(Error::ForeignNode { node: id });
        }
        Ok(id.index)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        let i = self.check(id)?;
        Ok(&self.nodes[i])
    }

    pub fn value(&self, id: NodeId) -> Result<&Tensor> {
        Ok(self.node(id)?.value())
    }

    /// The accumulated gradient of a node; None until a backward pass
    /// reached it.
    pub fn grad(&self, id: NodeId) -> Result<Option<&Tensor>> {
        Ok(self.node(id)?.grad())
    }

    /// Zero one node's gradient (allocating it if needed).
    pub fn zero_grad_node(&mut self, id: NodeId) -> Result<()> {
        let i = self.check(id)?;
        self.nodes[i].zero_grad();
        Ok(())
    }

    /// Zero every node gradient and re-arm a consumed graph.
    ///
    /// Only the graph's own nodes are touched; bound parameters keep their
    /// accumulators until the optimizer (or the caller) zeroes them.
    pub fn zero_grad(&mut self) {
        for node in &mut self.nodes {
            if node.grad.is_some() {
                node.zero_grad();
            }
        }
        if self.state == GraphState::Consumed {
            self.state = GraphState::Building;
        }
    }

    /// Discard every node and start a new generation. Handles issued
    /// before the reset are no longer valid.
    pub fn reset(&mut self) {
        tracing::debug!(graph = self.id.0, nodes = self.nodes.len(), "graph reset");
        self.id = GraphId::new();
        self.nodes.clear();
        self.bindings.clear();
        self.bound.clear();
        self.state = GraphState::Idle;
    }

    /// Parameters bound into this graph, with their leaf handles.
    pub fn bound_params(&self) -> impl Iterator<Item = (NodeId, &Parameter)> {
        self.bindings.iter().map(|(id, p)| (*id, p))
    }
}
