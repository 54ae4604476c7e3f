// Backpropagation — Reverse-mode automatic differentiation
//
// This module implements the backward pass over a Graph arena, computing
// gradients of a scalar loss with respect to every node that contributed
// to it.
//
// HOW IT WORKS:
//
//   1. Forward pass: Graph::apply() appends nodes whose Producer records the
//      operator and the handles of its inputs.
//
//   2. backward() topologically sorts the part of the DAG reachable from
//      the loss (DFS post-order over producer → input edges; each node is
//      visited at most once, however many paths reach it).
//
//   3. The loss gradient is seeded (ones, i.e. dL/dL = 1) and the order is
//      walked in reverse. For each node with a producer and a pending
//      gradient, the operator's backward() turns dL/d(output) into
//      dL/d(input) for each input.
//
// ACCUMULATION: If a node is consumed by several operators, its gradient
// is the SUM of the contributions from each use (multivariate chain rule).
// Contributions are always added into the grad slot, never assigned.
//
// For example: c = a * a, then grad_a = grad_c * a + grad_c * a = 2 * a * grad_c
//
// ATOMICITY: parameter accumulators are written only after the traversal
// has succeeded, and only once every reached parameter has been borrowed
// and shape-checked. If an operator's backward fails halfway, the graph ends
// up Consumed and no Parameter has been touched.

use crate::error::{Error, Result};
use crate::graph::{Graph, GraphState, Node, NodeId};
use crate::op::BackwardContext;
use crate::tensor::Tensor;

/// Build a topological ordering of the nodes reachable from `root`.
///
/// Returns arena indices in order such that every node appears AFTER all
/// its inputs (leaves first, root last). The DFS keeps an explicit stack so
/// that long chains cannot overflow the call stack.
fn build_topo(nodes: &[Node], root: usize) -> Vec<usize> {
    let mut visited = vec![false; nodes.len()];
    let mut order = Vec::new();
    // (node, inputs already expanded?)
    let mut stack = vec![(root, false)];

    while let Some((idx, expanded)) = stack.pop() {
        if expanded {
            order.push(idx);
            continue;
        }
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        stack.push((idx, true));
        if let Some(producer) = nodes[idx].producer() {
            for input in producer.inputs().iter().rev() {
                if !visited[input.index()] {
                    stack.push((input.index(), false));
                }
            }
        }
    }
    order
}

impl Graph {
    /// Run reverse-mode differentiation from a one-element loss node,
    /// seeding dL/dL = 1.
    pub fn backward(&mut self, loss: NodeId) -> Result<()> {
        let loss_value = self.value(loss)?;
        if loss_value.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: loss_value.shape().clone(),
            });
        }
        let seed = Tensor::full(loss_value.shape().clone(), 1.0)?;
        self.backward_with_seed(loss, seed)
    }

    /// Run reverse-mode differentiation from `root` with an explicit seed
    /// gradient (same shape as the root's value).
    ///
    /// With a non-scalar root this computes the vector-Jacobian product
    /// `seedᵀ · J`, which is what gradient checking uses.
    pub fn backward_with_seed(&mut self, root: NodeId, seed: Tensor) -> Result<()> {
        match self.state {
            GraphState::Consumed | GraphState::Backward => return Err(Error::GraphConsumed),
            GraphState::Idle => return Err(Error::EmptyGraph),
            GraphState::Building => {}
        }
        if !self.is_grad_enabled() {
            return Err(Error::GradDisabled);
        }
        let root_node = self.node(root)?;
        root_node.value().check_same_shape(&seed)?;

        self.state = GraphState::Backward;
        let result = self.traverse(root.index(), &seed);
        self.state = GraphState::Consumed;
        result?;

        // Borrow and shape-check every reached parameter before writing any,
        // so a failure leaves all of them untouched.
        let mut pending = Vec::with_capacity(self.bindings.len());
        for (id, param) in &self.bindings {
            if let Some(grad) = self.nodes[id.index()].grad() {
                let node = param.try_node_mut()?;
                node.value().check_same_shape(grad)?;
                pending.push((node, grad));
            }
        }
        for (mut node, grad) in pending {
            node.accumulate_grad(grad)?;
        }
        Ok(())
    }

    fn traverse(&mut self, root: usize, seed: &Tensor) -> Result<()> {
        let order = build_topo(&self.nodes, root);
        let _span = tracing::debug_span!(
            "backward",
            graph = ?self.id,
            reachable = order.len(),
            total = self.nodes.len()
        )
        .entered();

        self.nodes[root].accumulate_grad(seed)?;

        for &idx in order.iter().rev() {
            let node = &self.nodes[idx];
            let (producer, grad_output) = match (node.producer(), node.grad()) {
                (Some(p), Some(g)) => (p, g),
                // Leaf, or nothing flowed into this node.
                _ => continue,
            };

            let inputs: Vec<&Tensor> = producer
                .inputs()
                .iter()
                .map(|id| self.nodes[id.index()].value())
                .collect();
            let ctx = BackwardContext {
                inputs: &inputs,
                output: node.value(),
                grad_output,
            };
            tracing::trace!(op = producer.op().name(), node = idx, "backward step");
            let grads = producer.op().backward(&ctx)?;
            if grads.len() != inputs.len() {
                return Err(Error::msg(format!(
                    "operator {} returned {} gradients for {} inputs",
                    producer.op().name(),
                    grads.len(),
                    inputs.len()
                )));
            }
            let input_ids = producer.inputs().to_vec();

            for (id, grad) in input_ids.into_iter().zip(grads) {
                if let Some(grad) = grad {
                    self.nodes[id.index()].accumulate_grad(&grad)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Operator;
    use crate::ops::{Add, Mul, Relu, Sum};
    use crate::param::Parameter;

    /// Identity forward whose backward always fails.
    #[derive(Debug)]
    struct BrokenBackward;

    impl Operator for BrokenBackward {
        fn name(&self) -> &'static str {
            "broken_backward"
        }

        fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor> {
            crate::op::expect_arity(self.name(), inputs, 1)?;
            Ok(inputs[0].clone())
        }

        fn backward(&self, _ctx: &BackwardContext<'_>) -> Result<Vec<Option<Tensor>>> {
            Err(Error::msg("broken_backward: no gradient"))
        }
    }

    #[test]
    fn test_topo_visits_shared_node_once() -> Result<()> {
        let mut g = Graph::new();
        let a = g.leaf(Tensor::ones(2)?);
        let b = g.apply(Relu, &[a])?;
        let c = g.apply(Add, &[b, b])?;
        let d = g.apply(Sum, &[c])?;
        let order = build_topo(&g.nodes, d.index());
        assert_eq!(order, vec![a.index(), b.index(), c.index(), d.index()]);
        Ok(())
    }

    #[test]
    fn test_square_via_mul_accumulates() -> Result<()> {
        // c = sum(a * a) → dc/da = 2a
        let mut g = Graph::new();
        let a = g.leaf(Tensor::from_vec(vec![1.0, -2.0, 3.0], 3)?);
        let sq = g.apply(Mul, &[a, a])?;
        let c = g.apply(Sum, &[sq])?;
        g.backward(c)?;
        assert_eq!(g.grad(a)?.map(|t| t.to_vec()), Some(vec![2.0, -4.0, 6.0]));
        Ok(())
    }

    #[test]
    fn test_double_backward_rejected() -> Result<()> {
        let mut g = Graph::new();
        let a = g.leaf(Tensor::ones(2)?);
        let s = g.apply(Sum, &[a])?;
        g.backward(s)?;
        let err = g.backward(s).unwrap_err();
        assert!(matches!(err, Error::GraphConsumed));
        assert!(err.is_graph_state());
        // Gradient was not doubled.
        assert_eq!(g.grad(a)?.map(|t| t.to_vec()), Some(vec![1.0, 1.0]));

        // zero_grad re-arms.
        g.zero_grad();
        g.backward(s)?;
        assert_eq!(g.grad(a)?.map(|t| t.to_vec()), Some(vec![1.0, 1.0]));
        Ok(())
    }

    #[test]
    fn test_empty_graph_and_non_scalar() -> Result<()> {
        let mut g = Graph::new();
        let other = Graph::new().leaf(Tensor::ones(1)?);
        assert!(g.backward(other).is_err());

        let mut g2 = Graph::new();
        assert!(matches!(
            g2.backward_with_seed(other, Tensor::ones(1)?),
            Err(Error::EmptyGraph)
        ));

        let v = g.leaf(Tensor::ones(3)?);
        assert!(matches!(g.backward(v), Err(Error::NotAScalar { .. })));
        Ok(())
    }

    #[test]
    fn test_unreached_nodes_have_no_grad() -> Result<()> {
        let mut g = Graph::new();
        let a = g.leaf(Tensor::ones(2)?);
        let unused = g.apply(Relu, &[a])?;
        let s = g.apply(Sum, &[a])?;
        g.backward(s)?;
        assert!(g.grad(unused)?.is_none());
        Ok(())
    }

    #[test]
    fn test_params_receive_grad_after_backward() -> Result<()> {
        let p = Parameter::new(Tensor::from_vec(vec![3.0, 4.0], 2)?);
        let mut g = Graph::new();
        let w = g.param(&p);
        let sq = g.apply(Mul, &[w, w])?;
        let s = g.apply(Sum, &[sq])?;
        assert!(p.grad().is_none());
        g.backward(s)?;
        assert_eq!(p.grad().map(|t| t.to_vec()), Some(vec![6.0, 8.0]));
        Ok(())
    }

    #[test]
    fn test_grad_disabled_backward_fails() -> Result<()> {
        let mut g = Graph::new();
        g.set_grad_enabled(false);
        let a = g.leaf(Tensor::ones(1)?);
        let s = g.apply(Sum, &[a])?;
        assert!(matches!(g.backward(s), Err(Error::GradDisabled)));
        Ok(())
    }

    #[test]
    fn test_failed_backward_leaves_params_untouched() -> Result<()> {
        // loss = sum(broken(w) + w * w); the Mul branch reaches w's leaf
        // before the broken operator fails.
        let p = Parameter::new(Tensor::from_vec(vec![1.0, 2.0], 2)?);
        let mut g = Graph::new();
        let w = g.param(&p);
        let sq = g.apply(Mul, &[w, w])?;
        let broken = g.apply(BrokenBackward, &[w])?;
        let both = g.apply(Add, &[broken, sq])?;
        let loss = g.apply(Sum, &[both])?;

        let err = g.backward(loss).unwrap_err();
        assert!(matches!(err, Error::Msg(_)));
        assert_eq!(g.state(), GraphState::Consumed);
        assert!(p.grad().is_none());
        assert!(matches!(g.backward(loss), Err(Error::GraphConsumed)));
        Ok(())
    }

    #[test]
    fn test_borrowed_param_is_an_error_not_a_panic() -> Result<()> {
        let p = Parameter::new(Tensor::from_vec(vec![3.0], 1)?);
        let mut g = Graph::new();
        let w = g.param(&p);
        let loss = g.apply(Sum, &[w])?;

        let guard = p.value();
        let err = g.backward(loss).unwrap_err();
        assert!(matches!(err, Error::ParameterInUse { .. }));
        drop(guard);
        assert_eq!(g.state(), GraphState::Consumed);
        assert!(p.grad().is_none());
        Ok(())
    }

    #[test]
    fn test_param_flush_is_all_or_nothing() -> Result<()> {
        let first = Parameter::new(Tensor::ones(2)?);
        let second = Parameter::new(Tensor::ones(2)?);
        let mut g = Graph::new();
        let a = g.param(&first);
        let b = g.param(&second);
        let prod = g.apply(Mul, &[a, b])?;
        let loss = g.apply(Sum, &[prod])?;

        // The second parameter no longer matches its bound snapshot.
        *second.value_mut() = Tensor::zeros(3)?;
        let err = g.backward(loss).unwrap_err();
        assert!(err.is_construction());
        assert!(first.grad().is_none());
        assert!(second.grad().is_none());
        Ok(())
    }
}
