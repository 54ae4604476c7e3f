// Parameter — a persistent, trainable leaf Node
//
// Graphs live for one training step; learnable weights live for the whole
// run. A Parameter is the bridge: a shared handle to a leaf Node (value +
// gradient accumulator) owned jointly by a layer and an optimizer.
//
// LIFECYCLE PER STEP:
//
//   1. graph.param(&p)       binds p into the step's graph as a leaf whose
//                            value is a copy of p's current value.
//   2. graph.backward(loss)  once the whole traversal succeeds, the leaf's
//                            gradient is ADDED into p's accumulator.
//   3. optimizer.step()      reads p.grad(), updates p.value_mut() in place.
//   4. optimizer.zero_grad() (or p.zero_grad()) before the next step.
//
// THREADING:
//
//   The handle is Rc<RefCell<..>>, so a Parameter is deliberately !Send.
//   Parallel training runs must each build their own parameters; a single
//   mutable Node is never shared across threads.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::graph::Node;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Unique identifier for a parameter. Used by graphs to bind each
/// parameter at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u64);

impl ParamId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        ParamId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared handle to a persistent trainable leaf Node.
///
/// Cloning the handle is cheap and yields the same parameter.
#[derive(Clone)]
pub struct Parameter {
    id: ParamId,
    node: Rc<RefCell<Node>>,
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node.borrow();
        write!(
            f,
            "Parameter(id={:?}, shape={}, has_grad={})",
            self.id,
            node.value().shape(),
            node.grad().is_some()
        )
    }
}

impl Parameter {
    /// Wrap an initial value as a trainable parameter.
    pub fn new(value: Tensor) -> Self {
        Parameter {
            id: ParamId::new(),
            node: Rc::new(RefCell::new(Node::leaf(value))),
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn shape(&self) -> Shape {
        self.node.borrow().value().shape().clone()
    }

    pub fn elem_count(&self) -> usize {
        self.node.borrow().value().elem_count()
    }

    /// Borrow the current value.
    pub fn value(&self) -> Ref<'_, Tensor> {
        Ref::map(self.node.borrow(), Node::value)
    }

    /// Mutably borrow the value (optimizer updates).
    pub fn value_mut(&self) -> RefMut<'_, Tensor> {
        RefMut::map(self.node.borrow_mut(), Node::value_mut)
    }

    /// Borrow the accumulated gradient; None until the first backward pass
    /// that reached this parameter.
    pub fn grad(&self) -> Option<Ref<'_, Tensor>> {
        Ref::filter_map(self.node.borrow(), Node::grad).ok()
    }

    /// Mutably borrow the accumulated gradient, if any.
    pub fn grad_mut(&self) -> Option<RefMut<'_, Tensor>> {
        RefMut::filter_map(self.node.borrow_mut(), Node::grad_mut).ok()
    }

    /// Mutably borrow the underlying node, e.g. to read the gradient and
    /// write the value in one borrow via [`Node::value_and_grad_mut`].
    pub fn node_mut(&self) -> RefMut<'_, Node> {
        self.node.borrow_mut()
    }

    /// Reset the gradient accumulator to zeros (idempotent).
    pub fn zero_grad(&self) {
        self.node.borrow_mut().zero_grad();
    }

    /// Drop the gradient accumulator entirely.
    pub fn clear_grad(&self) {
        self.node.borrow_mut().clear_grad();
    }

    /// A copy of the current value, used when binding into a graph.
    pub(crate) fn snapshot(&self) -> Tensor {
        self.node.borrow().value().clone()
    }

    /// Mutably borrow the node, failing instead of panicking when a guard
    /// from `value()`/`grad()` is still alive.
    pub(crate) fn try_node_mut(&self) -> Result<RefMut<'_, Node>> {
        self.node
            .try_borrow_mut()
            .map_err(|_| Error::ParameterInUse { param: self.id })
    }

    /// True if both handles refer to the same parameter.
    pub fn same_as(&self, other: &Parameter) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

/// Drop repeated handles to the same parameter, keeping first occurrences
/// in order. A layer reused twice in a model lists its weights twice;
/// optimizers and norms must see each parameter once.
pub fn unique_parameters(params: impl IntoIterator<Item = Parameter>) -> Vec<Parameter> {
    let mut seen = HashSet::new();
    params.into_iter().filter(|p| seen.insert(p.id())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_grad_lifecycle() -> Result<()> {
        let p = Parameter::new(Tensor::from_vec(vec![1.0, 2.0], 2)?);
        assert!(p.grad().is_none());

        p.try_node_mut()?.accumulate_grad(&Tensor::from_vec(vec![0.5, 0.5], 2)?)?;
        p.try_node_mut()?.accumulate_grad(&Tensor::from_vec(vec![0.25, 1.0], 2)?)?;
        assert_eq!(p.grad().map(|g| g.to_vec()), Some(vec![0.75, 1.5]));

        p.zero_grad();
        p.zero_grad();
        assert_eq!(p.grad().map(|g| g.to_vec()), Some(vec![0.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_clones_share_state() -> Result<()> {
        let p = Parameter::new(Tensor::zeros(3)?);
        let q = p.clone();
        q.value_mut().fill(4.0);
        assert_eq!(p.value().to_vec(), vec![4.0, 4.0, 4.0]);
        assert!(p.same_as(&q));
        assert_eq!(p.id(), q.id());

        let other = Parameter::new(Tensor::zeros(3)?);
        assert!(!p.same_as(&other));
        assert_ne!(p.id(), other.id());
        Ok(())
    }

    #[test]
    fn test_accumulate_while_borrowed_is_an_error() -> Result<()> {
        let p = Parameter::new(Tensor::zeros(2)?);
        let guard = p.value();
        let err = p.try_node_mut().map(|_| ()).unwrap_err();
        assert!(matches!(err, Error::ParameterInUse { .. }));
        assert!(err.is_graph_state());
        drop(guard);
        assert!(p.grad().is_none());
        Ok(())
    }

    #[test]
    fn test_unique_parameters_keeps_first_occurrence() -> Result<()> {
        let a = Parameter::new(Tensor::zeros(1)?);
        let b = Parameter::new(Tensor::zeros(2)?);
        let unique = unique_parameters(vec![a.clone(), b.clone(), a.clone(), b.clone()]);
        assert_eq!(unique.len(), 2);
        assert!(unique[0].same_as(&a));
        assert!(unique[1].same_as(&b));
        Ok(())
    }

    #[test]
    fn test_grad_shape_checked() -> Result<()> {
        let p = Parameter::new(Tensor::zeros((2, 2))?);
        assert!(p.try_node_mut()?.accumulate_grad(&Tensor::zeros(4)?).is_err());
        Ok(())
    }
}
