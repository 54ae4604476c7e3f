use crate::graph::NodeId;
use crate::param::ParamId;
use crate::shape::Shape;

/// All errors that can occur within Marten.
///
/// Errors fall into two families:
/// - construction errors: operands of an operator do not fit together
///   (shape, rank, arity). These are raised at forward time, before a node
///   is created, and always indicate a defect in how the graph is built.
/// - graph-state errors: the graph context is used outside of its
///   lifecycle (backward twice, backward on an empty graph, handles from
///   another graph).
///
/// Numerical degeneracies in log-based losses are never errors; they are
/// clamped by the operator (see `BinaryCrossEntropy`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two tensors (e.g., trying to add [2,3] + [4,5]).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// A shape with no dimensions was used to build a tensor.
    #[error("rank-0 shapes are not supported; use shape [1] for a scalar")]
    EmptyShape,

    /// Tried to read a scalar from a tensor with more than one element.
    #[error("not a scalar: tensor has shape {shape}")]
    NotAScalar { shape: Shape },

    /// Element count mismatch when creating from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Matrix multiplication dimension mismatch.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}], inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// An operator was applied to the wrong number of inputs.
    #[error("operator {op} expects {expected} inputs, got {got}")]
    ArityMismatch {
        op: &'static str,
        expected: String,
        got: usize,
    },

    /// backward() was already run on this graph.
    #[error("graph already consumed: backward() ran on this graph; call zero_grad() or reset() first")]
    GraphConsumed,

    /// backward() was called on a graph that holds no nodes.
    #[error("backward() called on an empty graph")]
    EmptyGraph,

    /// The graph was built with gradient recording disabled.
    #[error("gradient recording is disabled for this graph; no producers were recorded")]
    GradDisabled,

    /// A node handle was used with a graph that did not create it.
    #[error("node {node:?} does not belong to this graph")]
    ForeignNode { node: NodeId },

    /// A parameter's gradient could not be written because the caller
    /// still holds a borrow of it (e.g. a `p.value()` guard kept across
    /// `backward`).
    #[error("parameter {param:?} is borrowed elsewhere; drop value()/grad() guards before backward()")]
    ParameterInUse { param: ParamId },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// True for errors raised while wiring operator inputs together.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::RankMismatch { .. }
                | Error::EmptyShape
                | Error::ElementCountMismatch { .. }
                | Error::MatmulShapeMismatch { .. }
                | Error::ArityMismatch { .. }
        )
    }

    /// True for errors raised by misuse of the graph lifecycle.
    pub fn is_graph_state(&self) -> bool {
        matches!(
            self,
            Error::GraphConsumed
                | Error::EmptyGraph
                | Error::GradDisabled
                | Error::ForeignNode { .. }
                | Error::NotAScalar { .. }
                | Error::ParameterInUse { .. }
        )
    }
}

/// Convenience Result type used throughout Marten.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
