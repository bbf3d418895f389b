use snafu::Snafu;
use tessera_dtype::{DType, Shape, TensorType};

use crate::op::Arity;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Replacement variable has a type that cannot stand in for the original.
    #[snafu(display("cannot replace variable of type {old} with {new} ({reason})"))]
    TypeIncompatible { old: TensorType, new: TensorType, reason: String },

    /// Operator applied to the wrong number of inputs.
    #[snafu(display("{op} expects {expected} inputs, got {got}"))]
    ArityViolation { op: String, expected: Arity, got: usize },

    /// Operator does not accept the given input dtypes.
    #[snafu(display("{op} does not accept input dtypes {dtypes:?}"))]
    DTypeMismatch { op: String, dtypes: Vec<DType> },

    /// Elementwise inputs cannot be broadcast against each other.
    #[snafu(display("{op}: cannot broadcast shapes {shapes:?}"))]
    BroadcastShapeMismatch { op: String, shapes: Vec<Shape> },

    /// Input has a rank or static shape the operator does not support.
    #[snafu(display("{op}: input {index} has type {ty}, expected {expected}"))]
    InvalidInputType { op: String, index: usize, ty: TensorType, expected: String },

    /// Graph references an input that was not declared.
    #[snafu(display("graph input {var} is reachable from the outputs but was not declared"))]
    MissingInput { var: String },

    /// Variable is not part of the graph.
    #[snafu(display("variable {var} is not in the graph"))]
    VariableNotInGraph { var: String },

    /// Declared graph input is owned by a node or is a constant.
    #[snafu(display("{var} cannot be a graph input: only free input variables can"))]
    NotAnInput { var: String },

    /// Dependency cycle between apply nodes.
    #[snafu(display("cycle detected at apply node {node}"))]
    Cycle { node: u64 },

    /// Client index disagrees with a recomputation from the outputs.
    #[snafu(display("graph client index is out of sync with its nodes"))]
    IndexOutOfSync,

    /// Composite inner graph does not satisfy the composite invariants.
    #[snafu(display("invalid composite: {reason}"))]
    InvalidComposite { reason: String },

    /// Constant payload disagrees with its declared shape.
    #[snafu(display("constant payload of shape {got:?} does not match {expected:?}"))]
    ConstantShape { expected: Vec<usize>, got: Vec<usize> },

    /// Tree rendering failed.
    #[snafu(display("failed to render graph tree: {message}"))]
    Render { message: String },
}
