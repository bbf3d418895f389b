//! Expression graph model for tessera.
//!
//! # Module Organization
//!
//! - [`node`] - Variables, apply nodes and constants
//! - [`op`] - Apply-level operators and the [`OpClass`] hierarchy
//! - [`scalar`] - Scalar operators applied elementwise
//! - [`linalg`] - Linear algebra operators
//! - [`composite`] - Fused scalar sub-graphs used as one operator
//! - [`graph`] - [`FunctionGraph`], the container rewrites mutate
//! - [`special`] - Reference special functions on `f64`
//! - [`error`] - Error types and result handling

pub mod composite;
pub mod error;
pub mod graph;
pub mod linalg;
pub mod node;
pub mod op;
pub mod scalar;
pub mod special;
pub mod tree;

#[cfg(any(test, feature = "proptest"))]
pub mod test;

pub use composite::Composite;
pub use error::{Error, Result};
pub use graph::{Client, FunctionGraph};
pub use linalg::{LinalgKind, LinalgOp};
pub use node::{Apply, Constant, Variable, VariableKind};
pub use op::{Arity, Op, OpClass, OpKey};
pub use scalar::{BinaryOp, NFuncSpec, ScalarOp, TernaryOp, UnaryOp, VariadicOp};

pub use tessera_dtype::{DType, TensorType};
