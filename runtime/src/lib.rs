//! Compilation and execution of tessera graphs.
//!
//! [`compile`] builds a [`FunctionGraph`](tessera_ir::FunctionGraph) from
//! declared inputs and outputs, applies the standard rewrites a [`Mode`]
//! selects, and hands the result to the mode's [`Linker`], which produces an
//! [`Executable`].
//!
//! # Module Organization
//!
//! - [`linker`] - [`Linker`] trait, [`ArrayLinker`] and [`Executable`]
//! - [`mode`] - [`Mode`] and the [`compile`] entry point
//! - [`error`] - Error types and result handling

pub mod error;
pub mod linker;
pub mod mode;


pub use error::{Error, Result};
pub use linker::{ArrayLinker, Executable, Linker};
pub use mode::{Mode, compile, evaluate, rewrite};
pub use tessera_dispatch::Value;
