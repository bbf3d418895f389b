//! Operator dispatch for tessera.
//!
//! Turns apply nodes into backend callables. The registry resolves a node by
//! its operator class and then the class's declared ancestors; each class
//! holds a ranked list of strategies, some of which depend on an optional
//! special-function provider that is loaded lazily.
//!
//! # Module Organization
//!
//! - [`registry`] - [`DispatchRegistry`], strategies and resolution
//! - [`program`] - Graphs lowered to callables
//! - [`array`] - The `ndarray` backend's implementations
//! - [`provider`] - Optional special-function providers
//! - [`value`] - Values exchanged between callables
//! - [`config`] - Dispatch configuration and context
//! - [`error`] - Error types and result handling
//!
//! # Example
//!
//! ```ignore
//! use tessera_dispatch::{DispatchContext, Value, default_registry};
//!
//! let program = default_registry().lower_graph(&fgraph, &DispatchContext::new())?;
//! let outputs = program.run(&[Value::Scalar(1.5)])?;
//! ```

pub mod array;
pub mod config;
pub mod error;
pub mod program;
pub mod provider;
pub mod registry;
pub mod value;


pub use config::{DispatchConfig, DispatchContext};
pub use error::{Error, Result};
pub use program::Program;
pub use provider::{ProviderLoader, ProviderSlot, SpecialFunctionProvider, default_loader};
pub use registry::{DispatchRegistry, Strategy, default_registry};
pub use value::{Callable, Value};
