//! Linkers: lower a rewritten graph into one [`Executable`] for a backend.

use std::fmt;
use std::sync::Arc;

use snafu::{ResultExt, ensure};
use tessera_dispatch::{DispatchConfig, DispatchRegistry, Program, Value, default_registry};
use tessera_dtype::TensorType;
use tessera_ir::FunctionGraph;
use tracing::debug;

use crate::error::*;

/// Turns a graph into something that can be called.
///
/// Linking either resolves every node or fails; there is no partial
/// executable.
pub trait Linker: Send + Sync {
    fn name(&self) -> &str;

    fn make_executable(&self, fgraph: &FunctionGraph) -> Result<Executable>;
}

/// Linker over the array dispatch registry.
#[derive(Clone)]
pub struct ArrayLinker {
    registry: Arc<DispatchRegistry>,
    config: DispatchConfig,
}

impl ArrayLinker {
    pub fn new(registry: Arc<DispatchRegistry>, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl Default for ArrayLinker {
    /// The process-wide registry with configuration from the environment.
    fn default() -> Self {
        Self::new(default_registry(), DispatchConfig::from_env())
    }
}

impl Linker for ArrayLinker {
    fn name(&self) -> &str {
        self.registry.backend()
    }

    #[tracing::instrument(skip_all, fields(linker = self.name(), nodes = fgraph.num_nodes()))]
    fn make_executable(&self, fgraph: &FunctionGraph) -> Result<Executable> {
        let program = self.registry.lower_graph(fgraph, &self.config.context()).context(DispatchSnafu)?;
        debug!(steps = program.num_steps(), "linked");
        Ok(Executable {
            program,
            input_types: fgraph.inputs().iter().map(|var| var.ty().clone()).collect(),
            input_names: fgraph.inputs().iter().map(|var| var.label()).collect(),
        })
    }
}

impl fmt::Debug for ArrayLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayLinker").field("registry", &self.registry).field("config", &self.config).finish()
    }
}

/// Linked graph: maps values for the declared inputs to the declared outputs.
#[derive(Debug)]
pub struct Executable {
    program: Program,
    input_types: Vec<TensorType>,
    input_names: Vec<String>,
}

impl Executable {
    pub fn input_types(&self) -> &[TensorType] {
        &self.input_types
    }

    pub fn nout(&self) -> usize {
        self.program.nout()
    }

    /// Operator names of the linked steps in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.program.step_names()
    }

    /// Run the graph on `args`, one per declared input.
    ///
    /// Every argument must have the rank of its input and agree with the
    /// dimension sizes the input type fixes.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>> {
        ensure!(
            args.len() == self.input_types.len(),
            InputMismatchSnafu {
                reason: format!("expected {} arguments, got {}", self.input_types.len(), args.len())
            }
        );
        for ((arg, ty), name) in args.iter().zip(&self.input_types).zip(&self.input_names) {
            check_input(arg, ty, name)?;
        }

        let outputs = self.program.run(args).context(DispatchSnafu)?;
        ensure!(outputs.len() == self.nout(), OutputAritySnafu { expected: self.nout(), got: outputs.len() });
        Ok(outputs)
    }
}

fn check_input(arg: &Value, ty: &TensorType, name: &str) -> Result<()> {
    let Some(ndim) = arg.ndim() else {
        return InputMismatchSnafu { reason: format!("{name} expects a tensor, got a {}", arg.kind()) }.fail();
    };
    ensure!(
        ndim == ty.ndim(),
        InputMismatchSnafu { reason: format!("{name} has rank {}, got a rank-{ndim} value", ty.ndim()) }
    );
    if let Some(array) = arg.as_array() {
        let fits = ty.shape.iter().zip(array.shape()).all(|(dim, &size)| dim.is_none_or(|d| d == size));
        ensure!(
            fits,
            InputMismatchSnafu { reason: format!("{name} has type {ty}, got shape {:?}", array.shape()) }
        );
    }
    Ok(())
}
