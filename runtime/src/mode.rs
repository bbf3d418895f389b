//! Compilation modes and the compile entry point.
//!
//! A [`Mode`] names which standard rewrites run, under which budget, and
//! which [`Linker`] turns the result into an [`Executable`].
//!
//! # Example
//!
//! ```ignore
//! let x = Variable::vector("x", DType::Float64);
//! let out = x.try_exp()?.try_log()?;
//! let executable = compile(&[x], &[out], &Mode::array())?;
//! let outputs = executable.call(&[Value::Array(values)])?;
//! ```

use std::fmt;
use std::sync::Arc;

use bon::bon;
use snafu::ResultExt;
use tessera_dispatch::Value;
use tessera_ir::{FunctionGraph, Variable};
use tessera_rewrite::standard::{CXX_ONLY, FAST_COMPILE, FAST_RUN};
use tessera_rewrite::{RewriteConfig, RewriteDb, RewriteQuery, default_rewrites};
use tracing::{debug, warn};

use crate::error::*;
use crate::linker::{ArrayLinker, Executable, Linker};

/// Rewrites and linker used by [`compile`].
#[derive(Clone)]
pub struct Mode {
    pub linker: Arc<dyn Linker>,
    /// Selects stages and rules from the standard rewrite database.
    pub query: RewriteQuery,
    pub config: RewriteConfig,
}

#[bon]
impl Mode {
    #[builder(finish_fn = build)]
    pub fn builder(
        linker: Option<Arc<dyn Linker>>,
        #[builder(default = fast_run_query())] query: RewriteQuery,
        #[builder(default)] config: RewriteConfig,
    ) -> Self {
        Self { linker: linker.unwrap_or_else(|| Arc::new(ArrayLinker::default())), query, config }
    }

    /// Every rewrite suitable for the array backend.
    pub fn array() -> Self {
        Self::builder().build()
    }

    /// Only the cheap canonicalizing rewrites.
    pub fn fast_compile() -> Self {
        Self::builder().query(RewriteQuery::new().including([FAST_COMPILE]).excluding([CXX_ONLY])).build()
    }

    /// Same linker and budget with a different rewrite selection.
    pub fn with_query(&self, query: RewriteQuery) -> Self {
        Self { query, ..self.clone() }
    }

    /// Same rewrites with a different linker.
    pub fn with_linker(&self, linker: Arc<dyn Linker>) -> Self {
        Self { linker, ..self.clone() }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::array()
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("linker", &self.linker.name())
            .field("query", &self.query)
            .field("config", &self.config)
            .finish()
    }
}

fn fast_run_query() -> RewriteQuery {
    RewriteQuery::new().including([FAST_RUN]).excluding([CXX_ONLY])
}

/// Build a graph from `inputs` to `outputs`, rewrite it and link it.
#[tracing::instrument(skip_all, fields(linker = mode.linker.name(), inputs = inputs.len(), outputs = outputs.len()))]
pub fn compile(inputs: &[Variable], outputs: &[Variable], mode: &Mode) -> Result<Executable> {
    let mut fgraph = FunctionGraph::new(inputs.iter().cloned(), outputs.iter().cloned()).context(GraphSnafu)?;
    rewrite(&mut fgraph, mode)?;
    mode.linker.make_executable(&fgraph)
}

/// Apply the mode's rewrites to `fgraph` in place.
pub fn rewrite(fgraph: &mut FunctionGraph, mode: &Mode) -> Result<()> {
    let rewriter = default_rewrites().and_then(|db| db.query(&mode.query)).context(RewriteSnafu)?;
    let report = rewriter.apply(fgraph, &mode.config).context(RewriteSnafu)?;
    if report.budget_exhausted {
        warn!(passes = report.passes, rewrites = report.total(), "rewrite budget exhausted");
    }
    debug!(rewrites = report.total(), nodes = fgraph.num_nodes(), "rewritten");
    Ok(())
}

/// Compile and run once.
pub fn evaluate(inputs: &[Variable], outputs: &[Variable], args: &[Value], mode: &Mode) -> Result<Vec<Value>> {
    compile(inputs, outputs, mode)?.call(args)
}
