//! Dispatch configuration and the per-resolution context.

use bon::bon;
use tessera_ir::{FunctionGraph, ScalarOp};

/// Options for lowering graphs to backend callables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Wrap composites in a callable that evaluates them per element.
    pub vectorize: bool,
    /// Deepest composite nesting lowered; derived from the graph when unset.
    pub max_composite_depth: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { vectorize: true, max_composite_depth: None }
    }
}

#[bon]
impl DispatchConfig {
    #[builder(finish_fn = build)]
    pub fn builder(#[builder(default = true)] vectorize: bool, max_composite_depth: Option<usize>) -> Self {
        Self { vectorize, max_composite_depth }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_DISPATCH_VECTORIZE` - `0` or `false` disables composite vectorization (default: enabled)
    /// * `TESSERA_DISPATCH_MAX_COMPOSITE_DEPTH` - Composite nesting limit (default: derived from the graph)
    pub fn from_env() -> Self {
        let vectorize =
            std::env::var("TESSERA_DISPATCH_VECTORIZE").map(|v| !matches!(v.as_str(), "0" | "false")).unwrap_or(true);
        let max_composite_depth =
            std::env::var("TESSERA_DISPATCH_MAX_COMPOSITE_DEPTH").ok().and_then(|s| s.parse().ok());
        Self { vectorize, max_composite_depth }
    }

    pub fn context(&self) -> DispatchContext {
        DispatchContext { vectorize: self.vectorize, depth: 0, max_depth: self.max_composite_depth }
    }
}

/// State carried through one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    pub vectorize: bool,
    /// Composite nesting level of the graph being lowered; 0 for the outer graph.
    pub depth: usize,
    /// Nesting limit; `None` until a graph is lowered.
    pub max_depth: Option<usize>,
}

impl Default for DispatchContext {
    fn default() -> Self {
        DispatchConfig::default().context()
    }
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the nesting limit from `fgraph` if none is set.
    ///
    /// The derived limit counts apply nodes including those inside composites,
    /// which bounds the nesting of any well-formed graph. Never below 1.
    pub(crate) fn bounded_by(self, fgraph: &FunctionGraph) -> Self {
        let max_depth = self.max_depth.unwrap_or_else(|| graph_size(fgraph)).max(1);
        Self { max_depth: Some(max_depth), ..self }
    }

    /// Context for lowering one level deeper.
    pub(crate) fn nested(self) -> Self {
        Self { depth: self.depth + 1, ..self }
    }

    pub(crate) fn limit(&self) -> usize {
        self.max_depth.unwrap_or(usize::MAX)
    }
}

/// Apply nodes of `fgraph` counting composite inner graphs.
fn graph_size(fgraph: &FunctionGraph) -> usize {
    fgraph
        .apply_nodes()
        .iter()
        .map(|node| match node.op().scalar_op() {
            Some(ScalarOp::Composite(inner)) => 1 + graph_size(inner.fgraph()),
            _ => 1,
        })
        .sum()
}
