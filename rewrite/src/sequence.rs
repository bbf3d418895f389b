use std::sync::Arc;

use tessera_ir::FunctionGraph;
use tracing::debug;

use crate::config::RewriteConfig;
use crate::error::Result;
use crate::rewriter::{GraphRewriter, RewriteReport};

/// Runs graph rewriters one after another, each once.
pub struct SequenceRewriter {
    name: String,
    rewriters: Vec<Arc<dyn GraphRewriter>>,
}

impl SequenceRewriter {
    pub fn new(name: impl Into<String>, rewriters: Vec<Arc<dyn GraphRewriter>>) -> Self {
        Self { name: name.into(), rewriters }
    }

    /// Names of the rewriters in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.rewriters.iter().map(|r| r.name()).collect()
    }
}

impl GraphRewriter for SequenceRewriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, fields(rewriter = %self.name))]
    fn apply(&self, fgraph: &mut FunctionGraph, config: &RewriteConfig) -> Result<RewriteReport> {
        let mut report = RewriteReport { fixed_point: true, ..Default::default() };
        for rewriter in &self.rewriters {
            let nested = rewriter.apply(fgraph, config)?;
            debug!(stage = rewriter.name(), rewrites = nested.total(), "stage done");
            report.passes += nested.passes;
            report.fixed_point &= nested.fixed_point;
            report.merge(nested);
        }
        Ok(report)
    }
}
