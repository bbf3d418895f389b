//! Fixed-point rewriting.

use std::sync::Arc;

use tessera_ir::FunctionGraph;
use tracing::{debug, warn};

use crate::config::RewriteConfig;
use crate::error::Result;
use crate::rewriter::{GraphRewriter, NodeRewriter, RewriteReport};
use crate::walk::{RewriterSet, WalkOrder, walk};

/// Applies its rewriters until a full pass changes nothing or the budget
/// runs out.
///
/// One pass runs the global rewriters, walks the graph with the node
/// rewriters (visiting newly created nodes too), then walks it once more with
/// the final rewriters.
pub struct EquilibriumRewriter {
    name: String,
    node_rewriters: RewriterSet,
    global_rewriters: Vec<Arc<dyn GraphRewriter>>,
    final_rewriters: RewriterSet,
}

impl EquilibriumRewriter {
    pub fn new(name: impl Into<String>, node_rewriters: Vec<Arc<dyn NodeRewriter>>) -> Self {
        Self {
            name: name.into(),
            node_rewriters: RewriterSet::new(node_rewriters),
            global_rewriters: Vec::new(),
            final_rewriters: RewriterSet::default(),
        }
    }

    pub fn with_global(mut self, rewriters: Vec<Arc<dyn GraphRewriter>>) -> Self {
        self.global_rewriters = rewriters;
        self
    }

    pub fn with_final(mut self, rewriters: Vec<Arc<dyn NodeRewriter>>) -> Self {
        self.final_rewriters = RewriterSet::new(rewriters);
        self
    }
}

impl GraphRewriter for EquilibriumRewriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, fields(rewriter = %self.name))]
    fn apply(&self, fgraph: &mut FunctionGraph, config: &RewriteConfig) -> Result<RewriteReport> {
        let mut budget = config.budget();
        let mut report = RewriteReport::default();

        while report.passes < config.max_passes {
            report.passes += 1;
            let mut changed = false;

            for global in &self.global_rewriters {
                let nested = global.apply(fgraph, config)?;
                changed |= nested.changed();
                report.merge(nested);
            }
            changed |= walk(fgraph, &self.node_rewriters, WalkOrder::InToOut, false, &mut budget, &mut report)?;
            changed |= walk(fgraph, &self.final_rewriters, WalkOrder::InToOut, false, &mut budget, &mut report)?;

            if report.budget_exhausted {
                break;
            }
            if !changed {
                report.fixed_point = true;
                break;
            }
        }

        if !report.fixed_point {
            report.budget_exhausted = true;
            warn!(
                rewriter = %self.name,
                passes = report.passes,
                rewrites = report.total(),
                "rewrite budget exhausted before reaching a fixed point"
            );
        } else {
            debug!(rewriter = %self.name, passes = report.passes, rewrites = report.total(), "fixed point reached");
        }
        Ok(report)
    }
}
