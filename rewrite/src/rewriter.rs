//! Rewriter traits and the report they produce.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_ir::{Apply, FunctionGraph, OpKey, Variable};

use crate::config::RewriteConfig;
use crate::error::Result;

/// Local rewrite: looks at one node and may propose replacements for its
/// outputs.
pub trait NodeRewriter: Send + Sync {
    fn name(&self) -> &str;

    /// Operator keys this rewriter can fire on; `None` means every node.
    fn tracks(&self) -> Option<Vec<OpKey>> {
        None
    }

    /// One replacement per output of `node`, or `None` when nothing applies.
    ///
    /// Must not assume the replacement is accepted: the caller type-checks it
    /// against the graph.
    fn transform(&self, fgraph: &FunctionGraph, node: &Arc<Apply>) -> Result<Option<Vec<Variable>>>;

    /// Whether a failed replacement is an error rather than a skipped rewrite.
    fn must_succeed(&self) -> bool {
        false
    }
}

/// Global rewrite over a whole graph.
pub trait GraphRewriter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, fgraph: &mut FunctionGraph, config: &RewriteConfig) -> Result<RewriteReport>;
}

/// Outcome of applying a [`GraphRewriter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// Successful replacements per rewriter name.
    pub applied: BTreeMap<String, usize>,
    /// Full passes run (equilibrium rewriters only).
    pub passes: usize,
    /// A pass completed without any change.
    pub fixed_point: bool,
    /// Stopped early because a limit in [`RewriteConfig`] was reached.
    pub budget_exhausted: bool,
}

impl RewriteReport {
    pub fn total(&self) -> usize {
        self.applied.values().sum()
    }

    pub fn changed(&self) -> bool {
        self.total() > 0
    }

    pub fn count(&self, rewriter: &str) -> usize {
        self.applied.get(rewriter).copied().unwrap_or(0)
    }

    pub(crate) fn record(&mut self, rewriter: &str) {
        *self.applied.entry(rewriter.to_string()).or_default() += 1;
    }

    /// Fold a nested report into this one.
    pub(crate) fn merge(&mut self, other: RewriteReport) {
        for (name, count) in other.applied {
            *self.applied.entry(name).or_default() += count;
        }
        self.budget_exhausted |= other.budget_exhausted;
    }
}
