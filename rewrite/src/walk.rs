//! Node walks: apply node rewriters over a graph in topological order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use snafu::ResultExt;
use tessera_ir::{Apply, FunctionGraph, OpKey, Variable};
use tracing::{debug, trace, warn};

use crate::config::{Budget, RewriteConfig};
use crate::error::*;
use crate::rewriter::{GraphRewriter, NodeRewriter, RewriteReport};

/// Direction of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// Inputs before the nodes that consume them.
    #[default]
    InToOut,
    /// Consumers before their inputs.
    OutToIn,
}

/// Node rewriters indexed by the keys they track.
///
/// For a given key the candidates are the rewriters tracking that key plus
/// the ones tracking everything, in registration order.
#[derive(Clone, Default)]
pub(crate) struct RewriterSet {
    rewriters: Vec<Arc<dyn NodeRewriter>>,
    by_key: HashMap<OpKey, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl RewriterSet {
    pub(crate) fn new(rewriters: Vec<Arc<dyn NodeRewriter>>) -> Self {
        let mut by_key: HashMap<OpKey, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        for (idx, rewriter) in rewriters.iter().enumerate() {
            match rewriter.tracks() {
                Some(keys) => {
                    for key in keys {
                        by_key.entry(key).or_default().push(idx);
                    }
                }
                None => wildcard.push(idx),
            }
        }
        Self { rewriters, by_key, wildcard }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rewriters.is_empty()
    }

    fn candidates(&self, key: &OpKey) -> Vec<&Arc<dyn NodeRewriter>> {
        let mut indices: Vec<usize> = self.by_key.get(key).into_iter().flatten().copied().collect();
        indices.extend(&self.wildcard);
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|i| &self.rewriters[i]).collect()
    }
}

/// Validate and commit a proposed replacement. Returns whether the graph
/// changed.
pub(crate) fn apply_replacement(
    fgraph: &mut FunctionGraph,
    rewriter: &dyn NodeRewriter,
    node: &Arc<Apply>,
    replacement: Vec<Variable>,
) -> Result<bool> {
    let outputs = node.outputs();
    if replacement.len() != outputs.len() {
        if rewriter.must_succeed() {
            return ReplacementCountSnafu {
                rewriter: rewriter.name(),
                expected: outputs.len(),
                got: replacement.len(),
            }
            .fail();
        }
        warn!(rewriter = rewriter.name(), expected = outputs.len(), got = replacement.len(), "wrong replacement count");
        return Ok(false);
    }

    let pairs: Vec<(Variable, Variable)> = outputs
        .into_iter()
        .zip(replacement)
        .filter(|(old, new)| old != new && fgraph.contains_variable(old))
        .collect();
    if pairs.is_empty() {
        return Ok(false);
    }

    match fgraph.replace_all(&pairs, rewriter.name()) {
        Ok(()) => Ok(true),
        Err(source) if rewriter.must_succeed() => Err(source).context(RewriteFailedSnafu { rewriter: rewriter.name() }),
        Err(error) => {
            warn!(rewriter = rewriter.name(), node = node.id(), %error, "rewrite rejected");
            Ok(false)
        }
    }
}

/// Run `rewriters` over every node once (plus newly imported nodes unless
/// `ignore_newtrees`). Returns whether anything changed.
pub(crate) fn walk(
    fgraph: &mut FunctionGraph,
    rewriters: &RewriterSet,
    order: WalkOrder,
    ignore_newtrees: bool,
    budget: &mut Budget,
    report: &mut RewriteReport,
) -> Result<bool> {
    if rewriters.is_empty() {
        return Ok(false);
    }

    let mut queue: VecDeque<Arc<Apply>> = fgraph.toposort().context(GraphSnafu)?.into();
    if order == WalkOrder::OutToIn {
        queue = queue.into_iter().rev().collect();
    }
    fgraph.take_imported();

    let mut changed = false;
    while let Some(node) = queue.pop_front() {
        if !fgraph.contains_node(&node) {
            continue;
        }
        if budget.exhausted() {
            report.budget_exhausted = true;
            break;
        }

        for rewriter in rewriters.candidates(&node.op().key()) {
            trace!(rewriter = rewriter.name(), node = node.id(), op = %node.op(), "trying rewriter");
            let proposal = match rewriter.transform(fgraph, &node) {
                Ok(proposal) => proposal,
                Err(error) if rewriter.must_succeed() => return Err(error),
                Err(error) => {
                    warn!(rewriter = rewriter.name(), node = node.id(), %error, "rewriter failed");
                    continue;
                }
            };
            let Some(replacement) = proposal else { continue };

            if apply_replacement(fgraph, rewriter.as_ref(), &node, replacement)? {
                debug!(rewriter = rewriter.name(), node = node.id(), op = %node.op(), "rewrite applied");
                report.record(rewriter.name());
                budget.spend();
                changed = true;

                let imported = fgraph.take_imported();
                if !ignore_newtrees {
                    queue.extend(imported);
                }
                break;
            }
        }
    }

    Ok(changed)
}

/// Graph rewriter that walks the graph once applying node rewriters.
pub struct WalkingRewriter {
    name: String,
    rewriters: RewriterSet,
    order: WalkOrder,
    ignore_newtrees: bool,
}

impl WalkingRewriter {
    pub fn new(name: impl Into<String>, rewriters: Vec<Arc<dyn NodeRewriter>>, order: WalkOrder) -> Self {
        Self { name: name.into(), rewriters: RewriterSet::new(rewriters), order, ignore_newtrees: false }
    }

    /// Walk from inputs to outputs.
    pub fn in2out(name: impl Into<String>, rewriters: Vec<Arc<dyn NodeRewriter>>) -> Self {
        Self::new(name, rewriters, WalkOrder::InToOut)
    }

    /// Walk from outputs to inputs.
    pub fn out2in(name: impl Into<String>, rewriters: Vec<Arc<dyn NodeRewriter>>) -> Self {
        Self::new(name, rewriters, WalkOrder::OutToIn)
    }

    /// Do not revisit nodes created by replacements during the walk.
    pub fn ignore_newtrees(mut self, ignore: bool) -> Self {
        self.ignore_newtrees = ignore;
        self
    }
}

impl GraphRewriter for WalkingRewriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, fields(rewriter = %self.name))]
    fn apply(&self, fgraph: &mut FunctionGraph, config: &RewriteConfig) -> Result<RewriteReport> {
        let mut budget = config.budget();
        let mut report = RewriteReport::default();
        let changed = walk(fgraph, &self.rewriters, self.order, self.ignore_newtrees, &mut budget, &mut report)?;
        report.passes = 1;
        report.fixed_point = !changed && !report.budget_exhausted;
        Ok(report)
    }
}
