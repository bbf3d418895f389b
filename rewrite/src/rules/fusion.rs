//! Elementwise fusion.
//!
//! Chains of single-output elementwise nodes whose intermediate results have
//! no other consumer are collapsed into one node applying a [`Composite`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use snafu::ResultExt;
use tessera_ir::{Apply, Composite, FunctionGraph, Op, TensorType, Variable};
use tracing::{debug, trace};

use crate::config::RewriteConfig;
use crate::error::*;
use crate::rewriter::{GraphRewriter, RewriteReport};

/// Graph rewriter fusing elementwise chains into composites.
#[derive(Debug, Clone)]
pub struct ElemwiseFusion {
    name: String,
}

impl Default for ElemwiseFusion {
    fn default() -> Self {
        Self { name: "elemwise_fusion".into() }
    }
}

/// Nodes fused into one composite, root last.
struct Group {
    members: Vec<Arc<Apply>>,
    externals: Vec<Variable>,
}

fn is_fusable(node: &Apply) -> bool {
    matches!(node.op(), Op::Elemwise(_)) && node.nout() == 1
}

impl ElemwiseFusion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow a group from `root` through producers that only feed the group.
    fn collect(fgraph: &FunctionGraph, root: &Arc<Apply>, order: &HashMap<u64, usize>) -> Group {
        let mut members = vec![Arc::clone(root)];
        let mut seen: HashSet<u64> = HashSet::from([root.id()]);
        let mut stack: Vec<Variable> = root.inputs().to_vec();

        while let Some(var) = stack.pop() {
            let Some(owner) = var.owner() else { continue };
            if seen.contains(&owner.id()) || !is_fusable(owner) || fgraph.client_count(&var) != 1 {
                continue;
            }
            seen.insert(owner.id());
            members.push(Arc::clone(owner));
            stack.extend(owner.inputs().iter().cloned());
        }
        members.sort_by_key(|n| order.get(&n.id()).copied().unwrap_or(usize::MAX));

        let produced: HashSet<u64> = members.iter().map(|n| n.output(0).id()).collect();
        let mut externals: Vec<Variable> = Vec::new();
        for input in members.iter().flat_map(|n| n.inputs()) {
            if !produced.contains(&input.id()) && !externals.contains(input) {
                externals.push(input.clone());
            }
        }
        Group { members, externals }
    }

    /// Build the composite for `group` and the node applying it.
    fn fuse(group: &Group) -> tessera_ir::Result<Option<Variable>> {
        let mut mapped: HashMap<u64, Variable> = HashMap::new();
        let mut inner_inputs = Vec::new();
        let mut outer_inputs = Vec::new();

        for (i, external) in group.externals.iter().enumerate() {
            let inner = match external.as_constant() {
                Some(constant) if external.ndim() == 0 => Variable::constant(constant.clone()),
                _ => {
                    let input = Variable::input(format!("i{i}"), TensorType::scalar(external.dtype()));
                    inner_inputs.push(input.clone());
                    outer_inputs.push(external.clone());
                    input
                }
            };
            mapped.insert(external.id(), inner);
        }
        // Constant groups are left to constant folding.
        if outer_inputs.iter().all(Variable::is_constant) {
            return Ok(None);
        }

        let mut last = None;
        for member in &group.members {
            let inputs = member.inputs().iter().map(|v| mapped.get(&v.id()).cloned()).collect::<Option<Vec<_>>>();
            let Some(inputs) = inputs else { return Ok(None) };
            let inner = Apply::new(member.op().clone(), inputs)?.output(0);
            mapped.insert(member.output(0).id(), inner.clone());
            last = Some(inner);
        }
        let Some(inner_out) = last else { return Ok(None) };

        let composite = Composite::new(inner_inputs, vec![inner_out])?;
        Ok(Some(Variable::elemwise(composite, outer_inputs)?))
    }

    /// One sweep from the outputs toward the inputs. Returns the number of
    /// groups fused.
    fn sweep(&self, fgraph: &mut FunctionGraph) -> Result<usize> {
        let nodes = fgraph.toposort().context(GraphSnafu)?;
        let order: HashMap<u64, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
        let mut consumed: HashSet<u64> = HashSet::new();
        let mut fused = 0;

        for root in nodes.iter().rev() {
            if consumed.contains(&root.id()) || !is_fusable(root) || !fgraph.contains_node(root) {
                continue;
            }
            let group = Self::collect(fgraph, root, &order);
            if group.members.len() < 2 {
                continue;
            }
            let old = root.output(0);
            let Some(new) = Self::fuse(&group).context(GraphSnafu)? else { continue };
            if !old.ty().is_compatible(new.ty()) {
                trace!(old = %old.ty(), new = %new.ty(), "fused node type mismatch, skipping");
                continue;
            }
            fgraph.replace(&old, &new, &self.name).context(GraphSnafu)?;
            trace!(nodes = group.members.len(), inputs = group.externals.len(), "fused elementwise group");
            consumed.extend(group.members.iter().map(|n| n.id()));
            fused += 1;
        }
        Ok(fused)
    }
}

impl GraphRewriter for ElemwiseFusion {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, fields(rewriter = %self.name))]
    fn apply(&self, fgraph: &mut FunctionGraph, config: &RewriteConfig) -> Result<RewriteReport> {
        let mut report = RewriteReport::default();
        // Every fusion removes at least one node, so sweeps terminate.
        while report.passes < config.max_passes {
            report.passes += 1;
            let fused = self.sweep(fgraph)?;
            for _ in 0..fused {
                report.record(&self.name);
            }
            if fused == 0 {
                report.fixed_point = true;
                break;
            }
        }
        debug!(groups = report.total(), passes = report.passes, "elementwise fusion done");
        Ok(report)
    }
}
