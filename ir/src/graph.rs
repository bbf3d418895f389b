//! [`FunctionGraph`]: the container rewrites operate on.
//!
//! The graph owns every node reachable from its declared outputs back to its
//! declared inputs and keeps a reverse index from each variable to the places
//! that consume it. All mutation goes through [`FunctionGraph::replace`], which
//! keeps the index consistent and prunes nodes that lose every client.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use snafu::ensure;
use tracing::{debug, trace};

use crate::error::*;
use crate::node::{Apply, Variable, VariableKind};

/// A consumer of a variable.
#[derive(Debug, Clone)]
pub enum Client {
    /// Input `index` of `node`.
    Node { node: Arc<Apply>, index: usize },
    /// Declared graph output `index`.
    Output { index: usize },
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Node { node: a, index: i }, Self::Node { node: b, index: j }) => a.id() == b.id() && i == j,
            (Self::Output { index: i }, Self::Output { index: j }) => i == j,
            _ => false,
        }
    }
}

impl Eq for Client {}

impl Client {
    pub fn node(&self) -> Option<&Arc<Apply>> {
        match self {
            Self::Node { node, .. } => Some(node),
            Self::Output { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionGraph {
    inputs: Vec<Variable>,
    outputs: Vec<Variable>,
    nodes: HashMap<u64, Arc<Apply>>,
    variables: HashSet<Variable>,
    clients: HashMap<Variable, Vec<Client>>,
    revision: u64,
    imported: Vec<Arc<Apply>>,
}

impl FunctionGraph {
    /// Build a graph over everything reachable from `outputs`.
    ///
    /// Every free input reached must be listed in `inputs`.
    pub fn new(
        inputs: impl IntoIterator<Item = Variable>,
        outputs: impl IntoIterator<Item = Variable>,
    ) -> Result<Self> {
        let mut graph = Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: HashMap::new(),
            variables: HashSet::new(),
            clients: HashMap::new(),
            revision: 0,
            imported: Vec::new(),
        };

        for input in inputs {
            ensure!(input.is_input(), NotAnInputSnafu { var: format!("{input:?}") });
            if graph.variables.insert(input.clone()) {
                graph.clients.insert(input.clone(), Vec::new());
                graph.inputs.push(input);
            }
        }
        for output in outputs {
            graph.add_output(output)?;
        }
        graph.imported.clear();
        graph.revision = 0;
        Ok(graph)
    }

    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Variable] {
        &self.outputs
    }

    /// Apply nodes in creation order.
    pub fn apply_nodes(&self) -> Vec<Arc<Apply>> {
        let mut nodes: Vec<_> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id());
        nodes
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, node: &Apply) -> bool {
        self.nodes.contains_key(&node.id())
    }

    pub fn contains_variable(&self, var: &Variable) -> bool {
        self.variables.contains(var)
    }

    /// Consumers of `var`. Empty if `var` is not in the graph.
    pub fn clients(&self, var: &Variable) -> Vec<Client> {
        self.clients.get(var).cloned().unwrap_or_default()
    }

    /// Number of consumers of `var`.
    pub fn client_count(&self, var: &Variable) -> usize {
        self.clients.get(var).map_or(0, Vec::len)
    }

    /// Counter bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drain the nodes imported since the last call.
    pub fn take_imported(&mut self) -> Vec<Arc<Apply>> {
        std::mem::take(&mut self.imported)
    }

    /// Independent container over the same (immutable) nodes.
    pub fn clone_graph(&self) -> Self {
        let mut graph = self.clone();
        graph.imported.clear();
        graph
    }

    /// Import `var` and append it as a declared output.
    pub fn add_output(&mut self, var: Variable) -> Result<()> {
        let new_nodes = self.collect_new_nodes([&var])?;
        for node in &new_nodes {
            self.attach(node);
        }
        self.variables.insert(var.clone());
        let index = self.outputs.len();
        self.clients.entry(var.clone()).or_default().push(Client::Output { index });
        self.outputs.push(var);
        self.revision += 1;
        Ok(())
    }

    /// Apply nodes in dependency order.
    pub fn toposort(&self) -> Result<Vec<Arc<Apply>>> {
        let mut done = HashSet::new();
        let mut expanded = HashSet::new();
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(Arc<Apply>, bool)> =
            self.outputs.iter().rev().filter_map(|v| v.owner().cloned()).map(|n| (n, false)).collect();

        while let Some((node, processed)) = stack.pop() {
            if done.contains(&node.id()) {
                continue;
            }
            if processed {
                done.insert(node.id());
                result.push(node);
                continue;
            }
            if !expanded.insert(node.id()) {
                // Still on the current path: its inputs depend on it.
                return CycleSnafu { node: node.id() }.fail();
            }
            stack.push((node.clone(), true));
            for input in node.inputs().iter().rev() {
                if let Some(owner) = input.owner()
                    && !done.contains(&owner.id())
                {
                    ensure!(!expanded.contains(&owner.id()), CycleSnafu { node: owner.id() });
                    stack.push((owner.clone(), false));
                }
            }
        }

        Ok(result)
    }

    /// Replace every use of `old` with `new`.
    ///
    /// Fails with [`Error::TypeIncompatible`] when `new` cannot stand in for
    /// `old`; the graph is left untouched on any error.
    pub fn replace(&mut self, old: &Variable, new: &Variable, reason: &str) -> Result<()> {
        self.check_replacement(old, new, reason)?;
        self.apply_replacement(old, new, reason)
    }

    /// Replace several variables. Every pair is validated before anything is
    /// mutated; a pair whose `old` was already removed by an earlier pair is
    /// skipped.
    pub fn replace_all(&mut self, pairs: &[(Variable, Variable)], reason: &str) -> Result<()> {
        for (old, new) in pairs {
            self.check_replacement(old, new, reason)?;
        }
        for (old, new) in pairs {
            if !self.contains_variable(old) {
                debug!(var = %old, reason, "replacement target already removed, skipping");
                continue;
            }
            self.apply_replacement(old, new, reason)?;
        }
        Ok(())
    }

    fn check_replacement(&self, old: &Variable, new: &Variable, reason: &str) -> Result<()> {
        ensure!(self.contains_variable(old), VariableNotInGraphSnafu { var: format!("{old:?}") });
        ensure!(
            old.ty().is_compatible(new.ty()),
            TypeIncompatibleSnafu { old: old.ty().clone(), new: new.ty().clone(), reason }
        );
        self.collect_new_nodes([new])?;
        Ok(())
    }

    fn apply_replacement(&mut self, old: &Variable, new: &Variable, reason: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        trace!(old = %old, new = %new, reason, "replace");

        // Nodes `new` is built from keep consuming `old`.
        let protected = self.ancestor_ids(new);

        // Plan: rebuild every node downstream of `old` once, in dependency order.
        let mut subst: HashMap<Variable, Variable> = HashMap::from([(old.clone(), new.clone())]);
        let mut rebuilt = Vec::new();
        for node in self.downstream(old)? {
            if protected.contains(&node.id()) {
                continue;
            }
            let inputs: Vec<Variable> =
                node.inputs().iter().map(|v| subst.get(v).cloned().unwrap_or_else(|| v.clone())).collect();
            let replacement = node.with_inputs(inputs)?;
            for (before, after) in node.outputs().into_iter().zip(replacement.outputs()) {
                ensure!(
                    before.ty().is_compatible(after.ty()),
                    TypeIncompatibleSnafu { old: before.ty().clone(), new: after.ty().clone(), reason }
                );
                subst.insert(before, after);
            }
            rebuilt.push(replacement);
        }

        // Import the replacement subgraphs.
        let roots: Vec<Variable> = subst.values().cloned().collect();
        let new_nodes = self.collect_new_nodes(roots.iter())?;

        // Commit.
        for node in &new_nodes {
            self.attach(node);
        }
        for (index, output) in self.outputs.iter_mut().enumerate() {
            if let Some(replacement) = subst.get(output) {
                if let Some(clients) = self.clients.get_mut(output) {
                    clients.retain(|c| *c != Client::Output { index });
                }
                self.variables.insert(replacement.clone());
                self.clients.entry(replacement.clone()).or_default().push(Client::Output { index });
                *output = replacement.clone();
            }
        }
        self.prune(subst.keys().cloned().collect());
        self.revision += 1;

        debug!(reason, rebuilt = rebuilt.len(), imported = new_nodes.len(), "replaced variable");
        Ok(())
    }

    /// Nodes transitively consuming `var`, in dependency order.
    fn downstream(&self, var: &Variable) -> Result<Vec<Arc<Apply>>> {
        let mut affected = HashSet::new();
        let mut frontier = vec![var.clone()];
        while let Some(v) = frontier.pop() {
            for client in self.clients.get(&v).into_iter().flatten() {
                if let Client::Node { node, .. } = client
                    && affected.insert(node.id())
                {
                    frontier.extend(node.outputs());
                }
            }
        }
        Ok(self.toposort()?.into_iter().filter(|n| affected.contains(&n.id())).collect())
    }

    /// Ids of apply nodes `var` is computed from (within or outside the graph).
    fn ancestor_ids(&self, var: &Variable) -> HashSet<u64> {
        let mut seen = HashSet::new();
        let mut stack: Vec<Arc<Apply>> = var.owner().cloned().into_iter().collect();
        while let Some(node) = stack.pop() {
            if seen.insert(node.id()) {
                stack.extend(node.inputs().iter().filter_map(|v| v.owner().cloned()));
            }
        }
        seen
    }

    /// Nodes reachable from `roots` that are not yet in the graph, inputs first.
    ///
    /// Validates that every free input reached is a declared input.
    fn collect_new_nodes<'a>(&self, roots: impl IntoIterator<Item = &'a Variable>) -> Result<Vec<Arc<Apply>>> {
        let mut done: HashSet<u64> = HashSet::new();
        let mut result = Vec::new();
        let mut stack: Vec<(Arc<Apply>, bool)> = Vec::new();

        for root in roots {
            if let Some(owner) = self.new_owner(root)? {
                stack.push((owner, false));
            }
        }
        stack.reverse();

        while let Some((node, processed)) = stack.pop() {
            if done.contains(&node.id()) {
                continue;
            }
            if processed {
                done.insert(node.id());
                result.push(node);
                continue;
            }
            stack.push((node.clone(), true));
            for input in node.inputs().iter().rev() {
                if let Some(owner) = self.new_owner(input)?
                    && !done.contains(&owner.id())
                {
                    stack.push((owner, false));
                }
            }
        }
        Ok(result)
    }

    /// Owner of `var` if it still has to be imported.
    fn new_owner(&self, var: &Variable) -> Result<Option<Arc<Apply>>> {
        if self.variables.contains(var) {
            return Ok(None);
        }
        match var.kind() {
            VariableKind::Input => MissingInputSnafu { var: var.label() }.fail(),
            VariableKind::Constant(_) => Ok(None),
            VariableKind::Output { owner, .. } if self.nodes.contains_key(&owner.id()) => Ok(None),
            VariableKind::Output { owner, .. } => Ok(Some(owner.clone())),
        }
    }

    fn attach(&mut self, node: &Arc<Apply>) {
        for (index, input) in node.inputs().iter().enumerate() {
            self.variables.insert(input.clone());
            self.clients.entry(input.clone()).or_default().push(Client::Node { node: node.clone(), index });
        }
        for output in node.outputs() {
            self.variables.insert(output.clone());
            self.clients.entry(output).or_default();
        }
        self.nodes.insert(node.id(), node.clone());
        self.imported.push(node.clone());
    }

    fn detach(&mut self, node: &Arc<Apply>) {
        for input in node.inputs() {
            if let Some(clients) = self.clients.get_mut(input) {
                clients.retain(|c| c.node().is_none_or(|n| n.id() != node.id()));
            }
        }
        for output in node.outputs() {
            self.variables.remove(&output);
            self.clients.remove(&output);
        }
        self.nodes.remove(&node.id());
        self.imported.retain(|n| n.id() != node.id());
        trace!(node = node.id(), op = %node.op(), "pruned");
    }

    /// Remove nodes and constants that no longer have any client.
    fn prune(&mut self, mut worklist: Vec<Variable>) {
        while let Some(var) = worklist.pop() {
            if !self.contains_variable(&var) || var.is_input() || self.client_count(&var) > 0 {
                continue;
            }
            match var.kind() {
                VariableKind::Input => {}
                VariableKind::Constant(_) => {
                    self.variables.remove(&var);
                    self.clients.remove(&var);
                }
                VariableKind::Output { owner, .. } => {
                    let Some(node) = self.nodes.get(&owner.id()).cloned() else { continue };
                    if node.outputs().iter().all(|o| self.client_count(o) == 0) {
                        self.detach(&node);
                        worklist.extend(node.inputs().iter().cloned());
                    }
                }
            }
        }
    }

    /// Recompute the client index from scratch and compare.
    pub fn check_integrity(&self) -> Result<()> {
        let mut expected: HashMap<Variable, Vec<Client>> = HashMap::new();
        let mut variables: HashSet<Variable> = self.inputs.iter().cloned().collect();
        for input in &self.inputs {
            expected.entry(input.clone()).or_default();
        }
        for node in self.toposort()? {
            for (index, input) in node.inputs().iter().enumerate() {
                ensure!(
                    !input.is_input() || self.inputs.contains(input),
                    MissingInputSnafu { var: input.label() }
                );
                variables.insert(input.clone());
                expected.entry(input.clone()).or_default().push(Client::Node { node: node.clone(), index });
            }
            for output in node.outputs() {
                variables.insert(output.clone());
                expected.entry(output).or_default();
            }
        }
        for (index, output) in self.outputs.iter().enumerate() {
            variables.insert(output.clone());
            expected.entry(output.clone()).or_default().push(Client::Output { index });
        }

        let consistent = variables == self.variables
            && expected.len() == self.clients.len()
            && expected.iter().all(|(var, want)| {
                self.clients.get(var).is_some_and(|have| {
                    have.len() == want.len() && want.iter().all(|c| have.contains(c))
                })
            })
            && self.nodes.len() == self.toposort()?.len();
        ensure!(consistent, IndexOutOfSyncSnafu);
        Ok(())
    }
}
