//! Closure-based node rewriter with OpKey-indexed dispatch.
//!
//! # Architecture
//!
//! `PatternMatcher` uses a two-tier dispatch strategy:
//!
//! 1. **Indexed rules**: stored in a `HashMap<OpKey, Vec<Rule>>`; only the
//!    rules registered for the node's key are tried
//! 2. **Wildcard rules**: tried after the indexed rules, for every node
//!
//! Within a tier rules are tried in registration order and the first rule
//! that proposes a replacement wins.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::ResultExt;
use tessera_ir::{Apply, FunctionGraph, OpKey, Variable};

use crate::error::*;
use crate::rewriter::NodeRewriter;

/// Rule closure: proposes one replacement per node output.
///
/// Rules build replacements with the graph constructors and return their
/// errors directly; the matcher wraps them.
pub type Rule = Arc<dyn Fn(&FunctionGraph, &Arc<Apply>) -> tessera_ir::Result<Option<Vec<Variable>>> + Send + Sync>;

/// Named [`NodeRewriter`] built from closures.
///
/// ```ignore
/// let mut matcher = PatternMatcher::new("local_neg_neg");
/// matcher.add(&[OpKey::Unary(UnaryOp::Neg)], |_, node| {
///     let Some(inner) = node.inputs()[0].owner() else { return Ok(None) };
///     ...
/// });
/// ```
pub struct PatternMatcher {
    name: String,
    indexed: HashMap<OpKey, Vec<Rule>>,
    wildcards: Vec<Rule>,
    must_succeed: bool,
}

impl PatternMatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), indexed: HashMap::new(), wildcards: Vec::new(), must_succeed: false }
    }

    /// Mark failures of this matcher's replacements as hard errors.
    pub fn strict(mut self) -> Self {
        self.must_succeed = true;
        self
    }

    /// Add a rule for specific keys. An empty `keys` adds a wildcard.
    pub fn add<F>(&mut self, keys: &[OpKey], rule: F)
    where
        F: Fn(&FunctionGraph, &Arc<Apply>) -> tessera_ir::Result<Option<Vec<Variable>>> + Send + Sync + 'static,
    {
        let rule: Rule = Arc::new(rule);
        if keys.is_empty() {
            self.wildcards.push(rule);
            return;
        }
        for key in keys {
            self.indexed.entry(*key).or_default().push(Arc::clone(&rule));
        }
    }

    /// Add a rule tried for every node.
    pub fn add_wildcard<F>(&mut self, rule: F)
    where
        F: Fn(&FunctionGraph, &Arc<Apply>) -> tessera_ir::Result<Option<Vec<Variable>>> + Send + Sync + 'static,
    {
        self.wildcards.push(Arc::new(rule));
    }

    /// Builder form of [`PatternMatcher::add`].
    pub fn with<F>(mut self, keys: &[OpKey], rule: F) -> Self
    where
        F: Fn(&FunctionGraph, &Arc<Apply>) -> tessera_ir::Result<Option<Vec<Variable>>> + Send + Sync + 'static,
    {
        self.add(keys, rule);
        self
    }

    /// Number of registered (key, rule) pairs plus wildcards.
    pub fn len(&self) -> usize {
        self.indexed.values().map(Vec::len).sum::<usize>() + self.wildcards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.wildcards.is_empty()
    }
}

impl NodeRewriter for PatternMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn tracks(&self) -> Option<Vec<OpKey>> {
        if !self.wildcards.is_empty() {
            return None;
        }
        let mut keys: Vec<OpKey> = self.indexed.keys().copied().collect();
        keys.sort_by_key(|k| k.to_string());
        Some(keys)
    }

    fn transform(&self, fgraph: &FunctionGraph, node: &Arc<Apply>) -> Result<Option<Vec<Variable>>> {
        let key = node.op().key();

        if let Some(rules) = self.indexed.get(&key) {
            tracing::trace!(matcher = %self.name, op_key = %key, rule_count = rules.len(), "trying indexed rules");
            for (idx, rule) in rules.iter().enumerate() {
                if let Some(replacement) = rule(fgraph, node).context(GraphSnafu)? {
                    tracing::debug!(matcher = %self.name, op_key = %key, rule_idx = idx, "rule matched");
                    return Ok(Some(replacement));
                }
            }
        }

        for (idx, rule) in self.wildcards.iter().enumerate() {
            if let Some(replacement) = rule(fgraph, node).context(GraphSnafu)? {
                tracing::debug!(matcher = %self.name, wildcard_idx = idx, "wildcard rule matched");
                return Ok(Some(replacement));
            }
        }

        Ok(None)
    }

    fn must_succeed(&self) -> bool {
        self.must_succeed
    }
}

impl std::ops::Add for PatternMatcher {
    type Output = Self;

    /// Combine two matchers under the left name. Rules from `rhs` are appended.
    fn add(mut self, rhs: Self) -> Self::Output {
        for (key, rules) in rhs.indexed {
            self.indexed.entry(key).or_default().extend(rules);
        }
        self.wildcards.extend(rhs.wildcards);
        self.must_succeed |= rhs.must_succeed;
        self
    }
}
