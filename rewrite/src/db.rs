//! Named, tagged rewrite databases and the queries that select from them.
//!
//! A database stores rewriters under unique names with a set of tags. A
//! [`RewriteQuery`] selects entries by tag (or by name) and the database turns
//! the selection into a single [`GraphRewriter`]: an [`EquilibriumDb`] yields
//! an [`EquilibriumRewriter`], a [`SequenceDb`] a [`SequenceRewriter`].
//! Databases nest; a nested database is queried with the subquery registered
//! under its name, or with the parent's query.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use snafu::{OptionExt, ensure};
use tracing::trace;

use crate::equilibrium::EquilibriumRewriter;
use crate::error::*;
use crate::rewriter::{GraphRewriter, NodeRewriter};
use crate::sequence::SequenceRewriter;
use crate::walk::WalkingRewriter;

/// Something a database can hold.
#[derive(Clone)]
pub enum Entry {
    Node(Arc<dyn NodeRewriter>),
    Graph(Arc<dyn GraphRewriter>),
    Db(Arc<dyn RewriteDb>),
}

impl Entry {
    pub fn node(rewriter: impl NodeRewriter + 'static) -> Self {
        Self::Node(Arc::new(rewriter))
    }

    pub fn graph(rewriter: impl GraphRewriter + 'static) -> Self {
        Self::Graph(Arc::new(rewriter))
    }

    pub fn db(db: impl RewriteDb + 'static) -> Self {
        Self::Db(Arc::new(db))
    }
}

/// A database that can be turned into a rewriter.
pub trait RewriteDb: Send + Sync {
    fn database(&self) -> &RewriteDatabase;

    fn query(&self, query: &RewriteQuery) -> Result<Arc<dyn GraphRewriter>>;

    fn name(&self) -> &str {
        self.database().name()
    }
}

// ============================================================================
// Query
// ============================================================================

/// Tag-based selection.
///
/// An entry is selected when it carries any `include` tag (or `include`
/// names it), carries every `require` tag, and carries no `exclude` tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteQuery {
    pub include: BTreeSet<String>,
    pub require: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
    /// Queries for nested databases, by entry name.
    pub subquery: BTreeMap<String, RewriteQuery>,
}

fn strings<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> impl Iterator<Item = String> {
    tags.into_iter().map(Into::into)
}

impl RewriteQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn including<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.include.extend(strings(tags));
        self
    }

    pub fn requiring<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.require.extend(strings(tags));
        self
    }

    pub fn excluding<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.exclude.extend(strings(tags));
        self
    }

    pub fn with_subquery(mut self, name: impl Into<String>, query: RewriteQuery) -> Self {
        self.subquery.insert(name.into(), query);
        self
    }

    pub fn selects(&self, name: &str, tags: &BTreeSet<String>) -> bool {
        let included = self.include.contains(name) || tags.iter().any(|t| self.include.contains(t));
        included && self.require.is_subset(tags) && tags.is_disjoint(&self.exclude)
    }

    /// Query to run against the nested database `name`.
    pub fn for_child(&self, name: &str) -> &RewriteQuery {
        self.subquery.get(name).unwrap_or(self)
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Clone)]
pub(crate) struct Registered {
    pub(crate) name: String,
    pub(crate) entry: Entry,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) position: f64,
    pub(crate) final_rewriter: bool,
}

/// Entry storage shared by [`EquilibriumDb`] and [`SequenceDb`].
#[derive(Clone)]
pub struct RewriteDatabase {
    name: String,
    entries: Vec<Registered>,
}

impl RewriteDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn insert(
        &mut self,
        name: String,
        entry: Entry,
        position: f64,
        tags: &[&str],
        final_rewriter: bool,
    ) -> Result<()> {
        ensure!(!self.contains(&name), DuplicateEntrySnafu { db: self.name.clone(), name });
        trace!(db = %self.name, entry = %name, position, ?tags, "registered rewrite");
        let tags = tags.iter().map(|t| t.to_string()).collect();
        self.entries.push(Registered { name, entry, tags, position, final_rewriter });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Entry names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Registered> {
        let db = self.name.clone();
        self.entries.iter_mut().find(|e| e.name == name).context(UnknownEntrySnafu { db, name })
    }

    pub fn entry(&self, name: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.entry)
            .context(UnknownEntrySnafu { db: self.name.clone(), name })
    }

    pub fn tags(&self, name: &str) -> Result<Vec<&str>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .context(UnknownEntrySnafu { db: self.name.clone(), name })?;
        Ok(entry.tags.iter().map(String::as_str).collect())
    }

    pub fn add_tags(&mut self, name: &str, tags: &[&str]) -> Result<()> {
        let entry = self.find_mut(name)?;
        entry.tags.extend(tags.iter().map(|t| t.to_string()));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Entry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .context(UnknownEntrySnafu { db: self.name.clone(), name })?;
        Ok(self.entries.remove(index).entry)
    }

    /// Selected entries ordered by position; ties keep registration order.
    pub(crate) fn select(&self, query: &RewriteQuery) -> Vec<&Registered> {
        let mut selected: Vec<&Registered> = self.entries.iter().filter(|e| query.selects(&e.name, &e.tags)).collect();
        selected.sort_by(|a, b| a.position.total_cmp(&b.position));
        selected
    }
}

// ============================================================================
// Equilibrium database
// ============================================================================

/// Database whose query yields one [`EquilibriumRewriter`].
///
/// Node entries become the node rewriters, entries registered with
/// [`EquilibriumDb::register_final`] run at the end of every pass, and graph
/// or nested database entries run as global rewriters at the start of every
/// pass.
#[derive(Clone)]
pub struct EquilibriumDb {
    db: RewriteDatabase,
}

impl EquilibriumDb {
    pub fn new(name: impl Into<String>) -> Self {
        Self { db: RewriteDatabase::new(name) }
    }

    pub fn register(&mut self, name: impl Into<String>, entry: Entry, tags: &[&str]) -> Result<()> {
        self.db.insert(name.into(), entry, 0.0, tags, false)
    }

    /// Register a node rewriter applied after the others in every pass.
    pub fn register_final(
        &mut self,
        name: impl Into<String>,
        rewriter: Arc<dyn NodeRewriter>,
        tags: &[&str],
    ) -> Result<()> {
        self.db.insert(name.into(), Entry::Node(rewriter), 0.0, tags, true)
    }

    pub fn database_mut(&mut self) -> &mut RewriteDatabase {
        &mut self.db
    }
}

impl RewriteDb for EquilibriumDb {
    fn database(&self) -> &RewriteDatabase {
        &self.db
    }

    fn query(&self, query: &RewriteQuery) -> Result<Arc<dyn GraphRewriter>> {
        let mut nodes = Vec::new();
        let mut finals = Vec::new();
        let mut globals = Vec::new();
        for registered in self.db.select(query) {
            match &registered.entry {
                Entry::Node(rewriter) if registered.final_rewriter => finals.push(Arc::clone(rewriter)),
                Entry::Node(rewriter) => nodes.push(Arc::clone(rewriter)),
                Entry::Graph(rewriter) => globals.push(Arc::clone(rewriter)),
                Entry::Db(db) => globals.push(db.query(query.for_child(&registered.name))?),
            }
        }
        trace!(db = %self.db.name, nodes = nodes.len(), globals = globals.len(), finals = finals.len(), "query");
        Ok(Arc::new(
            EquilibriumRewriter::new(self.db.name.clone(), nodes).with_global(globals).with_final(finals),
        ))
    }
}

// ============================================================================
// Sequence database
// ============================================================================

/// Database whose query yields a [`SequenceRewriter`] over the selected
/// entries ordered by position. Node entries run as a single in-to-out walk.
#[derive(Clone)]
pub struct SequenceDb {
    db: RewriteDatabase,
}

impl SequenceDb {
    pub fn new(name: impl Into<String>) -> Self {
        Self { db: RewriteDatabase::new(name) }
    }

    pub fn register(&mut self, name: impl Into<String>, entry: Entry, position: f64, tags: &[&str]) -> Result<()> {
        self.db.insert(name.into(), entry, position, tags, false)
    }

    pub fn database_mut(&mut self) -> &mut RewriteDatabase {
        &mut self.db
    }
}

impl RewriteDb for SequenceDb {
    fn database(&self) -> &RewriteDatabase {
        &self.db
    }

    fn query(&self, query: &RewriteQuery) -> Result<Arc<dyn GraphRewriter>> {
        let mut stages: Vec<Arc<dyn GraphRewriter>> = Vec::new();
        for registered in self.db.select(query) {
            let stage: Arc<dyn GraphRewriter> = match &registered.entry {
                Entry::Node(rewriter) => {
                    Arc::new(WalkingRewriter::in2out(registered.name.clone(), vec![Arc::clone(rewriter)]))
                }
                Entry::Graph(rewriter) => Arc::clone(rewriter),
                Entry::Db(db) => db.query(query.for_child(&registered.name))?,
            };
            stages.push(stage);
        }
        Ok(Arc::new(SequenceRewriter::new(self.db.name.clone(), stages)))
    }
}
