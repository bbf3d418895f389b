//! Graph rewriting for tessera.
//!
//! Rewriters replace variables of a [`FunctionGraph`](tessera_ir::FunctionGraph)
//! with equivalent ones while keeping the graph consistent.
//!
//! # Module Organization
//!
//! - [`rewriter`] - [`NodeRewriter`] and [`GraphRewriter`] traits, [`RewriteReport`]
//! - [`pattern`] - [`PatternMatcher`], rules indexed by operator key
//! - [`walk`] - Single walks over a graph with node rewriters
//! - [`equilibrium`] - Fixed-point rewriting
//! - [`sequence`] - Ordered stages
//! - [`db`] - Tagged rewrite databases and queries
//! - [`rules`] - Standard rewrite rules
//! - [`standard`] - The standard database
//! - [`config`] - Rewrite budgets
//!
//! # Example
//!
//! ```ignore
//! let fast_run = RewriteQuery::new().including(["fast_run"]);
//! let rewriter = default_rewrites()?.query(&fast_run)?;
//! let report = rewriter.apply(&mut fgraph, &RewriteConfig::default())?;
//! ```

pub mod config;
pub mod db;
pub mod equilibrium;
pub mod error;
pub mod pattern;
pub mod rewriter;
pub mod rules;
pub mod sequence;
pub mod standard;
pub mod walk;

#[cfg(test)]
mod test;

pub use config::RewriteConfig;
pub use db::{Entry, EquilibriumDb, RewriteDatabase, RewriteDb, RewriteQuery, SequenceDb};
pub use equilibrium::EquilibriumRewriter;
pub use error::{Error, Result};
pub use pattern::PatternMatcher;
pub use rewriter::{GraphRewriter, NodeRewriter, RewriteReport};
pub use sequence::SequenceRewriter;
pub use standard::{default_rewrites, standard_rewrites};
pub use walk::{WalkOrder, WalkingRewriter};
