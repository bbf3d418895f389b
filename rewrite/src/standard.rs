//! The standard rewrite database.
//!
//! Stages run in position order, each one an equilibrium database:
//!
//! | stage             | position | tags                       |
//! |-------------------|----------|----------------------------|
//! | `canonicalize`    | 1.0      | fast_run, fast_compile     |
//! | `stabilize`       | 1.5      | fast_run                   |
//! | `specialize`      | 2.0      | fast_run                   |
//! | `useless`         | 2.5      | fast_run, fast_compile     |
//! | `elemwise_fusion` | 49.0     | fast_run, fusion           |

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::db::{Entry, EquilibriumDb, RewriteDb, SequenceDb};
use crate::error::Result;
use crate::rewriter::NodeRewriter;
use crate::rules::*;

pub const FAST_RUN: &str = "fast_run";
pub const FAST_COMPILE: &str = "fast_compile";
pub const SHAPE_UNSAFE: &str = "shape_unsafe";
pub const FUSION: &str = "fusion";
pub const CXX_ONLY: &str = "cxx_only";

fn node(rewriter: impl NodeRewriter + 'static) -> Arc<dyn NodeRewriter> {
    Arc::new(rewriter)
}

fn canonicalize(
    useless_elemwise: &Arc<dyn NodeRewriter>,
    cast_cast: &Arc<dyn NodeRewriter>,
    useless_switch: &Arc<dyn NodeRewriter>,
    folding: &Arc<dyn NodeRewriter>,
) -> Result<EquilibriumDb> {
    let mut db = EquilibriumDb::new("canonicalize");
    db.register("local_useless_elemwise", Entry::Node(Arc::clone(useless_elemwise)), &[FAST_RUN, FAST_COMPILE])?;
    db.register("local_cast_cast", Entry::Node(Arc::clone(cast_cast)), &[FAST_RUN, FAST_COMPILE])?;
    db.register("local_useless_switch", Entry::Node(Arc::clone(useless_switch)), &[FAST_RUN, SHAPE_UNSAFE])?;
    db.register("local_merge_switch_same_cond", Entry::node(local_merge_switch_same_cond()), &[FAST_RUN])?;
    db.register("local_add_mul_fusion", Entry::node(local_add_mul_fusion()), &[FAST_RUN, FAST_COMPILE])?;
    db.register("local_neutral_elements", Entry::node(local_neutral_elements()), &[FAST_RUN, FAST_COMPILE])?;
    db.register("local_mul_zero", Entry::node(local_mul_zero()), &[FAST_RUN, SHAPE_UNSAFE])?;
    db.register_final("constant_folding", Arc::clone(folding), &[FAST_RUN, FAST_COMPILE])?;
    Ok(db)
}

fn stabilize(folding: &Arc<dyn NodeRewriter>) -> Result<EquilibriumDb> {
    let mut db = EquilibriumDb::new("stabilize");
    db.register("local_log1p_exp_to_softplus", Entry::node(local_log1p_exp_to_softplus()), &[FAST_RUN])?;
    db.register("local_log1mexp", Entry::node(local_log1mexp()), &[FAST_RUN])?;
    db.register("local_log1p", Entry::node(local_log1p()), &[FAST_RUN])?;
    db.register("local_expm1", Entry::node(local_expm1()), &[FAST_RUN])?;
    db.register_final("constant_folding", Arc::clone(folding), &[FAST_RUN, FAST_COMPILE])?;
    Ok(db)
}

fn specialize(
    useless_elemwise: &Arc<dyn NodeRewriter>,
    cast_cast: &Arc<dyn NodeRewriter>,
    useless_switch: &Arc<dyn NodeRewriter>,
    folding: &Arc<dyn NodeRewriter>,
) -> Result<EquilibriumDb> {
    let mut db = EquilibriumDb::new("specialize");
    db.register("local_useless_elemwise", Entry::Node(Arc::clone(useless_elemwise)), &[FAST_RUN])?;
    db.register("local_cast_cast", Entry::Node(Arc::clone(cast_cast)), &[FAST_RUN])?;
    db.register("local_useless_switch", Entry::Node(Arc::clone(useless_switch)), &[FAST_RUN, SHAPE_UNSAFE])?;
    db.register("local_pow_specialize", Entry::node(local_pow_specialize()), &[FAST_RUN])?;
    db.register_final("constant_folding", Arc::clone(folding), &[FAST_RUN, FAST_COMPILE])?;
    Ok(db)
}

fn useless(useless_elemwise: &Arc<dyn NodeRewriter>, useless_switch: &Arc<dyn NodeRewriter>) -> Result<EquilibriumDb> {
    let mut db = EquilibriumDb::new("useless");
    db.register("local_useless_elemwise", Entry::Node(Arc::clone(useless_elemwise)), &[FAST_RUN, FAST_COMPILE])?;
    db.register("local_useless_switch", Entry::Node(Arc::clone(useless_switch)), &[FAST_RUN, SHAPE_UNSAFE])?;
    Ok(db)
}

/// Build the standard sequence of rewrite stages.
pub fn standard_rewrites() -> Result<SequenceDb> {
    let useless_elemwise = node(local_useless_elemwise());
    let cast_cast = node(local_cast_cast());
    let useless_switch = node(local_useless_switch());
    let folding = node(constant_folding());

    let mut db = SequenceDb::new("standard");
    db.register(
        "canonicalize",
        Entry::db(canonicalize(&useless_elemwise, &cast_cast, &useless_switch, &folding)?),
        1.0,
        &[FAST_RUN, FAST_COMPILE],
    )?;
    db.register("stabilize", Entry::db(stabilize(&folding)?), 1.5, &[FAST_RUN])?;
    db.register(
        "specialize",
        Entry::db(specialize(&useless_elemwise, &cast_cast, &useless_switch, &folding)?),
        2.0,
        &[FAST_RUN],
    )?;
    db.register("useless", Entry::db(useless(&useless_elemwise, &useless_switch)?), 2.5, &[FAST_RUN, FAST_COMPILE])?;
    db.register("elemwise_fusion", Entry::graph(ElemwiseFusion::new()), 49.0, &[FAST_RUN, FUSION])?;

    debug!(stages = ?db.database().names(), "standard rewrites registered");
    Ok(db)
}

static DEFAULT_REWRITES: Lazy<Result<SequenceDb>> = Lazy::new(standard_rewrites);

/// Process-wide standard database, built on first use.
pub fn default_rewrites() -> Result<&'static SequenceDb> {
    DEFAULT_REWRITES.as_ref().map_err(Clone::clone)
}
