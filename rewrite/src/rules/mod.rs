//! Standard rewrite rules.
//!
//! Every rule proposes a replacement that already has the type of the
//! variable it replaces: results are cast to the original dtype and, when a
//! simplification dropped operands, broadcast back with `second`.

use std::sync::Arc;

use itertools::Itertools;
use tessera_ir::{Apply, OpKey, Result, Variable};

pub mod canonicalize;
pub mod folding;
pub mod fusion;
pub mod specialize;
pub mod stabilize;

pub use canonicalize::*;
pub use folding::constant_folding;
pub use fusion::ElemwiseFusion;
pub use specialize::local_pow_specialize;
pub use stabilize::*;

/// Value of a constant whose elements are all equal.
pub(crate) fn const_value(var: &Variable) -> Option<f64> {
    var.as_constant()?.unique_value()
}

/// Owner of `var` when it is computed by an operator with `key`.
pub(crate) fn produced_by(var: &Variable, key: OpKey) -> Option<&Arc<Apply>> {
    var.owner().filter(|owner| owner.op().key() == key)
}

/// `candidate` adjusted to stand in for `old`, or `None` when it cannot.
///
/// Casts to `old`'s dtype and broadcasts against the non-scalar `refs` (the
/// replaced node's inputs, each once) when the candidate lost rank.
pub(crate) fn conform(candidate: Variable, old: &Variable, refs: &[Variable]) -> Result<Option<Variable>> {
    let mut var = candidate;
    if var.dtype() != old.dtype() {
        var = var.try_cast(old.dtype())?;
    }
    if var.ndim() < old.ndim() {
        for reference in refs.iter().rev().filter(|r| r.ndim() > 0).unique_by(|r| r.id()) {
            var = reference.try_second(&var)?;
        }
    }
    Ok(old.ty().is_compatible(var.ty()).then_some(var))
}

/// Replace the single output of `node` with `candidate`.
pub(crate) fn replace_with(candidate: Variable, node: &Arc<Apply>) -> Result<Option<Vec<Variable>>> {
    Ok(conform(candidate, &node.output(0), node.inputs())?.map(|v| vec![v]))
}

/// Replace the single output of `node` with a constant fill.
pub(crate) fn fill(node: &Arc<Apply>, value: f64) -> Result<Option<Vec<Variable>>> {
    let out = node.output(0);
    replace_with(Variable::scalar_constant(out.dtype(), value), node)
}
