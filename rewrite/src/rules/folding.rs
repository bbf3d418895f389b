use tessera_ir::{Constant, Op, Variable};
use tracing::trace;

use super::conform;
use crate::pattern::PatternMatcher;

/// Evaluate elementwise nodes whose inputs are all constants.
///
/// Operators without a reference evaluation (provider-only special functions)
/// are left in place.
pub fn constant_folding() -> PatternMatcher {
    let mut matcher = PatternMatcher::new("constant_folding");
    matcher.add_wildcard(|_, node| {
        if !matches!(node.op(), Op::Elemwise(_)) || !node.has_constant_inputs() {
            return Ok(None);
        }
        let Some(arrays) =
            node.inputs().iter().map(|v| v.as_constant().map(Constant::value)).collect::<Option<Vec<_>>>()
        else {
            return Ok(None);
        };
        let Some(values) = node.op().perform(&arrays, node.output_types()) else {
            trace!(op = %node.op().name(), "no reference evaluation, not folding");
            return Ok(None);
        };

        let mut replacements = Vec::with_capacity(values.len());
        for (value, old) in values.into_iter().zip(node.outputs()) {
            let folded = Variable::constant(Constant::new(old.dtype(), value));
            match conform(folded, &old, &[])? {
                Some(var) => replacements.push(var),
                None => return Ok(None),
            }
        }
        Ok(Some(replacements))
    });
    matcher
}
