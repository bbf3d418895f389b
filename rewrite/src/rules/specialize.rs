use tessera_ir::{BinaryOp, OpClass};

use super::{const_value, fill, replace_with};
use crate::pattern::PatternMatcher;

/// Constant exponents: `x ** 1 → x`, `x ** 2 → sqr(x)`, `x ** 0.5 → sqrt(x)`
/// and `x ** 0 → 1`. `x` is cast to the result dtype first.
pub fn local_pow_specialize() -> PatternMatcher {
    PatternMatcher::new("local_pow_specialize").with(&[OpClass::Binary(BinaryOp::Pow)], |_, node| {
        let [x, exponent] = node.inputs() else { return Ok(None) };
        let dtype = node.output(0).dtype();
        let lifted = || if x.dtype() == dtype { Ok(x.clone()) } else { x.try_cast(dtype) };
        match const_value(exponent) {
            Some(1.0) => replace_with(x.clone(), node),
            Some(2.0) => replace_with(lifted()?.try_sqr()?, node),
            Some(0.5) => replace_with(lifted()?.try_sqrt()?, node),
            Some(0.0) => fill(node, 1.0),
            _ => Ok(None),
        }
    })
}
