//! Numerical stabilization: replace expressions that lose precision or
//! overflow with dedicated operators.

use std::sync::Arc;

use tessera_ir::{Apply, BinaryOp, OpClass, Result, UnaryOp, Variable, VariadicOp};

use super::{const_value, produced_by, replace_with};
use crate::pattern::PatternMatcher;

const EXP: OpClass = OpClass::Unary(UnaryOp::Exp);
const NEG: OpClass = OpClass::Unary(UnaryOp::Neg);
const ADD: OpClass = OpClass::Variadic(VariadicOp::Add);
const SUB: OpClass = OpClass::Binary(BinaryOp::Sub);

/// Argument of `exp(x)`.
fn exp_arg(var: &Variable) -> Option<&Variable> {
    produced_by(var, EXP).map(|owner| &owner.inputs()[0])
}

/// `x` when `var` is `add(1, x)` or `add(x, 1)`.
fn one_plus(var: &Variable) -> Option<&Variable> {
    match produced_by(var, ADD)?.inputs() {
        [one, x] | [x, one] if const_value(one) == Some(1.0) => Some(x),
        _ => None,
    }
}

/// `x` when `var` is `sub(1, x)`.
fn one_minus(var: &Variable) -> Option<&Variable> {
    match produced_by(var, SUB)?.inputs() {
        [one, x] if const_value(one) == Some(1.0) => Some(x),
        _ => None,
    }
}

fn log_argument(node: &Arc<Apply>) -> &Variable {
    &node.inputs()[0]
}

/// `log(1 + exp(x))` and `log1p(exp(x))` become `softplus(x)`.
pub fn local_log1p_exp_to_softplus() -> PatternMatcher {
    PatternMatcher::new("local_log1p_exp_to_softplus")
        .with(&[OpClass::Unary(UnaryOp::Log)], |_, node| {
            match one_plus(log_argument(node)).and_then(exp_arg) {
                Some(x) => replace_with(x.try_softplus()?, node),
                None => Ok(None),
            }
        })
        .with(&[OpClass::Unary(UnaryOp::Log1p)], |_, node| match exp_arg(log_argument(node)) {
            Some(x) => replace_with(x.try_softplus()?, node),
            None => Ok(None),
        })
}

/// `log(1 - exp(x))` and `log1p(-exp(x))` become `log1mexp(x)`.
pub fn local_log1mexp() -> PatternMatcher {
    PatternMatcher::new("local_log1mexp")
        .with(&[OpClass::Unary(UnaryOp::Log)], |_, node| {
            match one_minus(log_argument(node)).and_then(exp_arg) {
                Some(x) => replace_with(x.try_log1mexp()?, node),
                None => Ok(None),
            }
        })
        .with(&[OpClass::Unary(UnaryOp::Log1p)], |_, node| {
            let negated = produced_by(log_argument(node), NEG).map(|owner| &owner.inputs()[0]);
            match negated.and_then(exp_arg) {
                Some(x) => replace_with(x.try_log1mexp()?, node),
                None => Ok(None),
            }
        })
}

/// `log(1 + x) → log1p(x)` when `x` is not an exponential.
pub fn local_log1p() -> PatternMatcher {
    PatternMatcher::new("local_log1p").with(&[OpClass::Unary(UnaryOp::Log)], |_, node| {
        match one_plus(log_argument(node)) {
            Some(x) if exp_arg(x).is_none() => replace_with(x.try_log1p()?, node),
            _ => Ok(None),
        }
    })
}

/// `exp(x) - 1 → expm1(x)`.
pub fn local_expm1() -> PatternMatcher {
    PatternMatcher::new("local_expm1").with(&[SUB], |_, node| match node.inputs() {
        [e, one] if const_value(one) == Some(1.0) => match exp_arg(e) {
            Some(x) => replace_with(x.try_expm1()?, node),
            None => Ok(None),
        },
        _ => Ok(None),
    })
}
