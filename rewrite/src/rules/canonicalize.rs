//! Canonicalization: remove useless operations and normalize structure.

use std::sync::Arc;

use tessera_ir::{Apply, BinaryOp, OpClass, Result, ScalarOp, TernaryOp, UnaryOp, Variable, VariadicOp};

use super::{const_value, fill, produced_by, replace_with};
use crate::pattern::PatternMatcher;

/// `f(x, x)` for an operator where that is constant.
fn same_operands(node: &Arc<Apply>, value: f64) -> Result<Option<Vec<Variable>>> {
    match node.inputs() {
        [a, b] if a == b => fill(node, value),
        _ => Ok(None),
    }
}

/// Drop operands equal to `neutral` from a variadic node.
fn drop_neutral(node: &Arc<Apply>, op: VariadicOp, neutral: f64) -> Result<Option<Vec<Variable>>> {
    let inputs = node.inputs();
    let kept: Vec<Variable> = inputs.iter().filter(|v| const_value(v) != Some(neutral)).cloned().collect();
    if kept.len() == inputs.len() {
        return Ok(None);
    }
    let candidate = match kept.as_slice() {
        [] => Variable::scalar_constant(node.output(0).dtype(), neutral),
        [x] => x.clone(),
        _ => Variable::variadic(op, &kept)?,
    };
    replace_with(candidate, node)
}

fn has_const(node: &Arc<Apply>, value: f64) -> bool {
    node.inputs().iter().any(|v| const_value(v) == Some(value))
}

/// `eq(x,x) → 1`, `neq(x,x) → 0`, single-input `add`/`mul`/`identity → x`,
/// `and(x,0) → 0`, `and(x,1) → x` and `or(x,1) → 1` for bool, `or(x,0) → x`,
/// `xor(x,x) → 0`.
pub fn local_useless_elemwise() -> PatternMatcher {
    PatternMatcher::new("local_useless_elemwise")
        .with(&[OpClass::Binary(BinaryOp::Eq)], |_, node| same_operands(node, 1.0))
        .with(&[OpClass::Binary(BinaryOp::Neq)], |_, node| same_operands(node, 0.0))
        .with(&[OpClass::Variadic(VariadicOp::Xor)], |_, node| same_operands(node, 0.0))
        .with(
            &[
                OpClass::Variadic(VariadicOp::Add),
                OpClass::Variadic(VariadicOp::Mul),
                OpClass::Unary(UnaryOp::Identity),
            ],
            |_, node| match node.inputs() {
                [x] => replace_with(x.clone(), node),
                _ => Ok(None),
            },
        )
        .with(&[OpClass::Variadic(VariadicOp::And)], |_, node| {
            if has_const(node, 0.0) {
                return fill(node, 0.0);
            }
            if node.output(0).dtype().is_bool() {
                return drop_neutral(node, VariadicOp::And, 1.0);
            }
            Ok(None)
        })
        .with(&[OpClass::Variadic(VariadicOp::Or)], |_, node| {
            if node.output(0).dtype().is_bool() && has_const(node, 1.0) {
                return fill(node, 1.0);
            }
            drop_neutral(node, VariadicOp::Or, 0.0)
        })
}

/// Collapse two chained casts.
///
/// `cast(cast(x, t1), t2)` becomes `cast(x, t1)` when `t1 == t2`. When the
/// first cast is an upcast it cannot lose information, so the pair becomes
/// `x` if `t2` is `x`'s dtype and `cast(x, t2)` otherwise.
pub fn local_cast_cast() -> PatternMatcher {
    PatternMatcher::new("local_cast_cast").with(&[OpClass::Cast], |_, node| {
        let Some(ScalarOp::Cast(outer)) = node.op().scalar_op() else { return Ok(None) };
        let inner = &node.inputs()[0];
        let Some(owner) = produced_by(inner, OpClass::Cast) else { return Ok(None) };
        let Some(ScalarOp::Cast(first)) = owner.op().scalar_op() else { return Ok(None) };
        let x = &owner.inputs()[0];

        if first == outer {
            return replace_with(inner.clone(), node);
        }
        if x.dtype().is_an_upcast(*first) {
            if *outer == x.dtype() {
                return replace_with(x.clone(), node);
            }
            return replace_with(x.try_cast(*outer)?, node);
        }
        Ok(None)
    })
}

/// A constant condition selects a branch; identical branches collapse.
pub fn local_useless_switch() -> PatternMatcher {
    PatternMatcher::new("local_useless_switch").with(&[OpClass::Ternary(TernaryOp::Switch)], |_, node| {
        let [cond, then, otherwise] = node.inputs() else { return Ok(None) };
        if let Some(c) = const_value(cond) {
            let branch = if c != 0.0 { then } else { otherwise };
            return replace_with(branch.clone(), node);
        }
        if then == otherwise {
            return replace_with(then.clone(), node);
        }
        Ok(None)
    })
}

fn merge_switch_keys() -> Vec<OpClass> {
    let binary = [
        BinaryOp::Sub,
        BinaryOp::TrueDiv,
        BinaryOp::IntDiv,
        BinaryOp::Mod,
        BinaryOp::Pow,
        BinaryOp::Eq,
        BinaryOp::Neq,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
    ]
    .map(OpClass::Binary);
    let variadic = [VariadicOp::Add, VariadicOp::Mul, VariadicOp::Maximum, VariadicOp::Minimum].map(OpClass::Variadic);
    binary.into_iter().chain(variadic).collect()
}

/// `op(switch(c, a, b), switch(c, x, y)) → switch(c, op(a, x), op(b, y))`.
pub fn local_merge_switch_same_cond() -> PatternMatcher {
    PatternMatcher::new("local_merge_switch_same_cond").with(&merge_switch_keys(), |_, node| {
        let key = OpClass::Ternary(TernaryOp::Switch);
        let Some(switches) = node.inputs().iter().map(|v| produced_by(v, key)).collect::<Option<Vec<_>>>() else {
            return Ok(None);
        };
        let Some((first, rest)) = switches.split_first() else { return Ok(None) };
        if switches.len() < 2 {
            return Ok(None);
        }
        let cond = &first.inputs()[0];
        if rest.iter().any(|s| &s.inputs()[0] != cond) {
            return Ok(None);
        }

        let Some(op) = node.op().scalar_op() else { return Ok(None) };
        let then = Variable::elemwise(op.clone(), switches.iter().map(|s| s.inputs()[1].clone()))?;
        let otherwise = Variable::elemwise(op.clone(), switches.iter().map(|s| s.inputs()[2].clone()))?;
        replace_with(cond.try_switch(&then, &otherwise)?, node)
    })
}

/// Flatten `add(add(a, b), c)` into `add(a, b, c)`, likewise for `mul`.
pub fn local_add_mul_fusion() -> PatternMatcher {
    let mut matcher = PatternMatcher::new("local_add_mul_fusion");
    for op in [VariadicOp::Add, VariadicOp::Mul] {
        let key = OpClass::Variadic(op);
        matcher.add(&[key], move |_, node| {
            let dtype = node.output(0).dtype();
            let nested = |v: &Variable| v.dtype() == dtype && produced_by(v, key).is_some();
            if !node.inputs().iter().any(nested) {
                return Ok(None);
            }
            let mut operands = Vec::with_capacity(node.inputs().len() + 2);
            for input in node.inputs() {
                match produced_by(input, key) {
                    Some(inner) if input.dtype() == dtype => operands.extend(inner.inputs().iter().cloned()),
                    _ => operands.push(input.clone()),
                }
            }
            replace_with(Variable::variadic(op, &operands)?, node)
        });
    }
    matcher
}

/// `x + 0`, `x * 1`, `x - 0`, `x / 1` and `neg(neg(x))` reduce to `x`.
pub fn local_neutral_elements() -> PatternMatcher {
    PatternMatcher::new("local_neutral_elements")
        .with(&[OpClass::Variadic(VariadicOp::Add)], |_, node| drop_neutral(node, VariadicOp::Add, 0.0))
        .with(&[OpClass::Variadic(VariadicOp::Mul)], |_, node| drop_neutral(node, VariadicOp::Mul, 1.0))
        .with(&[OpClass::Binary(BinaryOp::Sub)], |_, node| match node.inputs() {
            [x, zero] if const_value(zero) == Some(0.0) => replace_with(x.clone(), node),
            _ => Ok(None),
        })
        .with(&[OpClass::Binary(BinaryOp::TrueDiv)], |_, node| match node.inputs() {
            [x, one] if const_value(one) == Some(1.0) => replace_with(x.clone(), node),
            _ => Ok(None),
        })
        .with(&[OpClass::Unary(UnaryOp::Neg)], |_, node| {
            let key = OpClass::Unary(UnaryOp::Neg);
            match produced_by(&node.inputs()[0], key) {
                Some(inner) => replace_with(inner.inputs()[0].clone(), node),
                None => Ok(None),
            }
        })
}

/// `x * 0 → 0`. Drops `x` entirely, so NaN and infinite values of `x` no
/// longer propagate.
pub fn local_mul_zero() -> PatternMatcher {
    PatternMatcher::new("local_mul_zero").with(&[OpClass::Variadic(VariadicOp::Mul)], |_, node| {
        if has_const(node, 0.0) { fill(node, 0.0) } else { Ok(None) }
    })
}
