//! Elementwise implementations: the scalar fast path, the generic primitive
//! lookup with its variadic shim, and operators whose boundary behaviour must
//! not follow the library primitive.

use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tessera_ir::scalar::{floor_div, floor_mod};
use tessera_ir::special;
use tessera_ir::{Apply, Arity, BinaryOp, OpClass, VariadicOp};
use tracing::trace;

use super::primitives::{self, operands, zip2, zip3};
use crate::config::DispatchContext;
use crate::error::*;
use crate::registry::DispatchRegistry;
use crate::value::{Callable, Value};

fn sum(xs: &[f64], _: bool) -> Option<f64> {
    xs.iter().copied().reduce(|a, b| a + b)
}

fn product(xs: &[f64], _: bool) -> Option<f64> {
    xs.iter().copied().reduce(|a, b| a * b)
}

fn difference(xs: &[f64], _: bool) -> Option<f64> {
    match xs {
        [a, b] => Some(a - b),
        _ => None,
    }
}

fn quotient(xs: &[f64], discrete: bool) -> Option<f64> {
    match xs {
        [a, b] => Some(floor_div(*a, *b, discrete)),
        _ => None,
    }
}

fn remainder(xs: &[f64], discrete: bool) -> Option<f64> {
    match xs {
        [a, b] => Some(floor_mod(*a, *b, discrete)),
        _ => None,
    }
}

/// Plain-number arithmetic when every input of the node is rank 0.
///
/// Returns [`Value::Scalar`] and agrees exactly with the array primitives.
/// Arrays reaching the callable anyway, as inside a composite lowered without
/// vectorization, go to the primitive.
pub(crate) fn scalar_arithmetic(
    node: &Apply,
    registry: &DispatchRegistry,
    ctx: &DispatchContext,
) -> Result<Option<Callable>> {
    if node.inputs().iter().any(|v| v.ndim() > 0) {
        return Ok(None);
    }
    let f: fn(&[f64], bool) -> Option<f64> = match node.op().class() {
        OpClass::Variadic(VariadicOp::Add) => sum,
        OpClass::Variadic(VariadicOp::Mul) => product,
        OpClass::Binary(BinaryOp::Sub) => difference,
        OpClass::Binary(BinaryOp::IntDiv) => quotient,
        OpClass::Binary(BinaryOp::Mod) => remainder,
        _ => return Ok(None),
    };
    let out = node.output_types()[0].dtype;
    let op = node.op().name().into_owned();
    let expected = node.op().arity();
    let fallback = nfunc_primitive(node, registry, ctx)?;

    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let has_arrays = args.iter().any(|a| matches!(a.ndim(), Some(n) if n > 0));
        if let Some(fallback) = fallback.as_ref().filter(|_| has_arrays) {
            return fallback(args);
        }
        let xs = args
            .iter()
            .map(|a| a.as_scalar().with_context(|| ValueKindSnafu { expected: "scalar", got: a.kind() }))
            .collect::<Result<SmallVec<[f64; 4]>>>()?;
        let value = f(&xs, out.is_discrete()).context(ArityViolationSnafu { op: &op, expected, got: xs.len() })?;
        Ok(Value::Scalar(out.cast_value(value)))
    })))
}

/// Library primitive named by the operator's `NFuncSpec`.
///
/// Operators with a variadic reduction that receive a different operand
/// count than the nominal primitive takes have their operands broadcast,
/// stacked and reduced instead.
pub(crate) fn nfunc_primitive(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    let Some(op) = node.op().scalar_op() else { return Ok(None) };
    let Some(spec) = op.nfunc_spec() else { return Ok(None) };
    let Some(primitive) = primitives::primitive(spec.name) else {
        trace!(op = %op, primitive = spec.name, "no backend primitive");
        return Ok(None);
    };
    let variadic = op.nfunc_variadic().and_then(primitives::reduction);
    let out = node.output_types()[0].dtype;
    let name = op.name().into_owned();

    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let arrays = args.iter().map(Value::to_array).collect::<Result<Vec<_>>>()?;
        let result = match variadic {
            Some(reduction) if !arrays.is_empty() && arrays.len() != spec.nin => reduction.reduce(&arrays)?,
            _ => {
                let expected = if variadic.is_some() { Arity::Variadic { min: 1 } } else { Arity::Fixed(spec.nin) };
                ensure!(arrays.len() == spec.nin, ArityViolationSnafu { op: &name, expected, got: arrays.len() });
                primitive.call(&arrays, out)?
            }
        };
        Ok(Value::Array(result.mapv_into(|v| out.cast_value(v))))
    })))
}

// ============================================================================
// Operators with their own boundary policy
// ============================================================================

/// `where(x < lo, lo, where(x > hi, hi, x))`: `lo` wins when `lo > hi`.
pub(crate) fn clip(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    let out = node.output_types()[0].dtype;
    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let arrays: [_; 3] = operands("clip", args)?;
        let clipped = zip3("clip", &arrays, |x, lo, hi| {
            if x < lo {
                lo
            } else if x > hi {
                hi
            } else {
                x
            }
        })?;
        Ok(Value::Array(clipped.mapv_into(|v| out.cast_value(v))))
    })))
}

fn unary_formula(node: &Apply, name: &'static str, f: fn(f64) -> f64) -> Callable {
    let out = node.output_types()[0].dtype;
    Arc::new(move |args: &[Value]| -> Result<Value> {
        let [x] = operands(name, args)?;
        Ok(Value::Array(x.mapv_into(|v| out.cast_value(f(v)))))
    })
}

/// `where(x < -37, exp(x), where(x < 18, log1p(exp(x)), where(x < 33.3, x + exp(-x), x)))`.
pub(crate) fn softplus_formula(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    Ok(Some(unary_formula(node, "softplus", special::softplus)))
}

/// `where(x < ln 0.5, log1p(-exp(x)), log(-expm1(x)))`.
pub(crate) fn log1mexp_formula(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    Ok(Some(unary_formula(node, "log1mexp", special::log1mexp)))
}

/// Broadcast both operands and return the second.
pub(crate) fn second(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    let out = node.output_types()[0].dtype;
    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let arrays: [_; 2] = operands("second", args)?;
        let filled = zip2("second", &arrays, |_, y| y)?;
        Ok(Value::Array(filled.mapv_into(|v| out.cast_value(v))))
    })))
}

/// Conversion to the node's output dtype; always returns an array.
pub(crate) fn cast(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    let out = node.output_types()[0].dtype;
    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let [x] = operands("cast", args)?;
        Ok(Value::Array(x.mapv_into(|v| out.cast_value(v))))
    })))
}

pub(crate) fn identity(_: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    Ok(Some(Arc::new(|args: &[Value]| -> Result<Value> {
        match args {
            [x] => Ok(x.clone()),
            _ => ArityViolationSnafu { op: "identity", expected: Arity::Fixed(1), got: args.len() }.fail(),
        }
    })))
}
