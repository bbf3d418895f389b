//! Array backend primitive table.
//!
//! Primitives are looked up by the name an operator's `NFuncSpec` gives, the
//! way a numeric library namespace would be. Every primitive broadcasts its
//! operands; the output dtype is passed so integer semantics can differ from
//! float ones.

use std::collections::HashMap;

use ndarray::{ArrayD, Axis, IxDyn, Zip};
use once_cell::sync::Lazy;
use snafu::{OptionExt, ensure};
use tessera_dtype::DType;
use tessera_ir::Arity;
use tessera_ir::scalar::{floor_div, floor_mod};
use tessera_ir::special;

use crate::error::*;
use crate::value::{Value, broadcast_arrays};

#[derive(Clone, Copy)]
enum Kernel {
    Unary(fn(f64, DType) -> f64),
    Binary(fn(f64, f64, DType) -> f64),
    Ternary(fn(f64, f64, f64) -> f64),
}

/// Elementwise backend primitive.
#[derive(Clone, Copy)]
pub struct Primitive {
    pub name: &'static str,
    kernel: Kernel,
}

impl Primitive {
    pub fn nin(&self) -> usize {
        match self.kernel {
            Kernel::Unary(_) => 1,
            Kernel::Binary(_) => 2,
            Kernel::Ternary(_) => 3,
        }
    }

    /// Apply to exactly [`nin`](Self::nin) operands.
    pub fn call(&self, args: &[ArrayD<f64>], out: DType) -> Result<ArrayD<f64>> {
        ensure!(
            args.len() == self.nin(),
            ArityViolationSnafu { op: self.name, expected: Arity::Fixed(self.nin()), got: args.len() }
        );
        match self.kernel {
            Kernel::Unary(f) => Ok(args[0].mapv(|x| f(x, out))),
            Kernel::Binary(f) => zip2(self.name, args, |a, b| f(a, b, out)),
            Kernel::Ternary(f) => zip3(self.name, args, f),
        }
    }
}

/// Left-to-right reduction over operands stacked along a new leading axis.
#[derive(Clone, Copy)]
pub struct Reduction {
    pub name: &'static str,
    combine: fn(f64, f64) -> f64,
}

impl Reduction {
    pub fn reduce(&self, args: &[ArrayD<f64>]) -> Result<ArrayD<f64>> {
        let (_, views) = broadcast_arrays(self.name, args)?;
        let shapes = || ShapeMismatchSnafu {
            op: self.name,
            shapes: args.iter().map(|a| a.shape().to_vec()).collect::<Vec<_>>(),
        };
        let stacked = ndarray::stack(Axis(0), &views).ok().with_context(shapes)?;

        let mut lanes = stacked.axis_iter(Axis(0));
        let mut acc = lanes.next().with_context(shapes)?.to_owned();
        for lane in lanes {
            Zip::from(&mut acc).and(&lane).for_each(|a, &b| *a = (self.combine)(*a, b));
        }
        Ok(acc)
    }
}

// ============================================================================
// Elementwise helpers
// ============================================================================

pub(crate) fn zip2(op: &str, args: &[ArrayD<f64>], f: impl Fn(f64, f64) -> f64) -> Result<ArrayD<f64>> {
    let (_, views) = broadcast_arrays(op, args)?;
    Ok(Zip::from(&views[0]).and(&views[1]).map_collect(|&a, &b| f(a, b)))
}

pub(crate) fn zip3(op: &str, args: &[ArrayD<f64>], f: impl Fn(f64, f64, f64) -> f64) -> Result<ArrayD<f64>> {
    let (_, views) = broadcast_arrays(op, args)?;
    Ok(Zip::from(&views[0]).and(&views[1]).and(&views[2]).map_collect(|&a, &b, &c| f(a, b, c)))
}

/// Exactly `N` operands as arrays.
pub(crate) fn operands<const N: usize>(op: &str, args: &[Value]) -> Result<[ArrayD<f64>; N]> {
    let arrays = args.iter().map(Value::to_array).collect::<Result<Vec<_>>>()?;
    let got = arrays.len();
    <[ArrayD<f64>; N]>::try_from(arrays).ok().context(ArityViolationSnafu { op, expected: Arity::Fixed(N), got })
}

pub(crate) fn rank0(value: f64) -> ArrayD<f64> {
    ArrayD::from_elem(IxDyn(&[]), value)
}

// ============================================================================
// Tables
// ============================================================================

fn truth(v: bool) -> f64 {
    f64::from(u8::from(v))
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

fn invert(x: f64, out: DType) -> f64 {
    if out.is_bool() { truth(x == 0.0) } else { !(x as i64) as f64 }
}

fn sign(x: f64, _: DType) -> f64 {
    if x.is_nan() { f64::NAN } else { truth(x > 0.0) - truth(x < 0.0) }
}

macro_rules! unary {
    ($($name:literal => $f:expr),* $(,)?) => {
        [$(Primitive { name: $name, kernel: Kernel::Unary($f) }),*]
    };
}

macro_rules! binary {
    ($($name:literal => $f:expr),* $(,)?) => {
        [$(Primitive { name: $name, kernel: Kernel::Binary($f) }),*]
    };
}

static PRIMITIVES: Lazy<HashMap<&'static str, Primitive>> = Lazy::new(|| {
    let unary = unary![
        "negative" => |x, _| -x,
        "abs" => |x, _| x.abs(),
        "sign" => sign,
        "exp" => |x, _| x.exp(),
        "expm1" => |x, _| x.exp_m1(),
        "log" => |x, _| x.ln(),
        "log1p" => |x, _| x.ln_1p(),
        "sqrt" => |x, _| x.sqrt(),
        "square" => |x, _| x * x,
        "sin" => |x, _| x.sin(),
        "cos" => |x, _| x.cos(),
        "tanh" => |x, _| x.tanh(),
        "expit" => |x, _| special::sigmoid(x),
        "erf" => |x, _| special::erf(x),
        "erfc" => |x, _| special::erfc(x),
        "erfinv" => |x, _| special::erfinv(x),
        "digamma" => |x, _| special::digamma(x),
        "floor" => |x, _| x.floor(),
        "ceil" => |x, _| x.ceil(),
        "invert" => invert,
    ];
    let binary = binary![
        "add" => |a, b, _| a + b,
        "multiply" => |a, b, _| a * b,
        "subtract" => |a, b, _| a - b,
        "true_divide" => |a, b, _| a / b,
        "floor_divide" => |a, b, out| floor_div(a, b, out.is_discrete()),
        "mod" => |a, b, out| floor_mod(a, b, out.is_discrete()),
        "power" => |a, b, _| a.powf(b),
        "maximum" => |a, b, _| nan_max(a, b),
        "minimum" => |a, b, _| nan_min(a, b),
        "equal" => |a, b, _| truth(a == b),
        "not_equal" => |a, b, _| truth(a != b),
        "less" => |a, b, _| truth(a < b),
        "less_equal" => |a, b, _| truth(a <= b),
        "greater" => |a, b, _| truth(a > b),
        "greater_equal" => |a, b, _| truth(a >= b),
        "bitwise_and" => |a, b, _| ((a as i64) & (b as i64)) as f64,
        "bitwise_or" => |a, b, _| ((a as i64) | (b as i64)) as f64,
        "bitwise_xor" => |a, b, _| ((a as i64) ^ (b as i64)) as f64,
    ];
    let ternary = [
        // Library semantics: min(max(x, lo), hi), so hi wins when lo > hi.
        Primitive { name: "clip", kernel: Kernel::Ternary(|x, lo, hi| nan_min(nan_max(x, lo), hi)) },
        Primitive { name: "where", kernel: Kernel::Ternary(|c, a, b| if c != 0.0 { a } else { b }) },
    ];

    unary.into_iter().chain(binary).chain(ternary).map(|p| (p.name, p)).collect()
});

static REDUCTIONS: Lazy<HashMap<&'static str, Reduction>> = Lazy::new(|| {
    [
        Reduction { name: "sum", combine: |a, b| a + b },
        Reduction { name: "prod", combine: |a, b| a * b },
        Reduction { name: "max", combine: nan_max },
        Reduction { name: "min", combine: nan_min },
    ]
    .into_iter()
    .map(|r| (r.name, r))
    .collect()
});

pub fn primitive(name: &str) -> Option<Primitive> {
    PRIMITIVES.get(name).copied()
}

pub fn reduction(name: &str) -> Option<Reduction> {
    REDUCTIONS.get(name).copied()
}
