//! Scalar operators, applied elementwise by [`Op::Elemwise`](crate::Op::Elemwise).
//!
//! Each operator declares its arity, output dtype rule, the backend primitive
//! it maps to ([`NFuncSpec`]) and a reference `f64` implementation used for
//! constant folding.

use std::borrow::Cow;
use std::sync::Arc;

use smallvec::{SmallVec, smallvec};
use snafu::ensure;
use tessera_dtype::DType;

use crate::composite::Composite;
use crate::error::*;
use crate::op::{Arity, OpClass};
use crate::special;

/// Backend primitive an operator maps to: name, input and output counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NFuncSpec {
    pub name: &'static str,
    pub nin: usize,
    pub nout: usize,
}

impl NFuncSpec {
    const fn new(name: &'static str, nin: usize) -> Self {
        Self { name, nin, nout: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Abs,
    Sign,
    Exp,
    Expm1,
    Log,
    Log1p,
    Sqrt,
    Sqr,
    Sin,
    Cos,
    Tanh,
    Sigmoid,
    Softplus,
    Log1mexp,
    Erf,
    Erfc,
    Erfinv,
    Erfcx,
    Erfcinv,
    Psi,
    Floor,
    Ceil,
    Identity,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BinaryOp {
    Sub,
    TrueDiv,
    IntDiv,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Second,
    Iv,
}

/// Associative operators that accept any number of operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum VariadicOp {
    Add,
    Mul,
    Maximum,
    Minimum,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TernaryOp {
    Clip,
    Switch,
}

/// Floor division; integer division by zero yields 0.
pub fn floor_div(a: f64, b: f64, discrete: bool) -> f64 {
    if discrete && b == 0.0 { 0.0 } else { (a / b).floor() }
}

/// Remainder carrying the sign of the divisor; integer modulo by zero yields 0.
pub fn floor_mod(a: f64, b: f64, discrete: bool) -> f64 {
    if discrete && b == 0.0 {
        return 0.0;
    }
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

/// Maximum that propagates NaN.
fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

fn truth(v: bool) -> f64 {
    f64::from(u8::from(v))
}

fn upcast_all(dtypes: &[DType]) -> DType {
    dtypes.iter().copied().reduce(DType::upcast).unwrap_or(DType::Float64)
}

impl UnaryOp {
    pub fn nfunc_spec(self) -> Option<NFuncSpec> {
        use UnaryOp::*;
        let name = match self {
            Neg => "negative",
            Abs => "abs",
            Sign => "sign",
            Exp => "exp",
            Expm1 => "expm1",
            Log => "log",
            Log1p => "log1p",
            Sqrt => "sqrt",
            Sqr => "square",
            Sin => "sin",
            Cos => "cos",
            Tanh => "tanh",
            Sigmoid => "expit",
            Erf => "erf",
            Erfc => "erfc",
            Erfinv => "erfinv",
            Erfcx => "erfcx",
            Erfcinv => "erfcinv",
            Psi => "digamma",
            Floor => "floor",
            Ceil => "ceil",
            Not => "invert",
            Softplus | Log1mexp | Identity => return None,
        };
        Some(NFuncSpec::new(name, 1))
    }

    /// Whether the result is real-valued even for integer inputs.
    pub const fn is_float_valued(self) -> bool {
        use UnaryOp::*;
        !matches!(self, Neg | Abs | Sign | Sqr | Floor | Ceil | Identity | Not)
    }

    pub fn output_dtype(self, input: DType) -> Result<DType> {
        if self == UnaryOp::Not {
            ensure!(input.is_discrete(), DTypeMismatchSnafu { op: self.to_string(), dtypes: vec![input] });
        }
        Ok(if self.is_float_valued() { input.float_for() } else { input })
    }

    pub fn perform(self, x: f64, out: DType) -> Option<f64> {
        use UnaryOp::*;
        Some(match self {
            Neg => -x,
            Abs => x.abs(),
            Sign if x.is_nan() => f64::NAN,
            Sign => truth(x > 0.0) - truth(x < 0.0),
            Exp => x.exp(),
            Expm1 => x.exp_m1(),
            Log => x.ln(),
            Log1p => x.ln_1p(),
            Sqrt => x.sqrt(),
            Sqr => x * x,
            Sin => x.sin(),
            Cos => x.cos(),
            Tanh => x.tanh(),
            Sigmoid => special::sigmoid(x),
            Softplus => special::softplus(x),
            Log1mexp => special::log1mexp(x),
            Erf => special::erf(x),
            Erfc => special::erfc(x),
            Erfinv => special::erfinv(x),
            Psi => special::digamma(x),
            Floor => x.floor(),
            Ceil => x.ceil(),
            Identity => x,
            Not if out.is_bool() => truth(x == 0.0),
            Not => !(x as i64) as f64,
            Erfcx | Erfcinv => return None,
        })
    }
}

impl BinaryOp {
    pub fn nfunc_spec(self) -> Option<NFuncSpec> {
        use BinaryOp::*;
        let name = match self {
            Sub => "subtract",
            TrueDiv => "true_divide",
            IntDiv => "floor_divide",
            Mod => "mod",
            Pow => "power",
            Eq => "equal",
            Neq => "not_equal",
            Lt => "less",
            Le => "less_equal",
            Gt => "greater",
            Ge => "greater_equal",
            Iv => "iv",
            Second => return None,
        };
        Some(NFuncSpec::new(name, 2))
    }

    pub const fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Neq | Lt | Le | Gt | Ge)
    }

    pub fn output_dtype(self, lhs: DType, rhs: DType) -> DType {
        use BinaryOp::*;
        match self {
            _ if self.is_comparison() => DType::Bool,
            Second => rhs,
            TrueDiv | Iv => lhs.upcast(rhs).float_for(),
            _ => lhs.upcast(rhs),
        }
    }

    pub fn perform(self, a: f64, b: f64, out: DType) -> Option<f64> {
        use BinaryOp::*;
        Some(match self {
            Sub => a - b,
            TrueDiv => a / b,
            IntDiv => floor_div(a, b, out.is_discrete()),
            Mod => floor_mod(a, b, out.is_discrete()),
            Pow => a.powf(b),
            Eq => truth(a == b),
            Neq => truth(a != b),
            Lt => truth(a < b),
            Le => truth(a <= b),
            Gt => truth(a > b),
            Ge => truth(a >= b),
            Second => b,
            Iv => return None,
        })
    }
}

impl VariadicOp {
    /// Nominal (binary) primitive.
    pub fn nfunc_spec(self) -> NFuncSpec {
        use VariadicOp::*;
        let name = match self {
            Add => "add",
            Mul => "multiply",
            Maximum => "maximum",
            Minimum => "minimum",
            And => "bitwise_and",
            Or => "bitwise_or",
            Xor => "bitwise_xor",
        };
        NFuncSpec::new(name, 2)
    }

    /// Reduction used when the operator receives more than two operands.
    pub fn nfunc_variadic(self) -> Option<&'static str> {
        use VariadicOp::*;
        match self {
            Add => Some("sum"),
            Mul => Some("prod"),
            Maximum => Some("max"),
            Minimum => Some("min"),
            And | Or | Xor => None,
        }
    }

    pub const fn is_bitwise(self) -> bool {
        matches!(self, VariadicOp::And | VariadicOp::Or | VariadicOp::Xor)
    }

    /// Neutral element, if the operator has one.
    pub fn identity(self) -> Option<f64> {
        use VariadicOp::*;
        match self {
            Add | Or | Xor => Some(0.0),
            Mul => Some(1.0),
            Maximum => Some(f64::NEG_INFINITY),
            Minimum => Some(f64::INFINITY),
            And => None,
        }
    }

    pub fn output_dtype(self, inputs: &[DType]) -> Result<DType> {
        if self.is_bitwise() {
            ensure!(
                inputs.iter().all(DType::is_discrete),
                DTypeMismatchSnafu { op: self.to_string(), dtypes: inputs.to_vec() }
            );
        }
        Ok(upcast_all(inputs))
    }

    /// Left fold of the binary form.
    pub fn perform(self, inputs: &[f64]) -> Option<f64> {
        use VariadicOp::*;
        let (&first, rest) = inputs.split_first()?;
        Some(rest.iter().fold(first, |acc, &x| match self {
            Add => acc + x,
            Mul => acc * x,
            Maximum => nan_max(acc, x),
            Minimum => nan_min(acc, x),
            And => ((acc as i64) & (x as i64)) as f64,
            Or => ((acc as i64) | (x as i64)) as f64,
            Xor => ((acc as i64) ^ (x as i64)) as f64,
        }))
    }
}

impl TernaryOp {
    pub fn nfunc_spec(self) -> NFuncSpec {
        match self {
            TernaryOp::Clip => NFuncSpec::new("clip", 3),
            TernaryOp::Switch => NFuncSpec::new("where", 3),
        }
    }

    pub fn output_dtype(self, inputs: [DType; 3]) -> DType {
        match self {
            TernaryOp::Clip => upcast_all(&inputs),
            TernaryOp::Switch => inputs[1].upcast(inputs[2]),
        }
    }

    pub fn perform(self, a: f64, b: f64, c: f64) -> f64 {
        match self {
            // where(x < lo, lo, where(x > hi, hi, x)); differs from min(max(..)) when lo > hi
            TernaryOp::Clip => {
                if a < b {
                    b
                } else if a > c {
                    c
                } else {
                    a
                }
            }
            TernaryOp::Switch => {
                if a != 0.0 {
                    b
                } else {
                    c
                }
            }
        }
    }
}

/// Scalar operator.
///
/// Equality is class plus parameters; composites compare by the identity of
/// their inner graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarOp {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Variadic(VariadicOp),
    Ternary(TernaryOp),
    Cast(DType),
    Composite(Arc<Composite>),
}

impl From<UnaryOp> for ScalarOp {
    fn from(op: UnaryOp) -> Self {
        Self::Unary(op)
    }
}

impl From<BinaryOp> for ScalarOp {
    fn from(op: BinaryOp) -> Self {
        Self::Binary(op)
    }
}

impl From<VariadicOp> for ScalarOp {
    fn from(op: VariadicOp) -> Self {
        Self::Variadic(op)
    }
}

impl From<TernaryOp> for ScalarOp {
    fn from(op: TernaryOp) -> Self {
        Self::Ternary(op)
    }
}

impl From<Arc<Composite>> for ScalarOp {
    fn from(op: Arc<Composite>) -> Self {
        Self::Composite(op)
    }
}

impl ScalarOp {
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::Unary(op) => Cow::Borrowed(op.into()),
            Self::Binary(op) => Cow::Borrowed(op.into()),
            Self::Variadic(op) => Cow::Borrowed(op.into()),
            Self::Ternary(op) => Cow::Borrowed(op.into()),
            Self::Cast(dtype) => Cow::Owned(format!("cast{{{dtype}}}")),
            Self::Composite(c) => Cow::Owned(c.name().to_string()),
        }
    }

    pub fn class(&self) -> OpClass {
        match self {
            Self::Unary(op) => OpClass::Unary(*op),
            Self::Binary(op) => OpClass::Binary(*op),
            Self::Variadic(op) => OpClass::Variadic(*op),
            Self::Ternary(op) => OpClass::Ternary(*op),
            Self::Cast(_) => OpClass::Cast,
            Self::Composite(_) => OpClass::Composite,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Unary(_) | Self::Cast(_) => Arity::Fixed(1),
            Self::Binary(_) => Arity::Fixed(2),
            Self::Ternary(_) => Arity::Fixed(3),
            Self::Variadic(_) => Arity::Variadic { min: 1 },
            Self::Composite(c) => Arity::Fixed(c.nin()),
        }
    }

    pub fn nout(&self) -> usize {
        match self {
            Self::Composite(c) => c.nout(),
            _ => 1,
        }
    }

    pub fn nfunc_spec(&self) -> Option<NFuncSpec> {
        match self {
            Self::Unary(op) => op.nfunc_spec(),
            Self::Binary(op) => op.nfunc_spec(),
            Self::Variadic(op) => Some(op.nfunc_spec()),
            Self::Ternary(op) => Some(op.nfunc_spec()),
            Self::Cast(_) | Self::Composite(_) => None,
        }
    }

    pub fn nfunc_variadic(&self) -> Option<&'static str> {
        match self {
            Self::Variadic(op) => op.nfunc_variadic(),
            _ => None,
        }
    }

    /// Output dtypes for the given input dtypes.
    pub fn output_dtypes(&self, inputs: &[DType]) -> Result<SmallVec<[DType; 2]>> {
        let arity = self.arity();
        ensure!(
            arity.accepts(inputs.len()),
            ArityViolationSnafu { op: self.name().into_owned(), expected: arity, got: inputs.len() }
        );

        Ok(match self {
            Self::Unary(op) => smallvec![op.output_dtype(inputs[0])?],
            Self::Binary(op) => smallvec![op.output_dtype(inputs[0], inputs[1])],
            Self::Variadic(op) => smallvec![op.output_dtype(inputs)?],
            Self::Ternary(op) => smallvec![op.output_dtype([inputs[0], inputs[1], inputs[2]])],
            Self::Cast(dtype) => smallvec![*dtype],
            Self::Composite(c) => {
                ensure!(
                    inputs == c.input_dtypes(),
                    DTypeMismatchSnafu { op: c.name().to_string(), dtypes: inputs.to_vec() }
                );
                c.output_dtypes().iter().copied().collect()
            }
        })
    }

    /// Reference evaluation on scalars.
    ///
    /// Results are converted into `out_dtypes`. Returns `None` when the
    /// operator has no reference implementation or the input count is wrong.
    pub fn perform(&self, inputs: &[f64], out_dtypes: &[DType]) -> Option<SmallVec<[f64; 2]>> {
        if !self.arity().accepts(inputs.len()) || out_dtypes.len() != self.nout() {
            return None;
        }
        let out = out_dtypes[0];
        let values: SmallVec<[f64; 2]> = match self {
            Self::Unary(op) => smallvec![op.perform(inputs[0], out)?],
            Self::Binary(op) => smallvec![op.perform(inputs[0], inputs[1], out)?],
            Self::Variadic(op) => smallvec![op.perform(inputs)?],
            Self::Ternary(op) => smallvec![op.perform(inputs[0], inputs[1], inputs[2])],
            Self::Cast(_) => smallvec![inputs[0]],
            Self::Composite(c) => c.perform(inputs)?,
        };
        Some(values.iter().zip(out_dtypes).map(|(&v, dtype)| dtype.cast_value(v)).collect())
    }
}

impl std::fmt::Display for ScalarOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
