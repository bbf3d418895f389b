//! Generators for property-based testing.
//!
//! [`Expr`] is a plain recipe for an elementwise expression. Strategies build
//! recipes; [`Expr::build`] materializes one as graph variables and
//! [`Expr::eval`] gives the reference value.

use proptest::prelude::*;

use tessera_dtype::DType;

use crate::error::Result;
use crate::node::Variable;
use crate::scalar::{BinaryOp, ScalarOp, UnaryOp, VariadicOp};

#[derive(Debug, Clone)]
pub enum Expr {
    Input(usize),
    Const(f64),
    Unary(UnaryOp, Box<Expr>),
    Binary(ScalarOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Materialize over float64 `inputs`.
    pub fn build(&self, inputs: &[Variable]) -> Result<Variable> {
        match self {
            Self::Input(i) => Ok(inputs[*i % inputs.len()].clone()),
            Self::Const(v) => Ok(Variable::scalar_constant(DType::Float64, *v)),
            Self::Unary(op, a) => Variable::elemwise(*op, [a.build(inputs)?]),
            Self::Binary(op, a, b) => Variable::elemwise(op.clone(), [a.build(inputs)?, b.build(inputs)?]),
        }
    }

    /// Reference value for scalar `inputs`.
    pub fn eval(&self, inputs: &[f64]) -> f64 {
        let apply = |op: &ScalarOp, args: &[f64]| {
            op.perform(args, &[DType::Float64]).and_then(|v| v.first().copied()).unwrap_or(f64::NAN)
        };
        match self {
            Self::Input(i) => inputs[*i % inputs.len()],
            Self::Const(v) => *v,
            Self::Unary(op, a) => apply(&ScalarOp::Unary(*op), &[a.eval(inputs)]),
            Self::Binary(op, a, b) => apply(op, &[a.eval(inputs), b.eval(inputs)]),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Input(_) | Self::Const(_) => 1,
            Self::Unary(_, a) => 1 + a.size(),
            Self::Binary(_, a, b) => 1 + a.size() + b.size(),
        }
    }
}

/// Unary operators that are total on the reals.
pub fn arb_unary_op() -> impl Strategy<Value = UnaryOp> {
    prop_oneof![
        Just(UnaryOp::Neg),
        Just(UnaryOp::Abs),
        Just(UnaryOp::Sqr),
        Just(UnaryOp::Tanh),
        Just(UnaryOp::Sigmoid),
        Just(UnaryOp::Softplus),
        Just(UnaryOp::Exp),
    ]
}

pub fn arb_binary_op() -> impl Strategy<Value = ScalarOp> {
    prop_oneof![
        Just(ScalarOp::Variadic(VariadicOp::Add)),
        Just(ScalarOp::Variadic(VariadicOp::Mul)),
        Just(ScalarOp::Variadic(VariadicOp::Maximum)),
        Just(ScalarOp::Binary(BinaryOp::Sub)),
    ]
}

/// Expressions over `ninputs` inputs with small constants.
pub fn arb_expr(ninputs: usize) -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        3 => (0..ninputs.max(1)).prop_map(Expr::Input),
        1 => prop_oneof![Just(0.0), Just(1.0), Just(-1.0), (-2.0f64..2.0)].prop_map(Expr::Const),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (arb_unary_op(), inner.clone()).prop_map(|(op, a)| Expr::Unary(op, Box::new(a))),
            (arb_binary_op(), inner.clone(), inner).prop_map(|(op, a, b)| Expr::Binary(op, Box::new(a), Box::new(b))),
        ]
    })
}

/// Finite inputs in a range where `exp` stays well inside `f64`.
pub fn arb_input_values(n: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0f64..3.0, n)
}
