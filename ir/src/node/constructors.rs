//! Graph-building helpers on [`Variable`].
//!
//! Every constructor infers output types and fails on arity, dtype or
//! broadcast errors instead of panicking.

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::error::Result;
use crate::linalg::LinalgOp;
use crate::node::{Apply, Variable};
use crate::op::Op;
use crate::scalar::{BinaryOp, ScalarOp, TernaryOp, UnaryOp, VariadicOp};

macro_rules! unary_constructors {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(pub fn $name(&self) -> Result<Variable> {
            Variable::elemwise(UnaryOp::$op, [self.clone()])
        })*
    };
}

macro_rules! binary_constructors {
    ($($name:ident => $kind:ident::$op:ident),* $(,)?) => {
        $(pub fn $name(&self, rhs: &Variable) -> Result<Variable> {
            Variable::elemwise($kind::$op, [self.clone(), rhs.clone()])
        })*
    };
}

impl Variable {
    /// Apply `op` and return all of its outputs.
    pub fn apply(op: impl Into<Op>, inputs: impl IntoIterator<Item = Variable>) -> Result<SmallVec<[Variable; 2]>> {
        Ok(Apply::new(op, inputs)?.outputs())
    }

    /// Apply a single-output elementwise operator.
    pub fn elemwise(op: impl Into<ScalarOp>, inputs: impl IntoIterator<Item = Variable>) -> Result<Variable> {
        Ok(Apply::new(Op::Elemwise(op.into()), inputs)?.output(0))
    }

    /// Variadic `op` over all `inputs`.
    pub fn variadic(op: VariadicOp, inputs: &[Variable]) -> Result<Variable> {
        Self::elemwise(op, inputs.iter().cloned())
    }

    unary_constructors! {
        try_neg => Neg, try_abs => Abs, try_sign => Sign,
        try_exp => Exp, try_expm1 => Expm1, try_log => Log, try_log1p => Log1p,
        try_sqrt => Sqrt, try_sqr => Sqr, try_sin => Sin, try_cos => Cos, try_tanh => Tanh,
        try_sigmoid => Sigmoid, try_softplus => Softplus, try_log1mexp => Log1mexp,
        try_erf => Erf, try_erfc => Erfc, try_erfinv => Erfinv, try_erfcx => Erfcx, try_erfcinv => Erfcinv,
        try_psi => Psi, try_floor => Floor, try_ceil => Ceil, try_identity => Identity, try_not => Not,
    }

    binary_constructors! {
        try_add => VariadicOp::Add, try_mul => VariadicOp::Mul,
        try_maximum => VariadicOp::Maximum, try_minimum => VariadicOp::Minimum,
        try_and => VariadicOp::And, try_or => VariadicOp::Or, try_xor => VariadicOp::Xor,
        try_sub => BinaryOp::Sub, try_div => BinaryOp::TrueDiv, try_int_div => BinaryOp::IntDiv,
        try_mod => BinaryOp::Mod, try_pow => BinaryOp::Pow,
        try_eq => BinaryOp::Eq, try_neq => BinaryOp::Neq, try_lt => BinaryOp::Lt, try_le => BinaryOp::Le,
        try_gt => BinaryOp::Gt, try_ge => BinaryOp::Ge, try_second => BinaryOp::Second,
    }

    /// Modified Bessel function of the first kind, `iv(order, self)`.
    pub fn try_iv(&self, order: &Variable) -> Result<Variable> {
        Self::elemwise(BinaryOp::Iv, [order.clone(), self.clone()])
    }

    pub fn try_clip(&self, lo: &Variable, hi: &Variable) -> Result<Variable> {
        Self::elemwise(TernaryOp::Clip, [self.clone(), lo.clone(), hi.clone()])
    }

    /// `where(self, then, otherwise)`.
    pub fn try_switch(&self, then: &Variable, otherwise: &Variable) -> Result<Variable> {
        Self::elemwise(TernaryOp::Switch, [self.clone(), then.clone(), otherwise.clone()])
    }

    pub fn try_cast(&self, dtype: DType) -> Result<Variable> {
        Self::elemwise(ScalarOp::Cast(dtype), [self.clone()])
    }

    pub fn try_dot(&self, rhs: &Variable) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Dot, [self.clone(), rhs.clone()])?.output(0))
    }

    pub fn try_batched_dot(&self, rhs: &Variable) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::BatchedDot, [self.clone(), rhs.clone()])?.output(0))
    }

    pub fn try_cholesky(&self, lower: bool) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Cholesky { lower }, [self.clone()])?.output(0))
    }

    /// Solve `self · x = b`.
    pub fn try_solve(&self, b: &Variable) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Solve, [self.clone(), b.clone()])?.output(0))
    }

    pub fn try_solve_triangular(&self, b: &Variable, lower: bool) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::SolveTriangular { lower }, [self.clone(), b.clone()])?.output(0))
    }

    /// Solve `A x = b` where `self` is the Cholesky factor of `A`.
    pub fn try_cholesky_solve(&self, b: &Variable, lower: bool) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::CholeskySolve { lower }, [self.clone(), b.clone()])?.output(0))
    }

    pub fn try_inverse(&self) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::MatrixInverse, [self.clone()])?.output(0))
    }

    pub fn try_pinv(&self) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Pinv, [self.clone()])?.output(0))
    }

    pub fn try_det(&self) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Det, [self.clone()])?.output(0))
    }

    /// `(sign, log|det|)`.
    pub fn try_slogdet(&self) -> Result<(Variable, Variable)> {
        let node = Apply::new(LinalgOp::SLogDet, [self.clone()])?;
        Ok((node.output(0), node.output(1)))
    }

    /// Reduced `(Q, R)`.
    pub fn try_qr(&self) -> Result<(Variable, Variable)> {
        let node = Apply::new(LinalgOp::Qr, [self.clone()])?;
        Ok((node.output(0), node.output(1)))
    }

    /// `(eigenvalues, eigenvectors)` of a symmetric matrix.
    pub fn try_eigh(&self, lower: bool) -> Result<(Variable, Variable)> {
        let node = Apply::new(LinalgOp::Eigh { lower }, [self.clone()])?;
        Ok((node.output(0), node.output(1)))
    }

    pub fn try_eigvalsh(&self, lower: bool) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Eigvalsh { lower }, [self.clone()])?.output(0))
    }

    /// `(U, S, Vt)`.
    pub fn try_svd(&self, full_matrices: bool) -> Result<(Variable, Variable, Variable)> {
        let node = Apply::new(LinalgOp::Svd { full_matrices, compute_uv: true }, [self.clone()])?;
        Ok((node.output(0), node.output(1), node.output(2)))
    }

    /// Singular values only.
    pub fn try_singular_values(&self) -> Result<Variable> {
        Ok(Apply::new(LinalgOp::Svd { full_matrices: false, compute_uv: false }, [self.clone()])?.output(0))
    }
}
