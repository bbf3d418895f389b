//! Apply-level operators and the operator class hierarchy.

use std::borrow::Cow;
use std::fmt;

use ndarray::{ArrayD, Dimension, IxDyn};
use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tessera_dtype::{DType, TensorType};

use crate::error::*;
use crate::linalg::{LinalgKind, LinalgOp};
use crate::scalar::{BinaryOp, ScalarOp, TernaryOp, UnaryOp, VariadicOp};

/// Number of inputs an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(usize),
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Self::Fixed(k) => n == k,
            Self::Variadic { min } => n >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Variadic { min } => write!(f, "at least {min}"),
        }
    }
}

/// Operator type in the declared class hierarchy.
///
/// Concrete classes identify one operator kind; abstract classes (`Op`,
/// `ScalarOp`, the arity families, `ProviderSpecial` and `LinalgOp`) group
/// them so a single implementation can serve a whole family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum OpClass {
    Op,
    ScalarOp,
    UnaryScalarOp,
    BinaryScalarOp,
    VariadicScalarOp,
    TernaryScalarOp,
    /// Special functions that only an optional provider implements.
    ProviderSpecial,
    LinalgOp,

    Unary(UnaryOp),
    Binary(BinaryOp),
    Variadic(VariadicOp),
    Ternary(TernaryOp),
    Cast,
    Composite,
    #[display("{_0:?}")]
    Linalg(LinalgKind),
}

/// Key that rewriters and matchers index nodes by.
pub type OpKey = OpClass;

impl OpClass {
    /// Declared superclass chain, nearest first. Does not include `self`.
    pub fn ancestors(self) -> &'static [OpClass] {
        use UnaryOp::{Erfcinv, Erfcx};
        const SCALAR: &[OpClass] = &[OpClass::ScalarOp, OpClass::Op];
        const UNARY: &[OpClass] = &[OpClass::UnaryScalarOp, OpClass::ScalarOp, OpClass::Op];

        match self {
            Self::Op => &[],
            Self::ScalarOp | Self::LinalgOp => &[Self::Op],
            Self::UnaryScalarOp | Self::BinaryScalarOp | Self::VariadicScalarOp | Self::TernaryScalarOp => SCALAR,
            Self::Unary(Erfcx | Erfcinv) => &[Self::ProviderSpecial, Self::UnaryScalarOp, Self::ScalarOp, Self::Op],
            Self::ProviderSpecial | Self::Unary(_) | Self::Cast => UNARY,
            Self::Binary(_) => &[Self::BinaryScalarOp, Self::ScalarOp, Self::Op],
            Self::Variadic(_) => &[Self::VariadicScalarOp, Self::ScalarOp, Self::Op],
            Self::Ternary(_) => &[Self::TernaryScalarOp, Self::ScalarOp, Self::Op],
            Self::Composite => SCALAR,
            Self::Linalg(_) => &[Self::LinalgOp, Self::Op],
        }
    }

    /// `self` followed by its ancestors.
    pub fn resolution_order(self) -> impl Iterator<Item = OpClass> {
        std::iter::once(self).chain(self.ancestors().iter().copied())
    }

    pub fn is_abstract(self) -> bool {
        matches!(
            self,
            Self::Op
                | Self::ScalarOp
                | Self::UnaryScalarOp
                | Self::BinaryScalarOp
                | Self::VariadicScalarOp
                | Self::TernaryScalarOp
                | Self::ProviderSpecial
                | Self::LinalgOp
        )
    }

    pub fn is_subclass_of(self, other: OpClass) -> bool {
        self.resolution_order().any(|c| c == other)
    }
}

/// Operator of an apply node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Scalar operator broadcast over its inputs.
    Elemwise(ScalarOp),
    Linalg(LinalgOp),
}

macro_rules! impl_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Op {
            fn from(op: $ty) -> Self {
                Self::Elemwise(op.into())
            }
        })*
    };
}

impl_from_scalar!(ScalarOp, UnaryOp, BinaryOp, VariadicOp, TernaryOp);

impl From<LinalgOp> for Op {
    fn from(op: LinalgOp) -> Self {
        Self::Linalg(op)
    }
}

impl Op {
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::Elemwise(op) => op.name(),
            Self::Linalg(op) => Cow::Owned(op.name()),
        }
    }

    pub fn class(&self) -> OpClass {
        match self {
            Self::Elemwise(op) => op.class(),
            Self::Linalg(op) => OpClass::Linalg(op.kind()),
        }
    }

    pub fn key(&self) -> OpKey {
        self.class()
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Elemwise(op) => op.arity(),
            Self::Linalg(op) => op.arity(),
        }
    }

    pub fn nout(&self) -> usize {
        match self {
            Self::Elemwise(op) => op.nout(),
            Self::Linalg(op) => op.nout(),
        }
    }

    pub fn scalar_op(&self) -> Option<&ScalarOp> {
        match self {
            Self::Elemwise(op) => Some(op),
            Self::Linalg(_) => None,
        }
    }

    /// Output types for the given input types.
    pub fn infer_types(&self, inputs: &[TensorType]) -> Result<SmallVec<[TensorType; 2]>> {
        match self {
            Self::Elemwise(op) => {
                let dtypes: SmallVec<[DType; 4]> = inputs.iter().map(|t| t.dtype).collect();
                let out_dtypes = op.output_dtypes(&dtypes)?;
                let shape = TensorType::broadcast_shapes(inputs.iter().map(|t| t.shape.as_slice())).context(
                    BroadcastShapeMismatchSnafu {
                        op: op.name().into_owned(),
                        shapes: inputs.iter().map(|t| t.shape.clone()).collect::<Vec<_>>(),
                    },
                )?;
                Ok(out_dtypes.into_iter().map(|dtype| TensorType { dtype, shape: shape.clone() }).collect())
            }
            Self::Linalg(op) => op.infer_types(inputs),
        }
    }

    /// Reference evaluation on concrete arrays.
    ///
    /// Only elementwise operators with a reference implementation support
    /// this; inputs are broadcast to the output shape.
    pub fn perform(&self, inputs: &[&ArrayD<f64>], out_types: &[TensorType]) -> Option<Vec<ArrayD<f64>>> {
        let op = self.scalar_op()?;
        let out_dtypes: SmallVec<[DType; 2]> = out_types.iter().map(|t| t.dtype).collect();

        let shapes: SmallVec<[SmallVec<[Option<usize>; 4]>; 4]> =
            inputs.iter().map(|a| a.shape().iter().map(|&d| Some(d)).collect()).collect();
        let shape: Vec<usize> =
            TensorType::broadcast_shapes(shapes.iter().map(|s| s.as_slice()))?.iter().map(|d| d.unwrap_or(1)).collect();
        let views = inputs.iter().map(|a| a.broadcast(IxDyn(&shape))).collect::<Option<Vec<_>>>()?;

        let size: usize = shape.iter().product();
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(size); op.nout()];
        let mut args: SmallVec<[f64; 4]> = SmallVec::with_capacity(inputs.len());
        for index in ndarray::indices(IxDyn(&shape)) {
            args.clear();
            args.extend(views.iter().map(|v| v[index.slice()]));
            for (column, value) in columns.iter_mut().zip(op.perform(&args, &out_dtypes)?) {
                column.push(value);
            }
        }

        columns.into_iter().map(|values| ArrayD::from_shape_vec(IxDyn(&shape), values).ok()).collect()
    }

    /// Check the arity for `n` inputs without inferring types.
    pub fn check_arity(&self, n: usize) -> Result<()> {
        let expected = self.arity();
        ensure!(expected.accepts(n), ArityViolationSnafu { op: self.name().into_owned(), expected, got: n });
        Ok(())
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
