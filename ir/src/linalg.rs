//! Linear algebra operators.

use smallvec::{SmallVec, smallvec};
use snafu::ensure;
use tessera_dtype::{DType, Dim, TensorType};

use crate::error::*;
use crate::op::Arity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumDiscriminants)]
#[strum_discriminants(name(LinalgKind), derive(Hash, PartialOrd, Ord, strum::EnumIter))]
pub enum LinalgOp {
    /// Vector/matrix product of rank 1 or 2 operands.
    Dot,
    /// Per-batch product of rank 2 or 3 operands sharing a leading batch
    /// axis: `[b, m, k] x [b, k, n] -> [b, m, n]`, `[b, k] x [b, k] -> [b]`.
    BatchedDot,
    Cholesky { lower: bool },
    /// General solve `A x = b`.
    Solve,
    SolveTriangular { lower: bool },
    /// Solve `A x = b` given the Cholesky factor of `A`.
    CholeskySolve { lower: bool },
    MatrixInverse,
    /// Moore-Penrose pseudo-inverse.
    Pinv,
    Det,
    /// Sign and log of the absolute determinant.
    SLogDet,
    /// Reduced QR factorization.
    Qr,
    /// Eigenvalues in ascending order and eigenvectors of a symmetric matrix,
    /// read from one triangle.
    Eigh { lower: bool },
    Eigvalsh { lower: bool },
    /// `(U, S, Vt)`, or only `S` without `compute_uv`.
    Svd { full_matrices: bool, compute_uv: bool },
}

/// Known sizes must agree.
fn dims_agree(a: Dim, b: Dim) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// The more specific of two agreeing dims.
fn merge(a: Dim, b: Dim) -> Dim {
    a.or(b)
}

impl LinalgOp {
    pub fn name(&self) -> String {
        match self {
            Self::Dot => "dot".into(),
            Self::BatchedDot => "batched_dot".into(),
            Self::Cholesky { lower } => format!("cholesky{{lower={lower}}}"),
            Self::Solve => "solve".into(),
            Self::SolveTriangular { lower } => format!("solve_triangular{{lower={lower}}}"),
            Self::CholeskySolve { lower } => format!("cholesky_solve{{lower={lower}}}"),
            Self::MatrixInverse => "matrix_inverse".into(),
            Self::Pinv => "pinv".into(),
            Self::Det => "det".into(),
            Self::SLogDet => "slogdet".into(),
            Self::Qr => "qr".into(),
            Self::Eigh { lower } => format!("eigh{{lower={lower}}}"),
            Self::Eigvalsh { lower } => format!("eigvalsh{{lower={lower}}}"),
            Self::Svd { full_matrices, compute_uv } => {
                format!("svd{{full_matrices={full_matrices}, compute_uv={compute_uv}}}")
            }
        }
    }

    pub fn kind(&self) -> LinalgKind {
        LinalgKind::from(self)
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Dot
            | Self::BatchedDot
            | Self::Solve
            | Self::SolveTriangular { .. }
            | Self::CholeskySolve { .. } => Arity::Fixed(2),
            _ => Arity::Fixed(1),
        }
    }

    pub fn nout(&self) -> usize {
        match self {
            Self::SLogDet | Self::Qr | Self::Eigh { .. } => 2,
            Self::Svd { compute_uv: true, .. } => 3,
            _ => 1,
        }
    }

    fn expect_rank(&self, index: usize, ty: &TensorType, ranks: &[usize]) -> Result<()> {
        ensure!(
            ranks.contains(&ty.ndim()),
            InvalidInputTypeSnafu {
                op: self.name(),
                index,
                ty: ty.clone(),
                expected: format!("rank in {ranks:?}"),
            }
        );
        Ok(())
    }

    fn square(&self, ty: &TensorType) -> Result<()> {
        self.expect_rank(0, ty, &[2])?;
        ensure!(
            dims_agree(ty.shape[0], ty.shape[1]),
            InvalidInputTypeSnafu { op: self.name(), index: 0usize, ty: ty.clone(), expected: "square matrix" }
        );
        Ok(())
    }

    fn contraction(&self, a: Dim, b: Dim, lhs: &TensorType, rhs: &TensorType) -> Result<()> {
        ensure!(
            dims_agree(a, b),
            BroadcastShapeMismatchSnafu { op: self.name(), shapes: vec![lhs.shape.clone(), rhs.shape.clone()] }
        );
        Ok(())
    }

    pub fn infer_types(&self, inputs: &[TensorType]) -> Result<SmallVec<[TensorType; 2]>> {
        let arity = self.arity();
        ensure!(
            arity.accepts(inputs.len()),
            ArityViolationSnafu { op: self.name(), expected: arity, got: inputs.len() }
        );

        let dtype = inputs.iter().map(|t| t.dtype).reduce(DType::upcast).unwrap_or(DType::Float64).float_for();

        match self {
            Self::Dot => {
                let (a, b) = (&inputs[0], &inputs[1]);
                self.expect_rank(0, a, &[1, 2])?;
                self.expect_rank(1, b, &[1, 2])?;
                let k_a = a.shape[a.ndim() - 1];
                let k_b = b.shape[0];
                self.contraction(k_a, k_b, a, b)?;
                let mut shape: SmallVec<[Dim; 4]> = SmallVec::new();
                if a.ndim() == 2 {
                    shape.push(a.shape[0]);
                }
                if b.ndim() == 2 {
                    shape.push(b.shape[1]);
                }
                Ok(smallvec![TensorType::new(dtype, shape)])
            }
            Self::BatchedDot => {
                let (a, b) = (&inputs[0], &inputs[1]);
                self.expect_rank(0, a, &[2, 3])?;
                self.expect_rank(1, b, &[2, 3])?;
                self.contraction(a.shape[0], b.shape[0], a, b)?;
                self.contraction(a.shape[a.ndim() - 1], b.shape[1], a, b)?;
                let mut shape: SmallVec<[Dim; 4]> = smallvec![merge(a.shape[0], b.shape[0])];
                shape.extend(a.shape[1..a.ndim() - 1].iter().copied());
                shape.extend(b.shape[2..].iter().copied());
                Ok(smallvec![TensorType::new(dtype, shape)])
            }
            Self::Cholesky { .. } | Self::MatrixInverse => {
                self.square(&inputs[0])?;
                Ok(smallvec![inputs[0].with_dtype(dtype)])
            }
            Self::Solve | Self::SolveTriangular { .. } | Self::CholeskySolve { .. } => {
                let (a, b) = (&inputs[0], &inputs[1]);
                self.square(a)?;
                self.expect_rank(1, b, &[1, 2])?;
                self.contraction(a.shape[1], b.shape[0], a, b)?;
                Ok(smallvec![b.with_dtype(dtype)])
            }
            Self::Det => {
                self.square(&inputs[0])?;
                Ok(smallvec![TensorType::scalar(dtype)])
            }
            Self::SLogDet => {
                self.square(&inputs[0])?;
                Ok(smallvec![TensorType::scalar(dtype), TensorType::scalar(dtype)])
            }
            Self::Pinv => {
                let a = &inputs[0];
                self.expect_rank(0, a, &[2])?;
                Ok(smallvec![TensorType::new(dtype, [a.shape[1], a.shape[0]])])
            }
            Self::Eigh { .. } => {
                self.square(&inputs[0])?;
                let n = merge(inputs[0].shape[0], inputs[0].shape[1]);
                Ok(smallvec![TensorType::new(dtype, [n]), TensorType::new(dtype, [n, n])])
            }
            Self::Eigvalsh { .. } => {
                self.square(&inputs[0])?;
                Ok(smallvec![TensorType::new(dtype, [merge(inputs[0].shape[0], inputs[0].shape[1])])])
            }
            Self::Svd { full_matrices, compute_uv } => {
                let a = &inputs[0];
                self.expect_rank(0, a, &[2])?;
                let (m, n) = (a.shape[0], a.shape[1]);
                let k = m.zip(n).map(|(m, n)| m.min(n));
                let s = TensorType::new(dtype, [k]);
                Ok(match (*compute_uv, *full_matrices) {
                    (false, _) => smallvec![s],
                    (true, true) => smallvec![TensorType::new(dtype, [m, m]), s, TensorType::new(dtype, [n, n])],
                    (true, false) => smallvec![TensorType::new(dtype, [m, k]), s, TensorType::new(dtype, [k, n])],
                })
            }
            Self::Qr => {
                let a = &inputs[0];
                self.expect_rank(0, a, &[2])?;
                let (m, n) = (a.shape[0], a.shape[1]);
                let k = m.zip(n).map(|(m, n)| m.min(n));
                Ok(smallvec![TensorType::new(dtype, [m, k]), TensorType::new(dtype, [k, n])])
            }
        }
    }
}

impl std::fmt::Display for LinalgOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
