//! Dense linear algebra on `f64` arrays.
//!
//! Factorizations work on owned `Array2` copies: Cholesky by the
//! column-by-column recurrence, LU with partial pivoting for solves,
//! inverses and determinants, QR by Householder reflections, and the
//! symmetric eigenproblem and SVD by Jacobi rotations.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2, IxDyn, s};
use snafu::ensure;
use tessera_ir::{Apply, LinalgOp, Op};

use super::primitives::rank0;
use crate::config::DispatchContext;
use crate::error::*;
use crate::registry::DispatchRegistry;
use crate::value::{Callable, Value};

pub(crate) fn linalg(node: &Apply, _: &DispatchRegistry, _: &DispatchContext) -> Result<Option<Callable>> {
    let Op::Linalg(op) = node.op() else { return Ok(None) };
    let op = *op;
    let out_dtypes: Vec<_> = node.output_types().iter().map(|t| t.dtype).collect();

    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let expected = op.arity();
        ensure!(
            expected.accepts(args.len()),
            ArityViolationSnafu { op: op.name(), expected, got: args.len() }
        );
        let arrays = args.iter().map(Value::to_array).collect::<Result<Vec<_>>>()?;

        let outputs = evaluate(op, &arrays)?;
        let mut values: Vec<Value> = outputs
            .into_iter()
            .zip(&out_dtypes)
            .map(|(array, dtype)| Value::Array(array.mapv_into(|v| dtype.cast_value(v))))
            .collect();
        Ok(if values.len() == 1 { values.remove(0) } else { Value::Tuple(values) })
    })))
}

fn evaluate(op: LinalgOp, args: &[ArrayD<f64>]) -> Result<Vec<ArrayD<f64>>> {
    let name = op.name();
    Ok(match op {
        LinalgOp::Dot => vec![dot(&args[0], &args[1])?],
        LinalgOp::BatchedDot => vec![batched_dot(&args[0], &args[1])?],
        LinalgOp::Cholesky { lower } => vec![cholesky(&square(&name, &args[0])?, lower)?.into_dyn()],
        LinalgOp::Solve => {
            let lu = Lu::decompose(&square(&name, &args[0])?);
            vec![solve_with(&name, &args[1], |b| lu.solve(b))?]
        }
        LinalgOp::SolveTriangular { lower } => {
            let a = square(&name, &args[0])?;
            vec![solve_with(&name, &args[1], |b| solve_triangular(&a, b, lower))?]
        }
        LinalgOp::CholeskySolve { lower } => {
            let c = square(&name, &args[0])?;
            vec![solve_with(&name, &args[1], |b| cholesky_solve(&c, b, lower))?]
        }
        LinalgOp::MatrixInverse => {
            let lu = Lu::decompose(&square(&name, &args[0])?);
            vec![lu.solve(&Array2::eye(lu.n()))?.into_dyn()]
        }
        LinalgOp::Pinv => vec![pinv(&matrix(&name, &args[0])?).into_dyn()],
        LinalgOp::Det => vec![rank0(Lu::decompose(&square(&name, &args[0])?).det())],
        LinalgOp::SLogDet => {
            let (sign, logabs) = Lu::decompose(&square(&name, &args[0])?).slogdet();
            vec![rank0(sign), rank0(logabs)]
        }
        LinalgOp::Qr => {
            let (q, r) = qr(&matrix(&name, &args[0])?);
            vec![q.into_dyn(), r.into_dyn()]
        }
        LinalgOp::Eigh { lower } => {
            let (w, v) = eigh(&square(&name, &args[0])?, lower);
            vec![w.into_dyn(), v.into_dyn()]
        }
        LinalgOp::Eigvalsh { lower } => vec![eigh(&square(&name, &args[0])?, lower).0.into_dyn()],
        LinalgOp::Svd { full_matrices, compute_uv } => {
            let (u, s, vt) = svd(&matrix(&name, &args[0])?, full_matrices);
            if compute_uv { vec![u.into_dyn(), s.into_dyn(), vt.into_dyn()] } else { vec![s.into_dyn()] }
        }
    })
}

// ============================================================================
// Shapes
// ============================================================================

fn shapes(arrays: &[&ArrayD<f64>]) -> Vec<Vec<usize>> {
    arrays.iter().map(|a| a.shape().to_vec()).collect()
}

fn mismatch(op: &str, arrays: &[&ArrayD<f64>]) -> Error {
    ShapeMismatchSnafu { op, shapes: shapes(arrays) }.build()
}

fn vector<'a>(op: &str, a: &'a ArrayD<f64>) -> Result<ArrayView1<'a, f64>> {
    a.view().into_dimensionality::<Ix1>().map_err(|_| mismatch(op, &[a]))
}

fn matrix<'a>(op: &str, a: &'a ArrayD<f64>) -> Result<ArrayView2<'a, f64>> {
    a.view().into_dimensionality::<Ix2>().map_err(|_| mismatch(op, &[a]))
}

fn square<'a>(op: &str, a: &'a ArrayD<f64>) -> Result<ArrayView2<'a, f64>> {
    let m = matrix(op, a)?;
    ensure!(m.nrows() == m.ncols(), ShapeMismatchSnafu { op, shapes: vec![a.shape().to_vec()] });
    Ok(m)
}

/// Apply a matrix solver to a vector or matrix right-hand side.
fn solve_with(
    op: &str,
    b: &ArrayD<f64>,
    solve: impl Fn(&Array2<f64>) -> Result<Array2<f64>>,
) -> Result<ArrayD<f64>> {
    match b.ndim() {
        1 => {
            let column = vector(op, b)?.insert_axis(Axis(1)).to_owned();
            Ok(solve(&column)?.index_axis(Axis(1), 0).to_owned().into_dyn())
        }
        _ => Ok(solve(&matrix(op, b)?.to_owned())?.into_dyn()),
    }
}

// ============================================================================
// Products
// ============================================================================

fn dot(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    let op = "dot";
    ensure!(a.shape().last() == b.shape().first(), ShapeMismatchSnafu { op, shapes: shapes(&[a, b]) });
    Ok(match (a.ndim(), b.ndim()) {
        (1, 1) => rank0(vector(op, a)?.dot(&vector(op, b)?)),
        (1, 2) => vector(op, a)?.dot(&matrix(op, b)?).into_dyn(),
        (2, 1) => matrix(op, a)?.dot(&vector(op, b)?).into_dyn(),
        (2, 2) => matrix(op, a)?.dot(&matrix(op, b)?).into_dyn(),
        _ => return Err(mismatch(op, &[a, b])),
    })
}

/// Per-batch [`dot`] over the leading axis of rank 2 or 3 operands; batch
/// sizes must agree.
fn batched_dot(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    let op = "batched_dot";
    let ranks_fit = matches!(a.ndim(), 2 | 3) && matches!(b.ndim(), 2 | 3);
    ensure!(
        ranks_fit && a.shape()[0] == b.shape()[0] && a.shape()[a.ndim() - 1] == b.shape()[1],
        ShapeMismatchSnafu { op, shapes: shapes(&[a, b]) }
    );

    let mut shape = vec![a.shape()[0]];
    shape.extend_from_slice(&a.shape()[1..a.ndim() - 1]);
    shape.extend_from_slice(&b.shape()[2..]);
    let mut out = ArrayD::zeros(IxDyn(&shape));
    for (i, mut slice) in out.axis_iter_mut(Axis(0)).enumerate() {
        let lhs = a.index_axis(Axis(0), i).to_owned();
        let rhs = b.index_axis(Axis(0), i).to_owned();
        slice.assign(&dot(&lhs, &rhs)?);
    }
    Ok(out)
}

// ============================================================================
// Cholesky
// ============================================================================

/// Factor of a symmetric positive-definite matrix, read from the requested triangle.
fn cholesky(a: &ArrayView2<f64>, lower: bool) -> Result<Array2<f64>> {
    // The upper factor of `a` is the transposed lower factor of `a^T`.
    let a = if lower { a.view() } else { a.t() };
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for j in 0..n {
        let diag = a[[j, j]] - (0..j).map(|k| l[[j, k]] * l[[j, k]]).sum::<f64>();
        ensure!(
            diag > 0.0,
            LinalgSnafu { op: "cholesky", reason: format!("matrix is not positive definite (pivot {j} is {diag})") }
        );
        let diag = diag.sqrt();
        l[[j, j]] = diag;
        for i in (j + 1)..n {
            let sum = a[[i, j]] - (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum::<f64>();
            l[[i, j]] = sum / diag;
        }
    }
    Ok(if lower { l } else { l.reversed_axes() })
}

// ============================================================================
// LU
// ============================================================================

/// `PA = LU` packed into one matrix; the unit diagonal of `L` is implicit.
struct Lu {
    lu: Array2<f64>,
    /// Original row index of each row of `lu`.
    pivots: Vec<usize>,
    /// Sign of the permutation.
    sign: f64,
    singular: bool,
}

impl Lu {
    fn decompose(a: &ArrayView2<f64>) -> Self {
        let n = a.nrows();
        let mut lu = a.to_owned();
        let mut pivots: Vec<usize> = (0..n).collect();
        let mut sign = 1.0;
        let mut singular = false;
        let tolerance = f64::EPSILON * n as f64 * a.iter().fold(0.0f64, |m, v| m.max(v.abs()));

        for k in 0..n {
            let pivot_row = (k..n).max_by(|&i, &j| lu[[i, k]].abs().total_cmp(&lu[[j, k]].abs())).unwrap_or(k);
            if pivot_row != k {
                for j in 0..n {
                    lu.swap([k, j], [pivot_row, j]);
                }
                pivots.swap(k, pivot_row);
                sign = -sign;
            }

            let pivot = lu[[k, k]];
            if pivot == 0.0 || pivot.abs() <= tolerance {
                singular = true;
                if pivot == 0.0 {
                    continue;
                }
            }
            for i in (k + 1)..n {
                let factor = lu[[i, k]] / pivot;
                lu[[i, k]] = factor;
                for j in (k + 1)..n {
                    let ukj = lu[[k, j]];
                    lu[[i, j]] -= factor * ukj;
                }
            }
        }
        Self { lu, pivots, sign, singular }
    }

    fn n(&self) -> usize {
        self.lu.nrows()
    }

    fn det(&self) -> f64 {
        self.lu.diag().iter().fold(self.sign, |d, &u| d * u)
    }

    /// Sign and log of the absolute determinant; `(0, -inf)` when singular.
    fn slogdet(&self) -> (f64, f64) {
        let diag = self.lu.diag();
        if diag.iter().any(|&u| u == 0.0) {
            return (0.0, f64::NEG_INFINITY);
        }
        let sign = diag.iter().fold(self.sign, |s, &u| s * u.signum());
        (sign, diag.iter().map(|u| u.abs().ln()).sum())
    }

    /// Solve `A X = B` for each column of `b`.
    fn solve(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        let n = self.n();
        ensure!(!self.singular, LinalgSnafu { op: "solve", reason: "matrix is singular" });
        ensure!(
        b.nrows() == n,
        ShapeMismatchSnafu { op: "solve", shapes: vec![vec![n, n], b.shape().to_vec()] }
    );

        let mut x = b.select(Axis(0), &self.pivots);
        for mut column in x.columns_mut() {
            for i in 1..n {
                let sum: f64 = (0..i).map(|j| self.lu[[i, j]] * column[j]).sum();
                column[i] -= sum;
            }
            for i in (0..n).rev() {
                let sum: f64 = ((i + 1)..n).map(|j| self.lu[[i, j]] * column[j]).sum();
                column[i] = (column[i] - sum) / self.lu[[i, i]];
            }
        }
        Ok(x)
    }
}

// ============================================================================
// Triangular solve
// ============================================================================

/// Solve `A X = B` using only the requested triangle of `a`.
fn solve_triangular(a: &ArrayView2<f64>, b: &Array2<f64>, lower: bool) -> Result<Array2<f64>> {
    let op = "solve_triangular";
    let n = a.nrows();
    ensure!(b.nrows() == n, ShapeMismatchSnafu { op, shapes: vec![vec![n, n], b.shape().to_vec()] });
    ensure!(a.diag().iter().all(|&d| d != 0.0), LinalgSnafu { op, reason: "matrix is singular" });

    let mut x = b.clone();
    for mut column in x.columns_mut() {
        let order: Box<dyn Iterator<Item = usize>> =
            if lower { Box::new(0..n) } else { Box::new((0..n).rev()) };
        for i in order {
            let known: Box<dyn Iterator<Item = usize>> =
                if lower { Box::new(0..i) } else { Box::new((i + 1)..n) };
            let sum: f64 = known.map(|j| a[[i, j]] * column[j]).sum();
            column[i] = (column[i] - sum) / a[[i, i]];
        }
    }
    Ok(x)
}

/// Solve `A X = B` from the factor `c` of `A = C C^T` (lower) or
/// `A = C^T C` (upper).
fn cholesky_solve(c: &ArrayView2<f64>, b: &Array2<f64>, lower: bool) -> Result<Array2<f64>> {
    if lower {
        let y = solve_triangular(c, b, true)?;
        solve_triangular(&c.t(), &y, false)
    } else {
        let y = solve_triangular(&c.t(), b, true)?;
        solve_triangular(c, &y, false)
    }
}

// ============================================================================
// QR
// ============================================================================

/// Reduced QR: `Q` is `m x k` with orthonormal columns, `R` is `k x n` upper
/// triangular, `k = min(m, n)`.
fn qr(a: &ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
    let (m, n) = a.dim();
    let k = m.min(n);
    let mut r = a.to_owned();
    let mut q = Array2::<f64>::eye(m);

    for j in 0..k {
        let x = r.slice(s![j.., j]).to_owned();
        let norm = x.dot(&x).sqrt();
        if norm == 0.0 {
            continue;
        }
        // Reflect x onto -sign(x0) * |x| e0 to avoid cancellation.
        let alpha = if x[0] > 0.0 { -norm } else { norm };
        let mut v: Array1<f64> = x;
        v[0] -= alpha;
        let scale = 2.0 / v.dot(&v);

        let mut block = r.slice_mut(s![j.., ..]);
        let w = v.dot(&block);
        for (mut row, &vi) in block.rows_mut().into_iter().zip(&v) {
            row.scaled_add(-scale * vi, &w);
        }

        let mut block = q.slice_mut(s![.., j..]);
        let u = block.dot(&v);
        for (mut row, &ui) in block.rows_mut().into_iter().zip(&u) {
            row.scaled_add(-scale * ui, &v);
        }
    }

    let mut r = r.slice(s![..k, ..]).to_owned();
    for ((i, j), value) in r.indexed_iter_mut() {
        if i > j {
            *value = 0.0;
        }
    }
    (q.slice(s![.., ..k]).to_owned(), r)
}

// ============================================================================
// Jacobi rotations
// ============================================================================

const MAX_SWEEPS: usize = 100;

/// `(cos, sin)` of the rotation that zeroes the off-diagonal entry `apq` of
/// the symmetric pair `[[app, apq], [apq, aqq]]`.
fn jacobi_rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    let theta = (aqq - app) / (2.0 * apq);
    let t = if theta >= 0.0 {
        1.0 / (theta + (1.0 + theta * theta).sqrt())
    } else {
        -1.0 / (-theta + (1.0 + theta * theta).sqrt())
    };
    let c = 1.0 / (1.0 + t * t).sqrt();
    (c, t * c)
}

fn rotate_columns(a: &mut Array2<f64>, p: usize, q: usize, (c, s): (f64, f64)) {
    let (col_p, col_q) = (a.column(p).to_owned(), a.column(q).to_owned());
    a.column_mut(p).assign(&(&col_p * c - &col_q * s));
    a.column_mut(q).assign(&(&col_p * s + &col_q * c));
}

fn rotate_rows(a: &mut Array2<f64>, p: usize, q: usize, (c, s): (f64, f64)) {
    let (row_p, row_q) = (a.row(p).to_owned(), a.row(q).to_owned());
    a.row_mut(p).assign(&(&row_p * c - &row_q * s));
    a.row_mut(q).assign(&(&row_p * s + &row_q * c));
}

/// `r` with its components along the filled columns of `u` removed.
fn orthogonalize(u: &Array2<f64>, filled: &[bool], mut r: Array1<f64>) -> Array1<f64> {
    // Twice, to restore orthogonality lost to rounding.
    for _ in 0..2 {
        for k in (0..filled.len()).filter(|&k| filled[k]) {
            let column = u.column(k);
            let projection = column.dot(&r);
            r.scaled_add(-projection, &column);
        }
    }
    r
}

/// Fill the columns of `u` not marked in `filled` so that all columns are
/// orthonormal, starting from the unit vector that is least covered by the
/// columns already present.
fn complete_orthonormal(u: &mut Array2<f64>, filled: &mut [bool]) {
    let m = u.nrows();
    for j in 0..filled.len() {
        if filled[j] {
            continue;
        }
        let candidate = (0..m)
            .map(|i| {
                let mut unit = Array1::<f64>::zeros(m);
                unit[i] = 1.0;
                orthogonalize(u, filled, unit)
            })
            .max_by(|a, b| a.dot(a).total_cmp(&b.dot(b)));
        if let Some(r) = candidate {
            let norm = r.dot(&r).sqrt();
            u.column_mut(j).assign(&(r / norm));
            filled[j] = true;
        }
    }
}

// ============================================================================
// Symmetric eigenproblem
// ============================================================================

/// Eigenvalues in ascending order and the matching eigenvectors as columns.
/// Only the requested triangle of `a` is read.
fn eigh(a: &ArrayView2<f64>, lower: bool) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut sym = Array2::from_shape_fn((n, n), |(i, j)| {
        let (hi, lo) = (i.max(j), i.min(j));
        if lower { a[[hi, lo]] } else { a[[lo, hi]] }
    });
    let mut v = Array2::<f64>::eye(n);
    let scale = sym.iter().map(|x| x * x).sum::<f64>().sqrt();

    for _ in 0..MAX_SWEEPS {
        let off = (0..n).flat_map(|i| ((i + 1)..n).map(move |j| (i, j))).map(|(i, j)| sym[[i, j]].powi(2)).sum::<f64>();
        if off.sqrt() <= f64::EPSILON * scale {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = sym[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let rotation = jacobi_rotation(sym[[p, p]], sym[[q, q]], apq);
                rotate_columns(&mut sym, p, q, rotation);
                rotate_rows(&mut sym, p, q, rotation);
                sym[[p, q]] = 0.0;
                sym[[q, p]] = 0.0;
                rotate_columns(&mut v, p, q, rotation);
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| sym[[i, i]].total_cmp(&sym[[j, j]]));
    let w = order.iter().map(|&i| sym[[i, i]]).collect();
    (w, v.select(Axis(1), &order))
}

// ============================================================================
// SVD
// ============================================================================

/// `A = U diag(S) Vt` with singular values in descending order.
///
/// Reduced: `U` is `m x k`, `Vt` is `k x n`, `k = min(m, n)`. Full: `U` and
/// `Vt` are square.
fn svd(a: &ArrayView2<f64>, full_matrices: bool) -> (Array2<f64>, Array1<f64>, Array2<f64>) {
    let (m, n) = a.dim();
    if m < n {
        // A^T = U' S V'^T, so A = V' S U'^T.
        let (u, s, vt) = svd(&a.t(), full_matrices);
        return (vt.reversed_axes(), s, u.reversed_axes());
    }

    // One-sided Jacobi: rotate column pairs of `w` until they are orthogonal.
    let mut w = a.to_owned();
    let mut v = Array2::<f64>::eye(n);
    for _ in 0..MAX_SWEEPS {
        let mut converged = true;
        for p in 0..n {
            for q in (p + 1)..n {
                let (col_p, col_q) = (w.column(p), w.column(q));
                let (app, aqq, apq) = (col_p.dot(&col_p), col_q.dot(&col_q), col_p.dot(&col_q));
                if apq.abs() <= f64::EPSILON * (app * aqq).sqrt() {
                    continue;
                }
                converged = false;
                let rotation = jacobi_rotation(app, aqq, apq);
                rotate_columns(&mut w, p, q, rotation);
                rotate_columns(&mut v, p, q, rotation);
            }
        }
        if converged {
            break;
        }
    }

    let norms: Vec<f64> = w.columns().into_iter().map(|c| c.dot(&c).sqrt()).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| norms[j].total_cmp(&norms[i]));
    let s: Array1<f64> = order.iter().map(|&j| norms[j]).collect();

    let cutoff = f64::EPSILON * m as f64 * s.first().copied().unwrap_or(0.0);
    let mut u = Array2::<f64>::zeros((m, if full_matrices { m } else { n }));
    let mut filled = vec![false; u.ncols()];
    for (new, &old) in order.iter().enumerate() {
        if norms[old] <= cutoff {
            continue;
        }
        // Columns of negligible norm are rounding noise; keep them only if
        // they survive orthogonalization against the larger ones.
        let r = orthogonalize(&u, &filled, &w.column(old) / norms[old]);
        let norm = r.dot(&r).sqrt();
        if norm > 0.5 {
            u.column_mut(new).assign(&(r / norm));
            filled[new] = true;
        }
    }
    complete_orthonormal(&mut u, &mut filled);
    (u, s, v.select(Axis(1), &order).reversed_axes())
}

/// `V diag(1/S) U^T`, dropping singular values at or below the rounding
/// level of the largest one.
fn pinv(a: &ArrayView2<f64>) -> Array2<f64> {
    let (m, n) = a.dim();
    let (u, s, mut vt) = svd(a, false);
    let cutoff = 10.0 * m.max(n) as f64 * f64::EPSILON * s.first().copied().unwrap_or(0.0);
    for (mut row, &sv) in vt.rows_mut().into_iter().zip(&s) {
        let inverse = if sv > cutoff { 1.0 / sv } else { 0.0 };
        row *= inverse;
    }
    vt.t().dot(&u.t())
}
