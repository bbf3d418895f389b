//! Runtime values exchanged between backend callables.

use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use snafu::OptionExt;

use crate::error::*;

/// Backend implementation of one apply node.
///
/// Takes one value per node input. Multi-output nodes return [`Value::Tuple`].
pub type Callable = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Value flowing through a lowered graph.
#[derive(Clone, PartialEq)]
pub enum Value {
    /// Plain number, produced by the scalar fast path.
    Scalar(f64),
    /// Backend array; rank 0 allowed.
    Array(ArrayD<f64>),
    /// Outputs of a multi-output node.
    Tuple(Vec<Value>),
}

impl Value {
    pub fn scalar_array(value: f64) -> Self {
        Self::Array(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
        }
    }

    pub fn ndim(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => Some(0),
            Self::Array(a) => Some(a.ndim()),
            Self::Tuple(_) => None,
        }
    }

    /// Number held by a scalar or a rank-0 array.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Array(a) if a.ndim() == 0 => a.first().copied(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Array form; scalars become rank-0 arrays.
    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        match self {
            Self::Scalar(v) => Ok(ArrayD::from_elem(IxDyn(&[]), *v)),
            Self::Array(a) => Ok(a.clone()),
            Self::Tuple(_) => ValueKindSnafu { expected: "array", got: self.kind() }.fail(),
        }
    }

    /// Split into `n` values: a tuple of that length, or the value itself when `n` is 1.
    pub fn split(self, n: usize) -> Result<Vec<Value>> {
        match self {
            Self::Tuple(values) if values.len() == n => Ok(values),
            Self::Tuple(values) => {
                ValueKindSnafu { expected: format!("tuple of {n}"), got: format!("tuple of {}", values.len()) }.fail()
            }
            value if n == 1 => Ok(vec![value]),
            value => ValueKindSnafu { expected: format!("tuple of {n}"), got: value.kind() }.fail(),
        }
    }

    /// Apply `f` to every number, keeping the value's kind.
    pub fn map(self, f: &dyn Fn(f64) -> f64) -> Self {
        match self {
            Self::Scalar(v) => Self::Scalar(f(v)),
            Self::Array(a) => Self::Array(a.mapv(f)),
            Self::Tuple(values) => Self::Tuple(values.into_iter().map(|v| v.map(f)).collect()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(value: ArrayD<f64>) -> Self {
        Self::Array(value)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "Scalar({v})"),
            Self::Array(a) => write!(f, "Array({a})"),
            Self::Tuple(values) => f.debug_tuple("Tuple").field(values).finish(),
        }
    }
}

// ============================================================================
// Broadcasting
// ============================================================================

/// Broadcast shape of `shapes`, aligning trailing dimensions.
pub fn broadcast_shape<'a>(shapes: impl IntoIterator<Item = &'a [usize]>) -> Option<Vec<usize>> {
    let mut out: Vec<usize> = Vec::new();
    for shape in shapes {
        if shape.len() > out.len() {
            let mut padded = vec![1; shape.len() - out.len()];
            padded.extend_from_slice(&out);
            out = padded;
        }
        let offset = out.len() - shape.len();
        for (slot, &dim) in out[offset..].iter_mut().zip(shape) {
            match (*slot, dim) {
                (a, b) if a == b => {}
                (1, b) => *slot = b,
                (_, 1) => {}
                _ => return None,
            }
        }
    }
    Some(out)
}

/// Views of `arrays` broadcast to their common shape.
pub fn broadcast_arrays<'a>(op: &str, arrays: &'a [ArrayD<f64>]) -> Result<(Vec<usize>, Vec<ArrayViewD<'a, f64>>)> {
    let mismatch = || ShapeMismatchSnafu { op, shapes: arrays.iter().map(|a| a.shape().to_vec()).collect::<Vec<_>>() };
    let shape = broadcast_shape(arrays.iter().map(|a| a.shape())).with_context(mismatch)?;
    let views = arrays.iter().map(|a| a.broadcast(IxDyn(&shape))).collect::<Option<Vec<_>>>().with_context(mismatch)?;
    Ok((shape, views))
}
