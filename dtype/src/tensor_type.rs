//! Tensor types: an element dtype plus a static, possibly partial, shape.

use std::fmt;

use smallvec::SmallVec;

use crate::DType;

/// Static size of one dimension. `None` means unknown until runtime.
pub type Dim = Option<usize>;

/// Static shape of a tensor type.
pub type Shape = SmallVec<[Dim; 4]>;

/// Type of a variable in an expression graph.
///
/// Rank is always known statically; individual dimension sizes may not be.
/// A rank-0 type is a true scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorType {
    pub fn new(dtype: DType, shape: impl IntoIterator<Item = Dim>) -> Self {
        Self { dtype, shape: shape.into_iter().collect() }
    }

    /// Rank-0 type.
    pub fn scalar(dtype: DType) -> Self {
        Self { dtype, shape: Shape::new() }
    }

    /// Type with every dimension size known.
    pub fn fixed(dtype: DType, dims: &[usize]) -> Self {
        Self::new(dtype, dims.iter().map(|&d| Some(d)))
    }

    /// Type of the given rank with every dimension size unknown.
    pub fn with_rank(dtype: DType, ndim: usize) -> Self {
        Self::new(dtype, std::iter::repeat_n(None, ndim))
    }

    pub fn vector(dtype: DType) -> Self {
        Self::with_rank(dtype, 1)
    }

    pub fn matrix(dtype: DType) -> Self {
        Self::with_rank(dtype, 2)
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Per-dimension flags for dimensions statically known to be 1.
    pub fn broadcastable(&self) -> SmallVec<[bool; 4]> {
        self.shape.iter().map(|d| *d == Some(1)).collect()
    }

    /// Same type with a different dtype.
    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self { dtype, shape: self.shape.clone() }
    }

    /// Whether a value of type `other` may stand in for a value of this type.
    ///
    /// Requires the same dtype and rank. A dimension known on both sides must
    /// agree; an unknown dimension on either side is accepted.
    pub fn is_compatible(&self, other: &TensorType) -> bool {
        self.dtype == other.dtype
            && self.ndim() == other.ndim()
            && self.shape.iter().zip(other.shape.iter()).all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            })
    }

    /// Elementwise broadcast of several shapes (right-aligned, numpy rules).
    ///
    /// A static 1 broadcasts against anything. Two known sizes that differ and
    /// are not 1 cannot be broadcast and yield `None`. If any operand has an
    /// unknown size in a dimension and no operand pins it to a known size
    /// other than 1, the result stays unknown.
    pub fn broadcast_shapes<'a>(shapes: impl IntoIterator<Item = &'a [Dim]>) -> Option<Shape> {
        let shapes: SmallVec<[&[Dim]; 4]> = shapes.into_iter().collect();
        let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
        let mut out = Shape::with_capacity(ndim);

        for axis in 0..ndim {
            let mut known: Option<usize> = None;
            let mut saw_unknown = false;
            let mut all_one = true;

            for shape in &shapes {
                let offset = ndim - shape.len();
                if axis < offset {
                    continue;
                }
                match shape[axis - offset] {
                    Some(1) => {}
                    Some(d) => {
                        all_one = false;
                        match known {
                            Some(k) if k != d => return None,
                            _ => known = Some(d),
                        }
                    }
                    None => {
                        all_one = false;
                        saw_unknown = true;
                    }
                }
            }

            out.push(match known {
                Some(d) => Some(d),
                None if all_one => Some(1),
                None if saw_unknown => None,
                None => Some(1),
            });
        }

        Some(out)
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match dim {
                Some(d) => write!(f, "{d}")?,
                None => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}
