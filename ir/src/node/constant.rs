use std::fmt;

use ndarray::{ArrayD, IxDyn};
use tessera_dtype::{DType, TensorType};

use crate::error::*;

/// Constant payload: values stored as `f64`, already converted into the value
/// set of `dtype`. Scalars are 0-d arrays.
#[derive(Debug, Clone)]
pub struct Constant {
    dtype: DType,
    value: ArrayD<f64>,
}

impl Constant {
    pub fn new(dtype: DType, value: ArrayD<f64>) -> Self {
        Self { dtype, value: value.mapv_into(|v| dtype.cast_value(v)) }
    }

    pub fn scalar(dtype: DType, value: f64) -> Self {
        Self::new(dtype, ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn filled(dtype: DType, shape: &[usize], value: f64) -> Self {
        Self::new(dtype, ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Row-major values with an explicit shape.
    pub fn from_vec(dtype: DType, shape: &[usize], values: Vec<f64>) -> Result<Self> {
        let got = vec![values.len()];
        let Ok(value) = ArrayD::from_shape_vec(IxDyn(shape), values) else {
            return ConstantShapeSnafu { expected: shape.to_vec(), got }.fail();
        };
        Ok(Self::new(dtype, value))
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn value(&self) -> &ArrayD<f64> {
        &self.value
    }

    pub fn ty(&self) -> TensorType {
        TensorType::fixed(self.dtype, self.value.shape())
    }

    /// Value equality: same dtype, same shape and bitwise-equal elements
    /// (so NaN equals NaN).
    pub fn equals(&self, other: &Constant) -> bool {
        self.dtype == other.dtype
            && self.value.shape() == other.value.shape()
            && self.value.iter().zip(other.value.iter()).all(|(a, b)| a.to_bits() == b.to_bits() || a == b)
    }

    /// The common value when every element is equal.
    pub fn unique_value(&self) -> Option<f64> {
        let mut iter = self.value.iter();
        let first = *iter.next()?;
        iter.all(|v| v.to_bits() == first.to_bits() || *v == first).then_some(first)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unique_value() {
            Some(v) if self.value.ndim() == 0 => write!(f, "{v}:{}", self.dtype),
            Some(v) => write!(f, "fill({v}):{}{:?}", self.dtype, self.value.shape()),
            None => write!(f, "array:{}{:?}", self.dtype, self.value.shape()),
        }
    }
}
