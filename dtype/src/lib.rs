//! Data types for tessera expression graphs.
//!
//! - [`DType`] - scalar element types with the promotion lattice in [`cast`]
//! - [`TensorType`] - element type plus a statically known (possibly partial) shape

pub mod cast;
pub mod tensor_type;


pub use tensor_type::{Dim, Shape, TensorType};

/// Scalar element types.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[derive(enumset::EnumSetType)]
#[cfg_attr(any(test, feature = "proptest"), derive(proptest_derive::Arbitrary))]
#[strum(serialize_all = "lowercase")]
#[enumset(repr = "u32")]
pub enum DType {
    Bool = 0,

    // Interleaved signed/unsigned for correct LUB priority (lower = more specific)
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,

    Float16 = 9,
    Float32 = 10,
    Float64 = 11,
}

impl DType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Integer or bool: values that are exact in the discrete domain.
    pub const fn is_discrete(&self) -> bool {
        self.is_int() || self.is_bool()
    }

    /// Smallest and largest representable value, as `f64`.
    ///
    /// Float bounds are the finite extremes; `Float16` uses its IEEE half limits.
    pub const fn bounds(&self) -> (f64, f64) {
        match self {
            Self::Bool => (0.0, 1.0),
            Self::Int8 => (i8::MIN as f64, i8::MAX as f64),
            Self::Int16 => (i16::MIN as f64, i16::MAX as f64),
            Self::Int32 => (i32::MIN as f64, i32::MAX as f64),
            Self::Int64 => (i64::MIN as f64, i64::MAX as f64),
            Self::UInt8 => (0.0, u8::MAX as f64),
            Self::UInt16 => (0.0, u16::MAX as f64),
            Self::UInt32 => (0.0, u32::MAX as f64),
            Self::UInt64 => (0.0, u64::MAX as f64),
            Self::Float16 => (-65504.0, 65504.0),
            Self::Float32 => (f32::MIN as f64, f32::MAX as f64),
            Self::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Default float type used when an integer input must produce a real result.
    pub const fn float_for(&self) -> Self {
        match self {
            Self::Float16 | Self::Float32 | Self::Float64 => *self,
            Self::Bool | Self::Int8 | Self::UInt8 | Self::Int16 | Self::UInt16 => Self::Float32,
            _ => Self::Float64,
        }
    }

    /// Convert a value into the value set of this dtype.
    ///
    /// Integers truncate toward zero and saturate at the dtype bounds (NaN maps
    /// to 0); bool is `value != 0`; `Float16`/`Float32` round through `f32`.
    pub fn cast_value(&self, value: f64) -> f64 {
        match self {
            Self::Bool => f64::from(u8::from(value != 0.0)),
            Self::Float64 => value,
            Self::Float16 | Self::Float32 => value as f32 as f64,
            _ if value.is_nan() => 0.0,
            _ => {
                let (lo, hi) = self.bounds();
                value.trunc().clamp(lo, hi)
            }
        }
    }
}
