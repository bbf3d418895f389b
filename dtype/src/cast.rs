use super::*;
use enumset::EnumSet;

impl DType {
    const fn promotion_lattice(self) -> &'static [Self] {
        use DType::*;
        match self {
            Bool => &[Int8, UInt8],
            Int8 => &[Int16, Float16],
            Int16 => &[Int32, Float32],
            Int32 => &[Int64, Float64],
            Int64 => &[Float64],
            UInt8 => &[Int16, UInt16],
            UInt16 => &[Int32, UInt32],
            UInt32 => &[Int64, UInt64],
            UInt64 => &[Float64],
            Float16 => &[Float32],
            Float32 => &[Float64],
            Float64 => &[],
        }
    }

    fn get_recursive_parents(self) -> EnumSet<Self> {
        self.promotion_lattice()
            .iter()
            .fold(EnumSet::only(self), |dtypes, &parent| dtypes.union(parent.get_recursive_parents()))
    }

    /// Check if casting from `self` to `to` preserves every value.
    pub fn can_safe_cast(self, to: Self) -> bool {
        self == to || self.get_recursive_parents().contains(to)
    }

    /// Find the least upper bound of a set of dtypes.
    ///
    /// Returns the most specific type every input can be safely cast to, or
    /// `None` for an empty slice.
    pub fn least_upper_dtype(dtypes: &[Self]) -> Option<Self> {
        dtypes
            .iter()
            .map(|d| d.get_recursive_parents())
            .reduce(|lhs, rhs| lhs.intersection(rhs))?
            .iter()
            .min() // min by discriminant (= priority: lower = more specific)
    }

    /// Pairwise upcast; the lattice always has `Float64` on top so this cannot fail.
    pub fn upcast(self, other: Self) -> Self {
        Self::least_upper_dtype(&[self, other]).unwrap_or(Self::Float64)
    }

    /// (category, precision) pair used by [`DType::is_an_upcast`].
    ///
    /// Category orders bool < uint < int < float; precision orders widths
    /// inside a category, with floats offset so `int64 -> float32` counts as
    /// a precision loss.
    const fn upcast_rank(self) -> (u8, f32) {
        use DType::*;
        match self {
            Bool => (0, 0.0),
            UInt8 => (1, 1.0),
            UInt16 => (1, 2.0),
            UInt32 => (1, 3.0),
            UInt64 => (1, 4.0),
            Int8 => (2, 1.0),
            Int16 => (2, 2.0),
            Int32 => (2, 3.0),
            Int64 => (2, 4.0),
            Float16 => (3, 1.5),
            Float32 => (3, 2.5),
            Float64 => (3, 3.5),
        }
    }

    /// Whether converting `self` into `to` is an upcast.
    ///
    /// This is stricter than [`DType::can_safe_cast`]: conversion from a higher
    /// category or precision to a lower one is never an upcast, and the
    /// identity conversion is not one either.
    pub fn is_an_upcast(self, to: Self) -> bool {
        let (cat1, prec1) = self.upcast_rank();
        let (cat2, prec2) = to.upcast_rank();
        cat2 >= cat1 && prec2 > prec1
    }
}
