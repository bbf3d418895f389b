use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;

use tessera_dtype::{DType, TensorType};

use crate::op::Op;
use crate::scalar::{BinaryOp, ScalarOp, TernaryOp, VariadicOp, floor_div, floor_mod};
use crate::special;

proptest! {
    /// `a == floor_div(a, b) * b + floor_mod(a, b)` on integers.
    #[test]
    fn floor_div_mod_identity(a in -1000i64..1000, b in -50i64..50) {
        prop_assume!(b != 0);
        let (a, b) = (a as f64, b as f64);
        let q = floor_div(a, b, true);
        let r = floor_mod(a, b, true);
        prop_assert_eq!(q * b + r, a);
        prop_assert!(r == 0.0 || (r < 0.0) == (b < 0.0));
        prop_assert!(r.abs() < b.abs());
    }

    /// Clip equals min(max(x, lo), hi) whenever the bounds are ordered.
    #[test]
    fn clip_ordered_bounds(x in -10.0f64..10.0, lo in -5.0f64..0.0, hi in 0.0f64..5.0) {
        prop_assert_eq!(TernaryOp::Clip.perform(x, lo, hi), x.max(lo).min(hi));
    }

    /// Variadic perform is the left fold of the binary perform.
    #[test]
    fn variadic_is_left_fold(values in prop::collection::vec(-100.0f64..100.0, 1..6)) {
        let add = ScalarOp::Variadic(VariadicOp::Add);
        let total = add.perform(&values, &[DType::Float64]).unwrap()[0];
        let folded = values[1..].iter().fold(values[0], |acc, &x| acc + x);
        prop_assert_eq!(total, folded);
    }

    /// Elementwise array evaluation agrees with the scalar reference at every index.
    #[test]
    fn array_perform_matches_scalar(
        lhs in prop::collection::vec(-5.0f64..5.0, 6),
        rhs in prop::collection::vec(-5.0f64..5.0, 3),
    ) {
        let op = Op::from(BinaryOp::Pow);
        let a = ArrayD::from_shape_vec(IxDyn(&[2, 3]), lhs).unwrap();
        let b = ArrayD::from_shape_vec(IxDyn(&[3]), rhs).unwrap();
        let out = op.perform(&[&a, &b], &[TensorType::fixed(DType::Float64, &[2, 3])]).unwrap();

        for i in 0..2 {
            for j in 0..3 {
                let expected = a[[i, j]].powf(b[[j]]);
                let got = out[0][[i, j]];
                prop_assert!(got == expected || (got.is_nan() && expected.is_nan()));
            }
        }
    }

    #[test]
    fn erfinv_roundtrip(y in -0.999f64..0.999) {
        let x = special::erfinv(y);
        prop_assert!((special::erf(x) - y).abs() <= 1e-10);
    }

    #[test]
    fn erf_erfc_complement(x in -6.0f64..6.0) {
        prop_assert!((special::erf(x) + special::erfc(x) - 1.0).abs() <= 1e-13);
    }

    /// psi(x + 1) = psi(x) + 1/x.
    #[test]
    fn digamma_recurrence(x in 0.1f64..20.0) {
        let lhs = special::digamma(x + 1.0);
        let rhs = special::digamma(x) + 1.0 / x;
        prop_assert!((lhs - rhs).abs() <= 1e-10 * lhs.abs().max(1.0));
    }
}
