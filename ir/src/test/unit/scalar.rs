use test_case::test_case;

use tessera_dtype::DType;

use crate::error::Error;
use crate::op::Arity;
use crate::scalar::*;

#[test_case(7.0, 2.0, 3.0 ; "positive")]
#[test_case(-7.0, 2.0, -4.0 ; "negative rounds down")]
#[test_case(7.0, -2.0, -4.0 ; "negative divisor")]
#[test_case(7.0, 0.0, 0.0 ; "integer by zero")]
fn test_floor_div_discrete(a: f64, b: f64, expected: f64) {
    assert_eq!(floor_div(a, b, true), expected);
}

#[test_case(7.0, 3.0, 1.0 ; "positive")]
#[test_case(-7.0, 3.0, 2.0 ; "sign of divisor")]
#[test_case(7.0, -3.0, -2.0 ; "negative divisor")]
#[test_case(6.0, -3.0, 0.0 ; "exact")]
#[test_case(5.0, 0.0, 0.0 ; "integer by zero")]
fn test_floor_mod_discrete(a: f64, b: f64, expected: f64) {
    assert_eq!(floor_mod(a, b, true), expected);
}

#[test]
fn test_float_division_by_zero_is_ieee() {
    assert_eq!(floor_div(1.0, 0.0, false), f64::INFINITY);
    assert!(floor_mod(1.0, 0.0, false).is_nan());
}

#[test_case(UnaryOp::Exp, DType::Int32, DType::Float64)]
#[test_case(UnaryOp::Exp, DType::Int8, DType::Float32)]
#[test_case(UnaryOp::Exp, DType::Float32, DType::Float32)]
#[test_case(UnaryOp::Neg, DType::Int16, DType::Int16)]
#[test_case(UnaryOp::Sqr, DType::UInt8, DType::UInt8)]
#[test_case(UnaryOp::Not, DType::Bool, DType::Bool)]
#[test_case(UnaryOp::Psi, DType::Float16, DType::Float16)]
fn test_unary_output_dtype(op: UnaryOp, input: DType, expected: DType) {
    assert_eq!(op.output_dtype(input).unwrap(), expected);
}

#[test]
fn test_not_rejects_floats() {
    assert!(matches!(UnaryOp::Not.output_dtype(DType::Float64), Err(Error::DTypeMismatch { .. })));
}

#[test_case(BinaryOp::Lt, DType::Float64, DType::Int32, DType::Bool)]
#[test_case(BinaryOp::TrueDiv, DType::Int32, DType::Int32, DType::Float64)]
#[test_case(BinaryOp::IntDiv, DType::Int8, DType::Int16, DType::Int16)]
#[test_case(BinaryOp::Second, DType::Float64, DType::Int8, DType::Int8)]
#[test_case(BinaryOp::Sub, DType::UInt8, DType::Int8, DType::Int16)]
fn test_binary_output_dtype(op: BinaryOp, lhs: DType, rhs: DType, expected: DType) {
    assert_eq!(op.output_dtype(lhs, rhs), expected);
}

#[test]
fn test_bitwise_rejects_floats() {
    let err = VariadicOp::And.output_dtype(&[DType::Int32, DType::Float32]).unwrap_err();
    assert!(matches!(err, Error::DTypeMismatch { .. }));
    assert_eq!(VariadicOp::Xor.output_dtype(&[DType::Bool, DType::Bool]).unwrap(), DType::Bool);
}

#[test]
fn test_switch_ignores_condition_dtype() {
    let out = TernaryOp::Switch.output_dtype([DType::Bool, DType::Int8, DType::Float32]);
    assert_eq!(out, DType::Float32);
}

#[test_case(0.5, 0.0, 1.0, 0.5 ; "inside")]
#[test_case(-1.0, 0.0, 1.0, 0.0 ; "below")]
#[test_case(2.0, 0.0, 1.0, 1.0 ; "above")]
#[test_case(0.5, 1.0, 0.0, 1.0 ; "inverted bounds take lower first")]
#[test_case(2.0, 1.0, 0.0, 0.0 ; "inverted bounds above")]
fn test_clip_is_nested_where(x: f64, lo: f64, hi: f64, expected: f64) {
    assert_eq!(TernaryOp::Clip.perform(x, lo, hi), expected);
}

#[test]
fn test_variadic_arity_and_fold() {
    let add = ScalarOp::Variadic(VariadicOp::Add);
    assert_eq!(add.arity(), Arity::Variadic { min: 1 });
    assert!(!add.arity().accepts(0));
    let out = add.perform(&[1.0, 2.0, 3.5], &[DType::Float64]).unwrap();
    assert_eq!(out[0], 6.5);

    let max = ScalarOp::Variadic(VariadicOp::Maximum);
    assert!(max.perform(&[1.0, f64::NAN, 3.0], &[DType::Float64]).unwrap()[0].is_nan());
}

#[test]
fn test_variadic_identity_and_reduction() {
    assert_eq!(VariadicOp::Add.identity(), Some(0.0));
    assert_eq!(VariadicOp::Mul.identity(), Some(1.0));
    assert_eq!(VariadicOp::And.identity(), None);
    assert_eq!(VariadicOp::Add.nfunc_variadic(), Some("sum"));
    assert_eq!(VariadicOp::Mul.nfunc_variadic(), Some("prod"));
    assert_eq!(VariadicOp::Xor.nfunc_variadic(), None);
}

#[test]
fn test_perform_casts_result() {
    let div = ScalarOp::Binary(BinaryOp::IntDiv);
    assert_eq!(div.perform(&[7.0, 2.0], &[DType::Int32]).unwrap()[0], 3.0);

    let cast = ScalarOp::Cast(DType::Int8);
    assert_eq!(cast.perform(&[300.7], &[DType::Int8]).unwrap()[0], 127.0);
    assert_eq!(cast.perform(&[-3.9], &[DType::Int8]).unwrap()[0], -3.0);

    let not = ScalarOp::Unary(UnaryOp::Not);
    assert_eq!(not.perform(&[0.0], &[DType::Bool]).unwrap()[0], 1.0);
    assert_eq!(not.perform(&[5.0], &[DType::Int32]).unwrap()[0], -6.0);
}

#[test]
fn test_perform_rejects_wrong_input_count() {
    assert!(ScalarOp::Binary(BinaryOp::Sub).perform(&[1.0], &[DType::Float64]).is_none());
    assert!(ScalarOp::Unary(UnaryOp::Exp).perform(&[1.0], &[]).is_none());
}

#[test_case(UnaryOp::Erfcx ; "erfcx")]
#[test_case(UnaryOp::Erfcinv ; "erfcinv")]
fn test_provider_only_ops_have_no_reference(op: UnaryOp) {
    assert!(op.perform(0.5, DType::Float64).is_none());
    assert!(op.nfunc_spec().is_some());
}

#[test]
fn test_iv_has_no_reference() {
    assert!(BinaryOp::Iv.perform(0.0, 1.0, DType::Float64).is_none());
}

#[test]
fn test_nfunc_spec_names() {
    assert_eq!(ScalarOp::from(UnaryOp::Sigmoid).nfunc_spec().unwrap().name, "expit");
    assert_eq!(ScalarOp::from(BinaryOp::IntDiv).nfunc_spec().unwrap().name, "floor_divide");
    let clip = ScalarOp::from(TernaryOp::Clip).nfunc_spec().unwrap();
    assert_eq!((clip.name, clip.nin, clip.nout), ("clip", 3, 1));
    assert!(ScalarOp::from(UnaryOp::Softplus).nfunc_spec().is_none());
    assert!(ScalarOp::from(BinaryOp::Second).nfunc_spec().is_none());
}

#[test]
fn test_output_dtypes_checks_arity() {
    let err = ScalarOp::from(BinaryOp::Pow).output_dtypes(&[DType::Float64]).unwrap_err();
    assert!(matches!(err, Error::ArityViolation { expected: Arity::Fixed(2), got: 1, .. }));
}

#[test]
fn test_names() {
    assert_eq!(ScalarOp::from(UnaryOp::Log1mexp).to_string(), "log1mexp");
    assert_eq!(ScalarOp::from(BinaryOp::TrueDiv).to_string(), "true_div");
    assert_eq!(ScalarOp::Cast(DType::Int16).to_string(), "cast{int16}");
}

#[test_case(-40.0 ; "far left")]
#[test_case(-1.0 ; "left")]
#[test_case(0.0 ; "zero")]
#[test_case(10.0 ; "right")]
#[test_case(25.0 ; "far right")]
fn test_softplus_matches_definition(x: f64) {
    let got = UnaryOp::Softplus.perform(x, DType::Float64).unwrap();
    let expected = x.exp().ln_1p();
    assert!((got - expected).abs() <= 1e-12 * expected.abs().max(1e-300), "{got} vs {expected}");
}
