use ndarray::{ArrayD, IxDyn, array};
use test_case::test_case;

use tessera_dtype::{DType, TensorType};

use crate::error::Error;
use crate::linalg::{LinalgKind, LinalgOp};
use crate::op::{Arity, Op, OpClass};
use crate::scalar::{BinaryOp, ScalarOp, TernaryOp, UnaryOp, VariadicOp};

#[test_case(OpClass::Unary(UnaryOp::Exp), &[OpClass::UnaryScalarOp, OpClass::ScalarOp, OpClass::Op])]
#[test_case(
    OpClass::Unary(UnaryOp::Erfcx),
    &[OpClass::ProviderSpecial, OpClass::UnaryScalarOp, OpClass::ScalarOp, OpClass::Op]
)]
#[test_case(OpClass::Variadic(VariadicOp::Add), &[OpClass::VariadicScalarOp, OpClass::ScalarOp, OpClass::Op])]
#[test_case(OpClass::Composite, &[OpClass::ScalarOp, OpClass::Op])]
#[test_case(OpClass::Linalg(LinalgKind::Det), &[OpClass::LinalgOp, OpClass::Op])]
#[test_case(OpClass::Op, &[])]
fn test_ancestors(class: OpClass, expected: &[OpClass]) {
    assert_eq!(class.ancestors(), expected);
}

#[test]
fn test_resolution_order_starts_with_self() {
    let order: Vec<_> = OpClass::Binary(BinaryOp::Pow).resolution_order().collect();
    assert_eq!(order.first(), Some(&OpClass::Binary(BinaryOp::Pow)));
    assert_eq!(order.last(), Some(&OpClass::Op));
    assert!(OpClass::Unary(UnaryOp::Erfcinv).is_subclass_of(OpClass::ProviderSpecial));
    assert!(!OpClass::Unary(UnaryOp::Erf).is_subclass_of(OpClass::ProviderSpecial));
    assert!(OpClass::ProviderSpecial.is_abstract());
    assert!(!OpClass::Cast.is_abstract());
}

#[test]
fn test_arity() {
    assert!(Arity::Fixed(2).accepts(2));
    assert!(!Arity::Fixed(2).accepts(3));
    assert!(Arity::Variadic { min: 1 }.accepts(5));
    assert_eq!(Arity::Variadic { min: 1 }.to_string(), "at least 1");

    let err = Op::from(TernaryOp::Clip).check_arity(2).unwrap_err();
    assert!(matches!(err, Error::ArityViolation { expected: Arity::Fixed(3), got: 2, .. }));
}

#[test]
fn test_elemwise_broadcasts() {
    let op = Op::from(VariadicOp::Add);
    let out = op
        .infer_types(&[
            TensorType::fixed(DType::Int32, &[3, 1]),
            TensorType::fixed(DType::Float32, &[4]),
            TensorType::scalar(DType::Int8),
        ])
        .unwrap();
    assert_eq!(out[0], TensorType::fixed(DType::Float64, &[3, 4]));
}

#[test]
fn test_elemwise_broadcast_mismatch() {
    let op = Op::from(BinaryOp::Sub);
    let err = op
        .infer_types(&[TensorType::fixed(DType::Float64, &[3]), TensorType::fixed(DType::Float64, &[4])])
        .unwrap_err();
    assert!(matches!(err, Error::BroadcastShapeMismatch { .. }));
}

#[test]
fn test_perform_broadcasts_inputs() {
    let op = Op::from(BinaryOp::Sub);
    let a: ArrayD<f64> = array![[1.0], [2.0]].into_dyn();
    let b: ArrayD<f64> = array![10.0, 20.0, 30.0].into_dyn();
    let out_ty = TensorType::fixed(DType::Float64, &[2, 3]);
    let out = op.perform(&[&a, &b], &[out_ty]).unwrap();
    let expected = array![[-9.0, -19.0, -29.0], [-8.0, -18.0, -28.0]].into_dyn();
    assert_eq!(out[0], expected);
}

#[test]
fn test_perform_scalar_inputs() {
    let op = Op::from(BinaryOp::IntDiv);
    let a = ArrayD::from_elem(IxDyn(&[]), 7.0);
    let b = ArrayD::from_elem(IxDyn(&[]), -2.0);
    let out = op.perform(&[&a, &b], &[TensorType::scalar(DType::Int64)]).unwrap();
    assert_eq!(out[0].iter().copied().collect::<Vec<_>>(), vec![-4.0]);
}

#[test]
fn test_perform_unavailable() {
    let a = ArrayD::from_elem(IxDyn(&[2]), 0.5);
    assert!(Op::from(UnaryOp::Erfcx).perform(&[&a], &[TensorType::vector(DType::Float64)]).is_none());
    assert!(Op::from(LinalgOp::Det).perform(&[&a], &[TensorType::scalar(DType::Float64)]).is_none());
}

#[test]
fn test_keys() {
    assert_eq!(Op::from(ScalarOp::Cast(DType::Int8)).key(), OpClass::Cast);
    assert_eq!(Op::from(LinalgOp::Qr).key(), OpClass::Linalg(LinalgKind::Qr));
    assert_eq!(Op::from(UnaryOp::Exp).name(), "exp");
    assert_eq!(Op::from(LinalgOp::Qr).nout(), 2);
}
