use tessera_dtype::{DType, TensorType};

use crate::error::Error;
use crate::node::{Apply, Constant, Variable, VariableKind};
use crate::op::Op;
use crate::scalar::{UnaryOp, VariadicOp};

#[test]
fn test_output_ids_follow_apply_id() {
    let x = Variable::matrix("x", DType::Float64);
    let node = Apply::new(crate::LinalgOp::Qr, [x]).unwrap();
    let outputs = node.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].id(), node.id() + 1);
    assert_eq!(outputs[1].id(), node.id() + 2);
    // Rebuilt handles compare equal.
    assert_eq!(node.output(1), outputs[1]);
    assert_eq!(outputs[1].index(), Some(1));
}

#[test]
fn test_ids_are_unique() {
    let x = Variable::scalar("x", DType::Float32);
    let a = x.try_exp().unwrap();
    let b = x.try_exp().unwrap();
    assert_ne!(a, b);
    assert_ne!(a.owner().unwrap().id(), b.owner().unwrap().id());
}

#[test]
fn test_with_inputs_builds_new_node() {
    let x = Variable::vector("x", DType::Float64);
    let y = Variable::vector("y", DType::Float64);
    let node = Apply::new(VariadicOp::Add, [x.clone(), y.clone()]).unwrap();
    let rebuilt = node.with_inputs([y.clone(), x.clone()]).unwrap();
    assert_ne!(node.id(), rebuilt.id());
    assert_eq!(rebuilt.op(), node.op());
    assert_eq!(rebuilt.inputs(), &[y, x]);
}

#[test]
fn test_apply_checks_arity() {
    let x = Variable::scalar("x", DType::Float64);
    let err = Apply::new(UnaryOp::Exp, [x.clone(), x]).unwrap_err();
    assert!(matches!(err, Error::ArityViolation { got: 2, .. }));
}

#[test]
fn test_kinds() {
    let x = Variable::scalar("x", DType::Int32);
    let c = Variable::scalar_constant(DType::Int32, 2.0);
    let sum = x.try_add(&c).unwrap();

    assert!(x.is_input() && x.owner().is_none());
    assert!(c.is_constant());
    assert_eq!(c.constant_scalar(), Some(2.0));
    assert!(matches!(sum.kind(), VariableKind::Output { index: 0, .. }));
    assert!(!sum.owner().unwrap().has_constant_inputs());
    assert_eq!(sum.owner().unwrap().op(), &Op::from(VariadicOp::Add));
}

#[test]
fn test_constant_casts_values() {
    let c = Constant::scalar(DType::UInt8, -5.0);
    assert_eq!(c.unique_value(), Some(0.0));
    let c = Constant::scalar(DType::Bool, 0.25);
    assert_eq!(c.unique_value(), Some(1.0));
}

#[test]
fn test_constant_equality() {
    let a = Constant::filled(DType::Float64, &[2], f64::NAN);
    let b = Constant::filled(DType::Float64, &[2], f64::NAN);
    assert!(a.equals(&b));
    assert!(!a.equals(&Constant::filled(DType::Float32, &[2], f64::NAN)));
    assert!(!a.equals(&Constant::filled(DType::Float64, &[3], f64::NAN)));
}

#[test]
fn test_constant_from_vec() {
    let c = Constant::from_vec(DType::Float64, &[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(c.ty(), TensorType::fixed(DType::Float64, &[2, 2]));
    assert_eq!(c.unique_value(), None);

    let err = Constant::from_vec(DType::Float64, &[2, 2], vec![1.0]).unwrap_err();
    assert!(matches!(err, Error::ConstantShape { .. }));
}

#[test]
fn test_constant_display() {
    assert_eq!(Constant::scalar(DType::Int8, 3.0).to_string(), "3:int8");
    assert_eq!(Constant::filled(DType::Float32, &[2, 3], 1.5).to_string(), "fill(1.5):float32[2, 3]");
}

#[test]
fn test_constant_variable_type() {
    let v = Variable::constant(Constant::filled(DType::Int16, &[4], 1.0));
    assert_eq!(v.ty(), &TensorType::fixed(DType::Int16, &[4]));
    assert_eq!(v.constant_scalar(), None);
    assert_eq!(v.as_constant().and_then(Constant::unique_value), Some(1.0));
}

#[test]
fn test_labels() {
    let x = Variable::input("weights", TensorType::matrix(DType::Float64));
    assert_eq!(x.to_string(), "weights");
    let y = x.try_neg().unwrap();
    assert_eq!(y.label(), format!("v{}", y.id()));
}

#[test]
fn test_constructors_infer_types() {
    let x = Variable::vector("x", DType::Int8);
    let y = Variable::scalar("y", DType::Float32);
    assert_eq!(x.try_exp().unwrap().dtype(), DType::Float32);
    assert_eq!(x.try_mul(&y).unwrap().ty(), &TensorType::vector(DType::Float32));
    assert_eq!(x.try_lt(&y).unwrap().dtype(), DType::Bool);
    assert_eq!(x.try_cast(DType::Int64).unwrap().dtype(), DType::Int64);

    let cond = Variable::vector("c", DType::Bool);
    assert_eq!(cond.try_switch(&x, &y).unwrap().dtype(), DType::Float32);
}
