//! Special functions supplied by the optional provider.

use std::sync::Arc;

use tessera_ir::{Apply, OpClass, UnaryOp};

use super::primitives::{operands, zip2};
use crate::error::*;
use crate::provider::SpecialFunctionProvider;
use crate::value::{Callable, Value};

/// `erfcx` and `erfcinv`, registered once for the whole provider family.
pub(crate) fn provider_unary(node: &Apply, provider: Arc<dyn SpecialFunctionProvider>) -> Result<Option<Callable>> {
    let op = match node.op().class() {
        OpClass::Unary(op @ (UnaryOp::Erfcx | UnaryOp::Erfcinv)) => op,
        _ => return Ok(None),
    };
    let out = node.output_types()[0].dtype;
    let name = node.op().name().into_owned();
    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let [x] = operands(&name, args)?;
        let f = |v: f64| if op == UnaryOp::Erfcx { provider.erfcx(v) } else { provider.erfcinv(v) };
        Ok(Value::Array(x.mapv_into(|v| out.cast_value(f(v)))))
    })))
}

/// `iv(v, x) = ive(v, x) / exp(-|x|)` with the provider's scaled Bessel function.
pub(crate) fn bessel_iv(node: &Apply, provider: Arc<dyn SpecialFunctionProvider>) -> Result<Option<Callable>> {
    let out = node.output_types()[0].dtype;
    Ok(Some(Arc::new(move |args: &[Value]| -> Result<Value> {
        let arrays: [_; 2] = operands("iv", args)?;
        let iv = zip2("iv", &arrays, |v, x| provider.bessel_ive(v, x) / (-x.abs()).exp())?;
        Ok(Value::Array(iv.mapv_into(|v| out.cast_value(v))))
    })))
}
