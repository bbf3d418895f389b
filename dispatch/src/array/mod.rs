//! Array backend: implementations over `ndarray` `f64` arrays.

mod composite;
mod elemwise;
mod linalg;
pub mod primitives;
mod special;

use tessera_ir::{BinaryOp, OpClass, TernaryOp, UnaryOp, VariadicOp};

use crate::registry::{DispatchRegistry, Strategy};

/// Register the array backend's strategies.
///
/// Within one class strategies are tried in registration order, so the
/// scalar fast path precedes the primitives it specializes.
pub fn register(registry: &mut DispatchRegistry) {
    for class in [
        OpClass::Variadic(VariadicOp::Add),
        OpClass::Variadic(VariadicOp::Mul),
        OpClass::Binary(BinaryOp::Sub),
        OpClass::Binary(BinaryOp::IntDiv),
        OpClass::Binary(BinaryOp::Mod),
    ] {
        registry.register(class, Strategy::native("scalar_arithmetic", elemwise::scalar_arithmetic));
    }

    registry.register(OpClass::Ternary(TernaryOp::Clip), Strategy::native("clip", elemwise::clip));
    registry.register(OpClass::Unary(UnaryOp::Softplus), Strategy::native("softplus", elemwise::softplus_formula));
    registry.register(OpClass::Unary(UnaryOp::Log1mexp), Strategy::native("log1mexp", elemwise::log1mexp_formula));
    registry.register(OpClass::Unary(UnaryOp::Identity), Strategy::native("identity", elemwise::identity));
    registry.register(OpClass::Binary(BinaryOp::Second), Strategy::native("second", elemwise::second));
    registry.register(OpClass::Cast, Strategy::native("cast", elemwise::cast));
    registry.register(OpClass::Composite, Strategy::native("composite", composite::composite));

    registry.register(OpClass::Binary(BinaryOp::Iv), Strategy::provider("bessel_iv", special::bessel_iv));
    registry.register(OpClass::ProviderSpecial, Strategy::provider("provider_unary", special::provider_unary));

    registry.register(OpClass::ScalarOp, Strategy::native("nfunc_primitive", elemwise::nfunc_primitive));
    registry.register(OpClass::LinalgOp, Strategy::native("linalg", linalg::linalg));
}
