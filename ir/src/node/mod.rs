//! Variables and apply nodes.
//!
//! Both are immutable once created and compare by a stable process-unique
//! id. An output variable is a view `(owner, index)` of its apply node and is
//! rebuilt on demand, so nodes never reference their outputs.

pub mod constant;
pub mod constructors;
pub mod core;

pub use constant::Constant;
pub use core::{Apply, Variable, VariableKind};
