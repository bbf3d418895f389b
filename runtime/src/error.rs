//! Error types for linking and running graphs.

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A node could not be lowered or a callable failed while running.
    #[snafu(display("dispatch error: {source}"))]
    Dispatch { source: tessera_dispatch::Error },

    /// The mode's rewrites could not be selected or applied.
    #[snafu(display("rewrite error: {source}"))]
    Rewrite { source: tessera_rewrite::Error },

    /// The graph could not be built from the given inputs and outputs.
    #[snafu(display("graph error: {source}"))]
    Graph { source: tessera_ir::Error },

    /// Arguments do not fit the declared inputs.
    #[snafu(display("input mismatch: {reason}"))]
    InputMismatch { reason: String },

    /// The lowered program produced a different number of outputs than the
    /// graph declares.
    #[snafu(display("expected {expected} outputs, got {got}"))]
    OutputArity { expected: usize, got: usize },
}
