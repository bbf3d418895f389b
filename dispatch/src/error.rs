use snafu::Snafu;
use tessera_ir::Arity;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No registered strategy produced an implementation.
    #[snafu(display(
        "no array implementation for operator {op}{}",
        provider_hint.as_deref().map(|hint| format!(". {hint}")).unwrap_or_default()
    ))]
    Unimplemented { op: String, provider_hint: Option<String> },

    /// Callable invoked with an operand count neither the nominal nor the
    /// variadic form accepts.
    #[snafu(display("{op} expects {expected} operands, got {got}"))]
    ArityViolation { op: String, expected: Arity, got: usize },

    /// Optional provider could not be loaded.
    #[snafu(display("{provider} provider is unavailable: {reason}"))]
    ProviderUnavailable { provider: String, reason: String },

    /// Composite lowering nested deeper than allowed.
    #[snafu(display("composite nesting depth {depth} exceeds the limit of {limit}"))]
    CompositeDepthExceeded { depth: usize, limit: usize },

    /// Operand shapes do not fit the operation.
    #[snafu(display("{op}: incompatible operand shapes {shapes:?}"))]
    ShapeMismatch { op: String, shapes: Vec<Vec<usize>> },

    /// A value had the wrong kind, e.g. a tuple where an array was expected.
    #[snafu(display("expected {expected}, got {got}"))]
    ValueKind { expected: String, got: String },

    /// Numerical failure in a linear algebra routine.
    #[snafu(display("{op}: {reason}"))]
    Linalg { op: String, reason: String },

    /// Graph operation failed while lowering.
    #[snafu(display("graph error: {source}"))]
    Graph { source: tessera_ir::Error },
}

/// Hint attached to [`Error::Unimplemented`] when a provider would resolve the operator.
pub(crate) fn provider_hint(provider: &str) -> String {
    format!("Implementation is available if the `{provider}` special-function provider is installed")
}
