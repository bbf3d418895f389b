use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Graph operation failed while building or applying a replacement.
    #[snafu(display("graph error: {source}"))]
    Graph { source: tessera_ir::Error },

    /// A database already has an entry with this name.
    #[snafu(display("rewrite database {db} already has an entry named {name}"))]
    DuplicateEntry { db: String, name: String },

    /// No entry with this name is registered.
    #[snafu(display("rewrite database {db} has no entry named {name}"))]
    UnknownEntry { db: String, name: String },

    /// A rewriter marked as must-succeed could not apply its replacement.
    #[snafu(display("rewriter {rewriter} failed: {source}"))]
    RewriteFailed { rewriter: String, source: tessera_ir::Error },

    /// A rewriter proposed the wrong number of replacement variables.
    #[snafu(display("rewriter {rewriter} proposed {got} replacements for a node with {expected} outputs"))]
    ReplacementCount { rewriter: String, expected: usize, got: usize },
}
