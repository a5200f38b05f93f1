//! Error types for the degeneration cache and the operations built on it.
//!
//! [`DegenError`] wraps the graph-level [`GraphError`] and adds the failure
//! modes of building and querying a per-(genus, n) degeneration graph.

use thiserror::Error;

use strata_core::GraphError;

/// Errors produced by strata-degen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DegenError {
    /// A graph-level error (malformed input, genus or marking mismatch).
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// There are no stable graphs of this genus and marking count.
    #[error("no stable graphs of genus {genus} with {n} markings")]
    InvalidModuli { genus: u32, n: u32 },

    /// Requested edge count above `3g - 3 + n`.
    #[error("edge count {requested} out of range (at most {max})")]
    EdgeCountOutOfRange { requested: usize, max: usize },

    /// A well-formed graph was not found in its fully built layer. This is a
    /// bug in the invariant or in the enumeration, never a user error.
    #[error("graph {graph} with {edges} edges not found in the degeneration graph of (g, n) = ({genus}, {n})")]
    LocatorNotFound {
        genus: u32,
        n: u32,
        edges: usize,
        graph: String,
    },

    /// Internal bookkeeping of the degeneration graph does not add up.
    #[error("inconsistent degeneration graph: {reason}")]
    Inconsistent { reason: String },
}

pub(crate) fn inconsistent(reason: impl Into<String>) -> DegenError {
    DegenError::Inconsistent {
        reason: reason.into(),
    }
}
