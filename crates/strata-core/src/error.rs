//! Core error types for strata-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of stable-graph construction and of operations that pair
//! two graphs from the same moduli problem.

use thiserror::Error;

use crate::id::Leg;

/// Errors produced by the strata-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Malformed construction input: negative genus, non-positive or repeated
    /// leg labels, or an edge referencing legs that do not exist.
    #[error("invalid graph: {reason}")]
    InvalidGraph { reason: String },

    /// Two graphs were combined that do not have the same total genus.
    #[error("genus mismatch: {left} vs {right}")]
    GenusMismatch { left: u32, right: u32 },

    /// Two graphs were combined whose marking sets differ.
    #[error("marking mismatch: {left:?} vs {right:?}")]
    MarkingMismatch { left: Vec<Leg>, right: Vec<Leg> },

    /// The given leg pair is not an edge of the graph.
    #[error("not an edge: ({a}, {b})", a = edge.0, b = edge.1)]
    NotAnEdge { edge: (Leg, Leg) },

    /// A vertex index past the end of the vertex list.
    #[error("vertex {vertex} out of range (graph has {num_verts} vertices)")]
    VertexOutOfRange { vertex: usize, num_verts: usize },
}
