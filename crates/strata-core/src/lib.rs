pub mod error;
pub mod id;
pub mod graph;
pub mod invariant;
pub mod isomorphism;
pub mod mutate;
pub mod degenerate;
pub mod stabilize;

// Re-export commonly used types
pub use error::GraphError;
pub use id::Leg;
pub use graph::{FrozenGraph, StableGraph};
pub use invariant::{GraphInvariant, VertexSignature};
pub use isomorphism::Isomorphism;
pub use mutate::{EdgeContraction, GlueMaps, Subgraph};
pub use stabilize::Stabilization;
