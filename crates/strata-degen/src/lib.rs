//! Cached degeneration graphs of stable graphs and the queries built on them.
//!
//! For every (genus, n) a [`DegenerationGraph`] lists one representative per
//! isomorphism class of stable graphs, layered by edge count, with half-edge
//! [`Morphism`]s between adjacent layers. A shared [`DegenerationCache`]
//! builds these graphs incrementally and hands out immutable snapshots.
//!
//! # Modules
//!
//! - [`error`]: DegenError with all failure modes
//! - [`config`]: CacheConfig and EvictionPolicy, read from the environment
//! - [`morphism`]: half-edge morphisms and A-structures
//! - [`degeneration_graph`]: layer construction and consistency checks
//! - [`cache`]: the per-(genus, n) registry of snapshots
//! - [`locate`]: finding a graph among the representatives
//! - [`compose`]: A-structures and common degenerations

pub mod cache;
pub mod compose;
pub mod config;
pub mod degeneration_graph;
pub mod error;
pub mod locate;
pub mod morphism;

// Re-export key types for ergonomic use.
pub use cache::DegenerationCache;
pub use compose::{a_structures, common_degenerations, reconstruct_vertex_map, CommonDegeneration};
pub use config::{CacheConfig, EvictionPolicy};
pub use degeneration_graph::{DegenerationGraph, Layer, LayerNode};
pub use error::DegenError;
pub use locate::{locate, locate_in, Location};
pub use morphism::{HalfedgeImages, Morphism, Structure};
