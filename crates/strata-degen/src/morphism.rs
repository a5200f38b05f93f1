//! Half-edge morphisms between cached graphs, and structures between
//! arbitrary graphs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use strata_core::Leg;

/// Positions of half-edges, one per half-edge of the less degenerate graph.
pub type HalfedgeImages = SmallVec<[u32; 8]>;

/// A one-or-more-edge contraction between two cached graphs, recorded on
/// half-edges.
///
/// Both directions use the same convention: `images[i]` is the position,
/// among the half-edges of the more degenerate graph, of the half-edge
/// corresponding to half-edge `i` of the less degenerate graph. A
/// down-morphism stored on a node of layer `r` points at a node of layer
/// `r - 1`; the matching up-morphism stored on that node points back with the
/// same images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Morphism {
    /// Index of the other node in its layer.
    pub target: usize,
    pub images: HalfedgeImages,
}

impl Morphism {
    /// The identity on a node with `num_halfedges` half-edges.
    pub fn identity(target: usize, num_halfedges: usize) -> Self {
        Morphism {
            target,
            images: (0..num_halfedges as u32).collect(),
        }
    }

    /// Follows `self` (from some node down to node `X`) by the down-morphism
    /// `next` stored on `X`. Returns `None` if `next` refers to a half-edge
    /// that `self` does not know.
    pub fn then(&self, next: &Morphism) -> Option<Morphism> {
        let images = next
            .images
            .iter()
            .map(|&j| self.images.get(j as usize).copied())
            .collect::<Option<HalfedgeImages>>()?;
        Some(Morphism {
            target: next.target,
            images,
        })
    }
}

/// An `A`-structure on `Γ`: a way of obtaining `Γ` from `A` by degenerating.
///
/// `vertex_map` sends every vertex of `Γ` to the vertex of `A` it contracts
/// to (surjective); `leg_map` sends every leg of `A` to a leg of `Γ`
/// (injective, markings fixed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure {
    pub vertex_map: BTreeMap<usize, usize>,
    pub leg_map: BTreeMap<Leg, Leg>,
}
