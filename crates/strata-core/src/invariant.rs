//! Cheap isomorphism-invariant fingerprint of a stable graph.
//!
//! Two isomorphic graphs always have equal invariants; the converse fails,
//! so the invariant only buckets candidates ahead of the isomorphism search.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::graph::StableGraph;
use crate::id::Leg;

/// Local picture of one vertex: its decorations and the decorations of its
/// neighbours across non-loop edges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexSignature {
    pub genus: u32,
    pub degree: usize,
    pub loops: usize,
    /// Markings at the vertex, sorted. Markings are fixed by isomorphisms.
    pub markings: SmallVec<[Leg; 4]>,
    /// `(genus, degree)` of the far end of every non-loop edge, sorted.
    pub neighbours: SmallVec<[(u32, usize); 4]>,
}

/// Ordered, hashable key: the sorted multiset of vertex signatures together
/// with the edge count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphInvariant {
    pub num_edges: usize,
    pub vertices: Vec<VertexSignature>,
}

impl StableGraph {
    /// Computes the isomorphism invariant of this graph.
    pub fn invariant(&self) -> GraphInvariant {
        let paired = self.paired_legs();
        let mut vertices: Vec<VertexSignature> = (0..self.num_verts())
            .map(|v| self.vertex_signature(v, &paired))
            .collect();
        vertices.sort();
        GraphInvariant {
            num_edges: self.num_edges(),
            vertices,
        }
    }

    pub(crate) fn vertex_signature(
        &self,
        v: usize,
        paired: &std::collections::HashSet<Leg>,
    ) -> VertexSignature {
        let mut markings: SmallVec<[Leg; 4]> = self.legs[v]
            .iter()
            .copied()
            .filter(|l| !paired.contains(l))
            .collect();
        markings.sort();

        let mut loops = 0;
        let mut neighbours: SmallVec<[(u32, usize); 4]> = SmallVec::new();
        for &(a, b) in &self.edges {
            let (Some(va), Some(vb)) = (self.vertex_of(a), self.vertex_of(b)) else {
                continue;
            };
            if va == v && vb == v {
                loops += 1;
            } else if va == v {
                neighbours.push((self.genera[vb], self.legs[vb].len()));
            } else if vb == v {
                neighbours.push((self.genera[va], self.legs[va].len()));
            }
        }
        neighbours.sort();

        VertexSignature {
            genus: self.genera[v],
            degree: self.legs[v].len(),
            loops,
            markings,
            neighbours,
        }
    }
}
