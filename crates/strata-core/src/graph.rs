//! StableGraph: the dual graph of a stable nodal curve.
//!
//! A [`StableGraph`] is an undirected multigraph (loops and multiple edges
//! allowed) whose vertices carry a genus and own a set of legs. Legs paired
//! into edges are half-edges; unpaired legs are markings, whose labels are
//! fixed and never renamed by the structural operations in this crate.
//!
//! Graphs are built and mutated through `&mut self` methods, then frozen
//! via [`StableGraph::freeze`] into a tidy, hashable [`FrozenGraph`] that
//! caches its [`GraphInvariant`]. Frozen graphs are read-only; use
//! [`FrozenGraph::to_mutable`] to get an editable copy.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::id::Leg;
use crate::invariant::GraphInvariant;

/// An undirected multigraph with genus decorations at vertices and labelled
/// legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableGraph {
    /// Genus of each vertex.
    pub(crate) genera: Vec<u32>,
    /// Legs attached to each vertex.
    pub(crate) legs: Vec<Vec<Leg>>,
    /// Edges as pairs of legs.
    pub(crate) edges: Vec<(Leg, Leg)>,
    /// Highest leg label handed out so far; new edges are labelled above it.
    pub(crate) max_leg: u32,
}

impl StableGraph {
    /// Creates a stable graph from raw (genera, legs, edges) input.
    ///
    /// Returns [`GraphError::InvalidGraph`] if the lists have different
    /// lengths, a genus is negative, a leg label is non-positive or repeated,
    /// or an edge uses a leg that does not exist or is already paired.
    pub fn new(
        genera: Vec<i32>,
        legs: Vec<Vec<i32>>,
        edges: Vec<(i32, i32)>,
    ) -> Result<Self, GraphError> {
        if genera.len() != legs.len() {
            return Err(invalid("genera and legs must have the same length"));
        }

        let genera = genera
            .into_iter()
            .map(|g| u32::try_from(g).map_err(|_| invalid(format!("negative genus {g}"))))
            .collect::<Result<Vec<u32>, GraphError>>()?;

        let mut seen = HashSet::new();
        let mut checked_legs = Vec::with_capacity(legs.len());
        for vertex_legs in legs {
            let mut row = Vec::with_capacity(vertex_legs.len());
            for l in vertex_legs {
                let label = u32::try_from(l)
                    .ok()
                    .filter(|&label| label > 0)
                    .ok_or_else(|| invalid(format!("legs must be positive integers, got {l}")))?;
                if !seen.insert(label) {
                    return Err(invalid(format!("leg {label} appears more than once")));
                }
                row.push(Leg(label));
            }
            checked_legs.push(row);
        }

        let mut paired = HashSet::new();
        let mut checked_edges = Vec::with_capacity(edges.len());
        for (a, b) in edges {
            let valid = a != b
                && a > 0
                && b > 0
                && seen.contains(&(a as u32))
                && seen.contains(&(b as u32))
                && paired.insert(a)
                && paired.insert(b);
            if !valid {
                return Err(invalid(format!("the edge ({a}, {b}) uses invalid legs")));
            }
            checked_edges.push((Leg(a as u32), Leg(b as u32)));
        }

        Ok(Self::from_parts(genera, checked_legs, checked_edges))
    }

    /// Constructs a graph from already-typed parts without validation.
    ///
    /// Used by the structural operations, which produce well-formed graphs
    /// from well-formed input.
    pub fn from_parts(genera: Vec<u32>, legs: Vec<Vec<Leg>>, edges: Vec<(Leg, Leg)>) -> Self {
        let max_leg = legs
            .iter()
            .flatten()
            .map(|l| l.0)
            .max()
            .unwrap_or(0);
        StableGraph {
            genera,
            legs,
            edges,
            max_leg,
        }
    }

    /// The graph of the open stratum: one vertex of genus `g` carrying the
    /// markings `1..=n` and no edges.
    pub fn trivial(g: u32, n: u32) -> Self {
        Self::from_parts(vec![g], vec![(1..=n).map(Leg).collect()], Vec::new())
    }

    /// Freezes this graph into its tidy, hashable form.
    pub fn freeze(mut self) -> FrozenGraph {
        self.tidy_up();
        let invariant = self.invariant();
        FrozenGraph {
            graph: self,
            invariant,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Total genus: sum of vertex genera plus the first Betti number.
    pub fn g(&self) -> u32 {
        let vertex_sum: i64 = self.genera.iter().map(|&g| i64::from(g)).sum();
        let betti = self.edges.len() as i64 - self.genera.len() as i64 + 1;
        (vertex_sum + betti).max(0) as u32
    }

    /// Number of markings.
    pub fn n(&self) -> usize {
        self.num_legs() - 2 * self.edges.len()
    }

    pub fn genera(&self) -> &[u32] {
        &self.genera
    }

    pub fn genus(&self, v: usize) -> u32 {
        self.genera[v]
    }

    /// Legs attached to vertex `v`.
    pub fn legs(&self, v: usize) -> &[Leg] {
        &self.legs[v]
    }

    /// Legs of every vertex, indexed by vertex.
    pub fn all_legs(&self) -> &[Vec<Leg>] {
        &self.legs
    }

    pub fn edges(&self) -> &[(Leg, Leg)] {
        &self.edges
    }

    pub fn num_verts(&self) -> usize {
        self.genera.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges whose two legs sit on the same vertex.
    pub fn num_loops(&self) -> usize {
        self.edges
            .iter()
            .filter(|&&(a, b)| self.vertex_of(a) == self.vertex_of(b))
            .count()
    }

    /// Total number of legs (markings and half-edges).
    pub fn num_legs(&self) -> usize {
        self.legs.iter().map(Vec::len).sum()
    }

    /// Number of legs at vertex `v`.
    pub fn degree(&self, v: usize) -> usize {
        self.legs[v].len()
    }

    /// Highest leg label in use.
    pub fn max_leg(&self) -> u32 {
        self.max_leg
    }

    /// Returns the vertex owning `leg`, if any.
    pub fn vertex_of(&self, leg: Leg) -> Option<usize> {
        self.legs.iter().position(|ls| ls.contains(&leg))
    }

    /// Returns the other half of the edge containing `leg`, or `leg` itself
    /// if it is a marking.
    pub fn opposite(&self, leg: Leg) -> Leg {
        for &(a, b) in &self.edges {
            if a == leg {
                return b;
            }
            if b == leg {
                return a;
            }
        }
        leg
    }

    /// Returns true if `leg` is one half of an edge.
    pub fn is_halfedge(&self, leg: Leg) -> bool {
        self.edges.iter().any(|&(a, b)| a == leg || b == leg)
    }

    /// Markings (legs not in any edge) at vertex `v`, in attachment order.
    pub fn list_markings_at(&self, v: usize) -> Vec<Leg> {
        let paired = self.paired_legs();
        self.legs[v]
            .iter()
            .copied()
            .filter(|l| !paired.contains(l))
            .collect()
    }

    /// All markings, vertex by vertex.
    pub fn list_markings(&self) -> Vec<Leg> {
        let paired = self.paired_legs();
        self.legs
            .iter()
            .flatten()
            .copied()
            .filter(|l| !paired.contains(l))
            .collect()
    }

    /// All markings in increasing label order.
    pub fn sorted_markings(&self) -> Vec<Leg> {
        let mut markings = self.list_markings();
        markings.sort();
        markings
    }

    /// Every leg of the graph, vertex by vertex.
    pub fn leglist(&self) -> Vec<Leg> {
        self.legs.iter().flatten().copied().collect()
    }

    /// The half-edges in edge order: `e0.0, e0.1, e1.0, e1.1, ...`.
    ///
    /// A degeneration appends its new edge after all existing ones, so the
    /// half-edges of a graph form a prefix of the half-edges of each of its
    /// degenerations.
    pub fn halfedges(&self) -> Vec<Leg> {
        self.edges.iter().flat_map(|&(a, b)| [a, b]).collect()
    }

    /// Edges between vertices `i` and `j`, oriented so the first leg sits on
    /// `i`. For `i == j` each loop is listed once.
    pub fn edges_between(&self, i: usize, j: usize) -> Vec<(Leg, Leg)> {
        let at_i = &self.legs[i];
        let at_j = &self.legs[j];
        let mut found: Vec<(Leg, Leg)> = self
            .edges
            .iter()
            .filter(|(a, b)| at_i.contains(a) && at_j.contains(b))
            .copied()
            .collect();
        if i != j {
            found.extend(
                self.edges
                    .iter()
                    .filter(|(a, b)| at_j.contains(a) && at_i.contains(b))
                    .map(|&(a, b)| (b, a)),
            );
        }
        found
    }

    /// Dimension `3g - 3 + deg` of the moduli space at vertex `v`.
    pub fn dim(&self, v: usize) -> i64 {
        3 * i64::from(self.genera[v]) - 3 + self.legs[v].len() as i64
    }

    /// Dimension of the boundary stratum: the sum of the vertex dimensions.
    pub fn dim_total(&self) -> i64 {
        (0..self.num_verts()).map(|v| self.dim(v)).sum()
    }

    /// `2g - 2 + deg > 0` at vertex `v`.
    pub fn is_vertex_stable(&self, v: usize) -> bool {
        2 * i64::from(self.genera[v]) - 2 + self.legs[v].len() as i64 > 0
    }

    /// Every vertex is stable.
    pub fn is_stable(&self) -> bool {
        (0..self.num_verts()).all(|v| self.is_vertex_stable(v))
    }

    /// The underlying multigraph is connected (and non-empty).
    pub fn is_connected(&self) -> bool {
        self.num_verts() > 0 && connected_components(&self.to_petgraph()) == 1
    }

    /// Exports the underlying multigraph to petgraph: node weights are vertex
    /// genera, edge weights the leg pairs. Node `i` is vertex `i`.
    pub fn to_petgraph(&self) -> UnGraph<u32, (Leg, Leg)> {
        let mut graph = UnGraph::with_capacity(self.num_verts(), self.num_edges());
        for &g in &self.genera {
            graph.add_node(g);
        }
        for &(a, b) in &self.edges {
            if let (Some(va), Some(vb)) = (self.vertex_of(a), self.vertex_of(b)) {
                graph.add_edge(NodeIndex::new(va), NodeIndex::new(vb), (a, b));
            }
        }
        graph
    }

    pub(crate) fn paired_legs(&self) -> HashSet<Leg> {
        self.edges.iter().flat_map(|&(a, b)| [a, b]).collect()
    }

    pub(crate) fn check_vertex(&self, v: usize) -> Result<(), GraphError> {
        if v < self.num_verts() {
            Ok(())
        } else {
            Err(GraphError::VertexOutOfRange {
                vertex: v,
                num_verts: self.num_verts(),
            })
        }
    }
}

// Equality ignores the leg counter: two graphs with the same vertices, legs
// and edges are the same graph.

impl PartialEq for StableGraph {
    fn eq(&self, other: &Self) -> bool {
        self.genera == other.genera && self.legs == other.legs && self.edges == other.edges
    }
}

impl Eq for StableGraph {}

impl Hash for StableGraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.genera.hash(state);
        self.legs.hash(state);
        self.edges.hash(state);
    }
}

impl fmt::Display for StableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [", self.genera)?;
        for (i, legs) in self.legs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let labels: Vec<u32> = legs.iter().map(|l| l.0).collect();
            write!(f, "{labels:?}")?;
        }
        write!(f, "] [")?;
        for (i, (a, b)) in self.edges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({a}, {b})")?;
        }
        write!(f, "]")
    }
}

fn invalid(reason: impl Into<String>) -> GraphError {
    GraphError::InvalidGraph {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Frozen graphs
// ---------------------------------------------------------------------------

/// A tidied, read-only stable graph with its invariant computed once.
///
/// Cache representatives are stored frozen. Equality and hashing are those
/// of the underlying graph, which is in tidy form (legs sorted per vertex,
/// edges oriented and sorted).
#[derive(Debug, Clone, Serialize)]
pub struct FrozenGraph {
    graph: StableGraph,
    invariant: GraphInvariant,
}

impl FrozenGraph {
    /// The invariant computed at freeze time.
    pub fn invariant_key(&self) -> &GraphInvariant {
        &self.invariant
    }

    /// The underlying graph.
    pub fn as_graph(&self) -> &StableGraph {
        &self.graph
    }

    /// An editable copy of this graph.
    pub fn to_mutable(&self) -> StableGraph {
        self.graph.clone()
    }

    /// Consumes the frozen wrapper, returning the graph.
    pub fn into_inner(self) -> StableGraph {
        self.graph
    }
}

impl Deref for FrozenGraph {
    type Target = StableGraph;

    fn deref(&self) -> &StableGraph {
        &self.graph
    }
}

impl PartialEq for FrozenGraph {
    fn eq(&self, other: &Self) -> bool {
        self.graph == other.graph
    }
}

impl Eq for FrozenGraph {}

impl Hash for FrozenGraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.graph.hash(state);
    }
}

impl fmt::Display for FrozenGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.graph.fmt(f)
    }
}
