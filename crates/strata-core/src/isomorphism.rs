//! Certificate-producing isomorphism search between stable graphs.
//!
//! An isomorphism `A -> B` is a bijection of vertices preserving genera
//! together with a bijection of legs preserving the vertex a leg sits on
//! and the pairing of legs into edges. Markings are fixed points: marking
//! `i` of `A` must map to marking `i` of `B`.
//!
//! The search runs in two stages:
//!
//! 1. **Vertex stage.** A backtracking search over vertex bijections in the
//!    spirit of VF2. Each vertex of `A` may only map to vertices of `B` with
//!    the same [`VertexSignature`](crate::invariant::VertexSignature)
//!    (genus, degree, loop count, markings, neighbour decorations). A pair is
//!    feasible when, for every vertex already mapped, the number of edges
//!    between the pair and that vertex agree on both sides. Vertices are
//!    visited in breadth-first order so that most pairs are constrained by a
//!    mapped neighbour.
//! 2. **Leg stage.** For a complete vertex bijection every edge bundle
//!    between two vertices (or of loops at one vertex) is matched with the
//!    corresponding bundle of `B` under every permutation, and each loop in
//!    both orientations. The product over all bundles gives all leg
//!    bijections compatible with the vertex bijection.
//!
//! Visitors return [`ControlFlow`] so the first certificate can stop the
//! search while [`StableGraph::isomorphisms`] collects them all.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::graph::StableGraph;
use crate::id::Leg;
use crate::invariant::VertexSignature;

/// An isomorphism certificate: where every vertex and every leg goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Isomorphism {
    pub vertex_map: BTreeMap<usize, usize>,
    pub leg_map: BTreeMap<Leg, Leg>,
}

impl Isomorphism {
    /// The identity certificate of `gr`.
    pub fn identity(gr: &StableGraph) -> Self {
        Isomorphism {
            vertex_map: (0..gr.num_verts()).map(|v| (v, v)).collect(),
            leg_map: gr.leglist().into_iter().map(|l| (l, l)).collect(),
        }
    }

    /// The inverse certificate.
    pub fn inverse(&self) -> Self {
        Isomorphism {
            vertex_map: self.vertex_map.iter().map(|(&a, &b)| (b, a)).collect(),
            leg_map: self.leg_map.iter().map(|(&a, &b)| (b, a)).collect(),
        }
    }

    /// `other` after `self`: first apply `self`, then `other`.
    pub fn then(&self, other: &Isomorphism) -> Self {
        Isomorphism {
            vertex_map: self
                .vertex_map
                .iter()
                .filter_map(|(&a, b)| other.vertex_map.get(b).map(|&c| (a, c)))
                .collect(),
            leg_map: self
                .leg_map
                .iter()
                .filter_map(|(&a, b)| other.leg_map.get(b).map(|&c| (a, c)))
                .collect(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.vertex_map.iter().all(|(a, b)| a == b) && self.leg_map.iter().all(|(a, b)| a == b)
    }
}

impl StableGraph {
    /// Returns true if `self` and `other` are isomorphic with markings fixed.
    pub fn is_isomorphic(&self, other: &StableGraph) -> bool {
        self.isomorphism(other).is_some()
    }

    /// The first isomorphism `self -> other` found, if any.
    pub fn isomorphism(&self, other: &StableGraph) -> Option<Isomorphism> {
        let search = IsoSearch::new(self, other)?;
        let mut found = None;
        let _ = search.run(&mut |iso| {
            found = Some(iso);
            ControlFlow::Break(())
        });
        found
    }

    /// Every isomorphism `self -> other`.
    pub fn isomorphisms(&self, other: &StableGraph) -> Vec<Isomorphism> {
        let Some(search) = IsoSearch::new(self, other) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let _ = search.run(&mut |iso| {
            found.push(iso);
            ControlFlow::Continue(())
        });
        found
    }

    /// The automorphism group of the graph, listed element by element. The
    /// identity is always among them.
    pub fn automorphisms(&self) -> Vec<Isomorphism> {
        self.isomorphisms(self)
    }

    pub fn automorphism_count(&self) -> usize {
        let Some(search) = IsoSearch::new(self, self) else {
            return 0;
        };
        let mut count = 0;
        let _ = search.run(&mut |_| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }
}

// ---------------------------------------------------------------------------
// Search state
// ---------------------------------------------------------------------------

struct IsoSearch<'a> {
    a: &'a StableGraph,
    b: &'a StableGraph,
    /// For each vertex of `a`, the vertices of `b` with the same signature.
    candidates: Vec<Vec<usize>>,
    /// Order in which vertices of `a` are assigned.
    order: Vec<usize>,
    mult_a: Vec<Vec<usize>>,
    mult_b: Vec<Vec<usize>>,
}

impl<'a> IsoSearch<'a> {
    fn new(a: &'a StableGraph, b: &'a StableGraph) -> Option<Self> {
        if a.num_verts() != b.num_verts()
            || a.num_edges() != b.num_edges()
            || a.num_legs() != b.num_legs()
        {
            return None;
        }
        let sig_a = signatures(a);
        let sig_b = signatures(b);
        let mut sorted_a = sig_a.clone();
        let mut sorted_b = sig_b.clone();
        sorted_a.sort();
        sorted_b.sort();
        if sorted_a != sorted_b {
            return None;
        }

        let candidates = sig_a
            .iter()
            .map(|s| (0..sig_b.len()).filter(|&w| &sig_b[w] == s).collect())
            .collect();

        Some(IsoSearch {
            a,
            b,
            candidates,
            order: bfs_order(a),
            mult_a: multiplicities(a),
            mult_b: multiplicities(b),
        })
    }

    fn run<F>(&self, visit: &mut F) -> ControlFlow<()>
    where
        F: FnMut(Isomorphism) -> ControlFlow<()>,
    {
        let n = self.a.num_verts();
        let mut core = vec![usize::MAX; n];
        let mut used = vec![false; n];
        self.assign_vertex(0, &mut core, &mut used, visit)
    }

    fn assign_vertex<F>(
        &self,
        depth: usize,
        core: &mut [usize],
        used: &mut [bool],
        visit: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(Isomorphism) -> ControlFlow<()>,
    {
        if depth == self.order.len() {
            return self.assign_legs(core, visit);
        }
        let v = self.order[depth];
        for &w in &self.candidates[v] {
            if used[w] || !self.is_feasible(depth, core, v, w) {
                continue;
            }
            core[v] = w;
            used[w] = true;
            let flow = self.assign_vertex(depth + 1, core, used, visit);
            used[w] = false;
            core[v] = usize::MAX;
            flow?;
        }
        ControlFlow::Continue(())
    }

    /// Edge counts between `v` and every already-mapped vertex must agree
    /// with those between `w` and the images.
    fn is_feasible(&self, depth: usize, core: &[usize], v: usize, w: usize) -> bool {
        self.order[..depth]
            .iter()
            .all(|&u| self.mult_a[v][u] == self.mult_b[w][core[u]])
    }

    fn assign_legs<F>(&self, core: &[usize], visit: &mut F) -> ControlFlow<()>
    where
        F: FnMut(Isomorphism) -> ControlFlow<()>,
    {
        let mut bundles = Vec::new();
        for i in 0..self.a.num_verts() {
            for j in i..self.a.num_verts() {
                let source = self.a.edges_between(i, j);
                if source.is_empty() {
                    continue;
                }
                let target = self.b.edges_between(core[i], core[j]);
                bundles.push(EdgeBundle {
                    options: bundle_options(&target, i == j),
                    source,
                });
            }
        }

        let mut leg_map: BTreeMap<Leg, Leg> = self
            .a
            .list_markings()
            .into_iter()
            .map(|m| (m, m))
            .collect();
        let vertex_map: BTreeMap<usize, usize> = core.iter().copied().enumerate().collect();
        self.product(&bundles, 0, &mut leg_map, &vertex_map, visit)
    }

    fn product<F>(
        &self,
        bundles: &[EdgeBundle],
        idx: usize,
        leg_map: &mut BTreeMap<Leg, Leg>,
        vertex_map: &BTreeMap<usize, usize>,
        visit: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(Isomorphism) -> ControlFlow<()>,
    {
        let Some(bundle) = bundles.get(idx) else {
            return visit(Isomorphism {
                vertex_map: vertex_map.clone(),
                leg_map: leg_map.clone(),
            });
        };
        for option in &bundle.options {
            for (&(s0, s1), &(t0, t1)) in bundle.source.iter().zip(option) {
                leg_map.insert(s0, t0);
                leg_map.insert(s1, t1);
            }
            self.product(bundles, idx + 1, leg_map, vertex_map, visit)?;
        }
        ControlFlow::Continue(())
    }
}

/// The edges of `a` between two vertices and every admissible image list
/// for them in `b`.
struct EdgeBundle {
    source: Vec<(Leg, Leg)>,
    options: Vec<Vec<(Leg, Leg)>>,
}

fn bundle_options(target: &[(Leg, Leg)], loops: bool) -> Vec<Vec<(Leg, Leg)>> {
    let perms = permutations(target);
    if !loops {
        return perms;
    }
    let k = target.len();
    let mut options = Vec::with_capacity(perms.len() << k);
    for perm in perms {
        for flips in 0u32..(1 << k) {
            options.push(
                perm.iter()
                    .enumerate()
                    .map(|(i, &(x, y))| if flips & (1 << i) != 0 { (y, x) } else { (x, y) })
                    .collect(),
            );
        }
    }
    options
}

/// All orderings of `items`.
pub(crate) fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

fn signatures(gr: &StableGraph) -> Vec<VertexSignature> {
    let paired = gr.paired_legs();
    (0..gr.num_verts())
        .map(|v| gr.vertex_signature(v, &paired))
        .collect()
}

/// Symmetric matrix of edge counts between vertices; loops on the diagonal.
fn multiplicities(gr: &StableGraph) -> Vec<Vec<usize>> {
    let n = gr.num_verts();
    let mut mult = vec![vec![0; n]; n];
    for &(x, y) in gr.edges() {
        if let (Some(vx), Some(vy)) = (gr.vertex_of(x), gr.vertex_of(y)) {
            mult[vx][vy] += 1;
            if vx != vy {
                mult[vy][vx] += 1;
            }
        }
    }
    mult
}

fn bfs_order(gr: &StableGraph) -> Vec<usize> {
    let n = gr.num_verts();
    let mult = multiplicities(gr);
    let mut seen: HashSet<usize> = HashSet::with_capacity(n);
    let mut order = Vec::with_capacity(n);
    for start in 0..n {
        if !seen.insert(start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            for u in 0..n {
                if mult[v][u] > 0 && seen.insert(u) {
                    queue.push_back(u);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[u32] = &[];

    /// Builds a graph from vertex genera, markings per vertex and edges
    /// given as vertex pairs, handing out half-edge labels above the
    /// markings.
    fn from_vertex_edges(genera: &[u32], markings: &[&[u32]], edges: &[(usize, usize)]) -> StableGraph {
        let mut legs: Vec<Vec<Leg>> = markings
            .iter()
            .map(|ms| ms.iter().copied().map(Leg).collect())
            .collect();
        let mut next = markings.iter().flat_map(|ms| ms.iter()).max().copied().unwrap_or(0);
        let mut leg_pairs = Vec::new();
        for &(x, y) in edges {
            let (lx, ly) = (Leg(next + 1), Leg(next + 2));
            next += 2;
            legs[x].push(lx);
            legs[y].push(ly);
            leg_pairs.push((lx, ly));
        }
        StableGraph::from_parts(genera.to_vec(), legs, leg_pairs)
    }

    fn theta() -> StableGraph {
        from_vertex_edges(&[0, 0], &[&[], &[]], &[(0, 1), (0, 1), (0, 1)])
    }

    #[test]
    fn theta_graph_has_twelve_automorphisms() {
        let gr = theta();
        assert_eq!(gr.automorphism_count(), 12);
        let auts = gr.automorphisms();
        assert_eq!(auts.len(), 12);
        assert!(auts.iter().any(Isomorphism::is_identity));
    }

    #[test]
    fn dumbbell_has_eight_automorphisms() {
        let gr = from_vertex_edges(&[0, 0], &[&[], &[]], &[(0, 0), (0, 1), (1, 1)]);
        assert_eq!(gr.automorphism_count(), 8);
    }

    #[test]
    fn markings_are_fixed() {
        // A marked genus-0 vertex with a loop: only the loop can flip.
        let gr = from_vertex_edges(&[0], &[&[1]], &[(0, 0)]);
        assert_eq!(gr.automorphism_count(), 2);
        // Two genus-1 vertices carrying different markings cannot swap.
        let gr = from_vertex_edges(&[1, 1], &[&[1], &[2]], &[(0, 1)]);
        assert_eq!(gr.automorphism_count(), 1);
    }

    #[test]
    fn same_invariant_but_not_isomorphic() {
        // K_{3,3} and the triangular prism: both cubic on six vertices.
        let k33 = from_vertex_edges(
            &[0; 6],
            &[NONE; 6],
            &[(0, 3), (0, 4), (0, 5), (1, 3), (1, 4), (1, 5), (2, 3), (2, 4), (2, 5)],
        );
        let prism = from_vertex_edges(
            &[0; 6],
            &[NONE; 6],
            &[(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (0, 3), (1, 4), (2, 5)],
        );
        assert_eq!(k33.invariant(), prism.invariant());
        assert!(!k33.is_isomorphic(&prism));
        assert!(k33.is_isomorphic(&k33));
    }

    #[test]
    fn certificate_maps_structure() {
        let a = StableGraph::new(vec![0, 1], vec![vec![1, 2, 5], vec![3, 6]], vec![(5, 6)]).unwrap();
        let b = StableGraph::new(vec![1, 0], vec![vec![3, 10], vec![11, 2, 1]], vec![(11, 10)]).unwrap();
        let iso = a.isomorphism(&b).unwrap();
        assert_eq!(iso.vertex_map, BTreeMap::from([(0, 1), (1, 0)]));
        assert_eq!(
            iso.leg_map,
            BTreeMap::from([
                (Leg(1), Leg(1)),
                (Leg(2), Leg(2)),
                (Leg(3), Leg(3)),
                (Leg(5), Leg(11)),
                (Leg(6), Leg(10)),
            ])
        );
        assert_eq!(b.isomorphism(&a).unwrap(), iso.inverse());
    }

    #[test]
    fn relabelling_keeps_isomorphism_class() {
        let gr = from_vertex_edges(&[1, 0, 0], &[&[1], &[2, 3], &[]], &[(0, 1), (1, 2), (2, 2), (0, 2)]);
        let mut moved = gr.clone();
        moved.reorder_vertices(&[2, 0, 1]);
        let shift: BTreeMap<Leg, Leg> = (1..=3).map(|i| (Leg(i), Leg(i))).collect();
        moved.rename_legs(&shift, 100);
        let iso = gr.isomorphism(&moved).unwrap();
        assert_eq!(iso.vertex_map, BTreeMap::from([(0, 1), (1, 2), (2, 0)]));
        for (l, image) in &iso.leg_map {
            assert_eq!(gr.vertex_of(*l).map(|v| iso.vertex_map[&v]), moved.vertex_of(*image));
        }
    }

    #[test]
    fn different_markings_are_not_isomorphic() {
        let a = StableGraph::new(vec![0, 0], vec![vec![1, 2, 5], vec![3, 4, 6]], vec![(5, 6)]).unwrap();
        let b = StableGraph::new(vec![0, 0], vec![vec![1, 3, 5], vec![2, 4, 6]], vec![(5, 6)]).unwrap();
        assert!(!a.is_isomorphic(&b));
        assert!(a.isomorphisms(&b).is_empty());
    }

    #[test]
    fn automorphisms_compose_within_group() {
        let gr = theta();
        let auts = gr.automorphisms();
        for x in &auts {
            assert!(auts.contains(&x.inverse()));
            for y in &auts {
                assert!(auts.contains(&x.then(y)));
            }
        }
    }

    #[test]
    fn permutations_of_three() {
        assert_eq!(permutations(&[1, 2, 3]).len(), 6);
        assert_eq!(permutations::<u8>(&[]), vec![Vec::<u8>::new()]);
    }
}
