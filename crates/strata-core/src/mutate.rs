//! Structural mutators on [`StableGraph`].
//!
//! These are the low-level primitives used to assemble, take apart and
//! relabel graphs. `rename_legs` and `glue_vertex` do not check that their
//! result is a legal stable graph; callers are responsible for that.

use std::collections::{BTreeMap, HashSet};

use crate::error::GraphError;
use crate::graph::StableGraph;
use crate::id::Leg;

/// Result of [`StableGraph::contract_edge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeContraction {
    /// Vertex of the contracted graph on which the edge was attached.
    pub surviving_vertex: usize,
    /// The one or two vertices the edge was attached to before contraction.
    pub contracted_vertices: Vec<usize>,
    /// The one-edge graph induced by the edge, with every other leg at its
    /// endpoints kept as a marking.
    pub edge_graph: StableGraph,
    /// Old vertex index to new vertex index.
    pub vertex_map: BTreeMap<usize, usize>,
    /// Correspondence of the surviving legs (labels are preserved).
    pub leg_map: BTreeMap<Leg, Leg>,
}

/// Renaming data returned by [`StableGraph::glue_vertex`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlueMaps {
    /// Vertex of the glued-in graph to vertex of the result.
    pub inserted_vertices: BTreeMap<usize, usize>,
    /// Vertex of the original graph (other than the replaced one) to vertex
    /// of the result.
    pub kept_vertices: BTreeMap<usize, usize>,
    /// Legs of the glued-in graph that received a fresh label.
    pub renamed_legs: BTreeMap<Leg, Leg>,
}

/// Result of [`StableGraph::extract_subgraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    pub graph: StableGraph,
    /// Vertex of the parent graph to vertex of the subgraph.
    pub vertex_map: BTreeMap<usize, usize>,
    /// Leg of the parent graph to leg of the subgraph.
    pub leg_map: BTreeMap<Leg, Leg>,
}

impl StableGraph {
    /// Sorts the legs of every vertex, orients every edge with its smaller
    /// leg first and sorts the edge list.
    ///
    /// Because new edges are labelled above every existing leg, tidying a
    /// degeneration of a tidy graph keeps the new edge last.
    pub fn tidy_up(&mut self) {
        for edge in &mut self.edges {
            if edge.0 > edge.1 {
                *edge = (edge.1, edge.0);
            }
        }
        for legs in &mut self.legs {
            legs.sort();
        }
        self.edges.sort();
        self.max_leg = self.legs.iter().flatten().map(|l| l.0).max().unwrap_or(0);
    }

    /// Hands out two fresh leg labels for a new edge.
    pub fn new_edge_legs(&mut self) -> (Leg, Leg) {
        self.max_leg += 2;
        (Leg(self.max_leg - 1), Leg(self.max_leg))
    }

    /// Renames legs through `map`; legs not in `map` are shifted by `shift`.
    /// The graph is tidied afterwards.
    pub fn rename_legs(&mut self, map: &BTreeMap<Leg, Leg>, shift: u32) {
        let rename = |l: Leg| map.get(&l).copied().unwrap_or_else(|| l.shifted(shift));
        for legs in &mut self.legs {
            for l in legs.iter_mut() {
                *l = rename(*l);
            }
        }
        for edge in &mut self.edges {
            *edge = (rename(edge.0), rename(edge.1));
        }
        self.tidy_up();
    }

    /// Returns a copy with vertices moved by `vertex_map` and legs renamed by
    /// `leg_map`. Entries missing from either map stay where they are.
    pub fn relabel(
        &self,
        vertex_map: &BTreeMap<usize, usize>,
        leg_map: &BTreeMap<Leg, Leg>,
    ) -> StableGraph {
        let m = self.num_verts();
        let mut genera = vec![0; m];
        let mut legs = vec![Vec::new(); m];
        let rename = |l: &Leg| leg_map.get(l).copied().unwrap_or(*l);
        for (i, (&g, ls)) in self.genera.iter().zip(&self.legs).enumerate() {
            let j = vertex_map.get(&i).copied().unwrap_or(i);
            genera[j] = g;
            legs[j] = ls.iter().map(rename).collect();
        }
        let edges = self
            .edges
            .iter()
            .map(|(a, b)| (rename(a), rename(b)))
            .collect();
        StableGraph::from_parts(genera, legs, edges)
    }

    /// Reorders vertices so that new vertex `i` is old vertex `order[i]`.
    pub fn reorder_vertices(&mut self, order: &[usize]) {
        self.genera = order.iter().map(|&j| self.genera[j]).collect();
        self.legs = order.iter().map(|&j| self.legs[j].clone()).collect();
    }

    /// Removes the given markings from their vertices. Legs that are not
    /// present are ignored.
    pub fn forget_markings(&mut self, markings: &[Leg]) {
        for legs in &mut self.legs {
            legs.retain(|l| !markings.contains(l));
        }
    }

    /// Contracts the edge `edge`, merging its endpoints (or removing the
    /// loop and raising the genus of its vertex).
    pub fn contract_edge(&mut self, edge: (Leg, Leg)) -> Result<EdgeContraction, GraphError> {
        let pos = self
            .edges
            .iter()
            .position(|&(a, b)| (a, b) == edge || (b, a) == edge)
            .ok_or(GraphError::NotAnEdge { edge })?;
        let e = self.edges[pos];
        let (v0, v1) = match (self.vertex_of(e.0), self.vertex_of(e.1)) {
            (Some(v0), Some(v1)) => (v0, v1),
            _ => return Err(GraphError::NotAnEdge { edge }),
        };

        if v0 == v1 {
            let edge_graph =
                StableGraph::from_parts(vec![self.genera[v0]], vec![self.legs[v0].clone()], vec![e]);
            self.genera[v0] += 1;
            self.legs[v0].retain(|&l| l != e.0 && l != e.1);
            self.edges.remove(pos);
            let vertex_map = (0..self.num_verts()).map(|v| (v, v)).collect();
            return Ok(EdgeContraction {
                surviving_vertex: v0,
                contracted_vertices: vec![v0],
                edge_graph,
                vertex_map,
                leg_map: self.identity_leg_map(),
            });
        }

        let (v0, v1) = if v0 < v1 { (v0, v1) } else { (v1, v0) };
        let vertex_map: BTreeMap<usize, usize> = (0..self.num_verts())
            .map(|v| {
                let image = if v < v1 {
                    v
                } else if v == v1 {
                    v0
                } else {
                    v - 1
                };
                (v, image)
            })
            .collect();
        let edge_graph = StableGraph::from_parts(
            vec![self.genera[v0], self.genera[v1]],
            vec![self.legs[v0].clone(), self.legs[v1].clone()],
            vec![e],
        );

        let g1 = self.genera.remove(v1);
        self.genera[v0] += g1;
        let l1 = self.legs.remove(v1);
        self.legs[v0].extend(l1);
        self.legs[v0].retain(|&l| l != e.0 && l != e.1);
        self.edges.remove(pos);

        Ok(EdgeContraction {
            surviving_vertex: v0,
            contracted_vertices: vec![v0, v1],
            edge_graph,
            vertex_map,
            leg_map: self.identity_leg_map(),
        })
    }

    /// Replaces vertex `i` by the graph `other`.
    ///
    /// Every leg of vertex `i` must also be a leg of `other`; the remaining
    /// legs of `other` are given fresh labels above both graphs' labels. The
    /// loops at `i` are dropped together with the vertex. Nothing else is
    /// checked.
    pub fn glue_vertex(&mut self, i: usize, other: &StableGraph) -> Result<GlueMaps, GraphError> {
        self.check_vertex(i)?;

        let self_loops = self.edges_between(i, i);
        self.genera.remove(i);
        let old_legs = self.legs.remove(i);
        self.edges
            .retain(|&(a, b)| !self_loops.contains(&(a, b)) && !self_loops.contains(&(b, a)));

        let attached: HashSet<Leg> = old_legs.into_iter().collect();
        let mut fresh = self.max_leg.max(other.max_leg);
        let mut renamed_legs = BTreeMap::new();
        let mut to_rename: Vec<Leg> = other
            .leglist()
            .into_iter()
            .filter(|l| !attached.contains(l))
            .collect();
        to_rename.sort();
        for l in to_rename {
            fresh += 1;
            renamed_legs.insert(l, Leg(fresh));
        }

        let mut inserted = other.clone();
        inserted.rename_legs(&renamed_legs, 0);

        let remaining = self.num_verts();
        let kept_vertices = (0..=remaining)
            .filter(|&j| j != i)
            .map(|j| (j, if j < i { j } else { j - 1 }))
            .collect();
        let inserted_vertices = (0..inserted.num_verts())
            .map(|j| (j, remaining + j))
            .collect();

        self.genera.extend(inserted.genera);
        self.legs.extend(inserted.legs);
        self.edges.extend(inserted.edges);
        self.tidy_up();

        Ok(GlueMaps {
            inserted_vertices,
            kept_vertices,
            renamed_legs,
        })
    }

    /// Extracts the subgraph induced by `vertices`.
    ///
    /// `outgoing` lists the legs that become markings of the subgraph; by
    /// default these are all legs at `vertices` not paired inside the
    /// subgraph. With `rename`, the outgoing legs are renamed `1, 2, ...` in
    /// the given order and the other legs shifted above them.
    pub fn extract_subgraph(
        &self,
        vertices: &[usize],
        outgoing: Option<&[Leg]>,
        rename: bool,
    ) -> Subgraph {
        let attached: HashSet<Leg> = vertices
            .iter()
            .flat_map(|&v| self.legs[v].iter().copied())
            .collect();

        let outgoing: Vec<Leg> = match outgoing {
            Some(legs) => legs.to_vec(),
            None => {
                let inner: HashSet<Leg> = self
                    .edges
                    .iter()
                    .filter(|(a, b)| attached.contains(a) && attached.contains(b))
                    .flat_map(|&(a, b)| [a, b])
                    .collect();
                vertices
                    .iter()
                    .flat_map(|&v| self.legs[v].iter().copied())
                    .filter(|l| !inner.contains(l))
                    .collect()
            }
        };

        let shift = outgoing.len() as u32 + 1;
        let mut leg_map: BTreeMap<Leg, Leg> = if rename {
            outgoing
                .iter()
                .enumerate()
                .map(|(i, &l)| (l, Leg(i as u32 + 1)))
                .collect()
        } else {
            self.leglist().into_iter().map(|l| (l, l)).collect()
        };

        let genera = vertices.iter().map(|&v| self.genera[v]).collect();
        let legs = vertices
            .iter()
            .map(|&v| {
                self.legs[v]
                    .iter()
                    .map(|&l| *leg_map.entry(l).or_insert_with(|| l.shifted(shift)))
                    .collect()
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .filter(|(a, b)| {
                attached.contains(a)
                    && attached.contains(b)
                    && !outgoing.contains(a)
                    && !outgoing.contains(b)
            })
            .map(|(a, b)| (leg_map[a], leg_map[b]))
            .collect();
        let vertex_map = vertices.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        Subgraph {
            graph: StableGraph::from_parts(genera, legs, edges),
            vertex_map,
            leg_map,
        }
    }

    fn identity_leg_map(&self) -> BTreeMap<Leg, Leg> {
        self.leglist().into_iter().map(|l| (l, l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(genera: Vec<i32>, legs: Vec<Vec<i32>>, edges: Vec<(i32, i32)>) -> StableGraph {
        StableGraph::new(genera, legs, edges).unwrap()
    }

    fn legs(labels: &[u32]) -> Vec<Leg> {
        labels.iter().copied().map(Leg).collect()
    }

    #[test]
    fn tidy_up_sorts_legs_and_edges() {
        let mut s = graph(vec![1, 3, 2], vec![vec![1, 5, 4], vec![2, 3, 6], vec![9, 8, 7]], vec![(9, 3), (1, 2)]);
        s.tidy_up();
        assert_eq!(s.to_string(), "[1, 3, 2] [[1, 4, 5], [2, 3, 6], [7, 8, 9]] [(1, 2), (3, 9)]");
    }

    #[test]
    fn new_edge_legs_count_up() {
        let mut gr = graph(vec![3, 5], vec![vec![1, 3, 7], vec![2, 4]], vec![(1, 2)]);
        assert_eq!(gr.new_edge_legs(), (Leg(8), Leg(9)));
        assert_eq!(gr.new_edge_legs(), (Leg(10), Leg(11)));
    }

    #[test]
    fn relabel_moves_vertices_and_legs() {
        let gr = graph(vec![3, 5], vec![vec![1, 3, 5, 4], vec![2]], vec![(1, 2), (3, 5)]);
        let vm = BTreeMap::from([(0, 1), (1, 0)]);
        let lm = BTreeMap::from([
            (Leg(1), Leg(3)),
            (Leg(2), Leg(5)),
            (Leg(3), Leg(7)),
            (Leg(4), Leg(9)),
            (Leg(5), Leg(15)),
        ]);
        assert_eq!(gr.relabel(&vm, &lm).to_string(), "[5, 3] [[5], [3, 7, 15, 9]] [(3, 5), (7, 15)]");
    }

    #[test]
    fn rename_legs_shifts_unmapped() {
        let mut gr = graph(vec![0, 0], vec![vec![1, 2, 5], vec![3, 4, 6]], vec![(5, 6)]);
        let map: BTreeMap<Leg, Leg> = (1..=4).map(|i| (Leg(i), Leg(i))).collect();
        gr.rename_legs(&map, 10);
        assert_eq!(gr.to_string(), "[0, 0] [[1, 2, 15], [3, 4, 16]] [(15, 16)]");
        assert_eq!(gr.max_leg(), 16);
    }

    #[test]
    fn contract_then_contract_loop() {
        let mut gr = graph(vec![3, 5], vec![vec![1, 3, 7], vec![2, 4]], vec![(1, 2), (3, 7)]);
        let first = gr.contract_edge((Leg(1), Leg(2))).unwrap();
        assert_eq!(gr.to_string(), "[8] [[3, 7, 4]] [(3, 7)]");
        assert_eq!(first.surviving_vertex, 0);
        assert_eq!(first.contracted_vertices, vec![0, 1]);
        assert_eq!(first.vertex_map, BTreeMap::from([(0, 0), (1, 0)]));
        assert_eq!(first.edge_graph.to_string(), "[3, 5] [[1, 3, 7], [2, 4]] [(1, 2)]");

        let second = gr.contract_edge((Leg(7), Leg(3))).unwrap();
        assert_eq!(gr.to_string(), "[9] [[4]] []");
        assert_eq!(second.contracted_vertices, vec![0]);
        assert_eq!(second.leg_map, BTreeMap::from([(Leg(4), Leg(4))]));
    }

    #[test]
    fn contraction_order_does_not_matter() {
        let mut a = graph(vec![3, 5], vec![vec![1, 3, 7], vec![2, 4]], vec![(1, 2), (3, 7)]);
        let mut b = a.clone();
        a.contract_edge((Leg(1), Leg(2))).unwrap();
        a.contract_edge((Leg(3), Leg(7))).unwrap();
        b.contract_edge((Leg(3), Leg(7))).unwrap();
        b.contract_edge((Leg(1), Leg(2))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn contract_middle_vertex_renumbers() {
        let mut gr = graph(vec![1, 1, 1, 1], vec![vec![1], vec![2, 4], vec![3, 5], vec![6]], vec![(1, 2), (3, 4), (5, 6)]);
        let data = gr.contract_edge((Leg(3), Leg(4))).unwrap();
        assert_eq!(data.surviving_vertex, 1);
        assert_eq!(data.contracted_vertices, vec![1, 2]);
        assert_eq!(data.vertex_map, BTreeMap::from([(0, 0), (1, 1), (2, 1), (3, 2)]));
        assert_eq!(gr.genera(), &[1, 2, 1]);
    }

    #[test]
    fn contracting_a_missing_edge_errors() {
        let mut gr = graph(vec![3, 5], vec![vec![1, 3, 7], vec![2, 4]], vec![(1, 2)]);
        assert_eq!(
            gr.contract_edge((Leg(3), Leg(4))),
            Err(GraphError::NotAnEdge { edge: (Leg(3), Leg(4)) })
        );
    }

    #[test]
    fn glue_vertex_inserts_graph() {
        // Replace the genus-2 vertex by a genus-1 vertex with a loop.
        let mut gr = graph(vec![1, 2], vec![vec![1, 3], vec![2, 4]], vec![(3, 4)]);
        let insert = graph(vec![1], vec![vec![2, 4, 5, 6]], vec![(5, 6)]);
        let maps = gr.glue_vertex(1, &insert).unwrap();
        assert_eq!(gr.to_string(), "[1, 1] [[1, 3], [2, 4, 7, 8]] [(3, 4), (7, 8)]");
        assert_eq!(maps.inserted_vertices, BTreeMap::from([(0, 1)]));
        assert_eq!(maps.kept_vertices, BTreeMap::from([(0, 0)]));
        assert_eq!(maps.renamed_legs, BTreeMap::from([(Leg(5), Leg(7)), (Leg(6), Leg(8))]));
        assert_eq!(gr.g(), 3);
    }

    #[test]
    fn glue_vertex_out_of_range() {
        let mut gr = StableGraph::trivial(1, 1);
        let err = gr.glue_vertex(3, &StableGraph::trivial(1, 1)).unwrap_err();
        assert_eq!(err, GraphError::VertexOutOfRange { vertex: 3, num_verts: 1 });
    }

    #[test]
    fn extract_subgraph_renames_outgoing_legs() {
        let gam = graph(vec![3, 5], vec![vec![1, 3, 7], vec![2, 4]], vec![(1, 2)]);
        let sub = gam.extract_subgraph(&[0], None, true);
        assert_eq!(sub.graph.to_string(), "[3] [[1, 2, 3]] []");
        assert_eq!(sub.vertex_map, BTreeMap::from([(0, 0)]));
        assert_eq!(
            sub.leg_map,
            BTreeMap::from([(Leg(1), Leg(1)), (Leg(3), Leg(2)), (Leg(7), Leg(3))])
        );
    }

    #[test]
    fn extract_subgraph_keeps_inner_edges() {
        let gam = graph(vec![0, 0, 1], vec![vec![1, 2, 4], vec![5, 6, 7], vec![8]], vec![(4, 5), (7, 8)]);
        let sub = gam.extract_subgraph(&[0, 1], None, false);
        assert_eq!(sub.graph.num_edges(), 1);
        assert_eq!(sub.graph.sorted_markings(), legs(&[1, 2, 6, 7]));
    }

    #[test]
    fn reorder_and_forget() {
        let mut gr = graph(vec![1, 2], vec![vec![1, 3], vec![2, 4]], vec![(3, 4)]);
        gr.reorder_vertices(&[1, 0]);
        assert_eq!(gr.to_string(), "[2, 1] [[2, 4], [1, 3]] [(3, 4)]");
        gr.forget_markings(&[Leg(2)]);
        assert_eq!(gr.legs(0), legs(&[4]).as_slice());
        assert_eq!(gr.n(), 1);
    }
}
