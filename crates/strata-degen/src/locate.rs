//! Finding an arbitrary stable graph among the cached representatives.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::error;

use strata_core::{GraphError, Leg, StableGraph};

use crate::cache::DegenerationCache;
use crate::degeneration_graph::DegenerationGraph;
use crate::error::{inconsistent, DegenError};

/// Position of a graph in its degeneration graph, with the isomorphism onto
/// the representative found there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Number of edges (the layer).
    pub r: usize,
    /// Index of the representative in layer `r`.
    pub index: usize,
    /// Vertex of the located graph to vertex of the representative.
    pub vertex_map: BTreeMap<usize, usize>,
    /// Leg of the located graph (markings and half-edges, original labels)
    /// to leg of the representative.
    pub leg_map: BTreeMap<Leg, Leg>,
}

impl Location {
    /// The location of a representative itself.
    pub fn of_representative(dg: &DegenerationGraph, r: usize, index: usize) -> Result<Self, DegenError> {
        let node = dg.node_or_err(r, index)?;
        Ok(Location {
            r,
            index,
            vertex_map: (0..node.graph.num_verts()).map(|v| (v, v)).collect(),
            leg_map: node.graph.leglist().into_iter().map(|l| (l, l)).collect(),
        })
    }
}

/// Locates `gr` in the degeneration graph of its (genus, n), building it as
/// far as needed.
///
/// `renaming` sends the markings of `gr` to `1..=n`; without it the
/// markings must already be `1..=n`. The graph itself is not modified.
pub fn locate(
    cache: &DegenerationCache,
    gr: &StableGraph,
    renaming: Option<&BTreeMap<Leg, Leg>>,
) -> Result<Location, DegenError> {
    let dg = cache.build(gr.g(), gr.n() as u32, gr.num_edges())?;
    locate_in(&dg, gr, renaming)
}

/// Locates `gr` in an already built degeneration graph.
pub fn locate_in(
    dg: &DegenerationGraph,
    gr: &StableGraph,
    renaming: Option<&BTreeMap<Leg, Leg>>,
) -> Result<Location, DegenError> {
    let (genus, n, r) = (gr.g(), gr.n() as u32, gr.num_edges());
    if genus != dg.genus() {
        return Err(GraphError::GenusMismatch {
            left: genus,
            right: dg.genus(),
        }
        .into());
    }
    if n != dg.n() {
        return Err(GraphError::MarkingMismatch {
            left: gr.sorted_markings(),
            right: (1..=dg.n()).map(Leg).collect(),
        }
        .into());
    }
    if r > dg.built_to() {
        return Err(DegenError::EdgeCountOutOfRange {
            requested: r,
            max: dg.built_to(),
        });
    }

    // Renamed copies move their half-edges past `n` so they cannot collide
    // with the new marking labels.
    let marking_names: BTreeMap<Leg, Leg> = gr
        .list_markings()
        .into_iter()
        .map(|m| (m, renaming.and_then(|map| map.get(&m).copied()).unwrap_or(m)))
        .collect();
    let shift = if renaming.is_some() { n + 1 } else { 0 };
    let mut renamed = gr.clone();
    if renaming.is_some() {
        renamed.rename_legs(&marking_names, shift);
    }

    let labels = renamed.leglist();
    if labels.iter().collect::<HashSet<_>>().len() != labels.len() {
        return Err(GraphError::InvalidGraph {
            reason: format!("renaming the markings of {gr} repeats a leg label"),
        }
        .into());
    }
    let canonical: Vec<Leg> = (1..=n).map(Leg).collect();
    let renamed_markings = renamed.sorted_markings();
    if renamed_markings != canonical {
        return Err(GraphError::MarkingMismatch {
            left: renamed_markings,
            right: canonical,
        }
        .into());
    }

    let layer = dg
        .layer(r)
        .ok_or_else(|| inconsistent(format!("layer {r} is missing")))?;
    let inv = renamed.invariant();
    for index in layer.bucket(&inv) {
        let node = &layer.nodes()[index];
        let Some(iso) = renamed.isomorphism(&node.graph) else {
            continue;
        };
        let mut leg_map = BTreeMap::new();
        for (&m, name) in &marking_names {
            leg_map.insert(m, image(&iso.leg_map, *name)?);
        }
        for h in gr.halfedges() {
            leg_map.insert(h, image(&iso.leg_map, h.shifted(shift))?);
        }
        return Ok(Location {
            r,
            index,
            vertex_map: iso.vertex_map,
            leg_map,
        });
    }

    error!(genus, n, edges = r, graph = %gr, "stable graph missing from its degeneration layer");
    Err(DegenError::LocatorNotFound {
        genus,
        n,
        edges: r,
        graph: gr.to_string(),
    })
}

fn image(leg_map: &BTreeMap<Leg, Leg>, leg: Leg) -> Result<Leg, DegenError> {
    leg_map
        .get(&leg)
        .copied()
        .ok_or_else(|| inconsistent(format!("isomorphism certificate misses leg {leg}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(genera: Vec<i32>, legs: Vec<Vec<i32>>, edges: Vec<(i32, i32)>) -> StableGraph {
        StableGraph::new(genera, legs, edges).unwrap()
    }

    #[test]
    fn locates_open_stratum() {
        let cache = DegenerationCache::default();
        let loc = locate(&cache, &StableGraph::trivial(1, 2), None).unwrap();
        assert_eq!((loc.r, loc.index), (0, 0));
        assert_eq!(loc.leg_map, BTreeMap::from([(Leg(1), Leg(1)), (Leg(2), Leg(2))]));
    }

    #[test]
    fn locates_with_certificate() {
        let cache = DegenerationCache::default();
        // D(13|24) with odd half-edge labels and the vertices swapped.
        let gr = graph(vec![0, 0], vec![vec![2, 4, 11], vec![3, 1, 20]], vec![(20, 11)]);
        let loc = locate(&cache, &gr, None).unwrap();
        assert_eq!(loc.r, 1);
        let dg = cache.get(0, 4).unwrap();
        let rep = &dg.node(1, loc.index).unwrap().graph;
        assert_eq!(gr.relabel(&loc.vertex_map, &loc.leg_map).freeze(), *rep);
    }

    #[test]
    fn renaming_maps_markings_first() {
        let cache = DegenerationCache::default();
        let gr = graph(vec![0, 0], vec![vec![5, 6, 11], vec![7, 8, 12]], vec![(11, 12)]);
        let renaming: BTreeMap<Leg, Leg> = (5..=8).map(|i| (Leg(i), Leg(i - 4))).collect();
        let loc = locate(&cache, &gr, Some(&renaming)).unwrap();
        assert_eq!(loc.leg_map[&Leg(5)], Leg(1));
        assert_eq!(loc.leg_map[&Leg(8)], Leg(4));
        assert_eq!(loc.leg_map.len(), 6);

        let plain = graph(vec![0, 0], vec![vec![1, 2, 11], vec![3, 4, 12]], vec![(11, 12)]);
        assert_eq!(locate(&cache, &plain, None).unwrap().index, loc.index);
    }

    #[test]
    fn markings_must_be_canonical() {
        let cache = DegenerationCache::default();
        let gr = graph(vec![0, 0], vec![vec![5, 6, 11], vec![7, 8, 12]], vec![(11, 12)]);
        match locate(&cache, &gr, None) {
            Err(DegenError::Graph(GraphError::MarkingMismatch { left, right })) => {
                assert_eq!(left, vec![Leg(5), Leg(6), Leg(7), Leg(8)]);
                assert_eq!(right, vec![Leg(1), Leg(2), Leg(3), Leg(4)]);
            }
            other => panic!("expected MarkingMismatch, got {other:?}"),
        }
    }

    #[test]
    fn halfedges_may_reuse_marking_labels() {
        let cache = DegenerationCache::default();
        // D(12|34) whose half-edges are labelled 1 and 2.
        let gr = graph(vec![0, 0], vec![vec![5, 6, 1], vec![7, 8, 2]], vec![(1, 2)]);
        let renaming: BTreeMap<Leg, Leg> = (5..=8).map(|i| (Leg(i), Leg(i - 4))).collect();
        let loc = locate(&cache, &gr, Some(&renaming)).unwrap();
        assert_eq!(loc.r, 1);
        assert_eq!(loc.leg_map.len(), 6);
        for (&from, &to) in &renaming {
            assert_eq!(loc.leg_map[&from], to);
        }
        let dg = cache.get(0, 4).unwrap();
        let rep = &dg.node(1, loc.index).unwrap().graph;
        assert_eq!(gr.relabel(&loc.vertex_map, &loc.leg_map).freeze(), *rep);

        let plain = graph(vec![0, 0], vec![vec![1, 2, 11], vec![3, 4, 12]], vec![(11, 12)]);
        assert_eq!(locate(&cache, &plain, None).unwrap().index, loc.index);
    }

    #[test]
    fn colliding_renaming_is_rejected() {
        let cache = DegenerationCache::default();
        let gr = graph(vec![0], vec![vec![3, 4, 1, 2]], vec![(1, 2)]);
        let renaming = BTreeMap::from([(Leg(3), Leg(1)), (Leg(4), Leg(1))]);
        assert!(matches!(
            locate(&cache, &gr, Some(&renaming)),
            Err(DegenError::Graph(GraphError::InvalidGraph { .. }))
        ));
    }

    #[test]
    fn wrong_degeneration_graph_is_rejected() {
        let mut dg = DegenerationGraph::new(1, 1).unwrap();
        dg.extend_to(1).unwrap();
        let gr = StableGraph::trivial(2, 1);
        assert!(matches!(
            locate_in(&dg, &gr, None),
            Err(DegenError::Graph(GraphError::GenusMismatch { .. }))
        ));
    }

    #[test]
    fn representative_location_is_identity() {
        let cache = DegenerationCache::default();
        let dg = cache.build(1, 1, 1).unwrap();
        let loc = Location::of_representative(&dg, 1, 0).unwrap();
        assert_eq!(loc.vertex_map, BTreeMap::from([(0, 0)]));
        assert_eq!(loc.leg_map.len(), 3);
        assert!(Location::of_representative(&dg, 1, 4).is_err());
    }
}
