//! Composition of cached morphisms: A-structures on a graph and common
//! degenerations of two graphs.
//!
//! Both queries run on canonical representatives. Inputs are located first,
//! down-morphisms are composed layer by layer as half-edge position tuples,
//! and the results are carried back to the caller's leg labels through the
//! location certificates. Vertex maps are never stored in the cache; they are
//! recovered from the leg maps by [`reconstruct_vertex_map`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use indexmap::IndexSet;
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use tracing::debug;

use strata_core::{FrozenGraph, GraphError, Leg, StableGraph};

use crate::cache::DegenerationCache;
use crate::degeneration_graph::DegenerationGraph;
use crate::error::{inconsistent, DegenError};
use crate::locate::{locate_in, Location};
use crate::morphism::{Morphism, Structure};

/// A generic common degeneration of two graphs: `graph` carries a structure
/// from each of them, and together their images cover every leg of `graph`.
#[derive(Debug, Clone, Serialize)]
pub struct CommonDegeneration {
    pub graph: FrozenGraph,
    /// Structure of the first input on `graph`.
    pub first: Structure,
    /// Structure of the second input on `graph`.
    pub second: Structure,
}

/// Every way of obtaining `gamma` from `a` by degenerating, as
/// [`Structure`]s (vertices of `gamma` to vertices of `a`, legs of `a` to
/// legs of `gamma`).
///
/// Both graphs must have the same genus and the same set of markings. If `a`
/// has more edges than `gamma` there is nothing to find.
pub fn a_structures(
    cache: &DegenerationCache,
    gamma: &StableGraph,
    a: &StableGraph,
) -> Result<Vec<Structure>, DegenError> {
    if a.num_edges() > gamma.num_edges() {
        return Ok(Vec::new());
    }
    check_compatible(gamma, a)?;
    let markings = gamma.sorted_markings();
    let gamma_names = canonical_renaming(gamma, &markings);
    let a_names = canonical_renaming(a, &markings);
    let gamma_c = renamed(gamma, &gamma_names);
    let a_c = renamed(a, &a_names);

    let dg = cache.build(gamma.g(), markings.len() as u32, gamma.num_edges())?;
    let loc_gamma = locate_in(&dg, &gamma_c, None)?;
    let loc_a = locate_in(&dg, &a_c, None)?;
    let structures = a_structures_located(&dg, &gamma_c, &a_c, &loc_gamma, &loc_a)?;

    let gamma_back: BTreeMap<Leg, Leg> = gamma_names.iter().map(|(&l, &c)| (c, l)).collect();
    structures
        .into_iter()
        .map(|st| -> Result<Structure, DegenError> {
            let leg_map = a_names
                .iter()
                .map(|(&l, c)| {
                    st.leg_map
                        .get(c)
                        .and_then(|t| gamma_back.get(t))
                        .map(|&t| (l, t))
                        .ok_or_else(|| inconsistent(format!("structure misses leg {l} of {a}")))
                })
                .collect::<Result<_, _>>()?;
            Ok(Structure {
                vertex_map: st.vertex_map,
                leg_map,
            })
        })
        .collect()
}

/// A-structures of already located graphs whose markings agree.
pub(crate) fn a_structures_located(
    dg: &DegenerationGraph,
    gamma: &StableGraph,
    a: &StableGraph,
    loc_gamma: &Location,
    loc_a: &Location,
) -> Result<Vec<Structure>, DegenError> {
    if loc_a.r > loc_gamma.r {
        return Ok(Vec::new());
    }
    let top = dg.node_or_err(loc_gamma.r, loc_gamma.index)?;
    let bottom = dg.node_or_err(loc_a.r, loc_a.index)?;

    let mut morphisms = IndexSet::from([Morphism::identity(loc_gamma.index, top.halfedges.len())]);
    for r in (loc_a.r + 1..=loc_gamma.r).rev() {
        let mut next = IndexSet::new();
        for m in &morphisms {
            for down in &dg.node_or_err(r, m.target)?.down {
                let composed = m.then(down).ok_or_else(|| {
                    inconsistent(format!("down-morphism {down:?} of layer {r} is out of range"))
                })?;
                next.insert(composed);
            }
        }
        morphisms = next;
    }
    morphisms.retain(|m| m.target == loc_a.index);

    // labels[i]: the half-edge of the top representative that half-edge i
    // of the bottom representative becomes.
    let mut labellings: IndexSet<Vec<Leg>> = IndexSet::new();
    for aut in top.graph.automorphisms() {
        for m in &morphisms {
            let labels = m
                .images
                .iter()
                .map(|&j| {
                    top.halfedges
                        .get(j as usize)
                        .and_then(|h| aut.leg_map.get(h))
                        .copied()
                })
                .collect::<Option<Vec<Leg>>>()
                .ok_or_else(|| inconsistent(format!("morphism {m:?} leaves {}", top.graph)))?;
            labellings.insert(labels);
        }
    }

    let gamma_back: BTreeMap<Leg, Leg> = gamma
        .halfedges()
        .into_iter()
        .filter_map(|h| loc_gamma.leg_map.get(&h).map(|&l| (l, h)))
        .collect();
    let a_positions = a
        .halfedges()
        .into_iter()
        .map(|h| {
            loc_a
                .leg_map
                .get(&h)
                .and_then(|&l| bottom.position(l))
                .map(|p| (h, p as usize))
                .ok_or_else(|| inconsistent(format!("half-edge {h} of {a} is not located")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let markings = a.list_markings();

    labellings
        .into_iter()
        .map(|labels| -> Result<Structure, DegenError> {
            let mut leg_map: BTreeMap<Leg, Leg> = markings.iter().map(|&m| (m, m)).collect();
            for &(h, pos) in &a_positions {
                let leg = labels
                    .get(pos)
                    .and_then(|l| gamma_back.get(l))
                    .copied()
                    .ok_or_else(|| inconsistent(format!("half-edge {h} of {a} has no image in {gamma}")))?;
                leg_map.insert(h, leg);
            }
            let vertex_map = reconstruct_vertex_map(gamma, a, &leg_map)?;
            Ok(Structure { vertex_map, leg_map })
        })
        .collect()
}

/// Recovers the vertex map of an A-structure on `gamma` from its leg map.
///
/// The edges of `gamma` outside the image of `leg_map` are the contracted
/// ones; each connected component they span collapses to the vertex of `a`
/// whose legs land in it.
pub fn reconstruct_vertex_map(
    gamma: &StableGraph,
    a: &StableGraph,
    leg_map: &BTreeMap<Leg, Leg>,
) -> Result<BTreeMap<usize, usize>, DegenError> {
    if a.num_verts() == 1 {
        return Ok((0..gamma.num_verts()).map(|v| (v, 0)).collect());
    }
    let image: HashSet<Leg> = leg_map.values().copied().collect();
    let mut components = UnionFind::<usize>::new(gamma.num_verts());
    for &(x, y) in gamma.edges() {
        if !image.contains(&x) {
            components.union(vertex(gamma, x)?, vertex(gamma, y)?);
        }
    }

    let mut owner: BTreeMap<usize, usize> = BTreeMap::new();
    for (&l, &target) in leg_map {
        let root = components.find(vertex(gamma, target)?);
        let va = vertex(a, l)?;
        if *owner.entry(root).or_insert(va) != va {
            return Err(inconsistent(format!(
                "contracted part of {gamma} meets vertices {} and {va} of {a}",
                owner[&root]
            )));
        }
    }
    (0..gamma.num_verts())
        .map(|v| {
            owner
                .get(&components.find(v))
                .map(|&va| (v, va))
                .ok_or_else(|| inconsistent(format!("vertex {v} of {gamma} is not reached by the leg map")))
        })
        .collect()
}

/// Every generic common degeneration of `g1` and `g2`.
///
/// With `dedup_by_automorphism` only one result per orbit under the
/// automorphisms of the common degeneration is kept. With `allow_renaming`
/// the markings may be any labels (shared by both graphs); otherwise they
/// must be `1..=n`.
pub fn common_degenerations(
    cache: &DegenerationCache,
    g1: &StableGraph,
    g2: &StableGraph,
    dedup_by_automorphism: bool,
    allow_renaming: bool,
) -> Result<Vec<CommonDegeneration>, DegenError> {
    check_compatible(g1, g2)?;
    let switched = g1.num_edges() > g2.num_edges();
    let (g1, g2) = if switched { (g2, g1) } else { (g1, g2) };

    let markings = g1.sorted_markings();
    let (genus, n) = (g1.g(), markings.len() as u32);
    let names = allow_renaming.then(|| (canonical_renaming(g1, &markings), canonical_renaming(g2, &markings)));
    let (h1, h2) = match &names {
        Some((names1, names2)) => (renamed(g1, names1), renamed(g2, names2)),
        None => (g1.clone(), g2.clone()),
    };

    let (r1, r2) = (h1.num_edges(), h2.num_edges());
    let top = (r1 + r2).min((3 * genus + n).saturating_sub(3) as usize);
    let dg = cache.build(genus, n, top)?;
    let loc1 = locate_in(&dg, &h1, None)?;
    let loc2 = locate_in(&dg, &h2, None)?;

    let mut cone1 = BTreeSet::from([loc1.index]);
    for r in r1..r2 {
        cone1 = ascend(&dg, r, &cone1)?;
    }
    let mut cone2 = BTreeSet::from([loc2.index]);

    let mut found = Vec::new();
    for r in r2..=top {
        for &i in cone1.intersection(&cone2) {
            let node = dg.node_or_err(r, i)?;
            let here = Location::of_representative(&dg, r, i)?;
            let firsts = a_structures_located(&dg, &node.graph, &h1, &here, &loc1)?;
            let seconds = a_structures_located(&dg, &node.graph, &h2, &here, &loc2)?;

            let num_legs = node.graph.num_legs();
            let mut pairs = Vec::new();
            for first in &firsts {
                for second in &seconds {
                    let covered: HashSet<Leg> =
                        first.leg_map.values().chain(second.leg_map.values()).copied().collect();
                    if covered.len() == num_legs {
                        pairs.push((first.clone(), second.clone()));
                    }
                }
            }
            if dedup_by_automorphism {
                pairs = orbit_representatives(&node.graph, pairs);
            }

            for (first, second) in pairs {
                let (first, second) = match &names {
                    Some((names1, names2)) => (restore(first, names1)?, restore(second, names2)?),
                    None => (first, second),
                };
                let (first, second) = if switched { (second, first) } else { (first, second) };
                found.push(CommonDegeneration {
                    graph: node.graph.clone(),
                    first,
                    second,
                });
            }
        }
        if r < top {
            cone1 = ascend(&dg, r, &cone1)?;
            cone2 = ascend(&dg, r, &cone2)?;
        }
    }
    debug!(genus, n, r1, r2, found = found.len(), "computed common degenerations");
    Ok(found)
}

fn check_compatible(left: &StableGraph, right: &StableGraph) -> Result<(), GraphError> {
    if left.g() != right.g() {
        return Err(GraphError::GenusMismatch {
            left: left.g(),
            right: right.g(),
        });
    }
    let (lm, rm) = (left.sorted_markings(), right.sorted_markings());
    if lm != rm {
        return Err(GraphError::MarkingMismatch { left: lm, right: rm });
    }
    Ok(())
}

/// Sends the sorted `markings` to `1..=n` and every other leg `l` to
/// `l + n + 1`, so the two never collide.
fn canonical_renaming(gr: &StableGraph, markings: &[Leg]) -> BTreeMap<Leg, Leg> {
    let n = markings.len() as u32;
    let mut names: BTreeMap<Leg, Leg> = gr.leglist().into_iter().map(|l| (l, l.shifted(n + 1))).collect();
    for (i, &m) in markings.iter().enumerate() {
        names.insert(m, Leg(i as u32 + 1));
    }
    names
}

fn renamed(gr: &StableGraph, names: &BTreeMap<Leg, Leg>) -> StableGraph {
    let mut copy = gr.clone();
    copy.rename_legs(names, 0);
    copy
}

/// Rewrites the keys of a structure's leg map back to the original labels.
fn restore(st: Structure, names: &BTreeMap<Leg, Leg>) -> Result<Structure, DegenError> {
    let leg_map = names
        .iter()
        .map(|(&l, c)| {
            st.leg_map
                .get(c)
                .map(|&t| (l, t))
                .ok_or_else(|| inconsistent(format!("structure misses renamed leg {c}")))
        })
        .collect::<Result<_, _>>()?;
    Ok(Structure {
        vertex_map: st.vertex_map,
        leg_map,
    })
}

/// Targets of the up-morphisms of the nodes `cone` of layer `r`.
fn ascend(dg: &DegenerationGraph, r: usize, cone: &BTreeSet<usize>) -> Result<BTreeSet<usize>, DegenError> {
    let mut next = BTreeSet::new();
    for &i in cone {
        next.extend(dg.node_or_err(r, i)?.up.iter().map(|m| m.target));
    }
    Ok(next)
}

/// Keeps the first pair of each orbit under the automorphisms of `gamma`.
fn orbit_representatives(gamma: &StableGraph, mut pending: Vec<(Structure, Structure)>) -> Vec<(Structure, Structure)> {
    let auts: Vec<(BTreeMap<usize, usize>, BTreeMap<Leg, Leg>)> = gamma
        .automorphisms()
        .into_iter()
        .map(|aut| {
            let legs_back = aut.inverse().leg_map;
            (aut.vertex_map, legs_back)
        })
        .collect();
    let mut kept = Vec::new();
    while !pending.is_empty() {
        let entry = pending.remove(0);
        let orbit: Vec<(Structure, Structure)> = auts
            .iter()
            .map(|(vertices, legs_back)| {
                (
                    transport(&entry.0, vertices, legs_back),
                    transport(&entry.1, vertices, legs_back),
                )
            })
            .collect();
        pending.retain(|pair| !orbit.contains(pair));
        kept.push(entry);
    }
    kept
}

fn transport(st: &Structure, vertices: &BTreeMap<usize, usize>, legs_back: &BTreeMap<Leg, Leg>) -> Structure {
    Structure {
        vertex_map: st
            .vertex_map
            .keys()
            .filter_map(|&v| vertices.get(&v).and_then(|w| st.vertex_map.get(w)).map(|&t| (v, t)))
            .collect(),
        leg_map: st
            .leg_map
            .iter()
            .filter_map(|(&l, t)| legs_back.get(t).map(|&u| (l, u)))
            .collect(),
    }
}

fn vertex(gr: &StableGraph, leg: Leg) -> Result<usize, DegenError> {
    gr.vertex_of(leg)
        .ok_or_else(|| inconsistent(format!("leg {leg} is not on {gr}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(genera: Vec<i32>, legs: Vec<Vec<i32>>, edges: Vec<(i32, i32)>) -> StableGraph {
        StableGraph::new(genera, legs, edges).unwrap()
    }

    fn theta() -> StableGraph {
        graph(vec![0, 0], vec![vec![1, 3, 5], vec![2, 4, 6]], vec![(1, 2), (3, 4), (5, 6)])
    }

    fn irreducible_node() -> StableGraph {
        graph(vec![0], vec![vec![1, 2, 3]], vec![(2, 3)])
    }

    #[test]
    fn theta_over_one_loop() {
        let cache = DegenerationCache::default();
        let a = graph(vec![1], vec![vec![1, 2]], vec![(1, 2)]);
        let structures = a_structures(&cache, &theta(), &a).unwrap();
        assert_eq!(structures.len(), 6);
        for st in &structures {
            assert_eq!(st.vertex_map, BTreeMap::from([(0, 0), (1, 0)]));
            let (x, y) = (st.leg_map[&Leg(1)], st.leg_map[&Leg(2)]);
            assert_eq!(theta().opposite(x), y);
        }
    }

    #[test]
    fn self_structures_are_automorphisms() {
        let cache = DegenerationCache::default();
        let structures = a_structures(&cache, &theta(), &theta()).unwrap();
        assert_eq!(structures.len(), theta().automorphism_count());
    }

    #[test]
    fn open_stratum_has_one_structure() {
        let cache = DegenerationCache::default();
        let gamma = graph(vec![0, 0], vec![vec![1, 2, 5], vec![3, 4, 6]], vec![(5, 6)]);
        let structures = a_structures(&cache, &gamma, &StableGraph::trivial(0, 4)).unwrap();
        assert_eq!(structures.len(), 1);
        assert_eq!(structures[0].vertex_map, BTreeMap::from([(0, 0), (1, 0)]));
        assert_eq!(structures[0].leg_map.len(), 4);
    }

    #[test]
    fn larger_source_gives_nothing() {
        let cache = DegenerationCache::default();
        assert!(a_structures(&cache, &StableGraph::trivial(2, 0), &theta()).unwrap().is_empty());
    }

    #[test]
    fn vertex_map_follows_contracted_edges() {
        let cache = DegenerationCache::default();
        let chain = graph(
            vec![0, 0, 0],
            vec![vec![1, 2, 6], vec![3, 7, 8], vec![4, 5, 9]],
            vec![(6, 7), (8, 9)],
        );
        let a = graph(vec![0, 0], vec![vec![1, 2, 6], vec![3, 4, 5, 7]], vec![(6, 7)]);
        let structures = a_structures(&cache, &chain, &a).unwrap();
        assert_eq!(structures.len(), 1);
        assert_eq!(structures[0].vertex_map, BTreeMap::from([(0, 0), (1, 1), (2, 1)]));
        assert_eq!(structures[0].leg_map[&Leg(6)], Leg(6));
        assert_eq!(structures[0].leg_map[&Leg(7)], Leg(7));
    }

    #[test]
    fn arbitrary_marking_labels() {
        let cache = DegenerationCache::default();
        let gamma = graph(vec![0, 0], vec![vec![5, 6, 1], vec![7, 8, 2]], vec![(1, 2)]);
        let a = graph(vec![0], vec![vec![5, 6, 7, 8]], vec![]);
        let structures = a_structures(&cache, &gamma, &a).unwrap();
        assert_eq!(structures.len(), 1);
        let identity: BTreeMap<Leg, Leg> = (5..=8).map(|i| (Leg(i), Leg(i))).collect();
        assert_eq!(structures[0].leg_map, identity);
    }

    #[test]
    fn incompatible_inputs_are_rejected() {
        let cache = DegenerationCache::default();
        assert!(matches!(
            a_structures(&cache, &theta(), &StableGraph::trivial(1, 0)),
            Err(DegenError::Graph(GraphError::GenusMismatch { left: 2, right: 1 }))
        ));
        assert!(matches!(
            a_structures(&cache, &irreducible_node(), &StableGraph::trivial(1, 2)),
            Err(DegenError::Graph(GraphError::MarkingMismatch { .. }))
        ));
    }

    #[test]
    fn reconstruct_rejects_split_component() {
        let chain = graph(
            vec![0, 0, 0],
            vec![vec![1, 2, 6], vec![3, 7, 8], vec![4, 5, 9]],
            vec![(6, 7), (8, 9)],
        );
        let a = graph(vec![0, 0], vec![vec![1, 2, 6], vec![3, 4, 5, 7]], vec![(6, 7)]);
        // Marking 3 sent to the wrong side of the kept edge.
        let leg_map: BTreeMap<Leg, Leg> = [(1, 1), (2, 2), (3, 1), (4, 4), (5, 5), (6, 6), (7, 7)]
            .into_iter()
            .map(|(l, t)| (Leg(l), Leg(t)))
            .collect();
        assert!(matches!(
            reconstruct_vertex_map(&chain, &a, &leg_map),
            Err(DegenError::Inconsistent { .. })
        ));
    }

    #[test]
    fn irreducible_node_with_itself() {
        let cache = DegenerationCache::default();
        let node = irreducible_node();
        assert_eq!(common_degenerations(&cache, &node, &node, false, false).unwrap().len(), 4);
        assert_eq!(common_degenerations(&cache, &node, &node, true, false).unwrap().len(), 2);
    }

    #[test]
    fn open_stratum_and_a_divisor() {
        let cache = DegenerationCache::default();
        let node = irreducible_node();
        let trivial = StableGraph::trivial(1, 1);
        let all = common_degenerations(&cache, &trivial, &node, false, false).unwrap();
        assert_eq!(all.len(), 2);
        let deduped = common_degenerations(&cache, &node, &trivial, true, false).unwrap();
        assert_eq!(deduped.len(), 1);
        // The swap is undone: `first` belongs to the divisor.
        assert_eq!(deduped[0].first.leg_map.len(), 3);
        assert_eq!(deduped[0].second.leg_map.len(), 1);
    }

    #[test]
    fn transversal_divisors_meet_once() {
        let cache = DegenerationCache::default();
        let d12 = graph(vec![0, 0], vec![vec![1, 2, 6], vec![3, 4, 5, 7]], vec![(6, 7)]);
        let d45 = graph(vec![0, 0], vec![vec![4, 5, 6], vec![1, 2, 3, 7]], vec![(6, 7)]);
        let found = common_degenerations(&cache, &d12, &d45, false, false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].graph.num_edges(), 2);
    }

    #[test]
    fn crossing_divisors_do_not_meet() {
        let cache = DegenerationCache::default();
        let d12 = graph(vec![0, 0], vec![vec![1, 2, 6], vec![3, 4, 5, 7]], vec![(6, 7)]);
        let d13 = graph(vec![0, 0], vec![vec![1, 3, 6], vec![2, 4, 5, 7]], vec![(6, 7)]);
        assert!(common_degenerations(&cache, &d12, &d13, false, false).unwrap().is_empty());
    }

    #[test]
    fn renaming_keeps_caller_labels() {
        let cache = DegenerationCache::default();
        let d12 = graph(vec![0, 0], vec![vec![11, 12, 1], vec![13, 14, 15, 2]], vec![(1, 2)]);
        let d45 = graph(vec![0, 0], vec![vec![14, 15, 1], vec![11, 12, 13, 2]], vec![(1, 2)]);
        assert!(matches!(
            common_degenerations(&cache, &d12, &d45, false, false),
            Err(DegenError::Graph(GraphError::MarkingMismatch { .. }))
        ));

        let found = common_degenerations(&cache, &d12, &d45, false, true).unwrap();
        assert_eq!(found.len(), 1);
        let first = &found[0].first.leg_map;
        assert_eq!(first.keys().copied().collect::<Vec<_>>(), [1, 2, 11, 12, 13, 14, 15].map(Leg));
        assert_eq!(first[&Leg(11)], Leg(1));
        assert_eq!(first[&Leg(15)], Leg(5));
    }
}
