//! The layered graph of boundary strata for one (genus, n).
//!
//! Layer `r` holds one representative per isomorphism class of stable graphs
//! with `r` edges. Every representative is frozen (tidy), so its half-edges
//! in edge order extend those of the graph it was degenerated from. Nodes of
//! adjacent layers are linked by down- and up-[`Morphism`]s recording exactly
//! which half-edge goes where.
//!
//! Layers are built one at a time from the previous one:
//!
//! 1. Every degeneration of every node of layer `r - 1` becomes a candidate,
//!    tagged with its parent and the identity half-edge map.
//! 2. Candidates are sorted by invariant and grouped into buckets.
//! 3. Inside a bucket each candidate is compared with the representatives
//!    accepted so far, in order. On the first isomorphism the candidate's
//!    provenance is pushed through the certificate and recorded on the
//!    representative; otherwise the candidate becomes a new representative.
//! 4. The finished layer is committed together with the up-morphisms it
//!    adds to layer `r - 1`. Nothing is modified before that point, so a
//!    failed build leaves the graph as it was.
//!
//! The scan inside a bucket is quadratic in the bucket size in the worst
//! case.

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Instant;

use indexmap::IndexSet;
use tracing::{debug, info};

use strata_core::{FrozenGraph, GraphInvariant, Leg, StableGraph};

use crate::error::{inconsistent, DegenError};
use crate::morphism::{HalfedgeImages, Morphism};

/// One isomorphism class of stable graphs with a fixed number of edges.
#[derive(Debug, Clone)]
pub struct LayerNode {
    pub graph: FrozenGraph,
    /// Half-edges of `graph` in edge order; morphism images index into it.
    pub halfedges: Vec<Leg>,
    /// Contractions of one edge, towards the previous layer.
    pub down: IndexSet<Morphism>,
    /// Degenerations by one edge, towards the next layer.
    pub up: IndexSet<Morphism>,
}

impl LayerNode {
    fn new(graph: FrozenGraph) -> Self {
        let halfedges = graph.halfedges();
        LayerNode {
            graph,
            halfedges,
            down: IndexSet::new(),
            up: IndexSet::new(),
        }
    }

    /// Position of `leg` among the half-edges of this node.
    pub fn position(&self, leg: Leg) -> Option<u32> {
        self.halfedges.iter().position(|&h| h == leg).map(|p| p as u32)
    }
}

/// All representatives with the same number of edges.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    nodes: Vec<LayerNode>,
    /// Nodes of one invariant occupy a contiguous range.
    index: BTreeMap<GraphInvariant, Range<usize>>,
}

impl Layer {
    pub fn nodes(&self) -> &[LayerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node indices whose graphs have invariant `inv`.
    pub fn bucket(&self, inv: &GraphInvariant) -> Range<usize> {
        self.index.get(inv).cloned().unwrap_or(0..0)
    }
}

/// The degeneration graph of stable graphs of genus `g` with `n` markings,
/// built up to some number of edges.
#[derive(Debug, Clone)]
pub struct DegenerationGraph {
    genus: u32,
    n: u32,
    layers: Vec<Layer>,
}

/// A candidate of the layer under construction.
struct Candidate {
    graph: FrozenGraph,
    parent: usize,
}

impl DegenerationGraph {
    /// Creates the graph holding only layer 0, the open stratum.
    pub fn new(genus: u32, n: u32) -> Result<Self, DegenError> {
        if 2 * genus + n < 3 {
            return Err(DegenError::InvalidModuli { genus, n });
        }
        let root = StableGraph::trivial(genus, n).freeze();
        let mut layer = Layer::default();
        layer.index.insert(root.invariant_key().clone(), 0..1);
        layer.nodes.push(LayerNode::new(root));
        Ok(DegenerationGraph {
            genus,
            n,
            layers: vec![layer],
        })
    }

    pub fn genus(&self) -> u32 {
        self.genus
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    /// Largest number of edges of a stable graph: `3g - 3 + n`.
    pub fn max_edges(&self) -> usize {
        (3 * self.genus + self.n - 3) as usize
    }

    /// Highest layer built so far.
    pub fn built_to(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn layer(&self, r: usize) -> Option<&Layer> {
        self.layers.get(r)
    }

    pub fn node(&self, r: usize, index: usize) -> Option<&LayerNode> {
        self.layers.get(r).and_then(|layer| layer.nodes.get(index))
    }

    pub(crate) fn node_or_err(&self, r: usize, index: usize) -> Result<&LayerNode, DegenError> {
        self.node(r, index)
            .ok_or_else(|| inconsistent(format!("no node {index} in layer {r}")))
    }

    /// The representatives with `r` edges, if that layer is built.
    pub fn strata(&self, r: usize) -> Option<Vec<&FrozenGraph>> {
        self.layers
            .get(r)
            .map(|layer| layer.nodes.iter().map(|node| &node.graph).collect())
    }

    /// Number of representatives per layer.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(Layer::len).collect()
    }

    /// Builds layers until `r_max` is reached.
    pub fn extend_to(&mut self, r_max: usize) -> Result<(), DegenError> {
        let max = self.max_edges();
        if r_max > max {
            return Err(DegenError::EdgeCountOutOfRange {
                requested: r_max,
                max,
            });
        }
        while self.built_to() < r_max {
            let r = self.built_to() + 1;
            let started = Instant::now();
            let (layer, ups) = self.build_layer(r)?;
            debug!(
                genus = self.genus,
                n = self.n,
                r,
                classes = layer.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "built degeneration layer"
            );
            self.commit(layer, ups);
        }
        Ok(())
    }

    /// Computes layer `r` from layer `r - 1` without touching `self`.
    fn build_layer(&self, r: usize) -> Result<(Layer, Vec<(usize, Morphism)>), DegenError> {
        let prev = &self.layers[r - 1];

        let mut candidates: Vec<Candidate> = prev
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(parent, node)| {
                node.graph
                    .all_degenerations()
                    .into_iter()
                    .map(move |h| Candidate {
                        graph: h.freeze(),
                        parent,
                    })
            })
            .collect();
        candidates.sort_by(|a, b| a.graph.invariant_key().cmp(b.graph.invariant_key()));
        debug!(r, candidates = candidates.len(), "sorted degeneration candidates");

        let mut layer = Layer::default();
        let mut ups = Vec::new();
        let mut start = 0;
        while start < candidates.len() {
            let inv = candidates[start].graph.invariant_key().clone();
            let end = start
                + candidates[start..]
                    .iter()
                    .take_while(|c| c.graph.invariant_key() == &inv)
                    .count();
            let base = layer.nodes.len();
            for candidate in &candidates[start..end] {
                let parent_halfedges = &prev.nodes[candidate.parent].halfedges;
                let mut matched = None;
                for (k, rep) in layer.nodes[base..].iter().enumerate() {
                    if let Some(iso) = candidate.graph.isomorphism(&rep.graph) {
                        let images = parent_halfedges
                            .iter()
                            .map(|h| iso.leg_map.get(h).and_then(|&l| rep.position(l)))
                            .collect::<Option<HalfedgeImages>>()
                            .ok_or_else(|| {
                                inconsistent(format!(
                                    "isomorphism onto {} loses a half-edge of its parent",
                                    rep.graph
                                ))
                            })?;
                        matched = Some((base + k, images));
                        break;
                    }
                }
                let (target, images) = match matched {
                    Some(found) => found,
                    None => {
                        // Half-edges of the parent are a prefix of the candidate's.
                        let images = Morphism::identity(candidate.parent, parent_halfedges.len()).images;
                        layer.nodes.push(LayerNode::new(candidate.graph.clone()));
                        (layer.nodes.len() - 1, images)
                    }
                };
                layer.nodes[target].down.insert(Morphism {
                    target: candidate.parent,
                    images: images.clone(),
                });
                ups.push((candidate.parent, Morphism { target, images }));
            }
            layer.index.insert(inv, base..layer.nodes.len());
            start = end;
        }
        Ok((layer, ups))
    }

    fn commit(&mut self, layer: Layer, ups: Vec<(usize, Morphism)>) {
        if let Some(prev) = self.layers.last_mut() {
            for (node, morphism) in ups {
                prev.nodes[node].up.insert(morphism);
            }
        }
        self.layers.push(layer);
    }

    /// Checks that up- and down-morphisms are reciprocal, point at existing
    /// nodes and map half-edges injectively into range.
    pub fn check_consistency(&self) -> Result<(), DegenError> {
        for (r, layer) in self.layers.iter().enumerate() {
            for (i, node) in layer.nodes.iter().enumerate() {
                if node.halfedges.len() != 2 * r {
                    return Err(inconsistent(format!(
                        "node {i} of layer {r} has {} half-edges",
                        node.halfedges.len()
                    )));
                }
                if r > 0 && node.down.is_empty() {
                    return Err(inconsistent(format!("node {i} of layer {r} has no contraction")));
                }
                for m in &node.down {
                    let below = self.node_or_err(r - 1, m.target)?;
                    check_images(&m.images, 2 * (r - 1), 2 * r, r, i)?;
                    let reciprocal = Morphism {
                        target: i,
                        images: m.images.clone(),
                    };
                    if !below.up.contains(&reciprocal) {
                        return Err(inconsistent(format!(
                            "down-morphism {i} -> {} of layer {r} has no up-morphism",
                            m.target
                        )));
                    }
                }
                for m in &node.up {
                    let above = self.node_or_err(r + 1, m.target)?;
                    check_images(&m.images, 2 * r, 2 * (r + 1), r, i)?;
                    let reciprocal = Morphism {
                        target: i,
                        images: m.images.clone(),
                    };
                    if !above.down.contains(&reciprocal) {
                        return Err(inconsistent(format!(
                            "up-morphism {i} -> {} of layer {r} has no down-morphism",
                            m.target
                        )));
                    }
                }
            }
            for (inv, range) in &layer.index {
                if layer.nodes[range.clone()]
                    .iter()
                    .any(|node| node.graph.invariant_key() != inv)
                {
                    return Err(inconsistent(format!("invariant index of layer {r} is stale")));
                }
            }
        }
        info!(
            genus = self.genus,
            n = self.n,
            layers = self.layers.len(),
            "degeneration graph is consistent"
        );
        Ok(())
    }
}

fn check_images(images: &HalfedgeImages, len: usize, bound: usize, r: usize, i: usize) -> Result<(), DegenError> {
    let mut seen = vec![false; bound];
    let injective_in_range = images.len() == len
        && images.iter().all(|&j| {
            let j = j as usize;
            j < bound && !std::mem::replace(&mut seen[j], true)
        });
    if injective_in_range {
        Ok(())
    } else {
        Err(inconsistent(format!("bad half-edge images {images:?} at node {i} of layer {r}")))
    }
}
