//! Stabilization: contracting unstable genus-0 vertices.

use std::collections::{BTreeMap, HashSet};

use crate::error::GraphError;
use crate::graph::StableGraph;
use crate::id::Leg;

/// Bookkeeping returned by [`StableGraph::stabilize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stabilization {
    /// New vertex index to the old vertex it came from.
    pub vertex_map: BTreeMap<usize, usize>,
    /// Marking removed with its vertex, to the half-edge now carrying it.
    pub marking_map: BTreeMap<Leg, Leg>,
    /// Half-edge removed with its vertex, to the half-edge that replaced it.
    pub halfedge_map: BTreeMap<Leg, Leg>,
}

impl StableGraph {
    /// Stabilizes the graph in place.
    ///
    /// Genus-0 vertices of degree 1 are removed together with their edge.
    /// Genus-0 vertices of degree 2 are removed and their two edges fused
    /// into one; if one of the legs is a marking it moves to the neighbouring
    /// vertex in place of the half-edge it was joined to. Isolated genus-0
    /// vertices without legs are left alone.
    ///
    /// On error the graph is left unchanged.
    pub fn stabilize(&mut self) -> Result<Stabilization, GraphError> {
        let mut gr = self.clone();
        let data = gr.stabilize_steps()?;
        *self = gr;
        Ok(data)
    }

    fn stabilize_steps(&mut self) -> Result<Stabilization, GraphError> {
        let markings: HashSet<Leg> = self.list_markings().into_iter().collect();
        let mut vertex_images: Vec<usize> = (0..self.num_verts()).collect();
        let mut marking_map = BTreeMap::new();
        let mut halfedge_map: BTreeMap<Leg, Leg> = BTreeMap::new();

        let mut stable = false;
        while !stable {
            stable = true;
            let mut count = 0;
            while count < self.num_verts() {
                if self.genera[count] != 0 || !matches!(self.legs[count].len(), 1 | 2) {
                    count += 1;
                    continue;
                }
                stable = false;

                if self.legs[count].len() == 1 {
                    let e0 = self.legs[count][0];
                    if markings.contains(&e0) {
                        return Err(cannot_stabilize(count));
                    }
                    let e1 = self.opposite(e0);
                    let v1 = self.vertex_of(e1).ok_or_else(|| cannot_stabilize(count))?;
                    self.genera.remove(count);
                    vertex_images.remove(count);
                    self.legs[v1].retain(|&l| l != e1);
                    self.legs.remove(count);
                    self.remove_edge(e0, e1);
                    continue;
                }

                let (mut e0, mut e1) = (self.legs[count][0], self.legs[count][1]);
                if markings.contains(&e1) {
                    std::mem::swap(&mut e0, &mut e1);
                }
                if markings.contains(&e1) || self.opposite(e1) == e0 {
                    return Err(cannot_stabilize(count));
                }
                let e1_far = self.opposite(e1);
                let v1 = self.vertex_of(e1_far).ok_or_else(|| cannot_stabilize(count))?;
                self.genera.remove(count);
                vertex_images.remove(count);

                if markings.contains(&e0) {
                    marking_map.insert(e0, e1_far);
                    self.legs[v1].retain(|&l| l != e1_far);
                    self.legs[v1].push(e0);
                    self.legs.remove(count);
                    self.remove_edge(e1, e1_far);
                } else {
                    let e0_far = self.opposite(e0);
                    self.legs.remove(count);
                    self.remove_edge(e0, e0_far);
                    self.remove_edge(e1, e1_far);
                    self.edges.push((e0_far, e1_far));
                    halfedge_map.insert(e0, e1_far);
                    halfedge_map.insert(e1, e0_far);
                    for image in halfedge_map.values_mut() {
                        if *image == e0 {
                            *image = e1_far;
                        } else if *image == e1 {
                            *image = e0_far;
                        }
                    }
                }
            }
        }

        Ok(Stabilization {
            vertex_map: vertex_images.into_iter().enumerate().collect(),
            marking_map,
            halfedge_map,
        })
    }

    fn remove_edge(&mut self, a: Leg, b: Leg) {
        self.edges.retain(|&e| e != (a, b) && e != (b, a));
    }
}

fn cannot_stabilize(v: usize) -> GraphError {
    GraphError::InvalidGraph {
        reason: format!("vertex {v} cannot be stabilized"),
    }
}
