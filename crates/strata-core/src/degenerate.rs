//! One-edge degenerations of a stable graph.
//!
//! A degeneration at a vertex either adds a self-loop and lowers the genus
//! (non-separating) or splits the vertex into two vertices joined by a new
//! edge (separating). The new edge is always labelled with two fresh legs
//! above every existing label and appended to the edge list, so the
//! half-edges of the parent are a prefix of the half-edges of the result.

use crate::error::GraphError;
use crate::graph::StableGraph;
use crate::id::Leg;

impl StableGraph {
    /// Adds a self-loop at `v` and lowers its genus by one.
    pub fn degenerate_nonsep(&mut self, v: usize) -> Result<(Leg, Leg), GraphError> {
        self.check_vertex(v)?;
        if self.genera[v] == 0 {
            return Err(GraphError::InvalidGraph {
                reason: format!("vertex {v} has genus 0 and cannot carry a new loop"),
            });
        }
        Ok(self.add_loop(v))
    }

    /// Splits `v` into a vertex of genus `g1` keeping the legs `side` and a
    /// new last vertex of genus `g(v) - g1` with the remaining legs.
    ///
    /// The first leg of the new edge sits on `v`, the second on the new
    /// vertex.
    pub fn degenerate_sep(&mut self, v: usize, g1: u32, side: &[Leg]) -> Result<(Leg, Leg), GraphError> {
        self.check_vertex(v)?;
        let g = self.genera[v];
        if g1 > g {
            return Err(GraphError::InvalidGraph {
                reason: format!("cannot split genus {g1} off a vertex of genus {g}"),
            });
        }
        if let Some(l) = side.iter().find(|l| !self.legs[v].contains(l)) {
            return Err(GraphError::InvalidGraph {
                reason: format!("leg {l} is not attached to vertex {v}"),
            });
        }

        Ok(self.split_vertex(v, g1, side))
    }

    /// Every stable one-edge degeneration at vertex `v`.
    ///
    /// The non-separating degeneration (if `g(v) > 0`) comes first, followed
    /// by the separating ones ordered by `g1` and then by leg subset. Splits
    /// with an unstable side are skipped. When both sides have the same
    /// genus only the split keeping the first leg of `v` on the old vertex is
    /// produced.
    pub fn degenerations(&self, v: usize) -> Result<Vec<StableGraph>, GraphError> {
        self.check_vertex(v)?;
        Ok(self.degenerations_at(v))
    }

    /// Degenerations at every vertex, vertex by vertex.
    pub fn all_degenerations(&self) -> Vec<StableGraph> {
        (0..self.num_verts())
            .flat_map(|v| self.degenerations_at(v))
            .collect()
    }

    fn degenerations_at(&self, v: usize) -> Vec<StableGraph> {
        let g = self.genera[v];
        let legs = &self.legs[v];
        let l = legs.len();
        let mut results = Vec::new();

        if g > 0 {
            let mut gr = self.clone();
            gr.add_loop(v);
            results.push(gr);
        }

        for g1 in 0..=g / 2 {
            for chosen in LegSubsets::new(l) {
                let side: Vec<Leg> = legs
                    .iter()
                    .zip(&chosen)
                    .filter(|&(_, &keep)| keep)
                    .map(|(&leg, _)| leg)
                    .collect();
                let m = side.len();
                let first_on_new_vertex = l > 0 && !chosen[0];
                if (g1 == 0 && m < 2) || (g == g1 && l - m < 2) || (2 * g1 == g && first_on_new_vertex) {
                    continue;
                }
                let mut gr = self.clone();
                gr.split_vertex(v, g1, &side);
                results.push(gr);
            }
        }
        results
    }

    fn add_loop(&mut self, v: usize) -> (Leg, Leg) {
        let e = self.new_edge_legs();
        self.genera[v] -= 1;
        self.legs[v].extend([e.0, e.1]);
        self.edges.push(e);
        e
    }

    fn split_vertex(&mut self, v: usize, g1: u32, side: &[Leg]) -> (Leg, Leg) {
        let e = self.new_edge_legs();
        let g = self.genera[v];
        let old_legs = std::mem::take(&mut self.legs[v]);
        let (mut kept, mut moved): (Vec<Leg>, Vec<Leg>) =
            old_legs.into_iter().partition(|l| side.contains(l));
        kept.push(e.0);
        moved.push(e.1);

        self.genera[v] = g1;
        self.legs[v] = kept;
        self.genera.push(g - g1);
        self.legs.push(moved);
        self.edges.push(e);
        e
    }
}

/// Subsets of `len` legs as membership flags, in binary counting order with
/// the first leg as the lowest bit. Works for any number of legs.
struct LegSubsets {
    next: Option<Vec<bool>>,
}

impl LegSubsets {
    fn new(len: usize) -> Self {
        LegSubsets {
            next: Some(vec![false; len]),
        }
    }
}

impl Iterator for LegSubsets {
    type Item = Vec<bool>;

    fn next(&mut self) -> Option<Vec<bool>> {
        let current = self.next.take()?;
        let mut successor = current.clone();
        // Clear the trailing run of set flags and set the one after it.
        if let Some(i) = successor.iter().position(|&keep| !keep) {
            successor[..i].fill(false);
            successor[i] = true;
            self.next = Some(successor);
        }
        Some(current)
    }
}
