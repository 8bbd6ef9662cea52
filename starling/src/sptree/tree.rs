/*
* Licensed to Elasticsearch B.V. under one or more contributor
* license agreements. See the NOTICE file distributed with
* this work for additional information regarding copyright
* ownership. Elasticsearch B.V. licenses this file to you under
* the Apache License, Version 2.0 (the "License"); you may
* not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

//! # The tree proper
//! Construction is sequential point insertion with mass accumulated on the descent
//! path, so the center-of-mass summaries are ready the moment the last point lands.
//! A leaf below the depth bound holds exactly one point; a second arrival demotes it
//! to an internal node and pushes the incumbent one level down. Leaves at the depth
//! bound accumulate however many points fall in them, which is what keeps coincident
//! points from recursing forever.
//!
//! The arena is cleared, never deallocated, between iterations; after the first few
//! iterations construction settles into zero fresh allocation.

use super::node::SpTreeNode;
use smallvec::{smallvec, SmallVec};

/// Boundary points are pushed strictly inside by this much.
const BOUNDS_PAD: f64 = 1e-5;

/// A 2^d tree over an embedding, with Barnes-Hut repulsion queries.
#[derive(Debug)]
pub struct SpTree {
    dim: usize,
    max_depth: usize,
    nodes: Vec<SpTreeNode>,
    locations: Vec<u32>,
}

impl SpTree {
    /// An empty tree. `build` gives it content; queries before the first build see no
    /// mass anywhere.
    pub fn new(dim: usize, max_depth: usize) -> SpTree {
        SpTree {
            dim,
            max_depth,
            nodes: Vec::new(),
            locations: Vec::new(),
        }
    }

    /// Rebuilds over the current embedding, reusing the arena.
    pub fn build(&mut self, y: &[f64]) {
        let dim = self.dim;
        let n = y.len() / dim;
        self.nodes.clear();
        self.locations.clear();
        self.locations.resize(n, 0);
        if n == 0 {
            return;
        }
        let mut mins: SmallVec<[f64; 2]> = SmallVec::from_slice(&y[..dim]);
        let mut maxs = mins.clone();
        for point in y.chunks(dim) {
            for d in 0..dim {
                mins[d] = mins[d].min(point[d]);
                maxs[d] = maxs[d].max(point[d]);
            }
        }
        let mut midpoint: SmallVec<[f64; 2]> = SmallVec::with_capacity(dim);
        let mut halfwidth: SmallVec<[f64; 2]> = SmallVec::with_capacity(dim);
        for d in 0..dim {
            midpoint.push((mins[d] + maxs[d]) / 2.0);
            halfwidth.push((maxs[d] - mins[d]) / 2.0 + BOUNDS_PAD);
        }
        self.nodes.push(SpTreeNode::new_leaf(midpoint, halfwidth));
        for pn in 0..n {
            self.insert(pn, y);
        }
    }

    fn insert(&mut self, pn: usize, y: &[f64]) {
        let dim = self.dim;
        let point = &y[pn * dim..(pn + 1) * dim];
        let mut cur = 0usize;
        let mut depth = 0usize;
        loop {
            if self.nodes[cur].is_leaf {
                if self.nodes[cur].number == 0 {
                    let node = &mut self.nodes[cur];
                    node.number = 1;
                    node.occupant = pn as u32;
                    node.center_of_mass.clear();
                    node.center_of_mass.extend_from_slice(point);
                    self.locations[pn] = cur as u32;
                    return;
                }
                if depth >= self.max_depth {
                    // depth capped leaves pool their points
                    let node = &mut self.nodes[cur];
                    node.number += 1;
                    let weight = node.number as f64;
                    for d in 0..dim {
                        node.center_of_mass[d] += (point[d] - node.center_of_mass[d]) / weight;
                    }
                    self.locations[pn] = cur as u32;
                    return;
                }
                // demote: the incumbent moves one level down, then we fall through and
                // descend with the new point
                let occupant = self.nodes[cur].occupant as usize;
                self.nodes[cur].is_leaf = false;
                self.nodes[cur].children = smallvec![0u32; 1 << dim];
                let occupant_point = &y[occupant * dim..(occupant + 1) * dim];
                let slot = self.nodes[cur].child_slot(occupant_point);
                let child = self.alloc_child(cur, slot);
                let child_node = &mut self.nodes[child];
                child_node.number = 1;
                child_node.occupant = occupant as u32;
                child_node.center_of_mass.clear();
                child_node.center_of_mass.extend_from_slice(occupant_point);
                self.nodes[cur].children[slot] = child as u32;
                self.locations[occupant] = child as u32;
            } else {
                // accumulate mass on the way down; the root summary is never consulted
                let node = &mut self.nodes[cur];
                node.number += 1;
                if cur != 0 {
                    let weight = node.number as f64;
                    for d in 0..dim {
                        node.center_of_mass[d] += (point[d] - node.center_of_mass[d]) / weight;
                    }
                }
                let slot = self.nodes[cur].child_slot(point);
                let mut child = self.nodes[cur].children[slot] as usize;
                if child == 0 {
                    child = self.alloc_child(cur, slot);
                    self.nodes[cur].children[slot] = child as u32;
                }
                cur = child;
                depth += 1;
            }
        }
    }

    fn alloc_child(&mut self, parent: usize, slot: usize) -> usize {
        let dim = self.dim;
        let mut midpoint: SmallVec<[f64; 2]> = SmallVec::with_capacity(dim);
        let mut halfwidth: SmallVec<[f64; 2]> = SmallVec::with_capacity(dim);
        for d in 0..dim {
            let half = self.nodes[parent].halfwidth[d] / 2.0;
            let offset = if slot >> d & 1 == 1 { half } else { -half };
            midpoint.push(self.nodes[parent].midpoint[d] + offset);
            halfwidth.push(half);
        }
        self.nodes.push(SpTreeNode::new_leaf(midpoint, halfwidth));
        self.nodes.len() - 1
    }

    /// Barnes-Hut repulsion at `target`. Fills `neg_f` with the d force components and
    /// returns the target's contribution to the Q normalizer.
    ///
    /// `skip` names the point being evaluated so the leaf holding it excludes it from
    /// its own summary; pass `None` for locations that aren't data points (the grid
    /// interpolator's waypoints).
    pub fn negative_forces(
        &self,
        target: &[f64],
        skip: Option<usize>,
        theta: f64,
        neg_f: &mut [f64],
    ) -> f64 {
        for v in neg_f.iter_mut() {
            *v = 0.0;
        }
        if self.nodes.is_empty() {
            return 0.0;
        }
        let skip_leaf = skip.map(|pn| self.locations[pn]).unwrap_or(u32::MAX);
        let mut q_sum = 0.0;
        // the root is a frame, not a summary
        for slot in 0..self.nodes[0].children.len() {
            let child = self.nodes[0].children[slot];
            if child != 0 {
                self.accumulate(child, target, skip_leaf, theta, neg_f, &mut q_sum);
            }
        }
        q_sum
    }

    fn accumulate(
        &self,
        id: u32,
        target: &[f64],
        skip_leaf: u32,
        theta: f64,
        neg_f: &mut [f64],
        q_sum: &mut f64,
    ) {
        let node = &self.nodes[id as usize];
        let mut mass = node.number as f64;
        let excluding_self = id == skip_leaf;
        if excluding_self {
            if node.number <= 1 {
                return;
            }
            mass -= 1.0;
        }
        let mut delta: SmallVec<[f64; 4]> = SmallVec::with_capacity(self.dim);
        let mut r2 = 0.0;
        for d in 0..self.dim {
            let mut com = node.center_of_mass[d];
            if excluding_self {
                com = (com * node.number as f64 - target[d]) / mass;
            }
            let v = target[d] - com;
            delta.push(v);
            r2 += v * v;
        }
        let side = node.longest_side();
        // summarize when leaf, or when w / sqrt(r2) < theta
        if node.is_leaf || side * side < theta * theta * r2 {
            let q = 1.0 / (1.0 + r2);
            *q_sum += q * mass;
            let f = q * q * mass;
            for d in 0..self.dim {
                neg_f[d] += f * delta[d];
            }
        } else {
            for slot in 0..node.children.len() {
                let child = node.children[slot];
                if child != 0 {
                    self.accumulate(child, target, skip_leaf, theta, neg_f, q_sum);
                }
            }
        }
    }

    /// The arena index of the leaf holding point `n`. Valid after a build.
    pub fn location(&self, n: usize) -> usize {
        self.locations[n] as usize
    }

    /// How many cells the last build produced.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn nodes(&self) -> &[SpTreeNode] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, dim: usize, seed: u64) -> Vec<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen::<f64>() * 10.0 - 5.0).collect()
    }

    /// The O(N^2) oracle for property (5).
    fn brute_forces(y: &[f64], dim: usize, pn: usize) -> (Vec<f64>, f64) {
        let n = y.len() / dim;
        let mut neg_f = vec![0.0; dim];
        let mut q_sum = 0.0;
        for j in 0..n {
            if j == pn {
                continue;
            }
            let mut r2 = 0.0;
            for d in 0..dim {
                let v = y[pn * dim + d] - y[j * dim + d];
                r2 += v * v;
            }
            let q = 1.0 / (1.0 + r2);
            q_sum += q;
            for d in 0..dim {
                neg_f[d] += q * q * (y[pn * dim + d] - y[j * dim + d]);
            }
        }
        (neg_f, q_sum)
    }

    fn check_structure(tree: &SpTree, y: &[f64], dim: usize) {
        let n = y.len() / dim;
        let nodes = tree.nodes();
        // child numbers sum to the parent's, children sit in their slot's orthant
        for (id, node) in nodes.iter().enumerate() {
            if node.is_leaf {
                continue;
            }
            let mut child_total = 0;
            for (slot, &child) in node.children.iter().enumerate() {
                if child == 0 {
                    continue;
                }
                let child_node = &nodes[child as usize];
                child_total += child_node.number;
                for d in 0..dim {
                    let above = slot >> d & 1 == 1;
                    if above {
                        assert!(child_node.midpoint[d] > node.midpoint[d]);
                    } else {
                        assert!(child_node.midpoint[d] < node.midpoint[d]);
                    }
                    assert_approx_eq::assert_approx_eq!(
                        child_node.halfwidth[d],
                        node.halfwidth[d] / 2.0,
                        1e-12
                    );
                }
            }
            assert_eq!(
                child_total, node.number,
                "node {} covers {} but its children cover {}",
                id, node.number, child_total
            );
        }
        // every point's recorded leaf actually covers it, and the leaves cover N total
        let leaf_total: usize = nodes
            .iter()
            .filter(|node| node.is_leaf)
            .map(|node| node.number)
            .sum();
        assert_eq!(leaf_total, n);
        for pn in 0..n {
            let leaf = &nodes[tree.location(pn)];
            assert!(leaf.is_leaf);
            for d in 0..dim {
                let lo = leaf.midpoint[d] - leaf.halfwidth[d];
                let hi = leaf.midpoint[d] + leaf.halfwidth[d];
                assert!(y[pn * dim + d] >= lo && y[pn * dim + d] <= hi);
            }
        }
    }

    fn check_depth(tree: &SpTree, max_depth: usize) {
        let nodes = tree.nodes();
        let mut stack = vec![(0u32, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            assert!(depth <= max_depth, "node {} sits at depth {}", id, depth);
            let node = &nodes[id as usize];
            for &child in node.children.iter() {
                if child != 0 {
                    stack.push((child, depth + 1));
                }
            }
        }
    }

    #[test]
    fn structural_invariants_hold() {
        let y = random_points(300, 2, 4);
        let mut tree = SpTree::new(2, 7);
        tree.build(&y);
        check_structure(&tree, &y, 2);
        check_depth(&tree, 7);
    }

    #[test]
    fn structural_invariants_hold_in_3d() {
        let y = random_points(200, 3, 8);
        let mut tree = SpTree::new(3, 7);
        tree.build(&y);
        check_structure(&tree, &y, 3);
        check_depth(&tree, 7);
    }

    #[test]
    fn coincident_points_pool_at_the_depth_cap() {
        let mut y = random_points(20, 2, 15);
        // three exact duplicates
        let dup = [y[0], y[1]];
        y.extend_from_slice(&dup);
        y.extend_from_slice(&dup);
        let mut tree = SpTree::new(2, 5);
        tree.build(&y);
        check_structure(&tree, &y, 2);
        check_depth(&tree, 5);
        assert_eq!(tree.location(0), tree.location(20));
        assert_eq!(tree.location(0), tree.location(21));
    }

    #[test]
    fn exact_mode_matches_brute_force() {
        // property (5): theta = 0 with singleton leaves is the pairwise computation
        let y = random_points(100, 2, 33);
        let mut tree = SpTree::new(2, 20);
        tree.build(&y);
        let mut neg_f = vec![0.0; 2];
        for pn in (0..100).step_by(5) {
            let q_tree =
                tree.negative_forces(&y[pn * 2..pn * 2 + 2], Some(pn), 0.0, &mut neg_f);
            let (brute_f, brute_q) = brute_forces(&y, 2, pn);
            assert!(
                (q_tree - brute_q).abs() <= 1e-6 * brute_q.abs() + 1e-12,
                "point {}: q {} vs {}",
                pn,
                q_tree,
                brute_q
            );
            for d in 0..2 {
                let tolerance = 1e-6 * brute_f[d].abs() + 1e-12;
                assert!(
                    (neg_f[d] - brute_f[d]).abs() <= tolerance,
                    "point {} dim {}: {} vs {}",
                    pn,
                    d,
                    neg_f[d],
                    brute_f[d]
                );
            }
        }
    }

    #[test]
    fn approximate_mode_stays_close() {
        let y = random_points(400, 2, 77);
        let mut tree = SpTree::new(2, 7);
        tree.build(&y);
        let mut neg_f = vec![0.0; 2];
        let mut worst = 0.0f64;
        for pn in 0..400 {
            let q_tree =
                tree.negative_forces(&y[pn * 2..pn * 2 + 2], Some(pn), 0.5, &mut neg_f);
            let (_, brute_q) = brute_forces(&y, 2, pn);
            worst = worst.max((q_tree - brute_q).abs() / brute_q);
        }
        // theta 0.5 is approximate, just not wildly so
        assert!(worst < 0.05, "worst relative q error {}", worst);
    }

    #[test]
    fn rebuild_reuses_the_arena() {
        let y = random_points(150, 2, 3);
        let mut tree = SpTree::new(2, 7);
        tree.build(&y);
        let first = tree.node_count();
        tree.build(&y);
        assert_eq!(tree.node_count(), first);
        check_structure(&tree, &y, 2);
    }
}
