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

//! # The Vantage Point Tree
//! The default neighbor provider. It computes exact k nearest neighbors, which is what
//! you want when the embedder's input quality matters more than index build time. The
//! nodes live in a flat arena and reference each other by index, so the tree is a single
//! allocation and the queries never chase owning pointers.

use crate::cloud::DenseCloud;
use crate::errors::{NeighborCloudError, NeighborCloudResult};
use crate::metrics::Metric;
use crate::neighbors::NeighborList;
use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use smallvec::{smallvec, SmallVec};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

/// Empty child slot.
const NONE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct VpNode {
    point: u32,
    threshold: f64,
    inside: u32,
    outside: u32,
}

/// An exact k-NN index over a [`DenseCloud`], generic over the metric.
///
/// Vantage points are drawn from a `SmallRng`; pass a seed for reproducible trees, `None`
/// to draw from the host entropy.
pub struct VpTree<'a, M: Metric> {
    cloud: &'a DenseCloud,
    nodes: Vec<VpNode>,
    root: u32,
    metric: PhantomData<M>,
}

impl<'a, M: Metric> VpTree<'a, M> {
    /// Builds the tree. Linearithmic expected time, one node per observation.
    pub fn build(cloud: &'a DenseCloud, rng_seed: Option<u64>) -> VpTree<'a, M> {
        let mut rng = match rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let mut items: Vec<u32> = (0..cloud.len() as u32).collect();
        let mut nodes = Vec::with_capacity(cloud.len());
        let root = Self::split(cloud, &mut items[..], &mut nodes, &mut rng);
        debug!("built a vp-tree over {} observations", cloud.len());
        VpTree {
            cloud,
            nodes,
            root,
            metric: PhantomData,
        }
    }

    fn split(
        cloud: &DenseCloud,
        items: &mut [u32],
        nodes: &mut Vec<VpNode>,
        rng: &mut SmallRng,
    ) -> u32 {
        if items.is_empty() {
            return NONE;
        }
        let pick = rng.gen_range(0..items.len());
        items.swap(0, pick);
        let vantage = items[0];
        let id = nodes.len() as u32;
        nodes.push(VpNode {
            point: vantage,
            threshold: 0.0,
            inside: NONE,
            outside: NONE,
        });
        let rest = &mut items[1..];
        if !rest.is_empty() {
            let vp = cloud.point(vantage as usize);
            let half = (rest.len() - 1) / 2;
            rest.select_nth_unstable_by(half, |a, b| {
                M::sq_dist(vp, cloud.point(*a as usize))
                    .partial_cmp(&M::sq_dist(vp, cloud.point(*b as usize)))
                    .unwrap()
            });
            let threshold = M::dist(vp, cloud.point(rest[half] as usize));
            // the median sits inside the ball
            let (near, far) = rest.split_at_mut(half + 1);
            let inside = Self::split(cloud, near, nodes, rng);
            let outside = Self::split(cloud, far, nodes, rng);
            let node = &mut nodes[id as usize];
            node.threshold = threshold;
            node.inside = inside;
            node.outside = outside;
        }
        id
    }

    /// The k nearest neighbors of every observation, self excluded, each row ascending
    /// by distance. Queries run in parallel across observations.
    pub fn knn(&self, k: usize) -> NeighborCloudResult<NeighborList> {
        let n = self.cloud.len();
        if k == 0 || k >= n {
            return Err(NeighborCloudError::InsufficientNeighbors {
                requested: k,
                available: n,
            });
        }
        let mut out = NeighborList::with_shape(n, k);
        let (indexes, distances) = out.buffers_mut();
        indexes
            .par_chunks_mut(k)
            .zip(distances.par_chunks_mut(k))
            .enumerate()
            .for_each(|(q, (index_row, distance_row))| {
                self.query_into(q, k, index_row, distance_row);
            });
        debug!("answered {} knn queries at k = {}", n, k);
        Ok(out)
    }

    fn query_into(&self, q: usize, k: usize, index_row: &mut [usize], distance_row: &mut [f64]) {
        let target = self.cloud.point(q);
        let mut heap: BinaryHeap<QueryItem> = BinaryHeap::with_capacity(k + 1);
        let mut tau = f64::INFINITY;
        let mut stack: SmallVec<[(u32, f64); 32]> = smallvec![(self.root, 0.0)];
        while let Some((id, lower)) = stack.pop() {
            if id == NONE || lower > tau {
                continue;
            }
            let node = &self.nodes[id as usize];
            let d = M::dist(target, self.cloud.point(node.point as usize));
            if node.point as usize != q {
                if heap.len() < k {
                    heap.push(QueryItem {
                        dist: d,
                        index: node.point,
                    });
                } else if d < tau {
                    heap.pop();
                    heap.push(QueryItem {
                        dist: d,
                        index: node.point,
                    });
                }
                if heap.len() == k {
                    tau = heap.peek().unwrap().dist;
                }
            }
            // nearer subtree on top of the stack, the farther one behind it with its
            // lower bound so a shrunken tau can prune it at pop time
            if d < node.threshold {
                stack.push((node.outside, node.threshold - d));
                stack.push((node.inside, 0.0));
            } else {
                stack.push((node.inside, d - node.threshold));
                stack.push((node.outside, 0.0));
            }
        }
        for (slot, item) in heap.into_sorted_vec().iter().enumerate() {
            index_row[slot] = item.index as usize;
            distance_row[slot] = item.dist;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct QueryItem {
    dist: f64,
    index: u32,
}

impl PartialEq for QueryItem {
    fn eq(&self, other: &QueryItem) -> bool {
        self.dist == other.dist && self.index == other.index
    }
}
impl Eq for QueryItem {}
impl PartialOrd for QueryItem {
    fn partial_cmp(&self, other: &QueryItem) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueryItem {
    fn cmp(&self, other: &QueryItem) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap()
            .then(self.index.cmp(&other.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::L2;
    use rand::distributions::Standard;

    fn random_cloud(n: usize, dim: usize, seed: u64) -> DenseCloud {
        let rng = SmallRng::seed_from_u64(seed);
        let data: Vec<f64> = rng.sample_iter(Standard).take(n * dim).collect();
        DenseCloud::new(data, dim).unwrap()
    }

    fn brute_knn(cloud: &DenseCloud, q: usize, k: usize) -> Vec<(f64, usize)> {
        let mut dists: Vec<(f64, usize)> = (0..cloud.len())
            .filter(|&j| j != q)
            .map(|j| (L2::dist(cloud.point(q), cloud.point(j)), j))
            .collect();
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
        dists.truncate(k);
        dists
    }

    #[test]
    fn agrees_with_brute_force() {
        let cloud = random_cloud(128, 3, 42);
        let tree = VpTree::<L2>::build(&cloud, Some(42));
        let nns = tree.knn(10).unwrap();
        for q in 0..cloud.len() {
            let expected = brute_knn(&cloud, q, 10);
            for (m, (ed, _ei)) in expected.iter().enumerate() {
                // indexes can differ on exact ties, distances cannot
                assert_approx_eq::assert_approx_eq!(nns.distances(q)[m], ed, 1e-12);
            }
        }
    }

    #[test]
    fn rows_are_sorted_and_self_free() {
        let cloud = random_cloud(64, 2, 7);
        let tree = VpTree::<L2>::build(&cloud, Some(7));
        let nns = tree.knn(12).unwrap();
        for q in 0..cloud.len() {
            assert!(nns.distances(q).windows(2).all(|w| w[0] <= w[1]));
            assert!(nns.indexes(q).iter().all(|&j| j != q));
        }
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let cloud = random_cloud(80, 2, 11);
        let a = VpTree::<L2>::build(&cloud, Some(3)).knn(8).unwrap();
        let b = VpTree::<L2>::build(&cloud, Some(3)).knn(8).unwrap();
        for q in 0..cloud.len() {
            assert_eq!(a.indexes(q), b.indexes(q));
            assert_eq!(a.distances(q), b.distances(q));
        }
    }

    #[test]
    fn too_many_neighbors_is_an_error() {
        let cloud = random_cloud(10, 2, 0);
        let tree = VpTree::<L2>::build(&cloud, Some(0));
        assert!(matches!(
            tree.knn(10),
            Err(NeighborCloudError::InsufficientNeighbors { .. })
        ));
    }
}
