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

//! # The Affinity Builder
//! Turns validated neighbor lists into the sparse symmetric probability matrix the
//! gradient engine pulls on. Built once per run, immutable afterwards.

mod calibration;
mod symmetrize;

pub use calibration::CalibrationMode;
pub(crate) use calibration::{calibrate_row, ENTROPY_TOLERANCE, MAX_BANDWIDTH_STEPS};

use crate::parallel::ParallelFor;
use log::{debug, warn};
use neighborcloud::{NeighborList, PointIndex};
use std::sync::Arc;

/// The sparse symmetric input distribution P. Row `n` holds `(neighbor, probability)`
/// pairs sorted by ascending neighbor index; the whole matrix sums to one and carries
/// no self edges.
#[derive(Debug, Clone)]
pub struct Affinities {
    rows: Vec<Vec<(PointIndex, f64)>>,
}

impl Affinities {
    /// Calibrates every row against `perplexity` and symmetrizes. Rows calibrate in
    /// parallel through `threading`; the symmetrization pass is sequential because it
    /// appends across rows.
    pub(crate) fn build(
        neighbors: &NeighborList,
        perplexity: f64,
        mode: CalibrationMode,
        threading: &Arc<dyn ParallelFor>,
    ) -> Affinities {
        let n = neighbors.len();
        let k = neighbors.k();
        let target_entropy = perplexity.ln();
        let mut probs = vec![0.0; n * k];
        threading.for_each(&mut probs, k, &|row, slab| {
            if !calibrate_row(neighbors.distances(row), target_entropy, mode, slab) {
                warn!(
                    "perplexity search for row {} missed {:e} after {} steps, keeping the last bandwidth",
                    row, ENTROPY_TOLERANCE, MAX_BANDWIDTH_STEPS
                );
            }
        });
        let mut rows: Vec<Vec<(PointIndex, f64)>> = Vec::with_capacity(n);
        for row in 0..n {
            let mut entries: Vec<(PointIndex, f64)> = neighbors
                .indexes(row)
                .iter()
                .cloned()
                .zip(probs[row * k..(row + 1) * k].iter().cloned())
                .collect();
            entries.sort_unstable_by_key(|(j, _)| *j);
            rows.push(entries);
        }
        symmetrize::symmetrize(&mut rows);
        debug!("built affinities for {} observations at perplexity {}", n, perplexity);
        Affinities { rows }
    }

    /// The number of observations covered.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// If this is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `n`, sorted by ascending neighbor index.
    pub fn row(&self, n: PointIndex) -> &[(PointIndex, f64)] {
        &self.rows[n]
    }

    /// The sum over the whole matrix. One, within float dust, unless something is very
    /// wrong.
    pub fn total(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| row.iter().map(|(_, p)| *p).sum::<f64>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::Sequential;
    use neighborcloud::{DenseCloud, VpTree, L2};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_affinities(n: usize, dim: usize, k: usize, seed: u64) -> Affinities {
        let mut rng = SmallRng::seed_from_u64(seed);
        let data: Vec<f64> = (0..n * dim).map(|_| rng.gen::<f64>()).collect();
        let cloud = DenseCloud::new(data, dim).unwrap();
        let nns = VpTree::<L2>::build(&cloud, Some(seed)).knn(k).unwrap();
        let threading: Arc<dyn ParallelFor> = Arc::new(Sequential {});
        Affinities::build(&nns, k as f64 / 3.0, CalibrationMode::Hybrid, &threading)
    }

    #[test]
    fn is_a_probability_distribution() {
        let affinities = random_affinities(50, 4, 30, 13);
        assert!((affinities.total() - 1.0).abs() < 1e-12);
        for n in 0..affinities.len() {
            for &(j, p) in affinities.row(n) {
                assert!(p >= 0.0);
                assert!(j != n);
            }
        }
    }

    #[test]
    fn is_symmetric() {
        let affinities = random_affinities(60, 3, 15, 99);
        for n in 0..affinities.len() {
            for &(j, p) in affinities.row(n) {
                let mirrored = affinities
                    .row(j)
                    .iter()
                    .find(|(i, _)| *i == n)
                    .map(|(_, q)| *q);
                assert_eq!(mirrored, Some(p), "row {} entry {} has no equal mirror", n, j);
            }
        }
    }

    #[test]
    fn rows_are_index_sorted() {
        let affinities = random_affinities(40, 2, 12, 5);
        for n in 0..affinities.len() {
            assert!(affinities.row(n).windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[test]
    fn per_row_entropy_matches_the_forced_perplexity() {
        // property (2): before symmetrization each row's entropy is ln(k/3)
        let mut rng = SmallRng::seed_from_u64(21);
        let data: Vec<f64> = (0..50 * 4).map(|_| rng.gen::<f64>()).collect();
        let cloud = DenseCloud::new(data, 4).unwrap();
        let nns = VpTree::<L2>::build(&cloud, Some(21)).knn(30).unwrap();
        let target = (30.0f64 / 3.0).ln();
        let mut probs = vec![0.0; 30];
        for row in 0..50 {
            assert!(calibrate_row(
                nns.distances(row),
                target,
                CalibrationMode::Hybrid,
                &mut probs
            ));
            let entropy: f64 = probs
                .iter()
                .filter(|p| **p > 0.0)
                .map(|p| -p * p.ln())
                .sum();
            assert!(
                (entropy - target).abs() < 1e-5,
                "row {} entropy {} vs target {}",
                row,
                entropy,
                target
            );
        }
    }
}
