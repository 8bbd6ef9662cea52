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

//! The validated neighbor lists the embedder consumes.

use crate::errors::{NeighborCloudError, NeighborCloudResult};
use crate::PointIndex;
use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};

/// K nearest neighbors for each of N observations, stored flat with stride K. Row `n`
/// holds the neighbor indexes and distances of observation `n`, distances ascending.
///
/// Construction through [`NeighborList::from_parts`] validates the contract the embedder
/// relies on; after that the query paths index without checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborList {
    k: usize,
    indexes: Vec<PointIndex>,
    distances: Vec<f64>,
}

impl NeighborList {
    /// Takes ownership of flat index and distance buffers with stride `k`.
    ///
    /// Checks that the buffers agree in length and shape, that every row is ascending,
    /// finite, free of self references, free of repeats, and in range.
    pub fn from_parts(
        indexes: Vec<PointIndex>,
        distances: Vec<f64>,
        k: usize,
    ) -> NeighborCloudResult<NeighborList> {
        if indexes.len() != distances.len() {
            return Err(NeighborCloudError::MismatchedLengths {
                indexes: indexes.len(),
                distances: distances.len(),
            });
        }
        if k == 0 || indexes.len() % k != 0 {
            return Err(NeighborCloudError::BadShape {
                len: indexes.len(),
                dim: k,
            });
        }
        let list = NeighborList {
            k,
            indexes,
            distances,
        };
        list.validate()?;
        Ok(list)
    }

    /// Preallocated, zeroed storage for `n` rows. Only useful to code that fills the rows
    /// in afterwards, so it stays in the crate.
    pub(crate) fn with_shape(n: usize, k: usize) -> NeighborList {
        NeighborList {
            k,
            indexes: vec![0; n * k],
            distances: vec![0.0; n * k],
        }
    }

    pub(crate) fn buffers_mut(&mut self) -> (&mut [PointIndex], &mut [f64]) {
        (&mut self.indexes[..], &mut self.distances[..])
    }

    fn validate(&self) -> NeighborCloudResult<()> {
        let n = self.len();
        let mut seen: FxHashSet<PointIndex> = FxHashSet::default();
        for row in 0..n {
            let dists = self.distances(row);
            if dists.iter().any(|d| !d.is_finite()) {
                return Err(NeighborCloudError::NonFiniteDistance { row });
            }
            if dists.windows(2).any(|w| w[0] > w[1]) {
                return Err(NeighborCloudError::NotSorted);
            }
            seen.clear();
            for &j in self.indexes(row) {
                if j == row {
                    return Err(NeighborCloudError::SelfNeighbor { row });
                }
                if j >= n || !seen.insert(j) {
                    return Err(NeighborCloudError::IndexOutOfBounds { row, index: j });
                }
            }
        }
        Ok(())
    }

    /// The number of observations covered.
    pub fn len(&self) -> usize {
        self.indexes.len() / self.k
    }

    /// If this is empty
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Neighbors per observation.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The neighbor indexes of observation `n`, nearest first.
    pub fn indexes(&self, n: PointIndex) -> &[PointIndex] {
        &self.indexes[n * self.k..(n + 1) * self.k]
    }

    /// The neighbor distances of observation `n`, ascending.
    pub fn distances(&self, n: PointIndex) -> &[f64] {
        &self.distances[n * self.k..(n + 1) * self.k]
    }
}
