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

//! Small helpers for setting up and normalizing embeddings.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// The conventional starting embedding: N x `dim` gaussian noise with standard
/// deviation 1e-4, so the exaggeration phase decides the layout rather than the
/// initialization.
///
/// Pass a seed for a reproducible start, `None` to draw from the host entropy.
pub fn random_embedding(n: usize, dim: usize, rng_seed: Option<u64>) -> Vec<f64> {
    let mut rng = match rng_seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    StandardNormal
        .sample_iter(&mut rng)
        .take(n * dim)
        .map(|v: f64| v * 1e-4)
        .collect()
}

/// Subtracts the per-dimension mean, restoring the zero-mean invariant the gradient
/// engine maintains at every iteration boundary.
pub fn recenter(y: &mut [f64], dim: usize) {
    let n = y.len() / dim;
    if n == 0 {
        return;
    }
    for d in 0..dim {
        let mut mean = 0.0;
        for p in y.chunks(dim) {
            mean += p[d];
        }
        mean /= n as f64;
        for p in y.chunks_mut(dim) {
            p[d] -= mean;
        }
    }
}

/// `sign(0)` is 0, so a zero gradient always lands in the same branch of the gains
/// update regardless of the velocity's direction.
pub(crate) fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
