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

//! Distance metrics over dense `f64` points.

use num_traits::Float;

/// The trait that the k-NN structures are generic over. Implementations are zero sized
/// markers, the distance functions are static.
pub trait Metric: Send + Sync + 'static {
    /// The distance between two points.
    fn dist(x: &[f64], y: &[f64]) -> f64;
    /// The squared distance, for when the caller only needs an ordering.
    fn sq_dist(x: &[f64], y: &[f64]) -> f64;
}

/// L2 norm, the usual choice.
#[derive(Debug)]
pub struct L2 {}

impl Metric for L2 {
    fn dist(x: &[f64], y: &[f64]) -> f64 {
        sq_l2_dense(x, y).sqrt()
    }
    fn sq_dist(x: &[f64], y: &[f64]) -> f64 {
        sq_l2_dense(x, y)
    }
}

/// Squared euclidean distance between dense slices of equal length.
#[inline]
pub fn sq_l2_dense<F: Float>(x: &[F], y: &[F]) -> F {
    x.iter()
        .zip(y)
        .map(|(xi, yi)| (*xi - *yi) * (*xi - *yi))
        .fold(F::zero(), |acc, v| acc + v)
}
