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

//! The errors an embedding run can surface. They all come up at the `initialize` or
//! `run` boundary; once an iteration is underway every operation is total.
//!
//! A perplexity search that hits its step cap is deliberately not here: it keeps the
//! last bandwidth and logs a warning, because one pathological row must not take down
//! a batch.

use neighborcloud::NeighborCloudError;
use std::error::Error;
use std::fmt;

/// Helper type for a call that could go wrong.
pub type StarlingResult<T> = Result<T, StarlingError>;

/// Error type for the embedder. Input validation problems are floated up from
/// `neighborcloud`, as that's the layer that owns the data contract.
#[derive(Debug)]
pub enum StarlingError {
    /// The data layer rejected the input
    NeighborCloud(NeighborCloudError),
    /// Each observation lists at least as many neighbors as there are observations
    InsufficientObservations {
        /// Neighbors per observation
        neighbors: usize,
        /// Total observations
        observations: usize,
    },
    /// The grid interpolator only supports two dimensional embeddings
    UnsupportedDimension(usize),
    /// The embedding buffer handed to `run` doesn't hold N x d coordinates
    BadEmbeddingLength {
        /// What the status was initialized for
        expected: usize,
        /// What the caller passed
        found: usize,
    },
}

impl fmt::Display for StarlingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StarlingError::NeighborCloud(ref e) => write!(f, "{}", e),
            StarlingError::InsufficientObservations {
                neighbors,
                observations,
            } => write!(
                f,
                "{} neighbors per row needs more than {} observations",
                neighbors, observations
            ),
            StarlingError::UnsupportedDimension(dim) => write!(
                f,
                "the grid interpolator only handles 2 output dimensions, not {}",
                dim
            ),
            StarlingError::BadEmbeddingLength { expected, found } => write!(
                f,
                "the embedding buffer holds {} values, this status needs {}",
                found, expected
            ),
        }
    }
}

impl Error for StarlingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            StarlingError::NeighborCloud(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<NeighborCloudError> for StarlingError {
    fn from(err: NeighborCloudError) -> Self {
        StarlingError::NeighborCloud(err)
    }
}
