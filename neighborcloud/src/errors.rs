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

//! The errors that can occur when point data or neighbor lists are loading or validating

use std::error::Error;
use std::fmt;

///
pub type NeighborCloudResult<T> = Result<T, NeighborCloudError>;

/// Error type for the data layer. All of these are caught at construction time, the query
/// paths assume validated data.
#[derive(Debug)]
pub enum NeighborCloudError {
    /// The index and distance arrays disagree on how many entries there are
    MismatchedLengths {
        /// Length of the index array
        indexes: usize,
        /// Length of the distance array
        distances: usize,
    },
    /// A row of distances wasn't in ascending order
    NotSorted,
    /// A distance was NaN or infinite
    NonFiniteDistance {
        /// Row of the offending distance
        row: usize,
    },
    /// An observation listed itself as a neighbor
    SelfNeighbor {
        /// Row of the offending entry
        row: usize,
    },
    /// A neighbor index referenced an observation that doesn't exist
    IndexOutOfBounds {
        /// Row of the offending entry
        row: usize,
        /// The out of range index
        index: usize,
    },
    /// More neighbors were requested than there are other observations
    InsufficientNeighbors {
        /// The requested neighbor count
        requested: usize,
        /// How many observations the cloud has
        available: usize,
    },
    /// The flat data buffer isn't a whole number of points
    BadShape {
        /// Length of the buffer
        len: usize,
        /// The claimed dimension
        dim: usize,
    },
}

impl fmt::Display for NeighborCloudError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NeighborCloudError::MismatchedLengths { indexes, distances } => write!(
                f,
                "the index array has {} entries but the distance array has {}",
                indexes, distances
            ),
            NeighborCloudError::NotSorted => write!(f, "Passed data that wasn't sorted"),
            NeighborCloudError::NonFiniteDistance { row } => {
                write!(f, "row {} contains a NaN or infinite distance", row)
            }
            NeighborCloudError::SelfNeighbor { row } => {
                write!(f, "row {} lists itself as a neighbor", row)
            }
            NeighborCloudError::IndexOutOfBounds { row, index } => {
                write!(f, "row {} references unknown observation {}", row, index)
            }
            NeighborCloudError::InsufficientNeighbors {
                requested,
                available,
            } => write!(
                f,
                "requested {} neighbors from a cloud of {} observations",
                requested, available
            ),
            NeighborCloudError::BadShape { len, dim } => write!(
                f,
                "a buffer of length {} is not a whole number of points at dimension {}",
                len, dim
            ),
        }
    }
}

impl Error for NeighborCloudError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
