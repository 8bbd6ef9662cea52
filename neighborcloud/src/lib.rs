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

#![allow(dead_code)]
#![deny(warnings)]

//! # Neighborcloud
//! The data access layer for the starling embedder. It owns the dense point data, the
//! distance metrics, and the exact k-NN machinery that produces the neighbor lists the
//! embedder calibrates against.
//!
//! Everything an embedding run consumes flows through a [`NeighborList`]: per observation,
//! K neighbor indexes and K ascending distances. You can build one yourself from an
//! external ANN index and hand it to `from_parts` (which validates it), or let the
//! [`VpTree`] here compute exact neighbors for you.

pub mod errors;
pub use errors::{NeighborCloudError, NeighborCloudResult};

mod cloud;
mod metrics;
mod neighbors;
mod vptree;

pub use cloud::DenseCloud;
pub use metrics::{sq_l2_dense, L2, Metric};
pub use neighbors::NeighborList;
pub use vptree::VpTree;

/// To keep the dimensions straight
pub type PointIndex = usize;
