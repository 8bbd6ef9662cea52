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

//! # Starling
//! A Barnes-Hut accelerated t-SNE. Feed it k-nearest-neighbor lists for N observations
//! and it drives an N x d point cloud (d is 2 unless you say otherwise) whose local
//! neighborhoods mirror the input's, by gradient descent on the KL divergence between
//! the input and output similarity distributions.
//!
//! ## Parameter Guide
//! Perplexity is the effective neighborhood size and the one knob most worth touching.
//! When you initialize from a neighbor list it is read off the list as K/3; when you
//! initialize from raw points it decides how many neighbors get searched. Expect values
//! between 5 and 50, larger preserves more global structure at the price of mushier
//! clusters.
//!
//! Theta trades repulsion accuracy for speed. 0.5 is the conventional default; 0 makes
//! every repulsive interaction exact and quadratic, which you only want for testing.
//!
//! The schedule parameters (early exaggeration, the momentum switch, the learning rate)
//! rarely need attention. If the embedding collapses into one blob raise the learning
//! rate; if it shatters early lengthen the exaggeration phase.
//!
//! The iteration loop is synchronous. [`TsneStatus::step`] advances one iteration, so a
//! caller that wants to cancel, checkpoint, or animate can do so between iterations.

pub mod errors;
pub use errors::{StarlingError, StarlingResult};

pub mod parallel;
pub use parallel::{ParallelFor, RayonPool, Sequential, WorkerPool};

mod affinity;
pub use affinity::{Affinities, CalibrationMode};

mod sptree;
pub use sptree::SpTree;

mod engine;
pub use engine::{TsneBuilder, TsneParameters, TsneStatus};

mod interpolate;

pub mod utils;

pub use neighborcloud::NeighborList;
