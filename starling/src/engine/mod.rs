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

//! # The Gradient Engine
//! Builder, parameters and the iteration state. Configure a [`TsneBuilder`], hand it a
//! neighbor list (or raw points), and drive the [`TsneStatus`] it returns.

mod builder;
mod status;

pub use builder::TsneBuilder;
pub use status::TsneStatus;

use crate::affinity::CalibrationMode;
use serde::{Deserialize, Serialize};

/// Container for the parameters governing an embedding run. Frozen at `initialize`
/// and shared by the status; the setters live on [`TsneBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsneParameters {
    /// Effective neighborhood size. Read off the neighbor list as K/3 when one is
    /// supplied directly; on the dense path it decides how many neighbors get searched.
    pub perplexity: f64,
    /// Barnes-Hut accuracy. Smaller is more exact and slower; 0 makes every repulsive
    /// interaction pairwise.
    pub theta: f64,
    /// Total gradient iterations a `run` drives to.
    pub max_iter: usize,
    /// The early exaggeration phase ends at this iteration.
    pub stop_lying_iter: usize,
    /// The momentum steps up at this iteration.
    pub mom_switch_iter: usize,
    /// Momentum before the switch.
    pub start_momentum: f64,
    /// Momentum after the switch.
    pub final_momentum: f64,
    /// Learning rate.
    pub eta: f64,
    /// How much the attractive forces are inflated during the exaggeration phase.
    pub exaggeration_factor: f64,
    /// No partition tree path grows deeper than this; coincident and near-coincident
    /// points pool in the leaves at the bound.
    pub max_depth: usize,
    /// Output dimensions. 2 unless you have a reason.
    pub out_dim: usize,
    /// Interval count per axis for the grid interpolator, `None` to walk the tree for
    /// every point. Only available at `out_dim` 2.
    pub interpolation: Option<usize>,
    /// How the perplexity search moves.
    pub calibration: CalibrationMode,
    /// Seed for everything random in the run (the internal neighbor search). `None`
    /// draws from the host entropy.
    pub rng_seed: Option<u64>,
    /// 0 is silent, above 1 draws a progress bar during `run`.
    pub verbosity: u32,
}

impl Default for TsneParameters {
    fn default() -> TsneParameters {
        TsneParameters {
            perplexity: 30.0,
            theta: 0.5,
            max_iter: 1000,
            stop_lying_iter: 250,
            mom_switch_iter: 250,
            start_momentum: 0.5,
            final_momentum: 0.8,
            eta: 200.0,
            exaggeration_factor: 12.0,
            max_depth: 7,
            out_dim: 2,
            interpolation: None,
            calibration: CalibrationMode::Hybrid,
            rng_seed: None,
            verbosity: 0,
        }
    }
}
