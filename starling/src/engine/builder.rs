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

use super::status::TsneStatus;
use super::TsneParameters;
use crate::affinity::{Affinities, CalibrationMode};
use crate::errors::{StarlingError, StarlingResult};
use crate::parallel::{ParallelFor, Sequential};
use neighborcloud::{DenseCloud, NeighborList, VpTree, L2};
use std::fs::read_to_string;
use std::path::Path;
use std::sync::Arc;
use yaml_rust::YamlLoader;

/// A construction object for an embedding run. See [`crate::TsneParameters`]
/// for what the knobs do.
#[derive(Debug)]
pub struct TsneBuilder {
    pub(crate) perplexity: f64,
    pub(crate) theta: f64,
    pub(crate) max_iter: usize,
    pub(crate) stop_lying_iter: usize,
    pub(crate) mom_switch_iter: usize,
    pub(crate) start_momentum: f64,
    pub(crate) final_momentum: f64,
    pub(crate) eta: f64,
    pub(crate) exaggeration_factor: f64,
    pub(crate) max_depth: usize,
    pub(crate) out_dim: usize,
    pub(crate) interpolation: Option<usize>,
    pub(crate) calibration: CalibrationMode,
    pub(crate) rng_seed: Option<u64>,
    pub(crate) verbosity: u32,
    pub(crate) threading: Arc<dyn ParallelFor>,
}

impl Default for TsneBuilder {
    fn default() -> TsneBuilder {
        TsneBuilder::new()
    }
}

impl TsneBuilder {
    /// Creates a new builder with the conventional defaults.
    pub fn new() -> TsneBuilder {
        let defaults = TsneParameters::default();
        TsneBuilder {
            perplexity: defaults.perplexity,
            theta: defaults.theta,
            max_iter: defaults.max_iter,
            stop_lying_iter: defaults.stop_lying_iter,
            mom_switch_iter: defaults.mom_switch_iter,
            start_momentum: defaults.start_momentum,
            final_momentum: defaults.final_momentum,
            eta: defaults.eta,
            exaggeration_factor: defaults.exaggeration_factor,
            max_depth: defaults.max_depth,
            out_dim: defaults.out_dim,
            interpolation: defaults.interpolation,
            calibration: defaults.calibration,
            rng_seed: defaults.rng_seed,
            verbosity: defaults.verbosity,
            threading: Arc::new(Sequential {}),
        }
    }

    /// Creates a builder from a yaml config file.
    ///
    /// ```yaml
    /// ---
    /// perplexity: 30
    /// theta: 0.5
    /// max_iter: 1000
    /// calibration: hybrid
    /// rng_seed: 7
    /// ```
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Self {
        let config = read_to_string(&path).expect("Unable to read config file");
        let params_files = YamlLoader::load_from_str(&config).unwrap();
        let params = &params_files[0];
        let calibration = if "bisection" == params["calibration"].as_str().unwrap_or("hybrid") {
            CalibrationMode::Bisection
        } else {
            CalibrationMode::Hybrid
        };
        let defaults = TsneParameters::default();
        let mut builder = TsneBuilder::new();
        builder.perplexity = params["perplexity"].as_f64().unwrap_or(defaults.perplexity);
        builder.theta = params["theta"].as_f64().unwrap_or(defaults.theta);
        builder.max_iter = params["max_iter"].as_i64().unwrap_or(defaults.max_iter as i64) as usize;
        builder.stop_lying_iter = params["stop_lying_iter"]
            .as_i64()
            .unwrap_or(defaults.stop_lying_iter as i64) as usize;
        builder.mom_switch_iter = params["mom_switch_iter"]
            .as_i64()
            .unwrap_or(defaults.mom_switch_iter as i64) as usize;
        builder.start_momentum = params["start_momentum"]
            .as_f64()
            .unwrap_or(defaults.start_momentum);
        builder.final_momentum = params["final_momentum"]
            .as_f64()
            .unwrap_or(defaults.final_momentum);
        builder.eta = params["eta"].as_f64().unwrap_or(defaults.eta);
        builder.exaggeration_factor = params["exaggeration_factor"]
            .as_f64()
            .unwrap_or(defaults.exaggeration_factor);
        builder.max_depth =
            params["max_depth"].as_i64().unwrap_or(defaults.max_depth as i64) as usize;
        builder.out_dim = params["out_dim"].as_i64().unwrap_or(defaults.out_dim as i64) as usize;
        builder.interpolation = params["interpolation"].as_i64().map(|i| i as usize);
        builder.calibration = calibration;
        builder.rng_seed = params["rng_seed"].as_i64().map(|i| i as u64);
        builder.verbosity = params["verbosity"].as_i64().unwrap_or(0) as u32;
        builder
    }

    /// See [`crate::TsneParameters`] for docs
    pub fn set_perplexity(&mut self, x: f64) -> &mut Self {
        self.perplexity = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_theta(&mut self, x: f64) -> &mut Self {
        self.theta = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_max_iter(&mut self, x: usize) -> &mut Self {
        self.max_iter = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_stop_lying_iter(&mut self, x: usize) -> &mut Self {
        self.stop_lying_iter = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_mom_switch_iter(&mut self, x: usize) -> &mut Self {
        self.mom_switch_iter = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_start_momentum(&mut self, x: f64) -> &mut Self {
        self.start_momentum = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_final_momentum(&mut self, x: f64) -> &mut Self {
        self.final_momentum = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_eta(&mut self, x: f64) -> &mut Self {
        self.eta = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_exaggeration_factor(&mut self, x: f64) -> &mut Self {
        self.exaggeration_factor = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_max_depth(&mut self, x: usize) -> &mut Self {
        self.max_depth = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_out_dim(&mut self, x: usize) -> &mut Self {
        self.out_dim = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_interpolation(&mut self, x: Option<usize>) -> &mut Self {
        self.interpolation = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_calibration(&mut self, x: CalibrationMode) -> &mut Self {
        self.calibration = x;
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_rng_seed(&mut self, x: u64) -> &mut Self {
        self.rng_seed = Some(x);
        self
    }
    /// See [`crate::TsneParameters`] for docs
    pub fn set_verbosity(&mut self, x: u32) -> &mut Self {
        self.verbosity = x;
        self
    }
    /// The parallel runtime every data parallel stage runs on. Defaults to
    /// [`Sequential`], which keeps fixed-seed runs bit reproducible.
    pub fn set_threading(&mut self, x: Arc<dyn ParallelFor>) -> &mut Self {
        self.threading = x;
        self
    }

    /// The frozen parameter set this builder would hand a status.
    pub fn parameters(&self) -> TsneParameters {
        TsneParameters {
            perplexity: self.perplexity,
            theta: self.theta,
            max_iter: self.max_iter,
            stop_lying_iter: self.stop_lying_iter,
            mom_switch_iter: self.mom_switch_iter,
            start_momentum: self.start_momentum,
            final_momentum: self.final_momentum,
            eta: self.eta,
            exaggeration_factor: self.exaggeration_factor,
            max_depth: self.max_depth,
            out_dim: self.out_dim,
            interpolation: self.interpolation,
            calibration: self.calibration,
            rng_seed: self.rng_seed,
            verbosity: self.verbosity,
        }
    }

    /// Builds the affinities and the iteration state from a precomputed neighbor list.
    /// The perplexity is read off the list as K/3 on this path.
    pub fn initialize(&self, neighbors: &NeighborList) -> StarlingResult<TsneStatus> {
        let observations = neighbors.len();
        let k = neighbors.k();
        if k >= observations {
            return Err(StarlingError::InsufficientObservations {
                neighbors: k,
                observations,
            });
        }
        let mut parameters = self.parameters();
        parameters.perplexity = k as f64 / 3.0;
        if parameters.interpolation.is_some() && parameters.out_dim != 2 {
            return Err(StarlingError::UnsupportedDimension(parameters.out_dim));
        }
        let affinities = Affinities::build(
            neighbors,
            parameters.perplexity,
            parameters.calibration,
            &self.threading,
        );
        Ok(TsneStatus::new(
            Arc::new(parameters),
            Arc::clone(&self.threading),
            affinities,
        ))
    }

    /// Convenience path from raw observation-major points: runs the exact neighbor
    /// search first with K = 3 x perplexity, then proceeds as [`TsneBuilder::initialize`].
    pub fn initialize_dense(&self, points: &[f64], data_dim: usize) -> StarlingResult<TsneStatus> {
        let cloud = DenseCloud::new(points.to_vec(), data_dim)?;
        let k = ((3.0 * self.perplexity) as usize).max(1);
        if k >= cloud.len() {
            return Err(StarlingError::InsufficientObservations {
                neighbors: k,
                observations: cloud.len(),
            });
        }
        let tree = VpTree::<L2>::build(&cloud, self.rng_seed);
        let neighbors = tree.knn(k)?;
        self.initialize(&neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_neighbors() -> NeighborList {
        // 4 points on a line at 0, 1, 2, 3
        NeighborList::from_parts(
            vec![1, 2, 0, 2, 1, 3, 2, 1],
            vec![1.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0],
            2,
        )
        .unwrap()
    }

    #[test]
    fn initialize_forces_perplexity_from_k() {
        let builder = TsneBuilder::new();
        let status = builder.initialize(&tiny_neighbors()).unwrap();
        assert_approx_eq::assert_approx_eq!(status.parameters().perplexity, 2.0 / 3.0);
    }

    #[test]
    fn interpolation_requires_two_dimensions() {
        let mut builder = TsneBuilder::new();
        builder.set_out_dim(3).set_interpolation(Some(50));
        let result = builder.initialize(&tiny_neighbors());
        assert!(matches!(
            result,
            Err(StarlingError::UnsupportedDimension(3))
        ));
    }

    #[test]
    fn dense_path_rejects_oversized_neighborhoods() {
        let mut builder = TsneBuilder::new();
        builder.set_perplexity(30.0);
        let points = vec![0.0; 10 * 2];
        let result = builder.initialize_dense(&points, 2);
        assert!(matches!(
            result,
            Err(StarlingError::InsufficientObservations { .. })
        ));
    }

    #[test]
    fn from_yaml_reads_the_schedule() {
        let dir = std::env::temp_dir().join("starling_builder_yaml_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(
            &path,
            "---\nperplexity: 12.5\nmax_iter: 400\ncalibration: bisection\nrng_seed: 3\n",
        )
        .unwrap();
        let builder = TsneBuilder::from_yaml(&path);
        assert_eq!(builder.max_iter, 400);
        assert_eq!(builder.calibration, CalibrationMode::Bisection);
        assert_eq!(builder.rng_seed, Some(3));
        assert_approx_eq::assert_approx_eq!(builder.perplexity, 12.5);
        // untouched keys keep their defaults
        assert_eq!(builder.stop_lying_iter, 250);
    }
}
