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

//! The iteration state and the gradient loop.
//!
//! One iteration: rebuild the partition tree over the current embedding, accumulate
//! attractive forces from the sparse affinities and repulsive forces from the tree
//! (or the interpolation lattice), then take a gains-scaled momentum step and
//! re-center. The attractive and repulsive passes fan out through the parallel-for
//! seam; everything that writes shared state stays sequential.
//!
//! Each point's Q contribution lands in its own slot of the repulsion buffer and the
//! normalizer is folded in index order afterwards, so a run's arithmetic does not
//! depend on how the runtime schedules the slabs.

use super::TsneParameters;
use crate::affinity::Affinities;
use crate::errors::{StarlingError, StarlingResult};
use crate::interpolate::GridInterpolator;
use crate::parallel::ParallelFor;
use crate::sptree::SpTree;
use crate::utils;
use log::debug;
use pbr::ProgressBar;
use std::sync::Arc;

/// A live embedding run: the affinities, the gradient buffers, and the iteration
/// counter. Produced by [`crate::TsneBuilder::initialize`]; drive it with
/// [`TsneStatus::run`] or one [`TsneStatus::step`] at a time.
///
/// All buffers are sized at initialization. The only allocation inside the loop is
/// the tree arena growing toward its steady-state size.
#[derive(Debug)]
pub struct TsneStatus {
    parameters: Arc<TsneParameters>,
    threading: Arc<dyn ParallelFor>,
    affinities: Affinities,
    tree: SpTree,
    interpolator: Option<GridInterpolator>,
    /// Gradient, N x d
    dy: Vec<f64>,
    /// Velocity, N x d
    uy: Vec<f64>,
    /// Per coordinate adaptive gains, N x d
    gains: Vec<f64>,
    /// Attractive accumulator, N x d
    pos_f: Vec<f64>,
    /// Repulsive accumulator, N x (d + 1): d force components then the point's Q
    /// contribution
    repulsion: Vec<f64>,
    observations: usize,
    iter: usize,
}

impl TsneStatus {
    pub(crate) fn new(
        parameters: Arc<TsneParameters>,
        threading: Arc<dyn ParallelFor>,
        affinities: Affinities,
    ) -> TsneStatus {
        let observations = affinities.len();
        let dim = parameters.out_dim;
        let tree = SpTree::new(dim, parameters.max_depth);
        let interpolator = parameters.interpolation.map(GridInterpolator::new);
        TsneStatus {
            tree,
            interpolator,
            dy: vec![0.0; observations * dim],
            uy: vec![0.0; observations * dim],
            gains: vec![1.0; observations * dim],
            pos_f: vec![0.0; observations * dim],
            repulsion: vec![0.0; observations * (dim + 1)],
            observations,
            iter: 0,
            parameters,
            threading,
            affinities,
        }
    }

    /// The iteration counter. Starts at 0, goes up by one per step.
    pub fn iter(&self) -> usize {
        self.iter
    }

    /// How many observations this run embeds.
    pub fn observations(&self) -> usize {
        self.observations
    }

    /// The frozen configuration.
    pub fn parameters(&self) -> &Arc<TsneParameters> {
        &self.parameters
    }

    /// The symmetric input distribution.
    pub fn affinities(&self) -> &Affinities {
        &self.affinities
    }

    /// Drives `y` from the current iteration to `max_iter` in place.
    pub fn run(&mut self, y: &mut [f64]) -> StarlingResult<()> {
        self.check_embedding(y)?;
        let max_iter = self.parameters.max_iter;
        let verbosity = self.parameters.verbosity;
        let mut pb = ProgressBar::new(max_iter.saturating_sub(self.iter) as u64);
        if verbosity > 1 {
            pb.format("╢▌▌░╟");
        }
        while self.iter < max_iter {
            self.step(y)?;
            if verbosity > 1 {
                pb.inc();
            }
        }
        if verbosity > 1 {
            pb.finish();
        }
        debug!("embedding settled after {} iterations", self.iter);
        Ok(())
    }

    /// One gradient iteration. Public so callers can interleave, animate, or cancel
    /// between iterations; mid-iteration there is nothing to interrupt.
    pub fn step(&mut self, y: &mut [f64]) -> StarlingResult<()> {
        self.check_embedding(y)?;
        let dim = self.parameters.out_dim;
        self.tree.build(y);
        self.attractive_pass(y);
        let q_sum = self.repulsive_pass(y);
        self.update(y, q_sum);
        utils::recenter(y, dim);
        self.iter += 1;
        Ok(())
    }

    fn check_embedding(&self, y: &[f64]) -> StarlingResult<()> {
        let expected = self.observations * self.parameters.out_dim;
        if y.len() != expected {
            return Err(StarlingError::BadEmbeddingLength {
                expected,
                found: y.len(),
            });
        }
        Ok(())
    }

    fn attractive_pass(&mut self, y: &[f64]) {
        let dim = self.parameters.out_dim;
        let multiplier = if self.iter < self.parameters.stop_lying_iter {
            self.parameters.exaggeration_factor
        } else {
            1.0
        };
        let affinities = &self.affinities;
        let threading = &self.threading;
        threading.for_each(&mut self.pos_f, dim, &|pn, slab| {
            for v in slab.iter_mut() {
                *v = 0.0;
            }
            let point = &y[pn * dim..(pn + 1) * dim];
            for &(j, p) in affinities.row(pn) {
                let other = &y[j * dim..(j + 1) * dim];
                let mut r2 = 0.0;
                for d in 0..dim {
                    let v = point[d] - other[d];
                    r2 += v * v;
                }
                let f = multiplier * p / (1.0 + r2);
                for d in 0..dim {
                    slab[d] += f * (point[d] - other[d]);
                }
            }
        });
    }

    fn repulsive_pass(&mut self, y: &[f64]) -> f64 {
        let dim = self.parameters.out_dim;
        let theta = self.parameters.theta;
        let TsneStatus {
            interpolator,
            tree,
            threading,
            repulsion,
            ..
        } = self;
        match interpolator {
            Some(interp) => {
                interp.fit_evaluate(&*tree, y, theta, &*threading, &mut repulsion[..])
            }
            None => {
                let tree = &*tree;
                threading.for_each(&mut repulsion[..], dim + 1, &|pn, slab| {
                    let (forces, q) = slab.split_at_mut(dim);
                    q[0] = tree.negative_forces(
                        &y[pn * dim..(pn + 1) * dim],
                        Some(pn),
                        theta,
                        forces,
                    );
                });
            }
        }
        // index ordered fold, never a scheduler dependent reduction
        let mut q_sum = 0.0;
        for slab in self.repulsion.chunks(dim + 1) {
            q_sum += slab[dim];
        }
        q_sum
    }

    fn update(&mut self, y: &mut [f64], q_sum: f64) {
        let dim = self.parameters.out_dim;
        let momentum = if self.iter < self.parameters.mom_switch_iter {
            self.parameters.start_momentum
        } else {
            self.parameters.final_momentum
        };
        let eta = self.parameters.eta;
        for pn in 0..self.observations {
            for d in 0..dim {
                let i = pn * dim + d;
                let grad = self.pos_f[i] - self.repulsion[pn * (dim + 1) + d] / q_sum;
                self.dy[i] = grad;
                if utils::sign(grad) != utils::sign(self.uy[i]) {
                    self.gains[i] += 0.2;
                } else {
                    self.gains[i] *= 0.8;
                }
                if self.gains[i] < 0.01 {
                    self.gains[i] = 0.01;
                }
                self.uy[i] = momentum * self.uy[i] - eta * self.gains[i] * grad;
                y[i] += self.uy[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TsneBuilder;

    fn ring_status(max_iter: usize) -> (TsneStatus, Vec<f64>) {
        let mut points = Vec::with_capacity(30 * 2);
        for i in 0..30 {
            let angle = i as f64 * std::f64::consts::PI / 15.0;
            points.push(angle.cos() * 3.0);
            points.push(angle.sin() * 3.0);
        }
        let mut builder = TsneBuilder::new();
        builder
            .set_perplexity(2.0)
            .set_rng_seed(4)
            .set_max_iter(max_iter);
        let status = builder.initialize_dense(&points, 2).unwrap();
        let y = crate::utils::random_embedding(30, 2, Some(8));
        (status, y)
    }

    #[test]
    fn every_step_recenters() {
        let (mut status, mut y) = ring_status(5);
        for _ in 0..5 {
            status.step(&mut y).unwrap();
            for d in 0..2 {
                let mean: f64 = y.iter().skip(d).step_by(2).sum::<f64>() / 30.0;
                assert!(mean.abs() < 1e-9, "dimension {} drifted to {}", d, mean);
            }
        }
        assert_eq!(status.iter(), 5);
    }

    #[test]
    fn attractive_forces_scale_by_the_exaggeration_factor() {
        let (mut status, y) = ring_status(10);
        status.tree.build(&y);
        status.iter = 0;
        status.attractive_pass(&y);
        let exaggerated = status.pos_f.clone();
        status.iter = status.parameters.stop_lying_iter;
        status.attractive_pass(&y);
        let plain = status.pos_f.clone();
        let factor = status.parameters.exaggeration_factor;
        for (e, p) in exaggerated.iter().zip(plain.iter()) {
            assert!(
                (e - factor * p).abs() <= 1e-12 * e.abs() + 1e-18,
                "{} is not {} x {}",
                e,
                factor,
                p
            );
        }
    }

    #[test]
    fn momentum_switches_on_schedule() {
        let (mut status, mut y) = ring_status(10);
        // a hand built gradient: dy = 0.5 everywhere, velocity 1, gains decay to 0.8
        for v in status.pos_f.iter_mut() {
            *v = 0.5;
        }
        for v in status.repulsion.iter_mut() {
            *v = 0.0;
        }
        for v in status.uy.iter_mut() {
            *v = 1.0;
        }
        status.iter = 0;
        status.update(&mut y, 1.0);
        let early = status.uy[0];
        assert_approx_eq::assert_approx_eq!(early, 0.5 - 200.0 * 0.8 * 0.5, 1e-12);

        let (mut status, mut y) = ring_status(10);
        for v in status.pos_f.iter_mut() {
            *v = 0.5;
        }
        for v in status.repulsion.iter_mut() {
            *v = 0.0;
        }
        for v in status.uy.iter_mut() {
            *v = 1.0;
        }
        status.iter = status.parameters.mom_switch_iter;
        status.update(&mut y, 1.0);
        let late = status.uy[0];
        assert_approx_eq::assert_approx_eq!(late, 0.8 - 200.0 * 0.8 * 0.5, 1e-12);
    }

    #[test]
    fn zero_gradient_always_grows_gains() {
        let (mut status, mut y) = ring_status(10);
        for v in status.pos_f.iter_mut() {
            *v = 0.0;
        }
        for v in status.repulsion.iter_mut() {
            *v = 0.0;
        }
        status.uy[0] = 3.0;
        status.uy[1] = -3.0;
        status.update(&mut y, 1.0);
        // sign(0) is 0, which differs from both velocity signs
        assert_approx_eq::assert_approx_eq!(status.gains[0], 1.2, 1e-12);
        assert_approx_eq::assert_approx_eq!(status.gains[1], 1.2, 1e-12);
    }

    #[test]
    fn run_stops_at_max_iter_and_stays_there() {
        let (mut status, mut y) = ring_status(8);
        status.run(&mut y).unwrap();
        assert_eq!(status.iter(), 8);
        status.run(&mut y).unwrap();
        assert_eq!(status.iter(), 8);
    }

    #[test]
    fn wrong_embedding_shape_is_rejected() {
        let (mut status, _) = ring_status(3);
        let mut wrong = vec![0.0; 17];
        assert!(matches!(
            status.run(&mut wrong),
            Err(StarlingError::BadEmbeddingLength {
                expected: 60,
                found: 17
            })
        ));
    }

    #[test]
    fn interpolated_runs_track_direct_runs() {
        let mut points = Vec::with_capacity(40 * 2);
        for i in 0..40 {
            let angle = i as f64 * std::f64::consts::PI / 20.0;
            points.push(angle.cos() * 2.0);
            points.push(angle.sin() * 2.0);
        }
        let mut direct_builder = TsneBuilder::new();
        direct_builder
            .set_perplexity(2.0)
            .set_rng_seed(4)
            .set_max_iter(30);
        let mut direct_status = direct_builder.initialize_dense(&points, 2).unwrap();
        let mut direct_y = crate::utils::random_embedding(40, 2, Some(2));

        let mut lattice_builder = TsneBuilder::new();
        lattice_builder
            .set_perplexity(2.0)
            .set_rng_seed(4)
            .set_max_iter(30)
            .set_interpolation(Some(600));
        let mut lattice_status = lattice_builder.initialize_dense(&points, 2).unwrap();
        let mut lattice_y = crate::utils::random_embedding(40, 2, Some(2));

        // a handful of steps, before trajectory divergence can amplify the lattice error
        for _ in 0..5 {
            direct_status.step(&mut direct_y).unwrap();
            lattice_status.step(&mut lattice_y).unwrap();
        }
        for (a, b) in direct_y.iter().zip(lattice_y.iter()) {
            assert!((a - b).abs() < 0.05, "{} vs {}", a, b);
        }
    }
}
