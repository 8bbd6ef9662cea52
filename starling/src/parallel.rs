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

//! # The parallel-for seam
//! Every data-parallel stage of the engine (row calibration, the attractive pass, the
//! repulsive pass, waypoint evaluation) funnels through [`ParallelFor`], so the engine
//! can run sequentially, on its own worker pool, on rayon, or on whatever runtime the
//! host application already owns.
//!
//! The contract is slab shaped on purpose: stage output is always a flat `f64` buffer
//! with a fixed number of values per observation, and the job for observation `i` only
//! writes slab `i`. That keeps every implementation free of locks.
//!
//! Scalar reductions (the Q normalizer in particular) are *not* done here. The engine
//! writes per-observation contributions into the slab and folds them in index order
//! afterwards, so the sum never depends on scheduler timing.

use rayon::prelude::*;

/// Runs a job over every stride-sized slab of a buffer, possibly across threads.
///
/// Implement this to embed the engine inside an existing parallel runtime. The job
/// must be called exactly once per slab with the slab's observation index; call order
/// and thread placement are the implementation's business.
pub trait ParallelFor: std::fmt::Debug + Send + Sync {
    /// `data.len()` is always a multiple of `stride`.
    fn for_each(&self, data: &mut [f64], stride: usize, job: &(dyn Fn(usize, &mut [f64]) + Sync));
}

/// Single threaded, in index order. The default, and the mode that makes fixed-seed
/// runs bit reproducible.
#[derive(Debug, Default)]
pub struct Sequential {}

impl ParallelFor for Sequential {
    fn for_each(&self, data: &mut [f64], stride: usize, job: &(dyn Fn(usize, &mut [f64]) + Sync)) {
        for (i, slab) in data.chunks_mut(stride).enumerate() {
            job(i, slab);
        }
    }
}

/// The built-in pool: scoped worker threads draining a channel of slab batches.
///
/// Batches are handed out dynamically because per-observation costs are anything but
/// uniform; a tree traversal from a point in a dense cluster prunes far later than one
/// from an outlier.
#[derive(Debug)]
pub struct WorkerPool {
    /// Worker thread count. A value of 1 degenerates to [`Sequential`].
    pub workers: usize,
}

impl ParallelFor for WorkerPool {
    fn for_each(&self, data: &mut [f64], stride: usize, job: &(dyn Fn(usize, &mut [f64]) + Sync)) {
        let workers = self.workers.max(1);
        let items = data.len() / stride;
        if workers == 1 || items < 2 {
            Sequential {}.for_each(data, stride, job);
            return;
        }
        let block = (items / (workers * 4)).max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<(usize, &mut [f64])>();
        for (b, chunk) in data.chunks_mut(block * stride).enumerate() {
            sender.send((b * block, chunk)).unwrap();
        }
        drop(sender);
        std::thread::scope(|s| {
            for _ in 0..workers {
                let receiver = receiver.clone();
                s.spawn(move || {
                    while let Ok((base, chunk)) = receiver.recv() {
                        for (i, slab) in chunk.chunks_mut(stride).enumerate() {
                            job(base + i, slab);
                        }
                    }
                });
            }
        });
    }
}

/// Delegates to rayon's global pool. Use this when the surrounding application is
/// already rayon shaped and you want the engine to share its threads.
#[derive(Debug, Default)]
pub struct RayonPool {}

impl ParallelFor for RayonPool {
    fn for_each(&self, data: &mut [f64], stride: usize, job: &(dyn Fn(usize, &mut [f64]) + Sync)) {
        data.par_chunks_mut(stride)
            .enumerate()
            .for_each(|(i, slab)| job(i, slab));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_with_index(runner: &dyn ParallelFor) -> Vec<f64> {
        let mut data = vec![0.0; 3 * 101];
        runner.for_each(&mut data, 3, &|i, slab| {
            for (d, v) in slab.iter_mut().enumerate() {
                *v = (i * 3 + d) as f64;
            }
        });
        data
    }

    #[test]
    fn all_modes_visit_every_slab_once() {
        let expected: Vec<f64> = (0..3 * 101).map(|v| v as f64).collect();
        assert_eq!(fill_with_index(&Sequential {}), expected);
        assert_eq!(fill_with_index(&WorkerPool { workers: 4 }), expected);
        assert_eq!(fill_with_index(&RayonPool {}), expected);
    }

    #[test]
    fn worker_pool_handles_tiny_inputs() {
        let mut data = vec![0.0; 2];
        WorkerPool { workers: 8 }.for_each(&mut data, 2, &|i, slab| {
            slab[0] = i as f64 + 1.0;
            slab[1] = 2.0;
        });
        assert_eq!(data, vec![1.0, 2.0]);
    }
}
