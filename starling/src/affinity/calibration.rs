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

//! # Bandwidth calibration
//! Each observation gets its own gaussian kernel precision, found so that the entropy
//! of its neighbor distribution matches the log of the target perplexity. Squared
//! distances are shifted so the nearest neighbor sits at zero; the shift cancels in the
//! normalized distribution and keeps `exp(-beta * s)` representable for tight rows
//! where the raw exponents would underflow to a row of zeros.

use serde::{Deserialize, Serialize};

/// How the per-row bandwidth search moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationMode {
    /// Newton steps while they stay inside the bracket, bisection when one escapes.
    /// Converges in a handful of iterations on ordinary rows.
    Hybrid,
    /// Interval bisection only. Slower and boring, which is exactly what you want when
    /// comparing runs.
    Bisection,
}

/// The search stops once the entropy is within this of the target.
pub(crate) const ENTROPY_TOLERANCE: f64 = 1e-5;

/// Rows that haven't settled after this many steps keep their last bandwidth and get a
/// warning instead of an error.
pub(crate) const MAX_BANDWIDTH_STEPS: usize = 200;

/// Calibrates one row. `distances` are the raw neighbor distances, ascending; `probs`
/// receives the normalized neighbor probabilities. Returns whether the entropy target
/// was met.
pub(crate) fn calibrate_row(
    distances: &[f64],
    target_entropy: f64,
    mode: CalibrationMode,
    probs: &mut [f64],
) -> bool {
    let shift = distances[0] * distances[0];
    let mut beta = 1.0;
    let mut beta_lo = 0.0;
    let mut beta_hi = f64::INFINITY;
    let mut sum_p = 0.0;
    let mut converged = false;
    for _step in 0..MAX_BANDWIDTH_STEPS {
        sum_p = 0.0;
        let mut sum_sp = 0.0;
        let mut sum_s2p = 0.0;
        for (m, d) in distances.iter().enumerate() {
            let s = d * d - shift;
            let p = (-beta * s).exp();
            probs[m] = p;
            sum_p += p;
            sum_sp += s * p;
            sum_s2p += s * s * p;
        }
        let entropy = beta * sum_sp / sum_p + sum_p.ln();
        let diff = entropy - target_entropy;
        if diff.abs() < ENTROPY_TOLERANCE {
            converged = true;
            break;
        }
        let mut stepped = false;
        if mode == CalibrationMode::Hybrid {
            let slope = -beta / sum_p * (sum_s2p - sum_sp * sum_sp / sum_p);
            if slope != 0.0 {
                let candidate = beta - diff / slope;
                if candidate > beta_lo && candidate < beta_hi {
                    beta = candidate;
                    stepped = true;
                }
            }
        }
        if !stepped {
            if diff > 0.0 {
                // entropy too high, sharpen the kernel
                beta_lo = beta;
                beta = if beta_hi == f64::INFINITY {
                    beta * 2.0
                } else {
                    (beta + beta_hi) / 2.0
                };
            } else {
                beta_hi = beta;
                beta = (beta + beta_lo) / 2.0;
            }
        }
    }
    for p in probs.iter_mut() {
        *p /= sum_p;
    }
    converged
}
