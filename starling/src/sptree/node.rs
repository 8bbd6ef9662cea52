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

//! The cell record. Nodes live in the tree's flat arena and reference their children by
//! arena index; slot value 0 means empty, which works because the root can never be
//! anybody's child.

use smallvec::SmallVec;

#[derive(Debug, Clone)]
pub(crate) struct SpTreeNode {
    /// Geometric center of the cell
    pub(crate) midpoint: SmallVec<[f64; 2]>,
    /// Half the cell's extent per dimension
    pub(crate) halfwidth: SmallVec<[f64; 2]>,
    /// Mass weighted mean of the contained points. Not maintained for the root, whose
    /// summary is never consulted.
    pub(crate) center_of_mass: SmallVec<[f64; 2]>,
    /// How many points the cell covers
    pub(crate) number: usize,
    pub(crate) is_leaf: bool,
    /// The point sitting in a single occupancy leaf, so a demotion can push it one
    /// level down. Meaningless once `number > 1`.
    pub(crate) occupant: u32,
    /// 2^d child slots for internal nodes, empty for leaves
    pub(crate) children: SmallVec<[u32; 4]>,
}

impl SpTreeNode {
    pub(crate) fn new_leaf(
        midpoint: SmallVec<[f64; 2]>,
        halfwidth: SmallVec<[f64; 2]>,
    ) -> SpTreeNode {
        let dim = midpoint.len();
        let mut center_of_mass = SmallVec::with_capacity(dim);
        center_of_mass.resize(dim, 0.0);
        SpTreeNode {
            midpoint,
            halfwidth,
            center_of_mass,
            number: 0,
            is_leaf: true,
            occupant: 0,
            children: SmallVec::new(),
        }
    }

    /// Which child slot a point belongs in: bit `d` is set iff the point sits above the
    /// midpoint in dimension `d`.
    pub(crate) fn child_slot(&self, point: &[f64]) -> usize {
        let mut slot = 0;
        for (d, (p, mid)) in point.iter().zip(self.midpoint.iter()).enumerate() {
            if p > mid {
                slot |= 1 << d;
            }
        }
        slot
    }

    /// The longest side of the cell, the `w` of the Barnes-Hut acceptance test.
    pub(crate) fn longest_side(&self) -> f64 {
        2.0 * self.halfwidth.iter().fold(0.0f64, |acc, h| acc.max(*h))
    }
}
