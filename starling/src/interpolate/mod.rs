//! # The Grid Interpolator
//!
//! An approximation of an approximation: instead of walking the tree once per point,
//! walk it once per occupied lattice vertex and interpolate bilinearly to the points.
//! When many points share a cell the tree work collapses to four traversals per cell.
//! Strictly a two dimensional device; the engine refuses to wire it up for any other
//! output dimension.
//!
//! Discovery is two passes so that storage is sized once: first find the occupied
//! cells and the lattice vertices that anchor them, then evaluate those vertices and
//! fit the cell coefficients.

use crate::parallel::ParallelFor;
use crate::sptree::SpTree;
use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use std::sync::Arc;

/// Guard for degenerate bounding boxes.
const MIN_STEP: f64 = 1e-8;

/// Per waypoint and per point we carry two force components and a Q contribution.
const VALUES: usize = 3;

type CellMap = HashMap<usize, usize, FxBuildHasher>;

/// Scratch and lattice state for repulsion-by-interpolation. Owned by the status and
/// reused across iterations; nothing here survives a `fit_evaluate` call semantically,
/// the maps and tables just keep their capacity.
#[derive(Debug)]
pub(crate) struct GridInterpolator {
    intervals: usize,
    /// Occupied cell hash to interpolant index
    anchors: CellMap,
    /// Lattice vertex hash to waypoint index
    waypoints: CellMap,
    /// Waypoint index to lattice coordinate
    corners: Vec<(usize, usize)>,
    /// VALUES per waypoint, tree evaluations at the lattice vertices
    corner_values: Vec<f64>,
    /// 4 coefficients x VALUES outputs per anchor cell
    coefficients: Vec<f64>,
}

impl GridInterpolator {
    pub(crate) fn new(intervals: usize) -> GridInterpolator {
        GridInterpolator {
            intervals: intervals.max(1),
            anchors: CellMap::default(),
            waypoints: CellMap::default(),
            corners: Vec::new(),
            corner_values: Vec::new(),
            coefficients: Vec::new(),
        }
    }

    /// Fills `repulsion` (stride 3: force x, force y, q) for every point of `y` from
    /// tree evaluations at the occupied lattice vertices.
    pub(crate) fn fit_evaluate(
        &mut self,
        tree: &SpTree,
        y: &[f64],
        theta: f64,
        threading: &Arc<dyn ParallelFor>,
        repulsion: &mut [f64],
    ) {
        let intervals = self.intervals;
        let side = intervals + 1;
        let mut mins = [f64::MAX; 2];
        let mut maxs = [f64::MIN; 2];
        for point in y.chunks(2) {
            for d in 0..2 {
                mins[d] = mins[d].min(point[d]);
                maxs[d] = maxs[d].max(point[d]);
            }
        }
        let mut steps = [0.0; 2];
        for d in 0..2 {
            steps[d] = (maxs[d] - mins[d]) / intervals as f64;
            if steps[d] == 0.0 {
                steps[d] = MIN_STEP;
            }
        }

        // pass one: occupied cells and the vertices that anchor them
        self.anchors.clear();
        self.waypoints.clear();
        self.corners.clear();
        for point in y.chunks(2) {
            let (ix, iy) = cell_of(point, &mins, &steps, intervals);
            let hash = ix + iy * side;
            if !self.anchors.contains_key(&hash) {
                let interpolant = self.anchors.len();
                self.anchors.insert(hash, interpolant);
                for corner in 0..4usize {
                    let cx = ix + (corner & 1);
                    let cy = iy + (corner >> 1 & 1);
                    let corner_hash = cx + cy * side;
                    if !self.waypoints.contains_key(&corner_hash) {
                        self.waypoints.insert(corner_hash, self.corners.len());
                        self.corners.push((cx, cy));
                    }
                }
            }
        }

        // pass two: one tree walk per waypoint
        self.corner_values.clear();
        self.corner_values.resize(self.corners.len() * VALUES, 0.0);
        let corners = &self.corners;
        threading.for_each(&mut self.corner_values, VALUES, &|w, slab| {
            let (cx, cy) = corners[w];
            let vertex = [
                mins[0] + cx as f64 * steps[0],
                mins[1] + cy as f64 * steps[1],
            ];
            let (forces, q) = slab.split_at_mut(2);
            q[0] = tree.negative_forces(&vertex, None, theta, forces);
        });

        // bilinear coefficients per occupied cell
        self.coefficients.clear();
        self.coefficients.resize(self.anchors.len() * VALUES * 4, 0.0);
        for (&hash, &interpolant) in self.anchors.iter() {
            let ix = hash % side;
            let iy = hash / side;
            let v00 = self.corner_value(ix, iy, side);
            let v10 = self.corner_value(ix + 1, iy, side);
            let v01 = self.corner_value(ix, iy + 1, side);
            let v11 = self.corner_value(ix + 1, iy + 1, side);
            for out in 0..VALUES {
                let base = (interpolant * VALUES + out) * 4;
                self.coefficients[base] =
                    (v11[out] - v10[out] - v01[out] + v00[out]) / (steps[0] * steps[1]);
                self.coefficients[base + 1] = (v10[out] - v00[out]) / steps[0];
                self.coefficients[base + 2] = (v01[out] - v00[out]) / steps[1];
                self.coefficients[base + 3] = v00[out];
            }
        }

        // pass three: every point reads its cell's interpolant
        let anchors = &self.anchors;
        let coefficients = &self.coefficients;
        threading.for_each(repulsion, VALUES, &|pn, slab| {
            let point = &y[pn * 2..pn * 2 + 2];
            let (ix, iy) = cell_of(point, &mins, &steps, intervals);
            let interpolant = anchors[&(ix + iy * side)];
            let dx = point[0] - (mins[0] + ix as f64 * steps[0]);
            let dy = point[1] - (mins[1] + iy as f64 * steps[1]);
            for (out, value) in slab.iter_mut().enumerate() {
                let base = (interpolant * VALUES + out) * 4;
                let c = &coefficients[base..base + 4];
                *value = c[0] * dx * dy + c[1] * dx + c[2] * dy + c[3];
            }
        });
    }

    fn corner_value(&self, cx: usize, cy: usize, side: usize) -> [f64; VALUES] {
        let w = self.waypoints[&(cx + cy * side)];
        let slab = &self.corner_values[w * VALUES..(w + 1) * VALUES];
        [slab[0], slab[1], slab[2]]
    }
}

fn cell_of(point: &[f64], mins: &[f64; 2], steps: &[f64; 2], intervals: usize) -> (usize, usize) {
    let ix = (((point[0] - mins[0]) / steps[0]) as usize).min(intervals - 1);
    let iy = (((point[1] - mins[1]) / steps[1]) as usize).min(intervals - 1);
    (ix, iy)
}
