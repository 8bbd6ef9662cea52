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

//! Folds the directed neighbor probabilities into a symmetric joint distribution.
//!
//! Mutual pairs are merged in place, one-sided pairs are mirrored by appending to the
//! other row, and everything is rescaled so the whole matrix sums to one. Lookups ride
//! a per-row cursor: rows are sorted by neighbor index and the outer loop visits rows
//! in ascending order, so each cursor only ever moves forward across the row's
//! original prefix.

use neighborcloud::PointIndex;

pub(crate) fn symmetrize(rows: &mut [Vec<(PointIndex, f64)>]) {
    let total: f64 = rows
        .iter()
        .map(|row| row.iter().map(|(_, p)| *p).sum::<f64>())
        .sum();
    let original_len: Vec<usize> = rows.iter().map(|row| row.len()).collect();
    let mut cursors: Vec<usize> = vec![0; rows.len()];
    for n in 0..rows.len() {
        for m in 0..original_len[n] {
            let (j, p_nj) = rows[n][m];
            let cursor = &mut cursors[j];
            while *cursor < original_len[j] && rows[j][*cursor].0 < n {
                *cursor += 1;
            }
            if *cursor < original_len[j] && rows[j][*cursor].0 == n {
                // mutual pair; the n < j visit merges it, the mirror visit skips
                if n < j {
                    let combined = p_nj + rows[j][*cursor].1;
                    rows[n][m].1 = combined;
                    rows[j][*cursor].1 = combined;
                }
            } else {
                rows[j].push((n, p_nj));
            }
        }
    }
    let scale = 0.5 / total;
    for row in rows.iter_mut() {
        for entry in row.iter_mut() {
            entry.1 *= scale;
        }
        // appended mirrors land out of order
        row.sort_unstable_by_key(|(j, _)| *j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(rows: &[Vec<(PointIndex, f64)>]) -> f64 {
        rows.iter()
            .map(|row| row.iter().map(|(_, p)| *p).sum::<f64>())
            .sum()
    }

    fn lookup(rows: &[Vec<(PointIndex, f64)>], i: usize, j: usize) -> Option<f64> {
        rows[i]
            .iter()
            .find(|(idx, _)| *idx == j)
            .map(|(_, p)| *p)
    }

    #[test]
    fn mutual_pairs_merge() {
        let mut rows = vec![vec![(1, 0.6), (2, 0.4)], vec![(0, 0.3), (2, 0.7)], vec![(0, 0.5), (1, 0.5)]];
        symmetrize(&mut rows);
        // every pair here is mutual, so the result is (p_ij + p_ji) / (2 * 3)
        assert!((lookup(&rows, 0, 1).unwrap() - 0.9 / 6.0).abs() < 1e-12);
        assert!((lookup(&rows, 1, 0).unwrap() - 0.9 / 6.0).abs() < 1e-12);
        assert!((lookup(&rows, 0, 2).unwrap() - 0.9 / 6.0).abs() < 1e-12);
        assert!((lookup(&rows, 1, 2).unwrap() - 1.2 / 6.0).abs() < 1e-12);
        assert!((total(&rows) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn one_sided_pairs_mirror() {
        // 0 considers 2 a neighbor, 2 does not reciprocate
        let mut rows = vec![vec![(1, 0.5), (2, 0.5)], vec![(0, 1.0)], vec![(1, 1.0)]];
        symmetrize(&mut rows);
        let p02 = lookup(&rows, 0, 2).unwrap();
        let p20 = lookup(&rows, 2, 0).unwrap();
        assert!((p02 - p20).abs() < 1e-15);
        assert!((p02 - 0.5 / 6.0).abs() < 1e-12);
        assert!((total(&rows) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rows_end_up_sorted() {
        let mut rows = vec![
            vec![(3, 0.5), (1, 0.5)],
            vec![(0, 1.0)],
            vec![(3, 1.0)],
            vec![(2, 1.0)],
        ];
        // rows must be index sorted before the fold
        for row in rows.iter_mut() {
            row.sort_unstable_by_key(|(j, _)| *j);
        }
        symmetrize(&mut rows);
        for row in rows.iter() {
            assert!(row.windows(2).all(|w| w[0].0 < w[1].0));
        }
        assert!((total(&rows) - 1.0).abs() < 1e-12);
    }
}
