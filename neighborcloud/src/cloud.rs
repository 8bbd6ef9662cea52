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

//! In memory, dense point data.

use crate::errors::{NeighborCloudError, NeighborCloudResult};
use crate::PointIndex;
use ndarray::{ArrayView2, ShapeError};

/// A contiguous, observation major block of `f64` coordinates. Observation `n` occupies
/// `data[n*dim .. (n+1)*dim]`.
#[derive(Debug, Clone)]
pub struct DenseCloud {
    data: Vec<f64>,
    dim: usize,
}

impl DenseCloud {
    /// Wraps a flat buffer. The length has to be a whole number of points.
    pub fn new(data: Vec<f64>, dim: usize) -> NeighborCloudResult<DenseCloud> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(NeighborCloudError::BadShape {
                len: data.len(),
                dim,
            });
        }
        Ok(DenseCloud { data, dim })
    }

    /// Copies a 2d ndarray view, one observation per row.
    pub fn from_ndarray(view: ArrayView2<f64>) -> DenseCloud {
        let dim = view.ncols();
        let mut data = Vec::with_capacity(view.nrows() * dim);
        for row in view.rows() {
            data.extend(row.iter().cloned());
        }
        DenseCloud { data, dim }
    }

    /// A read only matrix view of the data, N rows by `dim` columns.
    pub fn view(&self) -> Result<ArrayView2<'_, f64>, ShapeError> {
        ArrayView2::from_shape((self.len(), self.dim), &self.data[..])
    }

    /// The number of observations this cloud covers
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    /// If this is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The dimension of the underlying data
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Gets a point from this dataset
    pub fn point(&self, pn: PointIndex) -> &[f64] {
        &self.data[pn * self.dim..(pn + 1) * self.dim]
    }
}
