//! Per-column min-max scaling to [0, 1].

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted min-max parameters, one entry per column.
///
/// A constant column has zero range; its scale is taken as 1 so it maps to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit over every row of `data`. Fails on empty input or non-finite values.
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(PipelineError::insufficient("scaler fit", 1, 0));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            let (row, col) = (pos / data.ncols().max(1), pos % data.ncols().max(1));
            return Err(PipelineError::InvalidTable(format!(
                "non-finite value at row {row}, column {col}"
            )));
        }
        let min = data
            .axis_iter(Axis(1))
            .map(|c| c.iter().copied().fold(f64::INFINITY, f64::min))
            .collect();
        let max = data
            .axis_iter(Axis(1))
            .map(|c| c.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect();
        Ok(Self { min, max })
    }

    /// Fit a single-column scaler over a vector.
    pub fn fit_vector(values: &Array1<f64>) -> Result<Self> {
        Self::fit(&values.clone().insert_axis(Axis(1)))
    }

    pub fn n_columns(&self) -> usize {
        self.min.len()
    }

    fn scale(&self, col: usize) -> f64 {
        let range = self.max[col] - self.min[col];
        if range == 0.0 {
            1.0
        } else {
            range
        }
    }

    pub fn transform_value(&self, col: usize, v: f64) -> f64 {
        (v - self.min[col]) / self.scale(col)
    }

    pub fn inverse_value(&self, col: usize, v: f64) -> f64 {
        v * self.scale(col) + self.min[col]
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut out = data.clone();
        for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| self.transform_value(col, v));
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut out = data.clone();
        for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| self.inverse_value(col, v));
        }
        Ok(out)
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_columns() {
            return Err(PipelineError::ArtifactMismatch {
                expected: format!("{} scaled columns", self.n_columns()),
                found: format!("{width} columns"),
            });
        }
        Ok(())
    }
}
