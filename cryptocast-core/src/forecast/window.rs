//! Feature-table preparation and stride-1 sliding windows.

use crate::domain::TimeSeriesTable;
use crate::error::{PipelineError, Result};
use ndarray::{s, Array1, Array2, Array3};

/// Columns never fed to the network.
pub const EXCLUDED_COLUMNS: [&str; 2] = ["close", "log_return"];

/// Raw model inputs extracted from a feature table.
///
/// Row `t` pairs the features at `t` with `ln(close[t] / close[t-1])`. The
/// first table row has no previous close and is excluded.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub features: Array2<f64>,
    pub target: Array1<f64>,
    pub last_close: f64,
}

impl Dataset {
    pub fn from_table(table: &TimeSeriesTable) -> Result<Self> {
        let close = table.require("features", "close")?;
        if close.len() < 2 {
            return Err(PipelineError::insufficient("log-return target", 2, close.len()));
        }
        let columns: Vec<String> = table
            .column_names()
            .into_iter()
            .filter(|c| !EXCLUDED_COLUMNS.contains(&c.as_str()))
            .collect();
        if columns.is_empty() {
            return Err(PipelineError::InvalidTable(
                "feature table has no columns besides close".into(),
            ));
        }

        let rows = close.len() - 1;
        let mut features = Array2::zeros((rows, columns.len()));
        for (j, name) in columns.iter().enumerate() {
            let values = table.require("features", name)?;
            for i in 0..rows {
                features[[i, j]] = values[i + 1];
            }
        }
        let target = Array1::from_iter((1..close.len()).map(|i| (close[i] / close[i - 1]).ln()));
        if let Some(i) = target.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::InvalidTable(format!(
                "log-return undefined at row {}",
                i + 1
            )));
        }

        Ok(Self {
            columns,
            features,
            target,
            last_close: close[close.len() - 1],
        })
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Sliding windows: sample `i` is `features[i..i + lookback]` labelled with
/// `target[i + lookback]`. Requires more rows than `lookback`.
pub fn build_windows(
    features: &Array2<f64>,
    target: &Array1<f64>,
    lookback: usize,
) -> Result<(Array3<f64>, Array1<f64>)> {
    let n = features.nrows();
    if lookback == 0 || n <= lookback {
        return Err(PipelineError::insufficient("windowing", lookback + 1, n));
    }
    let samples = n - lookback;
    let mut x = Array3::zeros((samples, lookback, features.ncols()));
    for i in 0..samples {
        x.slice_mut(s![i, .., ..])
            .assign(&features.slice(s![i..i + lookback, ..]));
    }
    let y = target.slice(s![lookback..]).to_owned();
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_table, DEFAULT_EPSILON};
    use ndarray::array;

    #[test]
    fn dataset_drops_close_and_first_row() {
        let mut table = make_table(&[100.0, 110.0, 99.0]);
        table.set_column("log_return", vec![0.0; 3]).unwrap();
        let ds = Dataset::from_table(&table).unwrap();
        assert_eq!(ds.columns, vec!["open", "high", "low", "volume"]);
        assert_eq!(ds.len(), 2);
        assert_approx(ds.target[0], (110.0f64 / 100.0).ln(), DEFAULT_EPSILON);
        // features of row 1: open = previous close
        assert_eq!(ds.features[[0, 0]], 100.0);
        assert_eq!(ds.last_close, 99.0);
    }

    #[test]
    fn windows_pair_history_with_next_target() {
        let f = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let t = array![10.0, 11.0, 12.0, 13.0, 14.0];
        let (x, y) = build_windows(&f, &t, 3).unwrap();
        assert_eq!(x.shape(), &[2, 3, 1]);
        assert_eq!(x.slice(s![1, .., 0]).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(y.to_vec(), vec![13.0, 14.0]);
    }

    #[test]
    fn too_few_rows_is_insufficient() {
        let f = array![[0.0], [1.0]];
        let t = array![0.0, 0.0];
        assert!(matches!(
            build_windows(&f, &t, 2),
            Err(PipelineError::InsufficientHistory { .. })
        ));
    }
}
