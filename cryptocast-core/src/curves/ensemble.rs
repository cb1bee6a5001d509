//! Five-year ensemble curve: two random forests over the long-horizon grid
//! (forward log-return and forward volatility), evaluated on an annual grid.

use crate::curves::forest::{r2_score, ForestConfig, RandomForest};
use crate::data::resample::{annual, year_end, Agg};
use crate::domain::TimeSeriesTable;
use crate::error::{PipelineError, Result};
use crate::features::{is_target, target_return_column, target_vol_column};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Forecast horizon of the curve.
pub const HORIZON_DAYS: usize = 1825;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub start_year: i32,
    pub end_year: i32,
    pub sigma_multiplier: f64,
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            start_year: 2012,
            end_year: 2031,
            sigma_multiplier: 1.0,
            n_trees: 500,
            max_depth: 12,
            min_samples_leaf: 3,
            min_samples_split: 2,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl EnsembleConfig {
    pub fn forest(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            seed: self.seed,
        }
    }
}

/// Hold-out quality of one regressor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub r2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleReport {
    pub feature_columns: Vec<String>,
    pub log_return: TargetReport,
    pub volatility: TargetReport,
}

/// One curve point.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleCurveRow {
    pub current_timestamp: DateTime<Utc>,
    pub horizon_timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub pred_log_return_5y: f64,
    pub pred_vol_5y: f64,
    pub pred_price_5y: f64,
    pub pred_price_5y_low_1sigma: f64,
    pub pred_price_5y_high_1sigma: f64,
}

/// A forest plus the training-column means used to fill undefined cells.
#[derive(Debug, Clone)]
pub struct TargetModel {
    forest: RandomForest,
    fill: Vec<f64>,
}

impl TargetModel {
    /// Fit on the rows of `grid` whose `target` is defined. The most recent
    /// `test_fraction` of those rows is held out for the R² report.
    pub fn fit(
        grid: &TimeSeriesTable,
        features: &[String],
        target: &str,
        config: &EnsembleConfig,
    ) -> Result<(Self, TargetReport)> {
        let Some(y_all) = grid.column(target) else {
            return Err(PipelineError::insufficient(
                &format!("ensemble curve ({target})"),
                HORIZON_DAYS,
                0,
            ));
        };
        let rows: Vec<usize> = (0..grid.len()).filter(|&i| y_all[i].is_finite()).collect();
        let n = rows.len();
        let n_test = ((n as f64) * config.test_fraction).ceil() as usize;
        let n_train = n.saturating_sub(n_test);
        if n_train == 0 {
            return Err(PipelineError::insufficient(
                &format!("ensemble training ({target})"),
                n_test + 1,
                n,
            ));
        }

        let raw = matrix(grid, features, &rows)?;
        let y: Vec<f64> = rows.iter().map(|&i| y_all[i]).collect();
        let fill = column_means(&raw[..n_train], features.len());
        let x: Vec<Vec<f64>> = raw.iter().map(|r| impute(r, &fill)).collect();

        let forest = RandomForest::fit(&x[..n_train], &y[..n_train], &config.forest())?;
        let r2 = r2_score(&y[n_train..], &forest.predict(&x[n_train..]));
        tracing::info!(target, train_rows = n_train, test_rows = n_test, r2, "ensemble regressor fitted");

        Ok((
            Self { forest, fill },
            TargetReport {
                target: target.to_string(),
                train_rows: n_train,
                test_rows: n_test,
                r2,
            },
        ))
    }

    pub fn predict_row(&self, raw: &[f64]) -> f64 {
        self.forest.predict_one(&impute(raw, &self.fill))
    }
}

fn matrix(table: &TimeSeriesTable, features: &[String], rows: &[usize]) -> Result<Vec<Vec<f64>>> {
    let cols = features
        .iter()
        .map(|f| table.require("long-horizon grid", f))
        .collect::<Result<Vec<_>>>()?;
    Ok(rows
        .iter()
        .map(|&i| cols.iter().map(|c| c[i]).collect())
        .collect())
}

/// Mean of the finite values per column; 0.0 for a column with none.
fn column_means(rows: &[Vec<f64>], width: usize) -> Vec<f64> {
    (0..width)
        .map(|j| {
            let col: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            crate::series::mean_defined(&col).unwrap_or(0.0)
        })
        .collect()
}

fn impute(row: &[f64], fill: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(fill)
        .map(|(v, m)| if v.is_finite() { *v } else { *m })
        .collect()
}

/// Annual grid for `start_year..=end_year`, clamped to the years present in
/// `grid`. Each year takes the annual row nearest to its December 31.
pub fn annual_grid(grid: &TimeSeriesTable, start_year: i32, end_year: i32) -> Result<TimeSeriesTable> {
    let yearly = annual(grid, Agg::Last)?;
    let (Some(first), Some(last)) = (yearly.index().first(), yearly.index().last()) else {
        return Err(PipelineError::missing_input("long-horizon grid", "table is empty"));
    };
    let start = start_year.max(first.year());
    let end = end_year.min(last.year());
    if start > end {
        return Err(PipelineError::InvalidTable(format!(
            "requested years {start_year}..={end_year} do not overlap {}..={}",
            first.year(),
            last.year()
        )));
    }

    let labels: Vec<DateTime<Utc>> = (start..=end).filter_map(year_end).collect();
    let picks: Vec<usize> = labels
        .iter()
        .map(|ts| nearest(yearly.index(), *ts))
        .collect();
    let mut out = TimeSeriesTable::new(labels)?;
    for col in yearly.columns() {
        out.set_column(&col.name, picks.iter().map(|&i| col.values[i]).collect())?;
    }
    Ok(out)
}

/// Position of the timestamp closest to `ts`. Ties go to the earlier one.
fn nearest(index: &[DateTime<Utc>], ts: DateTime<Utc>) -> usize {
    let after = index.partition_point(|t| *t < ts);
    if after == 0 {
        return 0;
    }
    if after == index.len() {
        return index.len() - 1;
    }
    if ts - index[after - 1] <= index[after] - ts {
        after - 1
    } else {
        after
    }
}

/// Train both regressors on the long-horizon grid and project five-year
/// prices for each year of the annual grid.
pub fn build_ensemble_curve(
    grid: &TimeSeriesTable,
    config: &EnsembleConfig,
) -> Result<(Vec<EnsembleCurveRow>, EnsembleReport)> {
    if grid.is_empty() {
        return Err(PipelineError::missing_input("long-horizon grid", "table is empty"));
    }
    let features: Vec<String> = grid
        .column_names()
        .into_iter()
        .filter(|c| !is_target(c))
        .collect();
    let ret_col = target_return_column(HORIZON_DAYS);
    let vol_col = target_vol_column(HORIZON_DAYS);
    let (ret_model, ret_report) = TargetModel::fit(grid, &features, &ret_col, config)?;
    let (vol_model, vol_report) = TargetModel::fit(grid, &features, &vol_col, config)?;

    let yearly = annual_grid(grid, config.start_year, config.end_year)?;
    let prices = yearly.require("long-horizon grid", "price_close")?;
    let all_rows: Vec<usize> = (0..yearly.len()).collect();
    let x = matrix(&yearly, &features, &all_rows)?;
    let horizon = Duration::days(HORIZON_DAYS as i64);

    let rows: Vec<EnsembleCurveRow> = yearly
        .index()
        .iter()
        .zip(prices)
        .zip(&x)
        .map(|((ts, price), raw)| {
            let r = ret_model.predict_row(raw);
            let sigma = vol_model.predict_row(raw);
            let band = config.sigma_multiplier * sigma;
            EnsembleCurveRow {
                current_timestamp: *ts,
                horizon_timestamp: *ts + horizon,
                current_price: *price,
                pred_log_return_5y: r,
                pred_vol_5y: sigma,
                pred_price_5y: price * r.exp(),
                pred_price_5y_low_1sigma: price * (r - band).exp(),
                pred_price_5y_high_1sigma: price * (r + band).exp(),
            }
        })
        .collect();

    tracing::info!(
        years = rows.len(),
        features = features.len(),
        r2_log_return = ret_report.r2,
        r2_vol = vol_report.r2,
        "ensemble curve built"
    );
    Ok((
        rows,
        EnsembleReport {
            feature_columns: features,
            log_return: ret_report,
            volatility: vol_report,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    /// Quarterly grid 2014..2021 with a 5y target that depends on `x`.
    fn grid() -> TimeSeriesTable {
        let index: Vec<_> = (0..32)
            .map(|i| ymd(2014 + i / 4, 1 + 3 * (i % 4) as u32, 15))
            .collect();
        let n = index.len();
        let mut t = TimeSeriesTable::new(index).unwrap();
        let x: Vec<f64> = (0..n).map(|i| (i % 7) as f64).collect();
        t.set_column("price_close", (0..n).map(|i| 100.0 + i as f64).collect())
            .unwrap();
        t.set_column("x", x.clone()).unwrap();
        let defined = |i: usize, v: f64| if i < 24 { v } else { f64::NAN };
        t.set_column(
            "target_log_return_5y",
            (0..n).map(|i| defined(i, 0.1 * x[i])).collect(),
        )
        .unwrap();
        t.set_column("target_vol_5y", (0..n).map(|i| defined(i, 0.5)).collect())
            .unwrap();
        t.set_column("target_log_return_1y", vec![0.0; n]).unwrap();
        t
    }

    fn small() -> EnsembleConfig {
        EnsembleConfig {
            n_trees: 20,
            min_samples_leaf: 1,
            ..EnsembleConfig::default()
        }
    }

    #[test]
    fn nearest_prefers_closest_then_earlier() {
        let idx = [ymd(2020, 1, 1), ymd(2020, 1, 11)];
        assert_eq!(nearest(&idx, ymd(2019, 1, 1)), 0);
        assert_eq!(nearest(&idx, ymd(2020, 1, 6)), 0);
        assert_eq!(nearest(&idx, ymd(2020, 1, 8)), 1);
        assert_eq!(nearest(&idx, ymd(2030, 1, 1)), 1);
    }

    #[test]
    fn annual_grid_is_clamped_to_observed_years() {
        let g = annual_grid(&grid(), 2010, 2040).unwrap();
        assert_eq!(g.index().first().copied(), Some(ymd(2014, 12, 31)));
        assert_eq!(g.index().last().copied(), Some(ymd(2021, 12, 31)));
        assert_eq!(g.len(), 8);
        // last quarter of 2014 is row 3
        assert_eq!(g.column("price_close").unwrap()[0], 103.0);
    }

    #[test]
    fn curve_rows_follow_band_formula() {
        let (rows, report) = build_ensemble_curve(&grid(), &small()).unwrap();
        assert_eq!(report.feature_columns, vec!["price_close", "x"]);
        assert_eq!(report.log_return.train_rows + report.log_return.test_rows, 24);
        assert_eq!(report.log_return.test_rows, 5);
        assert_eq!(rows.len(), 8);
        for r in &rows {
            assert_eq!(r.horizon_timestamp - r.current_timestamp, Duration::days(1825));
            let expected = r.current_price * r.pred_log_return_5y.exp();
            assert!((r.pred_price_5y - expected).abs() < 1e-9 * expected);
            assert!((r.pred_vol_5y - 0.5).abs() < 1e-12);
            let high = r.current_price * (r.pred_log_return_5y + 0.5).exp();
            assert!((r.pred_price_5y_high_1sigma - high).abs() < 1e-9 * high);
            assert!(r.pred_price_5y_low_1sigma < r.pred_price_5y);
        }
    }

    #[test]
    fn missing_five_year_target_is_insufficient_history() {
        let mut g = grid();
        g.remove_column("target_log_return_5y");
        assert!(matches!(
            build_ensemble_curve(&g, &small()),
            Err(PipelineError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn undefined_features_are_mean_imputed() {
        let fill = column_means(&[vec![1.0, f64::NAN], vec![3.0, f64::NAN]], 2);
        assert_eq!(fill, vec![2.0, 0.0]);
        assert_eq!(impute(&[f64::NAN, 5.0], &fill), vec![2.0, 5.0]);
    }
}
