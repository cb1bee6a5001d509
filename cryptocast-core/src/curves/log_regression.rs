//! Log-price trend curve.
//!
//! Weighted least squares of `ln(close)` on elapsed days with linearly
//! increasing weights (recent days count more). The intercept is then
//! re-anchored so the line passes through the last observed close, and the
//! band width is the residual std around the re-anchored line.

use crate::data::resample::{resample_ohlcv, year_end};
use crate::domain::TimeSeriesTable;
use crate::error::{PipelineError, Result};
use crate::series;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCurveConfig {
    pub end_year: i32,
    pub sigma_multiplier: f64,
    pub weight_start: f64,
    pub weight_end: f64,
}

impl Default for LogCurveConfig {
    fn default() -> Self {
        Self {
            end_year: 2030,
            sigma_multiplier: 1.0,
            weight_start: 0.3,
            weight_end: 1.0,
        }
    }
}

/// Fitted, re-anchored trend line: `ln(price) = intercept + slope · days`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogCurveModel {
    pub slope: f64,
    pub intercept: f64,
    /// Population std of residuals against the re-anchored line.
    pub sigma: f64,
    /// Day zero.
    pub origin: DateTime<Utc>,
}

/// One curve point.
#[derive(Debug, Clone, Serialize)]
pub struct LogCurveRow {
    pub timestamp: DateTime<Utc>,
    pub pred_log_price: f64,
    pub pred_price: f64,
    pub pred_price_low: f64,
    pub pred_price_high: f64,
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![end],
        _ => (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

impl LogCurveModel {
    /// Fit on a close series. Non-positive or undefined closes are skipped.
    pub fn fit(index: &[DateTime<Utc>], close: &[f64], config: &LogCurveConfig) -> Result<Self> {
        let points: Vec<(DateTime<Utc>, f64)> = index
            .iter()
            .zip(close)
            .filter(|(_, c)| c.is_finite() && **c > 0.0)
            .map(|(ts, c)| (*ts, c.ln()))
            .collect();
        if points.len() < 2 {
            return Err(PipelineError::insufficient("log curve fit", 2, points.len()));
        }
        let origin = points[0].0;
        let days = |ts: DateTime<Utc>| (ts - origin).num_seconds() as f64 / SECONDS_PER_DAY;
        let t: Vec<f64> = points.iter().map(|(ts, _)| days(*ts)).collect();
        let y: Vec<f64> = points.iter().map(|(_, lp)| *lp).collect();
        let w = linspace(config.weight_start, config.weight_end, points.len());

        let w_sum: f64 = w.iter().sum();
        let t_bar = w.iter().zip(&t).map(|(w, t)| w * t).sum::<f64>() / w_sum;
        let y_bar = w.iter().zip(&y).map(|(w, y)| w * y).sum::<f64>() / w_sum;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for ((wi, ti), yi) in w.iter().zip(&t).zip(&y) {
            sxy += wi * (ti - t_bar) * (yi - y_bar);
            sxx += wi * (ti - t_bar) * (ti - t_bar);
        }
        if sxx == 0.0 {
            return Err(PipelineError::insufficient("log curve fit (distinct days)", 2, 1));
        }
        let slope = sxy / sxx;
        let fitted_intercept = y_bar - slope * t_bar;

        let (t_last, y_last) = (t[t.len() - 1], y[y.len() - 1]);
        let intercept = y_last - slope * t_last;
        let residuals: Vec<f64> = t
            .iter()
            .zip(&y)
            .map(|(ti, yi)| yi - (intercept + slope * ti))
            .collect();
        let sigma = series::std_population(&residuals);

        tracing::debug!(slope, fitted_intercept, intercept, sigma, "log curve fitted");
        Ok(Self {
            slope,
            intercept,
            sigma,
            origin,
        })
    }

    pub fn days_since_origin(&self, ts: DateTime<Utc>) -> f64 {
        (ts - self.origin).num_seconds() as f64 / SECONDS_PER_DAY
    }

    pub fn predict_log(&self, ts: DateTime<Utc>) -> f64 {
        self.intercept + self.slope * self.days_since_origin(ts)
    }

    pub fn predict_price(&self, ts: DateTime<Utc>) -> f64 {
        self.predict_log(ts).exp()
    }

    /// One row per year end from `start_year` through `end_year`, with
    /// bands at `±sigma_multiplier · sigma` in log space.
    pub fn curve(&self, start_year: i32, end_year: i32, sigma_multiplier: f64) -> Vec<LogCurveRow> {
        let band = sigma_multiplier * self.sigma;
        (start_year..=end_year)
            .filter_map(year_end)
            .map(|ts| {
                let lp = self.predict_log(ts);
                LogCurveRow {
                    timestamp: ts,
                    pred_log_price: lp,
                    pred_price: lp.exp(),
                    pred_price_low: (lp - band).exp(),
                    pred_price_high: (lp + band).exp(),
                }
            })
            .collect()
    }
}

/// Fit on the daily closes of the market table and extrapolate from the
/// first historical year through `config.end_year`.
pub fn build_log_curve(
    market: &TimeSeriesTable,
    config: &LogCurveConfig,
) -> Result<(LogCurveModel, Vec<LogCurveRow>)> {
    if market.is_empty() {
        return Err(PipelineError::missing_input("market", "table is empty"));
    }
    let daily = resample_ohlcv(market, Duration::days(1))?;
    let close = daily.require("market", "close")?;
    let model = LogCurveModel::fit(daily.index(), close, config)?;
    let first_year = daily.index()[0].year();
    if config.end_year < first_year {
        return Err(PipelineError::InvalidTable(format!(
            "log curve end year {} precedes first market year {first_year}",
            config.end_year
        )));
    }
    let rows = model.curve(first_year, config.end_year, config.sigma_multiplier);
    tracing::info!(
        daily_rows = daily.len(),
        years = rows.len(),
        slope_per_day = model.slope,
        sigma = model.sigma,
        "log-regression curve built"
    );
    Ok((model, rows))
}
