//! Long-horizon feature grid: daily rolling features and forward targets,
//! binned to fixed-width (default 15-day) right-labelled bins.

use crate::data::resample::{resample_ohlcv, Agg, BinGrid};
use crate::domain::TimeSeriesTable;
use crate::error::{PipelineError, Result};
use crate::features::SourceTables;
use crate::series;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Daily rows required beyond a non-primary horizon before its targets are built.
const HORIZON_MARGIN_DAYS: usize = 10;

/// The horizon whose targets are always built.
const PRIMARY_HORIZON_DAYS: usize = 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LongHorizonConfig {
    pub bin_days: u32,
    pub horizons_days: Vec<usize>,
}

impl Default for LongHorizonConfig {
    fn default() -> Self {
        Self {
            bin_days: 15,
            horizons_days: vec![365, 1825],
        }
    }
}

/// "1y" for 365 days, "5y" for 1825, otherwise "{days}d".
pub fn horizon_label(days: usize) -> String {
    if days > 0 && days % 365 == 0 {
        format!("{}y", days / 365)
    } else {
        format!("{days}d")
    }
}

/// Whether a long-horizon column is a forward-looking target.
pub fn is_target(name: &str) -> bool {
    name.starts_with("target_")
}

pub fn target_return_column(days: usize) -> String {
    format!("target_log_return_{}", horizon_label(days))
}

pub fn target_vol_column(days: usize) -> String {
    format!("target_vol_{}", horizon_label(days))
}

/// Realised std of daily log-returns over the `window` days starting at each row.
///
/// Computed as a trailing rolling std over the reversed series, reversed back.
pub fn forward_volatility(log_returns: &[f64], window: usize) -> Vec<f64> {
    let reversed: Vec<f64> = log_returns.iter().rev().copied().collect();
    let mut vol = series::rolling_std(&reversed, window);
    vol.reverse();
    vol
}

/// `ln(close[t + horizon] / close[t])`, undefined for the trailing `horizon` rows.
pub fn forward_log_return(close: &[f64], horizon: usize) -> Vec<f64> {
    let ahead = series::shift(close, -(horizon as isize));
    ahead.iter().zip(close).map(|(f, c)| (f / c).ln()).collect()
}

pub struct LongHorizonBuilder {
    config: LongHorizonConfig,
}

impl LongHorizonBuilder {
    pub fn new(config: LongHorizonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LongHorizonConfig {
        &self.config
    }

    fn bin_width(&self) -> Duration {
        Duration::days(i64::from(self.config.bin_days.max(1)))
    }

    /// Daily close plus rolling features and forward targets.
    pub fn daily_features(&self, market: &TimeSeriesTable) -> Result<TimeSeriesTable> {
        if market.is_empty() {
            return Err(PipelineError::missing_input("market", "table is empty"));
        }
        let daily = resample_ohlcv(market, Duration::days(1))?;
        let close = daily.require("market", "close")?.to_vec();
        if close.len() < 2 {
            return Err(PipelineError::insufficient("daily features", 2, close.len()));
        }

        let lr = series::log_return(&close, 1);
        let rolling_max = series::rolling_max(&close, 180);
        let drawdown: Vec<f64> = close
            .iter()
            .zip(&rolling_max)
            .map(|(c, m)| c / m - 1.0)
            .collect();

        let mut out = TimeSeriesTable::new(daily.index().to_vec())?;
        out.set_column("close", close.clone())?;
        out.set_column("log_return_1d", lr.clone())?;
        out.set_column("sma_30d", series::rolling_mean(&close, 30))?;
        out.set_column("sma_90d", series::rolling_mean(&close, 90))?;
        out.set_column("sma_180d", series::rolling_mean(&close, 180))?;
        out.set_column("vol_30d", series::rolling_std(&lr, 30))?;
        out.set_column("vol_90d", series::rolling_std(&lr, 90))?;
        out.set_column("drawdown_180d", drawdown)?;

        for &h in &self.config.horizons_days {
            if h != PRIMARY_HORIZON_DAYS && close.len() <= h + HORIZON_MARGIN_DAYS {
                tracing::info!(
                    horizon = %horizon_label(h),
                    daily_rows = close.len(),
                    "not enough history for horizon targets; skipped"
                );
                continue;
            }
            out.set_column(&target_return_column(h), forward_log_return(&close, h))?;
            out.set_column(&target_vol_column(h), forward_volatility(&lr, h))?;
        }
        Ok(out)
    }

    /// Build the binned long-horizon grid from the market table and any
    /// exogenous tables supplied.
    pub fn build(&self, inputs: &SourceTables<'_>) -> Result<TimeSeriesTable> {
        let daily = self.daily_features(inputs.market)?;
        let width = self.bin_width();
        let Some(grid) = BinGrid::covering(daily.index(), width) else {
            return Err(PipelineError::missing_input("market", "no daily rows"));
        };
        let days = self.config.bin_days;

        let binned = grid.aggregate(&daily, Agg::Last)?;
        let price = binned.require("market", "close")?.to_vec();

        let mut out = TimeSeriesTable::new(binned.index().to_vec())?;
        out.set_column("price_close", price.clone())?;
        for k in [1usize, 2, 6] {
            let name = format!("log_return_{}d", k * days as usize);
            out.set_column(&name, series::log_return(&price, k))?;
        }
        for name in [
            "sma_30d",
            "sma_90d",
            "sma_180d",
            "vol_30d",
            "vol_90d",
            "drawdown_180d",
        ] {
            if let Some(values) = binned.column(name) {
                out.set_column(name, values.to_vec())?;
            }
        }

        if inputs.onchain.width() > 0 {
            out.join_left(&grid.aggregate(inputs.onchain, Agg::Mean)?)?;
        }

        if inputs.macro_data.width() > 0 {
            let macro_bins = grid.aggregate(inputs.macro_data, Agg::Last)?;
            out.join_left(&macro_bins)?;
            for (level, label) in [("sp500_close", "sp500"), ("dxy_close", "dxy")] {
                if let Some(values) = macro_bins.column(level) {
                    out.set_column(
                        &format!("{label}_{days}d_return"),
                        series::log_return(values, 1),
                    )?;
                }
            }
        }

        if inputs.sentiment.width() > 0 {
            let sent_bins = grid.aggregate(inputs.sentiment, Agg::Mean)?;
            for name in ["news_sentiment", "fear_greed"] {
                if let Some(values) = sent_bins.column(name) {
                    out.set_column(name, values.to_vec())?;
                    out.set_column(&format!("{name}_{days}d_mean"), values.to_vec())?;
                }
            }
            if let Some(ns) = sent_bins.column("news_sentiment") {
                out.set_column(
                    &format!("news_sentiment_{days}d_trend"),
                    series::diff(ns, 1),
                )?;
            }
        }

        for col in binned.columns().iter().filter(|c| is_target(&c.name)) {
            out.set_column(&col.name, col.values.clone())?;
        }

        tracing::info!(
            bins = out.len(),
            columns = out.width(),
            daily_rows = daily.len(),
            "long-horizon grid built"
        );
        Ok(out)
    }
}

impl Default for LongHorizonBuilder {
    fn default() -> Self {
        Self::new(LongHorizonConfig::default())
    }
}
