//! Technical indicators over an OHLCV table.
//!
//! Every indicator implements [`Indicator`]: a pure function from the OHLCV
//! columns to one output series of the same length, NaN during warmup.
//! [`IndicatorEngine`] runs a set of them and appends the results as columns.

pub mod atr;
pub mod basic;
pub mod ema;
pub mod engine;
pub mod hma;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod volatility;
pub mod volume;

pub use atr::Atr;
pub use basic::{HlRange, OcDiff, Ret};
pub use ema::Ema;
pub use engine::IndicatorEngine;
pub use hma::Hma;
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
pub use volatility::RetStd;
pub use volume::{Obv, VolChange, Vwap};

use crate::domain::OhlcvSeries;

/// A derived series computed from OHLCV columns.
///
/// No value at row t may depend on rows after t.
pub trait Indicator: Send + Sync {
    /// Output column name (e.g. "ma_21", "atr_14").
    fn name(&self) -> &str;

    /// Number of leading rows that are NaN on clean input.
    fn lookback(&self) -> usize;

    /// Compute the indicator over the full series. Output length equals input length.
    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64>;
}

/// Create an hourly OHLCV table from close prices for testing.
///
/// open = prev_close (or close for the first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_table(closes: &[f64]) -> crate::domain::TimeSeriesTable {
    use crate::domain::{OhlcvBar, TimeSeriesTable};
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars: Vec<OhlcvBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            OhlcvBar {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect();
    TimeSeriesTable::from_bars(&bars).unwrap()
}

/// Run one indicator over closes via [`make_table`].
#[cfg(test)]
pub fn compute_on(indicator: &dyn Indicator, closes: &[f64]) -> Vec<f64> {
    let table = make_table(closes);
    let series = OhlcvSeries::from_table(&table).unwrap();
    indicator.compute(&series)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
