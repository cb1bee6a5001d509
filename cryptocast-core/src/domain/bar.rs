//! OHLCV bars and a borrowed column view over an OHLCV table.

use crate::domain::table::TimeSeriesTable;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Required market columns, in canonical order.
pub const OHLCV_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// One market bar.
///
/// Prices are expected positive with high/low bracketing open/close; this is
/// checked by [`OhlcvBar::is_sane`] but not enforced on ingestion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.open > 0.0
            && self.close > 0.0
    }
}

impl TimeSeriesTable {
    /// Build an OHLCV table from bars (sorted, duplicates last-wins).
    pub fn from_bars(bars: &[OhlcvBar]) -> Result<Self> {
        let names: Vec<String> = OHLCV_COLUMNS.iter().map(|s| s.to_string()).collect();
        Self::from_rows(
            &names,
            bars.iter().map(|b| {
                (
                    b.timestamp,
                    vec![b.open, b.high, b.low, b.close, b.volume],
                )
            }),
        )
    }
}

/// Borrowed OHLCV columns of a table.
#[derive(Debug, Clone, Copy)]
pub struct OhlcvSeries<'a> {
    pub open: &'a [f64],
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
    pub volume: &'a [f64],
}

impl<'a> OhlcvSeries<'a> {
    /// Borrow the OHLCV columns, failing with `MissingInput` if any is absent.
    pub fn from_table(table: &'a TimeSeriesTable) -> Result<Self> {
        Ok(Self {
            open: table.require("market", "open")?,
            high: table.require("market", "high")?,
            low: table.require("market", "low")?,
            close: table.require("market", "close")?,
            volume: table.require("market", "volume")?,
        })
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Number of rows whose bar fails [`OhlcvBar::is_sane`].
    pub fn insane_rows(&self, index: &[DateTime<Utc>]) -> usize {
        index
            .iter()
            .enumerate()
            .filter(|&(i, &timestamp)| {
                !OhlcvBar {
                    timestamp,
                    open: self.open[i],
                    high: self.high[i],
                    low: self.low[i],
                    close: self.close[i],
                    volume: self.volume[i],
                }
                .is_sane()
            })
            .count()
    }
}

/// Fail with `MissingInput` unless the table has every OHLCV column.
pub fn ensure_ohlcv(table: &TimeSeriesTable) -> Result<()> {
    let missing: Vec<&str> = OHLCV_COLUMNS
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::missing_input(
            "market",
            format!("missing columns: {}", missing.join(", ")),
        ))
    }
}
