//! Cadence changes: OHLCV binning, as-of forward fill onto a grid,
//! right-labelled N-day bins and calendar-year bins.

use crate::domain::{OhlcvSeries, TimeSeriesTable, OHLCV_COLUMNS};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Per-bin aggregation for [`BinGrid::aggregate`] and [`annual`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    /// Last defined value in the bin.
    Last,
    /// Mean of the defined values in the bin.
    Mean,
}

impl Agg {
    fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Agg::Last => values
                .iter()
                .rev()
                .copied()
                .find(|v| !v.is_nan())
                .unwrap_or(f64::NAN),
            Agg::Mean => crate::series::mean_defined(values).unwrap_or(f64::NAN),
        }
    }
}

/// Floor a timestamp to a multiple of `width` since the unix epoch.
pub fn floor_to(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let w = width.num_seconds().max(1);
    let floored = ts.timestamp().div_euclid(w) * w;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

/// Midnight UTC of the timestamp's day.
pub fn day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    floor_to(ts, Duration::days(1))
}

/// Bin an OHLCV table into floor-aligned bins of `width`.
///
/// open = first, high = max, low = min, close = last, volume = sum, each over
/// the defined values of the bin. Bins without an open or close are dropped.
pub fn resample_ohlcv(table: &TimeSeriesTable, width: Duration) -> Result<TimeSeriesTable> {
    if table.is_empty() {
        return Ok(TimeSeriesTable::default());
    }
    if width <= Duration::zero() {
        return Err(PipelineError::InvalidTable("bin width must be positive".into()));
    }
    let bars = OhlcvSeries::from_table(table)?;
    let index = table.index();

    let mut rows = Vec::new();
    let mut start = 0;
    while start < index.len() {
        let bin = floor_to(index[start], width);
        let mut end = start + 1;
        while end < index.len() && floor_to(index[end], width) == bin {
            end += 1;
        }

        let first = |xs: &[f64]| xs.iter().copied().find(|v| !v.is_nan());
        let last = |xs: &[f64]| xs.iter().rev().copied().find(|v| !v.is_nan());
        let open = first(&bars.open[start..end]);
        let close = last(&bars.close[start..end]);
        if let (Some(open), Some(close)) = (open, close) {
            let high = bars.high[start..end]
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .fold(f64::NAN, f64::max);
            let low = bars.low[start..end]
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .fold(f64::NAN, f64::min);
            let volume: f64 = bars.volume[start..end].iter().filter(|v| !v.is_nan()).sum();
            rows.push((bin, vec![open, high, low, close, volume]));
        }
        start = end;
    }

    let names: Vec<String> = OHLCV_COLUMNS.iter().map(|s| s.to_string()).collect();
    TimeSeriesTable::from_rows(&names, rows)
}

/// Carry each row of `table` forward onto `grid`: every grid timestamp gets
/// the last row at or before it. Grid timestamps before the first row are NaN.
pub fn as_of(table: &TimeSeriesTable, grid: &[DateTime<Utc>]) -> Result<TimeSeriesTable> {
    let positions: Vec<Option<usize>> = grid
        .iter()
        .map(|ts| {
            let n = table.index().partition_point(|t| t <= ts);
            n.checked_sub(1)
        })
        .collect();

    let mut out = TimeSeriesTable::new(grid.to_vec())?;
    for col in table.columns() {
        let values = positions
            .iter()
            .map(|p| p.map_or(f64::NAN, |i| col.values[i]))
            .collect();
        out.set_column(&col.name, values)?;
    }
    Ok(out)
}

/// Right-closed, right-labelled bins of fixed width anchored at `origin`.
///
/// A timestamp `t` belongs to the bin labelled
/// `origin + ceil((t - origin) / width) * width`, i.e. bin `(label - width, label]`.
#[derive(Debug, Clone)]
pub struct BinGrid {
    origin: DateTime<Utc>,
    width: Duration,
    labels: Vec<DateTime<Utc>>,
}

impl BinGrid {
    /// Grid covering `index`, anchored at midnight UTC of its first day.
    /// `None` for an empty index.
    pub fn covering(index: &[DateTime<Utc>], width: Duration) -> Option<Self> {
        let first = *index.first()?;
        let last = *index.last()?;
        let mut grid = Self {
            origin: day_start(first),
            width,
            labels: Vec::new(),
        };
        let mut label = grid.label_for(first);
        let end = grid.label_for(last);
        while label <= end {
            grid.labels.push(label);
            label += width;
        }
        Some(grid)
    }

    pub fn labels(&self) -> &[DateTime<Utc>] {
        &self.labels
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    pub fn label_for(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let w = self.width.num_seconds().max(1);
        let secs = (ts - self.origin).num_seconds();
        let k = secs.div_euclid(w) + i64::from(secs.rem_euclid(w) > 0);
        self.origin + Duration::seconds(k * w)
    }

    fn slot(&self, ts: DateTime<Utc>) -> Option<usize> {
        let first = *self.labels.first()?;
        let k = (self.label_for(ts) - first).num_seconds() / self.width.num_seconds().max(1);
        usize::try_from(k).ok().filter(|k| *k < self.labels.len())
    }

    /// Aggregate every column of `table` onto this grid. Rows outside the
    /// grid are ignored; bins without rows are NaN.
    pub fn aggregate(&self, table: &TimeSeriesTable, agg: Agg) -> Result<TimeSeriesTable> {
        let slots: Vec<Option<usize>> = table.index().iter().map(|ts| self.slot(*ts)).collect();
        let mut out = TimeSeriesTable::new(self.labels.clone())?;
        for col in table.columns() {
            let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); self.labels.len()];
            for (slot, v) in slots.iter().zip(&col.values) {
                if let Some(s) = slot {
                    buckets[*s].push(*v);
                }
            }
            let values = buckets.iter().map(|b| agg.apply(b)).collect();
            out.set_column(&col.name, values)?;
        }
        Ok(out)
    }
}

/// December 31, 00:00 UTC of `year`.
pub fn year_end(year: i32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 12, 31, 0, 0, 0).single()
}

/// One row per calendar year that has data, labelled at the year end.
pub fn annual(table: &TimeSeriesTable, agg: Agg) -> Result<TimeSeriesTable> {
    let mut years: Vec<i32> = table.index().iter().map(|ts| ts.year()).collect();
    years.dedup();
    let labels = years
        .iter()
        .map(|y| year_end(*y).ok_or_else(|| PipelineError::InvalidTable(format!("year {y}"))))
        .collect::<Result<Vec<_>>>()?;

    let mut out = TimeSeriesTable::new(labels)?;
    for col in table.columns() {
        let values = years
            .iter()
            .map(|year| {
                let in_year: Vec<f64> = table
                    .index()
                    .iter()
                    .zip(&col.values)
                    .filter(|(ts, _)| ts.year() == *year)
                    .map(|(_, v)| *v)
                    .collect();
                agg.apply(&in_year)
            })
            .collect();
        out.set_column(&col.name, values)?;
    }
    Ok(out)
}
