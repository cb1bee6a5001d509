//! Synthetic market tables shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use cryptocast_core::domain::{OhlcvBar, TimeSeriesTable};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Bars `step` apart from [`start`], open = previous close.
pub fn bars(closes: &[f64], step: Duration) -> TimeSeriesTable {
    let bars: Vec<OhlcvBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            OhlcvBar {
                timestamp: start() + step * i as i32,
                open,
                high: open.max(close) * 1.002,
                low: open.min(close) * 0.998,
                close,
                volume: 1_000.0 + (i % 17) as f64 * 25.0,
            }
        })
        .collect();
    TimeSeriesTable::from_bars(&bars).unwrap()
}

pub fn hourly(closes: &[f64]) -> TimeSeriesTable {
    bars(closes, Duration::hours(1))
}

/// `n` hourly closes that wander around a slow trend and end exactly at
/// `last`.
pub fn wandering_closes(n: usize, last: f64) -> Vec<f64> {
    let raw: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.02 * t + 1.5 * (t / 7.0).sin() + 0.6 * (t / 3.0).cos()
        })
        .collect();
    let scale = last / raw[n - 1];
    let mut out: Vec<f64> = raw.iter().map(|c| c * scale).collect();
    out[n - 1] = last;
    out
}

/// Daily table with a single value column, starting at [`start`].
pub fn daily_column(name: &str, values: &[f64]) -> TimeSeriesTable {
    let index = (0..values.len())
        .map(|i| start() + Duration::days(i as i64))
        .collect();
    let mut t = TimeSeriesTable::new(index).unwrap();
    t.set_column(name, values.to_vec()).unwrap();
    t
}
