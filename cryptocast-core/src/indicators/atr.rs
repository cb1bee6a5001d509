//! Average True Range.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|); the first
//! row has no previous close and uses high-low.
//! ATR is the simple rolling mean of TR over `period` rows.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// True Range series.
pub fn true_range(bars: &OhlcvSeries<'_>) -> Vec<f64> {
    (0..bars.len())
        .map(|i| {
            let hl = bars.high[i] - bars.low[i];
            if i == 0 {
                return hl;
            }
            let pc = bars.close[i - 1];
            if pc.is_nan() {
                return hl;
            }
            hl.max((bars.high[i] - pc).abs()).max((bars.low[i] - pc).abs())
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        series::rolling_mean(&true_range(bars), self.period)
    }
}
