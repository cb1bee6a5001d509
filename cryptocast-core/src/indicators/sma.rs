//! Simple Moving Average of close.
//!
//! Strict window: undefined until `period` rows have accumulated.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// Column is named `ma_{period}`.
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("ma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        series::rolling_mean(bars.close, self.period)
    }
}
