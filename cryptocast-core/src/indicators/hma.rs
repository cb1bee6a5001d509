//! Hull Moving Average.
//!
//! `HMA(n) = WMA(2 * WMA(close, n/2) - WMA(close, n), floor(sqrt(n)))`,
//! with `n/2` truncated and WMA weights `1..=window`.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

#[derive(Debug, Clone)]
pub struct Hma {
    period: usize,
    name: String,
}

impl Hma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "HMA period must be >= 2");
        Self {
            period,
            name: format!("hma_{period}"),
        }
    }

    fn half(&self) -> usize {
        self.period / 2
    }

    fn sqrt_n(&self) -> usize {
        ((self.period as f64).sqrt() as usize).max(1)
    }
}

impl Indicator for Hma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1 + self.sqrt_n() - 1
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        let half = series::wma(bars.close, self.half());
        let full = series::wma(bars.close, self.period);
        let raw: Vec<f64> = half.iter().zip(&full).map(|(h, f)| 2.0 * h - f).collect();
        series::wma(&raw, self.sqrt_n())
    }
}
