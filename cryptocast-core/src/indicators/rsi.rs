//! Relative Strength Index.
//!
//! Gains and losses of close-to-close changes are averaged with a simple
//! rolling mean over `period` changes, so the first `period` rows are undefined.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//! Edge case: avg_loss == 0 → RSI = 100 (including a flat window).

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        let changes = series::diff(bars.close, 1);
        let gains: Vec<f64> = changes
            .iter()
            .map(|&d| if d.is_nan() { d } else { d.max(0.0) })
            .collect();
        let losses: Vec<f64> = changes
            .iter()
            .map(|&d| if d.is_nan() { d } else { (-d).max(0.0) })
            .collect();

        let avg_gain = series::rolling_mean(&gains, self.period);
        let avg_loss = series::rolling_mean(&losses, self.period);

        avg_gain
            .iter()
            .zip(&avg_loss)
            .map(|(&g, &l)| compute_rsi(g, l))
            .collect()
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain.is_nan() || avg_loss.is_nan() {
        return f64::NAN;
    }
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}
