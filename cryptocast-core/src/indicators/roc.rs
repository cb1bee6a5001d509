//! Rate of Change: `close[t] / close[t - period] - 1`.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self {
            period,
            name: format!("roc_{period}"),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        series::pct_change(bars.close, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, compute_on, DEFAULT_EPSILON};

    #[test]
    fn roc_basic() {
        let out = compute_on(&Roc::new(2), &[100.0, 105.0, 110.0, 99.0]);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_approx(out[2], 0.10, DEFAULT_EPSILON);
        assert_approx(out[3], 99.0 / 105.0 - 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn roc_name() {
        assert_eq!(Roc::new(10).name(), "roc_10");
    }
}
