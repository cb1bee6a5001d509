//! Rolling standard deviation of one-step returns.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

/// Sample std (ddof = 1) of `close.pct_change()` over `period` rows.
#[derive(Debug, Clone)]
pub struct RetStd {
    period: usize,
    name: String,
}

impl RetStd {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "return std period must be >= 2");
        Self {
            period,
            name: format!("ret_std_{period}"),
        }
    }
}

impl Indicator for RetStd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        let ret = series::pct_change(bars.close, 1);
        series::rolling_std(&ret, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, compute_on, DEFAULT_EPSILON};

    #[test]
    fn constant_growth_has_zero_dispersion() {
        let closes: Vec<f64> = (0..12).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let out = compute_on(&RetStd::new(7), &closes);
        assert!(out[..7].iter().all(|v| v.is_nan()));
        assert_approx(out[7], 0.0, 1e-12);
    }

    #[test]
    fn alternating_returns() {
        // returns alternate +10% / -10% over a 2-wide window → sample std = sqrt(0.02)
        let out = compute_on(&RetStd::new(2), &[100.0, 110.0, 99.0]);
        assert_approx(out[2], (0.02f64).sqrt(), DEFAULT_EPSILON);
    }
}
