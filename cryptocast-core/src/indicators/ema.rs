//! Exponential Moving Average of close.
//!
//! `ema[t] = alpha * close[t] + (1 - alpha) * ema[t-1]`, `alpha = 2 / (span + 1)`,
//! seeded with the first close. No warmup: defined from the first row.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    name: String,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        assert!(span >= 1, "EMA span must be >= 1");
        Self {
            span,
            name: format!("ema_{span}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        series::ema(bars.close, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, compute_on, DEFAULT_EPSILON};

    #[test]
    fn ema_span_1_equals_close() {
        let result = compute_on(&Ema::new(1), &[10.0, 20.0, 30.0]);
        assert_approx(result[2], 30.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5
        let result = compute_on(&Ema::new(3), &[10.0, 12.0, 14.0, 10.0]);
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert_approx(result[1], 11.0, DEFAULT_EPSILON);
        assert_approx(result[2], 12.5, DEFAULT_EPSILON);
        assert_approx(result[3], 11.25, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_has_no_warmup() {
        let result = compute_on(&Ema::new(26), &[5.0, 6.0]);
        assert!(result.iter().all(|v| v.is_finite()));
    }
}
