//! Basic price features: bar range, body, and one-step return.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

/// `high - low`.
#[derive(Debug, Clone, Default)]
pub struct HlRange;

impl Indicator for HlRange {
    fn name(&self) -> &str {
        "hl_range"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        bars.high.iter().zip(bars.low).map(|(h, l)| h - l).collect()
    }
}

/// `close - open`.
#[derive(Debug, Clone, Default)]
pub struct OcDiff;

impl Indicator for OcDiff {
    fn name(&self) -> &str {
        "oc_diff"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        bars.close.iter().zip(bars.open).map(|(c, o)| c - o).collect()
    }
}

/// One-step percentage change of close. First row undefined.
#[derive(Debug, Clone, Default)]
pub struct Ret;

impl Indicator for Ret {
    fn name(&self) -> &str {
        "ret"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        series::pct_change(bars.close, 1)
    }
}
