//! Volume-based indicators: OBV, cumulative VWAP, volume change.

use crate::domain::OhlcvSeries;
use crate::indicators::Indicator;
use crate::series;

/// On-Balance Volume: cumulative sum of `sign(close - prev_close) * volume`.
/// The first row (no previous close) contributes zero.
#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        let signed: Vec<f64> = series::diff(bars.close, 1)
            .iter()
            .zip(bars.volume)
            .map(|(&d, &v)| {
                let dir = if d.is_nan() || d == 0.0 { 0.0 } else { d.signum() };
                dir * v
            })
            .collect();
        series::cumsum(&signed)
    }
}

/// Volume-weighted average price accumulated from the first row of history,
/// with typical price `(high + low + close) / 3`. Not session-scoped.
#[derive(Debug, Clone, Default)]
pub struct Vwap;

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        let pv: Vec<f64> = (0..bars.len())
            .map(|i| (bars.high[i] + bars.low[i] + bars.close[i]) / 3.0 * bars.volume[i])
            .collect();
        let cum_pv = series::cumsum(&pv);
        let cum_vol = series::cumsum(bars.volume);
        cum_pv.iter().zip(&cum_vol).map(|(p, v)| p / v).collect()
    }
}

/// One-step percentage change of volume.
#[derive(Debug, Clone, Default)]
pub struct VolChange;

impl Indicator for VolChange {
    fn name(&self) -> &str {
        "vol_change"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &OhlcvSeries<'_>) -> Vec<f64> {
        series::pct_change(bars.volume, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OhlcvSeries;
    use crate::indicators::{assert_approx, compute_on, make_table, DEFAULT_EPSILON};

    #[test]
    fn obv_accumulates_signed_volume() {
        let out = compute_on(&Obv, &[10.0, 11.0, 11.0, 9.0, 12.0]);
        assert_eq!(out, vec![0.0, 1000.0, 1000.0, 0.0, 1000.0]);
    }

    #[test]
    fn vwap_is_cumulative_from_first_row() {
        let mut table = make_table(&[10.0, 20.0]);
        table.set_column("high", vec![10.0, 20.0]).unwrap();
        table.set_column("low", vec![10.0, 20.0]).unwrap();
        table.set_column("volume", vec![1.0, 3.0]).unwrap();
        let s = OhlcvSeries::from_table(&table).unwrap();
        let out = Vwap.compute(&s);
        assert_approx(out[0], 10.0, DEFAULT_EPSILON);
        assert_approx(out[1], (10.0 + 60.0) / 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn vwap_zero_volume_is_undefined() {
        let mut table = make_table(&[10.0]);
        table.set_column("volume", vec![0.0]).unwrap();
        let s = OhlcvSeries::from_table(&table).unwrap();
        assert!(Vwap.compute(&s)[0].is_nan());
    }

    #[test]
    fn vol_change_first_row_undefined() {
        let mut table = make_table(&[10.0, 10.0]);
        table.set_column("volume", vec![100.0, 150.0]).unwrap();
        let s = OhlcvSeries::from_table(&table).unwrap();
        let out = VolChange.compute(&s);
        assert!(out[0].is_nan());
        assert_approx(out[1], 0.5, DEFAULT_EPSILON);
    }
}
