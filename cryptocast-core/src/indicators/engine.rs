//! Indicator engine: appends every indicator column to an OHLCV table, then
//! drops rows that are not fully populated.

use crate::domain::{ensure_ohlcv, OhlcvSeries, TimeSeriesTable};
use crate::error::Result;
use crate::indicators::{
    Atr, Ema, HlRange, Hma, Indicator, Obv, OcDiff, Ret, RetStd, Roc, Rsi, Sma, VolChange, Vwap,
};

pub struct IndicatorEngine {
    indicators: Vec<Box<dyn Indicator>>,
}

impl IndicatorEngine {
    pub fn new(indicators: Vec<Box<dyn Indicator>>) -> Self {
        Self { indicators }
    }

    /// The full training feature set.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(HlRange),
            Box::new(OcDiff),
            Box::new(Ret),
            Box::new(Sma::new(7)),
            Box::new(Sma::new(21)),
            Box::new(Sma::new(50)),
            Box::new(Ema::new(12)),
            Box::new(Ema::new(26)),
            Box::new(Hma::new(21)),
            Box::new(Rsi::new(14)),
            Box::new(Roc::new(10)),
            Box::new(RetStd::new(7)),
            Box::new(RetStd::new(30)),
            Box::new(Atr::new(14)),
            Box::new(Obv),
            Box::new(Vwap),
            Box::new(VolChange),
        ])
    }

    pub fn names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }

    /// Rows consumed before every indicator is defined.
    pub fn warmup(&self) -> usize {
        self.indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
    }

    /// Return the input columns plus one column per indicator. Infinite values
    /// become undefined and any row with an undefined value is dropped.
    ///
    /// Empty input yields empty output.
    pub fn augment(&self, market: &TimeSeriesTable) -> Result<TimeSeriesTable> {
        if market.is_empty() {
            return Ok(market.clone());
        }
        ensure_ohlcv(market)?;

        let bars = OhlcvSeries::from_table(market)?;
        let computed: Vec<(String, Vec<f64>)> = self
            .indicators
            .iter()
            .map(|indicator| {
                let series = indicator.compute(&bars);
                debug_assert_eq!(
                    series.len(),
                    bars.len(),
                    "indicator '{}' produced {} values for {} bars",
                    indicator.name(),
                    series.len(),
                    bars.len()
                );
                (indicator.name().to_string(), series)
            })
            .collect();

        let mut out = market.clone();
        for (name, values) in computed {
            out.set_column(&name, values)?;
        }
        out.replace_infinite();
        let before = out.len();
        out.drop_undefined_rows();
        tracing::debug!(
            rows_in = before,
            rows_out = out.len(),
            indicators = self.indicators.len(),
            "indicator engine"
        );
        Ok(out)
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::standard()
    }
}
