//! Training feature store: market indicators, exogenous context and events
//! on one hourly grid.

use crate::data::resample::{as_of, resample_ohlcv};
use crate::domain::{ensure_ohlcv, OhlcvSeries, TimeSeriesTable};
use crate::error::{PipelineError, Result};
use crate::events::EventFeatureBuilder;
use crate::features::SourceTables;
use crate::indicators::IndicatorEngine;
use crate::series;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What to do with gaps that survive the forward/backward fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImputationPolicy {
    /// Fill with the column's historical mean.
    #[default]
    HistoricalMean,
    /// Drop any row that still holds an undefined value.
    DropRows,
}

#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub table: TimeSeriesTable,
    /// Columns removed because they were never populated.
    pub dropped_columns: Vec<String>,
}

pub struct FeatureAssembler {
    engine: IndicatorEngine,
    events: EventFeatureBuilder,
    policy: ImputationPolicy,
}

impl FeatureAssembler {
    pub fn new(engine: IndicatorEngine, events: EventFeatureBuilder, policy: ImputationPolicy) -> Self {
        Self {
            engine,
            events,
            policy,
        }
    }

    pub fn with_policy(policy: ImputationPolicy) -> Self {
        Self::new(IndicatorEngine::standard(), EventFeatureBuilder::standard(), policy)
    }

    pub fn policy(&self) -> ImputationPolicy {
        self.policy
    }

    /// Build the wide hourly feature table.
    ///
    /// 1. market → strict 1h OHLCV bins → indicators (warmup rows dropped)
    /// 2. on-chain, macro, sentiment carried forward onto the hourly grid
    /// 3. event features
    /// 4. inf → NaN, forward fill, backward fill
    /// 5. never-populated columns dropped; remaining gaps handled by the policy
    pub fn assemble(&self, inputs: &SourceTables<'_>) -> Result<AssemblyOutput> {
        if inputs.market.is_empty() {
            return Err(PipelineError::missing_input("market", "table is empty"));
        }
        ensure_ohlcv(inputs.market)?;
        let insane = OhlcvSeries::from_table(inputs.market)?.insane_rows(inputs.market.index());
        if insane > 0 {
            tracing::warn!(rows = insane, "market bars with inconsistent prices");
        }

        let hourly = resample_ohlcv(inputs.market, Duration::hours(1))?;
        let mut table = self.engine.augment(&hourly)?;
        if table.is_empty() {
            return Err(PipelineError::insufficient(
                "indicator warmup",
                self.engine.warmup() + 1,
                hourly.len(),
            ));
        }

        let grid = table.index().to_vec();
        for (name, exo) in [
            ("onchain", inputs.onchain),
            ("macro", inputs.macro_data),
            ("sentiment", inputs.sentiment),
        ] {
            if exo.width() == 0 {
                tracing::warn!(table = name, "no columns; context omitted");
                continue;
            }
            table.join_left(&as_of(exo, &grid)?)?;
        }
        table.join_left(&self.events.build(&grid)?)?;

        table.replace_infinite();
        table.forward_fill();
        table.backward_fill();

        let dropped_columns: Vec<String> = table
            .column_names()
            .into_iter()
            .filter(|name| table.coverage(name) == 0.0)
            .collect();
        for name in &dropped_columns {
            tracing::info!(column = %name, "dropping never-populated column");
            table.remove_column(name);
        }

        match self.policy {
            ImputationPolicy::HistoricalMean => {
                for name in table.column_names() {
                    let Some(values) = table.column(&name) else {
                        continue;
                    };
                    if values.iter().all(|v| v.is_finite()) {
                        continue;
                    }
                    let fill = series::mean_defined(values).unwrap_or(f64::NAN);
                    let filled = values
                        .iter()
                        .map(|v| if v.is_finite() { *v } else { fill })
                        .collect();
                    tracing::debug!(column = %name, fill, "mean-imputed");
                    table.set_column(&name, filled)?;
                }
            }
            ImputationPolicy::DropRows => table.drop_undefined_rows(),
        }

        tracing::info!(
            rows = table.len(),
            columns = table.width(),
            dropped = dropped_columns.len(),
            "training features assembled"
        );
        Ok(AssemblyOutput {
            table,
            dropped_columns,
        })
    }
}

impl Default for FeatureAssembler {
    fn default() -> Self {
        Self::with_policy(ImputationPolicy::HistoricalMean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_table;
    use chrono::{TimeZone, Utc};

    fn market(n: usize) -> TimeSeriesTable {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.15).sin() * 3.0 + i as f64 * 0.02)
            .collect();
        make_table(&closes)
    }

    fn daily(name: &str, values: &[(u32, f64)]) -> TimeSeriesTable {
        TimeSeriesTable::from_rows(
            &[name.to_string()],
            values
                .iter()
                .map(|(d, v)| (Utc.with_ymd_and_hms(2024, 1, *d, 0, 0, 0).unwrap(), vec![*v])),
        )
        .unwrap()
    }

    #[test]
    fn missing_market_is_fatal() {
        let empty = TimeSeriesTable::default();
        let inputs = SourceTables {
            market: &empty,
            onchain: &empty,
            macro_data: &empty,
            sentiment: &empty,
        };
        let err = FeatureAssembler::default().assemble(&inputs).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }

    #[test]
    fn short_market_is_insufficient_history() {
        let m = market(20);
        let empty = TimeSeriesTable::default();
        let inputs = SourceTables {
            market: &m,
            onchain: &empty,
            macro_data: &empty,
            sentiment: &empty,
        };
        let err = FeatureAssembler::default().assemble(&inputs).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientHistory { .. }));
    }

    #[test]
    fn daily_context_is_carried_forward_and_backward() {
        let m = market(120); // 2024-01-01 00:00 .. 2024-01-05 23:00
        // first kept market row is hour 49 = Jan 3 01:00
        let sent = daily("fear_greed", &[(4, 40.0), (5, 60.0)]);
        let empty = TimeSeriesTable::default();
        let inputs = SourceTables {
            market: &m,
            onchain: &empty,
            macro_data: &empty,
            sentiment: &sent,
        };
        let out = FeatureAssembler::default().assemble(&inputs).unwrap();
        let fg = out.table.column("fear_greed").unwrap();
        let idx = out.table.index();
        // before Jan 4 the backward fill supplies the first known value
        assert_eq!(fg[0], 40.0);
        let jan5 = idx
            .iter()
            .position(|t| *t == Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(fg[jan5 - 1], 40.0);
        assert_eq!(fg[jan5], 60.0);
        assert_eq!(*fg.last().unwrap(), 60.0);
    }

    #[test]
    fn event_columns_present() {
        let m = market(80);
        let empty = TimeSeriesTable::default();
        let inputs = SourceTables {
            market: &m,
            onchain: &empty,
            macro_data: &empty,
            sentiment: &empty,
        };
        let out = FeatureAssembler::default().assemble(&inputs).unwrap();
        // January 2024 sits inside the spot ETF window
        assert!(out.table.column("etf_event_window").unwrap().iter().all(|v| *v == 1.0));
        assert!(out.table.has_column("event_impact_sum"));
    }

    #[test]
    fn never_populated_columns_are_dropped() {
        let m = market(80);
        let onchain = daily("tx_count", &[(2, f64::NAN), (3, f64::NAN)]);
        let empty = TimeSeriesTable::default();
        let inputs = SourceTables {
            market: &m,
            onchain: &onchain,
            macro_data: &empty,
            sentiment: &empty,
        };
        let out = FeatureAssembler::default().assemble(&inputs).unwrap();
        assert!(!out.table.has_column("tx_count"));
        assert_eq!(out.dropped_columns, vec!["tx_count".to_string()]);
        for col in out.table.columns() {
            assert!(col.values.iter().all(|v| v.is_finite()), "{}", col.name);
        }
    }
}
