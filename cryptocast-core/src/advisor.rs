//! Rule-based trading advice.
//!
//! The advisor turns a [`ForecastOutput`] plus the latest feature row into a
//! BUY/HOLD/SELL [`AdviceRecord`]. The predicted change must clear a
//! threshold, and the fear-greed and news-sentiment guardrails must not
//! object. How an unknown guardrail input is treated is a [`GuardrailPolicy`].

use crate::data::schema::{MacroRecord, OnchainRecord};
use crate::domain::{FeatureRow, TimeSeriesTable};
use crate::error::{PipelineError, Result};
use crate::forecast::ForecastOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
        })
    }
}

/// What an unknown guardrail input means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailPolicy {
    /// Unknown inputs never block a signal.
    #[default]
    PermissiveOnMissing,
    /// Unknown inputs block BUY and SELL.
    StrictOnMissing,
}

impl GuardrailPolicy {
    fn admits<T: Copy>(&self, value: Option<T>, ok: impl Fn(T) -> bool) -> bool {
        match value {
            Some(v) => ok(v),
            None => *self == GuardrailPolicy::PermissiveOnMissing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub buy_threshold_pct: f64,
    pub sell_threshold_pct: f64,
    /// BUY needs fear-greed strictly below this.
    pub fear_greed_buy_max: i64,
    /// SELL needs fear-greed strictly above this.
    pub fear_greed_sell_min: i64,
    pub stale_after_hours: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub guardrail: GuardrailPolicy,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            buy_threshold_pct: 2.0,
            sell_threshold_pct: -2.0,
            fear_greed_buy_max: 70,
            fear_greed_sell_min: 30,
            stale_after_hours: 2.0,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            guardrail: GuardrailPolicy::PermissiveOnMissing,
        }
    }
}

/// A contextual input that was unavailable. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextGap {
    FearGreed,
    NewsSentiment,
    Macro,
    Onchain,
}

impl fmt::Display for ContextGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContextGap::FearGreed => "fear_greed",
            ContextGap::NewsSentiment => "news_sentiment",
            ContextGap::Macro => "macro",
            ContextGap::Onchain => "onchain",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecentReturns {
    pub ret_1h_pct: Option<f64>,
    pub ret_24h_pct: Option<f64>,
    pub ret_7d_pct: Option<f64>,
}

impl RecentReturns {
    /// Percent change of the last close against `n` rows earlier.
    fn from_closes(close: &[f64]) -> Self {
        let pct = |n: usize| {
            let len = close.len();
            if len <= n {
                return None;
            }
            let v = (close[len - 1] / close[len - 1 - n] - 1.0) * 100.0;
            v.is_finite().then_some(v)
        };
        Self {
            ret_1h_pct: pct(1),
            ret_24h_pct: pct(24),
            ret_7d_pct: pct(24 * 7),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub rsi_14: Option<f64>,
    pub atr_14: Option<f64>,
    pub ret_std_30: Option<f64>,
    pub ma_21: Option<f64>,
    pub ma_50: Option<f64>,
    pub vwap: Option<f64>,
    pub vol_change: Option<f64>,
}

impl MarketSnapshot {
    fn from_row(row: &FeatureRow) -> Self {
        Self {
            rsi_14: row.get("rsi_14"),
            atr_14: row.get("atr_14"),
            ret_std_30: row.get("ret_std_30"),
            ma_21: row.get("ma_21"),
            ma_50: row.get("ma_50"),
            vwap: row.get("vwap"),
            vol_change: row.get("vol_change"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentSnapshot {
    pub fear_greed: Option<i64>,
    pub news_sentiment: Option<f64>,
    pub news_sentiment_std: Option<f64>,
    pub bullish_ratio: Option<f64>,
    pub bearish_ratio: Option<f64>,
}

/// One point-in-time advice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceRecord {
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
    pub data_age_hours: f64,
    pub horizon: String,
    pub last_close: f64,
    pub next_price_pred: f64,
    pub pred_log_return: f64,
    pub pred_change_pct: f64,
    pub rel_change_pred: f64,
    pub fear_greed: Option<i64>,
    pub news_sentiment: Option<f64>,
    pub recent_returns: RecentReturns,
    pub market: MarketSnapshot,
    pub sentiment: SentimentSnapshot,
    #[serde(rename = "macro")]
    pub macro_context: MacroRecord,
    pub onchain: OnchainRecord,
    pub rationale: Vec<String>,
    pub notes: Vec<String>,
}

/// Advisor result: the record plus the context that was unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub record: AdviceRecord,
    pub gaps: Vec<ContextGap>,
}

#[derive(Debug, Clone, Copy)]
pub struct AdvisorInputs<'a> {
    pub forecast: &'a ForecastOutput,
    /// Feature table the forecast was made from; its `close` column feeds
    /// the recent-return snapshot.
    pub features: &'a TimeSeriesTable,
    /// Raw sentiment table used when the feature row lacks sentiment.
    pub sentiment: Option<&'a TimeSeriesTable>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Advisor {
    config: AdvisorConfig,
}

impl Advisor {
    pub fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn advise(&self, inputs: &AdvisorInputs<'_>) -> Result<Advice> {
        let cfg = &self.config;
        let forecast = inputs.forecast;
        let row = &forecast.last_row;
        let last_close = forecast.last_close;
        if !last_close.is_finite() || last_close <= 0.0 {
            return Err(PipelineError::InvalidTable(format!(
                "last close must be positive, got {last_close}"
            )));
        }
        let rel_change = (forecast.next_close - last_close) / last_close;
        let pred_change_pct = rel_change * 100.0;

        let fallback = |name: &str| inputs.sentiment.and_then(|t| t.last_defined(name));
        let fear_greed = row
            .get("fear_greed")
            .or_else(|| fallback("fear_greed"))
            .map(|v| v.trunc() as i64);
        let news_sentiment = row
            .get("news_sentiment")
            .or_else(|| fallback("news_sentiment"));
        let sentiment = SentimentSnapshot {
            fear_greed,
            news_sentiment,
            news_sentiment_std: row.get("news_sentiment_std"),
            bullish_ratio: row.get("bullish_ratio"),
            bearish_ratio: row.get("bearish_ratio"),
        };
        let market = MarketSnapshot::from_row(row);
        let macro_context = MacroRecord::from_row(row);
        let onchain = OnchainRecord::from_row(row);

        let mut gaps = Vec::new();
        if fear_greed.is_none() {
            gaps.push(ContextGap::FearGreed);
        }
        if news_sentiment.is_none() {
            gaps.push(ContextGap::NewsSentiment);
        }
        if macro_context == MacroRecord::default() {
            gaps.push(ContextGap::Macro);
        }
        if onchain == OnchainRecord::default() {
            gaps.push(ContextGap::Onchain);
        }
        for gap in &gaps {
            tracing::warn!(context = %gap, "advisor context unavailable");
        }

        let mut trend = Vec::new();
        if let Some(ma) = market.ma_21 {
            trend.push(if last_close > ma { "above_ma21" } else { "below_ma21" });
        }
        if let Some(ma) = market.ma_50 {
            trend.push(if last_close > ma { "above_ma50" } else { "below_ma50" });
        }

        let mut rationale = Vec::new();
        if let Some(fg) = fear_greed {
            rationale.push(format!("Fear&Greed={fg}"));
        }
        if let Some(ns) = news_sentiment {
            let std = sentiment
                .news_sentiment_std
                .map(|s| format!(", std={s:.3}"))
                .unwrap_or_default();
            rationale.push(format!("NewsSent={ns:.3}{std}"));
        }
        if let Some(rsi) = market.rsi_14 {
            rationale.push(format!("RSI14={rsi:.1}"));
        }
        if !trend.is_empty() {
            rationale.push(format!("Trend={}", trend.join(",")));
        }

        let policy = cfg.guardrail;
        let signal = if pred_change_pct > cfg.buy_threshold_pct
            && policy.admits(fear_greed, |fg| fg < cfg.fear_greed_buy_max)
            && policy.admits(news_sentiment, |ns| ns >= 0.0)
        {
            Signal::Buy
        } else if pred_change_pct < cfg.sell_threshold_pct
            && policy.admits(fear_greed, |fg| fg > cfg.fear_greed_sell_min)
            && policy.admits(news_sentiment, |ns| ns <= 0.0)
        {
            Signal::Sell
        } else {
            Signal::Hold
        };

        let data_age_hours =
            (inputs.as_of - row.timestamp).num_milliseconds() as f64 / 3_600_000.0;
        let mut notes = Vec::new();
        if data_age_hours > cfg.stale_after_hours {
            notes.push(format!("Data is {data_age_hours:.1}h old"));
        }
        if let Some(rsi) = market.rsi_14 {
            if rsi >= cfg.rsi_overbought {
                notes.push("RSI suggests overbought".to_string());
            } else if rsi <= cfg.rsi_oversold {
                notes.push("RSI suggests oversold".to_string());
            }
        }
        if let Some(atr) = market.atr_14 {
            notes.push(format!("ATR14~{:.2}% of price", atr / last_close * 100.0));
        }

        let recent_returns = inputs
            .features
            .column("close")
            .map(RecentReturns::from_closes)
            .unwrap_or_default();

        tracing::info!(
            signal = %signal,
            pred_change_pct,
            fear_greed = ?fear_greed,
            news_sentiment = ?news_sentiment,
            gaps = gaps.len(),
            "advice generated"
        );

        Ok(Advice {
            record: AdviceRecord {
                signal,
                timestamp: row.timestamp,
                data_age_hours,
                horizon: "1h".to_string(),
                last_close,
                next_price_pred: forecast.next_close,
                pred_log_return: forecast.pred_log_return,
                pred_change_pct,
                rel_change_pred: rel_change,
                fear_greed,
                news_sentiment,
                recent_returns,
                market,
                sentiment,
                macro_context,
                onchain,
                rationale,
                notes,
            },
            gaps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{FixedReturnForecaster, Forecaster};
    use crate::indicators::{assert_approx, make_table};
    use chrono::Duration;

    fn features(fear_greed: f64, news: f64) -> TimeSeriesTable {
        let closes: Vec<f64> = (0..200).map(|i| 80.0 + 0.1 * i as f64 + 0.1).collect();
        let mut t = make_table(&closes);
        let n = t.len();
        t.set_column("fear_greed", vec![fear_greed; n]).unwrap();
        t.set_column("news_sentiment", vec![news; n]).unwrap();
        t
    }

    fn advise_with(
        advisor: &Advisor,
        table: &TimeSeriesTable,
        log_return: f64,
        sentiment: Option<&TimeSeriesTable>,
    ) -> Advice {
        let forecast = FixedReturnForecaster { log_return }.forecast(table).unwrap();
        let as_of = *table.index().last().unwrap() + Duration::minutes(30);
        advisor
            .advise(&AdvisorInputs {
                forecast: &forecast,
                features: table,
                sentiment,
                as_of,
            })
            .unwrap()
    }

    #[test]
    fn buy_when_change_clears_threshold_and_guardrails_agree() {
        let t = features(50.0, 0.1);
        let advice = advise_with(&Advisor::default(), &t, 0.03, None);
        let r = &advice.record;
        assert_eq!(r.signal, Signal::Buy);
        assert_approx(r.last_close, 100.0, 1e-9);
        assert!(r.pred_change_pct > 3.0 && r.pred_change_pct < 3.1);
        assert_eq!(r.fear_greed, Some(50));
        assert_eq!(r.rationale[0], "Fear&Greed=50");
        assert_eq!(r.rationale[1], "NewsSent=0.100");
    }

    #[test]
    fn greedy_market_blocks_sell() {
        let t = features(80.0, -0.2);
        assert_eq!(advise_with(&Advisor::default(), &t, -0.03, None).record.signal, Signal::Hold);
        let t = features(50.0, -0.2);
        assert_eq!(advise_with(&Advisor::default(), &t, -0.03, None).record.signal, Signal::Sell);
    }

    #[test]
    fn negative_news_blocks_buy() {
        let t = features(50.0, -0.1);
        assert_eq!(advise_with(&Advisor::default(), &t, 0.03, None).record.signal, Signal::Hold);
    }

    #[test]
    fn unknown_context_is_permissive_by_default_and_blocking_when_strict() {
        let t = features(f64::NAN, f64::NAN);
        let advice = advise_with(&Advisor::default(), &t, 0.03, None);
        assert_eq!(advice.record.signal, Signal::Buy);
        assert!(advice.gaps.contains(&ContextGap::FearGreed));
        assert!(advice.gaps.contains(&ContextGap::NewsSentiment));

        let strict = Advisor::new(AdvisorConfig {
            guardrail: GuardrailPolicy::StrictOnMissing,
            ..AdvisorConfig::default()
        });
        assert_eq!(advise_with(&strict, &t, 0.03, None).record.signal, Signal::Hold);
    }

    #[test]
    fn sentiment_table_fills_missing_row_values() {
        let t = features(f64::NAN, f64::NAN);
        let mut sent = TimeSeriesTable::new(t.index()[..3].to_vec()).unwrap();
        sent.set_column("fear_greed", vec![40.0, 75.9, f64::NAN]).unwrap();
        sent.set_column("news_sentiment", vec![0.2, 0.3, f64::NAN]).unwrap();
        let advice = advise_with(&Advisor::default(), &t, 0.03, Some(&sent));
        assert_eq!(advice.record.fear_greed, Some(75));
        assert_eq!(advice.record.news_sentiment, Some(0.3));
        assert_eq!(advice.record.signal, Signal::Hold);
        assert!(!advice.gaps.contains(&ContextGap::FearGreed));
    }

    #[test]
    fn notes_and_returns() {
        let mut t = features(50.0, 0.1);
        let n = t.len();
        t.set_column("rsi_14", vec![75.0; n]).unwrap();
        t.set_column("atr_14", vec![2.0; n]).unwrap();
        t.set_column("ma_21", vec![99.0; n]).unwrap();
        let forecast = FixedReturnForecaster { log_return: 0.0 }.forecast(&t).unwrap();
        let as_of = *t.index().last().unwrap() + Duration::hours(5);
        let r = Advisor::default()
            .advise(&AdvisorInputs {
                forecast: &forecast,
                features: &t,
                sentiment: None,
                as_of,
            })
            .unwrap()
            .record;
        assert_eq!(r.signal, Signal::Hold);
        assert_eq!(
            r.notes,
            vec!["Data is 5.0h old", "RSI suggests overbought", "ATR14~2.00% of price"]
        );
        assert_eq!(r.rationale.last().unwrap(), "Trend=above_ma21");
        assert_approx(r.recent_returns.ret_1h_pct.unwrap(), (100.0 / 99.9 - 1.0) * 100.0, 1e-9);
        assert_approx(r.recent_returns.ret_7d_pct.unwrap(), (100.0 / 83.2 - 1.0) * 100.0, 1e-9);
    }

    #[test]
    fn record_serialises_with_expected_keys() {
        let t = features(50.0, 0.1);
        let advice = advise_with(&Advisor::default(), &t, 0.03, None);
        let json = serde_json::to_value(&advice.record).unwrap();
        assert_eq!(json["signal"], "BUY");
        assert_eq!(json["horizon"], "1h");
        assert!(json["macro"]["sp500_close"].is_null());
        assert!(json["onchain"].is_object());
        assert!(json["recent_returns"]["ret_24h_pct"].is_number());
    }

    #[test]
    fn identical_inputs_give_identical_records() {
        let t = features(50.0, 0.1);
        let a = advise_with(&Advisor::default(), &t, 0.025, None);
        let b = advise_with(&Advisor::default(), &t, 0.025, None);
        assert_eq!(a, b);
    }
}
