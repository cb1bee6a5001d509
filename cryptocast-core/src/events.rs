//! Calendar event features.
//!
//! A fixed calendar of market events, each with an asymmetric day window
//! around its date and a signed impact. For every timestamp inside
//! `[date - before, date + after]` (both ends inclusive, midnight UTC) the
//! event's category flag is set to 1 and its impact is added to
//! `event_impact_sum`. Flags are idempotent; impacts accumulate, so
//! overlapping events of one category compound.

use crate::domain::TimeSeriesTable;
use crate::error::Result;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

pub const EVENT_IMPACT_SUM: &str = "event_impact_sum";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Halving,
    CovidCrash,
    ChinaCrackdown,
    Etf,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::Halving,
        EventCategory::CovidCrash,
        EventCategory::ChinaCrackdown,
        EventCategory::Etf,
    ];

    /// Flag column for this category.
    pub fn column(&self) -> &'static str {
        match self {
            EventCategory::Halving => "halving_window",
            EventCategory::CovidCrash => "covid_crash_window",
            EventCategory::ChinaCrackdown => "china_crackdown_window",
            EventCategory::Etf => "etf_event_window",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub name: &'static str,
    pub category: EventCategory,
    pub date: NaiveDate,
    pub days_before: i64,
    pub days_after: i64,
    pub impact: f64,
}

impl CalendarEvent {
    fn midnight(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(chrono::NaiveTime::MIN))
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.midnight() - Duration::days(self.days_before)
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.midnight() + Duration::days(self.days_after)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.window_start() && ts <= self.window_end()
    }
}

fn event(
    name: &'static str,
    category: EventCategory,
    (y, m, d): (i32, u32, u32),
    days_before: i64,
    days_after: i64,
    impact: f64,
) -> Option<CalendarEvent> {
    Some(CalendarEvent {
        name,
        category,
        date: NaiveDate::from_ymd_opt(y, m, d)?,
        days_before,
        days_after,
        impact,
    })
}

/// The built-in calendar.
pub fn standard_calendar() -> Vec<CalendarEvent> {
    use EventCategory::*;
    [
        event("halving_2012", Halving, (2012, 11, 28), 90, 90, 1.0),
        event("halving_2016", Halving, (2016, 7, 9), 90, 90, 1.0),
        event("halving_2020", Halving, (2020, 5, 11), 90, 90, 1.0),
        event("halving_2024", Halving, (2024, 4, 20), 90, 90, 1.0),
        event("covid_crash_2020", CovidCrash, (2020, 3, 12), 14, 14, -1.0),
        event("china_exchanges_shutdown_2017", ChinaCrackdown, (2017, 9, 15), 14, 30, -1.0),
        event("china_full_ban_2021", ChinaCrackdown, (2021, 9, 24), 14, 30, -1.0),
        event("futures_etf_2021", Etf, (2021, 10, 19), 7, 30, 1.0),
        event("spot_etf_approval_2024", Etf, (2024, 1, 10), 7, 60, 1.0),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[derive(Debug, Clone)]
pub struct EventFeatureBuilder {
    events: Vec<CalendarEvent>,
}

impl EventFeatureBuilder {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }

    pub fn standard() -> Self {
        Self::new(standard_calendar())
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    /// Column names produced by [`build`](Self::build), in order.
    pub fn columns() -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = EventCategory::ALL.iter().map(|c| c.column()).collect();
        cols.push(EVENT_IMPACT_SUM);
        cols
    }

    /// Event features for every timestamp of `index`.
    pub fn build(&self, index: &[DateTime<Utc>]) -> Result<TimeSeriesTable> {
        let n = index.len();
        let mut flags: Vec<Vec<f64>> = vec![vec![0.0; n]; EventCategory::ALL.len()];
        let mut impact = vec![0.0; n];

        for ev in &self.events {
            let slot = EventCategory::ALL
                .iter()
                .position(|c| *c == ev.category)
                .unwrap_or_default();
            for (i, ts) in index.iter().enumerate() {
                if ev.contains(*ts) {
                    flags[slot][i] = 1.0;
                    impact[i] += ev.impact;
                }
            }
        }

        let mut table = TimeSeriesTable::new(index.to_vec())?;
        for (category, values) in EventCategory::ALL.iter().zip(flags) {
            table.set_column(category.column(), values)?;
        }
        table.set_column(EVENT_IMPACT_SUM, impact)?;
        Ok(table)
    }
}

impl Default for EventFeatureBuilder {
    fn default() -> Self {
        Self::standard()
    }
}
