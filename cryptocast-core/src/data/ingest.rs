//! CSV ingestion and export of timestamp-indexed tables.
//!
//! Input files carry one timestamp column (`timestamp`, `date`, `time` or
//! `datetime`) plus numeric columns. Headers are mapped through a
//! [`TableSchema`]; unknown headers are skipped. Rows are sorted by time and
//! duplicate timestamps keep the last row. Empty or non-numeric cells become NaN.

use crate::data::schema::TableSchema;
use crate::domain::TimeSeriesTable;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub const TIMESTAMP_HEADERS: [&str; 4] = ["timestamp", "date", "time", "datetime"];

/// Parse a timestamp. Naive forms are taken as UTC. Bare integers are unix
/// seconds, or milliseconds when larger than 10^11.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)));
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        return if n > 100_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
    }
    None
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Read a table from any CSV source.
///
/// With a schema, headers are mapped to canonical names and unknown headers
/// are dropped; a schema with `all_required` fails with `MissingInput` if a
/// field is absent. Without a schema every non-timestamp column is kept.
pub fn read_table<R: Read>(
    source: R,
    table: &str,
    schema: Option<&TableSchema>,
) -> Result<TimeSeriesTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();

    let ts_col = headers
        .iter()
        .position(|h| TIMESTAMP_HEADERS.contains(&h.trim().to_ascii_lowercase().as_str()))
        .ok_or_else(|| PipelineError::missing_input(table, "no timestamp column"))?;

    // (csv position, canonical name)
    let mut selected: Vec<(usize, String)> = Vec::new();
    for (pos, header) in headers.iter().enumerate() {
        if pos == ts_col {
            continue;
        }
        let name = match schema {
            Some(s) => match s.canonical(header) {
                Some(canonical) => canonical.to_string(),
                None => continue,
            },
            None => header.trim().to_string(),
        };
        if !selected.iter().any(|(_, n)| *n == name) {
            selected.push((pos, name));
        }
    }

    if let Some(s) = schema.filter(|s| s.all_required) {
        let missing: Vec<&str> = s
            .field_names()
            .into_iter()
            .filter(|f| !selected.iter().any(|(_, n)| n == f))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::missing_input(
                table,
                format!("missing columns: {}", missing.join(", ")),
            ));
        }
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let Some(ts) = record.get(ts_col).and_then(parse_timestamp) else {
            skipped += 1;
            continue;
        };
        let values = selected
            .iter()
            .map(|(pos, _)| record.get(*pos).map_or(f64::NAN, parse_value))
            .collect();
        rows.push((ts, values));
    }
    if skipped > 0 {
        tracing::warn!(table, skipped, "dropped rows with unparseable timestamps");
    }

    let names: Vec<String> = selected.into_iter().map(|(_, n)| n).collect();
    TimeSeriesTable::from_rows(&names, rows)
}

/// Read a required table from disk. Absent file or zero rows is `MissingInput`.
pub fn load_required(path: &Path, schema: &TableSchema) -> Result<TimeSeriesTable> {
    if !path.exists() {
        return Err(PipelineError::missing_input(
            schema.table,
            format!("{} not found", path.display()),
        ));
    }
    let table = read_table(fs::File::open(path)?, schema.table, Some(schema))?;
    if table.is_empty() {
        return Err(PipelineError::missing_input(schema.table, "table is empty"));
    }
    tracing::info!(table = schema.table, rows = table.len(), path = %path.display(), "loaded");
    Ok(table)
}

/// Read an optional table. An absent file, a file without a timestamp
/// column, or an unreadable file degrades to an empty table with a warning.
pub fn load_optional(path: &Path, schema: &TableSchema) -> TimeSeriesTable {
    if !path.exists() {
        tracing::warn!(table = schema.table, path = %path.display(), "optional table absent");
        return TimeSeriesTable::default();
    }
    let loaded = fs::File::open(path)
        .map_err(PipelineError::from)
        .and_then(|f| read_table(f, schema.table, Some(schema)));
    match loaded {
        Ok(table) => {
            tracing::info!(table = schema.table, rows = table.len(), "loaded");
            table
        }
        Err(e) => {
            tracing::warn!(table = schema.table, error = %e, "optional table unreadable");
            TimeSeriesTable::default()
        }
    }
}

/// Write a table as CSV with a leading `timestamp` column. NaN is written empty.
pub fn write_table<W: Write>(sink: W, table: &TimeSeriesTable) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    let mut header = vec!["timestamp".to_string()];
    header.extend(table.column_names());
    writer.write_record(&header)?;

    for (i, ts) in table.index().iter().enumerate() {
        let mut record = Vec::with_capacity(table.width() + 1);
        record.push(format_timestamp(ts));
        for col in table.columns() {
            let v = col.values[i];
            record.push(if v.is_nan() { String::new() } else { v.to_string() });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a table to a CSV file, creating parent directories.
pub fn write_csv_file(path: &Path, table: &TimeSeriesTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_table(fs::File::create(path)?, table)
}
