//! TimeSeriesTable: the timestamp-indexed, column-major table every stage passes around.
//!
//! Invariants:
//! - timestamps are UTC and strictly increasing (no duplicates)
//! - every column has exactly one value per timestamp
//! - undefined values are NaN; a gap in time is an absent row, never an implicit zero

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named column of values aligned with the table index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeriesTable {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl TimeSeriesTable {
    /// Create a table with the given index and no columns.
    ///
    /// Fails if the index is not strictly increasing.
    pub fn new(index: Vec<DateTime<Utc>>) -> Result<Self> {
        if let Some(pos) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(PipelineError::InvalidTable(format!(
                "index not strictly increasing at row {}: {} >= {}",
                pos + 1,
                index[pos],
                index[pos + 1]
            )));
        }
        Ok(Self {
            index,
            columns: Vec::new(),
        })
    }

    /// Build a table from unordered rows. Rows are sorted by timestamp and
    /// duplicate timestamps keep the last row written.
    pub fn from_rows<I>(names: &[String], rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DateTime<Utc>, Vec<f64>)>,
    {
        let mut by_ts: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
        for (ts, values) in rows {
            if values.len() != names.len() {
                return Err(PipelineError::InvalidTable(format!(
                    "row at {ts} has {} values, expected {}",
                    values.len(),
                    names.len()
                )));
            }
            by_ts.insert(ts, values);
        }

        let mut columns: Vec<Column> = names
            .iter()
            .map(|name| Column {
                name: name.clone(),
                values: Vec::with_capacity(by_ts.len()),
            })
            .collect();
        let mut index = Vec::with_capacity(by_ts.len());
        for (ts, values) in by_ts {
            index.push(ts);
            for (col, v) in columns.iter_mut().zip(values) {
                col.values.push(v);
            }
        }
        Ok(Self { index, columns })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Look up a required column, reporting the table name on failure.
    pub fn require(&self, table: &str, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| PipelineError::missing_input(table, format!("column '{name}' absent")))
    }

    /// Insert or replace a column. Replacing keeps the column's position.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.index.len() {
            return Err(PipelineError::InvalidTable(format!(
                "column '{name}' has {} values, table has {} rows",
                values.len(),
                self.index.len()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.values = values,
            None => self.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let pos = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(pos).values)
    }

    /// Keep only rows whose mask entry is true.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.index.len());
        let keep = |i: usize| mask.get(i).copied().unwrap_or(false);
        self.index = self
            .index
            .iter()
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .map(|(_, ts)| *ts)
            .collect();
        for col in &mut self.columns {
            col.values = col
                .values
                .iter()
                .enumerate()
                .filter(|(i, _)| keep(*i))
                .map(|(_, v)| *v)
                .collect();
        }
    }

    /// Replace +/-infinity with NaN in every column.
    pub fn replace_infinite(&mut self) {
        for col in &mut self.columns {
            for v in &mut col.values {
                if v.is_infinite() {
                    *v = f64::NAN;
                }
            }
        }
    }

    /// Drop every row that holds at least one undefined value.
    pub fn drop_undefined_rows(&mut self) {
        let mask: Vec<bool> = (0..self.len())
            .map(|i| self.columns.iter().all(|c| c.values[i].is_finite()))
            .collect();
        self.retain_rows(&mask);
    }

    /// Carry the last defined value forward, per column.
    pub fn forward_fill(&mut self) {
        for col in &mut self.columns {
            let mut last = f64::NAN;
            for v in &mut col.values {
                if v.is_nan() {
                    *v = last;
                } else {
                    last = *v;
                }
            }
        }
    }

    /// Carry the next defined value backward, per column.
    pub fn backward_fill(&mut self) {
        for col in &mut self.columns {
            let mut next = f64::NAN;
            for v in col.values.iter_mut().rev() {
                if v.is_nan() {
                    *v = next;
                } else {
                    next = *v;
                }
            }
        }
    }

    /// Fraction of rows where the column is defined. Zero for unknown columns or empty tables.
    pub fn coverage(&self, name: &str) -> f64 {
        match self.column(name) {
            Some(values) if !values.is_empty() => {
                values.iter().filter(|v| v.is_finite()).count() as f64 / values.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Left-join `other` onto this table's index by exact timestamp.
    ///
    /// Rows of `other` without a matching timestamp are discarded; rows of
    /// `self` without a match receive NaN. Same-named columns are overwritten.
    pub fn join_left(&mut self, other: &TimeSeriesTable) -> Result<()> {
        let positions: Vec<Option<usize>> = self
            .index
            .iter()
            .map(|ts| other.index.binary_search(ts).ok())
            .collect();
        for col in &other.columns {
            let values = positions
                .iter()
                .map(|p| p.map_or(f64::NAN, |j| col.values[j]))
                .collect();
            self.set_column(&col.name, values)?;
        }
        Ok(())
    }

    /// Snapshot of row `i` as a named mapping.
    pub fn row(&self, i: usize) -> Option<FeatureRow> {
        let timestamp = *self.index.get(i)?;
        let values = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.values[i]))
            .collect();
        Some(FeatureRow { timestamp, values })
    }

    pub fn last_row(&self) -> Option<FeatureRow> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }

    /// Last defined value of a column, if any.
    pub fn last_defined(&self, name: &str) -> Option<f64> {
        self.column(name)?
            .iter()
            .rev()
            .copied()
            .find(|v| v.is_finite())
    }
}

/// A single table row: timestamp plus named values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl FeatureRow {
    /// Defined value of a field; NaN, infinite and absent fields read as `None`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| v.is_finite())
    }
}
