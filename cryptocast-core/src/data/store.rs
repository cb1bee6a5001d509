//! Parquet persistence for pipeline tables.
//!
//! Layout: `{dir}/{name}.parquet` plus a `{dir}/{name}.meta.json` sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Sidecar carries row count, column list, time range and a BLAKE3 content hash
//! - Loading re-hashes the table and rejects a mismatch
//!
//! Tables are superseded wholesale on every write, never updated in place.

use crate::domain::{DatasetHash, TimeSeriesTable};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata sidecar for a stored table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub data_hash: DatasetHash,
    pub written_at: DateTime<Utc>,
}

pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.parquet"))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.meta.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table_path(name).exists()
    }

    /// Persist a table, replacing any previous version.
    pub fn write(&self, name: &str, table: &TimeSeriesTable) -> Result<TableMeta> {
        fs::create_dir_all(&self.dir)?;

        let mut df = table_to_dataframe(table)?;
        let path = self.table_path(name);
        let tmp_path = path.with_extension("parquet.tmp");
        let file = fs::File::create(&tmp_path)?;
        ParquetWriter::new(file).finish(&mut df)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        let meta = TableMeta {
            name: name.to_string(),
            rows: table.len(),
            columns: table.column_names(),
            start: table.index().first().copied(),
            end: table.index().last().copied(),
            data_hash: content_hash(table)?,
            written_at: Utc::now(),
        };
        fs::write(self.meta_path(name), serde_json::to_string_pretty(&meta)?)?;
        tracing::info!(table = name, rows = meta.rows, path = %path.display(), "table written");
        Ok(meta)
    }

    pub fn meta(&self, name: &str) -> Option<TableMeta> {
        let content = fs::read_to_string(self.meta_path(name)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Load a stored table and verify it against its sidecar hash.
    pub fn read(&self, name: &str) -> Result<TimeSeriesTable> {
        let path = self.table_path(name);
        if !path.exists() {
            return Err(PipelineError::missing_input(
                name,
                format!("{} not found", path.display()),
            ));
        }
        let df = ParquetReader::new(fs::File::open(&path)?).finish()?;
        let table = dataframe_to_table(&df)?;

        if let Some(meta) = self.meta(name) {
            let actual = content_hash(&table)?;
            if actual != meta.data_hash {
                return Err(PipelineError::InvalidTable(format!(
                    "{name}: content hash {actual} does not match sidecar {}",
                    meta.data_hash
                )));
            }
        }
        Ok(table)
    }
}

/// BLAKE3 hash of the table's canonical JSON form.
pub fn content_hash(table: &TimeSeriesTable) -> Result<DatasetHash> {
    Ok(DatasetHash::from_bytes(&serde_json::to_vec(table)?))
}

// ── Parquet conversion helpers ──────────────────────────────────────

fn table_to_dataframe(table: &TimeSeriesTable) -> Result<DataFrame> {
    let millis: Vec<i64> = table.index().iter().map(|ts| ts.timestamp_millis()).collect();
    let mut columns = vec![Column::new("timestamp".into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?];
    for col in table.columns() {
        columns.push(Column::new(col.name.as_str().into(), col.values.clone()));
    }
    Ok(DataFrame::new(columns)?)
}

fn dataframe_to_table(df: &DataFrame) -> Result<TimeSeriesTable> {
    let ts_col = df
        .column("timestamp")
        .map_err(|_| PipelineError::InvalidTable("parquet table has no timestamp column".into()))?
        .cast(&DataType::Int64)?;
    let ts_ca = ts_col.i64()?;

    let mut index = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ms = ts_ca
            .get(i)
            .ok_or_else(|| PipelineError::InvalidTable(format!("null timestamp at row {i}")))?;
        let ts = Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| PipelineError::InvalidTable(format!("bad timestamp {ms} at row {i}")))?;
        index.push(ts);
    }

    let mut table = TimeSeriesTable::new(index)?;
    for name in df.get_column_names() {
        if name.as_str() == "timestamp" {
            continue;
        }
        let values: Vec<f64> = df
            .column(name.as_str())?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        table.set_column(name.as_str(), values)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TimeSeriesTable {
        let names = vec!["close".to_string(), "fear_greed".to_string()];
        TimeSeriesTable::from_rows(
            &names,
            vec![
                (Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), vec![100.0, 55.0]),
                (Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(), vec![101.5, f64::NAN]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let meta = store.write("features", &sample()).unwrap();
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.columns, vec!["close", "fear_greed"]);

        let back = store.read("features").unwrap();
        assert_eq!(back.index(), sample().index());
        assert_eq!(back.column("close").unwrap(), &[100.0, 101.5]);
        assert!(back.column("fear_greed").unwrap()[1].is_nan());
        assert!(!dir.path().join("features.parquet.tmp").exists());
    }

    #[test]
    fn missing_table_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        assert!(matches!(
            store.read("nope"),
            Err(PipelineError::MissingInput { .. })
        ));
    }

    #[test]
    fn tampered_sidecar_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let mut meta = store.write("features", &sample()).unwrap();
        meta.data_hash = DatasetHash("0".repeat(64));
        fs::write(
            dir.path().join("features.meta.json"),
            serde_json::to_string(&meta).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            store.read("features"),
            Err(PipelineError::InvalidTable(_))
        ));
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash(&sample()).unwrap(), content_hash(&sample()).unwrap());
    }
}
