//! Data ingestion, schemas, resampling and persistence.

pub mod ingest;
pub mod resample;
pub mod schema;
pub mod store;

pub use ingest::{load_optional, load_required, read_table, write_csv_file, write_table};
pub use resample::{annual, as_of, resample_ohlcv, Agg, BinGrid};
pub use schema::{MacroRecord, OnchainRecord, SentimentRecord, TableSchema};
pub use store::{TableMeta, TableStore};
