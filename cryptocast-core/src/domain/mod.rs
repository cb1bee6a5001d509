//! Domain types: bars, tables, rows and content identifiers.

pub mod bar;
pub mod ids;
pub mod table;

pub use bar::{ensure_ohlcv, OhlcvBar, OhlcvSeries, OHLCV_COLUMNS};
pub use ids::{BundleId, DatasetHash};
pub use table::{Column, FeatureRow, TimeSeriesTable};
