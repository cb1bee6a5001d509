//! Feature construction: the hourly training feature store and the
//! 15-day long-horizon grid.

pub mod assembler;
pub mod longterm;

pub use assembler::{AssemblyOutput, FeatureAssembler, ImputationPolicy};
pub use longterm::{
    horizon_label, is_target, target_return_column, target_vol_column, LongHorizonBuilder,
    LongHorizonConfig,
};

use crate::domain::TimeSeriesTable;

/// Raw input tables. Only `market` is required; the others may be empty.
#[derive(Debug, Clone, Copy)]
pub struct SourceTables<'a> {
    pub market: &'a TimeSeriesTable,
    pub onchain: &'a TimeSeriesTable,
    pub macro_data: &'a TimeSeriesTable,
    pub sentiment: &'a TimeSeriesTable,
}
