// Region tables from per-catchment model results
//
// Model output columns are grouped into the report's load categories and the
// main catchments of each region are summed per year.

pub mod region_aggregator;
pub mod source_groups;

pub use region_aggregator::{
    results_filename, AggregateError, CatchmentResults, RegionAggregator, REGINE_COLUMN,
};
pub use source_groups::{required_columns, source_groups, SourceGroup, REPORT_COLUMNS};
