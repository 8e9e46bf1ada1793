// Series reconciliation: historical legacy tables + newly computed tables
//
// For each mapped (region, parameter) pair the legacy table is cut to the
// historical window, its columns renamed to the current schema, and the
// current table appended. Values are rounded to integers for the report. An
// optional baseline row (the 1985 reference year) is placed first.

pub mod baseline;
pub mod reference_data;
pub mod series_reconciler;

pub use baseline::Baseline;
pub use reference_data::{
    ColumnRenames, FilenameMapping, MappingEntry, ReferenceDataError, YearWindow,
};
pub use series_reconciler::{
    merge_series, prepend_baseline, BatchSummary, FailedPair, FailurePolicy, MergedPair, MergedSeries,
    OverlapPolicy, ReconcileError, SeriesReconciler, TableStores,
};
