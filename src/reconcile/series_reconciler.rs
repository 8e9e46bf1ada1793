use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::baseline::Baseline;
use super::reference_data::{
    ColumnRenames, FilenameMapping, MappingEntry, ReferenceDataError, YearWindow,
};
use crate::naming::{pair_label, parse_table_filename};
use crate::table::{Table, TableError};

/// Error types for reconciling one (region, parameter) pair
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Reference(#[from] ReferenceDataError),

    #[error(
        "Column sets differ after renaming (legacy only: {legacy_only:?}, current only: {current_only:?})"
    )]
    SchemaMismatch {
        legacy_only: Vec<String>,
        current_only: Vec<String>,
    },

    #[error("Current table has years inside the legacy window {window}: {years:?}")]
    YearOverlap { window: YearWindow, years: Vec<i32> },

    #[error("Baseline year {0} is already in the merged table")]
    BaselineConflict(i32),
}

impl ReconcileError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Table(TableError::MissingInput(_)) => "missing_input",
            ReconcileError::Table(TableError::MalformedRow { .. }) => "malformed_row",
            ReconcileError::Table(TableError::DuplicateColumn { .. }) => "duplicate_column",
            ReconcileError::Table(_) => "table",
            ReconcileError::Reference(_) => "reference_data",
            ReconcileError::SchemaMismatch { .. } => "schema_mismatch",
            ReconcileError::YearOverlap { .. } => "year_overlap",
            ReconcileError::BaselineConflict(_) => "baseline_conflict",
        }
    }
}

/// What to do when one pair fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and carry on with the next pair
    #[default]
    ContinueAndReport,
    /// Stop the batch at the first failure
    FailFast,
}

/// What to do when the current table reaches back into the legacy window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Fail the pair
    #[default]
    Fail,
    /// Drop current rows for years inside the window; legacy values win
    DiscardCurrent,
}

/// Directories the reconciler reads from and writes to
#[derive(Debug, Clone)]
pub struct TableStores {
    pub legacy_dir: PathBuf,
    pub current_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// A successfully merged pair
#[derive(Debug, Clone, Serialize)]
pub struct MergedPair {
    pub pair: String,
    pub current: String,
    pub legacy: String,
    pub legacy_rows: usize,
    pub current_rows: usize,
    /// 1 if a baseline row was placed first, else 0
    pub baseline_rows: usize,
    pub output: PathBuf,
}

impl MergedPair {
    pub fn total_rows(&self) -> usize {
        self.baseline_rows + self.legacy_rows + self.current_rows
    }
}

/// A pair that could not be merged
#[derive(Debug, Clone, Serialize)]
pub struct FailedPair {
    pub pair: String,
    pub current: String,
    pub legacy: String,
    pub kind: &'static str,
    pub error: String,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub merged: Vec<MergedPair>,
    pub failed: Vec<FailedPair>,
    /// Pairs never attempted because the batch stopped early
    pub skipped: usize,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }

    pub fn attempted(&self) -> usize {
        self.merged.len() + self.failed.len()
    }
}

/// Result of merging two in-memory tables
#[derive(Debug, Clone)]
pub struct MergedSeries {
    pub table: Table,
    pub legacy_rows: usize,
    pub current_rows: usize,
}

/// Merge a legacy table and a current table into one series
///
/// Legacy rows outside `window` are dropped and legacy columns renamed. The
/// column sets must then match (in any order); the output uses the current
/// table's column order. Current years inside `window` are handled by
/// `overlap`; current years before the window are kept. Legacy rows come
/// first, then current rows, without sorting or deduplication. Every value is
/// rounded to an integer.
pub fn merge_series(
    mut legacy: Table,
    mut current: Table,
    window: YearWindow,
    renames: &ColumnRenames,
    overlap: OverlapPolicy,
) -> Result<MergedSeries, ReconcileError> {
    window.validate()?;
    renames.validate()?;

    legacy.retain_years(|year| window.contains(year));
    legacy.rename_columns(|column| renames.apply(column))?;

    let legacy_set = legacy.column_set();
    let current_set = current.column_set();
    if legacy_set != current_set {
        let legacy_only = difference(&legacy_set, &current_set);
        let current_only = difference(&current_set, &legacy_set);
        return Err(ReconcileError::SchemaMismatch {
            legacy_only,
            current_only,
        });
    }

    let overlapping: BTreeSet<i32> = current
        .years()
        .into_iter()
        .filter(|&year| window.contains(year))
        .collect();
    if !overlapping.is_empty() {
        match overlap {
            OverlapPolicy::Fail => {
                return Err(ReconcileError::YearOverlap {
                    window,
                    years: overlapping.into_iter().collect(),
                });
            }
            OverlapPolicy::DiscardCurrent => {
                warn!(
                    "Discarding {} current years covered by legacy window {}: {:?}",
                    overlapping.len(),
                    window,
                    overlapping
                );
                current.retain_years(|year| !window.contains(year));
            }
        }
    }

    legacy.reorder_columns(current.columns())?;
    let legacy_rows = legacy.len();
    let current_rows = current.len();

    legacy.append(current)?;
    legacy.round_values();

    Ok(MergedSeries {
        table: legacy,
        legacy_rows,
        current_rows,
    })
}

/// Place a baseline row ahead of a merged table
///
/// The row's columns are renamed like legacy columns and must match the
/// table's set; its year must not already be in the table.
pub fn prepend_baseline(
    table: &mut Table,
    mut row: Table,
    renames: &ColumnRenames,
) -> Result<(), ReconcileError> {
    row.rename_columns(|column| renames.apply(column))?;

    let row_set = row.column_set();
    let table_set = table.column_set();
    if row_set != table_set {
        return Err(ReconcileError::SchemaMismatch {
            legacy_only: difference(&row_set, &table_set),
            current_only: difference(&table_set, &row_set),
        });
    }

    let years = table.years();
    if let Some(&year) = row.years().iter().find(|y| years.contains(y)) {
        return Err(ReconcileError::BaselineConflict(year));
    }

    row.reorder_columns(table.columns())?;
    row.round_values();
    table.prepend(row)?;
    Ok(())
}

fn difference(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> Vec<String> {
    a.difference(b).map(|s| s.to_string()).collect()
}

/// Merges historical and current load tables for every mapped pair
#[derive(Debug, Clone)]
pub struct SeriesReconciler {
    mapping: FilenameMapping,
    renames: ColumnRenames,
    window: YearWindow,
    stores: TableStores,
    year_column: String,
    failure_policy: FailurePolicy,
    overlap_policy: OverlapPolicy,
    baseline: Option<Baseline>,
}

impl SeriesReconciler {
    /// Fails if the window is inverted or the renames chain
    pub fn new(
        mapping: FilenameMapping,
        renames: ColumnRenames,
        window: YearWindow,
        stores: TableStores,
    ) -> Result<Self, ReferenceDataError> {
        window.validate()?;
        renames.validate()?;
        Ok(Self {
            mapping,
            renames,
            window,
            stores,
            year_column: "År".to_string(),
            failure_policy: FailurePolicy::default(),
            overlap_policy: OverlapPolicy::default(),
            baseline: None,
        })
    }

    pub fn with_year_column(mut self, year_column: impl Into<String>) -> Self {
        self.year_column = year_column.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Place the matching baseline row ahead of every merged table
    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn mapping(&self) -> &FilenameMapping {
        &self.mapping
    }

    pub fn output_path(&self, entry: &MappingEntry) -> PathBuf {
        self.stores.output_dir.join(&entry.current)
    }

    /// Reconcile one mapping entry and write the merged table
    ///
    /// Nothing is written unless every step succeeds.
    #[instrument(skip(self), fields(current = %entry.current, legacy = %entry.legacy))]
    pub fn reconcile_pair(&self, entry: &MappingEntry) -> Result<MergedPair, ReconcileError> {
        let legacy_path = self.stores.legacy_dir.join(&entry.legacy);
        let legacy = Table::read_csv(&legacy_path, &self.year_column)?;
        debug!("Loaded {} legacy rows", legacy.len());

        let current_path = self.stores.current_dir.join(&entry.current);
        let current = Table::read_csv(&current_path, &self.year_column)?;
        debug!("Loaded {} current rows", current.len());

        let mut merged = merge_series(
            legacy,
            current,
            self.window,
            &self.renames,
            self.overlap_policy,
        )?;

        let baseline_row = self.baseline.as_ref().and_then(|baseline| {
            let (region, parameter) = parse_table_filename(&entry.current)?;
            baseline.row_for(region, parameter)
        });
        let baseline_rows = match baseline_row {
            Some(row) => {
                prepend_baseline(&mut merged.table, row, &self.renames)?;
                1
            }
            None => {
                if self.baseline.is_some() {
                    debug!("No baseline row for {}", entry.current);
                }
                0
            }
        };

        let output = self.output_path(entry);
        ensure_dir(&self.stores.output_dir)?;
        merged.table.write_csv(&output)?;

        info!(
            "Merged {} legacy + {} current rows into {}",
            merged.legacy_rows,
            merged.current_rows,
            output.display()
        );

        Ok(MergedPair {
            pair: pair_label(&entry.current),
            current: entry.current.clone(),
            legacy: entry.legacy.clone(),
            legacy_rows: merged.legacy_rows,
            current_rows: merged.current_rows,
            baseline_rows,
            output,
        })
    }

    /// Reconcile every mapping entry in mapping order
    ///
    /// `on_outcome` is called after each attempted pair. Under
    /// `FailurePolicy::FailFast` the remaining pairs are counted as skipped
    /// after the first failure. Files already written are kept either way.
    pub fn reconcile_all<F>(&self, mut on_outcome: F) -> BatchSummary
    where
        F: FnMut(&MappingEntry, &Result<MergedPair, ReconcileError>),
    {
        let start_time = Instant::now();
        info!(
            "Reconciling {} pairs with legacy window {}",
            self.mapping.len(),
            self.window
        );

        let mut summary = BatchSummary::default();

        for (idx, entry) in self.mapping.iter().enumerate() {
            let outcome = self.reconcile_pair(entry);
            on_outcome(entry, &outcome);

            match outcome {
                Ok(merged) => summary.merged.push(merged),
                Err(e) => {
                    let pair = pair_label(&entry.current);
                    error!("Failed to reconcile {}: {}", pair, e);
                    summary.failed.push(FailedPair {
                        pair,
                        current: entry.current.clone(),
                        legacy: entry.legacy.clone(),
                        kind: e.kind(),
                        error: e.to_string(),
                    });

                    if self.failure_policy == FailurePolicy::FailFast {
                        summary.skipped = self.mapping.len() - idx - 1;
                        warn!(
                            "Stopping after first failure, {} pairs not attempted",
                            summary.skipped
                        );
                        break;
                    }
                }
            }
        }

        info!(
            "Reconciliation finished in {:.2}s: {} merged, {} failed, {} skipped",
            start_time.elapsed().as_secs_f64(),
            summary.merged.len(),
            summary.failed.len(),
            summary.skipped
        );

        summary
    }
}

fn ensure_dir(dir: &Path) -> Result<(), TableError> {
    fs::create_dir_all(dir).map_err(|source| TableError::Io {
        path: dir.to_path_buf(),
        source,
    })
}
