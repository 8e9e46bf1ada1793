use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::source_groups::{required_columns, source_groups, REPORT_COLUMNS};
use crate::naming::{table_filename, Parameter};
use crate::region::{main_catchment_ids, Region};
use crate::table::{round_half_even, Table, TableError};

/// Column holding the catchment id in model result files
pub const REGINE_COLUMN: &str = "regine";

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Year range {first}-{last} is empty")]
    EmptyYearRange { first: i32, last: i32 },

    #[error("Region '{0}' has no catchment definition")]
    NoCatchments(String),
}

/// File name of the model results for one year
pub fn results_filename(year: i32) -> String {
    format!("teotil2_results_{year}.csv")
}

/// Model results for one main catchment in one year
#[derive(Debug, Clone)]
struct CatchmentRecord {
    year: i32,
    regine: String,
    values: HashMap<String, f64>,
}

/// Per-catchment model results for a range of years
#[derive(Debug, Clone, Default)]
pub struct CatchmentResults {
    records: Vec<CatchmentRecord>,
}

impl CatchmentResults {
    /// Read one year's result file, keeping main catchments and `columns`
    ///
    /// Empty values count as zero.
    pub fn read_year(path: &Path, year: i32, columns: &[String]) -> Result<Self, TableError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TableError::MissingInput(path.to_path_buf()),
            _ => TableError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));
        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let headers = reader.headers().map_err(csv_err)?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| TableError::MissingColumn {
                    column: name.to_string(),
                    context: path.display().to_string(),
                })
        };

        let regine_idx = position(REGINE_COLUMN)?;
        let value_idx = columns
            .iter()
            .map(|c| position(c.as_str()).map(|i| (c.clone(), i)))
            .collect::<Result<Vec<_>, _>>()?;

        let main: HashSet<String> = main_catchment_ids().into_iter().collect();
        let mut records = Vec::new();

        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            let regine = record.get(regine_idx).unwrap_or_default();
            if !main.contains(regine) {
                continue;
            }

            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let mut values = HashMap::with_capacity(value_idx.len());
            for (column, idx) in &value_idx {
                let field = record.get(*idx).unwrap_or_default();
                let value = if field.is_empty() {
                    0.0
                } else {
                    field.parse::<f64>().map_err(|_| TableError::MalformedRow {
                        path: path.to_path_buf(),
                        line,
                        column: column.clone(),
                        value: field.to_string(),
                    })?
                };
                values.insert(column.clone(), value);
            }

            records.push(CatchmentRecord {
                year,
                regine: regine.to_string(),
                values,
            });
        }

        debug!(
            "Read {} main catchments for {} from {}",
            records.len(),
            year,
            path.display()
        );
        Ok(Self { records })
    }

    pub fn extend(&mut self, other: CatchmentResults) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum the region's catchments per year into report categories
    ///
    /// Years are ascending; a year with no rows for the region is omitted.
    pub fn region_table(
        &self,
        region: &Region,
        parameter: Parameter,
        year_column: &str,
    ) -> Result<Table, AggregateError> {
        let span = region
            .catchments
            .as_ref()
            .ok_or_else(|| AggregateError::NoCatchments(region.name.clone()))?;
        let ids: HashSet<String> = span.ids().into_iter().collect();
        let groups = source_groups(parameter);

        let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        for record in self.records.iter().filter(|r| ids.contains(&r.regine)) {
            let sums = by_year
                .entry(record.year)
                .or_insert_with(|| vec![0.0; groups.len()]);
            for (sum, group) in sums.iter_mut().zip(&groups) {
                *sum += group
                    .columns
                    .iter()
                    .map(|c| record.values.get(c).copied().unwrap_or(0.0))
                    .sum::<f64>();
            }
        }

        let mut columns = vec![year_column.to_string()];
        columns.extend(REPORT_COLUMNS.iter().map(|c| c.to_string()));

        let rows = by_year
            .into_iter()
            .map(|(year, sums)| {
                std::iter::once(Some(f64::from(year)))
                    .chain(sums.into_iter().map(|s| Some(round_half_even(s))))
                    .collect()
            })
            .collect();

        Ok(Table::new(year_column, columns, rows)?)
    }
}

/// Builds per-region load tables from per-catchment model results
pub struct RegionAggregator {
    results_dir: PathBuf,
    first_year: i32,
    last_year: i32,
    year_column: String,
}

impl RegionAggregator {
    pub fn new(
        results_dir: impl Into<PathBuf>,
        first_year: i32,
        last_year: i32,
    ) -> Result<Self, AggregateError> {
        if first_year > last_year {
            return Err(AggregateError::EmptyYearRange {
                first: first_year,
                last: last_year,
            });
        }
        Ok(Self {
            results_dir: results_dir.into(),
            first_year,
            last_year,
            year_column: "År".to_string(),
        })
    }

    pub fn with_year_column(mut self, year_column: impl Into<String>) -> Self {
        self.year_column = year_column.into();
        self
    }

    /// Load every year's results in `[first_year, last_year]`
    #[instrument(skip(self), fields(first = self.first_year, last = self.last_year))]
    pub fn load_results(&self, parameters: &[Parameter]) -> Result<CatchmentResults, AggregateError> {
        let columns = required_columns(parameters);
        let mut results = CatchmentResults::default();

        for year in self.first_year..=self.last_year {
            let path = self.results_dir.join(results_filename(year));
            results.extend(CatchmentResults::read_year(&path, year, &columns)?);
        }

        info!(
            "Loaded {} catchment-years from {}",
            results.len(),
            self.results_dir.display()
        );
        Ok(results)
    }

    /// Write `{region}_{p|n}.csv` for every region with catchments
    ///
    /// Regions without a catchment definition are skipped with a warning.
    pub fn write_region_tables(
        &self,
        regions: &[Region],
        parameters: &[Parameter],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, AggregateError> {
        let results = self.load_results(parameters)?;
        fs::create_dir_all(output_dir).map_err(|source| TableError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::new();
        for region in regions {
            if region.catchments.is_none() {
                warn!("Region '{}' has no catchments, skipping", region.name);
                continue;
            }
            for &parameter in parameters {
                let table = results.region_table(region, parameter, &self.year_column)?;
                let path = output_dir.join(table_filename(&region.name, parameter));
                table.write_csv(&path)?;
                debug!("Wrote {} years to {}", table.len(), path.display());
                written.push(path);
            }
        }

        info!(
            "Wrote {} region tables to {}",
            written.len(),
            output_dir.display()
        );
        Ok(written)
    }
}
