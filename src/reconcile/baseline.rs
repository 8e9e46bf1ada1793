/// Baseline rows placed ahead of each merged series
///
/// The baseline file holds one row per report chapter, keyed by the chapter
/// heading (`"Glomma: fosfor"`), with the same load columns as the region
/// tables. Chapters without a row get no baseline.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use tracing::debug;

use crate::naming::{heading, Parameter};
use crate::table::{parse_year, Cell, Table, TableError};

/// Baseline rows for one year, looked up by chapter heading
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    year: i32,
    year_column: String,
    columns: Vec<String>,
    rows: BTreeMap<String, Vec<Cell>>,
}

impl Baseline {
    /// Read a baseline file
    ///
    /// `key_column` holds the chapter heading; every row's year must equal
    /// `year`. Empty cells stay null.
    pub fn read_csv(
        path: &Path,
        key_column: &str,
        year_column: &str,
        year: i32,
    ) -> Result<Self, TableError> {
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

        let header: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let missing = |column: &str| TableError::MissingColumn {
            column: column.to_string(),
            context: path.display().to_string(),
        };
        let key_idx = header
            .iter()
            .position(|c| c == key_column)
            .ok_or_else(|| missing(key_column))?;
        let year_idx = header
            .iter()
            .position(|c| c == year_column)
            .ok_or_else(|| missing(year_column))?;

        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_idx)
            .map(|(_, c)| c.clone())
            .collect();
        // Validates the layout before any row is read
        Table::new(year_column, columns.clone(), Vec::new())?;

        let mut rows = BTreeMap::new();
        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let malformed = |idx: usize, field: &str| TableError::MalformedRow {
                path: path.to_path_buf(),
                line,
                column: header[idx].clone(),
                value: field.to_string(),
            };

            let key = record.get(key_idx).unwrap_or_default().to_string();
            let mut row = Vec::with_capacity(columns.len());
            for (idx, field) in record.iter().enumerate() {
                if idx == key_idx {
                    continue;
                }
                if idx == year_idx {
                    match parse_year(field) {
                        Some(y) if y == year => row.push(Some(f64::from(y))),
                        _ => return Err(malformed(idx, field)),
                    }
                } else if field.is_empty() {
                    row.push(None);
                } else {
                    match field.parse::<f64>() {
                        Ok(v) if v.is_finite() => row.push(Some(v)),
                        _ => return Err(malformed(idx, field)),
                    }
                }
            }

            if rows.insert(key.clone(), row).is_some() {
                return Err(TableError::DuplicateKey {
                    path: path.to_path_buf(),
                    key,
                });
            }
        }

        debug!(
            "Read {} baseline rows for {} from {}",
            rows.len(),
            year,
            path.display()
        );

        Ok(Self {
            year,
            year_column: year_column.to_string(),
            columns,
            rows,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One-row table for a chapter heading, if the file has one
    pub fn row_for_heading(&self, heading: &str) -> Option<Table> {
        let row = self.rows.get(heading)?;
        Table::new(
            self.year_column.as_str(),
            self.columns.clone(),
            vec![row.clone()],
        )
        .ok()
    }

    /// One-row table for a region and parameter, looked up by its chapter heading
    pub fn row_for(&self, region: &str, parameter: Parameter) -> Option<Table> {
        self.row_for_heading(&heading(region, parameter))
    }
}
