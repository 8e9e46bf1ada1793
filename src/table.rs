//! In-memory load tables: one row per year, one column per load category.
//!
//! Every non-year cell is a nullable number. An empty CSV field is read as
//! `None` and written back as an empty field.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::utils::replace_file;

/// A single table cell. `None` is a missing value.
pub type Cell = Option<f64>;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Column '{column}' not found in {context}")]
    MissingColumn { column: String, context: String },

    #[error("Malformed value at {}:{line}, column '{column}': {value:?}", .path.display())]
    MalformedRow {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("IO error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Column '{column}' appears more than once in {context}")]
    DuplicateColumn { column: String, context: String },

    #[error("Key '{key}' appears more than once in {}", .path.display())]
    DuplicateKey { path: PathBuf, key: String },

    #[error("Column layout differs: {0}")]
    ColumnMismatch(String),
}

/// Row-per-year table with a designated year column
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    year_column: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from parts, checking the year column and row widths
    pub fn new(
        year_column: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, TableError> {
        let year_column = year_column.into();
        check_unique(&columns, "table")?;
        let year_idx = columns.iter().position(|c| *c == year_column).ok_or_else(|| {
            TableError::MissingColumn {
                column: year_column.clone(),
                context: "table".to_string(),
            }
        })?;

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::ColumnMismatch(format!(
                    "row {i} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            match row[year_idx] {
                Some(y) if y.fract() == 0.0 => {}
                other => {
                    return Err(TableError::ColumnMismatch(format!(
                        "row {i} has invalid year {other:?}"
                    )))
                }
            }
        }

        Ok(Self {
            year_column,
            columns,
            rows,
        })
    }

    /// Read a table from a CSV file with a header row
    ///
    /// The year column must hold integers; every other field must be empty or
    /// a number.
    pub fn read_csv(path: &Path, year_column: &str) -> Result<Self, TableError> {
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

        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        check_unique(&columns, &path.display().to_string())?;

        let year_idx = columns
            .iter()
            .position(|c| c == year_column)
            .ok_or_else(|| TableError::MissingColumn {
                column: year_column.to_string(),
                context: path.display().to_string(),
            })?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let mut row = Vec::with_capacity(columns.len());
            for (idx, field) in record.iter().enumerate() {
                let malformed = || TableError::MalformedRow {
                    path: path.to_path_buf(),
                    line,
                    column: columns[idx].clone(),
                    value: field.to_string(),
                };

                if idx == year_idx {
                    let year = parse_year(field).ok_or_else(malformed)?;
                    row.push(Some(f64::from(year)));
                } else if field.is_empty() {
                    row.push(None);
                } else {
                    let value = field.parse::<f64>().map_err(|_| malformed())?;
                    if !value.is_finite() {
                        return Err(malformed());
                    }
                    row.push(Some(value));
                }
            }
            rows.push(row);
        }

        debug!(
            "Read {} rows x {} columns from {}",
            rows.len(),
            columns.len(),
            path.display()
        );

        Ok(Self {
            year_column: year_column.to_string(),
            columns,
            rows,
        })
    }

    /// Write the table as CSV, replacing any existing file
    ///
    /// No index column is added. Integral values are written without a
    /// fractional part.
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let io_err = |source| TableError::Io {
            path: path.to_path_buf(),
            source,
        };

        replace_file(path, |out| {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(&self.columns).map_err(io::Error::from)?;
            for row in &self.rows {
                writer
                    .write_record(row.iter().map(|cell| format_cell(*cell)))
                    .map_err(io::Error::from)?;
            }
            writer.flush()
        })
        .map_err(io_err)?;

        debug!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn year_column(&self) -> &str {
        &self.year_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn year_index(&self) -> usize {
        // Constructors guarantee the year column exists and renames keep it in sync
        self.columns
            .iter()
            .position(|c| *c == self.year_column)
            .unwrap_or(0)
    }

    /// Years of all rows, in row order
    pub fn years(&self) -> Vec<i32> {
        let idx = self.year_index();
        self.rows
            .iter()
            .map(|row| row[idx].map(|y| y as i32).unwrap_or_default())
            .collect()
    }

    /// Values of a named column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<Cell>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Keep only rows whose year satisfies `keep`
    pub fn retain_years(&mut self, keep: impl Fn(i32) -> bool) {
        let idx = self.year_index();
        self.rows
            .retain(|row| row[idx].map(|y| keep(y as i32)).unwrap_or(false));
    }

    /// Rename every column through `rename`
    ///
    /// Fails without changing the table if two columns would end up with the
    /// same name.
    pub fn rename_columns<F>(&mut self, rename: F) -> Result<(), TableError>
    where
        F: Fn(&str) -> String,
    {
        let renamed: Vec<String> = self.columns.iter().map(|c| rename(c)).collect();
        check_unique(&renamed, "renamed table")?;
        self.columns = renamed;
        self.year_column = rename(&self.year_column);
        Ok(())
    }

    /// Column names as an order-insensitive set
    pub fn column_set(&self) -> BTreeSet<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Permute columns into `order`, which must name exactly the same columns
    pub fn reorder_columns(&mut self, order: &[String]) -> Result<(), TableError> {
        if order.len() != self.columns.len() {
            return Err(TableError::ColumnMismatch(format!(
                "cannot reorder {} columns into {}",
                self.columns.len(),
                order.len()
            )));
        }

        let positions = order
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| TableError::MissingColumn {
                        column: name.clone(),
                        context: "table".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.rows = self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&i| row[i]).collect())
            .collect();
        self.columns = order.to_vec();
        Ok(())
    }

    /// Append the rows of `other` after this table's rows
    ///
    /// Both tables must have identical column order.
    pub fn append(&mut self, other: Table) -> Result<(), TableError> {
        if self.columns != other.columns {
            return Err(TableError::ColumnMismatch(format!(
                "{:?} vs {:?}",
                self.columns, other.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Insert the rows of `other` before this table's rows
    ///
    /// Both tables must have identical column order.
    pub fn prepend(&mut self, mut other: Table) -> Result<(), TableError> {
        if self.columns != other.columns {
            return Err(TableError::ColumnMismatch(format!(
                "{:?} vs {:?}",
                other.columns, self.columns
            )));
        }
        other.rows.append(&mut self.rows);
        self.rows = other.rows;
        Ok(())
    }

    /// Round every value to the nearest integer, ties to even
    pub fn round_values(&mut self) {
        for cell in self.rows.iter_mut().flatten() {
            if let Some(v) = cell {
                *v = round_half_even(*v);
            }
        }
    }
}

/// Round to the nearest integer, ties to even
pub fn round_half_even(value: f64) -> f64 {
    // Normalise -0.0 so it is written as "0"
    value.round_ties_even() + 0.0
}

fn check_unique(columns: &[String], context: &str) -> Result<(), TableError> {
    let mut seen = BTreeSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(TableError::DuplicateColumn {
                column: column.clone(),
                context: context.to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) fn parse_year(field: &str) -> Option<i32> {
    if let Ok(year) = field.parse::<i32>() {
        return Some(year);
    }
    let value = field.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value.abs() < f64::from(i32::MAX) {
        Some(value as i32)
    } else {
        None
    }
}

fn format_cell(cell: Cell) -> String {
    match cell {
        None => String::new(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => v.to_string(),
    }
}
