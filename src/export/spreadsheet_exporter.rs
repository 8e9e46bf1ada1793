use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Reader};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::naming::{sheet_name, table_filename, Parameter};
use crate::utils::replace_file;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid sheet name '{name}': {source}")]
    InvalidSheetName {
        name: String,
        #[source]
        source: XlsxError,
    },

    #[error("Table {} does not fit in a worksheet", .0.display())]
    TooLarge(PathBuf),

    #[error("Failed to build workbook: {0}")]
    Workbook(#[from] XlsxError),

    #[error("Failed to write workbook {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open workbook: {0}")]
    WorkbookOpen(String),
}

/// One worksheet to be written, and the CSV it comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSource {
    pub sheet_name: String,
    pub csv_path: PathBuf,
}

/// Result of writing a workbook
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub workbook: PathBuf,
    pub sheets: Vec<String>,
}

/// Name and size of a worksheet in an existing workbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

/// Writes per-region CSV tables into one workbook, one sheet per table
pub struct SpreadsheetExporter {
    data_dir: PathBuf,
}

impl SpreadsheetExporter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Sheets in report order: regions outer, parameters inner
    pub fn plan<S: AsRef<str>>(&self, regions: &[S], parameters: &[Parameter]) -> Vec<SheetSource> {
        regions
            .iter()
            .flat_map(|region| {
                parameters.iter().map(move |&parameter| SheetSource {
                    sheet_name: sheet_name(region.as_ref(), parameter),
                    csv_path: self.data_dir.join(table_filename(region.as_ref(), parameter)),
                })
            })
            .collect()
    }

    /// Write all planned sheets to `output`
    ///
    /// Every input must exist; if any is missing nothing is written.
    #[instrument(skip(self, regions, parameters), fields(output = %output.display()))]
    pub fn export_workbook<S: AsRef<str>>(
        &self,
        regions: &[S],
        parameters: &[Parameter],
        output: &Path,
    ) -> Result<ExportSummary, ExportError> {
        let plan = self.plan(regions, parameters);

        if let Some(missing) = plan.iter().find(|s| !s.csv_path.is_file()) {
            return Err(ExportError::MissingInput(missing.csv_path.clone()));
        }

        let mut workbook = Workbook::new();
        for source in &plan {
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(&source.sheet_name)
                .map_err(|e| ExportError::InvalidSheetName {
                    name: source.sheet_name.clone(),
                    source: e,
                })?;
            let rows = write_csv_to_sheet(&source.csv_path, worksheet)?;
            debug!("Sheet '{}': {} rows", source.sheet_name, rows);
        }

        let buffer = workbook.save_to_buffer()?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ExportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        replace_file(output, |w| w.write_all(&buffer)).map_err(|source| ExportError::Io {
            path: output.to_path_buf(),
            source,
        })?;

        info!(
            "Wrote {} sheets to {}",
            plan.len(),
            output.display()
        );

        Ok(ExportSummary {
            workbook: output.to_path_buf(),
            sheets: plan.into_iter().map(|s| s.sheet_name).collect(),
        })
    }
}

/// Copy a CSV into a worksheet, header row included, no index column
///
/// Numeric fields become number cells, empty fields stay blank, anything else
/// is written as text. Returns the number of rows written.
fn write_csv_to_sheet(path: &Path, worksheet: &mut Worksheet) -> Result<usize, ExportError> {
    let file = File::open(path).map_err(|_| ExportError::MissingInput(path.to_path_buf()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(BufReader::new(file));

    let mut count = 0;
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let row = u32::try_from(row_idx).map_err(|_| ExportError::TooLarge(path.to_path_buf()))?;

        for (col_idx, field) in record.iter().enumerate() {
            let col =
                u16::try_from(col_idx).map_err(|_| ExportError::TooLarge(path.to_path_buf()))?;
            let field = if row_idx == 0 && col_idx == 0 {
                field.trim_start_matches('\u{feff}')
            } else {
                field
            };

            if field.is_empty() {
                continue;
            }
            // Header cells are always text, even if they look numeric
            match field.trim().parse::<f64>() {
                Ok(value) if row_idx > 0 && value.is_finite() => {
                    worksheet.write_number(row, col, value)?;
                }
                _ => {
                    worksheet.write_string(row, col, field)?;
                }
            }
        }
        count += 1;
    }

    Ok(count)
}

/// Sheet names of a workbook, in workbook order
pub fn read_sheet_names(path: &Path) -> Result<Vec<String>, ExportError> {
    let workbook = open_workbook_auto(path).map_err(|e| ExportError::WorkbookOpen(e.to_string()))?;
    Ok(workbook.sheet_names())
}

/// Sheet names and used-range sizes of a workbook
pub fn inspect_workbook(path: &Path) -> Result<Vec<SheetInfo>, ExportError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExportError::WorkbookOpen(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExportError::WorkbookOpen(format!("sheet '{name}': {e}")))?;
        let (rows, columns) = range.get_size();
        sheets.push(SheetInfo {
            name,
            rows,
            columns,
        });
    }
    Ok(sheets)
}
