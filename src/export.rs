// Workbook export of the per-region tables for distribution

pub mod spreadsheet_exporter;

pub use spreadsheet_exporter::{
    inspect_workbook, read_sheet_names, ExportError, ExportSummary, SheetInfo, SheetSource,
    SpreadsheetExporter,
};
