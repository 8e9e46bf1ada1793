#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use teotil_report::reconcile::TableStores;

/// Legacy, current and output directories under one temp root
pub struct Stores {
    pub root: TempDir,
    pub legacy: PathBuf,
    pub current: PathBuf,
    pub output: PathBuf,
}

impl Stores {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let legacy = root.path().join("legacy");
        let current = root.path().join("current");
        let output = root.path().join("merged");
        fs::create_dir_all(&legacy).unwrap();
        fs::create_dir_all(&current).unwrap();
        Self {
            root,
            legacy,
            current,
            output,
        }
    }

    pub fn table_stores(&self) -> TableStores {
        TableStores {
            legacy_dir: self.legacy.clone(),
            current_dir: self.current.clone(),
            output_dir: self.output.clone(),
        }
    }
}

/// Write a CSV from a header and rows of already formatted fields
pub fn write_csv(dir: &Path, name: &str, header: &[&str], rows: &[Vec<String>]) -> PathBuf {
    let path = dir.join(name);
    let mut text = header.join(",");
    text.push('\n');
    for row in rows {
        text.push_str(&row.join(","));
        text.push('\n');
    }
    fs::write(&path, text).expect("Failed to write CSV");
    path
}

/// Rows of `[year, value, value, ...]` with the same value in every column
pub fn year_rows(years: std::ops::RangeInclusive<i32>, width: usize, value: f64) -> Vec<Vec<String>> {
    years
        .map(|year| {
            std::iter::once(year.to_string())
                .chain(std::iter::repeat(value.to_string()).take(width))
                .collect()
        })
        .collect()
}

/// Parse a written CSV back into header and rows of fields
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("Failed to open output");
    let header = reader
        .headers()
        .expect("Missing header")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| {
            r.expect("Malformed record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (header, rows)
}
