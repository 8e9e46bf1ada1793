use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::Deserialize;

use crate::naming::{parse_table_filename, table_filename, Parameter};
use crate::reconcile::{
    Baseline, ColumnRenames, FilenameMapping, ReferenceDataError, SeriesReconciler, TableStores,
    YearWindow,
};
use crate::region::Region;
use crate::table::TableError;
use crate::utils::expand_year_template;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Reference(#[from] ReferenceDataError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Baseline year {year} must be before the legacy window {window}")]
    BaselineYear { year: i32, window: YearWindow },

    #[error("No parameters configured")]
    NoParameters,

    #[error("Parameter {0} listed more than once")]
    DuplicateParameter(Parameter),

    #[error("No regions configured")]
    NoRegions,

    #[error("Region '{0}' listed more than once")]
    DuplicateRegion(String),

    #[error("Mapping key '{0}' is not a '<region>_<p|n>.csv' file name")]
    InvalidMappingKey(String),

    #[error("Mapping entry '{0}' does not match any configured region and parameter")]
    UnexpectedMappingEntry(String),

    #[error("No filename mapping for {region} ({parameter}): expected key '{filename}'")]
    UnmappedPair {
        region: String,
        parameter: Parameter,
        filename: String,
    },

    #[error("Year column name is empty")]
    EmptyYearColumn,

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
}

/// Settings for building region tables from catchment model results
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateSettings {
    pub results_dir: PathBuf,
    pub first_year: i32,
    /// Defaults to the report year
    #[serde(default)]
    pub last_year: Option<i32>,
}

/// Reference rows placed ahead of each merged table, keyed by chapter heading
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaselineSettings {
    pub path: PathBuf,
    #[serde(default = "default_baseline_year")]
    pub year: i32,
    /// Column holding the chapter heading, e.g. `Glomma: fosfor`
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

fn default_baseline_year() -> i32 {
    1985
}

fn default_key_column() -> String {
    "section_name".to_string()
}

/// Everything a report run needs, normally read from `teotil_report.toml`
///
/// Paths may contain `{year}`, replaced by `report_year`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default = "default_report_year")]
    pub report_year: i32,
    #[serde(default = "default_year_column")]
    pub year_column: String,
    pub window: YearWindow,
    pub legacy_dir: PathBuf,
    pub current_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub workbook_path: Option<PathBuf>,
    #[serde(default)]
    pub aggregate: Option<AggregateSettings>,
    #[serde(default)]
    pub baseline: Option<BaselineSettings>,
    #[serde(default = "default_parameters")]
    pub parameters: Vec<Parameter>,
    pub regions: Vec<Region>,
    pub filename_map: FilenameMapping,
    #[serde(default)]
    pub renames: ColumnRenames,
}

/// Invocation-time values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub report_year: Option<i32>,
    pub window_start: Option<i32>,
    pub window_end: Option<i32>,
    pub legacy_dir: Option<PathBuf>,
    pub current_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub workbook_path: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub baseline_path: Option<PathBuf>,
}

fn default_report_year() -> i32 {
    // The report covers the previous calendar year
    chrono::Local::now().year() - 1
}

fn default_year_column() -> String {
    "År".to_string()
}

fn default_parameters() -> Vec<Parameter> {
    Parameter::ALL.to_vec()
}

impl ReportConfig {
    /// Load, override, expand and validate in one step
    pub fn resolve(path: &Path, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(overrides);
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without validating it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(year) = overrides.report_year {
            self.report_year = year;
        }
        if let Some(start) = overrides.window_start {
            self.window.start = start;
        }
        if let Some(end) = overrides.window_end {
            self.window.end = end;
        }
        if let Some(dir) = &overrides.legacy_dir {
            self.legacy_dir = dir.clone();
        }
        if let Some(dir) = &overrides.current_dir {
            self.current_dir = dir.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(path) = &overrides.workbook_path {
            self.workbook_path = Some(path.clone());
        }
        if let (Some(dir), Some(settings)) = (&overrides.results_dir, self.aggregate.as_mut()) {
            settings.results_dir = dir.clone();
        }
        if let (Some(path), Some(settings)) = (&overrides.baseline_path, self.baseline.as_mut()) {
            settings.path = path.clone();
        }
    }

    /// Replace `{year}` in every configured path
    pub fn expand_paths(&mut self) {
        let year = self.report_year;
        for path in [
            &mut self.legacy_dir,
            &mut self.current_dir,
            &mut self.output_dir,
        ] {
            *path = expand_year_template(path, year);
        }
        if let Some(path) = self.workbook_path.as_mut() {
            *path = expand_year_template(path, year);
        }
        if let Some(settings) = self.aggregate.as_mut() {
            settings.results_dir = expand_year_template(&settings.results_dir, year);
        }
        if let Some(settings) = self.baseline.as_mut() {
            settings.path = expand_year_template(&settings.path, year);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renames.validate()?;

        if self.year_column.trim().is_empty() {
            return Err(ConfigError::EmptyYearColumn);
        }

        if self.parameters.is_empty() {
            return Err(ConfigError::NoParameters);
        }
        let mut seen = HashSet::new();
        for &parameter in &self.parameters {
            if !seen.insert(parameter) {
                return Err(ConfigError::DuplicateParameter(parameter));
            }
        }

        if self.regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        let mut names = HashSet::new();
        for region in &self.regions {
            if !names.insert(region.name.as_str()) {
                return Err(ConfigError::DuplicateRegion(region.name.clone()));
            }
        }

        for entry in self.filename_map.iter() {
            let (region, parameter) = parse_table_filename(&entry.current)
                .ok_or_else(|| ConfigError::InvalidMappingKey(entry.current.clone()))?;
            if !names.contains(region) || !self.parameters.contains(&parameter) {
                return Err(ConfigError::UnexpectedMappingEntry(entry.current.clone()));
            }
        }

        for region in &self.regions {
            for &parameter in &self.parameters {
                let filename = table_filename(&region.name, parameter);
                if self.filename_map.legacy_for(&filename).is_none() {
                    return Err(ConfigError::UnmappedPair {
                        region: region.name.clone(),
                        parameter,
                        filename,
                    });
                }
            }
        }

        if let Some(settings) = &self.baseline {
            if settings.year >= self.window.start {
                return Err(ConfigError::BaselineYear {
                    year: settings.year,
                    window: self.window,
                });
            }
        }

        if let Some(settings) = &self.aggregate {
            let last = self.aggregate_last_year().unwrap_or(self.report_year);
            if settings.first_year > last {
                return Err(ConfigError::Reference(ReferenceDataError::InvertedWindow {
                    start: settings.first_year,
                    end: last,
                }));
            }
        }

        Ok(())
    }

    /// Region names in report order
    pub fn region_names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn stores(&self) -> TableStores {
        TableStores {
            legacy_dir: self.legacy_dir.clone(),
            current_dir: self.current_dir.clone(),
            output_dir: self.output_dir.clone(),
        }
    }

    /// Read the configured baseline file, if any
    pub fn load_baseline(&self) -> Result<Option<Baseline>, TableError> {
        self.baseline
            .as_ref()
            .map(|s| Baseline::read_csv(&s.path, &s.key_column, &self.year_column, s.year))
            .transpose()
    }

    /// Reconciler for this configuration with default policies
    ///
    /// Reads the baseline file when one is configured.
    pub fn reconciler(&self) -> Result<SeriesReconciler, ConfigError> {
        let reconciler = SeriesReconciler::new(
            self.filename_map.clone(),
            self.renames.clone(),
            self.window,
            self.stores(),
        )?
        .with_year_column(self.year_column.clone());

        Ok(match self.load_baseline()? {
            Some(baseline) => reconciler.with_baseline(baseline),
            None => reconciler,
        })
    }

    pub fn workbook_path(&self) -> Result<&Path, ConfigError> {
        self.workbook_path
            .as_deref()
            .ok_or(ConfigError::MissingSetting("workbook_path"))
    }

    pub fn aggregate_settings(&self) -> Result<&AggregateSettings, ConfigError> {
        self.aggregate
            .as_ref()
            .ok_or(ConfigError::MissingSetting("aggregate"))
    }

    pub fn aggregate_last_year(&self) -> Option<i32> {
        self.aggregate
            .as_ref()
            .map(|s| s.last_year.unwrap_or(self.report_year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
report_year = 2023
legacy_dir = "legacy"
current_dir = "../report_{year}/data"
output_dir = "../report_{year}/merged"
workbook_path = "../report_{year}/tables_{year}.xlsx"

[window]
start = 1990
end = 2017

[[regions]]
name = "Glomma"

[[regions]]
name = "Sverige – Strømtangen fyr"
catchments = { from = 1, to = 3 }

[filename_map]
"Glomma_p.csv" = "Glomma_p.csv"
"Glomma_n.csv" = "Glomma_n.csv"
"Sverige – Strømtangen fyr_p.csv" = "Sverige_Stromtangen fyr_p.csv"
"Sverige – Strømtangen fyr_n.csv" = "Sverige_Stromtangen fyr_n.csv"
"#;

    fn minimal() -> ReportConfig {
        ReportConfig::from_toml_str(MINIMAL, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = minimal();
        assert_eq!(config.year_column, "År");
        assert_eq!(config.parameters, Parameter::ALL.to_vec());
        assert_eq!(config.renames, ColumnRenames::default());
        assert!(config.aggregate.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_paths() {
        let mut config = minimal();
        config.expand_paths();
        assert_eq!(config.current_dir, PathBuf::from("../report_2023/data"));
        assert_eq!(config.legacy_dir, PathBuf::from("legacy"));
        assert_eq!(
            config.workbook_path().unwrap(),
            Path::new("../report_2023/tables_2023.xlsx")
        );
    }

    #[test]
    fn test_overrides_before_expansion() {
        let mut config = minimal();
        config.apply_overrides(&ConfigOverrides {
            report_year: Some(2024),
            window_end: Some(2018),
            ..Default::default()
        });
        config.expand_paths();
        assert_eq!(config.window, YearWindow::new(1990, 2018).unwrap());
        assert_eq!(config.output_dir, PathBuf::from("../report_2024/merged"));
    }

    #[test]
    fn test_unmapped_pair_rejected() {
        let text = MINIMAL.replace("\"Glomma_n.csv\" = \"Glomma_n.csv\"\n", "");
        let config = ReportConfig::from_toml_str(&text, Path::new("test.toml")).unwrap();
        match config.validate() {
            Err(ConfigError::UnmappedPair {
                region,
                parameter,
                filename,
            }) => {
                assert_eq!(region, "Glomma");
                assert_eq!(parameter, Parameter::Nitrogen);
                assert_eq!(filename, "Glomma_n.csv");
            }
            other => panic!("Expected UnmappedPair, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_mapping_entry_rejected() {
        let mut config = minimal();
        config
            .filename_map
            .insert("Agder_p.csv", "Agder_p.csv")
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnexpectedMappingEntry(key)) if key == "Agder_p.csv"
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = minimal();
        config.window.start = 2020;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Reference(ReferenceDataError::InvertedWindow { .. }))
        ));
    }

    #[test]
    fn test_duplicate_mapping_key_is_parse_error() {
        let text = format!("{MINIMAL}\"Glomma_p.csv\" = \"Other_p.csv\"\n");
        assert!(matches!(
            ReportConfig::from_toml_str(&text, Path::new("test.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let text = format!("legacy_folder = \"x\"\n{MINIMAL}");
        assert!(ReportConfig::from_toml_str(&text, Path::new("test.toml")).is_err());
    }

    #[test]
    fn test_baseline_defaults_and_expansion() {
        let text = format!("{MINIMAL}\n[baseline]\npath = \"../report_{{year}}/data_1985.csv\"\n");
        let mut config = ReportConfig::from_toml_str(&text, Path::new("test.toml")).unwrap();
        config.expand_paths();

        let baseline = config.baseline.as_ref().unwrap();
        assert_eq!(baseline.year, 1985);
        assert_eq!(baseline.key_column, "section_name");
        assert_eq!(baseline.path, PathBuf::from("../report_2023/data_1985.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_baseline_inside_window_rejected() {
        let text = format!("{MINIMAL}\n[baseline]\npath = \"b.csv\"\nyear = 1995\n");
        let config = ReportConfig::from_toml_str(&text, Path::new("test.toml")).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BaselineYear { year: 1995, .. })
        ));
    }

    #[test]
    fn test_reconciler_reports_missing_baseline_file() {
        let text = format!("{MINIMAL}\n[baseline]\npath = \"/nonexistent/data_1985.csv\"\n");
        let config = ReportConfig::from_toml_str(&text, Path::new("test.toml")).unwrap();
        assert!(matches!(
            config.reconciler(),
            Err(ConfigError::Table(TableError::MissingInput(_)))
        ));
    }
}
