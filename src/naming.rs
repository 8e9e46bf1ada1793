/// File and sheet naming conventions for the per-region load tables
///
/// Tables are stored as `{region}_{p|n}.csv` and exported as worksheets named
/// `{region} ({P|N})`. Region names are used byte-for-byte: they contain en
/// dashes and Norwegian letters, and no normalisation is applied.
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Substance tracked by a load table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    #[serde(rename = "p")]
    Phosphorus,
    #[serde(rename = "n")]
    Nitrogen,
}

impl Parameter {
    /// Report order: phosphorus first, then nitrogen.
    pub const ALL: [Parameter; 2] = [Parameter::Phosphorus, Parameter::Nitrogen];

    /// File name suffix (`p` or `n`)
    pub fn suffix(self) -> &'static str {
        match self {
            Parameter::Phosphorus => "p",
            Parameter::Nitrogen => "n",
        }
    }

    /// Label used in worksheet names (`P` or `N`)
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Phosphorus => "P",
            Parameter::Nitrogen => "N",
        }
    }

    /// Word used for the parameter in report chapter headings
    pub fn heading_word(self) -> &'static str {
        match self {
            Parameter::Phosphorus => "fosfor",
            Parameter::Nitrogen => "nitrogen",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "p" => Some(Parameter::Phosphorus),
            "n" => Some(Parameter::Nitrogen),
            _ => None,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Phosphorus => write!(f, "phosphorus"),
            Parameter::Nitrogen => write!(f, "nitrogen"),
        }
    }
}

/// Build the table file name for a region and parameter
///
/// # Examples
///
/// ```
/// use teotil_report::naming::{table_filename, Parameter};
///
/// assert_eq!(table_filename("Glomma", Parameter::Phosphorus), "Glomma_p.csv");
/// assert_eq!(
///     table_filename("Lindesnes – Stad", Parameter::Nitrogen),
///     "Lindesnes – Stad_n.csv"
/// );
/// ```
pub fn table_filename(region: &str, parameter: Parameter) -> String {
    format!("{region}_{}.csv", parameter.suffix())
}

/// Build the worksheet name for a region and parameter
///
/// ```
/// use teotil_report::naming::{sheet_name, Parameter};
///
/// assert_eq!(sheet_name("Agder", Parameter::Nitrogen), "Agder (N)");
/// ```
pub fn sheet_name(region: &str, parameter: Parameter) -> String {
    format!("{region} ({})", parameter.label())
}

/// Split a table file name into region and parameter
///
/// Returns `None` for names that do not end in `_p.csv` or `_n.csv`.
pub fn parse_table_filename(filename: &str) -> Option<(&str, Parameter)> {
    let stem = filename.strip_suffix(".csv")?;
    let (region, suffix) = stem.rsplit_once('_')?;
    if region.is_empty() {
        return None;
    }
    Parameter::from_suffix(suffix).map(|p| (region, p))
}

/// Human-readable label for a table file, e.g. `Glomma (P)`
///
/// Falls back to the file name itself when it does not follow the convention.
pub fn pair_label(filename: &str) -> String {
    match parse_table_filename(filename) {
        Some((region, parameter)) => sheet_name(region, parameter),
        None => filename.to_string(),
    }
}

fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(r"^(?P<region>[^:]+):\s*(?P<word>\S+)\s*$").expect("heading regex is valid")
    })
}

/// Derive the table file name from a report chapter heading
///
/// Headings have the form `"{region}: fosfor"` or `"{region}: nitrogen"`.
///
/// ```
/// use teotil_report::naming::filename_from_heading;
///
/// assert_eq!(filename_from_heading("Glomma: fosfor").unwrap(), "Glomma_p.csv");
/// assert_eq!(
///     filename_from_heading("Møre og Romsdal: nitrogen").unwrap(),
///     "Møre og Romsdal_n.csv"
/// );
/// assert!(filename_from_heading("Glomma").is_err());
/// ```
pub fn filename_from_heading(heading: &str) -> Result<String, &'static str> {
    let caps = heading_regex()
        .captures(heading.trim())
        .ok_or("Heading must have the form '<region>: <fosfor|nitrogen>'")?;

    let region = caps["region"].trim();
    let word = caps["word"].to_lowercase();

    let parameter = Parameter::ALL
        .into_iter()
        .find(|p| p.heading_word() == word)
        .ok_or("Heading parameter must be 'fosfor' or 'nitrogen'")?;

    Ok(table_filename(region, parameter))
}

/// Report chapter heading for a region and parameter
///
/// ```
/// use teotil_report::naming::{filename_from_heading, heading, Parameter};
///
/// assert_eq!(heading("Glomma", Parameter::Phosphorus), "Glomma: fosfor");
/// assert_eq!(
///     filename_from_heading(&heading("Møre og Romsdal", Parameter::Nitrogen)).unwrap(),
///     "Møre og Romsdal_n.csv"
/// );
/// ```
pub fn heading(region: &str, parameter: Parameter) -> String {
    format!("{region}: {}", parameter.heading_word())
}
