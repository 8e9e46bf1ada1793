/// Mapping from catchment model output columns to report load categories
use crate::naming::Parameter;

/// Load category columns of a report table, in report order (after the year column)
pub const REPORT_COLUMNS: [&str; 7] = [
    "Akvakultur",
    "Jordbruk",
    "Avløp",
    "Industri",
    "Bakgrunn",
    "Totalt",
    "Menneskeskapt",
];

/// A report category and the model columns summed into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    pub category: &'static str,
    pub columns: Vec<String>,
}

fn accum(source: &str, parameter: Parameter) -> String {
    format!("accum_{source}_tot-{}_tonnes", parameter.suffix())
}

/// Category groups for one parameter, in `REPORT_COLUMNS` order
pub fn source_groups(parameter: Parameter) -> Vec<SourceGroup> {
    vec![
        group("Akvakultur", &["aqu"], parameter),
        group("Jordbruk", &["agri_diff", "agri_pt"], parameter),
        group("Avløp", &["ren", "spr"], parameter),
        group("Industri", &["ind"], parameter),
        // Urban runoff is reported as part of background
        group("Bakgrunn", &["nat_diff", "urban"], parameter),
        group("Totalt", &["all_sources"], parameter),
        group("Menneskeskapt", &["anth_diff", "all_point"], parameter),
    ]
}

fn group(category: &'static str, sources: &[&str], parameter: Parameter) -> SourceGroup {
    SourceGroup {
        category,
        columns: sources.iter().map(|s| accum(s, parameter)).collect(),
    }
}

/// Every model column needed for the given parameters
pub fn required_columns(parameters: &[Parameter]) -> Vec<String> {
    parameters
        .iter()
        .flat_map(|&p| source_groups(p))
        .flat_map(|g| g.columns)
        .collect()
}
