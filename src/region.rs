/// Reporting regions and the main catchments they cover
use serde::{Deserialize, Serialize};

/// Highest main catchment draining to the Norwegian coast (exclusive bound)
pub const COASTAL_CATCHMENT_END: u32 = 248;

/// Catchment 315 drains into Skagerrak via Sweden and is reported with the coast
pub const SKAGERRAK_CATCHMENT: u32 = 315;

/// Format a main catchment number as a regine id, e.g. `7` → `"007."`
pub fn regine_id(catchment: u32) -> String {
    format!("{catchment:03}.")
}

/// All main catchments flowing to the coast
pub fn main_catchment_ids() -> Vec<String> {
    (1..COASTAL_CATCHMENT_END)
        .chain(std::iter::once(SKAGERRAK_CATCHMENT))
        .map(regine_id)
        .collect()
}

/// Main catchments belonging to a region
///
/// `from..to` is half-open; `extra` lists single catchments outside the range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchmentSpan {
    pub from: u32,
    pub to: u32,
    #[serde(default)]
    pub extra: Vec<u32>,
}

impl CatchmentSpan {
    pub fn ids(&self) -> Vec<String> {
        (self.from..self.to)
            .chain(self.extra.iter().copied())
            .map(regine_id)
            .collect()
    }
}

/// A reporting region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// Only needed when building tables from catchment results
    #[serde(default)]
    pub catchments: Option<CatchmentSpan>,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catchments: None,
        }
    }

    pub fn with_catchments(mut self, from: u32, to: u32, extra: &[u32]) -> Self {
        self.catchments = Some(CatchmentSpan {
            from,
            to,
            extra: extra.to_vec(),
        });
        self
    }
}
