/// Static reference data driving the reconciliation
///
/// - `FilenameMapping`: current-scheme table file → legacy-scheme table file
/// - `ColumnRenames`: legacy column names → current column names
/// - `YearWindow`: inclusive range of years taken from the legacy tables
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceDataError {
    #[error("Duplicate mapping entry for current file '{0}'")]
    DuplicateEntry(String),

    #[error("Rename '{from}' -> '{to}' feeds into another rename")]
    ChainedRename { from: String, to: String },

    #[error("Year window start {start} is after end {end}")]
    InvertedWindow { start: i32, end: i32 },
}

/// One current → legacy file association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub current: String,
    pub legacy: String,
}

impl MappingEntry {
    pub fn is_identity(&self) -> bool {
        self.current == self.legacy
    }
}

/// Ordered mapping from current-scheme file names to legacy-scheme file names
///
/// Order is significant: entries are reconciled in the order given. Identity
/// entries (same name in both schemes) are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameMapping {
    entries: Vec<MappingEntry>,
}

impl FilenameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, C, L>(pairs: I) -> Result<Self, ReferenceDataError>
    where
        I: IntoIterator<Item = (C, L)>,
        C: Into<String>,
        L: Into<String>,
    {
        let mut mapping = Self::new();
        for (current, legacy) in pairs {
            mapping.insert(current, legacy)?;
        }
        Ok(mapping)
    }

    pub fn insert(
        &mut self,
        current: impl Into<String>,
        legacy: impl Into<String>,
    ) -> Result<(), ReferenceDataError> {
        let current = current.into();
        if self.legacy_for(&current).is_some() {
            return Err(ReferenceDataError::DuplicateEntry(current));
        }
        self.entries.push(MappingEntry {
            current,
            legacy: legacy.into(),
        });
        Ok(())
    }

    pub fn legacy_for(&self, current: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.current == current)
            .map(|e| e.legacy.as_str())
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for FilenameMapping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = FilenameMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of current file name = legacy file name")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut mapping = FilenameMapping::new();
                while let Some((current, legacy)) = access.next_entry::<String, String>()? {
                    mapping.insert(current, legacy).map_err(de::Error::custom)?;
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Substitutions for legacy column names
///
/// Names without an entry pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnRenames(BTreeMap<String, String>);

impl Default for ColumnRenames {
    fn default() -> Self {
        Self(BTreeMap::from([
            // Misspelt in the legacy tables
            ("Bakgrun".to_string(), "Bakgrunn".to_string()),
            ("Befolkning".to_string(), "Avløp".to_string()),
        ]))
    }
}

impl ColumnRenames {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn apply(&self, column: &str) -> String {
        self.0
            .get(column)
            .cloned()
            .unwrap_or_else(|| column.to_string())
    }

    /// Reject tables where a rename target is itself renamed, which would make
    /// applying the renames twice differ from applying them once
    pub fn validate(&self) -> Result<(), ReferenceDataError> {
        let sources: HashSet<&str> = self.0.keys().map(String::as_str).collect();
        for (from, to) in &self.0 {
            if from != to && sources.contains(to.as_str()) {
                return Err(ReferenceDataError::ChainedRename {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Inclusive range of years for which legacy data is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearWindow {
    pub start: i32,
    pub end: i32,
}

impl YearWindow {
    pub fn new(start: i32, end: i32) -> Result<Self, ReferenceDataError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), ReferenceDataError> {
        if self.start > self.end {
            return Err(ReferenceDataError::InvertedWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl fmt::Display for YearWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
