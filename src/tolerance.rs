//! Category name -> minimum distance (meters) lookup.
//!
//! There is deliberately no fallback value: a category missing from the table is
//! not configured for reduction and its trails are skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Minimum distance in meters per category name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToleranceTable {
    entries: HashMap<String, f64>,
}

impl ToleranceTable {
    pub fn new(entries: HashMap<String, f64>) -> Self {
        Self { entries }
    }

    /// Exact-name lookup.
    pub fn resolve(&self, category_name: &str) -> Option<f64> {
        self.entries.get(category_name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose value is not a finite, non-negative distance.
    pub fn invalid_entries(&self) -> Vec<&str> {
        let mut invalid: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, v)| !v.is_finite() || **v < 0.0)
            .map(|(k, _)| k.as_str())
            .collect();
        invalid.sort_unstable();
        invalid
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ToleranceTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Resolve a category name against a table.
pub fn resolve(category_name: &str, table: &ToleranceTable) -> Option<f64> {
    table.resolve(category_name)
}
