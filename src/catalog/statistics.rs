//! Table Statistics
//!
//! Row counts per base table, as handed over by a live catalog or a static snapshot.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading a statistics snapshot
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid statistics snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Mapping from lowercase table name to row count.
///
/// Tables that are not present estimate to zero rows; a missing entry is
/// never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, u64>", into = "HashMap<String, u64>")]
pub struct TableStatistics {
    row_counts: HashMap<String, u64>,
}

impl TableStatistics {
    /// Create an empty statistics mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the row count of a table, replacing any previous value
    pub fn insert(&mut self, table_name: &str, rows: u64) {
        self.row_counts.insert(table_name.to_lowercase(), rows);
    }

    /// Row count for a table, or 0 when the table is unknown
    pub fn row_count(&self, table_name: &str) -> u64 {
        self.row_counts
            .get(&table_name.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    /// Whether a row count was recorded for the table
    pub fn contains(&self, table_name: &str) -> bool {
        self.row_counts.contains_key(&table_name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.row_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.row_counts.iter().map(|(name, rows)| (name.as_str(), *rows))
    }

    /// Parse a JSON object of `{"table": rows}` pairs
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a statistics snapshot from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

impl From<HashMap<String, u64>> for TableStatistics {
    fn from(row_counts: HashMap<String, u64>) -> Self {
        row_counts.into_iter().collect()
    }
}

impl From<TableStatistics> for HashMap<String, u64> {
    fn from(stats: TableStatistics) -> Self {
        stats.row_counts
    }
}

impl<S: AsRef<str>> FromIterator<(S, u64)> for TableStatistics {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut stats = TableStatistics::new();
        for (name, rows) in iter {
            stats.insert(name.as_ref(), rows);
        }
        stats
    }
}
