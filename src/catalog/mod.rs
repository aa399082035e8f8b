//! Catalog Module
//!
//! This module holds the table statistics the cost model reads.

pub mod statistics;

// Re-export key types
pub use self::statistics::{CatalogError, TableStatistics};
