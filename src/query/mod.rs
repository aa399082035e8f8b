// Query Planning Module
//
// This module contains the query AST accepted by the planner and the
// planner itself.

pub mod ast;
pub mod planner;

// Export key public interfaces
pub use ast::{JoinClause, SelectQuery, TableTarget};
pub use planner::{Optimizer, RaNode, build_ra_tree};
