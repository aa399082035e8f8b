// Relational-algebra query planner

pub mod catalog;
pub mod query;

// Re-export key items for convenient access
pub use catalog::{CatalogError, TableStatistics};
pub use query::ast::{JoinClause, SelectQuery, TableTarget};
pub use query::planner::{
    CostConfig, CostModel, FilterPushdownOptimizer, JoinOrder, JoinReorderConfig,
    JoinReorderingOptimizer, Optimizer, OptimizerConfig, PlanComparison, PlanError, PlanResult,
    RaNode, RaOperator, SearchStrategy, build_ra_tree,
};
