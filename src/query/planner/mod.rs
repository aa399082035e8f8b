// Query Planner Module
//
// This module is responsible for translating clause-structured queries into
// relational-algebra plans, estimating their cost and rewriting them into
// cheaper equivalents.

pub mod builder;
pub mod cost_model;
pub mod error;
pub mod filter_pushdown;
pub mod join_reordering;
pub mod logical;
pub mod optimizer;
pub mod predicate;

// Export key types
pub use self::builder::build_ra_tree;
pub use self::cost_model::{CostConfig, CostModel};
pub use self::error::{PlanError, PlanResult};
pub use self::filter_pushdown::FilterPushdownOptimizer;
pub use self::join_reordering::{
    ChildSlot, JoinEdge, JoinGraph, JoinOrder, JoinReorderConfig, JoinReorderingOptimizer,
    SearchStrategy,
};
pub use self::logical::{NodeCost, NodeKind, NodeLabel, RaNode, RaOperator};
pub use self::optimizer::{Optimizer, OptimizerConfig, PlanComparison};
