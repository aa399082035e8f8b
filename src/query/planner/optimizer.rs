// Query Optimizer Implementation
//
// This module chains the rewrite passes over a relational-algebra plan and
// decides whether the rewritten plan is worth keeping.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::catalog::TableStatistics;
use crate::query::planner::cost_model::{CostConfig, CostModel};
use crate::query::planner::error::PlanResult;
use crate::query::planner::filter_pushdown::FilterPushdownOptimizer;
use crate::query::planner::join_reordering::{JoinReorderConfig, JoinReorderingOptimizer};
use crate::query::planner::logical::RaNode;

/// Configuration for the optimization pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub cost: CostConfig,
    pub join_reorder: JoinReorderConfig,
    /// Run predicate pushdown
    pub enable_pushdown: bool,
    /// Run cost-based join reordering
    pub enable_join_reorder: bool,
    /// Relative cost difference below which two plans are considered equal
    pub comparison_tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cost: CostConfig::default(),
            join_reorder: JoinReorderConfig::default(),
            enable_pushdown: true,
            enable_join_reorder: true,
            comparison_tolerance: 0.001,
        }
    }
}

/// Outcome of comparing an optimized plan against the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComparison {
    /// The optimized plan is cheaper
    Cheaper,
    /// The optimized plan is more expensive
    MoreExpensive,
    /// Both plans cost the same within the tolerance
    Comparable,
}

impl fmt::Display for PlanComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanComparison::Cheaper => write!(f, "optimized plan is cheaper"),
            PlanComparison::MoreExpensive => write!(f, "optimized plan is more expensive"),
            PlanComparison::Comparable => write!(f, "plans have comparable cost"),
        }
    }
}

/// The main optimizer that applies the rewrite passes in order
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    cost_model: CostModel,
    pushdown: FilterPushdownOptimizer,
    join_reordering: JoinReorderingOptimizer,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl Optimizer {
    /// Create a new optimizer instance
    pub fn new(config: OptimizerConfig) -> Self {
        Optimizer {
            cost_model: CostModel::new(config.cost.clone()),
            pushdown: FilterPushdownOptimizer::new(),
            join_reordering: JoinReorderingOptimizer::new(
                config.cost.clone(),
                config.join_reorder.clone(),
            ),
            config,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Annotate the plan with costs and return its cumulative cost
    pub fn estimate(&self, plan: &mut RaNode, stats: &TableStatistics) -> f64 {
        self.cost_model.estimate(plan, stats);
        plan.cumulative_cost().unwrap_or_default()
    }

    /// Run pushdown and then join reordering, returning a cost-annotated plan
    pub fn optimize(&self, plan: RaNode, stats: &TableStatistics) -> PlanResult<RaNode> {
        let mut plan = plan;

        if self.config.enable_pushdown {
            debug!("Running predicate pushdown");
            plan = self.pushdown.optimize(plan);
        }
        if self.config.enable_join_reorder {
            debug!("Running join reordering");
            plan = self.join_reordering.optimize(plan, stats)?;
        }

        let cost = self.estimate(&mut plan, stats);
        info!("Optimized plan has cumulative cost {:.2e}", cost);
        Ok(plan)
    }

    /// Compare the cumulative cost of an original plan with its optimized form
    pub fn compare(&self, original_cost: f64, optimized_cost: f64) -> PlanComparison {
        let factor = 1.0 + self.config.comparison_tolerance;
        if original_cost > factor * optimized_cost {
            PlanComparison::Cheaper
        } else if original_cost * factor < optimized_cost {
            PlanComparison::MoreExpensive
        } else {
            PlanComparison::Comparable
        }
    }
}
