// Cost Model for Query Optimization
//
// This module annotates relational-algebra plans with heuristic cost
// estimates derived from table row counts.

use serde::{Deserialize, Serialize};

use crate::catalog::TableStatistics;
use crate::query::planner::logical::{NodeCost, RaNode, RaOperator};

/// Heuristic constants used by the cost model.
///
/// None of these model a real selectivity; they are placeholders until
/// distribution statistics are available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Fraction of input rows kept by a selection
    pub selection_selectivity: f64,
    /// Minimum cost of a selection
    pub selection_floor: f64,
    /// Fraction of the cross product kept by a join
    pub join_selectivity: f64,
    /// Minimum cost of a join
    pub join_floor: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            selection_selectivity: 0.1,
            selection_floor: 10.0,
            join_selectivity: 0.01,
            join_floor: 50.0,
        }
    }
}

impl CostConfig {
    /// Cost of a selection over an input of the given cost
    pub fn selection_cost(&self, input_cost: f64) -> f64 {
        (input_cost * self.selection_selectivity).max(self.selection_floor)
    }

    /// Cost of joining two inputs of the given costs
    pub fn join_cost(&self, left_cost: f64, right_cost: f64) -> f64 {
        (left_cost * right_cost * self.join_selectivity).max(self.join_floor)
    }
}

/// Bottom-up cost estimator for relational-algebra plans
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    config: CostConfig,
}

impl CostModel {
    /// Create a new cost model
    pub fn new(config: CostConfig) -> Self {
        CostModel { config }
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    /// Annotate every node of the plan with its cost and cumulative cost.
    ///
    /// Previous annotations are overwritten, so re-running on an unchanged
    /// plan is idempotent. Returns the root's node-local cost.
    pub fn estimate(&self, plan: &mut RaNode, stats: &TableStatistics) -> f64 {
        self.annotate(plan, stats).cost
    }

    fn annotate(&self, plan: &mut RaNode, stats: &TableStatistics) -> NodeCost {
        let annotation = match &mut plan.operator {
            RaOperator::Relation { table_name, .. } => {
                let rows = stats.row_count(table_name) as f64;
                NodeCost {
                    cost: rows,
                    cumulative_cost: rows,
                }
            }
            RaOperator::Selection { input, .. } => {
                let child = self.annotate(input, stats);
                let cost = self.config.selection_cost(child.cost);
                NodeCost {
                    cost,
                    cumulative_cost: cost + child.cumulative_cost,
                }
            }
            // Projection and subquery boundaries do not change the row count
            RaOperator::Projection { input, .. } | RaOperator::Subquery { input, .. } => {
                let child = self.annotate(input, stats);
                NodeCost {
                    cost: child.cost,
                    cumulative_cost: child.cost + child.cumulative_cost,
                }
            }
            RaOperator::Join { left, right, .. } => {
                let left = self.annotate(left, stats);
                let right = self.annotate(right, stats);
                let cost = self.config.join_cost(left.cost, right.cost);
                NodeCost {
                    cost,
                    cumulative_cost: cost + left.cumulative_cost + right.cumulative_cost,
                }
            }
        };
        plan.cost = Some(annotation);
        annotation
    }
}
