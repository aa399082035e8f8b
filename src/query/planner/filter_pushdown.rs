// Filter Pushdown Optimizer
//
// This module moves selections toward the leaves of a relational-algebra plan
// so rows are filtered before they reach expensive joins.

use log::debug;

use crate::query::planner::logical::{RaNode, RaOperator};
use crate::query::planner::predicate::{
    extract_columns, resolves_within, split_conjuncts, strip_where_marker,
};

/// Which side of a join a conjunct was pushed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinSide {
    Left,
    Right,
}

/// Filter Pushdown Optimizer component
#[derive(Debug, Clone, Default)]
pub struct FilterPushdownOptimizer;

impl FilterPushdownOptimizer {
    /// Create a new filter pushdown optimizer
    pub fn new() -> Self {
        FilterPushdownOptimizer
    }

    /// Return a logically equivalent plan with every selection pushed as far
    /// toward the leaves as its column references allow.
    ///
    /// Compound conditions are split on top-level `AND` and each conjunct is
    /// placed independently, so the result carries one selection per conjunct.
    pub fn optimize(&self, plan: RaNode) -> RaNode {
        let RaNode { operator, cost } = plan;
        match operator {
            RaOperator::Selection { condition, input } => {
                // Optimize the input first, then place this filter on top of it
                let optimized_input = self.optimize(*input);
                self.push_filter_into_node(optimized_input, strip_where_marker(&condition))
            }
            RaOperator::Projection { columns, input } => {
                RaNode::projection(columns, self.optimize(*input))
            }
            RaOperator::Join {
                left,
                right,
                condition,
            } => RaNode::join(self.optimize(*left), self.optimize(*right), &condition),
            RaOperator::Subquery { alias, input } => {
                RaNode::subquery(alias.as_deref(), self.optimize(*input))
            }
            // Base case: leaves are returned unchanged
            operator @ RaOperator::Relation { .. } => RaNode { operator, cost },
        }
    }

    /// Place a filter over an already optimized node, splitting it into
    /// conjuncts first
    fn push_filter_into_node(&self, node: RaNode, condition: &str) -> RaNode {
        let conjuncts = split_conjuncts(condition);
        if conjuncts.len() > 1 {
            return conjuncts
                .iter()
                .fold(node, |acc, conjunct| self.push_conjunct(acc, conjunct));
        }
        self.push_conjunct(node, condition)
    }

    /// Place a single conjunct over an already optimized node
    fn push_conjunct(&self, node: RaNode, conjunct: &str) -> RaNode {
        let RaNode { operator, cost } = node;
        match operator {
            RaOperator::Join {
                left,
                right,
                condition,
            } => {
                let columns = extract_columns(conjunct);
                let side = if resolves_within(&columns, &left.aliases()) {
                    Some(JoinSide::Left)
                } else if resolves_within(&columns, &right.aliases()) {
                    Some(JoinSide::Right)
                } else {
                    None
                };

                match side {
                    Some(JoinSide::Left) => {
                        debug!("Pushing `{}` into left input of join `{}`", conjunct, condition);
                        let new_left = self.push_filter_into_node(*left, conjunct);
                        RaNode::join(new_left, *right, &condition)
                    }
                    Some(JoinSide::Right) => {
                        debug!("Pushing `{}` into right input of join `{}`", conjunct, condition);
                        let new_right = self.push_filter_into_node(*right, conjunct);
                        RaNode::join(*left, new_right, &condition)
                    }
                    None => {
                        debug!("Keeping `{}` above join `{}`", conjunct, condition);
                        let join = RaNode {
                            operator: RaOperator::Join {
                                left,
                                right,
                                condition,
                            },
                            cost,
                        };
                        RaNode::selection(conjunct, join)
                    }
                }
            }
            // Selections are only moved across joins
            operator => RaNode::selection(conjunct, RaNode { operator, cost }),
        }
    }
}
