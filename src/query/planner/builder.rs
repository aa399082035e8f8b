// Plan Builder
//
// This module turns a clause-structured SELECT query into a relational-algebra
// plan: FROM and JOIN targets become leaves and joins, WHERE becomes a
// selection and the SELECT list becomes a projection.

use log::debug;

use crate::query::ast::{SelectQuery, TableTarget};
use crate::query::planner::error::{PlanError, PlanResult};
use crate::query::planner::logical::{CROSS_JOIN_CONDITION, RaNode};

/// Build a relational-algebra plan from a SELECT query
pub fn build_ra_tree(query: &SelectQuery) -> PlanResult<RaNode> {
    let from = query
        .from
        .as_ref()
        .ok_or_else(|| PlanError::InputError("No FROM clause found in query".to_string()))?;

    // Start with the FROM target - this forms the base of our plan
    let mut plan = build_table(from)?;

    // Joins are left-deep, in declaration order
    for join in &query.joins {
        let right = build_table(&join.target)?;
        let condition = join.on.as_deref().unwrap_or(CROSS_JOIN_CONDITION);
        plan = RaNode::join(plan, right, condition);
    }

    if let Some(condition) = &query.where_clause {
        plan = RaNode::selection(condition, plan);
    }

    match &query.projection {
        Some(columns) if !columns.is_empty() => Ok(RaNode::projection(columns.clone(), plan)),
        _ => Ok(plan),
    }
}

/// Build the leaf for a FROM or JOIN target
fn build_table(target: &TableTarget) -> PlanResult<RaNode> {
    match target {
        TableTarget::Table { name, alias } => Ok(RaNode::relation(name, alias.as_deref())),
        TableTarget::Aliased { alias, target } => match target.as_ref() {
            // The explicit alias replaces whatever the inner target declared
            TableTarget::Table { name, .. } => Ok(RaNode::relation(name, Some(alias))),
            TableTarget::Subquery { query, .. } => build_subquery(query, Some(alias)),
            other => Err(unhandled_target(other)),
        },
        TableTarget::Subquery { query, alias } => build_subquery(query, alias.as_deref()),
        TableTarget::Other { .. } => Err(unhandled_target(target)),
    }
}

fn build_subquery(query: &SelectQuery, alias: Option<&str>) -> PlanResult<RaNode> {
    debug!("Building subquery {}", alias.unwrap_or("<unnamed>"));
    let inner = build_ra_tree(query)?;
    Ok(RaNode::subquery(alias, inner))
}

fn unhandled_target(target: &TableTarget) -> PlanError {
    PlanError::InputError(format!(
        "Unhandled node type in FROM clause: {}",
        target.describe()
    ))
}
