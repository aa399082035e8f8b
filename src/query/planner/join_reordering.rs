// Join Reordering Optimizer
//
// This module finds the cheapest left-deep ordering of a chain of inner joins
// and splices it back into the plan in place of the original chain.

use itertools::Itertools;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::TableStatistics;
use crate::query::planner::cost_model::{CostConfig, CostModel};
use crate::query::planner::error::{PlanError, PlanResult};
use crate::query::planner::logical::{RaNode, RaOperator};
use crate::query::planner::predicate::referenced_aliases;

/// Bounds on the join-order search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinReorderConfig {
    /// Largest number of join edges searched exhaustively; longer chains
    /// fall back to the greedy search
    pub max_exhaustive_edges: usize,
}

impl Default for JoinReorderConfig {
    fn default() -> Self {
        Self {
            max_exhaustive_edges: 7,
        }
    }
}

/// How the join order was searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchStrategy {
    /// Every permutation of the join edges
    Exhaustive,
    /// Cheapest connected edge first
    Greedy,
}

/// Step from a node to one of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSlot {
    /// The single input of a selection or projection
    Input,
    /// The left input of a join
    Left,
}

/// One join of the chain, described by the aliases its condition connects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinEdge {
    pub left_alias: String,
    pub right_alias: String,
    pub condition: String,
}

/// The join chain as a graph: leaves are operands, edges are join conditions
#[derive(Debug, Clone)]
pub struct JoinGraph {
    edges: Vec<JoinEdge>,
    /// Leaf indices each edge connects, in (left_alias, right_alias) order
    endpoints: Vec<(usize, usize)>,
    leaf_costs: Vec<f64>,
}

/// Outcome of the join-order search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinOrder {
    /// Edges in the order they are joined, bottom-up
    pub edges: Vec<JoinEdge>,
    /// Summed cost of the joins in this order
    pub cost: f64,
    pub strategy: SearchStrategy,
    /// Edge indices into the chain, in join order
    #[serde(skip)]
    order: Vec<usize>,
}

/// Join Reordering Optimizer component
#[derive(Debug, Clone, Default)]
pub struct JoinReorderingOptimizer {
    cost_model: CostModel,
    config: JoinReorderConfig,
}

/// Find the first join below the root that starts a chain.
///
/// Selections and projections are descended through, as is the left input of
/// a cross join. Returns the path from the root to the chain's top join.
pub fn locate_chain(plan: &RaNode) -> Option<Vec<ChildSlot>> {
    let mut path = Vec::new();
    let mut node = plan;
    loop {
        match &node.operator {
            RaOperator::Selection { input, .. } | RaOperator::Projection { input, .. } => {
                path.push(ChildSlot::Input);
                node = input.as_ref();
            }
            RaOperator::Join { left, .. } if node.is_cross_join() => {
                path.push(ChildSlot::Left);
                node = left.as_ref();
            }
            RaOperator::Join { .. } => return Some(path),
            RaOperator::Relation { .. } | RaOperator::Subquery { .. } => return None,
        }
    }
}

/// Follow a path from the root
pub fn node_at<'a>(plan: &'a RaNode, path: &[ChildSlot]) -> Option<&'a RaNode> {
    path.iter().try_fold(plan, |node, step| match (&node.operator, step) {
        (RaOperator::Selection { input, .. }, ChildSlot::Input)
        | (RaOperator::Projection { input, .. }, ChildSlot::Input) => Some(input.as_ref()),
        (RaOperator::Join { left, .. }, ChildSlot::Left) => Some(left.as_ref()),
        _ => None,
    })
}

/// Rebuild the plan along `path`, replacing the node at its end with the
/// output of `rebuild`. Everything off the path is moved over untouched.
fn splice<F>(node: RaNode, path: &[ChildSlot], rebuild: F) -> PlanResult<RaNode>
where
    F: FnOnce(RaNode) -> PlanResult<RaNode>,
{
    let Some((step, rest)) = path.split_first() else {
        return rebuild(node);
    };
    let RaNode { operator, cost } = node;
    let operator = match (operator, step) {
        (RaOperator::Selection { condition, input }, ChildSlot::Input) => RaOperator::Selection {
            condition,
            input: Box::new(splice(*input, rest, rebuild)?),
        },
        (RaOperator::Projection { columns, input }, ChildSlot::Input) => RaOperator::Projection {
            columns,
            input: Box::new(splice(*input, rest, rebuild)?),
        },
        (
            RaOperator::Join {
                left,
                right,
                condition,
            },
            ChildSlot::Left,
        ) => RaOperator::Join {
            left: Box::new(splice(*left, rest, rebuild)?),
            right,
            condition,
        },
        (_, step) => {
            return Err(PlanError::OptimizationError(format!(
                "plan shape does not match join chain path at {:?} step",
                step
            )));
        }
    };
    Ok(RaNode { operator, cost })
}

fn is_chain_join(node: &RaNode) -> bool {
    matches!(node.operator, RaOperator::Join { .. }) && !node.is_cross_join()
}

/// Collect the chain's join conditions and leaf operands bottom-up
fn collect_chain<'a>(node: &'a RaNode, conditions: &mut Vec<&'a str>, leaves: &mut Vec<&'a RaNode>) {
    if let RaOperator::Join {
        left,
        right,
        condition,
    } = &node.operator
    {
        if is_chain_join(left) {
            collect_chain(left, conditions, leaves);
        } else {
            leaves.push(left);
        }
        conditions.push(condition);
        leaves.push(right);
    }
}

/// Owned counterpart of `collect_chain`, yielding leaves in the same order
fn take_chain_leaves(node: RaNode, leaves: &mut Vec<RaNode>) {
    match node.operator {
        RaOperator::Join { left, right, .. } => {
            if is_chain_join(&left) {
                take_chain_leaves(*left, leaves);
            } else {
                leaves.push(*left);
            }
            leaves.push(*right);
        }
        operator => leaves.push(RaNode {
            operator,
            cost: node.cost,
        }),
    }
}

/// Index of the leaf a condition alias refers to.
///
/// A leaf whose own alias matches wins; otherwise the alias must appear in
/// exactly one leaf's alias set.
fn resolve_leaf(alias: &str, leaves: &[&RaNode], condition: &str) -> PlanResult<usize> {
    if let Some(idx) = leaves.iter().position(|leaf| leaf.alias() == Some(alias)) {
        return Ok(idx);
    }
    let matches: Vec<usize> = leaves
        .iter()
        .enumerate()
        .filter(|(_, leaf)| leaf.aliases().contains(alias))
        .map(|(idx, _)| idx)
        .collect();
    match matches.as_slice() {
        [idx] => Ok(*idx),
        [] => Err(PlanError::OptimizationError(format!(
            "join condition `{}` references `{}`, which is not an operand of the join chain",
            condition, alias
        ))),
        _ => Err(PlanError::OptimizationError(format!(
            "join condition `{}` references `{}`, which is ambiguous in the join chain",
            condition, alias
        ))),
    }
}

impl JoinGraph {
    /// Build the join graph of the chain whose top join is `root`.
    ///
    /// Leaves must carry cost annotations.
    pub fn from_chain(root: &RaNode) -> PlanResult<Self> {
        let mut conditions = Vec::new();
        let mut leaves = Vec::new();
        collect_chain(root, &mut conditions, &mut leaves);

        let mut edges = Vec::with_capacity(conditions.len());
        let mut endpoints = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let aliases = referenced_aliases(condition);
            let [left_alias, right_alias, ..] = aliases.as_slice() else {
                return Err(PlanError::OptimizationError(format!(
                    "join condition `{}` does not reference two relations",
                    condition
                )));
            };
            let left = resolve_leaf(left_alias, &leaves, condition)?;
            let right = resolve_leaf(right_alias, &leaves, condition)?;
            if left == right {
                return Err(PlanError::OptimizationError(format!(
                    "join condition `{}` references a single operand",
                    condition
                )));
            }
            edges.push(JoinEdge {
                left_alias: left_alias.clone(),
                right_alias: right_alias.clone(),
                condition: condition.to_string(),
            });
            endpoints.push((left, right));
        }

        let leaf_costs = leaves
            .iter()
            .map(|leaf| {
                leaf.cost().ok_or_else(|| {
                    PlanError::OptimizationError(format!(
                        "join operand `{}` has no cost estimate",
                        leaf.label().text
                    ))
                })
            })
            .collect::<PlanResult<Vec<f64>>>()?;

        Ok(JoinGraph {
            edges,
            endpoints,
            leaf_costs,
        })
    }

    pub fn edges(&self) -> &[JoinEdge] {
        &self.edges
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_costs.len()
    }

    /// Simulate a left-deep build following `order` (edge indices).
    ///
    /// Every edge after the first must attach exactly one new leaf to the
    /// leaves joined so far, and the order must reach every leaf. Returns the
    /// summed join cost, or `None` for an invalid order.
    pub fn order_cost(&self, order: &[usize], config: &CostConfig) -> Option<f64> {
        let (&first, rest) = order.split_first()?;
        let mut visited = vec![false; self.leaf_count()];

        let (left, right) = self.endpoints[first];
        let mut running = config.join_cost(self.leaf_costs[left], self.leaf_costs[right]);
        let mut total = running;
        visited[left] = true;
        visited[right] = true;

        for &edge in rest {
            let new_leaf = self.attached_leaf(edge, &visited)?;
            visited[new_leaf] = true;
            running = config.join_cost(running, self.leaf_costs[new_leaf]);
            total += running;
        }

        visited.iter().all(|v| *v).then_some(total)
    }

    /// The unvisited endpoint of an edge that touches the visited set
    fn attached_leaf(&self, edge: usize, visited: &[bool]) -> Option<usize> {
        let (a, b) = self.endpoints[edge];
        match (visited[a], visited[b]) {
            (true, false) => Some(b),
            (false, true) => Some(a),
            // Two unvisited leaves would need a cross product, two visited
            // leaves would join an operand twice
            _ => None,
        }
    }

    /// Build a left-deep join tree over `leaves` following `order`
    fn materialize(&self, leaves: Vec<RaNode>, order: &[usize]) -> PlanResult<RaNode> {
        let invalid = || PlanError::OptimizationError("join order does not cover the join chain".to_string());
        if leaves.len() != self.leaf_count() {
            return Err(invalid());
        }
        let mut slots: Vec<Option<RaNode>> = leaves.into_iter().map(Some).collect();
        let mut visited = vec![false; slots.len()];

        let (&first, rest) = order.split_first().ok_or_else(invalid)?;
        let (left, right) = self.endpoints[first];
        visited[left] = true;
        visited[right] = true;
        let mut tree = RaNode::join(
            slots[left].take().ok_or_else(invalid)?,
            slots[right].take().ok_or_else(invalid)?,
            &self.edges[first].condition,
        );

        for &edge in rest {
            let new_leaf = self.attached_leaf(edge, &visited).ok_or_else(invalid)?;
            visited[new_leaf] = true;
            let operand = slots[new_leaf].take().ok_or_else(invalid)?;
            tree = RaNode::join(tree, operand, &self.edges[edge].condition);
        }
        Ok(tree)
    }
}

impl JoinOrder {
    /// Edge indices into the chain, in join order
    pub fn edge_order(&self) -> &[usize] {
        &self.order
    }
}

impl JoinReorderingOptimizer {
    /// Create a new join reordering optimizer
    pub fn new(cost_config: CostConfig, config: JoinReorderConfig) -> Self {
        JoinReorderingOptimizer {
            cost_model: CostModel::new(cost_config),
            config,
        }
    }

    pub fn config(&self) -> &JoinReorderConfig {
        &self.config
    }

    /// Replace the first join chain of the plan with its cheapest ordering.
    ///
    /// The plan is cost-annotated first and re-annotated after the splice.
    /// Chains with fewer than two joins are returned unchanged.
    pub fn optimize(&self, plan: RaNode, stats: &TableStatistics) -> PlanResult<RaNode> {
        let mut plan = plan;
        self.cost_model.estimate(&mut plan, stats);

        let Some((path, graph, order)) = self.search_chain(&plan)? else {
            return Ok(plan);
        };

        let mut optimized = splice(plan, &path, |chain| {
            let mut leaves = Vec::with_capacity(graph.leaf_count());
            take_chain_leaves(chain, &mut leaves);
            graph.materialize(leaves, order.edge_order())
        })?;
        self.cost_model.estimate(&mut optimized, stats);
        Ok(optimized)
    }

    /// Search the cheapest join order for the plan's first join chain.
    ///
    /// The plan must already be cost-annotated. Returns `None` when there is
    /// no chain or it has fewer than two joins.
    pub fn plan_join_order(&self, plan: &RaNode) -> PlanResult<Option<JoinOrder>> {
        Ok(self.search_chain(plan)?.map(|(_, _, order)| order))
    }

    fn search_chain(&self, plan: &RaNode) -> PlanResult<Option<(Vec<ChildSlot>, JoinGraph, JoinOrder)>> {
        let Some(path) = locate_chain(plan) else {
            debug!("No inner join chain found, plan left unchanged");
            return Ok(None);
        };
        let Some(chain_root) = node_at(plan, &path) else {
            return Ok(None);
        };
        // Nothing to reorder, so the conditions never need to resolve
        let mut conditions = Vec::new();
        let mut leaves = Vec::new();
        collect_chain(chain_root, &mut conditions, &mut leaves);
        if conditions.len() < 2 {
            debug!("Join chain has a single join, plan left unchanged");
            return Ok(None);
        }

        let graph = JoinGraph::from_chain(chain_root)?;
        let edge_count = graph.edges().len();
        debug!(
            "Found join chain with {} edges over {} operands",
            edge_count,
            graph.leaf_count()
        );

        let strategy = if edge_count <= self.config.max_exhaustive_edges {
            SearchStrategy::Exhaustive
        } else {
            warn!(
                "Join chain has {} edges, above the exhaustive limit of {}; using greedy search",
                edge_count, self.config.max_exhaustive_edges
            );
            SearchStrategy::Greedy
        };

        let best = match strategy {
            SearchStrategy::Exhaustive => self.search_exhaustive(&graph),
            SearchStrategy::Greedy => self.search_greedy(&graph),
        };
        let Some((order, cost)) = best else {
            return Err(PlanError::OptimizationError(format!(
                "no connected join order exists for {} join edges",
                edge_count
            )));
        };

        let edges: Vec<JoinEdge> = order.iter().map(|&idx| graph.edges()[idx].clone()).collect();
        info!(
            "Chose join order [{}] with cost {:.2e}",
            edges.iter().map(|e| e.condition.as_str()).join("; "),
            cost
        );
        let order = JoinOrder {
            edges,
            cost,
            strategy,
            order,
        };
        Ok(Some((path, graph, order)))
    }

    /// Try every permutation; the first of equally cheap orders wins
    fn search_exhaustive(&self, graph: &JoinGraph) -> Option<(Vec<usize>, f64)> {
        let config = self.cost_model.config();
        let edge_count = graph.edges().len();
        let mut best: Option<(Vec<usize>, f64)> = None;

        for order in (0..edge_count).permutations(edge_count) {
            let Some(cost) = graph.order_cost(&order, config) else {
                continue;
            };
            trace!("Join order {:?} costs {:.2e}", order, cost);
            if best.as_ref().is_none_or(|(_, best_cost)| cost < *best_cost) {
                best = Some((order, cost));
            }
        }
        best
    }

    /// Seed with the cheapest edge, then keep attaching the connected edge
    /// that keeps the running cost lowest
    fn search_greedy(&self, graph: &JoinGraph) -> Option<(Vec<usize>, f64)> {
        let config = self.cost_model.config();
        let edge_count = graph.edges().len();

        let seed = (0..edge_count).min_by(|&a, &b| {
            let cost = |edge: usize| {
                let (l, r) = graph.endpoints[edge];
                config.join_cost(graph.leaf_costs[l], graph.leaf_costs[r])
            };
            cost(a).total_cmp(&cost(b))
        })?;

        let mut order = vec![seed];
        let mut visited = vec![false; graph.leaf_count()];
        let (l, r) = graph.endpoints[seed];
        visited[l] = true;
        visited[r] = true;
        let mut running = config.join_cost(graph.leaf_costs[l], graph.leaf_costs[r]);

        while order.len() < edge_count {
            let (edge, new_leaf, next) = (0..edge_count)
                .filter(|edge| !order.contains(edge))
                .filter_map(|edge| {
                    let new_leaf = graph.attached_leaf(edge, &visited)?;
                    Some((edge, new_leaf, config.join_cost(running, graph.leaf_costs[new_leaf])))
                })
                .min_by(|a, b| a.2.total_cmp(&b.2))?;
            order.push(edge);
            visited[new_leaf] = true;
            running = next;
        }

        let cost = graph.order_cost(&order, config)?;
        Some((order, cost))
    }
}
