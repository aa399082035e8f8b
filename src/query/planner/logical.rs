// Relational Algebra Plan Implementation
//
// This module defines the relational-algebra tree that every planner pass
// builds, annotates and rewrites.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Join condition used for joins without an ON clause
pub const CROSS_JOIN_CONDITION: &str = "TRUE";

/// Cost annotation attached to a node by the cost model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeCost {
    /// Estimated rows/operations produced by this node alone
    pub cost: f64,
    /// This node's cost plus the cumulative cost of all its children
    pub cumulative_cost: f64,
}

/// A node in the relational-algebra plan.
///
/// The cost annotation is metadata: two nodes are equal when their
/// operators (and therefore whole subtrees) are structurally equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaNode {
    pub operator: RaOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<NodeCost>,
}

/// Relational-algebra operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RaOperator {
    /// Base table reference
    Relation {
        table_name: String,
        alias: Option<String>,
    },
    /// Filter rows by a condition
    Selection {
        condition: String,
        input: Box<RaNode>,
    },
    /// Output column list
    Projection {
        columns: Vec<String>,
        input: Box<RaNode>,
    },
    /// Combine two inputs; `TRUE` marks a cross join
    Join {
        left: Box<RaNode>,
        right: Box<RaNode>,
        condition: String,
    },
    /// Nested plan scoped under an alias
    Subquery {
        alias: Option<String>,
        input: Box<RaNode>,
    },
}

/// Operator kind, as shown to renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Relation,
    Selection,
    Projection,
    Join,
    Subquery,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Relation => "Relation",
            NodeKind::Selection => "Selection",
            NodeKind::Projection => "Projection",
            NodeKind::Join => "Join",
            NodeKind::Subquery => "Subquery",
        };
        f.write_str(name)
    }
}

/// Everything a diagram renderer needs to draw one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLabel {
    pub kind: NodeKind,
    /// Table name, condition, column list or alias
    pub text: String,
    pub cost: Option<NodeCost>,
}

impl PartialEq for RaNode {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
    }
}

impl From<RaOperator> for RaNode {
    fn from(operator: RaOperator) -> Self {
        RaNode { operator, cost: None }
    }
}

impl RaNode {
    pub fn relation(table_name: &str, alias: Option<&str>) -> Self {
        RaOperator::Relation {
            table_name: table_name.to_string(),
            alias: alias.map(str::to_string),
        }
        .into()
    }

    pub fn selection(condition: &str, input: RaNode) -> Self {
        RaOperator::Selection {
            condition: condition.to_string(),
            input: Box::new(input),
        }
        .into()
    }

    pub fn projection(columns: Vec<String>, input: RaNode) -> Self {
        RaOperator::Projection {
            columns,
            input: Box::new(input),
        }
        .into()
    }

    pub fn join(left: RaNode, right: RaNode, condition: &str) -> Self {
        RaOperator::Join {
            left: Box::new(left),
            right: Box::new(right),
            condition: condition.to_string(),
        }
        .into()
    }

    pub fn cross_join(left: RaNode, right: RaNode) -> Self {
        Self::join(left, right, CROSS_JOIN_CONDITION)
    }

    pub fn subquery(alias: Option<&str>, input: RaNode) -> Self {
        RaOperator::Subquery {
            alias: alias.map(str::to_string),
            input: Box::new(input),
        }
        .into()
    }

    pub fn kind(&self) -> NodeKind {
        match &self.operator {
            RaOperator::Relation { .. } => NodeKind::Relation,
            RaOperator::Selection { .. } => NodeKind::Selection,
            RaOperator::Projection { .. } => NodeKind::Projection,
            RaOperator::Join { .. } => NodeKind::Join,
            RaOperator::Subquery { .. } => NodeKind::Subquery,
        }
    }

    /// The name this node is referenced by in the enclosing scope.
    ///
    /// Joins have no single name and return `None`.
    pub fn alias(&self) -> Option<&str> {
        match &self.operator {
            RaOperator::Relation { table_name, alias } => {
                Some(alias.as_deref().unwrap_or(table_name))
            }
            RaOperator::Selection { input, .. } | RaOperator::Projection { input, .. } => {
                input.alias()
            }
            RaOperator::Join { .. } => None,
            RaOperator::Subquery { alias, input } => alias.as_deref().or_else(|| input.alias()),
        }
    }

    /// All names a condition may use to reference relations under this node.
    ///
    /// An aliased relation contributes both its alias and its bare table name.
    pub fn aliases(&self) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        self.collect_aliases(&mut aliases);
        aliases
    }

    fn collect_aliases(&self, aliases: &mut BTreeSet<String>) {
        match &self.operator {
            RaOperator::Relation { table_name, alias } => {
                if let Some(a) = alias {
                    aliases.insert(a.clone());
                }
                aliases.insert(table_name.clone());
            }
            RaOperator::Subquery { .. } => {
                if let Some(a) = self.alias() {
                    aliases.insert(a.to_string());
                }
            }
            RaOperator::Selection { input, .. } | RaOperator::Projection { input, .. } => {
                input.collect_aliases(aliases);
            }
            RaOperator::Join { left, right, .. } => {
                left.collect_aliases(aliases);
                right.collect_aliases(aliases);
            }
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Vec<&RaNode> {
        match &self.operator {
            RaOperator::Relation { .. } => Vec::new(),
            RaOperator::Selection { input, .. }
            | RaOperator::Projection { input, .. }
            | RaOperator::Subquery { input, .. } => vec![input.as_ref()],
            RaOperator::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// True for a join carrying the cross-join sentinel
    pub fn is_cross_join(&self) -> bool {
        match &self.operator {
            RaOperator::Join { condition, .. } => {
                condition.trim().eq_ignore_ascii_case(CROSS_JOIN_CONDITION)
            }
            _ => false,
        }
    }

    /// Node-local estimated cost, if annotated
    pub fn cost(&self) -> Option<f64> {
        self.cost.map(|c| c.cost)
    }

    /// Cumulative cost of the subtree, if annotated
    pub fn cumulative_cost(&self) -> Option<f64> {
        self.cost.map(|c| c.cumulative_cost)
    }

    /// Drop cost annotations from the whole subtree
    pub fn clear_costs(&mut self) {
        self.cost = None;
        match &mut self.operator {
            RaOperator::Relation { .. } => {}
            RaOperator::Selection { input, .. }
            | RaOperator::Projection { input, .. }
            | RaOperator::Subquery { input, .. } => input.clear_costs(),
            RaOperator::Join { left, right, .. } => {
                left.clear_costs();
                right.clear_costs();
            }
        }
    }

    /// Number of nodes in the subtree
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    pub fn label(&self) -> NodeLabel {
        let text = match &self.operator {
            RaOperator::Relation { table_name, alias: Some(a) } => format!("{} AS {}", table_name, a),
            RaOperator::Relation { table_name, alias: None } => table_name.clone(),
            RaOperator::Selection { condition, .. } | RaOperator::Join { condition, .. } => {
                condition.clone()
            }
            RaOperator::Projection { columns, .. } => columns.join(", "),
            RaOperator::Subquery { alias, .. } => alias.clone().unwrap_or_default(),
        };
        NodeLabel {
            kind: self.kind(),
            text,
            cost: self.cost,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let label = self.label();
        write!(f, "{:indent$}{}: {}", "", label.kind, label.text, indent = depth * 2)?;
        if let Some(c) = label.cost {
            write!(f, " [cost={:.2e}, cumulative={:.2e}]", c.cost, c.cumulative_cost)?;
        }
        for child in self.children() {
            writeln!(f)?;
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for RaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
