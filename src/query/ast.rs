// Clause-Structured Query AST
//
// This module defines the query shape handed to the planner by an external SQL
// parser. Expressions stay as opaque SQL text fragments.

use serde::{Deserialize, Serialize};

/// SELECT query broken down into its clauses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Output expressions of the SELECT clause, in order
    #[serde(default)]
    pub projection: Option<Vec<String>>,
    /// FROM clause target
    #[serde(default)]
    pub from: Option<TableTarget>,
    /// Explicit JOIN clauses in declaration order
    #[serde(default)]
    pub joins: Vec<JoinClause>,
    /// WHERE condition text
    #[serde(default)]
    pub where_clause: Option<String>,
}

/// JOIN clause: a target plus an optional ON condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub target: TableTarget,
    #[serde(default)]
    pub on: Option<String>,
}

/// Something that can appear in a FROM or JOIN position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableTarget {
    /// Base table, optionally aliased (`orders o`)
    Table {
        name: String,
        #[serde(default)]
        alias: Option<String>,
    },
    /// Explicit alias wrapper (`<target> AS alias`)
    Aliased {
        alias: String,
        target: Box<TableTarget>,
    },
    /// Nested query (`(SELECT ...) AS sq`)
    Subquery {
        query: Box<SelectQuery>,
        #[serde(default)]
        alias: Option<String>,
    },
    /// Any other target kind (table functions, VALUES lists, ...)
    Other { kind: String, text: String },
}

impl SelectQuery {
    /// Start a query from a FROM target
    pub fn from_target(target: TableTarget) -> Self {
        SelectQuery {
            from: Some(target),
            ..Default::default()
        }
    }

    /// Add a JOIN clause
    pub fn join(mut self, target: TableTarget, on: Option<&str>) -> Self {
        self.joins.push(JoinClause {
            target,
            on: on.map(str::to_string),
        });
        self
    }

    /// Set the WHERE condition
    pub fn filter(mut self, condition: &str) -> Self {
        self.where_clause = Some(condition.to_string());
        self
    }

    /// Set the SELECT output expressions
    pub fn select<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.projection = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }
}

impl TableTarget {
    /// Unaliased base table
    pub fn table(name: &str) -> Self {
        TableTarget::Table {
            name: name.to_string(),
            alias: None,
        }
    }

    /// Base table with an alias
    pub fn aliased_table(name: &str, alias: &str) -> Self {
        TableTarget::Table {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// Nested query with an alias
    pub fn subquery(query: SelectQuery, alias: &str) -> Self {
        TableTarget::Subquery {
            query: Box::new(query),
            alias: Some(alias.to_string()),
        }
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            TableTarget::Table { name, alias: Some(a) } => format!("table {} AS {}", name, a),
            TableTarget::Table { name, alias: None } => format!("table {}", name),
            TableTarget::Aliased { alias, target } => format!("{} AS {}", target.describe(), alias),
            TableTarget::Subquery { alias, .. } => {
                format!("subquery {}", alias.as_deref().unwrap_or("<unnamed>"))
            }
            TableTarget::Other { kind, text } => format!("{} `{}`", kind, text),
        }
    }
}
