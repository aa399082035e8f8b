use thiserror::Error;

/// Errors raised while building or optimizing a relational-algebra plan
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// The query AST has a shape the builder cannot turn into a plan
    #[error("Input error: {0}")]
    InputError(String),

    /// The join-order search could not produce a valid ordering
    #[error("Optimization error: {0}")]
    OptimizationError(String),
}

/// Result type for planner operations
pub type PlanResult<T> = std::result::Result<T, PlanError>;
