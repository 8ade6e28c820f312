//! Engine configuration.

use serde::Deserialize;

use crate::error::Result;

/// Limits applied to a single evaluation.
///
/// The default budget is unlimited; limits apply only when a caller sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryBudget {
    /// Maximum number of nested link edges in a selection tree.
    pub max_depth: usize,
    /// Maximum number of distinct instances fetched for one level.
    pub max_instances: usize,
}

impl Default for QueryBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl QueryBudget {
    /// Create a budget with custom limits.
    pub fn new(max_depth: usize, max_instances: usize) -> Self {
        Self {
            max_depth,
            max_instances,
        }
    }

    /// Create an unlimited budget.
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
            max_instances: usize::MAX,
        }
    }
}

/// Configuration for a [`QueryExecutor`](crate::query::QueryExecutor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the dialect's maximum expression count when set.
    /// `Some(0)` disables batching.
    pub max_expressions: Option<usize>,
    /// Per-evaluation limits.
    pub budget: QueryBudget,
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON document.
    ///
    /// Missing fields take their defaults:
    ///
    /// ```json
    /// { "max_expressions": 500, "budget": { "max_depth": 3 } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the maximum expression count.
    pub fn with_max_expressions(mut self, max: usize) -> Self {
        self.max_expressions = Some(max);
        self
    }

    /// Set the budget.
    pub fn with_budget(mut self, budget: QueryBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Resolve the effective expression limit against the dialect's.
    pub fn effective_max_expressions(&self, dialect_max: usize) -> usize {
        self.max_expressions.unwrap_or(dialect_max)
    }
}
