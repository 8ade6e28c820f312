//! Query engine for instaq.
//!
//! Turns an [`InstanceQuery`](instaq_proto::InstanceQuery) into batched SQL per
//! physical table, merges the result sets into joined rows, regroups one-to-many
//! links and hands the result to an [`Evaluator`] after access filtering.

mod batch;
mod cache;
mod evaluator;
mod executor;
mod expand;
mod plan;
mod reader;
mod tree;

pub use batch::IdentifierBatcher;
pub use cache::{JoinedResultCache, RowKey, RowView};
pub use evaluator::{ColumnRef, CursorState, Evaluator};
pub use executor::QueryExecutor;
pub use expand::{ExpandGroup, ExpandResolver};
pub use plan::{CompiledStatement, TablePlan};
pub use reader::{compose, read_scalar, AttributeValueReader};
pub use tree::{
    CompiledQuery, Expand, ExpandId, ExpandKind, ExpandMembers, Level, LevelId, LevelSource,
    Node, NodeId, NodeKind, OutputColumn, ROOT_LEVEL,
};
