//! Per-table column plans and their SQL compilation.
//!
//! A [`TablePlan`] collects the columns one physical table must deliver for a set
//! of attributes. Columns get plan-local indices as they are registered; when the
//! plan is compiled at a start index every index is shifted once, so several plans
//! can be laid out side by side in one joined row.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::batch::IdentifierBatcher;
use crate::catalog::{AttributeDef, TableDef};
use crate::dialect::quote_ident;
use crate::error::{Error, Result};

/// SQL for one table plan plus where its columns land in the joined row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    /// `UNION` of one `SELECT` per batch; `None` when there were no ids.
    pub sql: Option<String>,
    /// Number of batches in `sql`.
    pub batches: usize,
    /// Joined-row index of the first selected column.
    pub first_index: usize,
    /// First index after this plan's columns.
    pub next_index: usize,
    /// Joined-row index of the column the `IN` predicate filters on.
    pub key_column: usize,
    /// Joined-row index of the row's own id for expand plans.
    pub sub_key_column: Option<usize>,
}

/// Columns needed from one physical table.
#[derive(Debug, Clone)]
pub struct TablePlan {
    table: Arc<TableDef>,
    key_column: String,
    sub_key_column: Option<String>,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    attribute_indices: HashMap<String, Vec<usize>>,
    offset: Option<usize>,
    ids: Vec<i64>,
    expand_has_result: bool,
}

impl TablePlan {
    /// Plan for rows keyed by the table's own id column.
    pub fn new(table: Arc<TableDef>) -> Self {
        let id_column = table.id_column.clone();
        let mut plan = Self {
            table,
            key_column: id_column.clone(),
            sub_key_column: None,
            columns: Vec::new(),
            column_index: HashMap::new(),
            attribute_indices: HashMap::new(),
            offset: None,
            ids: Vec::new(),
            expand_has_result: false,
        };
        plan.add_column(&id_column);
        plan
    }

    /// Plan for an expand: rows are selected by `link_column` (a foreign key
    /// holding the parent id) and identified by the table's id column.
    pub fn for_expand(table: Arc<TableDef>, link_column: impl Into<String>) -> Self {
        let link_column = link_column.into();
        let mut plan = Self::new(table);
        plan.add_column(&link_column);
        plan.sub_key_column = Some(plan.key_column.clone());
        plan.key_column = link_column;
        plan
    }

    /// The planned table.
    pub fn table(&self) -> &TableDef {
        &self.table
    }

    /// Check whether this is an expand plan.
    pub fn is_expand(&self) -> bool {
        self.sub_key_column.is_some()
    }

    /// Register a column, returning its current index. Known columns keep theirs.
    pub fn add_column(&mut self, column: &str) -> usize {
        let offset = self.offset.unwrap_or(0);
        if let Some(&idx) = self.column_index.get(column) {
            return idx + offset;
        }
        let idx = self.columns.len();
        self.columns.push(column.to_string());
        self.column_index.insert(column.to_string(), idx);
        idx + offset
    }

    /// Register every column of an attribute. Repeating an attribute is a no-op.
    pub fn add_attribute(&mut self, attr: &AttributeDef) -> Result<()> {
        if self.offset.is_some() {
            return Err(Error::Precondition(format!(
                "plan for {} is already compiled",
                self.table.name
            )));
        }
        if attr.columns.is_empty() {
            return Err(Error::NoColumns(attr.qualified_name()));
        }
        if attr.table != self.table.name {
            return Err(Error::InvalidQuery(format!(
                "attribute {} is stored in {}, not {}",
                attr.qualified_name(),
                attr.table,
                self.table.name
            )));
        }

        let key = attr.qualified_name();
        if self.attribute_indices.contains_key(&key) {
            return Ok(());
        }
        let indices = attr
            .columns
            .iter()
            .map(|c| self.add_column(c))
            .collect();
        self.attribute_indices.insert(key, indices);
        Ok(())
    }

    /// Selected columns in index order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of selected columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Current index of a column.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        let offset = self.offset.unwrap_or(0);
        self.column_index.get(column).map(|idx| idx + offset)
    }

    /// Current indices of an attribute's columns, in declaration order.
    pub fn attribute_indices(&self, attr: &AttributeDef) -> Option<Vec<usize>> {
        let offset = self.offset.unwrap_or(0);
        self.attribute_indices
            .get(&attr.qualified_name())
            .map(|indices| indices.iter().map(|idx| idx + offset).collect())
    }

    /// All current indices of this plan.
    pub fn indices(&self) -> std::ops::Range<usize> {
        let offset = self.offset.unwrap_or(0);
        offset..offset + self.columns.len()
    }

    /// Check whether the plan was compiled.
    pub fn is_compiled(&self) -> bool {
        self.offset.is_some()
    }

    /// De-duplicated ids the plan was compiled for.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Whether an expand plan returned any row.
    pub fn expand_has_result(&self) -> bool {
        self.expand_has_result
    }

    /// Record whether an expand plan returned any row.
    pub fn set_expand_has_result(&mut self, has_result: bool) {
        self.expand_has_result = has_result;
    }

    /// Compile the plan for `ids`, placing its first column at `start_index`.
    ///
    /// Indices shift exactly once; compiling again at the same start index
    /// recompiles the SQL, a different start index is an error.
    pub fn compile(
        &mut self,
        ids: &[i64],
        start_index: usize,
        batcher: &IdentifierBatcher,
    ) -> Result<CompiledStatement> {
        match self.offset {
            Some(offset) if offset != start_index => {
                return Err(Error::Precondition(format!(
                    "plan for {} already placed at {}, cannot move to {}",
                    self.table.name, offset, start_index
                )));
            }
            _ => self.offset = Some(start_index),
        }

        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        self.ids = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let batches = batcher.split(&self.ids);
        let sql = if batches.is_empty() {
            None
        } else {
            let select_list = self
                .columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let table = quote_ident(&self.table.name);
            let key = quote_ident(&self.key_column);
            Some(
                batches
                    .iter()
                    .map(|batch| {
                        let list = batch
                            .iter()
                            .map(i64::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!("SELECT {} FROM {} WHERE {} IN ({})", select_list, table, key, list)
                    })
                    .collect::<Vec<_>>()
                    .join(" UNION "),
            )
        };

        let key_column = self
            .index_of(&self.key_column)
            .ok_or_else(|| Error::Precondition(format!("key column {} not selected", self.key_column)))?;
        let sub_key_column = match &self.sub_key_column {
            Some(column) => Some(self.index_of(column).ok_or_else(|| {
                Error::Precondition(format!("sub key column {} not selected", column))
            })?),
            None => None,
        };

        debug!(
            table = %self.table.name,
            ids = self.ids.len(),
            batches = batches.len(),
            first_index = start_index,
            expand = self.is_expand(),
            "compiled table plan"
        );

        Ok(CompiledStatement {
            sql,
            batches: batches.len(),
            first_index: start_index,
            next_index: start_index + self.columns.len(),
            key_column,
            sub_key_column,
        })
    }
}
