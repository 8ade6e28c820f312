//! Cursor over an evaluated, access-filtered query.

use std::fmt;

use super::reader::AttributeValueReader;
use super::tree::{CompiledQuery, LevelId, NodeId, NodeKind, OutputColumn, ROOT_LEVEL};
use crate::catalog::{AttributeDef, Catalog};
use crate::error::{Error, Result};
use crate::security::{AccessDecisions, AccessView};
use instaq_proto::{Instance, Value};

/// Cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Before the first row.
    Unpositioned,
    /// On the n-th visible row.
    Positioned(usize),
    /// Past the last row. Terminal.
    Exhausted,
}

/// How a caller addresses an output column.
#[derive(Debug, Clone, Copy)]
pub enum ColumnRef<'r> {
    /// 1-based column index.
    Index(usize),
    /// Declared alias, or the column's dotted label.
    Alias(&'r str),
    /// The attribute read by the column's leaf.
    Attribute(&'r AttributeDef),
}

impl From<usize> for ColumnRef<'_> {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl<'r> From<&'r str> for ColumnRef<'r> {
    fn from(alias: &'r str) -> Self {
        ColumnRef::Alias(alias)
    }
}

impl<'r> From<&'r String> for ColumnRef<'r> {
    fn from(alias: &'r String) -> Self {
        ColumnRef::Alias(alias)
    }
}

impl<'r> From<&'r AttributeDef> for ColumnRef<'r> {
    fn from(attr: &'r AttributeDef) -> Self {
        ColumnRef::Attribute(attr)
    }
}

impl fmt::Display for ColumnRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(index) => write!(f, "#{}", index),
            ColumnRef::Alias(alias) => write!(f, "'{}'", alias),
            ColumnRef::Attribute(attr) => write!(f, "{}", attr.qualified_name()),
        }
    }
}

/// The object a consumer iterates.
///
/// Rows are the root instances that survived access filtering, in the order the
/// database returned them. Values are computed on read from the caches owned by
/// the evaluator.
pub struct Evaluator<'a> {
    catalog: &'a Catalog,
    query: CompiledQuery,
    view: AccessView,
    state: CursorState,
}

impl<'a> Evaluator<'a> {
    /// Wrap an executed and filtered query.
    pub fn new(catalog: &'a Catalog, query: CompiledQuery, view: AccessView) -> Self {
        Self {
            catalog,
            query,
            view,
            state: CursorState::Unpositioned,
        }
    }

    /// Advance to the next visible row. Returns `false` once exhausted, and on
    /// every call after that.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let next = match self.state {
            CursorState::Unpositioned => 0,
            CursorState::Positioned(pos) => pos + 1,
            CursorState::Exhausted => return false,
        };
        if next < self.view.len() {
            self.state = CursorState::Positioned(next);
            true
        } else {
            self.state = CursorState::Exhausted;
            false
        }
    }

    /// Move back before the first row.
    pub fn before_first(&mut self) {
        self.state = CursorState::Unpositioned;
    }

    /// Number of visible rows.
    pub fn count(&self) -> usize {
        self.view.len()
    }

    /// Current cursor state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Output columns in declaration order.
    pub fn columns(&self) -> &[OutputColumn] {
        self.query.columns()
    }

    /// Access decisions taken during filtering.
    pub fn decisions(&self) -> &AccessDecisions {
        self.view.decisions()
    }

    /// The compiled query behind the cursor.
    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }

    /// Root instance of the current row.
    pub fn inst(&self) -> Result<&Instance> {
        let key = self.current_key()?;
        self.query
            .level(ROOT_LEVEL)
            .instance(key)
            .ok_or_else(|| Error::Precondition(format!("no root instance for key {}", key)))
    }

    /// Value of a column on the current row.
    pub fn get<'r>(&self, column: impl Into<ColumnRef<'r>>) -> Result<Value> {
        let column = column.into();
        let key = self.current_key()?;
        let position = self.column_position(column)?;
        self.eval(ROOT_LEVEL, key, &self.query.columns()[position].path)
    }

    /// Value of the 1-based column `index`.
    pub fn get_index(&self, index: usize) -> Result<Value> {
        self.get(ColumnRef::Index(index))
    }

    /// Value of the column named `alias`.
    pub fn get_alias(&self, alias: &str) -> Result<Value> {
        self.get(ColumnRef::Alias(alias))
    }

    /// Value of the first column reading `attr`.
    pub fn get_attribute(&self, attr: &AttributeDef) -> Result<Value> {
        self.get(ColumnRef::Attribute(attr))
    }

    /// Every column of the current row.
    pub fn row(&self) -> Result<Vec<Value>> {
        let key = self.current_key()?;
        self.query
            .columns()
            .iter()
            .map(|column| self.eval(ROOT_LEVEL, key, &column.path))
            .collect()
    }

    /// 0-based position of a column.
    pub fn column_position(&self, column: ColumnRef<'_>) -> Result<usize> {
        let columns = self.query.columns();
        let found = match column {
            ColumnRef::Index(index) => (1..=columns.len()).contains(&index).then(|| index - 1),
            ColumnRef::Alias(alias) => columns
                .iter()
                .position(|c| c.alias.as_deref() == Some(alias))
                .or_else(|| columns.iter().position(|c| c.label == alias)),
            ColumnRef::Attribute(attr) => {
                let name = attr.qualified_name();
                columns.iter().position(|c| {
                    c.leaf()
                        .and_then(|leaf| self.query.node(leaf).attribute())
                        .is_some_and(|a| a.qualified_name() == name)
                })
            }
        };
        found.ok_or_else(|| Error::InvalidQuery(format!("no column {}", column)))
    }

    fn current_key(&self) -> Result<i64> {
        let pos = match self.state {
            CursorState::Positioned(pos) => pos,
            CursorState::Unpositioned => {
                return Err(Error::Precondition("read before next()".into()))
            }
            CursorState::Exhausted => {
                return Err(Error::Precondition("read after the last row".into()))
            }
        };
        self.view
            .visible()
            .get(pos)
            .and_then(|&row| self.query.level(ROOT_LEVEL).cache().row(row))
            .map(|row| row.key().key)
            .ok_or_else(|| Error::Precondition(format!("row {} is not cached", pos)))
    }

    fn eval(&self, level: LevelId, key: i64, path: &[NodeId]) -> Result<Value> {
        let Some((&id, rest)) = path.split_first() else {
            return Ok(Value::Null);
        };
        let decisions = self.view.decisions();
        let reader = AttributeValueReader::new(self.catalog);

        match &self.query.node(id).kind {
            NodeKind::Instance => Ok(self
                .query
                .level(level)
                .instance(key)
                .cloned()
                .map(Value::Instance)
                .unwrap_or(Value::Null)),
            NodeKind::Attribute { attr, plan } => {
                let level = self.query.level(level);
                let Some(row) = level.row(key) else {
                    return Ok(Value::Null);
                };
                let indices = level.plans()[*plan]
                    .attribute_indices(attr)
                    .ok_or_else(|| Error::NoColumns(attr.qualified_name()))?;
                reader.read(attr, &indices, &row)
            }
            NodeKind::MultiLine { expand, .. } => {
                Ok(Value::List(self.query.lines_of(*expand, key).to_vec()))
            }
            NodeKind::LinkTo { attr, plan, target } => {
                let Some(linked) = self
                    .query
                    .linked_instance(&reader, level, key, attr, *plan)?
                else {
                    return Ok(Value::Null);
                };
                if !decisions.is_allowed(&linked) {
                    return Ok(Value::Null);
                }
                match target {
                    Some(target) if !rest.is_empty() => self.eval(*target, linked.id(), rest),
                    _ => Ok(Value::Instance(linked)),
                }
            }
            NodeKind::LinkFrom { expand, target } => {
                let members = self.query.children_of(*expand, key);
                if members.iter().all(|m| !decisions.is_allowed(m)) {
                    return Ok(Value::List(Vec::new()));
                }
                let values = members
                    .iter()
                    .map(|member| {
                        if !decisions.is_allowed(member) {
                            return Ok(Value::Null);
                        }
                        match target {
                            Some(target) if !rest.is_empty() => {
                                self.eval(*target, member.id(), rest)
                            }
                            _ => Ok(Value::Instance(member.clone())),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(values))
            }
        }
    }
}

impl fmt::Debug for Evaluator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("columns", &self.query.columns().len())
            .field("count", &self.view.len())
            .field("state", &self.state)
            .finish()
    }
}
