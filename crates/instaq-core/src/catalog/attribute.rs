//! Attribute descriptors.

use serde::{Deserialize, Serialize};

/// Storage type of a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// Boolean, stored as integer 0/1 or as text.
    Bool,
    /// 64-bit integer.
    Integer,
    /// Double precision float.
    Real,
    /// Text.
    Text,
    /// Binary blob.
    Bytes,
    /// Point in time; see [`JoinedResultCache::get_timestamp`](crate::query::JoinedResultCache::get_timestamp)
    /// for the accepted encodings.
    Timestamp,
}

/// Composition of a value stored across several columns.
///
/// The columns of a multi-column attribute are handed to the composer in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composer {
    /// `numerator / denominator` as a real; null if either part is null or the
    /// denominator is zero.
    Rate,
    /// `[from, to]` as a two-element list.
    Range,
    /// The non-null parts as text joined by `separator`.
    Concat {
        /// Separator placed between parts.
        separator: String,
    },
}

impl Composer {
    /// Number of columns the composer expects, if fixed.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Composer::Rate | Composer::Range => Some(2),
            Composer::Concat { .. } => None,
        }
    }
}

/// How an attribute is stored and read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// One column, read as-is.
    Scalar(ScalarType),
    /// A foreign id column pointing at an instance of `target` (or of the type
    /// named by an optional second type-id column).
    Link {
        /// Statically known target type.
        target: String,
    },
    /// Several columns combined into one value.
    MultiColumn(Composer),
    /// Rows of a child table; the single column is the value column and the
    /// table's parent column links each row back to its owner.
    MultiLine(ScalarType),
}

/// An attribute of a type: where it is stored and how it is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name, unique within the owning type.
    pub name: String,
    /// Owning type; filled in when the type is registered.
    #[serde(default)]
    pub owner: String,
    /// Physical table; defaults to the owner's main table when empty.
    #[serde(default)]
    pub table: String,
    /// Physical columns in declaration order.
    pub columns: Vec<String>,
    /// Attribute kind.
    pub kind: AttributeKind,
}

impl AttributeDef {
    /// Create an attribute with explicit columns and kind.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        kind: AttributeKind,
    ) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            table: table.into(),
            columns,
            kind,
        }
    }

    /// A single-column scalar attribute.
    pub fn scalar(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        scalar: ScalarType,
    ) -> Self {
        Self::new(name, table, vec![column.into()], AttributeKind::Scalar(scalar))
    }

    /// A link attribute stored in `column`.
    pub fn link(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            table,
            vec![column.into()],
            AttributeKind::Link {
                target: target.into(),
            },
        )
    }

    /// A multi-column attribute.
    pub fn multi_column(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        composer: Composer,
    ) -> Self {
        Self::new(name, table, columns, AttributeKind::MultiColumn(composer))
    }

    /// A multi-line attribute stored in child table `table`.
    pub fn multi_line(
        name: impl Into<String>,
        table: impl Into<String>,
        value_column: impl Into<String>,
        scalar: ScalarType,
    ) -> Self {
        Self::new(
            name,
            table,
            vec![value_column.into()],
            AttributeKind::MultiLine(scalar),
        )
    }

    /// Add a type-id column to a link attribute, so the linked instance's type
    /// is read per row.
    pub fn with_type_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Set the owning type.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Qualified name, `Owner.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Check whether this is a link attribute.
    pub fn is_link(&self) -> bool {
        matches!(self.kind, AttributeKind::Link { .. })
    }

    /// Static target type of a link attribute.
    pub fn link_target(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Link { target } => Some(target),
            _ => None,
        }
    }

    /// Check whether this attribute is resolved through an expand.
    pub fn is_multi_line(&self) -> bool {
        matches!(self.kind, AttributeKind::MultiLine(_))
    }
}
