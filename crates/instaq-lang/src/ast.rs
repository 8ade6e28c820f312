//! Abstract syntax tree for select expressions.

use crate::span::{Span, Spanned};

/// A top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `print Type(id, ...) select ...`
    Print(PrintStatement),
    /// A bare select list.
    Select(SelectList),
}

impl Statement {
    /// Get the span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Statement::Print(p) => p.span,
            Statement::Select(s) => s.span,
        }
    }
}

/// A print statement naming its root instances.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintStatement {
    /// Base type of the root instances.
    pub type_name: Spanned<String>,
    /// Root instance ids.
    pub ids: Vec<Spanned<i64>>,
    /// What to select for each instance.
    pub select: SelectList,
    /// The full span of the statement.
    pub span: Span,
}

/// Comma-separated select items.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectList {
    pub items: Vec<SelectItem>,
    pub span: Span,
}

/// One select item: a dotted path of steps with an optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub steps: Vec<Spanned<Step>>,
    pub alias: Option<Spanned<String>>,
    pub span: Span,
}

/// One step of a select path.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `attribute[Name]`
    Attribute(String),
    /// `linkto[LinkAttribute]`
    LinkTo(String),
    /// `linkfrom[ChildType#LinkAttribute]`
    LinkFrom {
        child_type: String,
        link_attribute: String,
    },
    /// `instance`
    Instance,
}

impl Step {
    /// Check if further steps may follow this one.
    pub fn is_edge(&self) -> bool {
        matches!(self, Step::LinkTo(_) | Step::LinkFrom { .. })
    }

    /// Keyword naming this step, for diagnostics.
    pub fn keyword(&self) -> &'static str {
        match self {
            Step::Attribute(_) => "attribute",
            Step::LinkTo(_) => "linkto",
            Step::LinkFrom { .. } => "linkfrom",
            Step::Instance => "instance",
        }
    }
}
