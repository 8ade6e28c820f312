//! Compiler from select AST to selection trees.

use std::collections::HashMap;

use crate::ast::*;
use crate::error::{CompileError, CompileErrorKind};
use crate::span::{Span, Spanned};
use instaq_proto::{InstanceQuery, Selection};

/// A compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledStatement {
    /// A complete query with its root instances.
    Query(InstanceQuery),
    /// Selections without roots.
    Selections(Vec<Selection>),
}

/// Compiler for the select language.
pub struct Compiler;

impl Compiler {
    /// Compile a statement.
    pub fn compile(stmt: Statement) -> Result<CompiledStatement, CompileError> {
        match stmt {
            Statement::Print(print) => Self::compile_print(print).map(CompiledStatement::Query),
            Statement::Select(list) => {
                Self::compile_select_list(list).map(CompiledStatement::Selections)
            }
        }
    }

    fn compile_print(print: PrintStatement) -> Result<InstanceQuery, CompileError> {
        let selections = Self::compile_select_list(print.select)?;
        Ok(InstanceQuery::new(print.type_name.value)
            .with_ids(print.ids.into_iter().map(|id| id.value))
            .with_selections(selections))
    }

    /// Compile every item of a select list, rejecting duplicate aliases.
    pub fn compile_select_list(list: SelectList) -> Result<Vec<Selection>, CompileError> {
        let mut seen: HashMap<String, Span> = HashMap::new();
        let mut selections = Vec::with_capacity(list.items.len());

        for item in list.items {
            if let Some(alias) = &item.alias {
                if seen.insert(alias.value.clone(), alias.span).is_some() {
                    return Err(CompileError::new(
                        format!("alias '{}' is used more than once", alias.value),
                        alias.span,
                        CompileErrorKind::DuplicateAlias,
                    ));
                }
            }
            selections.push(Self::compile_item(item)?);
        }

        Ok(selections)
    }

    /// Fold a dotted path into a nested selection, innermost step first.
    fn compile_item(item: SelectItem) -> Result<Selection, CompileError> {
        let mut steps = item.steps.into_iter().rev();
        let Some(leaf) = steps.next() else {
            return Err(CompileError::new(
                "empty select path",
                item.span,
                CompileErrorKind::TerminalStepNotLast,
            ));
        };
        let mut selection = Self::compile_step(leaf, vec![]);
        if let Some(alias) = item.alias {
            selection = selection.with_alias(alias.value);
        }

        for step in steps {
            if !step.value.is_edge() {
                return Err(CompileError::new(
                    format!("'{}' must be the last step of a path", step.value.keyword()),
                    step.span,
                    CompileErrorKind::TerminalStepNotLast,
                ));
            }
            selection = Self::compile_step(step, vec![selection]);
        }
        Ok(selection)
    }

    fn compile_step(step: Spanned<Step>, children: Vec<Selection>) -> Selection {
        match step.value {
            Step::Attribute(name) => Selection::attribute(name),
            Step::Instance => Selection::instance(),
            Step::LinkTo(attribute) => Selection::linkto(attribute, children),
            Step::LinkFrom {
                child_type,
                link_attribute,
            } => Selection::linkfrom(child_type, link_attribute, children),
        }
    }
}

/// Compile a statement.
pub fn compile(stmt: Statement) -> Result<CompiledStatement, CompileError> {
    Compiler::compile(stmt)
}
