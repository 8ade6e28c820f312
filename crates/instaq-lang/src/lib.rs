//! instaq select language
//!
//! This crate parses the textual form of instaq selection trees.
//!
//! # Syntax
//!
//! A select list is a comma-separated list of dotted paths. Every step but the
//! last must follow a link; the last step names what the output column holds.
//!
//! ```text
//! attribute[Name]
//! instance as oid
//! linkto[Company].attribute[Name] as company
//! linkto[Company].linkto[Country].attribute[Code]
//! linkfrom[Position#Document].attribute[Amount] as amounts
//! linkfrom[Position#Document]
//! ```
//!
//! A print statement names the root instances as well:
//!
//! ```text
//! print Document(114, 224, 334) select attribute[Name], linkto[Company]
//! ```
//!
//! # Usage
//!
//! ```rust
//! use instaq_lang::{parse_print, parse_select};
//!
//! let selections = parse_select("attribute[Name], linkto[Company].attribute[Name]").unwrap();
//! assert_eq!(selections.len(), 2);
//!
//! let query = parse_print("print Document(114) select instance").unwrap();
//! assert_eq!(query.instances.len(), 1);
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::{PrintStatement, SelectItem, SelectList, Statement, Step};
pub use compiler::CompiledStatement;
pub use error::{CompileError, CompileErrorKind, LangError, ParseError};
pub use span::{Span, Spanned};

use instaq_proto::{InstanceQuery, Selection};

/// Parse a source string into an AST.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    parser::parse(source)
}

/// Compile an AST statement.
pub fn compile(stmt: Statement) -> Result<CompiledStatement, CompileError> {
    compiler::compile(stmt)
}

/// Parse and compile a source string in one step.
pub fn parse_and_compile(source: &str) -> Result<CompiledStatement, LangError> {
    let stmt = parse(source)?;
    let compiled = compile(stmt)?;
    Ok(compiled)
}

/// Parse a bare select list into selection trees.
pub fn parse_select(source: &str) -> Result<Vec<Selection>, LangError> {
    let list = parser::Parser::new(source).parse_select_only()?;
    Ok(compiler::Compiler::compile_select_list(list)?)
}

/// Parse a `print Type(ids) select ...` statement into a query.
pub fn parse_print(source: &str) -> Result<InstanceQuery, LangError> {
    match parse_and_compile(source)? {
        CompiledStatement::Query(query) => Ok(query),
        CompiledStatement::Selections(_) => Err(ParseError::new(
            "expected a print statement",
            Span::new(0, source.len()),
        )
        .with_hint("write `print Type(id, ...) select ...`")
        .into()),
    }
}
