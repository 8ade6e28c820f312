//! Recursive descent parser for select expressions.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::{Span, Spanned};

/// Parser for the select language.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Create a new parser for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
        }
    }

    /// Parse a complete statement: either `print ...` or a bare select list.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let is_print = matches!(self.lexer.peek()?, Some(tok) if tok.token == Token::Print);
        let statement = if is_print {
            Statement::Print(self.parse_print()?)
        } else {
            Statement::Select(self.parse_select_list()?)
        };
        self.expect_end()?;
        Ok(statement)
    }

    /// Parse a bare select list that must span the whole input.
    pub fn parse_select_only(&mut self) -> Result<SelectList, ParseError> {
        let list = self.parse_select_list()?;
        self.expect_end()?;
        Ok(list)
    }

    /// Parse `print Type(id, ...) select <list>`.
    fn parse_print(&mut self) -> Result<PrintStatement, ParseError> {
        let start = self.expect_token(Token::Print)?.span;
        let type_name = self.expect_name()?;
        self.expect_token(Token::LParen)?;

        let mut ids = vec![self.expect_int()?];
        while self.eat(&Token::Comma)? {
            ids.push(self.expect_int()?);
        }
        self.expect_token(Token::RParen)?;

        self.expect_token(Token::Select)?;
        let select = self.parse_select_list()?;
        let span = start.merge(select.span);

        Ok(PrintStatement {
            type_name,
            ids,
            select,
            span,
        })
    }

    /// Parse a comma-separated list of select items.
    pub fn parse_select_list(&mut self) -> Result<SelectList, ParseError> {
        let first = self.parse_item()?;
        let mut span = first.span;
        let mut items = vec![first];

        while self.eat(&Token::Comma)? {
            let item = self.parse_item()?;
            span = span.merge(item.span);
            items.push(item);
        }

        Ok(SelectList { items, span })
    }

    /// Parse `step ('.' step)* ('as' name)?`.
    fn parse_item(&mut self) -> Result<SelectItem, ParseError> {
        let first = self.parse_step()?;
        let mut span = first.span;
        let mut steps = vec![first];

        while self.eat(&Token::Dot)? {
            let step = self.parse_step()?;
            span = span.merge(step.span);
            steps.push(step);
        }

        let alias = if self.eat(&Token::As)? {
            let alias = self.expect_name()?;
            span = span.merge(alias.span);
            Some(alias)
        } else {
            None
        };

        Ok(SelectItem { steps, alias, span })
    }

    /// Parse a single step.
    fn parse_step(&mut self) -> Result<Spanned<Step>, ParseError> {
        let tok = self.next_token()?;
        let start = tok.span;

        let step = match tok.token {
            Token::Instance => return Ok(Spanned::new(Step::Instance, start)),
            Token::Attribute => {
                self.expect_token(Token::LBracket)?;
                let name = self.expect_name()?;
                Step::Attribute(name.value)
            }
            Token::LinkTo => {
                self.expect_token(Token::LBracket)?;
                let name = self.expect_name()?;
                Step::LinkTo(name.value)
            }
            Token::LinkFrom => {
                self.expect_token(Token::LBracket)?;
                let child_type = self.expect_name()?;
                self.expect_token(Token::Hash).map_err(|e| {
                    e.with_hint("linkfrom takes ChildType#LinkAttribute")
                })?;
                let link_attribute = self.expect_name()?;
                Step::LinkFrom {
                    child_type: child_type.value,
                    link_attribute: link_attribute.value,
                }
            }
            other => {
                return Err(ParseError::new(
                    format!("expected a select step, found {:?}", other),
                    tok.span,
                )
                .with_hint("steps are attribute[..], linkto[..], linkfrom[..#..] and instance"))
            }
        };

        let end = self.expect_token(Token::RBracket)?.span;
        Ok(Spanned::new(step, start.merge(end)))
    }

    /// Consume the next token if it matches.
    fn eat(&mut self, expected: &Token) -> Result<bool, ParseError> {
        let matches = matches!(self.lexer.peek()?, Some(tok) if &tok.token == expected);
        if matches {
            self.next_token()?;
        }
        Ok(matches)
    }

    /// Expect and consume a name; keywords are accepted as names.
    fn expect_name(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok(Spanned::new(name, tok.span)),
            ref other => match other.keyword_text() {
                Some(text) => Ok(Spanned::new(text.to_string(), tok.span)),
                None => Err(ParseError::new(
                    format!("expected name, found {:?}", tok.token),
                    tok.span,
                )),
            },
        }
    }

    /// Expect and consume an integer.
    fn expect_int(&mut self) -> Result<Spanned<i64>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Int(i) => Ok(Spanned::new(i, tok.span)),
            _ => Err(ParseError::new(
                format!("expected integer, found {:?}", tok.token),
                tok.span,
            )),
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!("expected {:?}, found {:?}", expected, tok.token),
                tok.span,
            ))
        }
    }

    /// Expect the end of input.
    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.lexer.next_token()? {
            None => Ok(()),
            Some(tok) => Err(ParseError::new(
                format!("unexpected trailing {:?}", tok.token),
                tok.span,
            )
            .with_hint("separate select items with ','")),
        }
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        self.lexer.next_token()?.ok_or_else(|| {
            ParseError::new(
                "unexpected end of input",
                Span::new(self.source.len(), self.source.len()),
            )
        })
    }
}

/// Parse a statement from source.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    Parser::new(source).parse_statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn steps(source: &str) -> Vec<Vec<Step>> {
        match parse(source).unwrap() {
            Statement::Select(list) => list
                .items
                .into_iter()
                .map(|item| item.steps.into_iter().map(|s| s.value).collect())
                .collect(),
            other => panic!("expected select list, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_single_attribute() {
        assert_eq!(steps("attribute[Name]"), vec![vec![Step::Attribute("Name".into())]]);
    }

    #[test]
    fn test_parse_linkto_chain() {
        assert_eq!(
            steps("linkto[Company].linkto[Country].attribute[Code]"),
            vec![vec![
                Step::LinkTo("Company".into()),
                Step::LinkTo("Country".into()),
                Step::Attribute("Code".into()),
            ]]
        );
    }

    #[test]
    fn test_parse_linkfrom_and_instance() {
        assert_eq!(
            steps("linkfrom[Position#Document].instance"),
            vec![vec![
                Step::LinkFrom {
                    child_type: "Position".into(),
                    link_attribute: "Document".into(),
                },
                Step::Instance,
            ]]
        );
    }

    #[test]
    fn test_parse_aliases_and_list() {
        let stmt = parse("attribute[Name] as name, instance as oid").unwrap();
        let Statement::Select(list) = stmt else {
            panic!("expected select list");
        };
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].alias.as_ref().unwrap().value, "name");
        assert_eq!(list.items[1].alias.as_ref().unwrap().value, "oid");
    }

    #[test]
    fn test_parse_print_statement() {
        let stmt = parse("print Document(114, 224, 334) select attribute[Name]").unwrap();
        let Statement::Print(print) = stmt else {
            panic!("expected print statement");
        };
        assert_eq!(print.type_name.value, "Document");
        let ids: Vec<i64> = print.ids.iter().map(|s| s.value).collect();
        assert_eq!(ids, vec![114, 224, 334]);
        assert_eq!(print.select.items.len(), 1);
    }

    #[test]
    fn test_keyword_as_bracketed_name() {
        assert_eq!(
            steps("attribute[instance]"),
            vec![vec![Step::Attribute("instance".into())]]
        );
    }

    #[test]
    fn test_missing_hash_in_linkfrom() {
        let err = parse("linkfrom[Position]").unwrap_err();
        assert!(err.message.contains("expected Hash"));
        assert!(err.hint.is_some());
    }

    #[test]
    fn test_trailing_input_is_rejected() {
        let err = parse("attribute[Name] attribute[Code]").unwrap_err();
        assert!(err.message.contains("unexpected trailing"));
        assert_eq!(err.span, Span::new(16, 25));
    }

    #[test]
    fn test_unexpected_end_of_input() {
        let err = parse("linkto[Company].").unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
    }
}
