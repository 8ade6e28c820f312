//! Lexer for select expressions using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types of the select language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Statement keywords
    #[token("print")]
    Print,
    #[token("select")]
    Select,
    #[token("as")]
    As,

    // Step keywords
    #[token("attribute")]
    Attribute,
    #[token("linkto")]
    LinkTo,
    #[token("linkfrom")]
    LinkFrom,
    #[token("instance")]
    Instance,

    // Identifier
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Integer literal
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("#")]
    Hash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

impl Token {
    /// The source text of a keyword token, so keywords can double as names
    /// inside brackets (`attribute[instance]`).
    pub fn keyword_text(&self) -> Option<&'static str> {
        match self {
            Token::Print => Some("print"),
            Token::Select => Some("select"),
            Token::As => Some("as"),
            Token::Attribute => Some("attribute"),
            Token::LinkTo => Some("linkto"),
            Token::LinkFrom => Some("linkfrom"),
            Token::Instance => Some("instance"),
            _ => None,
        }
    }
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer that produces spanned tokens.
///
/// Unlike a skipping lexer, an unrecognised character is reported as a
/// [`ParseError`] so that typos never silently change a selection.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    peeked: Option<Option<SpannedToken>>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&SpannedToken>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_inner()?);
        }
        Ok(self.peeked.as_ref().and_then(|o| o.as_ref()))
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        match self.peeked.take() {
            Some(peeked) => Ok(peeked),
            None => self.next_inner(),
        }
    }

    fn next_inner(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        match self.inner.next() {
            Some(Ok(token)) => Ok(Some(SpannedToken {
                token,
                span: self.inner.span().into(),
            })),
            Some(Err(())) => Err(ParseError::new(
                format!("unexpected input '{}'", self.inner.slice()),
                self.inner.span().into(),
            )),
            None => Ok(None),
        }
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<SpannedToken, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .map(|t| t.unwrap().token)
            .collect()
    }

    #[test]
    fn test_step_keywords() {
        assert_eq!(
            tokens("linkto[Company].attribute[Name]"),
            vec![
                Token::LinkTo,
                Token::LBracket,
                Token::Ident("Company".into()),
                Token::RBracket,
                Token::Dot,
                Token::Attribute,
                Token::LBracket,
                Token::Ident("Name".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_linkfrom_with_hash() {
        assert_eq!(
            tokens("linkfrom[Position#Document]"),
            vec![
                Token::LinkFrom,
                Token::LBracket,
                Token::Ident("Position".into()),
                Token::Hash,
                Token::Ident("Document".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(tokens("attributes"), vec![Token::Ident("attributes".into())]);
        assert_eq!(tokens("instance_of"), vec![Token::Ident("instance_of".into())]);
    }

    #[test]
    fn test_print_statement_tokens() {
        assert_eq!(
            tokens("print Document(114, 224)"),
            vec![
                Token::Print,
                Token::Ident("Document".into()),
                Token::LParen,
                Token::Int(114),
                Token::Comma,
                Token::Int(224),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_invalid_character_is_an_error() {
        let mut lexer = Lexer::new("attribute[Name] $");
        for _ in 0..4 {
            assert!(lexer.next_token().unwrap().is_some());
        }
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.span, Span::new(16, 17));
    }
}
