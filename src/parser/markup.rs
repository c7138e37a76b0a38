//! Cursor over the tokens inside one `{{ ... }}` or `{% ... %}`.
//!
//! The parser hands a [`Markup`] to each tag handler so that tags can run
//! their own small grammars over the argument tokens, and uses the same
//! cursor to parse output expressions.

use crate::ast::expr::*;
use crate::ast::span::{Span, Spanned};
use crate::ast::value::Value;
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{Token, TokenKind};
use crate::registry::Registry;

pub struct Markup<'a> {
    name: &'a str,
    text: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    span: Span,
    line: usize,
    registry: &'a Registry,
}

impl<'a> Markup<'a> {
    pub(crate) fn new(
        name: &'a str,
        text: &'a str,
        tokens: Vec<Token<'a>>,
        span: Span,
        line: usize,
        registry: &'a Registry,
    ) -> Self {
        Self {
            name,
            text,
            tokens,
            pos: 0,
            span,
            line,
            registry,
        }
    }

    /// Tag name; empty for `{{ ... }}` bodies.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The argument text exactly as written, without the tag name.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Span of the whole construct, delimiters included.
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// True once every argument token has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + n)
    }

    pub fn next_token(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).copied()?;
        self.pos += 1;
        Some(token)
    }

    /// Consume the next token if it is the operator `op`.
    pub fn consume_operator(&mut self, op: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_operator(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next token if it is the identifier `name`.
    pub fn consume_identifier(&mut self, name: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_identifier(name)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_operator(&mut self, op: &str) -> Result<(), ParseError> {
        if self.consume_operator(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    pub fn expect_identifier(&mut self) -> Result<&'a str, ParseError> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => {
                let name = t.lexeme;
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    /// Fail unless every argument token has been consumed.
    pub fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.error_at(t.span, format!("unexpected {} in '{}'", t.describe(), self.display_name()))),
        }
    }

    /// A syntax error pointing at the whole tag.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.span, message)
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> ParseError {
        let err = ParseError::new(ParseErrorKind::Syntax, span, self.line, message);
        if self.name.is_empty() {
            err
        } else {
            err.with_tag(self.name)
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(t) => self.error_at(t.span, format!("expected {expected}, found {}", t.describe())),
            None => self.error(format!(
                "expected {expected} in '{}', found end of markup",
                self.display_name()
            )),
        }
    }

    fn display_name(&self) -> &str {
        if self.name.is_empty() { "{{ }}" } else { self.name }
    }

    fn last_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or(self.span)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Parse a single value: a literal, a range, or a variable lookup.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.next_token() else {
            return Err(self.unexpected("an expression"));
        };
        let span = token.span;

        match token.kind {
            TokenKind::StringLiteral => Ok(Spanned::new(
                ExprKind::Literal(Value::String(token.string_value().to_string())),
                span,
            )),
            TokenKind::NumberLiteral => {
                let value = parse_number(token.lexeme)
                    .ok_or_else(|| self.error_at(span, format!("invalid number: {}", token.lexeme)))?;
                Ok(Spanned::new(ExprKind::Literal(value), span))
            }
            TokenKind::Identifier => match token.lexeme {
                "true" => Ok(Spanned::new(ExprKind::Literal(Value::Bool(true)), span)),
                "false" => Ok(Spanned::new(ExprKind::Literal(Value::Bool(false)), span)),
                "nil" | "null" => Ok(Spanned::new(ExprKind::Literal(Value::Nil), span)),
                name => self.parse_path(LookupRoot::Name(name.to_string()), span),
            },
            TokenKind::Operator if token.lexeme == "[" => {
                let key = self.parse_expression()?;
                self.expect_operator("]")?;
                self.parse_path(LookupRoot::Dynamic(Box::new(key)), span)
            }
            TokenKind::Operator if token.lexeme == "(" => {
                let start = self.parse_expression()?;
                self.expect_operator("..")?;
                let end = self.parse_expression()?;
                self.expect_operator(")")?;
                Ok(Spanned::new(
                    ExprKind::Range {
                        start: Box::new(start),
                        end: Box::new(end),
                    },
                    span.merge(self.last_span()),
                ))
            }
            _ => Err(self.error_at(span, format!("expected an expression, found {}", token.describe()))),
        }
    }

    fn parse_path(&mut self, root: LookupRoot, start: Span) -> Result<Expr, ParseError> {
        let mut path = Vec::new();
        loop {
            if self.consume_operator(".") {
                let key = self.expect_identifier()?;
                path.push(PathSegment::Key(key.to_string()));
            } else if self.consume_operator("[") {
                let index = self.parse_expression()?;
                self.expect_operator("]")?;
                path.push(PathSegment::Index(index));
            } else {
                break;
            }
        }
        Ok(Spanned::new(
            ExprKind::Lookup(Lookup { root, path }),
            start.merge(self.last_span()),
        ))
    }

    /// Parse an expression followed by any number of filter stages:
    /// `expr | name | name: arg, key: value`.
    pub fn parse_filtered(&mut self) -> Result<FilteredExpr, ParseError> {
        let expr = self.parse_expression()?;
        let mut filters = Vec::new();

        while self.consume_operator("|") {
            let name = self.expect_identifier()?;
            let mut args = Vec::new();
            let mut kwargs = Vec::new();

            if self.consume_operator(":") {
                loop {
                    let is_keyword = self.peek().is_some_and(|t| t.kind == TokenKind::Identifier)
                        && self.peek_nth(1).is_some_and(|t| t.is_operator(":"));
                    if is_keyword {
                        let key = self.expect_identifier()?;
                        self.expect_operator(":")?;
                        kwargs.push((key.to_string(), self.parse_expression()?));
                    } else {
                        args.push(self.parse_expression()?);
                    }
                    if !self.consume_operator(",") {
                        break;
                    }
                }
            }

            let filter = self.registry.filter(name);
            if filter.is_none() {
                tracing::trace!(filter = name, "filter not registered at parse time");
            }
            filters.push(FilterCall {
                name: name.to_string(),
                args,
                kwargs,
                filter,
            });
        }

        Ok(FilteredExpr { expr, filters })
    }
}

/// Integers too wide for `i64` become floats.
fn parse_number(lexeme: &str) -> Option<Value> {
    if !lexeme.contains('.')
        && let Ok(n) = lexeme.parse()
    {
        return Some(Value::Int(n));
    }
    lexeme.parse().ok().map(Value::Float)
}
