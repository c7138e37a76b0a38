//! Tokenizer for template source.
//!
//! The [`Lexer`] is a lazy iterator over [`Token`]s. It runs as a small
//! state machine:
//!
//! - **Text**: literal runs between delimiters.
//! - **Markup**: inside `{{ ... }}` or `{% ... %}`: identifiers,
//!   operators and literal values, up to the closing delimiter.
//! - **Verbatim**: entered after a `{% raw %}` tag closes. Nothing is
//!   tokenized; the lexer only looks for the matching `{% endraw %}` and
//!   emits everything before it as one [`TokenKind::Raw`] token.
//!
//! Trim dashes (`{{-`, `-}}`, `{%-`, `-%}`) are not separate tokens; they
//! are recorded as the `trim` flag on the delimiter token.

use crate::ast::span::Span;
use crate::error::{LexError, LexErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text between delimiters. May be empty when two delimiters
    /// are adjacent.
    Text,
    /// `{%` or `{%-`; `trim` asks for whitespace before it to be removed.
    TagOpen { trim: bool },
    /// `%}` or `-%}`; `trim` asks for whitespace after it to be removed.
    TagClose { trim: bool },
    VariableOpen { trim: bool },
    VariableClose { trim: bool },
    Identifier,
    Operator,
    StringLiteral,
    NumberLiteral,
    /// Verbatim body of a raw block.
    Raw,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub lexeme: &'s str,
    pub span: Span,
    /// 1-based line of the token's first byte.
    pub line: usize,
}

impl<'s> Token<'s> {
    /// For string literals, the text between the quotes; otherwise the
    /// lexeme itself.
    pub fn string_value(&self) -> &'s str {
        match self.kind {
            TokenKind::StringLiteral => &self.lexeme[1..self.lexeme.len() - 1],
            _ => self.lexeme,
        }
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.lexeme == op
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == name
    }

    /// Short human description used in error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::TagClose { .. } | TokenKind::VariableClose { .. } => {
                format!("closing '{}'", self.lexeme)
            }
            _ => format!("'{}'", self.lexeme),
        }
    }
}

/// Whitespace as far as trimming and markup are concerned.
pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Variable,
    Tag,
}

#[derive(Debug, Clone, Copy)]
struct Markup {
    delimiter: Delimiter,
    open_offset: usize,
    open_line: usize,
    first_token: bool,
    opens_raw: bool,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Text { after_close: bool },
    Markup(Markup),
    Verbatim { raw_offset: usize, raw_line: usize },
    Finished,
}

const TWO_CHAR_OPERATORS: [&str; 6] = ["==", "!=", "<>", "<=", ">=", ".."];
const ONE_CHAR_OPERATORS: &str = "<>.|:,[]()=";

pub struct Lexer<'s> {
    source: &'s str,
    pos: usize,
    line: usize,
    state: State,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            state: State::Text { after_close: false },
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    /// 1-based line the lexer has reached.
    pub fn line(&self) -> usize {
        self.line
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    /// Consume `len` bytes and build a token for them.
    fn take(&mut self, kind: TokenKind, len: usize) -> Token<'s> {
        let start = self.pos;
        let line = self.line;
        let lexeme = &self.source[start..start + len];
        self.line += lexeme.bytes().filter(|b| *b == b'\n').count();
        self.pos += len;
        Token {
            kind,
            lexeme,
            span: Span::new(start, start + len),
            line,
        }
    }

    fn fail(&mut self, kind: LexErrorKind, offset: usize, line: usize, message: String) -> LexError {
        self.state = State::Finished;
        LexError::new(kind, offset, line, message)
    }

    fn lex_text(&mut self, after_close: bool) -> Result<Token<'s>, LexError> {
        let rest = self.rest();
        if rest.is_empty() {
            self.state = State::Finished;
            return Ok(Token {
                kind: TokenKind::Eof,
                lexeme: "",
                span: Span::point(self.pos),
                line: self.line,
            });
        }

        match find_open_delimiter(rest) {
            Some(0) if after_close => {
                // Two delimiters back to back still get a (zero-length)
                // literal between them.
                self.state = State::Text { after_close: false };
                Ok(self.take(TokenKind::Text, 0))
            }
            Some(0) => Ok(self.lex_open_delimiter()),
            Some(n) => {
                self.state = State::Text { after_close: false };
                Ok(self.take(TokenKind::Text, n))
            }
            None => {
                self.state = State::Text { after_close: false };
                Ok(self.take(TokenKind::Text, rest.len()))
            }
        }
    }

    fn lex_open_delimiter(&mut self) -> Token<'s> {
        let rest = self.rest();
        let delimiter = if rest.starts_with("{{") {
            Delimiter::Variable
        } else {
            Delimiter::Tag
        };
        let trim = rest[2..].starts_with('-');
        self.state = State::Markup(Markup {
            delimiter,
            open_offset: self.pos,
            open_line: self.line,
            first_token: true,
            opens_raw: false,
        });
        let kind = match delimiter {
            Delimiter::Variable => TokenKind::VariableOpen { trim },
            Delimiter::Tag => TokenKind::TagOpen { trim },
        };
        self.take(kind, if trim { 3 } else { 2 })
    }

    fn lex_markup(&mut self, mut markup: Markup) -> Result<Token<'s>, LexError> {
        let ws = self.rest().len() - self.rest().trim_start_matches(is_whitespace).len();
        self.take(TokenKind::Text, ws);

        let rest = self.rest();
        if rest.is_empty() {
            let (kind, what) = match markup.delimiter {
                Delimiter::Variable => (LexErrorKind::UnterminatedVariable, "Variable '{{'"),
                Delimiter::Tag => (LexErrorKind::UnterminatedTag, "Tag '{%'"),
            };
            return Err(self.fail(
                kind,
                markup.open_offset,
                markup.open_line,
                format!("{what} was not properly terminated"),
            ));
        }

        let close = match markup.delimiter {
            Delimiter::Variable => "}}",
            Delimiter::Tag => "%}",
        };
        let trim_close = rest.starts_with('-') && rest[1..].starts_with(close);
        if trim_close || rest.starts_with(close) {
            let kind = match markup.delimiter {
                Delimiter::Variable => TokenKind::VariableClose { trim: trim_close },
                Delimiter::Tag => TokenKind::TagClose { trim: trim_close },
            };
            self.state = if markup.opens_raw {
                State::Verbatim {
                    raw_offset: markup.open_offset,
                    raw_line: markup.open_line,
                }
            } else {
                State::Text { after_close: true }
            };
            return Ok(self.take(kind, close.len() + trim_close as usize));
        }

        let token = self.lex_markup_token(rest)?;
        if markup.first_token {
            markup.first_token = false;
            markup.opens_raw = markup.delimiter == Delimiter::Tag && token.is_identifier("raw");
        }
        self.state = State::Markup(markup);
        Ok(token)
    }

    fn lex_markup_token(&mut self, rest: &'s str) -> Result<Token<'s>, LexError> {
        let bytes = rest.as_bytes();
        let first = bytes[0];

        if first == b'\'' || first == b'"' {
            return match rest[1..].find(first as char) {
                Some(end) => Ok(self.take(TokenKind::StringLiteral, end + 2)),
                None => {
                    let (offset, line) = (self.pos, self.line);
                    Err(self.fail(
                        LexErrorKind::UnterminatedString,
                        offset,
                        line,
                        "unterminated string literal".to_string(),
                    ))
                }
            };
        }

        let starts_number = first.is_ascii_digit()
            || (first == b'-' && bytes.get(1).is_some_and(u8::is_ascii_digit));
        if starts_number {
            let mut len = 1 + digits(&bytes[1..]);
            if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
                len += 1 + digits(&bytes[len + 1..]);
            }
            return Ok(self.take(TokenKind::NumberLiteral, len));
        }

        if first.is_ascii_alphabetic() || first == b'_' {
            let mut len = 1;
            while let Some(&b) = bytes.get(len) {
                let continues = b.is_ascii_alphanumeric()
                    || b == b'_'
                    || (b == b'-' && !is_trim_close(&rest[len..]));
                if !continues {
                    break;
                }
                len += 1;
            }
            if bytes.get(len) == Some(&b'?') {
                len += 1;
            }
            return Ok(self.take(TokenKind::Identifier, len));
        }

        if TWO_CHAR_OPERATORS.iter().any(|op| rest.starts_with(op)) {
            return Ok(self.take(TokenKind::Operator, 2));
        }
        if ONE_CHAR_OPERATORS.as_bytes().contains(&first) {
            return Ok(self.take(TokenKind::Operator, 1));
        }

        let ch = rest.chars().next().unwrap_or_default();
        let (offset, line) = (self.pos, self.line);
        Err(self.fail(
            LexErrorKind::UnexpectedCharacter,
            offset,
            line,
            format!("unexpected character '{ch}'"),
        ))
    }

    fn lex_verbatim(&mut self, raw_offset: usize, raw_line: usize) -> Result<Token<'s>, LexError> {
        match find_endraw(self.rest()) {
            Some(n) => {
                self.state = State::Text { after_close: false };
                Ok(self.take(TokenKind::Raw, n))
            }
            None => Err(self.fail(
                LexErrorKind::UnterminatedRaw,
                raw_offset,
                raw_line,
                "'raw' tag was never closed with 'endraw'".to_string(),
            )),
        }
    }
}

impl<'s> Iterator for Lexer<'s> {
    type Item = Result<Token<'s>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(match self.state {
            State::Finished => return None,
            State::Text { after_close } => self.lex_text(after_close),
            State::Markup(markup) => self.lex_markup(markup),
            State::Verbatim {
                raw_offset,
                raw_line,
            } => self.lex_verbatim(raw_offset, raw_line),
        })
    }
}

/// Tokenize the whole source eagerly. Stops at the first error.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, LexError> {
    Lexer::new(source).collect()
}

fn find_open_delimiter(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(i) = s[from..].find('{') {
        let at = from + i;
        if matches!(bytes.get(at + 1), Some(b'{') | Some(b'%')) {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

/// Offset of the `{%` that starts a `{% endraw %}` tag, allowing trim
/// dashes and whitespace inside the delimiters.
fn find_endraw(s: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(i) = s[from..].find("{%") {
        let at = from + i;
        let mut inner = &s[at + 2..];
        inner = inner.strip_prefix('-').unwrap_or(inner);
        inner = inner.trim_start_matches(is_whitespace);
        if let Some(after) = inner.strip_prefix("endraw") {
            let after = after.trim_start_matches(is_whitespace);
            let after = after.strip_prefix('-').unwrap_or(after);
            if after.starts_with("%}") {
                return Some(at);
            }
        }
        from = at + 2;
    }
    None
}

fn is_trim_close(s: &str) -> bool {
    s.starts_with("-}}") || s.starts_with("-%}")
}

fn digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}
