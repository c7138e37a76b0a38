//! Error types for lexing, parsing and rendering.
//!
//! [`LexError`] and [`ParseError`] are fatal to a parse and are wrapped in
//! [`CompileError`]. [`RenderError`] is produced during rendering and can
//! originate from the renderer, a tag handler, a filter, or the host's
//! [`Context`](crate::Context). [`Error`] joins both phases for the
//! one-shot [`render`](crate::render) helper.

use crate::ast::span::Span;
use std::sync::Arc;
use thiserror::Error;

// ── Lex errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("{message} (line {line})")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub offset: usize,
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedTag,
    UnterminatedVariable,
    UnterminatedString,
    UnterminatedRaw,
    UnexpectedCharacter,
}

impl LexError {
    pub fn new(kind: LexErrorKind, offset: usize, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            line,
            message: message.into(),
        }
    }
}

// ── Parse errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// The tag being parsed when the error occurred, if any.
    pub tag: Option<String>,
    pub span: Span,
    pub line: usize,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnknownTag,
    /// An end tag that does not close the innermost open block.
    MismatchedEnd,
    /// End of input reached with a block still open.
    UnclosedBlock,
    /// A tag delimiter with no tag name inside it.
    MissingTagName,
    /// Malformed expression or tag arguments.
    Syntax,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            tag: None,
            span,
            line,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context for display
    pub fn format_with_source(&self, source: &str, template_name: Option<&str>) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let source_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");

        let location = if let Some(name) = template_name {
            format!(" --> {name}:{line}:{col}")
        } else {
            format!(" --> {line}:{col}")
        };

        let pointer = " ".repeat(col.saturating_sub(1)) + &"^".repeat(self.span.len().max(1));

        let mut output = format!(
            "Error: {}\n{location}\n  |\n{line:>3} | {source_line}\n    | {pointer}",
            self.message
        );

        if let Some(hint) = &self.hint {
            output.push_str(&format!("\n  = hint: {hint}"));
        }

        output
    }
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Failure to turn source text into a [`Template`](crate::Template).
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CompileError {
    /// Byte offset the error points at.
    pub fn offset(&self) -> usize {
        match self {
            CompileError::Lex(e) => e.offset,
            CompileError::Parse(e) => e.span.start,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            CompileError::Lex(e) => e.line,
            CompileError::Parse(e) => e.line,
        }
    }
}

// ── Render errors ───────────────────────────────────────────────────────

/// An error that occurs while rendering a template.
///
/// Carries a structured [`RenderErrorKind`], a human-readable message,
/// an optional source [`Span`], and an optional underlying error cause.
///
/// # Error chaining
///
/// A tag handler or filter that wraps a lower-level failure can keep the
/// original error chain with [`with_source`](RenderError::with_source):
///
/// ```rust
/// use liquid_lang::RenderError;
///
/// fn example() -> Result<(), RenderError> {
///     let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "partial missing");
///     Err(RenderError::handler("include", "failed to load partial").with_source(io_err))
/// }
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub span: Option<Span>,
    pub message: String,
    /// The underlying error that caused this render error, if any.
    ///
    /// Wrapped in `Arc` so that `RenderError` remains `Clone`.
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl RenderError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            span: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a span only if the error does not already point somewhere
    /// more specific.
    pub(crate) fn or_span(self, span: Span) -> Self {
        if self.span.is_none() {
            self.with_span(span)
        } else {
            self
        }
    }

    /// Attach an underlying error cause to this render error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    // Convenience constructors for common error types

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(
            RenderErrorKind::UndefinedVariable,
            format!("undefined variable: {name}"),
        )
    }

    pub fn unknown_filter(name: &str) -> Self {
        Self::new(
            RenderErrorKind::UnknownFilter,
            format!("undefined filter: {name}"),
        )
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(
            RenderErrorKind::TypeError,
            format!("expected {expected}, got {got}"),
        )
    }

    /// An error raised by a tag handler or filter.
    pub fn handler(name: &str, message: impl Into<String>) -> Self {
        Self::new(
            RenderErrorKind::Handler,
            format!("{name}: {}", message.into()),
        )
    }

    /// Resource-limit errors abort a render even in lax mode.
    pub fn is_fatal(&self) -> bool {
        self.kind == RenderErrorKind::ResourceLimit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    UndefinedVariable,
    UnknownFilter,
    TypeError,
    /// Raised by a tag handler or filter.
    Handler,
    /// A tag handler was given node state of an unexpected type.
    StateMismatch,
    /// The render exceeded a configured limit (node renders, loop
    /// iterations or output length).
    ResourceLimit,
}

// ── Combined ────────────────────────────────────────────────────────────

/// Combined error type returned by [`render`](crate::render).
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
