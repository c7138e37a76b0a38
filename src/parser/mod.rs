//! Template parser.
//!
//! Consumes the [`Lexer`]'s token stream and builds the node tree. Block
//! nesting is tracked with an explicit stack of open blocks; the document
//! itself is the bottom of that stack. Tag names are dispatched to the
//! [`TagHandler`]s in the [`Registry`].
//!
//! Whitespace trimming happens here, as nodes are emitted:
//!
//! - an open delimiter with a trim dash (`{{-`, `{%-`) trims the end of
//!   the last node of the current nodelist, if that node is a literal;
//! - a close delimiter with a trim dash (`-}}`, `-%}`) sets a pending
//!   flag that trims the start of the next literal token.
//!
//! Literals emptied by trimming are dropped from the tree.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::ast::expr::FilteredExpr;
use crate::ast::node::*;
use crate::ast::span::{Span, Spanned};
use crate::error::{CompileError, ParseError, ParseErrorKind, RenderError};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::registry::{Registry, TagCall, TagHandler, TagState};
use crate::render::{Context, Renderer};

mod markup;
mod trim;

pub use markup::Markup;
pub use trim::{LegacyTrim, StandardTrim, TrimMode, TrimStrategy};

// ── Parse options ───────────────────────────────────────────────────────

/// What the parser does with a tag name that has no registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum UnknownTags {
    /// Fail the parse with [`ParseErrorKind::UnknownTag`].
    #[default]
    Error,
    /// Keep a node that renders nothing.
    Ignore,
}

/// Configuration for compiling a template.
///
/// ```rust
/// use liquid_lang::{ParseOptions, TrimMode, UnknownTags};
///
/// let opts = ParseOptions::new()
///     .trim_mode(TrimMode::LegacyCompatible)
///     .unknown_tags(UnknownTags::Ignore);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ParseOptions {
    pub trim_mode: TrimMode,
    pub unknown_tags: UnknownTags,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trim_mode(mut self, mode: TrimMode) -> Self {
        self.trim_mode = mode;
        self
    }

    pub fn unknown_tags(mut self, policy: UnknownTags) -> Self {
        self.unknown_tags = policy;
        self
    }
}

/// Parse source text into the document nodelist.
pub(crate) fn parse(
    source: &str,
    registry: &Registry,
    options: &ParseOptions,
) -> Result<Nodelist, CompileError> {
    let root = Parser::new(source, registry, options).run()?;
    debug!(
        nodes = root.len(),
        trim_mode = ?options.trim_mode,
        "parsed template"
    );
    Ok(root)
}

// ── Parser state ────────────────────────────────────────────────────────

struct OpenBlock<'s> {
    name: &'s str,
    markup: &'s str,
    handler: Arc<dyn TagHandler>,
    state: TagState,
    span: Span,
    line: usize,
    body: Nodelist,
    branches: Vec<Branch>,
}

impl OpenBlock<'_> {
    fn nodes_mut(&mut self) -> &mut Vec<Node> {
        match self.branches.last_mut() {
            Some(branch) => &mut branch.body.nodes,
            None => &mut self.body.nodes,
        }
    }
}

/// The tag name and argument tokens between `{%` and `%}`.
struct TagParts<'s> {
    name: Token<'s>,
    args: Vec<Token<'s>>,
    markup: &'s str,
    span: Span,
    close_trim: bool,
}

struct Parser<'s, 'r> {
    source: &'s str,
    lexer: Lexer<'s>,
    registry: &'r Registry,
    options: &'r ParseOptions,
    trim: &'static dyn TrimStrategy,
    root: Nodelist,
    stack: Vec<OpenBlock<'s>>,
    /// Set by a `-}}`/`-%}`; consumed by the next literal token.
    trim_next_literal: bool,
}

impl<'s, 'r> Parser<'s, 'r> {
    fn new(source: &'s str, registry: &'r Registry, options: &'r ParseOptions) -> Self {
        Self {
            source,
            lexer: Lexer::new(source),
            registry,
            options,
            trim: options.trim_mode.strategy(),
            root: Nodelist::new(),
            stack: Vec::new(),
            trim_next_literal: false,
        }
    }

    fn run(mut self) -> Result<Nodelist, CompileError> {
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::Text => self.push_literal(token),
                TokenKind::VariableOpen { trim } => {
                    self.trim_before(trim);
                    self.parse_output(token)?;
                }
                TokenKind::TagOpen { trim } => {
                    self.trim_before(trim);
                    self.parse_tag(token)?;
                }
                TokenKind::Eof => break,
                _ => {
                    return Err(ParseError::new(
                        ParseErrorKind::Syntax,
                        token.span,
                        token.line,
                        format!("unexpected {}", token.describe()),
                    )
                    .into());
                }
            }
        }

        if let Some(open) = self.stack.pop() {
            return Err(ParseError::new(
                ParseErrorKind::UnclosedBlock,
                open.span,
                open.line,
                format!("'{}' tag was never closed", open.name),
            )
            .with_tag(open.name)
            .with_hint(format!("add {{% end{} %}}", open.name))
            .into());
        }

        Ok(self.root)
    }

    fn next_token(&mut self) -> Result<Token<'s>, CompileError> {
        match self.lexer.next() {
            Some(token) => Ok(token?),
            None => Ok(Token {
                kind: TokenKind::Eof,
                lexeme: "",
                span: Span::point(self.source.len()),
                line: self.lexer.line(),
            }),
        }
    }

    fn current_nodes(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(open) => open.nodes_mut(),
            None => &mut self.root.nodes,
        }
    }

    fn push_node(&mut self, kind: NodeKind, span: Span) {
        self.current_nodes().push(Spanned::new(kind, span));
    }

    // ── Trimming ────────────────────────────────────────────────────────

    fn push_literal(&mut self, token: Token<'s>) {
        let mut text = token.lexeme;
        if std::mem::take(&mut self.trim_next_literal) {
            text = self.trim.trim_start(text);
        }
        if text.is_empty() {
            return;
        }
        let span = Span::new(token.span.end - text.len(), token.span.end);
        self.push_node(NodeKind::Literal(text.to_string()), span);
    }

    /// Apply a trim dash on an open delimiter to the preceding literal.
    fn trim_before(&mut self, requested: bool) {
        if !requested {
            return;
        }
        let strategy = self.trim;
        let nodes = self.current_nodes();
        let mut emptied = false;
        if let Some(last) = nodes.last_mut()
            && let NodeKind::Literal(text) = &mut last.node
        {
            strategy.trim_end(text);
            last.span.end = last.span.start + text.len();
            emptied = text.is_empty();
            trace!(remaining = text.len(), "trimmed preceding literal");
        }
        if emptied {
            nodes.pop();
        }
    }

    // ── Outputs ─────────────────────────────────────────────────────────

    fn parse_output(&mut self, open: Token<'s>) -> Result<(), CompileError> {
        let (tokens, close) = self.collect_markup()?;
        let span = open.span.merge(close.span);

        if !tokens.is_empty() {
            let text = markup_text(self.source, &tokens);
            let mut markup = Markup::new("", text, tokens, span, open.line, self.registry);
            let expr: FilteredExpr = markup.parse_filtered()?;
            markup.expect_end()?;
            self.push_node(NodeKind::Output(expr), span);
        }

        self.trim_next_literal = matches!(close.kind, TokenKind::VariableClose { trim: true });
        Ok(())
    }

    /// Read body tokens up to and including the closing delimiter.
    fn collect_markup(&mut self) -> Result<(Vec<Token<'s>>, Token<'s>), CompileError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::TagClose { .. } | TokenKind::VariableClose { .. } => {
                    return Ok((tokens, token));
                }
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        ParseErrorKind::Syntax,
                        token.span,
                        token.line,
                        "unexpected end of input inside markup",
                    )
                    .into());
                }
                _ => tokens.push(token),
            }
        }
    }

    // ── Tags ────────────────────────────────────────────────────────────

    fn read_tag(&mut self, open: Token<'s>) -> Result<TagParts<'s>, CompileError> {
        let (tokens, close) = self.collect_markup()?;
        let span = open.span.merge(close.span);
        let close_trim = matches!(close.kind, TokenKind::TagClose { trim: true });

        let mut tokens = tokens.into_iter();
        let name = match tokens.next() {
            Some(token) if token.kind == TokenKind::Identifier => token,
            Some(token) => {
                return Err(ParseError::new(
                    ParseErrorKind::MissingTagName,
                    token.span,
                    token.line,
                    format!("expected a tag name, found {}", token.describe()),
                )
                .into());
            }
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::MissingTagName,
                    span,
                    open.line,
                    "tag has no name",
                )
                .into());
            }
        };
        let args: Vec<_> = tokens.collect();
        let markup = markup_text(self.source, &args);

        Ok(TagParts {
            name,
            args,
            markup,
            span,
            close_trim,
        })
    }

    fn parse_tag(&mut self, open: Token<'s>) -> Result<(), CompileError> {
        let parts = self.read_tag(open)?;
        let name = parts.name.lexeme;
        trace!(tag = name, line = parts.name.line, "dispatching tag");

        if name == "raw" {
            return self.parse_raw(parts);
        }

        if let Some(block) = self.stack.last()
            && name.strip_prefix("end") == Some(block.name)
        {
            self.close_block(parts.span);
        } else if let Some(block) = self.stack.last()
            && block.handler.accepts_branch(name)
        {
            let handler = Arc::clone(&block.handler);
            let mut markup = markup_for(&parts, self.registry);
            let state = handler.parse_branch(&mut markup).map_err(|e| tagged(e, name))?;
            if let Some(block) = self.stack.last_mut() {
                block.branches.push(Branch {
                    name: name.to_string(),
                    markup: parts.markup.to_string(),
                    body: Nodelist::new(),
                    state,
                });
            }
        } else if let Some(handler) = self.registry.tag(name) {
            let mut markup = markup_for(&parts, self.registry);
            let state = handler.parse(&mut markup).map_err(|e| tagged(e, name))?;
            if handler.is_block() {
                self.stack.push(OpenBlock {
                    name,
                    markup: parts.markup,
                    handler,
                    state,
                    span: parts.span,
                    line: parts.name.line,
                    body: Nodelist::new(),
                    branches: Vec::new(),
                });
            } else {
                self.push_node(
                    NodeKind::Tag(TagNode {
                        name: name.to_string(),
                        markup: parts.markup.to_string(),
                        handler,
                        state,
                    }),
                    parts.span,
                );
            }
        } else {
            self.unknown_tag(&parts)?;
        }

        self.trim_next_literal = parts.close_trim;
        Ok(())
    }

    fn close_block(&mut self, end_span: Span) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        let span = open.span.merge(end_span);
        self.push_node(
            NodeKind::Block(BlockNode {
                name: open.name.to_string(),
                markup: open.markup.to_string(),
                body: open.body,
                branches: open.branches,
                handler: open.handler,
                state: open.state,
            }),
            span,
        );
    }

    fn unknown_tag(&mut self, parts: &TagParts<'s>) -> Result<(), CompileError> {
        let name = parts.name.lexeme;

        // An end tag for a known block that is not the innermost open one
        // is a nesting error regardless of the unknown-tag policy.
        if let Some(opened) = name.strip_prefix("end")
            && self.registry.tag(opened).is_some_and(|h| h.is_block())
        {
            let err = ParseError::new(
                ParseErrorKind::MismatchedEnd,
                parts.span,
                parts.name.line,
                format!("unexpected '{name}'"),
            )
            .with_tag(name);
            let err = match self.stack.last() {
                Some(open) => err.with_hint(format!(
                    "'{}' tag opened on line {} must be closed with 'end{}' first",
                    open.name, open.line, open.name
                )),
                None => err.with_hint(format!("no '{opened}' tag is open")),
            };
            return Err(err.into());
        }

        match self.options.unknown_tags {
            UnknownTags::Error => {
                let mut err = ParseError::new(
                    ParseErrorKind::UnknownTag,
                    parts.span,
                    parts.name.line,
                    format!("unknown tag '{name}'"),
                )
                .with_tag(name);
                if let Some(open) = self.stack.last() {
                    err = err.with_hint(format!(
                        "'{}' tag opened on line {} is still open",
                        open.name, open.line
                    ));
                }
                Err(err.into())
            }
            UnknownTags::Ignore => {
                warn!(tag = name, line = parts.name.line, "ignoring unknown tag");
                self.push_node(
                    NodeKind::Tag(TagNode {
                        name: name.to_string(),
                        markup: parts.markup.to_string(),
                        handler: Arc::new(IgnoredTag),
                        state: Box::new(()),
                    }),
                    parts.span,
                );
                Ok(())
            }
        }
    }

    // ── Raw ─────────────────────────────────────────────────────────────

    /// `{% raw %}` was read; the lexer is now positioned on the verbatim
    /// body, followed by the `{% endraw %}` tag.
    fn parse_raw(&mut self, parts: TagParts<'s>) -> Result<(), CompileError> {
        if let Some(extra) = parts.args.first() {
            return Err(ParseError::new(
                ParseErrorKind::Syntax,
                extra.span,
                extra.line,
                "'raw' does not take arguments",
            )
            .with_tag("raw")
            .into());
        }

        let body = self.next_token()?;
        if body.kind != TokenKind::Raw {
            return Err(ParseError::new(
                ParseErrorKind::UnclosedBlock,
                parts.span,
                parts.name.line,
                "'raw' tag was never closed",
            )
            .with_tag("raw")
            .into());
        }

        // The lexer only leaves verbatim mode at an `{% endraw %}`, so the
        // next tag is that end tag. Its trim dashes never touch the body.
        let end_open = self.next_token()?;
        let end = self.read_tag(end_open)?;

        self.push_node(
            NodeKind::Raw(body.lexeme.to_string()),
            parts.span.merge(end.span),
        );
        self.trim_next_literal = end.close_trim;
        Ok(())
    }
}

fn markup_for<'a>(parts: &TagParts<'a>, registry: &'a Registry) -> Markup<'a> {
    Markup::new(
        parts.name.lexeme,
        parts.markup,
        parts.args.clone(),
        parts.span,
        parts.name.line,
        registry,
    )
}

fn markup_text<'s>(source: &'s str, tokens: &[Token<'s>]) -> &'s str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &source[first.span.start..last.span.end],
        _ => "",
    }
}

fn tagged(err: ParseError, name: &str) -> ParseError {
    if err.tag.is_none() {
        err.with_tag(name)
    } else {
        err
    }
}

/// Stand-in handler for unknown tags under [`UnknownTags::Ignore`].
struct IgnoredTag;

impl TagHandler for IgnoredTag {
    fn is_blank(&self) -> bool {
        true
    }

    fn parse(&self, _markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        Ok(Box::new(()))
    }

    fn render(
        &self,
        _call: &TagCall<'_>,
        _renderer: &mut Renderer<'_>,
        _ctx: &mut dyn Context,
        _out: &mut String,
    ) -> Result<(), RenderError> {
        Ok(())
    }
}
