//! Tag and filter registration.
//!
//! The [`Registry`] maps tag names to [`TagHandler`]s and filter names to
//! [`Filter`]s. The host populates it before parsing; the parser only
//! borrows it immutably, so it is read-only for the lifetime of every
//! template compiled against it.
//!
//! There are two ways to register a callable:
//!
//! - **Closure-based**: [`ClosureTag`] and [`ClosureFilter`] cover simple
//!   inline tags and positional-argument filters.
//! - **Trait-based**: implement [`TagHandler`] or [`Filter`] directly for
//!   block tags, custom argument grammars, or keyword arguments.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::ast::node::{Branch, Nodelist};
use crate::ast::span::Span;
use crate::ast::value::Value;
use crate::error::{ParseError, RenderError, RenderErrorKind};
use crate::parser::Markup;
use crate::render::{Context, Renderer};

/// Opaque per-node state produced by [`TagHandler::parse`].
pub type TagState = Box<dyn Any + Send + Sync>;

// ── Trait definitions ───────────────────────────────────────────────────

/// The parse/render pair behind a tag name.
///
/// `parse` runs once per occurrence of the tag while the template is
/// compiled and returns whatever state the tag needs later. `render` runs
/// on every render of the template and receives that state back through
/// the [`TagCall`].
///
/// Block tags (`is_block` returns `true`) own a body up to
/// `{% end<name> %}`. A block may also declare branch tags such as `else`
/// through `accepts_branch`; each branch tag starts a new [`Branch`] of the
/// block.
pub trait TagHandler: Send + Sync {
    fn is_block(&self) -> bool {
        false
    }

    /// Whether `name` is an intermediate tag of this block (e.g. `else`).
    fn accepts_branch(&self, _name: &str) -> bool {
        false
    }

    /// Whether the tag renders nothing but whitespace.
    fn is_blank(&self) -> bool {
        false
    }

    fn parse(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError>;

    /// Parse the markup of a branch tag. The default accepts branches
    /// without arguments.
    fn parse_branch(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        markup.expect_end()?;
        Ok(Box::new(()))
    }

    fn render(
        &self,
        call: &TagCall<'_>,
        renderer: &mut Renderer<'_>,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError>;
}

/// A filter applied with `{{ value | name: arg, key: value }}`.
pub trait Filter: Send + Sync {
    fn apply(
        &self,
        input: Value,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value, RenderError>;
}

/// Everything a handler sees about the node being rendered.
pub struct TagCall<'a> {
    pub name: &'a str,
    pub markup: &'a str,
    pub span: Span,
    /// The block body, for block tags.
    pub body: Option<&'a Nodelist>,
    /// Branches of a block tag, in source order.
    pub branches: &'a [Branch],
    pub(crate) state: &'a (dyn Any + Send + Sync),
}

impl<'a> TagCall<'a> {
    /// Downcast the state this handler returned from `parse`.
    pub fn state<T: 'static>(&self) -> Result<&'a T, RenderError> {
        self.state.downcast_ref().ok_or_else(|| {
            RenderError::new(
                RenderErrorKind::StateMismatch,
                format!("'{}' was rendered with state of an unexpected type", self.name),
            )
            .with_span(self.span)
        })
    }
}

// ── Registry ────────────────────────────────────────────────────────────

/// Stores tag handlers and filters for use during parsing.
///
/// ```rust
/// use liquid_lang::{ClosureFilter, ClosureTag, Registry, Value};
///
/// let mut registry = Registry::new();
///
/// registry.register_tag("hr", ClosureTag::new(|_markup, _ctx, out| {
///     out.push_str("<hr>");
///     Ok(())
/// }));
/// registry.register_filter("upcase", ClosureFilter::new(|input, _args| {
///     Ok(Value::String(input.to_output_string().to_uppercase()))
/// }));
/// ```
#[derive(Default, Clone)]
pub struct Registry {
    tags: HashMap<String, Arc<dyn TagHandler>>,
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag. If a tag with the same name already exists, it is
    /// replaced. `raw` is handled by the parser itself and cannot be
    /// overridden.
    pub fn register_tag(&mut self, name: impl Into<String>, handler: impl TagHandler + 'static) {
        self.tags.insert(name.into(), Arc::new(handler));
    }

    /// Register a filter. If a filter with the same name already exists,
    /// it is replaced.
    pub fn register_filter(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn tag(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.tags.get(name).cloned()
    }

    pub fn filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Registered tag names, sorted.
    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort_unstable();
        f.debug_struct("Registry")
            .field("tags", &self.tag_names())
            .field("filters", &filters)
            .finish()
    }
}

// ── Closure-based convenience wrappers ──────────────────────────────────

/// A non-block [`TagHandler`] backed by a closure.
///
/// The closure receives the tag's argument text, the active context and
/// the output buffer. Tags that need parsed arguments, a body, or access
/// to the renderer should implement [`TagHandler`] directly.
///
/// ```rust
/// use liquid_lang::{ClosureTag, Value};
///
/// let tag = ClosureTag::new(|markup, ctx, out| {
///     let value = ctx.resolve(markup.trim()).unwrap_or(Value::Nil);
///     out.push_str(&format!("[{value}]"));
///     Ok(())
/// });
/// ```
pub struct ClosureTag<F>
where
    F: Fn(&str, &mut dyn Context, &mut String) -> Result<(), RenderError> + Send + Sync,
{
    func: F,
}

impl<F> ClosureTag<F>
where
    F: Fn(&str, &mut dyn Context, &mut String) -> Result<(), RenderError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> TagHandler for ClosureTag<F>
where
    F: Fn(&str, &mut dyn Context, &mut String) -> Result<(), RenderError> + Send + Sync,
{
    fn parse(&self, _markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        Ok(Box::new(()))
    }

    fn render(
        &self,
        call: &TagCall<'_>,
        _renderer: &mut Renderer<'_>,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        (self.func)(call.markup, ctx, out)
    }
}

/// A [`Filter`] backed by a closure over the input and positional
/// arguments. Keyword arguments are not passed to closure filters.
///
/// ```rust
/// use liquid_lang::{ClosureFilter, Value};
///
/// let append = ClosureFilter::new(|input, args| {
///     let mut s = input.to_output_string();
///     for arg in args {
///         s.push_str(&arg.to_output_string());
///     }
///     Ok(Value::String(s))
/// });
/// ```
pub struct ClosureFilter<F>
where
    F: Fn(Value, &[Value]) -> Result<Value, RenderError> + Send + Sync,
{
    func: F,
}

impl<F> ClosureFilter<F>
where
    F: Fn(Value, &[Value]) -> Result<Value, RenderError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Filter for ClosureFilter<F>
where
    F: Fn(Value, &[Value]) -> Result<Value, RenderError> + Send + Sync,
{
    fn apply(
        &self,
        input: Value,
        args: &[Value],
        _kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value, RenderError> {
        (self.func)(input, args)
    }
}
