//! Template rendering.
//!
//! The [`Renderer`] walks an immutable node tree depth first and appends
//! to an output buffer. Literal and raw nodes are copied verbatim, output
//! nodes are evaluated and coerced to text, and tag/block nodes are handed
//! to their [`TagHandler`](crate::TagHandler) together with the renderer
//! itself, so a handler can render its body as often as it likes and
//! against whatever [`Context`] it chooses.
//!
//! All per-render counters live in the `Renderer`; the tree is never
//! mutated, which is what lets one template render on many threads.

use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::ast::expr::*;
use crate::ast::node::{Node, NodeKind, Nodelist};
use crate::ast::value::Value;
use crate::error::{RenderError, RenderErrorKind};
use crate::registry::TagCall;

mod context;

pub use context::{Context, Scope, SimpleContext};

// ── Render options ──────────────────────────────────────────────────────

/// How the renderer reacts to a failing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ErrorMode {
    /// Abort the render; partial output is discarded.
    #[default]
    Strict,
    /// Render the failing node as empty text, record the error and go on.
    /// Resource-limit errors still abort.
    Lax,
}

/// Turns an output value into text.
pub type Coerce = fn(&Value, &mut String);

/// Configuration for error handling and resource limits during a render.
///
/// Create with [`RenderOptions::new()`] and chain builder methods:
///
/// ```rust
/// use liquid_lang::{ErrorMode, RenderOptions};
///
/// let opts = RenderOptions::new()
///     .error_mode(ErrorMode::Lax)
///     .strict_variables(true)
///     .max_node_renders(10_000)
///     .max_iterations(1_000)
///     .max_output_len(64 * 1024);
/// ```
#[derive(Clone)]
pub struct RenderOptions {
    pub error_mode: ErrorMode,

    /// When `true`, looking up a variable or path that does not exist is
    /// an [`UndefinedVariable`](RenderErrorKind::UndefinedVariable) error
    /// instead of nil.
    pub strict_variables: bool,

    /// Maximum number of nodes rendered before the render fails with a
    /// [`ResourceLimit`](RenderErrorKind::ResourceLimit) error. `None`
    /// means unlimited.
    pub max_node_renders: Option<u64>,

    /// Maximum number of loop iterations reported by handlers through
    /// [`Renderer::count_iteration`]. `None` means unlimited.
    pub max_iterations: Option<u64>,

    /// Maximum length, in bytes, of any buffer the renderer writes to.
    /// `None` means unlimited.
    pub max_output_len: Option<usize>,

    /// Coercion applied to the value of every `{{ ... }}`.
    pub coerce: Coerce,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::default(),
            strict_variables: false,
            max_node_renders: None,
            max_iterations: None,
            max_output_len: None,
            coerce: Value::write_output,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub fn max_node_renders(mut self, limit: u64) -> Self {
        self.max_node_renders = Some(limit);
        self
    }

    pub fn max_iterations(mut self, limit: u64) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    pub fn max_output_len(mut self, limit: usize) -> Self {
        self.max_output_len = Some(limit);
        self
    }

    /// Replace the output coercion.
    ///
    /// ```rust
    /// use liquid_lang::{RenderOptions, Value};
    ///
    /// fn show_nil(value: &Value, out: &mut String) {
    ///     match value {
    ///         Value::Nil => out.push_str("(nil)"),
    ///         other => other.write_output(out),
    ///     }
    /// }
    ///
    /// let opts = RenderOptions::new().coerce(show_nil);
    /// ```
    pub fn coerce(mut self, coerce: Coerce) -> Self {
        self.coerce = coerce;
        self
    }
}

impl std::fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOptions")
            .field("error_mode", &self.error_mode)
            .field("strict_variables", &self.strict_variables)
            .field("max_node_renders", &self.max_node_renders)
            .field("max_iterations", &self.max_iterations)
            .field("max_output_len", &self.max_output_len)
            .finish_non_exhaustive()
    }
}

// ── Renderer ────────────────────────────────────────────────────────────

/// Per-render state: options, limit counters, and errors recovered in
/// lax mode.
pub struct Renderer<'o> {
    options: &'o RenderOptions,
    node_count: u64,
    iteration_count: u64,
    errors: Vec<RenderError>,
}

impl<'o> Renderer<'o> {
    pub fn new(options: &'o RenderOptions) -> Self {
        Self {
            options,
            node_count: 0,
            iteration_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn options(&self) -> &'o RenderOptions {
        self.options
    }

    /// Render every node of `nodes` in order.
    pub fn render_nodes(
        &mut self,
        nodes: &Nodelist,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(node, ctx, out)?;
        }
        Ok(())
    }

    fn render_node(
        &mut self,
        node: &Node,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        self.check_node_limit()?;

        let mark = out.len();
        let result = match self.render_node_kind(node, ctx, out) {
            Ok(()) => self.check_output_len(out),
            Err(err) => Err(err.or_span(node.span)),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if self.options.error_mode == ErrorMode::Lax && !err.is_fatal() => {
                out.truncate(mark);
                warn!(
                    kind = ?err.kind,
                    start = node.span.start,
                    end = node.span.end,
                    "render error recovered: {err}"
                );
                self.errors.push(err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn render_node_kind(
        &mut self,
        node: &Node,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match &node.node {
            NodeKind::Literal(text) | NodeKind::Raw(text) => {
                out.push_str(text);
                Ok(())
            }
            NodeKind::Output(expr) => {
                let value = self.evaluate_filtered(expr, &*ctx)?;
                (self.options.coerce)(&value, out);
                Ok(())
            }
            NodeKind::Tag(tag) => {
                trace!(tag = %tag.name, "rendering tag");
                let call = TagCall {
                    name: &tag.name,
                    markup: &tag.markup,
                    span: node.span,
                    body: None,
                    branches: &[],
                    state: &*tag.state,
                };
                tag.handler.render(&call, self, ctx, out)
            }
            NodeKind::Block(block) => {
                trace!(tag = %block.name, branches = block.branches.len(), "rendering block");
                let call = TagCall {
                    name: &block.name,
                    markup: &block.markup,
                    span: node.span,
                    body: Some(&block.body),
                    branches: &block.branches,
                    state: &*block.state,
                };
                block.handler.render(&call, self, ctx, out)
            }
        }
    }

    // ── Limits ──────────────────────────────────────────────────────────

    fn check_node_limit(&mut self) -> Result<(), RenderError> {
        self.node_count += 1;

        if let Some(max) = self.options.max_node_renders
            && self.node_count > max
        {
            return Err(RenderError::new(
                RenderErrorKind::ResourceLimit,
                format!("render exceeded maximum of {max} node renders"),
            ));
        }

        Ok(())
    }

    fn check_output_len(&self, out: &str) -> Result<(), RenderError> {
        if let Some(max) = self.options.max_output_len
            && out.len() > max
        {
            return Err(RenderError::new(
                RenderErrorKind::ResourceLimit,
                format!("render exceeded maximum output length of {max} bytes"),
            ));
        }
        Ok(())
    }

    /// Record one loop iteration. Looping tag handlers call this once per
    /// pass over their body so that `max_iterations` applies to them.
    pub fn count_iteration(&mut self) -> Result<(), RenderError> {
        self.iteration_count += 1;

        if let Some(max) = self.options.max_iterations
            && self.iteration_count > max
        {
            return Err(RenderError::new(
                RenderErrorKind::ResourceLimit,
                format!("render exceeded maximum of {max} loop iterations"),
            ));
        }

        Ok(())
    }

    pub fn nodes_rendered(&self) -> u64 {
        self.node_count
    }

    /// Errors recovered so far in lax mode.
    pub fn errors(&self) -> &[RenderError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<RenderError> {
        self.errors
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Evaluate an expression against `ctx`.
    pub fn evaluate(&self, expr: &Expr, ctx: &dyn Context) -> Result<Value, RenderError> {
        match &expr.node {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Lookup(lookup) => self
                .evaluate_lookup(lookup, ctx)
                .map_err(|e| e.or_span(expr.span)),
            ExprKind::Range { start, end } => {
                let start = self.evaluate_bound(start, ctx)?;
                let end = self.evaluate_bound(end, ctx)?;
                Ok(Value::Range(start, end))
            }
        }
    }

    fn evaluate_bound(&self, expr: &Expr, ctx: &dyn Context) -> Result<i64, RenderError> {
        let value = self.evaluate(expr, ctx)?;
        let bound = match &value {
            Value::Nil => Some(0),
            Value::String(s) => s.trim().parse().ok(),
            Value::Float(f) => Value::Float(f.trunc()).as_int(),
            other => other.as_int(),
        };
        bound.ok_or_else(|| {
            RenderError::type_error("an integer range bound", value.type_name()).with_span(expr.span)
        })
    }

    fn evaluate_lookup(&self, lookup: &Lookup, ctx: &dyn Context) -> Result<Value, RenderError> {
        let name = match &lookup.root {
            LookupRoot::Name(name) => name.clone(),
            LookupRoot::Dynamic(key) => self.evaluate(key, ctx)?.to_output_string(),
        };

        let Some(mut value) = ctx.resolve(&name) else {
            return self.missing(&name);
        };

        let mut path = name;
        for segment in &lookup.path {
            let key = match segment {
                PathSegment::Key(key) => {
                    path.push('.');
                    path.push_str(key);
                    Value::String(key.clone())
                }
                PathSegment::Index(expr) => {
                    let key = self.evaluate(expr, ctx)?;
                    path.push('[');
                    key.write_output(&mut path);
                    path.push(']');
                    key
                }
            };
            value = match value.lookup(&key) {
                Some(next) => next,
                None => return self.missing(&path),
            };
        }

        Ok(value)
    }

    fn missing(&self, path: &str) -> Result<Value, RenderError> {
        if self.options.strict_variables {
            Err(RenderError::undefined_variable(path))
        } else {
            Ok(Value::Nil)
        }
    }

    /// Evaluate an expression and run it through its filter pipeline.
    ///
    /// An unregistered filter is an error in strict mode. In lax mode it
    /// is recorded and the value passes through unchanged.
    pub fn evaluate_filtered(
        &mut self,
        expr: &FilteredExpr,
        ctx: &dyn Context,
    ) -> Result<Value, RenderError> {
        let mut value = self.evaluate(&expr.expr, ctx)?;

        for call in &expr.filters {
            let Some(filter) = &call.filter else {
                let err = RenderError::unknown_filter(&call.name);
                if self.options.error_mode == ErrorMode::Lax {
                    warn!(filter = %call.name, "unknown filter passed through");
                    self.errors.push(err);
                    continue;
                }
                return Err(err);
            };

            let args = call
                .args
                .iter()
                .map(|arg| self.evaluate(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            let mut kwargs = BTreeMap::new();
            for (key, arg) in &call.kwargs {
                kwargs.insert(key.clone(), self.evaluate(arg, ctx)?);
            }

            value = filter.apply(value, &args, &kwargs)?;
        }

        Ok(value)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
