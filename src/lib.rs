//! # liquid-lang
//!
//! A parse-once/render-many engine for Liquid-style templates. Source text
//! mixes literal text with `{{ output }}` markup, `{% tag %}` markup and
//! `{% raw %}...{% endraw %}` sections; trim dashes (`{{-`, `-%}`) strip
//! adjacent whitespace.
//!
//! The crate is split into two layers:
//!
//! - **The engine** (lexing, parsing, whitespace control, the node tree and
//!   rendering) lives here and knows no tags of its own besides `raw`.
//! - **The host** registers [`TagHandler`]s and [`Filter`]s in a
//!   [`Registry`] and supplies variables through a [`Context`].
//!
//! ## Quick start
//!
//! ```rust
//! use liquid_lang::{render, Registry, SimpleContext};
//!
//! let mut ctx = SimpleContext::new();
//! ctx.set("name", "Alice");
//!
//! let registry = Registry::new();
//! let output = render("Hello, {{ name }}!", &mut ctx, &registry).unwrap();
//! assert_eq!(output, "Hello, Alice!");
//! ```
//!
//! ## Compiled templates
//!
//! Parse once with [`Template::parse`] and render against as many
//! contexts as needed, from as many threads as needed:
//!
//! ```rust
//! use liquid_lang::{ParseOptions, Registry, SimpleContext, Template};
//!
//! let registry = Registry::new();
//! let template = Template::parse("HP: {{ hp -}}  \n", &registry, &ParseOptions::default()).unwrap();
//!
//! let mut ctx = SimpleContext::new();
//! ctx.set("hp", 100i64);
//! assert_eq!(template.render(&mut ctx).unwrap(), "HP: 100");
//!
//! ctx.set("hp", 75i64);
//! assert_eq!(template.render(&mut ctx).unwrap(), "HP: 75");
//! ```
//!
//! ## Render options
//!
//! Use [`RenderOptions`] for lax error handling and resource limits:
//!
//! ```rust
//! use liquid_lang::{ErrorMode, ParseOptions, Registry, RenderOptions, SimpleContext, Template};
//!
//! let registry = Registry::new();
//! let template = Template::parse("a{{ x | missing }}b", &registry, &ParseOptions::default()).unwrap();
//!
//! let opts = RenderOptions::new().error_mode(ErrorMode::Lax).max_node_renders(1_000);
//! let mut out = String::new();
//! let errors = template.render_to(&mut SimpleContext::new(), &opts, &mut out).unwrap();
//! assert_eq!(out, "ab");
//! assert_eq!(errors.len(), 1);
//! ```

use tracing::debug;

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod render;

pub use ast::node::Nodelist;
pub use ast::span::{Span, Spanned};
pub use ast::value::{Items, Value};
pub use error::{
    CompileError, Error, LexError, LexErrorKind, ParseError, ParseErrorKind, RenderError,
    RenderErrorKind,
};
pub use parser::{Markup, ParseOptions, TrimMode, TrimStrategy, UnknownTags};
pub use registry::{ClosureFilter, ClosureTag, Filter, Registry, TagCall, TagHandler, TagState};
pub use render::{Coerce, Context, ErrorMode, RenderOptions, Renderer, Scope, SimpleContext};

/// A compiled template.
///
/// The tree is immutable once parsed. Rendering keeps all of its state in
/// a per-call [`Renderer`], so a `Template` can be shared across threads
/// and rendered concurrently with independent contexts.
#[derive(Debug)]
pub struct Template {
    root: Nodelist,
}

impl Template {
    /// Compile source text against the tags and filters in `registry`.
    pub fn parse(
        source: &str,
        registry: &Registry,
        options: &ParseOptions,
    ) -> Result<Self, CompileError> {
        let root = parser::parse(source, registry, options)?;
        Ok(Self { root })
    }

    /// The document nodelist, for inspection.
    pub fn root(&self) -> &Nodelist {
        &self.root
    }

    /// Render with default options.
    pub fn render(&self, ctx: &mut dyn Context) -> Result<String, RenderError> {
        self.render_with_options(ctx, &RenderOptions::default())
    }

    pub fn render_with_options(
        &self,
        ctx: &mut dyn Context,
        options: &RenderOptions,
    ) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render_to(ctx, options, &mut out)?;
        Ok(out)
    }

    /// Render, appending to `out`.
    ///
    /// On success returns the errors that lax mode recovered from (always
    /// empty in strict mode). On failure `out` is left as it was.
    pub fn render_to(
        &self,
        ctx: &mut dyn Context,
        options: &RenderOptions,
        out: &mut String,
    ) -> Result<Vec<RenderError>, RenderError> {
        let mut renderer = Renderer::new(options);
        let mut buf = String::new();
        if let Err(err) = renderer.render_nodes(&self.root, ctx, &mut buf) {
            debug!(
                kind = ?err.kind,
                nodes = renderer.nodes_rendered(),
                "render aborted: {err}"
            );
            return Err(err);
        }

        debug!(
            nodes = renderer.nodes_rendered(),
            output_len = buf.len(),
            recovered = renderer.errors().len(),
            "rendered template"
        );
        out.push_str(&buf);
        Ok(renderer.into_errors())
    }
}

/// Compile source text into a [`Template`].
pub fn parse(
    source: &str,
    registry: &Registry,
    options: &ParseOptions,
) -> Result<Template, CompileError> {
    Template::parse(source, registry, options)
}

/// Parse source text and render it in a single step with default options.
///
/// For repeated rendering of the same source, prefer [`Template`] to avoid
/// re-parsing.
pub fn render(source: &str, ctx: &mut dyn Context, registry: &Registry) -> Result<String, Error> {
    let template = Template::parse(source, registry, &ParseOptions::default())?;
    Ok(template.render(ctx)?)
}
