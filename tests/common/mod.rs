#![allow(dead_code)]

//! Tag handlers and filters shared by the integration tests.

use std::collections::BTreeMap;

use liquid_lang::ast::{Expr, FilteredExpr};
use liquid_lang::{
    ClosureFilter, Context, Filter, Markup, ParseError, ParseOptions, Registry, RenderError,
    Renderer, Scope, SimpleContext, TagCall, TagHandler, TagState, Template, TrimMode, Value,
};

// ── if / elsif / else ───────────────────────────────────────────────────

pub struct IfTag;

impl TagHandler for IfTag {
    fn is_block(&self) -> bool {
        true
    }

    fn accepts_branch(&self, name: &str) -> bool {
        matches!(name, "elsif" | "else")
    }

    fn parse(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        let condition = markup.parse_expression()?;
        markup.expect_end()?;
        Ok(Box::new(condition))
    }

    fn parse_branch(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        let condition = if markup.name() == "elsif" {
            Some(markup.parse_expression()?)
        } else {
            None
        };
        markup.expect_end()?;
        Ok(Box::new(condition))
    }

    fn render(
        &self,
        call: &TagCall<'_>,
        renderer: &mut Renderer<'_>,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let condition: &Expr = call.state()?;
        if renderer.evaluate(condition, &*ctx)?.is_truthy() {
            if let Some(body) = call.body {
                renderer.render_nodes(body, ctx, out)?;
            }
            return Ok(());
        }

        for branch in call.branches {
            let taken = match branch.state::<Option<Expr>>() {
                Some(Some(condition)) => renderer.evaluate(condition, &*ctx)?.is_truthy(),
                Some(None) => true,
                None => return Err(RenderError::handler("if", "branch without state")),
            };
            if taken {
                return renderer.render_nodes(&branch.body, ctx, out);
            }
        }
        Ok(())
    }
}

// ── for ... in ... / else ───────────────────────────────────────────────

pub struct ForState {
    variable: String,
    collection: Expr,
}

pub struct ForTag;

impl TagHandler for ForTag {
    fn is_block(&self) -> bool {
        true
    }

    fn accepts_branch(&self, name: &str) -> bool {
        name == "else"
    }

    fn parse(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        let variable = markup.expect_identifier()?.to_string();
        if !markup.consume_identifier("in") {
            return Err(markup.error("expected 'in'"));
        }
        let collection = markup.parse_expression()?;
        markup.expect_end()?;
        Ok(Box::new(ForState {
            variable,
            collection,
        }))
    }

    fn render(
        &self,
        call: &TagCall<'_>,
        renderer: &mut Renderer<'_>,
        ctx: &mut dyn Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let state: &ForState = call.state()?;
        let items = renderer.evaluate(&state.collection, &*ctx)?.into_items();

        if items.is_empty() {
            if let Some(branch) = call.branches.first() {
                renderer.render_nodes(&branch.body, ctx, out)?;
            }
            return Ok(());
        }

        let Some(body) = call.body else {
            return Ok(());
        };
        let mut items = items.peekable();
        let mut index = 0i64;
        while let Some(item) = items.next() {
            renderer.count_iteration()?;
            index += 1;
            let last = items.peek().is_none();
            let mut scope = Scope::new(&mut *ctx);
            scope.bind(&state.variable, item);
            scope.bind(
                "forloop",
                [
                    ("index", Value::Int(index)),
                    ("first", Value::Bool(index == 1)),
                    ("last", Value::Bool(last)),
                ]
                .into_iter()
                .collect::<Value>(),
            );
            renderer.render_nodes(body, &mut scope, out)?;
        }
        Ok(())
    }
}

// ── capture / assign / comment ──────────────────────────────────────────

pub struct CaptureTag;

impl TagHandler for CaptureTag {
    fn is_block(&self) -> bool {
        true
    }

    fn is_blank(&self) -> bool {
        true
    }

    fn parse(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        let name = markup.expect_identifier()?.to_string();
        markup.expect_end()?;
        Ok(Box::new(name))
    }

    fn render(
        &self,
        call: &TagCall<'_>,
        renderer: &mut Renderer<'_>,
        ctx: &mut dyn Context,
        _out: &mut String,
    ) -> Result<(), RenderError> {
        let name: &String = call.state()?;
        let mut captured = String::new();
        if let Some(body) = call.body {
            renderer.render_nodes(body, ctx, &mut captured)?;
        }
        ctx.assign(name, Value::String(captured));
        Ok(())
    }
}

pub struct AssignTag;

impl TagHandler for AssignTag {
    fn is_blank(&self) -> bool {
        true
    }

    fn parse(&self, markup: &mut Markup<'_>) -> Result<TagState, ParseError> {
        let name = markup.expect_identifier()?.to_string();
        markup.expect_operator("=")?;
        let value = markup.parse_filtered()?;
        markup.expect_end()?;
        Ok(Box::new((name, value)))
    }

    fn render(
        &self,
        call: &TagCall<'_>,
        renderer: &mut Renderer<'_>,
        ctx: &mut dyn Context,
        _out: &mut String,
    ) -> Result<(), RenderError> {
        let (name, value): &(String, FilteredExpr) = call.state()?;
        let value = renderer.evaluate_filtered(value, &*ctx)?;
        ctx.assign(name, value);
        Ok(())
    }
}

pub struct CommentTag;

impl TagHandler for CommentTag {
    fn is_block(&self) -> bool {
        true
    }

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

// ── Filters ─────────────────────────────────────────────────────────────

/// `truncate: length, ellipsis: '...'`
pub struct Truncate;

impl Filter for Truncate {
    fn apply(
        &self,
        input: Value,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value, RenderError> {
        let length = args
            .first()
            .and_then(Value::as_int)
            .ok_or_else(|| RenderError::handler("truncate", "expected a length"))?;
        let text = input.to_output_string();
        if text.chars().count() as i64 <= length {
            return Ok(Value::String(text));
        }
        let mut truncated: String = text.chars().take(length.max(0) as usize).collect();
        match kwargs.get("ellipsis") {
            Some(ellipsis) => ellipsis.write_output(&mut truncated),
            None => truncated.push_str("..."),
        }
        Ok(Value::String(truncated))
    }
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_tag("if", IfTag);
    registry.register_tag("for", ForTag);
    registry.register_tag("capture", CaptureTag);
    registry.register_tag("assign", AssignTag);
    registry.register_tag("comment", CommentTag);

    registry.register_filter(
        "upcase",
        ClosureFilter::new(|input, _| Ok(Value::String(input.to_output_string().to_uppercase()))),
    );
    registry.register_filter(
        "append",
        ClosureFilter::new(|input, args| {
            let mut text = input.to_output_string();
            for arg in args {
                arg.write_output(&mut text);
            }
            Ok(Value::String(text))
        }),
    );
    registry.register_filter("truncate", Truncate);
    registry
}

pub fn parse(source: &str) -> Template {
    Template::parse(source, &registry(), &ParseOptions::default()).expect("parse failed")
}

pub fn parse_legacy(source: &str) -> Template {
    let options = ParseOptions::new().trim_mode(TrimMode::LegacyCompatible);
    Template::parse(source, &registry(), &options).expect("parse failed")
}

pub fn render(source: &str, ctx: &mut SimpleContext) -> String {
    parse(source).render(ctx).expect("render failed")
}

pub fn render_empty(source: &str) -> String {
    render(source, &mut SimpleContext::new())
}
