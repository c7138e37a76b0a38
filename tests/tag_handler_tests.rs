mod common;

use common::{parse, registry, render, render_empty};
use liquid_lang::ast::NodeKind;
use liquid_lang::{
    ClosureTag, CompileError, Context, ErrorMode, ParseErrorKind, ParseOptions, RenderError,
    RenderErrorKind, RenderOptions, SimpleContext, Template, UnknownTags, Value,
};

fn parse_error(source: &str) -> liquid_lang::ParseError {
    match Template::parse(source, &registry(), &ParseOptions::default()) {
        Err(CompileError::Parse(err)) => err,
        other => panic!("expected a parse error, got {other:?}"),
    }
}

fn shop_context() -> SimpleContext {
    let mut ctx = SimpleContext::new();
    ctx.set("title", "Shop");
    ctx.set("products", vec!["apple", "pear", "fig"]);
    ctx.set("empty", Vec::<Value>::new());
    ctx.set("in_stock", true);
    ctx
}

// ── Block tags and branches ─────────────────────────────────────────────

#[test]
fn test_if_else_branches() {
    let mut ctx = shop_context();
    assert_eq!(render("{% if in_stock %}yes{% else %}no{% endif %}", &mut ctx), "yes");
    assert_eq!(render("{% if missing %}yes{% else %}no{% endif %}", &mut ctx), "no");
    assert_eq!(
        render("{% if missing %}a{% elsif title %}b{% else %}c{% endif %}", &mut ctx),
        "b"
    );
}

#[test]
fn test_for_loop_with_scope() {
    let mut ctx = shop_context();
    assert_eq!(
        render("{% for p in products %}{{ forloop.index }}.{{ p }} {% endfor %}", &mut ctx),
        "1.apple 2.pear 3.fig "
    );
    // The loop variable does not leak out of the loop.
    assert_eq!(render("{% for p in products %}{% endfor %}[{{ p }}]", &mut ctx), "[]");
}

#[test]
fn test_for_else_on_empty_collection() {
    let mut ctx = shop_context();
    assert_eq!(render("{% for p in empty %}x{% else %}none{% endfor %}", &mut ctx), "none");
}

#[test]
fn test_nested_blocks() {
    let mut ctx = shop_context();
    let source = "{% for p in products %}{% if forloop.last %}{{ p | upcase }}{% else %}{{ p }},{% endif %}{% endfor %}";
    assert_eq!(render(source, &mut ctx), "apple,pear,FIG");
}

#[test]
fn test_assign_inside_loop_reaches_outer_context() {
    let mut ctx = shop_context();
    let out = render(
        "{% for p in products %}{% assign last_seen = p %}{% endfor %}{{ last_seen }}",
        &mut ctx,
    );
    assert_eq!(out, "fig");
    assert_eq!(ctx.resolve("last_seen"), Some(Value::from("fig")));
}

#[test]
fn test_capture_renders_body_into_variable() {
    let mut ctx = shop_context();
    let out = render(
        "{% capture greeting %}Hello {{ title }}{% endcapture %}[{{ greeting | upcase }}]",
        &mut ctx,
    );
    assert_eq!(out, "[HELLO SHOP]");
}

#[test]
fn test_comment_body_is_not_rendered() {
    assert_eq!(render_empty("a{% comment %}{{ 'hidden' }}{% endcomment %}b"), "ab");
}

#[test]
fn test_branches_are_exposed_on_block_nodes() {
    let template = parse("{% if a %}1{% elsif b %}2{% else %}3{% endif %}");
    match &template.root().nodes[0].node {
        NodeKind::Block(block) => {
            let names: Vec<_> = block.branches.iter().map(|b| b.name.as_str()).collect();
            assert_eq!(names, vec!["elsif", "else"]);
            assert_eq!(block.branches[0].markup, "b");
        }
        other => panic!("expected a block, got {other:?}"),
    }
}

#[test]
fn test_blank_bodies() {
    let template = parse("{% assign x = 1 %}\n  {% capture y %}text{% endcapture %}\n");
    assert!(template.root().is_blank());
    assert!(!parse("{% if a %}x{% endif %}").root().is_blank());
}

// ── Raw ─────────────────────────────────────────────────────────────────

#[test]
fn test_raw_outputs_markup_verbatim() {
    assert_eq!(
        render_empty("{% raw %}{{ not_a_var }} {% if %}{% endraw %}"),
        "{{ not_a_var }} {% if %}"
    );
    assert_eq!(render_empty("{% raw %}{% endraw %}"), "");
}

#[test]
fn test_raw_without_endraw_fails() {
    match Template::parse("{% raw %}oops", &registry(), &ParseOptions::default()) {
        Err(CompileError::Lex(err)) => assert_eq!(err.line, 1),
        other => panic!("expected a lex error, got {other:?}"),
    }
}

// ── Filters ─────────────────────────────────────────────────────────────

#[test]
fn test_filter_positional_and_keyword_arguments() {
    let mut ctx = shop_context();
    ctx.set("text", "Hello, world");
    assert_eq!(render("{{ text | truncate: 5 }}", &mut ctx), "Hello...");
    assert_eq!(render("{{ text | truncate: 5, ellipsis: '!' }}", &mut ctx), "Hello!");
    assert_eq!(render("{{ title | append: '-', 2 | upcase }}", &mut ctx), "SHOP-2");
}

#[test]
fn test_filter_error_aborts_in_strict_mode() {
    let template = parse("before {{ 'x' | truncate }} after");
    let err = template.render(&mut SimpleContext::new()).unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::Handler);
    assert!(err.message.contains("truncate"));
}

// ── Parse errors ────────────────────────────────────────────────────────

#[test]
fn test_unknown_tag_is_error_by_default() {
    let err = parse_error("a\n{% frobnicate %}");
    assert_eq!(err.kind, ParseErrorKind::UnknownTag);
    assert_eq!(err.tag.as_deref(), Some("frobnicate"));
    assert_eq!(err.line, 2);
}

#[test]
fn test_unknown_tag_ignored_renders_nothing() {
    let options = ParseOptions::new().unknown_tags(UnknownTags::Ignore);
    let template = Template::parse("a{% frobnicate x y %}b", &registry(), &options).unwrap();
    assert_eq!(template.render(&mut SimpleContext::new()).unwrap(), "ab");
}

#[test]
fn test_unclosed_block_names_the_tag() {
    let err = parse_error("{% for p in products %}\n{% if x %}");
    assert_eq!(err.kind, ParseErrorKind::UnclosedBlock);
    assert_eq!(err.tag.as_deref(), Some("if"));
    assert_eq!(err.line, 2);
    assert!(err.message.contains("if"));
}

#[test]
fn test_mismatched_end_tag() {
    let err = parse_error("{% for p in products %}{% if x %}{% endfor %}");
    assert_eq!(err.kind, ParseErrorKind::MismatchedEnd);
}

#[test]
fn test_branch_outside_block_is_unknown() {
    let err = parse_error("{% else %}");
    assert_eq!(err.kind, ParseErrorKind::UnknownTag);
}

#[test]
fn test_handler_syntax_error_carries_tag_name() {
    let err = parse_error("{% for p products %}{% endfor %}");
    assert_eq!(err.kind, ParseErrorKind::Syntax);
    assert_eq!(err.tag.as_deref(), Some("for"));
    let formatted = err.format_with_source("{% for p products %}{% endfor %}", None);
    assert!(formatted.contains("expected 'in'"));
}

// ── Render errors and options ───────────────────────────────────────────

#[test]
fn test_lax_mode_recovers_and_reports() {
    let template = parse("a{{ 'x' | truncate }}b{{ y | nope }}c");
    let options = RenderOptions::new().error_mode(ErrorMode::Lax);
    let mut out = String::new();
    let errors = template
        .render_to(&mut SimpleContext::new(), &options, &mut out)
        .unwrap();
    assert_eq!(out, "abc");
    let kinds: Vec<_> = errors.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![RenderErrorKind::Handler, RenderErrorKind::UnknownFilter]);
}

#[test]
fn test_lax_mode_discards_partial_block_output() {
    let mut registry = registry();
    registry.register_tag(
        "explode",
        ClosureTag::new(|_, _, out| {
            out.push_str("partial");
            Err(RenderError::handler("explode", "boom"))
        }),
    );
    let template = Template::parse("1{% explode %}2", &registry, &ParseOptions::default()).unwrap();

    let lax = RenderOptions::new().error_mode(ErrorMode::Lax);
    assert_eq!(template.render_with_options(&mut SimpleContext::new(), &lax).unwrap(), "12");

    let err = template.render(&mut SimpleContext::new()).unwrap_err();
    assert_eq!(err.span.map(|s| s.start), Some(1));
}

#[test]
fn test_strict_variables() {
    let template = parse("{% if in_stock %}{{ price }}{% endif %}");
    let options = RenderOptions::new().strict_variables(true);
    let err = template
        .render_with_options(&mut shop_context(), &options)
        .unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::UndefinedVariable);
    assert_eq!(template.render(&mut shop_context()).unwrap(), "");
}

#[test]
fn test_iteration_limit_is_fatal_even_in_lax_mode() {
    let template = parse("{% for i in (1..100) %}{{ i }}{% endfor %}");
    let options = RenderOptions::new().max_iterations(10).error_mode(ErrorMode::Lax);
    let err = template
        .render_with_options(&mut SimpleContext::new(), &options)
        .unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::ResourceLimit);
    assert!(err.is_fatal());
}

#[test]
fn test_iteration_limit_stops_huge_range() {
    let template = parse("{% for i in (1..1000000000000) %}{{ i }}{% endfor %}");
    let options = RenderOptions::new().max_iterations(10);
    let err = template
        .render_with_options(&mut SimpleContext::new(), &options)
        .unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::ResourceLimit);
}

#[test]
fn test_wide_range_size_from_context() {
    let mut ctx = SimpleContext::new();
    ctx.set("r", Value::Range(0, i64::MAX));
    ctx.set("all", Value::Range(i64::MIN, i64::MAX));
    assert_eq!(
        render("{{ r.size }} {{ all.size }}", &mut ctx),
        format!("{0} {0}", i64::MAX)
    );
}

#[test]
fn test_wide_integer_literal_renders_as_float() {
    assert_eq!(render_empty("{{ 99999999999999999999 }}"), "100000000000000000000.0");
}

#[test]
fn test_output_limit() {
    let template = parse("{% for i in (1..1000) %}xxxxxxxxxx{% endfor %}");
    let options = RenderOptions::new().max_output_len(100);
    let err = template
        .render_with_options(&mut SimpleContext::new(), &options)
        .unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::ResourceLimit);
}

#[test]
fn test_closure_tag_sees_markup_and_context() {
    let mut registry = registry();
    registry.register_tag(
        "shout",
        ClosureTag::new(|markup, ctx, out| {
            let value = ctx.resolve(markup.trim()).unwrap_or(Value::Nil);
            out.push_str(&value.to_output_string().to_uppercase());
            Ok(())
        }),
    );
    let mut ctx = shop_context();
    let out = liquid_lang::render("{% shout title %}!", &mut ctx, &registry).unwrap();
    assert_eq!(out, "SHOP!");
}

// ── Sharing ─────────────────────────────────────────────────────────────

#[test]
fn test_concurrent_renders_share_nothing() {
    let template = parse("{% for i in (1..n) %}{{ i }}{% endfor %}|{{ name }}");

    std::thread::scope(|s| {
        let handles: Vec<_> = (1..=8i64)
            .map(|n| {
                let template = &template;
                s.spawn(move || {
                    let mut ctx = SimpleContext::new();
                    ctx.set("n", n);
                    ctx.set("name", format!("t{n}"));
                    template.render(&mut ctx).unwrap()
                })
            })
            .collect();

        for (n, handle) in (1..=8i64).zip(handles) {
            let expected: String = (1..=n).map(|i| i.to_string()).collect();
            assert_eq!(handle.join().unwrap(), format!("{expected}|t{n}"));
        }
    });
}

#[test]
fn test_repeated_renders_are_identical() {
    let template = parse("{% capture c %}{{ title }}{% endcapture %}{{ c }}{{ c }}");
    let first = template.render(&mut shop_context()).unwrap();
    let second = template.render(&mut shop_context()).unwrap();
    assert_eq!(first, "ShopShop");
    assert_eq!(first, second);
}
