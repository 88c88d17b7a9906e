//! Mixin matching, guards, variadics, and expansion semantics.

use less::{compile_with_session, Options, Session};
use pretty_assertions::assert_eq;

fn compile_str(source: &str) -> String {
    compile_with_session(source, &Options::default(), &Session::new_for_test_suite())
        .unwrap()
        .css
}

#[test]
fn guards_select_the_matching_overload() {
    let css = compile_str(
        ".m(@x) when (@x > 1) { kind: big; }\n\
         .m(@x) when (@x =< 1) { kind: small; }\n\
         .a { .m(2); }\n\
         .b { .m(1); }",
    );

    assert_eq!(
        css,
        ".a {\n  kind: big;\n}\n.b {\n  kind: small;\n}\n"
    );
}

#[test]
fn default_fires_when_nothing_else_matches() {
    let css = compile_str(
        ".m(@x) when (@x > 1) { kind: big; }\n\
         .m(@x) when (default()) { kind: fallback; }\n\
         .a { .m(5); }\n\
         .b { .m(0); }",
    );

    assert_eq!(
        css,
        ".a {\n  kind: big;\n}\n.b {\n  kind: fallback;\n}\n"
    );
}

#[test]
fn variadic_parameters_collect_the_rest() {
    let css = compile_str(
        ".m(@first, @rest...) { first: @first; rest: @rest; all: @arguments; }\n\
         .x { .m(1, 2, 3); }",
    );

    assert_eq!(
        css,
        ".x {\n  first: 1;\n  rest: 2 3;\n  all: 1 2 3;\n}\n"
    );
}

#[test]
fn pattern_parameters_match_literally() {
    let css = compile_str(
        ".m(dark) { color: black; }\n\
         .m(light) { color: white; }\n\
         .a { .m(dark); }",
    );

    assert_eq!(css, ".a {\n  color: black;\n}\n");
}

#[test]
fn named_arguments_bind_out_of_order() {
    let css = compile_str(
        ".m(@a: 1, @b: 2) { pair: @a @b; }\n\
         .x { .m(@b: 5); }",
    );

    assert_eq!(css, ".x {\n  pair: 1 5;\n}\n");
}

#[test]
fn important_call_marks_every_declaration() {
    let css = compile_str(".m() { color: red; width: 1px; } .a { .m() !important; }");

    assert_eq!(
        css,
        ".a {\n  color: red !important;\n  width: 1px !important;\n}\n"
    );
}

#[test]
fn namespaced_mixins_resolve() {
    let css = compile_str("#ns { .m() { color: red; } } .a { #ns > .m(); }");
    assert_eq!(css, ".a {\n  color: red;\n}\n");
}

#[test]
fn plain_rulesets_can_be_called() {
    let css = compile_str(".base { color: red; } .a { .base; }");
    assert!(css.contains(".a {\n  color: red;\n}"), "css was: {css}");
}

#[test]
fn mixins_export_variables_to_the_caller() {
    let css = compile_str(".m() { @result: 42px; } .a { .m(); width: @result; }");
    assert_eq!(css, ".a {\n  width: 42px;\n}\n");
}

#[test]
fn caller_variables_are_not_overridden() {
    let css = compile_str(".m() { @x: mixin; } .a { @x: own; .m(); value: @x; }");
    assert_eq!(css, ".a {\n  value: own;\n}\n");
}

#[test]
fn no_matching_overload_is_an_error() {
    let err = compile_with_session(
        ".m(@a, @b) { } .x { .m(1); }",
        &Options::default(),
        &Session::new_for_test_suite(),
    )
    .unwrap_err();

    assert_eq!(err.kind, less::ErrorKind::Runtime);
}

#[test]
fn undefined_mixin_is_a_name_error() {
    let err = compile_with_session(
        ".x { .missing(); }",
        &Options::default(),
        &Session::new_for_test_suite(),
    )
    .unwrap_err();

    assert_eq!(err.kind, less::ErrorKind::Name);
}

#[test]
fn mixin_bodies_prefer_the_defining_scope() {
    let css = compile_str(
        "@color: blue;\n\
         .m() { color: @color; }\n\
         .a { @color: red; .m(); }",
    );

    // the captured defining frames sit above the call site in the chain
    assert_eq!(css, ".a {\n  color: blue;\n}\n");
}

#[test]
fn guards_can_use_type_predicates() {
    let css = compile_str(
        ".m(@x) when (iscolor(@x)) { kind: color; }\n\
         .m(@x) when (isnumber(@x)) { kind: number; }\n\
         .a { .m(#123456); }\n\
         .b { .m(7); }",
    );

    assert_eq!(css, ".a {\n  kind: color;\n}\n.b {\n  kind: number;\n}\n");
}

#[test]
fn detached_ruleset_argument_expands() {
    let css = compile_str(
        ".wrap(@content) { @media print { @content(); } }\n\
         .a { .wrap({ color: black; }); }",
    );

    assert!(
        css.contains("@media print {\n  .a {\n    color: black;\n  }\n}"),
        "css was: {css}"
    );
}
