//! Extend matching, chaining, and `all` mode.

use less::{compile_with_session, Options, Session};
use pretty_assertions::assert_eq;

fn compile_str(source: &str) -> String {
    compile_with_session(source, &Options::default(), &Session::new_for_test_suite())
        .unwrap()
        .css
}

#[test]
fn exact_mode_requires_the_whole_selector() {
    let css = compile_str(
        ".a { color: red; }\n\
         .a.b { color: green; }\n\
         .c:extend(.a) { }",
    );

    // `.a` matches, the compound `.a.b` does not
    assert!(css.contains(".a,\n.c {\n  color: red;\n}"), "css was: {css}");
    assert!(css.contains(".a.b {\n  color: green;\n}"), "css was: {css}");
    assert!(!css.contains(".a.b,"), "css was: {css}");
}

#[test]
fn all_mode_matches_anywhere() {
    let css = compile_str(
        ".x .a { color: red; }\n\
         .c:extend(.a all) { }",
    );

    assert_eq!(css, ".x .a,\n.x .c {\n  color: red;\n}\n");
}

#[test]
fn amp_extend_applies_to_every_selector() {
    let css = compile_str(
        ".a { color: red; }\n\
         .b { &:extend(.a); font: 1px; }",
    );

    assert!(css.contains(".a,\n.b {\n  color: red;\n}"), "css was: {css}");
}

#[test]
fn extends_chain_transitively() {
    let css = compile_str(
        ".a { color: red; }\n\
         .b:extend(.a) { }\n\
         .c:extend(.b) { }",
    );

    assert_eq!(css, ".a,\n.b,\n.c {\n  color: red;\n}\n");
}

#[test]
fn multi_element_targets_match_combinators() {
    let css = compile_str(
        ".a > .b { color: red; }\n\
         .c:extend(.a > .b all) { }",
    );

    assert!(css.contains(".c"), "css was: {css}");

    let css = compile_str(
        ".a .b { color: red; }\n\
         .c:extend(.a > .b all) { }",
    );

    // descendant vs child combinator: no match
    assert!(!css.contains(".c"), "css was: {css}");
}

#[test]
fn unmatched_extend_is_not_an_error() {
    let css = compile_str(".b:extend(.missing) { color: red; }");
    assert_eq!(css, ".b {\n  color: red;\n}\n");
}

#[test]
fn attribute_selectors_compare_structurally() {
    let css = compile_str(
        "[data-kind=\"x\"] { color: red; }\n\
         .c:extend([data-kind=\"x\"]) { }",
    );

    assert!(css.contains(".c"), "css was: {css}");
}

#[test]
fn extended_paths_are_deduplicated() {
    let css = compile_str(
        ".a { color: red; }\n\
         .b:extend(.a) { }\n\
         .b:extend(.a) { }",
    );

    // two identical extends produce one extra path
    let first = css.find(".b").unwrap();
    let rest = &css[first + 2..];
    assert!(!rest.contains(".b,"), "css was: {css}");
}

#[test]
fn extend_into_multiple_targets() {
    let css = compile_str(
        ".a { color: red; }\n\
         .b { width: 1px; }\n\
         .c { &:extend(.a, .b); }",
    );

    assert!(css.contains(".a,\n.c"), "css was: {css}");
    assert!(css.contains(".b,\n.c"), "css was: {css}");
}
