//! End-to-end compilations of the core language features.

use less::{compile_with_session, MathMode, Options, Session};
use pretty_assertions::assert_eq;

fn compile_str(source: &str) -> String {
    compile_with_session(source, &Options::default(), &Session::new_for_test_suite())
        .unwrap()
        .css
}

fn compile_with(source: &str, options: &Options) -> String {
    compile_with_session(source, options, &Session::new_for_test_suite())
        .unwrap()
        .css
}

#[test]
fn variable_substitution() {
    assert_eq!(
        compile_str("@c: red; .a { color: @c; }"),
        ".a {\n  color: red;\n}\n"
    );
}

#[test]
fn nested_rulesets_join() {
    assert_eq!(
        compile_str(".p { .c { color: red; } }"),
        ".p .c {\n  color: red;\n}\n"
    );
}

#[test]
fn parent_selector_suffix() {
    assert_eq!(
        compile_str(".a { &:hover { color: red; } }"),
        ".a:hover {\n  color: red;\n}\n"
    );
}

#[test]
fn basic_extend() {
    assert_eq!(
        compile_str(".a { color: red; } .b:extend(.a) { font: 1px; }"),
        ".a,\n.b {\n  color: red;\n}\n.b {\n  font: 1px;\n}\n"
    );
}

#[test]
fn mixin_with_default_argument() {
    assert_eq!(
        compile_str(".m(@x: 2px) { width: @x; } .r { .m(); .m(5px); }"),
        ".r {\n  width: 2px;\n  width: 5px;\n}\n"
    );
}

#[test]
fn strict_parens_leaves_bare_math() {
    let options = Options {
        math: MathMode::Parens,
        ..Options::default()
    };

    assert_eq!(
        compile_with(".a { w: 2px + 3px; }", &options),
        ".a {\n  w: 2px + 3px;\n}\n"
    );

    assert_eq!(
        compile_with(".a { w: (2px + 3px); }", &options),
        ".a {\n  w: 5px;\n}\n"
    );
}

#[test]
fn extend_reaches_into_media() {
    let css = compile_str(
        ".a { color: red; }\n\
         @media print { .a { font: 1px; } }\n\
         .b:extend(.a) { background: blue; }",
    );

    assert!(css.contains(".a,\n.b {\n  color: red;\n}"), "css was: {css}");
    assert!(
        css.contains("@media print {\n  .a,\n  .b {\n    font: 1px;\n  }\n}"),
        "css was: {css}"
    );
    assert!(css.contains(".b {\n  background: blue;\n}"), "css was: {css}");
}

#[test]
fn media_nesting_inside_ruleset() {
    assert_eq!(
        compile_str(".a { @media screen { color: red; } }"),
        "@media screen {\n  .a {\n    color: red;\n  }\n}\n"
    );
}

#[test]
fn nested_media_features_combine() {
    let css = compile_str("@media screen { @media (min-width: 768px) { .a { color: red; } } }");
    assert!(
        css.contains("@media screen and (min-width: 768px)"),
        "css was: {css}"
    );
}

#[test]
fn compressed_output() {
    let options = Options {
        compress: true,
        ..Options::default()
    };

    assert_eq!(
        compile_with("@c: red; .a { color: @c; margin: 0px; }", &options),
        ".a{color:red;margin:0}"
    );
}

#[test]
fn comments_survive_pretty_output() {
    let css = compile_str("/* keep me */ .a { color: red; }");
    assert!(css.contains("/* keep me */"), "css was: {css}");
}

#[test]
fn line_comments_are_dropped() {
    let css = compile_str("// gone\n.a { color: red; }");
    assert!(!css.contains("gone"));
}

#[test]
fn empty_rulesets_are_elided() {
    assert_eq!(compile_str(".a { } .b { color: red; }"), ".b {\n  color: red;\n}\n");
}

#[test]
fn selector_groups_stay_ordered() {
    assert_eq!(
        compile_str(".a, .b { color: red; }"),
        ".a,\n.b {\n  color: red;\n}\n"
    );
}

#[test]
fn guarded_selector_filters_output() {
    let css = compile_str("@dark: true; .a when (@dark) { color: black; } .b when (not (@dark)) { color: white; }");
    assert!(css.contains(".a"), "css was: {css}");
    assert!(!css.contains(".b"), "css was: {css}");
}

#[test]
fn interpolated_selectors_resolve() {
    assert_eq!(
        compile_str("@name: header; .@{name} { color: red; }"),
        ".header {\n  color: red;\n}\n"
    );
}

#[test]
fn interpolated_property_names_resolve() {
    assert_eq!(
        compile_str("@side: left; .a { margin-@{side}: 4px; }"),
        ".a {\n  margin-left: 4px;\n}\n"
    );
}

#[test]
fn declaration_merging() {
    assert_eq!(
        compile_str(".a { transition+: color; transition+: opacity; }"),
        ".a {\n  transition: color, opacity;\n}\n"
    );
}

#[test]
fn detached_ruleset_invocation() {
    assert_eq!(
        compile_str("@dr: { color: red; }; .a { @dr(); }"),
        ".a {\n  color: red;\n}\n"
    );
}

#[test]
fn at_rules_pass_through() {
    let css = compile_str("@charset \"utf-8\";\n.a { color: red; }");
    assert!(css.starts_with("@charset \"utf-8\";"), "css was: {css}");
}

#[test]
fn font_shorthand_division_is_preserved() {
    assert_eq!(
        compile_str(".a { font: 12px/1.5 sans-serif; }"),
        ".a {\n  font: 12px/1.5 sans-serif;\n}\n"
    );
}

#[test]
fn properties_at_root_are_rejected() {
    let err = compile_with_session(
        "color: red;",
        &Options::default(),
        &Session::new_for_test_suite(),
    )
    .unwrap_err();

    assert_eq!(err.kind, less::ErrorKind::Syntax);
}

#[test]
fn url_rewriting_and_url_args() {
    let options = Options {
        url_args: Some("v=1".to_string()),
        ..Options::default()
    };
    assert_eq!(
        compile_with(".a { background: url(\"img/x.png\"); }", &options),
        ".a {\n  background: url(\"img/x.png?v=1\");\n}\n"
    );

    let options = Options {
        rewrite_urls: less::RewriteUrls::All,
        rootpath: "assets/".to_string(),
        ..Options::default()
    };
    assert_eq!(
        compile_with(".a { background: url(\"img/x.png\"); }", &options),
        ".a {\n  background: url(\"assets/img/x.png\");\n}\n"
    );
}

#[test]
fn output_is_deterministic() {
    let source = "@c: #336699; .a { color: @c; .b:hover { width: (1px + 2px) * 3; } }";
    let options = Options::default();
    let first = compile_with(source, &options);
    let second = compile_with(source, &options);
    assert_eq!(first, second);
}
