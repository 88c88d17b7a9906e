//! Built-in function coverage through the compile pipeline.

use less::{compile_with_session, Options, Session};
use pretty_assertions::assert_eq;

fn compile_str(source: &str) -> String {
    compile_with_session(source, &Options::default(), &Session::new_for_test_suite())
        .unwrap()
        .css
}

fn value_of(source: &str) -> String {
    let css = compile_str(source);
    css.split("v: ")
        .nth(1)
        .and_then(|rest| rest.split(";\n").next())
        .unwrap_or_else(|| panic!("no value in {css}"))
        .to_string()
}

#[test]
fn math_functions() {
    assert_eq!(value_of(".a { v: ceil(2.1px); }"), "3px");
    assert_eq!(value_of(".a { v: floor(2.9); }"), "2");
    assert_eq!(value_of(".a { v: round(2.45, 1); }"), "2.5");
    assert_eq!(value_of(".a { v: abs(-5em); }"), "5em");
    assert_eq!(value_of(".a { v: pow(2, 10); }"), "1024");
    assert_eq!(value_of(".a { v: mod(7px, 3); }"), "1px");
    assert_eq!(value_of(".a { v: percentage(0.25); }"), "25%");
}

#[test]
fn extrema_pass_through_on_mixed_units() {
    assert_eq!(value_of(".a { v: min(3px, 2px, 7px); }"), "2px");
    assert_eq!(value_of(".a { v: max(1cm, 12mm); }"), "12mm");

    // incomparable units: emit a native CSS min()
    assert_eq!(value_of(".a { v: min(10px, 5s); }"), "min(10px, 5s)");
}

#[test]
fn color_constructors() {
    assert_eq!(value_of(".a { v: rgb(255, 0, 0); }"), "#ff0000");
    assert_eq!(value_of(".a { v: rgba(255, 0, 0, 50%); }"), "rgba(255, 0, 0, 0.5)");
    assert_eq!(value_of(".a { v: hsl(120, 100%, 50%); }"), "#00ff00");
}

#[test]
fn color_channels() {
    assert_eq!(value_of(".a { v: red(#804020); }"), "128");
    assert_eq!(value_of(".a { v: hue(hsl(90, 100%, 50%)); }"), "90");
    assert_eq!(value_of(".a { v: alpha(rgba(0, 0, 0, 0.2)); }"), "0.2");
}

#[test]
fn color_operations() {
    assert_eq!(value_of(".a { v: darken(#ffffff, 50%); }"), "#808080");
    assert_eq!(value_of(".a { v: lighten(#000000, 100%); }"), "#ffffff");
    assert_eq!(value_of(".a { v: fade(#ff0000, 30%); }"), "rgba(255, 0, 0, 0.3)");
    assert_eq!(value_of(".a { v: mix(#000000, #ffffff, 50%); }"), "#808080");
    assert_eq!(value_of(".a { v: greyscale(#ff0000); }"), "#808080");
}

#[test]
fn contrast_picks_by_luma() {
    assert_eq!(value_of(".a { v: contrast(#ffffff); }"), "#000000");
    assert_eq!(value_of(".a { v: contrast(#000000); }"), "#ffffff");
}

#[test]
fn string_functions() {
    assert_eq!(value_of(".a { v: e(\"raw text\"); }"), "raw text");
    assert_eq!(
        value_of(".a { v: replace(\"a-b-c\", \"-\", \"+\", \"g\"); }"),
        "\"a+b+c\""
    );
    assert_eq!(
        value_of(".a { v: %(\"pos: %d %d\", 1px, 2px); }"),
        "\"pos: 1px 2px\""
    );
}

#[test]
fn list_functions() {
    assert_eq!(value_of("@l: 1px 2px 3px; .a { v: length(@l); }"), "3");
    assert_eq!(value_of("@l: a b c; .a { v: extract(@l, 2); }"), "b");
    assert_eq!(value_of(".a { v: range(3); }"), "1 2 3");
}

#[test]
fn each_instantiates_per_entry() {
    let css = compile_str("@sizes: 1 2; .g { each(@sizes, { s@{value}: @value; }) }");
    assert!(css.contains("s1: 1;"), "css was: {css}");
    assert!(css.contains("s2: 2;"), "css was: {css}");
}

#[test]
fn type_predicates_and_units() {
    assert_eq!(value_of(".a { v: isnumber(7); }"), "true");
    assert_eq!(value_of(".a { v: iscolor(#fff); }"), "true");
    assert_eq!(value_of(".a { v: ispixel(7px); }"), "true");
    assert_eq!(value_of(".a { v: isstring(\"x\"); }"), "true");
    assert_eq!(value_of(".a { v: unit(5px, em); }"), "5em");
    assert_eq!(value_of(".a { v: get-unit(5cm); }"), "cm");
    assert_eq!(value_of(".a { v: convert(1in, px); }"), "96px");
}

#[test]
fn logic_functions() {
    assert_eq!(value_of("@x: 5; .a { v: if((@x > 3), big, small); }"), "big");
    assert_eq!(value_of("@x: 1; .a { v: if((@x > 3), big, small); }"), "small");
    assert_eq!(value_of(".a { v: boolean(1 = 1); }"), "true");
    assert_eq!(value_of("@missing-check: isdefined(@nope); .a { v: @missing-check; }"), "false");
}

#[test]
fn unknown_functions_pass_through() {
    assert_eq!(
        value_of(".a { v: clamp(1rem, 2vw, 3rem); }"),
        "clamp(1rem, 2vw, 3rem)"
    );
}

#[test]
fn function_argument_errors_carry_position() {
    let err = compile_with_session(
        ".a { v: ceil(red); }",
        &Options::default(),
        &Session::new_for_test_suite(),
    )
    .unwrap_err();

    assert_eq!(err.kind, less::ErrorKind::Argument);
    assert!(err.line.is_some());
}
