//! Math modes, unit arithmetic, and strict-units behavior.

use less::{compile_with_session, MathMode, Options, Session};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn compile_with(source: &str, options: &Options) -> String {
    compile_with_session(source, options, &Session::new_for_test_suite())
        .unwrap()
        .css
}

fn compile_str(source: &str) -> String {
    compile_with(source, &Options::default())
}

#[test]
fn addition_and_multiplication_evaluate_by_default() {
    assert_eq!(compile_str(".a { w: 2px + 3px; }"), ".a {\n  w: 5px;\n}\n");
    assert_eq!(compile_str(".a { w: 2px * 3; }"), ".a {\n  w: 6px;\n}\n");
}

#[test]
fn division_requires_parentheses_by_default() {
    assert_eq!(compile_str(".a { w: 10px/2; }"), ".a {\n  w: 10px/2;\n}\n");
    assert_eq!(compile_str(".a { w: (10px/2); }"), ".a {\n  w: 5px;\n}\n");
}

#[test]
fn always_mode_divides_everywhere() {
    let options = Options {
        math: MathMode::Always,
        ..Options::default()
    };
    assert_eq!(
        compile_with(".a { w: 10px / 2; }", &options),
        ".a {\n  w: 5px;\n}\n"
    );
}

#[test]
fn unit_conversion_on_addition() {
    assert_eq!(compile_str(".a { w: 1cm + 10mm; }"), ".a {\n  w: 2cm;\n}\n");
    assert_eq!(compile_str(".a { t: 1s + 500ms; }"), ".a {\n  t: 1.5s;\n}\n");
}

#[test]
fn incompatible_units_keep_the_left_unit_when_loose() {
    assert_eq!(compile_str(".a { w: 1px + 1s; }"), ".a {\n  w: 2px;\n}\n");
}

#[test]
fn strict_units_rejects_incompatible_operands() {
    let options = Options {
        strict_units: true,
        ..Options::default()
    };

    let err = compile_with_session(
        ".a { w: 1px + 1s; }",
        &options,
        &Session::new_for_test_suite(),
    )
    .unwrap_err();

    assert_eq!(err.kind, less::ErrorKind::Operation);
}

#[test]
fn negative_values_in_lists_are_not_subtraction() {
    assert_eq!(
        compile_str(".a { margin: 1px -2px; }"),
        ".a {\n  margin: 1px -2px;\n}\n"
    );
}

#[test]
fn unspaced_subtraction_still_works() {
    assert_eq!(compile_str(".a { w: 5px-2px; }"), ".a {\n  w: 3px;\n}\n");
}

#[test]
fn cancelled_units_fall_back_to_the_first_operand() {
    // the unit vectors cancel, and the backup unit still prints
    assert_eq!(compile_str(".a { r: (10px / 5px); }"), ".a {\n  r: 2px;\n}\n");
}

#[test]
fn calc_is_left_alone() {
    assert_eq!(
        compile_str(".a { w: calc(100% - 20px); }"),
        ".a {\n  w: calc(100% - 20px);\n}\n"
    );
}

#[test]
fn variables_participate_in_math() {
    assert_eq!(
        compile_str("@base: 4px; .a { w: @base * 3; }"),
        ".a {\n  w: 12px;\n}\n"
    );
}

#[test]
fn color_arithmetic() {
    assert_eq!(
        compile_str(".a { c: #111111 + #222222; }"),
        ".a {\n  c: #333333;\n}\n"
    );
}

proptest! {
    /// `(a + b) - b` returns to `a`, modulo float noise, for compatible
    /// units.
    #[test]
    fn addition_round_trips(a in -1000.0f64..1000.0, b in -1000.0f64..1000.0) {
        let source = format!(".t {{ w: ({a:.4}px + {b:.4}px) - {b:.4}px; }}");
        let options = Options {
            math: MathMode::Always,
            ..Options::default()
        };
        let css = compile_with(&source, &options);

        // parse the number back out of `  w: <value>px;`
        let value_text = css
            .split("w: ")
            .nth(1)
            .and_then(|rest| rest.split("px").next())
            .unwrap();
        let value: f64 = value_text.parse().unwrap();

        prop_assert!((value - a).abs() < 1e-3, "{value} != {a} in {css}");
    }
}
