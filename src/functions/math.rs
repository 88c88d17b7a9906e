//! Mathematical functions over dimensions.

use crate::error::LessError;
use crate::node::Node;
use crate::tree::dimension::Dimension;
use crate::tree::unit::Unit;

use super::{expect_dimension, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("ceil", |_, args| keep_unit(args, "ceil", f64::ceil));
    registry.add("floor", |_, args| keep_unit(args, "floor", f64::floor));
    registry.add("sqrt", |_, args| keep_unit(args, "sqrt", f64::sqrt));
    registry.add("abs", |_, args| keep_unit(args, "abs", f64::abs));

    registry.add("sin", |_, args| trig(args, "sin", f64::sin));
    registry.add("cos", |_, args| trig(args, "cos", f64::cos));
    registry.add("tan", |_, args| trig(args, "tan", f64::tan));

    registry.add("asin", |_, args| inverse_trig(args, "asin", f64::asin));
    registry.add("acos", |_, args| inverse_trig(args, "acos", f64::acos));
    registry.add("atan", |_, args| inverse_trig(args, "atan", f64::atan));

    registry.add("round", round);
    registry.add("pow", pow);
}

/// `ceil`, `floor`, `sqrt`, `abs`: the unit rides along untouched.
fn keep_unit(
    args: &[Node],
    name: &str,
    f: impl Fn(f64) -> f64,
) -> Result<Option<Node>, LessError> {
    let d = expect_dimension(args, 0, name)?;
    Ok(Some(Node::Dimension(Dimension::new(
        f(d.value),
        d.unit.clone(),
    )?)))
}

/// `sin`/`cos`/`tan` read their argument as radians (after unit
/// normalization) and return a plain number.
fn trig(args: &[Node], name: &str, f: impl Fn(f64) -> f64) -> Result<Option<Node>, LessError> {
    let d = expect_dimension(args, 0, name)?.unify();
    Ok(Some(Node::Dimension(Dimension::number(f(d.value))?)))
}

/// The inverse functions return radians.
fn inverse_trig(
    args: &[Node],
    name: &str,
    f: impl Fn(f64) -> f64,
) -> Result<Option<Node>, LessError> {
    let d = expect_dimension(args, 0, name)?.unify();
    Ok(Some(Node::Dimension(Dimension::new(
        f(d.value),
        Unit::single("rad"),
    )?)))
}

fn round(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let d = expect_dimension(args, 0, "round")?;

    let fraction_digits = match args.get(1) {
        Some(Node::Dimension(digits)) => digits.value.max(0.0) as i32,
        Some(other) => {
            return Err(LessError::argument(format!(
                "second argument to round must be a number, found {}",
                other.kind_name()
            )));
        }
        None => 0,
    };

    let scale = 10f64.powi(fraction_digits);
    let value = (d.value * scale).round() / scale;

    Ok(Some(Node::Dimension(Dimension::new(value, d.unit.clone())?)))
}

fn pow(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let base = expect_dimension(args, 0, "pow")?;
    let exponent = expect_dimension(args, 1, "pow")?;

    Ok(Some(Node::Dimension(Dimension::new(
        base.value.powf(exponent.value),
        base.unit.clone(),
    )?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;

    fn css(result: Option<Node>) -> String {
        result.unwrap().to_css_string(false).unwrap()
    }

    #[test]
    fn ceil_keeps_unit() {
        let arg = Node::Dimension(Dimension::with_unit(2.4, "px").unwrap());
        assert_eq!(css(keep_unit(&[arg], "ceil", f64::ceil).unwrap()), "3px");
    }

    #[test]
    fn trig_normalizes_angles() {
        let arg = Node::Dimension(Dimension::with_unit(90.0, "deg").unwrap());
        let result = trig(&[arg], "sin", f64::sin).unwrap().unwrap();
        let Node::Dimension(d) = result else { panic!() };
        assert!((d.value - 1.0).abs() < 1e-9);
        assert!(d.unit.is_empty());
    }

    #[test]
    fn rejects_non_numbers() {
        let arg = Node::Keyword(crate::tree::atoms::Keyword::new("red"));
        assert!(keep_unit(&[arg], "ceil", f64::ceil).is_err());
    }
}
