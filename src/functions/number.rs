//! Numeric utilities: extrema, conversions, percentages.

use std::f64::consts::PI;

use crate::error::LessError;
use crate::node::Node;
use crate::tree::dimension::Dimension;
use crate::tree::unit::{Unit, UnitGroup};

use super::{expect_dimension, expect_string, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("pi", |_, _| {
        Ok(Some(Node::Dimension(Dimension::number(PI)?)))
    });

    registry.add("mod", |_, args| {
        let a = expect_dimension(args, 0, "mod")?;
        let b = expect_dimension(args, 1, "mod")?;
        Ok(Some(Node::Dimension(Dimension::new(
            a.value % b.value,
            a.unit.clone(),
        )?)))
    });

    registry.add("percentage", |_, args| {
        let d = expect_dimension(args, 0, "percentage")?;
        Ok(Some(Node::Dimension(Dimension::new(
            d.value * 100.0,
            Unit::single("%"),
        )?)))
    });

    registry.add("convert", convert);
    registry.add("min", |_, args| extremum(args, true));
    registry.add("max", |_, args| extremum(args, false));
}

fn convert(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let d = expect_dimension(args, 0, "convert")?;
    let target = expect_string(args, 1, "convert")?;

    let Some(group) = UnitGroup::for_unit(&target) else {
        return Err(LessError::argument(format!(
            "cannot convert to unknown unit '{target}'"
        )));
    };

    let targets = std::collections::HashMap::from([(group, target)]);
    Ok(Some(Node::Dimension(d.convert_to_units(&targets))))
}

/// `min`/`max` over any number of dimensions.  Incomparable units make the
/// call pass through unevaluated, so native CSS `min()`/`max()` still work.
fn extremum(args: &[Node], minimum: bool) -> Result<Option<Node>, LessError> {
    if args.is_empty() {
        return Err(LessError::argument("one or more arguments required"));
    }

    let mut best: Option<&Dimension> = None;

    for arg in args {
        let Node::Dimension(d) = arg else {
            return Ok(None);
        };

        best = match best {
            None => Some(d),
            Some(current) => {
                let Some(ordering) = d.compare(current) else {
                    return Ok(None);
                };

                if (minimum && ordering.is_lt()) || (!minimum && ordering.is_gt()) {
                    Some(d)
                } else {
                    Some(current)
                }
            }
        };
    }

    Ok(best.map(|d| Node::Dimension(d.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;

    fn px(v: f64) -> Node {
        Node::Dimension(Dimension::with_unit(v, "px").unwrap())
    }

    #[test]
    fn min_picks_smallest_across_units() {
        let result = extremum(&[px(10.0), Node::Dimension(Dimension::with_unit(1.0, "cm").unwrap())], true)
            .unwrap()
            .unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "10px");
    }

    #[test]
    fn min_declines_on_incomparable_units() {
        let args = [px(10.0), Node::Dimension(Dimension::with_unit(1.0, "s").unwrap())];
        assert!(extremum(&args, true).unwrap().is_none());
    }

    #[test]
    fn percentage_converts_fraction() {
        let mut registry = FunctionRegistry {
            map: Default::default(),
        };
        register(&mut registry);

        let entry = registry.get("percentage").unwrap();
        let mut ctx = crate::context::EvalContext::new(crate::session::Session::new_for_test_suite());
        let mut fctx = FunctionContext {
            context: &mut ctx,
            name: "percentage",
            index: None,
            file_info: None,
        };

        let result = (entry.func)(&mut fctx, &[Node::Dimension(Dimension::number(0.5).unwrap())])
            .unwrap()
            .unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "50%");
    }
}
