//! Type predicates and unit manipulation.

use crate::error::LessError;
use crate::node::Node;
use crate::tree::atoms::Anonymous;
use crate::tree::dimension::Dimension;
use crate::tree::unit::Unit;

use super::{expect_dimension, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("iscolor", |_, args| predicate(args, |n| n.as_color().is_some()));
    registry.add("isnumber", |_, args| {
        predicate(args, |n| matches!(n, Node::Dimension(_)))
    });
    registry.add("isstring", |_, args| {
        predicate(args, |n| matches!(n, Node::Quoted(_)))
    });
    registry.add("iskeyword", |_, args| {
        predicate(args, |n| matches!(n, Node::Keyword(_)))
    });
    registry.add("isurl", |_, args| {
        predicate(args, |n| matches!(n, Node::Url(_)))
    });
    registry.add("isruleset", |_, args| {
        predicate(args, |n| matches!(n, Node::DetachedRuleset(_)))
    });

    registry.add("ispixel", |_, args| unit_predicate(args, "px"));
    registry.add("ispercentage", |_, args| unit_predicate(args, "%"));
    registry.add("isem", |_, args| unit_predicate(args, "em"));

    registry.add("isunit", |_, args| {
        let unit = match args.get(1) {
            Some(Node::Quoted(q)) => q.value.clone(),
            Some(Node::Keyword(k)) => k.value.clone(),
            _ => {
                return Err(LessError::argument(
                    "second argument to isunit should be a unit",
                ));
            }
        };

        predicate(args, |n| match n {
            Node::Dimension(d) => d.unit.numerator.first().map(String::as_str) == Some(&*unit),
            _ => false,
        })
    });

    registry.add_raw_args("isdefined", is_defined);

    registry.add("unit", set_unit);
    registry.add("get-unit", |_, args| {
        let d = expect_dimension(args, 0, "get-unit")?;
        Ok(Some(Node::Anonymous(Anonymous::new(d.unit.to_string()))))
    });
}

fn predicate(args: &[Node], test: impl Fn(&Node) -> bool) -> Result<Option<Node>, LessError> {
    let Some(arg) = args.first() else {
        return Err(LessError::argument("one argument required"));
    };

    Ok(Some(Node::from_bool(test(arg))))
}

fn unit_predicate(args: &[Node], unit: &str) -> Result<Option<Node>, LessError> {
    predicate(args, |n| match n {
        Node::Dimension(d) => d.unit.numerator.first().map(String::as_str) == Some(unit),
        _ => false,
    })
}

/// `isdefined(@var)`: evaluates its raw argument and reports whether that
/// succeeded.
fn is_defined(fctx: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let Some(arg) = args.first() else {
        return Err(LessError::argument("one argument required"));
    };

    Ok(Some(Node::from_bool(arg.eval(fctx.context).is_ok())))
}

/// `unit(dim[, unit])`: swaps or strips the unit without conversion.
fn set_unit(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let d = expect_dimension(args, 0, "unit")?;

    let unit = match args.get(1) {
        Some(Node::Keyword(k)) => Unit::single(&k.value),
        Some(Node::Quoted(q)) => Unit::single(&q.value),
        Some(other) => {
            return Err(LessError::argument(format!(
                "second argument to unit must be a unit, found {}",
                other.kind_name()
            )));
        }
        None => Unit::empty(),
    };

    Ok(Some(Node::Dimension(Dimension::new(d.value, unit)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;

    #[test]
    fn unit_swaps_without_conversion() {
        let mut ctx = crate::context::EvalContext::new(crate::session::Session::new_for_test_suite());
        let mut fctx = FunctionContext {
            context: &mut ctx,
            name: "unit",
            index: None,
            file_info: None,
        };

        let d = Node::Dimension(Dimension::with_unit(5.0, "px").unwrap());
        let em = Node::Keyword(crate::tree::atoms::Keyword::new("em"));

        let result = set_unit(&mut fctx, &[d.clone(), em]).unwrap().unwrap();
        assert_eq!(result.to_css_string(false).unwrap(), "5em");

        let stripped = set_unit(&mut fctx, &[d]).unwrap().unwrap();
        assert_eq!(stripped.to_css_string(false).unwrap(), "5");
    }

    #[test]
    fn predicates() {
        let d = Node::Dimension(Dimension::with_unit(5.0, "px").unwrap());
        assert!(unit_predicate(&[d.clone()], "px").unwrap().unwrap().is_true());
        assert!(!unit_predicate(&[d], "em").unwrap().unwrap().is_true());
    }
}
