//! List functions: `length`, `extract`, `range`, `each`.

use std::rc::Rc;

use crate::error::LessError;
use crate::node::Node;
use crate::tree::declaration::Declaration;
use crate::tree::dimension::Dimension;
use crate::tree::ruleset::Ruleset;
use crate::tree::selector::Selector;
use crate::tree::unit::Unit;

use super::{expect_dimension, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("length", |_, args| {
        let len = list_items(args.first())?.len();
        Ok(Some(Node::Dimension(Dimension::number(len as f64)?)))
    });

    registry.add("extract", |_, args| {
        let items = list_items(args.first())?;
        let index = expect_dimension(args, 1, "extract")?.value;

        // 1-based, like the rest of the language.
        let i = index as usize;
        if index.fract() != 0.0 || i == 0 || i > items.len() {
            return Ok(None);
        }

        Ok(Some(items[i - 1].clone()))
    });

    registry.add("range", range);
    registry.add_with_context("each", each);
}

/// The entries of a comma or space separated list; a scalar is a one-entry
/// list.
fn list_items(node: Option<&Node>) -> Result<Vec<Node>, LessError> {
    let Some(node) = node else {
        return Err(LessError::argument("a list argument is required"));
    };

    Ok(match node {
        Node::Value(list) => list.value.clone(),
        Node::Expression(expr) => expr.without_comments().value,
        other => vec![other.clone()],
    })
}

/// `range([start,] end [, step])` with the end's unit on every entry.
fn range(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let (start, end, step) = match args.len() {
        1 => (1.0, expect_dimension(args, 0, "range")?, 1.0),
        _ => (
            expect_dimension(args, 0, "range")?.value,
            expect_dimension(args, 1, "range")?,
            match args.get(2) {
                Some(Node::Dimension(d)) => d.value,
                _ => 1.0,
            },
        ),
    };

    if step <= 0.0 {
        return Err(LessError::argument("range step must be positive"));
    }

    let mut items = Vec::new();
    let mut current = start;
    while current <= end.value {
        items.push(Node::Dimension(Dimension::new(current, end.unit.clone())?));
        current += step;
    }

    Ok(Some(Node::Expression(
        crate::tree::expression::Expression::new(items),
    )))
}

/// `each(@list, { ... })`: instantiates the block once per entry with
/// `@value`, `@key` and `@index` bound.
fn each(fctx: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let items = list_items(args.first())?;

    let Some(Node::DetachedRuleset(block)) = args.get(1) else {
        return Err(LessError::argument(
            "second argument to each must be a detached ruleset",
        ));
    };

    let mut iterations: Vec<Node> = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let index = Node::Dimension(Dimension::new((i + 1) as f64, Unit::empty())?);

        // Named declarations (`name: value` entries) bind the name to @key.
        let (key, value) = match item {
            Node::Declaration(d) => (
                Node::Keyword(crate::tree::atoms::Keyword::new(d.name_str())),
                d.value.clone(),
            ),
            other => (index.clone(), other.clone()),
        };

        let mut rules = vec![
            Node::Declaration(Box::new(Declaration::new("@value", value))),
            Node::Declaration(Box::new(Declaration::new("@key", key))),
            Node::Declaration(Box::new(Declaration::new("@index", index))),
        ];
        rules.extend(block.ruleset.rules.borrow().iter().cloned());

        let iteration = Ruleset::new(vec![Rc::new(Selector::just_parent())], rules);
        iterations.push(Node::Ruleset(Rc::new(iteration)));
    }

    let wrapper = Rc::new(Ruleset::new(
        vec![Rc::new(Selector::just_parent())],
        iterations,
    ));

    let evaluated = wrapper.eval(fctx.context)?;
    Ok(Some(Node::Ruleset(evaluated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;
    use crate::tree::expression::ValueList;

    #[test]
    fn length_counts_list_entries() {
        let list = Node::Value(ValueList::new(vec![
            Node::Dimension(Dimension::number(1.0).unwrap()),
            Node::Dimension(Dimension::number(2.0).unwrap()),
        ]));
        assert_eq!(list_items(Some(&list)).unwrap().len(), 2);

        let scalar = Node::Dimension(Dimension::number(1.0).unwrap());
        assert_eq!(list_items(Some(&scalar)).unwrap().len(), 1);
    }

    #[test]
    fn range_carries_end_unit() {
        let mut ctx = crate::context::EvalContext::new(crate::session::Session::new_for_test_suite());
        let mut fctx = FunctionContext {
            context: &mut ctx,
            name: "range",
            index: None,
            file_info: None,
        };

        let result = range(
            &mut fctx,
            &[Node::Dimension(Dimension::with_unit(3.0, "px").unwrap())],
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.to_css_string(false).unwrap(), "1px 2px 3px");
    }
}
