//! Control flow: `if`, `boolean`, and the guard-only `default`.

use crate::error::LessError;
use crate::node::Node;
use crate::tree::operation::truthy;

use super::{FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add_raw_args("if", if_function);
    registry.add_raw_args("boolean", boolean);
    registry.add_with_context("default", default);
}

/// `if(condition, then[, else])`: only the picked branch is evaluated.
fn if_function(fctx: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let Some(condition) = args.first() else {
        return Err(LessError::argument("if expects a condition"));
    };

    let branch = if truthy(condition, fctx.context)? {
        args.get(1)
    } else {
        args.get(2)
    };

    match branch {
        Some(node) => Ok(Some(node.eval(fctx.context)?)),
        None => Ok(Some(Node::Anonymous(crate::tree::atoms::Anonymous::new("")))),
    }
}

/// `boolean(condition)`: evaluates the condition into `true`/`false`.
fn boolean(fctx: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let Some(condition) = args.first() else {
        return Err(LessError::argument("boolean expects a condition"));
    };

    Ok(Some(Node::from_bool(truthy(condition, fctx.context)?)))
}

/// `default()`: inside mixin guards only, where the matcher sets its value
/// while probing candidates.
fn default(fctx: &mut FunctionContext<'_, '_>, _args: &[Node]) -> Result<Option<Node>, LessError> {
    match fctx.context.default_func_value {
        Some(value) => Ok(Some(Node::from_bool(value))),
        None => Err(LessError::syntax(
            "default() is only allowed in parametric mixin guards",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;
    use crate::tree::atoms::Keyword;
    use crate::tree::dimension::Dimension;
    use crate::tree::operation::Condition;

    fn with_ctx<T>(f: impl FnOnce(&mut FunctionContext<'_, '_>) -> T) -> T {
        let mut ctx = crate::context::EvalContext::new(crate::session::Session::new_for_test_suite());
        let mut fctx = FunctionContext {
            context: &mut ctx,
            name: "test",
            index: None,
            file_info: None,
        };
        f(&mut fctx)
    }

    #[test]
    fn if_picks_branch_by_condition() {
        let cond = Node::Condition(Box::new(Condition {
            node: Default::default(),
            op: ">".to_string(),
            lvalue: Node::Dimension(Dimension::number(2.0).unwrap()),
            rvalue: Node::Dimension(Dimension::number(1.0).unwrap()),
            negate: false,
        }));
        let then = Node::Keyword(Keyword::new("yes"));
        let otherwise = Node::Keyword(Keyword::new("no"));

        let result = with_ctx(|fctx| {
            if_function(fctx, &[cond, then, otherwise]).unwrap().unwrap()
        });
        assert_eq!(result.to_css_string(false).unwrap(), "yes");
    }

    #[test]
    fn default_errors_outside_guards() {
        let err = with_ctx(|fctx| default(fctx, &[]).unwrap_err());
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
    }

    #[test]
    fn default_reflects_matcher_state() {
        let result = with_ctx(|fctx| {
            fctx.context.default_func_value = Some(true);
            default(fctx, &[]).unwrap().unwrap()
        });
        assert!(result.is_true());
    }
}
