//! Function calls.

use crate::context::EvalContext;
use crate::error::{ErrorKind, LessError};
use crate::functions::{FunctionContext, FunctionRegistry};
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::atoms::Variable;

/// A function invocation, `rgb(...)`, `min(...)`, `calc(...)`.  Unknown
/// functions pass through to the output with their arguments evaluated.
///
/// Calls whose name starts with `@` are detached-ruleset invocations
/// (`@block();`); those only appear in rule position and expand there.
#[derive(Clone)]
pub struct Call {
    pub node: NodeCommon,
    pub name: String,
    pub args: Vec<Node>,
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Node>) -> Call {
        Call {
            node: NodeCommon::default(),
            name: name.into(),
            args,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        if self.name.starts_with('@') {
            return self.eval_detached_call(context);
        }

        // Math is off inside calc(): the expression must reach the output as
        // text, while nested function calls still evaluate.
        let calc = self.name.eq_ignore_ascii_case("calc");
        let was_in_calc = context.in_calc();
        let saved_math_on = context.math_on;
        context.math_on = !calc;

        if calc || was_in_calc {
            context.enter_calc();
        }

        let result = self.eval_function(context);

        if calc || was_in_calc {
            context.exit_calc();
        }
        context.math_on = saved_math_on;

        result
    }

    fn eval_function(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        // Plugin-scoped functions shadow the registry.
        if !context.function_scopes.is_empty() {
            if let Some(function) = context.function_scopes.lookup(&self.name) {
                let args = self.evaluated_args(context)?;

                match function(&args) {
                    Ok(Some(result)) => return Ok(result),
                    Ok(None) => (),
                    Err(e) => return Err(self.annotate(e)),
                }

                return self.pass_through(context);
            }
        }

        if let Some(entry) = FunctionRegistry::global().get(&self.name) {
            let args = if entry.eval_args {
                self.evaluated_args(context)?
            } else {
                self.args.clone()
            };

            let mut fn_context = FunctionContext {
                context,
                name: &self.name,
                index: self.node.index,
                file_info: self.node.file_info.clone(),
            };

            match (entry.func)(&mut fn_context, &args) {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => (),
                Err(e) => return Err(self.annotate(e)),
            }
        }

        self.pass_through(context)
    }

    /// Emits the call as written, with evaluated arguments.
    fn pass_through(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let args = self
            .args
            .iter()
            .map(|a| a.eval(context))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Node::Call(Box::new(Call {
            node: self.node.clone(),
            name: self.name.clone(),
            args,
        })))
    }

    /// Arguments for a builtin: comments dropped, everything evaluated.
    fn evaluated_args(&self, context: &mut EvalContext) -> Result<Vec<Node>, LessError> {
        self.args
            .iter()
            .filter(|a| !matches!(a, Node::Comment(_)))
            .map(|a| a.eval(context))
            .collect()
    }

    fn annotate(&self, mut e: LessError) -> LessError {
        if e.kind == ErrorKind::Runtime || e.kind == ErrorKind::Argument {
            e.message = format!("error evaluating function `{}`: {}", self.name, e.message);
        }
        e.at(self.node.index, self.node.file_info.as_deref())
    }

    fn eval_detached_call(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let variable = Variable {
            node: self.node.clone(),
            name: self.name.clone(),
        };
        let value = variable.eval(context)?;

        match value {
            Node::DetachedRuleset(d) => d.call(context),
            Node::Ruleset(r) => Ok(Node::Ruleset(r)),
            other => Err(LessError::syntax(format!(
                "could not evaluate call to {}: {} is not a detached ruleset",
                self.name,
                other.kind_name()
            ))
            .at(self.node.index, self.node.file_info.as_deref())),
        }
    }
}

impl GenCss for Call {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(&self.name);
        output.add("(");

        for (i, arg) in self.args.iter().enumerate() {
            arg.gen_css(output)?;
            if i + 1 < self.args.len() {
                output.add_either(",", ", ");
            }
        }

        output.add(")");
        Ok(())
    }
}
