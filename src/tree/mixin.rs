//! Mixin definitions and mixin calls.

use std::cell::RefCell;
use std::rc::Rc;

use itertools::Itertools;

use crate::context::{EvalContext, Frame};
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::GenCss;
use crate::tree::declaration::Declaration;
use crate::tree::expression::Expression;
use crate::tree::operation::Condition;
use crate::tree::ruleset::Ruleset;
use crate::tree::selector::Selector;

/// One parameter of a mixin definition.
///
/// A parameter with no name is a pattern: the call's argument at that
/// position must equal the pattern literally for the definition to match.
#[derive(Debug, Clone)]
pub struct MixinParam {
    pub name: Option<String>,
    pub value: Option<Node>,
    pub variadic: bool,
}

/// A parametric mixin definition, `.m(@a; @b: 1; @rest...) when (...) { }`.
pub struct MixinDefinition {
    pub node: NodeCommon,

    /// The mixin's selector text, e.g. `.m` or `#ns`.
    pub name: String,

    pub params: Vec<MixinParam>,
    pub variadic: bool,

    /// Total parameter count.
    pub arity: usize,

    /// Parameters without a default.
    pub required: usize,

    /// Names of parameters that have defaults; named arguments for these do
    /// not count toward the required-argument check.
    pub optional_params: Vec<String>,

    pub condition: Option<Box<Condition>>,
    pub rules: Vec<Node>,

    /// The defining scope, captured when the definition itself evaluates.
    pub frames: RefCell<Vec<Frame>>,
}

impl MixinDefinition {
    pub fn new(
        name: impl Into<String>,
        params: Vec<MixinParam>,
        rules: Vec<Node>,
        condition: Option<Box<Condition>>,
    ) -> MixinDefinition {
        let variadic = params.iter().any(|p| p.variadic);
        let arity = params.len();
        let required = params
            .iter()
            .filter(|p| p.name.is_none() || p.value.is_none())
            .count();
        let optional_params = params
            .iter()
            .filter(|p| p.value.is_some())
            .filter_map(|p| p.name.clone())
            .collect();

        MixinDefinition {
            node: NodeCommon::default(),
            name: name.into(),
            params,
            variadic,
            arity,
            required,
            optional_params,
            condition,
            rules,
            frames: RefCell::new(Vec::new()),
        }
    }

    /// Definitions evaluate before anything else in their block: evaluation
    /// just captures the defining frames, closure-style.
    pub fn eval(self: &Rc<Self>, context: &mut EvalContext) -> Result<Node, LessError> {
        let captured = if self.frames.borrow().is_empty() {
            context.frames_snapshot()
        } else {
            self.frames.borrow().clone()
        };

        let def = MixinDefinition::new(
            self.name.clone(),
            self.params.clone(),
            self.rules.clone(),
            self.condition.clone(),
        );
        let def = MixinDefinition {
            node: self.node.clone(),
            ..def
        };
        *def.frames.borrow_mut() = captured;

        Ok(Node::MixinDefinition(Rc::new(def)))
    }

    /// Variable lookup over the definition's own rules, for when the
    /// definition acts as a scope frame.
    pub fn variable(&self, name: &str) -> Option<Node> {
        self.rules
            .iter()
            .find(|r| matches!(r, Node::Declaration(d) if d.variable && d.name_str() == name))
            .cloned()
    }

    /// The frame stack mixin bodies evaluate against: the caller's frames
    /// below the captured defining frames.
    fn call_frames(&self, context: &EvalContext) -> Vec<Frame> {
        let mut frames = context.frames.clone();
        frames.extend(self.frames.borrow().iter().cloned());
        frames
    }

    /// Binds call arguments to parameters, producing the parameter frame.
    /// `evald_arguments` collects the bound values for `@arguments`.
    pub fn eval_params(
        &self,
        context: &mut EvalContext,
        mixin_frames: &[Frame],
        args: &[EvaldArg],
        evald_arguments: &mut Vec<Option<Node>>,
    ) -> Result<Rc<Ruleset>, LessError> {
        let frame = Rc::new(Ruleset::new(Vec::new(), Vec::new()));

        evald_arguments.resize(self.params.len().max(args.len()), None);

        // Named arguments bind first.
        let mut positional: Vec<&EvaldArg> = Vec::new();
        for arg in args {
            if let Some(ref name) = arg.name {
                let position = self
                    .params
                    .iter()
                    .position(|p| p.name.as_deref() == Some(name.as_str()));

                match position {
                    Some(j) if evald_arguments[j].is_none() => {
                        evald_arguments[j] = Some(arg.value.clone());
                        frame.prepend_rule(Node::Declaration(Box::new(Declaration::new(
                            name.clone(),
                            arg.value.clone(),
                        ))));
                    }
                    _ => {
                        return Err(LessError::runtime(format!(
                            "named argument for {} {} not found",
                            self.name, name
                        )));
                    }
                }
            } else {
                positional.push(arg);
            }
        }

        let mut arg_index = 0;
        for (i, param) in self.params.iter().enumerate() {
            if evald_arguments.get(i).is_some_and(Option::is_some) {
                continue;
            }

            if let Some(ref name) = param.name {
                if param.variadic {
                    let mut varargs = Vec::new();
                    for arg in positional.iter().skip(arg_index) {
                        varargs.push(arg.value.clone());
                    }
                    let value = Expression::new(varargs).eval(context)?;
                    frame.prepend_rule(Node::Declaration(Box::new(Declaration::new(
                        name.clone(),
                        value,
                    ))));
                } else {
                    let value = match positional.get(arg_index) {
                        Some(arg) => arg.value.clone(),
                        None => match &param.value {
                            Some(default) => {
                                // Defaults see the mixin's own environment,
                                // including parameters already bound.
                                let mut env = mixin_frames.to_vec();
                                env.push(Frame::Ruleset(frame.clone()));
                                let v = context
                                    .with_frames(env, |ctx| default.eval(ctx))?;
                                frame.reset_cache();
                                v
                            }
                            None => {
                                return Err(LessError::runtime(format!(
                                    "wrong number of arguments for {} ({} for {})",
                                    self.name,
                                    args.len(),
                                    self.arity
                                )));
                            }
                        },
                    };

                    frame.prepend_rule(Node::Declaration(Box::new(Declaration::new(
                        name.clone(),
                        value.clone(),
                    ))));
                    evald_arguments[i] = Some(value);
                }
            }

            if param.variadic {
                for (j, arg) in positional.iter().enumerate().skip(arg_index) {
                    evald_arguments[j] = Some(arg.value.clone());
                }
            }

            arg_index += 1;
        }

        Ok(frame)
    }

    /// Arity and pattern check against a prepared argument list.
    pub fn match_args(
        &self,
        args: &[EvaldArg],
        context: &mut EvalContext,
    ) -> Result<bool, LessError> {
        let all_count = args.len();
        let required_count = args
            .iter()
            .filter(|a| match &a.name {
                Some(n) => !self.optional_params.contains(n),
                None => true,
            })
            .count();

        if !self.variadic {
            if required_count < self.required {
                return Ok(false);
            }
            if all_count > self.params.len() {
                return Ok(false);
            }
        } else if required_count < self.required.saturating_sub(1) {
            return Ok(false);
        }

        // Unnamed parameters are literal patterns.
        let len = required_count.min(self.arity);
        for i in 0..len {
            let param = &self.params[i];
            if param.name.is_none() && !param.variadic {
                let Some(pattern) = &param.value else {
                    continue;
                };

                let arg_css = args[i].value.to_css_string(false)?;
                let pattern_css = pattern.eval(context)?.to_css_string(false)?;
                if arg_css != pattern_css {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Evaluates the guard, with parameters bound.
    pub fn match_condition(
        &self,
        args: &[EvaldArg],
        context: &mut EvalContext,
    ) -> Result<bool, LessError> {
        let Some(condition) = &self.condition else {
            return Ok(true);
        };

        let mixin_frames = self.call_frames(context);
        let mut scratch = Vec::new();
        let frame = self.eval_params(context, &mixin_frames, args, &mut scratch)?;

        let mut cond_frames = mixin_frames;
        cond_frames.push(Frame::Ruleset(frame));

        context.with_frames(cond_frames, |ctx| condition.eval(ctx))
    }

    /// Expands the mixin body for a call.
    pub fn eval_call(
        self: &Rc<Self>,
        context: &mut EvalContext,
        args: &[EvaldArg],
        important: bool,
    ) -> Result<Rc<Ruleset>, LessError> {
        let mixin_frames = self.call_frames(context);

        let mut evald_arguments = Vec::new();
        let frame = self.eval_params(context, &mixin_frames, args, &mut evald_arguments)?;

        let arguments: Vec<Node> = evald_arguments.into_iter().flatten().collect();
        frame.prepend_rule(Node::Declaration(Box::new(Declaration::new(
            "@arguments",
            Expression::new(arguments).eval(context)?,
        ))));

        let body = Rc::new(Ruleset::new(Vec::new(), self.rules.clone()));

        let mut body_frames = mixin_frames;
        body_frames.push(Frame::Ruleset(frame));
        body_frames.push(Frame::Mixin(self.clone()));

        let evaluated = context.with_frames(body_frames, |ctx| body.eval(ctx))?;

        if important {
            Ok(evaluated.make_important())
        } else {
            Ok(evaluated)
        }
    }
}

/// One argument at a mixin call site.
#[derive(Debug, Clone)]
pub struct MixinArg {
    pub name: Option<String>,
    pub value: Node,

    /// `...` after the value: expand a list argument into several.
    pub expand: bool,
}

/// An evaluated call argument, ready for matching and binding.
#[derive(Clone)]
pub struct EvaldArg {
    pub name: Option<String>,
    pub value: Node,
}

/// A mixin invocation, `.m(args) !important;`.
#[derive(Clone)]
pub struct MixinCall {
    pub node: NodeCommon,
    pub selector: Selector,
    pub args: Vec<MixinArg>,
    pub important: bool,
}

/// `default()` grouping for candidates: matched with default() unset, only
/// with default()=true, or only with default()=false.
#[derive(Copy, Clone, PartialEq)]
enum DefaultGroup {
    None,
    True,
    False,
}

impl MixinCall {
    pub fn new(selector: Selector, args: Vec<MixinArg>, important: bool) -> MixinCall {
        MixinCall {
            node: NodeCommon::default(),
            selector,
            args,
            important,
        }
    }

    /// Expands the call into the rules it produces.
    pub fn eval(&self, context: &mut EvalContext) -> Result<Vec<Node>, LessError> {
        let selector = self.selector.eval(context)?;
        let call_path = selector.mixin_elements()?;
        let call_name = call_path.join(" > ");

        // Prepare arguments once.
        let mut args: Vec<EvaldArg> = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            let value = arg.value.eval(context)?;

            if arg.expand {
                if let Node::Value(list) = &value {
                    for v in &list.value {
                        args.push(EvaldArg {
                            name: None,
                            value: v.clone(),
                        });
                    }
                    continue;
                }
                if let Node::Expression(expr) = &value {
                    for v in &expr.value {
                        args.push(EvaldArg {
                            name: None,
                            value: v.clone(),
                        });
                    }
                    continue;
                }
            }

            args.push(EvaldArg {
                name: arg.name.clone(),
                value,
            });
        }

        let mut one_found = false;

        // Innermost frame with any candidate wins.
        let frames: Vec<Frame> = context.frames.iter().rev().cloned().collect();
        for frame in frames {
            let Some(frame_ruleset) = frame.as_ruleset().cloned() else {
                continue;
            };

            let found = frame_ruleset.find(&call_path, None)?;
            if found.is_empty() {
                continue;
            }
            one_found = true;

            let mut candidates: Vec<(Rc<MixinDefinition>, DefaultGroup)> = Vec::new();
            let mut matched = false;

            for fm in &found {
                let definition = match &fm.rule {
                    Node::MixinDefinition(def) => def.clone(),

                    Node::Ruleset(mixin) => {
                        // Plain rulesets called as mixins match zero args
                        // only, and wrap into an anonymous definition.
                        if !args.is_empty() {
                            continue;
                        }

                        if is_recursive_call(mixin, context) {
                            continue;
                        }

                        let wrapped = MixinDefinition::new(
                            String::new(),
                            Vec::new(),
                            mixin.rules.borrow().clone(),
                            None,
                        );
                        wrapped.node.copy_visibility_info(&mixin.node);
                        Rc::new(wrapped)
                    }

                    _ => continue,
                };

                if !definition.match_args(&args, context)? {
                    continue;
                }
                matched = true;

                match default_group(&definition, &args, context)? {
                    None => continue,
                    Some(group) => candidates.push((definition, group)),
                }
            }

            context.default_func_value = None;

            let true_or_false = candidates
                .iter()
                .filter(|(_, g)| *g != DefaultGroup::None)
                .count();
            let none_count = candidates.len() - true_or_false;

            let default_result = if none_count > 0 {
                DefaultGroup::False
            } else {
                if true_or_false > 1 {
                    return Err(LessError::runtime(format!(
                        "ambiguous use of `default()` found when matching for `{call_name}`"
                    ))
                    .at(self.node.index, self.node.file_info.as_deref()));
                }
                DefaultGroup::True
            };

            let mut rules: Vec<Node> = Vec::new();
            for (definition, group) in &candidates {
                if *group == DefaultGroup::None || *group == default_result {
                    context.call_stack.push(call_name.clone());
                    let expanded = definition.eval_call(context, &args, self.important);
                    context.call_stack.pop();

                    let expanded = expanded.map_err(|e| {
                        e.at(self.node.index, self.node.file_info.as_deref())
                            .with_frame(call_name.clone())
                    })?;

                    let new_rules = expanded.rules.borrow().clone();
                    if self.node.blocks_visibility() {
                        for rule in &new_rules {
                            rule.common().add_visibility_block();
                        }
                    }
                    rules.extend(new_rules);
                }
            }

            if matched {
                return Ok(rules);
            }
        }

        if one_found {
            Err(LessError::runtime(format!(
                "no matching definition was found for `{}`",
                self.format_call(&args)
            ))
            .at(self.node.index, self.node.file_info.as_deref()))
        } else {
            Err(LessError::name(format!("{call_name} is undefined"))
                .at(self.node.index, self.node.file_info.as_deref()))
        }
    }

    fn format_call(&self, args: &[EvaldArg]) -> String {
        let name: String = self
            .selector
            .elements
            .iter()
            .filter_map(|e| e.value.as_str())
            .collect();

        let args_text = args
            .iter()
            .map(|arg| {
                let value = arg.value.to_css_string(false).unwrap_or_default();
                match &arg.name {
                    Some(name) => format!("{name}: {value}"),
                    None => value,
                }
            })
            .join(", ");

        format!("{name}({args_text})")
    }
}

/// A plain-ruleset mixin must not expand inside its own evaluation.
fn is_recursive_call(mixin: &Rc<Ruleset>, context: &EvalContext) -> bool {
    let target = mixin
        .original
        .borrow()
        .as_ref()
        .map(Rc::as_ptr)
        .unwrap_or_else(|| Rc::as_ptr(mixin));

    context.frames.iter().any(|f| {
        let Some(r) = f.as_ruleset() else {
            return false;
        };
        let frame_original = r
            .original
            .borrow()
            .as_ref()
            .map(Rc::as_ptr)
            .unwrap_or_else(|| Rc::as_ptr(r));
        std::ptr::eq(frame_original, target)
    })
}

/// Classifies a candidate by how `default()` influences its guard.
/// `Ok(None)` means the guard fails regardless of `default()`.
fn default_group(
    definition: &Rc<MixinDefinition>,
    args: &[EvaldArg],
    context: &mut EvalContext,
) -> Result<Option<DefaultGroup>, LessError> {
    if definition.condition.is_none() {
        return Ok(Some(DefaultGroup::None));
    }

    let mut results = [false, false];
    for (i, value) in [false, true].into_iter().enumerate() {
        context.default_func_value = Some(value);
        results[i] = definition.match_condition(args, context)?;
    }
    context.default_func_value = None;

    Ok(match (results[0], results[1]) {
        (false, false) => None,
        (true, true) => Some(DefaultGroup::None),
        (false, true) => Some(DefaultGroup::True),
        (true, false) => Some(DefaultGroup::False),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::tree::atoms::Keyword;
    use crate::tree::dimension::Dimension;

    fn def(params: Vec<MixinParam>) -> MixinDefinition {
        MixinDefinition::new(".m", params, Vec::new(), None)
    }

    fn named(name: &str, default: Option<Node>) -> MixinParam {
        MixinParam {
            name: Some(name.to_string()),
            value: default,
            variadic: false,
        }
    }

    fn arg(value: Node) -> EvaldArg {
        EvaldArg { name: None, value }
    }

    fn px(v: f64) -> Node {
        Node::Dimension(Dimension::with_unit(v, "px").unwrap())
    }

    #[test]
    fn arity_counting() {
        let d = def(vec![
            named("@a", None),
            named("@b", Some(px(1.0))),
        ]);
        assert_eq!(d.arity, 2);
        assert_eq!(d.required, 1);
        assert_eq!(d.optional_params, vec!["@b".to_string()]);
    }

    #[test]
    fn match_args_respects_arity() {
        let mut ctx = EvalContext::new(Session::new_for_test_suite());
        let d = def(vec![named("@a", None), named("@b", Some(px(1.0)))]);

        assert!(!d.match_args(&[], &mut ctx).unwrap());
        assert!(d.match_args(&[arg(px(1.0))], &mut ctx).unwrap());
        assert!(d
            .match_args(&[arg(px(1.0)), arg(px(2.0))], &mut ctx)
            .unwrap());
        assert!(!d
            .match_args(&[arg(px(1.0)), arg(px(2.0)), arg(px(3.0))], &mut ctx)
            .unwrap());
    }

    #[test]
    fn variadic_accepts_excess() {
        let mut ctx = EvalContext::new(Session::new_for_test_suite());
        let d = def(vec![
            named("@a", None),
            MixinParam {
                name: Some("@rest".to_string()),
                value: None,
                variadic: true,
            },
        ]);

        assert!(d
            .match_args(&[arg(px(1.0)), arg(px(2.0)), arg(px(3.0))], &mut ctx)
            .unwrap());
    }

    #[test]
    fn pattern_params_match_literally() {
        let mut ctx = EvalContext::new(Session::new_for_test_suite());
        let d = def(vec![MixinParam {
            name: None,
            value: Some(Node::Keyword(Keyword::new("dark"))),
            variadic: false,
        }]);

        assert!(d
            .match_args(&[arg(Node::Keyword(Keyword::new("dark")))], &mut ctx)
            .unwrap());
        assert!(!d
            .match_args(&[arg(Node::Keyword(Keyword::new("light")))], &mut ctx)
            .unwrap());
    }
}
