//! Declarations: `property: value;` and `@variable: value;`.

use crate::context::{EvalContext, ImportantScope, MathMode};
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};

/// How a declaration merges with earlier declarations of the same name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MergeMode {
    None,

    /// `prop+: v` appends with a comma.
    Comma,

    /// `prop+_: v` appends with a space.
    Space,
}

/// A declaration name: plain text, or interpolated parts (`@{prefix}-width`)
/// resolved at eval time.
#[derive(Debug, Clone)]
pub enum DeclarationName {
    Str(String),
    Interpolated(Vec<Node>),
}

impl DeclarationName {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DeclarationName::Str(s) => Some(s),
            DeclarationName::Interpolated(_) => None,
        }
    }
}

/// A single declaration.  Variable declarations (`@x: ...`) use the same
/// node, flagged with `variable`, and never reach the output.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub node: NodeCommon,
    pub name: DeclarationName,
    pub value: Node,

    /// `!important`, without the separating space.
    pub important: Option<String>,

    pub merge: MergeMode,

    /// Inline declarations skip the trailing semicolon.
    pub inline: bool,

    /// Name starts with `@`: a variable declaration.
    pub variable: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: Node) -> Declaration {
        let name = name.into();
        let variable = name.starts_with('@');

        Declaration {
            node: NodeCommon::default(),
            name: DeclarationName::Str(name),
            value,
            important: None,
            merge: MergeMode::None,
            inline: false,
            variable,
        }
    }

    /// The resolved name; interpolated names must be evaluated first.
    pub fn name_str(&self) -> &str {
        self.name.as_str().unwrap_or("")
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let (name, variable) = match &self.name {
            DeclarationName::Str(s) => (s.clone(), self.variable),
            DeclarationName::Interpolated(parts) => (eval_name(parts, context)?, false),
        };

        // The `font` shorthand's `a/b` is line-height syntax, never division.
        let math_bypass = name == "font" && context.math == MathMode::Always;
        let prev_math = context.math;
        if math_bypass {
            context.math = MathMode::ParensDivision;
        }

        context.important_scope.push(ImportantScope::default());
        let evald_value = self.value.eval(context);
        let important_result = context.important_scope.pop().unwrap_or_default();

        if math_bypass {
            context.math = prev_math;
        }

        let evald_value =
            evald_value.map_err(|e| e.at(self.node.index, self.node.file_info.as_deref()))?;

        if !self.variable && matches!(evald_value, Node::DetachedRuleset(_)) {
            return Err(
                LessError::syntax("rulesets cannot be evaluated on a property")
                    .at(self.node.index, self.node.file_info.as_deref()),
            );
        }

        let important = self.important.clone().or(important_result.important);

        Ok(Node::Declaration(Box::new(Declaration {
            node: self.node.clone(),
            name: DeclarationName::Str(name),
            value: evald_value,
            important,
            merge: self.merge,
            inline: self.inline,
            variable,
        })))
    }

    /// A copy with `!important` set, for `!important` mixin calls.
    pub fn make_important(&self) -> Declaration {
        Declaration {
            important: Some("!important".to_string()),
            ..self.clone()
        }
    }
}

fn eval_name(parts: &[Node], context: &mut EvalContext) -> Result<String, LessError> {
    let mut name = String::new();

    for part in parts {
        let evaluated = part.eval(context)?;
        match &evaluated {
            Node::Quoted(q) => name.push_str(&q.value),
            Node::Keyword(k) => name.push_str(&k.value),
            other => name.push_str(&other.to_css_string(false)?),
        }
    }

    Ok(name)
}

impl GenCss for Declaration {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(self.name_str());
        output.add_either(":", ": ");

        self.value.gen_css(output)?;

        if let Some(ref important) = self.important {
            output.add(" ");
            output.add(important);
        }

        if !(self.inline || (output.last_rule && output.compress)) {
            output.add(";");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Keyword;

    fn decl(name: &str, value: &str) -> Declaration {
        Declaration::new(name, Node::Keyword(Keyword::new(value)))
    }

    #[test]
    fn variable_flag_follows_name() {
        assert!(decl("@x", "red").variable);
        assert!(!decl("color", "red").variable);
    }

    #[test]
    fn serializes_with_and_without_compression() {
        let d = decl("color", "red");
        assert_eq!(d.to_css_string(false).unwrap(), "color: red;");
        assert_eq!(d.to_css_string(true).unwrap(), "color:red;");
    }

    #[test]
    fn last_rule_drops_semicolon_only_compressed() {
        let d = decl("color", "red");

        let mut out = Output::new(true, false);
        out.last_rule = true;
        d.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), "color:red");

        let mut out = Output::new(false, false);
        out.last_rule = true;
        d.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), "color: red;");
    }

    #[test]
    fn important_is_spaced() {
        let mut d = decl("color", "red");
        d.important = Some("!important".to_string());
        assert_eq!(d.to_css_string(false).unwrap(), "color: red !important;");
    }
}
