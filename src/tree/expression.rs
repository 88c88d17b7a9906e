//! Space-separated expressions and comma-separated value lists.

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};

/// A run of space-separated values: `1px solid red`.
#[derive(Debug, Clone)]
pub struct Expression {
    pub node: NodeCommon,
    pub value: Vec<Node>,

    /// Suppresses the spaces on output; used for interpolated fragments.
    pub no_spacing: bool,
}

impl Expression {
    pub fn new(value: Vec<Node>) -> Expression {
        Expression {
            node: NodeCommon::default(),
            value,
            no_spacing: false,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        match self.value.len() {
            0 => Ok(Node::Expression(self.clone())),

            // A single-element expression evaluates straight to its element.
            1 => self.value[0].eval(context),

            _ => {
                let value = self
                    .value
                    .iter()
                    .map(|v| v.eval(context))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Node::Expression(Expression {
                    node: self.node.clone(),
                    value,
                    no_spacing: self.no_spacing,
                }))
            }
        }
    }

    /// Throws away comments, for function arguments.
    pub fn without_comments(&self) -> Expression {
        Expression {
            node: self.node.clone(),
            value: self
                .value
                .iter()
                .filter(|v| !matches!(v, Node::Comment(_)))
                .cloned()
                .collect(),
            no_spacing: self.no_spacing,
        }
    }
}

impl GenCss for Expression {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        for (i, value) in self.value.iter().enumerate() {
            value.gen_css(output)?;

            if !self.no_spacing && i + 1 < self.value.len() {
                output.add(" ");
            }
        }

        Ok(())
    }
}

/// A comma-separated list of expressions: `Arial, sans-serif`.
#[derive(Debug, Clone)]
pub struct ValueList {
    pub node: NodeCommon,
    pub value: Vec<Node>,
}

impl ValueList {
    pub fn new(value: Vec<Node>) -> ValueList {
        ValueList {
            node: NodeCommon::default(),
            value,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        if self.value.len() == 1 {
            return self.value[0].eval(context);
        }

        let value = self
            .value
            .iter()
            .map(|v| v.eval(context))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Node::Value(ValueList {
            node: self.node.clone(),
            value,
        }))
    }
}

impl GenCss for ValueList {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        for (i, value) in self.value.iter().enumerate() {
            value.gen_css(output)?;

            if i + 1 < self.value.len() {
                output.add_either(",", ", ");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Keyword;
    use crate::tree::dimension::Dimension;

    fn kw(s: &str) -> Node {
        Node::Keyword(Keyword::new(s))
    }

    #[test]
    fn expression_spaces_values() {
        let e = Expression::new(vec![
            Node::Dimension(Dimension::with_unit(1.0, "px").unwrap()),
            kw("solid"),
            kw("red"),
        ]);
        assert_eq!(e.to_css_string(false).unwrap(), "1px solid red");
    }

    #[test]
    fn value_list_separator_depends_on_compression() {
        let v = ValueList::new(vec![kw("a"), kw("b")]);
        assert_eq!(v.to_css_string(false).unwrap(), "a, b");
        assert_eq!(v.to_css_string(true).unwrap(), "a,b");
    }
}
