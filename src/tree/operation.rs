//! Arithmetic operations, negation, parentheses and guard conditions.

use std::cmp::Ordering;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::color::Color;
use crate::tree::dimension::Dimension;

/// A binary arithmetic operation.  Stays unevaluated (and serializes as
/// written) when the math mode gates it off.
#[derive(Debug, Clone)]
pub struct Operation {
    pub node: NodeCommon,
    pub op: char,
    pub left: Node,
    pub right: Node,

    /// Whether the source had spaces around the operator; preserved when the
    /// operation is emitted unevaluated.
    pub is_spaced: bool,
}

impl Operation {
    pub fn new(op: char, left: Node, right: Node, is_spaced: bool) -> Operation {
        Operation {
            node: NodeCommon::default(),
            op,
            left,
            right,
            is_spaced,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let a = self.left.eval(context)?;
        let b = self.right.eval(context)?;

        if !context.is_math_on(self.op) {
            return Ok(Node::Operation(Box::new(Operation {
                node: self.node.clone(),
                op: self.op,
                left: a,
                right: b,
                is_spaced: self.is_spaced,
            })));
        }

        let result = match (&a, &b) {
            (Node::Dimension(x), Node::Dimension(y)) => x
                .operate(self.op, y, context.strict_units)
                .map(Node::Dimension),

            (Node::Color(x), Node::Color(y)) => x.operate(self.op, y).map(Node::Color),

            (Node::Color(x), Node::Dimension(y)) => {
                x.operate(self.op, &dimension_to_color(y)).map(Node::Color)
            }

            (Node::Dimension(x), Node::Color(y)) => dimension_to_color(x)
                .operate(self.op, y)
                .map(Node::Color),

            _ => {
                // A division left unevaluated by parens-division mode may end
                // up as an operand; keep the whole tree unevaluated then.
                if matches!(&a, Node::Operation(inner) if inner.op == '/')
                    || matches!(&b, Node::Operation(inner) if inner.op == '/')
                {
                    return Ok(Node::Operation(Box::new(Operation {
                        node: self.node.clone(),
                        op: self.op,
                        left: a,
                        right: b,
                        is_spaced: self.is_spaced,
                    })));
                }

                Err(LessError::operation("operation on an invalid type"))
            }
        };

        result.map_err(|e| e.at(self.node.index, self.node.file_info.as_deref()))
    }
}

impl GenCss for Operation {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        self.left.gen_css(output)?;
        if self.is_spaced {
            output.add(" ");
        }
        output.add_char(self.op);
        if self.is_spaced {
            output.add(" ");
        }
        self.right.gen_css(output)
    }
}

fn dimension_to_color(d: &Dimension) -> Color {
    Color::new([d.value, d.value, d.value], 1.0)
}

/// Unary minus in front of a parenthesized or variable value.
#[derive(Debug, Clone)]
pub struct Negative {
    pub node: NodeCommon,
    pub value: Node,
}

impl Negative {
    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        if context.is_math_on('*') {
            let minus_one = Node::Dimension(Dimension::number(-1.0)?);
            return Operation::new('*', minus_one, self.value.clone(), false).eval(context);
        }

        Ok(Node::Negative(Box::new(Negative {
            node: self.node.clone(),
            value: self.value.eval(context)?,
        })))
    }
}

impl GenCss for Negative {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add("-");
        self.value.gen_css(output)
    }
}

/// A parenthesized value.  Evaluation happens with the parens stack pushed,
/// which is what turns math on for the contents in the gated modes; the
/// wrapper is dropped once the contents have been computed.
#[derive(Debug, Clone)]
pub struct Paren {
    pub node: NodeCommon,
    pub value: Node,
}

impl Paren {
    pub fn new(value: Node) -> Paren {
        Paren {
            node: NodeCommon::default(),
            value,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        context.in_parenthesis();
        let inner = self.value.eval(context);
        context.out_of_parenthesis();
        let inner = inner?;

        // Computed math sheds its parentheses; everything else (unevaluated
        // operations inside calc, media-feature declarations) keeps them.
        if matches!(inner, Node::Dimension(_) | Node::Color(_)) {
            return Ok(inner);
        }

        Ok(Node::Paren(Box::new(Paren {
            node: self.node.clone(),
            value: inner,
        })))
    }
}

impl GenCss for Paren {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add("(");
        self.value.gen_css(output)?;
        output.add(")");
        Ok(())
    }
}

/// A guard condition: comparison, conjunction, disjunction, or negation.
#[derive(Debug, Clone)]
pub struct Condition {
    pub node: NodeCommon,

    /// `and`, `or`, or one of `<`, `>`, `=`, `>=`, `<=`, `=<`.
    pub op: String,

    pub lvalue: Node,
    pub rvalue: Node,
    pub negate: bool,
}

impl Condition {
    pub fn eval(&self, context: &mut EvalContext) -> Result<bool, LessError> {
        let result = match self.op.as_str() {
            "and" => truthy(&self.lvalue, context)? && truthy(&self.rvalue, context)?,
            "or" => truthy(&self.lvalue, context)? || truthy(&self.rvalue, context)?,
            op => {
                let a = self.lvalue.eval(context)?;
                let b = self.rvalue.eval(context)?;

                match a.compare(&b) {
                    Some(Ordering::Less) => matches!(op, "<" | "=<" | "<="),
                    Some(Ordering::Equal) => matches!(op, "=" | ">=" | "=<" | "<="),
                    Some(Ordering::Greater) => matches!(op, ">" | ">="),
                    None => false,
                }
            }
        };

        Ok(if self.negate { !result } else { result })
    }
}

/// Evaluates a guard operand for its truth value.
pub fn truthy(node: &Node, context: &mut EvalContext) -> Result<bool, LessError> {
    match node {
        Node::Condition(c) => c.eval(context),
        other => Ok(other.eval(context)?.is_true()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MathMode;
    use crate::session::Session;

    fn ctx(math: MathMode) -> EvalContext {
        let mut c = EvalContext::new(Session::new_for_test_suite());
        c.math = math;
        c
    }

    fn px(v: f64) -> Node {
        Node::Dimension(Dimension::with_unit(v, "px").unwrap())
    }

    fn num(v: f64) -> Node {
        Node::Dimension(Dimension::number(v).unwrap())
    }

    #[test]
    fn addition_evaluates() {
        let op = Operation::new('+', px(2.0), px(3.0), true);
        let r = op.eval(&mut ctx(MathMode::Always)).unwrap();
        assert_eq!(r.to_css_string(false).unwrap(), "5px");
    }

    #[test]
    fn division_stays_textual_outside_parens() {
        let op = Operation::new('/', px(10.0), num(2.0), false);
        let r = op.eval(&mut ctx(MathMode::ParensDivision)).unwrap();
        assert_eq!(r.to_css_string(false).unwrap(), "10px/2");
    }

    #[test]
    fn division_inside_paren_evaluates() {
        let op = Operation::new('/', px(10.0), num(2.0), false);
        let paren = Paren::new(Node::Operation(Box::new(op)));
        let r = paren.eval(&mut ctx(MathMode::ParensDivision)).unwrap();
        assert_eq!(r.to_css_string(false).unwrap(), "5px");
    }

    #[test]
    fn parens_mode_keeps_bare_addition() {
        let op = Operation::new('+', px(2.0), px(3.0), true);
        let r = op.eval(&mut ctx(MathMode::Parens)).unwrap();
        assert_eq!(r.to_css_string(false).unwrap(), "2px + 3px");
    }

    #[test]
    fn color_plus_dimension() {
        let color = Node::Color(Color::new([10.0, 20.0, 30.0], 1.0));
        let op = Operation::new('+', color, num(5.0), true);
        let r = op.eval(&mut ctx(MathMode::Always)).unwrap();
        assert_eq!(r.to_css_string(false).unwrap(), "#0f1923");
    }

    #[test]
    fn operation_on_keyword_fails() {
        let op = Operation::new(
            '+',
            Node::Keyword(crate::tree::atoms::Keyword::new("solid")),
            num(1.0),
            true,
        );
        assert!(op.eval(&mut ctx(MathMode::Always)).is_err());
    }

    #[test]
    fn negative_multiplies() {
        let n = Negative {
            node: NodeCommon::default(),
            value: px(5.0),
        };
        let r = n.eval(&mut ctx(MathMode::Always)).unwrap();
        assert_eq!(r.to_css_string(false).unwrap(), "-5px");
    }

    #[test]
    fn comparisons() {
        let cond = Condition {
            node: NodeCommon::default(),
            op: ">".to_string(),
            lvalue: px(2.0),
            rvalue: px(1.0),
            negate: false,
        };
        assert!(cond.eval(&mut ctx(MathMode::Always)).unwrap());

        let cond = Condition {
            node: NodeCommon::default(),
            op: "=".to_string(),
            lvalue: px(1.0),
            rvalue: Node::Dimension(Dimension::with_unit(1.0, "s").unwrap()),
            negate: false,
        };
        assert!(!cond.eval(&mut ctx(MathMode::Always)).unwrap());
    }

    #[test]
    fn negated_condition() {
        let cond = Condition {
            node: NodeCommon::default(),
            op: "=".to_string(),
            lvalue: num(1.0),
            rvalue: num(2.0),
            negate: true,
        };
        assert!(cond.eval(&mut ctx(MathMode::Always)).unwrap());
    }
}
