//! Selectors: combinators, elements, and selector-level guards.

use std::cell::Cell;
use std::rc::Rc;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::extend::Extend;
use crate::tree::operation::Condition;

/// The combinator in front of an element: descendant (` `), child (`>`),
/// sibling (`+`, `~`), or nothing for compound parts (`.a.b`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combinator {
    pub value: String,
}

impl Combinator {
    pub fn new(value: &str) -> Combinator {
        Combinator {
            value: match value.trim() {
                "" if value.contains(' ') => " ".to_string(),
                trimmed => trimmed.to_string(),
            },
        }
    }

    pub fn none() -> Combinator {
        Combinator {
            value: String::new(),
        }
    }

    pub fn descendant() -> Combinator {
        Combinator {
            value: " ".to_string(),
        }
    }

    pub fn is_empty_or_whitespace(&self) -> bool {
        self.value.is_empty() || self.value == " "
    }
}

impl GenCss for Combinator {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        match self.value.as_str() {
            "" => (),
            " " => output.add(" "),
            v => {
                if output.compress {
                    output.add(v);
                } else {
                    output.add(" ");
                    output.add(v);
                    output.add(" ");
                }
            }
        }

        Ok(())
    }
}

/// The value of one selector element: usually plain text (`.box`, `#id`,
/// `:hover`), or a node for interpolations and nested selector values.
#[derive(Debug, Clone)]
pub enum ElementValue {
    Str(String),
    Node(Box<Node>),
}

impl ElementValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ElementValue::Str(s) => Some(s),
            ElementValue::Node(_) => None,
        }
    }
}

/// One compound part of a selector, with the combinator that attaches it to
/// the part before it.
#[derive(Debug, Clone)]
pub struct Element {
    pub node: NodeCommon,
    pub combinator: Combinator,
    pub value: ElementValue,

    /// The element came from `@{...}` interpolation and needs re-parsing
    /// after evaluation.
    pub is_variable: bool,
}

impl Element {
    pub fn new(combinator: Combinator, value: impl Into<String>) -> Element {
        Element {
            node: NodeCommon::default(),
            combinator,
            value: ElementValue::Str(value.into()),
            is_variable: false,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Element, LessError> {
        let value = match &self.value {
            ElementValue::Str(s) => ElementValue::Str(s.clone()),
            ElementValue::Node(n) => ElementValue::Node(Box::new(n.eval(context)?)),
        };

        Ok(Element {
            node: self.node.clone(),
            combinator: self.combinator.clone(),
            value,
            is_variable: self.is_variable,
        })
    }

    /// The element's identity for mixin lookup and extend matching.
    pub fn value_to_css(&self) -> Result<String, LessError> {
        match &self.value {
            ElementValue::Str(s) => Ok(s.clone()),
            ElementValue::Node(n) => n.to_css_string(false),
        }
    }

    pub fn is_parent_reference(&self) -> bool {
        matches!(&self.value, ElementValue::Str(s) if s == "&")
    }
}

impl GenCss for Element {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        self.combinator.gen_css(output)?;

        match &self.value {
            ElementValue::Str(s) => output.add(s),
            ElementValue::Node(n) => n.gen_css(output)?,
        }

        Ok(())
    }
}

/// A full selector: elements plus an optional guard and attached extends.
#[derive(Debug, Clone)]
pub struct Selector {
    pub node: NodeCommon,
    pub elements: Vec<Element>,
    pub extend_list: Vec<Rc<Extend>>,
    pub condition: Option<Box<Condition>>,

    /// Result of evaluating the guard; selectors whose guard came out false
    /// are filtered from the output paths.
    pub evald_condition: Cell<bool>,

    /// Placeholder selectors synthesized for media bubbling produce no text.
    pub media_empty: Cell<bool>,
}

impl Selector {
    pub fn new(elements: Vec<Element>) -> Selector {
        Selector {
            node: NodeCommon::default(),
            elements,
            extend_list: Vec::new(),
            condition: None,
            evald_condition: Cell::new(true),
            media_empty: Cell::new(false),
        }
    }

    /// An empty `&` selector, used for wrapper rulesets.
    pub fn just_parent() -> Selector {
        Selector::new(vec![Element::new(Combinator::none(), "&")])
    }

    /// A derived selector that keeps this one's envelope and guard verdict.
    pub fn derive(&self, elements: Vec<Element>, extend_list: Vec<Rc<Extend>>) -> Selector {
        let derived = Selector {
            node: self.node.clone(),
            elements,
            extend_list,
            condition: None,
            evald_condition: Cell::new(self.evald_condition.get()),
            media_empty: Cell::new(self.media_empty.get()),
        };
        derived.node.copy_visibility_info(&self.node);
        derived
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Selector, LessError> {
        let evald_condition = match &self.condition {
            Some(c) => c.eval(context)?,
            None => true,
        };

        let elements = self
            .elements
            .iter()
            .map(|e| e.eval(context))
            .collect::<Result<Vec<_>, _>>()?;

        let extend_list = self
            .extend_list
            .iter()
            .map(|e| e.eval(context).map(Rc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let derived = self.derive(elements, extend_list);
        derived.evald_condition.set(evald_condition);
        Ok(derived)
    }

    /// True for a bare `&` with no guard, the signature of a wrapper ruleset
    /// whose rules should be hoisted into the parent.
    pub fn is_just_parent_selector(&self) -> bool {
        !self.media_empty.get()
            && self.elements.len() == 1
            && self.condition.is_none()
            && self.elements[0].is_parent_reference()
            && self.elements[0].combinator.is_empty_or_whitespace()
    }

    /// Whether any element came from variable interpolation.
    pub fn has_variable_elements(&self) -> bool {
        self.elements.iter().any(|e| e.is_variable)
    }

    /// The element identity strings used for mixin lookup, with parent
    /// references dropped.
    pub fn mixin_elements(&self) -> Result<Vec<String>, LessError> {
        let mut out = Vec::with_capacity(self.elements.len());

        for element in &self.elements {
            let css = element.value_to_css()?;
            if css != "&" {
                out.push(css);
            }
        }

        Ok(out)
    }

    /// Matches a mixin call path against this candidate selector.  Returns
    /// the number of call elements consumed when this selector's elements are
    /// a prefix of the call path, 0 otherwise.
    pub fn match_call_path(&self, call_path: &[String]) -> Result<usize, LessError> {
        let own = self.mixin_elements()?;

        if own.is_empty() || call_path.len() < own.len() {
            return Ok(0);
        }

        for (mine, theirs) in own.iter().zip(call_path) {
            if mine != theirs {
                return Ok(0);
            }
        }

        Ok(own.len())
    }
}

impl GenCss for Selector {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        // Selectors concatenated in a path need an explicit descendant space
        // between them.
        if !output.first_selector
            && self
                .elements
                .first()
                .is_some_and(|e| e.combinator.value.is_empty())
        {
            output.add(" ");
        }

        for element in &self.elements {
            element.gen_css(output)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(parts: &[(&str, &str)]) -> Selector {
        Selector::new(
            parts
                .iter()
                .map(|(c, v)| Element::new(Combinator::new(c), *v))
                .collect(),
        )
    }

    #[test]
    fn combinator_spacing() {
        let s = sel(&[("", ".a"), (">", ".b")]);
        let mut out = Output::new(false, false);
        out.first_selector = true;
        s.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".a > .b");

        let mut out = Output::new(true, false);
        out.first_selector = true;
        s.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".a>.b");
    }

    #[test]
    fn non_first_selector_gets_leading_space() {
        let s = sel(&[("", ".c")]);
        let mut out = Output::new(false, false);
        s.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), " .c");
    }

    #[test]
    fn just_parent_detection() {
        assert!(Selector::just_parent().is_just_parent_selector());
        assert!(!sel(&[("", ".a")]).is_just_parent_selector());
        assert!(!sel(&[("", "&"), ("", ".a")]).is_just_parent_selector());
    }

    #[test]
    fn call_path_matching() {
        let candidate = sel(&[("", ".mixin")]);
        let path = vec![".mixin".to_string()];
        assert_eq!(candidate.match_call_path(&path).unwrap(), 1);

        let ns = sel(&[("", "#ns")]);
        let path = vec!["#ns".to_string(), ".m".to_string()];
        assert_eq!(ns.match_call_path(&path).unwrap(), 1);

        let other = sel(&[("", ".other")]);
        assert_eq!(other.match_call_path(&path).unwrap(), 0);
    }
}
