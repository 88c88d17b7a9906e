//! At-rules: generic directives, `@media`, and `@container`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::atoms::Anonymous;
use crate::tree::expression::{Expression, ValueList};
use crate::tree::extend::Extend;
use crate::tree::ruleset::Ruleset;
use crate::tree::selector::Selector;

/// A generic at-rule (`@supports`, `@font-face`, `@keyframes`, `@charset`,
/// ...), with an optional prelude value and an optional block.
pub struct AtRule {
    pub node: NodeCommon,

    /// Including the `@`.
    pub name: String,

    pub value: RefCell<Option<Node>>,

    /// At most one inner root ruleset when the rule has a block.
    pub rules: RefCell<Vec<Node>>,

    /// Rooted at-rules (`@charset`, `@keyframes`) never join with outer
    /// selectors; `@supports` and `@document` bubble instead.
    pub is_rooted: bool,

    /// Extends collected by the extend finder for everything in this block.
    pub all_extends: RefCell<Vec<Rc<Extend>>>,
}

impl AtRule {
    pub fn new(name: impl Into<String>, value: Option<Node>, block: Option<Vec<Node>>) -> AtRule {
        let rules = match block {
            Some(rules) => {
                let inner = Ruleset::new(vec![Rc::new(empty_selector())], rules);
                inner.allow_imports.set(true);
                vec![Node::Ruleset(Rc::new(inner))]
            }
            None => Vec::new(),
        };

        AtRule {
            node: NodeCommon::default(),
            name: name.into(),
            value: RefCell::new(value),
            rules: RefCell::new(rules),
            is_rooted: false,
            all_extends: RefCell::new(Vec::new()),
        }
    }

    pub fn has_block(&self) -> bool {
        !self.rules.borrow().is_empty()
    }

    pub fn eval(self: &Rc<Self>, context: &mut EvalContext) -> Result<Node, LessError> {
        // Media blocks inside another at-rule must not bubble above it.
        let media_path_backup = std::mem::take(&mut context.media_path);
        let media_blocks_backup = std::mem::take(&mut context.media_blocks);

        let value = match self.value.borrow().as_ref() {
            Some(v) => Some(v.eval(context)?),
            None => None,
        };

        let mut rules = Vec::new();
        if let Some(Node::Ruleset(inner)) = self.rules.borrow().first() {
            let evaluated = inner.eval(context)?;
            evaluated.root.set(true);
            rules.push(Node::Ruleset(evaluated));
        }

        context.media_path = media_path_backup;
        context.media_blocks = media_blocks_backup;

        Ok(Node::AtRule(Rc::new(AtRule {
            node: self.node.clone(),
            name: self.name.clone(),
            value: RefCell::new(value),
            rules: RefCell::new(rules),
            is_rooted: self.is_rooted,
            all_extends: RefCell::new(Vec::new()),
        })))
    }

    pub fn is_charset(&self) -> bool {
        self.name == "@charset"
    }
}

impl GenCss for AtRule {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(&self.name);

        if let Some(value) = self.value.borrow().as_ref() {
            output.add(" ");
            value.gen_css(output)?;
        }

        let rules = self.rules.borrow();
        if rules.is_empty() {
            output.add(";");
        } else {
            output_ruleset(&rules, output)?;
        }

        Ok(())
    }
}

/// A `@media` block.  Evaluation registers the block in the context's media
/// lists; nested blocks flatten their feature lists into the outermost one.
pub struct Media {
    pub node: NodeCommon,
    pub features: RefCell<Node>,
    pub rules: RefCell<Vec<Node>>,
    pub all_extends: RefCell<Vec<Rc<Extend>>>,
}

impl Media {
    pub fn new(block: Vec<Node>, features: Vec<Node>) -> Media {
        let inner = Ruleset::new(vec![Rc::new(empty_selector())], block);
        inner.allow_imports.set(true);

        Media {
            node: NodeCommon::default(),
            features: RefCell::new(Node::Value(ValueList::new(features))),
            rules: RefCell::new(vec![Node::Ruleset(Rc::new(inner))]),
            all_extends: RefCell::new(Vec::new()),
        }
    }

    pub fn eval(self: &Rc<Self>, context: &mut EvalContext) -> Result<Node, LessError> {
        let evaluated = Rc::new(Media {
            node: self.node.clone(),
            features: RefCell::new(self.features.borrow().eval(context)?),
            rules: RefCell::new(Vec::new()),
            all_extends: RefCell::new(Vec::new()),
        });

        context.media_path.push(Node::Media(evaluated.clone()));
        context.media_blocks.push(Node::Media(evaluated.clone()));

        let inner = match self.rules.borrow().first() {
            Some(Node::Ruleset(inner)) => inner.clone(),
            _ => Rc::new(Ruleset::new(Vec::new(), Vec::new())),
        };
        let result = inner.eval(context);
        context.media_path.pop();
        let inner_evaluated = result?;

        evaluated
            .rules
            .borrow_mut()
            .push(Node::Ruleset(inner_evaluated));

        if context.media_path.is_empty() {
            Ok(eval_top(Node::Media(evaluated), context))
        } else {
            eval_nested(&evaluated.features, context)
        }
    }

    /// Wraps the inner block in the selectors of the ruleset the media block
    /// bubbled out of.
    pub fn bubble_selectors(&self, selectors: &[Rc<Selector>]) {
        bubble(&self.rules, selectors);
    }

}

impl GenCss for Media {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add("@media ");
        self.features.borrow().gen_css(output)?;
        output_ruleset(&self.rules.borrow(), output)
    }
}

/// A `@container` block; same nesting and bubbling behavior as `@media`.
pub struct Container {
    pub node: NodeCommon,
    pub features: RefCell<Node>,
    pub rules: RefCell<Vec<Node>>,
    pub all_extends: RefCell<Vec<Rc<Extend>>>,
}

impl Container {
    pub fn new(block: Vec<Node>, features: Vec<Node>) -> Container {
        let inner = Ruleset::new(vec![Rc::new(empty_selector())], block);
        inner.allow_imports.set(true);

        Container {
            node: NodeCommon::default(),
            features: RefCell::new(Node::Value(ValueList::new(features))),
            rules: RefCell::new(vec![Node::Ruleset(Rc::new(inner))]),
            all_extends: RefCell::new(Vec::new()),
        }
    }

    pub fn eval(self: &Rc<Self>, context: &mut EvalContext) -> Result<Node, LessError> {
        let evaluated = Rc::new(Container {
            node: self.node.clone(),
            features: RefCell::new(self.features.borrow().eval(context)?),
            rules: RefCell::new(Vec::new()),
            all_extends: RefCell::new(Vec::new()),
        });

        context.media_path.push(Node::Container(evaluated.clone()));
        context.media_blocks.push(Node::Container(evaluated.clone()));

        let inner = match self.rules.borrow().first() {
            Some(Node::Ruleset(inner)) => inner.clone(),
            _ => Rc::new(Ruleset::new(Vec::new(), Vec::new())),
        };
        let result = inner.eval(context);
        context.media_path.pop();
        let inner_evaluated = result?;

        evaluated
            .rules
            .borrow_mut()
            .push(Node::Ruleset(inner_evaluated));

        if context.media_path.is_empty() {
            Ok(eval_top(Node::Container(evaluated), context))
        } else {
            eval_nested(&evaluated.features, context)
        }
    }

    pub fn bubble_selectors(&self, selectors: &[Rc<Selector>]) {
        bubble(&self.rules, selectors);
    }
}

impl GenCss for Container {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add("@container ");
        self.features.borrow().gen_css(output)?;
        output_ruleset(&self.rules.borrow(), output)
    }
}

/// The placeholder `&` selector used by blocks that have no selector text of
/// their own.
fn empty_selector() -> Selector {
    let selector = Selector::just_parent();
    selector.media_empty.set(true);
    selector
}

fn bubble(rules: &RefCell<Vec<Node>>, selectors: &[Rc<Selector>]) {
    if selectors.is_empty() {
        return;
    }

    let inner = rules.borrow().clone();
    let wrapper = Ruleset::new(selectors.to_vec(), inner);
    *rules.borrow_mut() = vec![Node::Ruleset(Rc::new(wrapper))];
}

/// An outermost media block either stands alone or, when nested blocks were
/// collected, becomes a multi-media wrapper holding every flattened block.
fn eval_top(media: Node, context: &mut EvalContext) -> Node {
    let result = if context.media_blocks.len() > 1 {
        let blocks = std::mem::take(&mut context.media_blocks);
        let wrapper = Ruleset::new(vec![Rc::new(empty_selector())], blocks);
        wrapper.multi_media.set(true);
        wrapper.node.copy_visibility_info(media.common());
        Node::Ruleset(Rc::new(wrapper))
    } else {
        media
    };

    context.media_blocks.clear();
    context.media_path.clear();
    result
}

/// A nested media block rewrites its features to the and-joined permutations
/// of every enclosing block's features, and leaves an empty placeholder in
/// the tree (the block itself was hoisted into `media_blocks`).
fn eval_nested(
    features: &RefCell<Node>,
    context: &mut EvalContext,
) -> Result<Node, LessError> {
    let mut path_features: Vec<Vec<Node>> = Vec::new();

    for entry in context.media_path.iter() {
        let f = match entry {
            Node::Media(m) => m.features.borrow().clone(),
            Node::Container(c) => c.features.borrow().clone(),
            other => other.clone(),
        };

        path_features.push(match f {
            Node::Value(list) => list.value,
            single => vec![single],
        });
    }

    let own = match features.borrow().clone() {
        Node::Value(list) => list.value,
        single => vec![single],
    };
    path_features.push(own);

    let mut joined = Vec::new();
    for combination in permute(&path_features) {
        let mut parts = Vec::with_capacity(combination.len() * 2 - 1);

        for (i, fragment) in combination.into_iter().enumerate() {
            if i > 0 {
                parts.push(Node::Anonymous(Anonymous::new("and")));
            }
            parts.push(fragment);
        }

        joined.push(Node::Expression(Expression::new(parts)));
    }

    *features.borrow_mut() = Node::Value(ValueList::new(joined));

    // The hoisted block leaves nothing behind at its source position.
    Ok(Node::Ruleset(Rc::new(Ruleset::new(
        Vec::new(),
        Vec::new(),
    ))))
}

/// Cartesian product of the feature alternatives along the media path.
fn permute(lists: &[Vec<Node>]) -> Vec<Vec<Node>> {
    match lists.split_first() {
        None => Vec::new(),
        Some((first, [])) => first.iter().map(|f| vec![f.clone()]).collect(),
        Some((first, rest)) => {
            let rest_permuted = permute(rest);
            let mut result = Vec::with_capacity(first.len() * rest_permuted.len());

            for f in first {
                for tail in &rest_permuted {
                    let mut combination = Vec::with_capacity(1 + tail.len());
                    combination.push(f.clone());
                    combination.extend(tail.iter().cloned());
                    result.push(combination);
                }
            }

            result
        }
    }
}

/// Prints the inner rules of an at-rule block between braces.
pub(crate) fn output_ruleset(rules: &[Node], output: &mut Output) -> Result<(), LessError> {
    output.indent();

    if output.compress {
        output.add("{");
        for rule in rules {
            rule.gen_css(output)?;
        }
        output.add("}");
        output.outdent();
        return Ok(());
    }

    if rules.is_empty() {
        output.add(" {\n");
        output.outdent();
        output.add_indentation();
        output.add("}");
        return Ok(());
    }

    output.add(" {\n");
    for rule in rules {
        // A root ruleset indents its own children.
        if !matches!(rule, Node::Ruleset(r) if r.root.get()) {
            output.add_indentation();
        }
        rule.gen_css(output)?;
        if !output.ends_with('\n') {
            output.add("\n");
        }
    }

    output.outdent();
    output.add_indentation();
    output.add("}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Keyword;

    #[test]
    fn permute_is_cartesian() {
        let a = vec![
            Node::Keyword(Keyword::new("s1")),
            Node::Keyword(Keyword::new("s2")),
        ];
        let b = vec![Node::Keyword(Keyword::new("print"))];

        let result = permute(&[a, b]);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 2);
    }

    #[test]
    fn atrule_without_block_ends_with_semicolon() {
        let rule = AtRule::new(
            "@charset",
            Some(Node::Keyword(Keyword::new("\"utf-8\""))),
            None,
        );
        assert_eq!(rule.to_css_string(false).unwrap(), "@charset \"utf-8\";");
    }
}
