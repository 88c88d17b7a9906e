//! The final pass before serialization: visibility resolution, empty-block
//! elision, declaration merging, and structural flattening.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::LessError;
use crate::node::Node;
use crate::output::GenCss;
use crate::tree::atrule::{AtRule, Container, Media};
use crate::tree::declaration::{Declaration, MergeMode};
use crate::tree::expression::{Expression, ValueList};
use crate::tree::ruleset::Ruleset;
use crate::tree::selector::Combinator;

/// Marks the whole tree visible, stopping at any node that carries a
/// visibility block: a `reference`-imported subtree stays unmarked, so it is
/// invisible by default and only surfaces when an extend adds an explicitly
/// visible path into it.
///
/// Runs between join-selectors and extend processing, so extend resolution
/// can distinguish "visible by default" from "surfaced by an extend".
pub fn mark_tree_visibility(root: &Rc<Ruleset>, visible: bool) {
    for rule in root.rules.borrow().iter() {
        mark_node(rule, visible);
    }
}

fn mark_common(common: &crate::node::NodeCommon, visible: bool) -> bool {
    if common.blocks_visibility() {
        return false;
    }

    if visible {
        common.ensure_visibility();
    } else {
        common.ensure_invisibility();
    }

    true
}

fn mark_node(node: &Node, visible: bool) {
    if !mark_common(node.common(), visible) {
        return;
    }

    match node {
        Node::Ruleset(r) => {
            for selector in &r.selectors {
                mark_selector(selector, visible);
            }
            for path in r.paths.borrow().iter() {
                for selector in path {
                    mark_selector(selector, visible);
                }
            }
            for rule in r.rules.borrow().iter() {
                mark_node(rule, visible);
            }
        }
        Node::Media(m) => {
            for rule in m.rules.borrow().iter() {
                mark_node(rule, visible);
            }
        }
        Node::Container(c) => {
            for rule in c.rules.borrow().iter() {
                mark_node(rule, visible);
            }
        }
        Node::AtRule(a) => {
            for rule in a.rules.borrow().iter() {
                mark_node(rule, visible);
            }
        }
        Node::Extend(e) => {
            mark_common(&e.selector.node, visible);
        }
        _ => (),
    }
}

fn mark_selector(selector: &Rc<crate::tree::selector::Selector>, visible: bool) {
    if !mark_common(&selector.node, visible) {
        return;
    }

    for extend in &selector.extend_list {
        mark_common(&extend.node, visible);
    }
}

/// The replacing to-CSS pass.
pub struct ToCssVisitor {
    compress: bool,
    charset_seen: bool,
}

impl ToCssVisitor {
    pub fn run(root: &Rc<Ruleset>, compress: bool) -> Result<(), LessError> {
        let mut visitor = ToCssVisitor {
            compress,
            charset_seen: false,
        };

        if root.first_root.get() {
            check_valid_nodes(&root.rules.borrow())?;
        }

        let rules = root.rules.borrow().clone();
        let transformed = visitor.transform_rules(rules)?;
        *root.rules.borrow_mut() = transformed;
        Ok(())
    }

    fn transform_rules(&mut self, rules: Vec<Node>) -> Result<Vec<Node>, LessError> {
        let mut out = Vec::with_capacity(rules.len());
        for rule in rules {
            out.extend(self.transform_node(rule)?);
        }
        Ok(out)
    }

    fn transform_node(&mut self, node: Node) -> Result<Vec<Node>, LessError> {
        match node {
            Node::Declaration(d) => {
                if d.node.blocks_visibility() || d.variable {
                    Ok(Vec::new())
                } else {
                    Ok(vec![Node::Declaration(d)])
                }
            }

            Node::Comment(c) => {
                if c.node.blocks_visibility() || c.is_silent(self.compress) {
                    Ok(Vec::new())
                } else {
                    Ok(vec![Node::Comment(c)])
                }
            }

            Node::MixinDefinition(_) | Node::Extend(_) => Ok(Vec::new()),

            Node::Import(i) => {
                if i.node.blocks_visibility() {
                    Ok(Vec::new())
                } else {
                    Ok(vec![Node::Import(i)])
                }
            }

            Node::Anonymous(a) => {
                if a.node.blocks_visibility() {
                    Ok(Vec::new())
                } else {
                    Ok(vec![Node::Anonymous(a)])
                }
            }

            Node::Ruleset(r) => self.transform_ruleset(r),
            Node::Media(m) => self.transform_media(m),
            Node::Container(c) => self.transform_container(c),
            Node::AtRule(a) => self.transform_atrule(a),

            other => Ok(vec![other]),
        }
    }

    fn transform_ruleset(&mut self, ruleset: Rc<Ruleset>) -> Result<Vec<Node>, LessError> {
        if ruleset.root.get() {
            let rules = ruleset.rules.borrow().clone();
            let transformed = self.transform_rules(rules)?;
            *ruleset.rules.borrow_mut() = transformed;

            return if ruleset.rules.borrow().is_empty() && !ruleset.first_root.get() {
                Ok(Vec::new())
            } else {
                Ok(vec![Node::Ruleset(ruleset)])
            };
        }

        compile_ruleset_paths(&ruleset);

        // Pull nested blocks up to this level; declarations stay inside.
        let rules = ruleset.rules.borrow().clone();
        let mut extracted: Vec<Node> = Vec::new();
        let mut remaining: Vec<Node> = Vec::new();

        for rule in rules {
            let is_block = matches!(&rule, Node::Ruleset(_) | Node::Media(_) | Node::Container(_))
                || matches!(&rule, Node::AtRule(a) if a.has_block());

            if is_block {
                extracted.extend(self.transform_node(rule)?);
            } else {
                remaining.extend(self.transform_node(rule)?);
            }
        }

        merge_rules(&mut remaining)?;
        remove_duplicate_rules(&mut remaining)?;
        *ruleset.rules.borrow_mut() = remaining;

        let visible = if ruleset.node.blocks_visibility() {
            // A blocked ruleset survives only if an extend surfaced one of
            // its paths.
            let has_visible_path = !ruleset.paths.borrow().is_empty();
            if has_visible_path {
                ruleset.node.ensure_visibility();
                ruleset.node.remove_visibility_block();
            }
            has_visible_path && !ruleset.rules.borrow().is_empty()
        } else {
            !ruleset.rules.borrow().is_empty() && !ruleset.paths.borrow().is_empty()
        };

        let mut result = Vec::with_capacity(1 + extracted.len());
        if visible {
            ruleset.node.ensure_visibility();
            result.push(Node::Ruleset(ruleset));
        }
        result.extend(extracted);
        Ok(result)
    }

    fn transform_media(&mut self, media: Rc<Media>) -> Result<Vec<Node>, LessError> {
        self.transform_block_rules(&media.rules)?;

        if resolve_block_visibility(&media.node, &media.rules) {
            media.node.ensure_visibility();
            Ok(vec![Node::Media(media)])
        } else {
            Ok(Vec::new())
        }
    }

    fn transform_container(&mut self, container: Rc<Container>) -> Result<Vec<Node>, LessError> {
        self.transform_block_rules(&container.rules)?;

        if resolve_block_visibility(&container.node, &container.rules) {
            container.node.ensure_visibility();
            Ok(vec![Node::Container(container)])
        } else {
            Ok(Vec::new())
        }
    }

    fn transform_atrule(&mut self, atrule: Rc<AtRule>) -> Result<Vec<Node>, LessError> {
        if !atrule.has_block() {
            if atrule.node.blocks_visibility() {
                return Ok(Vec::new());
            }

            // Only the first `@charset` survives.
            if atrule.is_charset() {
                if self.charset_seen {
                    return Ok(Vec::new());
                }
                self.charset_seen = true;
            }

            return Ok(vec![Node::AtRule(atrule)]);
        }

        self.transform_block_rules(&atrule.rules)?;

        if resolve_block_visibility(&atrule.node, &atrule.rules) {
            atrule.node.ensure_visibility();
            Ok(vec![Node::AtRule(atrule)])
        } else {
            Ok(Vec::new())
        }
    }

    /// Transforms the single inner root ruleset of a media/at-rule block.
    fn transform_block_rules(
        &mut self,
        rules: &std::cell::RefCell<Vec<Node>>,
    ) -> Result<(), LessError> {
        let inner = rules.borrow().clone();
        let mut transformed = Vec::with_capacity(inner.len());

        for rule in inner {
            transformed.extend(self.transform_node(rule)?);
        }

        *rules.borrow_mut() = transformed;
        Ok(())
    }
}

/// Filters a ruleset's paths down to the ones that produce output, fixing
/// the leading combinator of each kept path.
fn compile_ruleset_paths(ruleset: &Rc<Ruleset>) {
    let paths = ruleset.paths.borrow().clone();

    let kept: Vec<_> = paths
        .into_iter()
        .filter_map(|mut path| {
            // A leading descendant combinator is an artifact of joining.
            if let Some(first) = path.first() {
                if first.elements.first().map(|e| e.combinator.value == " ") == Some(true) {
                    let mut elements = first.elements.clone();
                    elements[0].combinator = Combinator::none();
                    let fixed = first.derive(elements, first.extend_list.clone());
                    fixed.node.copy_visibility_info(&first.node);
                    fixed.evald_condition.set(first.evald_condition.get());
                    path[0] = Rc::new(fixed);
                }
            }

            let visible = path
                .iter()
                .any(|s| s.node.is_visible() == Some(true) && s.evald_condition.get());

            if visible {
                Some(path)
            } else {
                None
            }
        })
        .collect();

    *ruleset.paths.borrow_mut() = kept;
}

/// A body block survives when, after visibility filtering, it still has
/// content.  Blocked blocks must contain explicitly surfaced children.
fn resolve_block_visibility(
    node: &crate::node::NodeCommon,
    rules: &std::cell::RefCell<Vec<Node>>,
) -> bool {
    let is_empty = block_is_empty(rules);

    if !node.blocks_visibility() {
        return !is_empty;
    }

    // Keep only visible children of the inner root.
    if let Some(Node::Ruleset(inner)) = rules.borrow().first() {
        let kept: Vec<Node> = inner
            .rules
            .borrow()
            .iter()
            .filter(|r| r.common().is_visible() == Some(true))
            .cloned()
            .collect();
        *inner.rules.borrow_mut() = kept;
    }

    if block_is_empty(rules) {
        return false;
    }

    node.remove_visibility_block();
    true
}

fn block_is_empty(rules: &std::cell::RefCell<Vec<Node>>) -> bool {
    match rules.borrow().first() {
        Some(Node::Ruleset(inner)) => inner.rules.borrow().is_empty(),
        Some(_) => false,
        None => true,
    }
}

/// `Properties must be inside selector blocks`: declarations cannot sit at
/// the stylesheet root.
fn check_valid_nodes(rules: &[Node]) -> Result<(), LessError> {
    for rule in rules {
        if let Node::Declaration(d) = rule {
            if !d.variable {
                return Err(LessError::syntax(
                    "properties must be inside selector blocks; they cannot be in the root",
                )
                .at(d.node.index, d.node.file_info.as_deref()));
            }
        }
    }

    Ok(())
}

/// Combines `prop+:` (comma) and `prop+_:` (space) declarations into the
/// first declaration of each group.
fn merge_rules(rules: &mut Vec<Node>) -> Result<(), LessError> {
    let mut groups: HashMap<String, Vec<Declaration>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    let mut i = 0;
    while i < rules.len() {
        let is_mergeable = matches!(
            &rules[i],
            Node::Declaration(d) if d.merge != MergeMode::None
        );

        if !is_mergeable {
            i += 1;
            continue;
        }

        let Node::Declaration(d) = rules.remove(i) else {
            unreachable!()
        };
        let name = d.name_str().to_string();

        if !groups.contains_key(&name) {
            order.push(name.clone());
            // The first of the group keeps its slot.
            rules.insert(i, Node::Declaration(d.clone()));
            i += 1;
        }

        groups.entry(name).or_default().push(*d);
    }

    for name in order {
        let group = groups.remove(&name).unwrap_or_default();
        if group.len() < 2 {
            continue;
        }

        let mut comma_parts: Vec<Vec<Node>> = vec![Vec::new()];
        let mut important = None;

        for decl in &group {
            if decl.merge == MergeMode::Comma && !comma_parts.last().unwrap().is_empty() {
                comma_parts.push(Vec::new());
            }
            comma_parts.last_mut().unwrap().push(decl.value.clone());
            if decl.important.is_some() {
                important = decl.important.clone();
            }
        }

        let value = Node::Value(ValueList::new(
            comma_parts
                .into_iter()
                .map(|space| {
                    if space.len() == 1 {
                        space.into_iter().next().unwrap()
                    } else {
                        Node::Expression(Expression::new(space))
                    }
                })
                .collect(),
        ));

        // Replace the kept first declaration with the merged result.
        for rule in rules.iter_mut() {
            if let Node::Declaration(d) = rule {
                if d.name_str() == name && d.merge != MergeMode::None {
                    d.value = value.clone();
                    d.important = important.clone();
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Identical declarations of the same property collapse to the last one.
fn remove_duplicate_rules(rules: &mut Vec<Node>) -> Result<(), LessError> {
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    let mut remove: Vec<usize> = Vec::new();

    for (i, rule) in rules.iter().enumerate().rev() {
        let Node::Declaration(d) = rule else {
            continue;
        };
        if d.variable {
            continue;
        }

        let name = d.name_str().to_string();
        let css = d.to_css_string(false)?;

        let entries = seen.entry(name).or_default();
        if entries.contains(&css) {
            remove.push(i);
        } else {
            entries.push(css);
        }
    }

    remove.sort_unstable();
    for i in remove.into_iter().rev() {
        rules.remove(i);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Keyword;

    fn decl(name: &str, value: &str, merge: MergeMode) -> Node {
        let mut d = Declaration::new(name, Node::Keyword(Keyword::new(value)));
        d.merge = merge;
        Node::Declaration(Box::new(d))
    }

    #[test]
    fn merges_comma_declarations() {
        let mut rules = vec![
            decl("transition", "color", MergeMode::Comma),
            decl("transition", "opacity", MergeMode::Comma),
        ];
        merge_rules(&mut rules).unwrap();

        assert_eq!(rules.len(), 1);
        let Node::Declaration(d) = &rules[0] else { panic!() };
        assert_eq!(d.to_css_string(false).unwrap(), "transition: color, opacity;");
    }

    #[test]
    fn merges_space_declarations() {
        let mut rules = vec![
            decl("box-shadow", "inset", MergeMode::Comma),
            decl("box-shadow", "gold", MergeMode::Space),
        ];
        merge_rules(&mut rules).unwrap();

        assert_eq!(rules.len(), 1);
        let Node::Declaration(d) = &rules[0] else { panic!() };
        assert_eq!(d.to_css_string(false).unwrap(), "box-shadow: inset gold;");
    }

    #[test]
    fn removes_exact_duplicates_keeping_last() {
        let mut rules = vec![
            decl("color", "red", MergeMode::None),
            decl("color", "blue", MergeMode::None),
            decl("color", "red", MergeMode::None),
        ];
        remove_duplicate_rules(&mut rules).unwrap();

        assert_eq!(rules.len(), 2);
        let Node::Declaration(first) = &rules[0] else { panic!() };
        assert_eq!(first.to_css_string(false).unwrap(), "color: blue;");
    }

    #[test]
    fn declarations_at_root_are_rejected() {
        let rules = vec![decl("color", "red", MergeMode::None)];
        assert!(check_valid_nodes(&rules).is_err());
    }
}
