//! The join-selector pass: computes absolute selector paths for every
//! ruleset, resolving `&` parent references and nesting.

use std::rc::Rc;

use crate::error::LessError;
use crate::node::Node;
use crate::tree::atrule::{AtRule, Container, Media};
use crate::tree::declaration::Declaration;
use crate::tree::mixin::MixinDefinition;
use crate::tree::ruleset::{Ruleset, SelectorPath};
use crate::tree::selector::{Element, Selector};

use super::{visit_node, VisitArgs, Visitor};

/// One entry of the nesting context: the absolute paths of the enclosing
/// ruleset, plus whether that ruleset is a multi-media wrapper.
struct JoinContext {
    paths: Vec<SelectorPath>,
    multi_media: bool,
}

pub struct JoinSelectorVisitor {
    contexts: Vec<JoinContext>,
}

impl Default for JoinSelectorVisitor {
    fn default() -> Self {
        JoinSelectorVisitor::new()
    }
}

impl JoinSelectorVisitor {
    pub fn new() -> JoinSelectorVisitor {
        JoinSelectorVisitor {
            contexts: vec![JoinContext {
                paths: Vec::new(),
                multi_media: false,
            }],
        }
    }

    pub fn run(&mut self, root: &Rc<Ruleset>) -> Result<(), LessError> {
        visit_node(self, &Node::Ruleset(root.clone()))
    }
}

impl Visitor for JoinSelectorVisitor {
    fn visit_declaration(
        &mut self,
        _declaration: &Declaration,
        args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        args.visit_deeper = false;
        Ok(())
    }

    fn visit_mixin_definition(
        &mut self,
        _definition: &Rc<MixinDefinition>,
        args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        args.visit_deeper = false;
        Ok(())
    }

    fn visit_ruleset(
        &mut self,
        ruleset: &Rc<Ruleset>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        let mut paths: Vec<SelectorPath> = Vec::new();

        if !ruleset.root.get() {
            let parent = self.contexts.last().expect("context stack is never empty");

            // Guards that evaluated false drop their selectors here.
            let selectors: Vec<Rc<Selector>> = ruleset
                .selectors
                .iter()
                .filter(|s| s.evald_condition.get())
                .cloned()
                .collect();

            if selectors.is_empty() {
                ruleset.rules.borrow_mut().clear();
            } else {
                for selector in &selectors {
                    join_selector(&mut paths, &parent.paths, selector);
                }
            }

            *ruleset.paths.borrow_mut() = paths.clone();
        }

        self.contexts.push(JoinContext {
            paths,
            multi_media: ruleset.multi_media.get(),
        });

        Ok(())
    }

    fn visit_ruleset_out(&mut self, _ruleset: &Rc<Ruleset>) -> Result<(), LessError> {
        self.contexts.pop();
        Ok(())
    }

    fn visit_media(&mut self, media: &Rc<Media>, _args: &mut VisitArgs) -> Result<(), LessError> {
        let context = self.contexts.last().expect("context stack is never empty");
        set_inner_root(
            &media.rules.borrow(),
            context.paths.is_empty() || context.multi_media,
        );
        Ok(())
    }

    fn visit_container(
        &mut self,
        container: &Rc<Container>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        let context = self.contexts.last().expect("context stack is never empty");
        set_inner_root(
            &container.rules.borrow(),
            context.paths.is_empty() || context.multi_media,
        );
        Ok(())
    }

    fn visit_atrule(&mut self, atrule: &Rc<AtRule>, _args: &mut VisitArgs) -> Result<(), LessError> {
        let context = self.contexts.last().expect("context stack is never empty");

        // Bubbling directives (`@supports`, `@document`) let the rules
        // inside keep joining with outer selectors; rooted ones do not.
        set_inner_root(
            &atrule.rules.borrow(),
            atrule.is_rooted || context.paths.is_empty(),
        );
        Ok(())
    }
}

fn set_inner_root(rules: &[Node], root: bool) {
    if let Some(Node::Ruleset(inner)) = rules.first() {
        inner.root.set(root);
    }
}

/// Computes the absolute paths for one selector against the parent context.
pub fn join_selector(
    paths: &mut Vec<SelectorPath>,
    context: &[SelectorPath],
    selector: &Rc<Selector>,
) {
    let mut new_paths: Vec<Vec<Selector>> = Vec::new();
    let had_parent = replace_parent_selector(&mut new_paths, context, selector);

    if had_parent {
        for path in new_paths {
            paths.push(path.into_iter().map(Rc::new).collect());
        }
    } else if context.is_empty() {
        paths.push(vec![selector.clone()]);
    } else {
        for ctx_path in context {
            let mut path = ctx_path.clone();
            path.push(selector.clone());
            paths.push(path);
        }
    }
}

/// Expands `&` references; returns whether any were found.
fn replace_parent_selector(
    paths: &mut Vec<Vec<Selector>>,
    context: &[SelectorPath],
    selector: &Rc<Selector>,
) -> bool {
    let mut had_parent = false;
    let mut current_elements: Vec<Element> = Vec::new();
    let mut new_selectors: Vec<Vec<Selector>> = vec![Vec::new()];

    for element in &selector.elements {
        if !element.is_parent_reference() {
            current_elements.push(element.clone());
            continue;
        }

        had_parent = true;
        merge_elements_onto_selectors(std::mem::take(&mut current_elements), &mut new_selectors);

        let mut multiplied: Vec<Vec<Selector>> = Vec::new();

        for sel_path in &new_selectors {
            if context.is_empty() {
                // `&` with no parent contributes nothing but keeps its
                // combinator for whatever follows.
                let mut path = sel_path.clone();
                if let Some(last) = path.last_mut() {
                    last.elements
                        .push(Element::new(element.combinator.clone(), ""));
                }
                multiplied.push(path);
            } else {
                for ctx_path in context {
                    multiplied.push(add_replacement_into_path(
                        sel_path, ctx_path, element, selector,
                    ));
                }
            }
        }

        new_selectors = multiplied;
    }

    merge_elements_onto_selectors(current_elements, &mut new_selectors);

    if had_parent {
        for mut path in new_selectors {
            if path.is_empty() {
                continue;
            }

            // The final selector of the path carries the original's extends.
            let last = path.pop().expect("non-empty path");
            let derived = selector.derive(last.elements, selector.extend_list.clone());
            path.push(derived);
            paths.push(path);
        }
    }

    had_parent
}

/// Pastes one parent path into a partially built path at a `&` position.
fn add_replacement_into_path(
    beginning: &[Selector],
    parent_path: &SelectorPath,
    replaced_element: &Element,
    original: &Rc<Selector>,
) -> Vec<Selector> {
    let mut result: Vec<Selector> = Vec::new();

    // Everything before the `&`, minus the selector the parent glues onto.
    let mut joined_elements: Vec<Element> = Vec::new();
    if !beginning.is_empty() {
        result.extend(beginning[..beginning.len() - 1].iter().cloned());
        joined_elements = beginning[beginning.len() - 1].elements.clone();
    }

    if let Some(first_parent) = parent_path.first() {
        // The `&`'s combinator attaches the parent's first element; if the
        // parent element brings its own combinator, that one wins.
        let mut combinator = replaced_element.combinator.clone();
        if let Some(parent_el) = first_parent.elements.first() {
            if combinator.is_empty_or_whitespace() && !parent_el.combinator.is_empty_or_whitespace()
            {
                combinator = parent_el.combinator.clone();
            }

            let mut pasted = parent_el.clone();
            pasted.combinator = combinator;
            joined_elements.push(pasted);
            joined_elements.extend(first_parent.elements[1..].iter().cloned());
        }
    }

    if !joined_elements.is_empty() {
        result.push(original.derive(joined_elements, Vec::new()));
    }

    // The rest of the parent path follows, stripped of its extends.
    for ancestor in parent_path.iter().skip(1) {
        result.push(ancestor.derive(ancestor.elements.clone(), Vec::new()));
    }

    result
}

fn merge_elements_onto_selectors(elements: Vec<Element>, selectors: &mut Vec<Vec<Selector>>) {
    if elements.is_empty() {
        return;
    }

    if selectors.is_empty() {
        selectors.push(vec![Selector::new(elements)]);
        return;
    }

    for path in selectors.iter_mut() {
        match path.last_mut() {
            Some(last) => {
                let mut merged = last.elements.clone();
                merged.extend(elements.iter().cloned());
                *last = last.derive(merged, last.extend_list.clone());
            }
            None => path.push(Selector::new(elements.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{GenCss, Output};
    use crate::tree::selector::Combinator;

    fn selector(parts: &[(&str, &str)]) -> Rc<Selector> {
        Rc::new(Selector::new(
            parts
                .iter()
                .map(|(c, v)| Element::new(Combinator::new(c), *v))
                .collect(),
        ))
    }

    fn path_css(path: &SelectorPath) -> String {
        let mut out = Output::new(false, false);
        out.first_selector = true;
        for s in path {
            s.gen_css(&mut out).unwrap();
            out.first_selector = false;
        }
        out.into_string()
    }

    #[test]
    fn nesting_without_parent_reference_appends() {
        let context = vec![vec![selector(&[("", ".p")])]];
        let mut paths = Vec::new();
        join_selector(&mut paths, &context, &selector(&[("", ".c")]));

        assert_eq!(paths.len(), 1);
        assert_eq!(path_css(&paths[0]), ".p .c");
    }

    #[test]
    fn parent_suffix_glues_to_last_element() {
        let context = vec![vec![selector(&[("", ".a")]), selector(&[("", ".b")])]];
        let mut paths = Vec::new();
        join_selector(&mut paths, &context, &selector(&[("", "&"), ("", ".c")]));

        assert_eq!(paths.len(), 1);
        assert_eq!(path_css(&paths[0]), ".a .b.c");
    }

    #[test]
    fn parent_prefix_glues_before_first_element() {
        let context = vec![vec![selector(&[("", ".a")]), selector(&[("", ".b")])]];
        let mut paths = Vec::new();
        join_selector(&mut paths, &context, &selector(&[("", ".c"), ("", "&")]));

        assert_eq!(paths.len(), 1);
        assert_eq!(path_css(&paths[0]), ".c.a .b");
    }

    #[test]
    fn double_parent_repeats_path() {
        let context = vec![vec![selector(&[("", ".p")])]];
        let mut paths = Vec::new();
        join_selector(&mut paths, &context, &selector(&[("", "&"), (" ", "&")]));

        assert_eq!(paths.len(), 1);
        assert_eq!(path_css(&paths[0]), ".p .p");
    }

    #[test]
    fn cartesian_expansion_over_multiple_parents() {
        let context = vec![
            vec![selector(&[("", ".a")])],
            vec![selector(&[("", ".b")])],
        ];
        let mut paths = Vec::new();
        join_selector(&mut paths, &context, &selector(&[("", "&"), ("", ":hover")]));

        assert_eq!(paths.len(), 2);
        assert_eq!(path_css(&paths[0]), ".a:hover");
        assert_eq!(path_css(&paths[1]), ".b:hover");
    }

    #[test]
    fn child_combinator_survives_join() {
        let context = vec![vec![selector(&[("", ".p")])]];
        let mut paths = Vec::new();
        join_selector(&mut paths, &context, &selector(&[(">", "&")]));

        // `> &` keeps the child combinator in front of the pasted parent.
        assert_eq!(paths.len(), 1);
        assert_eq!(path_css(&paths[0]), " > .p");
    }
}
