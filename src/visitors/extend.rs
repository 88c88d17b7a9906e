//! Extend resolution: collecting `:extend` declarations, chaining them, and
//! rewriting matching selector paths.

use std::collections::HashSet;
use std::rc::Rc;

use crate::arena::Arena;
use crate::error::LessError;
use crate::less_log;
use crate::node::Node;
use crate::output::{GenCss, Output};
use crate::session::Session;
use crate::tree::atrule::{AtRule, Container, Media};
use crate::tree::declaration::Declaration;
use crate::tree::extend::Extend;
use crate::tree::mixin::MixinDefinition;
use crate::tree::ruleset::{Ruleset, SelectorPath};
use crate::tree::selector::{Element, ElementValue, Selector};

use super::{visit_node, VisitArgs, Visitor};

/// Transitive chains deeper than this abort as circular.
const MAX_CHAIN_DEPTH: usize = 100;

/// First pass: walk rulesets and collect extends into the nearest enclosing
/// media/at-rule scope (or the root).
pub struct ExtendFinderVisitor<'a> {
    arena: &'a mut Arena<Rc<Extend>>,

    /// Stacks of collected extends; the innermost scope is last.  Entries
    /// are flushed into the owning node's `all_extends` on scope exit.
    scopes: Vec<Vec<Rc<Extend>>>,

    pub found_extends: bool,
}

impl<'a> ExtendFinderVisitor<'a> {
    pub fn new(arena: &'a mut Arena<Rc<Extend>>) -> ExtendFinderVisitor<'a> {
        ExtendFinderVisitor {
            arena,
            scopes: vec![Vec::new()],
            found_extends: false,
        }
    }

    pub fn run(&mut self, root: &Rc<Ruleset>) -> Result<(), LessError> {
        visit_node(self, &Node::Ruleset(root.clone()))?;

        let top = self.scopes.pop().unwrap_or_default();
        *root.all_extends.borrow_mut() = top;
        Ok(())
    }
}

impl Visitor for ExtendFinderVisitor<'_> {
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
        if ruleset.root.get() {
            return Ok(());
        }

        // `&:extend(...);` rules apply to every selector path of the block.
        let rule_extends: Vec<Rc<Extend>> = ruleset
            .rules
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Node::Extend(e) => Some(e.clone()),
                _ => None,
            })
            .collect();

        if !rule_extends.is_empty() {
            ruleset.extend_on_every_path.set(true);
        }

        let paths = ruleset.paths.borrow().clone();
        for path in &paths {
            let Some(last_selector) = path.last() else {
                continue;
            };

            let mut extend_list: Vec<Rc<Extend>> = last_selector
                .extend_list
                .iter()
                .map(|e| Rc::new(e.derive()))
                .collect();
            extend_list.extend(rule_extends.iter().map(|e| Rc::new(e.derive())));

            for (j, extend) in extend_list.into_iter().enumerate() {
                self.found_extends = true;
                extend.find_self_selectors(std::slice::from_ref(path));
                *extend.ruleset.borrow_mut() = Some(ruleset.clone());

                if j == 0 {
                    extend.first_extend_on_this_selector_path.set(true);
                }

                extend.register(self.arena);

                if let Some(scope) = self.scopes.last_mut() {
                    scope.push(extend);
                }
            }
        }

        Ok(())
    }

    fn visit_media(&mut self, _media: &Rc<Media>, _args: &mut VisitArgs) -> Result<(), LessError> {
        self.scopes.push(Vec::new());
        Ok(())
    }

    fn visit_media_out(&mut self, media: &Rc<Media>) -> Result<(), LessError> {
        let collected = self.scopes.pop().unwrap_or_default();
        *media.all_extends.borrow_mut() = collected;
        Ok(())
    }

    fn visit_container(
        &mut self,
        _container: &Rc<Container>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        self.scopes.push(Vec::new());
        Ok(())
    }

    fn visit_container_out(&mut self, container: &Rc<Container>) -> Result<(), LessError> {
        let collected = self.scopes.pop().unwrap_or_default();
        *container.all_extends.borrow_mut() = collected;
        Ok(())
    }

    fn visit_atrule(&mut self, _atrule: &Rc<AtRule>, _args: &mut VisitArgs) -> Result<(), LessError> {
        self.scopes.push(Vec::new());
        Ok(())
    }

    fn visit_atrule_out(&mut self, atrule: &Rc<AtRule>) -> Result<(), LessError> {
        let collected = self.scopes.pop().unwrap_or_default();
        *atrule.all_extends.borrow_mut() = collected;
        Ok(())
    }
}

/// One successful anchor of a needle selector inside a haystack path.
#[derive(Clone)]
struct Match {
    path_index: usize,
    index: usize,
    initial_combinator: crate::tree::selector::Combinator,
    end_path_index: usize,
    end_path_element_index: usize,
}

/// In-progress anchor while scanning.
struct PotentialMatch {
    path_index: usize,
    index: usize,
    matched: usize,
    initial_combinator: crate::tree::selector::Combinator,
}

/// Second pass: chain extends transitively and rewrite every matching
/// selector path.
pub struct ProcessExtendsVisitor<'a> {
    arena: &'a mut Arena<Rc<Extend>>,
    session: Session,

    /// Scope stack of active extends, innermost last.
    extends_stack: Vec<Vec<Rc<Extend>>>,
}

impl<'a> ProcessExtendsVisitor<'a> {
    pub fn new(arena: &'a mut Arena<Rc<Extend>>, session: Session) -> ProcessExtendsVisitor<'a> {
        ProcessExtendsVisitor {
            arena,
            session,
            extends_stack: Vec::new(),
        }
    }

    pub fn run(&mut self, root: &Rc<Ruleset>) -> Result<(), LessError> {
        let mut finder = ExtendFinderVisitor::new(self.arena);
        finder.run(root)?;

        if !finder.found_extends {
            return Ok(());
        }

        let all = root.all_extends.borrow().clone();
        let chained = self.chain_extends(&all, &all, 0)?;
        root.all_extends.borrow_mut().extend(chained);

        self.extends_stack = vec![root.all_extends.borrow().clone()];
        visit_node(self, &Node::Ruleset(root.clone()))?;

        self.warn_on_unmatched(&root.all_extends.borrow());
        Ok(())
    }

    fn warn_on_unmatched(&self, extends: &[Rc<Extend>]) {
        let mut reported = HashSet::new();

        for extend in extends {
            // Chained products carry more than one parent id; only original
            // extends warn.
            if extend.has_found_matches.get() || extend.parent_ids.borrow().len() != 1 {
                continue;
            }

            let selector = selector_css(&extend.selector).unwrap_or_else(|_| "_unknown_".into());
            let key = (extend.node.index, selector.clone());
            if reported.insert(key) {
                less_log!(self.session, "WARNING: extend '{}' has no matches", selector);
            }
        }
    }

    /// Computes the transitive closure: an extend whose target matches
    /// another extend's replacement selector spawns a chained extend.
    fn chain_extends(
        &mut self,
        extends: &[Rc<Extend>],
        targets: &[Rc<Extend>],
        depth: usize,
    ) -> Result<Vec<Rc<Extend>>, LessError> {
        let mut to_add: Vec<Rc<Extend>> = Vec::new();

        for extend in extends {
            for target in targets {
                // Already derived from this target: a cycle.
                if extend
                    .parent_ids
                    .borrow()
                    .contains(&target.object_id.get())
                {
                    continue;
                }

                let target_selfs = target.self_selectors.borrow();
                let Some(target_self) = target_selfs.first() else {
                    continue;
                };
                let haystack = vec![target_self.clone()];

                let matches = find_match(extend, &haystack)?;
                if matches.is_empty() {
                    continue;
                }

                extend.has_found_matches.set(true);

                for self_selector in extend.self_selectors.borrow().iter() {
                    let new_path =
                        extend_selector(&matches, &haystack, self_selector, extend.is_visible())?;

                    let chained = Extend::new(target.selector.clone(), target.option);
                    chained.node.copy_visibility_info(&target.node);
                    let chained = Rc::new(chained);

                    *chained.self_selectors.borrow_mut() = new_path.clone();
                    *chained.ruleset.borrow_mut() = target.ruleset.borrow().clone();

                    let id = self.arena.alloc(chained.clone());
                    chained.object_id.set(id);
                    {
                        let mut parents = chained.parent_ids.borrow_mut();
                        parents.push(id);
                        parents.extend(target.parent_ids.borrow().iter().copied());
                        parents.extend(extend.parent_ids.borrow().iter().copied());
                    }

                    if target.first_extend_on_this_selector_path.get() {
                        chained.first_extend_on_this_selector_path.set(true);
                        if let Some(ruleset) = target.ruleset.borrow().as_ref() {
                            ruleset.paths.borrow_mut().push(new_path);
                        }
                    }

                    to_add.push(chained);
                }
            }
        }

        if to_add.is_empty() {
            return Ok(to_add);
        }

        if depth > MAX_CHAIN_DEPTH {
            let selector = to_add
                .first()
                .map(|e| selector_css(&e.selector).unwrap_or_default())
                .unwrap_or_default();
            return Err(LessError::runtime(format!(
                "extend circular reference detected; one of the circular extends is currently:\
                 {selector}"
            )));
        }

        let mut result = to_add.clone();
        result.extend(self.chain_extends(&to_add, targets, depth + 1)?);
        Ok(result)
    }

    fn process_ruleset(&mut self, ruleset: &Rc<Ruleset>) -> Result<(), LessError> {
        if ruleset.root.get() {
            return Ok(());
        }

        let all_extends = self
            .extends_stack
            .last()
            .cloned()
            .unwrap_or_default();

        let paths = ruleset.paths.borrow().clone();
        let mut paths_to_add: Vec<SelectorPath> = Vec::new();

        for extend in &all_extends {
            for path in &paths {
                // A block that extends on every path must not extend into
                // itself; paths that themselves carry extends are skipped
                // too, chaining handles those.
                if ruleset.extend_on_every_path.get() {
                    continue;
                }

                let has_extends = path
                    .last()
                    .map(|s| !s.extend_list.is_empty())
                    .unwrap_or(false);
                if has_extends {
                    continue;
                }

                let matches = find_match(extend, path)?;
                if matches.is_empty() {
                    continue;
                }

                extend.has_found_matches.set(true);

                for self_selector in extend.self_selectors.borrow().iter() {
                    paths_to_add.push(extend_selector(
                        &matches,
                        path,
                        self_selector,
                        extend.is_visible(),
                    )?);
                }
            }
        }

        if !paths_to_add.is_empty() {
            let mut all_paths = ruleset.paths.borrow_mut();
            all_paths.extend(paths_to_add);
            dedupe_paths(&mut all_paths)?;
        }

        Ok(())
    }
}

impl Visitor for ProcessExtendsVisitor<'_> {
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
        self.process_ruleset(ruleset)
    }

    fn visit_media(&mut self, media: &Rc<Media>, _args: &mut VisitArgs) -> Result<(), LessError> {
        self.push_scope(media.all_extends.borrow().clone())
    }

    fn visit_media_out(&mut self, _media: &Rc<Media>) -> Result<(), LessError> {
        self.extends_stack.pop();
        Ok(())
    }

    fn visit_container(
        &mut self,
        container: &Rc<Container>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        self.push_scope(container.all_extends.borrow().clone())
    }

    fn visit_container_out(&mut self, _container: &Rc<Container>) -> Result<(), LessError> {
        self.extends_stack.pop();
        Ok(())
    }

    fn visit_atrule(&mut self, atrule: &Rc<AtRule>, _args: &mut VisitArgs) -> Result<(), LessError> {
        self.push_scope(atrule.all_extends.borrow().clone())
    }

    fn visit_atrule_out(&mut self, _atrule: &Rc<AtRule>) -> Result<(), LessError> {
        self.extends_stack.pop();
        Ok(())
    }
}

impl ProcessExtendsVisitor<'_> {
    /// Entering a media/at-rule scope: its own extends join the enclosing
    /// ones, chained against each other.
    fn push_scope(&mut self, own: Vec<Rc<Extend>>) -> Result<(), LessError> {
        let mut combined = own.clone();
        combined.extend(self.extends_stack.last().cloned().unwrap_or_default());

        let chained = self.chain_extends(&combined, &own, 0)?;
        combined.extend(chained);

        self.extends_stack.push(combined);
        Ok(())
    }
}

/// Scans a selector path left to right for anchors of the extend's target.
fn find_match(extend: &Rc<Extend>, path: &[Rc<Selector>]) -> Result<Vec<Match>, LessError> {
    let needle = &extend.selector.elements;
    let mut potential: Vec<PotentialMatch> = Vec::new();
    let mut matches: Vec<Match> = Vec::new();

    for (path_index, haystack_selector) in path.iter().enumerate() {
        for (element_index, haystack_element) in haystack_selector.elements.iter().enumerate() {
            if extend.allow_before || (path_index == 0 && element_index == 0) {
                potential.push(PotentialMatch {
                    path_index,
                    index: element_index,
                    matched: 0,
                    initial_combinator: haystack_element.combinator.clone(),
                });
            }

            let mut i = 0;
            while i < potential.len() {
                let keep = advance_potential_match(
                    &mut potential[i],
                    needle,
                    haystack_element,
                    element_index,
                )?;

                if !keep {
                    potential.remove(i);
                    continue;
                }

                let finished = potential[i].matched == needle.len();
                if finished {
                    let at_end = element_index + 1 == haystack_selector.elements.len()
                        && path_index + 1 == path.len();

                    if !extend.allow_after && !at_end {
                        potential.remove(i);
                        continue;
                    }

                    let m = &potential[i];
                    matches.push(Match {
                        path_index: m.path_index,
                        index: m.index,
                        initial_combinator: m.initial_combinator.clone(),
                        end_path_index: path_index,
                        end_path_element_index: element_index + 1,
                    });
                    potential.clear();
                    break;
                }

                i += 1;
            }
        }
    }

    Ok(matches)
}

/// Advances one potential match by one haystack element; false means the
/// anchor failed.
fn advance_potential_match(
    potential: &mut PotentialMatch,
    needle: &[Element],
    haystack_element: &Element,
    element_index: usize,
) -> Result<bool, LessError> {
    let mut target_combinator = haystack_element.combinator.value.as_str();
    if target_combinator.is_empty() && element_index == 0 {
        target_combinator = " ";
    }

    let needle_element = &needle[potential.matched];

    if !element_values_equal(needle_element, haystack_element)? {
        return Ok(false);
    }

    if potential.matched > 0 && needle_element.combinator.value != target_combinator {
        return Ok(false);
    }

    potential.matched += 1;
    Ok(true)
}

/// Element identity for matching: strings, attributes, or CSS text.
fn element_values_equal(a: &Element, b: &Element) -> Result<bool, LessError> {
    match (&a.value, &b.value) {
        (ElementValue::Str(x), ElementValue::Str(y)) => Ok(x == y),
        (ElementValue::Node(x), ElementValue::Node(y)) => match (x.as_ref(), y.as_ref()) {
            (Node::Attribute(ax), Node::Attribute(ay)) => {
                let values_equal = match (&ax.value, &ay.value) {
                    (None, None) => true,
                    (Some(vx), Some(vy)) => {
                        vx.to_css_string(false)? == vy.to_css_string(false)?
                    }
                    _ => false,
                };
                Ok(ax.key == ay.key && ax.op == ay.op && values_equal && ax.cif == ay.cif)
            }
            (x, y) => Ok(x.to_css_string(false)? == y.to_css_string(false)?),
        },
        _ => Ok(a.value_to_css()? == b.value_to_css()?),
    }
}

/// Builds the replacement path for a matched extend: the haystack around
/// each match, with the extend's self selector spliced in.
fn extend_selector(
    matches: &[Match],
    path: &[Rc<Selector>],
    replacement: &Rc<Selector>,
    visible: bool,
) -> Result<SelectorPath, LessError> {
    let mut current_path_index = 0;
    let mut current_element_index = 0;
    let mut out: Vec<Selector> = Vec::new();

    for (match_index, m) in matches.iter().enumerate() {
        let selector = &path[m.path_index];

        let first_replacement_element = {
            let template = &replacement.elements[0];
            let mut e = template.clone();
            e.combinator = m.initial_combinator.clone();
            e
        };

        if m.path_index > current_path_index && current_element_index > 0 {
            if let Some(last) = out.last_mut() {
                let mut merged = last.elements.clone();
                merged.extend(
                    path[current_path_index].elements[current_element_index..]
                        .iter()
                        .cloned(),
                );
                *last = last.derive(merged, Vec::new());
            }
            current_element_index = 0;
            current_path_index += 1;
        }

        let mut new_elements: Vec<Element> =
            selector.elements[current_element_index..m.index].to_vec();
        new_elements.push(first_replacement_element);
        new_elements.extend(replacement.elements[1..].iter().cloned());

        if current_path_index == m.path_index && match_index > 0 {
            if let Some(last) = out.last_mut() {
                let mut merged = last.elements.clone();
                merged.extend(new_elements);
                *last = last.derive(merged, Vec::new());
            }
        } else {
            out.extend(
                path[current_path_index..m.path_index]
                    .iter()
                    .map(|s| (**s).clone()),
            );
            out.push(Selector::new(new_elements));
        }

        current_path_index = m.end_path_index;
        current_element_index = m.end_path_element_index;

        if current_path_index < path.len()
            && current_element_index >= path[current_path_index].elements.len()
        {
            current_element_index = 0;
            current_path_index += 1;
        }
    }

    if current_path_index < path.len() && current_element_index > 0 {
        if let Some(last) = out.last_mut() {
            let mut merged = last.elements.clone();
            merged.extend(
                path[current_path_index].elements[current_element_index..]
                    .iter()
                    .cloned(),
            );
            *last = last.derive(merged, Vec::new());
        }
        current_path_index += 1;
    }

    out.extend(
        path[current_path_index..]
            .iter()
            .map(|s| (**s).clone()),
    );

    let result: SelectorPath = out
        .into_iter()
        .map(|s| {
            let derived = s.derive(s.elements.clone(), Vec::new());
            derived.evald_condition.set(true);
            if visible {
                derived.node.ensure_visibility();
            } else {
                derived.node.ensure_invisibility();
            }
            Rc::new(derived)
        })
        .collect();

    Ok(result)
}

/// Removes duplicate paths by their CSS text, preferring a visible copy
/// over an invisible one.
fn dedupe_paths(paths: &mut Vec<SelectorPath>) -> Result<(), LessError> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut kept: Vec<SelectorPath> = Vec::new();

    for path in paths.drain(..) {
        let css = path_css(&path)?;
        let visible = path
            .iter()
            .all(|s| s.node.is_visible() != Some(false));

        match seen.get(&css) {
            None => {
                seen.insert(css, kept.len());
                kept.push(path);
            }
            Some(&index) => {
                let existing_visible = kept[index]
                    .iter()
                    .all(|s| s.node.is_visible() != Some(false));
                if visible && !existing_visible {
                    kept[index] = path;
                }
            }
        }
    }

    *paths = kept;
    Ok(())
}

fn path_css(path: &SelectorPath) -> Result<String, LessError> {
    let mut out = Output::new(false, false);
    out.first_selector = true;
    for selector in path {
        selector.gen_css(&mut out)?;
        out.first_selector = false;
    }
    Ok(out.into_string())
}

fn selector_css(selector: &Rc<Selector>) -> Result<String, LessError> {
    let mut out = Output::new(false, false);
    out.first_selector = true;
    selector.gen_css(&mut out)?;
    Ok(out.into_string().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::extend::ExtendMode;
    use crate::tree::selector::Combinator;

    fn selector(parts: &[(&str, &str)]) -> Rc<Selector> {
        Rc::new(Selector::new(
            parts
                .iter()
                .map(|(c, v)| Element::new(Combinator::new(c), *v))
                .collect(),
        ))
    }

    fn extend_of(target: Rc<Selector>, mode: ExtendMode) -> Rc<Extend> {
        let e = Rc::new(Extend::new(target, mode));
        *e.self_selectors.borrow_mut() = vec![selector(&[("", ".self")])];
        e
    }

    #[test]
    fn exact_match_anchors_whole_path() {
        let extend = extend_of(selector(&[("", ".a")]), ExtendMode::Exact);
        let path = vec![selector(&[("", ".a")])];
        assert_eq!(find_match(&extend, &path).unwrap().len(), 1);

        // exact mode refuses a partial match
        let path = vec![selector(&[("", ".a"), ("", ".b")])];
        assert!(find_match(&extend, &path).unwrap().is_empty());
    }

    #[test]
    fn all_mode_matches_inside_longer_selectors() {
        let extend = extend_of(selector(&[("", ".a")]), ExtendMode::All);
        let path = vec![selector(&[("", ".x"), (" ", ".a"), ("", ".b")])];
        assert_eq!(find_match(&extend, &path).unwrap().len(), 1);
    }

    #[test]
    fn multi_element_needle_requires_matching_combinators() {
        let extend = extend_of(selector(&[("", ".a"), (">", ".b")]), ExtendMode::All);

        let matching = vec![selector(&[("", ".a"), (">", ".b")])];
        assert_eq!(find_match(&extend, &matching).unwrap().len(), 1);

        let wrong_combinator = vec![selector(&[("", ".a"), (" ", ".b")])];
        assert!(find_match(&extend, &wrong_combinator).unwrap().is_empty());
    }

    #[test]
    fn extend_selector_replaces_match() {
        let extend = extend_of(selector(&[("", ".a")]), ExtendMode::All);
        let path = vec![selector(&[("", ".x"), (" ", ".a")])];

        let matches = find_match(&extend, &path).unwrap();
        let selfs = extend.self_selectors.borrow();
        let replaced = extend_selector(&matches, &path, &selfs[0], true).unwrap();

        assert_eq!(path_css(&replaced).unwrap(), ".x .self");
        assert!(replaced.iter().all(|s| s.evald_condition.get()));
    }

    #[test]
    fn dedupe_prefers_visible() {
        let visible = selector(&[("", ".a")]);
        visible.node.ensure_visibility();
        let invisible = selector(&[("", ".a")]);
        invisible.node.ensure_invisibility();

        let mut paths = vec![vec![invisible], vec![visible.clone()]];
        dedupe_paths(&mut paths).unwrap();

        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0][0].node.is_visible(), Some(true));
    }
}
