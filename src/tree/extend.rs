//! `:extend` declarations.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::NodeCommon;
use crate::tree::ruleset::Ruleset;
use crate::tree::selector::{Combinator, Selector};

/// How an extend matches its target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtendMode {
    /// The target selector must match exactly.
    Exact,

    /// `all`: the target may appear anywhere inside a longer selector, and
    /// everything around it is preserved.
    All,
}

/// One `:extend(target)` declaration, attached to a selector or written as
/// an `&:extend(target);` rule.
#[derive(Debug, Clone)]
pub struct Extend {
    pub node: NodeCommon,

    /// The target selector to search for.
    pub selector: Rc<Selector>,

    pub option: ExtendMode,

    /// Identity within the extend-processing pass; assigned by the pass's
    /// arena so chains can be detected.
    pub object_id: Cell<usize>,

    /// Ids of the extends this one was chained from, including itself.
    pub parent_ids: RefCell<Vec<usize>>,

    /// The selectors that replace a matched target: the full selector paths
    /// of the ruleset carrying this extend.
    pub self_selectors: RefCell<Vec<Rc<Selector>>>,

    /// The ruleset carrying the extend; used to surface reference-imported
    /// rules when something visible extends into them.
    pub ruleset: RefCell<Option<Rc<Ruleset>>>,

    /// Marks the first of the copies made when a ruleset has several paths.
    pub first_extend_on_this_selector_path: Cell<bool>,

    pub has_found_matches: Cell<bool>,

    /// Whether a match may be preceded / followed by other elements.
    pub allow_before: bool,
    pub allow_after: bool,
}

impl Extend {
    pub fn new(selector: Rc<Selector>, option: ExtendMode) -> Extend {
        let (allow_before, allow_after) = match option {
            ExtendMode::All => (true, true),
            ExtendMode::Exact => (false, false),
        };

        Extend {
            node: NodeCommon::default(),
            selector,
            option,
            object_id: Cell::new(0),
            parent_ids: RefCell::new(Vec::new()),
            self_selectors: RefCell::new(Vec::new()),
            ruleset: RefCell::new(None),
            first_extend_on_this_selector_path: Cell::new(false),
            has_found_matches: Cell::new(false),
            allow_before,
            allow_after,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Extend, LessError> {
        let mut evald = Extend::new(Rc::new(self.selector.eval(context)?), self.option);
        evald.node = self.node.clone();
        Ok(evald)
    }

    /// Derives a copy bound to one selector path (rulesets with several
    /// selectors register one extend per path).
    pub fn derive(&self) -> Extend {
        let derived = Extend::new(self.selector.clone(), self.option);
        derived.node.copy_visibility_info(&self.node);
        Extend {
            node: derived.node,
            ..derived
        }
    }

    /// Builds the replacement selector from the paths of the ruleset that
    /// declared the extend.
    pub fn find_self_selectors(&self, paths: &[Vec<Rc<Selector>>]) {
        let mut elements = Vec::new();

        for path in paths {
            for (i, selector) in path.iter().enumerate() {
                let mut selector_elements = selector.elements.clone();

                // Inside a path, a selector's leading element attaches with a
                // descendant combinator.
                if i > 0 {
                    if let Some(first) = selector_elements.first_mut() {
                        if first.combinator.value.is_empty() {
                            first.combinator = Combinator::descendant();
                        }
                    }
                }

                elements.extend(selector_elements);
            }
        }

        let self_selector = Selector::new(elements);
        self_selector.node.copy_visibility_info(&self.node);

        *self.self_selectors.borrow_mut() = vec![Rc::new(self_selector)];
    }

    /// Whether this extend is visible in the output (drives whether matched
    /// reference-imported rules get surfaced).
    pub fn is_visible(&self) -> bool {
        self.node.is_visible().unwrap_or(false)
    }
}

/// Parses the `all` flag from an extend's target text, for the parser.
pub fn extend_mode_from_option(option: Option<&str>) -> ExtendMode {
    match option {
        Some("all") => ExtendMode::All,
        _ => ExtendMode::Exact,
    }
}

impl Extend {
    /// Registers this extend (and its parent chain) in the visitor arena,
    /// assigning the object id used for circularity detection.
    pub fn register(self: &Rc<Self>, arena: &mut crate::arena::Arena<Rc<Extend>>) {
        let id = arena.alloc(self.clone());
        self.object_id.set(id);

        let mut parents = self.parent_ids.borrow_mut();
        if parents.is_empty() {
            parents.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;
    use crate::tree::selector::Element;

    #[test]
    fn mode_controls_anchoring() {
        let sel = Rc::new(Selector::new(vec![Element::new(Combinator::none(), ".a")]));

        let exact = Extend::new(sel.clone(), ExtendMode::Exact);
        assert!(!exact.allow_before);
        assert!(!exact.allow_after);

        let all = Extend::new(sel, ExtendMode::All);
        assert!(all.allow_before);
        assert!(all.allow_after);
    }

    #[test]
    fn self_selectors_join_path_with_descendant() {
        let sel = Rc::new(Selector::new(vec![Element::new(Combinator::none(), ".a")]));
        let extend = Extend::new(sel, ExtendMode::Exact);

        let path = vec![
            Rc::new(Selector::new(vec![Element::new(Combinator::none(), ".p")])),
            Rc::new(Selector::new(vec![Element::new(Combinator::none(), ".c")])),
        ];
        extend.find_self_selectors(&[path]);

        let selfs = extend.self_selectors.borrow();
        let mut out = crate::output::Output::new(false, false);
        out.first_selector = true;
        selfs[0].gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".p .c");
    }
}
