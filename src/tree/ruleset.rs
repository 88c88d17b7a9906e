//! Rulesets: the block structure of a stylesheet, and the scope frames of
//! evaluation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::{EvalContext, Frame};
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::selector::Selector;

/// One absolute selector path computed by the join-selector pass: the
/// concatenation of the selectors prints as a single output selector.
pub type SelectorPath = Vec<Rc<Selector>>;

/// A block of rules with its selectors.
///
/// Rulesets are shared: they sit in the rule tree and simultaneously serve as
/// scope frames during evaluation, so the parts that later passes write
/// (rules being spliced, computed paths, root flags) live behind interior
/// mutability.
pub struct Ruleset {
    pub node: NodeCommon,
    pub selectors: Vec<Rc<Selector>>,
    pub rules: RefCell<Vec<Node>>,

    /// A root ruleset emits its rules without braces.
    pub root: Cell<bool>,

    /// The outermost ruleset of the entry file.
    pub first_root: Cell<bool>,

    /// Only evaluate imports when the block is a root (`@import` inside a
    /// plain ruleset is gated by `allow_imports`).
    pub strict_imports: bool,
    pub allow_imports: Cell<bool>,

    /// Set for rulesets synthesized to wrap multi-feature media blocks.
    pub multi_media: Cell<bool>,

    /// Set by the extend finder when every selector path carries an extend.
    pub extend_on_every_path: Cell<bool>,

    /// Absolute selector paths; written by the join-selector pass, read by
    /// extend processing and output.
    pub paths: RefCell<Vec<SelectorPath>>,

    /// The pre-evaluation ruleset this one was derived from; used to detect
    /// recursive mixin calls.
    pub original: RefCell<Option<Rc<Ruleset>>>,

    /// For the root ruleset: extends collected by the extend finder.
    pub all_extends: RefCell<Vec<Rc<crate::tree::extend::Extend>>>,

    variables_cache: RefCell<Option<Rc<HashMap<String, Node>>>>,
    properties_cache: RefCell<Option<Rc<HashMap<String, Vec<Node>>>>>,
}

impl std::fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ruleset")
            .field("selectors", &self.selectors.len())
            .field("rules", &self.rules.borrow().len())
            .field("root", &self.root.get())
            .finish()
    }
}

/// A mixin candidate located by [`Ruleset::find`], with the namespace chain
/// it was found through.
pub struct FoundMixin {
    pub rule: Node,
    pub path: Vec<Rc<Ruleset>>,
}

impl Ruleset {
    pub fn new(selectors: Vec<Rc<Selector>>, rules: Vec<Node>) -> Ruleset {
        Ruleset {
            node: NodeCommon::default(),
            selectors,
            rules: RefCell::new(rules),
            root: Cell::new(false),
            first_root: Cell::new(false),
            strict_imports: false,
            allow_imports: Cell::new(false),
            multi_media: Cell::new(false),
            extend_on_every_path: Cell::new(false),
            paths: RefCell::new(Vec::new()),
            original: RefCell::new(None),
            all_extends: RefCell::new(Vec::new()),
            variables_cache: RefCell::new(None),
            properties_cache: RefCell::new(None),
        }
    }

    /// The root ruleset of a parsed file.
    pub fn root_of(rules: Vec<Node>) -> Ruleset {
        let ruleset = Ruleset::new(Vec::new(), rules);
        ruleset.root.set(true);
        ruleset.allow_imports.set(true);
        ruleset
    }

    /// Invalidate the lazily-built lookup maps after mutating `rules`.
    pub fn reset_cache(&self) {
        self.variables_cache.replace(None);
        self.properties_cache.replace(None);
    }

    /// Inserts a rule at the front of the block (parameter bindings shadow
    /// everything behind them).
    pub fn prepend_rule(&self, rule: Node) {
        self.rules.borrow_mut().insert(0, rule);
        self.reset_cache();
    }

    fn variables_map(&self) -> Rc<HashMap<String, Node>> {
        if let Some(map) = self.variables_cache.borrow().as_ref() {
            return map.clone();
        }

        let mut map = HashMap::new();

        for rule in self.rules.borrow().iter() {
            match rule {
                Node::Declaration(d) if d.variable => {
                    map.insert(d.name_str().to_string(), rule.clone());
                }

                // An import's variables become visible in the importing
                // scope.
                Node::Import(import) => {
                    if let Some(Node::Ruleset(root)) = import.root.borrow().as_ref() {
                        for (name, decl) in root.variables_map().iter() {
                            map.insert(name.clone(), decl.clone());
                        }
                    }
                }

                _ => (),
            }
        }

        let map = Rc::new(map);
        self.variables_cache.replace(Some(map.clone()));
        map
    }

    /// Looks up a variable declaration by name (`@name`).
    pub fn variable(&self, name: &str) -> Option<Node> {
        self.variables_map().get(name).cloned()
    }

    fn properties_map(&self) -> Rc<HashMap<String, Vec<Node>>> {
        if let Some(map) = self.properties_cache.borrow().as_ref() {
            return map.clone();
        }

        let mut map: HashMap<String, Vec<Node>> = HashMap::new();

        for rule in self.rules.borrow().iter() {
            if let Node::Declaration(d) = rule {
                if !d.variable {
                    if let Some(name) = d.name.as_str() {
                        map.entry(name.to_string()).or_default().push(rule.clone());
                    }
                }
            }
        }

        let map = Rc::new(map);
        self.properties_cache.replace(Some(map.clone()));
        map
    }

    /// Declarations of a property, in source order, for `$prop` accessors.
    pub fn property(&self, name: &str) -> Vec<Node> {
        self.properties_map().get(name).cloned().unwrap_or_default()
    }

    pub fn last_declaration(&self) -> Option<Node> {
        self.rules
            .borrow()
            .iter()
            .rev()
            .find(|r| matches!(r, Node::Declaration(d) if !d.variable))
            .cloned()
    }

    /// Finds mixin candidates matching a call path of element strings, e.g.
    /// `[".m"]` or `["#ns", ".m"]`, searching nested namespaces.
    pub fn find(
        self: &Rc<Self>,
        call_path: &[String],
        exclude: Option<&Rc<Ruleset>>,
    ) -> Result<Vec<FoundMixin>, LessError> {
        let exclude_ptr = exclude.map(Rc::as_ptr).unwrap_or(std::ptr::null());
        find_in_rules(&self.rules.borrow(), call_path, exclude_ptr)
    }

    pub fn eval(self: &Rc<Self>, context: &mut EvalContext) -> Result<Rc<Ruleset>, LessError> {
        let mut has_passing_selector = self.selectors.is_empty();
        let mut has_variable = false;
        let mut selectors = Vec::with_capacity(self.selectors.len());

        for selector in &self.selectors {
            let evald = selector.eval(context)?;
            has_variable |= evald.has_variable_elements();
            if evald.evald_condition.get() {
                has_passing_selector = true;
            }
            selectors.push(Rc::new(evald));
        }

        if has_variable {
            selectors = reparse_interpolated_selectors(selectors, context)?;
        }

        let evald = Rc::new(Ruleset {
            node: self.node.clone(),
            selectors,
            rules: RefCell::new(self.rules.borrow().clone()),
            root: Cell::new(self.root.get()),
            first_root: Cell::new(self.first_root.get()),
            strict_imports: self.strict_imports,
            allow_imports: Cell::new(self.allow_imports.get()),
            multi_media: Cell::new(false),
            extend_on_every_path: Cell::new(false),
            paths: RefCell::new(Vec::new()),
            original: RefCell::new(Some(
                self.original.borrow().clone().unwrap_or_else(|| self.clone()),
            )),
            all_extends: RefCell::new(Vec::new()),
            variables_cache: RefCell::new(None),
            properties_cache: RefCell::new(None),
        });

        if !has_passing_selector {
            evald.rules.borrow_mut().clear();
        }

        context.function_scopes.enter_scope();
        context.frames.push(Frame::Ruleset(evald.clone()));

        let result = eval_ruleset_body(&evald, context);

        context.frames.pop();
        context.function_scopes.exit_scope();
        result?;

        Ok(evald)
    }

    /// Recursively applies `!important` to every declaration, for
    /// `!important` mixin calls.
    pub fn make_important(self: &Rc<Self>) -> Rc<Ruleset> {
        let rules = self
            .rules
            .borrow()
            .iter()
            .map(|rule| match rule {
                Node::Declaration(d) => Node::Declaration(Box::new(d.make_important())),
                Node::Ruleset(r) => Node::Ruleset(r.make_important()),
                other => other.clone(),
            })
            .collect();

        let important = Rc::new(Ruleset {
            node: self.node.clone(),
            selectors: self.selectors.clone(),
            rules: RefCell::new(rules),
            root: Cell::new(self.root.get()),
            first_root: Cell::new(self.first_root.get()),
            strict_imports: self.strict_imports,
            allow_imports: Cell::new(self.allow_imports.get()),
            multi_media: Cell::new(self.multi_media.get()),
            extend_on_every_path: Cell::new(false),
            paths: RefCell::new(self.paths.borrow().clone()),
            original: RefCell::new(self.original.borrow().clone()),
            all_extends: RefCell::new(Vec::new()),
            variables_cache: RefCell::new(None),
            properties_cache: RefCell::new(None),
        });

        important
    }

}

fn eval_ruleset_body(ruleset: &Rc<Ruleset>, context: &mut EvalContext) -> Result<(), LessError> {
    let media_block_count = context.media_blocks.len();

    if ruleset.root.get() || ruleset.allow_imports.get() || !ruleset.strict_imports {
        eval_imports(ruleset, context)?;
    }

    // Mixin definitions capture their defining frames before anything else
    // runs, so calls that appear earlier in the file still see them bound.
    {
        let len = ruleset.rules.borrow().len();
        for i in 0..len {
            let rule = ruleset.rules.borrow()[i].clone();
            if let Node::MixinDefinition(_) = rule {
                let evaluated = rule.eval(context)?;
                ruleset.rules.borrow_mut()[i] = evaluated;
            }
        }
        if len > 0 {
            ruleset.reset_cache();
        }
    }

    // Expand mixin calls and detached-ruleset calls in place.
    let mut i = 0;
    loop {
        let rule = {
            let rules = ruleset.rules.borrow();
            if i >= rules.len() {
                break;
            }
            rules[i].clone()
        };

        match &rule {
            Node::MixinCall(call) => {
                let expansion = call.eval(context)?;
                let filtered = filter_mixin_output(expansion, ruleset);
                let count = filtered.len();
                ruleset.rules.borrow_mut().splice(i..=i, filtered);
                ruleset.reset_cache();
                i += count;
            }

            Node::Call(call) if call.name.starts_with('@') => {
                let evaluated = rule.eval(context)?;
                let rules = match evaluated {
                    Node::Ruleset(r) => r.rules.borrow().clone(),
                    other => vec![other],
                };
                let filtered = filter_mixin_output(rules, ruleset);
                let count = filtered.len();
                ruleset.rules.borrow_mut().splice(i..=i, filtered);
                ruleset.reset_cache();
                i += count;
            }

            _ => i += 1,
        }
    }

    // Everything else, in order.
    let mut i = 0;
    loop {
        let rule = {
            let rules = ruleset.rules.borrow();
            if i >= rules.len() {
                break;
            }
            rules[i].clone()
        };

        match &rule {
            Node::MixinDefinition(_) => (),
            Node::Import(_) => (),
            _ => {
                let evaluated = rule
                    .eval(context)
                    .map_err(|e| e.at(rule.common().index, rule.common().file_info.as_deref()))?;
                ruleset.rules.borrow_mut()[i] = evaluated;
            }
        }
        i += 1;
    }
    ruleset.reset_cache();

    // Hoist `& { ... }` wrapper blocks (including evaluated css guards) into
    // this block.
    let mut i = 0;
    loop {
        let rule = {
            let rules = ruleset.rules.borrow();
            if i >= rules.len() {
                break;
            }
            rules[i].clone()
        };

        if let Node::Ruleset(r) = &rule {
            if r.selectors.len() == 1 && r.selectors[0].is_just_parent_selector() {
                let hoisted: Vec<Node> = r
                    .rules
                    .borrow()
                    .iter()
                    .filter(|sub| !matches!(sub, Node::Declaration(d) if d.variable))
                    .cloned()
                    .collect();

                for sub in &hoisted {
                    sub.common().copy_visibility_info(&r.node);
                }

                let count = hoisted.len();
                ruleset.rules.borrow_mut().splice(i..=i, hoisted);
                ruleset.reset_cache();
                i += count;
                continue;
            }
        }

        i += 1;
    }

    // Media blocks that appeared during this body bubble this block's
    // selectors.
    for block in context.media_blocks[media_block_count..].to_vec() {
        match block {
            Node::Media(m) => m.bubble_selectors(&ruleset.selectors),
            Node::Container(c) => c.bubble_selectors(&ruleset.selectors),
            _ => (),
        }
    }

    Ok(())
}

/// Splices evaluated `@import` rules into the ruleset.
fn eval_imports(ruleset: &Rc<Ruleset>, context: &mut EvalContext) -> Result<(), LessError> {
    let mut i = 0;

    loop {
        let rule = {
            let rules = ruleset.rules.borrow();
            if i >= rules.len() {
                break;
            }
            rules[i].clone()
        };

        if let Node::Import(import) = &rule {
            let imported = import.eval_to_rules(context)?;
            let count = imported.len();
            ruleset.rules.borrow_mut().splice(i..=i, imported);
            ruleset.reset_cache();
            i += count;
        } else {
            i += 1;
        }
    }

    Ok(())
}

/// Mixin expansions may define variables, but they never override a variable
/// the receiving scope declares itself.
fn filter_mixin_output(rules: Vec<Node>, ruleset: &Rc<Ruleset>) -> Vec<Node> {
    rules
        .into_iter()
        .filter(|r| match r {
            Node::Declaration(d) if d.variable => ruleset.variable(d.name_str()).is_none(),
            _ => true,
        })
        .collect()
}

fn find_in_rules(
    rules: &[Node],
    call_path: &[String],
    exclude: *const Ruleset,
) -> Result<Vec<FoundMixin>, LessError> {
    let mut found = Vec::new();

    for rule in rules {
        match rule {
            Node::Ruleset(r) => {
                if std::ptr::eq(Rc::as_ptr(r), exclude) {
                    continue;
                }

                for selector in &r.selectors {
                    let matched = selector.match_call_path(call_path)?;
                    if matched > 0 {
                        if call_path.len() > matched {
                            let sub =
                                find_in_rules(&r.rules.borrow(), &call_path[matched..], exclude)?;
                            for mut fm in sub {
                                fm.path.push(r.clone());
                                found.push(fm);
                            }
                        } else {
                            found.push(FoundMixin {
                                rule: rule.clone(),
                                path: Vec::new(),
                            });
                        }
                        break;
                    }
                }
            }

            Node::MixinDefinition(m) => {
                if call_path[0] == m.name {
                    if call_path.len() == 1 {
                        found.push(FoundMixin {
                            rule: rule.clone(),
                            path: Vec::new(),
                        });
                    } else {
                        let sub = find_in_rules(&m.rules, &call_path[1..], exclude)?;
                        found.extend(sub);
                    }
                }
            }

            _ => (),
        }
    }

    Ok(found)
}

/// Selectors containing interpolated variables are re-parsed from their
/// generated text once the variables have been substituted.
fn reparse_interpolated_selectors(
    selectors: Vec<Rc<Selector>>,
    context: &mut EvalContext,
) -> Result<Vec<Rc<Selector>>, LessError> {
    let mut out = Vec::with_capacity(selectors.len());

    for selector in selectors {
        if !selector.has_variable_elements() {
            out.push(selector);
            continue;
        }

        let mut output = Output::new(false, false);
        output.first_selector = true;
        selector.gen_css(&mut output)?;
        let css = output.into_string();

        let parsed = crate::parser::parse_selectors(
            &css,
            selector.node.file_info.clone(),
            &context.session,
        )?;

        for p in parsed {
            let derived = selector.derive(p.elements, selector.extend_list.clone());
            out.push(Rc::new(derived));
        }
    }

    Ok(out)
}

impl GenCss for Ruleset {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        if self.root.get() {
            return gen_root_rules(self, output);
        }

        let paths = self.paths.borrow();

        for (i, path) in paths.iter().enumerate() {
            // The caller indented the first line already.
            if i > 0 {
                output.add_either(",", ",\n");
                if !output.compress {
                    output.add_indentation();
                }
            }

            output.first_selector = true;
            for selector in path {
                selector.gen_css(output)?;
                output.first_selector = false;
            }
        }

        output.add_either("{", " {\n");
        output.indent();

        let rules = self.rules.borrow();
        let last = rules.len().saturating_sub(1);

        for (i, rule) in rules.iter().enumerate() {
            output.last_rule = i == last;
            output.add_indentation();
            rule.gen_css(output)?;
            output.last_rule = false;

            if !output.compress {
                output.add("\n");
            }
        }

        output.outdent();
        output.add_indentation();
        output.add("}");

        Ok(())
    }
}

fn gen_root_rules(ruleset: &Ruleset, output: &mut Output) -> Result<(), LessError> {
    let rules = ruleset.rules.borrow();

    // `@charset` must come first in a stylesheet.
    let (charsets, others): (Vec<&Node>, Vec<&Node>) = rules.iter().partition(|r| {
        matches!(r, Node::AtRule(a) if ruleset.first_root.get() && a.name == "@charset")
    });

    let last = rules.len().saturating_sub(1);
    for (i, rule) in charsets.into_iter().chain(others).enumerate() {
        output.last_rule = i == last;
        output.add_indentation();
        rule.gen_css(output)?;
        output.last_rule = false;

        if !output.compress && !output.ends_with('\n') {
            output.add("\n");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Keyword;
    use crate::tree::declaration::Declaration;
    use crate::tree::selector::{Combinator, Element};

    fn decl(name: &str, value: &str) -> Node {
        Node::Declaration(Box::new(Declaration::new(
            name,
            Node::Keyword(Keyword::new(value)),
        )))
    }

    fn selector(value: &str) -> Rc<Selector> {
        Rc::new(Selector::new(vec![Element::new(Combinator::none(), value)]))
    }

    #[test]
    fn variables_map_finds_variable_declarations() {
        let rs = Rc::new(Ruleset::new(
            vec![selector(".a")],
            vec![decl("@x", "red"), decl("color", "blue")],
        ));

        assert!(rs.variable("@x").is_some());
        assert!(rs.variable("@y").is_none());
        assert!(rs.variable("color").is_none());
    }

    #[test]
    fn property_lookup_keeps_source_order() {
        let rs = Rc::new(Ruleset::new(
            vec![selector(".a")],
            vec![decl("width", "1px"), decl("width", "2px")],
        ));

        let found = rs.property("width");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn cache_resets_see_new_rules() {
        let rs = Rc::new(Ruleset::new(vec![selector(".a")], vec![]));
        assert!(rs.variable("@x").is_none());

        rs.rules.borrow_mut().push(decl("@x", "red"));
        rs.reset_cache();
        assert!(rs.variable("@x").is_some());
    }

    #[test]
    fn find_matches_namespaced_mixins() {
        let inner = Rc::new(Ruleset::new(vec![selector(".m")], vec![decl("color", "red")]));
        let ns = Rc::new(Ruleset::new(
            vec![selector("#ns")],
            vec![Node::Ruleset(inner)],
        ));
        let root = Rc::new(Ruleset::root_of(vec![Node::Ruleset(ns)]));

        let path = vec!["#ns".to_string(), ".m".to_string()];
        let found = root.find(&path, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path.len(), 1);

        let path = vec![".m".to_string()];
        let found = root.find(&path, None).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn gen_css_prints_paths_and_rules() {
        let rs = Ruleset::new(vec![], vec![decl("color", "red")]);
        rs.paths
            .borrow_mut()
            .push(vec![selector(".a"), selector(".b")]);

        let mut out = Output::new(false, false);
        rs.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".a .b {\n  color: red;\n}");

        let mut out = Output::new(true, false);
        rs.gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".a .b{color:red}");
    }
}
