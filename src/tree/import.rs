//! `@import` and `@plugin` nodes.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};
use crate::tree::atoms::Anonymous;
use crate::tree::atrule::Media;
use crate::tree::ruleset::Ruleset;

/// The option list of an import: `@import (reference, optional) "x.less";`.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Force treating the file as Less (`less`) or CSS (`css`).
    pub less: Option<bool>,

    /// `(inline)`: include the file's text verbatim, without parsing.
    pub inline: bool,

    /// `(multiple)`: always include, even when already imported.
    pub multiple: bool,

    /// `(once)`: include at most once (the default behavior).
    pub once: bool,

    /// `(reference)`: import only for extending and mixin use.
    pub reference: bool,

    /// `(optional)`: a missing file is skipped rather than an error.
    pub optional: bool,

    /// `@plugin` import.
    pub is_plugin: bool,

    /// Arguments after the plugin path.
    pub plugin_args: Option<String>,
}

/// How the import behaves when it is evaluated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SkipMode {
    /// Include normally.
    None,

    /// Known duplicate; contribute nothing.
    Always,

    /// Include the first time the resolved file is seen, skip after.
    OnceGuard,
}

/// A path that looks like CSS rather than Less, including query-string forms
/// like `style.css?v=2`.
static CSS_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#.&?]css([?;].*)?$").unwrap());

/// Whether a (possibly just-evaluated) import path should be treated as a
/// plain CSS import.
pub fn is_css_path(path: &str) -> bool {
    CSS_PATH.is_match(path)
}

/// An `@import` directive.
///
/// The import visitor fills in the mutable slots (`root`,
/// `imported_filename`, `skip`, `error`) while it drains the import queue;
/// evaluation then splices the resolved rules into the enclosing ruleset.
pub struct Import {
    pub node: NodeCommon,

    /// The path expression: a quoted string, a `url(...)`, or a variable
    /// interpolation that only resolves at evaluation time.
    pub path: Node,

    /// Media features following the path.
    pub features: Option<Node>,

    pub options: ImportOptions,

    /// Whether the import is passed through as a CSS `@import` statement.
    pub css: Cell<bool>,

    pub skip: Cell<SkipMode>,

    /// The parsed root of the imported file (a `Ruleset`), or the raw file
    /// text for `(inline)` imports (an `Anonymous`).
    pub root: RefCell<Option<Node>>,

    pub imported_filename: RefCell<Option<String>>,

    /// Error recorded by the importer, surfaced when the import is not
    /// optional and could not be treated as CSS.
    pub error: RefCell<Option<LessError>>,

    /// Shared once-per-file ledger, installed by the import visitor.
    pub once_seen: RefCell<Option<Rc<RefCell<HashSet<String>>>>>,
}

impl Import {
    pub fn new(path: Node, features: Option<Node>, options: ImportOptions) -> Import {
        let import = Import {
            node: NodeCommon::default(),
            path,
            features,
            options,
            css: Cell::new(false),
            skip: Cell::new(SkipMode::None),
            root: RefCell::new(None),
            imported_filename: RefCell::new(None),
            error: RefCell::new(None),
            once_seen: RefCell::new(None),
        };

        if import.options.less.is_some() || import.options.inline {
            import
                .css
                .set(!import.options.less.unwrap_or(false) || import.options.inline);
        } else if let Some(path) = import.path_value() {
            if CSS_PATH.is_match(&path) {
                import.css.set(true);
            }
        }

        import
    }

    /// The literal path string, when the path is not variable-valued.
    pub fn path_value(&self) -> Option<String> {
        match &self.path {
            Node::Quoted(q) => Some(q.value.clone()),
            Node::Url(u) => match &u.value {
                Node::Quoted(q) => Some(q.value.clone()),
                Node::Anonymous(a) => Some(a.value.clone()),
                _ => None,
            },
            Node::Anonymous(a) => Some(a.value.clone()),
            _ => None,
        }
    }

    /// Whether the path needs evaluation before it is known (variable
    /// interpolation).
    pub fn is_variable_import(&self) -> bool {
        match &self.path {
            Node::Quoted(q) => q.contains_variables(),
            Node::Url(u) => match &u.value {
                Node::Quoted(q) => q.contains_variables(),
                Node::Anonymous(_) => false,
                _ => true,
            },
            Node::Anonymous(_) => false,
            _ => true,
        }
    }

    fn eval_path(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let path = self.path.eval(context)?;

        if matches!(path, Node::Url(_)) {
            return Ok(path);
        }

        let rootpath = self
            .node
            .file_info
            .as_deref()
            .map(|fi| fi.rootpath.clone())
            .unwrap_or_default();

        Ok(match path {
            Node::Quoted(mut q) => {
                if context.path_requires_rewrite(&q.value) {
                    q.value = context.rewrite_path(&q.value, &rootpath);
                } else {
                    q.value = crate::context::normalize_path(&q.value);
                }
                Node::Quoted(q)
            }
            other => other,
        })
    }

    /// Evaluates the import into the rules it contributes at its position.
    ///
    /// A `reference` import blocks visibility on the top-level nodes only;
    /// the visibility-marking pass then skips the whole subtree, which keeps
    /// it out of the output until an extend or mixin call surfaces it.
    pub fn eval_to_rules(self: &Rc<Self>, context: &mut EvalContext) -> Result<Vec<Node>, LessError> {
        let rules = self.do_eval(context)?;

        if self.options.reference || self.node.blocks_visibility() {
            for rule in &rules {
                rule.common().add_visibility_block();
            }
        }

        Ok(rules)
    }

    fn do_eval(self: &Rc<Self>, context: &mut EvalContext) -> Result<Vec<Node>, LessError> {
        let features = match &self.features {
            Some(f) => Some(f.eval(context)?),
            None => None,
        };

        if self.options.is_plugin {
            return self.eval_plugin(context);
        }

        match self.skip.get() {
            SkipMode::Always => return Ok(Vec::new()),
            SkipMode::OnceGuard => {
                if let (Some(filename), Some(seen)) = (
                    self.imported_filename.borrow().clone(),
                    self.once_seen.borrow().clone(),
                ) {
                    if !seen.borrow_mut().insert(filename) {
                        return Ok(Vec::new());
                    }
                }
            }
            SkipMode::None => (),
        }

        if self.options.inline {
            let text = match self.root.borrow().as_ref() {
                Some(Node::Anonymous(a)) => a.value.clone(),
                _ => String::new(),
            };

            let mut contents = Anonymous::new(text);
            contents.ruleset_like = true;
            contents.node = self.node.clone();
            let contents = Node::Anonymous(contents);

            return Ok(match features {
                Some(f) => vec![wrap_in_media(vec![contents], f)],
                None => vec![contents],
            });
        }

        if self.css.get() {
            let evaluated = Import {
                node: self.node.clone(),
                path: self.eval_path(context)?,
                features,
                options: self.options.clone(),
                css: Cell::new(true),
                skip: Cell::new(self.skip.get()),
                root: RefCell::new(None),
                imported_filename: RefCell::new(self.imported_filename.borrow().clone()),
                error: RefCell::new(None),
                once_seen: RefCell::new(None),
            };

            if let Some(e) = self.error.borrow().as_ref() {
                return Err(e.clone());
            }

            return Ok(vec![Node::Import(Rc::new(evaluated))]);
        }

        let Some(Node::Ruleset(root)) = self.root.borrow().clone() else {
            return Ok(Vec::new());
        };

        // Wrap so the imported rules evaluate in the importing scope; their
        // own imports were spliced when the file was processed.
        let ruleset = Rc::new(Ruleset::new(Vec::new(), root.rules.borrow().clone()));
        let evaluated = ruleset.eval(context)?;
        let rules = evaluated.rules.borrow().clone();

        Ok(match features {
            Some(f) => vec![wrap_in_media(rules, f)],
            None => rules,
        })
    }

    fn eval_plugin(self: &Rc<Self>, context: &mut EvalContext) -> Result<Vec<Node>, LessError> {
        let Some(bridge) = context.plugin_bridge.clone() else {
            if self.options.optional {
                return Ok(Vec::new());
            }
            return Err(LessError::plugin("no plugin host is configured")
                .at(self.node.index, self.node.file_info.as_deref()));
        };

        let path = self
            .imported_filename
            .borrow()
            .clone()
            .or_else(|| self.path_value())
            .unwrap_or_default();

        let functions = bridge
            .load_plugin(&path, self.options.plugin_args.as_deref())
            .map_err(|mut e| {
                e.kind = crate::error::ErrorKind::Plugin;
                e.at(self.node.index, self.node.file_info.as_deref())
            })?;

        for (name, function) in functions {
            context.function_scopes.register(&name, function);
        }

        Ok(Vec::new())
    }
}

fn wrap_in_media(rules: Vec<Node>, features: Node) -> Node {
    let features = match features {
        Node::Value(list) => list.value,
        single => vec![single],
    };

    Node::Media(Rc::new(Media::new(rules, features)))
}

impl GenCss for Import {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        let is_reference = self
            .node
            .file_info
            .as_deref()
            .is_some_and(|fi| fi.reference);

        if self.css.get() && !is_reference {
            output.add("@import ");
            self.path.gen_css(output)?;

            if let Some(features) = &self.features {
                output.add(" ");
                features.gen_css(output)?;
            }

            output.add(";");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Quoted;

    fn import_of(path: &str, options: ImportOptions) -> Import {
        Import::new(
            Node::Quoted(Quoted::new(path, '"', false)),
            None,
            options,
        )
    }

    #[test]
    fn css_detection_by_extension() {
        assert!(import_of("theme.css", ImportOptions::default()).css.get());
        assert!(import_of("theme.css?v=2", ImportOptions::default()).css.get());
        assert!(!import_of("theme.less", ImportOptions::default()).css.get());
        assert!(!import_of("theme.less?suffix=.css.less", ImportOptions::default()).css.get());
        assert!(!import_of("theme", ImportOptions::default()).css.get());
    }

    #[test]
    fn explicit_options_override_extension() {
        let less_forced = import_of(
            "theme.css",
            ImportOptions {
                less: Some(true),
                ..ImportOptions::default()
            },
        );
        assert!(!less_forced.css.get());

        let inline = import_of(
            "theme.less",
            ImportOptions {
                inline: true,
                ..ImportOptions::default()
            },
        );
        assert!(inline.css.get());
    }

    #[test]
    fn variable_paths_are_detected() {
        let fixed = import_of("a.less", ImportOptions::default());
        assert!(!fixed.is_variable_import());

        let variable = import_of("@{theme}/a.less", ImportOptions::default());
        assert!(variable.is_variable_import());
    }
}
