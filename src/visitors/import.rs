//! The import pass: resolves `@import`/`@plugin` paths, parses the imported
//! files, and wires their ASTs into the tree before evaluation.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::cache::ParseCache;
use crate::context::{EvalContext, Frame};
use crate::error::LessError;
use crate::importer::{path_diff, ImportSequencer, Importer, QueuedImport};
use crate::node::{directory_of, FileInfo, Node};
use crate::tree::atoms::Anonymous;
use crate::tree::declaration::Declaration;
use crate::tree::import::{is_css_path, Import, SkipMode};
use crate::tree::mixin::MixinDefinition;
use crate::tree::ruleset::Ruleset;

use super::{visit_node, VisitArgs, Visitor};

pub struct ImportVisitor<'a> {
    importer: &'a mut dyn Importer,

    /// Scope tracking for resolving variable-valued import paths; frames are
    /// the raw (unevaluated) rulesets along the walk.
    context: EvalContext,

    /// Prefix applied to imported files' rootpaths.
    rootpath: String,

    sequencer: ImportSequencer,

    /// Shared per-compilation once-ledger, installed into `once`-guarded
    /// import nodes and consulted when they evaluate.
    once_seen: Rc<RefCell<HashSet<String>>>,

    /// Full paths currently being recursed into; breaks import cycles.
    recursion_detector: HashSet<String>,

    /// Every file resolved during the pass, in resolution order.
    pub imported_filenames: Vec<String>,
}

impl<'a> ImportVisitor<'a> {
    pub fn new(
        importer: &'a mut dyn Importer,
        context: EvalContext,
        rootpath: String,
    ) -> ImportVisitor<'a> {
        ImportVisitor {
            importer,
            context,
            rootpath,
            sequencer: ImportSequencer::new(),
            once_seen: Rc::new(RefCell::new(HashSet::new())),
            recursion_detector: HashSet::new(),
            imported_filenames: Vec::new(),
        }
    }

    pub fn run(&mut self, root: &Rc<Ruleset>) -> Result<(), LessError> {
        self.sequencer.enter();
        let result = visit_node(self, &Node::Ruleset(root.clone())).and_then(|_| self.drain());
        self.sequencer.leave();
        result
    }

    fn drain(&mut self) -> Result<(), LessError> {
        while let Some(job) = self.sequencer.next_job() {
            self.process_import(job)?;
        }
        Ok(())
    }

    fn process_import(&mut self, job: QueuedImport) -> Result<(), LessError> {
        let import = job.import;

        // Resolve the path in the scope captured at the import's position.
        let path_value = {
            let path = import.path.clone();
            let evaluated = self
                .context
                .with_frames(job.frames, |ctx| path.eval(ctx))
                .map_err(|e| e.at(import.node.index, import.node.file_info.as_deref()))?;

            match &evaluated {
                Node::Quoted(q) => Some(q.value.clone()),
                Node::Url(u) => match &u.value {
                    Node::Quoted(q) => Some(q.value.clone()),
                    Node::Anonymous(a) => Some(a.value.clone()),
                    _ => None,
                },
                Node::Anonymous(a) => Some(a.value.clone()),
                _ => None,
            }
        };

        let Some(path_value) = path_value else {
            return Err(LessError::parse("import path could not be determined")
                .at(import.node.index, import.node.file_info.as_deref()));
        };

        // A variable path may only now reveal itself as CSS.
        if import.options.less.is_none() && !import.options.inline && is_css_path(&path_value) {
            import.css.set(true);
        }

        if import.css.get() && !import.options.inline {
            return Ok(());
        }

        let file_info = import
            .node
            .file_info
            .clone()
            .unwrap_or_else(|| Rc::new(FileInfo::default()));

        let try_append = !import.options.inline && !import.css.get();

        let resolved =
            self.importer
                .push(&path_value, try_append, &file_info, &import.options);

        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                if import.options.optional {
                    import.skip.set(SkipMode::Always);
                    return Ok(());
                }
                return Err(e.at(import.node.index, import.node.file_info.as_deref()));
            }
        };

        self.imported_filenames.push(resolved.full_path.clone());
        *import.imported_filename.borrow_mut() = Some(resolved.full_path.clone());

        let multiple = import.options.multiple || self.context.import_multiple;
        if !multiple {
            if resolved.imported_previously {
                import.skip.set(SkipMode::Always);
            } else {
                import.skip.set(SkipMode::OnceGuard);
                *import.once_seen.borrow_mut() = Some(self.once_seen.clone());
            }
        }

        if import.options.is_plugin {
            // Function registration happens when the node evaluates, at the
            // scope depth of the import.
            return Ok(());
        }

        if import.options.inline {
            let mut contents = Anonymous::new(resolved.contents);
            contents.node = import.node.clone();
            contents.ruleset_like = true;
            *import.root.borrow_mut() = Some(Node::Anonymous(contents));
            return Ok(());
        }

        let child_info = Rc::new(FileInfo {
            filename: resolved.full_path.clone(),
            rootpath: format!(
                "{}{}",
                self.rootpath,
                path_diff(&directory_of(&resolved.full_path), &file_info.entry_path)
            ),
            current_directory: directory_of(&resolved.full_path),
            entry_path: file_info.entry_path.clone(),
            root_filename: file_info.root_filename.clone(),
            reference: file_info.reference || import.options.reference,
        });

        let parsed = ParseCache::with(|cache| {
            cache.get_or_parse(&resolved.contents, child_info.clone(), &self.context.session)
        })?;

        *import.root.borrow_mut() = Some(Node::Ruleset(parsed.clone()));

        // Recurse into the imported file's own imports, unless we are
        // already inside it.
        if self.recursion_detector.insert(resolved.full_path.clone()) {
            self.sequencer.enter();
            let result = visit_node(self, &Node::Ruleset(parsed)).and_then(|_| self.drain());
            self.sequencer.leave();
            result?;
        }

        Ok(())
    }
}

impl Visitor for ImportVisitor<'_> {
    fn visit_import(&mut self, import: &Rc<Import>, args: &mut VisitArgs) -> Result<(), LessError> {
        args.visit_deeper = false;

        if import.css.get() && !import.options.inline {
            return Ok(());
        }

        let job = QueuedImport {
            import: import.clone(),
            frames: self.context.frames_snapshot(),
        };

        if import.is_variable_import() {
            self.sequencer.add_variable_import(job);
        } else {
            self.sequencer.add_import(job);
            self.sequencer.enter();
            let result = self.drain();
            self.sequencer.leave();
            result?;
        }

        Ok(())
    }

    fn visit_ruleset(
        &mut self,
        ruleset: &Rc<Ruleset>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        self.context.frames.push(Frame::Ruleset(ruleset.clone()));
        Ok(())
    }

    fn visit_ruleset_out(&mut self, _ruleset: &Rc<Ruleset>) -> Result<(), LessError> {
        self.context.frames.pop();
        Ok(())
    }

    fn visit_mixin_definition(
        &mut self,
        definition: &Rc<MixinDefinition>,
        _args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        self.context.frames.push(Frame::Mixin(definition.clone()));
        Ok(())
    }

    fn visit_mixin_definition_out(
        &mut self,
        _definition: &Rc<MixinDefinition>,
    ) -> Result<(), LessError> {
        self.context.frames.pop();
        Ok(())
    }

    fn visit_declaration(
        &mut self,
        declaration: &Declaration,
        args: &mut VisitArgs,
    ) -> Result<(), LessError> {
        // Only detached-ruleset values can contain imports.
        if !matches!(declaration.value, Node::DetachedRuleset(_)) {
            args.visit_deeper = false;
        }
        Ok(())
    }
}
