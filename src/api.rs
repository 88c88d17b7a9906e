//! The compile entry points and their options.

use std::rc::Rc;

use crate::arena::Arena;
use crate::cache::ParseCache;
use crate::context::{EvalContext, MathMode, RewriteUrls};
use crate::error::LessError;
use crate::importer::{FileImporter, Importer};
use crate::node::FileInfo;
use crate::output::{GenCss, Output};
use crate::plugin::PluginBridge;
use crate::session::Session;
use crate::visitors::extend::ProcessExtendsVisitor;
use crate::visitors::import::ImportVisitor;
use crate::visitors::join_selector::JoinSelectorVisitor;
use crate::visitors::to_css::{mark_tree_visibility, ToCssVisitor};

/// Compilation options.  Unknown concerns simply have no field here; the
/// recognized set matches the language reference.
#[derive(Clone, Default)]
pub struct Options {
    /// Origin of the source, for diagnostics and relative imports.
    pub filename: Option<String>,

    /// Additional search paths for `@import`.
    pub paths: Vec<String>,

    /// Prefix applied to URL and import paths during rewriting.
    pub rootpath: String,

    /// Which URLs get the rootpath rewrite.
    pub rewrite_urls: RewriteUrls,

    /// Math-mode gating policy.
    pub math: MathMode,

    /// Error on mixed-unit arithmetic.
    pub strict_units: bool,

    /// Minified output.
    pub compress: bool,

    /// Query string appended to every URL.
    pub url_args: Option<String>,

    /// Global default for the `multiple` import option.
    pub import_multiple: bool,

    /// Host for `@plugin` imports.
    pub plugin_bridge: Option<Rc<dyn PluginBridge>>,
}

/// A successful compilation.
#[derive(Debug)]
pub struct CompileResult {
    pub css: String,

    /// Files pulled in by `@import`, in resolution order.
    pub imports: Vec<String>,
}

/// Compiles a Less source string to CSS.
pub fn compile(source: &str, options: &Options) -> Result<CompileResult, LessError> {
    compile_with_session(source, options, &Session::new())
}

pub fn compile_with_session(
    source: &str,
    options: &Options,
    session: &Session,
) -> Result<CompileResult, LessError> {
    let mut importer = FileImporter::new(&options.paths);
    let result = compile_with_importer(source, options, session, &mut importer);

    result.map_err(|mut e| {
        resolve_error_position(&mut e, source, options, &importer);
        e
    })
}

/// Compiles with a caller-supplied importer, for embedders that do not read
/// from the filesystem.
pub fn compile_with_importer(
    source: &str,
    options: &Options,
    session: &Session,
    importer: &mut dyn Importer,
) -> Result<CompileResult, LessError> {
    let filename = options.filename.as_deref().unwrap_or("input");

    let mut file_info = FileInfo::for_entry(filename);
    file_info.rootpath = options.rootpath.clone();
    let file_info = Rc::new(file_info);

    let root =
        ParseCache::with(|cache| cache.get_or_parse(source, file_info.clone(), session))?;

    // Import pass: resolve and parse the import graph.
    let imports = {
        let visitor_context = eval_context(options, session);
        let mut import_visitor =
            ImportVisitor::new(importer, visitor_context, options.rootpath.clone());
        import_visitor.run(&root)?;
        import_visitor.imported_filenames
    };

    // Evaluation.
    let mut context = eval_context(options, session);
    context.plugin_bridge = options.plugin_bridge.clone();
    let evaluated = root.eval(&mut context)?;

    // The visitor cascade, in its fixed order.
    JoinSelectorVisitor::new().run(&evaluated)?;
    mark_tree_visibility(&evaluated, true);

    let mut extend_arena = Arena::new();
    ProcessExtendsVisitor::new(&mut extend_arena, session.clone()).run(&evaluated)?;

    ToCssVisitor::run(&evaluated, options.compress)?;

    let mut output = Output::new(options.compress, options.strict_units);
    evaluated.gen_css(&mut output)?;

    Ok(CompileResult {
        css: output.into_string(),
        imports,
    })
}

fn eval_context(options: &Options, session: &Session) -> EvalContext {
    let mut context = EvalContext::new(session.clone());
    context.math = options.math;
    context.strict_units = options.strict_units;
    context.compress = options.compress;
    context.rewrite_urls = options.rewrite_urls;
    context.url_args = options.url_args.clone();
    context.import_multiple = options.import_multiple;
    context
}

/// Turns an error's byte index into line/column against the right file.
fn resolve_error_position(
    error: &mut LessError,
    entry_source: &str,
    options: &Options,
    importer: &FileImporter,
) {
    let entry_name = options.filename.as_deref().unwrap_or("input");

    match error.filename.as_deref() {
        None | Some("") => {
            error.filename = Some(entry_name.to_string());
            error.resolve_position(entry_source);
        }
        Some(name) if name == entry_name => {
            error.resolve_position(entry_source);
        }
        Some(name) => {
            if let Some(contents) = importer.contents_of(name) {
                let contents = contents.to_string();
                error.resolve_position(&contents);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_str(source: &str) -> String {
        compile_with_session(source, &Options::default(), &Session::new_for_test_suite())
            .unwrap()
            .css
    }

    #[test]
    fn compiles_variables() {
        assert_eq!(compile_str("@c: red; .a { color: @c; }"), ".a {\n  color: red;\n}\n");
    }

    #[test]
    fn undefined_variable_is_a_name_error() {
        let err = compile_with_session(
            ".a { color: @missing; }",
            &Options::default(),
            &Session::new_for_test_suite(),
        )
        .unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::Name);
        assert!(err.line.is_some());
    }

    #[test]
    fn identical_input_is_deterministic() {
        let source = "@c: #123456; .a { color: @c; .b { width: 1px + 2px; } }";
        let first = compile_str(source);
        let second = compile_str(source);
        assert_eq!(first, second);
    }
}
