//! The evaluation context: scope frames, math gating, and the mutable state
//! the passes thread through evaluation.

use std::collections::HashSet;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::node::Node;
use crate::plugin::{FunctionScopes, PluginBridge};
use crate::session::Session;
use crate::tree::mixin::MixinDefinition;
use crate::tree::ruleset::Ruleset;

/// When arithmetic between numeric values is performed vs left as CSS text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MathMode {
    /// Operations always evaluate.
    Always,

    /// Division only evaluates inside parentheses; everything else always
    /// evaluates.
    #[default]
    ParensDivision,

    /// All operations require parentheses.
    Parens,
}

/// Which URLs get the rootpath rewrite applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RewriteUrls {
    #[default]
    Off,
    Local,
    All,
}

/// A scope entry providing variable and mixin lookup.
#[derive(Clone)]
pub enum Frame {
    Ruleset(Rc<Ruleset>),
    Mixin(Rc<MixinDefinition>),
}

impl Frame {
    /// Looks up a variable declaration by name (including the leading `@`).
    pub fn variable(&self, name: &str) -> Option<Node> {
        match self {
            Frame::Ruleset(r) => r.variable(name),
            Frame::Mixin(m) => m.variable(name),
        }
    }

    /// Looks up declarations by property name, for `$prop` references.
    pub fn property(&self, name: &str) -> Vec<Node> {
        match self {
            Frame::Ruleset(r) => r.property(name),
            Frame::Mixin(_) => Vec::new(),
        }
    }

    pub fn as_ruleset(&self) -> Option<&Rc<Ruleset>> {
        match self {
            Frame::Ruleset(r) => Some(r),
            Frame::Mixin(_) => None,
        }
    }
}

/// One entry of the `!important` propagation stack.
///
/// A mixin call flagged `!important` pushes `" !important"` here so every
/// declaration produced by the expansion picks it up.
#[derive(Clone, Default)]
pub struct ImportantScope {
    pub important: Option<String>,
}

/// The state evaluation carries around.
pub struct EvalContext {
    pub session: Session,

    /// Scope chain; the innermost frame is last.
    pub frames: Vec<Frame>,

    pub math: MathMode,
    pub math_on: bool,
    pub strict_units: bool,
    pub compress: bool,

    pub rewrite_urls: RewriteUrls,
    pub url_args: Option<String>,

    /// Global default for the `multiple` import option.
    pub import_multiple: bool,

    /// `!important` propagation; one scope per declaration / mixin call.
    pub important_scope: Vec<ImportantScope>,

    calc_stack: Vec<bool>,
    parens_stack: Vec<bool>,

    /// `@media`/`@container` blocks collected while evaluating, to be
    /// re-emitted flattened at the top level.
    pub media_blocks: Vec<Node>,
    pub media_path: Vec<Node>,

    /// Current value for the `default()` guard function; `None` outside
    /// mixin-candidate matching, where calling `default()` is an error.
    pub default_func_value: Option<bool>,

    /// Functions registered by `@plugin` imports, scoped to rulesets.
    pub function_scopes: FunctionScopes,

    pub plugin_bridge: Option<Rc<dyn PluginBridge>>,

    /// In-progress variable evaluations, for cycle detection.  Keyed by the
    /// owning ruleset's address and the variable name.
    pub evaluating_variables: HashSet<(usize, String)>,

    /// Mixin call chain for error reporting, innermost last.
    pub call_stack: Vec<String>,
}

impl EvalContext {
    pub fn new(session: Session) -> EvalContext {
        EvalContext {
            session,
            frames: Vec::new(),
            math: MathMode::default(),
            math_on: true,
            strict_units: false,
            compress: false,
            rewrite_urls: RewriteUrls::default(),
            url_args: None,
            import_multiple: false,
            important_scope: vec![ImportantScope::default()],
            calc_stack: Vec::new(),
            parens_stack: Vec::new(),
            media_blocks: Vec::new(),
            media_path: Vec::new(),
            default_func_value: None,
            function_scopes: FunctionScopes::new(),
            plugin_bridge: None,
            evaluating_variables: HashSet::new(),
            call_stack: Vec::new(),
        }
    }

    /// Whether the operator should evaluate here, per the math mode.
    pub fn is_math_on(&self, op: char) -> bool {
        if !self.math_on {
            return false;
        }

        if op == '/' && self.math != MathMode::Always && self.parens_stack.is_empty() {
            return false;
        }

        if self.math == MathMode::Parens {
            return !self.parens_stack.is_empty();
        }

        true
    }

    pub fn enter_calc(&mut self) {
        self.calc_stack.push(true);
    }

    pub fn exit_calc(&mut self) {
        self.calc_stack.pop();
    }

    pub fn in_calc(&self) -> bool {
        !self.calc_stack.is_empty()
    }

    pub fn in_parenthesis(&mut self) {
        self.parens_stack.push(true);
    }

    pub fn out_of_parenthesis(&mut self) {
        self.parens_stack.pop();
    }

    /// Walks the frame stack, innermost first, for a variable declaration.
    pub fn find_variable(&self, name: &str) -> Option<(Frame, Node)> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.variable(name).map(|decl| (f.clone(), decl)))
    }

    /// Snapshot of the current frame stack, as captured by detached rulesets
    /// and mixin definitions.
    pub fn frames_snapshot(&self) -> Vec<Frame> {
        self.frames.clone()
    }

    /// Runs `f` with a different frame stack, restoring the original after.
    /// Mixin bodies and detached rulesets evaluate against their captured
    /// frames, not the caller's.
    pub fn with_frames<T>(
        &mut self,
        frames: Vec<Frame>,
        f: impl FnOnce(&mut EvalContext) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.frames, frames);
        let result = f(self);
        self.frames = saved;
        result
    }

    /// Whether `path` should have the rootpath prepended.
    pub fn path_requires_rewrite(&self, path: &str) -> bool {
        match self.rewrite_urls {
            RewriteUrls::Off => false,
            RewriteUrls::Local => is_path_local_relative(path),
            RewriteUrls::All => is_path_relative(path),
        }
    }

    pub fn rewrite_path(&self, path: &str, rootpath: &str) -> String {
        let new_path = normalize_path(&format!("{rootpath}{path}"));

        // A local-relative path joined to a relative rootpath must stay
        // local-relative.
        if is_path_local_relative(path)
            && is_path_relative(rootpath)
            && !is_path_local_relative(&new_path)
        {
            return format!("./{new_path}");
        }

        new_path
    }
}

static ABSOLUTE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:[a-z-]+:|/|#)").unwrap());

/// A path with no scheme, not rooted and not a fragment.
pub fn is_path_relative(path: &str) -> bool {
    !ABSOLUTE_PATH.is_match(path)
}

/// A path explicitly relative to the current file (`./x`, `../x`).
pub fn is_path_local_relative(path: &str) -> bool {
    path.starts_with('.')
}

/// Collapses `.` and `..` segments.
pub fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "." => (),
            ".." => {
                if out.is_empty() || out.last() == Some(&"..") {
                    out.push(segment);
                } else {
                    out.pop();
                }
            }
            _ => out.push(segment),
        }
    }

    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(math: MathMode) -> EvalContext {
        let mut ctx = EvalContext::new(Session::new_for_test_suite());
        ctx.math = math;
        ctx
    }

    #[test]
    fn division_needs_parens_by_default() {
        let mut ctx = context(MathMode::ParensDivision);

        assert!(ctx.is_math_on('+'));
        assert!(!ctx.is_math_on('/'));

        ctx.in_parenthesis();
        assert!(ctx.is_math_on('/'));
        ctx.out_of_parenthesis();
        assert!(!ctx.is_math_on('/'));
    }

    #[test]
    fn parens_mode_gates_everything() {
        let mut ctx = context(MathMode::Parens);

        assert!(!ctx.is_math_on('+'));
        ctx.in_parenthesis();
        assert!(ctx.is_math_on('+'));
        assert!(ctx.is_math_on('/'));
    }

    #[test]
    fn always_mode_divides_anywhere() {
        let ctx = context(MathMode::Always);
        assert!(ctx.is_math_on('/'));
    }

    #[test]
    fn math_off_beats_everything() {
        let mut ctx = context(MathMode::Always);
        ctx.math_on = false;
        assert!(!ctx.is_math_on('+'));
    }

    #[test]
    fn path_classification() {
        assert!(is_path_relative("foo/bar.png"));
        assert!(is_path_relative("./foo.png"));
        assert!(!is_path_relative("/abs/foo.png"));
        assert!(!is_path_relative("http://x/foo.png"));
        assert!(!is_path_relative("data:image/png;base64,xyz"));
        assert!(!is_path_relative("#frag"));

        assert!(is_path_local_relative("./a.png"));
        assert!(is_path_local_relative("../a.png"));
        assert!(!is_path_local_relative("a.png"));
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("a/b/../c/./d"), "a/c/d");
        assert_eq!(normalize_path("../a/b"), "../a/b");
        assert_eq!(normalize_path("a/../../b"), "../b");
    }

    #[test]
    fn rewrite_keeps_local_relative_prefix() {
        let mut ctx = context(MathMode::Always);
        ctx.rewrite_urls = RewriteUrls::All;

        assert_eq!(ctx.rewrite_path("./img.png", "assets/"), "./assets/img.png");
        assert_eq!(ctx.rewrite_path("img.png", "assets/"), "assets/img.png");
    }
}
