//! Plugin function host.
//!
//! `@plugin "file";` imports register extra functions with the compiler.  The
//! actual function implementations live behind the [`PluginBridge`] trait so
//! the host process (and its language runtime) stays outside the core; the
//! core only provides the *scoping* machinery: functions registered by a
//! plugin are visible in the ruleset that imported them and in its
//! descendants, shadowing registry functions of the same name.
//!
//! The bridge is consulted lazily: nothing plugin-related runs until the
//! first `@plugin` import is seen.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::LessError;
use crate::node::Node;

/// A function contributed by a plugin.
///
/// Returning `Ok(None)` leaves the call unevaluated, so it is emitted to the
/// CSS as written.
pub type PluginFunction = Rc<dyn Fn(&[Node]) -> Result<Option<Node>, LessError>>;

/// Host for loading plugin files.
///
/// Implementations resolve `path` however they like (external process, wasm,
/// native registry) and hand back the functions the plugin exports.  Errors
/// surface as `Plugin` errors on the `@plugin` import node.
pub trait PluginBridge {
    fn load_plugin(
        &self,
        path: &str,
        args: Option<&str>,
    ) -> Result<Vec<(String, PluginFunction)>, LessError>;
}

/// The tree of plugin function scopes, parallel to the evaluation frame
/// stack.
///
/// Entering a ruleset pushes a scope, leaving pops it; lookups walk from the
/// innermost scope outward.  Registration targets the innermost scope, so a
/// plugin imported inside a ruleset does not leak its functions to siblings.
#[derive(Clone, Default)]
pub struct FunctionScopes {
    scopes: Vec<HashMap<String, PluginFunction>>,
}

impl FunctionScopes {
    pub fn new() -> FunctionScopes {
        FunctionScopes {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1);
        self.scopes.pop();
    }

    /// Registers a function in the innermost scope.  Names are matched
    /// case-insensitively, like registry functions.
    pub fn register(&mut self, name: &str, function: PluginFunction) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_ascii_lowercase(), function);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<PluginFunction> {
        let lower = name.to_ascii_lowercase();

        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&lower).cloned())
    }

    /// True when no plugin has registered anything yet; lets the call site
    /// skip the scope walk entirely.
    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(|s| s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::atoms::Keyword;

    fn constant(value: &'static str) -> PluginFunction {
        Rc::new(move |_args| Ok(Some(Node::Keyword(Keyword::new(value)))))
    }

    fn call(scopes: &FunctionScopes, name: &str) -> Option<String> {
        let f = scopes.lookup(name)?;
        match f(&[]).unwrap() {
            Some(Node::Keyword(k)) => Some(k.value),
            _ => None,
        }
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut scopes = FunctionScopes::new();
        scopes.register("pi", constant("outer"));

        scopes.enter_scope();
        scopes.register("pi", constant("inner"));
        assert_eq!(call(&scopes, "pi").as_deref(), Some("inner"));

        scopes.exit_scope();
        assert_eq!(call(&scopes, "pi").as_deref(), Some("outer"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut scopes = FunctionScopes::new();
        scopes.register("myFunc", constant("x"));
        assert!(scopes.lookup("MYFUNC").is_some());
    }

    #[test]
    fn inner_scope_inherits_outer() {
        let mut scopes = FunctionScopes::new();
        scopes.register("f", constant("x"));
        scopes.enter_scope();
        assert!(scopes.lookup("f").is_some());
    }
}
