//! The built-in function registry.
//!
//! Functions live in a process-wide registry, built lazily on first use and
//! immutable afterwards.  Per-scope additions (from `@plugin` imports) layer
//! on top through [`crate::plugin::FunctionScopes`], which the call site
//! consults before this registry.
//!
//! A builtin returning `Ok(None)` declines to evaluate the call, which is
//! then emitted to the CSS as written; that is how `min()` with
//! incomparable operands passes through as a native CSS `min()`.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{FileInfo, Node};
use crate::tree::color::Color;
use crate::tree::dimension::Dimension;

mod color;
mod color_ops;
mod list;
mod logic;
mod math;
mod number;
mod string;
mod types;

/// Call-site state handed to a builtin.
pub struct FunctionContext<'a, 'b> {
    pub context: &'a mut EvalContext,
    pub name: &'b str,
    pub index: Option<usize>,
    pub file_info: Option<Rc<FileInfo>>,
}

pub type BuiltinFn = fn(&mut FunctionContext<'_, '_>, &[Node]) -> Result<Option<Node>, LessError>;

/// One registry entry.
pub struct FunctionEntry {
    /// Whether arguments are evaluated before the call.  Control-flow
    /// functions (`if`, `boolean`, `isdefined`) see their arguments raw.
    pub eval_args: bool,

    /// Whether the function reads evaluation state (guard defaults, frames).
    pub needs_context: bool,

    pub func: BuiltinFn,
}

/// Name-indexed function table; lookups are case-insensitive.
pub struct FunctionRegistry {
    map: HashMap<String, FunctionEntry>,
}

static GLOBAL: Lazy<FunctionRegistry> = Lazy::new(|| {
    let mut registry = FunctionRegistry {
        map: HashMap::new(),
    };

    math::register(&mut registry);
    number::register(&mut registry);
    string::register(&mut registry);
    list::register(&mut registry);
    color::register(&mut registry);
    color_ops::register(&mut registry);
    types::register(&mut registry);
    logic::register(&mut registry);

    registry
});

impl FunctionRegistry {
    pub fn global() -> &'static FunctionRegistry {
        &GLOBAL
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.map.get(&name.to_ascii_lowercase())
    }

    pub(crate) fn add(&mut self, name: &str, func: BuiltinFn) {
        self.map.insert(
            name.to_ascii_lowercase(),
            FunctionEntry {
                eval_args: true,
                needs_context: false,
                func,
            },
        );
    }

    pub(crate) fn add_raw_args(&mut self, name: &str, func: BuiltinFn) {
        self.map.insert(
            name.to_ascii_lowercase(),
            FunctionEntry {
                eval_args: false,
                needs_context: true,
                func,
            },
        );
    }

    pub(crate) fn add_with_context(&mut self, name: &str, func: BuiltinFn) {
        self.map.insert(
            name.to_ascii_lowercase(),
            FunctionEntry {
                eval_args: true,
                needs_context: true,
                func,
            },
        );
    }
}

/// The `i`-th argument as a dimension.
pub(crate) fn expect_dimension<'a>(
    args: &'a [Node],
    i: usize,
    function: &str,
) -> Result<&'a Dimension, LessError> {
    match args.get(i) {
        Some(Node::Dimension(d)) => Ok(d),
        Some(other) => Err(LessError::argument(format!(
            "argument {} to {function} must be a number, found {}",
            i + 1,
            other.kind_name()
        ))),
        None => Err(LessError::argument(format!(
            "{function} expects at least {} arguments",
            i + 1
        ))),
    }
}

/// The `i`-th argument as a color (color keywords already parse as colors).
pub(crate) fn expect_color(args: &[Node], i: usize, function: &str) -> Result<Color, LessError> {
    match args.get(i) {
        Some(node) => node.to_color().ok_or_else(|| {
            LessError::argument(format!(
                "argument {} to {function} must be a color",
                i + 1
            ))
        }),
        None => Err(LessError::argument(format!(
            "{function} expects at least {} arguments",
            i + 1
        ))),
    }
}

/// The `i`-th argument as a string-ish value.
pub(crate) fn expect_string(args: &[Node], i: usize, function: &str) -> Result<String, LessError> {
    match args.get(i) {
        Some(Node::Quoted(q)) => Ok(q.value.clone()),
        Some(Node::Keyword(k)) => Ok(k.value.clone()),
        Some(Node::Anonymous(a)) => Ok(a.value.clone()),
        Some(other) => Err(LessError::argument(format!(
            "argument {} to {function} must be a string, found {}",
            i + 1,
            other.kind_name()
        ))),
        None => Err(LessError::argument(format!(
            "{function} expects at least {} arguments",
            i + 1
        ))),
    }
}

/// A color-channel or percentage number: `50%` reads as `0.5`.
pub(crate) fn fraction_of(node: &Node, function: &str) -> Result<f64, LessError> {
    match node {
        Node::Dimension(d) => {
            if d.unit.numerator.first().map(String::as_str) == Some("%") {
                Ok(d.value / 100.0)
            } else {
                Ok(d.value)
            }
        }
        other => Err(LessError::argument(format!(
            "{function} expects a number, found {}",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_case_insensitive() {
        assert!(FunctionRegistry::global().get("CEIL").is_some());
        assert!(FunctionRegistry::global().get("ceil").is_some());
        assert!(FunctionRegistry::global().get("no-such-function").is_none());
    }

    #[test]
    fn control_flow_functions_take_raw_args() {
        let registry = FunctionRegistry::global();
        assert!(!registry.get("if").unwrap().eval_args);
        assert!(!registry.get("boolean").unwrap().eval_args);
        assert!(registry.get("ceil").unwrap().eval_args);
    }
}
