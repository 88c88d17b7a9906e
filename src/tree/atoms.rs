//! Small leaf nodes: raw text, keywords, strings, URLs, variable and
//! property references.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::node::{Node, NodeCommon};
use crate::output::{GenCss, Output};

/// Raw text that passes through to the output unchanged: unrecognized value
/// syntax, inlined CSS imports, at-rule preludes.
#[derive(Debug, Clone)]
pub struct Anonymous {
    pub node: NodeCommon,
    pub value: String,

    /// Anonymous blocks standing in for whole rules (inline imports) are
    /// emitted like rules, with a trailing newline in pretty output.
    pub ruleset_like: bool,
}

impl Anonymous {
    pub fn new(value: impl Into<String>) -> Anonymous {
        Anonymous {
            node: NodeCommon::default(),
            value: value.into(),
            ruleset_like: false,
        }
    }

    pub fn eval(&self, _context: &mut EvalContext) -> Result<Node, LessError> {
        Ok(Node::Anonymous(self.clone()))
    }
}

impl GenCss for Anonymous {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(&self.value);
        Ok(())
    }
}

/// A CSS comment.  Line comments are Less-only and never reach the output;
/// block comments survive unless minification drops them.
#[derive(Debug, Clone)]
pub struct Comment {
    pub node: NodeCommon,

    /// Full text including the delimiters.
    pub value: String,

    pub is_line_comment: bool,
}

impl Comment {
    pub fn new(value: impl Into<String>, is_line_comment: bool) -> Comment {
        Comment {
            node: NodeCommon::default(),
            value: value.into(),
            is_line_comment,
        }
    }

    /// Whether the comment should be dropped from the output.  `/*!` marks a
    /// comment that survives even minification.
    pub fn is_silent(&self, compress: bool) -> bool {
        self.is_line_comment || (compress && !self.value.starts_with("/*!"))
    }
}

impl GenCss for Comment {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(&self.value);
        Ok(())
    }
}

/// A bare identifier: `red`, `solid`, `true`.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub node: NodeCommon,
    pub value: String,
}

impl Keyword {
    pub fn new(value: impl Into<String>) -> Keyword {
        Keyword {
            node: NodeCommon::default(),
            value: value.into(),
        }
    }

    pub fn boolean(value: bool) -> Keyword {
        Keyword::new(if value { "true" } else { "false" })
    }
}

impl GenCss for Keyword {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        if self.value == "%" {
            return Err(LessError::syntax("invalid % without number"));
        }

        output.add(&self.value);
        Ok(())
    }
}

static INTERPOLATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{([\w-]+)\}").unwrap());

/// A quoted string, with `@{name}` interpolation resolved at eval time.
/// Escaped strings (`~"..."`) drop their quotes on output.
#[derive(Debug, Clone)]
pub struct Quoted {
    pub node: NodeCommon,
    pub value: String,
    pub quote: char,
    pub escaped: bool,
}

impl Quoted {
    pub fn new(value: impl Into<String>, quote: char, escaped: bool) -> Quoted {
        Quoted {
            node: NodeCommon::default(),
            value: value.into(),
            quote,
            escaped,
        }
    }

    pub fn contains_variables(&self) -> bool {
        INTERPOLATION.is_match(&self.value)
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let mut value = self.value.clone();

        // Interpolations can produce further interpolations; iterate until
        // the text settles.
        loop {
            let (range, name) = match INTERPOLATION.captures(&value) {
                Some(m) => (m.get(0).unwrap().range(), format!("@{}", &m[1])),
                None => break,
            };

            let variable = Variable {
                node: self.node.clone(),
                name,
            };
            let evaluated = variable.eval(context)?;
            let replacement = match &evaluated {
                Node::Quoted(q) => q.value.clone(),
                other => other.to_css_string(false)?,
            };

            value.replace_range(range, &replacement);
        }

        Ok(Node::Quoted(Quoted {
            node: self.node.clone(),
            value,
            quote: self.quote,
            escaped: self.escaped,
        }))
    }
}

impl GenCss for Quoted {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        if !self.escaped {
            output.add_char(self.quote);
        }
        output.add(&self.value);
        if !self.escaped {
            output.add_char(self.quote);
        }
        Ok(())
    }
}

static DATA_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*data:").unwrap());

/// A `url(...)` value.
#[derive(Debug, Clone)]
pub struct Url {
    pub node: NodeCommon,
    pub value: Node,

    /// Set once rewriting has happened, so re-evaluation is idempotent.
    pub is_evald: bool,
}

impl Url {
    pub fn new(value: Node) -> Url {
        Url {
            node: NodeCommon::default(),
            value,
            is_evald: false,
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let mut value = self.value.eval(context)?;

        if !self.is_evald {
            let rootpath = self
                .node
                .file_info
                .as_deref()
                .map(|fi| fi.rootpath.clone())
                .unwrap_or_default();

            if let Some(path) = url_string(&value) {
                let mut path = path;

                if context.path_requires_rewrite(&path) {
                    let rootpath = if matches!(value, Node::Quoted(_)) {
                        rootpath
                    } else {
                        escape_path(&rootpath)
                    };
                    path = context.rewrite_path(&path, &rootpath);
                } else {
                    path = crate::context::normalize_path(&path);
                }

                if let Some(ref url_args) = context.url_args {
                    if !DATA_URI.is_match(&path) {
                        let delim = if path.contains('?') { '&' } else { '?' };
                        let args = format!("{delim}{url_args}");

                        if let Some(hash) = path.find('#') {
                            path.insert_str(hash, &args);
                        } else {
                            path.push_str(&args);
                        }
                    }
                }

                set_url_string(&mut value, path);
            }
        }

        Ok(Node::Url(Box::new(Url {
            node: self.node.clone(),
            value,
            is_evald: true,
        })))
    }
}

impl GenCss for Url {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add("url(");
        self.value.gen_css(output)?;
        output.add(")");
        Ok(())
    }
}

fn url_string(value: &Node) -> Option<String> {
    match value {
        Node::Quoted(q) => Some(q.value.clone()),
        Node::Anonymous(a) => Some(a.value.clone()),
        _ => None,
    }
}

fn set_url_string(value: &mut Node, s: String) {
    match value {
        Node::Quoted(q) => q.value = s,
        Node::Anonymous(a) => a.value = s,
        _ => (),
    }
}

/// Backslash-escapes the characters that would break an unquoted url token.
fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());

    for c in path.chars() {
        if matches!(c, '(' | ')' | '\'' | '"') || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

/// `key=value` pairs inside legacy filter functions.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub node: NodeCommon,
    pub key: String,
    pub value: Node,
}

impl Assignment {
    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        Ok(Node::Assignment(Box::new(Assignment {
            node: self.node.clone(),
            key: self.key.clone(),
            value: self.value.eval(context)?,
        })))
    }
}

impl GenCss for Assignment {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(&self.key);
        output.add("=");
        self.value.gen_css(output)
    }
}

/// An attribute selector, `[key op value i]`.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub node: NodeCommon,
    pub key: String,
    pub op: Option<String>,
    pub value: Option<Node>,

    /// Case-sensitivity flag (`i` or `s`).
    pub cif: Option<String>,
}

impl Attribute {
    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let value = match &self.value {
            Some(v) => Some(v.eval(context)?),
            None => None,
        };

        Ok(Node::Attribute(Box::new(Attribute {
            node: self.node.clone(),
            key: self.key.clone(),
            op: self.op.clone(),
            value,
            cif: self.cif.clone(),
        })))
    }
}

impl GenCss for Attribute {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add("[");
        output.add(&self.key);

        if let (Some(op), Some(value)) = (&self.op, &self.value) {
            output.add(op);
            value.gen_css(output)?;
        }

        if let Some(cif) = &self.cif {
            output.add(" ");
            output.add(cif);
        }

        output.add("]");
        Ok(())
    }
}

/// Backtick-quoted inline JavaScript.  The core has no script host, so
/// evaluating one of these is an error; parsing them keeps diagnostics sane.
#[derive(Debug, Clone)]
pub struct JavaScript {
    pub node: NodeCommon,
    pub expression: String,
    pub escaped: bool,
}

impl JavaScript {
    pub fn eval(&self, _context: &mut EvalContext) -> Result<Node, LessError> {
        Err(LessError::runtime(
            "inline JavaScript is not supported; define a plugin function instead",
        )
        .at(self.node.index, self.node.file_info.as_deref()))
    }
}

impl GenCss for JavaScript {
    fn gen_css(&self, _output: &mut Output) -> Result<(), LessError> {
        Err(LessError::syntax("inline JavaScript cannot be output as CSS"))
    }
}

/// A `U+0025-00FF` unicode range descriptor.
#[derive(Debug, Clone)]
pub struct UnicodeDescriptor {
    pub node: NodeCommon,
    pub value: String,
}

impl GenCss for UnicodeDescriptor {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        output.add(&self.value);
        Ok(())
    }
}

/// A variable reference, `@name`.  The name keeps its `@`.
#[derive(Debug, Clone)]
pub struct Variable {
    pub node: NodeCommon,
    pub name: String,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Variable {
        Variable {
            node: NodeCommon::default(),
            name: name.into(),
        }
    }

    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let mut name = self.name.clone();

        // @@name: the variable's value names the variable to read.
        if let Some(inner) = name.strip_prefix("@@") {
            let referenced = Variable {
                node: self.node.clone(),
                name: format!("@{inner}"),
            }
            .eval(context)?;

            let referenced = match &referenced {
                Node::Quoted(q) => q.value.clone(),
                Node::Keyword(k) => k.value.clone(),
                other => other.to_css_string(false)?,
            };
            name = format!("@{referenced}");
        }

        let Some((frame, declaration)) = context.find_variable(&name) else {
            return Err(LessError::name(format!("variable {name} is undefined"))
                .at(self.node.index, self.node.file_info.as_deref()));
        };

        let Node::Declaration(declaration) = declaration else {
            return Err(LessError::syntax(format!("{name} is not a variable"))
                .at(self.node.index, self.node.file_info.as_deref()));
        };

        if let Some(ref important) = declaration.important {
            if let Some(scope) = context.important_scope.last_mut() {
                scope.important = Some(important.clone());
            }
        }

        let key = (frame_address(&frame), name.clone());
        if !context.evaluating_variables.insert(key.clone()) {
            return Err(
                LessError::name(format!("recursive variable definition for {name}"))
                    .at(self.node.index, self.node.file_info.as_deref()),
            );
        }

        let result = declaration.value.eval(context);
        context.evaluating_variables.remove(&key);

        result.map_err(|e| e.at(self.node.index, self.node.file_info.as_deref()))
    }
}

fn frame_address(frame: &crate::context::Frame) -> usize {
    match frame {
        crate::context::Frame::Ruleset(r) => std::rc::Rc::as_ptr(r) as usize,
        crate::context::Frame::Mixin(m) => std::rc::Rc::as_ptr(m) as usize,
    }
}

/// A property accessor, `$name`: reads the last declaration of `name` in
/// scope.
#[derive(Debug, Clone)]
pub struct Property {
    pub node: NodeCommon,
    pub name: String,
}

impl Property {
    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let found = context
            .frames
            .iter()
            .rev()
            .map(|f| f.property(&self.name))
            .find(|decls| !decls.is_empty());

        let Some(declarations) = found else {
            return Err(LessError::name(format!(
                "property '{}' is undefined",
                self.name
            ))
            .at(self.node.index, self.node.file_info.as_deref()));
        };

        // Later declarations win, like the cascade does.
        let last = declarations.last().expect("non-empty by construction");

        let Node::Declaration(declaration) = last else {
            return Err(LessError::syntax(format!("'{}' is not a property", self.name)));
        };

        if let Some(ref important) = declaration.important {
            if let Some(scope) = context.important_scope.last_mut() {
                scope.important = Some(important.clone());
            }
        }

        declaration.value.eval(context)
    }
}

/// A lookup into a namespace or detached ruleset: `#ns.mixin[@var]`,
/// `@detached[$prop]`.
#[derive(Debug, Clone)]
pub struct NamespaceValue {
    pub node: NodeCommon,

    /// Evaluates to the ruleset to look into.
    pub value: Node,

    /// Lookup chain; each entry is `@var`, `$prop`, a bare property name, or
    /// `""` for "the last declaration".
    pub lookups: Vec<String>,
}

impl NamespaceValue {
    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        let mut current = self.value.eval(context)?;

        for lookup in &self.lookups {
            let ruleset = match &current {
                Node::DetachedRuleset(d) => d.ruleset.clone(),
                Node::Ruleset(r) => r.clone(),
                other => {
                    return Err(LessError::name(format!(
                        "cannot look up '{lookup}' in {}",
                        other.kind_name()
                    ))
                    .at(self.node.index, self.node.file_info.as_deref()));
                }
            };

            let declaration = if lookup.is_empty() {
                ruleset.last_declaration()
            } else if lookup.starts_with('@') {
                ruleset.variable(lookup)
            } else {
                let name = lookup.strip_prefix('$').unwrap_or(lookup);
                ruleset.property(name).last().cloned()
            };

            let Some(Node::Declaration(declaration)) = declaration else {
                return Err(LessError::name(format!(
                    "'{lookup}' was not found in the namespace"
                ))
                .at(self.node.index, self.node.file_info.as_deref()));
            };

            current = declaration.value.eval(context)?;
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaped_quoted_drops_quotes() {
        let q = Quoted::new("ms:stuff()", '"', true);
        assert_eq!(q.to_css_string(false).unwrap(), "ms:stuff()");

        let q = Quoted::new("hello", '\'', false);
        assert_eq!(q.to_css_string(false).unwrap(), "'hello'");
    }

    #[test]
    fn detects_interpolation() {
        assert!(Quoted::new("a @{x} b", '"', false).contains_variables());
        assert!(!Quoted::new("a @ x b", '"', false).contains_variables());
    }

    #[test]
    fn keyword_percent_is_invalid() {
        let k = Keyword::new("%");
        assert!(k.to_css_string(false).is_err());
    }

    #[test]
    fn attribute_serialization() {
        let a = Attribute {
            node: NodeCommon::default(),
            key: "data-x".to_string(),
            op: Some("^=".to_string()),
            value: Some(Node::Quoted(Quoted::new("y", '"', false))),
            cif: Some("i".to_string()),
        };
        assert_eq!(a.to_css_string(false).unwrap(), "[data-x^=\"y\" i]");
    }

    #[test]
    fn escape_path_escapes_spaces_and_parens() {
        assert_eq!(escape_path("a (b)/c d"), "a\\ \\(b\\)/c\\ d");
    }
}
