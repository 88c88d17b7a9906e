//! Tree nodes, the representation of parsed Less values and rules.
//!
//! Every AST variant embeds a [`NodeCommon`] envelope with the source position,
//! originating file, and output-visibility state.  The closed set of variants
//! lives in the [`Node`] enum; evaluation and CSS generation dispatch over it.
//!
//! Nodes are created by the parser or by evaluation; evaluation is
//! non-destructive and returns fresh nodes.  Structural nodes that need to be
//! shared (rulesets in scope frames, selectors in paths) are reference-counted,
//! and the handful of fields that later passes mutate (visibility, computed
//! selector paths) use interior mutability, so a shared subtree can be
//! annotated without reshaping it.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::context::EvalContext;
use crate::error::LessError;
use crate::output::{GenCss, Output};
use crate::tree::atoms::{
    Anonymous, Assignment, Attribute, Comment, JavaScript, Keyword, NamespaceValue, Property,
    Quoted, UnicodeDescriptor, Url, Variable,
};
use crate::tree::atrule::{AtRule, Container, Media};
use crate::tree::call::Call;
use crate::tree::color::Color;
use crate::tree::declaration::Declaration;
use crate::tree::detached::DetachedRuleset;
use crate::tree::dimension::Dimension;
use crate::tree::expression::{Expression, ValueList};
use crate::tree::extend::Extend;
use crate::tree::import::Import;
use crate::tree::mixin::{MixinCall, MixinDefinition};
use crate::tree::operation::{Condition, Negative, Operation, Paren};
use crate::tree::ruleset::Ruleset;

/// Provenance of a node: which file it came from and how paths in that file
/// should be rewritten.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    /// Path of the file, as given to the importer.
    pub filename: String,

    /// Prefix to apply to URLs and import paths from this file.
    pub rootpath: String,

    /// Directory the file lives in, used to resolve relative imports.
    pub current_directory: String,

    /// Directory of the entry file of the compilation.
    pub entry_path: String,

    /// Filename of the entry file of the compilation.
    pub root_filename: String,

    /// Whether the file was pulled in through a `reference` import.
    pub reference: bool,
}

impl FileInfo {
    /// Builds the file info for a compilation's entry file.
    pub fn for_entry(filename: &str) -> FileInfo {
        let dir = directory_of(filename);

        FileInfo {
            filename: filename.to_string(),
            rootpath: String::new(),
            current_directory: dir.clone(),
            entry_path: dir,
            root_filename: filename.to_string(),
            reference: false,
        }
    }
}

/// Returns the directory part of a path, with a trailing `/`.
pub fn directory_of(path: &str) -> String {
    match path.rfind('/') {
        Some(p) => path[..=p].to_string(),
        None => String::new(),
    }
}

/// The common envelope embedded in every AST variant.
#[derive(Debug, Clone, Default)]
pub struct NodeCommon {
    /// Byte offset into the source, for diagnostics.
    pub index: Option<usize>,

    /// File the node was parsed from.
    pub file_info: Option<Rc<FileInfo>>,

    /// Number of enclosing `reference` imports.  Non-zero means the node is
    /// invisible unless something (an extend, a mixin call) surfaces it.
    pub visibility_blocks: Cell<u32>,

    /// Explicit visibility override; `None` means "use the default".
    pub node_visible: Cell<Option<bool>>,
}

impl NodeCommon {
    pub fn at(index: usize, file_info: Option<Rc<FileInfo>>) -> NodeCommon {
        NodeCommon {
            index: Some(index),
            file_info,
            ..NodeCommon::default()
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.file_info.as_deref().map(|fi| fi.filename.as_str())
    }

    /// True when the node sits inside at least one `reference` import and
    /// nothing has surfaced it yet.
    pub fn blocks_visibility(&self) -> bool {
        self.visibility_blocks.get() > 0
    }

    pub fn add_visibility_block(&self) {
        self.visibility_blocks.set(self.visibility_blocks.get() + 1);
    }

    pub fn remove_visibility_block(&self) {
        let blocks = self.visibility_blocks.get();
        if blocks > 0 {
            self.visibility_blocks.set(blocks - 1);
        }
    }

    pub fn ensure_visibility(&self) {
        self.node_visible.set(Some(true));
    }

    pub fn ensure_invisibility(&self) {
        self.node_visible.set(Some(false));
    }

    pub fn is_visible(&self) -> Option<bool> {
        self.node_visible.get()
    }

    /// Copies the visibility state from another node, as when a replacement
    /// node stands in for the one it was derived from.
    pub fn copy_visibility_info(&self, other: &NodeCommon) {
        self.visibility_blocks.set(other.visibility_blocks.get());
        self.node_visible.set(other.node_visible.get());
    }
}

/// A parsed Less AST node.  This is a closed set; the visitor passes dispatch
/// over it exhaustively.
#[derive(Clone)]
pub enum Node {
    Anonymous(Anonymous),
    Comment(Comment),
    Keyword(Keyword),
    Quoted(Quoted),
    Dimension(Dimension),
    Color(Color),
    UnicodeDescriptor(UnicodeDescriptor),
    Assignment(Box<Assignment>),
    Attribute(Box<Attribute>),
    Url(Box<Url>),
    Variable(Variable),
    Property(Property),
    NamespaceValue(Box<NamespaceValue>),
    JavaScript(JavaScript),
    Paren(Box<Paren>),
    Negative(Box<Negative>),
    Operation(Box<Operation>),
    Condition(Box<Condition>),
    Expression(Expression),
    Value(ValueList),
    Call(Box<Call>),
    Ruleset(Rc<Ruleset>),
    Declaration(Box<Declaration>),
    AtRule(Rc<AtRule>),
    Media(Rc<Media>),
    Container(Rc<Container>),
    Import(Rc<Import>),
    MixinDefinition(Rc<MixinDefinition>),
    MixinCall(Box<MixinCall>),
    DetachedRuleset(DetachedRuleset),
    Extend(Rc<Extend>),
}

impl Node {
    /// The embedded envelope.
    pub fn common(&self) -> &NodeCommon {
        match self {
            Node::Anonymous(n) => &n.node,
            Node::Comment(n) => &n.node,
            Node::Keyword(n) => &n.node,
            Node::Quoted(n) => &n.node,
            Node::Dimension(n) => &n.node,
            Node::Color(n) => &n.node,
            Node::UnicodeDescriptor(n) => &n.node,
            Node::Assignment(n) => &n.node,
            Node::Attribute(n) => &n.node,
            Node::Url(n) => &n.node,
            Node::Variable(n) => &n.node,
            Node::Property(n) => &n.node,
            Node::NamespaceValue(n) => &n.node,
            Node::JavaScript(n) => &n.node,
            Node::Paren(n) => &n.node,
            Node::Negative(n) => &n.node,
            Node::Operation(n) => &n.node,
            Node::Condition(n) => &n.node,
            Node::Expression(n) => &n.node,
            Node::Value(n) => &n.node,
            Node::Call(n) => &n.node,
            Node::Ruleset(n) => &n.node,
            Node::Declaration(n) => &n.node,
            Node::AtRule(n) => &n.node,
            Node::Media(n) => &n.node,
            Node::Container(n) => &n.node,
            Node::Import(n) => &n.node,
            Node::MixinDefinition(n) => &n.node,
            Node::MixinCall(n) => &n.node,
            Node::DetachedRuleset(n) => &n.node,
            Node::Extend(n) => &n.node,
        }
    }

    /// Human-readable variant name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Anonymous(_) => "anonymous value",
            Node::Comment(_) => "comment",
            Node::Keyword(_) => "keyword",
            Node::Quoted(_) => "string",
            Node::Dimension(_) => "number",
            Node::Color(_) => "color",
            Node::UnicodeDescriptor(_) => "unicode range",
            Node::Assignment(_) => "assignment",
            Node::Attribute(_) => "attribute",
            Node::Url(_) => "url",
            Node::Variable(_) => "variable",
            Node::Property(_) => "property reference",
            Node::NamespaceValue(_) => "namespace lookup",
            Node::JavaScript(_) => "inline javascript",
            Node::Paren(_) => "parenthesized value",
            Node::Negative(_) => "negation",
            Node::Operation(_) => "operation",
            Node::Condition(_) => "condition",
            Node::Expression(_) => "expression",
            Node::Value(_) => "value list",
            Node::Call(_) => "function call",
            Node::Ruleset(_) => "ruleset",
            Node::Declaration(_) => "declaration",
            Node::AtRule(_) => "at-rule",
            Node::Media(_) => "media block",
            Node::Container(_) => "container block",
            Node::Import(_) => "import",
            Node::MixinDefinition(_) => "mixin definition",
            Node::MixinCall(_) => "mixin call",
            Node::DetachedRuleset(_) => "detached ruleset",
            Node::Extend(_) => "extend",
        }
    }

    /// Evaluates the node in the given context, returning a fresh node.
    pub fn eval(&self, context: &mut EvalContext) -> Result<Node, LessError> {
        match self {
            Node::Anonymous(n) => n.eval(context),
            Node::Comment(_) => Ok(self.clone()),
            Node::Keyword(_) => Ok(self.clone()),
            Node::Quoted(n) => n.eval(context),
            Node::Dimension(n) => n.eval(context),
            Node::Color(_) => Ok(self.clone()),
            Node::UnicodeDescriptor(_) => Ok(self.clone()),
            Node::Assignment(n) => n.eval(context),
            Node::Attribute(n) => n.eval(context),
            Node::Url(n) => n.eval(context),
            Node::Variable(n) => n.eval(context),
            Node::Property(n) => n.eval(context),
            Node::NamespaceValue(n) => n.eval(context),
            Node::JavaScript(n) => n.eval(context),
            Node::Paren(n) => n.eval(context),
            Node::Negative(n) => n.eval(context),
            Node::Operation(n) => n.eval(context),
            Node::Condition(n) => n.eval(context).map(Node::from_bool),
            Node::Expression(n) => n.eval(context),
            Node::Value(n) => n.eval(context),
            Node::Call(n) => n.eval(context),
            Node::Ruleset(n) => n.eval(context).map(Node::Ruleset),
            Node::Declaration(n) => n.eval(context),
            Node::AtRule(n) => n.eval(context),
            Node::Media(n) => n.eval(context),
            Node::Container(n) => n.eval(context),
            // Imports are spliced by Ruleset::eval before general rule
            // evaluation; one reaching here is a CSS passthrough.
            Node::Import(n) => Ok(Node::Import(n.clone())),
            Node::MixinDefinition(n) => n.eval(context),
            Node::MixinCall(n) => {
                // Only reached when a call appears in value position; rule
                // position is handled by Ruleset::eval, which splices the
                // expansion.
                Err(LessError::syntax("mixin call is not a value")
                    .at(n.node.index, n.node.file_info.as_deref()))
            }
            Node::DetachedRuleset(n) => n.eval(context),
            Node::Extend(n) => Ok(Node::Extend(Rc::new(n.eval(context)?))),
        }
    }

    pub fn from_bool(b: bool) -> Node {
        Node::Keyword(Keyword::boolean(b))
    }

    pub fn as_dimension(&self) -> Option<&Dimension> {
        match self {
            Node::Dimension(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<&Color> {
        match self {
            Node::Color(c) => Some(c),
            _ => None,
        }
    }

    /// Coerces the node into a color: either it already is one, or it is a
    /// keyword naming one of the CSS colors.
    pub fn to_color(&self) -> Option<Color> {
        match self {
            Node::Color(c) => Some(c.clone()),
            Node::Keyword(k) => Color::from_keyword(&k.value),
            _ => None,
        }
    }

    /// True for the `true` keyword; everything else is falsy in guards.
    pub fn is_true(&self) -> bool {
        matches!(self, Node::Keyword(k) if k.value == "true")
    }

    /// Compares two evaluated values for guard conditions.
    ///
    /// Returns `None` when the values are not comparable; an ordering
    /// comparison against `None` makes the guard false rather than erroring.
    pub fn compare(&self, other: &Node) -> Option<Ordering> {
        match (self, other) {
            (Node::Dimension(a), Node::Dimension(b)) => a.compare(b),
            (Node::Color(a), Node::Color(b)) => {
                if a.same_value(b) {
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
            (Node::Quoted(a), Node::Quoted(b)) => Some(a.value.cmp(&b.value)),
            (Node::Keyword(a), Node::Keyword(b)) => Some(a.value.cmp(&b.value)),
            (Node::Anonymous(a), Node::Anonymous(b)) => Some(a.value.cmp(&b.value)),
            _ => {
                // Mixed kinds only ever compare equal, via their CSS text.
                let a = self.to_css_string(false).ok()?;
                let b = other.to_css_string(false).ok()?;
                if a == b {
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
        }
    }

}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind_name())
    }
}

impl GenCss for Node {
    fn gen_css(&self, output: &mut Output) -> Result<(), LessError> {
        match self {
            Node::Anonymous(n) => n.gen_css(output),
            Node::Comment(n) => n.gen_css(output),
            Node::Keyword(n) => n.gen_css(output),
            Node::Quoted(n) => n.gen_css(output),
            Node::Dimension(n) => n.gen_css(output),
            Node::Color(n) => n.gen_css(output),
            Node::UnicodeDescriptor(n) => n.gen_css(output),
            Node::Assignment(n) => n.gen_css(output),
            Node::Attribute(n) => n.gen_css(output),
            Node::Url(n) => n.gen_css(output),
            Node::Variable(n) => Err(LessError::syntax(format!(
                "variable {} was not evaluated before output",
                n.name
            ))),
            Node::Property(n) => Err(LessError::syntax(format!(
                "property reference ${} was not evaluated before output",
                n.name
            ))),
            Node::NamespaceValue(_) => {
                Err(LessError::syntax("namespace lookup was not evaluated before output"))
            }
            Node::JavaScript(n) => n.gen_css(output),
            Node::Paren(n) => n.gen_css(output),
            Node::Negative(n) => n.gen_css(output),
            Node::Operation(n) => n.gen_css(output),
            Node::Condition(_) => Err(LessError::syntax("condition cannot be output as CSS")),
            Node::Expression(n) => n.gen_css(output),
            Node::Value(n) => n.gen_css(output),
            Node::Call(n) => n.gen_css(output),
            Node::Ruleset(n) => n.gen_css(output),
            Node::Declaration(n) => n.gen_css(output),
            Node::AtRule(n) => n.gen_css(output),
            Node::Media(n) => n.gen_css(output),
            Node::Container(n) => n.gen_css(output),
            Node::Import(n) => n.gen_css(output),
            Node::MixinDefinition(_) => Ok(()),
            Node::MixinCall(_) => Ok(()),
            Node::DetachedRuleset(_) => {
                Err(LessError::syntax("detached ruleset cannot be output as CSS"))
            }
            Node::Extend(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_blocks_are_additive() {
        let common = NodeCommon::default();
        assert!(!common.blocks_visibility());

        common.add_visibility_block();
        common.add_visibility_block();
        assert_eq!(common.visibility_blocks.get(), 2);

        common.remove_visibility_block();
        assert!(common.blocks_visibility());
        common.remove_visibility_block();
        assert!(!common.blocks_visibility());
    }

    #[test]
    fn ensure_visibility_overrides() {
        let common = NodeCommon::default();
        assert_eq!(common.is_visible(), None);

        common.ensure_visibility();
        assert_eq!(common.is_visible(), Some(true));

        common.ensure_invisibility();
        assert_eq!(common.is_visible(), Some(false));
    }

    #[test]
    fn file_info_for_entry_computes_directory() {
        let fi = FileInfo::for_entry("styles/main.less");
        assert_eq!(fi.current_directory, "styles/");
        assert_eq!(fi.entry_path, "styles/");
        assert_eq!(fi.root_filename, "styles/main.less");
    }
}
