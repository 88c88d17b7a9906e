//! The Less parser.
//!
//! Tokenization is cssparser's; this module layers the Less grammar on top
//! of its token stream: nested rulesets, variables, mixins, guards, imports,
//! and the expression grammar with its whitespace-sensitive operators.
//! Backtracking uses cssparser's `try_parse` state save/restore, the same
//! way the CSS machinery in the ecosystem does.
//!
//! Unrecognized declaration values fall back to a raw text capture, so CSS
//! the expression grammar does not model still round-trips untouched.

use std::rc::Rc;

use cssparser::{Parser, ParserInput, Token};

use crate::error::LessError;
use crate::less_log;
use crate::node::{FileInfo, Node, NodeCommon};
use crate::session::Session;
use crate::tree::atoms::{
    Anonymous, Assignment, Attribute, Comment, JavaScript, Keyword, NamespaceValue, Property,
    Quoted, UnicodeDescriptor, Url, Variable,
};
use crate::tree::atrule::{AtRule, Container, Media};
use crate::tree::call::Call;
use crate::tree::color::Color;
use crate::tree::declaration::{Declaration, DeclarationName, MergeMode};
use crate::tree::detached::DetachedRuleset;
use crate::tree::dimension::Dimension;
use crate::tree::expression::{Expression, ValueList};
use crate::tree::extend::{Extend, ExtendMode};
use crate::tree::import::{Import, ImportOptions};
use crate::tree::mixin::{MixinArg, MixinCall, MixinDefinition, MixinParam};
use crate::tree::operation::{Condition, Negative, Operation, Paren};
use crate::tree::ruleset::Ruleset;
use crate::tree::selector::{Combinator, Element, ElementValue, Selector};
use crate::tree::unit::Unit;

/// Parses a complete Less source file into its root ruleset.
pub fn parse(
    source: &str,
    file_info: Rc<FileInfo>,
    session: &Session,
) -> Result<Rc<Ruleset>, LessError> {
    let source = strip_line_comments(source);
    let mut input = ParserInput::new(&source);
    let mut parser = Parser::new(&mut input);

    let ctx = ParseContext {
        file_info,
        session: session.clone(),
    };

    let rules = ctx.parse_primary(&mut parser)?;
    ctx.expect_exhausted(&mut parser)?;

    let root = Ruleset::root_of(rules);
    root.first_root.set(true);
    Ok(Rc::new(root))
}

/// Parses a selector group from text; used to re-parse interpolated
/// selectors after evaluation.
pub fn parse_selectors(
    source: &str,
    file_info: Option<Rc<FileInfo>>,
    session: &Session,
) -> Result<Vec<Selector>, LessError> {
    let source = strip_line_comments(source);
    let mut input = ParserInput::new(&source);
    let mut parser = Parser::new(&mut input);

    let ctx = ParseContext {
        file_info: file_info.unwrap_or_default(),
        session: session.clone(),
    };

    let mut selectors = vec![ctx.parse_selector(&mut parser)?];
    while eat(&mut parser, |t| matches!(t, Token::Comma)) {
        selectors.push(ctx.parse_selector(&mut parser)?);
    }

    Ok(selectors)
}

struct ParseContext {
    file_info: Rc<FileInfo>,
    session: Session,
}

/// Blanks out `//` line comments, which the CSS tokenizer does not know.
///
/// The replacement is space-for-byte so source offsets stay valid for
/// diagnostics.  `//` inside strings and inside any parenthesized context
/// (`url(http://...)`) is left alone, as is the body of `/* */` comments.
fn strip_line_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();

    let mut i = 0;
    let mut paren_depth = 0usize;
    let mut string_quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];

        match string_quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    string_quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => string_quote = Some(b),
                b'(' => paren_depth += 1,
                b')' => paren_depth = paren_depth.saturating_sub(1),

                b'/' if paren_depth == 0
                    && bytes.get(i + 1) == Some(&b'/') =>
                {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        out[i] = b' ';
                        i += 1;
                    }
                    continue;
                }

                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i += 2;
                    while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/'))
                    {
                        i += 1;
                    }
                    i += 1;
                }

                _ => (),
            },
        }

        i += 1;
    }

    String::from_utf8(out).expect("replacements are plain spaces")
}

/// Peeks the next token, skipping whitespace and comments.
fn peek<'i>(parser: &mut Parser<'i, '_>) -> Option<Token<'i>> {
    let state = parser.state();
    let token = parser.next().ok().cloned();
    parser.reset(&state);
    token
}

/// Peeks the next token without skipping whitespace.
fn peek_including_whitespace<'i>(parser: &mut Parser<'i, '_>) -> Option<Token<'i>> {
    let state = parser.state();
    let token = parser.next_including_whitespace().ok().cloned();
    parser.reset(&state);
    token
}

/// Consumes the next token if `test` accepts it.
fn eat(parser: &mut Parser<'_, '_>, test: impl Fn(&Token) -> bool) -> bool {
    let state = parser.state();
    match parser.next() {
        Ok(token) if test(token) => true,
        _ => {
            parser.reset(&state);
            false
        }
    }
}

/// Consumes whitespace and comments; true if any whitespace was seen.
fn skip_whitespace(parser: &mut Parser<'_, '_>) -> bool {
    let mut seen = false;
    loop {
        let state = parser.state();
        match parser.next_including_whitespace_and_comments() {
            Ok(Token::WhiteSpace(_)) => seen = true,
            Ok(Token::Comment(_)) => (),
            _ => {
                parser.reset(&state);
                return seen;
            }
        }
    }
}

impl ParseContext {
    fn common(&self, parser: &Parser<'_, '_>) -> NodeCommon {
        NodeCommon::at(parser.position().byte_index(), Some(self.file_info.clone()))
    }

    fn error(&self, parser: &Parser<'_, '_>, message: impl Into<String>) -> LessError {
        let mut e = LessError::parse(message);
        e.index = Some(parser.position().byte_index());
        e.filename = Some(self.file_info.filename.clone());
        e
    }

    fn expect_exhausted(&self, parser: &mut Parser<'_, '_>) -> Result<(), LessError> {
        skip_whitespace(parser);
        match peek(parser) {
            None => Ok(()),
            Some(token) => Err(self.error(parser, format!("unexpected token {token:?}"))),
        }
    }

    /// The statement list of a file or block.
    fn parse_primary(&self, parser: &mut Parser<'_, '_>) -> Result<Vec<Node>, LessError> {
        let mut rules: Vec<Node> = Vec::new();

        loop {
            self.collect_comments(parser, &mut rules);

            let Some(token) = peek(parser) else {
                break;
            };

            match token {
                Token::Semicolon => {
                    let _ = parser.next();
                }
                Token::CDO | Token::CDC => {
                    let _ = parser.next();
                }
                Token::AtKeyword(_) => {
                    rules.extend(self.parse_at_rule(parser)?);
                }
                _ => match self.parse_statement(parser)? {
                    Some(node) => rules.push(node),
                    None => {
                        less_log!(
                            self.session,
                            "unrecognized input in {}",
                            self.file_info.filename
                        );
                        return Err(self.error(parser, "unrecognized input"));
                    }
                },
            }
        }

        Ok(rules)
    }

    fn collect_comments(&self, parser: &mut Parser<'_, '_>, rules: &mut Vec<Node>) {
        loop {
            let state = parser.state();
            match parser.next_including_whitespace_and_comments() {
                Ok(Token::WhiteSpace(_)) => (),
                Ok(Token::Comment(text)) => {
                    let mut comment = Comment::new(format!("/*{text}*/"), false);
                    comment.node = self.common(parser);
                    rules.push(Node::Comment(comment));
                }
                _ => {
                    parser.reset(&state);
                    return;
                }
            }
        }
    }

    /// A ruleset, mixin definition, mixin call, or declaration.
    fn parse_statement(&self, parser: &mut Parser<'_, '_>) -> Result<Option<Node>, LessError> {
        if let Ok(definition) = parser.try_parse(|p| self.parse_mixin_definition(p)) {
            return Ok(Some(definition));
        }

        if let Ok(declaration) = parser.try_parse(|p| self.parse_declaration(p)) {
            return Ok(Some(declaration));
        }

        if let Ok(call) = parser.try_parse(|p| self.parse_mixin_call(p)) {
            return Ok(Some(call));
        }

        if let Ok(ruleset) = parser.try_parse(|p| self.parse_ruleset(p)) {
            return Ok(Some(ruleset));
        }

        if let Ok(extend) = parser.try_parse(|p| self.parse_extend_rule(p)) {
            return Ok(Some(extend));
        }

        Ok(None)
    }

    // ----- rulesets and selectors -------------------------------------

    fn parse_ruleset(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        let common = self.common(parser);

        let mut selectors = vec![Rc::new(self.parse_selector(parser)?)];
        while eat(parser, |t| matches!(t, Token::Comma)) {
            selectors.push(Rc::new(self.parse_selector(parser)?));
        }

        skip_whitespace(parser);
        match parser.next() {
            Ok(Token::CurlyBracketBlock) => (),
            _ => return Err(self.error(parser, "expected block")),
        }

        let rules = parser
            .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
            .map_err(unnest_error)?;

        let mut ruleset = Ruleset::new(selectors, rules);
        ruleset.node = common;
        Ok(Node::Ruleset(Rc::new(ruleset)))
    }

    /// A standalone `&:extend(target);` rule.
    fn parse_extend_rule(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        skip_whitespace(parser);
        if !eat(parser, |t| matches!(t, Token::Delim('&'))) {
            return Err(self.error(parser, "expected &:extend"));
        }
        if !eat(parser, |t| matches!(t, Token::Colon)) {
            return Err(self.error(parser, "expected &:extend"));
        }

        match parser.next() {
            Ok(Token::Function(name)) if name.eq_ignore_ascii_case("extend") => (),
            _ => return Err(self.error(parser, "expected &:extend")),
        }

        let extends = parser
            .parse_nested_block(|p| self.parse_extend_targets(p).map_err(nest_error))
            .map_err(unnest_error)?;

        eat(parser, |t| matches!(t, Token::Semicolon));

        // Several targets become several extend rules.
        let mut nodes: Vec<Node> = extends.into_iter().map(Node::Extend).collect();
        match nodes.len() {
            0 => Err(self.error(parser, "empty extend target")),
            1 => Ok(nodes.remove(0)),
            _ => {
                // Wrap in an `&` block so all of them apply to this block.
                let wrapper = Ruleset::new(vec![Rc::new(Selector::just_parent())], nodes);
                Ok(Node::Ruleset(Rc::new(wrapper)))
            }
        }
    }

    fn parse_extend_targets(
        &self,
        parser: &mut Parser<'_, '_>,
    ) -> Result<Vec<Rc<Extend>>, LessError> {
        let mut extends = Vec::new();

        loop {
            let mut selector = self.parse_selector(parser)?;

            // A trailing `all` keyword selects the anywhere-match mode.
            let mut mode = ExtendMode::Exact;
            if let Some(last) = selector.elements.last() {
                if last.combinator.value == " "
                    && last.value.as_str().is_some_and(|v| v.eq_ignore_ascii_case("all"))
                {
                    mode = ExtendMode::All;
                    selector.elements.pop();
                }
            }

            if selector.elements.is_empty() {
                return Err(self.error(parser, "empty extend target"));
            }

            let extend = Extend::new(Rc::new(selector), mode);
            extends.push(Rc::new(extend));

            if !eat(parser, |t| matches!(t, Token::Comma)) {
                break;
            }
        }

        Ok(extends)
    }

    fn parse_selector(&self, parser: &mut Parser<'_, '_>) -> Result<Selector, LessError> {
        skip_whitespace(parser);

        let common = self.common(parser);
        let mut elements: Vec<Element> = Vec::new();
        let mut extend_list: Vec<Rc<Extend>> = Vec::new();
        let mut condition: Option<Box<Condition>> = None;
        let mut pending: Option<Combinator> = None;

        loop {
            let state = parser.state();
            let token = match parser.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };

            let combinator = |pending: &mut Option<Combinator>, _first: bool| {
                pending.take().unwrap_or_else(Combinator::none)
            };

            match token {
                Token::WhiteSpace(_) => {
                    if !elements.is_empty() && pending.is_none() {
                        pending = Some(Combinator::descendant());
                    }
                }

                Token::Comment(_) => (),

                Token::Delim(c @ ('>' | '+' | '~')) => {
                    // `~"..."` is an escaped value, not a combinator.
                    if c == '~' {
                        if let Some(Token::QuotedString(_)) = peek_including_whitespace(parser) {
                            parser.reset(&state);
                            break;
                        }
                    }
                    pending = Some(Combinator::new(&c.to_string()));
                }

                Token::Ident(name) => {
                    if name.eq_ignore_ascii_case("when") {
                        condition = Some(Box::new(self.parse_guard(parser)?));
                        break;
                    }

                    let c = combinator(&mut pending, elements.is_empty());
                    let mut element = Element::new(c, name.as_ref());
                    element.node = self.common(parser);
                    elements.push(element);
                }

                Token::Delim('.') => {
                    let c = combinator(&mut pending, elements.is_empty());
                    match parser.next_including_whitespace() {
                        Ok(Token::Ident(name)) => {
                            let mut element = Element::new(c, format!(".{name}"));
                            element.node = self.common(parser);
                            elements.push(element);
                        }
                        Ok(Token::Delim('@')) => {
                            elements.push(self.parse_interpolated_element(parser, c, ".")?);
                        }
                        _ => return Err(self.error(parser, "expected class name")),
                    }
                }

                Token::Hash(name) | Token::IDHash(name) => {
                    let c = combinator(&mut pending, elements.is_empty());
                    let mut element = Element::new(c, format!("#{name}"));
                    element.node = self.common(parser);
                    elements.push(element);
                }

                Token::Delim('#') => {
                    let c = combinator(&mut pending, elements.is_empty());
                    match parser.next_including_whitespace() {
                        Ok(Token::Delim('@')) => {
                            elements.push(self.parse_interpolated_element(parser, c, "#")?);
                        }
                        _ => return Err(self.error(parser, "expected id")),
                    }
                }

                Token::Delim('&') => {
                    let c = combinator(&mut pending, elements.is_empty());
                    let mut element = Element::new(c, "&");
                    element.node = self.common(parser);
                    elements.push(element);
                }

                Token::Delim('*') => {
                    let c = combinator(&mut pending, elements.is_empty());
                    elements.push(Element::new(c, "*"));
                }

                Token::Delim('@') => {
                    let c = combinator(&mut pending, elements.is_empty());
                    elements.push(self.parse_interpolated_element(parser, c, "")?);
                }

                Token::Colon => {
                    let c = combinator(&mut pending, elements.is_empty());
                    if let Some(element) =
                        self.parse_pseudo_element(parser, c, &mut extend_list)?
                    {
                        elements.push(element);
                    }
                }

                Token::SquareBracketBlock => {
                    let c = combinator(&mut pending, elements.is_empty());
                    let attribute = parser
                        .parse_nested_block(|p| self.parse_attribute(p).map_err(nest_error))
                        .map_err(unnest_error)?;

                    elements.push(Element {
                        node: self.common(parser),
                        combinator: c,
                        value: ElementValue::Node(Box::new(Node::Attribute(Box::new(attribute)))),
                        is_variable: false,
                    });
                }

                Token::Percentage { unit_value, .. } => {
                    // Keyframe selectors: `0%`, `50%`.
                    let c = combinator(&mut pending, elements.is_empty());
                    elements.push(Element::new(
                        c,
                        format!(
                            "{}%",
                            crate::tree::dimension::format_number(f64::from(unit_value) * 100.0)
                        ),
                    ));
                }

                _ => {
                    parser.reset(&state);
                    break;
                }
            }
        }

        if elements.is_empty() {
            return Err(self.error(parser, "expected selector"));
        }

        let mut selector = Selector::new(elements);
        selector.node = common;
        selector.extend_list = extend_list;
        selector.condition = condition;
        Ok(selector)
    }

    /// `@{name}` inside a selector, with an optional `.`/`#` prefix.
    fn parse_interpolated_element(
        &self,
        parser: &mut Parser<'_, '_>,
        combinator: Combinator,
        prefix: &str,
    ) -> Result<Element, LessError> {
        match parser.next_including_whitespace() {
            Ok(Token::CurlyBracketBlock) => (),
            _ => return Err(self.error(parser, "expected interpolation block")),
        }

        let name = parser
            .parse_nested_block(|p| {
                let name = p
                    .expect_ident()
                    .map(|n| n.to_string())
                    .map_err(|_| nest_error(LessError::parse("expected variable name")))?;
                Ok::<_, cssparser::ParseError<'_, LessError>>(name)
            })
            .map_err(unnest_error)?;

        let value = if prefix.is_empty() {
            Node::Variable(Variable::new(format!("@{name}")))
        } else {
            // The prefix glues to the interpolated value as raw text.
            Node::Expression(Expression {
                node: NodeCommon::default(),
                value: vec![
                    Node::Anonymous(Anonymous::new(prefix)),
                    Node::Variable(Variable::new(format!("@{name}"))),
                ],
                no_spacing: true,
            })
        };

        Ok(Element {
            node: self.common(parser),
            combinator,
            value: ElementValue::Node(Box::new(value)),
            is_variable: true,
        })
    }

    /// After a `:`: a pseudo-class, pseudo-element, `:extend(...)`, or a
    /// functional pseudo with raw arguments.  An extend contributes to the
    /// selector's extend list instead of producing an element.
    fn parse_pseudo_element(
        &self,
        parser: &mut Parser<'_, '_>,
        combinator: Combinator,
        extend_list: &mut Vec<Rc<Extend>>,
    ) -> Result<Option<Element>, LessError> {
        match parser.next_including_whitespace() {
            Ok(Token::Ident(name)) => {
                Ok(Some(Element::new(combinator, format!(":{name}"))))
            }

            Ok(Token::Colon) => match parser.next_including_whitespace() {
                Ok(Token::Ident(name)) => {
                    Ok(Some(Element::new(combinator, format!("::{name}"))))
                }
                _ => Err(self.error(parser, "expected pseudo-element name")),
            },

            Ok(Token::Function(name)) => {
                let name = name.to_string();

                if name.eq_ignore_ascii_case("extend") {
                    let targets = parser
                        .parse_nested_block(|p| self.parse_extend_targets(p).map_err(nest_error))
                        .map_err(unnest_error)?;
                    extend_list.extend(targets);
                    return Ok(None);
                }

                let raw = parser
                    .parse_nested_block(|p| {
                        let start = p.position();
                        while p.next_including_whitespace_and_comments().is_ok() {}
                        Ok::<_, cssparser::ParseError<'_, LessError>>(
                            p.slice_from(start).to_string(),
                        )
                    })
                    .map_err(unnest_error)?;

                Ok(Some(Element::new(combinator, format!(":{name}({raw})"))))
            }

            _ => Err(self.error(parser, "expected pseudo-class")),
        }
    }

    fn parse_attribute(&self, parser: &mut Parser<'_, '_>) -> Result<Attribute, LessError> {
        let key = match parser.next() {
            Ok(Token::Ident(name)) => name.to_string(),
            Ok(Token::Delim('*')) => "*".to_string(),
            _ => return Err(self.error(parser, "expected attribute name")),
        };

        let op = {
            let state = parser.state();
            match parser.next() {
                Ok(Token::Delim('=')) => Some("=".to_string()),
                Ok(Token::IncludeMatch) => Some("~=".to_string()),
                Ok(Token::DashMatch) => Some("|=".to_string()),
                Ok(Token::PrefixMatch) => Some("^=".to_string()),
                Ok(Token::SuffixMatch) => Some("$=".to_string()),
                Ok(Token::SubstringMatch) => Some("*=".to_string()),
                _ => {
                    parser.reset(&state);
                    None
                }
            }
        };

        let value = if op.is_some() {
            match parser.next() {
                Ok(Token::QuotedString(s)) => {
                    Some(Node::Quoted(Quoted::new(s.to_string(), '"', false)))
                }
                Ok(Token::Ident(s)) => Some(Node::Keyword(Keyword::new(s.to_string()))),
                Ok(Token::AtKeyword(name)) => {
                    Some(Node::Variable(Variable::new(format!("@{name}"))))
                }
                _ => return Err(self.error(parser, "expected attribute value")),
            }
        } else {
            None
        };

        let cif = match peek(parser) {
            Some(Token::Ident(flag))
                if flag.eq_ignore_ascii_case("i") || flag.eq_ignore_ascii_case("s") =>
            {
                let _ = parser.next();
                Some(flag.to_string())
            }
            _ => None,
        };

        Ok(Attribute {
            node: NodeCommon::default(),
            key,
            op,
            value,
            cif,
        })
    }

    // ----- guards ------------------------------------------------------

    /// The condition list after `when`.  Commas and `or` both disjoin.
    fn parse_guard(&self, parser: &mut Parser<'_, '_>) -> Result<Condition, LessError> {
        let mut condition = self.parse_condition_and(parser)?;

        loop {
            skip_whitespace(parser);
            let state = parser.state();
            let or = match parser.next() {
                Ok(Token::Comma) => true,
                Ok(Token::Ident(word)) if word.eq_ignore_ascii_case("or") => true,
                _ => {
                    parser.reset(&state);
                    false
                }
            };

            if !or {
                break;
            }

            // The comma may belong to an enclosing list (a selector group,
            // a call's arguments) rather than the guard.
            let Ok(right) = parser.try_parse(|p| self.parse_condition_and(p)) else {
                parser.reset(&state);
                break;
            };

            condition = Condition {
                node: NodeCommon::default(),
                op: "or".to_string(),
                lvalue: Node::Condition(Box::new(condition)),
                rvalue: Node::Condition(Box::new(right)),
                negate: false,
            };
        }

        Ok(condition)
    }

    fn parse_condition_and(&self, parser: &mut Parser<'_, '_>) -> Result<Condition, LessError> {
        let mut condition = self.parse_condition_primary(parser)?;

        loop {
            skip_whitespace(parser);
            let state = parser.state();
            match parser.next() {
                Ok(Token::Ident(word)) if word.eq_ignore_ascii_case("and") => {
                    let right = self.parse_condition_primary(parser)?;
                    condition = Condition {
                        node: NodeCommon::default(),
                        op: "and".to_string(),
                        lvalue: Node::Condition(Box::new(condition)),
                        rvalue: Node::Condition(Box::new(right)),
                        negate: false,
                    };
                }
                _ => {
                    parser.reset(&state);
                    break;
                }
            }
        }

        Ok(condition)
    }

    /// `[not] ( comparison-or-nested )`
    fn parse_condition_primary(&self, parser: &mut Parser<'_, '_>) -> Result<Condition, LessError> {
        skip_whitespace(parser);

        let negate = eat(parser, |t| {
            matches!(t, Token::Ident(w) if w.eq_ignore_ascii_case("not"))
        });

        skip_whitespace(parser);
        match parser.next() {
            Ok(Token::ParenthesisBlock) => (),
            Ok(Token::Function(_name)) => {
                // A call like `istrue(@a)` directly in guard position; the
                // function token already consumed the open paren.
                return Err(self.error(parser, "expected parenthesized condition"));
            }
            _ => return Err(self.error(parser, "expected parenthesized condition")),
        }

        let mut condition = parser
            .parse_nested_block(|p| self.parse_condition_body(p).map_err(nest_error))
            .map_err(unnest_error)?;

        condition.negate = negate;
        Ok(condition)
    }

    fn parse_condition_body(&self, parser: &mut Parser<'_, '_>) -> Result<Condition, LessError> {
        // Nested boolean grouping: `((a) and (b))`.
        if let Ok(nested) = parser.try_parse(|p| -> Result<Condition, LessError> {
            let c = self.parse_guard(p)?;
            self.expect_exhausted(p)?;
            Ok(c)
        }) {
            return Ok(nested);
        }

        let Some(left) = self.parse_addition(parser)? else {
            return Err(self.error(parser, "expected value"));
        };

        skip_whitespace(parser);
        let state = parser.state();
        let op = match parser.next() {
            Ok(Token::Delim('>')) => {
                if eat(parser, |t| matches!(t, Token::Delim('='))) {
                    Some(">=".to_string())
                } else {
                    Some(">".to_string())
                }
            }
            Ok(Token::Delim('<')) => {
                if eat(parser, |t| matches!(t, Token::Delim('='))) {
                    Some("<=".to_string())
                } else {
                    Some("<".to_string())
                }
            }
            Ok(Token::Delim('=')) => {
                if eat(parser, |t| matches!(t, Token::Delim('<'))) {
                    Some("=<".to_string())
                } else {
                    Some("=".to_string())
                }
            }
            _ => {
                parser.reset(&state);
                None
            }
        };

        match op {
            Some(op) => {
                let Some(right) = self.parse_addition(parser)? else {
                    return Err(self.error(parser, "expected value"));
                };
                Ok(Condition {
                    node: NodeCommon::default(),
                    op,
                    lvalue: left,
                    rvalue: right,
                    negate: false,
                })
            }
            None => {
                // A bare value: truthy when it evaluates to `true`.
                Ok(Condition {
                    node: NodeCommon::default(),
                    op: "=".to_string(),
                    lvalue: left,
                    rvalue: Node::Keyword(Keyword::boolean(true)),
                    negate: false,
                })
            }
        }
    }

    // ----- mixins ------------------------------------------------------

    fn parse_mixin_name(&self, parser: &mut Parser<'_, '_>) -> Result<String, LessError> {
        skip_whitespace(parser);
        match parser.next() {
            Ok(Token::Delim('.')) => match parser.next_including_whitespace() {
                Ok(Token::Ident(name)) => Ok(format!(".{name}")),
                _ => Err(self.error(parser, "expected mixin name")),
            },
            Ok(Token::Hash(name)) | Ok(Token::IDHash(name)) => Ok(format!("#{name}")),
            _ => Err(self.error(parser, "expected mixin name")),
        }
    }

    fn parse_mixin_definition(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        let common = self.common(parser);
        let name = self.parse_mixin_name(parser)?;

        match parser.next_including_whitespace() {
            Ok(Token::ParenthesisBlock) => (),
            _ => return Err(self.error(parser, "expected mixin parameter list")),
        }

        let params = parser
            .parse_nested_block(|p| self.parse_mixin_params(p).map_err(nest_error))
            .map_err(unnest_error)?;

        skip_whitespace(parser);
        let condition = if eat(parser, |t| {
            matches!(t, Token::Ident(w) if w.eq_ignore_ascii_case("when"))
        }) {
            Some(Box::new(self.parse_guard(parser)?))
        } else {
            None
        };

        skip_whitespace(parser);
        match parser.next() {
            Ok(Token::CurlyBracketBlock) => (),
            _ => return Err(self.error(parser, "expected mixin body")),
        }

        let rules = parser
            .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
            .map_err(unnest_error)?;

        let mut definition = MixinDefinition::new(name, params, rules, condition);
        definition.node = common;
        Ok(Node::MixinDefinition(Rc::new(definition)))
    }

    fn parse_mixin_params(
        &self,
        parser: &mut Parser<'_, '_>,
    ) -> Result<Vec<MixinParam>, LessError> {
        let mut params = Vec::new();

        loop {
            skip_whitespace(parser);
            if peek(parser).is_none() {
                break;
            }

            let state = parser.state();
            match parser.next() {
                Ok(Token::AtKeyword(name)) => {
                    let name = format!("@{name}");

                    if self.eat_ellipsis(parser) {
                        params.push(MixinParam {
                            name: Some(name),
                            value: None,
                            variadic: true,
                        });
                    } else if eat(parser, |t| matches!(t, Token::Colon)) {
                        let value = self.parse_expression(parser)?;
                        params.push(MixinParam {
                            name: Some(name),
                            value: Some(value),
                            variadic: false,
                        });
                    } else {
                        params.push(MixinParam {
                            name: Some(name),
                            value: None,
                            variadic: false,
                        });
                    }
                }

                Ok(Token::Delim('.')) => {
                    parser.reset(&state);
                    if self.eat_ellipsis(parser) {
                        params.push(MixinParam {
                            name: None,
                            value: None,
                            variadic: true,
                        });
                    } else {
                        return Err(self.error(parser, "expected parameter"));
                    }
                }

                _ => {
                    parser.reset(&state);
                    let value = self.parse_expression(parser)?;
                    params.push(MixinParam {
                        name: None,
                        value: Some(value),
                        variadic: false,
                    });
                }
            }

            skip_whitespace(parser);
            if !eat(parser, |t| matches!(t, Token::Comma | Token::Semicolon)) {
                break;
            }
        }

        Ok(params)
    }

    fn eat_ellipsis(&self, parser: &mut Parser<'_, '_>) -> bool {
        parser
            .try_parse(|p| -> Result<(), ()> {
                for _ in 0..3 {
                    match p.next_including_whitespace() {
                        Ok(Token::Delim('.')) => (),
                        _ => return Err(()),
                    }
                }
                Ok(())
            })
            .is_ok()
    }

    fn parse_mixin_call(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        let common = self.common(parser);
        let mut elements: Vec<Element> = Vec::new();

        loop {
            let name = parser.try_parse(|p| self.parse_mixin_name(p));
            match name {
                Ok(name) => {
                    let combinator = if elements.is_empty() {
                        Combinator::none()
                    } else {
                        Combinator::new(">")
                    };
                    elements.push(Element::new(combinator, name));
                }
                Err(_) => break,
            }

            // optional `>` between namespace segments
            skip_whitespace(parser);
            eat(parser, |t| matches!(t, Token::Delim('>')));
        }

        if elements.is_empty() {
            return Err(self.error(parser, "expected mixin call"));
        }

        let args = {
            let state = parser.state();
            match parser.next_including_whitespace() {
                Ok(Token::ParenthesisBlock) => parser
                    .parse_nested_block(|p| self.parse_mixin_args(p).map_err(nest_error))
                    .map_err(unnest_error)?,
                _ => {
                    parser.reset(&state);
                    Vec::new()
                }
            }
        };

        skip_whitespace(parser);
        let important = parser
            .try_parse(|p| -> Result<(), ()> {
                match p.next() {
                    Ok(Token::Delim('!')) => (),
                    _ => return Err(()),
                }
                match p.next_including_whitespace() {
                    Ok(Token::Ident(word)) if word.eq_ignore_ascii_case("important") => Ok(()),
                    _ => Err(()),
                }
            })
            .is_ok();

        // A call ends at `;` or at the end of the enclosing block; a block
        // here means this was a ruleset (or definition) after all.
        skip_whitespace(parser);
        match peek(parser) {
            Some(Token::Semicolon) => {
                let _ = parser.next();
            }
            None => (),
            Some(_) => return Err(self.error(parser, "expected ; after mixin call")),
        }

        let mut call = MixinCall::new(Selector::new(elements), args, important);
        call.node = common;
        Ok(Node::MixinCall(Box::new(call)))
    }

    fn parse_mixin_args(&self, parser: &mut Parser<'_, '_>) -> Result<Vec<MixinArg>, LessError> {
        let mut args = Vec::new();

        loop {
            skip_whitespace(parser);
            if peek(parser).is_none() {
                break;
            }

            // Named argument: `@name: value`.
            let named = parser.try_parse(|p| -> Result<(String, Node), LessError> {
                let name = match p.next() {
                    Ok(Token::AtKeyword(name)) => format!("@{name}"),
                    _ => return Err(LessError::parse("not a named argument")),
                };
                match p.next() {
                    Ok(Token::Colon) => (),
                    _ => return Err(LessError::parse("not a named argument")),
                }
                let value = self.parse_expression(p)?;
                Ok((name, value))
            });

            match named {
                Ok((name, value)) => args.push(MixinArg {
                    name: Some(name),
                    value,
                    expand: false,
                }),
                Err(_) => {
                    // A block argument is a detached ruleset.
                    if let Some(Token::CurlyBracketBlock) = peek(parser) {
                        let _ = parser.next();
                        let rules = parser
                            .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
                            .map_err(unnest_error)?;
                        let inner = Rc::new(Ruleset::new(Vec::new(), rules));
                        args.push(MixinArg {
                            name: None,
                            value: Node::DetachedRuleset(DetachedRuleset::new(inner)),
                            expand: false,
                        });
                    } else {
                        let value = self.parse_expression(parser)?;
                        let expand = self.eat_ellipsis(parser);
                        args.push(MixinArg {
                            name: None,
                            value,
                            expand,
                        });
                    }
                }
            }

            skip_whitespace(parser);
            if !eat(parser, |t| matches!(t, Token::Comma | Token::Semicolon)) {
                break;
            }
        }

        Ok(args)
    }

    // ----- declarations ------------------------------------------------

    fn parse_declaration(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        skip_whitespace(parser);
        let common = self.common(parser);

        let name = self.parse_declaration_name(parser)?;

        // merge flags sit between name and colon
        let mut merge = MergeMode::None;
        if eat(parser, |t| matches!(t, Token::Delim('+'))) {
            merge = MergeMode::Comma;
            if eat(
                parser,
                |t| matches!(t, Token::Ident(w) if w.as_ref() == "_"),
            ) {
                merge = MergeMode::Space;
            }
        }

        match parser.next() {
            Ok(Token::Colon) => (),
            _ => return Err(self.error(parser, "expected :")),
        }

        let (value, important) = self.parse_declaration_value(parser)?;

        let variable = matches!(&name, DeclarationName::Str(s) if s.starts_with('@'));

        let declaration = Declaration {
            node: common,
            name,
            value,
            important,
            merge,
            inline: false,
            variable,
        };

        Ok(Node::Declaration(Box::new(declaration)))
    }

    fn parse_declaration_name(
        &self,
        parser: &mut Parser<'_, '_>,
    ) -> Result<DeclarationName, LessError> {
        let mut parts: Vec<Node> = Vec::new();
        let mut text = String::new();
        let mut interpolated = false;

        loop {
            let state = parser.state();
            match parser.next_including_whitespace() {
                Ok(Token::Ident(name)) => text.push_str(name.as_ref()),

                Ok(Token::Delim('@')) => match parser.next_including_whitespace() {
                    Ok(Token::CurlyBracketBlock) => {
                        interpolated = true;
                        if !text.is_empty() {
                            parts.push(Node::Keyword(Keyword::new(std::mem::take(&mut text))));
                        }
                        let name = parser
                            .parse_nested_block(|p| {
                                p.expect_ident()
                                    .map(|n| n.to_string())
                                    .map_err(|_| {
                                        nest_error(LessError::parse("expected variable name"))
                                    })
                            })
                            .map_err(unnest_error)?;
                        parts.push(Node::Variable(Variable::new(format!("@{name}"))));
                    }
                    _ => {
                        parser.reset(&state);
                        break;
                    }
                },

                Ok(Token::Delim('-')) => text.push('-'),

                _ => {
                    parser.reset(&state);
                    break;
                }
            }
        }

        if interpolated {
            if !text.is_empty() {
                parts.push(Node::Keyword(Keyword::new(text)));
            }
            if parts.is_empty() {
                return Err(self.error(parser, "expected property name"));
            }
            Ok(DeclarationName::Interpolated(parts))
        } else if text.is_empty() {
            Err(self.error(parser, "expected property name"))
        } else {
            Ok(DeclarationName::Str(text))
        }
    }

    /// A declaration value plus `!important`, with the raw-text fallback.
    fn parse_declaration_value(
        &self,
        parser: &mut Parser<'_, '_>,
    ) -> Result<(Node, Option<String>), LessError> {
        // Structured attempt first.
        let structured = parser.try_parse(|p| -> Result<(Node, Option<String>), LessError> {
            let value = self.parse_value(p)?;
            let important = self.parse_important(p);

            skip_whitespace(p);
            match peek(p) {
                Some(Token::Semicolon) => {
                    let _ = p.next();
                    Ok((value, important))
                }
                None => Ok((value, important)),
                Some(_) => Err(self.error(p, "value did not reach the end of the declaration")),
            }
        });

        if let Ok(result) = structured {
            return Ok(result);
        }

        // Permissive fallback: capture everything up to the terminating
        // semicolon as raw text.  A block means this is not a declaration.
        let start = parser.position();
        let mut end = parser.position();

        loop {
            let token = match parser.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };

            match token {
                Token::Semicolon => break,
                Token::CurlyBracketBlock => {
                    return Err(self.error(parser, "a block is not a declaration value"));
                }
                Token::ParenthesisBlock | Token::SquareBracketBlock | Token::Function(_) => {
                    consume_block(parser)?;
                    end = parser.position();
                }
                _ => end = parser.position(),
            }
        }

        let mut raw = parser.slice_from(start)[..end.byte_index() - start.byte_index()]
            .trim()
            .to_string();

        if raw.is_empty() {
            return Err(self.error(parser, "expected declaration value"));
        }

        let mut important = None;
        if let Some(stripped) = raw.strip_suffix("!important") {
            raw = stripped.trim_end().to_string();
            important = Some("!important".to_string());
        }

        Ok((Node::Anonymous(Anonymous::new(raw)), important))
    }

    fn parse_important(&self, parser: &mut Parser<'_, '_>) -> Option<String> {
        parser
            .try_parse(|p| -> Result<String, ()> {
                match p.next() {
                    Ok(Token::Delim('!')) => (),
                    _ => return Err(()),
                }
                match p.next_including_whitespace() {
                    Ok(Token::Ident(word)) if word.eq_ignore_ascii_case("important") => {
                        Ok("!important".to_string())
                    }
                    _ => Err(()),
                }
            })
            .ok()
    }

    // ----- at-rules ----------------------------------------------------

    fn parse_at_rule(&self, parser: &mut Parser<'_, '_>) -> Result<Vec<Node>, LessError> {
        let common = self.common(parser);

        let name = match parser.next() {
            Ok(Token::AtKeyword(name)) => name.to_string(),
            _ => return Err(self.error(parser, "expected at-rule")),
        };

        match name.to_ascii_lowercase().as_str() {
            "import" => Ok(vec![self.parse_import(parser, common, false)?]),
            "plugin" => Ok(vec![self.parse_import(parser, common, true)?]),
            "media" => Ok(vec![self.parse_media(parser, common, false)?]),
            "container" => Ok(vec![self.parse_media(parser, common, true)?]),
            _ => {
                // `@name: value` and `@name: { ... }` are variable
                // declarations; `@name()` is a detached-ruleset call.
                skip_whitespace(parser);
                let state = parser.state();
                match parser.next_including_whitespace() {
                    Ok(Token::Colon) => {
                        return Ok(vec![self.parse_variable_declaration(parser, common, &name)?]);
                    }
                    Ok(Token::ParenthesisBlock) => {
                        parser
                            .parse_nested_block(|p| {
                                Ok::<_, cssparser::ParseError<'_, LessError>>(
                                    while p.next().is_ok() {},
                                )
                            })
                            .map_err(unnest_error)?;
                        eat(parser, |t| matches!(t, Token::Semicolon));

                        let mut call = Call::new(format!("@{name}"), Vec::new());
                        call.node = common;
                        return Ok(vec![Node::Call(Box::new(call))]);
                    }
                    _ => {
                        parser.reset(&state);
                    }
                }

                self.parse_generic_at_rule(parser, common, &name).map(|n| vec![n])
            }
        }
    }

    fn parse_variable_declaration(
        &self,
        parser: &mut Parser<'_, '_>,
        common: NodeCommon,
        name: &str,
    ) -> Result<Node, LessError> {
        skip_whitespace(parser);

        // A block value is a detached ruleset.
        if let Some(Token::CurlyBracketBlock) = peek(parser) {
            let _ = parser.next();
            let rules = parser
                .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
                .map_err(unnest_error)?;
            eat(parser, |t| matches!(t, Token::Semicolon));

            let inner = Rc::new(Ruleset::new(Vec::new(), rules));
            let detached = DetachedRuleset::new(inner);

            let mut declaration =
                Declaration::new(format!("@{name}"), Node::DetachedRuleset(detached));
            declaration.node = common;
            return Ok(Node::Declaration(Box::new(declaration)));
        }

        let (value, important) = self.parse_declaration_value(parser)?;

        let mut declaration = Declaration::new(format!("@{name}"), value);
        declaration.node = common;
        declaration.important = important;
        Ok(Node::Declaration(Box::new(declaration)))
    }

    fn parse_import(
        &self,
        parser: &mut Parser<'_, '_>,
        common: NodeCommon,
        is_plugin: bool,
    ) -> Result<Node, LessError> {
        let mut options = ImportOptions {
            is_plugin,
            ..ImportOptions::default()
        };

        skip_whitespace(parser);

        // `(reference, optional, ...)` or plugin arguments.
        if let Some(Token::ParenthesisBlock) = peek(parser) {
            let _ = parser.next();
            let raw = parser
                .parse_nested_block(|p| {
                    let start = p.position();
                    while p.next_including_whitespace_and_comments().is_ok() {}
                    Ok::<_, cssparser::ParseError<'_, LessError>>(p.slice_from(start).to_string())
                })
                .map_err(unnest_error)?;

            if is_plugin {
                options.plugin_args = Some(raw.trim().to_string());
            } else {
                for option in raw.split(',').map(str::trim) {
                    match option {
                        "less" => options.less = Some(true),
                        "css" => options.less = Some(false),
                        "multiple" => options.multiple = true,
                        "once" => options.once = true,
                        "inline" => options.inline = true,
                        "reference" => options.reference = true,
                        "optional" => options.optional = true,
                        "" => (),
                        other => {
                            return Err(self.error(
                                parser,
                                format!("unknown @import option '{other}'"),
                            ));
                        }
                    }
                }
            }
        }

        skip_whitespace(parser);
        let path = match parser.next() {
            Ok(Token::QuotedString(s)) => {
                let mut quoted = Quoted::new(s.to_string(), '"', false);
                quoted.node = self.common(parser);
                Node::Quoted(quoted)
            }
            Ok(Token::UnquotedUrl(u)) => {
                let value = self.url_value_from_unquoted(u.as_ref());
                let mut url = Url::new(value);
                url.node = self.common(parser);
                Node::Url(Box::new(url))
            }
            Ok(Token::Function(f)) if f.eq_ignore_ascii_case("url") => {
                let inner = parser
                    .parse_nested_block(|p| self.parse_url_contents(p).map_err(nest_error))
                    .map_err(unnest_error)?;
                Node::Url(Box::new(Url::new(inner)))
            }
            _ => return Err(self.error(parser, "expected import path")),
        };

        // Optional media features up to the semicolon.
        skip_whitespace(parser);
        let features = match peek(parser) {
            Some(Token::Semicolon) | None => None,
            Some(_) => {
                let features = self.parse_media_features(parser)?;
                if features.is_empty() {
                    None
                } else {
                    Some(Node::Value(ValueList::new(features)))
                }
            }
        };

        eat(parser, |t| matches!(t, Token::Semicolon));

        let mut import = Import::new(path, features, options);
        import.node = common;
        Ok(Node::Import(Rc::new(import)))
    }

    fn parse_media(
        &self,
        parser: &mut Parser<'_, '_>,
        common: NodeCommon,
        container: bool,
    ) -> Result<Node, LessError> {
        let features = self.parse_media_features(parser)?;

        skip_whitespace(parser);
        match parser.next() {
            Ok(Token::CurlyBracketBlock) => (),
            _ => return Err(self.error(parser, "expected block")),
        }

        let rules = parser
            .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
            .map_err(unnest_error)?;

        if container {
            let mut node = Container::new(rules, features);
            node.node = common;
            Ok(Node::Container(Rc::new(node)))
        } else {
            let mut node = Media::new(rules, features);
            node.node = common;
            Ok(Node::Media(Rc::new(node)))
        }
    }

    /// Media features: comma-separated expressions of keywords, variables
    /// and `(name: value)` pairs.
    fn parse_media_features(&self, parser: &mut Parser<'_, '_>) -> Result<Vec<Node>, LessError> {
        let mut features = Vec::new();
        let mut current: Vec<Node> = Vec::new();

        loop {
            skip_whitespace(parser);
            let state = parser.state();

            match parser.next() {
                Ok(Token::Ident(word)) => {
                    current.push(Node::Keyword(Keyword::new(word.to_string())));
                }

                Ok(Token::AtKeyword(name)) => {
                    current.push(Node::Variable(Variable::new(format!("@{name}"))));
                }

                Ok(Token::ParenthesisBlock) => {
                    let inner = parser
                        .parse_nested_block(|p| self.parse_media_feature(p).map_err(nest_error))
                        .map_err(unnest_error)?;
                    current.push(Node::Paren(Box::new(Paren::new(inner))));
                }

                Ok(Token::Comma) => {
                    if !current.is_empty() {
                        features.push(Node::Expression(Expression::new(std::mem::take(
                            &mut current,
                        ))));
                    }
                }

                _ => {
                    parser.reset(&state);
                    break;
                }
            }
        }

        if !current.is_empty() {
            features.push(Node::Expression(Expression::new(current)));
        }

        Ok(features)
    }

    /// The inside of one `( ... )` media feature.
    fn parse_media_feature(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        let declaration = parser.try_parse(|p| -> Result<Node, LessError> {
            let name = match p.next() {
                Ok(Token::Ident(name)) => name.to_string(),
                _ => return Err(LessError::parse("not a feature declaration")),
            };
            match p.next() {
                Ok(Token::Colon) => (),
                _ => return Err(LessError::parse("not a feature declaration")),
            }
            let value = self.parse_expression(p)?;
            self.expect_exhausted(p)?;

            let mut declaration = Declaration::new(name, value);
            declaration.inline = true;
            Ok(Node::Declaration(Box::new(declaration)))
        });

        if let Ok(declaration) = declaration {
            return Ok(declaration);
        }

        self.parse_expression(parser)
    }

    fn parse_generic_at_rule(
        &self,
        parser: &mut Parser<'_, '_>,
        common: NodeCommon,
        name: &str,
    ) -> Result<Node, LessError> {
        // Prelude: raw text up to `{` or `;`.
        skip_whitespace(parser);
        let start = parser.position();
        let mut end = parser.position();

        let mut block = false;
        loop {
            let state = parser.state();
            let token = match parser.next() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };

            match token {
                Token::CurlyBracketBlock => {
                    parser.reset(&state);
                    block = true;
                    break;
                }
                Token::Semicolon => break,
                Token::ParenthesisBlock | Token::SquareBracketBlock | Token::Function(_) => {
                    consume_block(parser)?;
                    end = parser.position();
                }
                _ => end = parser.position(),
            }
        }

        let prelude = parser.slice_from(start)[..end.byte_index() - start.byte_index()]
            .trim()
            .to_string();
        let value = if prelude.is_empty() {
            None
        } else {
            Some(Node::Anonymous(Anonymous::new(prelude)))
        };

        let rules = if block {
            let _ = parser.next();
            Some(
                parser
                    .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
                    .map_err(unnest_error)?,
            )
        } else {
            None
        };

        let lower = name.to_ascii_lowercase();
        let is_rooted = !matches!(lower.as_str(), "supports" | "document");

        let mut at_rule = AtRule::new(format!("@{name}"), value, rules);
        at_rule.node = common;
        at_rule.is_rooted = is_rooted;
        Ok(Node::AtRule(Rc::new(at_rule)))
    }

    // ----- values and expressions ---------------------------------------

    /// A comma-separated value list.
    fn parse_value(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        let mut expressions = vec![self.parse_expression(parser)?];

        loop {
            skip_whitespace(parser);
            if !eat(parser, |t| matches!(t, Token::Comma)) {
                break;
            }
            expressions.push(self.parse_expression(parser)?);
        }

        if expressions.len() == 1 {
            Ok(expressions.remove(0))
        } else {
            Ok(Node::Value(ValueList::new(expressions)))
        }
    }

    /// A space-separated run of additions/entities.
    fn parse_expression(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        let mut entities: Vec<Node> = Vec::new();

        loop {
            skip_whitespace(parser);

            match peek(parser) {
                None
                | Some(Token::Semicolon)
                | Some(Token::Comma)
                | Some(Token::CurlyBracketBlock)
                | Some(Token::Delim('!')) => break,
                _ => (),
            }

            let Some(entity) = self.parse_addition(parser)? else {
                break;
            };
            entities.push(entity);
        }

        match entities.len() {
            0 => Err(self.error(parser, "expected value")),
            1 => Ok(entities.remove(0)),
            _ => Ok(Node::Expression(Expression::new(entities))),
        }
    }

    /// Additive chain; subtraction needs symmetric spacing so that space
    /// separated negative values stay list entries.
    fn parse_addition(&self, parser: &mut Parser<'_, '_>) -> Result<Option<Node>, LessError> {
        let Some(mut left) = self.parse_multiplication(parser)? else {
            return Ok(None);
        };

        loop {
            let space_before = skip_whitespace(parser);
            let state = parser.state();

            let token = match parser.next_including_whitespace() {
                Ok(t) => t.clone(),
                Err(_) => {
                    parser.reset(&state);
                    break;
                }
            };

            match token {
                Token::Delim(op @ ('+' | '-')) => {
                    let space_after =
                        matches!(peek_including_whitespace(parser), Some(Token::WhiteSpace(_)));

                    if space_before && !space_after {
                        // `a -b` is two list entries, not subtraction.
                        parser.reset(&state);
                        break;
                    }

                    skip_whitespace(parser);
                    let Some(right) = self.parse_multiplication(parser)? else {
                        parser.reset(&state);
                        break;
                    };

                    left =
                        Node::Operation(Box::new(Operation::new(op, left, right, space_before)));
                }

                // The tokenizer folds a sign into the number: `1-2` arrives
                // as `1` then `-2`.
                Token::Number { value, .. } if !space_before && value < 0.0 => {
                    let right = Node::Dimension(Dimension::number(f64::from(value).abs())?);
                    left = Node::Operation(Box::new(Operation::new('-', left, right, false)));
                }

                Token::Dimension { value, ref unit, .. } if !space_before && value < 0.0 => {
                    let right = Node::Dimension(Dimension::new(
                        f64::from(value).abs(),
                        Unit::single(unit.as_ref()),
                    )?);
                    left = Node::Operation(Box::new(Operation::new('-', left, right, false)));
                }

                _ => {
                    parser.reset(&state);
                    break;
                }
            }
        }

        Ok(Some(left))
    }

    fn parse_multiplication(&self, parser: &mut Parser<'_, '_>) -> Result<Option<Node>, LessError> {
        let Some(mut left) = self.parse_operand(parser)? else {
            return Ok(None);
        };

        loop {
            let space_before = skip_whitespace(parser);
            let state = parser.state();

            let op = match parser.next_including_whitespace() {
                Ok(Token::Delim(c @ ('*' | '/'))) => Some(*c),
                _ => None,
            };

            let Some(op) = op else {
                parser.reset(&state);
                break;
            };

            skip_whitespace(parser);
            let Some(right) = self.parse_operand(parser)? else {
                parser.reset(&state);
                break;
            };

            left = Node::Operation(Box::new(Operation::new(op, left, right, space_before)));
        }

        Ok(Some(left))
    }

    /// One operand of an arithmetic chain, or a plain entity when the token
    /// cannot take part in math.
    fn parse_operand(&self, parser: &mut Parser<'_, '_>) -> Result<Option<Node>, LessError> {
        let state = parser.state();

        match parser.next() {
            Ok(Token::Delim('-')) => {
                // unary minus before parens or a variable
                let Some(inner) = self.parse_operand(parser)? else {
                    parser.reset(&state);
                    return Ok(None);
                };
                Ok(Some(Node::Negative(Box::new(Negative {
                    node: NodeCommon::default(),
                    value: inner,
                }))))
            }

            Ok(Token::ParenthesisBlock) => {
                let inner = parser
                    .parse_nested_block(|p| {
                        let v = self.parse_expression(p).map_err(nest_error)?;
                        Ok::<_, cssparser::ParseError<'_, LessError>>(v)
                    })
                    .map_err(unnest_error)?;
                Ok(Some(Node::Paren(Box::new(Paren::new(inner)))))
            }

            _ => {
                parser.reset(&state);
                self.parse_entity(parser)
            }
        }
    }

    /// A single value: number, color, string, call, variable, url, ...
    fn parse_entity(&self, parser: &mut Parser<'_, '_>) -> Result<Option<Node>, LessError> {
        let state = parser.state();
        let common = self.common(parser);

        let token = match parser.next() {
            Ok(t) => t.clone(),
            Err(_) => return Ok(None),
        };

        let node = match token {
            Token::Number { value, .. } => {
                let mut d = Dimension::number(f64::from(value))?;
                d.node = common;
                Node::Dimension(d)
            }

            Token::Percentage { unit_value, .. } => {
                let mut d = Dimension::new(f64::from(unit_value) * 100.0, Unit::single("%"))?;
                d.node = common;
                Node::Dimension(d)
            }

            Token::Dimension { value, unit, .. } => {
                let mut d = Dimension::new(f64::from(value), Unit::single(unit.as_ref()))?;
                d.node = common;
                Node::Dimension(d)
            }

            Token::Ident(name) => {
                let name = name.to_string();

                // `U+0-7F` unicode range descriptors
                if (name == "U" || name == "u")
                    && matches!(peek_including_whitespace(parser), Some(Token::Delim('+')))
                {
                    let start = parser.position();
                    loop {
                        let s = parser.state();
                        match parser.next_including_whitespace() {
                            Ok(Token::WhiteSpace(_)) | Ok(Token::Semicolon) | Err(_) => {
                                parser.reset(&s);
                                break;
                            }
                            Ok(Token::Comma) => {
                                parser.reset(&s);
                                break;
                            }
                            Ok(_) => (),
                        }
                    }
                    let raw = parser.slice_from(start);
                    Node::UnicodeDescriptor(UnicodeDescriptor {
                        node: common,
                        value: format!("{name}{raw}"),
                    })
                } else {
                    match Color::from_keyword(&name) {
                        Some(mut color) => {
                            color.node = common;
                            Node::Color(color)
                        }
                        None => {
                            let mut keyword = Keyword::new(name);
                            keyword.node = common;
                            Node::Keyword(keyword)
                        }
                    }
                }
            }

            Token::Hash(digits) | Token::IDHash(digits) => match Color::from_hex(&digits) {
                Some(mut color) => {
                    color.node = common;
                    Node::Color(color)
                }
                None => Node::Anonymous(Anonymous::new(format!("#{digits}"))),
            },

            Token::QuotedString(s) => {
                let mut quoted = Quoted::new(s.to_string(), '"', false);
                quoted.node = common;
                Node::Quoted(quoted)
            }

            Token::Delim('~') => match parser.next_including_whitespace() {
                Ok(Token::QuotedString(s)) => {
                    let mut quoted = Quoted::new(s.to_string(), '"', true);
                    quoted.node = common;
                    Node::Quoted(quoted)
                }
                _ => {
                    parser.reset(&state);
                    return Ok(None);
                }
            },

            Token::Delim('`') => {
                let start = parser.position();
                let mut end = parser.position();
                loop {
                    match parser.next_including_whitespace_and_comments() {
                        Ok(Token::Delim('`')) => break,
                        Ok(_) => end = parser.position(),
                        Err(_) => break,
                    }
                }
                let expression = parser.slice_from(start)
                    [..end.byte_index() - start.byte_index()]
                    .to_string();

                Node::JavaScript(JavaScript {
                    node: common,
                    expression,
                    escaped: false,
                })
            }

            Token::UnquotedUrl(u) => {
                let mut url = Url::new(self.url_value_from_unquoted(u.as_ref()));
                url.node = common;
                Node::Url(Box::new(url))
            }

            Token::AtKeyword(name) => {
                let variable = Variable {
                    node: common.clone(),
                    name: format!("@{name}"),
                };
                self.parse_lookups_after(parser, Node::Variable(variable), common)?
            }

            Token::Delim('@') => match parser.next_including_whitespace() {
                Ok(Token::AtKeyword(name)) => Node::Variable(Variable {
                    node: common,
                    name: format!("@@{name}"),
                }),
                Ok(Token::CurlyBracketBlock) => {
                    // `@{name}` in value position behaves like a variable.
                    let name = parser
                        .parse_nested_block(|p| {
                            p.expect_ident()
                                .map(|n| n.to_string())
                                .map_err(|_| {
                                    nest_error(LessError::parse("expected variable name"))
                                })
                        })
                        .map_err(unnest_error)?;
                    Node::Variable(Variable {
                        node: common,
                        name: format!("@{name}"),
                    })
                }
                _ => {
                    parser.reset(&state);
                    return Ok(None);
                }
            },

            Token::Delim('$') => match parser.next_including_whitespace() {
                Ok(Token::Ident(name)) => Node::Property(Property {
                    node: common,
                    name: name.to_string(),
                }),
                _ => {
                    parser.reset(&state);
                    return Ok(None);
                }
            },

            Token::Delim('%') => match peek_including_whitespace(parser) {
                Some(Token::ParenthesisBlock) => {
                    let _ = parser.next();
                    let args = parser
                        .parse_nested_block(|p| self.parse_call_args(p, "%").map_err(nest_error))
                        .map_err(unnest_error)?;
                    let mut call = Call::new("%", args);
                    call.node = common;
                    Node::Call(Box::new(call))
                }
                _ => {
                    parser.reset(&state);
                    return Ok(None);
                }
            },

            Token::Function(name) => {
                let name = name.to_string();

                if name.eq_ignore_ascii_case("url") {
                    let inner = parser
                        .parse_nested_block(|p| self.parse_url_contents(p).map_err(nest_error))
                        .map_err(unnest_error)?;
                    let mut url = Url::new(inner);
                    url.node = common;
                    Node::Url(Box::new(url))
                } else {
                    let args = parser
                        .parse_nested_block(|p| {
                            self.parse_call_args(p, &name).map_err(nest_error)
                        })
                        .map_err(unnest_error)?;
                    let mut call = Call::new(name, args);
                    call.node = common;
                    Node::Call(Box::new(call))
                }
            }

            _ => {
                parser.reset(&state);
                return Ok(None);
            }
        };

        Ok(Some(node))
    }

    /// `[@lookup]` chains after a variable, for namespace/detached-ruleset
    /// accessors.
    fn parse_lookups_after(
        &self,
        parser: &mut Parser<'_, '_>,
        value: Node,
        common: NodeCommon,
    ) -> Result<Node, LessError> {
        let mut lookups: Vec<String> = Vec::new();

        loop {
            let state = parser.state();
            match parser.next_including_whitespace() {
                Ok(Token::SquareBracketBlock) => {
                    let lookup = parser
                        .parse_nested_block(|p| {
                            let start = p.position();
                            while p.next_including_whitespace_and_comments().is_ok() {}
                            Ok::<_, cssparser::ParseError<'_, LessError>>(
                                p.slice_from(start).trim().to_string(),
                            )
                        })
                        .map_err(unnest_error)?;
                    lookups.push(lookup);
                }
                _ => {
                    parser.reset(&state);
                    break;
                }
            }
        }

        if lookups.is_empty() {
            return Ok(value);
        }

        Ok(Node::NamespaceValue(Box::new(NamespaceValue {
            node: common,
            value,
            lookups,
        })))
    }

    /// Function call arguments: comma-separated expressions, `key=value`
    /// assignments, and raw conditions for the logic functions.
    fn parse_call_args(
        &self,
        parser: &mut Parser<'_, '_>,
        function: &str,
    ) -> Result<Vec<Node>, LessError> {
        let condition_args = matches!(
            function.to_ascii_lowercase().as_str(),
            "if" | "boolean" | "isdefined"
        );

        let mut args = Vec::new();

        loop {
            skip_whitespace(parser);
            if peek(parser).is_none() {
                break;
            }

            if condition_args {
                let condition = parser.try_parse(|p| -> Result<Node, LessError> {
                    // Parenthesized guard syntax first, then a bare
                    // comparison like `1 = 1`.
                    let c = p
                        .try_parse(|inner| self.parse_condition_and(inner))
                        .or_else(|_: LessError| self.parse_condition_body(p))?;

                    skip_whitespace(p);
                    match peek(p) {
                        Some(Token::Comma) | None => Ok(Node::Condition(Box::new(c))),
                        Some(_) => Err(LessError::parse("not a condition argument")),
                    }
                });

                if let Ok(condition) = condition {
                    args.push(condition);
                    skip_whitespace(parser);
                    if !eat(parser, |t| matches!(t, Token::Comma | Token::Semicolon)) {
                        break;
                    }
                    continue;
                }
            }

            // Legacy filter syntax: `opacity=50`.
            let assignment = parser.try_parse(|p| -> Result<Node, LessError> {
                let key = match p.next() {
                    Ok(Token::Ident(k)) => k.to_string(),
                    _ => return Err(LessError::parse("not an assignment")),
                };
                match p.next() {
                    Ok(Token::Delim('=')) => (),
                    _ => return Err(LessError::parse("not an assignment")),
                }
                let value = self.parse_expression(p)?;
                Ok(Node::Assignment(Box::new(Assignment {
                    node: NodeCommon::default(),
                    key,
                    value,
                })))
            });

            match assignment {
                Ok(node) => args.push(node),
                Err(_) => {
                    // A detached ruleset argument, for `each`.
                    if let Some(Token::CurlyBracketBlock) = peek(parser) {
                        let _ = parser.next();
                        let rules = parser
                            .parse_nested_block(|p| self.parse_primary(p).map_err(nest_error))
                            .map_err(unnest_error)?;
                        let inner = Rc::new(Ruleset::new(Vec::new(), rules));
                        args.push(Node::DetachedRuleset(DetachedRuleset::new(inner)));
                    } else {
                        args.push(self.parse_value(parser)?);
                    }
                }
            }

            skip_whitespace(parser);
            if !eat(parser, |t| matches!(t, Token::Comma | Token::Semicolon)) {
                break;
            }
        }

        Ok(args)
    }

    /// The value of an unquoted `url(...)` token.  The tokenizer hands the
    /// contents over as raw text, so variables and interpolations hiding in
    /// there are recognized here.
    fn url_value_from_unquoted(&self, content: &str) -> Node {
        if let Some(name) = content.strip_prefix('@') {
            if !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Node::Variable(Variable::new(format!("@{name}")));
            }
        }

        if content.contains("@{") {
            // Escaped-string semantics: interpolate, print without quotes.
            return Node::Quoted(Quoted::new(content, '"', true));
        }

        Node::Anonymous(Anonymous::new(content))
    }

    /// The inside of `url(...)` when it did not tokenize as an unquoted url.
    fn parse_url_contents(&self, parser: &mut Parser<'_, '_>) -> Result<Node, LessError> {
        skip_whitespace(parser);

        let state = parser.state();
        match parser.next() {
            Ok(Token::QuotedString(s)) => {
                Ok(Node::Quoted(Quoted::new(s.to_string(), '"', false)))
            }
            Ok(Token::AtKeyword(name)) => {
                Ok(Node::Variable(Variable::new(format!("@{name}"))))
            }
            _ => {
                parser.reset(&state);
                let start = parser.position();
                while parser.next_including_whitespace_and_comments().is_ok() {}
                Ok(Node::Anonymous(Anonymous::new(
                    parser.slice_from(start).trim().to_string(),
                )))
            }
        }
    }
}

/// Consumes the contents of a block token that was just returned, so the
/// parser's position moves past it.
fn consume_block(parser: &mut Parser<'_, '_>) -> Result<(), LessError> {
    parser
        .parse_nested_block(|p| {
            while p.next_including_whitespace_and_comments().is_ok() {}
            Ok::<_, cssparser::ParseError<'_, LessError>>(())
        })
        .map_err(unnest_error)
}

/// Wraps our error type into cssparser's nested-block error shape.
fn nest_error(e: LessError) -> cssparser::ParseError<'static, LessError> {
    cssparser::ParseError {
        kind: cssparser::ParseErrorKind::Custom(e),
        location: cssparser::SourceLocation { line: 0, column: 0 },
    }
}

fn unnest_error(e: cssparser::ParseError<'_, LessError>) -> LessError {
    match e.kind {
        cssparser::ParseErrorKind::Custom(e) => e,
        cssparser::ParseErrorKind::Basic(b) => LessError::parse(format!("{b:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::GenCss;

    fn parse_root(source: &str) -> Rc<Ruleset> {
        parse(
            source,
            Rc::new(FileInfo::for_entry("test.less")),
            &Session::new_for_test_suite(),
        )
        .unwrap()
    }

    #[test]
    fn parses_simple_ruleset() {
        let root = parse_root(".a { color: red; }");
        let rules = root.rules.borrow();
        assert_eq!(rules.len(), 1);

        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        assert_eq!(rs.selectors.len(), 1);
        assert_eq!(rs.rules.borrow().len(), 1);
    }

    #[test]
    fn parses_variable_declaration() {
        let root = parse_root("@color: red;");
        let rules = root.rules.borrow();

        let Node::Declaration(d) = &rules[0] else { panic!() };
        assert!(d.variable);
        assert_eq!(d.name_str(), "@color");
        assert!(matches!(d.value, Node::Color(_)));
    }

    #[test]
    fn parses_nested_rulesets() {
        let root = parse_root(".p { .c { color: red; } }");
        let rules = root.rules.borrow();
        let Node::Ruleset(outer) = &rules[0] else { panic!() };
        let outer_rules = outer.rules.borrow();
        assert!(matches!(outer_rules[0], Node::Ruleset(_)));
    }

    #[test]
    fn parses_mixin_definition_and_call() {
        let root = parse_root(".m(@x: 2px) { width: @x; } .r { .m(); .m(5px); }");
        let rules = root.rules.borrow();

        let Node::MixinDefinition(def) = &rules[0] else { panic!() };
        assert_eq!(def.name, ".m");
        assert_eq!(def.arity, 1);
        assert_eq!(def.required, 0);

        let Node::Ruleset(r) = &rules[1] else { panic!() };
        let inner = r.rules.borrow();
        assert!(matches!(inner[0], Node::MixinCall(_)));
        assert!(matches!(inner[1], Node::MixinCall(_)));
    }

    #[test]
    fn parses_operations() {
        let root = parse_root("@w: 2px + 3px;");
        let rules = root.rules.borrow();
        let Node::Declaration(d) = &rules[0] else { panic!() };
        let Node::Operation(op) = &d.value else {
            panic!("expected operation, got {}", d.value.kind_name())
        };
        assert_eq!(op.op, '+');
    }

    #[test]
    fn negative_number_in_list_is_not_subtraction() {
        let root = parse_root("@pos: 1px -2px;");
        let rules = root.rules.borrow();
        let Node::Declaration(d) = &rules[0] else { panic!() };
        assert!(matches!(&d.value, Node::Expression(e) if e.value.len() == 2));
    }

    #[test]
    fn unspaced_subtraction_evaluates() {
        let root = parse_root("@w: 5-2;");
        let rules = root.rules.borrow();
        let Node::Declaration(d) = &rules[0] else { panic!() };
        assert!(matches!(&d.value, Node::Operation(op) if op.op == '-'));
    }

    #[test]
    fn parses_guarded_mixin() {
        let root = parse_root(".m(@x) when (@x > 1) { width: @x; }");
        let rules = root.rules.borrow();
        let Node::MixinDefinition(def) = &rules[0] else { panic!() };
        assert!(def.condition.is_some());
    }

    #[test]
    fn parses_extend_in_selector() {
        let root = parse_root(".b:extend(.a) { font: 1px; }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        assert_eq!(rs.selectors[0].extend_list.len(), 1);
    }

    #[test]
    fn parses_extend_all_option() {
        let root = parse_root(".b:extend(.a all) {}");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        let extend = &rs.selectors[0].extend_list[0];
        assert_eq!(extend.option, ExtendMode::All);
    }

    #[test]
    fn parses_amp_extend_rule() {
        let root = parse_root(".b { &:extend(.a); }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        assert!(matches!(rs.rules.borrow()[0], Node::Extend(_)));
    }

    #[test]
    fn parses_import_with_options() {
        let root = parse_root("@import (reference, optional) \"theme.less\";");
        let rules = root.rules.borrow();
        let Node::Import(import) = &rules[0] else { panic!() };
        assert!(import.options.reference);
        assert!(import.options.optional);
        assert!(!import.css.get());
    }

    #[test]
    fn parses_media_with_features() {
        let root = parse_root("@media screen and (min-width: 768px) { .a { color: red; } }");
        let rules = root.rules.borrow();
        assert!(matches!(rules[0], Node::Media(_)));
    }

    #[test]
    fn parses_detached_ruleset() {
        let root = parse_root("@dr: { color: red; }; .a { @dr(); }");
        let rules = root.rules.borrow();

        let Node::Declaration(d) = &rules[0] else { panic!() };
        assert!(matches!(d.value, Node::DetachedRuleset(_)));

        let Node::Ruleset(r) = &rules[1] else { panic!() };
        let inner = r.rules.borrow();
        assert!(matches!(&inner[0], Node::Call(c) if c.name == "@dr"));
    }

    #[test]
    fn raw_fallback_keeps_unknown_values() {
        let root = parse_root(".a { grid-template-areas: \"a b\" \"c d\"; }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        let inner = rs.rules.borrow();
        let Node::Declaration(d) = &inner[0] else { panic!() };
        // two strings in sequence parse as an expression of quoted values
        assert!(d.value.to_css_string(false).unwrap().contains("a b"));
    }

    #[test]
    fn parses_important() {
        let root = parse_root(".a { color: red !important; }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        let inner = rs.rules.borrow();
        let Node::Declaration(d) = &inner[0] else { panic!() };
        assert_eq!(d.important.as_deref(), Some("!important"));
    }

    #[test]
    fn parses_merge_flags() {
        let root = parse_root(".a { transition+: color; box-shadow+_: inset; }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        let inner = rs.rules.borrow();

        let Node::Declaration(comma) = &inner[0] else { panic!() };
        assert_eq!(comma.merge, MergeMode::Comma);

        let Node::Declaration(space) = &inner[1] else { panic!() };
        assert_eq!(space.merge, MergeMode::Space);
    }

    #[test]
    fn parses_interpolated_selector() {
        let root = parse_root(".@{name} { color: red; }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        assert!(rs.selectors[0].has_variable_elements());
    }

    #[test]
    fn parses_guarded_selector() {
        let root = parse_root(".a when (@mode = dark) { color: black; }");
        let rules = root.rules.borrow();
        let Node::Ruleset(rs) = &rules[0] else { panic!() };
        assert!(rs.selectors[0].condition.is_some());
    }

    #[test]
    fn line_comments_are_blanked_offset_preserving() {
        let stripped = strip_line_comments("a // note\nb");
        assert_eq!(stripped.len(), "a // note\nb".len());
        assert_eq!(stripped, "a        \nb");

        // not inside urls or strings
        assert_eq!(
            strip_line_comments("url(http://x) \"a//b\""),
            "url(http://x) \"a//b\""
        );

        // not inside block comments
        assert_eq!(strip_line_comments("/* a//b */"), "/* a//b */");
    }

    #[test]
    fn selector_text_round_trips() {
        let selectors = parse_selectors(
            ".a > .b:hover",
            None,
            &Session::new_for_test_suite(),
        )
        .unwrap();

        let mut out = crate::output::Output::new(false, false);
        out.first_selector = true;
        selectors[0].gen_css(&mut out).unwrap();
        assert_eq!(out.as_str(), ".a > .b:hover");
    }
}
