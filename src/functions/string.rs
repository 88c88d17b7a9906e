//! String functions.

use regex::Regex;

use crate::error::LessError;
use crate::node::Node;
use crate::output::GenCss;
use crate::tree::atoms::Quoted;

use super::{expect_string, FunctionContext, FunctionRegistry};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add("e", escape_value);
    registry.add("escape", url_escape);
    registry.add("replace", replace);
    registry.add("%", format);
}

/// `e("...")`: string contents with the quotes stripped.
fn escape_value(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let value = expect_string(args, 0, "e")?;
    Ok(Some(Node::Quoted(Quoted::new(value, '"', true))))
}

/// `escape("...")`: URI-encode, including the characters `encodeURI` leaves
/// alone but CSS cannot carry bare.
fn url_escape(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let value = expect_string(args, 0, "escape")?;

    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'&' | b'+' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&std::format!("%{byte:02X}")),
        }
    }

    Ok(Some(Node::Quoted(Quoted::new(out, '"', true))))
}

fn replace(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let Some(Node::Quoted(source)) = args.first() else {
        return Err(LessError::argument("first argument to replace must be a string"));
    };

    let pattern = expect_string(args, 1, "replace")?;
    let replacement = expect_string(args, 2, "replace")?;
    let flags = args
        .get(3)
        .map(|f| expect_string(std::slice::from_ref(f), 0, "replace"))
        .transpose()?
        .unwrap_or_default();

    let global = flags.contains('g');
    let mut pattern = pattern;
    if flags.contains('i') {
        pattern = std::format!("(?i){pattern}");
    }

    let re = Regex::new(&pattern)
        .map_err(|e| LessError::argument(std::format!("invalid pattern in replace: {e}")))?;

    let replaced = if global {
        re.replace_all(&source.value, replacement.as_str())
    } else {
        re.replace(&source.value, replacement.as_str())
    };

    Ok(Some(Node::Quoted(Quoted::new(
        replaced.into_owned(),
        source.quote,
        source.escaped,
    ))))
}

/// `%("format", args...)`: `%s`/`%d`/`%a` substitution.  Uppercase
/// placeholders URI-encode their substitution.
fn format(_: &mut FunctionContext<'_, '_>, args: &[Node]) -> Result<Option<Node>, LessError> {
    let Some(Node::Quoted(template)) = args.first() else {
        return Err(LessError::argument("first argument to % must be a string"));
    };

    let mut result = String::new();
    let mut arg_index = 1;
    let mut chars = template.value.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        match chars.next() {
            Some('%') => result.push('%'),
            Some(placeholder @ ('s' | 'S' | 'd' | 'D' | 'a' | 'A')) => {
                let Some(arg) = args.get(arg_index) else {
                    return Err(LessError::argument("not enough arguments for format string"));
                };
                arg_index += 1;

                let text = match (placeholder.to_ascii_lowercase(), arg) {
                    ('s', Node::Quoted(q)) => q.value.clone(),
                    (_, other) => other.to_css_string(false)?,
                };

                if placeholder.is_ascii_uppercase() {
                    let encoded: String = text
                        .bytes()
                        .map(|b| match b {
                            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                                (b as char).to_string()
                            }
                            _ => std::format!("%{b:02X}"),
                        })
                        .collect();
                    result.push_str(&encoded);
                } else {
                    result.push_str(&text);
                }
            }
            Some(other) => {
                result.push('%');
                result.push(other);
            }
            None => result.push('%'),
        }
    }

    Ok(Some(Node::Quoted(Quoted::new(
        result,
        template.quote,
        template.escaped,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::dimension::Dimension;

    fn ctx() -> crate::context::EvalContext {
        crate::context::EvalContext::new(crate::session::Session::new_for_test_suite())
    }

    fn call(
        f: super::super::BuiltinFn,
        args: &[Node],
    ) -> String {
        let mut context = ctx();
        let mut fctx = FunctionContext {
            context: &mut context,
            name: "test",
            index: None,
            file_info: None,
        };
        f(&mut fctx, args).unwrap().unwrap().to_css_string(false).unwrap()
    }

    #[test]
    fn e_drops_quotes() {
        let arg = Node::Quoted(Quoted::new("ms:stuff()", '"', false));
        assert_eq!(call(escape_value, &[arg]), "ms:stuff()");
    }

    #[test]
    fn format_substitutes() {
        let args = [
            Node::Quoted(Quoted::new("rgb(%d, %d, %d)", '"', false)),
            Node::Dimension(Dimension::number(1.0).unwrap()),
            Node::Dimension(Dimension::number(2.0).unwrap()),
            Node::Dimension(Dimension::number(3.0).unwrap()),
        ];
        assert_eq!(call(format, &args), "\"rgb(1, 2, 3)\"");
    }

    #[test]
    fn replace_first_only_without_g() {
        let args = [
            Node::Quoted(Quoted::new("a a a", '"', false)),
            Node::Quoted(Quoted::new("a", '"', false)),
            Node::Quoted(Quoted::new("b", '"', false)),
        ];
        assert_eq!(call(replace, &args), "\"b a a\"");
    }
}
