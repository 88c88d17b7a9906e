//! Error types.
//!
//! Everything the compiler can fail with funnels into [`LessError`], which carries
//! the error class from §"Error shape" of the language reference (`Parse`, `Name`,
//! `Operation`, ...) plus the source position where the failure happened.
//!
//! Positions are tracked as byte indexes into the originating file while the
//! compiler runs; they get resolved into line/column pairs only when an error is
//! about to be surfaced, via [`LessError::resolve_position`].

use std::error;
use std::fmt;

use crate::node::FileInfo;

/// Classes of compilation errors.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed Less source.
    Parse,

    /// AST shape violations discovered during evaluation, e.g. a detached
    /// ruleset used where a value is required.
    Syntax,

    /// Undefined variable or mixin, or an unmatched mixin call.
    Name,

    /// Arithmetic on incompatible operands.
    Operation,

    /// A function call with the wrong number or type of arguments.
    Argument,

    /// A dimension with multiple units where strict output forbids it.
    Dimension,

    /// Failure while loading or calling an `@plugin`.
    Plugin,

    /// Catch-all for guard failures, extend circularity, and similar.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ErrorKind::Parse => "Parse",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::Name => "Name",
            ErrorKind::Operation => "Operation",
            ErrorKind::Argument => "Argument",
            ErrorKind::Dimension => "Dimension",
            ErrorKind::Plugin => "Plugin",
            ErrorKind::Runtime => "Runtime",
        };

        write!(f, "{s}")
    }
}

/// An error produced while compiling a Less stylesheet.
#[derive(Debug, Clone)]
pub struct LessError {
    pub kind: ErrorKind,
    pub message: String,

    /// File the error points into, when known.
    pub filename: Option<String>,

    /// Byte offset into the file's source text.
    pub index: Option<usize>,

    /// 1-based line, resolved lazily from `index`.
    pub line: Option<usize>,

    /// 1-based column, resolved lazily from `index`.
    pub column: Option<usize>,

    /// Mixin call chain active when the error was raised, innermost first.
    pub call_stack: Vec<String>,
}

impl LessError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> LessError {
        LessError {
            kind,
            message: message.into(),
            filename: None,
            index: None,
            line: None,
            column: None,
            call_stack: Vec::new(),
        }
    }

    pub fn parse(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Parse, message)
    }

    pub fn syntax(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Syntax, message)
    }

    pub fn name(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Name, message)
    }

    pub fn operation(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Operation, message)
    }

    pub fn argument(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Argument, message)
    }

    pub fn dimension(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Dimension, message)
    }

    pub fn plugin(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Plugin, message)
    }

    pub fn runtime(message: impl Into<String>) -> LessError {
        LessError::new(ErrorKind::Runtime, message)
    }

    /// Attaches a source position, keeping an already-present one.
    ///
    /// Errors bubble up through `?` from deep inside evaluation; the innermost
    /// frame that knows a position wins.
    pub fn at(mut self, index: Option<usize>, file_info: Option<&FileInfo>) -> LessError {
        if self.index.is_none() {
            self.index = index;
        }

        if self.filename.is_none() {
            self.filename = file_info.map(|fi| fi.filename.clone());
        }

        self
    }

    /// Pushes a mixin call frame onto the error's stack trace.
    pub fn with_frame(mut self, frame: impl Into<String>) -> LessError {
        self.call_stack.push(frame.into());
        self
    }

    /// Fills in `line` and `column` from `index` against the file's source text.
    ///
    /// A no-op when the index is missing or out of bounds.
    pub fn resolve_position(&mut self, source: &str) {
        let Some(index) = self.index else {
            return;
        };

        if index > source.len() {
            return;
        }

        let prefix = &source[..index];
        let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
        let column = match prefix.rfind('\n') {
            Some(nl) => prefix[nl + 1..].chars().count() + 1,
            None => prefix.chars().count() + 1,
        };

        self.line = Some(line);
        self.column = Some(column);
    }
}

impl error::Error for LessError {}

impl fmt::Display for LessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Error: {}", self.kind, self.message)?;

        if let Some(ref filename) = self.filename {
            write!(f, " in {filename}")?;

            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, " on line {line}, column {column}")?;
            }
        }

        for frame in &self.call_stack {
            write!(f, "\n    from {frame}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_position() {
        let source = ".a {\n  color: @missing;\n}\n";
        let mut e = LessError::name("variable @missing is undefined");
        e.index = Some(source.find('@').unwrap());
        e.resolve_position(source);

        assert_eq!(e.line, Some(2));
        assert_eq!(e.column, Some(10));
    }

    #[test]
    fn position_on_first_line() {
        let mut e = LessError::parse("unexpected token");
        e.index = Some(3);
        e.resolve_position("abcdef");

        assert_eq!(e.line, Some(1));
        assert_eq!(e.column, Some(4));
    }

    #[test]
    fn display_includes_kind_and_location() {
        let mut e = LessError::name("variable @x is undefined");
        e.filename = Some("main.less".to_string());
        e.line = Some(3);
        e.column = Some(7);

        assert_eq!(
            format!("{e}"),
            "NameError: variable @x is undefined in main.less on line 3, column 7"
        );
    }

    #[test]
    fn innermost_position_wins() {
        let e = LessError::operation("bad operand").at(Some(10), None);
        let e = e.at(Some(99), None);

        assert_eq!(e.index, Some(10));
    }
}
