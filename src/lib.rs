//! Compile [Less] stylesheets to CSS.
//!
//! Less is a superset of CSS adding variables, nested rules, mixins,
//! mathematical expressions, functions, imports and selector inheritance
//! (`:extend`).  This crate implements the compiler core: the AST and its
//! evaluation engine, the import pipeline, the visitor cascade that turns an
//! evaluated tree into flat CSS, and the extend resolver.
//!
//! [Less]: https://lesscss.org
//!
//! # Basic usage
//!
//! ```
//! let result = less::compile(
//!     "@accent: #228b22; .note { border-color: @accent; }",
//!     &less::Options::default(),
//! ).unwrap();
//!
//! assert_eq!(result.css, ".note {\n  border-color: #228b22;\n}\n");
//! ```
//!
//! # Imports
//!
//! `@import` resolves against the directory of the importing file, then the
//! configured [`Options::paths`].  The [`CompileResult::imports`] list names
//! every file that was read, so build tools can set up file watching.
//!
//! # Diagnostics
//!
//! Set the `LESS_LOG` environment variable to see compiler warnings
//! (unmatched extends, ignored import errors) on stdout.

#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod arena;
pub mod batch;
pub mod cache;
pub mod context;
pub mod error;
pub mod functions;
pub mod importer;
mod log;
pub mod node;
pub mod output;
pub mod parser;
pub mod plugin;
pub mod session;
pub mod tree;
pub mod visitors;

pub use api::{compile, compile_with_importer, compile_with_session, CompileResult, Options};
pub use batch::{compile_many, BatchInput, BatchOptions};
pub use context::{MathMode, RewriteUrls};
pub use error::{ErrorKind, LessError};
pub use importer::{FileImporter, Importer, ResolvedImport};
pub use plugin::{FunctionScopes, PluginBridge, PluginFunction};
pub use session::Session;
