//! Scanner and recursive-descent parser for the SecreC surface syntax.
//!
//! The parser produces the `scc-ast` tree; parse problems are appended to
//! the compile log verbatim and abort the current file.

pub mod parser;
pub mod scanner;

pub use parser::parse_module;
pub use scanner::{scan, Token, TokenKind};
