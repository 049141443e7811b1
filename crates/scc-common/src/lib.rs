//! Common types and utilities for the scc SecreC compiler.
//!
//! This crate provides foundational types used across all scc crates:
//! - String interning (`Atom`, `Interner`)
//! - Source spans (`Span`, `Spanned`)
//! - Source files and locations (`SourceMap`, `FileId`, `Location`)
//! - The append-only compile log (`CompileLog`, `Diagnostic`)

pub mod diagnostics;
pub mod interner;
pub mod source;
pub mod span;

pub use diagnostics::{CompileLog, Diagnostic, Severity};
pub use interner::{Atom, Interner};
pub use source::{FileId, Location, Position, SourceFile, SourceMap};
pub use span::{Span, Spanned};
