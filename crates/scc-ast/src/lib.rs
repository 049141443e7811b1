//! Abstract syntax tree for the SecreC language.
//!
//! The tree is an owned structure: nodes own their children. Every
//! expression, statement and type-expression node carries a `NodeId` that
//! is unique within a compilation run; the type checker memoizes resolved
//! types in side tables keyed by these ids. Template instantiation clones
//! declaration bodies and renumbers the clone so each instance gets its
//! own memoization slots.

pub mod ops;
pub mod print;
pub mod refresh;
pub mod tree;

pub use ops::{BinaryOp, OverloadOp, Prim, UnaryOp};
pub use tree::*;
