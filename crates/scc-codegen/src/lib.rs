//! Lowering of the typed AST into three-address intermediate code.
//!
//! The generator drives the type checker statement by statement: each
//! statement is elaborated immediately before it is lowered, so that
//! declarations bind their symbols before the next statement resolves
//! names. Jumps are emitted with unpatched targets collected in patch
//! lists; `append` links consecutive results by patching the
//! predecessor's dangling jumps to the successor's first instruction.

pub mod arrays;
pub mod codegen;
pub mod expr;
pub mod program;
pub mod result;
pub mod stmt;

pub use codegen::CodeGen;
pub use program::compile_program;
pub use result::{CGBranchResult, CGResult, CGStmtResult, StmtFlags};
