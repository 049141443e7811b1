//! Type model, symbols and intermediate representation.
//!
//! Everything with shared structure (security types, data types, full
//! types, constants) is interned in a [`Context`] and handled through
//! small copyable ids; equality of ids is semantic equality. Symbols live
//! in an arena inside the context; lexical scoping is a separate
//! [`SymbolTable`] tree referring to symbols by id. The IR is built as a
//! flat instruction list during code generation and then split into basic
//! blocks with labelled control-flow edges.

pub mod apfloat;
pub mod apint;
pub mod constant;
pub mod context;
pub mod imop;
pub mod print;
pub mod program;
pub mod symbol;
pub mod symbol_table;
pub mod types;

pub use apfloat::ApFloat;
pub use apint::ApInt;
pub use constant::ConstValue;
pub use context::Context;
pub use imop::{ICode, Imop, ImopId, Opcode};
pub use program::{Block, BlockId, Edge, Procedure, ProcId, Program};
pub use symbol::{
    flatten_symbol, KindTypeParams, OpTemplateInfo, ProcTemplateInfo, ProcedureInfo, Symbol,
    SymbolArena, SymbolId, SymbolKind, VariableInfo, Weight,
};
pub use symbol_table::{ScopeId, SymCategory, SymbolTable, GLOBAL_SCOPE};
pub use types::{
    CastStyle, DataType, DataTypeId, DimType, SecTypeId, SecurityType, StructField, Type,
    TypeArgument, TypeId,
};
