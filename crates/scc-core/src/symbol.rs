//! Symbols.
//!
//! Every scoped binding is a `Symbol` in the context's arena. Variable
//! symbols own auxiliary shape symbols (one per array axis plus a size
//! symbol) and one child symbol per struct field; `flatten_symbol` yields
//! the order in which a value crosses procedure boundaries.

use crate::constant::ConstValue;
use crate::imop::ImopId;
use crate::program::{BlockId, ProcId};
use crate::types::{DataTypeId, DimType, SecTypeId, TypeId};
use indexmap::IndexMap;
use scc_ast::{ProcDef, StructDecl, TemplateDecl};
use scc_common::{Atom, FileId, Span};
use std::rc::Rc;

/// Handle to a symbol in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// Lexicographic weight of a procedure template; smaller is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Weight {
    pub type_variable_count: u32,
    pub unrestricted_type_variable_count: u32,
    pub quantified_domain_count: u32,
}

impl Weight {
    pub const WORST: Weight = Weight {
        type_variable_count: u32::MAX,
        unrestricted_type_variable_count: u32::MAX,
        quantified_domain_count: u32::MAX,
    };

    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Weight {
            type_variable_count: a,
            unrestricted_type_variable_count: b,
            quantified_domain_count: c,
        }
    }
}

/// Whether a variable outlives procedure activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeClass {
    Global,
    Local,
}

/// Shape and field bookkeeping of a variable symbol.
#[derive(Clone, Debug, Default)]
pub struct VariableInfo {
    pub is_temporary: bool,
    pub is_global: bool,
    /// One public uint64 scalar per array axis.
    pub dims: Vec<SymbolId>,
    /// Product of the dims; present iff the variable is an array.
    pub size: Option<SymbolId>,
    /// One child variable per struct field, in declaration order.
    pub fields: Vec<SymbolId>,
    pub parent: Option<SymbolId>,
}

/// Per-kind parameters of a user-primitive data type.
#[derive(Clone, Debug)]
pub struct KindTypeParams {
    pub ty: DataTypeId,
    pub public_type: Option<DataTypeId>,
    pub size: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct ProcedureInfo {
    /// First instruction of the procedure body, once generated.
    pub target: Option<ImopId>,
    /// The definition, absent for builtin procedures.
    pub decl: Option<Rc<ProcDef>>,
    /// Block position, filled in when the CFG is built.
    pub block: Option<(ProcId, BlockId)>,
}

#[derive(Clone, Debug)]
pub struct ProcTemplateInfo {
    pub decl: Rc<TemplateDecl>,
    pub weight: Weight,
    /// Quantified data-type variable names.
    pub data_quantifiers: Vec<Atom>,
    /// Quantified domain variable names.
    pub domain_quantifiers: Vec<Atom>,
    /// Return security type depends on the call context.
    pub context_dependent: bool,
    /// Scope of the defining module; instances import it.
    pub module_scope: crate::symbol_table::ScopeId,
}

#[derive(Clone, Debug)]
pub struct OpTemplateInfo {
    pub decl: Rc<TemplateDecl>,
    pub quantified_param_count: u32,
    pub domain_weight: u32,
    pub data_quantifiers: Vec<Atom>,
    /// Scope of the defining module; instances import it.
    pub module_scope: crate::symbol_table::ScopeId,
}

#[derive(Clone, Debug)]
pub enum SymbolKind {
    Constant {
        value: ConstValue,
    },
    Variable(Box<VariableInfo>),
    Procedure(Box<ProcedureInfo>),
    ProcTemplate(Box<ProcTemplateInfo>),
    OpTemplate(Box<OpTemplateInfo>),
    Struct {
        decl: Rc<StructDecl>,
    },
    Label {
        imop: ImopId,
        block: Option<(ProcId, BlockId)>,
    },
    Kind {
        types: IndexMap<Atom, KindTypeParams>,
    },
    Domain {
        sec: SecTypeId,
    },
    DataVar {
        data: DataTypeId,
    },
    DimVar {
        dim: DimType,
    },
}

/// One scoped binding.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Atom,
    /// The value type; `None` for non-value symbols (kinds, labels, ...).
    pub ty: Option<TypeId>,
    pub kind: SymbolKind,
    pub file: FileId,
    pub span: Span,
}

impl Symbol {
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, SymbolKind::Constant { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, SymbolKind::Variable(_))
    }

    pub fn variable(&self) -> Option<&VariableInfo> {
        match &self.kind {
            SymbolKind::Variable(info) => Some(info),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self) -> Option<&mut VariableInfo> {
        match &mut self.kind {
            SymbolKind::Variable(info) => Some(info),
            _ => None,
        }
    }

    pub fn procedure(&self) -> Option<&ProcedureInfo> {
        match &self.kind {
            SymbolKind::Procedure(info) => Some(info),
            _ => None,
        }
    }

    pub fn const_value(&self) -> Option<&ConstValue> {
        match &self.kind {
            SymbolKind::Constant { value } => Some(value),
            _ => None,
        }
    }
}

/// Arena of all symbols created during a compilation run.
#[derive(Debug, Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
}

impl SymbolArena {
    pub fn new() -> Self {
        SymbolArena::default()
    }

    pub fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Flatten a symbol for crossing a procedure boundary: struct fields
/// depth-first left-to-right; for each leaf its dim symbols precede the
/// leaf itself. Sizes are recomputed on the receiving side and are not
/// part of the flattening.
pub fn flatten_symbol(arena: &SymbolArena, sym: SymbolId) -> Vec<SymbolId> {
    let mut out = Vec::new();
    flatten_into(arena, sym, &mut out);
    out
}

fn flatten_into(arena: &SymbolArena, sym: SymbolId, out: &mut Vec<SymbolId>) {
    match arena.get(sym).variable() {
        Some(info) if !info.fields.is_empty() => {
            for &field in &info.fields {
                flatten_into(arena, field, out);
            }
        }
        Some(info) => {
            out.extend(info.dims.iter().copied());
            out.push(sym);
        }
        None => out.push(sym),
    }
}
