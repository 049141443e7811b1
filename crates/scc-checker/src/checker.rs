//! Checker state and shared helpers.

use crate::templates::TemplateInstantiator;
use rustc_hash::FxHashMap;
use scc_ast::{NodeId, NodeIdGen};
use scc_common::{CompileLog, FileId, Location, SourceMap, Span};
use scc_core::{
    Context, DataTypeId, DimType, ScopeId, SecTypeId, SymbolId, SymbolTable, TypeId, GLOBAL_SCOPE,
};

/// Elaboration failed; the diagnostic is already in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeError;

pub type TcResult<T> = Result<T, TypeError>;

/// The type the enclosing context expects of a sub-expression. Absent
/// components put no constraint on the sub-expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeContext {
    pub sec: Option<SecTypeId>,
    pub data: Option<DataTypeId>,
    pub dim: Option<DimType>,
}

impl TypeContext {
    pub fn new() -> Self {
        TypeContext::default()
    }

    pub fn with_sec(sec: SecTypeId) -> Self {
        TypeContext {
            sec: Some(sec),
            ..TypeContext::default()
        }
    }

    pub fn with_data(data: DataTypeId) -> Self {
        TypeContext {
            data: Some(data),
            ..TypeContext::default()
        }
    }

    /// The context of an index expression: public uint64 scalar.
    pub fn index(cxt: &mut Context) -> Self {
        TypeContext {
            sec: Some(cxt.sec_public()),
            data: Some(cxt.dt_prim(scc_ast::Prim::Uint64)),
            dim: Some(0),
        }
    }

    pub fn of_type(cxt: &Context, ty: TypeId) -> Self {
        match cxt.basic_parts(ty) {
            Some((sec, data, dim)) => TypeContext {
                sec: Some(sec),
                data: Some(data),
                dim: Some(dim),
            },
            None => TypeContext::default(),
        }
    }
}

/// The procedure whose body is being elaborated.
#[derive(Clone, Copy, Debug)]
pub struct CurrentProc {
    pub symbol: SymbolId,
    /// `Type::Void` or the basic return type.
    pub ret: TypeId,
}

pub struct TypeChecker<'a> {
    pub cxt: &'a mut Context,
    pub st: &'a mut SymbolTable,
    pub log: &'a mut CompileLog,
    pub sources: &'a SourceMap,
    pub idgen: &'a mut NodeIdGen,
    pub instantiator: TemplateInstantiator,
    /// Current lexical scope; code generation pushes and pops this.
    pub scope: ScopeId,
    /// File whose nodes are being elaborated; spans resolve against it.
    pub file: FileId,
    pub current_proc: Option<CurrentProc>,

    // Memoization side tables, keyed by node id.
    pub(crate) expr_types: FxHashMap<NodeId, TypeId>,
    pub(crate) type_expr_cache: FxHashMap<NodeId, TypeId>,
    pub(crate) var_symbols: FxHashMap<NodeId, SymbolId>,
    pub(crate) call_targets: FxHashMap<NodeId, SymbolId>,
    pub(crate) domain_symbols: FxHashMap<NodeId, SymbolId>,
    pub(crate) proc_symbols: FxHashMap<NodeId, SymbolId>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        cxt: &'a mut Context,
        st: &'a mut SymbolTable,
        log: &'a mut CompileLog,
        sources: &'a SourceMap,
        idgen: &'a mut NodeIdGen,
    ) -> Self {
        TypeChecker {
            cxt,
            st,
            log,
            sources,
            idgen,
            instantiator: TemplateInstantiator::new(),
            scope: GLOBAL_SCOPE,
            file: FileId::DUMMY,
            current_proc: None,
            expr_types: FxHashMap::default(),
            type_expr_cache: FxHashMap::default(),
            var_symbols: FxHashMap::default(),
            call_targets: FxHashMap::default(),
            domain_symbols: FxHashMap::default(),
            proc_symbols: FxHashMap::default(),
        }
    }

    pub fn location(&self, span: Span) -> Location {
        self.sources.location(self.file, span)
    }

    pub fn fatal(&mut self, span: Span, message: impl Into<String>) -> TypeError {
        let loc = self.sources.location(self.file, span);
        self.log.fatal(Some(loc), message);
        TypeError
    }

    /// The memoized type of an expression node, when elaborated.
    pub fn expr_type(&self, id: NodeId) -> Option<TypeId> {
        self.expr_types.get(&id).copied()
    }

    /// The variable symbol an identifier occurrence resolved to.
    pub fn var_symbol(&self, id: NodeId) -> Option<SymbolId> {
        self.var_symbols.get(&id).copied()
    }

    /// The procedure symbol a call site resolved to.
    pub fn call_target(&self, id: NodeId) -> Option<SymbolId> {
        self.call_targets.get(&id).copied()
    }

    /// The domain symbol a `__domainid` expression resolved to.
    pub fn domain_symbol(&self, id: NodeId) -> Option<SymbolId> {
        self.domain_symbols.get(&id).copied()
    }

    /// The procedure symbol created for a definition node.
    pub fn proc_symbol(&self, id: NodeId) -> Option<SymbolId> {
        self.proc_symbols.get(&id).copied()
    }

    pub(crate) fn set_expr_type(&mut self, id: NodeId, ty: TypeId) {
        self.expr_types.insert(id, ty);
    }
}
