//! The code generator core: instruction emission, temporaries, shape
//! bookkeeping and scoped release.

use crate::result::{CGResult, CGStmtResult};
use rustc_hash::FxHashMap;
use scc_ast::Prim;
use scc_checker::TypeChecker;
use scc_common::Span;
use scc_core::{
    flatten_symbol, ICode, Imop, ImopId, Opcode, ScopeId, SymbolId, TypeId,
};

pub struct CodeGen<'a> {
    pub tc: TypeChecker<'a>,
    pub code: ICode,
    /// Procedure boundaries in emission order; the start code is entry 0.
    pub proc_starts: Vec<(Option<SymbolId>, ImopId)>,
    /// Scope at the boundary of each enclosing loop, innermost last.
    pub(crate) loops: Vec<ScopeId>,
    /// Call sites per callee, used by `Program::build` verification and
    /// by tests.
    pub calls_to: FxHashMap<SymbolId, Vec<ImopId>>,
    /// Span attributed to instructions being emitted.
    pub(crate) node_span: Span,
    /// Set when a statement failed to elaborate; lowering continues with
    /// the siblings but the driver refuses to build the program.
    pub had_errors: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(tc: TypeChecker<'a>) -> Self {
        CodeGen {
            tc,
            code: ICode::new(),
            proc_starts: Vec::new(),
            loops: Vec::new(),
            calls_to: FxHashMap::default(),
            node_span: Span::dummy(),
            had_errors: false,
        }
    }

    /*******************************************************************
      Emission
    *******************************************************************/

    pub fn push_imop(&mut self, imop: Imop) -> ImopId {
        let imop = imop.with_loc(self.tc.file, self.node_span);
        self.code.push(imop)
    }

    /// Emit an instruction, making it the result's first instruction if
    /// none exists and patching pending next-jumps to it.
    pub fn push_imop_after(&mut self, result: &mut CGResult, imop: Imop) -> ImopId {
        let id = self.push_imop(imop);
        result.patch_first_imop(Some(id));
        let pending = result.take_next_list();
        self.patch_jumps(&pending, id);
        id
    }

    /// Point every jump in `jumps` at `target`.
    pub fn patch_jumps(&mut self, jumps: &[ImopId], target: ImopId) {
        if jumps.is_empty() {
            return;
        }
        let label = self.tc.st.label(self.tc.cxt, target);
        for &jump in jumps {
            self.code.get_mut(jump).set_arg(0, label);
        }
    }

    /// Merge a successive result into an accumulated one.
    pub fn append(&mut self, result: &mut CGResult, other: CGResult) {
        if let Some(first) = other.first_imop() {
            let pending = result.take_next_list();
            self.patch_jumps(&pending, first);
        }
        result.patch_first_imop(other.first_imop());
        let mut other = other;
        result.extend_next_list(other.take_next_list());
    }

    /// Merge a statement result: jump lists and flags propagate.
    pub fn append_stmt(&mut self, result: &mut CGStmtResult, other: CGStmtResult) {
        let mut other = other;
        if let Some(first) = other.first_imop() {
            let pending = result.result.take_next_list();
            self.patch_jumps(&pending, first);
        }
        result.result.patch_first_imop(other.first_imop());
        result
            .result
            .extend_next_list(other.result.take_next_list());
        result.break_list.append(&mut other.break_list);
        result.continue_list.append(&mut other.continue_list);
    }

    pub fn push_comment(&mut self, result: &mut CGResult, text: &str) -> ImopId {
        let msg = self.tc.cxt.const_str(text);
        self.push_imop_after(result, Imop::new(Opcode::Comment, [None, Some(msg)]))
    }

    /*******************************************************************
      Symbols and shapes
    *******************************************************************/

    pub fn index_constant(&mut self, value: u64) -> SymbolId {
        self.tc.cxt.index_constant(value)
    }

    pub fn new_temporary(&mut self, ty: TypeId) -> SymbolId {
        self.tc.st.append_temporary(self.tc.cxt, self.tc.scope, ty)
    }

    /// Allocate the result symbol of an expression: a fresh temporary
    /// with dim/size symbols and (for composites) field symbols.
    pub fn generate_result_symbol(&mut self, result: &mut CGResult, ty: TypeId) -> SymbolId {
        let sym = self.new_temporary(ty);
        result.set_symbol(sym);
        sym
    }

    /// The size symbol of an array, or an index constant for scalars.
    pub fn get_size_or(&mut self, sym: SymbolId, value: u64) -> SymbolId {
        if let Some(info) = self.tc.cxt.symbol(sym).variable() {
            if let Some(size) = info.size {
                return size;
            }
        }
        self.index_constant(value)
    }

    /// Emit `size = 1; size *= dim_i ...` maintaining the size invariant.
    pub fn codegen_size(&mut self, result: &mut CGResult, sym: SymbolId) {
        let info = match self.tc.cxt.symbol(sym).variable() {
            Some(info) => info.clone(),
            None => return,
        };

        if !info.fields.is_empty() {
            for field in info.fields {
                self.codegen_size(result, field);
            }
            return;
        }

        let size = match info.size {
            Some(size) => size,
            None => return,
        };
        let one = self.index_constant(1);
        self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(size), Some(one)]));
        for dim in info.dims {
            self.push_imop(Imop::new(
                Opcode::Mul,
                [Some(size), Some(size), Some(dim)],
            ));
        }
    }

    /// Assign `dest`'s shape symbols from `src`'s.
    pub fn copy_shape_from(&mut self, result: &mut CGResult, dest: SymbolId, src: SymbolId) {
        let dest_info = match self.tc.cxt.symbol(dest).variable() {
            Some(info) => info.clone(),
            None => return,
        };
        let src_info = match self.tc.cxt.symbol(src).variable() {
            Some(info) => info.clone(),
            None => return,
        };

        for (d, s) in dest_info.dims.iter().zip(&src_info.dims) {
            self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(*d), Some(*s)]));
        }
        if let (Some(dsize), Some(ssize)) = (dest_info.size, src_info.size) {
            self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(dsize), Some(ssize)]));
        }
    }

    /// Allocate storage for a temporary result: scalars get DECLARE,
    /// arrays an ALLOC filled with `val` (or the default element).
    pub fn alloc_temporary_result(
        &mut self,
        result: &mut CGResult,
        sym: SymbolId,
        val: Option<SymbolId>,
    ) {
        let ty = self.tc.cxt.symbol(sym).ty.expect("variable type");
        if self.tc.cxt.is_scalar(ty) {
            self.push_imop_after(result, Imop::new(Opcode::Declare, [Some(sym)]));
            return;
        }

        let size = self.get_size_or(sym, 0);
        let data = self.tc.cxt.data_of(ty);
        let sec = self.tc.cxt.sec_of(ty);
        let val = match val {
            Some(val) => Some(val),
            None => {
                if self.tc.cxt.data_type(data).is_user_primitive() {
                    let public = self.tc.cxt.dtype_declassify(sec, data);
                    public.and_then(|d| self.tc.cxt.default_constant(d))
                } else {
                    self.tc.cxt.default_constant(data)
                }
            }
        };
        match val {
            Some(val) => {
                self.push_imop_after(
                    result,
                    Imop::new(Opcode::Alloc, [Some(sym), Some(size), Some(val)]),
                );
            }
            None => {
                self.push_imop_after(result, Imop::new(Opcode::Alloc, [Some(sym), Some(size)]));
            }
        }
    }

    /*******************************************************************
      Release
    *******************************************************************/

    /// RELEASE a single symbol when its type owns memory.
    pub fn release_resource(&mut self, result: &mut CGResult, sym: SymbolId) {
        let ty = match self.tc.cxt.symbol(sym).ty {
            Some(ty) => ty,
            None => return,
        };
        if self.tc.cxt.is_nontrivial_resource(ty) {
            self.push_imop_after(result, Imop::new(Opcode::Release, [None, Some(sym)]));
        }
    }

    /// Release every named variable of the current scope.
    pub fn release_scope_variables(&mut self, result: &mut CGResult) {
        let vars = self.tc.st.variables(self.tc.cxt, self.tc.scope);
        for var in vars.into_iter().rev() {
            for leaf in flatten_symbol(&self.tc.cxt.symbols, var) {
                self.release_resource(result, leaf);
            }
        }
    }

    /// Release every named variable between the current scope and the
    /// given boundary (exclusive).
    pub fn release_variables_up_to(&mut self, result: &mut CGResult, end: Option<ScopeId>) {
        let vars = self.tc.st.variables_up_to(self.tc.cxt, self.tc.scope, end);
        for var in vars {
            for leaf in flatten_symbol(&self.tc.cxt.symbols, var) {
                self.release_resource(result, leaf);
            }
        }
    }

    /// Release every procedure-local variable, excluding the components
    /// of `keep` (about to be returned).
    pub fn release_proc_variables(&mut self, result: &mut CGResult, keep: Option<SymbolId>) {
        let exclude: Vec<SymbolId> = match keep {
            Some(keep) => flatten_symbol(&self.tc.cxt.symbols, keep),
            None => Vec::new(),
        };
        let global = self.tc.st.global_scope();
        let vars = self
            .tc
            .st
            .variables_up_to(self.tc.cxt, self.tc.scope, Some(global));
        for var in vars {
            for leaf in flatten_symbol(&self.tc.cxt.symbols, var) {
                if !exclude.contains(&leaf) {
                    self.release_resource(result, leaf);
                }
            }
        }
    }

    /// Release the temporaries feeding an expression result, keeping the
    /// components of `keep`.
    pub fn release_temporary(
        &mut self,
        result: &mut CGResult,
        sym: SymbolId,
        keep: Option<SymbolId>,
    ) {
        let exclude: Vec<SymbolId> = match keep {
            Some(keep) => collect_temporaries(self, keep),
            None => Vec::new(),
        };
        for temp in collect_temporaries(self, sym) {
            if !exclude.contains(&temp) {
                self.release_resource(result, temp);
            }
        }
    }

    /// Copy a named (non-temporary) value into a fresh temporary so the
    /// caller can own it across a procedure boundary.
    pub fn copy_non_temporary(&mut self, result: &mut CGResult, sym: SymbolId) -> SymbolId {
        if self.tc.cxt.symbol(sym).is_constant() {
            return sym;
        }
        let info = match self.tc.cxt.symbol(sym).variable() {
            Some(info) => info.clone(),
            None => return sym,
        };
        if info.is_temporary {
            return sym;
        }

        let ty = self.tc.cxt.symbol(sym).ty.expect("variable type");
        if !self.tc.cxt.is_scalar(ty) {
            let copy = self.new_temporary(ty);
            // The copy shares the source's size symbol.
            let size = info.size.expect("array size symbol");
            if let Some(copy_info) = self.tc.cxt.symbol_mut(copy).variable_mut() {
                copy_info.size = Some(size);
            }
            self.push_imop_after(
                result,
                Imop::new(Opcode::Copy, [Some(copy), Some(sym), Some(size)]),
            );
            return copy;
        }

        if self.tc.cxt.is_nontrivial_resource(ty) {
            let copy = self.new_temporary(ty);
            self.push_imop_after(result, Imop::new(Opcode::Declare, [Some(copy)]));
            self.push_imop(Imop::new(Opcode::Assign, [Some(copy), Some(sym)]));
            return copy;
        }

        sym
    }

    /*******************************************************************
      Loops and scopes
    *******************************************************************/

    pub fn new_scope(&mut self) {
        self.tc.scope = self.tc.st.new_scope(self.tc.scope);
    }

    pub fn pop_scope(&mut self) {
        self.tc.scope = self
            .tc
            .st
            .parent(self.tc.scope)
            .expect("popping the global scope");
    }

    pub fn start_loop(&mut self) {
        self.loops.push(self.tc.scope);
    }

    pub fn end_loop(&mut self) {
        self.loops.pop();
    }

    pub fn loop_scope(&self) -> Option<ScopeId> {
        self.loops.last().copied()
    }

    /*******************************************************************
      Errors
    *******************************************************************/

    /// Emit a runtime ERROR with a formatted source location.
    pub fn new_error(&mut self, message: &str, span: Span) -> ImopId {
        let loc = self.tc.location(span);
        let msg = self.tc.cxt.const_str(format!("{message} at {loc}"));
        self.push_imop(Imop::new(Opcode::Error, [None, Some(msg)]))
    }

    /// The type of the default string accumulator and friends.
    pub fn string_type(&mut self) -> TypeId {
        self.tc.cxt.ty_public(Prim::String, 0)
    }

    pub fn bool_type(&mut self) -> TypeId {
        self.tc.cxt.ty_public(Prim::Bool, 0)
    }

    pub fn index_type(&mut self) -> TypeId {
        self.tc.cxt.ty_public(Prim::Uint64, 0)
    }
}

/// Temporaries reachable from a symbol: the symbol itself (when it is a
/// temporary rooted in a temporary), plus field leaves.
fn collect_temporaries(cg: &CodeGen<'_>, sym: SymbolId) -> Vec<SymbolId> {
    let mut acc = Vec::new();
    collect_temporaries_loop(cg, sym, &mut acc);
    acc
}

fn collect_temporaries_loop(cg: &CodeGen<'_>, sym: SymbolId, acc: &mut Vec<SymbolId>) {
    let info = match cg.tc.cxt.symbol(sym).variable() {
        Some(info) => info,
        None => return,
    };

    if !info.fields.is_empty() {
        for &field in &info.fields {
            collect_temporaries_loop(cg, field, acc);
        }
        return;
    }

    if info.is_temporary {
        // A leaf owned by a named variable is not collected.
        let mut root = sym;
        while let Some(parent) = cg.tc.cxt.symbol(root).variable().and_then(|i| i.parent) {
            root = parent;
        }
        let root_is_temp = cg
            .tc
            .cxt
            .symbol(root)
            .variable()
            .map(|i| i.is_temporary)
            .unwrap_or(false);
        if root_is_temp {
            acc.push(sym);
        }
    }
}
