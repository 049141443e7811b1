//! The compilation driver: modules, global variable initializers, the
//! program start code, procedure bodies, and the template instantiation
//! worklist.

use crate::codegen::CodeGen;
use crate::result::CGResult;
use crate::stmt::VarInitMode;
use rustc_hash::FxHashMap;
use scc_ast::{GlobalDecl, NodeIdGen, ProcDef, VarInit};
use scc_checker::{checker::CurrentProc, TypeChecker, TypeError};
use scc_common::{Atom, CompileLog, FileId, SourceMap, Span};
use scc_core::{
    Context, Imop, Opcode, Program, ScopeId, SymbolId, SymbolKind, SymCategory, SymbolTable, Type,
    TypeId, GLOBAL_SCOPE,
};
use std::rc::Rc;
use tracing::debug;

struct PendingGlobal {
    proc_sym: SymbolId,
    global_sym: SymbolId,
    ty: TypeId,
    var_init: VarInit,
    module_scope: ScopeId,
    file: FileId,
}

/// Compile a parsed multi-module program into IR. Modules must be in
/// dependency order with the main module last.
pub fn compile_program(
    ast: &scc_ast::Program,
    sources: &SourceMap,
    cxt: &mut Context,
    st: &mut SymbolTable,
    idgen: &mut NodeIdGen,
    log: &mut CompileLog,
) -> Result<Program, TypeError> {
    let mut tc = TypeChecker::new(cxt, st, log, sources, idgen);

    // One scope per module; imports link them.
    let mut module_scopes: Vec<ScopeId> = Vec::with_capacity(ast.modules.len());
    let mut scopes_by_name: FxHashMap<Atom, ScopeId> = FxHashMap::default();
    for module in &ast.modules {
        let scope = tc.st.new_scope(GLOBAL_SCOPE);
        module_scopes.push(scope);
        if let Some(name) = &module.name {
            scopes_by_name.insert(name.name, scope);
        }
    }
    for (module, &scope) in ast.modules.iter().zip(&module_scopes) {
        for import in &module.imports {
            match scopes_by_name.get(&import.name.name) {
                Some(&imported) => {
                    tc.st.add_import(scope, imported);
                }
                None => {
                    let loc = sources.location(module.file, import.span);
                    let name = tc.cxt.interner.resolve(import.name.name).to_owned();
                    tc.log
                        .fatal(Some(loc), format!("module '{name}' was not parsed"));
                    return Err(TypeError);
                }
            }
        }
    }

    // Collect signatures.
    let mut collect_failed = false;
    for (module, &scope) in ast.modules.iter().zip(&module_scopes) {
        if tc.collect_module(module, scope).is_err() {
            collect_failed = true;
        }
    }

    let mut cg = CodeGen::new(tc);
    cg.had_errors = collect_failed;

    // ------------------------------------------------------------------
    // Start code: global variable initialization, the call to main, END.
    // ------------------------------------------------------------------
    debug!("generating program start code");
    cg.proc_starts.push((None, cg.code.next_id()));
    let mut start = CGResult::new();
    cg.push_comment(&mut start, "start of global code");

    let mut pending_globals: Vec<PendingGlobal> = Vec::new();
    for (module, &scope) in ast.modules.iter().zip(&module_scopes) {
        cg.tc.scope = scope;
        cg.tc.file = module.file;
        for decl in &module.decls {
            let var_decl = match decl {
                GlobalDecl::Var(var_decl) => var_decl,
                _ => continue,
            };
            let ty = match cg.tc.visit_stmt_decl(var_decl) {
                Ok(ty) => ty,
                Err(_) => {
                    cg.had_errors = true;
                    continue;
                }
            };

            for var_init in &var_decl.inits {
                match cg.cg_global_var_decl(&mut start, ty, var_init, scope, module.file) {
                    Ok(pending) => pending_globals.push(pending),
                    Err(_) => cg.had_errors = true,
                }
            }
        }
    }

    // Call main.
    let main_scope = *module_scopes.last().expect("at least one module");
    cg.tc.scope = main_scope;
    let main_sym = cg.find_main(main_scope);
    match main_sym {
        Some(main_sym) => {
            let call = cg.push_imop(Imop::new(Opcode::Call, [Some(main_sym), None]));
            start.patch_first_imop(Some(call));
            {
                let pending = start.take_next_list();
                cg.patch_jumps(&pending, call);
            }
            cg.calls_to.entry(main_sym).or_default().push(call);
            let call_label = cg.tc.st.label(cg.tc.cxt, call);
            cg.push_imop(Imop::new(Opcode::RetClean, [None, None, Some(call_label)]));
            cg.push_imop(Imop::new(Opcode::End, []));
        }
        None => {
            let _ = cg.tc.fatal(Span::dummy(), "no main procedure found");
            cg.had_errors = true;
        }
    }

    // ------------------------------------------------------------------
    // Global initializer procedures.
    // ------------------------------------------------------------------
    for pending in pending_globals {
        if cg.cg_global_init_proc(&pending).is_err() {
            cg.had_errors = true;
        }
    }

    // ------------------------------------------------------------------
    // Procedure bodies, module by module.
    // ------------------------------------------------------------------
    for (module, &scope) in ast.modules.iter().zip(&module_scopes) {
        for decl in &module.decls {
            let proc = match decl {
                GlobalDecl::Proc(proc) => proc,
                _ => continue,
            };
            let sym = match cg.tc.proc_symbol(proc.id) {
                Some(sym) => sym,
                None => {
                    // The signature failed to elaborate.
                    cg.had_errors = true;
                    continue;
                }
            };
            if cg.cg_proc_def(proc, sym, scope, module.file).is_err() {
                cg.had_errors = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // Drain the template instantiation worklist; elaborating an instance
    // body may queue further instances.
    // ------------------------------------------------------------------
    while let Some((inst, info)) = cg.tc.instantiator.pop_for_instantiation() {
        let sym = match info.symbol {
            Some(sym) => sym,
            None => continue,
        };
        debug!(instance = ?inst.args, "generating template instance");
        if cg.cg_proc_def(&info.body, sym, info.scope, info.file).is_err() {
            cg.had_errors = true;
        }
    }

    let failed = cg.had_errors || cg.tc.log.has_errors();
    let CodeGen {
        code, proc_starts, ..
    } = cg;

    if failed {
        return Err(TypeError);
    }

    Ok(Program::build(code, &proc_starts, &mut cxt.symbols))
}

impl<'a> CodeGen<'a> {
    /// The `void main()` procedure of the main module.
    pub fn find_main(&mut self, scope: ScopeId) -> Option<SymbolId> {
        let name = self.tc.cxt.interner.intern("main");
        self.tc
            .st
            .find_all(self.tc.cxt, scope, SymCategory::Procedure, name)
            .into_iter()
            .find(|&sym| {
                let ty = self.tc.cxt.symbol(sym).ty;
                match ty.map(|ty| self.tc.cxt.ty(ty)) {
                    Some(Type::Proc { params, ret }) => {
                        params.is_empty() && self.tc.cxt.is_void(*ret)
                    }
                    _ => false,
                }
            })
    }

    /// Create the global variable and its initializer procedure symbol,
    /// and emit the start-code call that fills the variable.
    fn cg_global_var_decl(
        &mut self,
        start: &mut CGResult,
        ty: TypeId,
        var_init: &VarInit,
        module_scope: ScopeId,
        file: FileId,
    ) -> Result<PendingGlobal, TypeError> {
        // The global itself.
        let global_sym = self
            .tc
            .cxt
            .make_variable(var_init.name.name, ty, false, true);
        {
            let symbol = self.tc.cxt.symbol_mut(global_sym);
            symbol.file = file;
            symbol.span = var_init.span;
        }
        self.tc.st.append_symbol(module_scope, global_sym);

        // Its initializer procedure.
        let proc_name = {
            let base = self.tc.cxt.interner.resolve(var_init.name.name).to_owned();
            self.tc.cxt.interner.intern(&format!("__global_init_{base}"))
        };
        let proc_ty = self.tc.cxt.ty_proc(Vec::new(), ty);
        let proc_sym = self.tc.cxt.symbols.alloc(scc_core::Symbol {
            name: proc_name,
            ty: Some(proc_ty),
            kind: SymbolKind::Procedure(Box::new(scc_core::symbol::ProcedureInfo {
                target: None,
                decl: None,
                block: None,
            })),
            file,
            span: var_init.span,
        });
        self.tc.st.append_symbol(GLOBAL_SCOPE, proc_sym);

        // Start code: call the initializer and pop the components.
        self.push_comment(start, "global variable initialization");
        let call = self.push_imop(Imop::new(Opcode::Call, [Some(proc_sym), None]));
        start.patch_first_imop(Some(call));
        {
            let pending = start.take_next_list();
            self.patch_jumps(&pending, call);
        }
        self.calls_to.entry(proc_sym).or_default().push(call);
        let call_label = self.tc.st.label(self.tc.cxt, call);
        self.push_imop(Imop::new(Opcode::RetClean, [None, None, Some(call_label)]));
        for component in scc_core::flatten_symbol(&self.tc.cxt.symbols, global_sym) {
            self.push_imop(Imop::new(Opcode::Param, [Some(component)]));
        }
        self.codegen_size(start, global_sym);

        Ok(PendingGlobal {
            proc_sym,
            global_sym,
            ty,
            var_init: var_init.clone(),
            module_scope,
            file,
        })
    }

    /// Emit the body of one `__global_init_*` procedure: evaluate the
    /// initializer into a local and return its flattened components.
    fn cg_global_init_proc(&mut self, pending: &PendingGlobal) -> Result<(), TypeError> {
        let entry = self.code.next_id();
        self.proc_starts.push((Some(pending.proc_sym), entry));

        let mut result = CGResult::new();
        self.push_comment(&mut result, "global variable initialization function");
        if let SymbolKind::Procedure(info) = &mut self.tc.cxt.symbol_mut(pending.proc_sym).kind {
            info.target = Some(entry);
        }

        let saved_scope = self.tc.scope;
        let saved_file = self.tc.file;
        let saved_proc = self.tc.current_proc;
        self.tc.scope = self.tc.st.new_scope(pending.module_scope);
        self.tc.file = pending.file;
        self.tc.current_proc = Some(CurrentProc {
            symbol: pending.proc_sym,
            ret: pending.ty,
        });

        let body = self.cg_var_init(pending.ty, &pending.var_init, VarInitMode::Local);
        let status = match body {
            Ok(body) => {
                let local = body.symbol().expect("initialized local");
                self.append(&mut result, body);

                let mut rets = Vec::new();
                for component in scc_core::flatten_symbol(&self.tc.cxt.symbols, local) {
                    rets.push(self.copy_non_temporary(&mut result, component));
                }
                self.release_proc_variables(&mut result, Some(local));

                let label = self.tc.st.label(self.tc.cxt, entry);
                let mut args = vec![Some(label)];
                args.extend(rets.into_iter().map(Some));
                self.push_imop_after(&mut result, Imop::new(Opcode::Return, args));
                Ok(())
            }
            Err(err) => {
                // Keep the procedure well formed for the block builder.
                let label = self.tc.st.label(self.tc.cxt, entry);
                self.push_imop_after(&mut result, Imop::new(Opcode::Return, [Some(label)]));
                Err(err)
            }
        };

        self.tc.scope = saved_scope;
        self.tc.file = saved_file;
        self.tc.current_proc = saved_proc;
        let _ = pending.global_sym;
        status
    }

    /// Emit one procedure body (a source definition or a template
    /// instance whose signature symbol already exists).
    pub fn cg_proc_def(
        &mut self,
        decl: &Rc<ProcDef>,
        sym: SymbolId,
        parent_scope: ScopeId,
        file: FileId,
    ) -> Result<(), TypeError> {
        let entry = self.code.next_id();
        self.proc_starts.push((Some(sym), entry));

        let mut result = CGResult::new();
        let title = {
            let name = self.tc.cxt.interner.resolve(self.tc.cxt.symbol(sym).name);
            format!("procedure {name}")
        };
        self.push_comment(&mut result, &title);
        if let SymbolKind::Procedure(info) = &mut self.tc.cxt.symbol_mut(sym).kind {
            info.target = Some(entry);
        }

        let proc_ty = self.tc.cxt.symbol(sym).ty.expect("procedure type");
        let ret = match self.tc.cxt.ty(proc_ty) {
            Type::Proc { ret, .. } => *ret,
            _ => return Err(TypeError),
        };

        let saved_scope = self.tc.scope;
        let saved_file = self.tc.file;
        let saved_proc = self.tc.current_proc;
        self.tc.scope = self.tc.st.new_scope(parent_scope);
        self.tc.file = file;
        self.tc.current_proc = Some(CurrentProc { symbol: sym, ret });

        let status = self.cg_proc_body(&mut result, decl, sym, ret, entry);

        self.tc.scope = saved_scope;
        self.tc.file = saved_file;
        self.tc.current_proc = saved_proc;
        status
    }

    fn cg_proc_body(
        &mut self,
        result: &mut CGResult,
        decl: &Rc<ProcDef>,
        _sym: SymbolId,
        ret: TypeId,
        entry: scc_core::ImopId,
    ) -> Result<(), TypeError> {
        // Pop the parameters.
        for param in &decl.params {
            let param_result = self.cg_stmt_decl(param, VarInitMode::ProcParam)?;
            self.append(result, param_result.result);
        }

        let body = self.cg_stmt(&decl.body);
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                self.had_errors = true;
                // Close the range with a return so block construction
                // stays sound.
                let label = self.tc.st.label(self.tc.cxt, entry);
                self.push_imop_after(result, Imop::new(Opcode::Return, [Some(label)]));
                return Err(err);
            }
        };

        let falls_through = body.may_fall_through();
        let flags = body.flags;
        self.append(result, body.result);

        if falls_through {
            if !self.tc.cxt.is_void(ret) {
                return Err(self.tc.fatal(
                    decl.span,
                    "procedure does not return a value on every code path",
                ));
            }
            self.release_proc_variables(result, None);
            let label = self.tc.st.label(self.tc.cxt, entry);
            self.push_imop_after(result, Imop::new(Opcode::Return, [Some(label)]));
        }

        debug_assert!(!flags.is_empty());
        Ok(())
    }
}
