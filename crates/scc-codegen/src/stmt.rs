//! Statement lowering.
//!
//! Each statement elaborates itself through the checker before lowering.
//! A failed statement reports, marks the generator, and lets its
//! siblings continue, so one run collects as many diagnostics as the
//! program deserves.

use crate::codegen::CodeGen;
use crate::result::{CGBranchResult, CGResult, CGStmtResult, StmtFlags};
use scc_ast::{Expr, ForInit, Stmt, StmtKind, VarDecl, VarInit};
use scc_checker::TypeError;
use scc_common::{FileId, Span};
use scc_core::{Imop, Opcode, SymbolId, TypeId};

/// How a declaration is being lowered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarInitMode {
    Local,
    Global,
    ProcParam,
}

impl<'a> CodeGen<'a> {
    pub fn cg_stmt(&mut self, s: &Stmt) -> Result<CGStmtResult, TypeError> {
        let saved_span = self.node_span;
        self.node_span = s.span;
        let result = self.cg_stmt_inner(s);
        self.node_span = saved_span;
        result
    }

    fn cg_stmt_inner(&mut self, s: &Stmt) -> Result<CGStmtResult, TypeError> {
        match &s.kind {
            StmtKind::Compound(stmts) => self.cg_stmt_compound(s, stmts),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.cg_stmt_if(cond, then_branch, else_branch.as_deref()),
            StmtKind::While { cond, body } => self.cg_stmt_while(s, cond, body),
            StmtKind::DoWhile { body, cond } => self.cg_stmt_dowhile(s, body, cond),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.cg_stmt_for(s, init.as_deref(), cond.as_ref(), step.as_ref(), body),
            StmtKind::Decl(decl) => self.cg_stmt_decl(decl, VarInitMode::Local),
            StmtKind::Expr(e) => self.cg_stmt_expr(e),
            StmtKind::Return(e) => self.cg_stmt_return(s.span, e.as_ref()),
            StmtKind::Break => self.cg_stmt_break(s.span),
            StmtKind::Continue => self.cg_stmt_continue(s.span),
            StmtKind::Print(exprs) => self.cg_stmt_print(exprs),
            StmtKind::Assert(e) => self.cg_stmt_assert(e),
        }
    }

    fn cg_stmt_compound(&mut self, s: &Stmt, stmts: &[Stmt]) -> Result<CGStmtResult, TypeError> {
        let mut result = CGStmtResult::new();
        self.new_scope();

        for child in stmts {
            let child_result = match self.cg_stmt(child) {
                Ok(res) => res,
                Err(_) => {
                    self.had_errors = true;
                    continue;
                }
            };

            if child_result.first_imop().is_none()
                && !matches!(child.kind, StmtKind::Decl(_) | StmtKind::Compound(_))
            {
                let _ = self.tc.fatal(child.span, "statement with no effect");
                self.had_errors = true;
                continue;
            }

            if !result.flags.contains(StmtFlags::FALLTHRU) {
                let _ = self.tc.fatal(child.span, "unreachable statement");
                self.had_errors = true;
                continue;
            }

            let child_flags = child_result.flags;
            self.append_stmt(&mut result, child_result);
            result.flags = (result.flags - StmtFlags::FALLTHRU) | child_flags;
        }

        if result.may_fall_through() {
            let mut release = CGResult::new();
            self.release_scope_variables(&mut release);
            self.append(&mut result.result, release);
        }

        self.pop_scope();
        let _ = s;
        Ok(result)
    }

    fn cg_stmt_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<CGStmtResult, TypeError> {
        self.tc.check_public_boolean_scalar(cond)?;

        let mut result = CGStmtResult::new();
        let branch = self.cg_branch(cond)?;
        let CGBranchResult {
            result: cond_result,
            true_list,
            false_list,
        } = branch;
        self.append(&mut result.result, cond_result);

        self.new_scope();
        let true_result = self.cg_stmt(then_branch)?;
        self.pop_scope();

        let true_flags = true_result.flags;
        match true_result.first_imop() {
            Some(first) => {
                self.patch_jumps(&true_list, first);
                let mut true_result = true_result;
                result
                    .result
                    .extend_next_list(true_result.result.take_next_list());
                result.break_list.append(&mut true_result.break_list);
                result
                    .continue_list
                    .append(&mut true_result.continue_list);
            }
            None => {
                result.result.extend_next_list(true_list);
            }
        }

        match else_branch {
            None => {
                result.result.extend_next_list(false_list);
                result.flags = true_flags | StmtFlags::FALLTHRU;
            }
            Some(else_branch) => {
                // Jump over the else branch when the then branch falls
                // through.
                let skip = if true_flags.contains(StmtFlags::FALLTHRU) {
                    let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));
                    let pending = result.result.take_next_list();
                    self.patch_jumps(&pending, skip);
                    result.result.add_to_next_list(skip);
                    Some(skip)
                } else {
                    None
                };
                let _ = skip;

                self.new_scope();
                let false_result = self.cg_stmt(else_branch)?;
                self.pop_scope();

                match false_result.first_imop() {
                    Some(first) => {
                        self.patch_jumps(&false_list, first);
                        let mut false_result = false_result;
                        result
                            .result
                            .extend_next_list(false_result.result.take_next_list());
                        result.break_list.append(&mut false_result.break_list);
                        result
                            .continue_list
                            .append(&mut false_result.continue_list);
                        result.flags = true_flags | false_result.flags;
                    }
                    None => {
                        result.result.extend_next_list(false_list);
                        result.flags = true_flags | StmtFlags::FALLTHRU;
                    }
                }
            }
        }

        Ok(result)
    }

    fn cg_stmt_while(
        &mut self,
        s: &Stmt,
        cond: &Expr,
        body: &Stmt,
    ) -> Result<CGStmtResult, TypeError> {
        self.tc.check_public_boolean_scalar(cond)?;

        let mut result = CGStmtResult::new();
        let branch = self.cg_branch(cond)?;
        let cond_first = branch.first_imop().ok_or(TypeError)?;
        let CGBranchResult {
            result: cond_result,
            true_list,
            false_list,
        } = branch;
        self.append(&mut result.result, cond_result);

        self.new_scope();
        self.start_loop();
        let body_result = self.cg_stmt(body);
        self.end_loop();
        self.pop_scope();
        let mut body_result = body_result?;

        if !body_result
            .flags
            .intersects(StmtFlags::FALLTHRU | StmtFlags::CONTINUE)
        {
            return Err(self.tc.fatal(s.span, "while loop does not loop"));
        }

        match body_result.first_imop() {
            Some(first) => self.patch_jumps(&true_list, first),
            None => return Err(self.tc.fatal(s.span, "empty loop body")),
        }

        // Back edge to the condition.
        let back = self.push_imop(Imop::new(Opcode::Jump, [None]));
        {
            let pending = body_result.result.take_next_list();
            self.patch_jumps(&pending, back);
        }
        self.patch_jumps(&[back], cond_first);
        self.patch_jumps(&body_result.continue_list, cond_first);

        result.result.set_next_list(false_list);
        result
            .result
            .extend_next_list(body_result.break_list.drain(..));

        result.flags = (body_result.flags - StmtFlags::BREAK - StmtFlags::CONTINUE)
            | StmtFlags::FALLTHRU;
        Ok(result)
    }

    fn cg_stmt_dowhile(
        &mut self,
        s: &Stmt,
        body: &Stmt,
        cond: &Expr,
    ) -> Result<CGStmtResult, TypeError> {
        self.new_scope();
        self.start_loop();
        let body_result = self.cg_stmt(body);
        self.end_loop();
        self.pop_scope();
        let mut body_result = body_result?;

        let body_first = match body_result.first_imop() {
            Some(first) => first,
            None => return Err(self.tc.fatal(s.span, "empty loop body")),
        };
        if !body_result
            .flags
            .intersects(StmtFlags::FALLTHRU | StmtFlags::CONTINUE)
        {
            return Err(self.tc.fatal(s.span, "do-while loop does not loop"));
        }

        self.tc.check_public_boolean_scalar(cond)?;
        let branch = self.cg_branch(cond)?;
        let cond_first = branch.first_imop().ok_or(TypeError)?;
        let CGBranchResult {
            result: mut cond_result,
            true_list,
            false_list,
        } = branch;

        // Fallthrough of the body reaches the condition.
        {
            let pending = body_result.result.take_next_list();
            self.patch_jumps(&pending, cond_first);
        }
        self.patch_jumps(&body_result.continue_list, cond_first);
        self.patch_jumps(&true_list, body_first);

        let mut result = CGStmtResult::new();
        result.result.patch_first_imop(Some(body_first));
        result.result.extend_next_list(cond_result.take_next_list());
        result.result.extend_next_list(false_list);
        result
            .result
            .extend_next_list(body_result.break_list.drain(..));
        result.flags = (body_result.flags - StmtFlags::BREAK - StmtFlags::CONTINUE)
            | StmtFlags::FALLTHRU;
        Ok(result)
    }

    fn cg_stmt_for(
        &mut self,
        s: &Stmt,
        init: Option<&ForInit>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
    ) -> Result<CGStmtResult, TypeError> {
        let mut result = CGStmtResult::new();
        let mut created_scope = false;
        let mut init_temp: Option<SymbolId> = None;

        match init {
            Some(ForInit::Expr(e)) => {
                self.tc
                    .visit_expr(e, scc_checker::TypeContext::new())
                    .map(|_| ())?;
                let ty = self.tc.expr_type(e.id).ok_or(TypeError)?;
                let _ = self.tc.default_instantiate(e, ty)?;
                let e_result = self.cg_expr(e)?;
                init_temp = e_result.symbol();
                self.append(&mut result.result, e_result);
            }
            Some(ForInit::Decl(decl)) => {
                self.new_scope();
                created_scope = true;
                let decl_result = self.cg_stmt_decl(decl, VarInitMode::Local)?;
                self.append_stmt(&mut result, decl_result);
            }
            None => {}
        }

        // Conditional expression.
        let mut cond_branch: Option<CGBranchResult> = None;
        if let Some(cond) = cond {
            self.tc.check_public_boolean_scalar(cond)?;
            let branch = self.cg_branch(cond)?;
            let mut cond_acc = CGResult::new();
            cond_acc.patch_first_imop(branch.first_imop());
            self.append(&mut result.result, cond_acc);
            cond_branch = Some(branch);
        }

        // Loop body.
        self.new_scope();
        self.start_loop();
        let body_result = self.cg_stmt(body);
        self.end_loop();
        self.pop_scope();
        let mut body_result = body_result?;

        if !body_result
            .flags
            .intersects(StmtFlags::FALLTHRU | StmtFlags::CONTINUE)
        {
            if created_scope {
                self.pop_scope();
            }
            return Err(self.tc.fatal(s.span, "for loop does not loop"));
        }
        if cond.is_none()
            && !body_result
                .flags
                .intersects(StmtFlags::BREAK | StmtFlags::RETURN)
        {
            if created_scope {
                self.pop_scope();
            }
            return Err(self.tc.fatal(s.span, "for loop is clearly infinite"));
        }

        // Step expression.
        let mut step_result = CGResult::new();
        if let Some(step) = step {
            self.tc
                .visit_expr(step, scc_checker::TypeContext::new())
                .map(|_| ())?;
            let ty = self.tc.expr_type(step.id).ok_or(TypeError)?;
            let _ = self.tc.default_instantiate(step, ty)?;
            let e_result = self.cg_expr(step)?;
            let step_sym = e_result.symbol();
            self.append(&mut step_result, e_result);
            if let Some(sym) = step_sym {
                self.release_temporary(&mut step_result, sym, None);
            }
        }

        // Next-iteration jump, back to the condition (or the body when
        // there is none).
        let back = self.push_imop(Imop::new(Opcode::Jump, [None]));
        {
            let pending = step_result.take_next_list();
            self.patch_jumps(&pending, back);
        }
        step_result.patch_first_imop(Some(back));

        let body_first = body_result.first_imop();
        let iter_first = step_result.first_imop().expect("next-iteration jump");
        let loop_head = match (&cond_branch, body_first) {
            (Some(branch), _) => branch.first_imop().expect("condition code"),
            (None, Some(first)) => first,
            (None, None) => iter_first,
        };
        self.patch_jumps(&[back], loop_head);

        if let Some(branch) = cond_branch {
            if let Some(first) = body_first {
                self.patch_jumps(&branch.true_list, first);
            } else {
                self.patch_jumps(&branch.true_list, iter_first);
            }
            result.result.extend_next_list(branch.false_list);
        }

        {
            let pending = body_result.result.take_next_list();
            self.patch_jumps(&pending, iter_first);
        }
        self.patch_jumps(&body_result.continue_list, iter_first);
        result
            .result
            .extend_next_list(body_result.break_list.drain(..));

        if created_scope {
            let mut release = CGResult::new();
            self.release_scope_variables(&mut release);
            self.append(&mut result.result, release);
            self.pop_scope();
        } else if let Some(temp) = init_temp {
            let mut release = CGResult::new();
            self.release_temporary(&mut release, temp, None);
            self.append(&mut result.result, release);
        }

        result.flags = (body_result.flags - StmtFlags::BREAK - StmtFlags::CONTINUE)
            | StmtFlags::FALLTHRU;
        Ok(result)
    }

    fn cg_stmt_expr(&mut self, e: &Expr) -> Result<CGStmtResult, TypeError> {
        self.tc
            .visit_expr(e, scc_checker::TypeContext::new())
            .map(|_| ())?;
        let ty = self.tc.expr_type(e.id).ok_or(TypeError)?;
        if !self.tc.cxt.is_void(ty) {
            let _ = self.tc.default_instantiate(e, ty)?;
        }

        let mut result = CGStmtResult::new();
        let e_result = self.cg_expr(e)?;
        let sym = e_result.symbol();
        self.append(&mut result.result, e_result);
        if let Some(sym) = sym {
            let mut release = CGResult::new();
            self.release_temporary(&mut release, sym, None);
            self.append(&mut result.result, release);
        }
        Ok(result)
    }

    fn cg_stmt_return(
        &mut self,
        span: Span,
        expr: Option<&Expr>,
    ) -> Result<CGStmtResult, TypeError> {
        self.tc.visit_stmt_return(span, expr)?;
        let current = self.tc.current_proc.expect("return inside a procedure");
        let target = self
            .tc
            .cxt
            .symbol(current.symbol)
            .procedure()
            .and_then(|info| info.target)
            .expect("procedure entry");

        let mut result = CGStmtResult::new();
        result.flags = StmtFlags::RETURN;

        match expr {
            None => {
                self.release_proc_variables(&mut result.result, None);
                let label = self.tc.st.label(self.tc.cxt, target);
                self.push_imop_after(
                    &mut result.result,
                    Imop::new(Opcode::Return, [Some(label)]),
                );
            }
            Some(e) => {
                let e_result = self.cg_expr(e)?;
                let value = e_result.symbol().expect("returned value");
                self.append(&mut result.result, e_result);

                let mut rets = Vec::new();
                for component in scc_core::flatten_symbol(&self.tc.cxt.symbols, value) {
                    rets.push(self.copy_non_temporary(&mut result.result, component));
                }

                self.release_proc_variables(&mut result.result, Some(value));

                let label = self.tc.st.label(self.tc.cxt, target);
                let mut args = vec![Some(label)];
                args.extend(rets.into_iter().map(Some));
                self.push_imop_after(&mut result.result, Imop::new(Opcode::Return, args));
            }
        }

        Ok(result)
    }

    fn cg_stmt_break(&mut self, span: Span) -> Result<CGStmtResult, TypeError> {
        let loop_scope = match self.loop_scope() {
            Some(scope) => scope,
            None => {
                return Err(self
                    .tc
                    .fatal(span, "break statement not embedded in a loop"))
            }
        };

        let mut result = CGStmtResult::new();
        self.release_variables_up_to(&mut result.result, Some(loop_scope));
        let jump = self.push_imop(Imop::new(Opcode::Jump, [None]));
        result.result.patch_first_imop(Some(jump));
        result.break_list.push(jump);
        result.flags = StmtFlags::BREAK;
        Ok(result)
    }

    fn cg_stmt_continue(&mut self, span: Span) -> Result<CGStmtResult, TypeError> {
        let loop_scope = match self.loop_scope() {
            Some(scope) => scope,
            None => {
                return Err(self
                    .tc
                    .fatal(span, "continue statement not embedded in a loop"))
            }
        };

        let mut result = CGStmtResult::new();
        self.release_variables_up_to(&mut result.result, Some(loop_scope));
        let jump = self.push_imop(Imop::new(Opcode::Jump, [None]));
        result.result.patch_first_imop(Some(jump));
        result.continue_list.push(jump);
        result.flags = StmtFlags::CONTINUE;
        Ok(result)
    }

    fn cg_stmt_print(&mut self, exprs: &[Expr]) -> Result<CGStmtResult, TypeError> {
        self.tc.visit_stmt_print(exprs)?;

        let mut result = CGStmtResult::new();
        let string_ty = self.string_type();
        let mut accum: Option<SymbolId> = None;
        for e in exprs {
            let e_result = self.cg_expr(e)?;
            let sym = e_result.symbol().expect("printed value");
            self.append(&mut result.result, e_result);

            let sym_ty = self.tc.cxt.symbol(sym).ty.expect("value type");
            let as_string = if self.tc.cxt.is_string_type(sym_ty) {
                sym
            } else {
                let temp = self.new_temporary(string_ty);
                self.push_imop_after(
                    &mut result.result,
                    Imop::new(Opcode::ToString, [Some(temp), Some(sym)]),
                );
                temp
            };

            accum = match accum {
                None => Some(as_string),
                Some(prev) => {
                    let joined = self.new_temporary(string_ty);
                    self.push_imop_after(
                        &mut result.result,
                        Imop::new(Opcode::Add, [Some(joined), Some(prev), Some(as_string)]),
                    );
                    let mut release = CGResult::new();
                    self.release_temporary(&mut release, as_string, None);
                    self.release_temporary(&mut release, prev, None);
                    self.append(&mut result.result, release);
                    Some(joined)
                }
            };
        }

        let accum = accum.expect("print with no arguments");
        self.push_imop_after(
            &mut result.result,
            Imop::new(Opcode::Print, [None, Some(accum)]),
        );
        let mut release = CGResult::new();
        self.release_temporary(&mut release, accum, None);
        self.append(&mut result.result, release);
        Ok(result)
    }

    fn cg_stmt_assert(&mut self, e: &Expr) -> Result<CGStmtResult, TypeError> {
        self.tc.check_public_boolean_scalar(e)?;

        let branch = self.cg_branch(e)?;
        let mut result = CGStmtResult::new();
        result.result.patch_first_imop(branch.first_imop());

        let mut fail = CGResult::new();
        self.release_variables_up_to(&mut fail, None);
        let err = self.new_error("assert failed", e.span);
        fail.patch_first_imop(Some(err));

        let fail_first = fail.first_imop().expect("assert failure code");
        self.patch_jumps(&branch.false_list, fail_first);
        result.result.extend_next_list(branch.true_list);
        Ok(result)
    }

    /*******************************************************************
      Declarations
    *******************************************************************/

    pub fn cg_stmt_decl(
        &mut self,
        decl: &VarDecl,
        mode: VarInitMode,
    ) -> Result<CGStmtResult, TypeError> {
        let ty = self.tc.visit_stmt_decl(decl)?;

        let mut result = CGStmtResult::new();
        for var_init in &decl.inits {
            let init_result = self.cg_var_init(ty, var_init, mode)?;
            self.append(&mut result.result, init_result);
        }
        Ok(result)
    }

    pub fn cg_var_init(
        &mut self,
        ty: TypeId,
        var_init: &VarInit,
        mode: VarInitMode,
    ) -> Result<CGResult, TypeError> {
        self.tc.check_var_init(ty, var_init)?;

        let is_global = mode == VarInitMode::Global;
        let sym = self
            .tc
            .cxt
            .make_variable(var_init.name.name, ty, false, is_global);
        {
            let file = self.tc.file;
            let symbol = self.tc.cxt.symbol_mut(sym);
            symbol.file = file;
            symbol.span = var_init.span;
        }
        self.tc.st.append_symbol(self.tc.scope, sym);

        let mut result = CGResult::with_symbol(sym);
        let info = self.tc.cxt.symbol(sym).variable().cloned().expect("variable");
        let is_scalar = self.tc.cxt.is_scalar(ty);
        let has_shape = !var_init.shape.is_empty();

        // Evaluate the declared shape, maintaining the size invariant.
        if has_shape {
            if !is_scalar {
                let one = self.index_constant(1);
                let size = info.size.expect("size symbol");
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::Assign, [Some(size), Some(one)]),
                );
            }
            for (shape_expr, dim_sym) in var_init.shape.iter().zip(&info.dims) {
                let e_result = self.cg_expr(shape_expr)?;
                let value = e_result.symbol().expect("shape value");
                self.append(&mut result, e_result);
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::Assign, [Some(*dim_sym), Some(value)]),
                );
                let size = info.size.expect("size symbol");
                self.push_imop(Imop::new(Opcode::Mul, [Some(size), Some(size), Some(value)]));
            }
        } else if mode != VarInitMode::ProcParam && !is_scalar {
            let zero = self.index_constant(0);
            let size = info.size.expect("size symbol");
            self.push_imop_after(&mut result, Imop::new(Opcode::Assign, [Some(size), Some(zero)]));
            for dim_sym in &info.dims {
                self.push_imop(Imop::new(Opcode::Assign, [Some(*dim_sym), Some(zero)]));
            }
        }

        if mode == VarInitMode::ProcParam {
            self.cg_proc_param(&mut result, sym);
            return Ok(result);
        }

        match &var_init.init {
            Some(init) => {
                let e_result = self.cg_expr(init)?;
                let value = e_result.symbol().expect("initializer value");
                self.append(&mut result, e_result);
                self.cg_initialize_to_symbol(&mut result, sym, value, has_shape, var_init.span)?;
            }
            None => {
                self.cg_initialize_to_default(&mut result, sym, has_shape);
            }
        }

        Ok(result)
    }

    /// Pop a parameter from the call stack: dims first, the value last,
    /// then recompute the size.
    pub fn cg_proc_param(&mut self, result: &mut CGResult, sym: SymbolId) {
        let info = match self.tc.cxt.symbol(sym).variable() {
            Some(info) => info.clone(),
            None => return,
        };

        if !info.fields.is_empty() {
            for field in info.fields {
                self.cg_proc_param(result, field);
            }
            return;
        }

        for dim in &info.dims {
            self.push_imop_after(result, Imop::new(Opcode::Param, [Some(*dim)]));
        }
        self.push_imop_after(result, Imop::new(Opcode::Param, [Some(sym)]));

        if let Some(size) = info.size {
            let one = self.index_constant(1);
            self.push_imop(Imop::new(Opcode::Assign, [Some(size), Some(one)]));
            for dim in &info.dims {
                self.push_imop(Imop::new(Opcode::Mul, [Some(size), Some(size), Some(*dim)]));
            }
        }
    }

    /// Initialize a declared variable from an evaluated right-hand side.
    pub fn cg_initialize_to_symbol(
        &mut self,
        result: &mut CGResult,
        lhs: SymbolId,
        rhs: SymbolId,
        has_shape: bool,
        span: Span,
    ) -> Result<(), TypeError> {
        let lhs_ty = self.tc.cxt.symbol(lhs).ty.expect("variable type");

        // Struct initialization recurses into the fields.
        let lhs_fields = self
            .tc
            .cxt
            .symbol(lhs)
            .variable()
            .map(|i| i.fields.clone())
            .unwrap_or_default();
        if !lhs_fields.is_empty() {
            let rhs_fields = self
                .tc
                .cxt
                .symbol(rhs)
                .variable()
                .map(|i| i.fields.clone())
                .unwrap_or_default();
            for (l, r) in lhs_fields.iter().zip(&rhs_fields) {
                self.cg_initialize_to_symbol(result, *l, *r, false, span)?;
            }
            return Ok(());
        }

        let mut rhs = rhs;
        let rhs_ty = self.tc.cxt.symbol(rhs).ty.expect("value type");
        let lhs_sec = self.tc.cxt.sec_of(lhs_ty);
        if self.tc.cxt.is_public_type(rhs_ty) && !self.tc.cxt.is_public_sec(lhs_sec) {
            let (_, data, rdim) = self.tc.cxt.basic_parts(rhs_ty).expect("basic");
            let classified = self.tc.cxt.ty_basic(lhs_sec, data, rdim);
            rhs = self.classify_into(result, rhs, classified);
        }

        let lhs_dim = self.tc.cxt.dim_of(lhs_ty);
        let rhs_ty = self.tc.cxt.symbol(rhs).ty.expect("value type");
        let rhs_dim = self.tc.cxt.dim_of(rhs_ty);

        if has_shape {
            if lhs_dim > rhs_dim {
                // Fill the declared shape with the scalar value.
                let size = self.get_size_or(lhs, 0);
                self.push_imop_after(
                    result,
                    Imop::new(Opcode::Alloc, [Some(lhs), Some(size), Some(rhs)]),
                );
                self.release_temporary(result, rhs, None);
            } else {
                // The shapes must agree at runtime.
                let lhs_info = self.tc.cxt.symbol(lhs).variable().cloned().expect("array");
                let rhs_info = self.tc.cxt.symbol(rhs).variable().cloned().expect("array");
                let bool_ty = self.bool_type();
                let guard = self.new_temporary(bool_ty);
                let mut fails = Vec::new();
                for (l, r) in lhs_info.dims.iter().zip(&rhs_info.dims) {
                    self.push_imop_after(
                        result,
                        Imop::new(Opcode::Ne, [Some(guard), Some(*r), Some(*l)]),
                    );
                    fails.push(self.push_imop(Imop::new(Opcode::Jt, [None, Some(guard)])));
                }
                let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));
                let err = self.new_error("Shape mismatch", span);
                self.patch_jumps(&fails, err);
                let size = self.get_size_or(lhs, 0);
                let copy = self.push_imop(Imop::new(
                    Opcode::Copy,
                    [Some(lhs), Some(rhs), Some(size)],
                ));
                self.patch_jumps(&[skip], copy);
                self.release_temporary(result, rhs, None);
            }
        } else if lhs_dim > 0 {
            if lhs_dim > rhs_dim {
                // No declared shape: the array starts empty.
                let size = self.get_size_or(lhs, 0);
                self.push_imop_after(
                    result,
                    Imop::new(Opcode::Alloc, [Some(lhs), Some(size), Some(rhs)]),
                );
                self.release_temporary(result, rhs, None);
            } else {
                // Take over the shape of the right-hand side.
                self.copy_shape_from(result, lhs, rhs);
                let size = self.get_size_or(lhs, 0);
                self.push_imop_after(
                    result,
                    Imop::new(Opcode::Copy, [Some(lhs), Some(rhs), Some(size)]),
                );
                self.release_temporary(result, rhs, None);
            }
        } else {
            self.push_imop_after(result, Imop::new(Opcode::Declare, [Some(lhs)]));
            self.push_imop(Imop::new(Opcode::Assign, [Some(lhs), Some(rhs)]));
            self.release_temporary(result, rhs, None);
        }

        Ok(())
    }

    /// Initialize a declared variable to the language default.
    pub fn cg_initialize_to_default(
        &mut self,
        result: &mut CGResult,
        sym: SymbolId,
        has_shape: bool,
    ) {
        let ty = self.tc.cxt.symbol(sym).ty.expect("variable type");

        let fields = self
            .tc
            .cxt
            .symbol(sym)
            .variable()
            .map(|i| i.fields.clone())
            .unwrap_or_default();
        if !fields.is_empty() {
            for field in fields {
                self.cg_initialize_to_default(result, field, false);
            }
            return;
        }

        let (sec, data, dim) = self.tc.cxt.basic_parts(ty).expect("basic type");
        let default = if self.tc.cxt.data_type(data).is_user_primitive() {
            let public = self.tc.cxt.dtype_declassify(sec, data);
            public.and_then(|d| self.tc.cxt.default_constant(d))
        } else {
            self.tc.cxt.default_constant(data)
        };

        if dim == 0 {
            self.push_imop_after(result, Imop::new(Opcode::Declare, [Some(sym)]));
            if let Some(default) = default {
                let op = if self.tc.cxt.is_public_sec(sec) {
                    Opcode::Assign
                } else {
                    Opcode::Classify
                };
                self.push_imop(Imop::new(op, [Some(sym), Some(default)]));
            }
            return;
        }

        let _ = has_shape;
        let size = self.get_size_or(sym, 0);
        match default {
            Some(default) => {
                self.push_imop_after(
                    result,
                    Imop::new(Opcode::Alloc, [Some(sym), Some(size), Some(default)]),
                );
            }
            None => {
                self.push_imop_after(result, Imop::new(Opcode::Alloc, [Some(sym), Some(size)]));
            }
        }
    }

    /// Current file accessor used by the driver.
    pub fn file(&self) -> FileId {
        self.tc.file
    }
}
