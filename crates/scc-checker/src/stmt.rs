//! Statement-level checks. The code generator drives these while
//! lowering, statement by statement, so that declarations append their
//! symbols before the next statement elaborates.

use crate::checker::{TcResult, TypeChecker, TypeContext, TypeError};
use scc_ast::{Expr, Prim, VarDecl, VarInit};
use scc_common::Span;
use scc_core::TypeId;

impl<'a> TypeChecker<'a> {
    /// Conditions of `if`/`while`/`do`/`for`/`assert` and ternaries must
    /// be public bool scalars.
    pub fn check_public_boolean_scalar(&mut self, e: &Expr) -> TcResult<()> {
        let bool_data = self.cxt.dt_prim(Prim::Bool);
        let cx = TypeContext {
            sec: Some(self.cxt.sec_public()),
            data: Some(bool_data),
            dim: Some(0),
        };
        let ty = self.visit_expr(e, cx)?;
        if !self.cxt.is_public_bool_scalar(ty) {
            return Err(self.fatal(
                e.span,
                format!(
                    "conditional expression must be of type public bool, got {}",
                    self.cxt.type_string(ty)
                ),
            ));
        }
        Ok(())
    }

    /// Elaborate the declared type of a declaration statement.
    pub fn visit_stmt_decl(&mut self, decl: &VarDecl) -> TcResult<TypeId> {
        let ty = self.visit_type_expr(&decl.ty)?;
        if self.cxt.is_void(ty) {
            return Err(self.fatal(decl.span, "variables may not have void type"));
        }

        let (_, data, dim) = self.cxt.basic_parts(ty).expect("basic type");
        if self.cxt.data_type(data).is_string() && dim != 0 {
            return Err(self.fatal(decl.span, "string arrays are not supported"));
        }

        Ok(ty)
    }

    /// Validate one declarator against the declared type: shape arity and
    /// index types, initializer compatibility, redeclaration.
    pub fn check_var_init(&mut self, ty: TypeId, var_init: &VarInit) -> TcResult<()> {
        if self
            .st
            .defined_in_scope(self.cxt, self.scope, var_init.name.name)
        {
            let name = self.cxt.interner.resolve(var_init.name.name).to_owned();
            return Err(self.fatal(
                var_init.span,
                format!("redeclaration of variable '{name}'"),
            ));
        }

        let (_, _, dim) = self.cxt.basic_parts(ty).expect("basic type");
        if !var_init.shape.is_empty() && var_init.shape.len() != dim as usize {
            return Err(self.fatal(
                var_init.span,
                format!(
                    "mismatching number of shape components: expected {dim}, got {}",
                    var_init.shape.len()
                ),
            ));
        }
        for shape_expr in &var_init.shape {
            self.check_index_expr(shape_expr)?;
        }

        if let Some(init) = &var_init.init {
            let cx = TypeContext::of_type(self.cxt, ty);
            let init_ty = self.visit_expr(init, cx)?;
            if self.check_and_log_if_void(init, init_ty) {
                return Err(TypeError);
            }
            self.check_assign_compat(ty, init, init_ty, var_init.span, true)?;
        }

        Ok(())
    }

    /// A `return` statement against the enclosing procedure's signature.
    pub fn visit_stmt_return(&mut self, span: Span, expr: Option<&Expr>) -> TcResult<()> {
        let current = match self.current_proc {
            Some(current) => current,
            None => return Err(self.fatal(span, "return statement outside of a procedure")),
        };

        match (expr, self.cxt.is_void(current.ret)) {
            (None, true) => Ok(()),
            (None, false) => Err(self.fatal(
                span,
                "non-value return in a procedure returning a value",
            )),
            (Some(e), true) => Err(self.fatal(
                e.span,
                "value returned from a void procedure",
            )),
            (Some(e), false) => {
                let ret = current.ret;
                let cx = TypeContext::of_type(self.cxt, ret);
                let ty = self.visit_expr(e, cx)?;
                if self.check_and_log_if_void(e, ty) {
                    return Err(TypeError);
                }
                self.check_assign_compat(ret, e, ty, span, false)?;
                Ok(())
            }
        }
    }

    /// Every printed expression must stringify.
    pub fn visit_stmt_print(&mut self, exprs: &[Expr]) -> TcResult<()> {
        for e in exprs {
            let ty = self.visit_expr(e, TypeContext::new())?;
            if self.check_and_log_if_void(e, ty) {
                return Err(TypeError);
            }
            let ty = self.default_instantiate(e, ty)?;
            if !self.can_print_value(ty) {
                return Err(self.fatal(
                    e.span,
                    format!("cannot print a value of type {}", self.cxt.type_string(ty)),
                ));
            }
        }
        Ok(())
    }
}
