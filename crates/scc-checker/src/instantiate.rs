//! Resolution of polymorphic numeric literals.
//!
//! Sub-trees typed `numeric` / `numeric_float` are polymorphic at
//! elaboration. The enclosing context (assignment, declaration, return,
//! call) picks a concrete type by calling `instantiate_data_type`; when
//! nothing drives the choice the classes default to `int64` / `float64`.
//! The call cascades into children so that afterwards no sub-expression
//! carries an abstract numeric type.

use crate::checker::{TcResult, TypeChecker};
use scc_ast::{Expr, ExprKind, Prim};
use scc_core::types::lattice_prim_leq;
use scc_core::TypeId;

impl<'a> TypeChecker<'a> {
    /// Instantiate the expression's data type to `target` when the
    /// expression is polymorphic; returns the (possibly updated) type.
    pub fn instantiate_data_type(&mut self, e: &Expr, target: Option<Prim>) -> TcResult<TypeId> {
        let ty = match self.expr_type(e.id) {
            Some(ty) => ty,
            None => return Err(crate::checker::TypeError),
        };

        let (sec, data, dim) = match self.cxt.basic_parts(ty) {
            Some(parts) => parts,
            None => return Ok(ty),
        };
        let abstract_prim = match self.cxt.prim_of(data) {
            Some(p) if p.is_abstract_numeric() => p,
            _ => return Ok(ty),
        };

        let concrete = match target {
            Some(t) if !t.is_abstract_numeric() && lattice_prim_leq(abstract_prim, t) => t,
            _ => match abstract_prim {
                Prim::NumericFloat => Prim::Float64,
                _ => Prim::Int64,
            },
        };

        self.propagate_concrete(e, concrete);

        let new_data = self.cxt.dt_prim(concrete);
        let new_ty = self.cxt.ty_basic(sec, new_data, dim);
        Ok(new_ty)
    }

    /// Instantiate with the default when the type is polymorphic.
    pub fn default_instantiate(&mut self, e: &Expr, ty: TypeId) -> TcResult<TypeId> {
        match self.cxt.basic_parts(ty) {
            Some((_, data, _))
                if self
                    .cxt
                    .prim_of(data)
                    .map(|p| p.is_abstract_numeric())
                    .unwrap_or(false) =>
            {
                self.instantiate_data_type(e, None)
            }
            _ => Ok(ty),
        }
    }

    /// Rewrite the memoized type of a polymorphic node and cascade into
    /// the children that share its data type.
    fn propagate_concrete(&mut self, e: &Expr, concrete: Prim) {
        let ty = match self.expr_type(e.id) {
            Some(ty) => ty,
            None => return,
        };
        let (sec, data, dim) = match self.cxt.basic_parts(ty) {
            Some(parts) => parts,
            None => return,
        };
        match self.cxt.prim_of(data) {
            Some(p) if p.is_abstract_numeric() => {}
            _ => return,
        }

        let new_data = self.cxt.dt_prim(concrete);
        let new_ty = self.cxt.ty_basic(sec, new_data, dim);
        self.set_expr_type(e.id, new_ty);

        match &e.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                self.propagate_concrete(lhs, concrete);
                self.propagate_concrete(rhs, concrete);
            }
            ExprKind::Unary { expr, .. }
            | ExprKind::Classify(expr)
            | ExprKind::Declassify(expr)
            | ExprKind::Qualified { expr, .. } => {
                self.propagate_concrete(expr, concrete);
            }
            ExprKind::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                self.propagate_concrete(then_expr, concrete);
                self.propagate_concrete(else_expr, concrete);
            }
            ExprKind::ArrayCtor(elems) => {
                for elem in elems {
                    self.propagate_concrete(elem, concrete);
                }
            }
            ExprKind::Index { expr, .. } | ExprKind::Reshape { expr, .. } => {
                self.propagate_concrete(expr, concrete);
            }
            ExprKind::Cat { lhs, rhs, .. } => {
                self.propagate_concrete(lhs, concrete);
                self.propagate_concrete(rhs, concrete);
            }
            _ => {}
        }
    }
}
