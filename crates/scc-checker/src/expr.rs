//! Expression elaboration.

use crate::checker::{TcResult, TypeChecker, TypeContext, TypeError};
use scc_ast::{
    BinaryOp, Expr, ExprKind, LValue, LValueKind, Prim, Subscript, TypeQual, UnaryOp,
};
use scc_common::Span;
use scc_core::{
    types::{lattice_dim_leq, upper_dim},
    DataType, SymbolKind, SymCategory, Type, TypeId,
};

impl<'a> TypeChecker<'a> {
    /// Elaborate an expression under a context type. Memoizing: re-entry
    /// after success returns the cached type.
    pub fn visit_expr(&mut self, e: &Expr, cx: TypeContext) -> TcResult<TypeId> {
        if let Some(ty) = self.expr_type(e.id) {
            return Ok(ty);
        }

        let ty = self.visit_expr_uncached(e, cx)?;
        self.set_expr_type(e.id, ty);
        Ok(ty)
    }

    fn visit_expr_uncached(&mut self, e: &Expr, cx: TypeContext) -> TcResult<TypeId> {
        match &e.kind {
            ExprKind::IntLit(_) => {
                let data = match cx.data.and_then(|d| self.cxt.prim_of(d)) {
                    Some(p)
                        if !p.is_abstract_numeric()
                            && scc_core::types::lattice_prim_leq(Prim::Numeric, p) =>
                    {
                        self.cxt.dt_prim(p)
                    }
                    _ => self.cxt.dt_prim(Prim::Numeric),
                };
                let sec = self.cxt.sec_public();
                Ok(self.cxt.ty_basic(sec, data, 0))
            }
            ExprKind::FloatLit(_) => {
                let data = match cx.data.and_then(|d| self.cxt.prim_of(d)) {
                    Some(p)
                        if !p.is_abstract_numeric()
                            && scc_core::types::lattice_prim_leq(Prim::NumericFloat, p) =>
                    {
                        self.cxt.dt_prim(p)
                    }
                    _ => self.cxt.dt_prim(Prim::NumericFloat),
                };
                let sec = self.cxt.sec_public();
                Ok(self.cxt.ty_basic(sec, data, 0))
            }
            ExprKind::BoolLit(_) => Ok(self.cxt.ty_public_bool()),
            ExprKind::StrLit(_) => Ok(self.cxt.ty_string()),
            ExprKind::Var(id) => {
                let sym = self.get_variable(id)?;
                Ok(self.cxt.symbol(sym).ty.expect("variable type"))
            }
            ExprKind::Binary { op, lhs, rhs } => self.visit_binary(e, *op, lhs, rhs, cx),
            ExprKind::Unary { op, expr } => self.visit_unary(e, *op, expr, cx),
            ExprKind::Assign { op, lval, rhs } => {
                let lval_ty = self.visit_lvalue(lval)?;
                let rhs_cx = TypeContext::of_type(self.cxt, lval_ty);
                let rhs_ty = self.visit_expr(rhs, rhs_cx)?;
                if self.check_and_log_if_void(rhs, rhs_ty) {
                    return Err(TypeError);
                }

                if let Some(op) = op {
                    // `x op= e` obeys the binary operator's data rule.
                    let (_, ldata, _) = self.cxt.basic_parts(lval_ty).expect("lvalue type");
                    let lprim = self.cxt.prim_of(ldata);
                    let ok = match op {
                        _ if op.is_arithmetic() => lprim
                            .map(|p| p.is_numeric() || (*op == BinaryOp::Add && p == Prim::String))
                            .unwrap_or(false),
                        _ if op.is_bitwise() => lprim
                            .map(|p| p.is_signed() || p.is_unsigned() || p.is_xor())
                            .unwrap_or(false),
                        _ => false,
                    };
                    if !ok {
                        return Err(self.fatal(
                            e.span,
                            format!(
                                "operator {}= is not defined on {}",
                                op.token(),
                                self.cxt.type_string(lval_ty)
                            ),
                        ));
                    }
                }

                self.check_assign_compat(lval_ty, rhs, rhs_ty, e.span, op.is_none())?;
                Ok(lval_ty)
            }
            ExprKind::IncDec { lval, is_inc, .. } => {
                let lval_ty = self.visit_lvalue(lval)?;
                let (_, data, _) = self.cxt.basic_parts(lval_ty).expect("lvalue type");
                let numeric = self
                    .cxt
                    .prim_of(data)
                    .map(|p| p.is_numeric() && !p.is_abstract_numeric())
                    .unwrap_or(false);
                if !numeric {
                    let what = if *is_inc { "++" } else { "--" };
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "operator {what} expects a numeric lvalue, got {}",
                            self.cxt.type_string(lval_ty)
                        ),
                    ));
                }
                Ok(lval_ty)
            }
            ExprKind::Cast { ty, expr } => self.visit_cast(e, ty, expr),
            ExprKind::Classify(inner) => {
                let sec = match cx.sec {
                    Some(sec) if !self.cxt.is_public_sec(sec) => sec,
                    _ => {
                        return Err(self.fatal(
                            e.span,
                            "classify requires a private type context",
                        ))
                    }
                };
                let inner_cx = TypeContext {
                    sec: None,
                    data: cx.data.and_then(|d| {
                        // The context's private data type maps to its
                        // public representation for the operand.
                        self.cxt.dtype_declassify(sec, d)
                    }),
                    dim: cx.dim,
                };
                let ty = self.visit_expr(inner, inner_cx)?;
                if self.check_and_log_if_void(inner, ty) {
                    return Err(TypeError);
                }
                let (isec, data, dim) = self.cxt.basic_parts(ty).expect("basic type");
                if !self.cxt.is_public_sec(isec) {
                    return Err(self.fatal(e.span, "classify expects a public operand"));
                }
                let data = match cx.data {
                    Some(context_data)
                        if self.cxt.dtype_declassify(sec, context_data) == Some(data) =>
                    {
                        context_data
                    }
                    _ => data,
                };
                Ok(self.cxt.ty_basic(sec, data, dim))
            }
            ExprKind::Declassify(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                if self.check_and_log_if_void(inner, ty) {
                    return Err(TypeError);
                }
                let (sec, data, dim) = self.cxt.basic_parts(ty).expect("basic type");
                if self.cxt.is_public_sec(sec) {
                    return Err(self.fatal(e.span, "declassify expects a private operand"));
                }
                let public_data = match self.cxt.dtype_declassify(sec, data) {
                    Some(d) => d,
                    None => {
                        let shown = self.cxt.data_type_string(data);
                        return Err(self.fatal(
                            e.span,
                            format!("data type {shown} has no public representation"),
                        ));
                    }
                };
                let public = self.cxt.sec_public();
                Ok(self.cxt.ty_basic(public, public_data, dim))
            }
            ExprKind::DomainId(id) => {
                match self
                    .st
                    .find(self.cxt, self.scope, SymCategory::Domain, id.name)
                {
                    Some(sym) => {
                        self.domain_symbols.insert(e.id, sym);
                        Ok(self.cxt.ty_public(Prim::Uint64, 0))
                    }
                    None => {
                        let name = self.cxt.interner.resolve(id.name).to_owned();
                        Err(self.fatal(
                            id.span,
                            format!("identifier '{name}' is not a security domain in scope"),
                        ))
                    }
                }
            }
            ExprKind::ProcCall { name, args } => {
                self.check_proc_call(e.id, name, args, cx.sec, e.span)
            }
            ExprKind::Index { expr, subs } => {
                let subject_cx = TypeContext {
                    sec: cx.sec,
                    data: cx.data,
                    dim: None,
                };
                let ty = self.visit_expr(expr, subject_cx)?;
                if self.check_and_log_if_void(expr, ty) {
                    return Err(TypeError);
                }
                let (sec, data, dim) = self.cxt.basic_parts(ty).expect("basic type");
                if dim as usize != subs.len() {
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "expected {dim} subscripts, got {}",
                            subs.len()
                        ),
                    ));
                }

                let result_dim = self.check_indices(subs, e.span)?;
                Ok(self.cxt.ty_basic(sec, data, result_dim))
            }
            ExprKind::Shape(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                if self.check_and_log_if_void(inner, ty) {
                    return Err(TypeError);
                }
                self.default_instantiate(inner, ty)?;
                Ok(self.cxt.ty_public(Prim::Uint64, 1))
            }
            ExprKind::Size(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                if self.check_and_log_if_void(inner, ty) {
                    return Err(TypeError);
                }
                self.default_instantiate(inner, ty)?;
                Ok(self.cxt.ty_public(Prim::Uint64, 0))
            }
            ExprKind::Reshape { expr, dims } => {
                let subject_cx = TypeContext {
                    sec: cx.sec,
                    data: cx.data,
                    dim: None,
                };
                let ty = self.visit_expr(expr, subject_cx)?;
                if self.check_and_log_if_void(expr, ty) {
                    return Err(TypeError);
                }
                let (sec, data, _) = self.cxt.basic_parts(ty).expect("basic type");
                for dim_expr in dims {
                    self.check_index_expr(dim_expr)?;
                }
                Ok(self.cxt.ty_basic(sec, data, dims.len() as u32))
            }
            ExprKind::Cat { lhs, rhs, dim } => {
                let t1 = self.visit_expr(lhs, cx)?;
                let t2 = self.visit_expr(rhs, cx)?;
                if self.check_and_log_if_void(lhs, t1) || self.check_and_log_if_void(rhs, t2) {
                    return Err(TypeError);
                }

                let (t1, t2) = self.merge_numeric_operands(lhs, t1, rhs, t2)?;
                let (s1, d1, n1) = self.cxt.basic_parts(t1).expect("basic type");
                let (s2, d2, n2) = self.cxt.basic_parts(t2).expect("basic type");

                if n1 != n2 || n1 == 0 {
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "cat expects two arrays of equal dimensionality, got {n1} and {n2}"
                        ),
                    ));
                }
                if d1 != d2 {
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "cat expects matching data types, got {} and {}",
                            self.cxt.data_type_string(d1),
                            self.cxt.data_type_string(d2)
                        ),
                    ));
                }
                let sec = match self.cxt.upper_sec_type(s1, s2) {
                    Some(sec) => sec,
                    None => {
                        return Err(self.fatal(
                            e.span,
                            "cat operands belong to incomparable protection domains",
                        ))
                    }
                };

                if let Some(dim_expr) = dim {
                    match dim_expr.kind {
                        ExprKind::IntLit(value) if (value as u32) < n1 => {
                            let ty = self.cxt.ty_public(Prim::Uint64, 0);
                            self.set_expr_type(dim_expr.id, ty);
                        }
                        ExprKind::IntLit(value) => {
                            return Err(self.fatal(
                                dim_expr.span,
                                format!("cat dimension {value} out of bounds"),
                            ))
                        }
                        _ => {
                            return Err(self.fatal(
                                dim_expr.span,
                                "cat dimension must be an integer literal",
                            ))
                        }
                    }
                }

                Ok(self.cxt.ty_basic(sec, d1, n1))
            }
            ExprKind::ToString(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                if self.check_and_log_if_void(inner, ty) {
                    return Err(TypeError);
                }
                let ty = self.default_instantiate(inner, ty)?;
                if !self.can_print_value(ty) {
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "tostring expects a public scalar value, got {}",
                            self.cxt.type_string(ty)
                        ),
                    ));
                }
                Ok(self.cxt.ty_string())
            }
            ExprKind::Strlen(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                if !self.cxt.is_string_type(ty) || !self.cxt.is_scalar(ty) {
                    return Err(self.fatal(e.span, "strlen expects a string"));
                }
                Ok(self.cxt.ty_public(Prim::Uint64, 0))
            }
            ExprKind::StringFromBytes(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                let expected = self.cxt.ty_public(Prim::Uint8, 1);
                if ty != expected {
                    return Err(self.fatal(
                        e.span,
                        "__string_from_bytes expects a public uint8 vector",
                    ));
                }
                Ok(self.cxt.ty_string())
            }
            ExprKind::BytesFromString(inner) => {
                let ty = self.visit_expr(inner, TypeContext::new())?;
                if !self.cxt.is_string_type(ty) || !self.cxt.is_scalar(ty) {
                    return Err(self.fatal(e.span, "__bytes_from_string expects a string"));
                }
                Ok(self.cxt.ty_public(Prim::Uint8, 1))
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let bool_data = self.cxt.dt_prim(Prim::Bool);
                let cond_cx = TypeContext {
                    sec: Some(self.cxt.sec_public()),
                    data: Some(bool_data),
                    dim: None,
                };
                let cond_ty = self.visit_expr(cond, cond_cx)?;
                let (csec, cdata, cdim) = match self.cxt.basic_parts(cond_ty) {
                    Some(parts) => parts,
                    None => return Err(self.fatal(cond.span, "void condition")),
                };
                if !self.cxt.is_public_sec(csec) || !self.cxt.data_type(cdata).is_bool() {
                    return Err(self.fatal(
                        cond.span,
                        "conditional expression must be of type public bool",
                    ));
                }

                let t1 = self.visit_expr(then_expr, cx)?;
                let t2 = self.visit_expr(else_expr, cx)?;
                if self.check_and_log_if_void(then_expr, t1)
                    || self.check_and_log_if_void(else_expr, t2)
                {
                    return Err(TypeError);
                }

                let (t1, t2) = self.merge_numeric_operands(then_expr, t1, else_expr, t2)?;
                let (s1, d1, n1) = self.cxt.basic_parts(t1).expect("basic type");
                let (s2, d2, n2) = self.cxt.basic_parts(t2).expect("basic type");

                if d1 != d2 {
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "branches of a conditional have mismatching data types {} and {}",
                            self.cxt.data_type_string(d1),
                            self.cxt.data_type_string(d2)
                        ),
                    ));
                }
                if !lattice_dim_leq(n1, n2) && !lattice_dim_leq(n2, n1) {
                    return Err(self.fatal(
                        e.span,
                        format!(
                            "incompatible dimensionalities in conditional: {n1} and {n2}"
                        ),
                    ));
                }
                let dim = upper_dim(n1, n2);
                if cdim != 0 && dim != cdim {
                    return Err(self.fatal(
                        e.span,
                        "element-wise conditional requires branches shaped like the condition",
                    ));
                }
                let sec = match self.cxt.upper_sec_type(s1, s2) {
                    Some(sec) => sec,
                    None => {
                        return Err(self.fatal(
                            e.span,
                            "branches of a conditional belong to incomparable protection domains",
                        ))
                    }
                };

                Ok(self.cxt.ty_basic(sec, d1, dim))
            }
            ExprKind::ArrayCtor(elems) => {
                let elem_cx = TypeContext {
                    sec: None,
                    data: cx.data,
                    dim: Some(0),
                };
                let mut tys = Vec::with_capacity(elems.len());
                for elem in elems {
                    let ty = self.visit_expr(elem, elem_cx)?;
                    if self.check_and_log_if_void(elem, ty) {
                        return Err(TypeError);
                    }
                    if !self.cxt.is_scalar(ty) {
                        return Err(self.fatal(
                            elem.span,
                            "array constructor elements must be scalars",
                        ));
                    }
                    tys.push(ty);
                }

                if elems.is_empty() {
                    return Err(self.fatal(e.span, "empty array constructor"));
                }

                // Join the elements pairwise.
                let mut sec = self.cxt.sec_of(tys[0]);
                let mut joined = tys[0];
                for (elem, &ty) in elems.iter().zip(&tys).skip(1) {
                    let data = match self.cxt.upper_data_type(joined, ty) {
                        Some(data) => data,
                        None => {
                            return Err(self.fatal(
                                elem.span,
                                "array constructor elements have incompatible data types",
                            ))
                        }
                    };
                    sec = match self.cxt.upper_sec_type(sec, self.cxt.sec_of(ty)) {
                        Some(sec) => sec,
                        None => {
                            return Err(self.fatal(
                                elem.span,
                                "array constructor elements belong to incomparable domains",
                            ))
                        }
                    };
                    joined = self.cxt.ty_basic(sec, data, 0);
                }

                let (_, data, _) = self.cxt.basic_parts(joined).expect("basic type");
                // Every element instantiates to the joined data type.
                if let Some(p) = self.cxt.prim_of(data) {
                    if !p.is_abstract_numeric() {
                        for elem in elems {
                            self.instantiate_data_type(elem, Some(p))?;
                        }
                    }
                }

                Ok(self.cxt.ty_basic(sec, data, 1))
            }
            ExprKind::Select { expr, field } => {
                let ty = self.visit_expr(expr, TypeContext::new())?;
                if self.check_and_log_if_void(expr, ty) {
                    return Err(TypeError);
                }
                let (_, data, _) = self.cxt.basic_parts(ty).expect("basic type");
                match self.cxt.data_type(data) {
                    DataType::Struct { fields, .. } => {
                        match fields.iter().find(|f| f.name == field.name) {
                            Some(f) => Ok(f.ty),
                            None => {
                                let fname = self.cxt.interner.resolve(field.name).to_owned();
                                let shown = self.cxt.data_type_string(data);
                                Err(self.fatal(
                                    field.span,
                                    format!("{shown} has no field named '{fname}'"),
                                ))
                            }
                        }
                    }
                    _ => Err(self.fatal(
                        e.span,
                        "field selection expects a value of a structure type",
                    )),
                }
            }
            ExprKind::Qualified { expr, quals } => {
                let mut qcx = cx;
                for qual in quals {
                    match qual {
                        TypeQual::Sec(sec_expr) => {
                            // A bare identifier qualifier may name either
                            // a domain or a data type.
                            match sec_expr.identifier() {
                                Some(id) => {
                                    if let Some(sym) = self.st.find(
                                        self.cxt,
                                        self.scope,
                                        SymCategory::Domain,
                                        id.name,
                                    ) {
                                        if let SymbolKind::Domain { sec } =
                                            &self.cxt.symbol(sym).kind
                                        {
                                            qcx.sec = Some(*sec);
                                            continue;
                                        }
                                    }
                                    if let Some(sym) = self.st.find(
                                        self.cxt,
                                        self.scope,
                                        SymCategory::DataVar,
                                        id.name,
                                    ) {
                                        if let SymbolKind::DataVar { data } =
                                            &self.cxt.symbol(sym).kind
                                        {
                                            qcx.data = Some(*data);
                                            continue;
                                        }
                                    }
                                    let name = self.cxt.interner.resolve(id.name).to_owned();
                                    return Err(self.fatal(
                                        sec_expr.span,
                                        format!("identifier '{name}' does not name a type"),
                                    ));
                                }
                                None => qcx.sec = Some(self.cxt.sec_public()),
                            }
                        }
                        TypeQual::Data(data_expr) => {
                            qcx.data = Some(self.visit_data_type(data_expr)?);
                        }
                        TypeQual::Dim(dim_expr) => {
                            qcx.dim = Some(self.visit_dim_type(dim_expr)?);
                        }
                    }
                }

                let mut ty = self.visit_expr(expr, qcx)?;
                if let Some(p) = qcx.data.and_then(|d| self.cxt.prim_of(d)) {
                    if !p.is_abstract_numeric() {
                        ty = self.instantiate_data_type(expr, Some(p))?;
                    }
                }

                let (sec, data, dim) = match self.cxt.basic_parts(ty) {
                    Some(parts) => parts,
                    None => return Err(self.fatal(e.span, "void expression cannot be qualified")),
                };
                if let Some(want) = qcx.sec {
                    if want != sec {
                        return Err(self.fatal(
                            e.span,
                            format!(
                                "expression of security type {} qualified as {}",
                                self.cxt.sec_type_string(sec),
                                self.cxt.sec_type_string(want)
                            ),
                        ));
                    }
                }
                if let Some(want) = qcx.data {
                    if want != data {
                        return Err(self.fatal(
                            e.span,
                            format!(
                                "expression of data type {} qualified as {}",
                                self.cxt.data_type_string(data),
                                self.cxt.data_type_string(want)
                            ),
                        ));
                    }
                }
                if let Some(want) = qcx.dim {
                    if want != dim {
                        return Err(self.fatal(
                            e.span,
                            format!(
                                "expression of dimensionality {dim} qualified as {want}"
                            ),
                        ));
                    }
                }

                Ok(ty)
            }
        }
    }

    /*******************************************************************
      Operators
    *******************************************************************/

    fn visit_binary(
        &mut self,
        e: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        cx: TypeContext,
    ) -> TcResult<TypeId> {
        let operand_cx = if op.is_arithmetic() || op.is_bitwise() {
            TypeContext {
                sec: None,
                data: cx.data,
                dim: None,
            }
        } else if op.is_logical() {
            let bool_data = self.cxt.dt_prim(Prim::Bool);
            TypeContext {
                sec: None,
                data: Some(bool_data),
                dim: None,
            }
        } else {
            TypeContext::new()
        };

        let t1 = self.visit_expr(lhs, operand_cx)?;
        let t2 = self.visit_expr(rhs, operand_cx)?;
        if self.check_and_log_if_void(lhs, t1) || self.check_and_log_if_void(rhs, t2) {
            return Err(TypeError);
        }

        let (t1, t2) = self.merge_numeric_operands(lhs, t1, rhs, t2)?;
        let (s1, d1, n1) = self.cxt.basic_parts(t1).expect("basic type");
        let (s2, d2, n2) = self.cxt.basic_parts(t2).expect("basic type");

        if !lattice_dim_leq(n1, n2) && !lattice_dim_leq(n2, n1) {
            return Err(self.fatal(
                e.span,
                format!("incompatible dimensionalities in operands: {n1} and {n2}"),
            ));
        }
        let dim = upper_dim(n1, n2);

        // Operator overloads take precedence when any are declared for
        // this operator; the search runs over scalar-ranked operand
        // types and the application vectorises.
        let op_name = {
            let mangled = scc_ast::OverloadOp::Binary(op).name();
            self.cxt.interner.intern(&mangled)
        };
        let scalar_args = [
            self.cxt.ty_basic(s1, d1, 0),
            self.cxt.ty_basic(s2, d2, 0),
        ];
        if let Some(sym) = self.find_best_matching_op(op_name, &scalar_args, e.span)? {
            self.call_targets.insert(e.id, sym);
            let proc_ty = self.cxt.symbol(sym).ty.expect("operator type");
            let ret = match self.cxt.ty(proc_ty) {
                Type::Proc { ret, .. } => *ret,
                _ => return Err(TypeError),
            };
            let (rsec, rdata, _) = self.cxt.basic_parts(ret).expect("operator return type");
            return Ok(self.cxt.ty_basic(rsec, rdata, dim));
        }

        // Built-in rules.
        let sec = match self.cxt.upper_sec_type(s1, s2) {
            Some(sec) => sec,
            None => {
                return Err(self.fatal(
                    e.span,
                    format!(
                        "operands belong to incomparable protection domains {} and {}",
                        self.cxt.sec_type_string(s1),
                        self.cxt.sec_type_string(s2)
                    ),
                ))
            }
        };

        let data = match self.cxt.upper_data_type(t1, t2) {
            Some(data) => data,
            None => {
                return Err(self.fatal(
                    e.span,
                    format!(
                        "operator {} applied to incompatible data types {} and {}",
                        op.token(),
                        self.cxt.data_type_string(d1),
                        self.cxt.data_type_string(d2)
                    ),
                ))
            }
        };

        let prim = match self.cxt.prim_of(data) {
            Some(p) => p,
            None => {
                // User primitives have no built-in operators.
                return Err(self.fatal(
                    e.span,
                    format!(
                        "no operator definition for {} on {}",
                        op.token(),
                        self.cxt.data_type_string(data)
                    ),
                ));
            }
        };

        let admissible = if op.is_arithmetic() {
            prim.is_numeric() || (op == BinaryOp::Add && prim == Prim::String)
        } else if op.is_comparison() {
            true
        } else if op.is_logical() {
            prim == Prim::Bool
        } else {
            // bitwise and shifts
            prim.is_signed() || prim.is_unsigned() || prim.is_xor() || prim == Prim::Numeric
        };
        if !admissible {
            return Err(self.fatal(
                e.span,
                format!(
                    "operator {} is not defined on {}",
                    op.token(),
                    self.cxt.data_type_string(data)
                ),
            ));
        }

        let result_data = if op.is_comparison() {
            self.cxt.dt_prim(Prim::Bool)
        } else {
            data
        };

        Ok(self.cxt.ty_basic(sec, result_data, dim))
    }

    fn visit_unary(
        &mut self,
        e: &Expr,
        op: UnaryOp,
        inner: &Expr,
        cx: TypeContext,
    ) -> TcResult<TypeId> {
        let operand_cx = match op {
            UnaryOp::Neg => {
                let bool_data = self.cxt.dt_prim(Prim::Bool);
                TypeContext {
                    sec: None,
                    data: Some(bool_data),
                    dim: None,
                }
            }
            _ => TypeContext {
                sec: None,
                data: cx.data,
                dim: None,
            },
        };

        let ty = self.visit_expr(inner, operand_cx)?;
        if self.check_and_log_if_void(inner, ty) {
            return Err(TypeError);
        }
        let (sec, data, dim) = self.cxt.basic_parts(ty).expect("basic type");

        let op_name = {
            let mangled = scc_ast::OverloadOp::Unary(op).name();
            self.cxt.interner.intern(&mangled)
        };
        let scalar_args = [self.cxt.ty_basic(sec, data, 0)];
        if let Some(sym) = self.find_best_matching_op(op_name, &scalar_args, e.span)? {
            self.call_targets.insert(e.id, sym);
            let proc_ty = self.cxt.symbol(sym).ty.expect("operator type");
            let ret = match self.cxt.ty(proc_ty) {
                Type::Proc { ret, .. } => *ret,
                _ => return Err(TypeError),
            };
            let (rsec, rdata, _) = self.cxt.basic_parts(ret).expect("operator return type");
            return Ok(self.cxt.ty_basic(rsec, rdata, dim));
        }

        let prim = self.cxt.prim_of(data);
        let admissible = match op {
            UnaryOp::Neg => prim == Some(Prim::Bool),
            UnaryOp::Minus => prim.map(|p| p.is_numeric()).unwrap_or(false),
            UnaryOp::Inv => prim
                .map(|p| p.is_signed() || p.is_unsigned() || p.is_xor() || p == Prim::Numeric)
                .unwrap_or(false),
        };
        if !admissible {
            return Err(self.fatal(
                e.span,
                format!(
                    "operator {} is not defined on {}",
                    op.token(),
                    self.cxt.type_string(ty)
                ),
            ));
        }

        Ok(ty)
    }

    fn visit_cast(&mut self, e: &Expr, ty_expr: &scc_ast::DataTypeExpr, inner: &Expr) -> TcResult<TypeId> {
        let target = match &ty_expr.kind {
            scc_ast::DataTypeExprKind::Const(p) => *p,
            _ => {
                return Err(self.fatal(
                    ty_expr.span,
                    "cast target must be a built-in primitive type",
                ))
            }
        };

        let ty = self.visit_expr(inner, TypeContext::new())?;
        if self.check_and_log_if_void(inner, ty) {
            return Err(TypeError);
        }
        let ty = self.default_instantiate(inner, ty)?;
        let (sec, data, dim) = self.cxt.basic_parts(ty).expect("basic type");

        if self.cxt.is_public_sec(sec) && target.is_xor() {
            return Err(self.fatal(e.span, "XOR types do not have public representation"));
        }

        // Private and user-primitive operands resolve through cast
        // definitions.
        if !self.cxt.is_public_sec(sec) || self.cxt.data_type(data).is_user_primitive() {
            let scalar = self.cxt.ty_basic(sec, data, 0);
            if let Some(sym) = self.find_best_matching_cast(scalar, target, e.span)? {
                self.call_targets.insert(e.id, sym);
                let proc_ty = self.cxt.symbol(sym).ty.expect("cast type");
                let ret = match self.cxt.ty(proc_ty) {
                    Type::Proc { ret, .. } => *ret,
                    _ => return Err(TypeError),
                };
                let (rsec, rdata, _) = self.cxt.basic_parts(ret).expect("cast return type");
                return Ok(self.cxt.ty_basic(rsec, rdata, dim));
            }
        }

        let source = match self.cxt.prim_of(data) {
            Some(p) => p,
            None => {
                return Err(self.fatal(
                    e.span,
                    format!(
                        "no cast definition from {} to {target}",
                        self.cxt.data_type_string(data)
                    ),
                ))
            }
        };
        if !scc_core::types::lattice_explicit_prim_leq(source, target) {
            return Err(self.fatal(
                e.span,
                format!("cannot cast {source} to {target}"),
            ));
        }

        let target_data = self.cxt.dt_prim(target);
        Ok(self.cxt.ty_basic(sec, target_data, dim))
    }

    /*******************************************************************
      LValues
    *******************************************************************/

    pub fn visit_lvalue(&mut self, lval: &LValue) -> TcResult<TypeId> {
        if let Some(ty) = self.expr_type(lval.id) {
            return Ok(ty);
        }

        let ty = match &lval.kind {
            LValueKind::Var(id) => {
                let sym = self.get_variable(id)?;
                self.cxt.symbol(sym).ty.expect("variable type")
            }
            LValueKind::Index { lval: inner, subs } => {
                let ty = self.visit_lvalue(inner)?;
                let (sec, data, dim) = self.cxt.basic_parts(ty).expect("lvalue type");
                if dim as usize != subs.len() {
                    return Err(self.fatal(
                        lval.span,
                        format!("expected {dim} subscripts, got {}", subs.len()),
                    ));
                }
                let result_dim = self.check_indices(subs, lval.span)?;
                self.cxt.ty_basic(sec, data, result_dim)
            }
            LValueKind::Select { lval: inner, field } => {
                let ty = self.visit_lvalue(inner)?;
                let (_, data, _) = self.cxt.basic_parts(ty).expect("lvalue type");
                match self.cxt.data_type(data) {
                    DataType::Struct { fields, .. } => {
                        match fields.iter().find(|f| f.name == field.name) {
                            Some(f) => f.ty,
                            None => {
                                let fname = self.cxt.interner.resolve(field.name).to_owned();
                                let shown = self.cxt.data_type_string(data);
                                return Err(self.fatal(
                                    field.span,
                                    format!("{shown} has no field named '{fname}'"),
                                ));
                            }
                        }
                    }
                    _ => {
                        return Err(self.fatal(
                            lval.span,
                            "field selection expects a value of a structure type",
                        ))
                    }
                }
            }
        };

        self.expr_types.insert(lval.id, ty);
        Ok(ty)
    }

    /*******************************************************************
      Shared checks
    *******************************************************************/

    /// Every subscript index must be a public uint64 scalar; the result
    /// rank is the number of slice subscripts.
    pub fn check_indices(&mut self, subs: &[Subscript], _span: Span) -> TcResult<u32> {
        let mut result_dim = 0u32;
        for sub in subs {
            match sub {
                Subscript::Index(idx) => {
                    self.check_index_expr(idx)?;
                }
                Subscript::Slice(lo, hi) => {
                    result_dim += 1;
                    if let Some(lo) = lo {
                        self.check_index_expr(lo)?;
                    }
                    if let Some(hi) = hi {
                        self.check_index_expr(hi)?;
                    }
                }
            }
        }
        Ok(result_dim)
    }

    /// Elaborate an index expression as a public uint64 scalar.
    pub fn check_index_expr(&mut self, e: &Expr) -> TcResult<TypeId> {
        let cx = TypeContext::index(self.cxt);
        let ty = self.visit_expr(e, cx)?;
        let ty = self.instantiate_data_type(e, Some(Prim::Uint64))?;
        if !self.cxt.is_public_uint_scalar(ty) {
            return Err(self.fatal(
                e.span,
                format!(
                    "index expression must be a public uint64 scalar, got {}",
                    self.cxt.type_string(ty)
                ),
            ));
        }
        Ok(ty)
    }

    /// Log "void where a value is expected" and report whether it fired.
    pub fn check_and_log_if_void(&mut self, e: &Expr, ty: TypeId) -> bool {
        if self.cxt.is_void(ty) {
            let _ = self.fatal(e.span, "expected a value, got a void expression");
            true
        } else {
            false
        }
    }

    /// When exactly one operand is polymorphic, instantiate it to the
    /// other operand's concrete data type.
    pub fn merge_numeric_operands(
        &mut self,
        e1: &Expr,
        t1: TypeId,
        e2: &Expr,
        t2: TypeId,
    ) -> TcResult<(TypeId, TypeId)> {
        let p1 = self.cxt.prim_of(self.cxt.data_of(t1));
        let p2 = self.cxt.prim_of(self.cxt.data_of(t2));
        let abs1 = p1.map(|p| p.is_abstract_numeric()).unwrap_or(false);
        let abs2 = p2.map(|p| p.is_abstract_numeric()).unwrap_or(false);

        match (abs1, abs2) {
            (true, false) => {
                let t1 = match p2 {
                    Some(p) if p.is_numeric() => self.instantiate_data_type(e1, Some(p))?,
                    _ => t1,
                };
                Ok((t1, t2))
            }
            (false, true) => {
                let t2 = match p1 {
                    Some(p) if p.is_numeric() => self.instantiate_data_type(e2, Some(p))?,
                    _ => t2,
                };
                Ok((t1, t2))
            }
            // `numeric` against `numeric_float` resolves the integer side
            // up to the float class's default.
            (true, true) if p1 != p2 => {
                if p1 == Some(Prim::NumericFloat) {
                    let t2 = self.instantiate_data_type(e2, Some(Prim::Float64))?;
                    let t1 = self.instantiate_data_type(e1, Some(Prim::Float64))?;
                    Ok((t1, t2))
                } else {
                    let t1 = self.instantiate_data_type(e1, Some(Prim::Float64))?;
                    let t2 = self.instantiate_data_type(e2, Some(Prim::Float64))?;
                    Ok((t1, t2))
                }
            }
            _ => Ok((t1, t2)),
        }
    }

    /// Whether a value of this type can be converted to a string for
    /// printing.
    pub fn can_print_value(&self, ty: TypeId) -> bool {
        match self.cxt.basic_parts(ty) {
            Some((sec, data, 0)) => {
                self.cxt.is_public_sec(sec)
                    && self
                        .cxt
                        .prim_of(data)
                        .map(|p| p == Prim::Bool || p == Prim::String || p.is_numeric())
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// The assignment/initialization compatibility rule.
    ///
    /// `allow_scalar_fill` admits a scalar right-hand side for an array
    /// left-hand side (the value fills the shape).
    pub fn check_assign_compat(
        &mut self,
        lhs_ty: TypeId,
        rhs: &Expr,
        rhs_ty: TypeId,
        span: Span,
        allow_scalar_fill: bool,
    ) -> TcResult<TypeId> {
        let (lsec, ldata, ldim) = match self.cxt.basic_parts(lhs_ty) {
            Some(parts) => parts,
            None => return Err(self.fatal(span, "cannot assign to a void target")),
        };

        // Drive polymorphic literals to the declared data type.
        let rhs_ty = match self.cxt.prim_of(ldata) {
            Some(p) if !p.is_abstract_numeric() => self.instantiate_data_type(rhs, Some(p))?,
            _ => self.default_instantiate(rhs, rhs_ty)?,
        };

        let (rsec, rdata, rdim) = match self.cxt.basic_parts(rhs_ty) {
            Some(parts) => parts,
            None => return Err(self.fatal(span, "cannot assign a void value")),
        };

        if !self.cxt.lattice_sec_leq(rsec, lsec) {
            return Err(self.fatal(
                span,
                format!(
                    "cannot assign {} value to {} target",
                    self.cxt.sec_type_string(rsec),
                    self.cxt.sec_type_string(lsec)
                ),
            ));
        }

        let data_ok = rdata == ldata
            || (self.cxt.is_public_sec(rsec)
                && !self.cxt.is_public_sec(lsec)
                && self.cxt.dtype_declassify(lsec, ldata) == Some(rdata));
        if !data_ok {
            return Err(self.fatal(
                span,
                format!(
                    "incompatible data types in assignment: expected {}, got {}",
                    self.cxt.data_type_string(ldata),
                    self.cxt.data_type_string(rdata)
                ),
            ));
        }

        if rdim != ldim && !(rdim == 0 && allow_scalar_fill) {
            return Err(self.fatal(
                span,
                format!(
                    "incompatible dimensionalities in assignment: expected {ldim}, got {rdim}"
                ),
            ));
        }

        Ok(rhs_ty)
    }
}
