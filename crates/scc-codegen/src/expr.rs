//! Expression lowering.

use crate::codegen::CodeGen;
use crate::result::{CGBranchResult, CGResult};
use scc_ast::{BinaryOp, Expr, ExprKind, LValue, LValueKind, Prim, UnaryOp};
use scc_checker::{TypeError};
use scc_common::Span;
use scc_core::{ConstValue, Imop, Opcode, SymbolId, SymbolKind, Type, TypeId};

impl<'a> CodeGen<'a> {
    /// Lower an elaborated expression; the result symbol holds its value.
    pub fn cg_expr(&mut self, e: &Expr) -> Result<CGResult, TypeError> {
        let saved_span = self.node_span;
        self.node_span = e.span;
        let result = self.cg_expr_inner(e);
        self.node_span = saved_span;
        result
    }

    fn expr_ty(&mut self, e: &Expr) -> Result<TypeId, TypeError> {
        match self.tc.expr_type(e.id) {
            Some(ty) => Ok(ty),
            None => Err(TypeError),
        }
    }

    fn cg_expr_inner(&mut self, e: &Expr) -> Result<CGResult, TypeError> {
        match &e.kind {
            ExprKind::IntLit(v) => {
                let ty = self.expr_ty(e)?;
                let prim = self.concrete_prim(ty);
                let sym = self.tc.cxt.numeric_constant(prim, *v);
                Ok(CGResult::with_symbol(sym))
            }
            ExprKind::FloatLit(v) => {
                let ty = self.expr_ty(e)?;
                let prim = self.concrete_prim(ty);
                let sym = self.tc.cxt.const_float(prim, *v);
                Ok(CGResult::with_symbol(sym))
            }
            ExprKind::BoolLit(v) => {
                let sym = self.tc.cxt.const_bool(*v);
                Ok(CGResult::with_symbol(sym))
            }
            ExprKind::StrLit(s) => {
                let sym = self.tc.cxt.const_str(s.clone());
                Ok(CGResult::with_symbol(sym))
            }
            ExprKind::Var(id) => {
                let sym = self.tc.var_symbol(id.id).ok_or(TypeError)?;
                Ok(CGResult::with_symbol(sym))
            }
            ExprKind::Binary { op, lhs, rhs } => self.cg_binary(e, *op, lhs, rhs),
            ExprKind::Unary { op, expr } => self.cg_unary(e, *op, expr),
            ExprKind::Assign { op, lval, rhs } => self.cg_assign(e, *op, lval, rhs),
            ExprKind::IncDec {
                lval,
                is_inc,
                is_prefix,
            } => self.cg_inc_dec(e, lval, *is_inc, *is_prefix),
            ExprKind::Cast { expr, .. } => {
                let result_ty = self.expr_ty(e)?;
                if let Some(target) = self.tc.call_target(e.id) {
                    // Overloaded cast.
                    return self.cg_overload_call(e, target, std::slice::from_ref(expr.as_ref()), result_ty);
                }

                let mut result = CGResult::new();
                let e_result = self.cg_expr(expr)?;
                let src = e_result.symbol().expect("cast operand");
                self.append(&mut result, e_result);

                let dest = self.generate_result_symbol(&mut result, result_ty);
                if self.tc.cxt.is_scalar(result_ty) {
                    self.push_imop_after(
                        &mut result,
                        Imop::new(Opcode::Cast, [Some(dest), Some(src)]),
                    );
                } else {
                    self.copy_shape_from(&mut result, dest, src);
                    let size = self.get_size_or(dest, 0);
                    self.push_imop_after(
                        &mut result,
                        Imop::new(Opcode::Cast, [Some(dest), Some(src), Some(size)]),
                    );
                }
                self.release_temporary(&mut result, src, None);
                Ok(result)
            }
            ExprKind::Classify(inner) => {
                let result_ty = self.expr_ty(e)?;
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("classify operand");
                self.append(&mut result, e_result);
                let dest = self.classify_into(&mut result, src, result_ty);
                self.release_temporary(&mut result, src, Some(dest));
                Ok(CGResult::with_symbol(dest).merged(result))
            }
            ExprKind::Declassify(inner) => {
                let result_ty = self.expr_ty(e)?;
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("declassify operand");
                self.append(&mut result, e_result);

                let dest = self.generate_result_symbol(&mut result, result_ty);
                if self.tc.cxt.is_scalar(result_ty) {
                    self.push_imop_after(
                        &mut result,
                        Imop::new(Opcode::Declassify, [Some(dest), Some(src)]),
                    );
                } else {
                    self.copy_shape_from(&mut result, dest, src);
                    let size = self.get_size_or(dest, 0);
                    self.push_imop_after(
                        &mut result,
                        Imop::new(Opcode::Declassify, [Some(dest), Some(src), Some(size)]),
                    );
                }
                self.release_temporary(&mut result, src, None);
                Ok(result)
            }
            ExprKind::DomainId(_) => {
                let result_ty = self.expr_ty(e)?;
                let domain = self.tc.domain_symbol(e.id).ok_or(TypeError)?;
                let mut result = CGResult::new();
                let dest = self.generate_result_symbol(&mut result, result_ty);
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::DomainId, [Some(dest), Some(domain)]),
                );
                Ok(result)
            }
            ExprKind::ProcCall { args, .. } => {
                let result_ty = self.expr_ty(e)?;
                let target = self.tc.call_target(e.id).ok_or(TypeError)?;
                self.cg_call(e, target, args, result_ty)
            }
            ExprKind::Index { expr, subs } => self.cg_index_read(e, expr, subs),
            ExprKind::Shape(inner) => self.cg_shape(e, inner),
            ExprKind::Size(inner) => {
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("size operand");
                self.append(&mut result, e_result);
                let size = self.get_size_or(src, 1);
                result.set_symbol(size);
                Ok(result)
            }
            ExprKind::Reshape { expr, dims } => self.cg_reshape(e, expr, dims),
            ExprKind::Cat { lhs, rhs, dim } => {
                let axis = match dim {
                    Some(d) => match d.kind {
                        ExprKind::IntLit(v) => v as usize,
                        _ => 0,
                    },
                    None => 0,
                };
                self.cg_cat(e, lhs, rhs, axis)
            }
            ExprKind::ToString(inner) => {
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("tostring operand");
                self.append(&mut result, e_result);
                let string_ty = self.string_type();
                let dest = self.generate_result_symbol(&mut result, string_ty);
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::ToString, [Some(dest), Some(src)]),
                );
                self.release_temporary(&mut result, src, None);
                Ok(result)
            }
            ExprKind::Strlen(inner) => {
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("strlen operand");
                self.append(&mut result, e_result);
                let index_ty = self.index_type();
                let dest = self.generate_result_symbol(&mut result, index_ty);
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::PushCRef, [None, Some(src)]),
                );
                let name = self.tc.cxt.const_str("strlen");
                self.push_imop(Imop::new(Opcode::Syscall, [Some(dest), Some(name)]));
                self.release_temporary(&mut result, src, None);
                Ok(result)
            }
            ExprKind::BytesFromString(inner) => {
                let result_ty = self.expr_ty(e)?;
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("operand");
                self.append(&mut result, e_result);

                let dest = self.generate_result_symbol(&mut result, result_ty);
                let info = self.tc.cxt.symbol(dest).variable().cloned().expect("array");
                let dim0 = info.dims[0];
                let size = info.size.expect("array size");

                self.push_imop_after(&mut result, Imop::new(Opcode::PushCRef, [None, Some(src)]));
                let name = self.tc.cxt.const_str("strlen");
                self.push_imop(Imop::new(Opcode::Syscall, [Some(dim0), Some(name)]));
                self.push_imop(Imop::new(Opcode::Assign, [Some(size), Some(dim0)]));
                let zero = self.tc.cxt.const_int(Prim::Uint8, 0);
                self.push_imop(Imop::new(Opcode::Alloc, [Some(dest), Some(size), Some(zero)]));
                self.push_imop(Imop::new(Opcode::PushCRef, [None, Some(src)]));
                self.push_imop(Imop::new(Opcode::PushRef, [None, Some(dest)]));
                let name = self.tc.cxt.const_str("bytes_from_string");
                self.push_imop(Imop::new(Opcode::Syscall, [None, Some(name)]));
                self.release_temporary(&mut result, src, None);
                Ok(result)
            }
            ExprKind::StringFromBytes(inner) => {
                let mut result = CGResult::new();
                let e_result = self.cg_expr(inner)?;
                let src = e_result.symbol().expect("operand");
                self.append(&mut result, e_result);
                let string_ty = self.string_type();
                let dest = self.generate_result_symbol(&mut result, string_ty);
                self.push_imop_after(&mut result, Imop::new(Opcode::PushCRef, [None, Some(src)]));
                let name = self.tc.cxt.const_str("string_from_bytes");
                self.push_imop(Imop::new(Opcode::Syscall, [Some(dest), Some(name)]));
                self.release_temporary(&mut result, src, None);
                Ok(result)
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.cg_ternary(e, cond, then_expr, else_expr),
            ExprKind::ArrayCtor(elems) => self.cg_array_ctor(e, elems),
            ExprKind::Select { expr, field } => {
                let mut result = CGResult::new();
                let e_result = self.cg_expr(expr)?;
                let subject = e_result.symbol().expect("select subject");
                self.append(&mut result, e_result);

                let subject_ty = self.tc.cxt.symbol(subject).ty.expect("subject type");
                let data = self.tc.cxt.data_of(subject_ty);
                let index = match self.tc.cxt.data_type(data) {
                    scc_core::DataType::Struct { fields, .. } => fields
                        .iter()
                        .position(|f| f.name == field.name)
                        .ok_or(TypeError)?,
                    _ => return Err(TypeError),
                };
                let field_sym = self
                    .tc
                    .cxt
                    .symbol(subject)
                    .variable()
                    .and_then(|info| info.fields.get(index).copied())
                    .ok_or(TypeError)?;

                self.release_temporary(&mut result, subject, Some(field_sym));
                result.set_symbol(field_sym);
                Ok(result)
            }
            ExprKind::Qualified { expr, .. } => self.cg_expr(expr),
        }
    }

    fn concrete_prim(&mut self, ty: TypeId) -> Prim {
        let data = self.tc.cxt.data_of(ty);
        match self.tc.cxt.prim_of(data) {
            Some(Prim::Numeric) => Prim::Int64,
            Some(Prim::NumericFloat) => Prim::Float64,
            Some(p) => p,
            None => Prim::Int64,
        }
    }

    /// Emit CLASSIFY of `src` into a fresh temporary of `target_ty`; a
    /// no-op returning `src` when it already has the target security.
    pub fn classify_into(
        &mut self,
        result: &mut CGResult,
        src: SymbolId,
        target_ty: TypeId,
    ) -> SymbolId {
        let src_ty = self.tc.cxt.symbol(src).ty.expect("operand type");
        if self.tc.cxt.sec_of(src_ty) == self.tc.cxt.sec_of(target_ty) {
            return src;
        }

        let dest = self.new_temporary(target_ty);
        if self.tc.cxt.is_scalar(target_ty) {
            self.push_imop_after(result, Imop::new(Opcode::Declare, [Some(dest)]));
            self.push_imop(Imop::new(Opcode::Classify, [Some(dest), Some(src)]));
        } else {
            self.copy_shape_from(result, dest, src);
            let size = self.get_size_or(dest, 0);
            self.push_imop_after(
                result,
                Imop::new(Opcode::Classify, [Some(dest), Some(src), Some(size)]),
            );
        }
        dest
    }

    /// Broadcast a scalar operand over an array result: ALLOC a fresh
    /// temporary of the element type filled with the scalar.
    fn broadcast_scalar(
        &mut self,
        result: &mut CGResult,
        scalar: SymbolId,
        like: SymbolId,
        dim: u32,
    ) -> SymbolId {
        let scalar_ty = self.tc.cxt.symbol(scalar).ty.expect("scalar type");
        let (sec, data, _) = self.tc.cxt.basic_parts(scalar_ty).expect("basic");
        let arr_ty = self.tc.cxt.ty_basic(sec, data, dim);
        let dest = self.new_temporary(arr_ty);
        self.copy_shape_from(result, dest, like);
        let size = self.get_size_or(dest, 0);
        self.push_imop_after(
            result,
            Imop::new(Opcode::Alloc, [Some(dest), Some(size), Some(scalar)]),
        );
        dest
    }

    fn binary_opcode(op: BinaryOp) -> Opcode {
        match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Ne => Opcode::Ne,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Land => Opcode::Land,
            BinaryOp::Lor => Opcode::Lor,
            BinaryOp::Band => Opcode::Band,
            BinaryOp::Bor => Opcode::Bor,
            BinaryOp::Xor => Opcode::Xor,
            BinaryOp::Shl => Opcode::Shl,
            BinaryOp::Shr => Opcode::Shr,
        }
    }

    fn unary_opcode(op: UnaryOp) -> Opcode {
        match op {
            UnaryOp::Inv => Opcode::Uinv,
            UnaryOp::Neg => Opcode::Uneg,
            UnaryOp::Minus => Opcode::Uminus,
        }
    }

    fn cg_binary(
        &mut self,
        e: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;

        if let Some(target) = self.tc.call_target(e.id) {
            let args = [lhs.clone(), rhs.clone()];
            return self.cg_overload_call(e, target, &args, result_ty);
        }

        let mut result = CGResult::new();
        let l_result = self.cg_expr(lhs)?;
        let mut a = l_result.symbol().expect("operand");
        self.append(&mut result, l_result);
        let r_result = self.cg_expr(rhs)?;
        let mut b = r_result.symbol().expect("operand");
        self.append(&mut result, r_result);

        let dim = self.tc.cxt.dim_of(result_ty);
        let result_sec = self.tc.cxt.sec_of(result_ty);

        // Classify a public side combined with a private one.
        for sym in [&mut a, &mut b] {
            let sym_ty = self.tc.cxt.symbol(*sym).ty.expect("operand type");
            if !self.tc.cxt.is_public_sec(result_sec) && self.tc.cxt.is_public_type(sym_ty) {
                let (_, data, sdim) = self.tc.cxt.basic_parts(sym_ty).expect("basic");
                let target = self.tc.cxt.ty_basic(result_sec, data, sdim);
                *sym = self.classify_into(&mut result, *sym, target);
            }
        }

        // Broadcast scalars over the array side.
        if dim > 0 {
            let a_dim = {
                let ty = self.tc.cxt.symbol(a).ty.expect("operand type");
                self.tc.cxt.dim_of(ty)
            };
            let b_dim = {
                let ty = self.tc.cxt.symbol(b).ty.expect("operand type");
                self.tc.cxt.dim_of(ty)
            };
            if a_dim == 0 && b_dim > 0 {
                a = self.broadcast_scalar(&mut result, a, b, dim);
            } else if b_dim == 0 && a_dim > 0 {
                b = self.broadcast_scalar(&mut result, b, a, dim);
            }
        }

        let dest = self.generate_result_symbol(&mut result, result_ty);
        let opcode = Self::binary_opcode(op);
        if dim == 0 {
            self.push_imop_after(
                &mut result,
                Imop::new(opcode, [Some(dest), Some(a), Some(b)]),
            );
        } else {
            self.copy_shape_from(&mut result, dest, a);
            let size = self.get_size_or(dest, 0);
            self.push_imop_after(
                &mut result,
                Imop::new(opcode, [Some(dest), Some(a), Some(b), Some(size)]),
            );
        }

        self.release_temporary(&mut result, a, Some(dest));
        self.release_temporary(&mut result, b, Some(dest));
        Ok(result)
    }

    fn cg_unary(
        &mut self,
        e: &Expr,
        op: UnaryOp,
        inner: &Expr,
    ) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;

        if let Some(target) = self.tc.call_target(e.id) {
            return self.cg_overload_call(e, target, std::slice::from_ref(inner), result_ty);
        }

        let mut result = CGResult::new();
        let e_result = self.cg_expr(inner)?;
        let src = e_result.symbol().expect("operand");
        self.append(&mut result, e_result);

        let dest = self.generate_result_symbol(&mut result, result_ty);
        let opcode = Self::unary_opcode(op);
        if self.tc.cxt.is_scalar(result_ty) {
            self.push_imop_after(&mut result, Imop::new(opcode, [Some(dest), Some(src)]));
        } else {
            self.copy_shape_from(&mut result, dest, src);
            let size = self.get_size_or(dest, 0);
            self.push_imop_after(
                &mut result,
                Imop::new(opcode, [Some(dest), Some(src), Some(size)]),
            );
        }
        self.release_temporary(&mut result, src, Some(dest));
        Ok(result)
    }

    /*******************************************************************
      Calls
    *******************************************************************/

    /// Lower a call: push the flattened argument components, CALL,
    /// RETCLEAN, then PARAM each flattened return component.
    pub fn cg_call(
        &mut self,
        _e: &Expr,
        target: SymbolId,
        args: &[Expr],
        result_ty: TypeId,
    ) -> Result<CGResult, TypeError> {
        let mut result = CGResult::new();

        // Evaluate the arguments.
        let proc_ty = self.tc.cxt.symbol(target).ty.expect("procedure type");
        let param_tys = match self.tc.cxt.ty(proc_ty) {
            Type::Proc { params, .. } => params.clone(),
            _ => return Err(TypeError),
        };

        let mut arg_syms = Vec::with_capacity(args.len());
        for (arg, &param_ty) in args.iter().zip(&param_tys) {
            let a_result = self.cg_expr(arg)?;
            let mut sym = a_result.symbol().expect("argument value");
            self.append(&mut result, a_result);

            // Implicit classification of public arguments into private
            // parameters.
            let arg_ty = self.tc.cxt.symbol(sym).ty.expect("argument type");
            if self.tc.cxt.is_public_type(arg_ty) && !self.tc.cxt.is_public_type(param_ty) {
                sym = self.classify_into(&mut result, sym, param_ty);
            }
            arg_syms.push(sym);
        }

        // Push the flattened components in source order.
        for &sym in &arg_syms {
            for component in scc_core::flatten_symbol(&self.tc.cxt.symbols, sym) {
                self.push_imop_after(&mut result, Imop::new(Opcode::Push, [None, Some(component)]));
            }
        }

        let call = self.push_imop(Imop::new(Opcode::Call, [Some(target), None]));
        result.patch_first_imop(Some(call));
        {
            let pending = result.take_next_list();
            self.patch_jumps(&pending, call);
        }
        self.calls_to.entry(target).or_default().push(call);

        let call_label = self.tc.st.label(self.tc.cxt, call);
        self.push_imop(Imop::new(Opcode::RetClean, [None, None, Some(call_label)]));

        // Pop the flattened return components.
        if !self.tc.cxt.is_void(result_ty) {
            let dest = self.generate_result_symbol(&mut result, result_ty);
            for component in scc_core::flatten_symbol(&self.tc.cxt.symbols, dest) {
                self.push_imop(Imop::new(Opcode::Param, [Some(component)]));
            }
            self.codegen_size(&mut result, dest);
        }

        for sym in arg_syms {
            self.release_temporary(&mut result, sym, None);
        }

        Ok(result)
    }

    /// An overloaded operator or cast applied to operands: scalars call
    /// the definition directly; arrays loop over the elements.
    fn cg_overload_call(
        &mut self,
        e: &Expr,
        target: SymbolId,
        args: &[Expr],
        result_ty: TypeId,
    ) -> Result<CGResult, TypeError> {
        if self.tc.cxt.is_scalar(result_ty) {
            return self.cg_call(e, target, args, result_ty);
        }

        // Vectorised application of a scalar definition.
        let mut result = CGResult::new();
        let mut operand_syms = Vec::with_capacity(args.len());
        for arg in args {
            let a_result = self.cg_expr(arg)?;
            let sym = a_result.symbol().expect("operand");
            self.append(&mut result, a_result);
            operand_syms.push(sym);
        }

        let dim = self.tc.cxt.dim_of(result_ty);
        // Broadcast scalar operands.
        let array_operand = operand_syms
            .iter()
            .copied()
            .find(|&sym| {
                let ty = self.tc.cxt.symbol(sym).ty.expect("operand type");
                self.tc.cxt.dim_of(ty) > 0
            })
            .ok_or(TypeError)?;
        for sym in operand_syms.iter_mut() {
            let ty = self.tc.cxt.symbol(*sym).ty.expect("operand type");
            if self.tc.cxt.is_scalar(ty) {
                *sym = self.broadcast_scalar(&mut result, *sym, array_operand, dim);
            }
        }

        let dest = self.generate_result_symbol(&mut result, result_ty);
        self.copy_shape_from(&mut result, dest, array_operand);
        self.alloc_temporary_result(&mut result, dest, None);
        let size = self.get_size_or(dest, 0);

        // for i in 0 .. size { dest[i] = def(a[i], b[i]); }
        let index_ty = self.index_type();
        let zero = self.index_constant(0);
        let counter = self.new_temporary(index_ty);
        self.push_imop_after(&mut result, Imop::new(Opcode::Assign, [Some(counter), Some(zero)]));
        let bool_ty = self.bool_type();
        let guard = self.new_temporary(bool_ty);
        let test = self.push_imop(Imop::new(Opcode::Ge, [Some(guard), Some(counter), Some(size)]));
        let exit_jump = self.push_imop(Imop::new(Opcode::Jt, [None, Some(guard)]));

        // Load the elements and call the definition.
        let proc_ty = self.tc.cxt.symbol(target).ty.expect("operator type");
        let (param_tys, ret_ty) = match self.tc.cxt.ty(proc_ty) {
            Type::Proc { params, ret } => (params.clone(), *ret),
            _ => return Err(TypeError),
        };

        let mut elem_syms = Vec::new();
        for (&operand, &param_ty) in operand_syms.iter().zip(&param_tys) {
            let elem = self.new_temporary(param_ty);
            self.push_imop(Imop::new(
                Opcode::Load,
                [Some(elem), Some(operand), Some(counter)],
            ));
            elem_syms.push(elem);
        }
        for &elem in &elem_syms {
            self.push_imop(Imop::new(Opcode::Push, [None, Some(elem)]));
        }
        let call = self.push_imop(Imop::new(Opcode::Call, [Some(target), None]));
        self.calls_to.entry(target).or_default().push(call);
        let call_label = self.tc.st.label(self.tc.cxt, call);
        self.push_imop(Imop::new(Opcode::RetClean, [None, None, Some(call_label)]));
        let ret_elem = self.new_temporary(ret_ty);
        self.push_imop(Imop::new(Opcode::Param, [Some(ret_elem)]));
        self.push_imop(Imop::new(
            Opcode::Store,
            [Some(dest), Some(counter), Some(ret_elem)],
        ));

        let one = self.index_constant(1);
        self.push_imop(Imop::new(Opcode::Add, [Some(counter), Some(counter), Some(one)]));
        let back = self.push_imop(Imop::new(Opcode::Jump, [None]));
        self.patch_jumps(&[back], test);
        result.add_to_next_list(exit_jump);

        for sym in operand_syms {
            self.release_temporary(&mut result, sym, Some(dest));
        }

        Ok(result)
    }

    /*******************************************************************
      Arrays
    *******************************************************************/

    fn cg_index_read(
        &mut self,
        e: &Expr,
        subject: &Expr,
        subs: &[scc_ast::Subscript],
    ) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;
        let mut result = CGResult::new();
        let s_result = self.cg_expr(subject)?;
        let arr = s_result.symbol().expect("indexed value");
        self.append(&mut result, s_result);

        let info = self.codegen_subscript(&mut result, arr, subs, e.span)?;

        if self.tc.cxt.is_scalar(result_ty) {
            // All axes fixed: one LOAD at the flat offset.
            let strides = self.codegen_stride(&mut result, arr);
            let indices: Vec<SymbolId> = info.spv.iter().map(|(lo, _)| *lo).collect();
            let offset = self.codegen_flat_offset(&mut result, &strides, &indices);
            let dest = self.generate_result_symbol(&mut result, result_ty);
            self.push_imop_after(
                &mut result,
                Imop::new(Opcode::Load, [Some(dest), Some(arr), Some(offset)]),
            );
            self.release_temporary(&mut result, arr, Some(dest));
            return Ok(result);
        }

        // Slice read: dest dims are the slice extents.
        let dest = self.generate_result_symbol(&mut result, result_ty);
        let dest_info = self.tc.cxt.symbol(dest).variable().cloned().expect("array");
        for (slice_axis, dest_dim) in info.slices.iter().zip(&dest_info.dims) {
            let (lo, hi) = info.spv[*slice_axis];
            let hi = hi.expect("slice upper bound");
            self.push_imop_after(
                &mut result,
                Imop::new(Opcode::Sub, [Some(*dest_dim), Some(hi), Some(lo)]),
            );
        }
        self.codegen_size(&mut result, dest);
        self.alloc_temporary_result(&mut result, dest, None);

        // Loop the slice space, loading from the source and storing
        // consecutively into the destination.
        let strides = self.codegen_stride(&mut result, arr);
        let index_ty = self.index_type();
        let zero = self.index_constant(0);
        let counter = self.new_temporary(index_ty);
        self.push_imop_after(&mut result, Imop::new(Opcode::Assign, [Some(counter), Some(zero)]));

        let loop_info = self.enter_loop(&mut result, &info.spv);
        let mut body = CGResult::new();
        let offset = self.codegen_flat_offset(&mut body, &strides, &loop_info.indices);
        let elem_ty = {
            let (sec, data, _) = self.tc.cxt.basic_parts(result_ty).expect("basic");
            self.tc.cxt.ty_basic(sec, data, 0)
        };
        let elem = self.new_temporary(elem_ty);
        self.push_imop(Imop::new(Opcode::Load, [Some(elem), Some(arr), Some(offset)]));
        self.push_imop(Imop::new(
            Opcode::Store,
            [Some(dest), Some(counter), Some(elem)],
        ));
        let one = self.index_constant(1);
        self.push_imop(Imop::new(Opcode::Add, [Some(counter), Some(counter), Some(one)]));
        self.append(&mut result, body);

        let exit = self.exit_loop(loop_info);
        self.append(&mut result, exit);
        self.release_temporary(&mut result, arr, Some(dest));
        Ok(result)
    }

    fn cg_shape(&mut self, e: &Expr, inner: &Expr) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;
        let mut result = CGResult::new();
        let e_result = self.cg_expr(inner)?;
        let src = e_result.symbol().expect("shape operand");
        self.append(&mut result, e_result);

        let src_dims = self
            .tc
            .cxt
            .symbol(src)
            .variable()
            .map(|v| v.dims.clone())
            .unwrap_or_default();

        let dest = self.generate_result_symbol(&mut result, result_ty);
        let dest_info = self.tc.cxt.symbol(dest).variable().cloned().expect("array");
        let n = self.index_constant(src_dims.len() as u64);
        self.push_imop_after(
            &mut result,
            Imop::new(Opcode::Assign, [Some(dest_info.dims[0]), Some(n)]),
        );
        let size = dest_info.size.expect("size symbol");
        self.push_imop(Imop::new(Opcode::Assign, [Some(size), Some(n)]));
        let zero = self.index_constant(0);
        self.push_imop(Imop::new(Opcode::Alloc, [Some(dest), Some(size), Some(zero)]));
        for (i, dim) in src_dims.iter().enumerate() {
            let idx = self.index_constant(i as u64);
            self.push_imop(Imop::new(Opcode::Store, [Some(dest), Some(idx), Some(*dim)]));
        }
        self.release_temporary(&mut result, src, None);
        Ok(result)
    }

    fn cg_reshape(
        &mut self,
        e: &Expr,
        inner: &Expr,
        dims: &[Expr],
    ) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;
        let mut result = CGResult::new();
        let e_result = self.cg_expr(inner)?;
        let src = e_result.symbol().expect("reshape operand");
        self.append(&mut result, e_result);

        let dest = self.generate_result_symbol(&mut result, result_ty);
        let dest_info = self.tc.cxt.symbol(dest).variable().cloned().expect("array");

        for (dim_expr, dest_dim) in dims.iter().zip(&dest_info.dims) {
            let d_result = self.cg_expr(dim_expr)?;
            let val = d_result.symbol().expect("dimension value");
            self.append(&mut result, d_result);
            self.push_imop_after(
                &mut result,
                Imop::new(Opcode::Assign, [Some(*dest_dim), Some(val)]),
            );
        }
        self.codegen_size(&mut result, dest);

        // The element count must not change.
        let src_size = self.get_size_or(src, 1);
        let dest_size = dest_info.size.expect("size symbol");
        let bool_ty = self.bool_type();
        let guard = self.new_temporary(bool_ty);
        self.push_imop_after(
            &mut result,
            Imop::new(Opcode::Ne, [Some(guard), Some(dest_size), Some(src_size)]),
        );
        let fail = self.push_imop(Imop::new(Opcode::Jt, [None, Some(guard)]));
        let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));
        let err = self.new_error("Reshape size mismatch", e.span);
        self.patch_jumps(&[fail], err);
        result.add_to_next_list(skip);

        let src_ty = self.tc.cxt.symbol(src).ty.expect("operand type");
        if self.tc.cxt.is_scalar(src_ty) {
            let alloc =
                self.push_imop(Imop::new(Opcode::Alloc, [Some(dest), Some(dest_size), Some(src)]));
            let pending = result.take_next_list();
            self.patch_jumps(&pending, alloc);
        } else {
            let copy = self.push_imop(Imop::new(
                Opcode::Copy,
                [Some(dest), Some(src), Some(dest_size)],
            ));
            let pending = result.take_next_list();
            self.patch_jumps(&pending, copy);
        }
        self.release_temporary(&mut result, src, Some(dest));
        Ok(result)
    }

    fn cg_cat(
        &mut self,
        e: &Expr,
        lhs: &Expr,
        rhs: &Expr,
        axis: usize,
    ) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;
        let mut result = CGResult::new();

        let l_result = self.cg_expr(lhs)?;
        let a = l_result.symbol().expect("cat operand");
        self.append(&mut result, l_result);
        let r_result = self.cg_expr(rhs)?;
        let b = r_result.symbol().expect("cat operand");
        self.append(&mut result, r_result);

        let a_info = self.tc.cxt.symbol(a).variable().cloned().expect("array");
        let b_info = self.tc.cxt.symbol(b).variable().cloned().expect("array");

        // All axes but the concatenation axis must agree at runtime.
        let bool_ty = self.bool_type();
        let guard = self.new_temporary(bool_ty);
        let mut fails = Vec::new();
        for (i, (da, db)) in a_info.dims.iter().zip(&b_info.dims).enumerate() {
            if i == axis {
                continue;
            }
            self.push_imop_after(
                &mut result,
                Imop::new(Opcode::Ne, [Some(guard), Some(*da), Some(*db)]),
            );
            fails.push(self.push_imop(Imop::new(Opcode::Jt, [None, Some(guard)])));
        }
        if !fails.is_empty() {
            let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));
            let err = self.new_error("Shape mismatch in cat", e.span);
            self.patch_jumps(&fails, err);
            result.add_to_next_list(skip);
        }

        // Destination shape.
        let dest = self.generate_result_symbol(&mut result, result_ty);
        let dest_info = self.tc.cxt.symbol(dest).variable().cloned().expect("array");
        for (i, dest_dim) in dest_info.dims.iter().enumerate() {
            if i == axis {
                self.push_imop_after(
                    &mut result,
                    Imop::new(
                        Opcode::Add,
                        [Some(*dest_dim), Some(a_info.dims[i]), Some(b_info.dims[i])],
                    ),
                );
            } else {
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::Assign, [Some(*dest_dim), Some(a_info.dims[i])]),
                );
            }
        }
        self.codegen_size(&mut result, dest);
        self.alloc_temporary_result(&mut result, dest, None);

        let dest_strides = self.codegen_stride(&mut result, dest);
        let index_ty = self.index_type();

        // Copy each operand with a loop nest over its own index space;
        // the right-hand operand shifts the concatenation axis.
        for (operand, op_info, shift) in [
            (a, &a_info, None),
            (b, &b_info, Some(a_info.dims[axis])),
        ] {
            let op_strides = self.codegen_stride(&mut result, operand);
            let spv: Vec<(SymbolId, Option<SymbolId>)> = op_info
                .dims
                .iter()
                .map(|&dim| (self.tc.cxt.index_constant(0), Some(dim)))
                .collect();
            let loop_info = self.enter_loop(&mut result, &spv);

            let mut body = CGResult::new();
            let src_offset = self.codegen_flat_offset(&mut body, &op_strides, &loop_info.indices);
            let dest_indices: Vec<SymbolId> = match shift {
                None => loop_info.indices.clone(),
                Some(shift_dim) => {
                    let mut indices = loop_info.indices.clone();
                    let shifted = self.new_temporary(index_ty);
                    self.push_imop(Imop::new(
                        Opcode::Add,
                        [Some(shifted), Some(indices[axis]), Some(shift_dim)],
                    ));
                    indices[axis] = shifted;
                    indices
                }
            };
            let dest_offset = self.codegen_flat_offset(&mut body, &dest_strides, &dest_indices);

            let elem_ty = {
                let (sec, data, _) = self.tc.cxt.basic_parts(result_ty).expect("basic");
                self.tc.cxt.ty_basic(sec, data, 0)
            };
            let elem = self.new_temporary(elem_ty);
            self.push_imop(Imop::new(
                Opcode::Load,
                [Some(elem), Some(operand), Some(src_offset)],
            ));
            self.push_imop(Imop::new(
                Opcode::Store,
                [Some(dest), Some(dest_offset), Some(elem)],
            ));
            self.append(&mut result, body);

            let exit = self.exit_loop(loop_info);
            self.append(&mut result, exit);
        }

        self.release_temporary(&mut result, a, Some(dest));
        self.release_temporary(&mut result, b, Some(dest));
        Ok(result)
    }

    fn cg_ternary(
        &mut self,
        e: &Expr,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
    ) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;
        let cond_ty = self.expr_ty(cond)?;

        if self.tc.cxt.is_scalar(cond_ty) {
            let mut result = CGResult::new();
            let branch = self.cg_branch(cond)?;
            let CGBranchResult {
                result: cond_result,
                true_list,
                false_list,
            } = branch;
            self.append(&mut result, cond_result);

            let dest = self.generate_result_symbol(&mut result, result_ty);

            let t_result = self.cg_expr(then_expr)?;
            let t_first = t_result.first_imop();
            let t_sym = t_result.symbol().expect("branch value");
            let mut t_acc = CGResult::new();
            self.append(&mut t_acc, t_result);
            self.cg_init_temp_from(&mut t_acc, dest, t_sym);
            let t_entry = t_first.or(t_acc.first_imop());
            let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));

            let f_result = self.cg_expr(else_expr)?;
            let f_first = f_result.first_imop();
            let f_sym = f_result.symbol().expect("branch value");
            let mut f_acc = CGResult::new();
            self.append(&mut f_acc, f_result);
            self.cg_init_temp_from(&mut f_acc, dest, f_sym);
            let f_entry = f_first.or(f_acc.first_imop());

            if let Some(entry) = t_entry {
                self.patch_jumps(&true_list, entry);
            } else {
                result.extend_next_list(true_list);
            }
            if let Some(entry) = f_entry {
                self.patch_jumps(&false_list, entry);
            } else {
                result.extend_next_list(false_list);
            }
            result.extend_next_list(t_acc.take_next_list());
            result.extend_next_list(f_acc.take_next_list());
            result.add_to_next_list(skip);
            result.set_symbol(dest);
            return Ok(result);
        }

        // Element-wise selection over arrays.
        let mut result = CGResult::new();
        let c_result = self.cg_expr(cond)?;
        let c = c_result.symbol().expect("condition");
        self.append(&mut result, c_result);
        let t_result = self.cg_expr(then_expr)?;
        let t = t_result.symbol().expect("branch value");
        self.append(&mut result, t_result);
        let f_result = self.cg_expr(else_expr)?;
        let f = f_result.symbol().expect("branch value");
        self.append(&mut result, f_result);

        let dest = self.generate_result_symbol(&mut result, result_ty);
        self.copy_shape_from(&mut result, dest, c);
        self.alloc_temporary_result(&mut result, dest, None);
        let size = self.get_size_or(dest, 0);

        let index_ty = self.index_type();
        let bool_ty = self.bool_type();
        let zero = self.index_constant(0);
        let one = self.index_constant(1);
        let counter = self.new_temporary(index_ty);
        self.push_imop_after(&mut result, Imop::new(Opcode::Assign, [Some(counter), Some(zero)]));
        let guard = self.new_temporary(bool_ty);
        let test = self.push_imop(Imop::new(
            Opcode::Ge,
            [Some(guard), Some(counter), Some(size)],
        ));
        let exit = self.push_imop(Imop::new(Opcode::Jt, [None, Some(guard)]));

        let c_elem = self.new_temporary(bool_ty);
        self.push_imop(Imop::new(Opcode::Load, [Some(c_elem), Some(c), Some(counter)]));
        let elem_ty = {
            let (sec, data, _) = self.tc.cxt.basic_parts(result_ty).expect("basic");
            self.tc.cxt.ty_basic(sec, data, 0)
        };
        let elem = self.new_temporary(elem_ty);
        let pick_else = self.push_imop(Imop::new(Opcode::Jf, [None, Some(c_elem)]));
        self.push_imop(Imop::new(Opcode::Load, [Some(elem), Some(t), Some(counter)]));
        let join = self.push_imop(Imop::new(Opcode::Jump, [None]));
        let load_f = self.push_imop(Imop::new(Opcode::Load, [Some(elem), Some(f), Some(counter)]));
        self.patch_jumps(&[pick_else], load_f);
        let store = self.push_imop(Imop::new(
            Opcode::Store,
            [Some(dest), Some(counter), Some(elem)],
        ));
        self.patch_jumps(&[join], store);
        self.push_imop(Imop::new(Opcode::Add, [Some(counter), Some(counter), Some(one)]));
        let back = self.push_imop(Imop::new(Opcode::Jump, [None]));
        self.patch_jumps(&[back], test);
        result.add_to_next_list(exit);

        self.release_temporary(&mut result, c, Some(dest));
        self.release_temporary(&mut result, t, Some(dest));
        self.release_temporary(&mut result, f, Some(dest));
        Ok(result)
    }

    fn cg_array_ctor(&mut self, e: &Expr, elems: &[Expr]) -> Result<CGResult, TypeError> {
        let result_ty = self.expr_ty(e)?;
        let mut result = CGResult::new();

        let dest = self.generate_result_symbol(&mut result, result_ty);
        let dest_info = self.tc.cxt.symbol(dest).variable().cloned().expect("array");
        let n = self.index_constant(elems.len() as u64);
        self.push_imop_after(
            &mut result,
            Imop::new(Opcode::Assign, [Some(dest_info.dims[0]), Some(n)]),
        );
        let size = dest_info.size.expect("size symbol");
        self.push_imop(Imop::new(Opcode::Assign, [Some(size), Some(n)]));
        self.alloc_temporary_result(&mut result, dest, None);

        let result_sec = self.tc.cxt.sec_of(result_ty);
        for (i, elem) in elems.iter().enumerate() {
            let e_result = self.cg_expr(elem)?;
            let mut sym = e_result.symbol().expect("element value");
            self.append(&mut result, e_result);

            let elem_ty = self.tc.cxt.symbol(sym).ty.expect("element type");
            if !self.tc.cxt.is_public_sec(result_sec) && self.tc.cxt.is_public_type(elem_ty) {
                let (_, data, _) = self.tc.cxt.basic_parts(elem_ty).expect("basic");
                let target = self.tc.cxt.ty_basic(result_sec, data, 0);
                sym = self.classify_into(&mut result, sym, target);
            }

            let idx = self.index_constant(i as u64);
            self.push_imop_after(
                &mut result,
                Imop::new(Opcode::Store, [Some(dest), Some(idx), Some(sym)]),
            );
            self.release_temporary(&mut result, sym, None);
        }

        Ok(result)
    }

    /*******************************************************************
      Assignment
    *******************************************************************/

    fn cg_assign(
        &mut self,
        e: &Expr,
        op: Option<BinaryOp>,
        lval: &LValue,
        rhs: &Expr,
    ) -> Result<CGResult, TypeError> {
        let mut result = CGResult::new();
        let r_result = self.cg_expr(rhs)?;
        let mut rhs_sym = r_result.symbol().expect("assigned value");
        self.append(&mut result, r_result);

        match self.resolve_lvalue(lval)? {
            ResolvedLValue::Symbol(target) => {
                if let Some(op) = op {
                    // x op= e  ~>  t = x op e; x = t
                    let lhs_ty = self.tc.cxt.symbol(target).ty.expect("lvalue type");
                    rhs_sym = self.cg_apply_binop(&mut result, op, target, rhs_sym, lhs_ty)?;
                }
                self.cg_assign_symbol(&mut result, target, rhs_sym, e.span)?;
                result.set_symbol(target);
            }
            ResolvedLValue::Indexed { array, subs } => {
                let info = self.codegen_subscript(&mut result, array, &subs, e.span)?;
                let strides = self.codegen_stride(&mut result, array);

                if info.slices.is_empty() {
                    // Single element store.
                    let indices: Vec<SymbolId> = info.spv.iter().map(|(lo, _)| *lo).collect();
                    let offset = self.codegen_flat_offset(&mut result, &strides, &indices);
                    let array_ty = self.tc.cxt.symbol(array).ty.expect("array type");
                    let (sec, data, _) = self.tc.cxt.basic_parts(array_ty).expect("basic");
                    let elem_ty = self.tc.cxt.ty_basic(sec, data, 0);

                    if let Some(op) = op {
                        let old = self.new_temporary(elem_ty);
                        self.push_imop_after(
                            &mut result,
                            Imop::new(Opcode::Load, [Some(old), Some(array), Some(offset)]),
                        );
                        rhs_sym = self.cg_apply_binop(&mut result, op, old, rhs_sym, elem_ty)?;
                    }

                    let rhs_ty = self.tc.cxt.symbol(rhs_sym).ty.expect("value type");
                    if self.tc.cxt.is_public_type(rhs_ty) && !self.tc.cxt.is_public_sec(sec) {
                        rhs_sym = self.classify_into(&mut result, rhs_sym, elem_ty);
                    }
                    self.push_imop_after(
                        &mut result,
                        Imop::new(Opcode::Store, [Some(array), Some(offset), Some(rhs_sym)]),
                    );
                } else {
                    // Slice store: loop the slice space.
                    let index_ty = self.index_type();
                    let zero = self.index_constant(0);
                    let counter = self.new_temporary(index_ty);
                    self.push_imop_after(
                        &mut result,
                        Imop::new(Opcode::Assign, [Some(counter), Some(zero)]),
                    );

                    let rhs_ty = self.tc.cxt.symbol(rhs_sym).ty.expect("value type");
                    let rhs_scalar = self.tc.cxt.is_scalar(rhs_ty);

                    let loop_info = self.enter_loop(&mut result, &info.spv);
                    let mut body = CGResult::new();
                    let offset =
                        self.codegen_flat_offset(&mut body, &strides, &loop_info.indices);

                    let array_ty = self.tc.cxt.symbol(array).ty.expect("array type");
                    let (sec, data, _) = self.tc.cxt.basic_parts(array_ty).expect("basic");
                    let elem_ty = self.tc.cxt.ty_basic(sec, data, 0);
                    let elem = if rhs_scalar {
                        rhs_sym
                    } else {
                        let elem = self.new_temporary(elem_ty);
                        self.push_imop(Imop::new(
                            Opcode::Load,
                            [Some(elem), Some(rhs_sym), Some(counter)],
                        ));
                        elem
                    };
                    let elem = {
                        let elem_val_ty = self.tc.cxt.symbol(elem).ty.expect("element type");
                        if self.tc.cxt.is_public_type(elem_val_ty)
                            && !self.tc.cxt.is_public_sec(sec)
                        {
                            self.classify_into(&mut body, elem, elem_ty)
                        } else {
                            elem
                        }
                    };
                    self.push_imop(Imop::new(
                        Opcode::Store,
                        [Some(array), Some(offset), Some(elem)],
                    ));
                    let one = self.index_constant(1);
                    self.push_imop(Imop::new(
                        Opcode::Add,
                        [Some(counter), Some(counter), Some(one)],
                    ));
                    self.append(&mut result, body);

                    let exit = self.exit_loop(loop_info);
                    self.append(&mut result, exit);
                }

                self.release_temporary(&mut result, rhs_sym, None);
                result.set_symbol(array);
            }
        }

        Ok(result)
    }

    /// Initialize a fresh temporary from a value of the same type:
    /// scalars assign, arrays take over the source shape and copy. No
    /// runtime checks are needed since the types agree.
    pub fn cg_init_temp_from(&mut self, result: &mut CGResult, dest: SymbolId, src: SymbolId) {
        let ty = self.tc.cxt.symbol(dest).ty.expect("temporary type");
        let mut src = src;
        let src_ty = self.tc.cxt.symbol(src).ty.expect("value type");
        let sec = self.tc.cxt.sec_of(ty);
        if self.tc.cxt.is_public_type(src_ty) && !self.tc.cxt.is_public_sec(sec) {
            let (_, data, sdim) = self.tc.cxt.basic_parts(src_ty).expect("basic");
            let classified = self.tc.cxt.ty_basic(sec, data, sdim);
            src = self.classify_into(result, src, classified);
        }

        if self.tc.cxt.is_scalar(ty) {
            self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(dest), Some(src)]));
        } else {
            self.copy_shape_from(result, dest, src);
            let size = self.get_size_or(dest, 0);
            self.push_imop_after(
                result,
                Imop::new(Opcode::Copy, [Some(dest), Some(src), Some(size)]),
            );
        }
        self.release_temporary(result, src, None);
    }

    /// `t = a op b` over already-lowered operand symbols (for compound
    /// assignment and increments).
    fn cg_apply_binop(
        &mut self,
        result: &mut CGResult,
        op: BinaryOp,
        a: SymbolId,
        b: SymbolId,
        ty: TypeId,
    ) -> Result<SymbolId, TypeError> {
        let mut b = b;
        let b_ty = self.tc.cxt.symbol(b).ty.expect("operand type");
        let sec = self.tc.cxt.sec_of(ty);
        if self.tc.cxt.is_public_type(b_ty) && !self.tc.cxt.is_public_sec(sec) {
            let (_, data, bdim) = self.tc.cxt.basic_parts(b_ty).expect("basic");
            let target = self.tc.cxt.ty_basic(sec, data, bdim);
            b = self.classify_into(result, b, target);
        }

        let dest = self.new_temporary(ty);
        let opcode = Self::binary_opcode(op);
        if self.tc.cxt.is_scalar(ty) {
            self.push_imop_after(result, Imop::new(opcode, [Some(dest), Some(a), Some(b)]));
        } else {
            self.copy_shape_from(result, dest, a);
            let size = self.get_size_or(dest, 0);
            let b_dim = {
                let b_ty = self.tc.cxt.symbol(b).ty.expect("operand type");
                self.tc.cxt.dim_of(b_ty)
            };
            let dim = self.tc.cxt.dim_of(ty);
            if b_dim == 0 {
                b = self.broadcast_scalar(result, b, a, dim);
            }
            self.push_imop_after(
                result,
                Imop::new(opcode, [Some(dest), Some(a), Some(b), Some(size)]),
            );
        }
        Ok(dest)
    }

    /// Store `rhs` into the variable `target`, handling classify, the
    /// runtime shape check, release of the overwritten value, and struct
    /// recursion.
    pub fn cg_assign_symbol(
        &mut self,
        result: &mut CGResult,
        target: SymbolId,
        rhs: SymbolId,
        span: Span,
    ) -> Result<(), TypeError> {
        let target_ty = self.tc.cxt.symbol(target).ty.expect("target type");

        // Struct assignment recurses into the fields.
        let target_fields = self
            .tc
            .cxt
            .symbol(target)
            .variable()
            .map(|i| i.fields.clone())
            .unwrap_or_default();
        if !target_fields.is_empty() {
            let rhs_fields = self
                .tc
                .cxt
                .symbol(rhs)
                .variable()
                .map(|i| i.fields.clone())
                .unwrap_or_default();
            for (t, r) in target_fields.iter().zip(&rhs_fields) {
                self.cg_assign_symbol(result, *t, *r, span)?;
            }
            return Ok(());
        }

        let mut rhs = rhs;
        let rhs_ty = self.tc.cxt.symbol(rhs).ty.expect("value type");
        let target_sec = self.tc.cxt.sec_of(target_ty);
        if self.tc.cxt.is_public_type(rhs_ty) && !self.tc.cxt.is_public_sec(target_sec) {
            let (_, data, rdim) = self.tc.cxt.basic_parts(rhs_ty).expect("basic");
            let classified_ty = self.tc.cxt.ty_basic(target_sec, data, rdim);
            rhs = self.classify_into(result, rhs, classified_ty);
        }

        if self.tc.cxt.is_scalar(target_ty) {
            self.push_imop_after(result, Imop::new(Opcode::Assign, [Some(target), Some(rhs)]));
            self.release_temporary(result, rhs, None);
            return Ok(());
        }

        let rhs_ty = self.tc.cxt.symbol(rhs).ty.expect("value type");
        if self.tc.cxt.is_scalar(rhs_ty) {
            // Fill the existing shape with the scalar.
            self.release_resource(result, target);
            let size = self.get_size_or(target, 0);
            self.push_imop_after(
                result,
                Imop::new(Opcode::Alloc, [Some(target), Some(size), Some(rhs)]),
            );
            self.release_temporary(result, rhs, None);
            return Ok(());
        }

        // Array into array: the shapes must agree at runtime.
        let target_info = self.tc.cxt.symbol(target).variable().cloned().expect("array");
        let rhs_info = self.tc.cxt.symbol(rhs).variable().cloned().expect("array");
        let bool_ty = self.bool_type();
        let guard = self.new_temporary(bool_ty);
        let mut fails = Vec::new();
        for (t, r) in target_info.dims.iter().zip(&rhs_info.dims) {
            self.push_imop_after(result, Imop::new(Opcode::Ne, [Some(guard), Some(*r), Some(*t)]));
            fails.push(self.push_imop(Imop::new(Opcode::Jt, [None, Some(guard)])));
        }

        if !fails.is_empty() {
            let skip = self.push_imop(Imop::new(Opcode::Jump, [None]));
            let err = self.new_error("Shape mismatch", span);
            self.patch_jumps(&fails, err);

            let release_first = {
                let mut tail = CGResult::new();
                self.release_resource(&mut tail, target);
                let size = self.get_size_or(target, 0);
                let copy = self.push_imop(Imop::new(
                    Opcode::Copy,
                    [Some(target), Some(rhs), Some(size)],
                ));
                tail.patch_first_imop(Some(copy));
                tail.first_imop().unwrap_or(copy)
            };
            self.patch_jumps(&[skip], release_first);
        } else {
            self.release_resource(result, target);
            let size = self.get_size_or(target, 0);
            self.push_imop_after(
                result,
                Imop::new(Opcode::Copy, [Some(target), Some(rhs), Some(size)]),
            );
        }

        self.release_temporary(result, rhs, None);
        Ok(())
    }

    fn cg_inc_dec(
        &mut self,
        e: &Expr,
        lval: &LValue,
        is_inc: bool,
        is_prefix: bool,
    ) -> Result<CGResult, TypeError> {
        let mut result = CGResult::new();
        let target = match self.resolve_lvalue(lval)? {
            ResolvedLValue::Symbol(sym) => sym,
            ResolvedLValue::Indexed { array, subs } => {
                // x[i]++ loads the element, updates it in place, and
                // yields the appropriate snapshot.
                let info = self.codegen_subscript(&mut result, array, &subs, e.span)?;
                let strides = self.codegen_stride(&mut result, array);
                let indices: Vec<SymbolId> = info.spv.iter().map(|(lo, _)| *lo).collect();
                let offset = self.codegen_flat_offset(&mut result, &strides, &indices);

                let array_ty = self.tc.cxt.symbol(array).ty.expect("array type");
                let (sec, data, _) = self.tc.cxt.basic_parts(array_ty).expect("basic");
                let elem_ty = self.tc.cxt.ty_basic(sec, data, 0);
                let old = self.new_temporary(elem_ty);
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::Load, [Some(old), Some(array), Some(offset)]),
                );

                let prim = self.concrete_prim(elem_ty);
                let mut one = self.tc.cxt.numeric_constant(prim, 1);
                if !self.tc.cxt.is_public_sec(sec) {
                    one = self.classify_into(&mut result, one, elem_ty);
                }
                let new = self.new_temporary(elem_ty);
                let opcode = if is_inc { Opcode::Add } else { Opcode::Sub };
                self.push_imop(Imop::new(opcode, [Some(new), Some(old), Some(one)]));
                self.push_imop(Imop::new(
                    Opcode::Store,
                    [Some(array), Some(offset), Some(new)],
                ));

                result.set_symbol(if is_prefix { new } else { old });
                return Ok(result);
            }
        };

        let ty = self.tc.cxt.symbol(target).ty.expect("lvalue type");
        let prim = self.concrete_prim(ty);
        let mut one = self.tc.cxt.numeric_constant(prim, 1);

        let sec = self.tc.cxt.sec_of(ty);
        if !self.tc.cxt.is_public_sec(sec) {
            let (_, data, _) = self.tc.cxt.basic_parts(ty).expect("basic");
            let scalar_private = self.tc.cxt.ty_basic(sec, data, 0);
            one = self.classify_into(&mut result, one, scalar_private);
        }

        // Postfix yields the value before the update.
        let returned = if !is_prefix {
            let copy = self.new_temporary(ty);
            if self.tc.cxt.is_scalar(ty) {
                self.push_imop_after(&mut result, Imop::new(Opcode::Declare, [Some(copy)]));
                self.push_imop(Imop::new(Opcode::Assign, [Some(copy), Some(target)]));
            } else {
                self.copy_shape_from(&mut result, copy, target);
                let size = self.get_size_or(copy, 0);
                self.push_imop_after(
                    &mut result,
                    Imop::new(Opcode::Copy, [Some(copy), Some(target), Some(size)]),
                );
            }
            copy
        } else {
            target
        };

        let opcode = if is_inc { Opcode::Add } else { Opcode::Sub };
        if self.tc.cxt.is_scalar(ty) {
            self.push_imop_after(
                &mut result,
                Imop::new(opcode, [Some(target), Some(target), Some(one)]),
            );
        } else {
            let size = self.get_size_or(target, 0);
            let dim = self.tc.cxt.dim_of(ty);
            let spread = self.broadcast_scalar(&mut result, one, target, dim);
            self.push_imop_after(
                &mut result,
                Imop::new(opcode, [Some(target), Some(target), Some(spread), Some(size)]),
            );
        }

        result.set_symbol(returned);
        Ok(result)
    }

    pub(crate) fn resolve_lvalue(&mut self, lval: &LValue) -> Result<ResolvedLValue, TypeError> {
        match &lval.kind {
            LValueKind::Var(id) => {
                let sym = self.tc.var_symbol(id.id).ok_or(TypeError)?;
                Ok(ResolvedLValue::Symbol(sym))
            }
            LValueKind::Select { lval: inner, field } => {
                let inner = self.resolve_lvalue(inner)?;
                let base = match inner {
                    ResolvedLValue::Symbol(sym) => sym,
                    ResolvedLValue::Indexed { .. } => return Err(TypeError),
                };
                let base_ty = self.tc.cxt.symbol(base).ty.expect("lvalue type");
                let data = self.tc.cxt.data_of(base_ty);
                let index = match self.tc.cxt.data_type(data) {
                    scc_core::DataType::Struct { fields, .. } => fields
                        .iter()
                        .position(|f| f.name == field.name)
                        .ok_or(TypeError)?,
                    _ => return Err(TypeError),
                };
                let sym = self
                    .tc
                    .cxt
                    .symbol(base)
                    .variable()
                    .and_then(|info| info.fields.get(index).copied())
                    .ok_or(TypeError)?;
                Ok(ResolvedLValue::Symbol(sym))
            }
            LValueKind::Index { lval: inner, subs } => {
                let inner = self.resolve_lvalue(inner)?;
                let array = match inner {
                    ResolvedLValue::Symbol(sym) => sym,
                    ResolvedLValue::Indexed { .. } => return Err(TypeError),
                };
                Ok(ResolvedLValue::Indexed {
                    array,
                    subs: subs.clone(),
                })
            }
        }
    }

    /*******************************************************************
      Branch lowering
    *******************************************************************/

    /// Lower a public boolean expression for control flow, producing
    /// true/false jump lists. Logical operators short-circuit.
    pub fn cg_branch(&mut self, e: &Expr) -> Result<CGBranchResult, TypeError> {
        match &e.kind {
            ExprKind::BoolLit(value) => {
                let mut branch = CGBranchResult::new();
                let jump = self.push_imop(Imop::new(Opcode::Jump, [None]));
                branch.patch_first_imop(Some(jump));
                if *value {
                    branch.true_list.push(jump);
                } else {
                    branch.false_list.push(jump);
                }
                Ok(branch)
            }
            ExprKind::Unary {
                op: UnaryOp::Neg,
                expr,
            } if self.is_public_bool_scalar_expr(expr) && self.tc.call_target(e.id).is_none() => {
                let mut branch = self.cg_branch(expr)?;
                std::mem::swap(&mut branch.true_list, &mut branch.false_list);
                Ok(branch)
            }
            ExprKind::Binary {
                op: op @ (BinaryOp::Land | BinaryOp::Lor),
                lhs,
                rhs,
            } if self.is_public_bool_scalar_expr(lhs) && self.tc.call_target(e.id).is_none() => {
                let mut lhs_branch = self.cg_branch(lhs)?;
                let rhs_branch = self.cg_branch(rhs)?;
                let mut branch = CGBranchResult::new();
                branch.result.patch_first_imop(lhs_branch.first_imop());

                let rhs_first = rhs_branch.first_imop().ok_or(TypeError)?;
                match op {
                    BinaryOp::Land => {
                        self.patch_jumps(&lhs_branch.true_list, rhs_first);
                        branch.false_list.append(&mut lhs_branch.false_list);
                        branch.true_list = rhs_branch.true_list;
                        branch.false_list.extend(rhs_branch.false_list);
                    }
                    _ => {
                        self.patch_jumps(&lhs_branch.false_list, rhs_first);
                        branch.true_list.append(&mut lhs_branch.true_list);
                        branch.true_list.extend(rhs_branch.true_list);
                        branch.false_list = rhs_branch.false_list;
                    }
                }
                Ok(branch)
            }
            _ => {
                let result = self.cg_expr(e)?;
                let sym = result.symbol().expect("branch value");
                let mut branch = CGBranchResult::new();
                branch.result = result;
                let jt = self.push_imop(Imop::new(Opcode::Jt, [None, Some(sym)]));
                branch.patch_first_imop(Some(jt));
                {
                    let pending = branch.result.take_next_list();
                    self.patch_jumps(&pending, jt);
                }
                let jf = self.push_imop(Imop::new(Opcode::Jump, [None]));
                branch.true_list.push(jt);
                branch.false_list.push(jf);
                Ok(branch)
            }
        }
    }

    fn is_public_bool_scalar_expr(&self, e: &Expr) -> bool {
        self.tc
            .expr_type(e.id)
            .map(|ty| self.tc.cxt.is_public_bool_scalar(ty))
            .unwrap_or(false)
    }

    /// Look through a symbol to a compile-time constant, for tests.
    pub fn const_of(&self, sym: SymbolId) -> Option<&ConstValue> {
        match &self.tc.cxt.symbol(sym).kind {
            SymbolKind::Constant { value } => Some(value),
            _ => None,
        }
    }
}

pub(crate) enum ResolvedLValue {
    Symbol(SymbolId),
    Indexed {
        array: SymbolId,
        subs: Vec<scc_ast::Subscript>,
    },
}

impl CGResult {
    /// Attach this result's symbol to an accumulated sequence.
    fn merged(self, mut acc: CGResult) -> CGResult {
        if let Some(sym) = self.symbol() {
            acc.set_symbol(sym);
        }
        acc
    }
}
