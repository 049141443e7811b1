//! Procedure signatures, overload resolution and best-match selection.

use crate::checker::{TcResult, TypeChecker, TypeError};
use crate::templates::Instantiation;
use crate::unify::{CastTypeUnifier, OperatorTypeUnifier, TypeUnifier};
use scc_ast::{Prim, ProcDef, TypeExprKind};
use scc_common::{Atom, Span};
use scc_core::{
    ProcedureInfo, SecTypeId, Symbol, SymbolId, SymbolKind, SymCategory, Type, TypeArgument,
    TypeId, Weight, GLOBAL_SCOPE,
};
use std::rc::Rc;

impl<'a> TypeChecker<'a> {
    /// Elaborate the parameter types of a definition.
    pub fn populate_param_types(&mut self, proc: &ProcDef) -> TcResult<Vec<TypeId>> {
        let mut params = Vec::with_capacity(proc.params.len());
        for param in &proc.params {
            let ty = self.visit_type_expr(&param.ty)?;
            if self.cxt.is_void(ty) {
                return Err(self.fatal(param.span, "procedure parameter may not be void"));
            }
            params.push(ty);
        }
        Ok(params)
    }

    /// Elaborate a definition's signature and create its procedure
    /// symbol. For template instances the symbol name carries the type
    /// arguments and the symbol lands in the global scope.
    pub fn visit_proc_def_signature(
        &mut self,
        decl: &Rc<ProcDef>,
        instance_args: Option<&[TypeArgument]>,
    ) -> TcResult<SymbolId> {
        let ret = self.visit_type_expr(&decl.ret)?;
        let params = self.populate_param_types(decl)?;
        let proc_ty = self.cxt.ty_proc(params, ret);

        let (name, scope) = match instance_args {
            None => (decl.name.name, self.scope),
            Some(args) => {
                let base = self.cxt.interner.resolve(decl.name.name).to_owned();
                let mut mangled = format!("{base}<");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        mangled.push(',');
                    }
                    mangled.push_str(&self.cxt.type_arg_string(*arg));
                }
                mangled.push('>');
                (self.cxt.interner.intern(&mangled), GLOBAL_SCOPE)
            }
        };

        if instance_args.is_none() {
            // Redefinition check: an identical signature may appear once.
            for existing in self
                .st
                .find_all(self.cxt, scope, SymCategory::Procedure, name)
            {
                if self.cxt.symbol(existing).ty == Some(proc_ty) {
                    let shown = self.cxt.interner.resolve(name).to_owned();
                    return Err(self.fatal(
                        decl.span,
                        format!("redefinition of procedure '{shown}' with identical signature"),
                    ));
                }
            }
        }

        let sym = self.cxt.symbols.alloc(Symbol {
            name,
            ty: Some(proc_ty),
            kind: SymbolKind::Procedure(Box::new(ProcedureInfo {
                target: None,
                decl: Some(decl.clone()),
                block: None,
            })),
            file: self.file,
            span: decl.span,
        });
        self.st.append_symbol(scope, sym);
        self.proc_symbols.insert(decl.id, sym);
        Ok(sym)
    }

    /// Whether a regular procedure's parameter accepts the given argument
    /// type: equal dimensionalities, security no higher than the
    /// parameter's, and data types equal up to the declassify rule.
    fn param_accepts(&mut self, param: TypeId, arg: TypeId) -> bool {
        let (psec, pdata, pdim) = match self.cxt.basic_parts(param) {
            Some(parts) => parts,
            None => return false,
        };
        let (asec, adata, adim) = match self.cxt.basic_parts(arg) {
            Some(parts) => parts,
            None => return false,
        };

        if pdim != adim {
            return false;
        }
        if !self.cxt.lattice_sec_leq(asec, psec) {
            return false;
        }
        if pdata == adata {
            return true;
        }
        // A public argument classifies into a private parameter when its
        // data type is the parameter's public representation.
        if self.cxt.is_public_sec(asec) && !self.cxt.is_public_sec(psec) {
            if let Some(decl) = self.cxt.dtype_declassify(psec, pdata) {
                return decl == adata;
            }
        }
        false
    }

    /// Best-match selection over regular procedures and templates.
    ///
    /// Returns `Ok(None)` when nothing matches; ambiguity is an error.
    pub fn find_best_matching_proc(
        &mut self,
        name: Atom,
        context_sec: Option<SecTypeId>,
        arg_types: &[TypeId],
        span: Span,
    ) -> TcResult<Option<SymbolId>> {
        // Regular procedures always beat templates.
        let mut regular: Option<SymbolId> = None;
        for sym in self
            .st
            .find_all(self.cxt, self.scope, SymCategory::Procedure, name)
        {
            let proc_ty = match self.cxt.symbol(sym).ty {
                Some(ty) => ty,
                None => continue,
            };
            let (params, ret) = match self.cxt.ty(proc_ty) {
                Type::Proc { params, ret } => (params.clone(), *ret),
                _ => continue,
            };
            if params.len() != arg_types.len() {
                continue;
            }
            if !params
                .iter()
                .zip(arg_types)
                .all(|(&p, &a)| self.param_accepts(p, a))
            {
                continue;
            }
            if let Some(context) = context_sec {
                if !self.cxt.is_void(ret) && self.cxt.sec_of(ret) != context {
                    continue;
                }
            }

            if regular.is_some() {
                let shown = self.cxt.interner.resolve(name).to_owned();
                return Err(self.fatal(
                    span,
                    format!("multiple matching procedures for call to '{shown}'"),
                ));
            }
            regular = Some(sym);
        }

        if regular.is_some() {
            return Ok(regular);
        }

        // Templates, ranked by lexicographic weight.
        let mut best = Weight::WORST;
        let mut best_matches: Vec<Instantiation> = Vec::new();
        for templ in self
            .st
            .find_all(self.cxt, self.scope, SymCategory::ProcTemplate, name)
        {
            let info = match &self.cxt.symbol(templ).kind {
                SymbolKind::ProcTemplate(info) => (**info).clone(),
                _ => continue,
            };
            if info.decl.body.params.len() != arg_types.len() {
                continue;
            }
            if info.context_dependent && context_sec.is_none() {
                continue;
            }

            let mut unifier = TypeUnifier::new(&info.decl.quantifiers);
            let mut ok = true;
            for (param, &arg) in info.decl.body.params.iter().zip(arg_types) {
                if !unifier.visit_type(self, &param.ty, arg) {
                    ok = false;
                    break;
                }
            }
            if ok {
                if let Some(context) = context_sec {
                    if !matches!(info.decl.body.ret.kind, TypeExprKind::Void)
                        && !unifier.visit_return_context(self, &info.decl.body.ret, context)
                    {
                        ok = false;
                    }
                }
            }
            if !ok {
                continue;
            }

            let args = match unifier.type_arguments(self, &info.decl.quantifiers) {
                Some(args) => args,
                None => continue,
            };

            let weight = info.weight;
            if weight > best {
                continue;
            }
            if weight < best {
                best_matches.clear();
                best = weight;
            }
            best_matches.push(Instantiation { templ, args });
        }

        if best_matches.is_empty() {
            return Ok(None);
        }

        if best_matches.len() > 1 {
            let mut message = String::from("multiple matching templates:");
            for inst in &best_matches {
                let sym = self.cxt.symbol(inst.templ);
                let loc = self.sources.location(sym.file, sym.span);
                message.push_str(&format!(" {loc}"));
            }
            return Err(self.fatal(span, message));
        }

        let inst = best_matches.pop().expect("single best match");
        self.get_instance(&inst).map(Some)
    }

    /// Overload resolution for operators. Argument types are taken at
    /// scalar rank; vectorisation is handled during lowering.
    pub fn find_best_matching_op(
        &mut self,
        name: Atom,
        arg_types: &[TypeId],
        span: Span,
    ) -> TcResult<Option<SymbolId>> {
        // Regular (non-template) operator definitions first.
        let mut regular: Option<SymbolId> = None;
        let lub = match arg_types {
            [single] => Some(self.cxt.sec_of(*single)),
            [a, b] => {
                let asec = self.cxt.sec_of(*a);
                let bsec = self.cxt.sec_of(*b);
                self.cxt.upper_sec_type(asec, bsec)
            }
            _ => None,
        };

        for sym in self
            .st
            .find_all(self.cxt, self.scope, SymCategory::Procedure, name)
        {
            let proc_ty = match self.cxt.symbol(sym).ty {
                Some(ty) => ty,
                None => continue,
            };
            let (params, ret) = match self.cxt.ty(proc_ty) {
                Type::Proc { params, ret } => (params.clone(), *ret),
                _ => continue,
            };
            if params.len() != arg_types.len() {
                continue;
            }
            if !params
                .iter()
                .zip(arg_types)
                .all(|(&p, &a)| self.param_accepts(p, a))
            {
                continue;
            }
            // For a definition without quantifiers the return security
            // must be the join of the operands.
            match (lub, self.cxt.basic_parts(ret)) {
                (Some(lub), Some((ret_sec, _, _))) if ret_sec == lub => {}
                _ => continue,
            }

            if regular.is_some() {
                return Err(self.fatal(span, "multiple matching operator definitions"));
            }
            regular = Some(sym);
        }

        if regular.is_some() {
            return Ok(regular);
        }

        let mut best = Weight::WORST;
        let mut best_matches: Vec<Instantiation> = Vec::new();
        for templ in self
            .st
            .find_all(self.cxt, self.scope, SymCategory::OpTemplate, name)
        {
            let info = match &self.cxt.symbol(templ).kind {
                SymbolKind::OpTemplate(info) => (**info).clone(),
                _ => continue,
            };
            if info.decl.body.params.len() != arg_types.len() {
                continue;
            }

            let mut unifier = match OperatorTypeUnifier::new(self, arg_types, templ) {
                Some(unifier) => unifier,
                None => continue,
            };
            let mut ok = true;
            for (param, &arg) in info.decl.body.params.iter().zip(arg_types) {
                if !unifier.visit_type(self, &param.ty, arg) {
                    ok = false;
                    break;
                }
            }
            if !ok || !unifier.check_kind(self) || !unifier.check_sec_lub(self, &info.decl.body.ret)
            {
                continue;
            }

            let args = match unifier.type_arguments(&info.decl.quantifiers) {
                Some(args) => args,
                None => continue,
            };

            let weight = Weight::new(
                info.decl.quantifiers.len() as u32,
                info.quantified_param_count,
                info.domain_weight,
            );
            if weight > best {
                continue;
            }
            if weight < best {
                best_matches.clear();
                best = weight;
            }
            best_matches.push(Instantiation { templ, args });
        }

        if best_matches.is_empty() {
            return Ok(None);
        }
        if best_matches.len() > 1 {
            return Err(self.fatal(span, "multiple matching operator templates"));
        }

        let inst = best_matches.pop().expect("single best match");
        self.get_instance(&inst).map(Some)
    }

    /// Overload resolution for casts: the parameter must unify with the
    /// source type and the declared return data type with the target.
    pub fn find_best_matching_cast(
        &mut self,
        arg_type: TypeId,
        target: Prim,
        span: Span,
    ) -> TcResult<Option<SymbolId>> {
        let name = {
            let mangled = scc_ast::OverloadOp::Cast.name();
            self.cxt.interner.intern(&mangled)
        };

        let mut best = Weight::WORST;
        let mut best_matches: Vec<Instantiation> = Vec::new();
        for templ in self
            .st
            .find_all(self.cxt, self.scope, SymCategory::OpTemplate, name)
        {
            let info = match &self.cxt.symbol(templ).kind {
                SymbolKind::OpTemplate(info) => (**info).clone(),
                _ => continue,
            };
            if info.decl.body.params.len() != 1 {
                continue;
            }

            let mut unifier = CastTypeUnifier::new(self, arg_type, templ);
            if !unifier.visit_type(self, &info.decl.body.params[0].ty, arg_type) {
                continue;
            }
            if !unifier.visit_target(self, &info.decl.body.ret, target) {
                continue;
            }
            if !unifier.check_kind(self) || !unifier.check_sec_lub(self, &info.decl.body.ret) {
                continue;
            }

            let args = match unifier.type_arguments(&info.decl.quantifiers) {
                Some(args) => args,
                None => continue,
            };

            let weight = Weight::new(
                info.decl.quantifiers.len() as u32,
                info.quantified_param_count,
                info.domain_weight,
            );
            if weight > best {
                continue;
            }
            if weight < best {
                best_matches.clear();
                best = weight;
            }
            best_matches.push(Instantiation { templ, args });
        }

        if best_matches.is_empty() {
            return Ok(None);
        }
        if best_matches.len() > 1 {
            return Err(self.fatal(span, "multiple matching cast definitions"));
        }

        let inst = best_matches.pop().expect("single best match");
        self.get_instance(&inst).map(Some)
    }

    /// The monomorphic procedure symbol of an instantiation, elaborating
    /// the cloned body's signature on first use. The body statements are
    /// elaborated later, when the code generator drains the worklist.
    pub fn get_instance(&mut self, inst: &Instantiation) -> TcResult<SymbolId> {
        let info = self
            .instantiator
            .add(inst, self.cxt, self.st, self.idgen);
        if let Some(sym) = info.symbol {
            return Ok(sym);
        }

        let saved_scope = self.scope;
        let saved_file = self.file;
        self.scope = info.scope;
        self.file = info.file;
        let result = self.visit_proc_def_signature(&info.body, Some(&inst.args));
        self.scope = saved_scope;
        self.file = saved_file;

        let sym = result?;
        self.instantiator.set_symbol(inst, sym);
        Ok(sym)
    }

    /// Type check a call `name(args...)` and resolve its target.
    pub fn check_proc_call(
        &mut self,
        call_id: scc_ast::NodeId,
        name: &scc_ast::Ident,
        args: &[scc_ast::Expr],
        context_sec: Option<SecTypeId>,
        span: Span,
    ) -> TcResult<TypeId> {
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            let ty = self.visit_expr(arg, crate::checker::TypeContext::new())?;
            if self.cxt.is_void(ty) {
                return Err(self.fatal(arg.span, "procedure argument may not be void"));
            }
            arg_types.push(ty);
        }

        // Literal arguments take their default concrete types before
        // overload resolution.
        for (arg, ty) in args.iter().zip(arg_types.iter_mut()) {
            *ty = self.default_instantiate(arg, *ty)?;
        }

        let sym = self.find_best_matching_proc(name.name, context_sec, &arg_types, span)?;
        let sym = match sym {
            Some(sym) => sym,
            None => {
                let shown = self.cxt.interner.resolve(name.name).to_owned();
                return Err(self.fatal(
                    span,
                    format!("no matching procedure definitions for call to '{shown}'"),
                ));
            }
        };

        self.call_targets.insert(call_id, sym);

        let proc_ty = self.cxt.symbol(sym).ty.expect("procedure type");
        let ret = match self.cxt.ty(proc_ty) {
            Type::Proc { ret, .. } => *ret,
            _ => return Err(TypeError),
        };
        Ok(ret)
    }
}
