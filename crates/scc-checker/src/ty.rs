//! Elaboration of syntactic type expressions into interned types.

use crate::checker::{TcResult, TypeChecker, TypeError};
use scc_ast::{
    DataTypeExpr, DataTypeExprKind, DimTypeExpr, DimTypeExprKind, Quantifier, QuantifierKind,
    SecTypeExpr, SecTypeExprKind, StructDecl, TypeArgExpr, TypeArgExprKind, TypeExpr, TypeExprKind,
};
use scc_common::Span;
use scc_core::{
    DataType, DataTypeId, DimType, ScopeId, SecTypeId, SecurityType, StructField, Symbol,
    SymbolId, SymbolKind, SymCategory, TypeArgument, TypeId, GLOBAL_SCOPE,
};
use std::rc::Rc;

impl<'a> TypeChecker<'a> {
    pub fn visit_type_expr(&mut self, t: &TypeExpr) -> TcResult<TypeId> {
        if let Some(&cached) = self.type_expr_cache.get(&t.id) {
            return Ok(cached);
        }

        let ty = match &t.kind {
            TypeExprKind::Void => self.cxt.ty_void(),
            TypeExprKind::Basic { sec, data, dim } => {
                let sec_ty = self.visit_sec_type(sec)?;
                let data_ty = self.visit_data_type(data)?;
                let dim_ty = self.visit_dim_type(dim)?;

                if self.cxt.is_public_sec(sec_ty) {
                    if let Some(p) = self.cxt.prim_of(data_ty) {
                        if p.is_xor() {
                            return Err(self.fatal(
                                t.span,
                                "XOR types do not have public representation",
                            ));
                        }
                    }
                    if self.cxt.data_type(data_ty).is_user_primitive() {
                        let shown = self.cxt.data_type_string(data_ty);
                        return Err(self.fatal(
                            t.span,
                            format!("data type {shown} requires a private protection domain"),
                        ));
                    }
                } else if let DataType::UserPrim { name } = self.cxt.data_type(data_ty) {
                    let name = *name;
                    let kind = match self.cxt.sec_type(sec_ty) {
                        SecurityType::Private { kind, .. } => *kind,
                        SecurityType::Public => unreachable!(),
                    };
                    if self.cxt.kind_type_params(kind, name).is_none() {
                        let shown = self.cxt.interner.resolve(name).to_owned();
                        let dom = self.cxt.sec_type_string(sec_ty);
                        return Err(self.fatal(
                            t.span,
                            format!("data type {shown} is not declared by the kind of domain {dom}"),
                        ));
                    }
                }

                self.cxt.ty_basic(sec_ty, data_ty, dim_ty)
            }
        };

        self.type_expr_cache.insert(t.id, ty);
        Ok(ty)
    }

    pub fn visit_sec_type(&mut self, t: &SecTypeExpr) -> TcResult<SecTypeId> {
        match &t.kind {
            SecTypeExprKind::Public => Ok(self.cxt.sec_public()),
            SecTypeExprKind::Named(id) => {
                let sym = self
                    .st
                    .find(self.cxt, self.scope, SymCategory::Domain, id.name);
                match sym {
                    Some(sym) => match &self.cxt.symbol(sym).kind {
                        SymbolKind::Domain { sec } => Ok(*sec),
                        _ => unreachable!(),
                    },
                    None => {
                        let name = self.cxt.interner.resolve(id.name).to_owned();
                        Err(self.fatal(
                            id.span,
                            format!("identifier '{name}' is not a security domain in scope"),
                        ))
                    }
                }
            }
        }
    }

    pub fn visit_data_type(&mut self, t: &DataTypeExpr) -> TcResult<DataTypeId> {
        match &t.kind {
            DataTypeExprKind::Const(p) => Ok(self.cxt.dt_prim(*p)),
            DataTypeExprKind::Var(id) => {
                if let Some(sym) =
                    self.st
                        .find(self.cxt, self.scope, SymCategory::DataVar, id.name)
                {
                    match &self.cxt.symbol(sym).kind {
                        SymbolKind::DataVar { data } => return Ok(*data),
                        _ => unreachable!(),
                    }
                }

                if let Some(sym) =
                    self.st
                        .find(self.cxt, self.scope, SymCategory::Struct, id.name)
                {
                    let decl = match &self.cxt.symbol(sym).kind {
                        SymbolKind::Struct { decl } => decl.clone(),
                        _ => unreachable!(),
                    };
                    return self.check_struct(&decl, &[], t.span);
                }

                let name = self.cxt.interner.resolve(id.name).to_owned();
                Err(self.fatal(
                    id.span,
                    format!("identifier '{name}' does not name a data type in scope"),
                ))
            }
            DataTypeExprKind::Template(id, args) => self.check_type_application(id.name, args, t.span),
        }
    }

    pub fn visit_dim_type(&mut self, t: &DimTypeExpr) -> TcResult<DimType> {
        match &t.kind {
            DimTypeExprKind::Const(n) => Ok(*n),
            DimTypeExprKind::Var(id) => {
                let sym = self
                    .st
                    .find(self.cxt, self.scope, SymCategory::DimVar, id.name);
                match sym {
                    Some(sym) => match &self.cxt.symbol(sym).kind {
                        SymbolKind::DimVar { dim } => Ok(*dim),
                        _ => unreachable!(),
                    },
                    None => {
                        let name = self.cxt.interner.resolve(id.name).to_owned();
                        Err(self.fatal(
                            id.span,
                            format!("identifier '{name}' is not a dimensionality in scope"),
                        ))
                    }
                }
            }
        }
    }

    /// A syntactic type argument of a struct template application.
    pub fn visit_type_arg(&mut self, t: &TypeArgExpr) -> TcResult<TypeArgument> {
        match &t.kind {
            TypeArgExprKind::Public => Ok(TypeArgument::Sec(self.cxt.sec_public())),
            TypeArgExprKind::DimConst(n) => Ok(TypeArgument::Dim(*n)),
            TypeArgExprKind::DataConst(p) => Ok(TypeArgument::Data(self.cxt.dt_prim(*p))),
            TypeArgExprKind::Template(id, args) => {
                let data = self.check_type_application(id.name, args, t.span)?;
                Ok(TypeArgument::Data(data))
            }
            TypeArgExprKind::Var(id) => {
                // A variable names a bound quantifier, a domain, a data
                // type, or a dimensionality, in that order of preference.
                if let Some(sym) =
                    self.st
                        .find(self.cxt, self.scope, SymCategory::Domain, id.name)
                {
                    if let SymbolKind::Domain { sec } = &self.cxt.symbol(sym).kind {
                        return Ok(TypeArgument::Sec(*sec));
                    }
                }
                if let Some(sym) =
                    self.st
                        .find(self.cxt, self.scope, SymCategory::DataVar, id.name)
                {
                    if let SymbolKind::DataVar { data } = &self.cxt.symbol(sym).kind {
                        return Ok(TypeArgument::Data(*data));
                    }
                }
                if let Some(sym) =
                    self.st
                        .find(self.cxt, self.scope, SymCategory::DimVar, id.name)
                {
                    if let SymbolKind::DimVar { dim } = &self.cxt.symbol(sym).kind {
                        return Ok(TypeArgument::Dim(*dim));
                    }
                }
                if let Some(sym) =
                    self.st
                        .find(self.cxt, self.scope, SymCategory::Struct, id.name)
                {
                    let decl = match &self.cxt.symbol(sym).kind {
                        SymbolKind::Struct { decl } => decl.clone(),
                        _ => unreachable!(),
                    };
                    let data = self.check_struct(&decl, &[], t.span)?;
                    return Ok(TypeArgument::Data(data));
                }

                let name = self.cxt.interner.resolve(id.name).to_owned();
                Err(self.fatal(
                    id.span,
                    format!("identifier '{name}' does not name a type in scope"),
                ))
            }
        }
    }

    /// `name<args>`: instantiate a struct template.
    pub fn check_type_application(
        &mut self,
        name: scc_common::Atom,
        args: &[TypeArgExpr],
        span: Span,
    ) -> TcResult<DataTypeId> {
        let sym = self
            .st
            .find(self.cxt, self.scope, SymCategory::Struct, name);
        let decl = match sym {
            Some(sym) => match &self.cxt.symbol(sym).kind {
                SymbolKind::Struct { decl } => decl.clone(),
                _ => unreachable!(),
            },
            None => {
                let shown = self.cxt.interner.resolve(name).to_owned();
                return Err(self.fatal(span, format!("undefined struct '{shown}'")));
            }
        };

        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            resolved.push(self.visit_type_arg(arg)?);
        }

        self.check_struct(&decl, &resolved, span)
    }

    /// Build (or find) the struct data type for a declaration applied to
    /// concrete type arguments.
    pub fn check_struct(
        &mut self,
        decl: &Rc<StructDecl>,
        args: &[TypeArgument],
        span: Span,
    ) -> TcResult<DataTypeId> {
        if decl.quantifiers.len() != args.len() {
            let shown = self.cxt.interner.resolve(decl.name.name).to_owned();
            return Err(self.fatal(
                span,
                format!(
                    "struct {shown} expects {} type arguments, got {}",
                    decl.quantifiers.len(),
                    args.len()
                ),
            ));
        }

        if let Some(found) = self.cxt.find_struct(decl.name.name, args) {
            return Ok(found);
        }

        // Elaborate the field types in a fresh scope binding the
        // quantifiers to the arguments.
        let saved_scope = self.scope;
        let scope = self.st.new_scope(GLOBAL_SCOPE);
        for (quant, &arg) in decl.quantifiers.iter().zip(args) {
            self.bind_quantifier_symbol(scope, quant, arg);
        }
        self.scope = scope;

        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut failed = None;
        for field in &decl.fields {
            match self.visit_type_expr(&field.ty) {
                Ok(ty) => {
                    if self.cxt.is_void(ty) {
                        failed =
                            Some(self.fatal(field.span, "struct field may not have void type"));
                        break;
                    }
                    fields.push(StructField {
                        ty,
                        name: field.name.name,
                    });
                }
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            }
        }

        self.scope = saved_scope;
        if let Some(err) = failed {
            return Err(err);
        }

        Ok(self.cxt.dt_struct(decl.name.name, args.to_vec(), fields))
    }

    pub(crate) fn bind_quantifier_symbol(
        &mut self,
        scope: ScopeId,
        quant: &Quantifier,
        arg: TypeArgument,
    ) {
        let kind = match arg {
            TypeArgument::Sec(sec) => SymbolKind::Domain { sec },
            TypeArgument::Data(data) => SymbolKind::DataVar { data },
            TypeArgument::Dim(dim) => SymbolKind::DimVar { dim },
        };
        let sym = self.cxt.symbols.alloc(Symbol {
            name: quant.name.name,
            ty: None,
            kind,
            file: self.file,
            span: quant.span,
        });
        self.st.append_symbol(scope, sym);
    }

    /// Validate a quantifier of a template declaration.
    pub fn visit_quantifier(&mut self, quant: &Quantifier) -> TcResult<()> {
        if let QuantifierKind::Domain(Some(kind)) = &quant.kind {
            if self
                .st
                .find(self.cxt, self.scope, SymCategory::Kind, kind.name)
                .is_none()
            {
                let name = self.cxt.interner.resolve(kind.name).to_owned();
                return Err(self.fatal(
                    kind.span,
                    format!("identifier '{name}' is not a security domain kind"),
                ));
            }
        }
        Ok(())
    }

    /// Resolve an identifier that must be a variable symbol.
    pub fn get_variable(&mut self, id: &scc_ast::Ident) -> TcResult<SymbolId> {
        match self
            .st
            .find(self.cxt, self.scope, SymCategory::Variable, id.name)
        {
            Some(sym) => {
                self.var_symbols.insert(id.id, sym);
                Ok(sym)
            }
            None => {
                let name = self.cxt.interner.resolve(id.name).to_owned();
                Err(self.fatal(id.span, format!("undeclared variable '{name}'")))
            }
        }
    }

    pub(crate) fn type_error(&mut self, span: Span, message: impl Into<String>) -> TypeError {
        self.fatal(span, message)
    }
}
