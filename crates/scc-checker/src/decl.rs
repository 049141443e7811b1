//! Collection of module-level declarations into the symbol table.
//!
//! Collection elaborates signatures only; procedure bodies are elaborated
//! during code generation and template bodies when instantiated. Errors
//! in one declaration do not stop collection of its siblings.

use crate::checker::{TcResult, TypeChecker, TypeError};
use scc_ast::{
    DomainDecl, GlobalDecl, KindDecl, Module, ProcDefKind, QuantifierKind, SecTypeExprKind,
    StructDecl, TemplateDecl, TypeExprKind,
};
use scc_common::Atom;
use scc_core::{
    KindTypeParams, OpTemplateInfo, ProcTemplateInfo, ScopeId, Symbol, SymbolKind, SymCategory,
    Weight,
};
use std::rc::Rc;

impl<'a> TypeChecker<'a> {
    /// Collect every declaration of a module into its scope. Global
    /// variables are skipped here; their initialization is lowered (and
    /// checked) by the code generator in declaration order.
    pub fn collect_module(&mut self, module: &Module, module_scope: ScopeId) -> TcResult<()> {
        let saved_scope = self.scope;
        let saved_file = self.file;
        self.scope = module_scope;
        self.file = module.file;

        let mut status = Ok(());
        for decl in &module.decls {
            let result = match decl {
                GlobalDecl::Kind(kind) => self.collect_kind(kind),
                GlobalDecl::Domain(domain) => self.collect_domain(domain),
                GlobalDecl::Struct(s) => self.collect_struct(s),
                GlobalDecl::Template(t) => self.collect_template(t, module_scope),
                GlobalDecl::Proc(p) => self.visit_proc_def_signature(p, None).map(|_| ()),
                GlobalDecl::Var(_) => Ok(()),
            };
            if result.is_err() {
                status = Err(TypeError);
            }
        }

        self.scope = saved_scope;
        self.file = saved_file;
        status
    }

    fn collect_kind(&mut self, kind: &KindDecl) -> TcResult<()> {
        if self
            .st
            .find(self.cxt, self.scope, SymCategory::Kind, kind.name.name)
            .is_some()
        {
            let name = self.cxt.interner.resolve(kind.name.name).to_owned();
            return Err(self.fatal(kind.span, format!("redefinition of kind '{name}'")));
        }

        let sym = self.cxt.symbols.alloc(Symbol {
            name: kind.name.name,
            ty: None,
            kind: SymbolKind::Kind {
                types: Default::default(),
            },
            file: self.file,
            span: kind.span,
        });
        self.st.append_symbol(self.scope, sym);

        for type_decl in &kind.types {
            let data = self.cxt.dt_user(type_decl.name.name);
            let public_type = type_decl.public_type.map(|p| self.cxt.dt_prim(p));
            let fresh = self.cxt.add_kind_type(
                sym,
                type_decl.name.name,
                KindTypeParams {
                    ty: data,
                    public_type,
                    size: type_decl.size,
                },
            );
            if !fresh {
                let name = self.cxt.interner.resolve(type_decl.name.name).to_owned();
                return Err(self.fatal(
                    type_decl.span,
                    format!("duplicate type '{name}' in kind declaration"),
                ));
            }

            // The type name resolves in data-type position anywhere the
            // kind is in scope.
            if self
                .st
                .find(self.cxt, self.scope, SymCategory::DataVar, type_decl.name.name)
                .is_none()
            {
                let type_sym = self.cxt.symbols.alloc(Symbol {
                    name: type_decl.name.name,
                    ty: None,
                    kind: SymbolKind::DataVar { data },
                    file: self.file,
                    span: type_decl.span,
                });
                self.st.append_symbol(self.scope, type_sym);
            }
        }

        Ok(())
    }

    fn collect_domain(&mut self, domain: &DomainDecl) -> TcResult<()> {
        let kind_sym = match self
            .st
            .find(self.cxt, self.scope, SymCategory::Kind, domain.kind.name)
        {
            Some(sym) => sym,
            None => {
                let name = self.cxt.interner.resolve(domain.kind.name).to_owned();
                return Err(self.fatal(
                    domain.kind.span,
                    format!("identifier '{name}' is not a security domain kind"),
                ));
            }
        };

        if self
            .st
            .find(self.cxt, self.scope, SymCategory::Domain, domain.name.name)
            .is_some()
        {
            let name = self.cxt.interner.resolve(domain.name.name).to_owned();
            return Err(self.fatal(
                domain.span,
                format!("redefinition of domain '{name}'"),
            ));
        }

        let sec = self.cxt.sec_private(domain.name.name, kind_sym);
        let sym = self.cxt.symbols.alloc(Symbol {
            name: domain.name.name,
            ty: None,
            kind: SymbolKind::Domain { sec },
            file: self.file,
            span: domain.span,
        });
        self.st.append_symbol(self.scope, sym);
        Ok(())
    }

    fn collect_struct(&mut self, decl: &Rc<StructDecl>) -> TcResult<()> {
        if self
            .st
            .find(self.cxt, self.scope, SymCategory::Struct, decl.name.name)
            .is_some()
        {
            let name = self.cxt.interner.resolve(decl.name.name).to_owned();
            return Err(self.fatal(
                decl.span,
                format!("redefinition of struct '{name}'"),
            ));
        }

        for quant in &decl.quantifiers {
            self.visit_quantifier(quant)?;
        }

        let sym = self.cxt.symbols.alloc(Symbol {
            name: decl.name.name,
            ty: None,
            kind: SymbolKind::Struct { decl: decl.clone() },
            file: self.file,
            span: decl.span,
        });
        self.st.append_symbol(self.scope, sym);

        // Non-templated structs elaborate eagerly so field errors are
        // reported at the declaration.
        if decl.quantifiers.is_empty() {
            self.check_struct(decl, &[], decl.span)?;
        }

        Ok(())
    }

    fn collect_template(&mut self, decl: &Rc<TemplateDecl>, module_scope: ScopeId) -> TcResult<()> {
        for quant in &decl.quantifiers {
            self.visit_quantifier(quant)?;
        }

        let domain_quants: Vec<Atom> = decl
            .quantifiers
            .iter()
            .filter(|q| matches!(q.kind, QuantifierKind::Domain(_)))
            .map(|q| q.name.name)
            .collect();
        let data_quants: Vec<Atom> = decl
            .quantifiers
            .iter()
            .filter(|q| matches!(q.kind, QuantifierKind::Data))
            .map(|q| q.name.name)
            .collect();

        // How many parameter positions carry a quantified domain.
        let param_sec_names: Vec<Option<Atom>> = decl
            .body
            .params
            .iter()
            .map(|p| match &p.ty.kind {
                TypeExprKind::Basic { sec, .. } => match &sec.kind {
                    SecTypeExprKind::Named(id) => Some(id.name),
                    SecTypeExprKind::Public => None,
                },
                TypeExprKind::Void => None,
            })
            .collect();
        let quantified_domain_count = param_sec_names
            .iter()
            .filter(|name| name.map(|n| domain_quants.contains(&n)).unwrap_or(false))
            .count() as u32;

        let sym = match decl.body.kind {
            ProcDefKind::Proc => {
                let unrestricted = decl
                    .quantifiers
                    .iter()
                    .filter(|q| {
                        matches!(
                            q.kind,
                            QuantifierKind::Domain(None)
                                | QuantifierKind::Data
                                | QuantifierKind::Dim
                        )
                    })
                    .count() as u32;
                let weight = Weight::new(
                    decl.quantifiers.len() as u32,
                    unrestricted,
                    quantified_domain_count,
                );

                // A non-public return domain that no parameter mentions
                // makes the template context dependent.
                let context_dependent = match &decl.body.ret.kind {
                    TypeExprKind::Basic { sec, .. } => match &sec.kind {
                        SecTypeExprKind::Named(id) => {
                            !param_sec_names.iter().any(|name| *name == Some(id.name))
                        }
                        SecTypeExprKind::Public => false,
                    },
                    TypeExprKind::Void => false,
                };

                self.cxt.symbols.alloc(Symbol {
                    name: decl.body.name.name,
                    ty: None,
                    kind: SymbolKind::ProcTemplate(Box::new(ProcTemplateInfo {
                        decl: decl.clone(),
                        weight,
                        data_quantifiers: data_quants,
                        domain_quantifiers: domain_quants,
                        context_dependent,
                        module_scope,
                    })),
                    file: self.file,
                    span: decl.span,
                })
            }
            ProcDefKind::Operator(_) | ProcDefKind::Cast => {
                let arity = decl.body.params.len();
                let expected = match decl.body.kind {
                    ProcDefKind::Cast => arity == 1,
                    _ => arity == 1 || arity == 2,
                };
                if !expected {
                    return Err(self.fatal(
                        decl.body.span,
                        "operator definition with an invalid number of parameters",
                    ));
                }
                if decl
                    .quantifiers
                    .iter()
                    .filter(|q| matches!(q.kind, QuantifierKind::Domain(_)))
                    .count()
                    > 1
                {
                    return Err(self.fatal(
                        decl.span,
                        "operator definitions take at most one domain quantifier",
                    ));
                }
                if decl
                    .quantifiers
                    .iter()
                    .any(|q| matches!(q.kind, QuantifierKind::Dim))
                {
                    return Err(self.fatal(
                        decl.span,
                        "dimensionality variables are not allowed in operator definitions",
                    ));
                }

                let quantified_param_count = decl
                    .body
                    .params
                    .iter()
                    .filter(|p| match &p.ty.kind {
                        TypeExprKind::Basic { sec, data, .. } => {
                            let sec_quant = match &sec.kind {
                                SecTypeExprKind::Named(id) => domain_quants.contains(&id.name),
                                SecTypeExprKind::Public => false,
                            };
                            let data_quant = match &data.kind {
                                scc_ast::DataTypeExprKind::Var(id) => {
                                    data_quants.contains(&id.name)
                                }
                                _ => false,
                            };
                            sec_quant || data_quant
                        }
                        TypeExprKind::Void => false,
                    })
                    .count() as u32;

                self.cxt.symbols.alloc(Symbol {
                    name: decl.body.name.name,
                    ty: None,
                    kind: SymbolKind::OpTemplate(Box::new(OpTemplateInfo {
                        decl: decl.clone(),
                        quantified_param_count,
                        domain_weight: quantified_domain_count,
                        data_quantifiers: data_quants,
                        module_scope,
                    })),
                    file: self.file,
                    span: decl.span,
                })
            }
        };

        self.st.append_symbol(self.scope, sym);
        Ok(())
    }
}
