//! Specialized unifiers for operator and cast overloads.
//!
//! Unlike procedure templates, operator and cast definitions have at most
//! one domain quantifier, which is pre-bound to the security join of the
//! argument types, and dimensionality variables are not allowed. When no
//! domain quantifier occurs, the declared return security type must equal
//! the join (`check_sec_lub`).

use crate::checker::TypeChecker;
use crate::unify::TypeVarMap;
use scc_ast::{
    DataTypeExprKind, DimTypeExprKind, Prim, Quantifier, QuantifierKind, SecTypeExprKind,
    TypeExpr, TypeExprKind,
};
use scc_common::Atom;
use scc_core::{
    DataType, SecTypeId, SecurityType, SymbolId, SymbolKind, SymCategory, TypeArgument, TypeId,
};
use rustc_hash::FxHashSet;

struct OpUnifyCore {
    names: TypeVarMap,
    data_quants: FxHashSet<Atom>,
    security_type: SecTypeId,
    domain_var: Option<(Atom, Option<Atom>)>,
}

impl OpUnifyCore {
    fn new(tc: &mut TypeChecker, quantifiers: &[Quantifier], security_type: SecTypeId) -> Self {
        let mut data_quants = FxHashSet::default();
        let mut domain_var = None;
        for quant in quantifiers {
            match &quant.kind {
                QuantifierKind::Domain(kind) => {
                    if domain_var.is_none() {
                        domain_var = Some((quant.name.name, kind.as_ref().map(|k| k.name)));
                    }
                }
                QuantifierKind::Data => {
                    data_quants.insert(quant.name.name);
                }
                QuantifierKind::Dim => {}
            }
        }

        let mut core = OpUnifyCore {
            names: TypeVarMap::new(),
            data_quants,
            security_type,
            domain_var,
        };
        if let Some((name, _)) = core.domain_var {
            core.bind(name, TypeArgument::Sec(security_type));
        }
        let _ = tc;
        core
    }

    fn bind(&mut self, name: Atom, arg: TypeArgument) -> bool {
        match self.names.get(&name) {
            Some(prev) => *prev == arg,
            None => {
                self.names.insert(name, arg);
                true
            }
        }
    }

    /// Shared data-type position rule.
    fn visit_data(&mut self, tc: &mut TypeChecker, t: &TypeExpr, ty: TypeId) -> bool {
        let (t_sec, t_data) = match &t.kind {
            TypeExprKind::Basic { sec, data, .. } => (sec, data),
            TypeExprKind::Void => return false,
        };
        let (arg_sec, arg_data, _) = match tc.cxt.basic_parts(ty) {
            Some(parts) => parts,
            None => return false,
        };

        match &t_data.kind {
            DataTypeExprKind::Const(p) => {
                let mut expect = *p;
                if !t_sec.is_public() && tc.cxt.is_public_sec(arg_sec) {
                    expect = expect.declassified();
                }
                tc.cxt.data_equals_prim(arg_data, expect)
            }
            DataTypeExprKind::Var(id) => {
                if self.data_quants.contains(&id.name) {
                    return self.bind(id.name, TypeArgument::Data(arg_data));
                }

                // The variable must name a data type of the protection
                // domain's kind.
                let kind = match tc.cxt.sec_type(self.security_type) {
                    SecurityType::Private { kind, .. } => *kind,
                    SecurityType::Public => return false,
                };
                let params = match tc.cxt.kind_type_params(kind, id.name) {
                    Some(params) => params.clone(),
                    None => return false,
                };

                let expect = if !t_sec.is_public() && tc.cxt.is_public_sec(arg_sec) {
                    params.public_type.unwrap_or(params.ty)
                } else {
                    params.ty
                };

                match (tc.cxt.data_type(expect), tc.cxt.data_type(arg_data)) {
                    (DataType::Struct { .. }, _) | (_, DataType::Struct { .. }) => false,
                    _ => {
                        expect == arg_data
                            || match tc.cxt.prim_of(arg_data) {
                                Some(p) => tc.cxt.data_equals_prim(expect, p),
                                None => {
                                    matches!(
                                        (tc.cxt.data_type(expect), tc.cxt.data_type(arg_data)),
                                        (
                                            DataType::Prim(p),
                                            DataType::UserPrim { name }
                                        ) if tc.cxt.interner.resolve(*name) == p.name()
                                    )
                                }
                            }
                    }
                }
            }
            DataTypeExprKind::Template(..) => false,
        }
    }

    fn check_kind(&self, tc: &TypeChecker) -> bool {
        if let Some((_, Some(kind_name))) = self.domain_var {
            match tc.cxt.sec_type(self.security_type) {
                SecurityType::Private { kind, .. } => {
                    if tc.cxt.symbol(*kind).name != kind_name {
                        return false;
                    }
                }
                SecurityType::Public => return false,
            }
        }
        true
    }

    /// With no domain quantifier, the declared return security type must
    /// equal the security join of the operands.
    fn check_sec_lub(&self, tc: &mut TypeChecker, ret: &TypeExpr) -> bool {
        if self.domain_var.is_some() {
            return true;
        }

        let ret_sec = match &ret.kind {
            TypeExprKind::Basic { sec, .. } => sec,
            TypeExprKind::Void => return false,
        };

        if tc.cxt.is_public_sec(self.security_type) {
            return ret_sec.is_public();
        }

        match (&ret_sec.kind, tc.cxt.sec_type(self.security_type)) {
            (SecTypeExprKind::Named(id), SecurityType::Private { name, .. }) => id.name == *name,
            _ => false,
        }
    }

    fn type_arguments(&self, quantifiers: &[Quantifier]) -> Option<Vec<TypeArgument>> {
        let mut args = Vec::with_capacity(quantifiers.len());
        for quant in quantifiers {
            args.push(*self.names.get(&quant.name.name)?);
        }
        Some(args)
    }
}

/*******************************************************************************
  OperatorTypeUnifier
*******************************************************************************/

pub struct OperatorTypeUnifier {
    core: OpUnifyCore,
}

impl OperatorTypeUnifier {
    /// `None` when the operands have no security join.
    pub fn new(
        tc: &mut TypeChecker,
        arg_types: &[TypeId],
        templ: SymbolId,
    ) -> Option<OperatorTypeUnifier> {
        let security_type = match arg_types {
            [single] => tc.cxt.sec_of(*single),
            [a, b] => {
                let asec = tc.cxt.sec_of(*a);
                let bsec = tc.cxt.sec_of(*b);
                tc.cxt.upper_sec_type(asec, bsec)?
            }
            _ => return None,
        };

        let quantifiers = op_template_quantifiers(tc, templ);
        Some(OperatorTypeUnifier {
            core: OpUnifyCore::new(tc, &quantifiers, security_type),
        })
    }

    pub fn visit_type(&mut self, tc: &mut TypeChecker, t: &TypeExpr, ty: TypeId) -> bool {
        let (t_sec, t_dim) = match &t.kind {
            TypeExprKind::Basic { sec, dim, .. } => (sec, dim),
            TypeExprKind::Void => return false,
        };
        let (arg_sec, _, arg_dim) = match tc.cxt.basic_parts(ty) {
            Some(parts) => parts,
            None => return false,
        };

        // Security type.
        if t_sec.is_public() && !tc.cxt.is_public_sec(arg_sec) {
            return false;
        }
        if !tc.cxt.is_public_sec(arg_sec) {
            let expected = match tc.cxt.sec_type(arg_sec) {
                SecurityType::Private { name, .. } => *name,
                SecurityType::Public => unreachable!(),
            };
            let templ_pd = match t_sec.identifier() {
                Some(id) => id.name,
                None => return false,
            };
            let is_domain_var = self
                .core
                .domain_var
                .map(|(name, _)| name == templ_pd)
                .unwrap_or(false);
            if !is_domain_var && templ_pd != expected {
                return false;
            }
        }

        // Data type.
        if !self.core.visit_data(tc, t, ty) {
            return false;
        }

        // Dimensionality: scalar arguments match any declared rank;
        // non-scalar arguments never match a scalar declaration.
        match &t_dim.kind {
            DimTypeExprKind::Const(templ_dim) => {
                if arg_dim != 0 && *templ_dim == 0 && arg_dim > *templ_dim {
                    return false;
                }
            }
            DimTypeExprKind::Var(_) => return false,
        }

        true
    }

    pub fn check_kind(&self, tc: &TypeChecker) -> bool {
        self.core.check_kind(tc)
    }

    pub fn check_sec_lub(&self, tc: &mut TypeChecker, ret: &TypeExpr) -> bool {
        self.core.check_sec_lub(tc, ret)
    }

    pub fn type_arguments(&self, quantifiers: &[Quantifier]) -> Option<Vec<TypeArgument>> {
        self.core.type_arguments(quantifiers)
    }
}

/*******************************************************************************
  CastTypeUnifier
*******************************************************************************/

pub struct CastTypeUnifier {
    core: OpUnifyCore,
}

impl CastTypeUnifier {
    pub fn new(tc: &mut TypeChecker, arg_type: TypeId, templ: SymbolId) -> CastTypeUnifier {
        let security_type = tc.cxt.sec_of(arg_type);
        let quantifiers = op_template_quantifiers(tc, templ);
        CastTypeUnifier {
            core: OpUnifyCore::new(tc, &quantifiers, security_type),
        }
    }

    pub fn visit_type(&mut self, tc: &mut TypeChecker, t: &TypeExpr, ty: TypeId) -> bool {
        let t_sec = match &t.kind {
            TypeExprKind::Basic { sec, .. } => sec,
            TypeExprKind::Void => return false,
        };
        let (arg_sec, _, _) = match tc.cxt.basic_parts(ty) {
            Some(parts) => parts,
            None => return false,
        };

        match &t_sec.kind {
            SecTypeExprKind::Public => {
                if !tc.cxt.is_public_sec(arg_sec) {
                    return false;
                }
            }
            SecTypeExprKind::Named(id) => {
                let is_domain_var = self
                    .core
                    .domain_var
                    .map(|(name, _)| name == id.name)
                    .unwrap_or(false);
                if !is_domain_var {
                    match tc.st.find(tc.cxt, tc.scope, SymCategory::Domain, id.name) {
                        Some(sym) => match &tc.cxt.symbol(sym).kind {
                            SymbolKind::Domain { sec } => {
                                if *sec != arg_sec {
                                    return false;
                                }
                            }
                            _ => return false,
                        },
                        None => return false,
                    }
                }
            }
        }

        // Casts vectorise freely; any dimensionality unifies.
        self.core.visit_data(tc, t, ty)
    }

    /// Unify the declared return data type against the cast target.
    pub fn visit_target(&mut self, tc: &mut TypeChecker, ret: &TypeExpr, target: Prim) -> bool {
        let data = match &ret.kind {
            TypeExprKind::Basic { data, .. } => data,
            TypeExprKind::Void => return false,
        };
        match &data.kind {
            DataTypeExprKind::Const(p) => *p == target,
            DataTypeExprKind::Var(id) => {
                if self.core.data_quants.contains(&id.name) {
                    let target_data = tc.cxt.dt_prim(target);
                    self.core.bind(id.name, TypeArgument::Data(target_data))
                } else {
                    false
                }
            }
            DataTypeExprKind::Template(..) => false,
        }
    }

    pub fn check_kind(&self, tc: &TypeChecker) -> bool {
        self.core.check_kind(tc)
    }

    pub fn check_sec_lub(&self, tc: &mut TypeChecker, ret: &TypeExpr) -> bool {
        self.core.check_sec_lub(tc, ret)
    }

    pub fn type_arguments(&self, quantifiers: &[Quantifier]) -> Option<Vec<TypeArgument>> {
        self.core.type_arguments(quantifiers)
    }
}

fn op_template_quantifiers(tc: &TypeChecker, templ: SymbolId) -> Vec<Quantifier> {
    match &tc.cxt.symbol(templ).kind {
        SymbolKind::OpTemplate(info) => info.decl.quantifiers.clone(),
        SymbolKind::ProcTemplate(info) => info.decl.quantifiers.clone(),
        _ => Vec::new(),
    }
}
