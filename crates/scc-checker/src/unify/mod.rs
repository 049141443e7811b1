//! Syntactic unification of declaration type expressions against
//! concrete types.
//!
//! The unifier walks a declaration's type expression and a concrete type
//! in lockstep, accumulating bindings from quantified variable names to
//! type arguments. A name may be bound once; rebinding to a different
//! argument fails the whole unification. Names that are not quantifiers
//! of the template resolve through the caller's scope and must equal the
//! concrete component.

pub mod operator;

pub use operator::{CastTypeUnifier, OperatorTypeUnifier};

use crate::checker::TypeChecker;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use scc_ast::{
    DataTypeExpr, DataTypeExprKind, DimTypeExpr, DimTypeExprKind, Quantifier, QuantifierKind,
    SecTypeExpr, SecTypeExprKind, TypeArgExpr, TypeArgExprKind, TypeExpr, TypeExprKind,
};
use scc_common::Atom;
use scc_core::{
    DataType, DataTypeId, DimType, SecTypeId, SecurityType, SymbolKind, SymCategory, TypeArgument,
    TypeId,
};

/// Substitution being built by a unifier.
pub type TypeVarMap = IndexMap<Atom, TypeArgument>;

pub struct TypeUnifier {
    names: TypeVarMap,
    domain_quants: FxHashSet<Atom>,
    data_quants: FxHashSet<Atom>,
    dim_quants: FxHashSet<Atom>,
}

impl TypeUnifier {
    pub fn new(quantifiers: &[Quantifier]) -> Self {
        let mut domain_quants = FxHashSet::default();
        let mut data_quants = FxHashSet::default();
        let mut dim_quants = FxHashSet::default();
        for quant in quantifiers {
            match quant.kind {
                QuantifierKind::Domain(_) => domain_quants.insert(quant.name.name),
                QuantifierKind::Data => data_quants.insert(quant.name.name),
                QuantifierKind::Dim => dim_quants.insert(quant.name.name),
            };
        }

        TypeUnifier {
            names: TypeVarMap::new(),
            domain_quants,
            data_quants,
            dim_quants,
        }
    }

    pub fn names(&self) -> &TypeVarMap {
        &self.names
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

    /// Unify a declaration type expression against a concrete type.
    pub fn visit_type(&mut self, tc: &mut TypeChecker, t: &TypeExpr, ty: TypeId) -> bool {
        match &t.kind {
            TypeExprKind::Void => tc.cxt.is_void(ty),
            TypeExprKind::Basic { sec, data, dim } => {
                let (sec_ty, data_ty, dim_ty) = match tc.cxt.basic_parts(ty) {
                    Some(parts) => parts,
                    None => return false,
                };
                self.visit_sec_type(tc, sec, sec_ty)
                    && self.visit_data_type(tc, data, sec, data_ty, sec_ty)
                    && self.visit_dim_type(tc, dim, dim_ty)
            }
        }
    }

    pub fn visit_sec_type(
        &mut self,
        tc: &mut TypeChecker,
        t: &SecTypeExpr,
        sec: SecTypeId,
    ) -> bool {
        match &t.kind {
            SecTypeExprKind::Public => tc.cxt.is_public_sec(sec),
            SecTypeExprKind::Named(id) => {
                if self.domain_quants.contains(&id.name) {
                    return self.bind(id.name, TypeArgument::Sec(sec));
                }

                match tc
                    .st
                    .find(tc.cxt, tc.scope, SymCategory::Domain, id.name)
                {
                    Some(sym) => match &tc.cxt.symbol(sym).kind {
                        SymbolKind::Domain { sec: bound } => *bound == sec,
                        _ => false,
                    },
                    None => false,
                }
            }
        }
    }

    fn visit_data_type(
        &mut self,
        tc: &mut TypeChecker,
        t: &DataTypeExpr,
        t_sec: &SecTypeExpr,
        data: DataTypeId,
        sec: SecTypeId,
    ) -> bool {
        match &t.kind {
            DataTypeExprKind::Const(p) => {
                // A private declaration matched against a public value
                // compares the declassified primitive, which is what lets
                // `D xor_uint8 x = <public uint8>` unify.
                let mut expect = *p;
                if !t_sec.is_public() && tc.cxt.is_public_sec(sec) {
                    expect = expect.declassified();
                }
                tc.cxt.data_equals_prim(data, expect)
            }
            DataTypeExprKind::Var(id) => {
                if self.data_quants.contains(&id.name) {
                    return self.bind(id.name, TypeArgument::Data(data));
                }

                match tc
                    .st
                    .find(tc.cxt, tc.scope, SymCategory::DataVar, id.name)
                {
                    Some(sym) => match &tc.cxt.symbol(sym).kind {
                        SymbolKind::DataVar { data: bound } => *bound == data,
                        _ => false,
                    },
                    None => false,
                }
            }
            DataTypeExprKind::Template(id, args) => {
                let (name, expected_args) = match tc.cxt.data_type(data) {
                    DataType::Struct {
                        name, type_args, ..
                    } => (*name, type_args.clone()),
                    _ => return false,
                };
                if id.name != name || args.len() != expected_args.len() {
                    return false;
                }
                for (arg, expected) in args.iter().zip(expected_args) {
                    if !self.visit_type_arg(tc, arg, expected) {
                        return false;
                    }
                }
                true
            }
        }
    }

    pub fn visit_dim_type(
        &mut self,
        tc: &mut TypeChecker,
        t: &DimTypeExpr,
        dim: DimType,
    ) -> bool {
        match &t.kind {
            DimTypeExprKind::Const(n) => *n == dim,
            DimTypeExprKind::Var(id) => {
                if self.dim_quants.contains(&id.name) {
                    return self.bind(id.name, TypeArgument::Dim(dim));
                }

                match tc.st.find(tc.cxt, tc.scope, SymCategory::DimVar, id.name) {
                    Some(sym) => match &tc.cxt.symbol(sym).kind {
                        SymbolKind::DimVar { dim: bound } => *bound == dim,
                        _ => false,
                    },
                    None => false,
                }
            }
        }
    }

    pub fn visit_type_arg(
        &mut self,
        tc: &mut TypeChecker,
        t: &TypeArgExpr,
        arg: TypeArgument,
    ) -> bool {
        match &t.kind {
            TypeArgExprKind::Var(id) => {
                if self.domain_quants.contains(&id.name)
                    || self.data_quants.contains(&id.name)
                    || self.dim_quants.contains(&id.name)
                {
                    return self.bind(id.name, arg);
                }

                // Non-quantified names must resolve and match exactly.
                match arg {
                    TypeArgument::Sec(sec) => {
                        match tc.st.find(tc.cxt, tc.scope, SymCategory::Domain, id.name) {
                            Some(sym) => matches!(
                                &tc.cxt.symbol(sym).kind,
                                SymbolKind::Domain { sec: bound } if *bound == sec
                            ),
                            None => false,
                        }
                    }
                    TypeArgument::Data(data) => {
                        match tc.st.find(tc.cxt, tc.scope, SymCategory::DataVar, id.name) {
                            Some(sym) => matches!(
                                &tc.cxt.symbol(sym).kind,
                                SymbolKind::DataVar { data: bound } if *bound == data
                            ),
                            None => false,
                        }
                    }
                    TypeArgument::Dim(dim) => {
                        match tc.st.find(tc.cxt, tc.scope, SymCategory::DimVar, id.name) {
                            Some(sym) => matches!(
                                &tc.cxt.symbol(sym).kind,
                                SymbolKind::DimVar { dim: bound } if *bound == dim
                            ),
                            None => false,
                        }
                    }
                }
            }
            TypeArgExprKind::Template(id, args) => {
                let data = match arg {
                    TypeArgument::Data(data) => data,
                    _ => return false,
                };
                let (name, expected_args) = match tc.cxt.data_type(data) {
                    DataType::Struct {
                        name, type_args, ..
                    } => (*name, type_args.clone()),
                    _ => return false,
                };
                if id.name != name || args.len() != expected_args.len() {
                    return false;
                }
                for (a, expected) in args.iter().zip(expected_args) {
                    if !self.visit_type_arg(tc, a, expected) {
                        return false;
                    }
                }
                true
            }
            TypeArgExprKind::DataConst(p) => match arg {
                TypeArgument::Data(data) => tc.cxt.data_equals_prim(data, *p),
                _ => false,
            },
            TypeArgExprKind::DimConst(n) => arg == TypeArgument::Dim(*n),
            TypeArgExprKind::Public => match arg {
                TypeArgument::Sec(sec) => tc.cxt.is_public_sec(sec),
                _ => false,
            },
        }
    }

    /// Unify a non-void return type against the call context's security
    /// type.
    pub fn visit_return_context(
        &mut self,
        tc: &mut TypeChecker,
        ret: &TypeExpr,
        context: SecTypeId,
    ) -> bool {
        match &ret.kind {
            TypeExprKind::Void => true,
            TypeExprKind::Basic { sec, .. } => self.visit_sec_type(tc, sec, context),
        }
    }

    /// Extract the substitution in quantifier order, checking the kind
    /// restriction of each domain quantifier. `None` when a quantifier
    /// stayed unbound or a kind restriction fails.
    pub fn type_arguments(
        &self,
        tc: &TypeChecker,
        quantifiers: &[Quantifier],
    ) -> Option<Vec<TypeArgument>> {
        let mut args = Vec::with_capacity(quantifiers.len());
        for quant in quantifiers {
            let arg = *self.names.get(&quant.name.name)?;
            if let QuantifierKind::Domain(Some(kind_ident)) = &quant.kind {
                match arg {
                    TypeArgument::Sec(sec) => match tc.cxt.sec_type(sec) {
                        SecurityType::Private { kind, .. } => {
                            if tc.cxt.symbol(*kind).name != kind_ident.name {
                                return None;
                            }
                        }
                        SecurityType::Public => return None,
                    },
                    _ => return None,
                }
            }
            args.push(arg);
        }
        Some(args)
    }
}
