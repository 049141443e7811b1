//! The interning context.
//!
//! The sole long-lived mutable state of a compilation run: interning
//! tables for security types, data types, full types and constants, the
//! string interner, and the symbol arena. Lookup-or-insert is the only
//! mutation; everything handed out is a small copyable id.

use crate::apfloat::ApFloat;
use crate::apint::ApInt;
use crate::constant::ConstValue;
use crate::symbol::{
    KindTypeParams, Symbol, SymbolArena, SymbolId, SymbolKind, VariableInfo,
};
use crate::types::{
    lattice_dim_leq, lattice_prim_leq, upper_prim, DataType, DataTypeId, DimType, SecTypeId,
    SecurityType, StructField, Type, TypeArgument, TypeId,
};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use scc_ast::Prim;
use scc_common::{Atom, FileId, Interner, Span};

#[derive(Debug)]
pub struct Context {
    pub interner: Interner,
    pub symbols: SymbolArena,
    sec_types: IndexSet<SecurityType>,
    data_types: IndexSet<DataType>,
    types: IndexSet<Type>,
    constants: FxHashMap<(TypeId, ConstValue), SymbolId>,
}

impl Context {
    pub fn new(interner: Interner) -> Self {
        let mut cxt = Context {
            interner,
            symbols: SymbolArena::new(),
            sec_types: IndexSet::new(),
            data_types: IndexSet::new(),
            types: IndexSet::new(),
            constants: FxHashMap::default(),
        };
        // Pre-intern the distinguished values so their ids are fixed.
        cxt.sec_public();
        cxt.ty_void();
        cxt
    }

    /*******************************************************************
      Security types
    *******************************************************************/

    pub fn sec_public(&mut self) -> SecTypeId {
        self.intern_sec(SecurityType::Public)
    }

    pub fn sec_private(&mut self, name: Atom, kind: SymbolId) -> SecTypeId {
        self.intern_sec(SecurityType::Private { name, kind })
    }

    fn intern_sec(&mut self, ty: SecurityType) -> SecTypeId {
        let (index, _) = self.sec_types.insert_full(ty);
        SecTypeId(index as u32)
    }

    pub fn sec_type(&self, id: SecTypeId) -> &SecurityType {
        self.sec_types.get_index(id.0 as usize).expect("sec type id")
    }

    pub fn is_public_sec(&self, id: SecTypeId) -> bool {
        self.sec_type(id).is_public()
    }

    /// Join in the security lattice; `None` when undefined.
    pub fn upper_sec_type(&self, a: SecTypeId, b: SecTypeId) -> Option<SecTypeId> {
        if self.is_public_sec(a) {
            return Some(b);
        }
        if self.is_public_sec(b) {
            return Some(a);
        }
        if a == b {
            return Some(a);
        }
        None
    }

    pub fn lattice_sec_leq(&self, a: SecTypeId, b: SecTypeId) -> bool {
        if self.is_public_sec(a) {
            return true;
        }
        if self.is_public_sec(b) {
            return false;
        }
        a == b
    }

    /*******************************************************************
      Data types
    *******************************************************************/

    pub fn dt_prim(&mut self, p: Prim) -> DataTypeId {
        self.intern_data(DataType::Prim(p))
    }

    pub fn dt_user(&mut self, name: Atom) -> DataTypeId {
        self.intern_data(DataType::UserPrim { name })
    }

    pub fn dt_struct(
        &mut self,
        name: Atom,
        type_args: Vec<TypeArgument>,
        fields: Vec<StructField>,
    ) -> DataTypeId {
        self.intern_data(DataType::Struct {
            name,
            type_args,
            fields,
        })
    }

    /// Find an already-interned struct type by name and arguments.
    pub fn find_struct(&self, name: Atom, type_args: &[TypeArgument]) -> Option<DataTypeId> {
        self.data_types
            .iter()
            .position(|dt| match dt {
                DataType::Struct {
                    name: n, type_args: a, ..
                } => *n == name && a == type_args,
                _ => false,
            })
            .map(|i| DataTypeId(i as u32))
    }

    fn intern_data(&mut self, ty: DataType) -> DataTypeId {
        let (index, _) = self.data_types.insert_full(ty);
        DataTypeId(index as u32)
    }

    pub fn data_type(&self, id: DataTypeId) -> &DataType {
        self.data_types
            .get_index(id.0 as usize)
            .expect("data type id")
    }

    pub fn prim_of(&self, id: DataTypeId) -> Option<Prim> {
        self.data_type(id).as_prim()
    }

    /// Data types compare equal when interned equal, or when a user
    /// primitive is named like a builtin.
    pub fn data_equals_prim(&self, id: DataTypeId, p: Prim) -> bool {
        match self.data_type(id) {
            DataType::Prim(q) => *q == p,
            DataType::UserPrim { name } => self.interner.resolve(*name) == p.name(),
            DataType::Struct { .. } => false,
        }
    }

    pub fn lattice_data_leq(&self, a: DataTypeId, b: DataTypeId) -> bool {
        match (self.data_type(a), self.data_type(b)) {
            (DataType::Prim(pa), DataType::Prim(pb)) => lattice_prim_leq(*pa, *pb),
            (DataType::Struct { .. }, DataType::Struct { .. })
            | (DataType::UserPrim { .. }, DataType::UserPrim { .. }) => a == b,
            _ => false,
        }
    }

    pub fn lattice_explicit_data_leq(&self, a: DataTypeId, b: DataTypeId) -> bool {
        match (self.data_type(a), self.data_type(b)) {
            (DataType::Prim(pa), DataType::Prim(pb)) => {
                crate::types::lattice_explicit_prim_leq(*pa, *pb)
            }
            (DataType::Struct { .. }, DataType::Struct { .. })
            | (DataType::UserPrim { .. }, DataType::UserPrim { .. }) => a == b,
            _ => false,
        }
    }

    /// The public data type produced by declassifying a value of the
    /// given security and data type. `None` when undefined.
    pub fn dtype_declassify(
        &mut self,
        sec: SecTypeId,
        data: DataTypeId,
    ) -> Option<DataTypeId> {
        match self.data_type(data).clone() {
            DataType::Prim(p) => Some(self.dt_prim(p.declassified())),
            DataType::UserPrim { name } => {
                let kind = match self.sec_type(sec) {
                    SecurityType::Private { kind, .. } => *kind,
                    SecurityType::Public => return None,
                };
                match &self.symbols.get(kind).kind {
                    SymbolKind::Kind { types } => {
                        types.get(&name).and_then(|params| params.public_type)
                    }
                    _ => None,
                }
            }
            DataType::Struct { .. } => None,
        }
    }

    /// Least upper bound of two basic types' data types, honoring the
    /// declassify rule between a private and a public operand.
    pub fn upper_data_type(&mut self, a: TypeId, b: TypeId) -> Option<DataTypeId> {
        let (asec, adata) = match self.ty(a) {
            Type::Basic { sec, data, .. } => (*sec, *data),
            _ => return None,
        };
        let (bsec, bdata) = match self.ty(b) {
            Type::Basic { sec, data, .. } => (*sec, *data),
            _ => return None,
        };

        if adata == bdata {
            return Some(adata);
        }

        if self.leq_declassify(asec, adata, bsec, bdata) {
            return Some(adata);
        }
        if self.leq_declassify(bsec, bdata, asec, adata) {
            return Some(bdata);
        }

        match (self.data_type(adata), self.data_type(bdata)) {
            (DataType::Prim(pa), DataType::Prim(pb)) => {
                upper_prim(*pa, *pb).map(|p| {
                    let p = p;
                    self.dt_prim(p)
                })
            }
            _ => None,
        }
    }

    /// Whether the public side `b` classifies into the private side `a`.
    fn leq_declassify(
        &mut self,
        asec: SecTypeId,
        adata: DataTypeId,
        bsec: SecTypeId,
        bdata: DataTypeId,
    ) -> bool {
        if !(self.sec_type(asec).is_private() && self.is_public_sec(bsec)) {
            return false;
        }

        let declassified = match self.dtype_declassify(asec, adata) {
            Some(d) => d,
            None => return false,
        };

        match (self.data_type(declassified), self.data_type(bdata)) {
            (DataType::Prim(pa), DataType::Prim(pb)) => upper_prim(*pa, *pb) == Some(*pa),
            _ => false,
        }
    }

    /*******************************************************************
      Full types
    *******************************************************************/

    pub fn ty_void(&mut self) -> TypeId {
        self.intern_ty(Type::Void)
    }

    pub fn ty_basic(&mut self, sec: SecTypeId, data: DataTypeId, dim: DimType) -> TypeId {
        self.intern_ty(Type::Basic { sec, data, dim })
    }

    pub fn ty_public(&mut self, p: Prim, dim: DimType) -> TypeId {
        let sec = self.sec_public();
        let data = self.dt_prim(p);
        self.ty_basic(sec, data, dim)
    }

    /// The type of array indices, dims and sizes: public uint64 scalar.
    pub fn ty_index(&mut self) -> TypeId {
        self.ty_public(Prim::Uint64, 0)
    }

    pub fn ty_public_bool(&mut self) -> TypeId {
        self.ty_public(Prim::Bool, 0)
    }

    pub fn ty_string(&mut self) -> TypeId {
        self.ty_public(Prim::String, 0)
    }

    pub fn ty_proc(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern_ty(Type::Proc { params, ret })
    }

    fn intern_ty(&mut self, ty: Type) -> TypeId {
        let (index, _) = self.types.insert_full(ty);
        TypeId(index as u32)
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        self.types.get_index(id.0 as usize).expect("type id")
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        self.ty(id).is_void()
    }

    pub fn basic_parts(&self, id: TypeId) -> Option<(SecTypeId, DataTypeId, DimType)> {
        match self.ty(id) {
            Type::Basic { sec, data, dim } => Some((*sec, *data, *dim)),
            _ => None,
        }
    }

    pub fn sec_of(&self, id: TypeId) -> SecTypeId {
        self.basic_parts(id).expect("basic type").0
    }

    pub fn data_of(&self, id: TypeId) -> DataTypeId {
        self.basic_parts(id).expect("basic type").1
    }

    pub fn dim_of(&self, id: TypeId) -> DimType {
        self.basic_parts(id).expect("basic type").2
    }

    pub fn is_scalar(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::Basic { dim: 0, .. })
    }

    pub fn is_public_type(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Basic { sec, .. } => self.is_public_sec(*sec),
            _ => false,
        }
    }

    pub fn is_string_type(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Basic { data, .. } => self.data_type(*data).is_string(),
            _ => false,
        }
    }

    pub fn is_public_bool_scalar(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Basic { sec, data, dim } => {
                self.is_public_sec(*sec) && self.data_type(*data).is_bool() && *dim == 0
            }
            _ => false,
        }
    }

    pub fn is_public_uint_scalar(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Basic { sec, data, dim } => {
                self.is_public_sec(*sec)
                    && self.prim_of(*data) == Some(Prim::Uint64)
                    && *dim == 0
            }
            _ => false,
        }
    }

    /// A value of the given type needs memory management: an array, a
    /// private value, or a string.
    pub fn is_nontrivial_resource(&self, id: TypeId) -> bool {
        match self.ty(id) {
            Type::Basic { sec, data, dim } => {
                *dim != 0 || !self.is_public_sec(*sec) || self.data_type(*data).is_string()
            }
            _ => false,
        }
    }

    /// Ordering of basic types: component-wise lattice order.
    pub fn lattice_type_leq(&self, a: TypeId, b: TypeId) -> bool {
        match (self.ty(a), self.ty(b)) {
            (
                Type::Basic {
                    sec: asec,
                    data: adata,
                    dim: adim,
                },
                Type::Basic {
                    sec: bsec,
                    data: bdata,
                    dim: bdim,
                },
            ) => {
                self.lattice_sec_leq(*asec, *bsec)
                    && self.lattice_data_leq(*adata, *bdata)
                    && lattice_dim_leq(*adim, *bdim)
            }
            _ => false,
        }
    }

    /*******************************************************************
      Constants
    *******************************************************************/

    fn intern_constant(&mut self, ty: TypeId, value: ConstValue) -> SymbolId {
        if let Some(&sym) = self.constants.get(&(ty, value.clone())) {
            return sym;
        }

        let name = self.interner.intern("{const}");
        let sym = self.symbols.alloc(Symbol {
            name,
            ty: Some(ty),
            kind: SymbolKind::Constant {
                value: value.clone(),
            },
            file: FileId::DUMMY,
            span: Span::dummy(),
        });
        self.constants.insert((ty, value), sym);
        sym
    }

    pub fn const_int(&mut self, p: Prim, value: u64) -> SymbolId {
        let ty = self.ty_public(p, 0);
        let v = ApInt::new(p.width_in_bits(), value);
        self.intern_constant(ty, ConstValue::Int(v))
    }

    /// Index constants are public uint64 scalars.
    pub fn index_constant(&mut self, value: u64) -> SymbolId {
        self.const_int(Prim::Uint64, value)
    }

    pub fn const_bool(&mut self, value: bool) -> SymbolId {
        self.const_int(Prim::Bool, value as u64)
    }

    pub fn const_float(&mut self, p: Prim, value: f64) -> SymbolId {
        let ty = self.ty_public(p, 0);
        let v = if p == Prim::Float64 {
            ApFloat::double(value)
        } else {
            ApFloat::single(value)
        };
        self.intern_constant(ty, ConstValue::Float(v))
    }

    pub fn const_str(&mut self, value: impl Into<String>) -> SymbolId {
        let ty = self.ty_string();
        self.intern_constant(ty, ConstValue::Str(value.into()))
    }

    /// The language-defined default value of a primitive data type.
    pub fn default_constant(&mut self, data: DataTypeId) -> Option<SymbolId> {
        let p = self.prim_of(data)?;
        Some(match p {
            Prim::Bool => self.const_bool(false),
            Prim::String => self.const_str(""),
            Prim::Float32 | Prim::Float64 | Prim::NumericFloat => {
                self.const_float(if p == Prim::Float64 { Prim::Float64 } else { Prim::Float32 }, 0.0)
            }
            _ => self.const_int(p, 0),
        })
    }

    /// A numeric constant of any concrete primitive type.
    pub fn numeric_constant(&mut self, p: Prim, value: u64) -> SymbolId {
        if p.is_float() {
            self.const_float(p, value as f64)
        } else {
            self.const_int(p, value)
        }
    }

    /*******************************************************************
      Symbols
    *******************************************************************/

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        self.symbols.get(id)
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        self.symbols.get_mut(id)
    }

    pub fn symbol_is_array(&self, id: SymbolId) -> bool {
        self.symbol(id)
            .ty
            .map(|ty| !self.is_scalar(ty) && self.basic_parts(ty).is_some())
            .unwrap_or(false)
    }

    pub fn symbol_is_global(&self, id: SymbolId) -> bool {
        match self.symbol(id).variable() {
            Some(info) => info.is_global,
            None => false,
        }
    }

    /// Record a user-primitive data type inside a kind symbol.
    pub fn add_kind_type(&mut self, kind: SymbolId, name: Atom, params: KindTypeParams) -> bool {
        match &mut self.symbols.get_mut(kind).kind {
            SymbolKind::Kind { types } => types.insert(name, params).is_none(),
            _ => false,
        }
    }

    pub fn kind_type_params(&self, kind: SymbolId, name: Atom) -> Option<&KindTypeParams> {
        match &self.symbols.get(kind).kind {
            SymbolKind::Kind { types } => types.get(&name),
            _ => None,
        }
    }

    /*******************************************************************
      Display helpers
    *******************************************************************/

    pub fn sec_type_string(&self, id: SecTypeId) -> String {
        match self.sec_type(id) {
            SecurityType::Public => "public".to_owned(),
            SecurityType::Private { name, .. } => self.interner.resolve(*name).to_owned(),
        }
    }

    pub fn data_type_string(&self, id: DataTypeId) -> String {
        match self.data_type(id) {
            DataType::Prim(p) => p.name().to_owned(),
            DataType::UserPrim { name } => self.interner.resolve(*name).to_owned(),
            DataType::Struct {
                name, type_args, ..
            } => {
                let mut out = format!("struct {}", self.interner.resolve(*name));
                if !type_args.is_empty() {
                    out.push('<');
                    for (i, arg) in type_args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(&self.type_arg_string(*arg));
                    }
                    out.push('>');
                }
                out
            }
        }
    }

    pub fn type_arg_string(&self, arg: TypeArgument) -> String {
        match arg {
            TypeArgument::Sec(s) => self.sec_type_string(s),
            TypeArgument::Data(d) => self.data_type_string(d),
            TypeArgument::Dim(n) => n.to_string(),
        }
    }

    pub fn type_string(&self, id: TypeId) -> String {
        match self.ty(id) {
            Type::Void => "void".to_owned(),
            Type::Basic { sec, data, dim } => {
                let mut out = String::new();
                if !self.is_public_sec(*sec) {
                    out.push_str(&self.sec_type_string(*sec));
                    out.push(' ');
                }
                out.push_str(&self.data_type_string(*data));
                if *dim != 0 {
                    out.push_str(&format!("[[{dim}]]"));
                }
                out
            }
            Type::Proc { params, ret } => {
                let mut out = String::from("(");
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.type_string(*p));
                }
                out.push_str(") -> ");
                out.push_str(&self.type_string(*ret));
                out
            }
        }
    }

    /// Printable name of a symbol, used by the IR printers.
    pub fn symbol_string(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        match &sym.kind {
            SymbolKind::Constant { value } => match value {
                ConstValue::Int(v) => {
                    let signed = sym
                        .ty
                        .and_then(|ty| self.basic_parts(ty))
                        .and_then(|(_, data, _)| self.prim_of(data))
                        .map(|p| p.is_signed())
                        .unwrap_or(false);
                    if signed {
                        v.signed_string()
                    } else {
                        v.unsigned_string()
                    }
                }
                ConstValue::Float(v) => v.to_string(),
                ConstValue::Str(s) => format!("{s:?}"),
            },
            SymbolKind::Label { block, .. } => match block {
                Some((p, b)) => format!("L<{},{}>", p.0, b.0),
                None => "L<?>".to_owned(),
            },
            _ => self.interner.resolve(sym.name).to_owned(),
        }
    }

    /// Build a fresh variable symbol together with its shape symbols and
    /// (for composites) field symbols, recursively. Used for temporaries
    /// and declared variables alike.
    pub fn make_variable(
        &mut self,
        name: Atom,
        ty: TypeId,
        is_temporary: bool,
        is_global: bool,
    ) -> SymbolId {
        let sym = self.symbols.alloc(Symbol {
            name,
            ty: Some(ty),
            kind: SymbolKind::Variable(Box::new(VariableInfo {
                is_temporary,
                is_global,
                ..VariableInfo::default()
            })),
            file: FileId::DUMMY,
            span: Span::dummy(),
        });

        let (_, data, dim) = match self.basic_parts(ty) {
            Some(parts) => parts,
            None => return sym,
        };

        let index_ty = self.ty_index();
        let mut dims = Vec::new();
        for i in 0..dim {
            let dim_name = {
                let base = self.interner.resolve(name).to_owned();
                self.interner.intern(&format!("{base}{{d{i}}}"))
            };
            dims.push(self.make_variable(dim_name, index_ty, is_temporary, is_global));
        }
        let size = if dim > 0 {
            let size_name = {
                let base = self.interner.resolve(name).to_owned();
                self.interner.intern(&format!("{base}{{size}}"))
            };
            Some(self.make_variable(size_name, index_ty, is_temporary, is_global))
        } else {
            None
        };

        let mut fields = Vec::new();
        if let DataType::Struct { fields: fs, .. } = self.data_type(data).clone() {
            for field in fs {
                let field_name = {
                    let base = self.interner.resolve(name).to_owned();
                    let fname = self.interner.resolve(field.name).to_owned();
                    self.interner.intern(&format!("{base}.{fname}"))
                };
                fields.push(self.make_variable(field_name, field.ty, is_temporary, is_global));
            }
        }

        for &d in &dims {
            if let Some(info) = self.symbols.get_mut(d).variable_mut() {
                info.parent = Some(sym);
            }
        }
        if let Some(s) = size {
            if let Some(info) = self.symbols.get_mut(s).variable_mut() {
                info.parent = Some(sym);
            }
        }
        for &f in &fields {
            if let Some(info) = self.symbols.get_mut(f).variable_mut() {
                info.parent = Some(sym);
            }
        }

        let info = self.symbols.get_mut(sym).variable_mut().expect("variable");
        info.dims = dims;
        info.size = size;
        info.fields = fields;
        sym
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Context {
        Context::new(Interner::new())
    }

    #[test]
    fn interned_types_are_identical() {
        let mut cxt = fresh();
        let a = cxt.ty_public(Prim::Int64, 0);
        let b = cxt.ty_public(Prim::Int64, 0);
        let c = cxt.ty_public(Prim::Int64, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn constants_are_interned() {
        let mut cxt = fresh();
        let a = cxt.const_int(Prim::Int64, 42);
        let b = cxt.const_int(Prim::Int64, 42);
        let c = cxt.const_int(Prim::Int32, 42);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn upper_sec_type_rules() {
        let mut cxt = fresh();
        let public = cxt.sec_public();
        let kind_name = cxt.interner.intern("shared3p");
        let kind = cxt.symbols.alloc(Symbol {
            name: kind_name,
            ty: None,
            kind: SymbolKind::Kind {
                types: Default::default(),
            },
            file: FileId::DUMMY,
            span: Span::dummy(),
        });
        let d1_name = cxt.interner.intern("pd1");
        let d2_name = cxt.interner.intern("pd2");
        let d1 = cxt.sec_private(d1_name, kind);
        let d2 = cxt.sec_private(d2_name, kind);

        assert_eq!(cxt.upper_sec_type(public, d1), Some(d1));
        assert_eq!(cxt.upper_sec_type(d1, public), Some(d1));
        assert_eq!(cxt.upper_sec_type(d1, d1), Some(d1));
        assert_eq!(cxt.upper_sec_type(d1, d2), None);
    }

    #[test]
    fn variable_shape_symbols() {
        let mut cxt = fresh();
        let ty = cxt.ty_public(Prim::Int64, 2);
        let name = cxt.interner.intern("x");
        let var = cxt.make_variable(name, ty, false, false);
        let info = cxt.symbol(var).variable().unwrap().clone();
        assert_eq!(info.dims.len(), 2);
        assert!(info.size.is_some());
        for d in &info.dims {
            assert!(cxt.is_public_uint_scalar(cxt.symbol(*d).ty.unwrap()));
        }
    }

    #[test]
    fn xor_declassify() {
        let mut cxt = fresh();
        let public = cxt.sec_public();
        let xor = cxt.dt_prim(Prim::XorUint32);
        let out = cxt.dtype_declassify(public, xor).unwrap();
        assert_eq!(cxt.prim_of(out), Some(Prim::Uint32));
    }
}
