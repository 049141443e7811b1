//! Lexically nested symbol scopes.
//!
//! Scopes form a tree rooted at the global scope; lookup walks the parent
//! chain and, within each scope, any imported module scopes. Temporaries
//! and labels are kept apart from named symbols so scope-exit release and
//! `--print-st` only see source-level variables.

use crate::context::Context;
use crate::imop::ImopId;
use crate::symbol::{Symbol, SymbolId, SymbolKind};
use crate::types::TypeId;
use rustc_hash::FxHashMap;
use scc_common::{Atom, FileId, Span};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Lookup category, mirroring the symbol categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymCategory {
    Variable,
    Procedure,
    ProcTemplate,
    OpTemplate,
    Struct,
    Kind,
    Domain,
    DataVar,
    DimVar,
}

fn matches(kind: &SymbolKind, cat: SymCategory) -> bool {
    match cat {
        SymCategory::Variable => matches!(kind, SymbolKind::Variable(_)),
        SymCategory::Procedure => matches!(kind, SymbolKind::Procedure(_)),
        SymCategory::ProcTemplate => matches!(kind, SymbolKind::ProcTemplate(_)),
        SymCategory::OpTemplate => matches!(kind, SymbolKind::OpTemplate(_)),
        SymCategory::Struct => matches!(kind, SymbolKind::Struct { .. }),
        SymCategory::Kind => matches!(kind, SymbolKind::Kind { .. }),
        SymCategory::Domain => matches!(kind, SymbolKind::Domain { .. }),
        SymCategory::DataVar => matches!(kind, SymbolKind::DataVar { .. }),
        SymCategory::DimVar => matches!(kind, SymbolKind::DimVar { .. }),
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    /// Named symbols, in declaration order.
    symbols: Vec<SymbolId>,
    /// Temporaries of this scope.
    temporaries: Vec<SymbolId>,
    /// Imported module scopes searched after this scope's own symbols.
    imports: Vec<ScopeId>,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    labels: FxHashMap<ImopId, SymbolId>,
    temp_counter: u32,
}

pub const GLOBAL_SCOPE: ScopeId = ScopeId(0);

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                parent: None,
                symbols: Vec::new(),
                temporaries: Vec::new(),
                imports: Vec::new(),
            }],
            labels: FxHashMap::default(),
            temp_counter: 0,
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        GLOBAL_SCOPE
    }

    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            symbols: Vec::new(),
            temporaries: Vec::new(),
            imports: Vec::new(),
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Add an imported module scope. Returns false when already present.
    pub fn add_import(&mut self, scope: ScopeId, import: ScopeId) -> bool {
        let imports = &mut self.scopes[scope.0 as usize].imports;
        if imports.contains(&import) {
            return false;
        }
        imports.push(import);
        true
    }

    pub fn append_symbol(&mut self, scope: ScopeId, sym: SymbolId) {
        self.scopes[scope.0 as usize].symbols.push(sym);
    }

    /// Allocate a fresh temporary of the given type in the given scope.
    pub fn append_temporary(
        &mut self,
        cxt: &mut Context,
        scope: ScopeId,
        ty: TypeId,
    ) -> SymbolId {
        let name = cxt.interner.intern(&format!("{{t}}{}", self.temp_counter));
        self.temp_counter += 1;
        let sym = cxt.make_variable(name, ty, true, false);
        self.scopes[scope.0 as usize].temporaries.push(sym);
        sym
    }

    /// The label symbol of an instruction, created on first use.
    pub fn label(&mut self, cxt: &mut Context, imop: ImopId) -> SymbolId {
        if let Some(&sym) = self.labels.get(&imop) {
            return sym;
        }

        let name = cxt.interner.intern(&format!("{{label}}{}", imop.0));
        let sym = cxt.symbols.alloc(Symbol {
            name,
            ty: None,
            kind: SymbolKind::Label { imop, block: None },
            file: FileId::DUMMY,
            span: Span::dummy(),
        });
        self.labels.insert(imop, sym);
        sym
    }

    /// Find the closest symbol of the given category and name, walking
    /// the scope chain and imports.
    pub fn find(
        &self,
        cxt: &Context,
        scope: ScopeId,
        cat: SymCategory,
        name: Atom,
    ) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(sym) = self.find_in_scope(cxt, s, cat, name) {
                return Some(sym);
            }
            current = self.scopes[s.0 as usize].parent;
        }
        None
    }

    fn find_in_scope(
        &self,
        cxt: &Context,
        scope: ScopeId,
        cat: SymCategory,
        name: Atom,
    ) -> Option<SymbolId> {
        let s = &self.scopes[scope.0 as usize];
        for &sym in s.symbols.iter().rev() {
            let symbol = cxt.symbol(sym);
            if symbol.name == name && matches(&symbol.kind, cat) {
                return Some(sym);
            }
        }
        for &import in &s.imports {
            let i = &self.scopes[import.0 as usize];
            for &sym in i.symbols.iter().rev() {
                let symbol = cxt.symbol(sym);
                if symbol.name == name && matches(&symbol.kind, cat) {
                    return Some(sym);
                }
            }
        }
        None
    }

    /// All symbols of the given category and name visible from a scope,
    /// innermost first. Used for overload sets.
    pub fn find_all(
        &self,
        cxt: &Context,
        scope: ScopeId,
        cat: SymCategory,
        name: Atom,
    ) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            let scope_data = &self.scopes[s.0 as usize];
            for &sym in scope_data.symbols.iter().rev() {
                let symbol = cxt.symbol(sym);
                if symbol.name == name && matches(&symbol.kind, cat) {
                    out.push(sym);
                }
            }
            for &import in &scope_data.imports {
                let i = &self.scopes[import.0 as usize];
                for &sym in i.symbols.iter().rev() {
                    let symbol = cxt.symbol(sym);
                    if symbol.name == name && matches(&symbol.kind, cat) {
                        out.push(sym);
                    }
                }
            }
            current = scope_data.parent;
        }
        out
    }

    /// Whether the name is already bound in exactly this scope.
    pub fn defined_in_scope(&self, cxt: &Context, scope: ScopeId, name: Atom) -> bool {
        self.scopes[scope.0 as usize]
            .symbols
            .iter()
            .any(|&sym| cxt.symbol(sym).name == name)
    }

    /// Named variables declared directly in this scope, in declaration
    /// order.
    pub fn variables(&self, cxt: &Context, scope: ScopeId) -> Vec<SymbolId> {
        self.scopes[scope.0 as usize]
            .symbols
            .iter()
            .copied()
            .filter(|&sym| cxt.symbol(sym).is_variable())
            .collect()
    }

    /// Named variables of every scope from `scope` up to, but not
    /// including, `end`. Scopes are visited innermost first and each
    /// scope's variables are yielded in reverse declaration order, which
    /// is the release order at scope exits.
    pub fn variables_up_to(
        &self,
        cxt: &Context,
        scope: ScopeId,
        end: Option<ScopeId>,
    ) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            if Some(s) == end {
                break;
            }
            let scope_data = &self.scopes[s.0 as usize];
            for &sym in scope_data.symbols.iter().rev() {
                if cxt.symbol(sym).is_variable() {
                    out.push(sym);
                }
            }
            current = scope_data.parent;
        }
        out
    }

    /// Render the table for `--print-st`.
    pub fn print(&self, cxt: &Context) -> String {
        let mut out = String::new();
        self.print_scope(cxt, GLOBAL_SCOPE, 0, &mut out);
        out
    }

    fn print_scope(&self, cxt: &Context, scope: ScopeId, depth: usize, out: &mut String) {
        let indent = "    ".repeat(depth);
        let title = if scope == GLOBAL_SCOPE { "SCOPE Global" } else { "SCOPE Local" };
        out.push_str(&format!("{indent}{title}\n"));
        for &sym in &self.scopes[scope.0 as usize].symbols {
            let symbol = cxt.symbol(sym);
            let kind = match &symbol.kind {
                SymbolKind::Constant { .. } => "CONST",
                SymbolKind::Variable(_) => "VARIABLE",
                SymbolKind::Procedure(_) => "PROCEDURE",
                SymbolKind::ProcTemplate(_) => "TEMPLATE",
                SymbolKind::OpTemplate(_) => "OPERATOR TEMPLATE",
                SymbolKind::Struct { .. } => "STRUCT",
                SymbolKind::Label { .. } => "LABEL",
                SymbolKind::Kind { .. } => "KIND",
                SymbolKind::Domain { .. } => "DOMAIN",
                SymbolKind::DataVar { .. } => "TYPE",
                SymbolKind::DimVar { .. } => "DIM",
            };
            let ty = symbol
                .ty
                .map(|ty| format!(" {}", cxt.type_string(ty)))
                .unwrap_or_default();
            out.push_str(&format!(
                "{indent}    {kind} {}{ty}\n",
                cxt.interner.resolve(symbol.name)
            ));
        }
        // Child scopes are printed in creation order.
        for id in 0..self.scopes.len() {
            if self.scopes[id].parent == Some(scope) {
                self.print_scope(cxt, ScopeId(id as u32), depth + 1, out);
            }
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scc_ast::Prim;
    use scc_common::Interner;

    fn variable(cxt: &mut Context, name: &str) -> SymbolId {
        let ty = cxt.ty_public(Prim::Int64, 0);
        let atom = cxt.interner.intern(name);
        cxt.make_variable(atom, ty, false, false)
    }

    #[test]
    fn lookup_walks_the_scope_chain() {
        let mut cxt = Context::new(Interner::new());
        let mut st = SymbolTable::new();
        let inner = st.new_scope(GLOBAL_SCOPE);

        let x = variable(&mut cxt, "x");
        st.append_symbol(GLOBAL_SCOPE, x);
        let name = cxt.interner.intern("x");
        assert_eq!(st.find(&cxt, inner, SymCategory::Variable, name), Some(x));
        assert_eq!(st.find(&cxt, inner, SymCategory::Domain, name), None);
    }

    #[test]
    fn shadowing_prefers_the_latest_binding() {
        let mut cxt = Context::new(Interner::new());
        let mut st = SymbolTable::new();
        let inner = st.new_scope(GLOBAL_SCOPE);

        let outer_x = variable(&mut cxt, "x");
        st.append_symbol(GLOBAL_SCOPE, outer_x);
        let inner_x = variable(&mut cxt, "x");
        st.append_symbol(inner, inner_x);

        let name = cxt.interner.intern("x");
        assert_eq!(
            st.find(&cxt, inner, SymCategory::Variable, name),
            Some(inner_x)
        );
    }

    #[test]
    fn variables_up_to_stops_at_the_boundary() {
        let mut cxt = Context::new(Interner::new());
        let mut st = SymbolTable::new();
        let mid = st.new_scope(GLOBAL_SCOPE);
        let inner = st.new_scope(mid);

        let a = variable(&mut cxt, "a");
        st.append_symbol(mid, a);
        let b = variable(&mut cxt, "b");
        st.append_symbol(inner, b);
        let g = variable(&mut cxt, "g");
        st.append_symbol(GLOBAL_SCOPE, g);

        let collected = st.variables_up_to(&cxt, inner, Some(GLOBAL_SCOPE));
        assert_eq!(collected, vec![b, a]);
    }

    #[test]
    fn imported_scopes_are_searched() {
        let mut cxt = Context::new(Interner::new());
        let mut st = SymbolTable::new();
        let module = st.new_scope(GLOBAL_SCOPE);
        let user = st.new_scope(GLOBAL_SCOPE);

        let f = variable(&mut cxt, "f");
        st.append_symbol(module, f);
        assert!(st.add_import(user, module));
        assert!(!st.add_import(user, module));

        let name = cxt.interner.intern("f");
        assert_eq!(st.find(&cxt, user, SymCategory::Variable, name), Some(f));
    }
}
