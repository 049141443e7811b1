//! Template instantiation.
//!
//! An instance is identified by the template symbol and the tuple of type
//! arguments bound to its quantifiers. `add` lazily clones the template
//! body into a fresh scope whose quantifiers are bound to the concrete
//! arguments, and queues the instance; the code generator drains the
//! worklist, type checking and lowering each pending body. `add` performs
//! no elaboration itself so it is safe to call from within elaboration.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use scc_ast::{refresh::refresh_proc_def, NodeIdGen, ProcDef, Quantifier, QuantifierKind};
use scc_common::FileId;
use scc_core::{
    Context, ScopeId, Symbol, SymbolId, SymbolKind, SymbolTable, TypeArgument, GLOBAL_SCOPE,
};
use std::collections::VecDeque;
use std::rc::Rc;

/// A template plus the ordered tuple of its quantifier bindings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instantiation {
    pub templ: SymbolId,
    pub args: Vec<TypeArgument>,
}

#[derive(Clone, Debug)]
pub struct InstanceInfo {
    pub body: Rc<ProcDef>,
    pub scope: ScopeId,
    pub file: FileId,
    /// The monomorphic procedure symbol, filled in once the signature of
    /// the cloned body has been elaborated.
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Default)]
pub struct TemplateInstantiator {
    instances: IndexMap<Instantiation, InstanceInfo>,
    generated: FxHashSet<Instantiation>,
    worklist: VecDeque<Instantiation>,
}

impl TemplateInstantiator {
    pub fn new() -> Self {
        TemplateInstantiator::default()
    }

    /// The cached instance, or a fresh clone of the template body in a
    /// new scope binding each quantifier to its argument. New instances
    /// are pushed on the worklist for later elaboration.
    pub fn add(
        &mut self,
        inst: &Instantiation,
        cxt: &mut Context,
        st: &mut SymbolTable,
        idgen: &mut NodeIdGen,
    ) -> InstanceInfo {
        if let Some(info) = self.instances.get(inst) {
            return info.clone();
        }

        let (decl, file, module_scope) = {
            let sym = cxt.symbol(inst.templ);
            match &sym.kind {
                SymbolKind::ProcTemplate(info) => (info.decl.clone(), sym.file, info.module_scope),
                SymbolKind::OpTemplate(info) => (info.decl.clone(), sym.file, info.module_scope),
                _ => panic!("instantiating a non-template symbol"),
            }
        };

        let scope = st.new_scope(GLOBAL_SCOPE);
        if module_scope != GLOBAL_SCOPE {
            st.add_import(scope, module_scope);
        }
        debug_assert_eq!(decl.quantifiers.len(), inst.args.len());
        for (quant, &arg) in decl.quantifiers.iter().zip(&inst.args) {
            bind_quantifier(cxt, st, scope, quant, arg);
        }

        let mut body = decl.body.clone();
        refresh_proc_def(&mut body, idgen);
        let info = InstanceInfo {
            body: Rc::new(body),
            scope,
            file,
            symbol: None,
        };

        self.instances.insert(inst.clone(), info.clone());
        self.worklist.push_back(inst.clone());
        info
    }

    pub fn set_symbol(&mut self, inst: &Instantiation, symbol: SymbolId) {
        if let Some(info) = self.instances.get_mut(inst) {
            info.symbol = Some(symbol);
        }
    }

    pub fn get(&self, inst: &Instantiation) -> Option<&InstanceInfo> {
        self.instances.get(inst)
    }

    /// Pop the next instance pending code generation, if any.
    pub fn pop_for_instantiation(&mut self) -> Option<(Instantiation, InstanceInfo)> {
        while let Some(inst) = self.worklist.pop_front() {
            if self.generated.insert(inst.clone()) {
                let info = self.instances.get(&inst).expect("queued instance").clone();
                return Some((inst, info));
            }
        }
        None
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

fn bind_quantifier(
    cxt: &mut Context,
    st: &mut SymbolTable,
    scope: ScopeId,
    quant: &Quantifier,
    arg: TypeArgument,
) {
    let kind = match (&quant.kind, arg) {
        (QuantifierKind::Domain(_), TypeArgument::Sec(sec)) => SymbolKind::Domain { sec },
        (QuantifierKind::Data, TypeArgument::Data(data)) => SymbolKind::DataVar { data },
        (QuantifierKind::Dim, TypeArgument::Dim(dim)) => SymbolKind::DimVar { dim },
        _ => panic!("quantifier/argument kind mismatch"),
    };

    let sym = cxt.symbols.alloc(Symbol {
        name: quant.name.name,
        ty: None,
        kind,
        file: FileId::DUMMY,
        span: quant.span,
    });
    st.append_symbol(scope, sym);
}
