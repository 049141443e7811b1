//! Reaching and reachability analyses.
//!
//! The forward members compute, per symbol, the set of instructions that
//! may have written it last; the backward members compute which uses,
//! definitions or returns are still ahead of a program point. Facts
//! about local variables stop at procedure boundaries: `Call`/`Ret`
//! edges carry only globally visible symbols.

use crate::dataflow::{DataFlowAnalysis, Direction, InstrRef};
use rustc_hash::{FxHashMap, FxHashSet};
use scc_core::{program::BlockRef, Context, Edge, Opcode, Program, SymbolId};
use std::fmt::Write;

/// Per-symbol sets of instruction references.
pub type SymSets = FxHashMap<SymbolId, FxHashSet<InstrRef>>;

fn join_sets(into: &mut SymSets, from: &SymSets, globals_only: bool, cxt: &Context) {
    for (&sym, insns) in from {
        if globals_only && !cxt.symbol_is_global(sym) {
            continue;
        }
        into.entry(sym).or_default().extend(insns.iter().copied());
    }
}

fn sets_equal(a: &SymSets, b: &SymSets) -> bool {
    a.len() == b.len() && a.iter().all(|(sym, set)| b.get(sym) == Some(set))
}

fn instr_name(program: &Program, at: InstrRef) -> String {
    format!("{}.{}", program.block(at.0).index, at.1)
}

fn sorted_instrs(program: &Program, set: &FxHashSet<InstrRef>) -> String {
    let mut items: Vec<InstrRef> = set.iter().copied().collect();
    items.sort_by_key(|&(b, i)| (program.block(b).index, i));
    let mut out = String::from("{");
    for (n, at) in items.iter().enumerate() {
        if n > 0 {
            out.push_str(", ");
        }
        out.push_str(&instr_name(program, *at));
    }
    out.push('}');
    out
}

fn print_sym_sets(
    title: &str,
    states: &FxHashMap<BlockRef, SymSets>,
    cxt: &Context,
    program: &Program,
) -> String {
    let mut out = format!("{title} analysis results:\n");
    for p in program.proc_ids() {
        for b in program.proc(p).block_ids() {
            let block = program.proc(p).block(b);
            if !block.reachable {
                continue;
            }
            let state = match states.get(&(p, b)) {
                Some(state) if !state.is_empty() => state,
                _ => continue,
            };
            let _ = writeln!(out, "  [Block {}]", block.index);
            let mut syms: Vec<SymbolId> = state.keys().copied().collect();
            syms.sort();
            for sym in syms {
                let _ = writeln!(
                    out,
                    "    {} --> {}",
                    cxt.symbol_string(sym),
                    sorted_instrs(program, &state[&sym])
                );
            }
        }
    }
    out
}

/*******************************************************************************
  ReachingDefinitions
*******************************************************************************/

/// For every block entry, per symbol, the instructions that may have
/// written it last.
#[derive(Default)]
pub struct ReachingDefinitions {
    ins: FxHashMap<BlockRef, SymSets>,
    outs: FxHashMap<BlockRef, SymSets>,
}

impl ReachingDefinitions {
    pub fn new() -> Self {
        ReachingDefinitions::default()
    }

    pub fn definitions_on_entry(&self, at: BlockRef) -> Option<&SymSets> {
        self.ins.get(&at)
    }
}

impl DataFlowAnalysis for ReachingDefinitions {
    fn name(&self) -> &'static str {
        "rd"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.ins.clear();
        self.outs.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.ins.insert(at, SymSets::default());
    }

    fn in_from(&mut self, cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        let from_out = match self.outs.get(&from) {
            Some(out) => out.clone(),
            None => return,
        };
        let in_state = self.ins.entry(to).or_default();
        join_sets(in_state, &from_out, edge.is_global(), cxt);
    }

    fn finish_block(&mut self, _cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let mut out = self.ins.get(&at).cloned().unwrap_or_default();
        for (i, imop) in program.block(at).imops.iter().enumerate() {
            for def in imop.def_symbols() {
                let set = out.entry(def).or_default();
                set.clear();
                set.insert((at, i));
            }
        }

        let changed = !sets_equal(&out, self.outs.get(&at).unwrap_or(&SymSets::default()));
        self.outs.insert(at, out);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, cxt: &Context, program: &Program) -> String {
        print_sym_sets("Reaching definitions", &self.ins, cxt, program)
    }
}

/*******************************************************************************
  ReachingJumps
*******************************************************************************/

/// The conditional jumps that may have led to a block, split by whether
/// the positive or negative branch was taken.
#[derive(Default)]
pub struct ReachingJumps {
    in_pos: FxHashMap<BlockRef, FxHashSet<InstrRef>>,
    in_neg: FxHashMap<BlockRef, FxHashSet<InstrRef>>,
    out_pos: FxHashMap<BlockRef, FxHashSet<InstrRef>>,
    out_neg: FxHashMap<BlockRef, FxHashSet<InstrRef>>,
}

impl ReachingJumps {
    pub fn new() -> Self {
        ReachingJumps::default()
    }
}

impl DataFlowAnalysis for ReachingJumps {
    fn name(&self) -> &'static str {
        "rj"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.in_pos.clear();
        self.in_neg.clear();
        self.out_pos.clear();
        self.out_neg.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.in_pos.insert(at, FxHashSet::default());
        self.in_neg.insert(at, FxHashSet::default());
    }

    fn in_from(&mut self, _cxt: &Context, program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        if edge.is_global() {
            return;
        }

        if let Some(pos) = self.out_pos.get(&from) {
            let cloned = pos.clone();
            self.in_pos.entry(to).or_default().extend(cloned);
        }
        if let Some(neg) = self.out_neg.get(&from) {
            let cloned = neg.clone();
            self.in_neg.entry(to).or_default().extend(cloned);
        }

        // A conditional branch adds itself to the set matching the edge
        // its successor was entered by.
        let block = program.block(from);
        if let Some(last) = block.last() {
            if last.op.is_cond_jump() {
                let jump = (from, block.imops.len() - 1);
                match edge {
                    Edge::True => {
                        self.in_pos.entry(to).or_default().insert(jump);
                    }
                    Edge::False => {
                        self.in_neg.entry(to).or_default().insert(jump);
                    }
                    _ => {}
                }
            }
        }
    }

    fn finish_block(&mut self, _cxt: &Context, _program: &Program, at: BlockRef) -> bool {
        let pos = self.in_pos.get(&at).cloned().unwrap_or_default();
        let neg = self.in_neg.get(&at).cloned().unwrap_or_default();
        let changed = self.out_pos.get(&at) != Some(&pos) || self.out_neg.get(&at) != Some(&neg);
        self.out_pos.insert(at, pos);
        self.out_neg.insert(at, neg);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, _cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Reaching jumps analysis results:\n");
        for p in program.proc_ids() {
            for b in program.proc(p).block_ids() {
                let block = program.proc(p).block(b);
                if !block.reachable {
                    continue;
                }
                let pos = self.in_pos.get(&(p, b));
                let neg = self.in_neg.get(&(p, b));
                if pos.map(|s| s.is_empty()).unwrap_or(true)
                    && neg.map(|s| s.is_empty()).unwrap_or(true)
                {
                    continue;
                }
                let _ = writeln!(out, "  [Block {}]", block.index);
                if let Some(pos) = pos.filter(|s| !s.is_empty()) {
                    let _ = writeln!(out, "    + {}", sorted_instrs(program, pos));
                }
                if let Some(neg) = neg.filter(|s| !s.is_empty()) {
                    let _ = writeln!(out, "    - {}", sorted_instrs(program, neg));
                }
            }
        }
        out
    }
}

/*******************************************************************************
  ReachingDeclassify
*******************************************************************************/

/// For every DECLASSIFY, the private writes that may flow into it.
#[derive(Default)]
pub struct ReachingDeclassify {
    ins: FxHashMap<BlockRef, SymSets>,
    outs: FxHashMap<BlockRef, SymSets>,
    /// Declassify instruction -> the writes reaching its argument.
    reaching: FxHashMap<InstrRef, FxHashSet<InstrRef>>,
}

impl ReachingDeclassify {
    pub fn new() -> Self {
        ReachingDeclassify::default()
    }

    fn is_tracked(cxt: &Context, sym: SymbolId) -> bool {
        match cxt.symbol(sym).ty {
            Some(ty) => !cxt.is_public_type(ty) && cxt.basic_parts(ty).is_some(),
            None => false,
        }
    }
}

impl DataFlowAnalysis for ReachingDeclassify {
    fn name(&self) -> &'static str {
        "rdc"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.ins.clear();
        self.outs.clear();
        self.reaching.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.ins.insert(at, SymSets::default());
    }

    fn in_from(&mut self, cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        let from_out = match self.outs.get(&from) {
            Some(out) => out.clone(),
            None => return,
        };
        let in_state = self.ins.entry(to).or_default();
        join_sets(in_state, &from_out, edge.is_global(), cxt);
    }

    fn finish_block(&mut self, cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let mut out = self.ins.get(&at).cloned().unwrap_or_default();
        for (i, imop) in program.block(at).imops.iter().enumerate() {
            if imop.op == Opcode::Declassify {
                if let Some(arg) = imop.arg1() {
                    let writes = out.get(&arg).cloned().unwrap_or_default();
                    self.reaching.insert((at, i), writes);
                }
            }
            for def in imop.def_symbols() {
                if !Self::is_tracked(cxt, def) {
                    continue;
                }
                let set = out.entry(def).or_default();
                set.clear();
                set.insert((at, i));
            }
        }

        let changed = !sets_equal(&out, self.outs.get(&at).unwrap_or(&SymSets::default()));
        self.outs.insert(at, out);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, _cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Reaching declassify analysis results:\n");
        let mut sites: Vec<InstrRef> = self.reaching.keys().copied().collect();
        sites.sort_by_key(|&(b, i)| (program.block(b).index, i));
        for site in sites {
            let _ = writeln!(
                out,
                "  {} <-- {}",
                instr_name(program, site),
                sorted_instrs(program, &self.reaching[&site])
            );
        }
        out
    }
}

/*******************************************************************************
  Backward reachability
*******************************************************************************/

/// What a backward collector picks out of one instruction.
trait Collect: Default {
    const TITLE: &'static str;
    const NAME: &'static str;
    fn collect(imop: &scc_core::Imop) -> bool;
}

/// Sets of interesting instructions still ahead of every block.
struct Reachable<C: Collect> {
    ins: FxHashMap<BlockRef, FxHashSet<InstrRef>>,
    acc: FxHashMap<BlockRef, FxHashSet<InstrRef>>,
    _marker: std::marker::PhantomData<C>,
}

impl<C: Collect> Reachable<C> {
    fn new() -> Self {
        Reachable {
            ins: FxHashMap::default(),
            acc: FxHashMap::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<C: Collect + 'static> DataFlowAnalysis for Reachable<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.ins.clear();
        self.acc.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.acc.insert(at, FxHashSet::default());
    }

    fn in_from(&mut self, _cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        if edge.is_global() {
            return;
        }
        if let Some(succ_in) = self.ins.get(&from) {
            let cloned = succ_in.clone();
            self.acc.entry(to).or_default().extend(cloned);
        }
    }

    fn finish_block(&mut self, _cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let mut state = self.acc.get(&at).cloned().unwrap_or_default();
        for (i, imop) in program.block(at).imops.iter().enumerate().rev() {
            if C::collect(imop) {
                state.insert((at, i));
            }
        }

        let changed = self.ins.get(&at) != Some(&state);
        self.ins.insert(at, state);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, _cxt: &Context, program: &Program) -> String {
        let mut out = format!("{} analysis results:\n", C::TITLE);
        for p in program.proc_ids() {
            for b in program.proc(p).block_ids() {
                let block = program.proc(p).block(b);
                if !block.reachable {
                    continue;
                }
                let set = match self.ins.get(&(p, b)) {
                    Some(set) if !set.is_empty() => set,
                    _ => continue,
                };
                let _ = writeln!(
                    out,
                    "  [Block {}] {}",
                    block.index,
                    sorted_instrs(program, set)
                );
            }
        }
        out
    }
}

#[derive(Default)]
pub struct CollectDefinitions;

impl Collect for CollectDefinitions {
    const TITLE: &'static str = "Reachable definitions";
    const NAME: &'static str = "rabled";
    fn collect(imop: &scc_core::Imop) -> bool {
        !imop.def_symbols().is_empty()
    }
}

#[derive(Default)]
pub struct CollectReturns;

impl Collect for CollectReturns {
    const TITLE: &'static str = "Reachable returns";
    const NAME: &'static str = "rr";
    fn collect(imop: &scc_core::Imop) -> bool {
        imop.op == Opcode::Return
    }
}

/// Definitions still ahead of every block entry.
pub struct ReachableDefinitions(Reachable<CollectDefinitions>);

impl ReachableDefinitions {
    pub fn new() -> Self {
        ReachableDefinitions(Reachable::new())
    }
}

/// RETURN instructions still ahead of every block entry.
pub struct ReachableReturns(Reachable<CollectReturns>);

impl ReachableReturns {
    pub fn new() -> Self {
        ReachableReturns(Reachable::new())
    }
}

macro_rules! delegate_analysis {
    ($outer:ty) => {
        impl DataFlowAnalysis for $outer {
            fn name(&self) -> &'static str {
                self.0.name()
            }
            fn direction(&self) -> Direction {
                self.0.direction()
            }
            fn start(&mut self, cxt: &Context, program: &Program) {
                self.0.start(cxt, program)
            }
            fn start_block(&mut self, at: BlockRef) {
                self.0.start_block(at)
            }
            fn in_from(
                &mut self,
                cxt: &Context,
                program: &Program,
                from: BlockRef,
                edge: Edge,
                to: BlockRef,
            ) {
                self.0.in_from(cxt, program, from, edge, to)
            }
            fn finish_block(&mut self, cxt: &Context, program: &Program, at: BlockRef) -> bool {
                self.0.finish_block(cxt, program, at)
            }
            fn finish(&mut self) {
                self.0.finish()
            }
            fn to_string(&self, cxt: &Context, program: &Program) -> String {
                self.0.to_string(cxt, program)
            }
        }
    };
}

delegate_analysis!(ReachableDefinitions);
delegate_analysis!(ReachableReturns);

/*******************************************************************************
  ReachableUses
*******************************************************************************/

/// For every definition, the uses its value may reach.
#[derive(Default)]
pub struct ReachableUses {
    /// Block-entry state: per symbol, uses still ahead.
    ins: FxHashMap<BlockRef, SymSets>,
    acc: FxHashMap<BlockRef, SymSets>,
    /// Definition -> uses of the defined symbol it reaches.
    uses_of: FxHashMap<InstrRef, FxHashSet<InstrRef>>,
}

impl ReachableUses {
    pub fn new() -> Self {
        ReachableUses::default()
    }

    pub fn uses_of(&self, def: InstrRef) -> Option<&FxHashSet<InstrRef>> {
        self.uses_of.get(&def)
    }
}

impl DataFlowAnalysis for ReachableUses {
    fn name(&self) -> &'static str {
        "ru"
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.ins.clear();
        self.acc.clear();
        self.uses_of.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.acc.insert(at, SymSets::default());
    }

    fn in_from(&mut self, cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        let succ_in = match self.ins.get(&from) {
            Some(state) => state.clone(),
            None => return,
        };
        let acc = self.acc.entry(to).or_default();
        join_sets(acc, &succ_in, edge.is_global(), cxt);
    }

    fn finish_block(&mut self, _cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let mut state = self.acc.get(&at).cloned().unwrap_or_default();
        for (i, imop) in program.block(at).imops.iter().enumerate().rev() {
            for def in imop.def_symbols() {
                let reached = state.remove(&def).unwrap_or_default();
                self.uses_of.insert((at, i), reached);
            }
            for used in imop.use_symbols() {
                state.entry(used).or_default().insert((at, i));
            }
        }

        let changed = !sets_equal(&state, self.ins.get(&at).unwrap_or(&SymSets::default()));
        self.ins.insert(at, state);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, _cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Reachable uses analysis results:\n");
        let mut defs: Vec<InstrRef> = self
            .uses_of
            .iter()
            .filter(|(_, uses)| !uses.is_empty())
            .map(|(&def, _)| def)
            .collect();
        defs.sort_by_key(|&(b, i)| (program.block(b).index, i));
        for def in defs {
            let _ = writeln!(
                out,
                "  {} --> {}",
                instr_name(program, def),
                sorted_instrs(program, &self.uses_of[&def])
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sym_set_join_respects_global_filter() {
        use scc_ast::Prim;
        use scc_common::Interner;
        let mut cxt = Context::new(Interner::new());
        let ty = cxt.ty_public(Prim::Int64, 0);
        let g = cxt.interner.intern("g");
        let l = cxt.interner.intern("l");
        let global = cxt.make_variable(g, ty, false, true);
        let local = cxt.make_variable(l, ty, false, false);

        let mut from = SymSets::default();
        from.entry(global)
            .or_default()
            .insert(((scc_core::ProcId(0), scc_core::BlockId(0)), 0));
        from.entry(local)
            .or_default()
            .insert(((scc_core::ProcId(0), scc_core::BlockId(0)), 1));

        let mut into = SymSets::default();
        join_sets(&mut into, &from, true, &cxt);
        assert!(into.contains_key(&global));
        assert!(!into.contains_key(&local));

        join_sets(&mut into, &from, false, &cxt);
        assert!(into.contains_key(&local));
    }
}
