//! Per-allocation liveness.
//!
//! Tracks only symbols whose values own memory (arrays, private values,
//! strings). A symbol is live when its memory may still be read; RELEASE
//! is deliberately not a read, so the analysis can prove releases
//! correct and let the optimizer drop allocations that are only ever
//! released.

use crate::dataflow::{DataFlowAnalysis, Direction};
use rustc_hash::{FxHashMap, FxHashSet};
use scc_core::{program::BlockRef, Context, Edge, Imop, Opcode, Program, SymbolId};
use std::fmt::Write;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MemUse: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

type MemState = FxHashMap<SymbolId, MemUse>;

fn is_memory_symbol(cxt: &Context, sym: SymbolId) -> bool {
    cxt.symbol(sym)
        .ty
        .map(|ty| cxt.is_nontrivial_resource(ty))
        .unwrap_or(false)
}

/// Symbols read by the instruction through their memory, RELEASE
/// excluded.
fn memory_reads(cxt: &Context, imop: &Imop) -> Vec<SymbolId> {
    if imop.op == Opcode::Release {
        return Vec::new();
    }
    imop.use_symbols()
        .into_iter()
        .filter(|&sym| is_memory_symbol(cxt, sym))
        .collect()
}

/// Symbols whose whole memory is overwritten by the instruction.
fn memory_writes(cxt: &Context, imop: &Imop) -> Vec<SymbolId> {
    // STORE writes one element; it both reads and writes the array and
    // is already covered by `use_symbols`.
    if imop.op == Opcode::Store {
        return Vec::new();
    }
    imop.def_symbols()
        .into_iter()
        .filter(|&sym| is_memory_symbol(cxt, sym))
        .collect()
}

/// Backward liveness over memory-owning symbols.
#[derive(Default)]
pub struct LiveMemory {
    live_in: FxHashMap<BlockRef, MemState>,
    live_out: FxHashMap<BlockRef, MemState>,
}

impl LiveMemory {
    pub fn new() -> Self {
        LiveMemory::default()
    }

    pub fn live_on_exit(&self, at: BlockRef) -> Option<&MemState> {
        self.live_out.get(&at)
    }

    /// Walk a block backward from its exit state; call `visit` with the
    /// state *after* each instruction. Used by the optimizer.
    pub fn scan_block<F>(&self, cxt: &Context, program: &Program, at: BlockRef, mut visit: F)
    where
        F: FnMut(usize, &Imop, &MemState),
    {
        let mut state = self.live_out.get(&at).cloned().unwrap_or_default();
        for (i, imop) in program.block(at).imops.iter().enumerate().rev() {
            visit(i, imop, &state);
            transfer(cxt, imop, &mut state);
        }
    }
}

fn transfer(cxt: &Context, imop: &Imop, state: &mut MemState) {
    for sym in memory_writes(cxt, imop) {
        state.remove(&sym);
    }
    for sym in memory_reads(cxt, imop) {
        *state.entry(sym).or_default() |= MemUse::READ;
    }
    if imop.op == Opcode::Store {
        if let Some(dest) = imop.dest() {
            if is_memory_symbol(cxt, dest) {
                *state.entry(dest).or_default() |= MemUse::READ | MemUse::WRITE;
            }
        }
        for used in imop.use_symbols().into_iter().skip(1) {
            if is_memory_symbol(cxt, used) {
                *state.entry(used).or_default() |= MemUse::READ;
            }
        }
    }
}

impl DataFlowAnalysis for LiveMemory {
    fn name(&self) -> &'static str {
        "lm"
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.live_in.clear();
        self.live_out.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.live_out.insert(at, MemState::default());
    }

    fn in_from(&mut self, cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        let succ_in = match self.live_in.get(&from) {
            Some(state) => state.clone(),
            None => return,
        };
        let out = self.live_out.entry(to).or_default();
        for (sym, flags) in succ_in {
            if edge.is_global() && !cxt.symbol_is_global(sym) {
                continue;
            }
            *out.entry(sym).or_default() |= flags;
        }
    }

    fn finish_block(&mut self, cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let mut state = self.live_out.get(&at).cloned().unwrap_or_default();
        for imop in program.block(at).imops.iter().rev() {
            transfer(cxt, imop, &mut state);
        }

        let changed = self.live_in.get(&at) != Some(&state);
        self.live_in.insert(at, state);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Live memory analysis results:\n");
        for p in program.proc_ids() {
            for b in program.proc(p).block_ids() {
                let block = program.proc(p).block(b);
                if !block.reachable {
                    continue;
                }
                let live = match self.live_out.get(&(p, b)) {
                    Some(live) if !live.is_empty() => live,
                    _ => continue,
                };
                let mut syms: Vec<SymbolId> = live.keys().copied().collect();
                syms.sort();
                let names: Vec<String> = syms
                    .iter()
                    .map(|&sym| {
                        let flags = live[&sym];
                        let mark = match (flags.contains(MemUse::READ), flags.contains(MemUse::WRITE)) {
                            (true, true) => "rw",
                            (true, false) => "r",
                            (false, true) => "w",
                            (false, false) => "-",
                        };
                        format!("{}:{}", cxt.symbol_string(sym), mark)
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  [Block {}] out: {}",
                    block.index,
                    names.join(", ")
                );
            }
        }
        out
    }
}

/// Memory symbols that are never read anywhere in the program. Their
/// allocations and releases can be removed outright.
pub fn never_read_symbols(cxt: &Context, program: &Program) -> FxHashSet<SymbolId> {
    let mut written: FxHashSet<SymbolId> = FxHashSet::default();
    let mut read: FxHashSet<SymbolId> = FxHashSet::default();
    for (_, block) in program.all_blocks() {
        for imop in &block.imops {
            for sym in memory_reads(cxt, imop) {
                read.insert(sym);
            }
            if imop.op == Opcode::Store {
                if let Some(dest) = imop.dest() {
                    read.insert(dest);
                }
                for used in imop.use_symbols().into_iter().skip(1) {
                    read.insert(used);
                }
            }
            for sym in imop.def_symbols() {
                if is_memory_symbol(cxt, sym) {
                    written.insert(sym);
                }
            }
        }
    }
    written.retain(|sym| !read.contains(sym));
    written
}
