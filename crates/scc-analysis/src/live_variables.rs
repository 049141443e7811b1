//! Classical backward liveness.

use crate::dataflow::{DataFlowAnalysis, Direction};
use rustc_hash::{FxHashMap, FxHashSet};
use scc_core::{program::BlockRef, Context, Edge, Program, SymbolId};
use std::fmt::Write;

type SymSet = FxHashSet<SymbolId>;

/// Symbols whose current value may still be read.
#[derive(Default)]
pub struct LiveVariables {
    /// Used before any write, per block.
    gen: FxHashMap<BlockRef, SymSet>,
    /// Written anywhere in the block.
    kill: FxHashMap<BlockRef, SymSet>,
    live_in: FxHashMap<BlockRef, SymSet>,
    live_out: FxHashMap<BlockRef, SymSet>,
}

impl LiveVariables {
    pub fn new() -> Self {
        LiveVariables::default()
    }

    pub fn live_on_exit(&self, at: BlockRef) -> Option<&SymSet> {
        self.live_out.get(&at)
    }

    pub fn live_on_entry(&self, at: BlockRef) -> Option<&SymSet> {
        self.live_in.get(&at)
    }
}

impl DataFlowAnalysis for LiveVariables {
    fn name(&self) -> &'static str {
        "lv"
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn start(&mut self, _cxt: &Context, program: &Program) {
        self.gen.clear();
        self.kill.clear();
        self.live_in.clear();
        self.live_out.clear();

        for (at, block) in program.all_blocks() {
            let mut gen = SymSet::default();
            let mut kill = SymSet::default();
            for imop in &block.imops {
                for used in imop.use_symbols() {
                    if !kill.contains(&used) {
                        gen.insert(used);
                    }
                }
                for def in imop.def_symbols() {
                    kill.insert(def);
                }
            }
            self.gen.insert(at, gen);
            self.kill.insert(at, kill);
        }
    }

    fn start_block(&mut self, at: BlockRef) {
        self.live_out.insert(at, SymSet::default());
    }

    fn in_from(&mut self, cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        let succ_in = match self.live_in.get(&from) {
            Some(state) => state.clone(),
            None => return,
        };
        let out = self.live_out.entry(to).or_default();
        for sym in succ_in {
            if edge.is_global() && !cxt.symbol_is_global(sym) {
                continue;
            }
            out.insert(sym);
        }
    }

    fn finish_block(&mut self, _cxt: &Context, _program: &Program, at: BlockRef) -> bool {
        let out = self.live_out.get(&at).cloned().unwrap_or_default();
        let mut live = out;
        if let Some(kill) = self.kill.get(&at) {
            live.retain(|sym| !kill.contains(sym));
        }
        if let Some(gen) = self.gen.get(&at) {
            live.extend(gen.iter().copied());
        }

        let changed = self.live_in.get(&at) != Some(&live);
        self.live_in.insert(at, live);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Live variables analysis results:\n");
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
                let mut syms: Vec<SymbolId> = live.iter().copied().collect();
                syms.sort();
                let names: Vec<String> =
                    syms.iter().map(|&sym| cxt.symbol_string(sym)).collect();
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
