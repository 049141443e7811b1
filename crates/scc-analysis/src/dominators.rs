//! Per-procedure dominators.
//!
//! Cooper–Harvey–Kennedy: immediate dominators converge by iterated
//! intersection walking the idom chains towards smaller depth-first
//! numbers. Only intra-procedural edges participate.

use crate::dataflow::{DataFlowAnalysis, Direction};
use rustc_hash::FxHashMap;
use scc_core::{program::BlockRef, Context, Edge, Program};
use std::fmt::Write;

#[derive(Default)]
pub struct Dominators {
    idoms: FxHashMap<BlockRef, BlockRef>,
    new_idom: Option<BlockRef>,
}

impl Dominators {
    pub fn new() -> Self {
        Dominators::default()
    }

    pub fn idom(&self, at: BlockRef) -> Option<BlockRef> {
        self.idoms.get(&at).copied()
    }

    /// The completed immediate-dominator map; entries map each block to
    /// its idom, with procedure entries mapping to themselves.
    pub fn idoms(&self) -> &FxHashMap<BlockRef, BlockRef> {
        &self.idoms
    }

    /// All dominators of a block, innermost first, ending at the entry.
    pub fn dominators(&self, mut at: BlockRef) -> Vec<BlockRef> {
        let mut doms = Vec::new();
        loop {
            doms.push(at);
            match self.idom(at) {
                Some(idom) if idom != at => at = idom,
                _ => break,
            }
        }
        doms
    }

    fn intersect(&self, program: &Program, mut b1: BlockRef, mut b2: BlockRef) -> BlockRef {
        while b1 != b2 {
            while program.block(b1).dfn > program.block(b2).dfn {
                b1 = self.idoms[&b1];
            }
            while program.block(b2).dfn > program.block(b1).dfn {
                b2 = self.idoms[&b2];
            }
        }
        b1
    }
}

impl DataFlowAnalysis for Dominators {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn start(&mut self, _cxt: &Context, program: &Program) {
        self.idoms.clear();
        for p in program.proc_ids() {
            let entry = (p, program.proc(p).entry());
            self.idoms.insert(entry, entry);
        }
    }

    fn start_block(&mut self, _at: BlockRef) {
        self.new_idom = None;
    }

    fn in_from(&mut self, _cxt: &Context, program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        if edge.is_global() || from.0 != to.0 {
            return;
        }
        if !self.idoms.contains_key(&from) {
            return;
        }
        self.new_idom = Some(match self.new_idom {
            None => from,
            Some(current) => self.intersect(program, current, from),
        });
    }

    fn finish_block(&mut self, _cxt: &Context, program: &Program, at: BlockRef) -> bool {
        // The entry keeps itself as idom.
        if at.1 == program.proc(at.0).entry() {
            return false;
        }
        let new_idom = match self.new_idom {
            Some(idom) => idom,
            None => return false,
        };
        if self.idoms.get(&at) != Some(&new_idom) {
            self.idoms.insert(at, new_idom);
            return true;
        }
        false
    }

    fn finish(&mut self) {}

    fn to_string(&self, _cxt: &Context, program: &Program) -> String {
        let mut out = String::from("IDOMS:\n");
        for p in program.proc_ids() {
            for b in program.proc(p).block_ids() {
                let block = program.proc(p).block(b);
                if let Some(&idom) = self.idoms.get(&(p, b)) {
                    let _ = writeln!(
                        out,
                        "  {} - {}",
                        block.index,
                        program.block(idom).index
                    );
                }
            }
        }
        out
    }
}
