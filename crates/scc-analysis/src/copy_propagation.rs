//! Available-copy analysis and propagation.
//!
//! A copy `d = s` (ASSIGN or COPY) is available at a point when it has
//! executed on every path to that point and neither side has been
//! written since. A must-analysis: block entry states meet by
//! intersection. The propagation pass rewrites value reads of `d` into
//! reads of `s` while the copy is available, which in particular leaves
//! COPY destinations dead for the memory optimizer to collect.

use crate::dataflow::{DataFlowAnalysis, Direction};
use rustc_hash::FxHashMap;
use scc_core::{program::BlockRef, Context, Edge, Imop, Opcode, Program, SymbolId};
use std::fmt::Write;

/// dest -> source of every available copy.
type Copies = FxHashMap<SymbolId, SymbolId>;

fn kill(copies: &mut Copies, sym: SymbolId) {
    copies.retain(|&d, &mut s| d != sym && s != sym);
}

fn transfer(copies: &mut Copies, imop: &Imop) {
    for def in imop.def_symbols() {
        kill(copies, def);
    }
    // The callee may write through a reference.
    if imop.op == Opcode::PushRef {
        if let Some(arg) = imop.arg1() {
            kill(copies, arg);
        }
    }

    if matches!(imop.op, Opcode::Assign | Opcode::Copy) {
        if let (Some(dest), Some(src)) = (imop.dest(), imop.arg1()) {
            if dest != src {
                copies.insert(dest, src);
            }
        }
    }
}

/// Operand positions that read a plain value and may be redirected.
fn propagatable_args(imop: &Imop) -> std::ops::Range<usize> {
    match imop.op {
        Opcode::Assign
        | Opcode::Cast
        | Opcode::ToString
        | Opcode::Classify
        | Opcode::Declassify
        | Opcode::Uinv
        | Opcode::Uneg
        | Opcode::Uminus
        | Opcode::Load
        | Opcode::Alloc => 1..imop.n_args().min(3),
        op if op.is_binary_expr() => 1..imop.n_args().min(3),
        // The array operand of STORE is written in place; only the index
        // and value reads may be redirected.
        Opcode::Store => 1..3,
        Opcode::Jt | Opcode::Jf => 1..2,
        Opcode::Push | Opcode::Print => 1..2,
        _ => 0..0,
    }
}

#[derive(Default)]
pub struct CopyPropagation {
    ins: FxHashMap<BlockRef, Copies>,
    outs: FxHashMap<BlockRef, Copies>,
    /// Whether any predecessor has contributed to the block this pass.
    seeded: FxHashMap<BlockRef, bool>,
}

impl CopyPropagation {
    pub fn new() -> Self {
        CopyPropagation::default()
    }

    /// Rewrite value reads through the fixpoint's available copies.
    /// Returns the number of operands redirected.
    pub fn propagate(&self, program: &mut Program) -> usize {
        let mut count = 0usize;
        for p in program.proc_ids().collect::<Vec<_>>() {
            for b in program.proc(p).block_ids().collect::<Vec<_>>() {
                let at = (p, b);
                if !program.block(at).reachable {
                    continue;
                }
                let mut copies = self.ins.get(&at).cloned().unwrap_or_default();
                for imop in &mut program.block_mut(at).imops {
                    for i in propagatable_args(imop) {
                        if let Some(arg) = imop.arg(i) {
                            if let Some(&src) = copies.get(&arg) {
                                imop.set_arg(i, src);
                                count += 1;
                            }
                        }
                    }
                    transfer(&mut copies, imop);
                }
            }
        }
        count
    }
}

impl DataFlowAnalysis for CopyPropagation {
    fn name(&self) -> &'static str {
        "cp"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn start(&mut self, _cxt: &Context, _program: &Program) {
        self.ins.clear();
        self.outs.clear();
        self.seeded.clear();
    }

    fn start_block(&mut self, at: BlockRef) {
        self.ins.insert(at, Copies::default());
        self.seeded.insert(at, false);
    }

    fn in_from(&mut self, cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        // Unprocessed predecessors are optimistically "everything".
        let mut from_out = match self.outs.get(&from) {
            Some(out) => out.clone(),
            None => return,
        };
        if edge.is_global() {
            from_out.retain(|&d, &mut s| cxt.symbol_is_global(d) && cxt.symbol_is_global(s));
        }

        let seeded = self.seeded.entry(to).or_insert(false);
        let in_state = self.ins.entry(to).or_default();
        if !*seeded {
            *in_state = from_out;
            *seeded = true;
        } else {
            in_state.retain(|d, s| from_out.get(d) == Some(s));
        }
    }

    fn finish_block(&mut self, _cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let mut out = self.ins.get(&at).cloned().unwrap_or_default();
        for imop in &program.block(at).imops {
            transfer(&mut out, imop);
        }

        let changed = self.outs.get(&at) != Some(&out);
        self.outs.insert(at, out);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Copy propagation analysis results:\n");
        for p in program.proc_ids() {
            for b in program.proc(p).block_ids() {
                let block = program.proc(p).block(b);
                if !block.reachable {
                    continue;
                }
                let copies = match self.ins.get(&(p, b)) {
                    Some(copies) if !copies.is_empty() => copies,
                    _ => continue,
                };
                let mut pairs: Vec<(SymbolId, SymbolId)> =
                    copies.iter().map(|(&d, &s)| (d, s)).collect();
                pairs.sort();
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|&(d, s)| {
                        format!("{} = {}", cxt.symbol_string(d), cxt.symbol_string(s))
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  [Block {}] {}",
                    block.index,
                    rendered.join(", ")
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_kill_copies_on_both_sides() {
        let d = SymbolId(0);
        let s = SymbolId(1);
        let mut copies = Copies::default();
        transfer(
            &mut copies,
            &Imop::new(Opcode::Assign, [Some(d), Some(s)]),
        );
        assert_eq!(copies.get(&d), Some(&s));

        // Redefining the source invalidates the copy.
        transfer(
            &mut copies,
            &Imop::new(Opcode::Assign, [Some(s), Some(SymbolId(2))]),
        );
        assert!(!copies.contains_key(&d));
    }

    #[test]
    fn pushref_invalidates() {
        let d = SymbolId(0);
        let s = SymbolId(1);
        let mut copies = Copies::default();
        copies.insert(d, s);
        transfer(&mut copies, &Imop::new(Opcode::PushRef, [None, Some(s)]));
        assert!(copies.is_empty());
    }
}
