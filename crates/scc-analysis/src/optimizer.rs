//! The `-O` pipeline.
//!
//! Repeatedly runs constant folding, copy propagation and live-memory
//! analysis to their joint fixpoint and applies the rewrites each
//! enables, until a whole round changes nothing: folded destinations
//! become ASSIGN/CLASSIFY of constants, value reads are redirected
//! through available copies, copies whose destination memory is dead
//! become moves or disappear, and allocations that are never read are
//! dropped together with their releases. Unreachable blocks are emptied
//! last.

use crate::constant_folding::ConstantFolding;
use crate::copy_propagation::CopyPropagation;
use crate::dataflow::{run_analyses, DataFlowAnalysis};
use crate::live_memory::{never_read_symbols, LiveMemory, MemUse};
use rustc_hash::FxHashSet;
use scc_core::{program::BlockRef, Context, Imop, Opcode, Program, SymbolId};
use tracing::debug;

/// Run the optimization passes to a fixpoint. Returns the total number
/// of rewrites applied.
pub fn optimize_program(cxt: &mut Context, program: &mut Program) -> usize {
    let mut total = 0usize;
    loop {
        let mut round = 0usize;

        let mut folding = ConstantFolding::new();
        let mut copies = CopyPropagation::new();
        let mut memory = LiveMemory::new();
        {
            let mut analyses: Vec<&mut dyn DataFlowAnalysis> =
                vec![&mut folding, &mut copies, &mut memory];
            run_analyses(cxt, program, &mut analyses);
        }

        for at in block_refs(program) {
            if !program.block(at).reachable {
                continue;
            }
            round += folding.optimize_block(cxt, program, at);
        }

        round += copies.propagate(program);
        round += elide_dead_copies(cxt, program, &memory);
        round += remove_never_read(cxt, program);

        total += round;
        debug!(rewrites = round, "optimization round");
        if round == 0 {
            break;
        }
    }

    total += prune_unreachable(program);
    total
}

fn block_refs(program: &Program) -> Vec<BlockRef> {
    program.all_blocks().map(|(at, _)| at).collect()
}

fn comment_out(cxt: &mut Context, imop: &mut Imop, note: &str) {
    let text = cxt.const_str(note);
    imop.replace_with(Imop::new(Opcode::Comment, [None, Some(text)]));
}

/// COPY instructions whose source is dead afterwards degrade to plain
/// moves; ones whose destination is dead disappear.
fn elide_dead_copies(cxt: &mut Context, program: &mut Program, memory: &LiveMemory) -> usize {
    let mut rewrites: Vec<(BlockRef, usize, bool)> = Vec::new();
    for at in block_refs(program) {
        if !program.block(at).reachable {
            continue;
        }
        memory.scan_block(cxt, program, at, |i, imop, after| {
            if imop.op != Opcode::Copy {
                return;
            }
            let dest = match imop.dest() {
                Some(dest) => dest,
                None => return,
            };
            let src = match imop.arg1() {
                Some(src) => src,
                None => return,
            };

            let dest_read = after
                .get(&dest)
                .map(|f| f.contains(MemUse::READ))
                .unwrap_or(false);
            if !dest_read {
                rewrites.push((at, i, false));
                return;
            }

            let src_live = after
                .get(&src)
                .map(|f| !f.is_empty())
                .unwrap_or(false);
            let src_is_temp = cxt
                .symbol(src)
                .variable()
                .map(|info| info.is_temporary)
                .unwrap_or(false);
            if !src_live && src_is_temp {
                rewrites.push((at, i, true));
            }
        });
    }

    let count = rewrites.len();
    for (at, i, to_move) in rewrites {
        if to_move {
            let old = program.block(at).imops[i].clone();
            let size = old.arg2();
            let mut args = vec![old.dest(), old.arg1()];
            if let Some(size) = size {
                args.push(Some(size));
            }
            let moved = Imop::new(Opcode::Assign, args).with_loc(old.file, old.span);
            program.block_mut(at).imops[i].replace_with(moved);
        } else {
            let imop = &mut program.block_mut(at).imops[i];
            comment_out(cxt, imop, "dead copy removed");
        }
    }
    count
}

/// Allocations nobody ever reads, together with their releases.
fn remove_never_read(cxt: &mut Context, program: &mut Program) -> usize {
    let dead: FxHashSet<SymbolId> = never_read_symbols(cxt, program)
        .into_iter()
        .filter(|&sym| {
            cxt.symbol(sym)
                .variable()
                .map(|info| info.is_temporary)
                .unwrap_or(false)
        })
        .collect();
    if dead.is_empty() {
        return 0;
    }

    let mut count = 0usize;
    for at in block_refs(program) {
        for i in 0..program.block(at).imops.len() {
            let imop = &program.block(at).imops[i];
            let removable = match imop.op {
                Opcode::Release => imop.arg1().map(|s| dead.contains(&s)).unwrap_or(false),
                Opcode::Alloc | Opcode::Copy => {
                    imop.dest().map(|s| dead.contains(&s)).unwrap_or(false)
                }
                _ => false,
            };
            if removable {
                let imop = &mut program.block_mut(at).imops[i];
                comment_out(cxt, imop, "dead allocation removed");
                count += 1;
            }
        }
    }
    count
}

/// Empty the bodies of unreachable blocks; the blocks stay so indices
/// remain stable.
fn prune_unreachable(program: &mut Program) -> usize {
    let mut count = 0usize;
    for at in block_refs(program) {
        let block = program.block_mut(at);
        if !block.reachable && !block.imops.is_empty() {
            count += block.imops.len();
            block.imops.clear();
        }
    }
    count
}
