//! The monotone dataflow framework.
//!
//! The driver iterates blocks in quasi-reverse-postorder (procedures in
//! order, blocks of each procedure in RPO; backward analyses see the
//! reverse) until no analysis reports a change. Within one step the
//! dispatch order over the registered analyses is unspecified but
//! stable.

use scc_core::{program::BlockRef, Context, Edge, Program};
use tracing::debug;

/// A stable reference to one instruction after block construction.
pub type InstrRef = (BlockRef, usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

pub trait DataFlowAnalysis {
    fn name(&self) -> &'static str;

    fn direction(&self) -> Direction;

    /// One-shot initialization over the whole program.
    fn start(&mut self, cxt: &Context, program: &Program);

    /// Reset the in-state (out-state for backward analyses) of a block.
    fn start_block(&mut self, at: BlockRef);

    /// Fold one neighbour's state into the block's accumulating state.
    /// For forward analyses `from` is a predecessor of `to`; for
    /// backward analyses `from` is a successor of `to`.
    fn in_from(&mut self, cxt: &Context, program: &Program, from: BlockRef, edge: Edge, to: BlockRef);

    /// Propagate the accumulated state through the block; report whether
    /// the block's exposed state changed.
    fn finish_block(&mut self, cxt: &Context, program: &Program, at: BlockRef) -> bool;

    /// One-shot finalization.
    fn finish(&mut self);

    /// Render the result for the `--analysis` flag.
    fn to_string(&self, cxt: &Context, program: &Program) -> String;
}

/// Runs any number of analyses to a joint fixpoint.
#[derive(Default)]
pub struct DataFlowAnalysisRunner {
    analyses: Vec<Box<dyn DataFlowAnalysis>>,
}

impl DataFlowAnalysisRunner {
    pub fn new() -> Self {
        DataFlowAnalysisRunner::default()
    }

    pub fn add_analysis(&mut self, analysis: Box<dyn DataFlowAnalysis>) -> &mut Self {
        self.analyses.push(analysis);
        self
    }

    pub fn analyses(&self) -> &[Box<dyn DataFlowAnalysis>] {
        &self.analyses
    }

    pub fn run(&mut self, cxt: &Context, program: &Program) {
        let mut refs: Vec<&mut dyn DataFlowAnalysis> = Vec::with_capacity(self.analyses.len());
        for a in self.analyses.iter_mut() {
            refs.push(&mut **a);
        }
        run_analyses(cxt, program, &mut refs);
    }

    pub fn to_string(&self, cxt: &Context, program: &Program) -> String {
        let mut out = String::new();
        for analysis in &self.analyses {
            out.push_str(&analysis.to_string(cxt, program));
        }
        out
    }
}

/// Iterate a set of analyses to a joint fixpoint. The runner delegates
/// here; the optimizer calls it directly with concrete analyses it wants
/// to inspect afterwards.
pub fn run_analyses(
    cxt: &Context,
    program: &Program,
    analyses: &mut [&mut dyn DataFlowAnalysis],
) {
    let order = program.rpo();
    let has_forward = analyses.iter().any(|a| a.direction() == Direction::Forward);
    let has_backward = analyses.iter().any(|a| a.direction() == Direction::Backward);

    for analysis in analyses.iter_mut() {
        analysis.start(cxt, program);
    }

    let mut iterations = 0usize;
    loop {
        let mut changed = false;

        if has_forward {
            for &at in &order {
                if !program.block(at).reachable {
                    continue;
                }
                for analysis in analyses.iter_mut() {
                    if analysis.direction() != Direction::Forward {
                        continue;
                    }
                    analysis.start_block(at);
                    let preds: Vec<(BlockRef, Edge)> = program.block(at).pred.clone();
                    for (from, edge) in preds {
                        analysis.in_from(cxt, program, from, edge, at);
                    }
                    if analysis.finish_block(cxt, program, at) {
                        changed = true;
                    }
                }
            }
        }

        if has_backward {
            for &at in order.iter().rev() {
                if !program.block(at).reachable {
                    continue;
                }
                for analysis in analyses.iter_mut() {
                    if analysis.direction() != Direction::Backward {
                        continue;
                    }
                    analysis.start_block(at);
                    let succs: Vec<(BlockRef, Edge)> = program.block(at).succ.clone();
                    for (to, edge) in succs {
                        analysis.in_from(cxt, program, to, edge, at);
                    }
                    if analysis.finish_block(cxt, program, at) {
                        changed = true;
                    }
                }
            }
        }

        iterations += 1;
        if !changed {
            break;
        }
    }
    debug!(iterations, "dataflow fixpoint reached");

    for analysis in analyses.iter_mut() {
        analysis.finish();
    }
}
