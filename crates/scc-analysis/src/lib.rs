//! Dataflow analyses over the control-flow graph.
//!
//! All analyses implement the same five callbacks and run together under
//! one driver to a joint fixpoint, amortising CFG traversal. Forward
//! analyses fold predecessor out-states; backward analyses fold successor
//! in-states. Facts crossing procedure boundaries travel only along the
//! `Call`/`Ret` edges, which most analyses filter out.

pub mod constant_folding;
pub mod copy_propagation;
pub mod dataflow;
pub mod dominators;
pub mod live_memory;
pub mod live_variables;
pub mod optimizer;
pub mod reaching;

pub use constant_folding::ConstantFolding;
pub use copy_propagation::CopyPropagation;
pub use dataflow::{
    run_analyses, DataFlowAnalysis, DataFlowAnalysisRunner, Direction, InstrRef,
};
pub use dominators::Dominators;
pub use live_memory::LiveMemory;
pub use live_variables::LiveVariables;
pub use optimizer::optimize_program;
pub use reaching::{
    ReachableDefinitions, ReachableReturns, ReachableUses, ReachingDeclassify,
    ReachingDefinitions, ReachingJumps,
};

/// Construct the analysis a CLI name selects, if any.
pub fn analysis_by_name(name: &str) -> Option<Box<dyn DataFlowAnalysis>> {
    let analysis: Box<dyn DataFlowAnalysis> = match name {
        "rd" => Box::new(ReachingDefinitions::new()),
        "rj" => Box::new(ReachingJumps::new()),
        "rdc" => Box::new(ReachingDeclassify::new()),
        "ru" => Box::new(ReachableUses::new()),
        "rabled" => Box::new(ReachableDefinitions::new()),
        "lv" => Box::new(LiveVariables::new()),
        "lm" => Box::new(LiveMemory::new()),
        "cf" => Box::new(ConstantFolding::new()),
        "cp" => Box::new(CopyPropagation::new()),
        "rr" => Box::new(ReachableReturns::new()),
        _ => return None,
    };
    Some(analysis)
}
