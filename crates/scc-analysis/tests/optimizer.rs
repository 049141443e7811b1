//! Dataflow and optimizer behavior over compiled programs.

use scc_analysis::{
    analysis_by_name, optimize_program, run_analyses, ConstantFolding, DataFlowAnalysis,
    DataFlowAnalysisRunner, Dominators, LiveVariables,
};
use scc_ast::NodeIdGen;
use scc_common::{CompileLog, Interner, SourceMap};
use scc_core::{ConstValue, Context, Opcode, Program, SymbolTable};

fn compile(src: &str) -> (Context, Program) {
    let mut sources = SourceMap::new();
    let file = sources.add_file("test.sc", src);
    let mut interner = Interner::new();
    let mut idgen = NodeIdGen::new();
    let mut log = CompileLog::new();
    let module = scc_parser::parse_module(file, &sources, &mut interner, &mut idgen, &mut log)
        .unwrap_or_else(|_| panic!("parse failed: {log}"));
    let ast = scc_ast::Program {
        modules: vec![module],
    };
    let mut cxt = Context::new(interner);
    let mut st = SymbolTable::new();
    let program =
        scc_codegen::compile_program(&ast, &sources, &mut cxt, &mut st, &mut idgen, &mut log)
            .unwrap_or_else(|_| panic!("compile failed: {log}"));
    (cxt, program)
}

fn assigned_constants(cxt: &Context, program: &Program, var: &str) -> Vec<i64> {
    let mut out = Vec::new();
    for (_, block) in program.all_blocks() {
        for imop in &block.imops {
            if imop.op != Opcode::Assign {
                continue;
            }
            let dest = match imop.dest() {
                Some(dest) => dest,
                None => continue,
            };
            if cxt.interner.resolve(cxt.symbol(dest).name) != var {
                continue;
            }
            let src = match imop.arg1() {
                Some(src) => src,
                None => continue,
            };
            if let Some(ConstValue::Int(v)) = cxt.symbol(src).const_value() {
                out.push(v.signed_bits());
            }
        }
    }
    out
}

fn count_ops(program: &Program, op: Opcode) -> usize {
    program
        .all_blocks()
        .flat_map(|(_, block)| block.imops.iter())
        .filter(|imop| imop.op == op)
        .count()
}

#[test]
fn arithmetic_folds_to_a_single_constant_assign() {
    let (mut cxt, mut program) = compile(
        "void main() {\n\
         int x = 2 + 3 * 4;\n\
         print(x);\n\
         }\n",
    );
    assert!(count_ops(&program, Opcode::Mul) >= 1);

    optimize_program(&mut cxt, &mut program);

    assert_eq!(count_ops(&program, Opcode::Mul), 0, "MUL not folded");
    assert_eq!(count_ops(&program, Opcode::Add), 0, "ADD not folded");
    assert!(
        assigned_constants(&cxt, &program, "x").contains(&14),
        "x is not assigned the folded constant 14"
    );
}

#[test]
fn division_by_zero_is_not_folded() {
    let (mut cxt, mut program) = compile(
        "void main() {\n\
         int a = 1;\n\
         int b = 0;\n\
         int c = a / b;\n\
         print(c);\n\
         }\n",
    );
    optimize_program(&mut cxt, &mut program);

    assert_eq!(
        count_ops(&program, Opcode::Div),
        1,
        "the undefined DIV must survive optimization"
    );
    assert!(assigned_constants(&cxt, &program, "c").is_empty());
}

#[test]
fn folding_propagates_through_branches_that_agree() {
    let (mut cxt, mut program) = compile(
        "void main() {\n\
         int x;\n\
         if (2 < 3) { x = 7; } else { x = 7; }\n\
         int y = x + 1;\n\
         print(y);\n\
         }\n",
    );
    optimize_program(&mut cxt, &mut program);
    assert!(
        assigned_constants(&cxt, &program, "y").contains(&8),
        "meet over agreeing branches lost the constant"
    );
}

#[test]
fn disagreeing_branches_meet_to_nac() {
    let (mut cxt, mut program) = compile(
        "int f(bool b) {\n\
         int x;\n\
         if (b) { x = 1; } else { x = 2; }\n\
         return x + 1;\n\
         }\n\
         void main() { print(f(true)); }\n",
    );
    optimize_program(&mut cxt, &mut program);
    // The ADD inside f cannot fold.
    let f = program
        .proc_ids()
        .find(|&p| {
            program.proc(p).name.map(|name| {
                cxt.interner.resolve(cxt.symbol(name).name) == "f"
            }) == Some(true)
        })
        .expect("procedure f");
    let adds = program
        .proc(f)
        .block_ids()
        .flat_map(|b| program.proc(f).block(b).imops.iter())
        .filter(|imop| imop.op == Opcode::Add)
        .count();
    assert_eq!(adds, 1, "x + 1 folded despite a non-constant x");
}

#[test]
fn named_analyses_run_to_fixpoint_and_print() {
    let (cxt, program) = compile(
        "void main() {\n\
         int acc = 0;\n\
         for (int i = 0; i < 4; i = i + 1) { acc = acc + i; }\n\
         print(acc);\n\
         }\n",
    );

    let mut runner = DataFlowAnalysisRunner::new();
    for name in ["rd", "rj", "rdc", "ru", "rabled", "lv", "lm", "cf", "cp", "rr"] {
        runner.add_analysis(analysis_by_name(name).unwrap_or_else(|| panic!("unknown {name}")));
    }
    runner.run(&cxt, &program);
    let rendered = runner.to_string(&cxt, &program);
    assert!(rendered.contains("Reaching definitions"));
    assert!(rendered.contains("Live variables"));
    assert!(rendered.contains("Constant folding"));
    assert!(rendered.contains("Reachable returns"));
}

#[test]
fn unknown_analysis_name_is_rejected() {
    assert!(analysis_by_name("nope").is_none());
}

#[test]
fn dominators_of_a_loop() {
    let (cxt, program) = compile(
        "void main() {\n\
         int i = 0;\n\
         while (i < 3) { i = i + 1; }\n\
         print(i);\n\
         }\n",
    );

    let mut dominators = Dominators::new();
    {
        let mut analyses: Vec<&mut dyn DataFlowAnalysis> = vec![&mut dominators];
        run_analyses(&cxt, &program, &mut analyses);
    }

    // Every reachable block's dominator chain ends at its procedure's
    // entry.
    for p in program.proc_ids() {
        let entry = (p, program.proc(p).entry());
        for b in program.proc(p).block_ids() {
            if !program.proc(p).block(b).reachable {
                continue;
            }
            let doms = dominators.dominators((p, b));
            assert_eq!(*doms.last().unwrap(), entry, "chain does not reach entry");
        }
    }
}

#[test]
fn loop_variable_stays_live_around_the_back_edge() {
    let (cxt, program) = compile(
        "void main() {\n\
         int i = 0;\n\
         while (i < 3) { i = i + 1; }\n\
         print(i);\n\
         }\n",
    );

    let mut live = LiveVariables::new();
    {
        let mut analyses: Vec<&mut dyn DataFlowAnalysis> = vec![&mut live];
        run_analyses(&cxt, &program, &mut analyses);
    }

    let i_sym = (0..cxt.symbols.len() as u32)
        .map(scc_core::SymbolId)
        .find(|&sym| {
            cxt.interner.resolve(cxt.symbol(sym).name) == "i" && cxt.symbol(sym).is_variable()
        })
        .expect("variable i");

    // i is live out of at least one block (the loop keeps reading it).
    let live_somewhere = program.all_blocks().any(|(at, _)| {
        live.live_on_exit(at)
            .map(|set| set.contains(&i_sym))
            .unwrap_or(false)
    });
    assert!(live_somewhere, "loop variable never live");
}

#[test]
fn constant_folding_alone_reports_lattice_results() {
    let (cxt, program) = compile(
        "void main() {\n\
         int x = 5;\n\
         int y = x * 2;\n\
         print(y);\n\
         }\n",
    );
    let mut folding = ConstantFolding::new();
    {
        let mut analyses: Vec<&mut dyn DataFlowAnalysis> = vec![&mut folding];
        run_analyses(&cxt, &program, &mut analyses);
    }
    let rendered = folding.to_string(&cxt, &program);
    assert!(rendered.contains("10"), "folded value missing: {rendered}");
}
