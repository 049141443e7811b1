//! Checker-level behavior over complete programs: overload selection,
//! template instantiation, and the diagnostics of ill-typed programs.

use scc_ast::NodeIdGen;
use scc_common::{CompileLog, Interner, SourceMap};
use scc_core::{Context, Opcode, Program, SymbolTable, Type};

fn try_compile(src: &str) -> (Result<Program, scc_checker::TypeError>, Context, CompileLog) {
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
    let result =
        scc_codegen::compile_program(&ast, &sources, &mut cxt, &mut st, &mut idgen, &mut log);
    (result, cxt, log)
}

fn compile(src: &str) -> (Context, Program) {
    let (result, cxt, log) = try_compile(src);
    match result {
        Ok(program) => (cxt, program),
        Err(_) => panic!("compile failed: {log}"),
    }
}

fn compile_err(src: &str) -> CompileLog {
    let (result, _, log) = try_compile(src);
    assert!(result.is_err(), "expected a compile failure, log: {log}");
    log
}

fn log_contains(log: &CompileLog, needle: &str) -> bool {
    log.entries().iter().any(|d| d.message.contains(needle))
}

fn proc_names(cxt: &Context, program: &Program) -> Vec<String> {
    program
        .proc_ids()
        .filter_map(|p| program.proc(p).name)
        .map(|name| cxt.interner.resolve(cxt.symbol(name).name).to_owned())
        .collect()
}

/*******************************************************************************
  Overloads and templates
*******************************************************************************/

#[test]
fn literal_defaults_to_int64_and_picks_the_int_overload() {
    let (cxt, program) = compile(
        "int f(int x) { return x; }\n\
         int f(uint x) { return (int) x; }\n\
         void main() { print(f(1)); }\n",
    );

    // main's call must target the int64 overload.
    let main = program
        .proc_ids()
        .find(|&p| {
            program.proc(p).name.map(|name| {
                cxt.interner.resolve(cxt.symbol(name).name) == "main"
            }) == Some(true)
        })
        .expect("main procedure");
    let mut callee_param_types = Vec::new();
    for b in program.proc(main).block_ids() {
        for imop in &program.proc(main).block(b).imops {
            if imop.op == Opcode::Call {
                let callee = imop.arg(0).expect("callee");
                let ty = cxt.symbol(callee).ty.expect("procedure type");
                if let Type::Proc { params, .. } = cxt.ty(ty) {
                    for &param in params {
                        callee_param_types.push(cxt.type_string(param));
                    }
                }
            }
        }
    }
    assert_eq!(callee_param_types, vec!["int64".to_owned()]);
}

#[test]
fn ambiguous_call_is_a_multiple_match_error() {
    let log = compile_err(
        "template <domain D> D int f(D int x) { return x; }\n\
         template <domain E> E int f(E int y) { return y; }\n\
         kind shared3p { type bool; }\n\
         domain pd shared3p;\n\
         void main() { pd int a; pd int b = f(a); }\n",
    );
    assert!(
        log_contains(&log, "multiple matching"),
        "missing ambiguity diagnostic: {log}"
    );
}

#[test]
fn no_matching_procedure_is_reported() {
    let log = compile_err("void main() { g(1); }\n");
    assert!(
        log_contains(&log, "no matching procedure"),
        "missing no-match diagnostic: {log}"
    );
}

#[test]
fn identical_instantiations_share_one_body() {
    let (cxt, program) = compile(
        "kind shared3p { type bool; }\n\
         domain pd shared3p;\n\
         template <domain D, type T> D T id(D T x) { return x; }\n\
         void main() {\n\
         pd int a;\n\
         pd int b = id(a);\n\
         pd int c = id(b);\n\
         print(1);\n\
         }\n",
    );
    let instances: Vec<String> = proc_names(&cxt, &program)
        .into_iter()
        .filter(|name| name.starts_with("id<"))
        .collect();
    assert_eq!(instances.len(), 1, "duplicate instance bodies: {instances:?}");
}

#[test]
fn distinct_argument_tuples_make_distinct_instances() {
    let (cxt, program) = compile(
        "template <type T> T id(T x) { return x; }\n\
         void main() {\n\
         int a = id(1);\n\
         uint b = id(2 :: uint);\n\
         print(a);\n\
         }\n",
    );
    let instances: Vec<String> = proc_names(&cxt, &program)
        .into_iter()
        .filter(|name| name.starts_with("id<"))
        .collect();
    assert_eq!(instances.len(), 2, "instances: {instances:?}");
}

#[test]
fn regular_procedure_beats_any_template() {
    let (cxt, program) = compile(
        "template <type T> T pick(T x) { return x; }\n\
         int pick(int x) { return x + 100; }\n\
         void main() { print(pick(1)); }\n",
    );
    let instances: Vec<String> = proc_names(&cxt, &program)
        .into_iter()
        .filter(|name| name.starts_with("pick<"))
        .collect();
    assert!(
        instances.is_empty(),
        "template instantiated although a regular procedure matches"
    );
}

/*******************************************************************************
  Type errors
*******************************************************************************/

#[test]
fn incompatible_assignment_dimensionalities_fail() {
    let log = compile_err(
        "void main() {\n\
         int [[2]] m (2, 2);\n\
         int x = m;\n\
         }\n",
    );
    assert!(log.has_errors());
}

#[test]
fn private_condition_is_rejected() {
    let log = compile_err(
        "kind shared3p { type bool; }\n\
         domain pd shared3p;\n\
         void main() {\n\
         pd bool b;\n\
         if (b) { }\n\
         }\n",
    );
    assert!(log.has_errors());
}

#[test]
fn declassify_of_public_is_rejected() {
    let log = compile_err("void main() { int x = declassify(1); }\n");
    assert!(log.has_errors());
}

#[test]
fn redefinition_with_identical_signature_is_rejected() {
    let log = compile_err(
        "int f(int x) { return x; }\n\
         int f(int y) { return y; }\n\
         void main() { }\n",
    );
    assert!(
        log_contains(&log, "redefinition"),
        "missing redefinition diagnostic: {log}"
    );
}

#[test]
fn sibling_statements_keep_reporting_errors() {
    let log = compile_err(
        "void main() {\n\
         undeclared1 = 1;\n\
         undeclared2 = 2;\n\
         }\n",
    );
    let errors = log
        .entries()
        .iter()
        .filter(|d| matches!(d.severity, scc_common::Severity::Fatal | scc_common::Severity::Error))
        .count();
    assert!(errors >= 2, "only {errors} error(s) reported: {log}");
}

#[test]
fn statement_with_no_effect_is_rejected() {
    let log = compile_err(
        "void main() {\n\
         int x = 1;\n\
         x;\n\
         }\n",
    );
    assert!(
        log_contains(&log, "statement with no effect"),
        "missing no-effect diagnostic: {log}"
    );
}

#[test]
fn statement_after_return_is_unreachable() {
    let log = compile_err(
        "void main() {\n\
         return;\n\
         print(1);\n\
         }\n",
    );
    assert!(
        log_contains(&log, "unreachable statement"),
        "missing unreachable diagnostic: {log}"
    );
}

#[test]
fn xor_to_float_cast_is_forbidden() {
    let log = compile_err(
        "void main() {\n\
         xor_uint32 x;\n\
         float32 f = (float32) x;\n\
         }\n",
    );
    assert!(log.has_errors());
}
