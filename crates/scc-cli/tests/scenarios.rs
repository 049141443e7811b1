//! End-to-end scenarios: compile real programs, evaluate them, and check
//! the observable outcomes.

use scc_analysis::optimize_program;
use scc_ast::NodeIdGen;
use scc_cli::args::CliArgs;
use scc_cli::driver;
use scc_common::{CompileLog, Interner, SourceMap};
use scc_core::{Context, Program, SymbolTable};
use scc_vm::VirtualMachine;
use std::io::Write as _;
use std::path::PathBuf;

fn compile(src: &str, optimize: bool) -> (Context, Program) {
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
    let mut program =
        scc_codegen::compile_program(&ast, &sources, &mut cxt, &mut st, &mut idgen, &mut log)
            .unwrap_or_else(|_| panic!("compile failed: {log}"));
    if optimize {
        optimize_program(&mut cxt, &mut program);
    }
    (cxt, program)
}

/// Compile and evaluate; returns (exit status, stdout, error message).
fn run(src: &str, optimize: bool) -> (i32, String, Option<String>) {
    let (cxt, program) = compile(src, optimize);
    let mut vm = VirtualMachine::new();
    let status = vm.run(&cxt, &program);
    (status, vm.output, vm.error)
}

#[test]
fn polymorphic_add_prints_three() {
    let src = "kind shared3p { type bool; }\n\
               domain pd_shared3p shared3p;\n\
               template <domain D> D int add(D int x, D int y) { return x + y; }\n\
               void main() {\n\
               pd_shared3p int a = 1;\n\
               pd_shared3p int b = 2;\n\
               print(declassify(add(a, b)));\n\
               }\n";
    let (cxt, program) = compile(src, false);

    // Exactly one instance of the template was generated.
    let instances = program
        .proc_ids()
        .filter_map(|p| program.proc(p).name)
        .map(|name| cxt.interner.resolve(cxt.symbol(name).name).to_owned())
        .filter(|name| name.starts_with("add<"))
        .count();
    assert_eq!(instances, 1);

    let mut vm = VirtualMachine::new();
    let status = vm.run(&cxt, &program);
    assert_eq!(status, 0, "error: {:?}", vm.error);
    assert_eq!(vm.output, "3\n");
}

#[test]
fn overload_disambiguation_calls_the_int_overload() {
    let (status, output, error) = run(
        "int f(int x) { return 1; }\n\
         int f(uint x) { return 2; }\n\
         void main() { print(f(1)); }\n",
        false,
    );
    assert_eq!(status, 0, "error: {error:?}");
    assert_eq!(output, "1\n");
}

#[test]
fn shape_mismatch_fails_at_runtime() {
    let (status, _, error) = run(
        "void main() {\n\
         int [[1]] x (3) = {1, 2, 3};\n\
         int [[1]] y (2) = {1, 2};\n\
         x = y;\n\
         }\n",
        false,
    );
    assert_eq!(status, 1);
    let message = error.expect("runtime error message");
    assert!(
        message.contains("Shape mismatch"),
        "unexpected message: {message}"
    );
    assert!(message.contains("test.sc"), "location missing: {message}");
}

#[test]
fn constant_expression_still_prints_after_optimization() {
    let (status, output, error) = run(
        "void main() {\n\
         int x = 2 + 3 * 4;\n\
         print(x);\n\
         }\n",
        true,
    );
    assert_eq!(status, 0, "error: {error:?}");
    assert_eq!(output, "14\n");
}

#[test]
fn division_by_zero_errors_even_optimized() {
    let (status, _, error) = run(
        "void main() {\n\
         int a = 1;\n\
         int b = 0;\n\
         int c = a / b;\n\
         print(c);\n\
         }\n",
        true,
    );
    assert_eq!(status, 1);
    assert!(error.is_some());
}

#[test]
fn template_cache_reuses_the_same_procedure() {
    let src = "kind shared3p { type bool; }\n\
               domain pd shared3p;\n\
               template <domain D, type T> D T id(D T x) { return x; }\n\
               void main() {\n\
               pd int a = 7;\n\
               pd int b = id(a);\n\
               pd int c = id(b);\n\
               print(declassify(c));\n\
               }\n";
    let (cxt, program) = compile(src, false);
    let instances = program
        .proc_ids()
        .filter_map(|p| program.proc(p).name)
        .map(|name| cxt.interner.resolve(cxt.symbol(name).name).to_owned())
        .filter(|name| name.starts_with("id<"))
        .count();
    assert_eq!(instances, 1);

    let mut vm = VirtualMachine::new();
    let status = vm.run(&cxt, &program);
    assert_eq!(status, 0, "error: {:?}", vm.error);
    assert_eq!(vm.output, "7\n");
}

#[test]
fn loops_arrays_and_globals_evaluate() {
    let (status, output, error) = run(
        "int g = 10;\n\
         void main() {\n\
         int [[1]] xs (4) = {1, 2, 3, 4};\n\
         int acc = g;\n\
         for (uint i = 0; i < size(xs); i = i + 1) {\n\
         acc = acc + xs[i];\n\
         }\n\
         print(acc);\n\
         }\n",
        false,
    );
    assert_eq!(status, 0, "error: {error:?}");
    assert_eq!(output, "20\n");
}

/*******************************************************************************
  Driver-level scenarios
*******************************************************************************/

fn driver_args(input: PathBuf) -> CliArgs {
    CliArgs {
        output: None,
        include: Vec::new(),
        no_stdlib: true,
        optimize: false,
        eval: false,
        print_ast: false,
        print_st: false,
        print_ir: false,
        print_cfg: false,
        print_dom: false,
        analysis: Vec::new(),
        json_errors: false,
        verbose: false,
        input: Some(input),
    }
}

fn write_file(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    path
}

#[test]
fn driver_compiles_imports_from_the_search_path() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        &dir,
        "arith.sc",
        "module arith;\n\
         int double(int x) { return x + x; }\n",
    );
    let main = write_file(
        &dir,
        "main.sc",
        "import arith;\n\
         void main() { print(double(21)); }\n",
    );

    let mut args = driver_args(main);
    args.include = vec![dir.path().to_path_buf()];
    args.eval = true;
    let status = driver::run(&args).unwrap();
    assert_eq!(status, 0);
}

#[test]
fn driver_reports_missing_modules() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_file(
        &dir,
        "main.sc",
        "import nowhere;\n\
         void main() { }\n",
    );

    let status = driver::run(&driver_args(main)).unwrap();
    assert_eq!(status, 1);
}

#[test]
fn driver_writes_ir_to_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_file(&dir, "main.sc", "void main() { print(1); }\n");
    let out = dir.path().join("out.ir");

    let mut args = driver_args(main);
    args.print_ir = true;
    args.output = Some(out.clone());
    let status = driver::run(&args).unwrap();
    assert_eq!(status, 0);

    let rendered = std::fs::read_to_string(&out).unwrap();
    assert!(rendered.contains("[Proc"), "no procedures in IR: {rendered}");
    assert!(rendered.contains("PRINT"), "no PRINT in IR: {rendered}");
}

#[test]
fn driver_front_end_errors_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_file(&dir, "main.sc", "void main() { undeclared = 1; }\n");
    let status = driver::run(&driver_args(main)).unwrap();
    assert_eq!(status, 1);
}

#[test]
fn driver_reports_errors_as_json_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_file(&dir, "main.sc", "void main() { undeclared = 1; }\n");
    let mut args = driver_args(main);
    args.json_errors = true;
    let status = driver::run(&args).unwrap();
    assert_eq!(status, 1);
}

#[test]
fn driver_runs_named_analyses() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_file(&dir, "main.sc", "void main() { int x = 1; print(x); }\n");
    let out = dir.path().join("analysis.txt");

    let mut args = driver_args(main);
    args.analysis = vec!["cf".to_owned(), "lv".to_owned()];
    args.output = Some(out.clone());
    let status = driver::run(&args).unwrap();
    assert_eq!(status, 0);

    let rendered = std::fs::read_to_string(&out).unwrap();
    assert!(rendered.contains("Constant folding analysis results"));
    assert!(rendered.contains("Live variables analysis results"));
}
