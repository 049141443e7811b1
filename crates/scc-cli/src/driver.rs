//! The compilation driver.
//!
//! Loads the main module and, transitively, every imported module from
//! the search paths (dependency order, main module last), runs the
//! front-end pipeline and dispatches on the requested outputs. Module
//! discovery on disk lives here, not in the core.

use crate::args::CliArgs;
use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use rustc_hash::FxHashSet;
use scc_analysis::{analysis_by_name, optimize_program, DataFlowAnalysisRunner, Dominators};
use scc_ast::{Module, NodeIdGen, Program as AstProgram};
use scc_common::{Atom, CompileLog, Interner, Severity, SourceMap};
use scc_core::{print, Context, Program, SymbolTable};
use scc_vm::VirtualMachine;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::{debug, info};

pub fn run(args: &CliArgs) -> Result<i32> {
    let search_paths = search_paths(args);
    debug!(?search_paths, "module search paths");

    let mut sources = SourceMap::new();
    let mut interner = Interner::new();
    let mut idgen = NodeIdGen::new();
    let mut log = CompileLog::new();

    let main_text = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("unable to read \"{}\"", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("unable to read stdin")?,
    };
    let main_name = args
        .input
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_owned());

    let ast = match load_program(
        &main_name,
        &main_text,
        &search_paths,
        &mut sources,
        &mut interner,
        &mut idgen,
        &mut log,
    ) {
        Ok(ast) => ast,
        Err(_) => {
            print_log(&log, args.json_errors);
            return Ok(1);
        }
    };

    if args.print_ast {
        write_output(args, &scc_ast::print::print_program(&ast, &interner))?;
        return Ok(0);
    }

    let mut cxt = Context::new(interner);
    let mut st = SymbolTable::new();
    let mut program: Program = match scc_codegen::compile_program(
        &ast,
        &sources,
        &mut cxt,
        &mut st,
        &mut idgen,
        &mut log,
    ) {
        Ok(program) => program,
        Err(_) => {
            eprintln!("Error generating valid intermediate code.");
            print_log(&log, args.json_errors);
            return Ok(1);
        }
    };

    if args.verbose {
        info!("valid intermediate code generated");
        print_log(&log, args.json_errors);
    }

    if args.optimize {
        let rewrites = optimize_program(&mut cxt, &mut program);
        debug!(rewrites, "optimization finished");
    }

    if args.print_st {
        write_output(args, &st.print(&cxt))?;
        return Ok(0);
    }

    if args.print_ir {
        write_output(args, &print::print_program(&program, &cxt))?;
        return Ok(0);
    }

    if args.print_cfg {
        write_output(args, &print::program_to_dot(&program, &cxt))?;
        return Ok(0);
    }

    if args.print_dom {
        let mut dominators = Dominators::new();
        {
            let mut analyses: Vec<&mut dyn scc_analysis::DataFlowAnalysis> =
                vec![&mut dominators];
            scc_analysis::run_analyses(&cxt, &program, &mut analyses);
        }
        write_output(args, &print::dominators_to_dot(&program, dominators.idoms()))?;
        return Ok(0);
    }

    if !args.analysis.is_empty() {
        let mut runner = DataFlowAnalysisRunner::new();
        for name in &args.analysis {
            match analysis_by_name(name) {
                Some(analysis) => {
                    runner.add_analysis(analysis);
                }
                None => bail!("unknown analysis \"{name}\""),
            }
        }
        runner.run(&cxt, &program);
        write_output(args, &runner.to_string(&cxt, &program))?;
    }

    if args.eval {
        let mut vm = VirtualMachine::new();
        let status = vm.run(&cxt, &program);
        print!("{}", vm.output);
        if let Some(error) = &vm.error {
            eprintln!("{error}");
        }
        return Ok(status);
    }

    Ok(0)
}

fn search_paths(args: &CliArgs) -> Vec<PathBuf> {
    let mut paths = args.include.clone();
    if !args.no_stdlib {
        if let Ok(stdlib) = std::env::var("SCC_STDLIB_PATH") {
            paths.push(PathBuf::from(stdlib));
        }
    }
    paths
}

/// Parse the main module and every transitive import, returning modules
/// in dependency order with the main module last.
fn load_program(
    main_name: &str,
    main_text: &str,
    search_paths: &[PathBuf],
    sources: &mut SourceMap,
    interner: &mut Interner,
    idgen: &mut NodeIdGen,
    log: &mut CompileLog,
) -> Result<AstProgram, ()> {
    let file = sources.add_file(main_name, main_text);
    let main = scc_parser::parse_module(file, sources, interner, idgen, log).map_err(|_| ())?;

    let mut modules: Vec<Module> = Vec::new();
    let mut loaded: FxHashSet<Atom> = FxHashSet::default();
    let mut loading: FxHashSet<Atom> = FxHashSet::default();
    load_imports(
        &main,
        search_paths,
        sources,
        interner,
        idgen,
        log,
        &mut modules,
        &mut loaded,
        &mut loading,
    )?;

    modules.push(main);
    Ok(AstProgram { modules })
}

fn load_imports(
    module: &Module,
    search_paths: &[PathBuf],
    sources: &mut SourceMap,
    interner: &mut Interner,
    idgen: &mut NodeIdGen,
    log: &mut CompileLog,
    modules: &mut Vec<Module>,
    loaded: &mut FxHashSet<Atom>,
    loading: &mut FxHashSet<Atom>,
) -> Result<(), ()> {
    for import in module.imports.clone() {
        let name = import.name.name;
        if loaded.contains(&name) {
            continue;
        }
        if !loading.insert(name) {
            let loc = sources.location(module.file, import.span);
            let text = interner.resolve(name).to_owned();
            log.fatal(Some(loc), format!("circular import of module '{text}'"));
            return Err(());
        }

        let text = interner.resolve(name).to_owned();
        let path = match find_module(&text, search_paths) {
            Some(path) => path,
            None => {
                let loc = sources.location(module.file, import.span);
                log.fatal(Some(loc), format!("module '{text}' not found"));
                return Err(());
            }
        };
        info!(module = %text, path = %path.display(), "loading module");
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                let loc = sources.location(module.file, import.span);
                log.fatal(
                    Some(loc),
                    format!("unable to read \"{}\": {err}", path.display()),
                );
                return Err(());
            }
        };

        let file = sources.add_file(path.display().to_string(), &source);
        let imported =
            scc_parser::parse_module(file, sources, interner, idgen, log).map_err(|_| ())?;
        load_imports(
            &imported,
            search_paths,
            sources,
            interner,
            idgen,
            log,
            modules,
            loaded,
            loading,
        )?;

        loading.remove(&name);
        loaded.insert(name);
        modules.push(imported);
    }
    Ok(())
}

fn find_module(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    for dir in search_paths {
        let candidate = dir.join(format!("{name}.sc"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn write_output(args: &CliArgs, text: &str) -> Result<()> {
    match &args.output {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("unable to open \"{}\" for output", path.display()))?;
            file.write_all(text.as_bytes())?;
        }
        None => {
            print!("{text}");
        }
    }
    Ok(())
}

fn print_log(log: &CompileLog, as_json: bool) {
    if as_json {
        eprintln!("{}", log.to_json());
        return;
    }
    for entry in log.entries() {
        let severity = match entry.severity {
            Severity::Fatal => "FATAL".red().bold(),
            Severity::Error => "ERROR".red(),
            Severity::Warning => "WARNING".yellow(),
        };
        match &entry.location {
            Some(loc) => eprintln!("[{severity}] {loc}: {}", entry.message),
            None => eprintln!("[{severity}] {}", entry.message),
        }
    }
}
