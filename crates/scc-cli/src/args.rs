use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the scc binary.
#[derive(Parser, Debug)]
#[command(name = "scc", version, about = "SecreC compiler")]
pub struct CliArgs {
    /// Write output to a file instead of standard output.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Add a directory to the module search path.
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Do not look for standard library imports.
    #[arg(long = "no-stdlib")]
    pub no_stdlib: bool,

    /// Optimize the generated code.
    #[arg(short = 'O', long)]
    pub optimize: bool,

    /// Evaluate the program after compilation.
    #[arg(short = 'e', long)]
    pub eval: bool,

    /// Print the abstract syntax tree and exit.
    #[arg(long = "print-ast")]
    pub print_ast: bool,

    /// Print the symbol table and exit.
    #[arg(long = "print-st")]
    pub print_st: bool,

    /// Print the intermediate representation and exit.
    #[arg(long = "print-ir")]
    pub print_ir: bool,

    /// Print the control flow graph in DOT form and exit.
    #[arg(long = "print-cfg")]
    pub print_cfg: bool,

    /// Print the dominator tree in DOT form and exit.
    #[arg(long = "print-dom")]
    pub print_dom: bool,

    /// Run the named dataflow analysis and print its result. Names:
    /// rd, rj, rdc, ru, rabled, lv, lm, cf, cp, rr.
    #[arg(short = 'a', long = "analysis")]
    pub analysis: Vec<String>,

    /// Report diagnostics as a JSON array on standard error.
    #[arg(long = "json-errors")]
    pub json_errors: bool,

    /// Verbose progress output on standard error.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Input file; standard input when absent.
    pub input: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_flags() {
        let args = CliArgs::parse_from([
            "scc", "-O", "-e", "-I", "lib", "-I", "more", "-a", "cf", "-a", "lv", "-o", "out.txt",
            "program.sc",
        ]);
        assert!(args.optimize);
        assert!(args.eval);
        assert_eq!(args.include.len(), 2);
        assert_eq!(args.analysis, vec!["cf".to_owned(), "lv".to_owned()]);
        assert_eq!(args.output, Some(PathBuf::from("out.txt")));
        assert_eq!(args.input, Some(PathBuf::from("program.sc")));
    }

    #[test]
    fn defaults_to_stdin_and_stdout() {
        let args = CliArgs::parse_from(["scc"]);
        assert!(args.input.is_none());
        assert!(args.output.is_none());
        assert!(!args.no_stdlib);
        assert!(!args.json_errors);
    }

    #[test]
    fn json_errors_flag_is_recognized() {
        let args = CliArgs::parse_from(["scc", "--json-errors", "program.sc"]);
        assert!(args.json_errors);
    }
}
