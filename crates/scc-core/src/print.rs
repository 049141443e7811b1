//! IR and CFG printers.
//!
//! Every instruction has a canonical single-line form; `--print-ir`
//! renders blocks per procedure and `--print-cfg` emits one DOT subgraph
//! per procedure with edges labelled by their kind.

use crate::context::Context;
use crate::imop::{Imop, Opcode};
use crate::program::{Block, Procedure, Program};
use crate::symbol::SymbolKind;
use std::fmt::Write;

/// The canonical single-line form of one instruction.
pub fn imop_string(imop: &Imop, cxt: &Context) -> String {
    let sym = |i: usize| -> String {
        match imop.arg(i) {
            Some(s) => cxt.symbol_string(s),
            None => "_".to_owned(),
        }
    };

    match imop.op {
        Opcode::Comment => format!("// {}", sym(1)),
        Opcode::Jump => format!("JUMP {}", sym(0)),
        Opcode::Jt => format!("JT {} {}", sym(0), sym(1)),
        Opcode::Jf => format!("JF {} {}", sym(0), sym(1)),
        Opcode::Error => format!("ERROR {}", sym(1)),
        Opcode::Print => format!("PRINT {}", sym(1)),
        Opcode::Release => format!("RELEASE {}", sym(1)),
        Opcode::Push => format!("PUSH {}", sym(1)),
        Opcode::PushRef => format!("PUSHREF {}", sym(1)),
        Opcode::PushCRef => format!("PUSHCREF {}", sym(1)),
        Opcode::RetClean => "RETCLEAN".to_owned(),
        Opcode::End => "END".to_owned(),
        Opcode::Declare => format!("DECLARE {}", sym(0)),
        Opcode::Return => {
            let mut out = String::from("RETURN");
            for i in 1..imop.n_args() {
                let _ = write!(out, " {}", sym(i));
            }
            out
        }
        Opcode::Call => {
            let mut out = String::new();
            let rets = imop.call_rets();
            for (i, r) in rets.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match r {
                    Some(r) => out.push_str(&cxt.symbol_string(*r)),
                    None => out.push('_'),
                }
            }
            if !rets.is_empty() {
                out.push_str(" = ");
            }
            let _ = write!(out, "CALL {} (", sym(0));
            for (i, a) in imop.call_args().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match a {
                    Some(a) => out.push_str(&cxt.symbol_string(*a)),
                    None => out.push('_'),
                }
            }
            out.push(')');
            out
        }
        Opcode::Store => format!("{}[{}] = {}", sym(0), sym(1), sym(2)),
        Opcode::Load => format!("{} = {}[{}]", sym(0), sym(1), sym(2)),
        _ => {
            // d = OP arg...
            let mut out = format!("{} = {}", sym(0), imop.op.mnemonic());
            for i in 1..imop.n_args() {
                let _ = write!(out, " {}", sym(i));
            }
            out
        }
    }
}

fn proc_title(proc: &Procedure, cxt: &Context) -> String {
    match proc.name {
        Some(name) => format!(
            "{} {}",
            cxt.interner.resolve(cxt.symbol(name).name),
            cxt.symbol(name)
                .ty
                .map(|ty| cxt.type_string(ty))
                .unwrap_or_default()
        ),
        None => "START".to_owned(),
    }
}

/// Render the whole program for `--print-ir`.
pub fn print_program(program: &Program, cxt: &Context) -> String {
    let mut out = String::new();
    for p in program.proc_ids() {
        let proc = program.proc(p);
        let _ = writeln!(out, "[Proc {}]", proc_title(proc, cxt));
        for b in proc.block_ids() {
            let block = proc.block(b);
            print_block(block, cxt, &mut out);
        }
    }
    out
}

fn print_block(block: &Block, cxt: &Context, out: &mut String) {
    let reach = if block.reachable { "" } else { " (unreachable)" };
    let _ = writeln!(out, "  [Block {}]{}", block.index, reach);
    for imop in &block.imops {
        let _ = writeln!(out, "    {}", imop_string(imop, cxt));
    }
}

/// Emit the control-flow graph in DOT form, one cluster per procedure.
pub fn program_to_dot(program: &Program, cxt: &Context) -> String {
    let mut out = String::from("digraph CFG {\n");
    for p in program.proc_ids() {
        let proc = program.proc(p);
        let _ = writeln!(out, "  subgraph cluster{} {{", p.0);
        let _ = writeln!(out, "    label = \"{}\";", proc_title(proc, cxt));
        for b in proc.block_ids() {
            let block = proc.block(b);
            let mut label = format!("Block {}\\l", block.index);
            for imop in &block.imops {
                let line = imop_string(imop, cxt)
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"");
                label.push_str(&line);
                label.push_str("\\l");
            }
            let _ = writeln!(
                out,
                "    b{} [shape=box, label=\"{}\"];",
                block.index, label
            );
        }
        let _ = writeln!(out, "  }}");
    }

    for (_, block) in program.all_blocks() {
        for (to, edge) in &block.succ {
            let to_block = program.block(*to);
            let label = edge.label();
            if label.is_empty() {
                let _ = writeln!(out, "  b{} -> b{};", block.index, to_block.index);
            } else {
                let _ = writeln!(
                    out,
                    "  b{} -> b{} [label=\"{}\"];",
                    block.index, to_block.index, label
                );
            }
        }
    }

    out.push_str("}\n");
    out
}

/// Render the dominator relation in DOT form.
pub fn dominators_to_dot(
    program: &Program,
    idoms: &rustc_hash::FxHashMap<crate::program::BlockRef, crate::program::BlockRef>,
) -> String {
    let mut out = String::from("digraph Dominators {\n");
    for (at, block) in program.all_blocks() {
        let _ = writeln!(out, "  b{} [shape=box];", block.index);
        if let Some(&idom) = idoms.get(&at) {
            if idom != at {
                let _ = writeln!(
                    out,
                    "  b{} -> b{};",
                    program.block(idom).index,
                    block.index
                );
            }
        }
    }
    out.push_str("}\n");
    out
}

/// Is the symbol a label pointing at some block (used by well-formedness
/// tests).
pub fn is_resolved_label(cxt: &Context, sym: crate::symbol::SymbolId) -> bool {
    matches!(
        cxt.symbol(sym).kind,
        SymbolKind::Label { block: Some(_), .. }
    )
}
