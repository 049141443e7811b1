//! Three-address intermediate instructions.
//!
//! Many instructions have an optional trailing operand carrying the size
//! of an array; the vectorised form of an operation is the same opcode
//! with that extra operand. Destination is operand 0 where one exists.
//! `CALL` lays its operands out as
//! `proc, arg_1 .. arg_n, None, ret_1 .. ret_m`; the `None` marker
//! separates arguments from return targets. `RETURN`'s operand 0 is the
//! label of its procedure's entry.

use crate::symbol::SymbolId;
use smallvec::SmallVec;
use scc_common::{FileId, Span};

/// Index of an instruction in the flat code list built by the code
/// generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImopId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Expressions
    Assign,     //   d = arg1 {arg2}
    Declare,    //   DECLARE d
    Cast,       //   d = CAST arg1 {arg2}
    ToString,   //   d = TOSTRING arg1
    Classify,   //   d = CLASSIFY(arg1 {, arg2})
    Declassify, //   d = DECLASSIFY(arg1 {, arg2})
    Uinv,       //   d = ~arg1 {arg2}
    Uneg,       //   d = !arg1 {arg2}
    Uminus,     //   d = -arg1 {arg2}
    Mul,        //   d = arg1 *  arg2 {arg3}
    Div,        //   d = arg1 /  arg2 {arg3}
    Mod,        //   d = arg1 %  arg2 {arg3}
    Add,        //   d = arg1 +  arg2 {arg3}
    Sub,        //   d = arg1 -  arg2 {arg3}
    Eq,         //   d = arg1 == arg2 {arg3}
    Ne,         //   d = arg1 != arg2 {arg3}
    Le,         //   d = arg1 <= arg2 {arg3}
    Lt,         //   d = arg1 <  arg2 {arg3}
    Ge,         //   d = arg1 >= arg2 {arg3}
    Gt,         //   d = arg1 >  arg2 {arg3}
    Land,       //   d = arg1 && arg2 {arg3}
    Lor,        //   d = arg1 || arg2 {arg3}
    Band,       //   d = arg1 &  arg2 {arg3}
    Bor,        //   d = arg1 |  arg2 {arg3}
    Xor,        //   d = arg1 ^  arg2 {arg3}
    Shl,        //   d = arg1 << arg2 {arg3}
    Shr,        //   d = arg1 >> arg2 {arg3}

    // Array expressions
    Store,   //   d[arg1] = arg2
    Load,    //   d = arg1[arg2]
    Alloc,   //   d = ALLOC size {elem}
    Copy,    //   d = COPY arg1 arg2
    Release, //   RELEASE arg1

    // Other expressions
    Param,    //   d = PARAM
    DomainId, //   d = DOMAINID arg1
    Call,     //   rets = CALL proc (args)

    // Jumps
    Jump, //   GOTO d
    Jt,   //   if (arg1) GOTO d
    Jf,   //   if (!arg1) GOTO d

    // Terminators
    Error,  //   ERROR arg1
    Return, //   RETURN (label) arg_1 ... arg_n
    End,    //   END PROGRAM

    // Misc
    Comment,  //   // arg1
    Print,    //   PRINT arg1
    Syscall,  //   {d =} SYSCALL arg1 (operands passed via PUSH*)
    Push,     //   PUSH arg1
    PushRef,  //   PUSHREF arg1
    PushCRef, //   PUSHCREF arg1
    RetClean, //   RETCLEAN (label of the matching CALL)
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Assign => "ASSIGN",
            Opcode::Declare => "DECLARE",
            Opcode::Cast => "CAST",
            Opcode::ToString => "TOSTRING",
            Opcode::Classify => "CLASSIFY",
            Opcode::Declassify => "DECLASSIFY",
            Opcode::Uinv => "UINV",
            Opcode::Uneg => "UNEG",
            Opcode::Uminus => "UMINUS",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Le => "LE",
            Opcode::Lt => "LT",
            Opcode::Ge => "GE",
            Opcode::Gt => "GT",
            Opcode::Land => "LAND",
            Opcode::Lor => "LOR",
            Opcode::Band => "BAND",
            Opcode::Bor => "BOR",
            Opcode::Xor => "XOR",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Store => "STORE",
            Opcode::Load => "LOAD",
            Opcode::Alloc => "ALLOC",
            Opcode::Copy => "COPY",
            Opcode::Release => "RELEASE",
            Opcode::Param => "PARAM",
            Opcode::DomainId => "DOMAINID",
            Opcode::Call => "CALL",
            Opcode::Jump => "JUMP",
            Opcode::Jt => "JT",
            Opcode::Jf => "JF",
            Opcode::Error => "ERROR",
            Opcode::Return => "RETURN",
            Opcode::End => "END",
            Opcode::Comment => "COMMENT",
            Opcode::Print => "PRINT",
            Opcode::Syscall => "SYSCALL",
            Opcode::Push => "PUSH",
            Opcode::PushRef => "PUSHREF",
            Opcode::PushCRef => "PUSHCREF",
            Opcode::RetClean => "RETCLEAN",
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::Jt | Opcode::Jf)
    }

    pub fn is_cond_jump(self) -> bool {
        matches!(self, Opcode::Jt | Opcode::Jf)
    }

    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Jt | Opcode::Jf | Opcode::Error | Opcode::Return | Opcode::End
        )
    }

    pub fn is_comment(self) -> bool {
        matches!(self, Opcode::Comment)
    }

    /// Unary arithmetic-like operations: `d = op arg`.
    pub fn is_unary_expr(self) -> bool {
        matches!(
            self,
            Opcode::Assign
                | Opcode::Cast
                | Opcode::ToString
                | Opcode::Classify
                | Opcode::Declassify
                | Opcode::Uinv
                | Opcode::Uneg
                | Opcode::Uminus
        )
    }

    /// Binary arithmetic-like operations: `d = arg1 op arg2`.
    pub fn is_binary_expr(self) -> bool {
        matches!(
            self,
            Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Eq
                | Opcode::Ne
                | Opcode::Le
                | Opcode::Lt
                | Opcode::Ge
                | Opcode::Gt
                | Opcode::Land
                | Opcode::Lor
                | Opcode::Band
                | Opcode::Bor
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::Shr
        )
    }

    /// Whether the instruction computes a value into operand 0.
    pub fn writes_dest(self) -> bool {
        self.is_unary_expr()
            || self.is_binary_expr()
            || matches!(
                self,
                Opcode::Declare
                    | Opcode::Store
                    | Opcode::Load
                    | Opcode::Alloc
                    | Opcode::Copy
                    | Opcode::Param
                    | Opcode::DomainId
            )
    }

    /// Expression instructions in the sense of the folding pass.
    pub fn is_expr(self) -> bool {
        self.is_unary_expr()
            || self.is_binary_expr()
            || matches!(
                self,
                Opcode::Store
                    | Opcode::Load
                    | Opcode::Alloc
                    | Opcode::Copy
                    | Opcode::Param
                    | Opcode::DomainId
                    | Opcode::Call
                    | Opcode::Syscall
            )
    }
}

/// One IR instruction. Operands are symbol references; `None` appears at
/// positions holding a not-yet-patched jump target or the CALL marker.
#[derive(Clone, Debug)]
pub struct Imop {
    pub op: Opcode,
    pub args: SmallVec<[Option<SymbolId>; 4]>,
    /// Source attribution of the AST node that produced the instruction.
    pub file: FileId,
    pub span: Span,
}

impl Imop {
    pub fn new(op: Opcode, args: impl IntoIterator<Item = Option<SymbolId>>) -> Self {
        Imop {
            op,
            args: args.into_iter().collect(),
            file: FileId::DUMMY,
            span: Span::dummy(),
        }
    }

    pub fn with_loc(mut self, file: FileId, span: Span) -> Self {
        self.file = file;
        self.span = span;
        self
    }

    pub fn n_args(&self) -> usize {
        self.args.len()
    }

    pub fn dest(&self) -> Option<SymbolId> {
        self.arg(0)
    }

    pub fn arg(&self, i: usize) -> Option<SymbolId> {
        self.args.get(i).copied().flatten()
    }

    pub fn arg1(&self) -> Option<SymbolId> {
        self.arg(1)
    }

    pub fn arg2(&self) -> Option<SymbolId> {
        self.arg(2)
    }

    pub fn arg3(&self) -> Option<SymbolId> {
        self.arg(3)
    }

    pub fn set_arg(&mut self, i: usize, sym: SymbolId) {
        self.args[i] = Some(sym);
    }

    pub fn set_dest(&mut self, sym: SymbolId) {
        if self.args.is_empty() {
            self.args.push(Some(sym));
        } else {
            self.args[0] = Some(sym);
        }
    }

    /// Position of the CALL argument/return separator.
    fn call_marker(&self) -> Option<usize> {
        debug_assert_eq!(self.op, Opcode::Call);
        self.args.iter().skip(1).position(|a| a.is_none()).map(|i| i + 1)
    }

    /// Arguments of a CALL (between the procedure and the marker).
    pub fn call_args(&self) -> &[Option<SymbolId>] {
        match self.call_marker() {
            Some(m) => &self.args[1..m],
            None => &[],
        }
    }

    /// Return-value destinations of a CALL (after the marker).
    pub fn call_rets(&self) -> &[Option<SymbolId>] {
        match self.call_marker() {
            Some(m) => &self.args[m + 1..],
            None => &[],
        }
    }

    /// Whether this instance is the vectorised form of its opcode.
    pub fn is_vectorized(&self) -> bool {
        if self.op.is_unary_expr() {
            self.n_args() == 3
        } else if self.op.is_binary_expr() {
            self.n_args() == 4
        } else {
            false
        }
    }

    /// Symbols whose values this instruction reads.
    pub fn use_symbols(&self) -> Vec<SymbolId> {
        let flatten = |args: &[Option<SymbolId>]| -> Vec<SymbolId> {
            args.iter().copied().flatten().collect()
        };

        match self.op {
            Opcode::Call => flatten(self.call_args())
                .into_iter()
                .chain(self.arg(0))
                .collect(),
            Opcode::Store => flatten(&self.args),
            Opcode::Return => flatten(&self.args[1..]),
            Opcode::Jump | Opcode::End | Opcode::Comment | Opcode::RetClean => Vec::new(),
            Opcode::Jt | Opcode::Jf => self.arg1().into_iter().collect(),
            Opcode::Error
            | Opcode::Print
            | Opcode::Push
            | Opcode::PushRef
            | Opcode::PushCRef
            | Opcode::Release => self.arg1().into_iter().collect(),
            Opcode::Param | Opcode::Declare => Vec::new(),
            _ => flatten(self.args.get(1..).unwrap_or(&[])),
        }
    }

    /// Symbols this instruction writes.
    pub fn def_symbols(&self) -> Vec<SymbolId> {
        match self.op {
            Opcode::Call => self.call_rets().iter().copied().flatten().collect(),
            Opcode::Syscall => self.dest().into_iter().collect(),
            _ if self.op.writes_dest() => self.dest().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Structural replacement: the new instruction takes this one's place.
    pub fn replace_with(&mut self, new: Imop) {
        self.op = new.op;
        self.args = new.args;
    }
}

/// The flat instruction list produced by code generation, before basic
/// blocks are formed.
#[derive(Debug, Default)]
pub struct ICode {
    imops: Vec<Imop>,
}

impl ICode {
    pub fn new() -> Self {
        ICode::default()
    }

    pub fn push(&mut self, imop: Imop) -> ImopId {
        let id = ImopId(self.imops.len() as u32);
        self.imops.push(imop);
        id
    }

    pub fn get(&self, id: ImopId) -> &Imop {
        &self.imops[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ImopId) -> &mut Imop {
        &mut self.imops[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.imops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imops.is_empty()
    }

    pub fn next_id(&self) -> ImopId {
        ImopId(self.imops.len() as u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImopId, &Imop)> {
        self.imops
            .iter()
            .enumerate()
            .map(|(i, imop)| (ImopId(i as u32), imop))
    }

    pub fn into_imops(self) -> Vec<Imop> {
        self.imops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_operand_layout() {
        let proc = SymbolId(0);
        let a = SymbolId(1);
        let b = SymbolId(2);
        let r = SymbolId(3);
        let imop = Imop::new(
            Opcode::Call,
            [Some(proc), Some(a), Some(b), None, Some(r)],
        );
        assert_eq!(imop.call_args(), &[Some(a), Some(b)]);
        assert_eq!(imop.call_rets(), &[Some(r)]);
        assert_eq!(imop.def_symbols(), vec![r]);
        let uses = imop.use_symbols();
        assert!(uses.contains(&a) && uses.contains(&b));
    }

    #[test]
    fn vectorized_arity() {
        let d = SymbolId(0);
        let x = SymbolId(1);
        let y = SymbolId(2);
        let size = SymbolId(3);
        let scalar = Imop::new(Opcode::Add, [Some(d), Some(x), Some(y)]);
        let vector = Imop::new(Opcode::Add, [Some(d), Some(x), Some(y), Some(size)]);
        assert!(!scalar.is_vectorized());
        assert!(vector.is_vectorized());
    }

    #[test]
    fn store_uses_its_destination() {
        let arr = SymbolId(0);
        let idx = SymbolId(1);
        let val = SymbolId(2);
        let imop = Imop::new(Opcode::Store, [Some(arr), Some(idx), Some(val)]);
        assert!(imop.use_symbols().contains(&arr));
        assert_eq!(imop.def_symbols(), vec![arr]);
    }
}
