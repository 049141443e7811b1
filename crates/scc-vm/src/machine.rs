//! The IR walker.
//!
//! Frames hold local bindings; the caller and callee exchange values
//! over a single FIFO transfer queue (PUSH feeds it, PARAM drains it, in
//! flattening order on both sides). RETCLEAN is a structural marker and
//! executes as a no-op. ERROR stops evaluation with a nonzero status.

use crate::value::Value;
use rustc_hash::FxHashMap;
use scc_ast::Prim;
use scc_core::{
    program::BlockRef, ApInt, Context, Imop, Opcode, Program, SymbolId, SymbolKind,
};
use scc_core::apint::CmpMode;
use std::collections::VecDeque;
use tracing::trace;

struct Frame {
    locals: FxHashMap<SymbolId, Value>,
    /// Where execution resumes after the callee returns.
    cont: Option<BlockRef>,
}

enum Flow {
    Next,
    Goto(BlockRef),
    Exit(i32),
}

#[derive(Debug)]
struct Abort(String);

pub struct VirtualMachine {
    globals: FxHashMap<SymbolId, Value>,
    frames: Vec<Frame>,
    queue: VecDeque<Value>,
    /// Everything PRINT produced, in order.
    pub output: String,
    /// The message of the ERROR (or internal fault) that stopped the run.
    pub error: Option<String>,
}

impl VirtualMachine {
    pub fn new() -> Self {
        VirtualMachine {
            globals: FxHashMap::default(),
            frames: vec![Frame {
                locals: FxHashMap::default(),
                cont: None,
            }],
            queue: VecDeque::new(),
            output: String::new(),
            error: None,
        }
    }

    /// Evaluate the program; returns the process exit status.
    pub fn run(&mut self, cxt: &Context, program: &Program) -> i32 {
        let mut at: BlockRef = (scc_core::ProcId(0), scc_core::BlockId(0));
        let mut index = 0usize;

        loop {
            let block = program.block(at);
            if index >= block.imops.len() {
                // Blocks without a terminator fall through in block order.
                let next = block
                    .succ
                    .iter()
                    .find(|(_, e)| !e.is_global())
                    .map(|(to, _)| *to);
                match next {
                    Some(next) => {
                        at = next;
                        index = 0;
                        continue;
                    }
                    None => {
                        self.error = Some("fell off the end of the code".to_owned());
                        return 1;
                    }
                }
            }

            let imop = block.imops[index].clone();
            trace!(block = block.index, index, op = ?imop.op, "step");
            match self.step(cxt, program, at, &imop) {
                Ok(Flow::Next) => index += 1,
                Ok(Flow::Goto(next)) => {
                    at = next;
                    index = 0;
                }
                Ok(Flow::Exit(code)) => return code,
                Err(Abort(message)) => {
                    self.error = Some(message);
                    return 1;
                }
            }
        }
    }

    /*******************************************************************
      Environment
    *******************************************************************/

    fn prim_of(&self, cxt: &Context, sym: SymbolId) -> Option<Prim> {
        let ty = cxt.symbol(sym).ty?;
        let (_, data, _) = cxt.basic_parts(ty)?;
        cxt.prim_of(data)
    }

    fn is_signed(&self, cxt: &Context, sym: SymbolId) -> bool {
        self.prim_of(cxt, sym).map(|p| p.is_signed()).unwrap_or(false)
    }

    fn is_float(&self, cxt: &Context, sym: SymbolId) -> bool {
        self.prim_of(cxt, sym).map(|p| p.is_float()).unwrap_or(false)
    }

    fn default_value(&self, cxt: &Context, sym: SymbolId) -> Value {
        let scalar = |p: Option<Prim>| match p {
            Some(Prim::String) => Value::Str(String::new()),
            Some(p) if p.is_float() => Value::Float(0.0),
            Some(p) => Value::Int(ApInt::new(p.width_in_bits(), 0)),
            None => Value::Int(ApInt::new(64, 0)),
        };

        match cxt.symbol(sym).ty.and_then(|ty| cxt.basic_parts(ty)) {
            Some((_, _, dim)) if dim > 0 => Value::Arr(Vec::new()),
            _ => scalar(self.prim_of(cxt, sym)),
        }
    }

    fn get(&self, cxt: &Context, sym: SymbolId) -> Value {
        let symbol = cxt.symbol(sym);
        if let Some(value) = symbol.const_value() {
            return Value::from_const(value);
        }
        if cxt.symbol_is_global(sym) {
            return self
                .globals
                .get(&sym)
                .cloned()
                .unwrap_or_else(|| self.default_value(cxt, sym));
        }
        self.frames
            .last()
            .and_then(|frame| frame.locals.get(&sym))
            .cloned()
            .unwrap_or_else(|| self.default_value(cxt, sym))
    }

    fn set(&mut self, cxt: &Context, sym: SymbolId, value: Value) {
        if cxt.symbol_is_global(sym) {
            self.globals.insert(sym, value);
        } else if let Some(frame) = self.frames.last_mut() {
            frame.locals.insert(sym, value);
        }
    }

    /*******************************************************************
      Stepping
    *******************************************************************/

    fn step(
        &mut self,
        cxt: &Context,
        program: &Program,
        at: BlockRef,
        imop: &Imop,
    ) -> Result<Flow, Abort> {
        let dest = imop.dest();
        match imop.op {
            Opcode::Comment | Opcode::RetClean => Ok(Flow::Next),

            Opcode::Declare => {
                let dest = dest.expect("DECLARE destination");
                let value = self.default_value(cxt, dest);
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::Assign | Opcode::Classify | Opcode::Declassify => {
                let dest = dest.expect("destination");
                let src = self.arg_value(cxt, imop, 1)?;
                let value = match imop.arg2() {
                    Some(size) => self.broadcast(cxt, src, size)?,
                    None => src,
                };
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::Cast => {
                let dest = dest.expect("CAST destination");
                let src_sym = imop.arg1().expect("CAST operand");
                let src = self.get(cxt, src_sym);
                let src_signed = self.is_signed(cxt, src_sym);
                let p = self
                    .prim_of(cxt, dest)
                    .ok_or_else(|| Abort("cast to a non-primitive type".to_owned()))?;
                let value = cast_value(src, src_signed, p).map_err(Abort)?;
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::ToString => {
                let dest = dest.expect("TOSTRING destination");
                let src_sym = imop.arg1().expect("TOSTRING operand");
                let signed = self.is_signed(cxt, src_sym);
                let value = Value::Str(self.get(cxt, src_sym).render(signed));
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::Uinv | Opcode::Uneg | Opcode::Uminus => {
                let dest = dest.expect("destination");
                let x = self.arg_value(cxt, imop, 1)?;
                let value = map_elems(x, &mut |v| unary(imop.op, v))?;
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            op if op.is_binary_expr() => {
                let dest = dest.expect("destination");
                let lhs_sym = imop.arg1().expect("lhs");
                let signed = self.is_signed(cxt, lhs_sym);
                let float = self.is_float(cxt, lhs_sym);
                let x = self.get(cxt, lhs_sym);
                let y = self.arg_value(cxt, imop, 2)?;
                let value = zip_elems(x, y, &mut |a, b| binary(op, a, b, signed, float))?;
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::Alloc => {
                let dest = dest.expect("ALLOC destination");
                let size = self
                    .arg_value(cxt, imop, 1)?
                    .as_index()
                    .ok_or_else(|| Abort("non-integer allocation size".to_owned()))?;
                let elem = match imop.arg2() {
                    Some(elem) => self.get(cxt, elem),
                    None => {
                        // Element default of the destination's data type.
                        match self.prim_of(cxt, dest) {
                            Some(Prim::String) => Value::Str(String::new()),
                            Some(p) if p.is_float() => Value::Float(0.0),
                            Some(p) => Value::Int(ApInt::new(p.width_in_bits(), 0)),
                            None => Value::Int(ApInt::new(64, 0)),
                        }
                    }
                };
                self.set(cxt, dest, Value::Arr(vec![elem; size as usize]));
                Ok(Flow::Next)
            }

            Opcode::Copy => {
                let dest = dest.expect("COPY destination");
                let value = self.arg_value(cxt, imop, 1)?;
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::Release => {
                if let Some(sym) = imop.arg1() {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.locals.remove(&sym);
                    }
                }
                Ok(Flow::Next)
            }

            Opcode::Load => {
                let dest = dest.expect("LOAD destination");
                let arr = self.arg_value(cxt, imop, 1)?;
                let index = self
                    .arg_value(cxt, imop, 2)?
                    .as_index()
                    .ok_or_else(|| Abort("non-integer index".to_owned()))? as usize;
                match arr {
                    Value::Arr(elems) => {
                        let value = elems
                            .get(index)
                            .cloned()
                            .ok_or_else(|| Abort("array index out of bounds".to_owned()))?;
                        self.set(cxt, dest, value);
                        Ok(Flow::Next)
                    }
                    _ => Err(Abort("LOAD from a non-array value".to_owned())),
                }
            }

            Opcode::Store => {
                let dest = dest.expect("STORE destination");
                let index = self
                    .arg_value(cxt, imop, 1)?
                    .as_index()
                    .ok_or_else(|| Abort("non-integer index".to_owned()))? as usize;
                let value = self.arg_value(cxt, imop, 2)?;
                let mut arr = self.get(cxt, dest);
                match &mut arr {
                    Value::Arr(elems) => {
                        if index >= elems.len() {
                            return Err(Abort("array index out of bounds".to_owned()));
                        }
                        elems[index] = value;
                    }
                    _ => return Err(Abort("STORE to a non-array value".to_owned())),
                }
                self.set(cxt, dest, arr);
                Ok(Flow::Next)
            }

            Opcode::Param => {
                let dest = dest.expect("PARAM destination");
                let value = self
                    .queue
                    .pop_front()
                    .ok_or_else(|| Abort("transfer queue underflow".to_owned()))?;
                self.set(cxt, dest, value);
                Ok(Flow::Next)
            }

            Opcode::Push => {
                let value = self.arg_value(cxt, imop, 1)?;
                self.queue.push_back(value);
                Ok(Flow::Next)
            }

            // References only matter to syscalls, which are simulated.
            Opcode::PushRef | Opcode::PushCRef => Ok(Flow::Next),

            Opcode::DomainId => {
                let dest = dest.expect("DOMAINID destination");
                self.set(cxt, dest, Value::Int(ApInt::new(64, 0)));
                Ok(Flow::Next)
            }

            Opcode::Syscall => {
                if let Some(dest) = dest {
                    let value = self.default_value(cxt, dest);
                    self.set(cxt, dest, value);
                }
                Ok(Flow::Next)
            }

            Opcode::Call => {
                let callee = imop.arg(0).expect("CALL target");
                let entry = match &cxt.symbol(callee).kind {
                    SymbolKind::Procedure(info) => info
                        .block
                        .ok_or_else(|| Abort("call to an ungenerated procedure".to_owned()))?,
                    _ => return Err(Abort("CALL target is not a procedure".to_owned())),
                };
                let cont = program
                    .block(at)
                    .succ
                    .iter()
                    .find(|(_, e)| *e == scc_core::Edge::CallPass)
                    .map(|(to, _)| *to);
                self.frames.push(Frame {
                    locals: FxHashMap::default(),
                    cont,
                });
                Ok(Flow::Goto(entry))
            }

            Opcode::Return => {
                for i in 1..imop.n_args() {
                    let value = self.arg_value(cxt, imop, i)?;
                    self.queue.push_back(value);
                }
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| Abort("RETURN outside a call".to_owned()))?;
                match frame.cont {
                    Some(cont) => Ok(Flow::Goto(cont)),
                    None => Err(Abort("RETURN with no continuation".to_owned())),
                }
            }

            Opcode::Jump => Ok(Flow::Goto(self.jump_target(cxt, imop)?)),

            Opcode::Jt | Opcode::Jf => {
                let cond = self.arg_value(cxt, imop, 1)?.truthy();
                let taken = if imop.op == Opcode::Jt { cond } else { !cond };
                if taken {
                    return Ok(Flow::Goto(self.jump_target(cxt, imop)?));
                }
                // The fallthrough successor carries the complementary
                // edge label.
                let wanted = if imop.op == Opcode::Jt {
                    scc_core::Edge::False
                } else {
                    scc_core::Edge::True
                };
                program
                    .block(at)
                    .succ
                    .iter()
                    .find(|(_, e)| *e == wanted)
                    .map(|(to, _)| Flow::Goto(*to))
                    .ok_or_else(|| Abort("conditional jump without fallthrough".to_owned()))
            }

            Opcode::Print => {
                let value = self.arg_value(cxt, imop, 1)?;
                self.output.push_str(&value.render(false));
                self.output.push('\n');
                Ok(Flow::Next)
            }

            Opcode::Error => {
                let message = self.arg_value(cxt, imop, 1)?.render(false);
                self.error = Some(message);
                Ok(Flow::Exit(1))
            }

            Opcode::End => Ok(Flow::Exit(0)),

            _ => Err(Abort(format!("unhandled opcode {:?}", imop.op))),
        }
    }

    fn arg_value(&self, cxt: &Context, imop: &Imop, i: usize) -> Result<Value, Abort> {
        let sym = imop
            .arg(i)
            .ok_or_else(|| Abort(format!("missing operand {i} of {:?}", imop.op)))?;
        Ok(self.get(cxt, sym))
    }

    fn jump_target(&self, cxt: &Context, imop: &Imop) -> Result<BlockRef, Abort> {
        let label = imop.arg(0).ok_or_else(|| Abort("unpatched jump".to_owned()))?;
        match &cxt.symbol(label).kind {
            SymbolKind::Label {
                block: Some(at), ..
            } => Ok(*at),
            _ => Err(Abort("jump target is not a resolved label".to_owned())),
        }
    }

    /// Lift a scalar to the dynamic size named by the size operand; pass
    /// arrays through.
    fn broadcast(&self, cxt: &Context, value: Value, size: SymbolId) -> Result<Value, Abort> {
        if matches!(value, Value::Arr(_)) {
            return Ok(value);
        }
        let n = self
            .get(cxt, size)
            .as_index()
            .ok_or_else(|| Abort("non-integer size operand".to_owned()))?;
        Ok(Value::Arr(vec![value; n as usize]))
    }
}

impl Default for VirtualMachine {
    fn default() -> Self {
        VirtualMachine::new()
    }
}

/*******************************************************************************
  Scalar operations
*******************************************************************************/

fn map_elems(x: Value, f: &mut impl FnMut(Value) -> Result<Value, Abort>) -> Result<Value, Abort> {
    match x {
        Value::Arr(elems) => {
            let mapped: Result<Vec<Value>, Abort> =
                elems.into_iter().map(|e| map_elems(e, f)).collect();
            Ok(Value::Arr(mapped?))
        }
        scalar => f(scalar),
    }
}

fn zip_elems(
    x: Value,
    y: Value,
    f: &mut impl FnMut(Value, Value) -> Result<Value, Abort>,
) -> Result<Value, Abort> {
    match (x, y) {
        (Value::Arr(xs), Value::Arr(ys)) => {
            if xs.len() != ys.len() {
                return Err(Abort("vectorised operands differ in length".to_owned()));
            }
            let zipped: Result<Vec<Value>, Abort> = xs
                .into_iter()
                .zip(ys)
                .map(|(a, b)| zip_elems(a, b, f))
                .collect();
            Ok(Value::Arr(zipped?))
        }
        (Value::Arr(xs), scalar) => {
            let zipped: Result<Vec<Value>, Abort> = xs
                .into_iter()
                .map(|a| zip_elems(a, scalar.clone(), f))
                .collect();
            Ok(Value::Arr(zipped?))
        }
        (scalar, Value::Arr(ys)) => {
            let zipped: Result<Vec<Value>, Abort> = ys
                .into_iter()
                .map(|b| zip_elems(scalar.clone(), b, f))
                .collect();
            Ok(Value::Arr(zipped?))
        }
        (a, b) => f(a, b),
    }
}

fn unary(op: Opcode, x: Value) -> Result<Value, Abort> {
    match (op, x) {
        (Opcode::Uinv, Value::Int(v)) => Ok(Value::Int(ApInt::inv(v))),
        (Opcode::Uneg, Value::Int(v)) => Ok(Value::Int(ApInt::bool_value(v.is_zero()))),
        (Opcode::Uminus, Value::Int(v)) => Ok(Value::Int(ApInt::minus(v))),
        (Opcode::Uminus, Value::Float(v)) => Ok(Value::Float(-v)),
        (op, x) => Err(Abort(format!("invalid operand {x:?} of {op:?}"))),
    }
}

fn binary(op: Opcode, x: Value, y: Value, signed: bool, float: bool) -> Result<Value, Abort> {
    if float {
        let (a, b) = match (&x, &y) {
            (Value::Float(a), Value::Float(b)) => (*a, *b),
            _ => return Err(Abort("float operation on non-float operands".to_owned())),
        };
        return float_binary(op, a, b);
    }

    match (&x, &y) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, *a, *b, signed),
        (Value::Str(a), Value::Str(b)) => str_binary(op, a, b),
        _ => Err(Abort(format!("invalid operands of {op:?}"))),
    }
}

fn int_binary(op: Opcode, a: ApInt, b: ApInt, signed: bool) -> Result<Value, Abort> {
    let cmp = |mode: CmpMode| Ok(Value::Int(ApInt::bool_value(ApInt::cmp(a, b, mode))));
    match op {
        Opcode::Add => Ok(Value::Int(ApInt::add(a, b))),
        Opcode::Sub => Ok(Value::Int(ApInt::sub(a, b))),
        Opcode::Mul => Ok(Value::Int(ApInt::mul(a, b))),
        Opcode::Div | Opcode::Mod => {
            if b.is_zero() {
                return Err(Abort("division by zero".to_owned()));
            }
            if signed
                && a == ApInt::negative_min(a.num_bits())
                && b == ApInt::negative_one(b.num_bits())
            {
                return Err(Abort("signed division overflow".to_owned()));
            }
            Ok(Value::Int(match (op, signed) {
                (Opcode::Div, true) => ApInt::sdiv(a, b),
                (Opcode::Div, false) => ApInt::udiv(a, b),
                (_, true) => ApInt::srem(a, b),
                (_, false) => ApInt::urem(a, b),
            }))
        }
        Opcode::Eq => cmp(CmpMode::Eq),
        Opcode::Ne => cmp(CmpMode::Ne),
        Opcode::Le => cmp(if signed { CmpMode::Sle } else { CmpMode::Ule }),
        Opcode::Lt => cmp(if signed { CmpMode::Slt } else { CmpMode::Ult }),
        Opcode::Ge => cmp(if signed { CmpMode::Sge } else { CmpMode::Uge }),
        Opcode::Gt => cmp(if signed { CmpMode::Sgt } else { CmpMode::Ugt }),
        Opcode::Land | Opcode::Band => Ok(Value::Int(ApInt::and(a, b))),
        Opcode::Lor | Opcode::Bor => Ok(Value::Int(ApInt::or(a, b))),
        Opcode::Xor => Ok(Value::Int(ApInt::xor(a, b))),
        Opcode::Shl => Ok(Value::Int(ApInt::shl(a, b))),
        Opcode::Shr => Ok(Value::Int(if signed {
            ApInt::ashr(a, b)
        } else {
            ApInt::lshr(a, b)
        })),
        _ => Err(Abort(format!("invalid integer operation {op:?}"))),
    }
}

fn float_binary(op: Opcode, a: f64, b: f64) -> Result<Value, Abort> {
    let boolean = |v: bool| Ok(Value::Int(ApInt::bool_value(v)));
    match op {
        Opcode::Add => Ok(Value::Float(a + b)),
        Opcode::Sub => Ok(Value::Float(a - b)),
        Opcode::Mul => Ok(Value::Float(a * b)),
        Opcode::Div => Ok(Value::Float(a / b)),
        Opcode::Mod => Ok(Value::Float(a % b)),
        Opcode::Eq => boolean(a == b),
        Opcode::Ne => boolean(a != b),
        Opcode::Le => boolean(a <= b),
        Opcode::Lt => boolean(a < b),
        Opcode::Ge => boolean(a >= b),
        Opcode::Gt => boolean(a > b),
        _ => Err(Abort(format!("invalid float operation {op:?}"))),
    }
}

fn str_binary(op: Opcode, a: &str, b: &str) -> Result<Value, Abort> {
    let boolean = |v: bool| Ok(Value::Int(ApInt::bool_value(v)));
    match op {
        Opcode::Add => Ok(Value::Str(format!("{a}{b}"))),
        Opcode::Eq => boolean(a == b),
        Opcode::Ne => boolean(a != b),
        Opcode::Le => boolean(a <= b),
        Opcode::Lt => boolean(a < b),
        Opcode::Ge => boolean(a >= b),
        Opcode::Gt => boolean(a > b),
        _ => Err(Abort(format!("invalid string operation {op:?}"))),
    }
}

fn cast_value(x: Value, src_signed: bool, to: Prim) -> Result<Value, String> {
    match x {
        Value::Arr(elems) => {
            let cast: Result<Vec<Value>, String> = elems
                .into_iter()
                .map(|e| cast_value(e, src_signed, to))
                .collect();
            Ok(Value::Arr(cast?))
        }
        Value::Int(v) => {
            if to == Prim::Bool {
                return Ok(Value::Int(ApInt::bool_value(!v.is_zero())));
            }
            if to.is_float() {
                let f = if src_signed {
                    v.signed_bits() as f64
                } else {
                    v.bits() as f64
                };
                return Ok(Value::Float(if to == Prim::Float32 {
                    f as f32 as f64
                } else {
                    f
                }));
            }
            let width = to.width_in_bits();
            let cast = if width <= v.num_bits() {
                ApInt::trunc(v, width)
            } else if src_signed {
                ApInt::sextend(v, width)
            } else {
                ApInt::zextend(v, width)
            };
            Ok(Value::Int(cast))
        }
        Value::Float(v) => {
            if to == Prim::Bool {
                return Ok(Value::Int(ApInt::bool_value(v != 0.0)));
            }
            if to.is_float() {
                return Ok(Value::Float(if to == Prim::Float32 {
                    v as f32 as f64
                } else {
                    v
                }));
            }
            Ok(Value::Int(ApInt::new(to.width_in_bits(), v as i64 as u64)))
        }
        Value::Str(_) => Err("cast of a string value".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_aborts() {
        let a = ApInt::new(64, 1);
        let b = ApInt::new(64, 0);
        assert!(int_binary(Opcode::Div, a, b, true).is_err());
    }

    #[test]
    fn signed_comparison() {
        let minus_one = ApInt::new(64, u64::MAX);
        let one = ApInt::new(64, 1);
        let lt = int_binary(Opcode::Lt, minus_one, one, true).unwrap();
        assert_eq!(lt, Value::Int(ApInt::bool_value(true)));
        let ult = int_binary(Opcode::Lt, minus_one, one, false).unwrap();
        assert_eq!(ult, Value::Int(ApInt::bool_value(false)));
    }

    #[test]
    fn vectorised_zip_broadcasts_scalars() {
        let xs = Value::Arr(vec![
            Value::Int(ApInt::new(64, 1)),
            Value::Int(ApInt::new(64, 2)),
        ]);
        let y = Value::Int(ApInt::new(64, 10));
        let sum = zip_elems(xs, y, &mut |a, b| {
            binary(Opcode::Add, a, b, false, false)
        })
        .unwrap();
        match sum {
            Value::Arr(elems) => {
                assert_eq!(elems[0], Value::Int(ApInt::new(64, 11)));
                assert_eq!(elems[1], Value::Int(ApInt::new(64, 12)));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn casts_resize_and_convert() {
        let v = Value::Int(ApInt::new(8, 0xf0));
        match cast_value(v.clone(), true, Prim::Int16).unwrap() {
            Value::Int(w) => assert_eq!(w.bits(), 0xfff0),
            other => panic!("expected int, got {other:?}"),
        }
        match cast_value(v, false, Prim::Bool).unwrap() {
            Value::Int(w) => assert_eq!(w.bits(), 1),
            other => panic!("expected bool, got {other:?}"),
        }
    }
}
