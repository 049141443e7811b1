//! Constant folding and propagation.
//!
//! Per symbol the lattice is `Undef < Const(v) < NAC`. Values are
//! interned in a factory so lattice comparison is id equality; arrays
//! meet pointwise when their lengths match. Anything whose evaluation
//! would be undefined at runtime (division by zero, signed overflow of
//! `INT_MIN / -1`, negative shift) folds to `Undef`, never to a
//! constant, so the optimizer cannot materialise an unsafe value.

use crate::dataflow::{DataFlowAnalysis, Direction};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use scc_ast::Prim;
use scc_core::{
    program::BlockRef, ApInt, ConstValue, Context, Edge, Imop, Opcode, Program, SymbolId, TypeId,
};
use scc_core::apint::CmpMode;
use std::fmt::Write;

/*******************************************************************************
  Values
*******************************************************************************/

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IntValue {
    pub is_signed: bool,
    pub value: ApInt,
}

impl IntValue {
    fn new(is_signed: bool, value: ApInt) -> Self {
        IntValue { is_signed, value }
    }

    fn boolean(b: bool) -> Self {
        IntValue::new(false, ApInt::bool_value(b))
    }

    fn bits(self) -> u64 {
        self.value.bits()
    }

    fn to_string(self) -> String {
        if self.is_signed {
            self.value.signed_string()
        } else {
            self.value.unsigned_string()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbstractValue {
    Int(IntValue),
    Str(String),
    Arr(Vec<Value>),
}

/// Index of an interned [`AbstractValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Undef,
    Const(ValId),
    Nac,
}

impl Value {
    pub fn is_const(self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn is_undef(self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn is_nac(self) -> bool {
        matches!(self, Value::Nac)
    }
}

/// Interning table guaranteeing one id per distinct value, so equality
/// and the lattice order reduce to id comparison.
#[derive(Default)]
struct ValueFactory {
    values: IndexSet<AbstractValue>,
}

impl ValueFactory {
    fn get(&mut self, value: AbstractValue) -> Value {
        let (index, _) = self.values.insert_full(value);
        Value::Const(ValId(index as u32))
    }

    fn int(&mut self, value: IntValue) -> Value {
        self.get(AbstractValue::Int(value))
    }

    fn resolve(&self, id: ValId) -> &AbstractValue {
        self.values.get_index(id.0 as usize).expect("value id")
    }

    fn as_int(&self, value: Value) -> Option<IntValue> {
        match value {
            Value::Const(id) => match self.resolve(id) {
                AbstractValue::Int(iv) => Some(*iv),
                _ => None,
            },
            _ => None,
        }
    }

    fn as_arr(&self, value: Value) -> Option<Vec<Value>> {
        match value {
            Value::Const(id) => match self.resolve(id) {
                AbstractValue::Arr(elems) => Some(elems.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_string(&self, value: Value) -> String {
        match value {
            Value::Undef => "UNDEF".to_owned(),
            Value::Nac => "NAC".to_owned(),
            Value::Const(id) => match self.resolve(id) {
                AbstractValue::Int(iv) => iv.to_string(),
                AbstractValue::Str(s) => s.clone(),
                AbstractValue::Arr(elems) => {
                    let mut out = String::from("{");
                    for (i, e) in elems.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(&self.to_string(*e));
                    }
                    out.push('}');
                    out
                }
            },
        }
    }
}

/*******************************************************************************
  Transfer helpers
*******************************************************************************/

fn int_cast(cxt: &Context, result_ty: TypeId, x: IntValue) -> Option<IntValue> {
    let (_, data, _) = cxt.basic_parts(result_ty)?;
    let p = cxt.prim_of(data)?;
    if p.is_float() {
        return None;
    }

    if p == Prim::Bool {
        return Some(IntValue::boolean(x.bits() != 0));
    }

    let dest_width = p.width_in_bits();
    let dest_signed = p.is_signed();
    let value = if dest_width == x.value.num_bits() {
        x.value
    } else if dest_width < x.value.num_bits() {
        ApInt::trunc(x.value, dest_width)
    } else if x.is_signed {
        ApInt::sextend(x.value, dest_width)
    } else {
        ApInt::zextend(x.value, dest_width)
    };
    Some(IntValue::new(dest_signed, value))
}

fn int_binary(op: Opcode, x: IntValue, y: IntValue) -> IntValue {
    debug_assert_eq!(x.is_signed, y.is_signed, "mismatching signs in binary operator");
    let signed = x.is_signed;
    let lift = |v: ApInt| IntValue::new(signed, v);
    let cmp = |mode: CmpMode| IntValue::boolean(ApInt::cmp(x.value, y.value, mode));

    match op {
        Opcode::Add => lift(ApInt::add(x.value, y.value)),
        Opcode::Sub => lift(ApInt::sub(x.value, y.value)),
        Opcode::Mul => lift(ApInt::mul(x.value, y.value)),
        Opcode::Div => lift(if signed {
            ApInt::sdiv(x.value, y.value)
        } else {
            ApInt::udiv(x.value, y.value)
        }),
        Opcode::Mod => lift(if signed {
            ApInt::srem(x.value, y.value)
        } else {
            ApInt::urem(x.value, y.value)
        }),
        Opcode::Le => cmp(if signed { CmpMode::Sle } else { CmpMode::Ule }),
        Opcode::Lt => cmp(if signed { CmpMode::Slt } else { CmpMode::Ult }),
        Opcode::Ge => cmp(if signed { CmpMode::Sge } else { CmpMode::Uge }),
        Opcode::Gt => cmp(if signed { CmpMode::Sgt } else { CmpMode::Ugt }),
        Opcode::Eq => cmp(CmpMode::Eq),
        Opcode::Ne => cmp(CmpMode::Ne),
        Opcode::Land | Opcode::Band => lift(ApInt::and(x.value, y.value)),
        Opcode::Lor | Opcode::Bor => lift(ApInt::or(x.value, y.value)),
        Opcode::Xor => lift(ApInt::xor(x.value, y.value)),
        Opcode::Shl => lift(ApInt::shl(x.value, y.value)),
        Opcode::Shr => lift(if signed {
            ApInt::ashr(x.value, y.value)
        } else {
            ApInt::lshr(x.value, y.value)
        }),
        _ => unreachable!("invalid binary integer operation"),
    }
}

fn int_unary(op: Opcode, x: IntValue) -> IntValue {
    match op {
        Opcode::Classify | Opcode::Declassify => x,
        Opcode::Uinv | Opcode::Uneg => IntValue::new(x.is_signed, ApInt::inv(x.value)),
        Opcode::Uminus => IntValue::new(x.is_signed, ApInt::minus(x.value)),
        _ => unreachable!("invalid unary integer operation"),
    }
}

/*******************************************************************************
  ConstantFolding
*******************************************************************************/

type Svm = FxHashMap<SymbolId, Value>;

#[derive(Default)]
pub struct ConstantFolding {
    values: ValueFactory,
    /// Interned abstractions of the program's constant symbols. Floats
    /// deliberately stay out and read as NAC.
    constants: FxHashMap<SymbolId, Value>,
    ins: FxHashMap<BlockRef, Svm>,
    outs: FxHashMap<BlockRef, Svm>,
}

impl ConstantFolding {
    pub fn new() -> Self {
        ConstantFolding::default()
    }

    fn add_constant(&mut self, cxt: &Context, sym: SymbolId) {
        let symbol = cxt.symbol(sym);
        let value = match symbol.const_value() {
            Some(value) => value,
            None => return,
        };
        if self.constants.contains_key(&sym) {
            return;
        }

        let abstracted = match value {
            ConstValue::Int(v) => {
                let is_signed = symbol
                    .ty
                    .and_then(|ty| cxt.basic_parts(ty))
                    .and_then(|(_, data, _)| cxt.prim_of(data))
                    .map(|p| p.is_signed())
                    .unwrap_or(false);
                self.values.int(IntValue::new(is_signed, *v))
            }
            ConstValue::Str(s) => self.values.get(AbstractValue::Str(s.clone())),
            ConstValue::Float(_) => return,
        };
        self.constants.insert(sym, abstracted);
    }

    fn get_val(&self, val: &Svm, cxt: &Context, sym: SymbolId) -> Value {
        if let Some(&v) = self.constants.get(&sym) {
            return v;
        }
        if cxt.symbol(sym).is_constant() {
            return Value::Nac;
        }
        val.get(&sym).copied().unwrap_or(Value::Undef)
    }

    fn set_val(val: &mut Svm, sym: SymbolId, x: Value) {
        if !x.is_undef() {
            val.insert(sym, x);
        }
    }

    fn meet(&mut self, x: Value, y: Value) -> Value {
        if x.is_undef() {
            return y;
        }
        if y.is_undef() {
            return x;
        }
        if x.is_nac() || y.is_nac() {
            return Value::Nac;
        }
        if x == y {
            return x;
        }

        if let (Some(xs), Some(ys)) = (self.values.as_arr(x), self.values.as_arr(y)) {
            if xs.len() == ys.len() {
                let elems: Vec<Value> = xs
                    .into_iter()
                    .zip(ys)
                    .map(|(a, b)| self.meet(a, b))
                    .collect();
                return self.values.get(AbstractValue::Arr(elems));
            }
        }

        Value::Nac
    }

    /// `x ≤ y` in the folding lattice.
    fn le_value(&self, x: Value, y: Value) -> bool {
        if x.is_undef() || y.is_nac() {
            return true;
        }
        if x.is_nac() || y.is_undef() {
            return false;
        }
        if x == y {
            return true;
        }

        if let (Some(xs), Some(ys)) = (self.values.as_arr(x), self.values.as_arr(y)) {
            if xs.len() == ys.len() {
                return xs.iter().zip(&ys).all(|(&a, &b)| self.le_value(a, b));
            }
        }

        false
    }

    fn lt_value(&self, x: Value, y: Value) -> bool {
        x != y && self.le_value(x, y)
    }

    fn meet_range(&mut self, elems: &[Value]) -> Value {
        let mut current = Value::Undef;
        for &e in elems {
            current = self.meet(current, e);
        }
        current
    }

    /*******************************************************************
      Value-level operations
    *******************************************************************/

    fn value_load(&mut self, a: Value, i: Value) -> Value {
        if a.is_undef() || a.is_nac() {
            return a;
        }
        let elems = self.values.as_arr(a).expect("LOAD of a non-array value");
        match self.values.as_int(i) {
            Some(iv) => {
                if (iv.bits() as usize) < elems.len() {
                    elems[iv.bits() as usize]
                } else {
                    Value::Undef
                }
            }
            // Unknown index: the meet over every element.
            None => self.meet_range(&elems),
        }
    }

    fn value_store(&mut self, a: Value, i: Value, v: Value) -> Value {
        if a.is_undef() || a.is_nac() {
            return a;
        }
        let iv = match self.values.as_int(i) {
            Some(iv) => iv,
            None => return Value::Undef,
        };
        let mut elems = self.values.as_arr(a).expect("STORE to a non-array value");
        if (iv.bits() as usize) < elems.len() {
            elems[iv.bits() as usize] = v;
            self.values.get(AbstractValue::Arr(elems))
        } else {
            a
        }
    }

    fn value_alloc(&mut self, e: Value, s: Value) -> Value {
        match self.values.as_int(s) {
            Some(sv) => {
                let elems = vec![e; sv.bits() as usize];
                self.values.get(AbstractValue::Arr(elems))
            }
            None => s,
        }
    }

    fn value_scalar_cast(&mut self, cxt: &Context, result_ty: TypeId, x: Value) -> Value {
        match self.values.as_int(x) {
            Some(xv) => match int_cast(cxt, result_ty, xv) {
                Some(cast) => self.values.int(cast),
                None => Value::Nac,
            },
            None => x,
        }
    }

    fn value_array_cast(&mut self, cxt: &Context, result_ty: TypeId, x: Value) -> Value {
        if x.is_nac() || x.is_undef() {
            return x;
        }
        let elems: Vec<Value> = self
            .values
            .as_arr(x)
            .expect("vectorised CAST of a non-array value")
            .into_iter()
            .map(|e| self.value_scalar_cast(cxt, result_ty, e))
            .collect();
        self.values.get(AbstractValue::Arr(elems))
    }

    fn value_to_string(&mut self, x: Value) -> Value {
        match self.values.as_int(x) {
            Some(xv) => self.values.get(AbstractValue::Str(xv.to_string())),
            None => x,
        }
    }

    fn value_scalar_unary(&mut self, op: Opcode, x: Value) -> Value {
        match self.values.as_int(x) {
            Some(xv) => self.values.int(int_unary(op, xv)),
            None => x,
        }
    }

    fn value_string_binary(&mut self, op: Opcode, x: Value, y: Value) -> Value {
        if x.is_undef() || y.is_undef() {
            return Value::Undef;
        }
        if x.is_nac() || y.is_nac() {
            return Value::Nac;
        }

        let xs = match (self.values.as_str(x), self.values.as_str(y)) {
            (Some(xs), Some(ys)) => (xs, ys),
            _ => return Value::Nac,
        };
        let (xs, ys) = xs;
        match op {
            Opcode::Add => {
                let joined = format!("{xs}{ys}");
                self.values.get(AbstractValue::Str(joined))
            }
            Opcode::Eq => self.values.int(IntValue::boolean(xs == ys)),
            Opcode::Ne => self.values.int(IntValue::boolean(xs != ys)),
            Opcode::Lt => self.values.int(IntValue::boolean(xs < ys)),
            Opcode::Gt => self.values.int(IntValue::boolean(xs > ys)),
            Opcode::Le => self.values.int(IntValue::boolean(xs <= ys)),
            Opcode::Ge => self.values.int(IntValue::boolean(xs >= ys)),
            _ => Value::Nac,
        }
    }

    fn value_scalar_binary(&mut self, op: Opcode, x: Value, y: Value) -> Value {
        let xv = self.values.as_int(x);
        let yv = self.values.as_int(y);
        let x_is_zero = xv.map(|v| v.bits() == 0).unwrap_or(false);
        let y_is_zero = yv.map(|v| v.bits() == 0).unwrap_or(false);

        // Undefined behaviour folds to Undef, never to a constant.
        if matches!(op, Opcode::Div | Opcode::Mod) && y_is_zero {
            return Value::Undef;
        }
        if op == Opcode::Div {
            if let (Some(xv), Some(yv)) = (xv, yv) {
                if xv.is_signed {
                    let neg_min = ApInt::negative_min(xv.value.num_bits());
                    let neg_one = ApInt::negative_one(xv.value.num_bits());
                    if xv.value == neg_min && yv.value == neg_one {
                        return Value::Undef;
                    }
                }
            }
        }
        if matches!(op, Opcode::Shl | Opcode::Shr) {
            if let Some(yv) = yv {
                if yv.is_signed && yv.value.signed_bits() < 0 {
                    return Value::Undef;
                }
            }
        }

        // Results constant regardless of the other argument.
        match op {
            Opcode::Mul | Opcode::Band | Opcode::Land => {
                if x_is_zero {
                    return x;
                }
                if y_is_zero {
                    return y;
                }
            }
            Opcode::Div | Opcode::Mod | Opcode::Shl | Opcode::Shr => {
                if x_is_zero {
                    return x;
                }
            }
            _ => {}
        }

        if x.is_undef() || y.is_undef() {
            return Value::Undef;
        }
        if x.is_nac() || y.is_nac() {
            return Value::Nac;
        }

        if op == Opcode::Eq {
            return self.values.int(IntValue::boolean(x == y));
        }
        if op == Opcode::Ne {
            return self.values.int(IntValue::boolean(x != y));
        }

        match (xv, yv) {
            (Some(xv), Some(yv)) => self.values.int(int_binary(op, xv, yv)),
            _ => Value::Nac,
        }
    }

    fn value_array_unary(&mut self, op: Opcode, x: Value) -> Value {
        if x.is_nac() || x.is_undef() {
            return x;
        }
        let elems: Vec<Value> = self
            .values
            .as_arr(x)
            .expect("vectorised op on a non-array value")
            .into_iter()
            .map(|e| self.value_scalar_unary(op, e))
            .collect();
        self.values.get(AbstractValue::Arr(elems))
    }

    fn value_array_binary(&mut self, op: Opcode, x: Value, y: Value) -> Value {
        if !x.is_const() && !y.is_const() {
            if x.is_nac() && y.is_nac() {
                return Value::Nac;
            }
            return Value::Undef;
        }

        // At least one side is a constant array; lift the other to its
        // length.
        let lift = |factory: &ValueFactory, a: Value, b: Value| -> Vec<Value> {
            match factory.as_arr(a) {
                Some(elems) => elems,
                None => {
                    let len = factory.as_arr(b).map(|e| e.len()).unwrap_or(0);
                    vec![a; len]
                }
            }
        };
        let xs = lift(&self.values, x, y);
        let ys = lift(&self.values, y, x);
        if xs.len() != ys.len() {
            return Value::Nac;
        }
        let elems: Vec<Value> = xs
            .into_iter()
            .zip(ys)
            .map(|(a, b)| self.value_scalar_binary(op, a, b))
            .collect();
        self.values.get(AbstractValue::Arr(elems))
    }

    /*******************************************************************
      The transfer function
    *******************************************************************/

    fn transfer(&mut self, cxt: &Context, val: &mut Svm, imop: &Imop) {
        match imop.op {
            Opcode::Param | Opcode::DomainId => {
                if let Some(dest) = imop.dest() {
                    Self::set_val(val, dest, Value::Nac);
                }
            }
            Opcode::Syscall => {
                if let Some(dest) = imop.dest() {
                    Self::set_val(val, dest, Value::Nac);
                }
            }
            Opcode::PushRef => {
                if let Some(arg) = imop.arg1() {
                    Self::set_val(val, arg, Value::Nac);
                }
            }
            Opcode::Push => {
                if let Some(arg) = imop.arg1() {
                    let nontrivial = cxt.symbol(arg).ty
                        .map(|ty| cxt.is_nontrivial_resource(ty))
                        .unwrap_or(false);
                    if nontrivial {
                        Self::set_val(val, arg, Value::Nac);
                    }
                }
            }
            Opcode::Call => {
                for dest in imop.def_symbols() {
                    Self::set_val(val, dest, Value::Nac);
                }
            }
            Opcode::Cast => {
                let dest = imop.dest().expect("CAST destination");
                let arg = imop.arg1().expect("CAST argument");
                let result_ty = cxt.symbol(dest).ty.expect("typed destination");
                let x = self.get_val(val, cxt, arg);
                let result = if cxt.is_scalar(result_ty) {
                    self.value_scalar_cast(cxt, result_ty, x)
                } else {
                    self.value_array_cast(cxt, result_ty, x)
                };
                Self::set_val(val, dest, result);
            }
            Opcode::ToString => {
                let dest = imop.dest().expect("TOSTRING destination");
                let arg = imop.arg1().expect("TOSTRING argument");
                let x = self.get_val(val, cxt, arg);
                let result = self.value_to_string(x);
                Self::set_val(val, dest, result);
            }
            // Vectorised assigns copy the whole abstract value too.
            Opcode::Assign | Opcode::Copy => {
                let dest = imop.dest().expect("destination");
                let arg = imop.arg1().expect("source");
                let x = self.get_val(val, cxt, arg);
                Self::set_val(val, dest, x);
            }
            Opcode::Alloc => {
                let dest = imop.dest().expect("ALLOC destination");
                let s = self.get_val(val, cxt, imop.arg1().expect("size"));
                let e = imop
                    .arg2()
                    .map(|arg| self.get_val(val, cxt, arg))
                    .unwrap_or(Value::Undef);
                let result = self.value_alloc(e, s);
                Self::set_val(val, dest, result);
            }
            Opcode::Load => {
                let dest = imop.dest().expect("LOAD destination");
                let a = self.get_val(val, cxt, imop.arg1().expect("array"));
                let i = self.get_val(val, cxt, imop.arg2().expect("index"));
                let result = self.value_load(a, i);
                Self::set_val(val, dest, result);
            }
            Opcode::Store => {
                let dest = imop.dest().expect("STORE destination");
                let a = self.get_val(val, cxt, dest);
                let i = self.get_val(val, cxt, imop.arg1().expect("index"));
                let v = self.get_val(val, cxt, imop.arg2().expect("value"));
                let result = self.value_store(a, i, v);
                Self::set_val(val, dest, result);
            }
            other => {
                if imop.is_vectorized() {
                    let dest = imop.dest().expect("destination");
                    let result = if imop.n_args() == 3 {
                        let x = self.get_val(val, cxt, imop.arg1().expect("operand"));
                        self.value_array_unary(other, x)
                    } else {
                        let x = self.get_val(val, cxt, imop.arg1().expect("lhs"));
                        let y = self.get_val(val, cxt, imop.arg2().expect("rhs"));
                        self.value_array_binary(other, x, y)
                    };
                    Self::set_val(val, dest, result);
                } else if other.is_unary_expr() {
                    let dest = imop.dest().expect("destination");
                    let x = self.get_val(val, cxt, imop.arg1().expect("operand"));
                    let result = self.value_scalar_unary(other, x);
                    Self::set_val(val, dest, result);
                } else if other.is_binary_expr() {
                    let dest = imop.dest().expect("destination");
                    let lhs = imop.arg1().expect("lhs");
                    let x = self.get_val(val, cxt, lhs);
                    let y = self.get_val(val, cxt, imop.arg2().expect("rhs"));
                    let is_string = cxt.symbol(lhs).ty
                        .map(|ty| cxt.is_string_type(ty))
                        .unwrap_or(false);
                    let result = if is_string {
                        self.value_string_binary(other, x, y)
                    } else {
                        self.value_scalar_binary(other, x, y)
                    };
                    Self::set_val(val, dest, result);
                } else {
                    // Exhaustiveness over the opcode set; a new opcode
                    // must be routed above instead of silently ignored.
                    match other {
                        Opcode::Comment
                        | Opcode::Declare
                        | Opcode::End
                        | Opcode::Error
                        | Opcode::Jf
                        | Opcode::Jt
                        | Opcode::Jump
                        | Opcode::Print
                        | Opcode::PushCRef
                        | Opcode::Release
                        | Opcode::RetClean
                        | Opcode::Return => {}
                        _ => unreachable!("unhandled opcode in constant folding"),
                    }
                }
            }
        }
    }

    /*******************************************************************
      Optimization
    *******************************************************************/

    /// Replace instructions whose destination folded to a concrete
    /// scalar constant with an ASSIGN (or CLASSIFY for private
    /// destinations) of that constant. Returns the replacement count.
    pub fn optimize_block(
        &mut self,
        cxt: &mut Context,
        program: &mut Program,
        at: BlockRef,
    ) -> usize {
        let mut val = match self.ins.get(&at) {
            Some(state) => state.clone(),
            None => return 0,
        };

        let mut replace: Vec<(usize, Imop)> = Vec::new();
        for i in 0..program.block(at).imops.len() {
            let imop = program.block(at).imops[i].clone();
            self.transfer(cxt, &mut val, &imop);

            if !imop.op.is_expr() {
                continue;
            }

            // Nothing to gain, or not safely replaceable.
            match imop.op {
                Opcode::Syscall | Opcode::Call | Opcode::Param => continue,
                Opcode::Assign | Opcode::Declassify | Opcode::Classify | Opcode::Alloc => {
                    let arg_const = imop
                        .arg1()
                        .map(|arg| cxt.symbol(arg).is_constant())
                        .unwrap_or(false);
                    if arg_const {
                        continue;
                    }
                }
                _ => {}
            }

            let dest = match imop.dest() {
                Some(dest) => dest,
                None => continue,
            };
            let folded = self.get_val(&val, cxt, dest);
            let id = match folded {
                Value::Const(id) => id,
                _ => continue,
            };

            let dest_ty = match cxt.symbol(dest).ty {
                Some(ty) => ty,
                None => continue,
            };
            let (sec, data, _) = match cxt.basic_parts(dest_ty) {
                Some(parts) => parts,
                None => continue,
            };

            let constant = match self.values.resolve(id).clone() {
                // No constant arrays in the IR.
                AbstractValue::Arr(_) => continue,
                AbstractValue::Int(iv) => {
                    let p = match cxt.prim_of(data) {
                        Some(p) if !p.is_float() => p,
                        _ => continue,
                    };
                    cxt.const_int(p, iv.bits())
                }
                AbstractValue::Str(s) => cxt.const_str(s),
            };

            let op = if cxt.is_public_sec(sec) {
                Opcode::Assign
            } else {
                Opcode::Classify
            };
            let new_imop = Imop::new(op, [Some(dest), Some(constant)])
                .with_loc(imop.file, imop.span);
            replace.push((i, new_imop));
        }

        let count = replace.len();
        for (i, new_imop) in replace {
            program.block_mut(at).imops[i].replace_with(new_imop);
        }
        count
    }
}

impl ValueFactory {
    fn as_str(&self, value: Value) -> Option<String> {
        match value {
            Value::Const(id) => match self.resolve(id) {
                AbstractValue::Str(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl DataFlowAnalysis for ConstantFolding {
    fn name(&self) -> &'static str {
        "cf"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn start(&mut self, cxt: &Context, program: &Program) {
        self.ins.clear();
        self.outs.clear();
        self.constants.clear();
        for (_, block) in program.all_blocks() {
            for imop in &block.imops {
                for used in imop.use_symbols() {
                    self.add_constant(cxt, used);
                }
            }
        }
    }

    fn start_block(&mut self, at: BlockRef) {
        self.ins.insert(at, Svm::default());
    }

    fn in_from(&mut self, _cxt: &Context, _program: &Program, from: BlockRef, edge: Edge, to: BlockRef) {
        if edge.is_global() {
            return;
        }
        let from_out = match self.outs.get(&from) {
            Some(out) => out.clone(),
            None => return,
        };
        for (sym, v) in from_out {
            let current = self
                .ins
                .get(&to)
                .and_then(|state| state.get(&sym).copied())
                .unwrap_or(Value::Undef);
            let met = self.meet(current, v);
            self.ins.entry(to).or_default().insert(sym, met);
        }
    }

    fn finish_block(&mut self, cxt: &Context, program: &Program, at: BlockRef) -> bool {
        let old = self.outs.get(&at).cloned().unwrap_or_default();
        let mut out = self.ins.get(&at).cloned().unwrap_or_default();
        for imop in &program.block(at).imops {
            self.transfer(cxt, &mut out, imop);
        }

        // Report a change exactly when some symbol climbed the lattice.
        let mut changed = false;
        for (&sym, &x) in &old {
            let y = out.get(&sym).copied().unwrap_or(Value::Undef);
            if self.lt_value(x, y) {
                changed = true;
                break;
            }
        }
        if !changed {
            for (&sym, &y) in &out {
                let x = old.get(&sym).copied().unwrap_or(Value::Undef);
                if self.lt_value(x, y) {
                    changed = true;
                    break;
                }
            }
        }

        self.outs.insert(at, out);
        changed
    }

    fn finish(&mut self) {}

    fn to_string(&self, cxt: &Context, program: &Program) -> String {
        let mut out = String::from("Constant folding analysis results:\n");
        for p in program.proc_ids() {
            let proc = program.proc(p);
            match proc.name {
                Some(name) => {
                    let _ = writeln!(
                        out,
                        "[Proc {}]",
                        cxt.interner.resolve(cxt.symbol(name).name)
                    );
                }
                None => {
                    let _ = writeln!(out, "[Internal Proc]");
                }
            }
            for b in proc.block_ids() {
                let block = proc.block(b);
                if !block.reachable {
                    continue;
                }
                let _ = writeln!(out, "  [Block {}]", block.index);
                let state = match self.outs.get(&(p, b)) {
                    Some(state) => state,
                    None => continue,
                };
                let mut syms: Vec<SymbolId> = state.keys().copied().collect();
                syms.sort();
                for sym in syms {
                    let v = state[&sym];
                    if !v.is_nac() {
                        let _ = writeln!(
                            out,
                            "    {} --> {}",
                            cxt.symbol_string(sym),
                            self.values.to_string(v)
                        );
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int64(factory: &mut ValueFactory, v: i64) -> Value {
        factory.int(IntValue::new(true, ApInt::new(64, v as u64)))
    }

    #[test]
    fn division_by_zero_is_undef() {
        let mut cf = ConstantFolding::new();
        let x = int64(&mut cf.values, 1);
        let zero = int64(&mut cf.values, 0);
        assert_eq!(cf.value_scalar_binary(Opcode::Div, x, zero), Value::Undef);
        assert_eq!(cf.value_scalar_binary(Opcode::Mod, x, zero), Value::Undef);
    }

    #[test]
    fn int_min_over_minus_one_is_undef() {
        let mut cf = ConstantFolding::new();
        let min = cf
            .values
            .int(IntValue::new(true, ApInt::negative_min(64)));
        let minus_one = cf
            .values
            .int(IntValue::new(true, ApInt::negative_one(64)));
        assert_eq!(
            cf.value_scalar_binary(Opcode::Div, min, minus_one),
            Value::Undef
        );
    }

    #[test]
    fn negative_shift_is_undef() {
        let mut cf = ConstantFolding::new();
        let x = int64(&mut cf.values, 4);
        let minus_two = int64(&mut cf.values, -2);
        assert_eq!(
            cf.value_scalar_binary(Opcode::Shl, x, minus_two),
            Value::Undef
        );
    }

    #[test]
    fn zero_short_circuits_even_against_nac() {
        let mut cf = ConstantFolding::new();
        let zero = int64(&mut cf.values, 0);
        assert_eq!(
            cf.value_scalar_binary(Opcode::Mul, zero, Value::Nac),
            zero
        );
        assert_eq!(
            cf.value_scalar_binary(Opcode::Mul, Value::Nac, zero),
            zero
        );
    }

    #[test]
    fn folding_arithmetic() {
        let mut cf = ConstantFolding::new();
        let three = int64(&mut cf.values, 3);
        let four = int64(&mut cf.values, 4);
        let twelve = cf.value_scalar_binary(Opcode::Mul, three, four);
        assert_eq!(cf.values.as_int(twelve).unwrap().value.signed_bits(), 12);
        let two = int64(&mut cf.values, 2);
        let fourteen = cf.value_scalar_binary(Opcode::Add, two, twelve);
        assert_eq!(cf.values.as_int(fourteen).unwrap().value.signed_bits(), 14);
    }

    #[test]
    fn array_meet_is_pointwise() {
        let mut cf = ConstantFolding::new();
        let a1 = int64(&mut cf.values, 1);
        let a2 = int64(&mut cf.values, 2);
        let b2 = int64(&mut cf.values, 2);
        let arr1 = cf.values.get(AbstractValue::Arr(vec![a1, a2]));
        let arr2 = cf.values.get(AbstractValue::Arr(vec![a2, b2]));
        let met = cf.meet(arr1, arr2);
        let elems = cf.values.as_arr(met).unwrap();
        assert_eq!(elems[0], Value::Nac);
        assert_eq!(elems[1], a2);
    }

    #[test]
    fn array_meet_length_mismatch_is_nac() {
        let mut cf = ConstantFolding::new();
        let a1 = int64(&mut cf.values, 1);
        let arr1 = cf.values.get(AbstractValue::Arr(vec![a1]));
        let arr2 = cf.values.get(AbstractValue::Arr(vec![a1, a1]));
        assert_eq!(cf.meet(arr1, arr2), Value::Nac);
    }

    #[test]
    fn load_with_unknown_index_meets_elements() {
        let mut cf = ConstantFolding::new();
        let a1 = int64(&mut cf.values, 7);
        let arr = cf.values.get(AbstractValue::Arr(vec![a1, a1]));
        assert_eq!(cf.value_load(arr, Value::Nac), a1);
        let a2 = int64(&mut cf.values, 8);
        let mixed = cf.values.get(AbstractValue::Arr(vec![a1, a2]));
        assert_eq!(cf.value_load(mixed, Value::Nac), Value::Nac);
    }

    #[test]
    fn store_with_unknown_index_is_undef() {
        let mut cf = ConstantFolding::new();
        let a1 = int64(&mut cf.values, 7);
        let arr = cf.values.get(AbstractValue::Arr(vec![a1]));
        assert_eq!(cf.value_store(arr, Value::Nac, a1), Value::Undef);
    }

    #[test]
    fn lattice_order() {
        let mut cf = ConstantFolding::new();
        let c = int64(&mut cf.values, 1);
        assert!(cf.le_value(Value::Undef, c));
        assert!(cf.le_value(c, Value::Nac));
        assert!(!cf.le_value(Value::Nac, c));
        assert!(cf.lt_value(Value::Undef, Value::Nac));
        assert!(!cf.lt_value(c, c));
    }
}
