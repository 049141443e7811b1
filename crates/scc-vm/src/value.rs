//! Runtime values of the interpreter.

use scc_core::{ApInt, ConstValue};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(ApInt),
    Float(f64),
    Str(String),
    Arr(Vec<Value>),
}

impl Value {
    pub fn from_const(value: &ConstValue) -> Value {
        match value {
            ConstValue::Int(v) => Value::Int(*v),
            ConstValue::Float(v) => Value::Float(v.value()),
            ConstValue::Str(s) => Value::Str(s.clone()),
        }
    }

    pub fn as_int(&self) -> Option<ApInt> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<u64> {
        self.as_int().map(|v| v.bits())
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(v) => !v.is_zero(),
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Arr(elems) => !elems.is_empty(),
        }
    }

    /// The printable form used by TOSTRING and PRINT.
    pub fn render(&self, signed: bool) -> String {
        match self {
            Value::Int(v) => {
                if signed {
                    v.signed_string()
                } else {
                    v.unsigned_string()
                }
            }
            Value::Float(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::Arr(elems) => {
                let mut out = String::from("{");
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&e.render(signed));
                }
                out.push('}');
                out
            }
        }
    }
}
