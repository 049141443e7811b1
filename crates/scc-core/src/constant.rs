//! Constant values.
//!
//! Constants are symbols: interning happens in the [`crate::Context`],
//! keyed by (type, value), so two occurrences of the same literal share
//! one symbol and compare equal by id.

use crate::apfloat::ApFloat;
use crate::apint::ApInt;

/// The payload of a constant symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Int(ApInt),
    Float(ApFloat),
    Str(String),
}

impl ConstValue {
    pub fn as_int(&self) -> Option<ApInt> {
        match self {
            ConstValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<ApFloat> {
        match self {
            ConstValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::Str(s) => Some(s),
            _ => None,
        }
    }
}
