//! Packed argument slots for the reference runtime.
//!
//! Mirrors the C side: a call receives a list of tagged slots, inputs
//! first and the output tensor last.

use super::tensor::Tensor;
use crate::kir::abi::TypeCode;

/// One argument slot of a packed call.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    Tensor(Tensor),
    Int(i64),
    Float(f64),
    Null,
}

impl ArgValue {
    pub fn type_code(&self) -> TypeCode {
        match self {
            ArgValue::Tensor(_) => TypeCode::DLTensorHandle,
            ArgValue::Int(_) => TypeCode::Int,
            ArgValue::Float(_) => TypeCode::Float,
            ArgValue::Null => TypeCode::Null,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            ArgValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tensor_mut(&mut self) -> Option<&mut Tensor> {
        match self {
            ArgValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Option<Tensor> {
        match self {
            ArgValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Name used in type-mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ArgValue::Tensor(_) => "tensor",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Null => "null",
        }
    }
}

impl From<Tensor> for ArgValue {
    fn from(t: Tensor) -> Self {
        ArgValue::Tensor(t)
    }
}
