//! Kernel precondition failures.

use thiserror::Error;

use crate::ir::DType;
use crate::kir::abi::Status;

/// Why a kernel call was rejected. Every variant maps to a distinct
/// non-zero packed-call status; a rejected call writes nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("`{function}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} must be {expected}, got {found}")]
    TypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("argument {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("window must be a positive integer, got {window}")]
    InvalidWindow { window: i64 },

    #[error("{requested} series requested, the table holds {limit}")]
    SeriesLimitExceeded { requested: usize, limit: usize },

    #[error("cannot allocate a series buffer for window {window}")]
    AllocationFailed { window: usize },

    #[error("no function named `{name}` in this module")]
    UnknownFunction { name: String },
}

impl KernelError {
    pub fn status(&self) -> Status {
        match self {
            KernelError::ArityMismatch { .. } => Status::ArityMismatch,
            KernelError::TypeMismatch { .. } => Status::TypeMismatch,
            KernelError::ShapeMismatch { .. } => Status::ShapeMismatch,
            KernelError::InvalidWindow { .. } => Status::InvalidWindow,
            KernelError::SeriesLimitExceeded { .. } => Status::SeriesLimitExceeded,
            KernelError::AllocationFailed { .. } => Status::AllocationFailed,
            KernelError::UnknownFunction { .. } => Status::UnknownFunction,
        }
    }

    pub(crate) fn dtype(index: usize, expected: DType, found: DType) -> Self {
        KernelError::TypeMismatch {
            index,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn shape(index: usize, expected: &[usize], found: &[usize]) -> Self {
        KernelError::ShapeMismatch {
            index,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
