//! Packed calling convention shared by emitted C and the reference runtime.
//!
//! Every entry point has the same shape:
//!
//! ```text
//! int32_t name(TVMValue* args, int* type_codes, int num_args,
//!              TVMValue* out_value, int* out_type_code, void* resource_handle)
//! ```
//!
//! Inputs come first in `args`, the output tensor is the last slot. Each
//! tensor slot holds a `DLTensor*` (data, ndim, shape, dtype). The return
//! value is a `Status` code; 0 is success.

/// Type tag of one packed argument slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeCode {
    Int = 0,
    Float = 2,
    OpaqueHandle = 3,
    Null = 4,
    DLTensorHandle = 7,
    NDArrayHandle = 13,
}

impl TypeCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<TypeCode> {
        match code {
            0 => Some(TypeCode::Int),
            2 => Some(TypeCode::Float),
            3 => Some(TypeCode::OpaqueHandle),
            4 => Some(TypeCode::Null),
            7 => Some(TypeCode::DLTensorHandle),
            13 => Some(TypeCode::NDArrayHandle),
            _ => None,
        }
    }

    /// Slots carrying a `DLTensor*`.
    pub fn is_tensor(self) -> bool {
        matches!(self, TypeCode::DLTensorHandle | TypeCode::NDArrayHandle)
    }

    pub fn c_name(self) -> &'static str {
        match self {
            TypeCode::Int => "kTVMArgInt",
            TypeCode::Float => "kTVMArgFloat",
            TypeCode::OpaqueHandle => "kTVMOpaqueHandle",
            TypeCode::Null => "kTVMNullptr",
            TypeCode::DLTensorHandle => "kTVMDLTensorHandle",
            TypeCode::NDArrayHandle => "kTVMNDArrayHandle",
        }
    }
}

/// Status returned by an entry point. Every failure kind has its own code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    ArityMismatch = 1,
    TypeMismatch = 2,
    ShapeMismatch = 3,
    InvalidWindow = 4,
    SeriesLimitExceeded = 5,
    /// A series buffer could not be allocated.
    AllocationFailed = 6,
    /// Reference runtime only: no entry point with that name.
    UnknownFunction = 7,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::Ok,
        Status::ArityMismatch,
        Status::TypeMismatch,
        Status::ShapeMismatch,
        Status::InvalidWindow,
        Status::SeriesLimitExceeded,
        Status::AllocationFailed,
        Status::UnknownFunction,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Status> {
        Status::ALL.iter().copied().find(|s| s.code() == code)
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Macro name used for this status in emitted C.
    pub fn c_name(self) -> &'static str {
        match self {
            Status::Ok => "DXTC_OK",
            Status::ArityMismatch => "DXTC_ERR_ARITY_MISMATCH",
            Status::TypeMismatch => "DXTC_ERR_TYPE_MISMATCH",
            Status::ShapeMismatch => "DXTC_ERR_SHAPE_MISMATCH",
            Status::InvalidWindow => "DXTC_ERR_INVALID_WINDOW",
            Status::SeriesLimitExceeded => "DXTC_ERR_SERIES_LIMIT",
            Status::AllocationFailed => "DXTC_ERR_ALLOCATION",
            Status::UnknownFunction => "DXTC_ERR_UNKNOWN_FUNCTION",
        }
    }
}

/// Parameter list of every emitted entry point.
pub const ENTRY_PARAMS: &str = "TVMValue* args, int* type_codes, int num_args, \
                                TVMValue* out_value, int* out_type_code, void* resource_handle";

/// Full C prototype (without trailing `;` or body) for an entry point.
pub fn entry_prototype(name: &str) -> String {
    format!("TVM_DLL int32_t {}({})", name, ENTRY_PARAMS)
}

/// True if `name` can be used verbatim as a C symbol.
pub fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// C keywords (C11), which can never name an entry point.
const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Alignas", "_Alignof", "_Atomic", "_Bool",
    "_Complex", "_Generic", "_Imaginary", "_Noreturn", "_Static_assert", "_Thread_local",
];

/// Prefix of every helper, type and macro the module prelude defines.
pub const RESERVED_PREFIX: &str = "dxtc_";

/// True if `name` is a C keyword or falls in the generated-code namespace.
pub fn is_reserved_symbol(name: &str) -> bool {
    C_KEYWORDS.contains(&name)
        || name
            .get(..RESERVED_PREFIX.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(RESERVED_PREFIX))
}
