//! dxtc: lowers partitioned tensor-compiler functions to packed-call C
//! kernels, and runs the same kernels in Rust.
//!
//! ```text
//! IR (JSON) ─→ ir::IrModule ─→ kir::Dispatcher ─→ kir::EmittedModule ─→ C source
//!                                                         │
//!                                                         └→ runtime::ModuleInstance
//! ```

pub mod api;
pub mod config;
pub mod diagnostic;
pub mod ir;
pub mod kir;
pub mod runtime;
pub mod span;

// Re-exports: short paths used by the CLI and tests
pub use config::project;
pub use ir::{DType, IrFunction, IrItem, IrModule, Param};
pub use kir::{
    Dispatcher, EmittedModule, KernelKind, KernelRegistry, LowerError, LowerOptions, MatchMode,
};
pub use runtime::{ArgValue, ExpandingPolicy, KernelError, ModuleInstance, SeriesState, Tensor};

pub use api::*;
