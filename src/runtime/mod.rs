//! Reference runtime: the kernel library executed in Rust.
//!
//! A `ModuleInstance` is what loading an emitted module produces: one
//! entry point per lowered function, callable through the packed
//! convention, with the series tables of the stateful kernels owned by
//! the instance. It runs the same update rule and the same checks as the
//! generated C, so it serves as the executable definition of what that C
//! computes.
//!
//! Series tables are created on the first call of their entry point and
//! dropped with the instance.

pub mod error;
pub mod kernels;
pub mod packed;
pub mod registry;
pub mod series;
pub mod tensor;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::ir::DType;
use crate::kir::abi::{Status, TypeCode};
use crate::kir::{EmittedModule, FunctionManifest, KernelKind, LowerOptions, Manifest};

pub use error::KernelError;
pub use packed::ArgValue;
pub use registry::{SeriesRegistry, SeriesTable};
pub use series::{ExpandingPolicy, SeriesElement, SeriesState};
pub use tensor::{Element, Tensor, TensorData, TensorError, TensorSpec};

// ─── Types ─────────────────────────────────────────────────────────

/// Settings shared by every stateful entry point of an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub expanding: ExpandingPolicy,
    pub max_series: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::from(&LowerOptions::default())
    }
}

impl From<&LowerOptions> for RuntimeOptions {
    fn from(options: &LowerOptions) -> Self {
        Self {
            expanding: options.expanding,
            max_series: options.max_series,
        }
    }
}

struct FunctionSlot {
    manifest: FunctionManifest,
    series: OnceLock<SeriesTable>,
}

/// A loaded module: named entry points plus their series state.
pub struct ModuleInstance {
    functions: BTreeMap<String, FunctionSlot>,
    options: RuntimeOptions,
}

// ─── Loading ───────────────────────────────────────────────────────

impl ModuleInstance {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            functions: BTreeMap::new(),
            options,
        }
    }

    /// Instance exposing every entry point of `module`, with the series
    /// settings it was lowered with.
    pub fn load(module: &EmittedModule) -> Self {
        let mut instance = Self::new(RuntimeOptions {
            expanding: module.expanding,
            max_series: module.max_series,
        });
        for f in &module.functions {
            instance.define(f.clone());
        }
        instance
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut instance = Self::new(RuntimeOptions {
            expanding: manifest.expanding,
            max_series: manifest.max_series,
        });
        for f in &manifest.functions {
            instance.define(f.clone());
        }
        instance
    }

    /// Add (or replace) an entry point. Replacing drops its series state.
    pub fn define(&mut self, manifest: FunctionManifest) {
        tracing::debug!(function = %manifest.name, kernel = %manifest.kernel, "entry point defined");
        self.functions.insert(
            manifest.name.clone(),
            FunctionSlot {
                manifest,
                series: OnceLock::new(),
            },
        );
    }

    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    pub fn kind_of(&self, name: &str) -> Option<KernelKind> {
        self.functions.get(name).map(|slot| slot.manifest.kernel)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionManifest> {
        self.functions.get(name).map(|slot| &slot.manifest)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionManifest> {
        self.functions.values().map(|slot| &slot.manifest)
    }

    /// Series table of a stateful entry point, once it has been called.
    pub fn series_table(&self, name: &str) -> Option<&SeriesTable> {
        self.functions.get(name).and_then(|slot| slot.series.get())
    }
}

// ─── Calling ───────────────────────────────────────────────────────

impl ModuleInstance {
    /// Call entry point `name`. `args` holds the inputs followed by the
    /// output tensor, which is written in place on success.
    pub fn invoke(&self, name: &str, args: &mut [ArgValue]) -> Result<(), KernelError> {
        let slot = self
            .functions
            .get(name)
            .ok_or_else(|| KernelError::UnknownFunction {
                name: name.to_string(),
            })?;
        let kind = slot.manifest.kernel;
        let elem = slot.manifest.elem;
        tracing::trace!(function = name, %kind, args = args.len(), "invoke");

        let expected = kind.arity() + 1;
        if args.len() != expected {
            return Err(KernelError::ArityMismatch {
                function: name.to_string(),
                expected,
                found: args.len(),
            });
        }
        for (index, arg) in args.iter().enumerate() {
            if !arg.type_code().is_tensor() {
                return Err(KernelError::TypeMismatch {
                    index,
                    expected: "tensor".to_string(),
                    found: arg.kind_name().to_string(),
                });
            }
        }

        let (inputs, output) = args.split_at_mut(kind.arity());
        let out = output
            .first_mut()
            .and_then(ArgValue::as_tensor_mut)
            .ok_or_else(|| KernelError::TypeMismatch {
                index: kind.arity(),
                expected: "tensor".to_string(),
                found: "null".to_string(),
            })?;
        let inputs: Vec<&Tensor> = inputs.iter().filter_map(ArgValue::as_tensor).collect();

        match (kind, inputs.as_slice()) {
            (KernelKind::ElementwiseMultiplyAdd, [a, b, c]) => {
                kernels::multiply_add(elem, a, b, c, out)
            }
            (KernelKind::ElementwiseFusedMultiply, [a, b]) => {
                kernels::fused_multiply(elem, a, b, out)
            }
            (KernelKind::AxisRollingAggregate | KernelKind::TimeSeriesRollingMean, [data, win]) => {
                let table = self.table_for(slot)?;
                kernels::rolling_mean(table, slot.manifest.window, data, win, out)
            }
            _ => Err(KernelError::ArityMismatch {
                function: name.to_string(),
                expected,
                found: inputs.len() + 1,
            }),
        }
    }

    /// Packed-convention call: returns a status code and marks the result
    /// slot empty on success, exactly like an emitted entry point.
    pub fn call_packed(
        &self,
        name: &str,
        args: &mut [ArgValue],
        type_codes: &[i32],
        out_type_code: &mut i32,
    ) -> i32 {
        if type_codes.len() != args.len() {
            return Status::ArityMismatch.code();
        }
        let tensors = type_codes
            .iter()
            .all(|&code| TypeCode::from_code(code).is_some_and(TypeCode::is_tensor));
        if !tensors {
            return Status::TypeMismatch.code();
        }
        match self.invoke(name, args) {
            Ok(()) => {
                *out_type_code = TypeCode::Null.code();
                Status::Ok.code()
            }
            Err(err) => {
                tracing::debug!(function = name, error = %err, "packed call failed");
                err.status().code()
            }
        }
    }

    fn table_for<'a>(&self, slot: &'a FunctionSlot) -> Result<&'a SeriesTable, KernelError> {
        if let Some(table) = slot.series.get() {
            return Ok(table);
        }
        let shared = slot.manifest.kernel == KernelKind::AxisRollingAggregate;
        let table = SeriesTable::new(
            slot.manifest.elem,
            self.options.max_series,
            self.options.expanding,
            shared,
        )
        .ok_or_else(|| KernelError::dtype(0, DType::Float32, slot.manifest.elem))?;
        Ok(slot.series.get_or_init(|| table))
    }
}
