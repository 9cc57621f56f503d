//! KIR: kernel lowering for packed-call C targets.
//!
//! KIR does not traverse arbitrary IR. Each IR function names one kernel
//! from a fixed library, and the library supplies a hand-written C body
//! for it, wired to the packed calling convention.
//!
//! Pipeline:
//! ```text
//! IrModule ─→ Dispatcher ─→ KernelRegistry lookup ─→ KernelLowering::emit
//!                                                       │
//!          EmittedModule (C source + manifest) ←────────┘
//!                 │
//!                 ├→ ModulePackager          (external build)
//!                 └→ runtime::ModuleInstance (reference execution)
//! ```
//!
//! Two kernels carry per-series state (the streaming mean engine); the
//! others are stateless elementwise loops.

pub mod abi;
pub mod dispatch;
pub mod emit;
pub mod lower;
pub mod package;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::runtime::ExpandingPolicy;

pub use dispatch::{Dispatcher, LowerError, LowerErrorKind, LoweringState};
pub use lower::{create_kernel_lowering, KernelLowering, KernelRegistry, Operand};
pub use package::{EmittedModule, FunctionManifest, Manifest, ModulePackager, SourceDirPackager};

/// Default number of independent series a stateful entry point tracks.
pub const DEFAULT_MAX_SERIES: usize = 1000;

/// The closed set of kernels the library knows how to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    ElementwiseFusedMultiply,
    AxisRollingAggregate,
    TimeSeriesRollingMean,
    ElementwiseMultiplyAdd,
}

impl KernelKind {
    /// All kinds in substring-matching priority order.
    pub const ALL: [KernelKind; 4] = [
        KernelKind::ElementwiseFusedMultiply,
        KernelKind::AxisRollingAggregate,
        KernelKind::TimeSeriesRollingMean,
        KernelKind::ElementwiseMultiplyAdd,
    ];

    /// Registry tag of the built-in kernel.
    pub fn tag(self) -> &'static str {
        match self {
            KernelKind::ElementwiseFusedMultiply => "my_multi",
            KernelKind::AxisRollingAggregate => "dxt_axis",
            KernelKind::TimeSeriesRollingMean => "my_ts_mean",
            KernelKind::ElementwiseMultiplyAdd => "multiply_add",
        }
    }

    pub fn from_tag(tag: &str) -> Option<KernelKind> {
        KernelKind::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    /// Number of input tensors (the output tensor is not counted).
    pub fn arity(self) -> usize {
        match self {
            KernelKind::ElementwiseMultiplyAdd => 3,
            _ => 2,
        }
    }

    /// Kernels that embed the streaming series engine.
    pub fn is_stateful(self) -> bool {
        matches!(
            self,
            KernelKind::AxisRollingAggregate | KernelKind::TimeSeriesRollingMean
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelKind::ElementwiseFusedMultiply => "elementwise_fused_multiply",
            KernelKind::AxisRollingAggregate => "axis_rolling_aggregate",
            KernelKind::TimeSeriesRollingMean => "time_series_rolling_mean",
            KernelKind::ElementwiseMultiplyAdd => "elementwise_multiply_add",
        }
    }
}

impl std::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How an IR function without a structured kernel tag is matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The external name must equal a registered tag.
    #[default]
    Exact,
    /// The first registered tag contained in the external name wins.
    /// Compatibility mode for framework-generated names such as
    /// `tvmgen_default_my_ts_mean_0`.
    Substring,
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchMode::Exact),
            "substring" | "legacy" => Ok(MatchMode::Substring),
            other => Err(format!(
                "unknown match mode '{}' (expected 'exact' or 'substring')",
                other
            )),
        }
    }
}

/// Options controlling lowering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerOptions {
    pub match_mode: MatchMode,
    /// What stateful kernels return before their window is full.
    pub expanding: ExpandingPolicy,
    /// Series table size of every stateful entry point.
    pub max_series: usize,
    /// Emit `DXTC_TRACE` calls (compiled out unless `DXTC_ENABLE_TRACE`).
    pub trace: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::Exact,
            expanding: ExpandingPolicy::PartialMean,
            max_series: DEFAULT_MAX_SERIES,
            trace: false,
        }
    }
}

impl LowerOptions {
    pub fn legacy() -> Self {
        Self {
            match_mode: MatchMode::Substring,
            ..Self::default()
        }
    }
}
