//! Kernel library: one `KernelLowering` per kernel, collected in a registry.
//!
//! Each kernel implements `KernelLowering` to describe its operands and
//! emit a packed-call C entry point for one IR function. The dispatcher
//! never hard-codes kernel names; it asks the registry. Adding a kernel
//! means registering another `KernelLowering`.

mod fused_multiply;
mod multiply_add;
mod rolling;
#[cfg(test)]
mod tests;

use super::emit::{CWriter, EmitContext};
use super::KernelKind;

pub use fused_multiply::FusedMultiplyLowering;
pub use multiply_add::MultiplyAddLowering;
pub use rolling::{AxisRollingLowering, TsMeanLowering};

/// Role of one declared parameter of a kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    /// Floating-point data tensor; all data operands share one element type.
    Data,
    /// Window-size scalar stored in a one-element tensor of any dtype.
    Window,
}

/// Emits the C entry point for one kernel.
pub trait KernelLowering: Send + Sync {
    /// Which behavior this lowering implements.
    fn kind(&self) -> KernelKind;

    /// Declared input parameters, in order. The output tensor is implicit.
    fn operands(&self) -> &'static [Operand];

    /// Emit the complete entry point (prototype, checks, body) for `ctx`.
    fn emit(&self, ctx: &EmitContext<'_>, w: &mut CWriter);
}

/// Create the built-in lowering registered under `tag`.
pub fn create_kernel_lowering(tag: &str) -> Option<Box<dyn KernelLowering>> {
    match KernelKind::from_tag(tag)? {
        KernelKind::ElementwiseFusedMultiply => Some(Box::new(FusedMultiplyLowering)),
        KernelKind::AxisRollingAggregate => Some(Box::new(AxisRollingLowering)),
        KernelKind::TimeSeriesRollingMean => Some(Box::new(TsMeanLowering)),
        KernelKind::ElementwiseMultiplyAdd => Some(Box::new(MultiplyAddLowering)),
    }
}

struct KernelEntry {
    tag: String,
    lowering: Box<dyn KernelLowering>,
}

/// Ordered tag → lowering table. Registration order is match priority.
#[derive(Default)]
pub struct KernelRegistry {
    entries: Vec<KernelEntry>,
}

impl KernelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in kernels in priority order.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in KernelKind::ALL {
            if let Some(lowering) = create_kernel_lowering(kind.tag()) {
                registry.register(kind.tag(), lowering);
            }
        }
        registry
    }

    /// Register `lowering` under `tag`. Returns false (and keeps the
    /// existing entry) if the tag is already taken.
    pub fn register(&mut self, tag: &str, lowering: Box<dyn KernelLowering>) -> bool {
        if self.entries.iter().any(|e| e.tag == tag) {
            return false;
        }
        self.entries.push(KernelEntry {
            tag: tag.to_string(),
            lowering,
        });
        true
    }

    /// Exact tag lookup.
    pub fn lookup(&self, tag: &str) -> Option<&dyn KernelLowering> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| e.lowering.as_ref())
    }

    /// First registered tag contained in `name`.
    pub fn lookup_substring(&self, name: &str) -> Option<(&str, &dyn KernelLowering)> {
        self.entries
            .iter()
            .find(|e| name.contains(e.tag.as_str()))
            .map(|e| (e.tag.as_str(), e.lowering.as_ref()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.tag.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn KernelLowering)> {
        self.entries
            .iter()
            .map(|e| (e.tag.as_str(), e.lowering.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
