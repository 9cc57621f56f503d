//! Lowering dispatcher: IR functions → one C translation unit.
//!
//! Each function moves through `Unmatched → Matching → Emitted`. The first
//! failure aborts the whole module: nothing is emitted and later functions
//! are not looked at.

use std::collections::BTreeSet;

use thiserror::Error;

use super::abi::{is_c_identifier, is_reserved_symbol};
use super::emit::{emit_prelude, emit_series_engine, state_prefix, CWriter, EmitContext};
use super::lower::{KernelLowering, KernelRegistry, Operand};
use super::package::{EmittedModule, FunctionManifest};
use super::{KernelKind, LowerOptions, MatchMode};
use crate::diagnostic::Diagnostic;
use crate::ir::{DType, IrFunction, IrItem, IrModule};
use crate::span::Span;

// ─── Errors ────────────────────────────────────────────────────────

/// A fatal lowering error. `index` is the position of the offending item
/// in the IR module.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerErrorKind {
    #[error("IR function #{index} has no external name")]
    MissingExternalName { index: usize },

    #[error("IR item #{index} is a {found}, expected a function")]
    NotAFunction { index: usize, found: &'static str },

    #[error("no kernel matches `{name}`")]
    UnmatchedKernel { name: String, tag: Option<String> },

    #[error("`{name}` is not a valid C symbol")]
    InvalidSymbol { name: String },

    #[error("`{name}` is defined more than once")]
    DuplicateSymbol { name: String },

    #[error("`{name}` declares {found} parameters, kernel `{kernel}` takes {expected}")]
    ArityMismatch {
        name: String,
        kernel: KernelKind,
        expected: usize,
        found: usize,
    },

    #[error("parameter `{param}` of `{name}` is {found}, kernel `{kernel}` needs a float tensor")]
    UnsupportedDtype {
        name: String,
        kernel: KernelKind,
        param: String,
        found: DType,
    },

    #[error("`{name}` mixes element types {first} and {second}")]
    MixedElementTypes {
        name: String,
        first: DType,
        second: DType,
    },
}

impl LowerError {
    fn new(kind: LowerErrorKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// The symbol or tag this error is about, if it has one.
    pub fn subject(&self) -> Option<&str> {
        match &self.kind {
            LowerErrorKind::MissingExternalName { .. } | LowerErrorKind::NotAFunction { .. } => {
                None
            }
            LowerErrorKind::UnmatchedKernel { name, tag } => Some(tag.as_deref().unwrap_or(name.as_str())),
            LowerErrorKind::InvalidSymbol { name }
            | LowerErrorKind::DuplicateSymbol { name }
            | LowerErrorKind::ArityMismatch { name, .. }
            | LowerErrorKind::MixedElementTypes { name, .. } => Some(name.as_str()),
            LowerErrorKind::UnsupportedDtype { param, .. } => Some(param.as_str()),
        }
    }

    /// Convert to a renderable diagnostic, pointing into `source` (the IR
    /// document) when the subject can be found there.
    pub fn to_diagnostic(&self, source: Option<&str>) -> Diagnostic {
        let span = match (source, self.subject()) {
            (Some(src), Some(subject)) => Span::locate(src, subject).unwrap_or_else(Span::dummy),
            _ => Span::dummy(),
        };
        let diag = Diagnostic::error(self.to_string(), span);
        match &self.kind {
            LowerErrorKind::UnmatchedKernel { tag: None, .. } => diag.with_help(
                "attach a `kernel` tag to the function or lower in substring mode".to_string(),
            ),
            LowerErrorKind::ArityMismatch { kernel, .. } => {
                diag.with_note(format!("the output tensor of `{}` is implicit", kernel))
            }
            _ => diag,
        }
    }
}

// ─── State machine ─────────────────────────────────────────────────

/// Progress of one IR function through the dispatcher.
pub enum LoweringState<'a> {
    /// Nothing known about the function yet.
    Unmatched,
    /// A kernel has been selected; signature not yet validated.
    Matching {
        name: &'a str,
        lowering: &'a dyn KernelLowering,
    },
    /// C entry point produced.
    Emitted(EmittedFunction),
}

impl LoweringState<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            LoweringState::Unmatched => "unmatched",
            LoweringState::Matching { .. } => "matching",
            LoweringState::Emitted(_) => "emitted",
        }
    }
}

/// One lowered entry point, before it is assembled into a module.
#[derive(Clone, Debug)]
pub struct EmittedFunction {
    pub name: String,
    pub kind: KernelKind,
    pub elem: DType,
    /// Declared dtype of the window operand, if the kernel has one.
    pub window: Option<DType>,
    pub source: String,
}

impl EmittedFunction {
    /// File-scope symbols this entry point defines: its own name, plus the
    /// series table, shared window and lock of a stateful kernel.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols = vec![self.name.clone()];
        if self.kind.is_stateful() {
            let prefix = state_prefix(&self.name);
            symbols.extend(["series", "window", "lock"].map(|s| format!("{}_{}", prefix, s)));
        }
        symbols
    }
}

// ─── Dispatcher ────────────────────────────────────────────────────

/// Lowers IR modules using a kernel registry and a fixed set of options.
pub struct Dispatcher {
    registry: KernelRegistry,
    options: LowerOptions,
}

impl Dispatcher {
    pub fn new(options: LowerOptions) -> Self {
        Self::with_registry(KernelRegistry::with_builtins(), options)
    }

    pub fn with_registry(registry: KernelRegistry, options: LowerOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    pub fn options(&self) -> &LowerOptions {
        &self.options
    }

    /// Lower every item of `module` into one C translation unit.
    pub fn lower_module(&self, module: &IrModule) -> Result<EmittedModule, LowerError> {
        let mut functions = Vec::new();
        let mut symbols = BTreeSet::new();

        for (index, item) in module.items.iter().enumerate() {
            let func = match item {
                IrItem::Function(f) => f,
                other => {
                    return Err(LowerError::new(
                        LowerErrorKind::NotAFunction {
                            index,
                            found: other.kind_name(),
                        },
                        index,
                    ))
                }
            };
            let emitted = self.lower_function(index, func)?;
            for symbol in emitted.symbols() {
                if !symbols.insert(symbol.clone()) {
                    return Err(LowerError::new(
                        LowerErrorKind::DuplicateSymbol { name: symbol },
                        index,
                    ));
                }
            }
            functions.push(emitted);
        }

        let module = self.assemble(functions);
        tracing::info!(
            functions = module.functions.len(),
            bytes = module.source.len(),
            "module lowered"
        );
        Ok(module)
    }

    /// Lower one function. `index` is only used for error reporting.
    pub fn lower_function(
        &self,
        index: usize,
        func: &IrFunction,
    ) -> Result<EmittedFunction, LowerError> {
        let mut state = LoweringState::Unmatched;
        loop {
            tracing::trace!(index, state = state.label(), "lowering step");
            state = match state {
                LoweringState::Unmatched => {
                    let name = func.external_name.as_deref().ok_or_else(|| {
                        LowerError::new(LowerErrorKind::MissingExternalName { index }, index)
                    })?;
                    if !is_c_identifier(name) || is_reserved_symbol(name) {
                        return Err(LowerError::new(
                            LowerErrorKind::InvalidSymbol {
                                name: name.to_string(),
                            },
                            index,
                        ));
                    }
                    let lowering = self.resolve(func, name).ok_or_else(|| {
                        LowerError::new(
                            LowerErrorKind::UnmatchedKernel {
                                name: name.to_string(),
                                tag: func.kernel.clone(),
                            },
                            index,
                        )
                    })?;
                    LoweringState::Matching { name, lowering }
                }
                LoweringState::Matching { name, lowering } => {
                    let elem = validate_signature(index, name, func, lowering)?;
                    let ctx = EmitContext {
                        name,
                        params: &func.params,
                        elem,
                        options: &self.options,
                    };
                    let mut w = CWriter::new();
                    lowering.emit(&ctx, &mut w);
                    tracing::debug!(function = name, kernel = %lowering.kind(), %elem, "kernel emitted");
                    let window = func
                        .params
                        .iter()
                        .zip(lowering.operands())
                        .find(|(_, operand)| **operand == Operand::Window)
                        .map(|(param, _)| param.dtype);
                    LoweringState::Emitted(EmittedFunction {
                        name: name.to_string(),
                        kind: lowering.kind(),
                        elem,
                        window,
                        source: w.finish(),
                    })
                }
                LoweringState::Emitted(emitted) => return Ok(emitted),
            };
        }
    }

    /// Pick the kernel for `func`: its structured tag if present, otherwise
    /// its external name under the configured match mode.
    fn resolve(&self, func: &IrFunction, name: &str) -> Option<&dyn KernelLowering> {
        if let Some(tag) = &func.kernel {
            return self.registry.lookup(tag);
        }
        match self.options.match_mode {
            MatchMode::Exact => self.registry.lookup(name),
            MatchMode::Substring => self.registry.lookup_substring(name).map(|(tag, lowering)| {
                tracing::debug!(function = name, tag, "matched by substring");
                lowering
            }),
        }
    }

    fn assemble(&self, functions: Vec<EmittedFunction>) -> EmittedModule {
        let mut w = CWriter::new();
        emit_prelude(&mut w);

        // One engine per element type actually used by a stateful kernel.
        let engines: BTreeSet<_> = functions
            .iter()
            .filter(|f| f.kind.is_stateful())
            .map(|f| f.elem.suffix())
            .collect();
        for elem in [DType::Float32, DType::Float64] {
            if engines.contains(elem.suffix()) {
                w.blank();
                emit_series_engine(&mut w, elem, self.options.expanding);
            }
        }

        for f in &functions {
            w.blank();
            w.raw(&f.source);
        }

        EmittedModule {
            source: w.finish(),
            kind: "c".to_string(),
            aux_files: Vec::new(),
            functions: functions
                .iter()
                .map(|f| FunctionManifest {
                    name: f.name.clone(),
                    kernel: f.kind,
                    elem: f.elem,
                    window: f.window,
                })
                .collect(),
            expanding: self.options.expanding,
            max_series: self.options.max_series,
        }
    }
}

/// Check `func`'s parameters against the kernel's operands and return the
/// element type shared by its data tensors.
fn validate_signature(
    index: usize,
    name: &str,
    func: &IrFunction,
    lowering: &dyn KernelLowering,
) -> Result<DType, LowerError> {
    let operands = lowering.operands();
    let kernel = lowering.kind();
    if func.params.len() != operands.len() {
        return Err(LowerError::new(
            LowerErrorKind::ArityMismatch {
                name: name.to_string(),
                kernel,
                expected: operands.len(),
                found: func.params.len(),
            },
            index,
        ));
    }

    let mut elem: Option<DType> = None;
    for (param, operand) in func.params.iter().zip(operands) {
        if *operand != Operand::Data {
            continue;
        }
        if !param.dtype.is_float() {
            return Err(LowerError::new(
                LowerErrorKind::UnsupportedDtype {
                    name: name.to_string(),
                    kernel,
                    param: param.name.clone(),
                    found: param.dtype,
                },
                index,
            ));
        }
        match elem {
            None => elem = Some(param.dtype),
            Some(first) if first != param.dtype => {
                return Err(LowerError::new(
                    LowerErrorKind::MixedElementTypes {
                        name: name.to_string(),
                        first,
                        second: param.dtype,
                    },
                    index,
                ))
            }
            Some(_) => {}
        }
    }
    Ok(elem.unwrap_or(DType::Float32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_mean(name: &str) -> IrFunction {
        IrFunction::new(name)
            .param("data", &[10], DType::Float32)
            .param("window", &[1], DType::Int32)
    }

    #[test]
    fn test_states_end_in_emitted() {
        let d = Dispatcher::new(LowerOptions::default());
        let f = d.lower_function(0, &ts_mean("my_ts_mean")).unwrap();
        assert_eq!(f.name, "my_ts_mean");
        assert_eq!(f.kind, KernelKind::TimeSeriesRollingMean);
        assert_eq!(f.elem, DType::Float32);
        assert_eq!(f.window, Some(DType::Int32));
    }

    #[test]
    fn test_structured_tag_wins_over_name() {
        let d = Dispatcher::new(LowerOptions::default());
        let func = ts_mean("tvmgen_default_custom_main_0").with_kernel("dxt_axis");
        let f = d.lower_function(0, &func).unwrap();
        assert_eq!(f.kind, KernelKind::AxisRollingAggregate);
    }

    #[test]
    fn test_exact_mode_rejects_generated_names() {
        let d = Dispatcher::new(LowerOptions::default());
        let err = d
            .lower_function(3, &ts_mean("tvmgen_default_my_ts_mean_0"))
            .unwrap_err();
        assert_eq!(err.index, 3);
        assert!(matches!(
            err.kind,
            LowerErrorKind::UnmatchedKernel { tag: None, .. }
        ));
    }

    #[test]
    fn test_substring_mode_priority() {
        let d = Dispatcher::new(LowerOptions::legacy());
        // Contains both `my_multi` and `multiply_add`; `my_multi` is first.
        let func = IrFunction::new("my_multiply_add_0")
            .param("a", &[4], DType::Float32)
            .param("b", &[4], DType::Float32);
        let f = d.lower_function(0, &func).unwrap();
        assert_eq!(f.kind, KernelKind::ElementwiseFusedMultiply);
        assert_eq!(f.window, None);
    }

    #[test]
    fn test_unknown_structured_tag() {
        let d = Dispatcher::new(LowerOptions::legacy());
        let func = ts_mean("my_ts_mean_0").with_kernel("ts_median");
        let err = d.lower_function(0, &func).unwrap_err();
        assert_eq!(err.subject(), Some("ts_median"));
    }

    #[test]
    fn test_missing_name() {
        let d = Dispatcher::new(LowerOptions::default());
        let err = d.lower_function(1, &IrFunction::default()).unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::MissingExternalName { index: 1 });
        assert_eq!(err.to_string(), "IR function #1 has no external name");
    }

    #[test]
    fn test_invalid_symbol() {
        let d = Dispatcher::new(LowerOptions::legacy());
        let err = d.lower_function(0, &ts_mean("my_ts_mean-0")).unwrap_err();
        assert!(matches!(err.kind, LowerErrorKind::InvalidSymbol { .. }));
    }

    #[test]
    fn test_keywords_and_generated_names_rejected() {
        let d = Dispatcher::new(LowerOptions::default());
        for name in ["static", "int", "dxtc_numel", "DXTC_OK"] {
            let err = d
                .lower_function(0, &ts_mean(name).with_kernel("my_ts_mean"))
                .unwrap_err();
            assert_eq!(
                err.kind,
                LowerErrorKind::InvalidSymbol {
                    name: name.to_string()
                }
            );
        }
    }

    #[test]
    fn test_name_colliding_with_state_symbol() {
        let d = Dispatcher::new(LowerOptions::default());
        let stateful = ts_mean("my_ts_mean");
        let clash = ts_mean("my_ts_mean_state_series").with_kernel("my_ts_mean");

        let module = IrModule::new()
            .with_function(stateful.clone())
            .with_function(clash.clone());
        let err = d.lower_module(&module).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(
            err.kind,
            LowerErrorKind::DuplicateSymbol {
                name: "my_ts_mean_state_series".into()
            }
        );

        // Same clash with the order reversed.
        let module = IrModule::new().with_function(clash).with_function(stateful);
        let err = d.lower_module(&module).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.kind, LowerErrorKind::DuplicateSymbol { .. }));
    }

    #[test]
    fn test_stateless_functions_define_only_their_name() {
        let d = Dispatcher::new(LowerOptions::default());
        let func = IrFunction::new("my_multi")
            .param("a", &[3], DType::Float32)
            .param("b", &[3], DType::Float32);
        let f = d.lower_function(0, &func).unwrap();
        assert_eq!(f.symbols(), vec!["my_multi".to_string()]);
        let f = d.lower_function(0, &ts_mean("my_ts_mean")).unwrap();
        assert_eq!(
            f.symbols(),
            vec![
                "my_ts_mean",
                "my_ts_mean_state_series",
                "my_ts_mean_state_window",
                "my_ts_mean_state_lock"
            ]
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let d = Dispatcher::new(LowerOptions::default());
        let func = IrFunction::new("multiply_add")
            .param("a", &[4], DType::Float32)
            .param("b", &[4], DType::Float32);
        let err = d.lower_function(0, &func).unwrap_err();
        assert_eq!(
            err.kind,
            LowerErrorKind::ArityMismatch {
                name: "multiply_add".into(),
                kernel: KernelKind::ElementwiseMultiplyAdd,
                expected: 3,
                found: 2,
            }
        );
    }

    #[test]
    fn test_integer_data_rejected() {
        let d = Dispatcher::new(LowerOptions::default());
        let func = IrFunction::new("my_ts_mean")
            .param("data", &[3], DType::Int32)
            .param("window", &[1], DType::Int32);
        let err = d.lower_function(0, &func).unwrap_err();
        assert!(matches!(
            err.kind,
            LowerErrorKind::UnsupportedDtype { found: DType::Int32, .. }
        ));
    }

    #[test]
    fn test_mixed_element_types_rejected() {
        let d = Dispatcher::new(LowerOptions::default());
        let func = IrFunction::new("my_multi")
            .param("a", &[3], DType::Float32)
            .param("b", &[3], DType::Float64);
        let err = d.lower_function(0, &func).unwrap_err();
        assert!(matches!(err.kind, LowerErrorKind::MixedElementTypes { .. }));
    }

    #[test]
    fn test_float_window_is_allowed() {
        let d = Dispatcher::new(LowerOptions::default());
        let func = IrFunction::new("my_ts_mean")
            .param("data", &[10], DType::Float64)
            .param("window", &[1], DType::Float32);
        let f = d.lower_function(0, &func).unwrap();
        assert_eq!(f.elem, DType::Float64);
        assert!(f.source.contains("double raw_window = (double)DXTC_DATA(win, float)[0];"));
    }

    #[test]
    fn test_diagnostic_points_at_name() {
        let src = r#"{"items": [{"item": "function", "external_name": "nope", "params": []}]}"#;
        let module = IrModule::from_json(src).unwrap();
        let err = Dispatcher::new(LowerOptions::default())
            .lower_module(&module)
            .unwrap_err();
        let diag = err.to_diagnostic(Some(src));
        assert_eq!(&src[diag.span.range()], "\"nope\"");
        assert!(diag.help.is_some());
    }
}
