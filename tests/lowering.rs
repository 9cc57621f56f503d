//! End-to-end lowering: IR JSON in, C source and manifest out.

use dxtc::kir::{LowerErrorKind, ModulePackager, SourceDirPackager};
use dxtc::{lower, lower_json_silent, DType, IrFunction, IrModule, KernelKind, LowerOptions};

const MIXED_IR: &str = r#"{
  "items": [
    { "item": "function",
      "external_name": "tvmgen_default_my_multi_0",
      "kernel": "my_multi",
      "params": [
        { "name": "a", "shape": [2, 3], "dtype": "float32" },
        { "name": "b", "shape": [2], "dtype": "float32" }
      ] },
    { "item": "function",
      "external_name": "tvmgen_default_dxt_axis_0",
      "kernel": "dxt_axis",
      "params": [
        { "name": "data", "shape": ["?"], "dtype": "float64" },
        { "name": "window", "shape": [1], "dtype": "int64" }
      ] },
    { "item": "function",
      "external_name": "tvmgen_default_my_ts_mean_0",
      "kernel": "my_ts_mean",
      "params": [
        { "name": "data", "shape": [8], "dtype": "float32" },
        { "name": "window", "shape": [1], "dtype": "int32" }
      ] }
  ]
}"#;

#[test]
fn test_module_with_every_stateful_element_type() {
    let module = lower_json_silent(MIXED_IR, &LowerOptions::default()).unwrap();
    let kinds: Vec<KernelKind> = module.functions.iter().map(|f| f.kernel).collect();
    assert_eq!(
        kinds,
        vec![
            KernelKind::ElementwiseFusedMultiply,
            KernelKind::AxisRollingAggregate,
            KernelKind::TimeSeriesRollingMean,
        ]
    );
    let src = &module.source;
    assert!(src.contains("} dxtc_series_f32;"));
    assert!(src.contains("} dxtc_series_f64;"));
    assert!(src.contains("tvmgen_default_dxt_axis_0_state_window"));
    assert!(!src.contains("tvmgen_default_my_ts_mean_0_state_window"));
    assert!(src.contains("static dxtc_series_f32 tvmgen_default_my_ts_mean_0_state_series[1000];"));

    let first = src.find("int32_t tvmgen_default_my_multi_0(").unwrap();
    let second = src.find("int32_t tvmgen_default_dxt_axis_0(").unwrap();
    let third = src.find("int32_t tvmgen_default_my_ts_mean_0(").unwrap();
    assert!(first < second && second < third);
}

#[test]
fn test_lowering_is_deterministic() {
    let a = lower_json_silent(MIXED_IR, &LowerOptions::default()).unwrap();
    let b = lower_json_silent(MIXED_IR, &LowerOptions::default()).unwrap();
    assert_eq!(a.source, b.source);
    assert_eq!(a.manifest().source_hash, b.manifest().source_hash);

    let traced = LowerOptions {
        trace: true,
        ..LowerOptions::default()
    };
    let c = lower_json_silent(MIXED_IR, &traced).unwrap();
    assert_ne!(a.manifest().source_hash, c.manifest().source_hash);
}

#[test]
fn test_first_failure_aborts_module() {
    let module = IrModule::new()
        .with_function(
            IrFunction::new("fine")
                .with_kernel("multiply_add")
                .param("a", &[4], DType::Float32)
                .param("b", &[4], DType::Float32)
                .param("c", &[4], DType::Float32),
        )
        .with_function(IrFunction::new("conv2d_relu"))
        .with_function(IrFunction::new("bad name").with_kernel("my_multi"));
    let err = lower(&module, &LowerOptions::default()).unwrap_err();
    assert_eq!(err.index, 1);
    assert_eq!(
        err.kind,
        LowerErrorKind::UnmatchedKernel {
            name: "conv2d_relu".into(),
            tag: None
        }
    );
}

#[test]
fn test_duplicate_symbol_rejected() {
    let f = IrFunction::new("ts")
        .with_kernel("my_ts_mean")
        .param("data", &[4], DType::Float32)
        .param("window", &[1], DType::Int32);
    let module = IrModule::new().with_function(f.clone()).with_function(f);
    let err = lower(&module, &LowerOptions::default()).unwrap_err();
    assert_eq!(err.index, 1);
    assert!(matches!(err.kind, LowerErrorKind::DuplicateSymbol { .. }));
}

#[test]
fn test_empty_module_emits_prelude_only() {
    let module = lower(&IrModule::new(), &LowerOptions::default()).unwrap();
    assert!(module.functions.is_empty());
    assert!(module.source.contains("#include <pthread.h>"));
    assert!(!module.source.contains("dxtc_series_f32"));
}

#[test]
fn test_packaged_source_round_trips_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let module = lower_json_silent(MIXED_IR, &LowerOptions::default()).unwrap();
    let packaged = SourceDirPackager::new(dir.path(), "mixed")
        .package(&module)
        .unwrap();
    assert_eq!(std::fs::read_to_string(&packaged.source_path).unwrap(), module.source);

    let json = std::fs::read_to_string(&packaged.manifest_path).unwrap();
    let manifest = dxtc::kir::Manifest::from_json(&json).unwrap();
    assert_eq!(manifest, module.manifest());
    assert_eq!(manifest.functions.len(), 3);
}
