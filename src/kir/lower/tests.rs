use super::*;
use crate::ir::{DType, Param};
use crate::kir::{KernelKind, LowerOptions};
use crate::runtime::ExpandingPolicy;

fn emit_with(tag: &str, name: &str, params: &[Param], elem: DType, options: &LowerOptions) -> String {
    let lowering = create_kernel_lowering(tag).unwrap();
    let ctx = EmitContext {
        name,
        params,
        elem,
        options,
    };
    let mut w = CWriter::new();
    lowering.emit(&ctx, &mut w);
    w.finish()
}

fn rolling_params(window: DType) -> Vec<Param> {
    vec![
        Param::new("data", &[10], DType::Float32),
        Param::new("window", &[1], window),
    ]
}

#[test]
fn test_builtins_in_priority_order() {
    let registry = KernelRegistry::with_builtins();
    let tags: Vec<&str> = registry.tags().collect();
    assert_eq!(tags, vec!["my_multi", "dxt_axis", "my_ts_mean", "multiply_add"]);
    assert_eq!(registry.len(), 4);
    for (tag, lowering) in registry.iter() {
        assert_eq!(lowering.kind().tag(), tag);
        assert_eq!(lowering.operands().len(), lowering.kind().arity());
    }
}

#[test]
fn test_exact_lookup() {
    let registry = KernelRegistry::with_builtins();
    assert_eq!(
        registry.lookup("dxt_axis").map(|l| l.kind()),
        Some(KernelKind::AxisRollingAggregate)
    );
    assert!(registry.lookup("tvmgen_default_dxt_axis_0").is_none());
    assert!(registry.lookup("").is_none());
}

#[test]
fn test_substring_lookup_uses_registration_order() {
    let registry = KernelRegistry::with_builtins();
    let (tag, lowering) = registry
        .lookup_substring("tvmgen_default_my_ts_mean_0")
        .unwrap();
    assert_eq!(tag, "my_ts_mean");
    assert_eq!(lowering.kind(), KernelKind::TimeSeriesRollingMean);

    // `my_multiply_add` contains both `my_multi` and `multiply_add`.
    let (tag, _) = registry.lookup_substring("my_multiply_add").unwrap();
    assert_eq!(tag, "my_multi");

    assert!(registry.lookup_substring("conv2d_relu").is_none());
}

#[test]
fn test_duplicate_register_keeps_first() {
    let mut registry = KernelRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.register("mean", Box::new(TsMeanLowering)));
    assert!(!registry.register("mean", Box::new(AxisRollingLowering)));
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.lookup("mean").map(|l| l.kind()),
        Some(KernelKind::TimeSeriesRollingMean)
    );
}

#[test]
fn test_unknown_tag_has_no_lowering() {
    assert!(create_kernel_lowering("ts_median").is_none());
}

#[test]
fn test_multiply_add_body() {
    let params = vec![
        Param::new("a", &[4], DType::Float64),
        Param::new("b", &[4], DType::Float64),
        Param::new("c", &[4], DType::Float64),
    ];
    let src = emit_with("multiply_add", "fma0", &params, DType::Float64, &LowerOptions::default());
    assert!(src.starts_with("TVM_DLL int32_t fma0(TVMValue* args"));
    assert!(src.contains("if (num_args != 4) {"));
    assert!(src.contains("DLTensor* c = (DLTensor*)args[2].v_handle;"));
    assert!(src.contains("DLTensor* out = (DLTensor*)args[3].v_handle;"));
    assert!(src.contains("if (!dxtc_has_dtype(out, kDLFloat, 64)) {"));
    assert!(src.contains("po[i] = pa[i] * pb[i] + pc[i];"));
    assert!(!src.contains("pthread_mutex"));
    assert!(!src.contains("DXTC_TRACE"));
}

#[test]
fn test_shape_checks_precede_writes() {
    let params = vec![
        Param::new("a", &[4], DType::Float32),
        Param::new("b", &[4], DType::Float32),
        Param::new("c", &[4], DType::Float32),
    ];
    let src = emit_with("multiply_add", "fma0", &params, DType::Float32, &LowerOptions::default());
    let last_check = src.rfind("DXTC_ERR_SHAPE_MISMATCH").unwrap();
    let first_write = src.find("po[i] =").unwrap();
    assert!(last_check < first_write);
}

#[test]
fn test_fused_multiply_scales_rows() {
    let params = vec![
        Param::new("a", &[2, 3], DType::Float32),
        Param::new("b", &[2], DType::Float32),
    ];
    let src = emit_with("my_multi", "my_multi", &params, DType::Float32, &LowerOptions::default());
    assert!(src.contains("if (num_args != 3) {"));
    assert!(src.contains("if (b->ndim != 1 || b->shape[0] != a->shape[0]) {"));
    assert!(src.contains("po[i] = pa[i] * pb[r];"));
}

#[test]
fn test_ts_mean_reads_window_every_call() {
    let params = rolling_params(DType::Int32);
    let src = emit_with("my_ts_mean", "ts0", &params, DType::Float32, &LowerOptions::default());
    assert!(src.starts_with("static dxtc_series_f32 ts0_state_series[1000];"));
    assert!(src.contains("static pthread_mutex_t ts0_state_lock = PTHREAD_MUTEX_INITIALIZER;"));
    assert!(!src.contains("ts0_state_window"));
    assert!(src.contains("int64_t window = (int64_t)DXTC_DATA(win, int32_t)[0];"));
    assert!(src.contains("if (window <= 0) {"));
    assert!(src.contains("dst[i] = dxtc_series_f32_update(&ts0_state_series[i], src[i]);"));
    // The window is validated before the lock is taken.
    assert!(src.find("DXTC_ERR_INVALID_WINDOW").unwrap() < src.find("pthread_mutex_lock").unwrap());
}

#[test]
fn test_axis_rolling_shares_first_window() {
    let params = rolling_params(DType::Int64);
    let src = emit_with("dxt_axis", "ax0", &params, DType::Float32, &LowerOptions::default());
    assert!(src.contains("static int64_t ax0_state_window = 0;"));
    assert!(src.contains("int64_t window = ax0_state_window;"));
    assert!(src.contains("if (window == 0) {"));
    assert!(src.contains("window = requested;"));
    // The shared window is committed after the allocation pass.
    let commit = src.find("ax0_state_window = window;").unwrap();
    assert!(commit > src.find("DXTC_ERR_ALLOCATION").unwrap());
    assert!(commit < src.find("dst[i] = dxtc_series_f32_update").unwrap());
    // A bad window read under the lock releases it before failing.
    let invalid = src.find("DXTC_ERR_INVALID_WINDOW").unwrap();
    let unlock = src[..invalid].rfind("pthread_mutex_unlock(&ax0_state_lock);").unwrap();
    assert!(unlock > src.find("pthread_mutex_lock(&ax0_state_lock);").unwrap());
}

#[test]
fn test_float_window_uses_guard() {
    let params = rolling_params(DType::Float32);
    let src = emit_with("my_ts_mean", "ts0", &params, DType::Float32, &LowerOptions::default());
    assert!(src.contains("double raw_window = (double)DXTC_DATA(win, float)[0];"));
    assert!(src.contains("if (!(raw_window >= 1.0)) {"));
    assert!(src.contains("int64_t window = (int64_t)raw_window;"));
}

#[test]
fn test_series_limit_comes_from_options() {
    let options = LowerOptions {
        max_series: 16,
        ..LowerOptions::default()
    };
    let params = rolling_params(DType::Int32);
    let src = emit_with("my_ts_mean", "ts0", &params, DType::Float32, &options);
    assert!(src.contains("static dxtc_series_f32 ts0_state_series[16];"));
    assert!(src.contains("if (n > 16) {"));
    assert!(src.contains("DXTC_ERR_SERIES_LIMIT"));
}

#[test]
fn test_allocation_pass_before_update_loop() {
    let params = rolling_params(DType::Int32);
    let src = emit_with("my_ts_mean", "ts0", &params, DType::Float32, &LowerOptions::default());
    let alloc = src.find("DXTC_ERR_ALLOCATION").unwrap();
    let update = src.find("dst[i] =").unwrap();
    assert!(alloc < update);
}

#[test]
fn test_trace_calls_only_when_enabled() {
    let params = rolling_params(DType::Int32);
    let quiet = emit_with("my_ts_mean", "ts0", &params, DType::Float32, &LowerOptions::default());
    assert!(!quiet.contains("DXTC_TRACE"));

    let options = LowerOptions {
        trace: true,
        expanding: ExpandingPolicy::Missing,
        ..LowerOptions::default()
    };
    let traced = emit_with("my_ts_mean", "ts0", &params, DType::Float32, &options);
    assert!(traced.contains("DXTC_TRACE(\"ts0: called with %d arguments\\n\", num_args);"));
    assert!(traced.contains("keeps window"));
}
