//! Stateful rolling-mean kernels built on the streaming series engine.
//!
//! Both kernels feed element `i` of `data` into series `i` and write the
//! series' current mean to `out[i]`. They differ only in where the window
//! comes from:
//! - `dxt_axis`: read once, on the first call, and shared by every series.
//! - `my_ts_mean`: read on every call; a series keeps the window it was
//!   created with.
//!
//! Each entry point owns a file-local series table and a mutex held for
//! the whole call.

use super::{KernelLowering, Operand};
use crate::ir::DType;
use crate::kir::abi::Status;
use crate::kir::emit::{
    bind_tensor, check_dtype, check_same_shape, close_entry, fail, open_entry, series_type,
};
use crate::kir::emit::{CWriter, EmitContext};
use crate::kir::KernelKind;

pub struct AxisRollingLowering;

impl KernelLowering for AxisRollingLowering {
    fn kind(&self) -> KernelKind {
        KernelKind::AxisRollingAggregate
    }

    fn operands(&self) -> &'static [Operand] {
        &[Operand::Data, Operand::Window]
    }

    fn emit(&self, ctx: &EmitContext<'_>, w: &mut CWriter) {
        emit_rolling(ctx, w, WindowSource::Shared);
    }
}

pub struct TsMeanLowering;

impl KernelLowering for TsMeanLowering {
    fn kind(&self) -> KernelKind {
        KernelKind::TimeSeriesRollingMean
    }

    fn operands(&self) -> &'static [Operand] {
        &[Operand::Data, Operand::Window]
    }

    fn emit(&self, ctx: &EmitContext<'_>, w: &mut CWriter) {
        emit_rolling(ctx, w, WindowSource::PerCall);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WindowSource {
    Shared,
    PerCall,
}

fn emit_rolling(ctx: &EmitContext<'_>, w: &mut CWriter, source: WindowSource) {
    let t = ctx.elem.c_type();
    let series = series_type(ctx.elem);
    let prefix = ctx.state_prefix();
    let table = format!("{}_series", prefix);
    let lock = format!("{}_lock", prefix);
    let shared = format!("{}_window", prefix);
    let window_dtype = ctx.param_dtype(1);
    let max_series = ctx.options.max_series;

    w.line(format!("static {} {}[{}];", series, table, max_series));
    if source == WindowSource::Shared {
        w.line(format!("static int64_t {} = 0;", shared));
    }
    w.line(format!(
        "static pthread_mutex_t {} = PTHREAD_MUTEX_INITIALIZER;",
        lock
    ));
    w.blank();

    open_entry(w, ctx, 2);
    bind_tensor(w, "data", 0);
    bind_tensor(w, "win", 1);
    bind_tensor(w, "out", 2);
    check_dtype(w, ctx, "data", ctx.elem);
    check_dtype(w, ctx, "out", ctx.elem);
    check_dtype(w, ctx, "win", window_dtype);
    check_same_shape(w, ctx, "data", "out");
    w.line("int64_t n = dxtc_numel(data);");
    w.open(format!("if (n > {})", max_series));
    fail(
        w,
        ctx,
        Status::SeriesLimitExceeded,
        &format!("more series than the table holds ({})", max_series),
    );
    w.close();

    match source {
        WindowSource::PerCall => {
            emit_read_window(w, ctx, window_dtype, "window", None);
            w.line(format!("pthread_mutex_lock(&{});", lock));
        }
        WindowSource::Shared => {
            w.line(format!("pthread_mutex_lock(&{});", lock));
            w.line(format!("int64_t window = {};", shared));
            w.open("if (window == 0)");
            emit_read_window(w, ctx, window_dtype, "requested", Some(&lock));
            w.line("window = requested;");
            w.close();
        }
    }

    w.line(format!("const {t}* src = DXTC_DATA(data, {t});"));
    w.line(format!("{t}* dst = DXTC_DATA(out, {t});"));
    // Allocate every series first so a failure leaves `out` untouched.
    w.open("for (int64_t i = 0; i < n; ++i)");
    w.open(format!(
        "if ({table}[i].window == 0 && {series}_init(&{table}[i], window) != {})",
        Status::Ok.c_name()
    ));
    w.line(format!("pthread_mutex_unlock(&{});", lock));
    fail(w, ctx, Status::AllocationFailed, "cannot allocate series buffer");
    w.close();
    w.close();
    if source == WindowSource::Shared {
        // Fixed only once every series of the call has its buffer.
        w.line(format!("{} = window;", shared));
    }
    w.open("for (int64_t i = 0; i < n; ++i)");
    if ctx.options.trace && source == WindowSource::PerCall {
        w.open(format!("if ({table}[i].window != window)"));
        w.line(format!(
            "DXTC_TRACE(\"{}: series %lld keeps window %lld\\n\", (long long)i, (long long){table}[i].window);",
            ctx.name
        ));
        w.close();
    }
    w.line(format!("dst[i] = {series}_update(&{table}[i], src[i]);"));
    if ctx.options.trace {
        w.line(format!(
            "DXTC_TRACE(\"{}: series %lld -> %f\\n\", (long long)i, (double)dst[i]);",
            ctx.name
        ));
    }
    w.close();
    w.line(format!("pthread_mutex_unlock(&{});", lock));
    close_entry(w);
}

/// Read the window scalar from `win` into a new `int64_t` named `var`,
/// rejecting empty tensors and windows below one. `unlock` names a mutex
/// to release before failing.
fn emit_read_window(
    w: &mut CWriter,
    ctx: &EmitContext<'_>,
    dtype: DType,
    var: &str,
    unlock: Option<&str>,
) {
    let release = |w: &mut CWriter| {
        if let Some(lock) = unlock {
            w.line(format!("pthread_mutex_unlock(&{});", lock));
        }
    };

    w.open("if (dxtc_numel(win) < 1)");
    release(w);
    fail(w, ctx, Status::ShapeMismatch, "'win' must hold one element");
    w.close();

    if dtype.is_float() {
        w.line(format!(
            "double raw_{var} = (double)DXTC_DATA(win, {})[0];",
            dtype.c_type()
        ));
        w.open(format!("if (!(raw_{var} >= 1.0))"));
        release(w);
        fail(w, ctx, Status::InvalidWindow, "window must be positive");
        w.close();
        w.line(format!("int64_t {var} = (int64_t)raw_{var};"));
    } else {
        w.line(format!(
            "int64_t {var} = (int64_t)DXTC_DATA(win, {})[0];",
            dtype.c_type()
        ));
        w.open(format!("if ({var} <= 0)"));
        release(w);
        fail(w, ctx, Status::InvalidWindow, "window must be positive");
        w.close();
    }
}
