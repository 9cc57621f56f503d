//! Kernel bodies, executed in Rust.
//!
//! Each function checks its operands in the same order as the emitted C
//! entry point and only writes `out` once every check has passed.

use super::error::KernelError;
use super::registry::{SeriesRegistry, SeriesTable};
use super::series::SeriesElement;
use super::tensor::{Element, Tensor, TensorData};
use crate::ir::DType;

/// Float types a kernel can compute in.
pub trait FloatElement: SeriesElement + Element {}

impl FloatElement for f32 {}
impl FloatElement for f64 {}

// ─── Checks ────────────────────────────────────────────────────────

fn check_dtype(index: usize, tensor: &Tensor, elem: DType) -> Result<(), KernelError> {
    if tensor.dtype() != elem {
        return Err(KernelError::dtype(index, elem, tensor.dtype()));
    }
    Ok(())
}

fn check_shape(index: usize, tensor: &Tensor, expected: &[usize]) -> Result<(), KernelError> {
    if tensor.shape() != expected {
        return Err(KernelError::shape(index, expected, tensor.shape()));
    }
    Ok(())
}

fn typed<T: Element>(index: usize, tensor: &Tensor) -> Result<&[T], KernelError> {
    tensor
        .as_slice::<T>()
        .ok_or_else(|| KernelError::dtype(index, T::DTYPE, tensor.dtype()))
}

fn typed_mut<T: Element>(index: usize, tensor: &mut Tensor) -> Result<&mut [T], KernelError> {
    let found = tensor.dtype();
    tensor
        .as_mut_slice::<T>()
        .ok_or_else(|| KernelError::dtype(index, T::DTYPE, found))
}

/// Read a window size from the first element of `win`.
///
/// Integer windows must be positive. Float windows must be at least 1
/// (NaN is rejected) and are truncated toward zero.
pub fn read_window(index: usize, win: &Tensor) -> Result<usize, KernelError> {
    if win.is_empty() {
        return Err(KernelError::shape(index, &[1], win.shape()));
    }
    let window = match win.data() {
        TensorData::I32(v) => i64::from(v[0]),
        TensorData::I64(v) => v[0],
        TensorData::F32(v) => truncate_window(f64::from(v[0]))?,
        TensorData::F64(v) => truncate_window(v[0])?,
    };
    if window <= 0 {
        return Err(KernelError::InvalidWindow { window });
    }
    usize::try_from(window).map_err(|_| KernelError::InvalidWindow { window })
}

fn truncate_window(raw: f64) -> Result<i64, KernelError> {
    if !(raw >= 1.0) {
        // `as` saturates and maps NaN to 0.
        return Err(KernelError::InvalidWindow { window: raw as i64 });
    }
    Ok(raw as i64)
}

// ─── Elementwise kernels ───────────────────────────────────────────

/// `out[i] = a[i] * b[i] + c[i]`.
pub fn multiply_add(
    elem: DType,
    a: &Tensor,
    b: &Tensor,
    c: &Tensor,
    out: &mut Tensor,
) -> Result<(), KernelError> {
    check_dtype(0, a, elem)?;
    check_dtype(1, b, elem)?;
    check_dtype(2, c, elem)?;
    check_dtype(3, out, elem)?;
    check_shape(1, b, a.shape())?;
    check_shape(2, c, a.shape())?;
    check_shape(3, out, a.shape())?;
    match elem {
        DType::Float32 => multiply_add_typed::<f32>(a, b, c, out),
        DType::Float64 => multiply_add_typed::<f64>(a, b, c, out),
        other => Err(KernelError::dtype(0, DType::Float32, other)),
    }
}

fn multiply_add_typed<T: FloatElement>(
    a: &Tensor,
    b: &Tensor,
    c: &Tensor,
    out: &mut Tensor,
) -> Result<(), KernelError> {
    let (pa, pb, pc) = (typed::<T>(0, a)?, typed::<T>(1, b)?, typed::<T>(2, c)?);
    let po = typed_mut::<T>(3, out)?;
    for (i, o) in po.iter_mut().enumerate() {
        *o = pa[i] * pb[i] + pc[i];
    }
    Ok(())
}

/// `out = a * b` with `b[r]` scaling leading-axis row `r` of `a`.
pub fn fused_multiply(
    elem: DType,
    a: &Tensor,
    b: &Tensor,
    out: &mut Tensor,
) -> Result<(), KernelError> {
    check_dtype(0, a, elem)?;
    check_dtype(1, b, elem)?;
    check_dtype(2, out, elem)?;
    let rows = match a.shape().first() {
        Some(&rows) => rows,
        None => return Err(KernelError::shape(0, &[1], a.shape())),
    };
    check_shape(1, b, &[rows])?;
    check_shape(2, out, a.shape())?;
    match elem {
        DType::Float32 => fused_multiply_typed::<f32>(rows, a, b, out),
        DType::Float64 => fused_multiply_typed::<f64>(rows, a, b, out),
        other => Err(KernelError::dtype(0, DType::Float32, other)),
    }
}

fn fused_multiply_typed<T: FloatElement>(
    rows: usize,
    a: &Tensor,
    b: &Tensor,
    out: &mut Tensor,
) -> Result<(), KernelError> {
    let (pa, pb) = (typed::<T>(0, a)?, typed::<T>(1, b)?);
    let po = typed_mut::<T>(2, out)?;
    if rows == 0 {
        return Ok(());
    }
    let inner = pa.len() / rows;
    for (i, o) in po.iter_mut().enumerate() {
        *o = pa[i] * pb[i / inner.max(1)];
    }
    Ok(())
}

// ─── Rolling kernels ───────────────────────────────────────────────

/// Feed element `i` of `data` into series `i` of `table` and write each
/// series' statistic to `out[i]`. `window_dtype` is the declared dtype of
/// the window tensor; `None` accepts any dtype.
pub fn rolling_mean(
    table: &SeriesTable,
    window_dtype: Option<DType>,
    data: &Tensor,
    win: &Tensor,
    out: &mut Tensor,
) -> Result<(), KernelError> {
    let elem = table.elem();
    check_dtype(0, data, elem)?;
    check_dtype(2, out, elem)?;
    if let Some(dtype) = window_dtype {
        check_dtype(1, win, dtype)?;
    }
    check_shape(2, out, data.shape())?;
    match table {
        SeriesTable::F32(reg) => feed(reg, data, win, out),
        SeriesTable::F64(reg) => feed(reg, data, win, out),
    }
}

fn feed<T: FloatElement>(
    reg: &SeriesRegistry<T>,
    data: &Tensor,
    win: &Tensor,
    out: &mut Tensor,
) -> Result<(), KernelError> {
    reg.check_batch(data.len())?;
    let window = match reg.shared_window() {
        Some(window) => window,
        None => read_window(1, win)?,
    };
    reg.prepare(data.len(), window)?;
    let window = reg.resolve_window(window);
    let src = typed::<T>(0, data)?;
    let dst = typed_mut::<T>(2, out)?;
    for (i, (o, &v)) in dst.iter_mut().zip(src).enumerate() {
        *o = reg.update(i, window, v)?;
    }
    Ok(())
}
