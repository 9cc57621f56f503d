//! Owned dense tensors for the reference runtime.
//!
//! A `Tensor` is the Rust stand-in for a `DLTensor` slot: a shape plus a
//! contiguous row-major buffer of one element type.

use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::DType;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("shape {shape:?} holds {expected} elements, got {found}")]
    Shape {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },
    #[error("shape {shape:?} has more elements than can be addressed")]
    Overflow { shape: Vec<usize> },
    #[error("element {index} of an {dtype} tensor is null")]
    MissingInteger { index: usize, dtype: DType },
    #[error("element {index} ({value}) is not representable as {dtype}")]
    NotAnInteger { index: usize, dtype: DType, value: f64 },
}

/// Buffer of one element type.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Scalar types a tensor can hold.
pub trait Element: Copy + Default + std::fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn wrap(data: Vec<Self>) -> TensorData;
    fn slice(data: &TensorData) -> Option<&[Self]>;
    fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]>;
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn wrap(data: Vec<Self>) -> TensorData {
                TensorData::$variant(data)
            }

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_element!(f32, F32, DType::Float32);
impl_element!(f64, F64, DType::Float64);
impl_element!(i32, I32, DType::Int32);
impl_element!(i64, I64, DType::Int64);

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::Float32,
            TensorData::F64(_) => DType::Float64,
            TensorData::I32(_) => DType::Int32,
            TensorData::I64(_) => DType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn zeros(dtype: DType, len: usize) -> TensorData {
        match dtype {
            DType::Float32 => TensorData::F32(vec![0.0; len]),
            DType::Float64 => TensorData::F64(vec![0.0; len]),
            DType::Int32 => TensorData::I32(vec![0; len]),
            DType::Int64 => TensorData::I64(vec![0; len]),
        }
    }

    fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TensorData::F32(v) => v.iter().map(|x| x.to_f64()).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::I32(v) => v.iter().map(|x| x.to_f64()).collect(),
            TensorData::I64(v) => v.iter().map(|x| x.to_f64()).collect(),
        }
    }
}

/// Dense row-major tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Rank-1 tensor over `data`.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            data: T::wrap(data),
        }
    }

    pub fn with_shape<T: Element>(shape: &[usize], data: Vec<T>) -> Result<Self, TensorError> {
        let expected = numel(shape).ok_or_else(|| TensorError::Overflow {
            shape: shape.to_vec(),
        })?;
        if expected != data.len() {
            return Err(TensorError::Shape {
                shape: shape.to_vec(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: T::wrap(data),
        })
    }

    /// One-element tensor, e.g. a window size.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self::from_vec(vec![value])
    }

    /// Zero-filled tensor. `shape` must describe an allocatable tensor,
    /// e.g. the shape of an existing one.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: TensorData::zeros(dtype, numel(shape).unwrap_or(0)),
        }
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(&mut self.data)
    }

    /// Every element widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.to_f64_vec()
    }
}

/// Element count of `shape`, or `None` if it overflows `usize`.
fn numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
}

// ─── JSON form ─────────────────────────────────────────────────────

/// JSON description of a tensor. `null` elements are NaN; `shape`
/// defaults to rank 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    pub data: Vec<Option<f64>>,
}

impl TensorSpec {
    pub fn to_tensor(&self) -> Result<Tensor, TensorError> {
        let shape = self
            .shape
            .clone()
            .unwrap_or_else(|| vec![self.data.len()]);
        let float = |v: &Option<f64>| v.unwrap_or(f64::NAN);
        let present = |i: usize, v: &Option<f64>| {
            v.ok_or(TensorError::MissingInteger {
                index: i,
                dtype: self.dtype,
            })
        };
        match self.dtype {
            DType::Float32 => {
                Tensor::with_shape(&shape, self.data.iter().map(|v| float(v) as f32).collect::<Vec<f32>>())
            }
            DType::Float64 => Tensor::with_shape(&shape, self.data.iter().map(float).collect::<Vec<f64>>()),
            DType::Int32 => {
                let data = self
                    .data
                    .iter()
                    .enumerate()
                    .map(|(i, v)| integral::<i32>(i, self.dtype, present(i, v)?))
                    .collect::<Result<Vec<_>, _>>()?;
                Tensor::with_shape(&shape, data)
            }
            DType::Int64 => {
                let data = self
                    .data
                    .iter()
                    .enumerate()
                    .map(|(i, v)| integral::<i64>(i, self.dtype, present(i, v)?))
                    .collect::<Result<Vec<_>, _>>()?;
                Tensor::with_shape(&shape, data)
            }
        }
    }

    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self {
            dtype: tensor.dtype(),
            shape: Some(tensor.shape().to_vec()),
            data: tensor
                .to_f64_vec()
                .into_iter()
                .map(|x| if x.is_nan() { None } else { Some(x) })
                .collect(),
        }
    }
}

/// `value` as an integer of type `I`, rejecting fractions and values out
/// of range.
fn integral<I: NumCast>(index: usize, dtype: DType, value: f64) -> Result<I, TensorError> {
    let exact = if value.fract() == 0.0 {
        num_traits::cast::<f64, I>(value)
    } else {
        None
    };
    exact.ok_or(TensorError::NotAnInteger {
        index,
        dtype,
        value,
    })
}
