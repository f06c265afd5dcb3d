//! Buffer codecs and launch plumbing shared by the kernels
//!
//! Kernels compute on `ArrayD<f64>` (or `ArrayD<Complex64>`) lanes decoded
//! from device bytes and encode their result into the output dtype. Bool and
//! integer dtypes get `ArrayD<i128>` lanes instead, which hold every int64 and
//! uint64 value exactly and wrap to the output width on store.

use crate::array::NdArray;
use crate::context::Context;
use ndarray::{ArrayD, IxDyn};
use npuarray_core::{Array, DType, NpuError, Result};
use num_complex::Complex64;
use rayon::prelude::*;

/// Element count from which kernels run on the rayon pool
pub(crate) const PAR_THRESHOLD: usize = 1 << 14;

/// Decoded operand lanes
#[derive(Debug, Clone)]
pub(crate) enum Values {
    Real(ArrayD<f64>),
    Complex(ArrayD<Complex64>),
}

impl Values {
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Real(a) => a.shape(),
            Values::Complex(a) => a.shape(),
        }
    }

    pub fn into_complex(self) -> ArrayD<Complex64> {
        match self {
            Values::Real(a) => a.mapv(|v| Complex64::new(v, 0.0)),
            Values::Complex(a) => a,
        }
    }
}

/// Empty host vector with room for `len` items
///
/// Host exhaustion surfaces as a device error instead of aborting.
pub(crate) fn host_vec<T>(len: usize) -> Result<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|e| NpuError::Device(format!("cannot stage {len} elements on the host: {e}")))?;
    Ok(out)
}

fn shaped<T>(shape: &[usize], data: Vec<T>) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| NpuError::InvalidShape(e.to_string()))
}

pub(crate) fn decode_real(bytes: &[u8], dtype: DType, shape: &[usize]) -> Result<ArrayD<f64>> {
    let item = dtype.itemsize();
    let data: Vec<f64> = if bytes.len() >= PAR_THRESHOLD * item {
        bytes.par_chunks_exact(item).map(|c| dtype.read_f64(c)).collect()
    } else {
        bytes.chunks_exact(item).map(|c| dtype.read_f64(c)).collect()
    };
    shaped(shape, data)
}

pub(crate) fn decode_complex(
    bytes: &[u8],
    dtype: DType,
    shape: &[usize],
) -> Result<ArrayD<Complex64>> {
    let item = dtype.itemsize();
    let data: Vec<Complex64> = bytes
        .chunks_exact(item)
        .map(|c| dtype.read_complex(c))
        .collect();
    shaped(shape, data)
}

pub(crate) fn encode_real(data: &ArrayD<f64>, dtype: DType) -> Vec<u8> {
    let item = dtype.itemsize();
    let mut out = vec![0u8; data.len() * item];
    let standard = data.as_standard_layout();
    match standard.as_slice() {
        Some(values) if values.len() >= PAR_THRESHOLD => out
            .par_chunks_mut(item)
            .zip(values.par_iter())
            .for_each(|(chunk, &v)| dtype.write_f64(v, chunk)),
        _ => {
            for (chunk, &v) in out.chunks_mut(item).zip(standard.iter()) {
                dtype.write_f64(v, chunk);
            }
        }
    }
    out
}

pub(crate) fn decode_int(bytes: &[u8], dtype: DType, shape: &[usize]) -> Result<ArrayD<i128>> {
    let item = dtype.itemsize();
    let data: Vec<i128> = if bytes.len() >= PAR_THRESHOLD * item {
        bytes.par_chunks_exact(item).map(|c| dtype.read_int(c)).collect()
    } else {
        bytes.chunks_exact(item).map(|c| dtype.read_int(c)).collect()
    };
    shaped(shape, data)
}

pub(crate) fn encode_int(data: &ArrayD<i128>, dtype: DType) -> Vec<u8> {
    let item = dtype.itemsize();
    let mut out = vec![0u8; data.len() * item];
    for (chunk, &v) in out.chunks_mut(item).zip(data.iter()) {
        dtype.write_int(v, chunk);
    }
    out
}

pub(crate) fn encode_complex(data: &ArrayD<Complex64>, dtype: DType) -> Vec<u8> {
    let item = dtype.itemsize();
    let mut out = vec![0u8; data.len() * item];
    for (chunk, &v) in out.chunks_mut(item).zip(data.iter()) {
        dtype.write_complex(v, chunk);
    }
    out
}

pub(crate) fn load_real(arr: &NdArray) -> Result<ArrayD<f64>> {
    let (dtype, shape) = (arr.dtype(), arr.shape());
    arr.read(|bytes| decode_real(bytes, dtype, shape))?
}

pub(crate) fn load_complex(arr: &NdArray) -> Result<ArrayD<Complex64>> {
    let (dtype, shape) = (arr.dtype(), arr.shape());
    arr.read(|bytes| decode_complex(bytes, dtype, shape))?
}

pub(crate) fn load_int(arr: &NdArray) -> Result<ArrayD<i128>> {
    let (dtype, shape) = (arr.dtype(), arr.shape());
    arr.read(|bytes| decode_int(bytes, dtype, shape))?
}

/// Whether values of `dtype` compute on integer lanes
pub(crate) fn is_exact(dtype: DType) -> bool {
    dtype.is_integer() || dtype.is_bool()
}

/// Decode in the lane type the dtype needs
pub(crate) fn load(arr: &NdArray) -> Result<Values> {
    if arr.dtype().is_complex() {
        Ok(Values::Complex(load_complex(arr)?))
    } else {
        Ok(Values::Real(load_real(arr)?))
    }
}

pub(crate) fn store_real(
    ctx: &Context,
    device: u32,
    data: &ArrayD<f64>,
    dtype: DType,
) -> Result<NdArray> {
    let bytes = encode_real(data, dtype);
    NdArray::from_bytes_on(ctx, device, data.shape().to_vec(), dtype, bytes)
}

pub(crate) fn store_int(
    ctx: &Context,
    device: u32,
    data: &ArrayD<i128>,
    dtype: DType,
) -> Result<NdArray> {
    let bytes = encode_int(data, dtype);
    NdArray::from_bytes_on(ctx, device, data.shape().to_vec(), dtype, bytes)
}

pub(crate) fn store_complex(
    ctx: &Context,
    device: u32,
    data: &ArrayD<Complex64>,
    dtype: DType,
) -> Result<NdArray> {
    let bytes = encode_complex(data, dtype);
    NdArray::from_bytes_on(ctx, device, data.shape().to_vec(), dtype, bytes)
}

pub(crate) fn store(ctx: &Context, device: u32, values: &Values, dtype: DType) -> Result<NdArray> {
    match values {
        Values::Real(data) => store_real(ctx, device, data, dtype),
        Values::Complex(data) => store_complex(ctx, device, data, dtype),
    }
}

/// Context and device for the output of an op over `operands`
///
/// The output lives on the first operand's device; every operand must be
/// live and on that device.
pub(crate) fn placement(operands: &[&NdArray]) -> Result<(Context, u32)> {
    let first = operands
        .first()
        .ok_or_else(|| NpuError::InvalidArgument("operation needs at least one operand".into()))?;
    first.check_live()?;
    for other in &operands[1..] {
        other.check_live()?;
        if !other.context().same(first.context()) {
            return Err(NpuError::Device(
                "operands belong to different device contexts".into(),
            ));
        }
        if other.device() != first.device() {
            return Err(NpuError::DeviceMismatch(first.device(), other.device()));
        }
    }
    Ok((first.context().clone(), first.device()))
}

/// Record a launch of `kernel` over `elements` outputs
pub(crate) fn launch(ctx: &Context, kernel: &str, elements: usize) {
    ctx.record_launch(kernel, elements);
}
