//! Device-resident N-dimensional array and host interchange buffers

use crate::allocator::DeviceBuffer;
use crate::context::Context;
use crate::kernel::{self, Values};
use ndarray::{ArrayD, IxDyn};
use npuarray_core::{Array, ArrayMeta, DType, NpuError, Result, ScalarValue};
use num_complex::{Complex32, Complex64};

/// Host-side array: signed dims, a dtype and raw little-endian bytes
#[derive(Debug, Clone, PartialEq)]
pub struct HostBuffer {
    pub dims: Vec<i64>,
    pub dtype: DType,
    pub bytes: Vec<u8>,
}

impl HostBuffer {
    pub fn new(dims: Vec<i64>, dtype: DType, bytes: Vec<u8>) -> Self {
        Self { dims, dtype, bytes }
    }

    /// Encode `values` into `dtype`
    pub fn from_f64(shape: &[usize], dtype: DType, values: &[f64]) -> Self {
        let data = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec())
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0])));
        Self {
            dims: shape.iter().map(|&d| d as i64).collect(),
            dtype,
            bytes: kernel::encode_real(&data, dtype),
        }
    }

    /// Validated shape; negative dims are rejected
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.dims
            .iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| {
                    NpuError::InvalidShape(format!(
                        "negative dimensions are not allowed: {:?}",
                        self.dims
                    ))
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.dtype.itemsize()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.bytes
            .chunks_exact(self.dtype.itemsize())
            .map(|c| self.dtype.read_f64(c))
            .collect()
    }

    pub fn to_complex_vec(&self) -> Vec<Complex64> {
        self.bytes
            .chunks_exact(self.dtype.itemsize())
            .map(|c| self.dtype.read_complex(c))
            .collect()
    }
}

pub(crate) fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NpuError::InvalidShape(format!("shape {shape:?} overflows")))
}

/// Bytes a `shape` array of `dtype` occupies
pub(crate) fn byte_len(shape: &[usize], dtype: DType) -> Result<usize> {
    element_count(shape)?
        .checked_mul(dtype.itemsize())
        .ok_or_else(|| NpuError::InvalidShape(format!("shape {shape:?} of {dtype} overflows")))
}

/// Device-resident N-dimensional array
///
/// The buffer is exclusively owned; every operation returns a new array.
pub struct NdArray {
    meta: ArrayMeta,
    buffer: DeviceBuffer,
}

impl NdArray {
    /// Wrap `bytes` in a new buffer on `device`
    pub(crate) fn from_bytes_on(
        ctx: &Context,
        device: u32,
        shape: Vec<usize>,
        dtype: DType,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let expected = byte_len(&shape, dtype)?;
        if bytes.len() != expected {
            return Err(NpuError::InvalidShape(format!(
                "buffer of {} bytes does not match shape {:?} of {} ({} bytes)",
                bytes.len(),
                shape,
                dtype,
                expected
            )));
        }
        let buffer = ctx.allocate_on(device, bytes)?;
        let meta = ArrayMeta::new(shape, dtype, device);
        Ok(Self { meta, buffer })
    }

    /// Wrap `bytes` in a new buffer on the active device
    pub(crate) fn from_bytes(
        ctx: &Context,
        shape: Vec<usize>,
        dtype: DType,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let device = ctx.current_device()?;
        Self::from_bytes_on(ctx, device, shape, dtype, bytes)
    }

    /// Validate a host buffer and copy it to the active device
    pub fn from_host(ctx: &Context, host: &HostBuffer) -> Result<Self> {
        let shape = host.shape()?;
        let dtype = ctx.resolve_dtype(host.dtype)?;
        Self::from_bytes(ctx, shape, dtype, host.bytes.clone())
    }

    /// Encode `data` into `dtype` on the active device
    pub fn from_f64(ctx: &Context, shape: &[usize], data: &[f64], dtype: DType) -> Result<Self> {
        let dtype = ctx.resolve_dtype(dtype)?;
        let expected = element_count(shape)?;
        if data.len() != expected {
            return Err(NpuError::InvalidShape(format!(
                "Data length {} doesn't match shape {:?} (expected {})",
                data.len(),
                shape,
                expected
            )));
        }
        let values = ArrayD::from_shape_vec(IxDyn(shape), data.to_vec())
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        let device = ctx.current_device()?;
        kernel::store_real(ctx, device, &values, dtype)
    }

    /// Encode exact integers into `dtype`; integer dtypes keep the low bits
    pub fn from_ints(ctx: &Context, shape: &[usize], data: &[i128], dtype: DType) -> Result<Self> {
        let dtype = ctx.resolve_dtype(dtype)?;
        let values = ArrayD::from_shape_vec(IxDyn(shape), data.to_vec())
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        let device = ctx.current_device()?;
        kernel::store_int(ctx, device, &values, dtype)
    }

    pub fn from_complex(
        ctx: &Context,
        shape: &[usize],
        data: &[Complex64],
        dtype: DType,
    ) -> Result<Self> {
        let dtype = ctx.resolve_dtype(dtype)?;
        let values = ArrayD::from_shape_vec(IxDyn(shape), data.to_vec())
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        let device = ctx.current_device()?;
        kernel::store_complex(ctx, device, &values, dtype)
    }

    /// 0-d array holding `value` in its own dtype
    pub fn scalar(ctx: &Context, value: ScalarValue) -> Result<Self> {
        let dtype = value.dtype();
        Self::from_bytes(ctx, vec![], dtype, scalar_bytes(value, dtype))
    }

    /// Synchronize and copy back to the host
    pub fn to_host(&self) -> Result<HostBuffer> {
        self.check_live()?;
        self.context().synchronize()?;
        Ok(HostBuffer {
            dims: self.meta.shape.iter().map(|&d| d as i64).collect(),
            dtype: self.meta.dtype,
            bytes: self.buffer.to_vec()?,
        })
    }

    pub fn context(&self) -> &Context {
        self.buffer.context()
    }

    /// False once the owning context was torn down
    pub fn is_valid(&self) -> bool {
        self.buffer.check_live().is_ok()
    }

    pub(crate) fn check_live(&self) -> Result<()> {
        self.buffer.check_live()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.buffer.read(f)
    }

    /// Elements as exact integers; floats truncate toward zero
    pub fn to_int_vec(&self) -> Result<Vec<i128>> {
        Ok(kernel::load_int(self)?.iter().cloned().collect())
    }

    pub fn to_complex_vec(&self) -> Result<Vec<Complex64>> {
        Ok(kernel::load_complex(self)?.iter().cloned().collect())
    }

    /// The single element of a size-1 array
    pub fn item(&self) -> Result<ScalarValue> {
        if self.size() != 1 {
            return Err(NpuError::InvalidShape(format!(
                "can only convert an array of size 1 to a scalar, got shape {:?}",
                self.shape()
            )));
        }
        let dtype = self.dtype();
        self.read(|bytes| read_scalar(bytes, dtype))
    }

    /// Convert to `dtype`
    pub fn astype(&self, dtype: DType) -> Result<Self> {
        let dtype = self.context().resolve_dtype(dtype)?;
        if dtype == self.dtype() {
            return self.copy();
        }
        let (ctx, device) = kernel::placement(&[self])?;
        kernel::launch(&ctx, "astype", self.size());
        if kernel::is_exact(self.dtype()) && kernel::is_exact(dtype) {
            return kernel::store_int(&ctx, device, &kernel::load_int(self)?, dtype);
        }
        let values = kernel::load(self)?;
        match values {
            Values::Complex(data) if !dtype.is_complex() => {
                kernel::store_real(&ctx, device, &data.mapv(|c| c.re), dtype)
            }
            values => kernel::store(&ctx, device, &values, dtype),
        }
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if element_count(shape)? != self.size() {
            return Err(NpuError::InvalidShape(format!(
                "cannot reshape array of size {} into shape {:?}",
                self.size(),
                shape
            )));
        }
        let bytes = self.buffer.to_vec()?;
        Self::from_bytes_on(self.context(), self.device(), shape.to_vec(), self.dtype(), bytes)
    }

    pub fn flatten(&self) -> Result<Self> {
        self.reshape(&[self.size()])
    }

    pub fn copy(&self) -> Result<Self> {
        self.reshape(&self.meta.shape.clone())
    }

    /// Reverse the axes
    pub fn transpose(&self) -> Result<Self> {
        let axes: Vec<usize> = (0..self.ndim()).rev().collect();
        self.permute_axes(&axes)
    }

    pub fn permute_axes(&self, axes: &[usize]) -> Result<Self> {
        let mut seen = vec![false; self.ndim()];
        if axes.len() != self.ndim() {
            return Err(NpuError::InvalidShape(format!(
                "axes {:?} don't match array of {} dimensions",
                axes,
                self.ndim()
            )));
        }
        for &axis in axes {
            if axis >= self.ndim() || std::mem::replace(&mut seen[axis], true) {
                return Err(NpuError::InvalidShape(format!(
                    "axes {axes:?} are not a permutation"
                )));
            }
        }
        let index = self.flat_index()?.permuted_axes(IxDyn(axes));
        self.gather(index.shape().to_vec(), index.iter().copied())
    }

    /// Materialize the broadcast of this array to `shape`
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self> {
        let index = self.flat_index()?;
        let view = index.broadcast(IxDyn(shape)).ok_or_else(|| {
            NpuError::IncompatibleShapes(self.shape().to_vec(), shape.to_vec())
        })?;
        self.gather(shape.to_vec(), view.iter().copied())
    }

    fn flat_index(&self) -> Result<ArrayD<usize>> {
        ArrayD::from_shape_vec(IxDyn(self.shape()), (0..self.size()).collect())
            .map_err(|e| NpuError::InvalidShape(e.to_string()))
    }

    /// New array whose elements are this array's elements at `indices`
    fn gather(&self, shape: Vec<usize>, indices: impl Iterator<Item = usize>) -> Result<Self> {
        let item = self.dtype().itemsize();
        let bytes = self.read(|src| {
            let mut out = Vec::with_capacity(element_count(&shape).unwrap_or(0) * item);
            for i in indices {
                out.extend_from_slice(&src[i * item..(i + 1) * item]);
            }
            out
        })?;
        Self::from_bytes_on(self.context(), self.device(), shape, self.dtype(), bytes)
    }
}

/// Bytes of `value` stored as `dtype`; integer to integer stays exact
pub(crate) fn scalar_bytes(value: ScalarValue, dtype: DType) -> Vec<u8> {
    let mut out = vec![0u8; dtype.itemsize()];
    let exact = match value {
        ScalarValue::Bool(v) => Some(v as i128),
        ScalarValue::I8(v) => Some(v as i128),
        ScalarValue::I16(v) => Some(v as i128),
        ScalarValue::I32(v) => Some(v as i128),
        ScalarValue::I64(v) => Some(v as i128),
        ScalarValue::U8(v) => Some(v as i128),
        ScalarValue::U16(v) => Some(v as i128),
        ScalarValue::U32(v) => Some(v as i128),
        ScalarValue::U64(v) => Some(v as i128),
        _ => None,
    };
    match (exact, exact_range(dtype)) {
        (Some(v), Some((lo, hi))) => {
            let clamped = v.clamp(lo, hi);
            out.copy_from_slice(&clamped.to_le_bytes()[..dtype.itemsize()]);
        }
        _ if dtype.is_complex() => dtype.write_complex(value.to_complex(), &mut out),
        _ => dtype.write_f64(value.to_f64(), &mut out),
    }
    out
}

fn exact_range(dtype: DType) -> Option<(i128, i128)> {
    match dtype.format() {
        npuarray_core::Format::Int { bytes, signed } => {
            let bits = bytes as u32 * 8;
            if signed {
                Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
            } else {
                Some((0, (1i128 << bits) - 1))
            }
        }
        _ => None,
    }
}

fn read_scalar(bytes: &[u8], dtype: DType) -> ScalarValue {
    use npuarray_core::Format;
    let mut raw = [0u8; 8];
    let n = dtype.itemsize().min(8);
    raw[..n].copy_from_slice(&bytes[..n]);
    match dtype.format() {
        Format::Bool => ScalarValue::Bool(bytes[0] != 0),
        Format::Int { bytes: 1, signed: true } => ScalarValue::I8(bytes[0] as i8),
        Format::Int { bytes: 1, signed: false } => ScalarValue::U8(bytes[0]),
        Format::Int { bytes: 2, signed: true } => ScalarValue::I16(i64::from_le_bytes(raw) as i16),
        Format::Int { bytes: 2, signed: false } => ScalarValue::U16(u64::from_le_bytes(raw) as u16),
        Format::Int { bytes: 4, signed: true } => ScalarValue::I32(i64::from_le_bytes(raw) as i32),
        Format::Int { bytes: 4, signed: false } => ScalarValue::U32(u64::from_le_bytes(raw) as u32),
        Format::Int { signed: true, .. } => ScalarValue::I64(i64::from_le_bytes(raw)),
        Format::Int { signed: false, .. } => ScalarValue::U64(u64::from_le_bytes(raw)),
        Format::Float16 => ScalarValue::F16(half::f16::from_f64(dtype.read_f64(bytes))),
        Format::BFloat16 => ScalarValue::BF16(half::bf16::from_f64(dtype.read_f64(bytes))),
        Format::Float32 => ScalarValue::F32(dtype.read_f64(bytes) as f32),
        Format::Complex64 => {
            let c = dtype.read_complex(bytes);
            ScalarValue::C64(Complex32::new(c.re as f32, c.im as f32))
        }
        Format::Complex128 => ScalarValue::C128(dtype.read_complex(bytes)),
        Format::Float64 | Format::Narrow(_) => ScalarValue::F64(dtype.read_f64(bytes)),
    }
}

impl Array for NdArray {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn to_f64_vec(&self) -> Result<Vec<f64>> {
        Ok(kernel::load_real(self)?.iter().cloned().collect())
    }
}

impl std::fmt::Debug for NdArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.meta.shape)
            .field("dtype", &self.meta.dtype)
            .field("device", &self.meta.device)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use npuarray_core::ErrorKind;

    fn ctx() -> Context {
        Context::with_device(ContextConfig::default(), 0).unwrap()
    }

    #[test]
    fn test_host_round_trip_exact() {
        let ctx = ctx();
        let values: Vec<i64> = vec![i64::MIN, -1, 0, 1, i64::MAX, 1 << 60];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let host = HostBuffer::new(vec![2, 3], DType::INT64, bytes);
        let arr = NdArray::from_host(&ctx, &host).unwrap();
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr.to_host().unwrap(), host);
    }

    #[test]
    fn test_from_host_rejects_negative_dims() {
        let ctx = ctx();
        let host = HostBuffer::new(vec![2, -3], DType::FLOAT32, vec![]);
        let err = NdArray::from_host(&ctx, &host).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_from_host_rejects_byte_mismatch() {
        let ctx = ctx();
        let host = HostBuffer::new(vec![3], DType::FLOAT32, vec![0; 8]);
        assert_eq!(NdArray::from_host(&ctx, &host).unwrap_err().kind(), ErrorKind::Shape);
        assert_eq!(ctx.memory_stats(0).unwrap().live_buffers, 0);
    }

    #[test]
    fn test_from_host_before_init() {
        let ctx = Context::new(ContextConfig::default());
        let host = HostBuffer::from_f64(&[1], DType::FLOAT32, &[1.0]);
        assert!(matches!(
            NdArray::from_host(&ctx, &host),
            Err(NpuError::NotInitialized)
        ));
    }

    #[test]
    fn test_empty_array() {
        let ctx = ctx();
        let arr = NdArray::from_f64(&ctx, &[0, 4], &[], DType::FLOAT32).unwrap();
        assert_eq!(arr.size(), 0);
        assert_eq!(arr.nbytes(), 0);
        assert!(arr.to_host().unwrap().is_empty());
    }

    #[test]
    fn test_item() {
        let ctx = ctx();
        let arr = NdArray::scalar(&ctx, ScalarValue::I32(-7)).unwrap();
        assert_eq!(arr.ndim(), 0);
        assert_eq!(arr.item().unwrap(), ScalarValue::I32(-7));
        let arr = NdArray::from_f64(&ctx, &[2], &[1.0, 2.0], DType::FLOAT64).unwrap();
        assert!(arr.item().is_err());
        let big = NdArray::scalar(&ctx, ScalarValue::U64(u64::MAX)).unwrap();
        assert_eq!(big.item().unwrap(), ScalarValue::U64(u64::MAX));
    }

    #[test]
    fn test_astype() {
        let ctx = ctx();
        let arr = NdArray::from_f64(&ctx, &[3], &[1.7, -2.5, 300.0], DType::FLOAT32).unwrap();
        let ints = arr.astype(DType::INT8).unwrap();
        assert_eq!(ints.dtype(), DType::INT8);
        assert_eq!(ints.to_f64_vec().unwrap(), vec![1.0, -2.0, 127.0]);
        let fp8 = arr.astype(DType::FLOAT8_E4M3FN).unwrap();
        assert_eq!(fp8.to_f64_vec().unwrap(), vec![1.75, -2.5, 288.0]);
    }

    #[test]
    fn test_astype_between_ints_wraps_exactly() {
        let ctx = ctx();
        let big = (1i128 << 60) + 3;
        let arr = NdArray::from_ints(&ctx, &[3], &[big, 300, -1], DType::INT64).unwrap();
        assert_eq!(arr.to_int_vec().unwrap(), vec![big, 300, -1]);
        let narrow = arr.astype(DType::INT8).unwrap();
        assert_eq!(narrow.to_int_vec().unwrap(), vec![3, 44, -1]);
        let unsigned = arr.astype(DType::UINT64).unwrap();
        assert_eq!(unsigned.to_int_vec().unwrap(), vec![big, 300, u64::MAX as i128]);
    }

    #[test]
    fn test_astype_complex_to_real_keeps_real_part() {
        let ctx = ctx();
        let data = [Complex64::new(1.5, 2.0), Complex64::new(-1.0, 0.0)];
        let arr = NdArray::from_complex(&ctx, &[2], &data, DType::COMPLEX128).unwrap();
        let real = arr.astype(DType::FLOAT32).unwrap();
        assert_eq!(real.to_f64_vec().unwrap(), vec![1.5, -1.0]);
        let narrow = arr.astype(DType::COMPLEX64).unwrap();
        assert_eq!(narrow.to_complex_vec().unwrap(), data.to_vec());
    }

    #[test]
    fn test_reshape_and_transpose() {
        let ctx = ctx();
        let data: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let arr = NdArray::from_f64(&ctx, &[2, 3], &data, DType::INT32).unwrap();
        let r = arr.reshape(&[3, 2]).unwrap();
        assert_eq!(r.shape(), &[3, 2]);
        assert!(arr.reshape(&[4, 2]).is_err());
        let t = arr.transpose().unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_f64_vec().unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert_eq!(arr.flatten().unwrap().shape(), &[6]);
        assert!(arr.permute_axes(&[0, 0]).is_err());
    }

    #[test]
    fn test_broadcast_to() {
        let ctx = ctx();
        let arr = NdArray::from_f64(&ctx, &[3], &[1.0, 2.0, 3.0], DType::FLOAT16).unwrap();
        let b = arr.broadcast_to(&[2, 3]).unwrap();
        assert_eq!(b.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert_eq!(
            arr.broadcast_to(&[2, 4]).unwrap_err().kind(),
            ErrorKind::Shape
        );
    }

    #[test]
    fn test_use_after_teardown() {
        let ctx = ctx();
        let arr = NdArray::from_f64(&ctx, &[2], &[1.0, 2.0], DType::FLOAT32).unwrap();
        ctx.teardown();
        assert!(!arr.is_valid());
        assert!(matches!(arr.to_host(), Err(NpuError::UseAfterTeardown)));
        assert!(matches!(arr.to_f64_vec(), Err(NpuError::UseAfterTeardown)));
        assert!(matches!(arr.copy(), Err(NpuError::UseAfterTeardown)));
        ctx.init(0).unwrap();
        assert!(matches!(arr.astype(DType::FLOAT64), Err(NpuError::UseAfterTeardown)));
    }

    #[test]
    fn test_device_affinity() {
        let ctx = Context::with_device(ContextConfig::default().with_device_count(2), 0).unwrap();
        let a = NdArray::from_f64(&ctx, &[1], &[1.0], DType::FLOAT32).unwrap();
        ctx.set_device(1).unwrap();
        let b = NdArray::from_f64(&ctx, &[1], &[1.0], DType::FLOAT32).unwrap();
        assert_eq!(a.device(), 0);
        assert_eq!(b.device(), 1);
        // derived arrays follow their source
        assert_eq!(a.copy().unwrap().device(), 0);
        assert_eq!(ctx.memory_stats(0).unwrap().live_buffers, 1);
        assert!(matches!(
            kernel::placement(&[&a, &b]),
            Err(NpuError::DeviceMismatch(0, 1))
        ));
    }

    #[test]
    fn test_scalar_bytes_saturate_exactly() {
        assert_eq!(scalar_bytes(ScalarValue::I64(300), DType::UINT8), vec![255]);
        assert_eq!(scalar_bytes(ScalarValue::I64(-1), DType::UINT16), vec![0, 0]);
        assert_eq!(
            scalar_bytes(ScalarValue::U64(u64::MAX), DType::INT64),
            i64::MAX.to_le_bytes().to_vec()
        );
        assert_eq!(scalar_bytes(ScalarValue::F64(2.5), DType::INT8), vec![2]);
    }
}
