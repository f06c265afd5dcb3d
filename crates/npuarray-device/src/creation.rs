//! Array creation operations for the device backend

use crate::array::{byte_len, scalar_bytes};
use crate::kernel;
use crate::{Context, DeviceBackend, NdArray};
use ndarray::{Array2, ArrayD, IxDyn};
use npuarray_core::{ops::CreationOps, Array, DType, NpuError, Result, ScalarValue};

/// Fill a new buffer on `device` with `value`
fn fill(
    ctx: &Context,
    device: u32,
    shape: &[usize],
    dtype: DType,
    value: ScalarValue,
) -> Result<NdArray> {
    let nbytes = byte_len(shape, dtype)?;
    ctx.ensure_capacity(device, nbytes)?;
    let element = scalar_bytes(value, dtype);
    let mut bytes = kernel::host_vec(nbytes)?;
    bytes.resize(nbytes, 0);
    for chunk in bytes.chunks_exact_mut(element.len()) {
        chunk.copy_from_slice(&element);
    }
    kernel::launch(ctx, "fill", nbytes / element.len());
    NdArray::from_bytes_on(ctx, device, shape.to_vec(), dtype, bytes)
}

fn vector(ctx: &Context, values: Vec<f64>, dtype: DType) -> Result<NdArray> {
    let device = ctx.current_device()?;
    let n = values.len();
    let data = ArrayD::from_shape_vec(IxDyn(&[n]), values)
        .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
    kernel::launch(ctx, "iota", n);
    kernel::store_real(ctx, device, &data, dtype)
}

impl CreationOps for DeviceBackend {
    type Array = NdArray;
    type Context = Context;

    fn empty(ctx: &Context, shape: &[usize], dtype: DType) -> Result<NdArray> {
        let dtype = ctx.resolve_dtype(dtype)?;
        let device = ctx.current_device()?;
        let nbytes = byte_len(shape, dtype)?;
        ctx.ensure_capacity(device, nbytes)?;
        let mut bytes = kernel::host_vec(nbytes)?;
        bytes.resize(nbytes, 0);
        NdArray::from_bytes_on(ctx, device, shape.to_vec(), dtype, bytes)
    }

    fn zeros(ctx: &Context, shape: &[usize], dtype: DType) -> Result<NdArray> {
        Self::full(ctx, shape, dtype, ScalarValue::I64(0))
    }

    fn ones(ctx: &Context, shape: &[usize], dtype: DType) -> Result<NdArray> {
        Self::full(ctx, shape, dtype, ScalarValue::I64(1))
    }

    fn full(ctx: &Context, shape: &[usize], dtype: DType, value: ScalarValue) -> Result<NdArray> {
        let dtype = ctx.resolve_dtype(dtype)?;
        fill(ctx, ctx.current_device()?, shape, dtype, value)
    }

    fn arange(ctx: &Context, start: f64, stop: f64, step: f64, dtype: DType) -> Result<NdArray> {
        let dtype = ctx.resolve_dtype(dtype)?;
        if step == 0.0 || !step.is_finite() {
            return Err(NpuError::InvalidShape(format!(
                "arange step must be finite and non-zero, got {step}"
            )));
        }
        if !start.is_finite() || !stop.is_finite() {
            return Err(NpuError::InvalidShape(format!(
                "arange bounds must be finite, got [{start}, {stop})"
            )));
        }

        let len = ((stop - start) / step).ceil().max(0.0);
        if !len.is_finite() || len >= usize::MAX as f64 {
            return Err(NpuError::InvalidShape(format!(
                "arange of [{start}, {stop}) by {step} has no representable length"
            )));
        }
        let n = len as usize;
        ctx.ensure_capacity(ctx.current_device()?, byte_len(&[n], dtype)?)?;
        let mut values = kernel::host_vec(n)?;
        values.extend((0..n).map(|i| start + (i as f64) * step));
        vector(ctx, values, dtype)
    }

    fn linspace(
        ctx: &Context,
        start: f64,
        stop: f64,
        num: usize,
        endpoint: bool,
        dtype: DType,
    ) -> Result<NdArray> {
        let dtype = ctx.resolve_dtype(dtype)?;
        let div = if endpoint { num.saturating_sub(1) } else { num };
        let step = if div > 0 { (stop - start) / div as f64 } else { 0.0 };
        let mut values: Vec<f64> = (0..num).map(|i| start + (i as f64) * step).collect();
        if endpoint && num > 1 {
            values[num - 1] = stop;
        }
        vector(ctx, values, dtype)
    }

    fn eye(ctx: &Context, n: usize, m: Option<usize>, k: isize, dtype: DType) -> Result<NdArray> {
        let dtype = ctx.resolve_dtype(dtype)?;
        let m = m.unwrap_or(n);
        let mut arr = Array2::<f64>::zeros((n, m));
        for i in 0..n {
            let j = i as isize + k;
            if (0..m as isize).contains(&j) {
                arr[[i, j as usize]] = 1.0;
            }
        }
        let device = ctx.current_device()?;
        kernel::launch(ctx, "eye", n * m);
        kernel::store_real(ctx, device, &arr.into_dyn(), dtype)
    }

    fn zeros_like(arr: &NdArray) -> Result<NdArray> {
        Self::full_like(arr, ScalarValue::I64(0))
    }

    fn full_like(arr: &NdArray, value: ScalarValue) -> Result<NdArray> {
        let (ctx, device) = kernel::placement(&[arr])?;
        fill(&ctx, device, arr.shape(), arr.dtype(), value)
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
    fn test_zeros_ones_full() {
        let ctx = ctx();
        let z = DeviceBackend::zeros(&ctx, &[2, 3], DType::FLOAT16).unwrap();
        assert_eq!(z.shape(), &[2, 3]);
        assert!(z.to_f64_vec().unwrap().iter().all(|&v| v == 0.0));

        let o = DeviceBackend::ones(&ctx, &[4], DType::FLOAT8_E5M2).unwrap();
        assert_eq!(o.to_f64_vec().unwrap(), vec![1.0; 4]);

        let f = DeviceBackend::full(&ctx, &[2], DType::INT64, ScalarValue::I64(i64::MAX)).unwrap();
        assert!(f.item().is_err());
        let host = f.to_host().unwrap();
        assert_eq!(&host.bytes[..8], &i64::MAX.to_le_bytes());
    }

    #[test]
    fn test_full_narrow_saturates() {
        let ctx = ctx();
        let f = DeviceBackend::full(&ctx, &[1], DType::FLOAT8_E4M3FN, ScalarValue::F64(500.0))
            .unwrap();
        assert_eq!(f.to_f64_vec().unwrap(), vec![448.0]);
    }

    #[test]
    fn test_arange_lengths() {
        let ctx = ctx();
        let a = DeviceBackend::arange(&ctx, 0.0, 5.0, 1.0, DType::INT32).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        let a = DeviceBackend::arange(&ctx, 0.0, 1.0, 0.3, DType::FLOAT64).unwrap();
        assert_eq!(a.size(), 4);

        let a = DeviceBackend::arange(&ctx, 5.0, 0.0, -2.0, DType::FLOAT32).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![5.0, 3.0, 1.0]);

        let a = DeviceBackend::arange(&ctx, 3.0, 3.0, 1.0, DType::FLOAT32).unwrap();
        assert_eq!(a.shape(), &[0]);
        let a = DeviceBackend::arange(&ctx, 0.0, 3.0, -1.0, DType::FLOAT32).unwrap();
        assert_eq!(a.shape(), &[0]);
    }

    #[test]
    fn test_arange_rejects_bad_step() {
        let ctx = ctx();
        for step in [0.0, f64::NAN, f64::INFINITY] {
            let err = DeviceBackend::arange(&ctx, 0.0, 1.0, step, DType::FLOAT32).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Shape);
        }
        let err = DeviceBackend::arange(&ctx, 0.0, f64::INFINITY, 1.0, DType::FLOAT32)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_linspace() {
        let ctx = ctx();
        let a = DeviceBackend::linspace(&ctx, 0.0, 1.0, 5, true, DType::FLOAT64).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let a = DeviceBackend::linspace(&ctx, 0.0, 1.0, 4, false, DType::FLOAT64).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
        let a = DeviceBackend::linspace(&ctx, 2.0, 3.0, 1, true, DType::FLOAT64).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![2.0]);
        assert_eq!(
            DeviceBackend::linspace(&ctx, 0.0, 1.0, 0, true, DType::FLOAT64)
                .unwrap()
                .size(),
            0
        );
    }

    #[test]
    fn test_eye_offsets() {
        let ctx = ctx();
        let e = DeviceBackend::eye(&ctx, 2, Some(3), 1, DType::INT8).unwrap();
        assert_eq!(e.shape(), &[2, 3]);
        assert_eq!(e.to_f64_vec().unwrap(), vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let i = DeviceBackend::identity(&ctx, 3, DType::BOOL).unwrap();
        assert_eq!(i.to_f64_vec().unwrap().iter().sum::<f64>(), 3.0);
        let e = DeviceBackend::eye(&ctx, 3, None, -2, DType::FLOAT32).unwrap();
        assert_eq!(e.to_f64_vec().unwrap()[6], 1.0);
    }

    #[test]
    fn test_like_follows_source_device() {
        let ctx = Context::with_device(ContextConfig::default().with_device_count(2), 1).unwrap();
        let a = DeviceBackend::ones(&ctx, &[2, 2], DType::UINT16).unwrap();
        ctx.set_device(0).unwrap();
        let z = DeviceBackend::zeros_like(&a).unwrap();
        assert_eq!(z.device(), 1);
        assert_eq!(z.dtype(), DType::UINT16);
        let f = DeviceBackend::full_like(&a, ScalarValue::F32(2.5)).unwrap();
        assert_eq!(f.to_f64_vec().unwrap(), vec![2.0; 4]);
    }

    #[test]
    fn test_memory_limit_leaves_no_partial_array() {
        let config = ContextConfig::default().with_memory_limit(16);
        let ctx = Context::with_device(config, 0).unwrap();
        let err = DeviceBackend::zeros(&ctx, &[8], DType::FLOAT64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Device);
        assert_eq!(ctx.memory_stats(0).unwrap().live_buffers, 0);
    }

    #[test]
    fn test_huge_shapes_fail_before_staging() {
        let config = ContextConfig::default().with_memory_limit(16);
        let ctx = Context::with_device(config, 0).unwrap();
        let huge = [1usize << 31, 1 << 31];
        for result in [
            DeviceBackend::ones(&ctx, &huge, DType::UINT8),
            DeviceBackend::empty(&ctx, &[1 << 30, 1 << 30], DType::FLOAT64),
            DeviceBackend::full(&ctx, &huge, DType::INT8, ScalarValue::I64(3)),
        ] {
            assert!(matches!(result, Err(NpuError::AllocationFailed { limit: 16, .. })));
        }
        // 2^62 float64 elements overflow the byte count
        let err = DeviceBackend::zeros(&ctx, &huge, DType::FLOAT64).unwrap_err();
        assert!(matches!(err, NpuError::InvalidShape(_)));
        let err = DeviceBackend::zeros(&ctx, &[usize::MAX, 2], DType::FLOAT32).unwrap_err();
        assert!(matches!(err, NpuError::InvalidShape(_)));
        let err = DeviceBackend::empty(&ctx, &[usize::MAX / 2], DType::FLOAT64).unwrap_err();
        assert!(matches!(err, NpuError::InvalidShape(_)));
        let err = DeviceBackend::arange(&ctx, 0.0, 1e6, 1.0, DType::FLOAT64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Device);
        assert_eq!(ctx.memory_stats(0).unwrap().live_buffers, 0);
    }

    #[test]
    fn test_arange_unrepresentable_length() {
        let ctx = ctx();
        let err = DeviceBackend::arange(&ctx, 0.0, 1e300, 1e-300, DType::FLOAT64).unwrap_err();
        assert!(matches!(err, NpuError::InvalidShape(_)));
        let err = DeviceBackend::arange(&ctx, -1e308, 1e308, 1.0, DType::FLOAT32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        let err = DeviceBackend::arange(&ctx, 0.0, 1e19, 1.0, DType::FLOAT64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }
}
