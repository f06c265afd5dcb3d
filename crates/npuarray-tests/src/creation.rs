//! Creation function tests - numpy compatible

#[cfg(test)]
mod tests {
    use crate::utils::*;
    use npuarray_core::{ops::CreationOps, Array, DType, ErrorKind, ScalarValue};
    use npuarray_device::DeviceBackend;

    // ============ zeros / ones / full ============

    #[test]
    fn test_zeros_shapes() {
        let ctx = context();
        for shape in [vec![5], vec![3, 4], vec![2, 3, 4]] {
            let a = DeviceBackend::zeros(&ctx, &shape, DType::FLOAT32).unwrap();
            assert_eq!(a.shape(), shape.as_slice());
            assert_eq!(a.size(), shape.iter().product::<usize>());
            assert!(a.to_f64_vec().unwrap().iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_zeros_empty() {
        let ctx = context();
        let a = DeviceBackend::zeros(&ctx, &[0, 3], DType::INT32).unwrap();
        assert_eq!(a.size(), 0);
        assert_eq!(a.shape(), &[0, 3]);
        assert!(a.to_host().unwrap().bytes.is_empty());
    }

    #[test]
    fn test_ones_every_builtin() {
        let ctx = context();
        for dtype in ctx.dtypes() {
            if dtype.is_complex() {
                continue;
            }
            let a = DeviceBackend::ones(&ctx, &[3], dtype).unwrap();
            assert_eq!(a.dtype(), dtype);
            assert_eq!(a.to_f64_vec().unwrap(), vec![1.0; 3], "{dtype}");
        }
    }

    #[test]
    fn test_full_by_name() {
        let ctx = context();
        let dtype = ctx.resolve_dtype("float6_e3m2").unwrap();
        let a = DeviceBackend::full(&ctx, &[2, 2], dtype, ScalarValue::F64(3.0)).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![3.0; 4]);
        assert_eq!(a.to_host().unwrap().bytes.len(), 4);
    }

    #[test]
    fn test_full_uint8_bytes() {
        let ctx = context();
        let a = DeviceBackend::full(&ctx, &[2], DType::UINT8, ScalarValue::I64(7)).unwrap();
        assert_eq!(a.to_host().unwrap().bytes, vec![7, 7]);
    }

    // ============ arange / linspace ============

    #[test]
    fn test_arange_basic() {
        let ctx = context();
        let a = DeviceBackend::arange(&ctx, 0.0, 10.0, 2.0, DType::INT64).unwrap();
        assert_eq!(a.to_f64_vec().unwrap(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_arange_float_step() {
        let ctx = context();
        let a = DeviceBackend::arange(&ctx, 0.0, 1.0, 0.25, DType::FLOAT64).unwrap();
        assert!(array_approx_eq(&a, &[4], &[0.0, 0.25, 0.5, 0.75], DEFAULT_TOL));
    }

    #[test]
    fn test_arange_zero_step() {
        let ctx = context();
        let err = DeviceBackend::arange(&ctx, 0.0, 1.0, 0.0, DType::FLOAT64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_arange_unrepresentable_length() {
        let ctx = context();
        let err = DeviceBackend::arange(&ctx, 0.0, 1e300, 1e-300, DType::FLOAT64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        let err = DeviceBackend::arange(&ctx, -f64::MAX, f64::MAX, 1.0, DType::INT64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        // empty ranges stay valid however far apart the bounds are
        let a = DeviceBackend::arange(&ctx, 1e300, 0.0, 1e-300, DType::FLOAT64).unwrap();
        assert_eq!(a.shape(), &[0]);
    }

    #[test]
    fn test_linspace_endpoint() {
        let ctx = context();
        let a = DeviceBackend::linspace(&ctx, -1.0, 1.0, 5, true, DType::FLOAT32).unwrap();
        assert!(array_approx_eq(&a, &[5], &[-1.0, -0.5, 0.0, 0.5, 1.0], DEFAULT_TOL));
        let b = DeviceBackend::linspace(&ctx, 0.0, 10.0, 5, false, DType::FLOAT64).unwrap();
        assert!(array_approx_eq(&b, &[5], &[0.0, 2.0, 4.0, 6.0, 8.0], DEFAULT_TOL));
    }

    // ============ eye / identity ============

    #[test]
    fn test_eye_rectangular() {
        let ctx = context();
        let e = DeviceBackend::eye(&ctx, 3, Some(4), 0, DType::FLOAT64).unwrap();
        assert_eq!(e.shape(), &[3, 4]);
        assert_eq!(
            e.to_f64_vec().unwrap(),
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_identity_bfloat16() {
        let ctx = context();
        let i = DeviceBackend::identity(&ctx, 2, DType::BFLOAT16).unwrap();
        assert_eq!(i.to_f64_vec().unwrap(), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(i.to_host().unwrap().bytes.len(), 8);
    }

    // ============ *_like ============

    #[test]
    fn test_like_keeps_shape_and_dtype() {
        let ctx = context();
        let a = DeviceBackend::ones(&ctx, &[2, 5], DType::FLOAT16).unwrap();
        let z = DeviceBackend::zeros_like(&a).unwrap();
        assert_eq!(z.shape(), &[2, 5]);
        assert_eq!(z.dtype(), DType::FLOAT16);
        let f = DeviceBackend::full_like(&a, ScalarValue::F64(-0.5)).unwrap();
        assert!(f.to_f64_vec().unwrap().iter().all(|&x| x == -0.5));
    }
}
