//! Statistics tests - numpy compatible

#[cfg(test)]
mod tests {
    use crate::utils::*;
    use npuarray_core::ops::{Axes, CreationOps, ReduceOp, StatsOps};
    use npuarray_core::{Array, DType, ErrorKind};
    use npuarray_device::{DeviceBackend, NdArray};

    fn cube(ctx: &npuarray_device::Context, dtype: DType) -> NdArray {
        let data: Vec<f64> = (0..24).map(|i| i as f64).collect();
        NdArray::from_f64(ctx, &[2, 3, 4], &data, dtype).unwrap()
    }

    // ============ sum ============

    #[test]
    fn test_sum_1d() {
        let ctx = context();
        let a = arr(&ctx, &[1.0, 2.0, 3.0, 4.0, 5.0], DType::FLOAT64);
        let s = DeviceBackend::sum(&a, &Axes::All, false).unwrap();
        assert_eq!(s.item().unwrap().to_f64(), 15.0);
    }

    #[test]
    fn test_sum_empty() {
        let ctx = context();
        let a = arr(&ctx, &[], DType::FLOAT64);
        let s = DeviceBackend::sum(&a, &Axes::All, false).unwrap();
        assert_eq!(s.to_f64_vec().unwrap(), vec![0.0]);
    }

    #[test]
    fn test_sum_negative_axis() {
        let ctx = context();
        let a = cube(&ctx, DType::INT32);
        let s = DeviceBackend::sum(&a, &Axes::One(-1), false).unwrap();
        assert_eq!(s.shape(), &[2, 3]);
        assert_eq!(
            s.to_f64_vec().unwrap(),
            vec![6.0, 22.0, 38.0, 54.0, 70.0, 86.0]
        );
    }

    #[test]
    fn test_sum_keepdims_shapes() {
        let ctx = context();
        let a = cube(&ctx, DType::FLOAT32);
        let cases: [(Axes, &[usize]); 4] = [
            (Axes::All, &[1, 1, 1]),
            (Axes::One(1), &[2, 1, 4]),
            (Axes::Many(vec![0, 1]), &[1, 1, 4]),
            (Axes::Many(vec![-1, 0]), &[1, 3, 1]),
        ];
        for (axes, shape) in cases {
            let s = DeviceBackend::sum(&a, &axes, true).unwrap();
            assert_eq!(s.shape(), shape, "{axes:?}");
        }
    }

    #[test]
    fn test_sum_duplicate_axes_rejected() {
        let ctx = context();
        let a = cube(&ctx, DType::FLOAT32);
        let err = DeviceBackend::sum(&a, &Axes::Many(vec![2, -1]), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_sum_bool_counts() {
        let ctx = context();
        let a = arr(&ctx, &[1.0, 0.0, 1.0, 1.0], DType::BOOL);
        let s = DeviceBackend::sum(&a, &Axes::All, false).unwrap();
        assert_eq!(s.dtype(), DType::INT64);
        assert_eq!(s.to_f64_vec().unwrap(), vec![3.0]);
    }

    #[test]
    fn test_sum_narrow_float_keeps_dtype() {
        let ctx = context();
        let a = DeviceBackend::ones(&ctx, &[4], DType::FLOAT8_E5M2).unwrap();
        let s = DeviceBackend::sum(&a, &Axes::All, false).unwrap();
        assert_eq!(s.dtype(), DType::FLOAT8_E5M2);
        assert_eq!(s.to_f64_vec().unwrap(), vec![4.0]);
    }

    // ============ prod ============

    #[test]
    fn test_prod_axis() {
        let ctx = context();
        let a = mat(&ctx, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        let p = DeviceBackend::prod(&a, &Axes::One(0), false).unwrap();
        assert_eq!(p.to_f64_vec().unwrap(), vec![4.0, 10.0, 18.0]);
    }

    #[test]
    fn test_prod_int64_wraps() {
        let ctx = context();
        let a = arr(&ctx, &[4294967296.0, 4294967296.0], DType::INT64);
        let p = DeviceBackend::prod(&a, &Axes::All, false).unwrap();
        assert_eq!(p.to_f64_vec().unwrap(), vec![0.0]);
    }

    // ============ nan-aware ============

    #[test]
    fn test_nan_variants_use_identity() {
        let ctx = context();
        let a = mat(&ctx, &[f64::NAN, 2.0, 3.0, f64::NAN], 2, 2);
        let s = DeviceBackend::reduce(ReduceOp::Nansum, &a, &Axes::One(1), false).unwrap();
        assert_eq!(s.to_f64_vec().unwrap(), vec![2.0, 3.0]);
        let p = DeviceBackend::reduce(ReduceOp::Nanprod, &a, &Axes::One(0), false).unwrap();
        assert_eq!(p.to_f64_vec().unwrap(), vec![3.0, 2.0]);
        let plain = DeviceBackend::prod(&a, &Axes::One(0), false).unwrap();
        assert!(plain.to_f64_vec().unwrap().iter().all(|x| x.is_nan()));
    }

    // ============ mean / max / min ============

    #[test]
    fn test_mean_axis() {
        let ctx = context();
        let a = cube(&ctx, DType::FLOAT64);
        let m = DeviceBackend::mean(&a, &Axes::Many(vec![0, 2]), false).unwrap();
        assert!(array_approx_eq(&m, &[3], &[7.5, 11.5, 15.5], DEFAULT_TOL));
    }

    #[test]
    fn test_max_min_signed() {
        let ctx = context();
        let a = arr(&ctx, &[-5.0, 3.0, -7.0, 2.0], DType::INT8);
        let max = DeviceBackend::max(&a, &Axes::All, false).unwrap();
        assert_eq!(max.dtype(), DType::INT8);
        assert_eq!(max.to_f64_vec().unwrap(), vec![3.0]);
        let min = DeviceBackend::min(&a, &Axes::All, false).unwrap();
        assert_eq!(min.to_f64_vec().unwrap(), vec![-7.0]);
    }

    #[test]
    fn test_max_of_empty_fails() {
        let ctx = context();
        let a = arr(&ctx, &[], DType::FLOAT32);
        assert_eq!(
            DeviceBackend::max(&a, &Axes::All, false).unwrap_err().kind(),
            ErrorKind::Shape
        );
    }

    // ============ all / any ============

    #[test]
    fn test_all_any_nan_is_true() {
        let ctx = context();
        let a = arr(&ctx, &[f64::NAN, 1.0], DType::FLOAT64);
        let all = DeviceBackend::all(&a, &Axes::All, false).unwrap();
        assert_eq!(all.to_f64_vec().unwrap(), vec![1.0]);
        let zeros = arr(&ctx, &[0.0, 0.0], DType::FLOAT64);
        let any = DeviceBackend::any(&zeros, &Axes::All, false).unwrap();
        assert_eq!(any.to_f64_vec().unwrap(), vec![0.0]);
        let empty = arr(&ctx, &[], DType::FLOAT64);
        let all = DeviceBackend::all(&empty, &Axes::All, false).unwrap();
        assert_eq!(all.to_f64_vec().unwrap(), vec![1.0]);
    }

    // ============ cumulative ============

    #[test]
    fn test_cumsum_3d_axis() {
        let ctx = context();
        let a = cube(&ctx, DType::INT16);
        let c = DeviceBackend::cumsum(&a, Some(1)).unwrap();
        assert_eq!(c.shape(), &[2, 3, 4]);
        assert_eq!(c.dtype(), DType::INT64);
        let data = c.to_f64_vec().unwrap();
        assert_eq!(&data[..12], &[0.0, 1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 10.0, 12.0, 15.0, 18.0, 21.0]);
    }

    #[test]
    fn test_cumprod_flattened() {
        let ctx = context();
        let a = mat(&ctx, &[1.0, 2.0, 3.0, 4.0], 2, 2);
        let c = DeviceBackend::cumprod(&a, None).unwrap();
        assert_eq!(c.shape(), &[4]);
        assert_eq!(c.to_f64_vec().unwrap(), vec![1.0, 2.0, 6.0, 24.0]);
    }
}
