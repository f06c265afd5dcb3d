//! Reductions and running reductions for the device backend

use crate::kernel::{self, Values};
use crate::{DeviceBackend, NdArray};
use ndarray::{ArrayD, Axis};
use npuarray_core::ops::{normalize_axis, AccumulateOp, Axes, ReduceOp, StatsOps};
use npuarray_core::{Array, NpuError, Result};
use num_complex::Complex64;

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// Fold `data` over `axes` (sorted ascending), highest axis first
fn fold_axes<T: Clone>(
    mut data: ArrayD<T>,
    axes: &[usize],
    init: T,
    f: impl Fn(&T, &T) -> T,
) -> ArrayD<T> {
    for &axis in axes.iter().rev() {
        data = data.fold_axis(Axis(axis), init.clone(), |acc, x| f(acc, x));
    }
    data
}

fn keep_dims<T>(mut data: ArrayD<T>, axes: &[usize]) -> ArrayD<T> {
    for &axis in axes {
        data = data.insert_axis(Axis(axis));
    }
    data
}

fn reduce_real(op: ReduceOp, data: ArrayD<f64>, axes: &[usize]) -> ArrayD<f64> {
    use ReduceOp::*;
    let count: usize = axes.iter().map(|&a| data.shape()[a]).product();
    let data = match op {
        Nansum => data.mapv(|x| if x.is_nan() { 0.0 } else { x }),
        Nanprod => data.mapv(|x| if x.is_nan() { 1.0 } else { x }),
        All | Any => data.mapv(|x| (x != 0.0) as u8 as f64),
        _ => data,
    };
    match op {
        Sum | Nansum => fold_axes(data, axes, 0.0, |a, b| a + b),
        Prod | Nanprod => fold_axes(data, axes, 1.0, |a, b| a * b),
        All => fold_axes(data, axes, 1.0, |a, b| a.min(*b)),
        Any => fold_axes(data, axes, 0.0, |a, b| a.max(*b)),
        Max => fold_axes(data, axes, f64::NEG_INFINITY, |a, b| nan_max(*a, *b)),
        Min => fold_axes(data, axes, f64::INFINITY, |a, b| nan_min(*a, *b)),
        Mean => fold_axes(data, axes, 0.0, |a, b| a + b).mapv(|s| s / count as f64),
    }
}

fn reduce_int(op: ReduceOp, data: ArrayD<i128>, axes: &[usize]) -> ArrayD<i128> {
    use ReduceOp::*;
    match op {
        Sum | Nansum => fold_axes(data, axes, 0, |a, b| a.wrapping_add(*b)),
        Prod | Nanprod => fold_axes(data, axes, 1, |a, b| a.wrapping_mul(*b)),
        All => fold_axes(data.mapv(|x| (x != 0) as i128), axes, 1, |a, b| (*a).min(*b)),
        Any => fold_axes(data.mapv(|x| (x != 0) as i128), axes, 0, |a, b| (*a).max(*b)),
        Max => fold_axes(data, axes, i128::MIN, |a, b| (*a).max(*b)),
        Min => fold_axes(data, axes, i128::MAX, |a, b| (*a).min(*b)),
        Mean => unreachable!("mean reduces on float lanes"),
    }
}

fn reduce_complex(op: ReduceOp, data: ArrayD<Complex64>, axes: &[usize]) -> ArrayD<Complex64> {
    match op {
        ReduceOp::Prod => fold_axes(data, axes, Complex64::new(1.0, 0.0), |a, b| a * b),
        _ => fold_axes(data, axes, Complex64::new(0.0, 0.0), |a, b| a + b),
    }
}

impl StatsOps for DeviceBackend {
    type Array = NdArray;

    fn reduce(op: ReduceOp, arr: &NdArray, axes: &Axes, keepdims: bool) -> Result<NdArray> {
        let out = op.result_dtype(arr.dtype())?;
        let axes = axes.normalize(arr.ndim())?;
        let (ctx, device) = kernel::placement(&[arr])?;

        let extent: usize = axes.iter().map(|&a| arr.shape()[a]).product();
        let remaining: usize = arr
            .shape()
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .product();
        if extent == 0 && remaining > 0 && op.identity().is_none() && op != ReduceOp::Mean {
            return Err(NpuError::InvalidShape(format!(
                "zero-size array to reduction operation {op} which has no identity"
            )));
        }
        kernel::launch(&ctx, op.name(), remaining);

        if kernel::is_exact(arr.dtype()) && kernel::is_exact(out) {
            let result = reduce_int(op, kernel::load_int(arr)?, &axes);
            let result = if keepdims { keep_dims(result, &axes) } else { result };
            return kernel::store_int(&ctx, device, &result, out);
        }
        let values = match kernel::load(arr)? {
            Values::Complex(data) => Values::Complex(reduce_complex(op, data, &axes)),
            Values::Real(data) => Values::Real(reduce_real(op, data, &axes)),
        };
        let values = match (values, keepdims) {
            (Values::Real(d), true) => Values::Real(keep_dims(d, &axes)),
            (Values::Complex(d), true) => Values::Complex(keep_dims(d, &axes)),
            (values, false) => values,
        };
        kernel::store(&ctx, device, &values, out)
    }

    fn accumulate(op: AccumulateOp, arr: &NdArray, axis: Option<isize>) -> Result<NdArray> {
        let out = op.result_dtype(arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        let axis = axis.map(|a| normalize_axis(a, arr.ndim())).transpose()?;
        kernel::launch(&ctx, op.name(), arr.size());
        let sum = matches!(op, AccumulateOp::Cumsum | AccumulateOp::Nancumsum);

        if kernel::is_exact(arr.dtype()) {
            let (mut data, axis) = along(kernel::load_int(arr)?, axis)?;
            if sum {
                data.accumulate_axis_inplace(Axis(axis), |&prev, curr| *curr = curr.wrapping_add(prev));
            } else {
                data.accumulate_axis_inplace(Axis(axis), |&prev, curr| *curr = curr.wrapping_mul(prev));
            }
            return kernel::store_int(&ctx, device, &data, out);
        }

        let (mut data, axis) = along(kernel::load_real(arr)?, axis)?;
        match op {
            AccumulateOp::Nancumsum => data.mapv_inplace(|x| if x.is_nan() { 0.0 } else { x }),
            AccumulateOp::Nancumprod => data.mapv_inplace(|x| if x.is_nan() { 1.0 } else { x }),
            _ => {}
        }
        if sum {
            data.accumulate_axis_inplace(Axis(axis), |&prev, curr| *curr += prev);
        } else {
            data.accumulate_axis_inplace(Axis(axis), |&prev, curr| *curr *= prev);
        }
        kernel::store_real(&ctx, device, &data, out)
    }
}

/// `data` and the axis to accumulate along, flattened when no axis is given
fn along<T>(data: ArrayD<T>, axis: Option<usize>) -> Result<(ArrayD<T>, usize)> {
    match axis {
        Some(axis) => Ok((data, axis)),
        None => {
            let n = data.len();
            let flat = data
                .into_shape_with_order(ndarray::IxDyn(&[n]))
                .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
            Ok((flat, 0))
        }
    }
}
