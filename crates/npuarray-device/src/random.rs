//! Random factories drawing from the context's generator

use crate::array::{byte_len, element_count};
use crate::kernel;
use crate::{Context, DeviceBackend, NdArray};
use ndarray::{ArrayD, IxDyn};
use rand::prelude::*;
use rand_distr::{Normal, Pareto, Uniform, Weibull};
use npuarray_core::ops::RandomOps;
use npuarray_core::{DType, NpuError, Result};

fn invalid(what: impl std::fmt::Display) -> NpuError {
    NpuError::InvalidArgument(what.to_string())
}

/// Draw `shape` samples into a new float array on the active device
fn sample<D: Distribution<f64>>(
    ctx: &Context,
    name: &'static str,
    dist: D,
    shape: &[usize],
    dtype: DType,
) -> Result<NdArray> {
    let dtype = ctx.resolve_dtype(dtype)?;
    if !dtype.is_float() {
        return Err(NpuError::unsupported(name, dtype));
    }
    let device = ctx.current_device()?;
    let size = element_count(shape)?;
    ctx.ensure_capacity(device, byte_len(shape, dtype)?)?;
    let mut values = kernel::host_vec(size)?;
    ctx.with_rng(|rng| values.extend(dist.sample_iter(rng).take(size)));
    let data = ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
    kernel::launch(ctx, name, size);
    kernel::store_real(ctx, device, &data, dtype)
}

fn check_scale(name: &str, scale: f64) -> Result<()> {
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(invalid(format!("{name}: scale must be positive, got {scale}")));
    }
    Ok(())
}

impl RandomOps for DeviceBackend {
    type Array = NdArray;
    type Context = Context;

    fn seed(ctx: &Context, seed: u64) {
        ctx.seed(seed);
    }

    fn uniform(
        ctx: &Context,
        low: f64,
        high: f64,
        shape: &[usize],
        dtype: DType,
    ) -> Result<NdArray> {
        if low > high {
            return Err(invalid(format!("uniform: low {low} exceeds high {high}")));
        }
        let dist = if low == high {
            Uniform::new_inclusive(low, high)
        } else {
            Uniform::new(low, high)
        }
        .map_err(invalid)?;
        sample(ctx, "uniform", dist, shape, dtype)
    }

    fn normal(
        ctx: &Context,
        loc: f64,
        scale: f64,
        shape: &[usize],
        dtype: DType,
    ) -> Result<NdArray> {
        check_scale("normal", scale)?;
        let dist = Normal::new(loc, scale).map_err(invalid)?;
        sample(ctx, "normal", dist, shape, dtype)
    }

    fn pareto(ctx: &Context, a: f64, shape: &[usize], dtype: DType) -> Result<NdArray> {
        if !(a > 0.0) {
            return Err(invalid(format!("pareto: a must be positive, got {a}")));
        }
        // Lomax: classical Pareto with unit scale, shifted to start at 0
        let dist = Pareto::new(1.0, a).map_err(invalid)?.map(|x: f64| x - 1.0);
        sample(ctx, "pareto", dist, shape, dtype)
    }

    fn rayleigh(ctx: &Context, scale: f64, shape: &[usize], dtype: DType) -> Result<NdArray> {
        check_scale("rayleigh", scale)?;
        let dist = Weibull::new(scale * std::f64::consts::SQRT_2, 2.0).map_err(invalid)?;
        sample(ctx, "rayleigh", dist, shape, dtype)
    }
}
