//! Shared test suite for npuarray backends
//!
//! These suites drive the device backend through the operation traits only
//! and check results against numpy's documented behaviour.

pub mod broadcast;
pub mod creation;
pub mod device;
pub mod dtypes;
pub mod linalg;
pub mod math;
pub mod stats;

/// Test utilities
pub mod utils {
    use npuarray_core::{Array, DType};
    use npuarray_device::{Context, ContextConfig, NdArray};

    /// Check if two f64 values are approximately equal
    pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() && b.is_nan() {
            return true;
        }
        if a.is_infinite() && b.is_infinite() {
            return a.signum() == b.signum();
        }
        (a - b).abs() < tol
    }

    /// Check an array's shape and values against expectations
    pub fn array_approx_eq(arr: &NdArray, shape: &[usize], expected: &[f64], tol: f64) -> bool {
        if arr.shape() != shape {
            return false;
        }
        match arr.to_f64_vec() {
            Ok(data) => {
                data.len() == expected.len()
                    && data.iter().zip(expected).all(|(&x, &y)| approx_eq(x, y, tol))
            }
            Err(_) => false,
        }
    }

    /// Single-device context on device 0
    pub fn context() -> Context {
        Context::with_device(ContextConfig::default().with_seed(0), 0)
            .expect("initialize device context")
    }

    pub fn arr(ctx: &Context, data: &[f64], dtype: DType) -> NdArray {
        NdArray::from_f64(ctx, &[data.len()], data, dtype).expect("upload vector")
    }

    pub fn mat(ctx: &Context, data: &[f64], rows: usize, cols: usize) -> NdArray {
        NdArray::from_f64(ctx, &[rows, cols], data, DType::FLOAT64).expect("upload matrix")
    }

    /// Default tolerance for floating point comparisons
    pub const DEFAULT_TOL: f64 = 1e-10;

    /// Relaxed tolerance for operations with accumulated error
    pub const RELAXED_TOL: f64 = 1e-6;
}
