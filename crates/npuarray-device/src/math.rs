//! Element-wise math kernels for the device backend

use crate::broadcast::{broadcast_binary_op, broadcast_pair};
use crate::compare::{self, Predicate, Relation};
use crate::kernel::{self, Values, PAR_THRESHOLD};
use crate::{DeviceBackend, NdArray};
use ndarray::ArrayD;
use npuarray_core::ops::{BinaryOp, MathOps, UnaryOp};
use npuarray_core::{promote, Array, NpuError, Result};
use num_complex::Complex64;
use std::f64::consts::{LN_2, PI};

/// Map `f` over `data`, on the rayon pool for large inputs
pub(crate) fn map_real(mut data: ArrayD<f64>, f: impl Fn(f64) -> f64 + Sync + Send) -> ArrayD<f64> {
    if data.len() >= PAR_THRESHOLD {
        data.par_mapv_inplace(f);
    } else {
        data.mapv_inplace(f);
    }
    data
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x
    }
}

fn unary_real(op: UnaryOp, x: f64) -> f64 {
    use UnaryOp::*;
    match op {
        Absolute | Fabs => x.abs(),
        Sign => sign(x),
        Negative => -x,
        Positive => x,
        Reciprocal => 1.0 / x,
        Square => x * x,
        Sqrt => x.sqrt(),
        Cbrt => x.cbrt(),
        Sin => x.sin(),
        Cos => x.cos(),
        Tan => x.tan(),
        Arcsin => x.asin(),
        Arccos => x.acos(),
        Arctan => x.atan(),
        Sinh => x.sinh(),
        Cosh => x.cosh(),
        Tanh => x.tanh(),
        Arcsinh => x.asinh(),
        Arccosh => x.acosh(),
        Arctanh => x.atanh(),
        Exp => x.exp(),
        Exp2 => x.exp2(),
        Expm1 => x.exp_m1(),
        Log => x.ln(),
        Log2 => x.log2(),
        Log10 => x.log10(),
        Log1p => x.ln_1p(),
        Floor => x.floor(),
        Ceil => x.ceil(),
        Trunc | Fix => x.trunc(),
        Rint => x.round_ties_even(),
        Radians => x.to_radians(),
        Degrees => x.to_degrees(),
        Sinc => {
            if x == 0.0 {
                1.0
            } else {
                (PI * x).sin() / (PI * x)
            }
        }
        Signbit | Isnan | Isinf | Isfinite | Isposinf | Isneginf | LogicalNot => {
            unreachable!("{op} runs on the predicate kernel")
        }
    }
}

/// Unary op over integer lanes, for integer or bool outputs
fn unary_int(op: UnaryOp, x: i128) -> i128 {
    use UnaryOp::*;
    match op {
        Absolute => x.abs(),
        Sign => x.signum(),
        Negative => x.wrapping_neg(),
        Positive | Floor | Ceil | Trunc | Fix | Rint => x,
        Square => x.wrapping_mul(x),
        Reciprocal if x == 0 => 0,
        Reciprocal => 1 / x,
        _ => unary_real(op, x as f64) as i128,
    }
}

fn unary_complex(op: UnaryOp, z: Complex64) -> Complex64 {
    match op {
        UnaryOp::Absolute => Complex64::new(z.norm(), 0.0),
        UnaryOp::Negative => -z,
        UnaryOp::Square => z * z,
        _ => z,
    }
}

fn gcd(x: i128, y: i128) -> i128 {
    let (mut a, mut b) = (x.abs(), y.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Log of the sum of exponentials, in base 2 when `base2`
fn logaddexp(x: f64, y: f64, base2: bool) -> f64 {
    if x == y {
        return x + if base2 { 1.0 } else { LN_2 };
    }
    let (hi, lo) = if x > y { (x, y) } else { (y, x) };
    if base2 {
        hi + (lo - hi).exp2().ln_1p() / LN_2
    } else {
        hi + (lo - hi).exp().ln_1p()
    }
}

fn binary_real(op: BinaryOp, x: f64, y: f64) -> f64 {
    use BinaryOp::*;
    match op {
        Add => x + y,
        Subtract => x - y,
        Multiply => x * y,
        Divide => x / y,
        FloorDivide => (x / y).floor(),
        Power => x.powf(y),
        Maximum if x.is_nan() || y.is_nan() => f64::NAN,
        Maximum => x.max(y),
        Minimum if x.is_nan() || y.is_nan() => f64::NAN,
        Minimum => x.min(y),
        Fmax => x.max(y),
        Fmin => x.min(y),
        Heaviside => {
            if x.is_nan() {
                x
            } else if x == 0.0 {
                y
            } else {
                (x > 0.0) as u8 as f64
            }
        }
        Arctan2 => x.atan2(y),
        Hypot => x.hypot(y),
        Fmod => x % y,
        Remainder => {
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        Logaddexp => logaddexp(x, y, false),
        Logaddexp2 => logaddexp(x, y, true),
        Gcd => gcd(x as i128, y as i128) as f64,
        Lcm => binary_int(op, x as i128, y as i128) as f64,
        Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual | LogicalAnd | LogicalOr
        | LogicalXor => unreachable!("{op} runs on the comparison kernel"),
    }
}

/// `base` to a non-negative power, wrapping on overflow
fn power_int(mut base: i128, mut exp: i128) -> i128 {
    let mut acc: i128 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    acc
}

/// Binary op over integer lanes
///
/// Lanes are wide enough that every add, subtract or multiply of 64-bit
/// operands keeps its low 64 bits, so storing to the output width wraps.
/// Division and remainder by zero give 0.
fn binary_int(op: BinaryOp, x: i128, y: i128) -> i128 {
    use BinaryOp::*;
    match op {
        Add => x.wrapping_add(y),
        Subtract => x.wrapping_sub(y),
        Multiply => x.wrapping_mul(y),
        FloorDivide | Fmod | Remainder if y == 0 => 0,
        FloorDivide => {
            let q = x / y;
            if x % y != 0 && (x < 0) != (y < 0) {
                q - 1
            } else {
                q
            }
        }
        Fmod => x % y,
        Remainder => {
            let r = x % y;
            if r != 0 && (r < 0) != (y < 0) {
                r + y
            } else {
                r
            }
        }
        Power => power_int(x, y),
        Maximum | Fmax => x.max(y),
        Minimum | Fmin => x.min(y),
        Gcd => gcd(x, y),
        Lcm => {
            let g = gcd(x, y);
            if g == 0 {
                0
            } else {
                (x / g).wrapping_mul(y).wrapping_abs()
            }
        }
        Divide | Heaviside | Arctan2 | Hypot | Logaddexp | Logaddexp2 => {
            binary_real(op, x as f64, y as f64) as i128
        }
        Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual | LogicalAnd | LogicalOr
        | LogicalXor => unreachable!("{op} runs on the comparison kernel"),
    }
}

fn binary_complex(op: BinaryOp, x: Complex64, y: Complex64) -> Complex64 {
    match op {
        BinaryOp::Add => x + y,
        BinaryOp::Subtract => x - y,
        BinaryOp::Multiply => x * y,
        BinaryOp::Divide => x / y,
        _ => unreachable!("{op} does not take complex operands"),
    }
}

/// Round to the nearest multiple of `scale`, ties to even
fn round_int(x: i128, scale: i128) -> i128 {
    let (q, r) = (x.div_euclid(scale), x.rem_euclid(scale));
    let up = 2 * r > scale || (2 * r == scale && q % 2 != 0);
    (q + up as i128).wrapping_mul(scale)
}

impl MathOps for DeviceBackend {
    type Array = NdArray;

    fn unary(op: UnaryOp, arr: &NdArray) -> Result<NdArray> {
        let out = op.result_dtype(arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        kernel::launch(&ctx, op.name(), arr.size());

        if let Some(pred) = Predicate::of(op) {
            let result = map_real(kernel::load_real(arr)?, |x| pred.holds(x) as u8 as f64);
            return kernel::store_real(&ctx, device, &result, out);
        }
        if kernel::is_exact(arr.dtype()) && kernel::is_exact(out) {
            let result = kernel::load_int(arr)?.mapv(|x| unary_int(op, x));
            return kernel::store_int(&ctx, device, &result, out);
        }
        match kernel::load(arr)? {
            Values::Complex(data) => {
                let result = data.mapv(|z| unary_complex(op, z));
                if out.is_complex() {
                    kernel::store_complex(&ctx, device, &result, out)
                } else {
                    kernel::store_real(&ctx, device, &result.mapv(|z| z.re), out)
                }
            }
            Values::Real(data) => {
                let result = map_real(data, |x| unary_real(op, x));
                kernel::store_real(&ctx, device, &result, out)
            }
        }
    }

    fn binary(op: BinaryOp, a: &NdArray, b: &NdArray) -> Result<NdArray> {
        let out = op.result_dtype(a.dtype(), b.dtype())?;
        let (ctx, device) = kernel::placement(&[a, b])?;
        let shape = broadcast_pair(a.shape(), b.shape())?;
        kernel::launch(&ctx, op.name(), shape.iter().product());

        let common = promote(a.dtype(), b.dtype());
        if let Some(rel) = Relation::of(op) {
            let result = compare::relate(rel, a, b, common)?;
            return kernel::store_int(&ctx, device, &result.mapv(i128::from), out);
        }
        if common.is_complex() {
            let x = kernel::load(a)?.into_complex();
            let y = kernel::load(b)?.into_complex();
            let result = broadcast_binary_op(&x, &y, |x, y| binary_complex(op, x, y))?;
            return kernel::store(&ctx, device, &Values::Complex(result), out);
        }
        if kernel::is_exact(common) && kernel::is_exact(out) {
            let x = kernel::load_int(a)?;
            let y = kernel::load_int(b)?;
            if op == BinaryOp::Power && y.iter().any(|&v| v < 0) {
                return Err(NpuError::InvalidArgument(
                    "integers to negative integer powers are not allowed".into(),
                ));
            }
            let result = broadcast_binary_op(&x, &y, |x, y| binary_int(op, x, y))?;
            return kernel::store_int(&ctx, device, &result, out);
        }

        let x = kernel::load_real(a)?;
        let y = kernel::load_real(b)?;
        let result = broadcast_binary_op(&x, &y, |x, y| binary_real(op, x, y))?;
        kernel::store_real(&ctx, device, &result, out)
    }

    fn around(arr: &NdArray, decimals: i32) -> Result<NdArray> {
        let dtype = arr.dtype();
        if dtype.is_complex() {
            return Err(NpuError::unsupported("around", dtype));
        }
        let (ctx, device) = kernel::placement(&[arr])?;
        kernel::launch(&ctx, "around", arr.size());
        if kernel::is_exact(dtype) {
            let data = kernel::load_int(arr)?;
            // every 64-bit value rounds to zero past 10^20
            let result = match decimals.unsigned_abs() {
                _ if decimals >= 0 => data,
                n if n <= 20 => data.mapv(|x| round_int(x, 10i128.pow(n))),
                _ => data.mapv(|_| 0),
            };
            return kernel::store_int(&ctx, device, &result, dtype);
        }
        let scale = 10f64.powi(decimals.abs());
        let result = map_real(kernel::load_real(arr)?, |x| {
            if decimals >= 0 {
                (x * scale).round_ties_even() / scale
            } else {
                (x / scale).round_ties_even() * scale
            }
        });
        kernel::store_real(&ctx, device, &result, dtype)
    }

    fn clip(arr: &NdArray, min: f64, max: f64) -> Result<NdArray> {
        let dtype = arr.dtype();
        if dtype.is_complex() {
            return Err(NpuError::unsupported("clip", dtype));
        }
        let (ctx, device) = kernel::placement(&[arr])?;
        kernel::launch(&ctx, "clip", arr.size());
        if kernel::is_exact(dtype) {
            let (lo, hi) = (min.ceil() as i128, max.floor() as i128);
            let result = kernel::load_int(arr)?.mapv(|x| x.max(lo).min(hi));
            return kernel::store_int(&ctx, device, &result, dtype);
        }
        let result = map_real(kernel::load_real(arr)?, |x| {
            if x.is_nan() {
                x
            } else {
                x.max(min).min(max)
            }
        });
        kernel::store_real(&ctx, device, &result, dtype)
    }
}
