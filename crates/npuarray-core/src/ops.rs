//! Operation descriptors, result typing and the traits backends implement

use crate::array::Array;
use crate::dtype::{DType, Kind};
use crate::error::{NpuError, Result};
use crate::promote::promote;
use crate::registry::ScalarValue;

macro_rules! named_ops {
    ($(#[$meta:meta])* $ty:ident { $($variant:ident => $name:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $ty {
            $($variant),*
        }

        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),*];

            /// numpy name of the operation
            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),*
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_ops!(
    /// Elementwise operations of one operand
    UnaryOp {
        Absolute => "absolute",
        Fabs => "fabs",
        Sign => "sign",
        Negative => "negative",
        Positive => "positive",
        Reciprocal => "reciprocal",
        Square => "square",
        Sqrt => "sqrt",
        Cbrt => "cbrt",
        Sin => "sin",
        Cos => "cos",
        Tan => "tan",
        Arcsin => "arcsin",
        Arccos => "arccos",
        Arctan => "arctan",
        Sinh => "sinh",
        Cosh => "cosh",
        Tanh => "tanh",
        Arcsinh => "arcsinh",
        Arccosh => "arccosh",
        Arctanh => "arctanh",
        Exp => "exp",
        Exp2 => "exp2",
        Expm1 => "expm1",
        Log => "log",
        Log2 => "log2",
        Log10 => "log10",
        Log1p => "log1p",
        Floor => "floor",
        Ceil => "ceil",
        Trunc => "trunc",
        Rint => "rint",
        Fix => "fix",
        Signbit => "signbit",
        Isnan => "isnan",
        Isinf => "isinf",
        Isfinite => "isfinite",
        Isposinf => "isposinf",
        Isneginf => "isneginf",
        LogicalNot => "logical_not",
        Radians => "radians",
        Degrees => "degrees",
        Sinc => "sinc",
    }
);

named_ops!(
    /// Elementwise operations of two broadcast operands
    BinaryOp {
        Add => "add",
        Subtract => "subtract",
        Multiply => "multiply",
        Divide => "divide",
        FloorDivide => "floor_divide",
        Power => "power",
        Maximum => "maximum",
        Minimum => "minimum",
        Fmax => "fmax",
        Fmin => "fmin",
        Heaviside => "heaviside",
        Arctan2 => "arctan2",
        Hypot => "hypot",
        Fmod => "fmod",
        Remainder => "remainder",
        Logaddexp => "logaddexp",
        Logaddexp2 => "logaddexp2",
        Gcd => "gcd",
        Lcm => "lcm",
        Equal => "equal",
        NotEqual => "not_equal",
        Less => "less",
        LessEqual => "less_equal",
        Greater => "greater",
        GreaterEqual => "greater_equal",
        LogicalAnd => "logical_and",
        LogicalOr => "logical_or",
        LogicalXor => "logical_xor",
    }
);

named_ops!(
    /// Reductions over an axis specification
    ReduceOp {
        Sum => "sum",
        Prod => "prod",
        Nansum => "nansum",
        Nanprod => "nanprod",
        All => "all",
        Any => "any",
        Max => "max",
        Min => "min",
        Mean => "mean",
    }
);

named_ops!(
    /// Running reductions along one axis
    AccumulateOp {
        Cumsum => "cumsum",
        Cumprod => "cumprod",
        Nancumsum => "nancumsum",
        Nancumprod => "nancumprod",
    }
);

/// Floating dtype an integer or bool input computes in
///
/// 8-bit inputs widen to float16, 16-bit to float32 and anything wider to
/// float64. Floating inputs keep their dtype.
pub fn inexact(dtype: DType) -> DType {
    match dtype.kind() {
        Kind::Float | Kind::Complex => dtype,
        _ => match dtype.itemsize() {
            1 => DType::FLOAT16,
            2 => DType::FLOAT32,
            _ => DType::FLOAT64,
        },
    }
}

impl UnaryOp {
    /// Whether the op returns a bool mask
    pub fn is_predicate(&self) -> bool {
        use UnaryOp::*;
        matches!(
            self,
            Signbit | Isnan | Isinf | Isfinite | Isposinf | Isneginf | LogicalNot
        )
    }

    fn accepts_complex(&self) -> bool {
        use UnaryOp::*;
        matches!(self, Absolute | Negative | Positive | Square)
    }

    /// Result dtype for an input of `dtype`
    pub fn result_dtype(&self, dtype: DType) -> Result<DType> {
        use UnaryOp::*;
        if dtype.is_complex() && !self.accepts_complex() {
            return Err(NpuError::unsupported(self.name(), dtype));
        }
        Ok(match self {
            _ if self.is_predicate() => DType::BOOL,
            Absolute => dtype.real_part(),
            Negative if dtype.is_bool() => return Err(NpuError::unsupported(self.name(), dtype)),
            Sign | Negative | Positive | Square | Reciprocal => dtype,
            Floor | Ceil | Trunc | Fix if dtype.is_integer() => dtype,
            _ => inexact(dtype),
        })
    }
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        use BinaryOp::*;
        matches!(self, LogicalAnd | LogicalOr | LogicalXor)
    }

    fn accepts_complex(&self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Add | Subtract | Multiply | Divide | Equal | NotEqual
        )
    }

    /// Result dtype for operands of `a` and `b`
    pub fn result_dtype(&self, a: DType, b: DType) -> Result<DType> {
        use BinaryOp::*;
        let common = promote(a, b);
        if common.is_complex() && !self.accepts_complex() {
            return Err(NpuError::unsupported(self.name(), common));
        }
        Ok(match self {
            _ if self.is_comparison() || self.is_logical() => DType::BOOL,
            Subtract if common.is_bool() => {
                return Err(NpuError::unsupported(self.name(), common))
            }
            Gcd | Lcm if !common.is_integer() => {
                return Err(NpuError::unsupported(self.name(), common))
            }
            Divide if !common.is_float() && !common.is_complex() => DType::FLOAT64,
            Heaviside | Arctan2 | Hypot | Logaddexp | Logaddexp2 => inexact(common),
            _ => common,
        })
    }
}

impl ReduceOp {
    /// Result dtype of reducing an input of `dtype`
    pub fn result_dtype(&self, dtype: DType) -> Result<DType> {
        use ReduceOp::*;
        if dtype.is_complex() && !matches!(self, Sum | Prod) {
            return Err(NpuError::unsupported(self.name(), dtype));
        }
        Ok(match self {
            All | Any => DType::BOOL,
            Sum | Prod | Nansum | Nanprod => accumulator(dtype),
            Max | Min => dtype,
            Mean => match dtype.kind() {
                Kind::Float => dtype,
                _ => DType::FLOAT64,
            },
        })
    }

    /// Value a reduction starts from; `None` when an empty input has no result
    pub fn identity(&self) -> Option<f64> {
        use ReduceOp::*;
        match self {
            Sum | Nansum => Some(0.0),
            Prod | Nanprod => Some(1.0),
            All => Some(1.0),
            Any => Some(0.0),
            Max | Min | Mean => None,
        }
    }
}

impl AccumulateOp {
    pub fn result_dtype(&self, dtype: DType) -> Result<DType> {
        if dtype.is_complex() {
            return Err(NpuError::unsupported(self.name(), dtype));
        }
        Ok(accumulator(dtype))
    }
}

/// Accumulation dtype of sum-like reductions
fn accumulator(dtype: DType) -> DType {
    match dtype.kind() {
        Kind::Bool | Kind::Int => DType::INT64,
        Kind::UInt => DType::UINT64,
        Kind::Float | Kind::Complex => dtype,
    }
}

/// Axis specification of a reduction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Axes {
    #[default]
    All,
    One(isize),
    Many(Vec<isize>),
}

impl Axes {
    /// Normalise to sorted, non-negative axes of an `ndim`-dimensional array
    pub fn normalize(&self, ndim: usize) -> Result<Vec<usize>> {
        let raw: Vec<isize> = match self {
            Axes::All => return Ok((0..ndim).collect()),
            Axes::One(axis) => vec![*axis],
            Axes::Many(axes) => axes.clone(),
        };
        let mut out = Vec::with_capacity(raw.len());
        for axis in raw {
            let resolved = normalize_axis(axis, ndim)?;
            if out.contains(&resolved) {
                return Err(NpuError::InvalidShape(format!(
                    "duplicate value in 'axis': {axis}"
                )));
            }
            out.push(resolved);
        }
        out.sort_unstable();
        Ok(out)
    }
}

impl From<isize> for Axes {
    fn from(axis: isize) -> Self {
        Axes::One(axis)
    }
}

impl From<Vec<isize>> for Axes {
    fn from(axes: Vec<isize>) -> Self {
        Axes::Many(axes)
    }
}

/// Map a possibly negative axis onto `0..ndim`
pub fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    if resolved < 0 || resolved >= ndim as isize {
        return Err(NpuError::InvalidAxis { axis, ndim });
    }
    Ok(resolved as usize)
}

/// Mode of a QR decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrMode {
    /// Q is m x m, R is m x n
    #[default]
    Complete,
    /// Q is m x k, R is k x n with k = min(m, n)
    Reduced,
}

/// Order of a norm
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormOrd {
    /// Frobenius norm of a matrix
    Fro,
    /// p-norm; `f64::INFINITY`, `f64::NEG_INFINITY` and 0 follow numpy
    P(f64),
}

/// Array creation operations
pub trait CreationOps: Sized {
    type Array: Array;
    type Context;

    /// Uninitialized contents; the buffer is zero-filled by the allocator
    fn empty(ctx: &Self::Context, shape: &[usize], dtype: DType) -> Result<Self::Array>;

    /// Create array of zeros
    fn zeros(ctx: &Self::Context, shape: &[usize], dtype: DType) -> Result<Self::Array>;

    /// Create array of ones
    fn ones(ctx: &Self::Context, shape: &[usize], dtype: DType) -> Result<Self::Array>;

    /// Create array filled with value
    fn full(
        ctx: &Self::Context,
        shape: &[usize],
        dtype: DType,
        value: ScalarValue,
    ) -> Result<Self::Array>;

    /// Create array from range [start, stop) with step
    fn arange(
        ctx: &Self::Context,
        start: f64,
        stop: f64,
        step: f64,
        dtype: DType,
    ) -> Result<Self::Array>;

    /// Create array of evenly spaced values
    fn linspace(
        ctx: &Self::Context,
        start: f64,
        stop: f64,
        num: usize,
        endpoint: bool,
        dtype: DType,
    ) -> Result<Self::Array>;

    /// Ones on the k-th diagonal of an n x m matrix
    fn eye(
        ctx: &Self::Context,
        n: usize,
        m: Option<usize>,
        k: isize,
        dtype: DType,
    ) -> Result<Self::Array>;

    /// Create identity matrix
    fn identity(ctx: &Self::Context, n: usize, dtype: DType) -> Result<Self::Array> {
        Self::eye(ctx, n, None, 0, dtype)
    }

    fn zeros_like(arr: &Self::Array) -> Result<Self::Array>;

    fn full_like(arr: &Self::Array, value: ScalarValue) -> Result<Self::Array>;
}

/// Element-wise math operations
pub trait MathOps {
    type Array: Array;

    fn unary(op: UnaryOp, arr: &Self::Array) -> Result<Self::Array>;

    /// Binary op over broadcast operands
    fn binary(op: BinaryOp, a: &Self::Array, b: &Self::Array) -> Result<Self::Array>;

    /// Round half to even at `decimals` decimal places
    fn around(arr: &Self::Array, decimals: i32) -> Result<Self::Array>;

    fn clip(arr: &Self::Array, min: f64, max: f64) -> Result<Self::Array>;

    fn add(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Add, a, b)
    }
    fn subtract(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Subtract, a, b)
    }
    fn multiply(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Multiply, a, b)
    }
    fn divide(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Divide, a, b)
    }
    fn power(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Power, a, b)
    }
    fn maximum(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Maximum, a, b)
    }
    fn minimum(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Minimum, a, b)
    }

    fn absolute(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Absolute, arr)
    }
    fn negative(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Negative, arr)
    }
    fn sqrt(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Sqrt, arr)
    }
    fn exp(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Exp, arr)
    }
    fn log(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Log, arr)
    }
    fn sin(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Sin, arr)
    }
    fn cos(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Cos, arr)
    }
}

/// Comparison and logical operations
pub trait CompareOps: MathOps {
    fn equal(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Equal, a, b)
    }
    fn not_equal(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::NotEqual, a, b)
    }
    fn less(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Less, a, b)
    }
    fn less_equal(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::LessEqual, a, b)
    }
    fn greater(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::Greater, a, b)
    }
    fn greater_equal(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::GreaterEqual, a, b)
    }
    fn logical_and(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::LogicalAnd, a, b)
    }
    fn logical_or(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::LogicalOr, a, b)
    }
    fn logical_xor(a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        Self::binary(BinaryOp::LogicalXor, a, b)
    }
    fn logical_not(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::LogicalNot, arr)
    }

    fn isnan(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Isnan, arr)
    }
    fn isinf(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Isinf, arr)
    }
    fn isfinite(arr: &Self::Array) -> Result<Self::Array> {
        Self::unary(UnaryOp::Isfinite, arr)
    }
}

/// Statistical/reduction operations
pub trait StatsOps {
    type Array: Array;

    fn reduce(
        op: ReduceOp,
        arr: &Self::Array,
        axes: &Axes,
        keepdims: bool,
    ) -> Result<Self::Array>;

    /// Running reduction along `axis`; `None` flattens first
    fn accumulate(op: AccumulateOp, arr: &Self::Array, axis: Option<isize>)
        -> Result<Self::Array>;

    fn sum(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::Sum, arr, axes, keepdims)
    }
    fn prod(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::Prod, arr, axes, keepdims)
    }
    fn mean(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::Mean, arr, axes, keepdims)
    }
    fn max(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::Max, arr, axes, keepdims)
    }
    fn min(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::Min, arr, axes, keepdims)
    }
    fn all(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::All, arr, axes, keepdims)
    }
    fn any(arr: &Self::Array, axes: &Axes, keepdims: bool) -> Result<Self::Array> {
        Self::reduce(ReduceOp::Any, arr, axes, keepdims)
    }

    fn cumsum(arr: &Self::Array, axis: Option<isize>) -> Result<Self::Array> {
        Self::accumulate(AccumulateOp::Cumsum, arr, axis)
    }
    fn cumprod(arr: &Self::Array, axis: Option<isize>) -> Result<Self::Array> {
        Self::accumulate(AccumulateOp::Cumprod, arr, axis)
    }
}

/// Linear algebra operations
pub trait LinalgOps {
    type Array: Array;

    /// Matrix product with numpy 1-D promotion and batch broadcasting
    fn matmul(a: &Self::Array, b: &Self::Array) -> Result<Self::Array>;

    /// Dot product (1D), matrix multiply (2D) or last-axis contraction (N-D)
    fn dot(a: &Self::Array, b: &Self::Array) -> Result<Self::Array>;

    /// Dot product of flattened operands, conjugating the first
    fn vdot(a: &Self::Array, b: &Self::Array) -> Result<Self::Array>;

    /// Inner product over the last axes
    fn inner(a: &Self::Array, b: &Self::Array) -> Result<Self::Array>;

    /// Outer product of flattened operands
    fn outer(a: &Self::Array, b: &Self::Array) -> Result<Self::Array>;

    /// Determinant
    fn det(arr: &Self::Array) -> Result<Self::Array>;

    /// Sign and natural log of the absolute determinant
    fn slogdet(arr: &Self::Array) -> Result<(Self::Array, Self::Array)>;

    /// Matrix inverse
    fn inv(arr: &Self::Array) -> Result<Self::Array>;

    /// QR decomposition
    fn qr(arr: &Self::Array, mode: QrMode) -> Result<(Self::Array, Self::Array)>;

    fn matrix_power(arr: &Self::Array, n: i64) -> Result<Self::Array>;

    /// Einstein summation over `operands`
    fn einsum(subscripts: &str, operands: &[&Self::Array]) -> Result<Self::Array>;

    /// Matrix/vector norm
    fn norm(
        arr: &Self::Array,
        ord: Option<NormOrd>,
        axes: &Axes,
        keepdims: bool,
    ) -> Result<Self::Array>;

    /// Sum of the main diagonal over the last two axes
    fn trace(arr: &Self::Array) -> Result<Self::Array>;

    /// Reverse the axes
    fn transpose(arr: &Self::Array) -> Result<Self::Array>;
}

/// Random number generation
pub trait RandomOps {
    type Array: Array;
    type Context;

    /// Set random seed
    fn seed(ctx: &Self::Context, seed: u64);

    /// Uniform distribution [low, high)
    fn uniform(
        ctx: &Self::Context,
        low: f64,
        high: f64,
        shape: &[usize],
        dtype: DType,
    ) -> Result<Self::Array>;

    /// Normal distribution
    fn normal(
        ctx: &Self::Context,
        loc: f64,
        scale: f64,
        shape: &[usize],
        dtype: DType,
    ) -> Result<Self::Array>;

    /// Pareto II (Lomax) distribution with shape `a`
    fn pareto(ctx: &Self::Context, a: f64, shape: &[usize], dtype: DType)
        -> Result<Self::Array>;

    /// Rayleigh distribution
    fn rayleigh(
        ctx: &Self::Context,
        scale: f64,
        shape: &[usize],
        dtype: DType,
    ) -> Result<Self::Array>;
}
