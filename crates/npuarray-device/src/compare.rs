//! Comparison, logical and classification kernels

use crate::broadcast::broadcast_binary_op;
use crate::kernel;
use crate::{DeviceBackend, NdArray};
use ndarray::ArrayD;
use npuarray_core::ops::{BinaryOp, CompareOps, UnaryOp};
use npuarray_core::{DType, Result};
use num_complex::Complex64;

/// Bool-valued binary ops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Relation {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Xor,
}

impl Relation {
    pub fn of(op: BinaryOp) -> Option<Self> {
        Some(match op {
            BinaryOp::Equal => Relation::Equal,
            BinaryOp::NotEqual => Relation::NotEqual,
            BinaryOp::Less => Relation::Less,
            BinaryOp::LessEqual => Relation::LessEqual,
            BinaryOp::Greater => Relation::Greater,
            BinaryOp::GreaterEqual => Relation::GreaterEqual,
            BinaryOp::LogicalAnd => Relation::And,
            BinaryOp::LogicalOr => Relation::Or,
            BinaryOp::LogicalXor => Relation::Xor,
            _ => return None,
        })
    }

    /// Whether `x` and `y` stand in this relation; `nonzero` gives truth
    /// values for the logical ops
    pub fn holds<T: PartialOrd>(self, x: T, y: T, nonzero: impl Fn(&T) -> bool) -> bool {
        match self {
            Relation::Equal => x == y,
            Relation::NotEqual => x != y,
            Relation::Less => x < y,
            Relation::LessEqual => x <= y,
            Relation::Greater => x > y,
            Relation::GreaterEqual => x >= y,
            Relation::And => nonzero(&x) && nonzero(&y),
            Relation::Or => nonzero(&x) || nonzero(&y),
            Relation::Xor => nonzero(&x) != nonzero(&y),
        }
    }
}

/// Evaluate `rel` over broadcast operands in the lanes `common` needs
///
/// Integer operands compare exactly; complex values order lexicographically.
pub(crate) fn relate(
    rel: Relation,
    a: &NdArray,
    b: &NdArray,
    common: DType,
) -> Result<ArrayD<bool>> {
    if common.is_complex() {
        let x = kernel::load(a)?.into_complex();
        let y = kernel::load(b)?.into_complex();
        let nonzero = |z: &(f64, f64)| z.0 != 0.0 || z.1 != 0.0;
        return broadcast_binary_op(&x, &y, |x: Complex64, y: Complex64| {
            rel.holds((x.re, x.im), (y.re, y.im), nonzero)
        });
    }
    if kernel::is_exact(common) {
        let x = kernel::load_int(a)?;
        let y = kernel::load_int(b)?;
        return broadcast_binary_op(&x, &y, |x, y| rel.holds(x, y, |v| *v != 0));
    }
    let x = kernel::load_real(a)?;
    let y = kernel::load_real(b)?;
    broadcast_binary_op(&x, &y, |x, y| rel.holds(x, y, |v| *v != 0.0))
}

/// Bool-valued unary ops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Predicate {
    Signbit,
    Isnan,
    Isinf,
    Isfinite,
    Isposinf,
    Isneginf,
    Not,
}

impl Predicate {
    pub fn of(op: UnaryOp) -> Option<Self> {
        Some(match op {
            UnaryOp::Signbit => Predicate::Signbit,
            UnaryOp::Isnan => Predicate::Isnan,
            UnaryOp::Isinf => Predicate::Isinf,
            UnaryOp::Isfinite => Predicate::Isfinite,
            UnaryOp::Isposinf => Predicate::Isposinf,
            UnaryOp::Isneginf => Predicate::Isneginf,
            UnaryOp::LogicalNot => Predicate::Not,
            _ => return None,
        })
    }

    pub fn holds(self, x: f64) -> bool {
        match self {
            Predicate::Signbit => x.is_sign_negative(),
            Predicate::Isnan => x.is_nan(),
            Predicate::Isinf => x.is_infinite(),
            Predicate::Isfinite => x.is_finite(),
            Predicate::Isposinf => x == f64::INFINITY,
            Predicate::Isneginf => x == f64::NEG_INFINITY,
            Predicate::Not => x == 0.0,
        }
    }
}

impl CompareOps for DeviceBackend {}
