//! Binary promotion table

use crate::dtype::{DType, Kind};

/// Result dtype of a binary elementwise operation on `a` and `b`
pub fn promote(a: DType, b: DType) -> DType {
    if a == b {
        return a;
    }
    match (a.kind(), b.kind()) {
        (Kind::Bool, _) => b,
        (_, Kind::Bool) => a,
        (Kind::Complex, _) | (_, Kind::Complex) => promote_complex(a, b),
        (Kind::Float, Kind::Float) => promote_float(a, b),
        (Kind::Float, _) => a,
        (_, Kind::Float) => b,
        (Kind::Int, Kind::Int) | (Kind::UInt, Kind::UInt) => {
            if a.itemsize() >= b.itemsize() {
                a
            } else {
                b
            }
        }
        (Kind::Int, Kind::UInt) => promote_mixed(a, b),
        (Kind::UInt, Kind::Int) => promote_mixed(b, a),
    }
}

/// Fold [`promote`] over several dtypes
pub fn promote_all(dtypes: &[DType]) -> Option<DType> {
    dtypes.iter().copied().reduce(promote)
}

/// Smallest signed type holding both domains; uint64 has none
fn promote_mixed(signed: DType, unsigned: DType) -> DType {
    match (unsigned.itemsize() * 2).max(signed.itemsize()) {
        2 => DType::INT16,
        4 => DType::INT32,
        8 => DType::INT64,
        _ => DType::FLOAT64,
    }
}

fn dominates(a: DType, b: DType) -> bool {
    match (a.float_shape(), b.float_shape()) {
        (Some((ea, ma, sa)), Some((eb, mb, sb))) => ea >= eb && ma >= mb && (sa || !sb),
        _ => false,
    }
}

fn promote_float(a: DType, b: DType) -> DType {
    match (dominates(a, b), dominates(b, a)) {
        // identical layouts under different names: lowest vendor code wins
        (true, true) => {
            if a.vendor_code() <= b.vendor_code() {
                a
            } else {
                b
            }
        }
        (true, false) => a,
        (false, true) => b,
        (false, false) => [DType::FLOAT16, DType::FLOAT32, DType::FLOAT64]
            .into_iter()
            .find(|c| dominates(*c, a) && dominates(*c, b))
            .unwrap_or(DType::FLOAT64),
    }
}

fn promote_complex(a: DType, b: DType) -> DType {
    let wide = [a, b].into_iter().any(|d| {
        d == DType::COMPLEX128
            || d == DType::FLOAT64
            || (d.is_integer() && d.itemsize() >= 4)
    });
    if wide {
        DType::COMPLEX128
    } else {
        DType::COMPLEX64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_and_bool() {
        assert_eq!(promote(DType::FLOAT8_E5M2, DType::FLOAT8_E5M2), DType::FLOAT8_E5M2);
        assert_eq!(promote(DType::BOOL, DType::INT8), DType::INT8);
        assert_eq!(promote(DType::FLOAT4_E2M1, DType::BOOL), DType::FLOAT4_E2M1);
    }

    #[test]
    fn test_integers() {
        assert_eq!(promote(DType::INT8, DType::INT32), DType::INT32);
        assert_eq!(promote(DType::UINT16, DType::UINT8), DType::UINT16);
        assert_eq!(promote(DType::INT8, DType::UINT8), DType::INT16);
        assert_eq!(promote(DType::UINT16, DType::INT32), DType::INT32);
        assert_eq!(promote(DType::UINT32, DType::INT8), DType::INT64);
        assert_eq!(promote(DType::INT64, DType::UINT64), DType::FLOAT64);
    }

    #[test]
    fn test_int_float() {
        assert_eq!(promote(DType::INT32, DType::FLOAT32), DType::FLOAT32);
        assert_eq!(promote(DType::FLOAT16, DType::UINT8), DType::FLOAT16);
    }

    #[test]
    fn test_floats() {
        assert_eq!(promote(DType::FLOAT32, DType::FLOAT64), DType::FLOAT64);
        assert_eq!(promote(DType::FLOAT16, DType::BFLOAT16), DType::FLOAT32);
        assert_eq!(promote(DType::FLOAT8_E5M2, DType::FLOAT16), DType::FLOAT16);
        assert_eq!(promote(DType::FLOAT8_E4M3FN, DType::BFLOAT16), DType::BFLOAT16);
        assert_eq!(promote(DType::FLOAT8_E4M3FN, DType::FLOAT8_E5M2), DType::FLOAT16);
        assert_eq!(promote(DType::FLOAT8_E8M0, DType::FLOAT16), DType::FLOAT32);
        assert_eq!(promote(DType::FLOAT4_E2M1, DType::FLOAT6_E2M3), DType::FLOAT6_E2M3);
    }

    #[test]
    fn test_complex() {
        assert_eq!(promote(DType::COMPLEX64, DType::FLOAT32), DType::COMPLEX64);
        assert_eq!(promote(DType::COMPLEX64, DType::FLOAT64), DType::COMPLEX128);
        assert_eq!(promote(DType::INT16, DType::COMPLEX64), DType::COMPLEX64);
        assert_eq!(promote(DType::INT32, DType::COMPLEX64), DType::COMPLEX128);
    }

    #[test]
    fn test_commutative_over_builtins() {
        for a in DType::BUILTINS {
            for b in DType::BUILTINS {
                assert_eq!(promote(a, b), promote(b, a), "{a} {b}");
            }
        }
    }
}
