//! Codecs for narrow (8-bit and smaller) floating formats
//!
//! Every narrow format is described by a [`FloatLayout`] and stored one
//! element per byte, right-aligned. Encoding rounds to nearest, ties to
//! even; values past the largest finite magnitude follow the layout's
//! [`Special`] rule.

use crate::error::{NpuError, Result};
use serde::{Deserialize, Serialize};

/// How a narrow format spends its all-ones exponent field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Special {
    /// All-ones exponent encodes inf (zero mantissa) and NaN (non-zero mantissa)
    Ieee,
    /// Only the all-ones pattern is NaN; no infinities. Overflow saturates
    FiniteNan,
    /// Every pattern is finite. NaN and overflow saturate
    Finite,
    /// Mantissa-less power-of-two scale; all-ones is NaN, no zero, no sign
    ExponentOnly,
}

/// Bit layout of a narrow floating format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatLayout {
    pub exponent_bits: u8,
    pub mantissa_bits: u8,
    pub bias: i32,
    pub signed: bool,
    pub special: Special,
}

impl FloatLayout {
    pub const fn new(exponent_bits: u8, mantissa_bits: u8, bias: i32, special: Special) -> Self {
        Self {
            exponent_bits,
            mantissa_bits,
            bias,
            signed: !matches!(special, Special::ExponentOnly),
            special,
        }
    }

    /// Total width in bits, sign included
    pub const fn bits(&self) -> u32 {
        self.signed as u32 + self.exponent_bits as u32 + self.mantissa_bits as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.exponent_bits == 0 || self.bits() > 8 {
            return Err(NpuError::MalformedDType(format!(
                "narrow layout must have 1..=8 bits with a non-empty exponent, got e{}m{}",
                self.exponent_bits, self.mantissa_bits
            )));
        }
        let ok = match self.special {
            Special::Ieee => self.mantissa_bits > 0 && self.exponent_bits > 1,
            Special::FiniteNan => self.mantissa_bits > 0 || self.exponent_bits > 1,
            Special::Finite => true,
            Special::ExponentOnly => self.mantissa_bits == 0 && self.exponent_bits > 1,
        };
        if !ok {
            return Err(NpuError::MalformedDType(format!(
                "layout e{}m{} cannot carry {:?} special values",
                self.exponent_bits, self.mantissa_bits, self.special
            )));
        }
        Ok(())
    }

    fn exponent_mask(&self) -> u32 {
        (1 << self.exponent_bits) - 1
    }

    fn mantissa_mask(&self) -> u32 {
        (1 << self.mantissa_bits) - 1
    }

    fn sign_bit(&self) -> u32 {
        if self.signed {
            1 << (self.exponent_bits + self.mantissa_bits)
        } else {
            0
        }
    }

    fn max_field(&self) -> i32 {
        match self.special {
            Special::Ieee | Special::ExponentOnly => self.exponent_mask() as i32 - 1,
            Special::FiniteNan | Special::Finite => self.exponent_mask() as i32,
        }
    }

    fn max_mantissa(&self) -> u32 {
        match self.special {
            Special::FiniteNan => self.mantissa_mask().saturating_sub(1),
            _ => self.mantissa_mask(),
        }
    }

    /// Smallest unbiased exponent of a normal value
    fn emin(&self) -> i32 {
        match self.special {
            Special::ExponentOnly => -self.bias,
            _ => 1 - self.bias,
        }
    }

    fn max_bits(&self) -> u32 {
        ((self.max_field() as u32) << self.mantissa_bits) | self.max_mantissa()
    }

    fn nan_bits(&self) -> Option<u32> {
        match self.special {
            Special::Ieee => Some(
                (self.exponent_mask() << self.mantissa_bits) | (1 << (self.mantissa_bits - 1)),
            ),
            Special::FiniteNan => {
                Some((self.exponent_mask() << self.mantissa_bits) | self.mantissa_mask())
            }
            Special::ExponentOnly => Some(self.exponent_mask()),
            Special::Finite => None,
        }
    }

    /// Largest finite magnitude
    pub fn max_finite(&self) -> f64 {
        decode_magnitude(self, self.max_field() as u32, self.max_mantissa())
    }

    /// Smallest positive magnitude (subnormal where the layout has them)
    pub fn min_positive(&self) -> f64 {
        match self.special {
            Special::ExponentOnly => 2f64.powi(self.emin()),
            _ if self.mantissa_bits == 0 => 2f64.powi(self.emin()),
            _ => 2f64.powi(self.emin() - self.mantissa_bits as i32),
        }
    }

    /// Relative spacing of values in [1, 2)
    pub fn epsilon(&self) -> f64 {
        2f64.powi(-(self.mantissa_bits as i32))
    }

    pub fn has_nan(&self) -> bool {
        self.nan_bits().is_some()
    }

    pub fn has_infinity(&self) -> bool {
        self.special == Special::Ieee
    }
}

fn decode_magnitude(layout: &FloatLayout, field: u32, mantissa: u32) -> f64 {
    let m = layout.mantissa_bits as i32;
    if field == 0 && layout.special != Special::ExponentOnly {
        mantissa as f64 * 2f64.powi(layout.emin() - m)
    } else {
        let frac = 1.0 + mantissa as f64 / (1u32 << m) as f64;
        frac * 2f64.powi(field as i32 - layout.bias)
    }
}

/// Exact `floor(log2(a))` for finite positive `a`
fn exponent_of(a: f64) -> i32 {
    let biased = ((a.to_bits() >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // f64 subnormals sit far below every narrow format
        -1075
    } else {
        biased - 1023
    }
}

fn round_even(x: f64) -> u32 {
    x.round_ties_even() as u32
}

/// Encode `value` into the low bits of a byte
pub fn encode(layout: &FloatLayout, value: f64) -> u8 {
    let m = layout.mantissa_bits as i32;
    let sign = if value.is_sign_negative() { layout.sign_bit() } else { 0 };

    if value.is_nan() {
        return match layout.nan_bits() {
            Some(nan) => (sign | nan) as u8,
            None => (sign | layout.max_bits()) as u8,
        };
    }
    if !layout.signed && value < 0.0 {
        return layout.nan_bits().unwrap_or(0) as u8;
    }

    let a = value.abs();
    if a.is_infinite() {
        return match layout.special {
            Special::Ieee => (sign | (layout.exponent_mask() << layout.mantissa_bits)) as u8,
            Special::FiniteNan => (sign | layout.nan_bits().unwrap_or(0)) as u8,
            Special::Finite | Special::ExponentOnly => (sign | layout.max_bits()) as u8,
        };
    }
    if a == 0.0 {
        return sign as u8;
    }

    let mut exp = exponent_of(a);
    let emin = layout.emin();
    if exp < emin {
        if layout.special == Special::ExponentOnly {
            return 0;
        }
        // Subnormal: the quantum is fixed at 2^(emin - m); q == 2^m lands on
        // the smallest normal, which is the same bit pattern.
        let q = round_even(a * 2f64.powi(m - emin));
        return (sign | q) as u8;
    }

    let mut q = round_even(a * 2f64.powi(m - exp));
    if q >= 1 << (m + 1) {
        q >>= 1;
        exp += 1;
    }
    let field = exp + layout.bias;
    let mantissa = q - (1 << m);
    let overflow = field > layout.max_field()
        || (field == layout.max_field() && mantissa > layout.max_mantissa());
    if overflow {
        return match layout.special {
            Special::Ieee => (sign | (layout.exponent_mask() << layout.mantissa_bits)) as u8,
            _ => (sign | layout.max_bits()) as u8,
        };
    }
    (sign | ((field as u32) << layout.mantissa_bits) | mantissa) as u8
}

/// Decode the low bits of `bits`; bits above the layout width are ignored
pub fn decode(layout: &FloatLayout, bits: u8) -> f64 {
    let bits = bits as u32 & ((1u32 << layout.bits()) - 1);
    let mantissa = bits & layout.mantissa_mask();
    let field = (bits >> layout.mantissa_bits) & layout.exponent_mask();
    let negative = bits & layout.sign_bit() != 0;

    let all_ones = field == layout.exponent_mask();
    let magnitude = match layout.special {
        Special::Ieee if all_ones => {
            if mantissa == 0 {
                f64::INFINITY
            } else {
                return f64::NAN;
            }
        }
        Special::FiniteNan if all_ones && mantissa == layout.mantissa_mask() => return f64::NAN,
        Special::ExponentOnly if all_ones => return f64::NAN,
        _ => decode_magnitude(layout, field, mantissa),
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}
