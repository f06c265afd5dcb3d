//! Data types supported by npuarray
//!
//! A [`DType`] is a cheap `Copy` handle to a `'static` [`DTypeDescriptor`].
//! The built-in catalog lives in constants below; narrow floating formats
//! registered at runtime get a leaked descriptor (see
//! [`TypeRegistry::register`](crate::registry::TypeRegistry::register)).

use crate::minifloat::{self, FloatLayout, Special};
use half::{bf16, f16};
use num_complex::Complex64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Numeric kind of a dtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Bool,
    UInt,
    Int,
    Float,
    Complex,
}

/// Storage format of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Bool,
    Int { bytes: u8, signed: bool },
    Float16,
    BFloat16,
    Float32,
    Float64,
    /// One byte per element, decoded through a [`FloatLayout`]
    Narrow(FloatLayout),
    Complex64,
    Complex128,
}

#[derive(Debug)]
pub struct DTypeDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub format: Format,
    /// Vendor runtime enum value; stable once assigned
    pub vendor_code: i32,
}

/// Handle to a registered dtype
#[derive(Clone, Copy)]
pub struct DType(&'static DTypeDescriptor);

macro_rules! builtin {
    ($konst:ident, $name:literal, [$($alias:literal),*], $format:expr, $code:literal) => {
        pub const $konst: DType = DType(&DTypeDescriptor {
            name: $name,
            aliases: &[$($alias),*],
            format: $format,
            vendor_code: $code,
        });
    };
}

impl DType {
    builtin!(BOOL, "bool", ["bool_", "?", "b1"], Format::Bool, 12);
    builtin!(INT8, "int8", ["i1", "b", "byte"], Format::Int { bytes: 1, signed: true }, 2);
    builtin!(INT16, "int16", ["i2", "h", "short"], Format::Int { bytes: 2, signed: true }, 6);
    builtin!(INT32, "int32", ["i4", "i", "intc"], Format::Int { bytes: 4, signed: true }, 3);
    builtin!(
        INT64,
        "int64",
        ["i8", "l", "q", "int", "int_", "long", "longlong"],
        Format::Int { bytes: 8, signed: true },
        9
    );
    builtin!(UINT8, "uint8", ["u1", "B", "ubyte"], Format::Int { bytes: 1, signed: false }, 4);
    builtin!(UINT16, "uint16", ["u2", "H", "ushort"], Format::Int { bytes: 2, signed: false }, 7);
    builtin!(UINT32, "uint32", ["u4", "I", "uintc"], Format::Int { bytes: 4, signed: false }, 8);
    builtin!(
        UINT64,
        "uint64",
        ["u8", "L", "Q", "uint", "ulong", "ulonglong"],
        Format::Int { bytes: 8, signed: false },
        10
    );
    builtin!(FLOAT16, "float16", ["f2", "e", "half"], Format::Float16, 1);
    builtin!(BFLOAT16, "bfloat16", ["bf16"], Format::BFloat16, 27);
    builtin!(FLOAT32, "float32", ["f4", "f", "single"], Format::Float32, 0);
    builtin!(
        FLOAT64,
        "float64",
        ["f8", "d", "double", "float", "float_"],
        Format::Float64,
        11
    );
    builtin!(COMPLEX64, "complex64", ["c8", "F", "csingle"], Format::Complex64, 16);
    builtin!(
        COMPLEX128,
        "complex128",
        ["c16", "D", "cdouble", "complex", "complex_"],
        Format::Complex128,
        17
    );
    builtin!(
        FLOAT8_E5M2,
        "float8_e5m2",
        [],
        Format::Narrow(FloatLayout::new(5, 2, 15, Special::Ieee)),
        35
    );
    builtin!(
        FLOAT8_E4M3FN,
        "float8_e4m3fn",
        [],
        Format::Narrow(FloatLayout::new(4, 3, 7, Special::FiniteNan)),
        36
    );
    builtin!(
        FLOAT8_E8M0,
        "float8_e8m0",
        ["float8_e8m0fnu"],
        Format::Narrow(FloatLayout::new(8, 0, 127, Special::ExponentOnly)),
        37
    );
    builtin!(
        FLOAT6_E3M2,
        "float6_e3m2",
        ["float6_e3m2fn"],
        Format::Narrow(FloatLayout::new(3, 2, 3, Special::Finite)),
        38
    );
    builtin!(
        FLOAT6_E2M3,
        "float6_e2m3",
        ["float6_e2m3fn"],
        Format::Narrow(FloatLayout::new(2, 3, 1, Special::Finite)),
        39
    );
    builtin!(
        FLOAT4_E2M1,
        "float4_e2m1",
        ["float4_e2m1fn"],
        Format::Narrow(FloatLayout::new(2, 1, 1, Special::Finite)),
        40
    );

    /// The built-in catalog, in vendor-code order
    pub const BUILTINS: [DType; 21] = [
        DType::FLOAT32,
        DType::FLOAT16,
        DType::INT8,
        DType::INT32,
        DType::UINT8,
        DType::INT16,
        DType::UINT16,
        DType::UINT32,
        DType::INT64,
        DType::UINT64,
        DType::FLOAT64,
        DType::BOOL,
        DType::COMPLEX64,
        DType::COMPLEX128,
        DType::BFLOAT16,
        DType::FLOAT8_E5M2,
        DType::FLOAT8_E4M3FN,
        DType::FLOAT8_E8M0,
        DType::FLOAT6_E3M2,
        DType::FLOAT6_E2M3,
        DType::FLOAT4_E2M1,
    ];

    pub(crate) fn from_descriptor(descriptor: &'static DTypeDescriptor) -> Self {
        DType(descriptor)
    }

    /// Look up a built-in dtype by canonical name or alias
    pub fn builtin(name: &str) -> Option<DType> {
        DType::BUILTINS.into_iter().find(|d| d.matches(name))
    }

    pub fn descriptor(&self) -> &'static DTypeDescriptor {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        self.0.aliases
    }

    pub fn matches(&self, name: &str) -> bool {
        self.0.name == name || self.0.aliases.contains(&name)
    }

    pub fn format(&self) -> Format {
        self.0.format
    }

    pub fn vendor_code(&self) -> i32 {
        self.0.vendor_code
    }

    /// Size in bytes
    pub fn itemsize(&self) -> usize {
        match self.0.format {
            Format::Bool | Format::Narrow(_) => 1,
            Format::Int { bytes, .. } => bytes as usize,
            Format::Float16 | Format::BFloat16 => 2,
            Format::Float32 => 4,
            Format::Float64 | Format::Complex64 => 8,
            Format::Complex128 => 16,
        }
    }

    pub fn kind(&self) -> Kind {
        match self.0.format {
            Format::Bool => Kind::Bool,
            Format::Int { signed: true, .. } => Kind::Int,
            Format::Int { signed: false, .. } => Kind::UInt,
            Format::Float16
            | Format::BFloat16
            | Format::Float32
            | Format::Float64
            | Format::Narrow(_) => Kind::Float,
            Format::Complex64 | Format::Complex128 => Kind::Complex,
        }
    }

    pub fn layout(&self) -> Option<FloatLayout> {
        match self.0.format {
            Format::Narrow(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == Kind::Bool
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind(), Kind::Int | Kind::UInt)
    }

    pub fn is_float(&self) -> bool {
        self.kind() == Kind::Float
    }

    pub fn is_complex(&self) -> bool {
        self.kind() == Kind::Complex
    }

    pub fn is_narrow(&self) -> bool {
        self.layout().is_some()
    }

    /// Width of the stored value in bits (sub-byte for narrow formats)
    pub fn bits(&self) -> u32 {
        match self.layout() {
            Some(layout) => layout.bits(),
            None => self.itemsize() as u32 * 8,
        }
    }

    /// `(exponent_bits, mantissa_bits, signed)` of a real floating dtype
    pub fn float_shape(&self) -> Option<(u8, u8, bool)> {
        match self.0.format {
            Format::Float16 => Some((5, 10, true)),
            Format::BFloat16 => Some((8, 7, true)),
            Format::Float32 => Some((8, 23, true)),
            Format::Float64 => Some((11, 52, true)),
            Format::Narrow(l) => Some((l.exponent_bits, l.mantissa_bits, l.signed)),
            _ => None,
        }
    }

    /// Inclusive value range of an integer dtype
    pub fn int_range(&self) -> Option<(f64, f64)> {
        match self.0.format {
            Format::Int { bytes, signed: true } => {
                let half = 2f64.powi(bytes as i32 * 8 - 1);
                Some((-half, half - 1.0))
            }
            Format::Int { bytes, signed: false } => Some((0.0, 2f64.powi(bytes as i32 * 8) - 1.0)),
            _ => None,
        }
    }

    /// Real component width for complex dtypes, or self
    pub fn real_part(&self) -> DType {
        match self.0.format {
            Format::Complex64 => DType::FLOAT32,
            Format::Complex128 => DType::FLOAT64,
            _ => *self,
        }
    }

    /// Read one element as f64 (the real part of complex values)
    pub fn read_f64(&self, bytes: &[u8]) -> f64 {
        match self.0.format {
            Format::Bool => (bytes[0] != 0) as u8 as f64,
            Format::Int { bytes: 1, signed: true } => bytes[0] as i8 as f64,
            Format::Int { bytes: 1, signed: false } => bytes[0] as f64,
            Format::Int { bytes: 2, signed: true } => i16::from_le_bytes(le(bytes)) as f64,
            Format::Int { bytes: 2, signed: false } => u16::from_le_bytes(le(bytes)) as f64,
            Format::Int { bytes: 4, signed: true } => i32::from_le_bytes(le(bytes)) as f64,
            Format::Int { bytes: 4, signed: false } => u32::from_le_bytes(le(bytes)) as f64,
            Format::Int { signed: true, .. } => i64::from_le_bytes(le(bytes)) as f64,
            Format::Int { signed: false, .. } => u64::from_le_bytes(le(bytes)) as f64,
            Format::Float16 => f16::from_le_bytes(le(bytes)).to_f64(),
            Format::BFloat16 => bf16::from_le_bytes(le(bytes)).to_f64(),
            Format::Float32 | Format::Complex64 => f32::from_le_bytes(le(bytes)) as f64,
            Format::Float64 | Format::Complex128 => f64::from_le_bytes(le(bytes)),
            Format::Narrow(layout) => minifloat::decode(&layout, bytes[0]),
        }
    }

    /// Write one element from f64, rounding and saturating as the format requires
    pub fn write_f64(&self, value: f64, out: &mut [u8]) {
        match self.0.format {
            Format::Bool => out[0] = (value != 0.0) as u8,
            Format::Int { bytes: 1, signed: true } => out[0] = value as i8 as u8,
            Format::Int { bytes: 1, signed: false } => out[0] = value as u8,
            Format::Int { bytes: 2, signed: true } => put(out, &(value as i16).to_le_bytes()),
            Format::Int { bytes: 2, signed: false } => put(out, &(value as u16).to_le_bytes()),
            Format::Int { bytes: 4, signed: true } => put(out, &(value as i32).to_le_bytes()),
            Format::Int { bytes: 4, signed: false } => put(out, &(value as u32).to_le_bytes()),
            Format::Int { signed: true, .. } => put(out, &(value as i64).to_le_bytes()),
            Format::Int { signed: false, .. } => put(out, &(value as u64).to_le_bytes()),
            Format::Float16 => put(out, &f16::from_f64(value).to_le_bytes()),
            Format::BFloat16 => put(out, &bf16::from_f64(value).to_le_bytes()),
            Format::Float32 => put(out, &(value as f32).to_le_bytes()),
            Format::Float64 => put(out, &value.to_le_bytes()),
            Format::Complex64 | Format::Complex128 => {
                self.write_complex(Complex64::new(value, 0.0), out)
            }
            Format::Narrow(layout) => out[0] = minifloat::encode(&layout, value),
        }
    }

    /// Read one element as an exact integer; float formats truncate toward zero
    pub fn read_int(&self, bytes: &[u8]) -> i128 {
        match self.0.format {
            Format::Bool => (bytes[0] != 0) as i128,
            Format::Int { bytes: 1, signed: true } => bytes[0] as i8 as i128,
            Format::Int { bytes: 1, signed: false } => bytes[0] as i128,
            Format::Int { bytes: 2, signed: true } => i16::from_le_bytes(le(bytes)) as i128,
            Format::Int { bytes: 2, signed: false } => u16::from_le_bytes(le(bytes)) as i128,
            Format::Int { bytes: 4, signed: true } => i32::from_le_bytes(le(bytes)) as i128,
            Format::Int { bytes: 4, signed: false } => u32::from_le_bytes(le(bytes)) as i128,
            Format::Int { signed: true, .. } => i64::from_le_bytes(le(bytes)) as i128,
            Format::Int { signed: false, .. } => u64::from_le_bytes(le(bytes)) as i128,
            _ => self.read_f64(bytes) as i128,
        }
    }

    /// Write one element from an integer, keeping the low bits for integer
    /// formats so out-of-range values wrap in two's complement
    pub fn write_int(&self, value: i128, out: &mut [u8]) {
        match self.0.format {
            Format::Bool => out[0] = (value != 0) as u8,
            Format::Int { bytes, .. } => put(out, &value.to_le_bytes()[..bytes as usize]),
            _ => self.write_f64(value as f64, out),
        }
    }

    pub fn read_complex(&self, bytes: &[u8]) -> Complex64 {
        match self.0.format {
            Format::Complex64 => Complex64::new(
                f32::from_le_bytes(le(bytes)) as f64,
                f32::from_le_bytes(le(&bytes[4..])) as f64,
            ),
            Format::Complex128 => Complex64::new(
                f64::from_le_bytes(le(bytes)),
                f64::from_le_bytes(le(&bytes[8..])),
            ),
            _ => Complex64::new(self.read_f64(bytes), 0.0),
        }
    }

    /// Write a complex value; real targets keep only the real part
    pub fn write_complex(&self, value: Complex64, out: &mut [u8]) {
        match self.0.format {
            Format::Complex64 => {
                put(out, &(value.re as f32).to_le_bytes());
                put(&mut out[4..], &(value.im as f32).to_le_bytes());
            }
            Format::Complex128 => {
                put(out, &value.re.to_le_bytes());
                put(&mut out[8..], &value.im.to_le_bytes());
            }
            _ => self.write_f64(value.re, out),
        }
    }

    /// Round `value` to the nearest value representable in this dtype
    pub fn quantize(&self, value: f64) -> f64 {
        let mut buf = [0u8; 16];
        self.write_f64(value, &mut buf);
        self.read_f64(&buf)
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn put(out: &mut [u8], bytes: &[u8]) {
    out[..bytes.len()].copy_from_slice(bytes);
}

/// Convert a value of dtype `from` to the nearest value of dtype `to`
///
/// The value is first snapped to `from`, then rounded (ties to even) and
/// saturated into `to`.
pub fn convert(value: f64, from: DType, to: DType) -> f64 {
    to.quantize(from.quantize(value))
}

/// Vendor runtime enum code for `dtype`
pub fn device_code(dtype: DType) -> i32 {
    dtype.vendor_code()
}

impl PartialEq for DType {
    fn eq(&self, other: &Self) -> bool {
        self.0.vendor_code == other.0.vendor_code
    }
}

impl Eq for DType {}

impl std::hash::Hash for DType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.vendor_code.hash(state);
    }
}

impl std::fmt::Debug for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DType({})", self.0.name)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl Default for DType {
    fn default() -> Self {
        DType::FLOAT64
    }
}

impl Serialize for DType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.name)
    }
}

impl<'de> Deserialize<'de> for DType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        DType::builtin(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown builtin dtype '{name}'")))
    }
}
