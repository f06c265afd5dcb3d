//! Type registry: dtype resolution and runtime registration of narrow floats

use crate::dtype::{DType, DTypeDescriptor, Format};
use crate::error::{NpuError, Result};
use crate::minifloat::FloatLayout;
use half::{bf16, f16};
use num_complex::{Complex32, Complex64};
use std::collections::HashMap;

/// Longest dtype name accepted by [`TypeRegistry::resolve`]
pub const MAX_NAME_LEN: usize = 64;

/// A typed scalar; resolves to its own dtype
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F16(f16),
    BF16(bf16),
    F32(f32),
    F64(f64),
    C64(Complex32),
    C128(Complex64),
}

impl ScalarValue {
    pub fn dtype(&self) -> DType {
        match self {
            ScalarValue::Bool(_) => DType::BOOL,
            ScalarValue::I8(_) => DType::INT8,
            ScalarValue::I16(_) => DType::INT16,
            ScalarValue::I32(_) => DType::INT32,
            ScalarValue::I64(_) => DType::INT64,
            ScalarValue::U8(_) => DType::UINT8,
            ScalarValue::U16(_) => DType::UINT16,
            ScalarValue::U32(_) => DType::UINT32,
            ScalarValue::U64(_) => DType::UINT64,
            ScalarValue::F16(_) => DType::FLOAT16,
            ScalarValue::BF16(_) => DType::BFLOAT16,
            ScalarValue::F32(_) => DType::FLOAT32,
            ScalarValue::F64(_) => DType::FLOAT64,
            ScalarValue::C64(_) => DType::COMPLEX64,
            ScalarValue::C128(_) => DType::COMPLEX128,
        }
    }

    /// Real value as f64 (imaginary part dropped)
    pub fn to_f64(&self) -> f64 {
        self.to_complex().re
    }

    pub fn to_complex(&self) -> Complex64 {
        let re = match *self {
            ScalarValue::Bool(v) => v as u8 as f64,
            ScalarValue::I8(v) => v as f64,
            ScalarValue::I16(v) => v as f64,
            ScalarValue::I32(v) => v as f64,
            ScalarValue::I64(v) => v as f64,
            ScalarValue::U8(v) => v as f64,
            ScalarValue::U16(v) => v as f64,
            ScalarValue::U32(v) => v as f64,
            ScalarValue::U64(v) => v as f64,
            ScalarValue::F16(v) => v.to_f64(),
            ScalarValue::BF16(v) => v.to_f64(),
            ScalarValue::F32(v) => v as f64,
            ScalarValue::F64(v) => v,
            ScalarValue::C64(v) => return Complex64::new(v.re as f64, v.im as f64),
            ScalarValue::C128(v) => return v,
        };
        Complex64::new(re, 0.0)
    }
}

macro_rules! impl_scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(v: $ty) -> Self {
                    ScalarValue::$variant(v)
                }
            }
        )*
    };
}

impl_scalar_from!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    Complex32 => C64,
    Complex64 => C128,
);

/// Anything that names a dtype
#[derive(Debug, Clone, Copy)]
pub enum DTypeLike<'a> {
    Handle(DType),
    Name(&'a str),
    Scalar(ScalarValue),
}

impl From<DType> for DTypeLike<'_> {
    fn from(d: DType) -> Self {
        DTypeLike::Handle(d)
    }
}

impl<'a> From<&'a str> for DTypeLike<'a> {
    fn from(s: &'a str) -> Self {
        DTypeLike::Name(s)
    }
}

impl<'a> From<&'a String> for DTypeLike<'a> {
    fn from(s: &'a String) -> Self {
        DTypeLike::Name(s.as_str())
    }
}

impl From<ScalarValue> for DTypeLike<'_> {
    fn from(v: ScalarValue) -> Self {
        DTypeLike::Scalar(v)
    }
}

/// Description of a narrow floating type to register at runtime
#[derive(Debug, Clone)]
pub struct NarrowFloatSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub layout: FloatLayout,
    pub vendor_code: i32,
}

impl NarrowFloatSpec {
    pub fn new(name: impl Into<String>, layout: FloatLayout, vendor_code: i32) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            layout,
            vendor_code,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Catalog of dtypes known to a context
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_name: HashMap<&'static str, DType>,
    by_code: HashMap<i32, DType>,
    order: Vec<DType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry holding the built-in catalog
    pub fn new() -> Self {
        let mut registry = Self {
            by_name: HashMap::new(),
            by_code: HashMap::new(),
            order: Vec::new(),
        };
        for dtype in DType::BUILTINS {
            registry.insert(dtype);
        }
        registry
    }

    fn insert(&mut self, dtype: DType) {
        self.by_name.insert(dtype.name(), dtype);
        for &alias in dtype.aliases() {
            self.by_name.insert(alias, dtype);
        }
        self.by_code.insert(dtype.vendor_code(), dtype);
        self.order.push(dtype);
    }

    /// Register a narrow floating type
    ///
    /// Rejects a layout that cannot be encoded, and any name, alias or
    /// vendor code already in use. The descriptor lives for the rest of the
    /// process.
    pub fn register(&mut self, spec: NarrowFloatSpec) -> Result<DType> {
        spec.layout.validate()?;
        for name in std::iter::once(&spec.name).chain(spec.aliases.iter()) {
            check_name(name)?;
            if self.by_name.contains_key(name.as_str()) {
                return Err(NpuError::DTypeConflict(format!(
                    "name '{name}' is already registered"
                )));
            }
        }
        if let Some(existing) = self.by_code.get(&spec.vendor_code) {
            return Err(NpuError::DTypeConflict(format!(
                "vendor code {} is already used by {existing}",
                spec.vendor_code
            )));
        }

        let aliases: Vec<&'static str> = spec
            .aliases
            .into_iter()
            .map(|a| &*Box::leak(a.into_boxed_str()))
            .collect();
        let descriptor: &'static DTypeDescriptor = Box::leak(Box::new(DTypeDescriptor {
            name: Box::leak(spec.name.into_boxed_str()),
            aliases: Box::leak(aliases.into_boxed_slice()),
            format: Format::Narrow(spec.layout),
            vendor_code: spec.vendor_code,
        }));
        let dtype = DType::from_descriptor(descriptor);
        self.insert(dtype);
        Ok(dtype)
    }

    /// Resolve a name, handle or typed scalar to a registered dtype
    pub fn resolve<'a>(&self, like: impl Into<DTypeLike<'a>>) -> Result<DType> {
        match like.into() {
            DTypeLike::Handle(dtype) => match self.by_code.get(&dtype.vendor_code()) {
                Some(found) if found.name() == dtype.name() => Ok(*found),
                _ => Err(NpuError::UnknownDType(dtype.name().to_string())),
            },
            DTypeLike::Name(name) => {
                check_name(name)?;
                self.by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| NpuError::UnknownDType(name.to_string()))
            }
            DTypeLike::Scalar(value) => Ok(value.dtype()),
        }
    }

    pub fn by_code(&self, code: i32) -> Option<DType> {
        self.by_code.get(&code).copied()
    }

    pub fn contains(&self, dtype: DType) -> bool {
        self.resolve(dtype).is_ok()
    }

    /// Registered dtypes in registration order
    pub fn iter(&self) -> impl Iterator<Item = DType> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NpuError::MalformedDType("empty dtype name".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NpuError::MalformedDType(format!(
            "dtype name of {} bytes exceeds {MAX_NAME_LEN}",
            name.len()
        )));
    }
    if !name.bytes().all(|b| b.is_ascii_graphic()) {
        let shown: String = name.chars().take(16).flat_map(char::escape_default).collect();
        return Err(NpuError::MalformedDType(format!(
            "dtype name '{shown}' contains non-printable or non-ASCII characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::minifloat::Special;

    #[test]
    fn test_resolve_names_and_aliases() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.resolve("float32").unwrap(), DType::FLOAT32);
        assert_eq!(reg.resolve("f4").unwrap(), DType::FLOAT32);
        assert_eq!(reg.resolve("?").unwrap(), DType::BOOL);
        assert_eq!(reg.resolve("B").unwrap(), DType::UINT8);
        assert_eq!(reg.resolve("b").unwrap(), DType::INT8);
        assert_eq!(reg.resolve("D").unwrap(), DType::COMPLEX128);
        assert_eq!(reg.resolve("float8_e4m3fn").unwrap(), DType::FLOAT8_E4M3FN);
        assert_eq!(reg.resolve(DType::INT16).unwrap(), DType::INT16);
    }

    #[test]
    fn test_resolve_scalars() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.resolve(ScalarValue::from(42i32)).unwrap(), DType::INT32);
        assert_eq!(reg.resolve(ScalarValue::from(1.5f32)).unwrap(), DType::FLOAT32);
        assert_eq!(reg.resolve(ScalarValue::from(true)).unwrap(), DType::BOOL);
        assert_eq!(
            reg.resolve(ScalarValue::from(f16::from_f32(1.0))).unwrap(),
            DType::FLOAT16
        );
        assert_eq!(
            reg.resolve(ScalarValue::from(Complex64::new(1.0, 2.0))).unwrap(),
            DType::COMPLEX128
        );
    }

    #[test]
    fn test_resolve_rejects_adversarial_names() {
        let reg = TypeRegistry::new();
        let long = "A".repeat(1000);
        let bad = [
            "",
            long.as_str(),
            "float32\n",
            "float32\0",
            "flöat32",
            "float32; DROP TABLE dtypes",
            "__import__('os')",
            "Float32",
            "float",
        ];
        for name in bad {
            let result = reg.resolve(name);
            if name == "float" {
                // numpy alias for float64
                assert_eq!(result.unwrap(), DType::FLOAT64);
                continue;
            }
            let err = result.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DType, "{name:?}");
        }
    }

    #[test]
    fn test_register_narrow_float() {
        let mut reg = TypeRegistry::new();
        let before = reg.len();
        let layout = FloatLayout::new(3, 4, 3, Special::FiniteNan);
        let dtype = reg
            .register(NarrowFloatSpec::new("float8_e3m4", layout, 41).alias("e3m4"))
            .unwrap();
        assert_eq!(reg.len(), before + 1);
        assert_eq!(dtype.vendor_code(), 41);
        assert_eq!(dtype.itemsize(), 1);
        assert_eq!(reg.resolve("e3m4").unwrap(), dtype);
        assert_eq!(reg.by_code(41), Some(dtype));
        assert_eq!(dtype.quantize(1.0625), 1.0625);
    }

    #[test]
    fn test_register_conflicts() {
        let mut reg = TypeRegistry::new();
        let layout = FloatLayout::new(3, 4, 3, Special::FiniteNan);
        let err = reg
            .register(NarrowFloatSpec::new("float8_e4m3fn", layout, 50))
            .unwrap_err();
        assert!(matches!(err, NpuError::DTypeConflict(_)));
        let err = reg
            .register(NarrowFloatSpec::new("my_fp8", layout, 36))
            .unwrap_err();
        assert!(matches!(err, NpuError::DTypeConflict(_)));
        let err = reg
            .register(NarrowFloatSpec::new("fp8", layout, 51).alias("f4"))
            .unwrap_err();
        assert!(matches!(err, NpuError::DTypeConflict(_)));
        let err = reg
            .register(NarrowFloatSpec::new("wide", FloatLayout::new(6, 4, 31, Special::Ieee), 52))
            .unwrap_err();
        assert!(matches!(err, NpuError::MalformedDType(_)));
    }

    #[test]
    fn test_foreign_handle_is_unknown() {
        let mut other = TypeRegistry::new();
        let layout = FloatLayout::new(2, 2, 1, Special::Finite);
        let foreign = other
            .register(NarrowFloatSpec::new("float5_e2m2", layout, 60))
            .unwrap();
        let reg = TypeRegistry::new();
        assert!(matches!(reg.resolve(foreign), Err(NpuError::UnknownDType(_))));
        assert!(reg.contains(DType::FLOAT8_E8M0));
    }
}
