//! npuarray core - dtypes, errors and backend traits
//!
//! This crate owns the type registry (built-in and narrow floating dtypes,
//! promotion, vendor codes), the error taxonomy and the operation traits a
//! device backend implements.

pub mod array;
pub mod backend;
pub mod dtype;
pub mod error;
pub mod minifloat;
pub mod ops;
pub mod promote;
pub mod registry;

pub use array::{Array, ArrayMeta};
pub use backend::Backend;
pub use dtype::{convert, device_code, DType, Format, Kind};
pub use error::{ErrorKind, NpuError, Result};
pub use minifloat::{FloatLayout, Special};
pub use promote::promote;
pub use registry::{DTypeLike, NarrowFloatSpec, ScalarValue, TypeRegistry};
