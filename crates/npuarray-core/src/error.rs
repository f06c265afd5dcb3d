//! Error types for npuarray

use thiserror::Error;

/// Coarse classification of an [`NpuError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Device,
    DType,
    Shape,
    SingularMatrix,
    UseAfterTeardown,
    Argument,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NpuError {
    // Device
    #[error("Device context is not initialized")]
    NotInitialized,

    #[error("Invalid device {device}: {count} device(s) available")]
    InvalidDevice { device: u32, count: u32 },

    #[error("Allocation of {requested} bytes failed on device {device}: {in_use} of {limit} bytes in use")]
    AllocationFailed {
        device: u32,
        requested: usize,
        in_use: usize,
        limit: usize,
    },

    #[error("Operands live on different devices: {0} and {1}")]
    DeviceMismatch(u32, u32),

    #[error("Device error: {0}")]
    Device(String),

    // DType
    #[error("Unknown dtype: {0}")]
    UnknownDType(String),

    #[error("Malformed dtype name: {0}")]
    MalformedDType(String),

    #[error("Conflicting dtype registration: {0}")]
    DTypeConflict(String),

    #[error("Unsupported dtype {dtype} for {op}")]
    UnsupportedDType { op: &'static str, dtype: String },

    // Shape
    #[error("Incompatible shapes for operation: {0:?} and {1:?}")]
    IncompatibleShapes(Vec<usize>, Vec<usize>),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Invalid axis: {axis} for array with {ndim} dimensions")]
    InvalidAxis { axis: isize, ndim: usize },

    #[error("Matrix must be square, got shape {0:?}")]
    NotSquare(Vec<usize>),

    #[error("Dimension mismatch for {op}: {:?} vs {:?}", .shapes.0, .shapes.1)]
    DimensionMismatch {
        op: &'static str,
        shapes: (Vec<usize>, Vec<usize>),
    },

    #[error("Invalid subscripts: {0}")]
    InvalidSubscripts(String),

    #[error("Matrix is singular")]
    SingularMatrix,

    #[error("Array buffer was released by a context teardown")]
    UseAfterTeardown,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl NpuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NpuError::NotInitialized
            | NpuError::InvalidDevice { .. }
            | NpuError::AllocationFailed { .. }
            | NpuError::DeviceMismatch(..)
            | NpuError::Device(_) => ErrorKind::Device,
            NpuError::UnknownDType(_)
            | NpuError::MalformedDType(_)
            | NpuError::DTypeConflict(_)
            | NpuError::UnsupportedDType { .. } => ErrorKind::DType,
            NpuError::IncompatibleShapes(..)
            | NpuError::InvalidShape(_)
            | NpuError::InvalidAxis { .. }
            | NpuError::NotSquare(_)
            | NpuError::DimensionMismatch { .. }
            | NpuError::InvalidSubscripts(_) => ErrorKind::Shape,
            NpuError::SingularMatrix => ErrorKind::SingularMatrix,
            NpuError::UseAfterTeardown => ErrorKind::UseAfterTeardown,
            NpuError::InvalidArgument(_) => ErrorKind::Argument,
        }
    }

    pub fn unsupported(op: &'static str, dtype: impl std::fmt::Display) -> Self {
        NpuError::UnsupportedDType {
            op,
            dtype: dtype.to_string(),
        }
    }

    pub fn dimension_mismatch(op: &'static str, a: &[usize], b: &[usize]) -> Self {
        NpuError::DimensionMismatch {
            op,
            shapes: (a.to_vec(), b.to_vec()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NpuError>;
