//! Abstract array type that backends implement

use crate::dtype::DType;
use serde::{Deserialize, Serialize};

/// Metadata about an array (backend-agnostic)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Row-major strides in elements
    pub strides: Vec<usize>,
    pub device: u32,
}

impl ArrayMeta {
    pub fn new(shape: Vec<usize>, dtype: DType, device: u32) -> Self {
        let strides = Self::compute_strides(&shape);
        Self {
            shape,
            dtype,
            strides,
            device,
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn nbytes(&self) -> usize {
        self.size() * self.dtype.itemsize()
    }

    pub fn byte_strides(&self) -> Vec<usize> {
        self.strides
            .iter()
            .map(|s| s * self.dtype.itemsize())
            .collect()
    }

    pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }
}

/// Core array trait that all backends implement
pub trait Array: std::fmt::Debug {
    /// Get array metadata
    fn meta(&self) -> &ArrayMeta;

    /// Get shape
    fn shape(&self) -> &[usize] {
        &self.meta().shape
    }

    /// Get number of dimensions
    fn ndim(&self) -> usize {
        self.meta().ndim()
    }

    /// Get total number of elements
    fn size(&self) -> usize {
        self.meta().size()
    }

    /// Get data type
    fn dtype(&self) -> DType {
        self.meta().dtype
    }

    /// Device the buffer lives on
    fn device(&self) -> u32 {
        self.meta().device
    }

    fn nbytes(&self) -> usize {
        self.meta().nbytes()
    }

    /// Copy the elements back as f64 (real part for complex dtypes)
    fn to_f64_vec(&self) -> crate::Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides() {
        let meta = ArrayMeta::new(vec![2, 3, 4], DType::FLOAT32, 0);
        assert_eq!(meta.strides, vec![12, 4, 1]);
        assert_eq!(meta.byte_strides(), vec![48, 16, 4]);
        assert_eq!(meta.nbytes(), 96);
    }

    #[test]
    fn test_scalar_and_empty() {
        let scalar = ArrayMeta::new(vec![], DType::INT64, 0);
        assert_eq!(scalar.size(), 1);
        assert_eq!(scalar.nbytes(), 8);
        let empty = ArrayMeta::new(vec![3, 0], DType::FLOAT64, 1);
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.nbytes(), 0);
    }

    #[test]
    fn test_serde() {
        let meta = ArrayMeta::new(vec![2, 2], DType::BFLOAT16, 1);
        let json = serde_json::to_string(&meta).unwrap();
        let back: ArrayMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
