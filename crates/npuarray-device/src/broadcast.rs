//! NumPy-style broadcasting
//!
//! Broadcasting rules:
//! 1. Shapes are right-aligned; missing leading dimensions count as 1
//! 2. Per position the result is the size shared by every operand that is
//!    not 1, or 1 when all are 1 (a 0 pairs with 1 and with 0 only)
//! 3. Any other combination is an error

use crate::array::NdArray;
use crate::kernel::PAR_THRESHOLD;
use ndarray::{ArrayD, IxDyn, Zip};
use npuarray_core::{Array, NpuError, Result};

/// Compute the broadcast shape of two input shapes.
///
/// # Examples
///
/// - `[3, 1] + [1, 4] → [3, 4]`
/// - `[3, 4] + [4] → [3, 4]`
/// - `[0] + [1] → [0]`
/// - `[3, 4] + [2, 4] → Error (incompatible)`
pub fn broadcast_pair(shape_a: &[usize], shape_b: &[usize]) -> Result<Vec<usize>> {
    let ndim_a = shape_a.len();
    let ndim_b = shape_b.len();
    let ndim_out = ndim_a.max(ndim_b);

    let mut result = vec![0; ndim_out];

    // Iterate from right to left (trailing dimensions)
    for i in 0..ndim_out {
        let dim_a = if i < ndim_a { shape_a[ndim_a - 1 - i] } else { 1 };
        let dim_b = if i < ndim_b { shape_b[ndim_b - 1 - i] } else { 1 };

        result[ndim_out - 1 - i] = if dim_a == dim_b || dim_b == 1 {
            dim_a
        } else if dim_a == 1 {
            dim_b
        } else {
            return Err(NpuError::IncompatibleShapes(
                shape_a.to_vec(),
                shape_b.to_vec(),
            ));
        };
    }

    Ok(result)
}

/// Broadcast shape of any number of operands
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let mut out: Vec<usize> = Vec::new();
    for shape in shapes {
        let next = broadcast_pair(&out, shape)
            .map_err(|_| NpuError::IncompatibleShapes(out.clone(), shape.to_vec()))?;
        out = next;
    }
    Ok(out)
}

/// How one operand reaches the broadcast shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandPlan {
    /// Number of leading axes prepended as size 1
    pub prepended: usize,
    /// Per output axis: whether this operand is repeated along it
    pub stretched: Vec<bool>,
}

/// Resolved broadcast of a set of operands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    pub shape: Vec<usize>,
    pub operands: Vec<OperandPlan>,
}

impl BroadcastPlan {
    pub fn resolve(shapes: &[&[usize]]) -> Result<Self> {
        let shape = broadcast_shapes(shapes)?;
        let operands = shapes
            .iter()
            .map(|s| {
                let prepended = shape.len() - s.len();
                let stretched = shape
                    .iter()
                    .enumerate()
                    .map(|(axis, &out)| {
                        let dim = if axis < prepended { 1 } else { s[axis - prepended] };
                        dim != out
                    })
                    .collect();
                OperandPlan {
                    prepended,
                    stretched,
                }
            })
            .collect();
        Ok(Self { shape, operands })
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// True when no operand needs padding or repetition
    pub fn is_trivial(&self) -> bool {
        self.operands
            .iter()
            .all(|op| op.prepended == 0 && op.stretched.iter().all(|s| !s))
    }
}

/// Broadcast shape of device arrays
pub fn broadcast_shape(arrays: &[&NdArray]) -> Result<Vec<usize>> {
    let shapes: Vec<&[usize]> = arrays.iter().map(|a| a.shape()).collect();
    broadcast_shapes(&shapes)
}

/// Broadcast an ndarray to a target shape.
pub fn broadcast_to<T: Clone>(arr: &ArrayD<T>, target_shape: &[usize]) -> Result<ArrayD<T>> {
    // Fast path: already the right shape
    if arr.shape() == target_shape {
        return Ok(arr.clone());
    }

    arr.broadcast(IxDyn(target_shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| {
            NpuError::IncompatibleShapes(arr.shape().to_vec(), target_shape.to_vec())
        })
}

/// Apply a binary operation with broadcasting.
///
/// Works on zero-cost broadcast views and writes straight into the result;
/// large outputs are computed on the rayon pool.
pub fn broadcast_binary_op<T, U, F>(a: &ArrayD<T>, b: &ArrayD<T>, op: F) -> Result<ArrayD<U>>
where
    T: Copy + Send + Sync,
    U: Send,
    F: Fn(T, T) -> U + Send + Sync,
{
    let output_shape = broadcast_pair(a.shape(), b.shape())?;
    let output_dim = IxDyn(&output_shape);

    let mismatch = || NpuError::IncompatibleShapes(a.shape().to_vec(), b.shape().to_vec());
    let a_view = a.broadcast(output_dim.clone()).ok_or_else(mismatch)?;
    let b_view = b.broadcast(output_dim).ok_or_else(mismatch)?;

    let zip = Zip::from(a_view).and(b_view);
    let result = if output_shape.iter().product::<usize>() >= PAR_THRESHOLD {
        zip.par_map_collect(|&x, &y| op(x, y))
    } else {
        zip.map_collect(|&x, &y| op(x, y))
    };
    Ok(result)
}
