//! Einstein summation over device arrays

use crate::array::byte_len;
use crate::kernel::{self, Values};
use crate::linalg::{load_exact, Lane};
use crate::NdArray;
use ndarray::{ArrayD, Dimension, IxDyn};
use npuarray_core::{promote, Array, NpuError, Result};
use num_complex::Complex64;
use std::collections::HashMap;

/// Parsed subscripts: one label list per operand plus the output labels
#[derive(Debug, Clone, PartialEq)]
struct Subscripts {
    inputs: Vec<Vec<char>>,
    output: Vec<char>,
}

impl Subscripts {
    fn parse(subscripts: &str, operands: usize) -> Result<Self> {
        let compact: String = subscripts.chars().filter(|c| !c.is_whitespace()).collect();
        let (lhs, rhs) = match compact.split_once("->") {
            Some((lhs, rhs)) => (lhs, Some(rhs)),
            None => (compact.as_str(), None),
        };

        let labels = |term: &str| -> Result<Vec<char>> {
            term.chars()
                .map(|c| {
                    if c.is_ascii_alphabetic() {
                        Ok(c)
                    } else {
                        Err(NpuError::InvalidSubscripts(format!(
                            "invalid character {c:?} in '{subscripts}'"
                        )))
                    }
                })
                .collect()
        };

        let inputs = lhs.split(',').map(labels).collect::<Result<Vec<_>>>()?;
        if inputs.len() != operands {
            return Err(NpuError::InvalidSubscripts(format!(
                "'{subscripts}' names {} operand(s) but {operands} were given",
                inputs.len()
            )));
        }

        let output = match rhs {
            Some(rhs) => {
                let output = labels(rhs)?;
                for (i, c) in output.iter().enumerate() {
                    if output[..i].contains(c) {
                        return Err(NpuError::InvalidSubscripts(format!(
                            "output label '{c}' appears more than once"
                        )));
                    }
                    if !inputs.iter().any(|term| term.contains(c)) {
                        return Err(NpuError::InvalidSubscripts(format!(
                            "output label '{c}' does not appear in the inputs"
                        )));
                    }
                }
                output
            }
            // implicit mode: labels seen exactly once, alphabetical
            None => {
                let mut counts: HashMap<char, usize> = HashMap::new();
                for &c in inputs.iter().flatten() {
                    *counts.entry(c).or_default() += 1;
                }
                let mut output: Vec<char> = counts
                    .into_iter()
                    .filter(|&(_, n)| n == 1)
                    .map(|(c, _)| c)
                    .collect();
                output.sort_unstable();
                output
            }
        };
        Ok(Self { inputs, output })
    }

    /// Labels absent from the output, in order of first appearance
    fn summed(&self) -> Vec<char> {
        let mut summed = Vec::new();
        for &c in self.inputs.iter().flatten() {
            if !self.output.contains(&c) && !summed.contains(&c) {
                summed.push(c);
            }
        }
        summed
    }

    /// Size of every label, checked against each operand's shape
    fn sizes(&self, shapes: &[&[usize]]) -> Result<HashMap<char, usize>> {
        let mut sizes = HashMap::new();
        for (term, shape) in self.inputs.iter().zip(shapes) {
            if term.len() != shape.len() {
                return Err(NpuError::InvalidSubscripts(format!(
                    "term '{}' has {} label(s) for an operand with {} dimension(s)",
                    term.iter().collect::<String>(),
                    term.len(),
                    shape.len()
                )));
            }
            for (&c, &dim) in term.iter().zip(shape.iter()) {
                let size = *sizes.entry(c).or_insert(dim);
                if size != dim {
                    return Err(NpuError::InvalidSubscripts(format!(
                        "label '{c}' has mismatched sizes {size} and {dim}"
                    )));
                }
            }
        }
        Ok(sizes)
    }
}

/// Multiply operands over every label assignment, summing the labels
/// missing from the output
fn contract<T: Lane>(
    subs: &Subscripts,
    sizes: &HashMap<char, usize>,
    operands: &[ArrayD<T>],
) -> ArrayD<T> {
    let summed = subs.summed();
    let combined: Vec<char> = subs.output.iter().chain(&summed).copied().collect();
    let out_shape: Vec<usize> = subs.output.iter().map(|c| sizes[c]).collect();
    let sum_shape: Vec<usize> = summed.iter().map(|c| sizes[c]).collect();
    let sum_count: usize = sum_shape.iter().product();
    let n_out = out_shape.len();

    // operand axis -> slot in the combined label index
    let slots: Vec<Vec<usize>> = subs
        .inputs
        .iter()
        .map(|term| {
            term.iter()
                .filter_map(|c| combined.iter().position(|l| l == c))
                .collect()
        })
        .collect();

    ArrayD::from_shape_fn(IxDyn(&out_shape), |out_idx| {
        let mut index = vec![0usize; combined.len()];
        index[..n_out].copy_from_slice(out_idx.slice());
        let mut acc = T::zero();
        for flat in 0..sum_count {
            let mut rem = flat;
            for (slot, &size) in sum_shape.iter().enumerate().rev() {
                index[n_out + slot] = rem % size;
                rem /= size;
            }
            let term = operands.iter().zip(&slots).fold(T::one(), |p, (op, axes)| {
                let at: Vec<usize> = axes.iter().map(|&s| index[s]).collect();
                p * op[&at[..]]
            });
            acc = acc + term;
        }
        acc
    })
}

pub(crate) fn einsum(subscripts: &str, operands: &[&NdArray]) -> Result<NdArray> {
    let subs = Subscripts::parse(subscripts, operands.len())?;
    let shapes: Vec<&[usize]> = operands.iter().map(|op| op.shape()).collect();
    let sizes = subs.sizes(&shapes)?;
    let (ctx, device) = kernel::placement(operands)?;

    let out = operands
        .iter()
        .skip(1)
        .fold(operands[0].dtype(), |acc, op| promote(acc, op.dtype()));
    let work = sizes
        .values()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NpuError::InvalidShape(format!("einsum {subscripts} overflows")))?;
    let out_shape: Vec<usize> = subs.output.iter().map(|c| sizes[c]).collect();
    ctx.ensure_capacity(device, byte_len(&out_shape, out)?)?;
    kernel::launch(&ctx, "einsum", work);

    if kernel::is_exact(out) {
        let lanes = operands
            .iter()
            .map(|op| load_exact(op))
            .collect::<Result<Vec<_>>>()?;
        let result = contract(&subs, &sizes, &lanes).mapv(|w| w.0);
        return kernel::store_int(&ctx, device, &result, out);
    }
    let values = if out.is_complex() {
        let lanes = operands
            .iter()
            .map(|op| kernel::load(op).map(Values::into_complex))
            .collect::<Result<Vec<ArrayD<Complex64>>>>()?;
        Values::Complex(contract(&subs, &sizes, &lanes))
    } else {
        let lanes = operands
            .iter()
            .map(|op| kernel::load_real(op))
            .collect::<Result<Vec<_>>>()?;
        Values::Real(contract(&subs, &sizes, &lanes))
    };
    kernel::store(&ctx, device, &values, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextConfig};
    use crate::DeviceBackend;
    use npuarray_core::ops::LinalgOps;
    use npuarray_core::{DType, ErrorKind};

    fn ctx() -> Context {
        Context::with_device(ContextConfig::default(), 0).unwrap()
    }

    fn mat(ctx: &Context, data: &[f64], shape: &[usize]) -> NdArray {
        NdArray::from_f64(ctx, shape, data, DType::FLOAT64).unwrap()
    }

    #[test]
    fn test_parse_implicit_output() {
        let subs = Subscripts::parse("ij, jk", 2).unwrap();
        assert_eq!(subs.output, vec!['i', 'k']);
        assert_eq!(subs.summed(), vec!['j']);

        let subs = Subscripts::parse("ba", 1).unwrap();
        assert_eq!(subs.output, vec!['a', 'b']);

        let subs = Subscripts::parse("ii", 1).unwrap();
        assert!(subs.output.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        for (subscripts, n) in [
            ("ij,jk->ik", 1),
            ("i1->i", 1),
            ("...i->i", 1),
            ("ij->iz", 1),
            ("ij->ii", 1),
        ] {
            let err = Subscripts::parse(subscripts, n).unwrap_err();
            assert!(matches!(err, NpuError::InvalidSubscripts(_)), "{subscripts}");
        }
    }

    #[test]
    fn test_matmul_equivalence() {
        let ctx = ctx();
        let a = mat(&ctx, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = mat(&ctx, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]);
        let expected = DeviceBackend::matmul(&a, &b).unwrap().to_f64_vec().unwrap();
        let explicit = DeviceBackend::einsum("ij,jk->ik", &[&a, &b]).unwrap();
        assert_eq!(explicit.shape(), &[2, 2]);
        assert_eq!(explicit.to_f64_vec().unwrap(), expected);
        let implicit = DeviceBackend::einsum("ij,jk", &[&a, &b]).unwrap();
        assert_eq!(implicit.to_f64_vec().unwrap(), expected);
    }

    #[test]
    fn test_trace_and_diagonal() {
        let ctx = ctx();
        let data: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let a = mat(&ctx, &data, &[3, 3]);
        let tr = DeviceBackend::einsum("ii->", &[&a]).unwrap();
        assert_eq!(tr.ndim(), 0);
        assert_eq!(tr.to_f64_vec().unwrap(), vec![12.0]);
        let diag = DeviceBackend::einsum("ii->i", &[&a]).unwrap();
        assert_eq!(diag.to_f64_vec().unwrap(), vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_transpose_and_outer() {
        let ctx = ctx();
        let a = mat(&ctx, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let t = DeviceBackend::einsum("ij->ji", &[&a]).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_f64_vec().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let u = mat(&ctx, &[1.0, 2.0], &[2]);
        let v = mat(&ctx, &[3.0, 4.0], &[2]);
        let o = DeviceBackend::einsum("i,j->ij", &[&u, &v]).unwrap();
        assert_eq!(o.to_f64_vec().unwrap(), vec![3.0, 4.0, 6.0, 8.0]);
        let d = DeviceBackend::einsum("i,i", &[&u, &v]).unwrap();
        assert_eq!(d.to_f64_vec().unwrap(), vec![11.0]);
    }

    #[test]
    fn test_size_validation() {
        let ctx = ctx();
        let a = mat(&ctx, &[1.0; 6], &[2, 3]);
        let b = mat(&ctx, &[1.0; 4], &[2, 2]);
        let err = DeviceBackend::einsum("ij,jk->ik", &[&a, &b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        // diagonal of a non-square operand
        assert!(DeviceBackend::einsum("ii->i", &[&a]).is_err());
        // term rank must match the operand
        assert!(DeviceBackend::einsum("ijk->i", &[&a]).is_err());
    }

    #[test]
    fn test_dtype_promotion() {
        let ctx = ctx();
        let a = NdArray::from_f64(&ctx, &[2], &[1.0, 2.0], DType::INT8).unwrap();
        let b = NdArray::from_f64(&ctx, &[2], &[100.0, 100.0], DType::INT8).unwrap();
        let s = DeviceBackend::einsum("i,i->", &[&a, &b]).unwrap();
        assert_eq!(s.dtype(), DType::INT8);
        // 300 wraps in int8
        assert_eq!(s.to_f64_vec().unwrap(), vec![44.0]);

        let z = NdArray::from_complex(&ctx, &[2], &[Complex64::new(0.0, 1.0); 2], DType::COMPLEX64)
            .unwrap();
        let c = DeviceBackend::einsum("i,i->", &[&z, &a]).unwrap();
        assert_eq!(c.dtype(), DType::COMPLEX64);
        assert_eq!(c.to_complex_vec().unwrap(), vec![Complex64::new(0.0, 3.0)]);
    }

    #[test]
    fn test_int64_contraction_is_exact() {
        let ctx = ctx();
        let big = (1i128 << 53) + 1;
        let a = NdArray::from_ints(&ctx, &[2], &[big, 1], DType::INT64).unwrap();
        let b = NdArray::from_ints(&ctx, &[2], &[1, 2], DType::INT64).unwrap();
        let s = DeviceBackend::einsum("i,i->", &[&a, &b]).unwrap();
        assert_eq!(s.to_int_vec().unwrap(), vec![big + 2]);
    }

    #[test]
    fn test_output_checked_against_pool() {
        let config = ContextConfig::default().with_memory_limit(64);
        let ctx = Context::with_device(config, 0).unwrap();
        let a = NdArray::from_f64(&ctx, &[3], &[1.0; 3], DType::FLOAT32).unwrap();
        let err = DeviceBackend::einsum("i,j,k->ijk", &[&a, &a, &a]).unwrap_err();
        assert!(matches!(err, NpuError::AllocationFailed { requested: 108, .. }));
    }
}
