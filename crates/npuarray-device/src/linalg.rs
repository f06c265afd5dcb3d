//! Linear algebra for the device backend using faer
//!
//! Matrix ops work on the trailing two axes; leading axes are batches.

use crate::broadcast::{broadcast_binary_op, broadcast_pair};
use crate::kernel::{self, Values};
use crate::{einsum, DeviceBackend, NdArray};
use faer::{FaerMat, Mat, MatRef};
use ndarray::{Array2, Array3, ArrayD, ArrayView1, ArrayView2, Axis, IxDyn, LinalgScalar, Zip};
use npuarray_core::ops::{Axes, LinalgOps, NormOrd, QrMode, ReduceOp};
use npuarray_core::{promote, Array, DType, Kind, NpuError, Result};
use num_complex::Complex64;
use std::num::Wrapping;

/// Element type a product kernel runs on
pub(crate) trait Lane: LinalgScalar + Send + Sync {
    fn gemm(a: ArrayView2<'_, Self>, b: ArrayView2<'_, Self>) -> Array2<Self>;
    fn conj(self) -> Self;
}

/// Convert a row-major view to a faer Mat
fn to_faer(a: ArrayView2<'_, f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Convert a faer Mat back to a row-major ndarray
fn from_faer(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat.read(i, j))
}

impl Lane for f64 {
    fn gemm(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
        if a.ncols() == 0 {
            return Array2::zeros((a.nrows(), b.ncols()));
        }
        let product = to_faer(a) * to_faer(b);
        from_faer(product.as_ref())
    }

    fn conj(self) -> f64 {
        self
    }
}

/// Exact lane for bool and integer operands; products and sums wrap
pub(crate) type Exact = Wrapping<i128>;

impl Lane for Exact {
    fn gemm(a: ArrayView2<'_, Exact>, b: ArrayView2<'_, Exact>) -> Array2<Exact> {
        a.dot(&b)
    }

    fn conj(self) -> Exact {
        self
    }
}

impl Lane for Complex64 {
    fn gemm(a: ArrayView2<'_, Complex64>, b: ArrayView2<'_, Complex64>) -> Array2<Complex64> {
        a.dot(&b)
    }

    fn conj(self) -> Complex64 {
        Complex64::conj(&self)
    }
}

fn reshaped<T>(data: ArrayD<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    data.into_shape_with_order(IxDyn(shape))
        .map_err(|e| NpuError::InvalidShape(e.to_string()))
}

/// Contiguous copy with the given shape
fn standard<T: Clone>(data: ndarray::ArrayViewD<'_, T>, shape: &[usize]) -> Result<ArrayD<T>> {
    reshaped(data.as_standard_layout().into_owned(), shape)
}

fn as_matrix<T: Clone>(data: ArrayD<T>, rows: usize, cols: usize) -> Result<Array2<T>> {
    data.as_standard_layout()
        .into_owned()
        .into_shape_with_order((rows, cols))
        .map_err(|e| NpuError::InvalidShape(e.to_string()))
}

fn matmul_lanes<T: Lane>(a: ArrayD<T>, b: ArrayD<T>) -> Result<ArrayD<T>> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return Err(NpuError::InvalidShape(
            "matmul: input operand does not have enough dimensions".into(),
        ));
    }
    let (a_shape, b_shape) = (a.shape().to_vec(), b.shape().to_vec());
    let (a_vec, b_vec) = (a.ndim() == 1, b.ndim() == 1);
    let a = if a_vec { a.insert_axis(Axis(0)) } else { a };
    let b = if b_vec { b.insert_axis(Axis(1)) } else { b };

    let (m, k) = (a.shape()[a.ndim() - 2], a.shape()[a.ndim() - 1]);
    let (k2, n) = (b.shape()[b.ndim() - 2], b.shape()[b.ndim() - 1]);
    if k != k2 {
        return Err(NpuError::dimension_mismatch("matmul", &a_shape, &b_shape));
    }
    let batch = broadcast_pair(&a.shape()[..a.ndim() - 2], &b.shape()[..b.ndim() - 2])
        .map_err(|_| NpuError::IncompatibleShapes(a_shape.clone(), b_shape.clone()))?;
    let nb: usize = batch.iter().product();

    let stretch = |data: &ArrayD<T>, rows: usize, cols: usize| -> Result<Array3<T>> {
        let full: Vec<usize> = batch.iter().copied().chain([rows, cols]).collect();
        let view = data
            .broadcast(IxDyn(&full))
            .ok_or_else(|| NpuError::IncompatibleShapes(a_shape.clone(), b_shape.clone()))?;
        view.as_standard_layout()
            .into_owned()
            .into_shape_with_order((nb, rows, cols))
            .map_err(|e| NpuError::InvalidShape(e.to_string()))
    };
    let a3 = stretch(&a, m, k)?;
    let b3 = stretch(&b, k, n)?;

    let mut out = Array3::<T>::zeros((nb, m, n));
    Zip::from(out.outer_iter_mut())
        .and(a3.outer_iter())
        .and(b3.outer_iter())
        .par_for_each(|mut o, x, y| o.assign(&T::gemm(x, y)));

    let mut shape = batch;
    if !a_vec {
        shape.push(m);
    }
    if !b_vec {
        shape.push(n);
    }
    reshaped(out.into_dyn(), &shape)
}

fn dot_lanes<T: Lane>(a: ArrayD<T>, b: ArrayD<T>) -> Result<ArrayD<T>> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return broadcast_binary_op(&a, &b, |x, y| x * y);
    }
    let k = a.shape()[a.ndim() - 1];
    let kb = if b.ndim() == 1 {
        b.shape()[0]
    } else {
        b.shape()[b.ndim() - 2]
    };
    if k != kb {
        return Err(NpuError::dimension_mismatch("dot", a.shape(), b.shape()));
    }

    let mut shape: Vec<usize> = a.shape()[..a.ndim() - 1].to_vec();
    let rows: usize = shape.iter().product();
    let b2 = if b.ndim() == 1 {
        as_matrix(b, k, 1)?
    } else {
        let nd = b.ndim();
        let order: Vec<usize> = std::iter::once(nd - 2)
            .chain(0..nd - 2)
            .chain([nd - 1])
            .collect();
        shape.extend_from_slice(&b.shape()[..nd - 2]);
        shape.push(b.shape()[nd - 1]);
        let cols = b.shape()[..nd - 2].iter().product::<usize>() * b.shape()[nd - 1];
        as_matrix(b.permuted_axes(IxDyn(&order)), k, cols)?
    };
    let a2 = as_matrix(a, rows, k)?;
    reshaped(T::gemm(a2.view(), b2.view()).into_dyn(), &shape)
}

fn inner_lanes<T: Lane>(a: ArrayD<T>, b: ArrayD<T>) -> Result<ArrayD<T>> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return broadcast_binary_op(&a, &b, |x, y| x * y);
    }
    let k = a.shape()[a.ndim() - 1];
    if k != b.shape()[b.ndim() - 1] {
        return Err(NpuError::dimension_mismatch("inner", a.shape(), b.shape()));
    }
    let a_lead = &a.shape()[..a.ndim() - 1];
    let b_lead = &b.shape()[..b.ndim() - 1];
    let shape: Vec<usize> = a_lead.iter().chain(b_lead).copied().collect();
    let (rows, cols) = (a_lead.iter().product(), b_lead.iter().product());
    let a2 = as_matrix(a, rows, k)?;
    let b2 = as_matrix(b, cols, k)?;
    reshaped(T::gemm(a2.view(), b2.t()).into_dyn(), &shape)
}

fn outer_lanes<T: Lane>(a: ArrayD<T>, b: ArrayD<T>) -> Result<ArrayD<T>> {
    let (m, n) = (a.len(), b.len());
    let a2 = as_matrix(a, m, 1)?;
    let b2 = as_matrix(b, 1, n)?;
    Ok(T::gemm(a2.view(), b2.view()).into_dyn())
}

fn vdot_lanes<T: Lane>(a: ArrayD<T>, b: ArrayD<T>) -> Result<ArrayD<T>> {
    if a.len() != b.len() {
        return Err(NpuError::dimension_mismatch("vdot", a.shape(), b.shape()));
    }
    let sum = a
        .iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc + x.conj() * y);
    Ok(ArrayD::from_elem(IxDyn(&[]), sum))
}

fn trace_lanes<T: Lane>(a: ArrayD<T>) -> Result<ArrayD<T>> {
    let nd = a.ndim();
    if nd < 2 {
        return Err(NpuError::InvalidShape(
            "trace requires at least two dimensions".into(),
        ));
    }
    let (m, n) = (a.shape()[nd - 2], a.shape()[nd - 1]);
    let batch = a.shape()[..nd - 2].to_vec();
    let nb: usize = batch.iter().product();
    let a3 = standard(a.view(), &[nb, m, n])?;
    let sums: Vec<T> = a3
        .outer_iter()
        .map(|mat| (0..m.min(n)).fold(T::zero(), |acc, i| acc + mat[[i, i]]))
        .collect();
    ArrayD::from_shape_vec(IxDyn(&batch), sums).map_err(|e| NpuError::InvalidShape(e.to_string()))
}

fn identity_like<T: Lane>(shape: &[usize]) -> ArrayD<T> {
    let nd = shape.len();
    ArrayD::from_shape_fn(IxDyn(shape), |idx| {
        if idx[nd - 1] == idx[nd - 2] {
            T::one()
        } else {
            T::zero()
        }
    })
}

/// Batched binary exponentiation
fn power_lanes<T: Lane>(a: ArrayD<T>, mut n: u64) -> Result<ArrayD<T>> {
    let mut result = identity_like::<T>(a.shape());
    let mut base = a;
    while n > 0 {
        if n & 1 == 1 {
            result = matmul_lanes(result, base.clone())?;
        }
        n >>= 1;
        if n > 0 {
            base = matmul_lanes(base.clone(), base)?;
        }
    }
    Ok(result)
}

/// LU factorization with partial pivoting
struct Lu {
    lu: Array2<f64>,
    perm: Vec<usize>,
    sign: f64,
    singular: bool,
}

impl Lu {
    fn new(mut a: Array2<f64>) -> Self {
        let n = a.nrows();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut sign = 1.0;
        let mut singular = false;

        for col in 0..n {
            let pivot = (col..n).fold(col, |best, r| {
                if a[[r, col]].abs() > a[[best, col]].abs() {
                    r
                } else {
                    best
                }
            });
            if a[[pivot, col]] == 0.0 {
                singular = true;
                continue;
            }
            if pivot != col {
                for j in 0..n {
                    a.swap([col, j], [pivot, j]);
                }
                perm.swap(col, pivot);
                sign = -sign;
            }
            for r in col + 1..n {
                let factor = a[[r, col]] / a[[col, col]];
                a[[r, col]] = factor;
                for j in col + 1..n {
                    a[[r, j]] -= factor * a[[col, j]];
                }
            }
        }
        Self {
            lu: a,
            perm,
            sign,
            singular,
        }
    }

    fn det(&self) -> f64 {
        if self.singular {
            return 0.0;
        }
        self.lu.diag().iter().fold(self.sign, |acc, &d| acc * d)
    }

    /// (sign, log|det|)
    fn slogdet(&self) -> (f64, f64) {
        if self.singular {
            return (0.0, f64::NEG_INFINITY);
        }
        self.lu
            .diag()
            .iter()
            .fold((self.sign, 0.0), |(s, l), &d| (s * d.signum(), l + d.abs().ln()))
    }

    fn inverse(&self) -> Result<Array2<f64>> {
        if self.singular {
            return Err(NpuError::SingularMatrix);
        }
        let n = self.lu.nrows();
        let mut inv = Array2::<f64>::zeros((n, n));
        for col in 0..n {
            let mut x: Vec<f64> = self.perm.iter().map(|&p| (p == col) as u8 as f64).collect();
            for i in 0..n {
                for j in 0..i {
                    x[i] -= self.lu[[i, j]] * x[j];
                }
            }
            for i in (0..n).rev() {
                for j in i + 1..n {
                    x[i] -= self.lu[[i, j]] * x[j];
                }
                x[i] /= self.lu[[i, i]];
            }
            inv.column_mut(col).assign(&ArrayView1::from(&x));
        }
        Ok(inv)
    }
}

/// Float dtype a decomposition of `dtype` produces
fn solve_dtype(op: &'static str, dtype: DType) -> Result<DType> {
    match dtype.kind() {
        Kind::Float => Ok(dtype),
        Kind::Complex => Err(NpuError::unsupported(op, dtype)),
        _ => Ok(DType::FLOAT64),
    }
}

/// Split into square matrices: (batch shape, n, stacked matrices)
fn square_batches(arr: &NdArray) -> Result<(Vec<usize>, usize, Array3<f64>)> {
    let shape = arr.shape();
    let nd = shape.len();
    if nd < 2 || shape[nd - 1] != shape[nd - 2] {
        return Err(NpuError::NotSquare(shape.to_vec()));
    }
    let n = shape[nd - 1];
    let batch = shape[..nd - 2].to_vec();
    let nb: usize = batch.iter().product();
    let data = kernel::load_real(arr)?
        .into_shape_with_order((nb, n, n))
        .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
    Ok((batch, n, data))
}

fn with_batch(batch: &[usize], tail: &[usize]) -> Vec<usize> {
    batch.iter().chain(tail).copied().collect()
}

/// Run a product kernel on the lanes both operands promote to
fn product(
    name: &'static str,
    a: &NdArray,
    b: &NdArray,
    real: fn(ArrayD<f64>, ArrayD<f64>) -> Result<ArrayD<f64>>,
    exact: fn(ArrayD<Exact>, ArrayD<Exact>) -> Result<ArrayD<Exact>>,
    complex: fn(ArrayD<Complex64>, ArrayD<Complex64>) -> Result<ArrayD<Complex64>>,
) -> Result<NdArray> {
    let out = promote(a.dtype(), b.dtype());
    let (ctx, device) = kernel::placement(&[a, b])?;
    if kernel::is_exact(out) {
        let result = exact(load_exact(a)?, load_exact(b)?)?.mapv(|w| w.0);
        kernel::launch(&ctx, name, result.len());
        return kernel::store_int(&ctx, device, &result, out);
    }
    let values = if out.is_complex() {
        Values::Complex(complex(
            kernel::load(a)?.into_complex(),
            kernel::load(b)?.into_complex(),
        )?)
    } else {
        Values::Real(real(kernel::load_real(a)?, kernel::load_real(b)?)?)
    };
    kernel::launch(&ctx, name, values.shape().iter().product());
    kernel::store(&ctx, device, &values, out)
}

pub(crate) fn load_exact(arr: &NdArray) -> Result<ArrayD<Exact>> {
    Ok(kernel::load_int(arr)?.mapv(Wrapping))
}

fn vector_norm(lane: ArrayView1<'_, f64>, ord: f64) -> f64 {
    if ord == f64::INFINITY {
        lane.iter().fold(0.0, |m, &x| m.max(x))
    } else if ord == f64::NEG_INFINITY {
        lane.iter().fold(f64::INFINITY, |m, &x| m.min(x))
    } else if ord == 0.0 {
        lane.iter().filter(|&&x| x != 0.0).count() as f64
    } else if ord == 1.0 {
        lane.sum()
    } else if ord == 2.0 {
        lane.iter().map(|x| x * x).sum::<f64>().sqrt()
    } else {
        lane.iter().map(|x| x.powf(ord)).sum::<f64>().powf(1.0 / ord)
    }
}

/// Matrix norm over axes `(row, col)` of absolute values
fn matrix_norm(mags: ArrayD<f64>, row: usize, col: usize, ord: Option<NormOrd>) -> Result<ArrayD<f64>> {
    let (hi, lo) = (row.max(col), row.min(col));
    let shifted = |axis: usize, removed: usize| if axis > removed { axis - 1 } else { axis };
    match ord {
        None | Some(NormOrd::Fro) => Ok(mags
            .mapv(|x| x * x)
            .sum_axis(Axis(hi))
            .sum_axis(Axis(lo))
            .mapv(f64::sqrt)),
        Some(NormOrd::P(p)) if p.abs() == 1.0 || p.is_infinite() => {
            // 1-norms sum down columns, inf-norms along rows
            let (summed, kept) = if p.abs() == 1.0 { (row, col) } else { (col, row) };
            let sums = mags.sum_axis(Axis(summed));
            let lane = Axis(shifted(kept, summed));
            Ok(if p > 0.0 {
                sums.fold_axis(lane, 0.0, |m, &x| m.max(x))
            } else {
                sums.fold_axis(lane, f64::INFINITY, |m, &x| m.min(x))
            })
        }
        Some(NormOrd::P(p)) => Err(NpuError::InvalidArgument(format!(
            "matrix norm of order {p} is not supported"
        ))),
    }
}

fn power(arr: &NdArray, n: u64) -> Result<NdArray> {
    let (ctx, device) = kernel::placement(&[arr])?;
    let out = arr.dtype();
    kernel::launch(&ctx, "matrix_power", arr.size());
    if kernel::is_exact(out) {
        let result = power_lanes(load_exact(arr)?, n)?.mapv(|w| w.0);
        return kernel::store_int(&ctx, device, &result, out);
    }
    let values = match kernel::load(arr)? {
        Values::Complex(data) => Values::Complex(power_lanes(data, n)?),
        Values::Real(data) => Values::Real(power_lanes(data, n)?),
    };
    kernel::store(&ctx, device, &values, out)
}

impl LinalgOps for DeviceBackend {
    type Array = NdArray;

    fn matmul(a: &NdArray, b: &NdArray) -> Result<NdArray> {
        product(
            "matmul",
            a,
            b,
            matmul_lanes::<f64>,
            matmul_lanes::<Exact>,
            matmul_lanes::<Complex64>,
        )
    }

    fn dot(a: &NdArray, b: &NdArray) -> Result<NdArray> {
        product(
            "dot",
            a,
            b,
            dot_lanes::<f64>,
            dot_lanes::<Exact>,
            dot_lanes::<Complex64>,
        )
    }

    fn vdot(a: &NdArray, b: &NdArray) -> Result<NdArray> {
        product(
            "vdot",
            a,
            b,
            vdot_lanes::<f64>,
            vdot_lanes::<Exact>,
            vdot_lanes::<Complex64>,
        )
    }

    fn inner(a: &NdArray, b: &NdArray) -> Result<NdArray> {
        product(
            "inner",
            a,
            b,
            inner_lanes::<f64>,
            inner_lanes::<Exact>,
            inner_lanes::<Complex64>,
        )
    }

    fn outer(a: &NdArray, b: &NdArray) -> Result<NdArray> {
        product(
            "outer",
            a,
            b,
            outer_lanes::<f64>,
            outer_lanes::<Exact>,
            outer_lanes::<Complex64>,
        )
    }

    fn det(arr: &NdArray) -> Result<NdArray> {
        let out = solve_dtype("det", arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        let (batch, _, data) = square_batches(arr)?;
        kernel::launch(&ctx, "det", data.len_of(Axis(0)));
        let dets: Vec<f64> = data
            .outer_iter()
            .map(|m| Lu::new(m.to_owned()).det())
            .collect();
        let dets = ArrayD::from_shape_vec(IxDyn(&batch), dets)
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        kernel::store_real(&ctx, device, &dets, out)
    }

    fn slogdet(arr: &NdArray) -> Result<(NdArray, NdArray)> {
        let out = solve_dtype("slogdet", arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        let (batch, _, data) = square_batches(arr)?;
        kernel::launch(&ctx, "slogdet", data.len_of(Axis(0)));
        let (signs, logs): (Vec<f64>, Vec<f64>) = data
            .outer_iter()
            .map(|m| Lu::new(m.to_owned()).slogdet())
            .unzip();
        let shape = IxDyn(&batch);
        let signs = ArrayD::from_shape_vec(shape.clone(), signs)
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        let logs = ArrayD::from_shape_vec(shape, logs)
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        Ok((
            kernel::store_real(&ctx, device, &signs, out)?,
            kernel::store_real(&ctx, device, &logs, out)?,
        ))
    }

    fn inv(arr: &NdArray) -> Result<NdArray> {
        let out = solve_dtype("inv", arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        let (batch, n, data) = square_batches(arr)?;
        kernel::launch(&ctx, "inv", data.len());
        let mut result = Array3::<f64>::zeros(data.raw_dim());
        for (mut dst, src) in result.outer_iter_mut().zip(data.outer_iter()) {
            dst.assign(&Lu::new(src.to_owned()).inverse()?);
        }
        let result = reshaped(result.into_dyn(), &with_batch(&batch, &[n, n]))?;
        kernel::store_real(&ctx, device, &result, out)
    }

    fn qr(arr: &NdArray, mode: QrMode) -> Result<(NdArray, NdArray)> {
        let out = solve_dtype("qr", arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        let shape = arr.shape();
        let nd = shape.len();
        if nd < 2 {
            return Err(NpuError::InvalidShape(format!(
                "qr requires at least two dimensions, got {shape:?}"
            )));
        }
        let (m, n) = (shape[nd - 2], shape[nd - 1]);
        let k = m.min(n);
        let batch = shape[..nd - 2].to_vec();
        let nb: usize = batch.iter().product();
        let (q_cols, r_rows) = match mode {
            QrMode::Complete => (m, m),
            QrMode::Reduced => (k, k),
        };
        let data = kernel::load_real(arr)?
            .into_shape_with_order((nb, m, n))
            .map_err(|e| NpuError::InvalidShape(e.to_string()))?;
        kernel::launch(&ctx, "qr", data.len());

        let mut q_out = Array3::<f64>::zeros((nb, m, q_cols));
        let mut r_out = Array3::<f64>::zeros((nb, r_rows, n));
        for ((mut q_dst, mut r_dst), src) in q_out
            .outer_iter_mut()
            .zip(r_out.outer_iter_mut())
            .zip(data.outer_iter())
        {
            if k == 0 {
                for i in 0..m.min(q_cols) {
                    q_dst[[i, i]] = 1.0;
                }
                continue;
            }
            let qr = to_faer(src).qr();
            let (q, r) = match mode {
                QrMode::Complete => (qr.compute_q(), qr.compute_r()),
                QrMode::Reduced => (qr.compute_thin_q(), qr.compute_thin_r()),
            };
            q_dst.assign(&from_faer(q.as_ref()));
            r_dst.assign(&from_faer(r.as_ref()));
        }
        let q = reshaped(q_out.into_dyn(), &with_batch(&batch, &[m, q_cols]))?;
        let r = reshaped(r_out.into_dyn(), &with_batch(&batch, &[r_rows, n]))?;
        Ok((
            kernel::store_real(&ctx, device, &q, out)?,
            kernel::store_real(&ctx, device, &r, out)?,
        ))
    }

    fn matrix_power(arr: &NdArray, n: i64) -> Result<NdArray> {
        let shape = arr.shape();
        let nd = shape.len();
        if nd < 2 || shape[nd - 1] != shape[nd - 2] {
            return Err(NpuError::NotSquare(shape.to_vec()));
        }
        if n < 0 {
            return power(&Self::inv(arr)?, n.unsigned_abs());
        }
        power(arr, n.unsigned_abs())
    }

    fn einsum(subscripts: &str, operands: &[&NdArray]) -> Result<NdArray> {
        einsum::einsum(subscripts, operands)
    }

    fn norm(
        arr: &NdArray,
        ord: Option<NormOrd>,
        axes: &Axes,
        keepdims: bool,
    ) -> Result<NdArray> {
        let dtype = arr.dtype();
        let out = match dtype.kind() {
            Kind::Float => dtype,
            Kind::Complex => dtype.real_part(),
            _ => DType::FLOAT64,
        };
        let (ctx, device) = kernel::placement(&[arr])?;
        let reduced = axes.normalize(arr.ndim())?;
        let mags = match kernel::load(arr)? {
            Values::Complex(data) => data.mapv(|z| z.norm()),
            Values::Real(data) => data.mapv(f64::abs),
        };
        kernel::launch(&ctx, "norm", arr.size());

        let result = match (ord, reduced.as_slice()) {
            (None, _) if matches!(axes, Axes::All) => {
                ArrayD::from_elem(IxDyn(&[]), mags.iter().map(|x| x * x).sum::<f64>().sqrt())
            }
            (Some(NormOrd::Fro), [_]) => {
                return Err(NpuError::InvalidArgument(
                    "invalid norm order 'fro' for vectors".into(),
                ))
            }
            (ord, &[axis]) => {
                let p = match ord {
                    Some(NormOrd::P(p)) => p,
                    _ => 2.0,
                };
                mags.map_axis(Axis(axis), |lane| vector_norm(lane, p))
            }
            (ord, &[row, col]) => matrix_norm(mags, row, col, ord)?,
            _ => {
                return Err(NpuError::InvalidShape(format!(
                    "improper number of dimensions to norm: {}",
                    reduced.len()
                )))
            }
        };
        let result = if keepdims {
            reduced
                .iter()
                .fold(result, |acc, &axis| acc.insert_axis(Axis(axis)))
        } else {
            result
        };
        kernel::store_real(&ctx, device, &result, out)
    }

    fn trace(arr: &NdArray) -> Result<NdArray> {
        let out = ReduceOp::Sum.result_dtype(arr.dtype())?;
        let (ctx, device) = kernel::placement(&[arr])?;
        kernel::launch(&ctx, "trace", arr.size());
        if kernel::is_exact(arr.dtype()) {
            let result = trace_lanes(load_exact(arr)?)?.mapv(|w| w.0);
            return kernel::store_int(&ctx, device, &result, out);
        }
        let values = match kernel::load(arr)? {
            Values::Complex(data) => Values::Complex(trace_lanes(data)?),
            Values::Real(data) => Values::Real(trace_lanes(data)?),
        };
        kernel::store(&ctx, device, &values, out)
    }

    fn transpose(arr: &NdArray) -> Result<NdArray> {
        arr.transpose()
    }
}
