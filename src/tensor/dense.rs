//! Dense tensor over a [`Range`], with the arithmetic the shape engine
//! and tile reductions consume
//!
//! The buffer is `Arc`-shared: `clone()` is shallow, and the in-place
//! entry points copy-on-write when the buffer has other owners. A
//! tensor exposed through a shape is never mutated afterwards.

use crate::error::{Error, Result};
use crate::perm::Permutation;
use crate::tensor::{Element, GemmHelper, Index, Range};
use std::ops;
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Below this many scalar multiply-adds, a parallel gemm is not worth
/// the fork-join overhead.
#[cfg(feature = "rayon")]
const GEMM_PAR_MIN_WORK: usize = 16 * 1024;

/// Dense multi-dimensional array with a shared buffer
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T> {
    range: Range,
    data: Arc<Vec<T>>,
}

impl<T> Default for Tensor<T> {
    fn default() -> Self {
        Self {
            range: Range::new(&[0]),
            data: Arc::new(Vec::new()),
        }
    }
}

impl<T> Tensor<T> {
    /// The index range of this tensor.
    #[inline]
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// The flat row-major element buffer.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether this tensor holds no data.
    #[inline]
    pub fn empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of dimensions.
    #[inline]
    pub fn dim(&self) -> usize {
        self.range.dim()
    }
}

impl<T: Clone> Tensor<T> {
    /// Create a tensor with every element set to `fill`.
    pub fn new(range: Range, fill: T) -> Self {
        let volume = range.volume();
        Self {
            range,
            data: Arc::new(vec![fill; volume]),
        }
    }

    /// Create a tensor from a flat row-major buffer.
    ///
    /// `data.len()` must equal `range.volume()`.
    pub fn from_vec(range: Range, data: Vec<T>) -> Result<Self> {
        if data.len() != range.volume() {
            return Err(Error::invalid_argument(
                "data",
                format!(
                    "buffer of {} elements does not fill {:?}",
                    data.len(),
                    range
                ),
            ));
        }
        Ok(Self {
            range,
            data: Arc::new(data),
        })
    }
}

impl<T: Element> Tensor<T> {
    /// Create a zero-filled tensor.
    pub fn zeros(range: Range) -> Self {
        Self::new(range, T::zero())
    }

    /// Element at a multi-index.
    pub fn at(&self, index: &[usize]) -> Result<T> {
        Ok(self.data[self.range.ordinal(index)?])
    }

    /// New tensor with `f` applied to every element.
    pub fn unary(&self, f: impl Fn(T) -> T) -> Tensor<T> {
        Tensor {
            range: self.range.clone(),
            data: Arc::new(self.data.iter().map(|&v| f(v)).collect()),
        }
    }

    /// Apply `f` to every element in place.
    ///
    /// Copies the buffer first when it is shared with other tensors.
    pub fn inplace_unary(&mut self, f: impl Fn(&mut T)) {
        for v in Arc::make_mut(&mut self.data).iter_mut() {
            f(v);
        }
    }

    /// New tensor combining elements of `self` and `other` with `f`.
    ///
    /// The ranges must be identical.
    pub fn binary(&self, other: &Tensor<T>, f: impl Fn(T, T) -> T) -> Result<Tensor<T>> {
        if self.range != other.range {
            return Err(Error::range_mismatch(
                self.range.extents(),
                other.range.extents(),
            ));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Tensor {
            range: self.range.clone(),
            data: Arc::new(data),
        })
    }

    /// Entrywise sum.
    pub fn add(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(other, |a, b| a + b)
    }

    /// Entrywise product.
    pub fn mult(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(other, |a, b| a * b)
    }

    /// Accumulate `other` into `self`.
    ///
    /// An empty operand is treated as zero: adding to an empty tensor
    /// replaces it, adding an empty tensor is a no-op.
    pub fn add_to(&mut self, other: &Tensor<T>) -> Result<()> {
        if other.empty() {
            return Ok(());
        }
        if self.empty() {
            *self = other.clone();
            return Ok(());
        }
        if self.range != other.range {
            return Err(Error::range_mismatch(
                self.range.extents(),
                other.range.extents(),
            ));
        }
        for (a, &b) in Arc::make_mut(&mut self.data).iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// New tensor with axes scattered by `perm`: the element at
    /// multi-index `i` lands at the index `j` with `j[p[d]] = i[d]`.
    pub fn permute(&self, perm: &Permutation) -> Result<Tensor<T>> {
        if perm.dim() != self.range.dim() {
            return Err(Error::InvalidPermutation {
                perm: perm.as_slice().to_vec(),
            });
        }
        if perm.is_identity() {
            return Ok(self.clone());
        }
        let out_range = self.range.permuted(perm);
        let mut out = vec![T::zero(); self.data.len()];
        let mut out_index = Index::from_elem(0, self.range.dim());
        for (ordinal, &v) in self.data.iter().enumerate() {
            let index = self.range.unravel(ordinal);
            for (d, &i) in index.iter().enumerate() {
                out_index[perm.map(d)] = i;
            }
            out[out_range.ordinal(&out_index)?] = v;
        }
        Tensor::from_vec(out_range, out)
    }

    /// Contract `self` with `other` per `helper`, scaled by `alpha`.
    ///
    /// `self` flattens to an M×K matrix, `other` to K×N; the result is
    /// the `alpha`-scaled matrix product over the result range.
    pub fn gemm(&self, other: &Tensor<T>, alpha: T, helper: &GemmHelper) -> Result<Tensor<T>> {
        let (m, n, k) = helper.compute_matrix_sizes(&self.range, &other.range)?;
        let range = helper.make_result_range(&self.range, &other.range)?;
        let mut out = vec![T::zero(); range.volume()];
        gemm_kernel(&mut out, &self.data, &other.data, m, n, k, alpha);
        Tensor::from_vec(range, out)
    }

    /// Contract `left` with `right` per `helper` and accumulate the
    /// `alpha`-scaled product into `self`.
    pub fn gemm_inplace(
        &mut self,
        left: &Tensor<T>,
        right: &Tensor<T>,
        alpha: T,
        helper: &GemmHelper,
    ) -> Result<()> {
        let (m, n, k) = helper.compute_matrix_sizes(&left.range, &right.range)?;
        let range = helper.make_result_range(&left.range, &right.range)?;
        if self.range != range {
            return Err(Error::range_mismatch(range.extents(), self.range.extents()));
        }
        let out_data: &mut Vec<T> = Arc::make_mut(&mut self.data);
        gemm_kernel(
            out_data.as_mut_slice(),
            &left.data,
            &right.data,
            m,
            n,
            k,
            alpha,
        );
        Ok(())
    }
}

impl<T> ops::Index<usize> for Tensor<T> {
    type Output = T;

    fn index(&self, ordinal: usize) -> &T {
        &self.data[ordinal]
    }
}

/// Accumulate `alpha * a · b` into `out`, where `a` is M×K and `b` is
/// K×N, both row-major.
fn gemm_kernel<T: Element>(out: &mut [T], a: &[T], b: &[T], m: usize, n: usize, k: usize, alpha: T) {
    if m == 0 || n == 0 {
        return;
    }
    debug_assert_eq!(out.len(), m * n);

    #[cfg(feature = "rayon")]
    {
        if m * n * k >= GEMM_PAR_MIN_WORK {
            out.par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| gemm_row(i, out_row, a, b, n, k, alpha));
            return;
        }
    }

    for (i, out_row) in out.chunks_mut(n).enumerate() {
        gemm_row(i, out_row, a, b, n, k, alpha);
    }
}

fn gemm_row<T: Element>(i: usize, out_row: &mut [T], a: &[T], b: &[T], n: usize, k: usize, alpha: T) {
    for kk in 0..k {
        let av = a[i * k + kk] * alpha;
        if av == T::zero() {
            continue;
        }
        let b_row = &b[kk * n..(kk + 1) * n];
        for (o, &bv) in out_row.iter_mut().zip(b_row) {
            *o += av * bv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_2x2(values: [f64; 4]) -> Tensor<f64> {
        Tensor::from_vec(Range::new(&[2, 2]), values.to_vec()).unwrap()
    }

    #[test]
    fn test_from_vec_length_checked() {
        assert!(Tensor::from_vec(Range::new(&[2, 2]), vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_binary_range_mismatch() {
        let a = tensor_2x2([1.0, 2.0, 3.0, 4.0]);
        let b = Tensor::from_vec(Range::new(&[4]), vec![0.0; 4]).unwrap();
        assert!(a.binary(&b, |x, y| x + y).is_err());
    }

    #[test]
    fn test_permute_transposes() {
        let a = Tensor::from_vec(Range::new(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let p = Permutation::new(&[1, 0]).unwrap();
        let t = a.permute(&p).unwrap();
        assert_eq!(t.range(), &Range::new(&[3, 2]));
        assert_eq!(t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_permute_round_trip() {
        let a = Tensor::from_vec(
            Range::new(&[2, 3, 4]),
            (0..24).map(|v| v as f64).collect(),
        )
        .unwrap();
        let p = Permutation::new(&[2, 0, 1]).unwrap();
        let back = a.permute(&p).unwrap().permute(&p.inverse()).unwrap();
        assert_eq!(back.data(), a.data());
    }

    #[test]
    fn test_gemm_matches_hand_product() {
        // [[1, 2], [3, 4]] · [[5, 6], [7, 8]]
        let a = tensor_2x2([1.0, 2.0, 3.0, 4.0]);
        let b = tensor_2x2([5.0, 6.0, 7.0, 8.0]);
        let h = GemmHelper::new(2, 2, 2).unwrap();
        let c = a.gemm(&b, 1.0, &h).unwrap();
        assert_eq!(c.data(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_gemm_inplace_accumulates() {
        let a = tensor_2x2([1.0, 0.0, 0.0, 1.0]);
        let b = tensor_2x2([5.0, 6.0, 7.0, 8.0]);
        let h = GemmHelper::new(2, 2, 2).unwrap();
        let mut c = a.gemm(&b, 1.0, &h).unwrap();
        c.gemm_inplace(&a, &b, 1.0, &h).unwrap();
        assert_eq!(c.data(), &[10.0, 12.0, 14.0, 16.0]);
    }

    #[test]
    fn test_add_to_empty_replaces() {
        let mut acc = Tensor::<f64>::default();
        let a = tensor_2x2([1.0, 2.0, 3.0, 4.0]);
        acc.add_to(&a).unwrap();
        assert_eq!(acc.data(), a.data());
        acc.add_to(&a).unwrap();
        assert_eq!(acc.data(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_inplace_unary_copy_on_write() {
        let a = tensor_2x2([1.0, 2.0, 3.0, 4.0]);
        let mut b = a.clone();
        b.inplace_unary(|v| *v *= 10.0);
        assert_eq!(a.data(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(b.data(), &[10.0, 20.0, 30.0, 40.0]);
    }
}
