//! Sparse shape: per-tile Frobenius-norm estimates over the tile grid
//!
//! A [`SparseShape`] carries one normalized norm per tile of a block
//! tensor, plus per-dimension tile-size vectors. Norms are stored as
//! `‖A_{ij…}‖ / (N_i · N_j · …)`, so pruning decisions are a pointwise
//! comparison against the process-wide threshold regardless of tile
//! size. The algebra below predicts norms of operation results without
//! touching tile data, hard-zeroing every entry that falls under the
//! threshold.
//!
//! Shapes are immutable values: every operation returns a fresh shape,
//! and norm tensors and size vectors are reference-shared between
//! derived shapes.

use crate::error::{Error, Result};
use crate::perm::Permutation;
use crate::runtime::Communicator;
use crate::shape::norm::NormValue;
use crate::shape::outer::{
    inv_sqrt_vec, inv_vec, noop_vec, recursive_outer_product, split_outer_product,
};
use crate::tensor::{GemmHelper, Range, Tensor, TiledRange};
use std::sync::Arc;

/// Per-dimension tile-size vectors, shared between derived shapes
type SizeVectors<T> = Arc<Vec<Vec<T>>>;

/// Tile-norm shape of a block-sparse tensor
#[derive(Clone, Debug)]
pub struct SparseShape<T: NormValue> {
    tile_norms: Tensor<T>,
    size_vectors: SizeVectors<T>,
}

impl<T: NormValue> Default for SparseShape<T> {
    /// An uninitialized shape holding no data.
    fn default() -> Self {
        Self {
            tile_norms: Tensor::default(),
            size_vectors: Arc::new(Vec::new()),
        }
    }
}

impl<T: NormValue> SparseShape<T> {
    /// Fast path: parts are already normalized and thresholded.
    fn from_parts(tile_norms: Tensor<T>, size_vectors: SizeVectors<T>) -> Self {
        Self {
            tile_norms,
            size_vectors,
        }
    }

    /// Construct a shape from raw (un-normalized) tile norms.
    ///
    /// Each norm is divided by the element count of its tile; entries
    /// below the threshold become exactly zero. Fails when `tile_norms`
    /// is empty, does not cover the tile grid of `trange`, or contains
    /// a negative entry.
    pub fn new(tile_norms: &Tensor<T>, trange: &TiledRange) -> Result<Self> {
        let size_vectors = Self::size_vectors_of(trange);
        let mut data = Self::validate_raw(tile_norms, trange)?;
        Self::normalize(&mut data, &size_vectors)?;
        Ok(Self::from_parts(
            Tensor::from_vec(tile_norms.range().clone(), data)?,
            Arc::new(size_vectors),
        ))
    }

    /// Collective constructor: sum raw norms across all processes, then
    /// normalize.
    ///
    /// Every process contributes its local tile norms; after the
    /// all-reduce each process holds the same shape.
    pub fn with_comm<C: Communicator>(
        comm: &C,
        tile_norms: &Tensor<T>,
        trange: &TiledRange,
    ) -> Result<Self> {
        let size_vectors = Self::size_vectors_of(trange);
        let mut data = Self::validate_raw(tile_norms, trange)?;
        comm.all_reduce_sum(&mut data)?;
        Self::normalize(&mut data, &size_vectors)?;
        Ok(Self::from_parts(
            Tensor::from_vec(tile_norms.range().clone(), data)?,
            Arc::new(size_vectors),
        ))
    }

    fn validate_raw(tile_norms: &Tensor<T>, trange: &TiledRange) -> Result<Vec<T>> {
        if tile_norms.empty() {
            return Err(Error::EmptyShape);
        }
        let tiles = trange.tiles();
        if tile_norms.range() != &tiles {
            return Err(Error::range_mismatch(
                tiles.extents(),
                tile_norms.range().extents(),
            ));
        }
        Ok(tile_norms.data().to_vec())
    }

    fn size_vectors_of(trange: &TiledRange) -> Vec<Vec<T>> {
        trange
            .dims()
            .iter()
            .map(|dim| {
                (0..dim.tile_count())
                    .map(|i| T::from_size(dim.tile_extent(i)))
                    .collect()
            })
            .collect()
    }

    /// Divide each norm by its tile's element count and hard-zero
    /// entries under the threshold.
    fn normalize(data: &mut [T], size_vectors: &[Vec<T>]) -> Result<()> {
        if let Some(ordinal) = data.iter().position(|v| *v < T::zero()) {
            return Err(Error::NegativeNorm { ordinal });
        }
        let threshold = T::threshold();
        match size_vectors.len() {
            0 => {
                for v in data.iter_mut() {
                    if *v < threshold {
                        *v = T::zero();
                    }
                }
            }
            1 => {
                for (v, &size) in data.iter_mut().zip(size_vectors[0].iter()) {
                    *v = *v / size;
                    if *v < threshold {
                        *v = T::zero();
                    }
                }
            }
            _ => {
                let (left, right) = split_outer_product(size_vectors, &inv_vec);
                apply_outer(data, &left, &right, |v, x| {
                    let v = v * x;
                    if v < threshold {
                        T::zero()
                    } else {
                        v
                    }
                });
            }
        }
        Ok(())
    }

    /// Multiply each norm back by its tile's element count.
    ///
    /// Entrywise tile products scale with √N rather than N, so the
    /// product of two normalized norms must be de-normalized once.
    fn scale_by_size(data: &mut [T], size_vectors: &[Vec<T>]) {
        let threshold = T::threshold();
        match size_vectors.len() {
            0 => {
                for v in data.iter_mut() {
                    if *v < threshold {
                        *v = T::zero();
                    }
                }
            }
            1 => {
                for (v, &size) in data.iter_mut().zip(size_vectors[0].iter()) {
                    *v = *v * size;
                    if *v < threshold {
                        *v = T::zero();
                    }
                }
            }
            _ => {
                let (left, right) = split_outer_product(size_vectors, &noop_vec);
                apply_outer(data, &left, &right, |v, x| {
                    let v = v * x;
                    if v < threshold {
                        T::zero()
                    } else {
                        v
                    }
                });
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.tile_norms.empty() {
            Err(Error::EmptyShape)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether this shape has been initialized with norm data.
    pub fn empty(&self) -> bool {
        self.tile_norms.empty()
    }

    /// Whether every in-range tile might hold data. Sparse shapes never
    /// promise density.
    pub const fn is_dense() -> bool {
        false
    }

    /// Whether the tile at linear offset `ordinal` is pruned.
    pub fn is_zero(&self, ordinal: usize) -> Result<bool> {
        Ok(self.norm(ordinal)? < T::threshold())
    }

    /// Whether the tile at multi-index `index` is pruned.
    pub fn is_zero_at(&self, index: &[usize]) -> Result<bool> {
        Ok(self.norm_at(index)? < T::threshold())
    }

    /// Normalized norm of the tile at linear offset `ordinal`.
    pub fn norm(&self, ordinal: usize) -> Result<T> {
        self.ensure_ready()?;
        if ordinal >= self.tile_norms.size() {
            return Err(Error::invalid_argument(
                "ordinal",
                format!("{ordinal} outside {:?}", self.tile_norms.range()),
            ));
        }
        Ok(self.tile_norms[ordinal])
    }

    /// Normalized norm of the tile at multi-index `index`.
    pub fn norm_at(&self, index: &[usize]) -> Result<T> {
        self.ensure_ready()?;
        self.tile_norms.at(index)
    }

    /// Number of tiles pruned under the current threshold.
    pub fn zero_tile_count(&self) -> usize {
        let threshold = T::threshold();
        self.tile_norms
            .data()
            .iter()
            .filter(|&&v| v < threshold)
            .count()
    }

    /// Fraction of tiles pruned under the current threshold.
    ///
    /// An empty shape has fraction `0.0`.
    pub fn zero_fraction(&self) -> f64 {
        if self.tile_norms.size() == 0 {
            return 0.0;
        }
        self.zero_tile_count() as f64 / self.tile_norms.size() as f64
    }

    /// The normalized norm tensor.
    pub fn data(&self) -> &Tensor<T> {
        &self.tile_norms
    }

    /// Whether `range` matches the tile grid of this shape.
    pub fn validate(&self, range: &Range) -> bool {
        !self.tile_norms.empty() && range == self.tile_norms.range()
    }

    /// Current process-wide zero threshold for `T`.
    pub fn threshold() -> T {
        T::threshold()
    }

    /// Replace the process-wide zero threshold for `T`.
    ///
    /// The threshold must be positive and finite.
    pub fn set_threshold(value: T) -> Result<()> {
        if !value.is_finite() || value <= T::zero() {
            return Err(Error::InvalidThreshold {
                value: value.to_f64().unwrap_or(f64::NAN),
            });
        }
        T::store_threshold(value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Algebra
    // ------------------------------------------------------------------

    /// Shape with axes reordered by `perm`; size vectors move with
    /// their axes.
    pub fn perm(&self, perm: &Permutation) -> Result<Self> {
        self.ensure_ready()?;
        let tile_norms = self.tile_norms.permute(perm)?;
        let size_vectors = perm.permute_slice(&self.size_vectors);
        Ok(Self::from_parts(tile_norms, Arc::new(size_vectors)))
    }

    /// Shape scaled by `|factor|`.
    pub fn scale(&self, factor: T) -> Result<Self> {
        self.ensure_ready()?;
        let factor = factor.abs();
        let threshold = T::threshold();
        let tile_norms = self.tile_norms.unary(|v| {
            let v = v * factor;
            if v < threshold {
                T::zero()
            } else {
                v
            }
        });
        Ok(Self::from_parts(tile_norms, Arc::clone(&self.size_vectors)))
    }

    /// Shape scaled by `|factor|`, then permuted.
    pub fn scale_perm(&self, factor: T, perm: &Permutation) -> Result<Self> {
        self.scale(factor)?.perm(perm)
    }

    /// Entrywise sum of norms.
    ///
    /// By the triangle inequality the true norm of a sum is bounded by
    /// the sum of norms, so the result conservatively preserves every
    /// "might be non-zero" tile.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.binary_with(other, |a, b| a + b)
    }

    /// Entrywise sum of norms, then permuted.
    pub fn add_perm(&self, other: &Self, perm: &Permutation) -> Result<Self> {
        self.add(other)?.perm(perm)
    }

    /// Entrywise sum of norms scaled by `|factor|`.
    pub fn add_scaled(&self, other: &Self, factor: T) -> Result<Self> {
        let factor = factor.abs();
        self.binary_with(other, move |a, b| (a + b) * factor)
    }

    /// Entrywise scaled sum of norms, then permuted.
    pub fn add_scaled_perm(&self, other: &Self, factor: T, perm: &Permutation) -> Result<Self> {
        self.add_scaled(other, factor)?.perm(perm)
    }

    fn binary_with(&self, other: &Self, f: impl Fn(T, T) -> T) -> Result<Self> {
        self.ensure_ready()?;
        other.ensure_ready()?;
        let threshold = T::threshold();
        let tile_norms = self.tile_norms.binary(&other.tile_norms, |a, b| {
            let v = f(a, b);
            if v < threshold {
                T::zero()
            } else {
                v
            }
        })?;
        Ok(Self::from_parts(tile_norms, Arc::clone(&self.size_vectors)))
    }

    /// Shape of adding the element-wise constant `value` to every tile.
    ///
    /// A constant `v` over an N-element tile has Frobenius norm
    /// `|v|·√N`, so the normalized contribution is `|v| / √N`.
    pub fn add_const(&self, value: T) -> Result<Self> {
        self.ensure_ready()?;
        let value = value.abs();
        let threshold = T::threshold();
        let mut data = self.tile_norms.data().to_vec();
        match self.size_vectors.len() {
            0 => {
                for v in data.iter_mut() {
                    *v = *v + value;
                    if *v < threshold {
                        *v = T::zero();
                    }
                }
            }
            1 => {
                for (v, &size) in data.iter_mut().zip(self.size_vectors[0].iter()) {
                    *v = *v + value / size.sqrt();
                    if *v < threshold {
                        *v = T::zero();
                    }
                }
            }
            _ => {
                let (left, right) = split_outer_product(&self.size_vectors, &inv_sqrt_vec);
                apply_outer(&mut data, &left, &right, |v, x| {
                    let v = v + value * x;
                    if v < threshold {
                        T::zero()
                    } else {
                        v
                    }
                });
            }
        }
        Ok(Self::from_parts(
            Tensor::from_vec(self.tile_norms.range().clone(), data)?,
            Arc::clone(&self.size_vectors),
        ))
    }

    /// Constant-addition shape, then permuted.
    pub fn add_const_perm(&self, value: T, perm: &Permutation) -> Result<Self> {
        self.add_const(value)?.perm(perm)
    }

    /// Shape of a tile subtraction.
    ///
    /// Subtraction can only add magnitude uncertainty, so this is the
    /// same conservative upper bound as [`add`](Self::add).
    pub fn subt(&self, other: &Self) -> Result<Self> {
        self.add(other)
    }

    /// Subtraction shape, then permuted.
    pub fn subt_perm(&self, other: &Self, perm: &Permutation) -> Result<Self> {
        self.add_perm(other, perm)
    }

    /// Subtraction shape scaled by `|factor|`.
    pub fn subt_scaled(&self, other: &Self, factor: T) -> Result<Self> {
        self.add_scaled(other, factor)
    }

    /// Scaled subtraction shape, then permuted.
    pub fn subt_scaled_perm(&self, other: &Self, factor: T, perm: &Permutation) -> Result<Self> {
        self.add_scaled_perm(other, factor, perm)
    }

    /// Shape of subtracting an element-wise constant; bounds as
    /// [`add_const`](Self::add_const).
    pub fn subt_const(&self, value: T) -> Result<Self> {
        self.add_const(value)
    }

    /// Constant-subtraction shape, then permuted.
    pub fn subt_const_perm(&self, value: T, perm: &Permutation) -> Result<Self> {
        self.add_const_perm(value, perm)
    }

    /// Shape of an entrywise tile product.
    ///
    /// Norm products are computed in normalized space and then
    /// de-normalized once, because a pointwise tile product's norm
    /// scales with √N rather than N.
    pub fn mult(&self, other: &Self) -> Result<Self> {
        self.mult_scaled(other, T::one())
    }

    /// Entrywise tile-product shape scaled by `|factor|`.
    pub fn mult_scaled(&self, other: &Self, factor: T) -> Result<Self> {
        self.ensure_ready()?;
        other.ensure_ready()?;
        if self.tile_norms.range() != other.tile_norms.range() {
            return Err(Error::range_mismatch(
                self.tile_norms.range().extents(),
                other.tile_norms.range().extents(),
            ));
        }
        let factor = factor.abs();
        let mut data: Vec<T> = self
            .tile_norms
            .data()
            .iter()
            .zip(other.tile_norms.data().iter())
            .map(|(&a, &b)| a * b * factor)
            .collect();
        Self::scale_by_size(&mut data, &self.size_vectors);
        Ok(Self::from_parts(
            Tensor::from_vec(self.tile_norms.range().clone(), data)?,
            Arc::clone(&self.size_vectors),
        ))
    }

    /// Entrywise tile-product shape, then permuted.
    pub fn mult_perm(&self, other: &Self, perm: &Permutation) -> Result<Self> {
        self.mult(other)?.perm(perm)
    }

    /// Scaled entrywise tile-product shape, then permuted.
    pub fn mult_scaled_perm(&self, other: &Self, factor: T, perm: &Permutation) -> Result<Self> {
        self.mult_scaled(other, factor)?.perm(perm)
    }

    /// Shape of a general tile contraction.
    ///
    /// Both operands are flattened to norm matrices per `helper`, each
    /// pre-multiplied along the contracted axes by the tile sizes (the
    /// ℓ²-inequality over a contracted index sums de-normalized norms),
    /// and multiplied on the numeric GEMM path. Entries below the
    /// threshold are hard-zeroed. With no contracted axes this is the
    /// scaled outer product of the two norm sets.
    pub fn gemm(&self, other: &Self, factor: T, helper: &GemmHelper) -> Result<Self> {
        self.ensure_ready()?;
        other.ensure_ready()?;
        let factor = factor.abs();
        let threshold = T::threshold();

        let (m, n, _k) = helper.compute_matrix_sizes(self.tile_norms.range(), other.tile_norms.range())?;
        let result_range =
            helper.make_result_range(self.tile_norms.range(), other.tile_norms.range())?;

        let mut size_vectors = Vec::with_capacity(helper.result_rank());
        for d in helper.left_outer() {
            size_vectors.push(self.size_vectors[d].clone());
        }
        for d in helper.right_outer() {
            size_vectors.push(other.size_vectors[d].clone());
        }

        let mut result_norms = if helper.num_contract_ranks() > 0 {
            // De-normalize the contracted axes on both sides, then let
            // the numeric GEMM sum the products.
            let k_sizes =
                recursive_outer_product(&self.size_vectors[helper.left_inner()], &noop_vec);
            let k = k_sizes.len();

            let left_scaled: Vec<T> = self
                .tile_norms
                .data()
                .iter()
                .enumerate()
                .map(|(i, &v)| v * k_sizes[i % k])
                .collect();
            let right_scaled: Vec<T> = other
                .tile_norms
                .data()
                .iter()
                .enumerate()
                .map(|(i, &v)| v * k_sizes[i / n])
                .collect();

            let left = Tensor::from_vec(self.tile_norms.range().clone(), left_scaled)?;
            let right = Tensor::from_vec(other.tile_norms.range().clone(), right_scaled)?;
            left.gemm(&right, factor, helper)?
        } else {
            let mut data = Vec::with_capacity(m * n);
            for i in 0..m {
                for j in 0..n {
                    data.push(self.tile_norms[i] * other.tile_norms[j] * factor);
                }
            }
            Tensor::from_vec(result_range.clone(), data)?
        };

        result_norms.inplace_unary(|v| {
            if *v < threshold {
                *v = T::zero();
            }
        });

        Ok(Self::from_parts(result_norms, Arc::new(size_vectors)))
    }

    /// Contraction shape, then permuted.
    pub fn gemm_perm(
        &self,
        other: &Self,
        factor: T,
        helper: &GemmHelper,
        perm: &Permutation,
    ) -> Result<Self> {
        self.gemm(other, factor, helper)?.perm(perm)
    }
}

/// Walk `data` as a `left.len() × right.len()` row-major matrix and map
/// each entry with its outer-product coefficient.
fn apply_outer<T: NormValue>(data: &mut [T], left: &[T], right: &[T], f: impl Fn(T, T) -> T) {
    debug_assert_eq!(data.len(), left.len() * right.len());
    for (row, &l) in left.iter().enumerate() {
        let base = row * right.len();
        for (col, &r) in right.iter().enumerate() {
            let v = &mut data[base + col];
            *v = f(*v, l * r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TiledRange1;
    use serial_test::serial;

    fn trange_1d(tiles: usize, extent: usize) -> TiledRange {
        TiledRange::new(vec![TiledRange1::uniform(tiles, extent).unwrap()])
    }

    #[test]
    #[serial]
    fn test_normalize_divides_by_tile_volume() {
        let trange = TiledRange::new(vec![
            TiledRange1::uniform(2, 4).unwrap(),
            TiledRange1::uniform(2, 5).unwrap(),
        ]);
        let raw = Tensor::from_vec(Range::new(&[2, 2]), vec![20.0, 40.0, 60.0, 80.0]).unwrap();
        let shape = SparseShape::new(&raw, &trange).unwrap();
        // every tile holds 4 * 5 = 20 elements
        assert_eq!(shape.data().data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    #[serial]
    fn test_one_dim_matches_multi_dim_with_unit_axis() {
        let values = vec![10.0, 20.0, 30.0];
        let one_dim = SparseShape::new(
            &Tensor::from_vec(Range::new(&[3]), values.clone()).unwrap(),
            &trange_1d(3, 5),
        )
        .unwrap();
        let two_dim = SparseShape::new(
            &Tensor::from_vec(Range::new(&[3, 1]), values).unwrap(),
            &TiledRange::new(vec![
                TiledRange1::uniform(3, 5).unwrap(),
                TiledRange1::uniform(1, 1).unwrap(),
            ]),
        )
        .unwrap();
        assert_eq!(one_dim.data().data(), two_dim.data().data());
    }

    #[test]
    #[serial]
    fn test_negative_norm_rejected() {
        let raw = Tensor::from_vec(Range::new(&[2]), vec![1.0, -0.5]).unwrap();
        assert_eq!(
            SparseShape::new(&raw, &trange_1d(2, 1)).unwrap_err(),
            Error::NegativeNorm { ordinal: 1 }
        );
    }

    #[test]
    fn test_empty_shape_operations_fail() {
        let shape = SparseShape::<f64>::default();
        assert!(shape.empty());
        assert_eq!(shape.scale(2.0).unwrap_err(), Error::EmptyShape);
        assert_eq!(shape.is_zero(0), Err(Error::EmptyShape));
        assert!(!shape.validate(&Range::new(&[1])));
    }

    #[test]
    #[serial]
    fn test_set_threshold_validation() {
        assert!(SparseShape::<f64>::set_threshold(0.0).is_err());
        assert!(SparseShape::<f64>::set_threshold(-1.0).is_err());
        assert!(SparseShape::<f64>::set_threshold(f64::NAN).is_err());
        let before = SparseShape::<f64>::threshold();
        SparseShape::<f64>::set_threshold(1e-3).unwrap();
        assert_eq!(SparseShape::<f64>::threshold(), 1e-3);
        SparseShape::<f64>::set_threshold(before).unwrap();
    }
}
