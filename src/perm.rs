//! Permutation: a validated bijection on tensor dimensions
//!
//! A permutation `p` maps axis `i` of the source to axis `p[i]` of the
//! result. The same map is applied to norm tensors and to per-dimension
//! size vectors, so the two stay consistent across permuted operations.

use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::fmt;

/// Stack allocation threshold for dimensions
const STACK_DIMS: usize = 4;

/// A bijection on `{0, …, dim-1}` describing how axes are reordered
///
/// `p[i]` is the position that source axis `i` takes in the result.
#[derive(Clone, PartialEq, Eq)]
pub struct Permutation(SmallVec<[usize; STACK_DIMS]>);

impl Permutation {
    /// Create a permutation from an index map.
    ///
    /// Fails with [`Error::InvalidPermutation`] unless `map` is a
    /// bijection on `{0, …, map.len()-1}`.
    pub fn new(map: &[usize]) -> Result<Self> {
        let mut seen = vec![false; map.len()];
        for &target in map {
            if target >= map.len() || seen[target] {
                return Err(Error::InvalidPermutation {
                    perm: map.to_vec(),
                });
            }
            seen[target] = true;
        }
        Ok(Self(map.iter().copied().collect()))
    }

    /// The identity permutation on `dim` axes.
    pub fn identity(dim: usize) -> Self {
        Self((0..dim).collect())
    }

    /// Number of dimensions this permutation acts on.
    #[inline]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Whether this permutation maps every axis to itself.
    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &p)| i == p)
    }

    /// Destination axis of source axis `i`.
    #[inline]
    pub fn map(&self, i: usize) -> usize {
        self.0[i]
    }

    /// View the underlying index map.
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// The inverse permutation.
    pub fn inverse(&self) -> Self {
        let mut inv = SmallVec::from_elem(0, self.0.len());
        for (i, &p) in self.0.iter().enumerate() {
            inv[p] = i;
        }
        Self(inv)
    }

    /// Scatter `src` so that `out[p[i]] = src[i]`.
    ///
    /// Used for extents, strides, and size-vector reordering. `src.len()`
    /// must equal `self.dim()`.
    pub fn permute_slice<T: Clone>(&self, src: &[T]) -> Vec<T> {
        debug_assert_eq!(src.len(), self.0.len());
        let mut out: Vec<T> = src.to_vec();
        for (i, &p) in self.0.iter().enumerate() {
            out[p] = src[i].clone();
        }
        out
    }
}

impl fmt::Debug for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permutation({:?})", self.0.as_slice())
    }
}
