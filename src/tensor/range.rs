//! Range: a dense row-major index box over the tile grid

use crate::error::{Error, Result};
use crate::perm::Permutation;
use smallvec::SmallVec;
use std::fmt;

/// Stack allocation threshold for dimensions
///
/// Most tile grids have 4 or fewer dimensions, so we stack-allocate up to 4.
pub(crate) const STACK_DIMS: usize = 4;

/// Extents type: size along each dimension of a range
pub type Extents = SmallVec<[usize; STACK_DIMS]>;

/// Multi-index type: one coordinate per dimension
pub type Index = SmallVec<[usize; STACK_DIMS]>;

/// A dense, origin-zero, row-major index box
///
/// `Range` describes the coordinate space of a tile grid: `extents[d]`
/// tiles along dimension `d`, addressed by multi-indices in
/// `[0, extents[0]) × … × [0, extents[dim-1])` or by their row-major
/// linear ordinal.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Range {
    extents: Extents,
}

impl Range {
    /// Create a range from per-dimension extents.
    pub fn new(extents: &[usize]) -> Self {
        Self {
            extents: extents.iter().copied().collect(),
        }
    }

    /// Number of dimensions.
    #[inline]
    pub fn dim(&self) -> usize {
        self.extents.len()
    }

    /// Per-dimension extents.
    #[inline]
    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    /// Total number of addressable positions.
    #[inline]
    pub fn volume(&self) -> usize {
        if self.extents.is_empty() {
            // A rank-0 range addresses exactly one (scalar) position.
            1
        } else {
            self.extents.iter().product()
        }
    }

    /// Whether `index` lies inside this range.
    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() == self.extents.len()
            && index.iter().zip(self.extents.iter()).all(|(i, e)| i < e)
    }

    /// Row-major linear offset of `index`.
    pub fn ordinal(&self, index: &[usize]) -> Result<usize> {
        if !self.contains(index) {
            return Err(Error::invalid_argument(
                "index",
                format!("{index:?} outside range {:?}", self.extents.as_slice()),
            ));
        }
        let mut ord = 0;
        for (i, e) in index.iter().zip(self.extents.iter()) {
            ord = ord * e + i;
        }
        Ok(ord)
    }

    /// Multi-index of the row-major linear offset `ordinal`.
    pub fn unravel(&self, mut ordinal: usize) -> Index {
        let mut index = Index::from_elem(0, self.extents.len());
        for d in (0..self.extents.len()).rev() {
            index[d] = ordinal % self.extents[d];
            ordinal /= self.extents[d];
        }
        index
    }

    /// Range with extents scattered by `perm`: `result[p[d]] = extents[d]`.
    pub fn permuted(&self, perm: &Permutation) -> Range {
        debug_assert_eq!(perm.dim(), self.dim());
        Self {
            extents: perm.permute_slice(&self.extents).into_iter().collect(),
        }
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Range({:?})", self.extents.as_slice())
    }
}
