//! GemmHelper: axis partition descriptor for tensor contractions
//!
//! A contraction of a rank-`l` tensor with a rank-`r` tensor into a
//! rank-`o` result sums over `k = (l + r - o) / 2` inner dimensions.
//! Operands are laid out so the contraction flattens to a matrix
//! product: the left tensor is `[outer | inner]` (an M×K matrix in
//! row-major order) and the right tensor is `[inner | outer]` (K×N).

use crate::error::{Error, Result};
use crate::tensor::Range;

/// Describes which axes of a contraction are outer (kept) and inner
/// (summed), and how operand ranges flatten to matrix dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GemmHelper {
    result_rank: usize,
    left_rank: usize,
    right_rank: usize,
    contract_rank: usize,
}

impl GemmHelper {
    /// Create a helper for contracting `left_rank` × `right_rank` →
    /// `result_rank` tensors.
    ///
    /// Fails with [`Error::RankMismatch`] when the ranks do not describe
    /// a valid contraction (`left + right - result` must be even and
    /// non-negative, and the inner rank must fit in both operands).
    pub fn new(result_rank: usize, left_rank: usize, right_rank: usize) -> Result<Self> {
        let mismatch = Error::RankMismatch {
            result: result_rank,
            left: left_rank,
            right: right_rank,
        };
        let total = left_rank + right_rank;
        if total < result_rank || (total - result_rank) % 2 != 0 {
            return Err(mismatch);
        }
        let contract_rank = (total - result_rank) / 2;
        if contract_rank > left_rank || contract_rank > right_rank {
            return Err(mismatch);
        }
        Ok(Self {
            result_rank,
            left_rank,
            right_rank,
            contract_rank,
        })
    }

    /// Number of contracted (summed) dimensions.
    #[inline]
    pub fn num_contract_ranks(&self) -> usize {
        self.contract_rank
    }

    /// Rank of the result tensor.
    #[inline]
    pub fn result_rank(&self) -> usize {
        self.result_rank
    }

    /// Rank of the left-hand tensor.
    #[inline]
    pub fn left_rank(&self) -> usize {
        self.left_rank
    }

    /// Rank of the right-hand tensor.
    #[inline]
    pub fn right_rank(&self) -> usize {
        self.right_rank
    }

    /// Dimensions of the left tensor that survive into the result.
    #[inline]
    pub fn left_outer(&self) -> std::ops::Range<usize> {
        0..self.left_rank - self.contract_rank
    }

    /// Dimensions of the left tensor that are summed.
    #[inline]
    pub fn left_inner(&self) -> std::ops::Range<usize> {
        self.left_rank - self.contract_rank..self.left_rank
    }

    /// Dimensions of the right tensor that are summed.
    #[inline]
    pub fn right_inner(&self) -> std::ops::Range<usize> {
        0..self.contract_rank
    }

    /// Dimensions of the right tensor that survive into the result.
    #[inline]
    pub fn right_outer(&self) -> std::ops::Range<usize> {
        self.contract_rank..self.right_rank
    }

    /// Validate operand ranges against this partition.
    ///
    /// Checks ranks and that the inner extents of `left` and `right`
    /// agree pairwise.
    fn validate_ranges(&self, left: &Range, right: &Range) -> Result<()> {
        if left.dim() != self.left_rank || right.dim() != self.right_rank {
            return Err(Error::RankMismatch {
                result: self.result_rank,
                left: left.dim(),
                right: right.dim(),
            });
        }
        let left_inner = &left.extents()[self.left_inner()];
        let right_inner = &right.extents()[self.right_inner()];
        if left_inner != right_inner {
            return Err(Error::range_mismatch(left_inner, right_inner));
        }
        Ok(())
    }

    /// Range of the contraction result: left outer extents followed by
    /// right outer extents.
    pub fn make_result_range(&self, left: &Range, right: &Range) -> Result<Range> {
        self.validate_ranges(left, right)?;
        let mut extents = Vec::with_capacity(self.result_rank);
        extents.extend_from_slice(&left.extents()[self.left_outer()]);
        extents.extend_from_slice(&right.extents()[self.right_outer()]);
        Ok(Range::new(&extents))
    }

    /// Flattened matrix dimensions `(M, N, K)` of the contraction.
    pub fn compute_matrix_sizes(&self, left: &Range, right: &Range) -> Result<(usize, usize, usize)> {
        self.validate_ranges(left, right)?;
        let m = left.extents()[self.left_outer()].iter().product();
        let n = right.extents()[self.right_outer()].iter().product();
        let k = left.extents()[self.left_inner()].iter().product();
        Ok((m, n, k))
    }
}
