//! Contract-and-reduce operator: tile contraction as a pair reduction
//!
//! Turns the inner-product loop of a tensor contraction into a
//! [`ReducePairOp`]: every `(left, right)` tile pair along the
//! contracted index is gemm-accumulated into the output tile, in
//! whatever order the pairs become ready.

use crate::error::Result;
use crate::perm::Permutation;
use crate::reduce::ReducePairOp;
use crate::tensor::{Element, GemmHelper, Tensor};

/// Pair-reduction operator contracting tile pairs into an output tile
///
/// Holds the contraction's axis partition, the scaling factor applied
/// to every product, and an optional permutation applied once to the
/// final tile.
#[derive(Clone, Debug)]
pub struct ContractReduce<T> {
    helper: GemmHelper,
    alpha: T,
    perm: Option<Permutation>,
}

impl<T: Element> ContractReduce<T> {
    /// Create a contraction operator with scaling factor `alpha`.
    pub fn new(alpha: T, helper: GemmHelper) -> Self {
        Self {
            helper,
            alpha,
            perm: None,
        }
    }

    /// Create a contraction operator that permutes the final tile.
    pub fn with_perm(alpha: T, helper: GemmHelper, perm: Permutation) -> Self {
        Self {
            helper,
            alpha,
            perm: Some(perm),
        }
    }

    /// The contraction's axis partition.
    pub fn gemm_helper(&self) -> &GemmHelper {
        &self.helper
    }

    /// Number of contracted (summed) dimensions.
    pub fn num_contract_ranks(&self) -> usize {
        self.helper.num_contract_ranks()
    }

    /// Rank of the result tile.
    pub fn result_rank(&self) -> usize {
        self.helper.result_rank()
    }

    /// Rank of left-hand tiles.
    pub fn left_rank(&self) -> usize {
        self.helper.left_rank()
    }

    /// Rank of right-hand tiles.
    pub fn right_rank(&self) -> usize {
        self.helper.right_rank()
    }
}

impl<T: Element> ReducePairOp for ContractReduce<T> {
    type Left = Tensor<T>;
    type Right = Tensor<T>;
    type Result = Tensor<T>;

    fn identity(&self) -> Tensor<T> {
        Tensor::default()
    }

    fn combine(&self, result: &mut Tensor<T>, other: Tensor<T>) -> Result<()> {
        result.add_to(&other)
    }

    fn reduce_pair(&self, result: &mut Tensor<T>, left: &Tensor<T>, right: &Tensor<T>) -> Result<()> {
        if result.empty() {
            *result = left.gemm(right, self.alpha, &self.helper)?;
        } else {
            result.gemm_inplace(left, right, self.alpha, &self.helper)?;
        }
        Ok(())
    }

    fn reduce_two_pairs(
        &self,
        result: &mut Tensor<T>,
        left1: &Tensor<T>,
        right1: &Tensor<T>,
        left2: &Tensor<T>,
        right2: &Tensor<T>,
    ) -> Result<()> {
        self.reduce_pair(result, left1, right1)?;
        self.reduce_pair(result, left2, right2)
    }

    fn finalize(&self, result: Tensor<T>) -> Result<Tensor<T>> {
        match &self.perm {
            Some(perm) if !result.empty() => result.permute(perm),
            _ => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Range;

    fn tile(values: &[f64]) -> Tensor<f64> {
        Tensor::from_vec(Range::new(&[2, 2]), values.to_vec()).unwrap()
    }

    #[test]
    fn test_accumulates_pairs() {
        let op = ContractReduce::new(1.0, GemmHelper::new(2, 2, 2).unwrap());
        let mut acc = op.identity();
        op.reduce_pair(&mut acc, &tile(&[1.0, 0.0, 0.0, 1.0]), &tile(&[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        op.reduce_pair(&mut acc, &tile(&[1.0, 0.0, 0.0, 1.0]), &tile(&[4.0, 3.0, 2.0, 1.0]))
            .unwrap();
        let out = op.finalize(acc).unwrap();
        assert_eq!(out.data(), &[5.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_finalize_permutes() {
        let perm = Permutation::new(&[1, 0]).unwrap();
        let op = ContractReduce::with_perm(1.0, GemmHelper::new(2, 2, 2).unwrap(), perm);
        let mut acc = op.identity();
        op.reduce_pair(&mut acc, &tile(&[1.0, 2.0, 3.0, 4.0]), &tile(&[1.0, 0.0, 0.0, 1.0]))
            .unwrap();
        let out = op.finalize(acc).unwrap();
        assert_eq!(out.data(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_finalize_of_identity_stays_empty() {
        let op = ContractReduce::<f64>::new(1.0, GemmHelper::new(2, 2, 2).unwrap());
        let out = op.finalize(op.identity()).unwrap();
        assert!(out.empty());
    }
}
