//! Reduction operator contracts
//!
//! An operator models a commutative monoid with a seed: reduction
//! order is non-deterministic, so `reduce` results must agree for any
//! argument ordering, and `identity` must be a two-sided identity for
//! `combine`. The capabilities are distinct named methods rather than
//! overloads so each call site states which step it performs.

use crate::error::Result;

/// Commutative reduction over single-valued arguments
pub trait ReduceOp: Send + Sync + 'static {
    /// Value each argument contributes
    type Argument: Send + 'static;
    /// Accumulated result type
    type Result: Send + 'static;

    /// Fresh identity result to accumulate into.
    fn identity(&self) -> Self::Result;

    /// Fold another partial result into `result`.
    fn combine(&self, result: &mut Self::Result, other: Self::Result) -> Result<()>;

    /// Fold one argument into `result`.
    fn reduce(&self, result: &mut Self::Result, arg: &Self::Argument) -> Result<()>;

    /// Fold two ready arguments into `result` in one step.
    ///
    /// Override when folding a pair at once is cheaper than two
    /// separate folds.
    fn reduce_two(
        &self,
        result: &mut Self::Result,
        first: &Self::Argument,
        second: &Self::Argument,
    ) -> Result<()> {
        self.reduce(result, first)?;
        self.reduce(result, second)
    }

    /// Post-processing applied exactly once to the final result.
    fn finalize(&self, result: Self::Result) -> Result<Self::Result> {
        Ok(result)
    }
}

/// Commutative reduction over `(left, right)` argument pairs
///
/// The workhorse for contractions: each pair is a left/right tile
/// combination whose product is folded into the running result.
pub trait ReducePairOp: Send + Sync + 'static {
    /// Left-hand value of each pair
    type Left: Send + 'static;
    /// Right-hand value of each pair
    type Right: Send + 'static;
    /// Accumulated result type
    type Result: Send + 'static;

    /// Fresh identity result to accumulate into.
    fn identity(&self) -> Self::Result;

    /// Fold another partial result into `result`.
    fn combine(&self, result: &mut Self::Result, other: Self::Result) -> Result<()>;

    /// Fold one argument pair into `result`.
    fn reduce_pair(
        &self,
        result: &mut Self::Result,
        left: &Self::Left,
        right: &Self::Right,
    ) -> Result<()>;

    /// Fold two ready argument pairs into `result` in one step.
    fn reduce_two_pairs(
        &self,
        result: &mut Self::Result,
        left1: &Self::Left,
        right1: &Self::Right,
        left2: &Self::Left,
        right2: &Self::Right,
    ) -> Result<()> {
        self.reduce_pair(result, left1, right1)?;
        self.reduce_pair(result, left2, right2)
    }

    /// Post-processing applied exactly once to the final result.
    fn finalize(&self, result: Self::Result) -> Result<Self::Result> {
        Ok(result)
    }
}

/// Adapter presenting a [`ReducePairOp`] as a [`ReduceOp`] over
/// resolved `(left, right)` value pairs
pub(crate) struct PairOpAdapter<Op>(pub(crate) Op);

impl<Op: ReducePairOp> ReduceOp for PairOpAdapter<Op> {
    type Argument = (Op::Left, Op::Right);
    type Result = Op::Result;

    fn identity(&self) -> Self::Result {
        self.0.identity()
    }

    fn combine(&self, result: &mut Self::Result, other: Self::Result) -> Result<()> {
        self.0.combine(result, other)
    }

    fn reduce(&self, result: &mut Self::Result, arg: &Self::Argument) -> Result<()> {
        self.0.reduce_pair(result, &arg.0, &arg.1)
    }

    fn reduce_two(
        &self,
        result: &mut Self::Result,
        first: &Self::Argument,
        second: &Self::Argument,
    ) -> Result<()> {
        self.0
            .reduce_two_pairs(result, &first.0, &first.1, &second.0, &second.1)
    }

    fn finalize(&self, result: Self::Result) -> Result<Self::Result> {
        self.0.finalize(result)
    }
}
