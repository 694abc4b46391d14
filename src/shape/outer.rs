//! Divide-and-conquer outer products over per-dimension size vectors
//!
//! The product-of-sizes tensor over a `dim`-dimensional tile grid is
//! rank-1 along every axis, so it is never materialized: dimensions are
//! split in half, each half is collapsed recursively into a single
//! vector, and the two halves are combined only at the point of use.
//! A per-dimension transform is applied at the recursion floor, so the
//! same scaffold serves normalization (`1/size`), constant injection
//! (`1/sqrt(size)`), and de-normalization (identity).

use crate::shape::NormValue;

/// Collapse `size_vectors` into a single vector by outer product,
/// applying `transform` to each dimension's vector first.
///
/// The result has `∏ len(size_vectors[d])` entries in row-major order.
/// A rank-0 grid collapses to the single entry `1`.
pub(crate) fn recursive_outer_product<T, F>(size_vectors: &[Vec<T>], transform: &F) -> Vec<T>
where
    T: NormValue,
    F: Fn(&[T]) -> Vec<T>,
{
    match size_vectors.len() {
        0 => vec![T::one()],
        1 => transform(&size_vectors[0]),
        dim => {
            let middle = (dim >> 1) + (dim & 1);
            let left = recursive_outer_product(&size_vectors[..middle], transform);
            let right = recursive_outer_product(&size_vectors[middle..], transform);

            let mut result = Vec::with_capacity(left.len() * right.len());
            for &l in &left {
                for &r in &right {
                    result.push(l * r);
                }
            }
            result
        }
    }
}

/// Collapse the two halves of `size_vectors` separately.
///
/// Splitting at `ceil(dim / 2)` lets callers walk the norm tensor as a
/// `left.len() × right.len()` matrix instead of materializing the full
/// outer product.
pub(crate) fn split_outer_product<T, F>(size_vectors: &[Vec<T>], transform: &F) -> (Vec<T>, Vec<T>)
where
    T: NormValue,
    F: Fn(&[T]) -> Vec<T>,
{
    let dim = size_vectors.len();
    debug_assert!(dim > 1);
    let middle = (dim >> 1) + (dim & 1);
    (
        recursive_outer_product(&size_vectors[..middle], transform),
        recursive_outer_product(&size_vectors[middle..], transform),
    )
}

/// Identity transform: the dimension's size vector as-is.
pub(crate) fn noop_vec<T: NormValue>(v: &[T]) -> Vec<T> {
    v.to_vec()
}

/// Reciprocal transform, for normalizing by the element count.
pub(crate) fn inv_vec<T: NormValue>(v: &[T]) -> Vec<T> {
    v.iter().map(|&s| T::one() / s).collect()
}

/// Reciprocal square-root transform, for constant-norm injection.
pub(crate) fn inv_sqrt_vec<T: NormValue>(v: &[T]) -> Vec<T> {
    v.iter().map(|&s| T::one() / s.sqrt()).collect()
}
