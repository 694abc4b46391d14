//! Dense tensors over the tile grid, tiling geometry, and contraction
//! metadata

mod dense;
mod gemm_helper;
mod range;
mod trange;

pub use dense::Tensor;
pub use gemm_helper::GemmHelper;
pub use range::{Extents, Index, Range};
pub use trange::{TiledRange, TiledRange1};

use std::fmt;

/// Scalar element of a [`Tensor`]
///
/// Covers the arithmetic the norm tensors and tile buffers need;
/// blanket-implemented for any type with the right operator set.
pub trait Element:
    Copy + Send + Sync + fmt::Debug + PartialOrd + num_traits::NumAssign + 'static
{
}

impl<T> Element for T where
    T: Copy + Send + Sync + fmt::Debug + PartialOrd + num_traits::NumAssign + 'static
{
}
