//! # tilefuse
//!
//! **Sparsity-aware core for block tensor computation: asynchronous
//! data-flow reductions and tile-norm shape algebra.**
//!
//! tilefuse provides the two cooperating subsystems at the heart of a
//! distributed block-sparse tensor engine:
//!
//! - **Reduce tasks** aggregate an a-priori-unknown number of
//!   future-valued tile contributions into a single future-valued
//!   result. Arguments arrive in nondeterministic order, are reduced
//!   eagerly as they become ready under a commutative operator, and are
//!   released immediately after consumption. No worker thread ever
//!   blocks on an unready input.
//! - **Sparse shapes** propagate per-tile Frobenius-norm estimates
//!   through tensor algebra (scale, permute, add, multiply, contract),
//!   so whole tiles can be pruned before their data is ever
//!   materialized.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tilefuse::prelude::*;
//!
//! let pool = TaskPool::default();
//! let mut task = ReduceTask::new(&pool, MySumOp);
//! for tile in tile_futures {
//!     task.add(tile);
//! }
//! let reduced = task.submit();
//! let value = reduced.wait()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): parallel inner loops for norm-tensor
//!   contractions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod perm;
pub mod reduce;
pub mod runtime;
pub mod shape;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::perm::Permutation;
    pub use crate::reduce::{ContractReduce, ReduceOp, ReducePairOp, ReducePairTask, ReduceTask};
    pub use crate::runtime::{Communicator, Future, LocalComm, PoolHandle, Priority, TaskPool};
    pub use crate::shape::{NormValue, SparseShape};
    pub use crate::tensor::{Element, GemmHelper, Range, Tensor, TiledRange, TiledRange1};
}
