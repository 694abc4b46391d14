//! Norm scalar trait and the process-wide zero threshold
//!
//! Each norm scalar type carries its own threshold cell, mirroring the
//! per-type process state of the shape engine: a normalized tile norm
//! below the threshold is treated as exactly zero. The cell is atomic;
//! readers pick up the latest stored value without locking.

use crate::tensor::Element;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

static F32_THRESHOLD: AtomicU32 = AtomicU32::new(f32::EPSILON.to_bits());
static F64_THRESHOLD: AtomicU64 = AtomicU64::new(f64::EPSILON.to_bits());

/// Scalar type usable as a tile-norm value
///
/// Norms are non-negative reals; the trait adds floating-point
/// operations and the per-type threshold cell on top of [`Element`].
pub trait NormValue: Element + num_traits::Float {
    /// Current process-wide zero threshold for this scalar type.
    ///
    /// Initialized to the type's machine epsilon.
    fn threshold() -> Self;

    /// Store a new process-wide zero threshold.
    ///
    /// This is the raw cell write; use
    /// [`SparseShape::set_threshold`](crate::shape::SparseShape::set_threshold)
    /// to validate the value first.
    fn store_threshold(value: Self);

    /// Convert a tile element count to this scalar type.
    fn from_size(size: usize) -> Self;
}

impl NormValue for f32 {
    fn threshold() -> f32 {
        f32::from_bits(F32_THRESHOLD.load(Ordering::Relaxed))
    }

    fn store_threshold(value: f32) {
        F32_THRESHOLD.store(value.to_bits(), Ordering::Relaxed);
    }

    fn from_size(size: usize) -> f32 {
        size as f32
    }
}

impl NormValue for f64 {
    fn threshold() -> f64 {
        f64::from_bits(F64_THRESHOLD.load(Ordering::Relaxed))
    }

    fn store_threshold(value: f64) {
        F64_THRESHOLD.store(value.to_bits(), Ordering::Relaxed);
    }

    fn from_size(size: usize) -> f64 {
        size as f64
    }
}
