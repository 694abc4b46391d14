//! Tiled range: how each tensor dimension is cut into tiles
//!
//! Only the minimal geometry the shape engine needs: tile counts per
//! dimension (to build the tile-grid [`Range`]) and per-tile extents
//! (to build size vectors for norm normalization).

use crate::error::{Error, Result};
use crate::tensor::Range;

/// Tiling of a single dimension, given by its tile boundaries
///
/// Boundaries `[b0, b1, …, bn]` describe tiles `[b0, b1), [b1, b2), …`.
/// Boundaries must be strictly increasing, so every tile has at least
/// one element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TiledRange1 {
    boundaries: Vec<usize>,
}

impl TiledRange1 {
    /// Create a tiling from tile boundaries.
    pub fn new(boundaries: &[usize]) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(Error::invalid_argument(
                "boundaries",
                "at least two boundaries are required",
            ));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::invalid_argument(
                "boundaries",
                format!("boundaries must be strictly increasing, got {boundaries:?}"),
            ));
        }
        Ok(Self {
            boundaries: boundaries.to_vec(),
        })
    }

    /// Create a tiling of `tile_count` tiles, each `tile_extent` elements.
    pub fn uniform(tile_count: usize, tile_extent: usize) -> Result<Self> {
        if tile_count == 0 || tile_extent == 0 {
            return Err(Error::invalid_argument(
                "tile_count/tile_extent",
                "uniform tiling requires non-zero tile count and extent",
            ));
        }
        Ok(Self {
            boundaries: (0..=tile_count).map(|i| i * tile_extent).collect(),
        })
    }

    /// Number of tiles along this dimension.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Number of elements in tile `i`.
    #[inline]
    pub fn tile_extent(&self, i: usize) -> usize {
        self.boundaries[i + 1] - self.boundaries[i]
    }

    /// Total number of elements along this dimension.
    pub fn element_count(&self) -> usize {
        self.boundaries[self.boundaries.len() - 1] - self.boundaries[0]
    }
}

/// Tiling of a multi-dimensional tensor: one [`TiledRange1`] per dimension
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TiledRange {
    dims: Vec<TiledRange1>,
}

impl TiledRange {
    /// Create a tiled range from per-dimension tilings.
    pub fn new(dims: Vec<TiledRange1>) -> Self {
        Self { dims }
    }

    /// Number of dimensions.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dims.len()
    }

    /// Per-dimension tilings.
    #[inline]
    pub fn dims(&self) -> &[TiledRange1] {
        &self.dims
    }

    /// The tile grid: one position per tile.
    pub fn tiles(&self) -> Range {
        let extents: Vec<usize> = self.dims.iter().map(|d| d.tile_count()).collect();
        Range::new(&extents)
    }
}

impl FromIterator<TiledRange1> for TiledRange {
    fn from_iter<T: IntoIterator<Item = TiledRange1>>(iter: T) -> Self {
        Self {
            dims: iter.into_iter().collect(),
        }
    }
}
