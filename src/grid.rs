//! Multi-resolution grid of certified density lower bounds.
//!
//! Space is tiled into axis-aligned cells of size `bandwidth · factor`. Two
//! points sharing a cell differ by less than one cell size along every
//! dimension, so each member of a cell contributes at least
//! `K(cell_size)` to the density of any other point of that cell. Summing that
//! weight over the members gives a lower bound that holds for every point in
//! the cell, and a point whose bound already clears the cutoff can skip the
//! tree entirely.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::kernel::Kernel;

/// What a grid lookup could establish about a point's density.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GridAnswer {
    /// The point's density is certainly above the cutoff.
    AboveCutoff {
        /// Certified lower bound on the normalized density.
        lower_bound: f64,
    },
    /// The grid cannot decide; ask the tree.
    Unknown,
}

impl GridAnswer {
    /// Whether the grid certified the point as dense.
    #[must_use]
    pub fn is_above(&self) -> bool {
        matches!(self, Self::AboveCutoff { .. })
    }
}

/// A single-resolution grid cache.
///
/// Populated with [`add`](Self::add), shrunk with [`prune`](Self::prune), then
/// queried read-only.
#[derive(Clone, Debug)]
pub struct GridPruneCache {
    cell_size: Vec<f64>,
    inv_cell_size: Vec<f64>,
    /// Smallest contribution one member makes to another point of its cell.
    cell_weight: f64,
    /// `cutoff · n_train`, the cutoff in unnormalized units.
    threshold: f64,
    n_train: usize,
    cells: HashMap<Vec<i64>, f64>,
}

impl GridPruneCache {
    /// Creates an empty cache with the given per-dimension cell size.
    ///
    /// # Errors
    ///
    /// Returns `Error::BandwidthDimensionMismatch` if `cell_size` and the
    /// kernel disagree on dimension, `Error::InvalidGridScale` if a cell size
    /// is not positive and finite, and `Error::EmptyInput` if `n_train` is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(kernel: &Kernel, cell_size: Vec<f64>, cutoff: f64, n_train: usize) -> Result<Self> {
        if cell_size.len() != kernel.dim() {
            return Err(Error::BandwidthDimensionMismatch {
                expected: kernel.dim(),
                got: cell_size.len(),
            });
        }
        if let Some(&bad) = cell_size.iter().find(|c| !(c.is_finite() && **c > 0.0)) {
            return Err(Error::InvalidGridScale(bad));
        }
        if n_train == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(Self {
            cell_weight: kernel.density(&cell_size),
            inv_cell_size: cell_size.iter().map(|c| 1.0 / c).collect(),
            cell_size,
            threshold: cutoff * n_train as f64,
            n_train,
            cells: HashMap::new(),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(&self, point: &[f64]) -> Vec<i64> {
        point
            .iter()
            .zip(&self.inv_cell_size)
            .map(|(x, s)| (x * s).floor() as i64)
            .collect()
    }

    /// Adds one training point to its cell.
    pub fn add(&mut self, point: &[f64]) {
        let key = self.key(point);
        *self.cells.entry(key).or_insert(0.0) += self.cell_weight;
    }

    /// Drops every cell whose bound cannot clear the cutoff.
    pub fn prune(&mut self) {
        let threshold = self.threshold;
        self.cells.retain(|_, value| *value > threshold);
    }

    /// Looks up `point`'s cell.
    ///
    /// With `exclude_self`, `point` is assumed to be one of the added training
    /// points and its own weight is taken back out of the bound.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn query(&self, point: &[f64], exclude_self: bool) -> GridAnswer {
        let Some(&value) = self.cells.get(&self.key(point)) else {
            return GridAnswer::Unknown;
        };
        let value = if exclude_self {
            value - self.cell_weight
        } else {
            value
        };
        if value > self.threshold {
            GridAnswer::AboveCutoff {
                lower_bound: value / self.n_train as f64,
            }
        } else {
            GridAnswer::Unknown
        }
    }

    /// Number of cells currently held.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Per-dimension cell size.
    #[must_use]
    pub fn cell_size(&self) -> &[f64] {
        &self.cell_size
    }

    /// Bound contributed by each member of a cell.
    #[must_use]
    pub fn cell_weight(&self) -> f64 {
        self.cell_weight
    }
}

/// Grid caches at several resolutions, consulted coarsest first.
///
/// # Examples
///
/// ```
/// use treekde::grid::GridCascade;
/// use treekde::kernel::{Kernel, KernelFamily};
///
/// let rows: Vec<Vec<f64>> = (0..200).map(|i| vec![f64::from(i % 4) * 0.01]).collect();
/// let points: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
/// let kernel = Kernel::new(KernelFamily::Gaussian, &[1.0]).unwrap();
///
/// let grid = GridCascade::build(&kernel, &[0.5, 0.25], 0.01, &points).unwrap();
/// assert!(grid.query(&[0.0], true).is_above());
/// assert!(!grid.query(&[50.0], false).is_above());
/// ```
#[derive(Clone, Debug)]
pub struct GridCascade {
    caches: Vec<GridPruneCache>,
}

impl GridCascade {
    /// Builds and prunes one cache per scale factor over `points`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyGridScales` when `scales` is empty,
    /// `Error::InvalidGridScale` for a non-positive factor, and
    /// `Error::EmptyInput` when there are no points.
    pub fn build(kernel: &Kernel, scales: &[f64], cutoff: f64, points: &[&[f64]]) -> Result<Self> {
        if scales.is_empty() {
            return Err(Error::EmptyGridScales);
        }
        if let Some(&bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::InvalidGridScale(bad));
        }
        let mut ordered = scales.to_vec();
        ordered.sort_unstable_by(|a, b| b.total_cmp(a));

        let mut caches = Vec::with_capacity(ordered.len());
        for factor in ordered {
            let cell_size = kernel.bandwidth().iter().map(|h| h * factor).collect();
            let mut cache = GridPruneCache::new(kernel, cell_size, cutoff, points.len())?;
            for p in points {
                cache.add(p);
            }
            cache.prune();
            trace_debug!(factor, cells = cache.n_cells(), "grid level built");
            caches.push(cache);
        }
        Ok(Self { caches })
    }

    /// Tries each level in turn; the first certification wins.
    #[must_use]
    pub fn query(&self, point: &[f64], exclude_self: bool) -> GridAnswer {
        self.caches
            .iter()
            .map(|c| c.query(point, exclude_self))
            .find(GridAnswer::is_above)
            .unwrap_or(GridAnswer::Unknown)
    }

    /// Surviving cell count per level, coarsest first.
    #[must_use]
    pub fn cell_counts(&self) -> Vec<usize> {
        self.caches.iter().map(GridPruneCache::n_cells).collect()
    }

    /// The individual levels, coarsest first.
    #[must_use]
    pub fn levels(&self) -> &[GridPruneCache] {
        &self.caches
    }
}
