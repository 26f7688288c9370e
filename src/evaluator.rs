//! Tree-accelerated kernel density evaluation.
//!
//! The evaluator walks a [`SpatialPartitionTree`] and bounds each subtree's
//! contribution to the density at a query point from the kernel values at the
//! nearest and farthest corners of its bounding box. Two query modes share
//! that machinery:
//!
//! - **Full value** ([`density`](TreeDensityEvaluator::density)): a subtree
//!   whose bounds are closer than the tolerance is replaced by its count times
//!   the kernel at its mean. Leaves are always summed exactly.
//! - **Threshold decision** ([`classify`](TreeDensityEvaluator::classify)):
//!   a best-first refinement of global lower and upper bounds that stops as
//!   soon as the lower bound clears the cutoff.
//!
//! Densities are normalized by the training size `n`, also when a query
//! leaves its own point out.

use core::cmp::Ordering;
use std::collections::BinaryHeap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::tree::{NodeId, SpatialPartitionTree};

/// Outcome of a threshold-mode query.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CutoffDecision {
    /// The density is at or above the cutoff. Only a lower bound is known.
    Above {
        /// Certified lower bound on the density.
        lower_bound: f64,
    },
    /// The density is below the cutoff.
    Below {
        /// Density estimate within the evaluator's tolerance of the exact value.
        density: f64,
    },
}

impl CutoffDecision {
    /// Whether the point was classified above the cutoff.
    #[must_use]
    pub fn is_above(&self) -> bool {
        matches!(self, Self::Above { .. })
    }

    /// The carried value: the lower bound for `Above`, the estimate for `Below`.
    #[must_use]
    pub fn value(&self) -> f64 {
        match *self {
            Self::Above { lower_bound } => lower_bound,
            Self::Below { density } => density,
        }
    }
}

/// Work counters for one or more traversals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraversalStats {
    /// Nodes whose bounds were computed.
    pub nodes_visited: usize,
    /// Internal nodes resolved without descending into them.
    pub nodes_pruned: usize,
    /// Kernel evaluations against individual points.
    pub kernel_evaluations: usize,
}

impl TraversalStats {
    /// Adds `other`'s counters to `self`.
    pub fn merge(&mut self, other: &Self) {
        self.nodes_visited += other.nodes_visited;
        self.nodes_pruned += other.nodes_pruned;
        self.kernel_evaluations += other.kernel_evaluations;
    }
}

/// Kernel bounds for one subtree relative to a query point.
struct NodeBounds {
    /// Points of the node that contribute (its count, minus the excluded point).
    weight: f64,
    k_min: f64,
    k_max: f64,
}

/// A frontier entry of the best-first traversal, ordered by bound gap.
struct Frontier {
    id: NodeId,
    gap: f64,
    lower: f64,
    upper: f64,
    estimate: f64,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gap.total_cmp(&other.gap)
    }
}

/// Running state of a best-first threshold query.
#[derive(Default)]
struct Refinement {
    /// Contributions known exactly.
    exact: f64,
    /// Sums of the frontier entries' bounds and estimates.
    lower: f64,
    upper: f64,
    estimate: f64,
    frontier: BinaryHeap<Frontier>,
}

impl Refinement {
    fn enqueue(
        &mut self,
        eval: &TreeDensityEvaluator<'_>,
        id: NodeId,
        q: &[f64],
        exclude: Option<usize>,
        stats: &mut TraversalStats,
    ) {
        stats.nodes_visited += 1;
        let b = eval.bounds(id, q, exclude);
        if b.k_max <= 0.0 || b.weight <= 0.0 {
            stats.nodes_pruned += 1;
            return;
        }
        if b.k_max <= b.k_min {
            // every point sits at the same kernel value
            stats.nodes_pruned += 1;
            self.exact += b.weight * b.k_max;
            return;
        }
        let entry = Frontier {
            id,
            gap: b.weight * (b.k_max - b.k_min),
            lower: b.weight * b.k_min,
            upper: b.weight * b.k_max,
            estimate: eval.mean_estimate(id, q, b.weight),
        };
        self.lower += entry.lower;
        self.upper += entry.upper;
        self.estimate += entry.estimate;
        self.frontier.push(entry);
    }
}

/// Density evaluator over a tree of training points and a kernel.
///
/// Immutable after construction, so it can be queried from many threads at
/// once.
///
/// # Examples
///
/// ```
/// use treekde::evaluator::TreeDensityEvaluator;
/// use treekde::kernel::{Kernel, KernelFamily};
/// use treekde::tree::SpatialPartitionTree;
///
/// let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i) * 0.1]).collect();
/// let tree = SpatialPartitionTree::from_rows(&rows, 8, false).unwrap();
/// let kernel = Kernel::new(KernelFamily::Gaussian, &[0.5]).unwrap();
/// let eval = TreeDensityEvaluator::new(tree, kernel).unwrap().with_tolerance(1e-6);
///
/// let approx = eval.density(&[5.0]);
/// let exact = eval.brute_force_density(&[5.0], None);
/// assert!((approx - exact).abs() <= 1e-6);
/// ```
#[derive(Clone, Debug)]
pub struct TreeDensityEvaluator<'a> {
    tree: SpatialPartitionTree<'a>,
    kernel: Kernel,
    tolerance: f64,
}

impl<'a> TreeDensityEvaluator<'a> {
    /// Pairs `tree` with `kernel`. The tolerance starts at zero (exact).
    ///
    /// # Errors
    ///
    /// Returns `Error::BandwidthDimensionMismatch` if the kernel's dimension
    /// differs from the tree's.
    pub fn new(tree: SpatialPartitionTree<'a>, kernel: Kernel) -> Result<Self> {
        if kernel.dim() != tree.dim() {
            return Err(Error::BandwidthDimensionMismatch {
                expected: tree.dim(),
                got: kernel.dim(),
            });
        }
        Ok(Self {
            tree,
            kernel,
            tolerance: 0.0,
        })
    }

    /// Sets the absolute density error budget. Negative or NaN values mean zero.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    /// The underlying tree.
    #[must_use]
    pub fn tree(&self) -> &SpatialPartitionTree<'a> {
        &self.tree
    }

    /// The kernel.
    #[must_use]
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// The density error budget.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Number of training points, the normalizer of every density.
    #[must_use]
    pub fn n_train(&self) -> usize {
        self.tree.len()
    }

    #[allow(clippy::cast_precision_loss)]
    fn normalize(&self, sum: f64) -> f64 {
        sum / self.tree.len() as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn bounds(&self, id: NodeId, q: &[f64], exclude: Option<usize>) -> NodeBounds {
        let (min_sq, max_sq) = self
            .tree
            .scaled_distance_bounds(id, q, self.kernel.inv_bandwidth());
        let mut count = self.tree.count(id);
        if exclude.is_some_and(|pid| self.tree.contains_point(id, pid)) {
            count -= 1;
        }
        NodeBounds {
            weight: count as f64,
            k_min: self.kernel.density_scaled_sq(max_sq),
            k_max: self.kernel.density_scaled_sq(min_sq),
        }
    }

    fn leaf_sum(
        &self,
        id: NodeId,
        q: &[f64],
        exclude: Option<usize>,
        stats: &mut TraversalStats,
    ) -> f64 {
        let mut sum = 0.0;
        for (pid, p) in self.tree.items(id) {
            if Some(pid) == exclude {
                continue;
            }
            stats.kernel_evaluations += 1;
            sum += self
                .kernel
                .density_scaled_sq(self.kernel.scaled_sq_distance(q, p));
        }
        sum
    }

    fn mean_estimate(&self, id: NodeId, q: &[f64], weight: f64) -> f64 {
        weight
            * self
                .kernel
                .density_scaled_sq(self.kernel.scaled_sq_distance(q, self.tree.mean(id)))
    }

    /// Density at `q` over all training points.
    #[must_use]
    pub fn density(&self, q: &[f64]) -> f64 {
        self.density_with_stats(q, None, &mut TraversalStats::default())
    }

    /// Density at `q` leaving training point `point_id` out.
    #[must_use]
    pub fn density_excluding(&self, q: &[f64], point_id: usize) -> f64 {
        self.density_with_stats(q, Some(point_id), &mut TraversalStats::default())
    }

    /// Full-value density at `q`, recording work into `stats`.
    pub fn density_with_stats(
        &self,
        q: &[f64],
        exclude: Option<usize>,
        stats: &mut TraversalStats,
    ) -> f64 {
        let mut sum = 0.0;
        let mut stack = vec![self.tree.root()];
        while let Some(id) = stack.pop() {
            stats.nodes_visited += 1;
            let Some((lo, hi)) = self.tree.children(id) else {
                sum += self.leaf_sum(id, q, exclude, stats);
                continue;
            };
            let b = self.bounds(id, q, exclude);
            if b.k_max <= 0.0 || b.weight <= 0.0 {
                stats.nodes_pruned += 1;
            } else if b.k_max - b.k_min < self.tolerance {
                stats.nodes_pruned += 1;
                sum += self.mean_estimate(id, q, b.weight);
            } else {
                stack.push(hi);
                stack.push(lo);
            }
        }
        self.normalize(sum)
    }

    /// Decides whether the density at `q` reaches `cutoff`.
    #[must_use]
    pub fn classify(&self, q: &[f64], cutoff: f64, exclude: Option<usize>) -> CutoffDecision {
        self.classify_with_stats(q, cutoff, exclude, &mut TraversalStats::default())
    }

    /// Threshold-mode query, recording work into `stats`.
    ///
    /// Refines the largest bound gaps first. Returns `Above` as soon as the
    /// certified lower bound exceeds `cutoff`; otherwise refines until the gap
    /// is within tolerance and decides from the estimate. An estimate equal to
    /// `cutoff` counts as `Above`.
    pub fn classify_with_stats(
        &self,
        q: &[f64],
        cutoff: f64,
        exclude: Option<usize>,
        stats: &mut TraversalStats,
    ) -> CutoffDecision {
        #[allow(clippy::cast_precision_loss)]
        let n = self.tree.len() as f64;
        let budget = self.tolerance * n;

        let mut state = Refinement::default();
        state.enqueue(self, self.tree.root(), q, exclude, stats);

        loop {
            if state.exact + state.lower > cutoff * n {
                return CutoffDecision::Above {
                    lower_bound: (state.exact + state.lower) / n,
                };
            }
            if state.upper - state.lower <= budget {
                break;
            }
            let Some(top) = state.frontier.pop() else {
                break;
            };
            state.lower -= top.lower;
            state.upper -= top.upper;
            state.estimate -= top.estimate;
            match self.tree.children(top.id) {
                Some((lo, hi)) => {
                    state.enqueue(self, lo, q, exclude, stats);
                    state.enqueue(self, hi, q, exclude, stats);
                }
                None => state.exact += self.leaf_sum(top.id, q, exclude, stats),
            }
            if state.frontier.is_empty() {
                // drop accumulated rounding from the running totals
                state.lower = 0.0;
                state.upper = 0.0;
                state.estimate = 0.0;
            }
        }

        stats.nodes_pruned += state.frontier.len();
        let density = (state.exact + state.estimate) / n;
        if density >= cutoff {
            CutoffDecision::Above {
                lower_bound: ((state.exact + state.lower) / n).min(density),
            }
        } else {
            CutoffDecision::Below { density }
        }
    }

    /// Exact density at `q` by summing over every training point.
    #[must_use]
    pub fn brute_force_density(&self, q: &[f64], exclude: Option<usize>) -> f64 {
        let sum: f64 = self
            .tree
            .items(self.tree.root())
            .filter(|(pid, _)| Some(*pid) != exclude)
            .map(|(_, p)| {
                self.kernel
                    .density_scaled_sq(self.kernel.scaled_sq_distance(q, p))
            })
            .sum();
        self.normalize(sum)
    }
}
