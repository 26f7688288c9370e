//! End-to-end anomaly scoring.
//!
//! [`ScoringPipeline::score`] runs four phases over a point set:
//!
//! 1. **Split**: shuffle point positions with the configured seed and decide
//!    which points train the model and which get scored.
//! 2. **Estimate**: run the [`AdaptiveParameterController`] on the training
//!    points to get bandwidth, cutoff and tolerance.
//! 3. **Build**: the tree over the training points, then the grid cascade.
//! 4. **Score**: each scored point is checked against the grid, then the
//!    tree in threshold mode. Points at or above the cutoff score 0, the
//!    rest score their negative log density.
//!
//! Scoring is data-parallel over points when the `parallel` feature is on.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::KdeConfig;
use crate::controller::{AdaptiveParameterController, ParameterEstimate};
use crate::error::{Result, check_points};
use crate::evaluator::{CutoffDecision, TraversalStats, TreeDensityEvaluator};
use crate::grid::{GridAnswer, GridCascade};
use crate::kernel::Kernel;
use crate::quantile;
use crate::rng_util;
use crate::tree::SpatialPartitionTree;

/// Which points train the density model and which are scored.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SplitPolicy {
    /// Train on every point and score every point, each one left out of its
    /// own density.
    #[default]
    SelfScore,
    /// Train on a shuffled fraction of the points and score the rest.
    Disjoint {
        /// Fraction of points used for training, in `(0, 1)`.
        train_fraction: f64,
    },
}

impl SplitPolicy {
    /// Number of training points out of `n`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn train_size(&self, n: usize) -> usize {
        match *self {
            Self::SelfScore => n,
            Self::Disjoint { train_fraction } => {
                if n <= 1 {
                    return n;
                }
                let wanted = (n as f64 * train_fraction).ceil() as usize;
                wanted.clamp(1, n - 1)
            }
        }
    }
}

/// Counters and summaries gathered while scoring.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoringDiagnostics {
    /// Number of training points.
    pub n_train: usize,
    /// Number of scored points.
    pub n_scored: usize,
    /// Points certified dense by the grid.
    pub grid_hits: usize,
    /// Points the tree classified above the cutoff.
    pub tree_above: usize,
    /// Points the tree classified below the cutoff.
    pub tree_below: usize,
    /// Surviving grid cells per level, coarsest first. Empty without a grid.
    pub grid_cells: Vec<usize>,
    /// Tree work over all scored points.
    pub traversal: TraversalStats,
    /// `(percentile, density)` pairs over the scored points. Dense points
    /// contribute their certified lower bound.
    pub density_cdf: Vec<(f64, f64)>,
}

/// Result of [`ScoringPipeline::score`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreReport {
    /// One entry per input point, in input order. `None` for points used only
    /// for training.
    pub scores: Vec<Option<f64>>,
    /// The estimated kernel parameters.
    pub parameters: ParameterEstimate,
    /// Counters and summaries.
    pub diagnostics: ScoringDiagnostics,
}

impl ScoreReport {
    /// `(input_index, score)` for every scored point.
    pub fn scored(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.scores
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s)))
    }

    /// The largest score, if any point was scored.
    #[must_use]
    pub fn max_score(&self) -> Option<f64> {
        self.scored().map(|(_, s)| s).max_by(f64::total_cmp)
    }

    /// Number of scored points with a non-zero score.
    #[must_use]
    pub fn n_flagged(&self) -> usize {
        self.scored().filter(|(_, s)| *s > 0.0).count()
    }
}

/// How one point was resolved.
#[derive(Clone, Copy, Debug)]
enum Outcome {
    Grid { lower_bound: f64 },
    Tree(CutoffDecision),
}

impl Outcome {
    fn score(self) -> f64 {
        match self {
            Self::Grid { .. } | Self::Tree(CutoffDecision::Above { .. }) => 0.0,
            Self::Tree(CutoffDecision::Below { density }) => {
                -density.max(f64::MIN_POSITIVE).ln()
            }
        }
    }

    fn density(self) -> f64 {
        match self {
            Self::Grid { lower_bound } => lower_bound,
            Self::Tree(decision) => decision.value(),
        }
    }
}

/// Scores every point of a data set by how unlikely it is under a kernel
/// density model of the data.
///
/// # Examples
///
/// ```
/// use treekde::prelude::*;
///
/// let mut rows: Vec<Vec<f64>> = (0..400)
///     .map(|i| vec![f64::from(i % 20) * 0.1, f64::from(i / 20) * 0.1])
///     .collect();
/// rows.push(vec![50.0, 50.0]);
///
/// let pipeline = ScoringPipeline::new(KdeConfig::default()).unwrap();
/// let report = pipeline.score(&rows).unwrap();
///
/// let (worst, _) = report
///     .scored()
///     .max_by(|a, b| a.1.total_cmp(&b.1))
///     .unwrap();
/// assert_eq!(worst, 400);
/// ```
#[derive(Clone, Debug)]
pub struct ScoringPipeline {
    config: KdeConfig,
}

impl ScoringPipeline {
    /// Creates a pipeline after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(config: KdeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &KdeConfig {
        &self.config
    }

    /// Scores `points`.
    ///
    /// # Errors
    ///
    /// Returns an input error for empty, zero-dimensional or ragged points and
    /// `Error::ConvergenceExhausted` if parameter estimation gives up.
    pub fn score<P>(&self, points: &[P]) -> Result<ScoreReport>
    where
        P: AsRef<[f64]>,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("score", n = points.len()).entered();

        check_points(points)?;
        let n = points.len();
        let rows: Vec<&[f64]> = points.iter().map(AsRef::as_ref).collect();

        let order = rng_util::shuffled_indices(n, self.config.seed);
        let n_train = self.config.split.train_size(n);
        let (train_order, score_order) = order.split_at(n_train);
        let train: Vec<&[f64]> = train_order.iter().map(|&i| rows[i]).collect();

        // (input index, point id in the tree when the point is its own neighbor)
        let targets: Vec<(usize, Option<usize>)> = match self.config.split {
            SplitPolicy::SelfScore => train_order
                .iter()
                .copied()
                .zip((0..n_train).map(Some))
                .collect(),
            SplitPolicy::Disjoint { .. } => score_order.iter().map(|&i| (i, None)).collect(),
        };

        let parameters = AdaptiveParameterController::new(&self.config)?.estimate(&train)?;

        let kernel = Kernel::new(self.config.kernel, &parameters.bandwidth)?;
        let grid = if self.config.use_grid {
            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!("build_grid").entered();
            Some(GridCascade::build(
                &kernel,
                &self.config.grid_scales,
                parameters.cutoff,
                &train,
            )?)
        } else {
            None
        };
        let tree = SpatialPartitionTree::build(
            train,
            self.config.leaf_capacity,
            self.config.split_by_width,
        )?;
        let evaluator =
            TreeDensityEvaluator::new(tree, kernel)?.with_tolerance(parameters.tolerance);

        let cutoff = parameters.cutoff;
        let score_one = |&(input, tree_id): &(usize, Option<usize>)| {
            let q = rows[input];
            let mut stats = TraversalStats::default();
            if let Some(GridAnswer::AboveCutoff { lower_bound }) =
                grid.as_ref().map(|g| g.query(q, tree_id.is_some()))
            {
                return (input, Outcome::Grid { lower_bound }, stats);
            }
            let decision = evaluator.classify_with_stats(q, cutoff, tree_id, &mut stats);
            (input, Outcome::Tree(decision), stats)
        };

        #[cfg(feature = "tracing")]
        let _scoring = tracing::info_span!("score_points", n = targets.len()).entered();
        #[cfg(feature = "parallel")]
        let targets_iter = targets.par_iter();
        #[cfg(not(feature = "parallel"))]
        let targets_iter = targets.iter();
        let outcomes: Vec<(usize, Outcome, TraversalStats)> =
            targets_iter.map(score_one).collect();

        let mut scores = vec![None; n];
        let mut densities = Vec::with_capacity(outcomes.len());
        let mut diagnostics = ScoringDiagnostics {
            n_train,
            n_scored: outcomes.len(),
            grid_cells: grid
                .as_ref()
                .map(GridCascade::cell_counts)
                .unwrap_or_default(),
            ..ScoringDiagnostics::default()
        };
        for (input, outcome, stats) in outcomes {
            match outcome {
                Outcome::Grid { .. } => diagnostics.grid_hits += 1,
                Outcome::Tree(CutoffDecision::Above { .. }) => diagnostics.tree_above += 1,
                Outcome::Tree(CutoffDecision::Below { .. }) => diagnostics.tree_below += 1,
            }
            diagnostics.traversal.merge(&stats);
            densities.push(outcome.density());
            scores[input] = Some(outcome.score());
        }
        diagnostics.density_cdf = quantile::cdf_summary(&densities);

        trace_info!(
            n_scored = diagnostics.n_scored,
            grid_hits = diagnostics.grid_hits,
            tree_above = diagnostics.tree_above,
            tree_below = diagnostics.tree_below,
            "scoring complete"
        );
        trace_debug!(cdf = ?diagnostics.density_cdf, "density distribution");

        Ok(ScoreReport {
            scores,
            parameters,
            diagnostics,
        })
    }
}
