//! Adaptive estimation of bandwidth, density cutoff and tolerance.
//!
//! Parameters are estimated on a reservoir of training points that grows
//! geometrically until it covers the whole training set. At each size the
//! controller builds a throwaway tree over the reservoir, evaluates the
//! leave-one-out density of (up to `eval_cap`) reservoir points, and reads
//! three quantiles off those densities:
//!
//! - the **target** quantile at `1 - target_percentile`, where outliers begin;
//! - the **cutoff** quantile, `cutoff_multiplier` times further up, above
//!   which a density only needs to be certified, not computed;
//! - the **tolerance** quantile just below the target, whose distance to the
//!   target sets how precise densities need to be.
//!
//! Once a cutoff exists, later iterations evaluate in threshold mode and only
//! learn lower bounds for dense points. If the target quantile then lands
//! above the cutoff, the cutoff was too tight to trust: it is widened and the
//! iteration repeated.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bandwidth::BandwidthSelector;
use crate::config::KdeConfig;
use crate::error::{Error, Result, check_points};
use crate::evaluator::TreeDensityEvaluator;
use crate::kernel::{Kernel, KernelFamily};
use crate::quantile;
use crate::tree::SpatialPartitionTree;

/// Parameters produced by [`AdaptiveParameterController::estimate`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterEstimate {
    /// Per-dimension kernel bandwidth.
    pub bandwidth: Vec<f64>,
    /// Density above which a point is certainly an inlier.
    pub cutoff: f64,
    /// Absolute density error budget for the tree evaluator.
    pub tolerance: f64,
    /// Estimated density at the target quantile.
    pub quantile_estimate: f64,
    /// Reservoir size of the final iteration.
    pub sample_size: usize,
    /// Total number of cutoff retries over all iterations.
    pub retries: usize,
}

/// Quantile levels derived from the configured percentile and multipliers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct QuantileLevels {
    pub(crate) target: f64,
    pub(crate) cutoff: f64,
    pub(crate) tolerance: f64,
}

impl QuantileLevels {
    pub(crate) fn from_config(config: &KdeConfig) -> Self {
        let q = 1.0 - config.target_percentile;
        Self {
            target: q.clamp(0.0, 1.0),
            cutoff: (q * config.cutoff_multiplier).clamp(0.0, 1.0),
            tolerance: (q * (1.0 - config.tolerance_multiplier)).clamp(0.0, 1.0),
        }
    }
}

/// Density quantiles observed on one reservoir sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SampleQuantiles {
    pub(crate) target: f64,
    pub(crate) cutoff: f64,
    pub(crate) tolerance: f64,
}

/// Verdict on one iteration's quantiles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Step {
    /// The target quantile overshot the cutoff in use; retry with this one.
    Retry { widened_cutoff: f64 },
    /// The sample is trustworthy.
    Accept {
        cutoff: f64,
        tolerance: f64,
        quantile_estimate: f64,
    },
}

/// Decides whether an iteration run against `current_cutoff` can be trusted.
pub(crate) fn assess(
    current_cutoff: Option<f64>,
    observed: SampleQuantiles,
    widen_factor: f64,
) -> Step {
    if let Some(cutoff) = current_cutoff {
        if observed.target > cutoff {
            return Step::Retry {
                widened_cutoff: cutoff * widen_factor,
            };
        }
    }
    Step::Accept {
        cutoff: observed.cutoff,
        tolerance: ((observed.target - observed.tolerance) / 2.0).max(0.0),
        quantile_estimate: observed.target,
    }
}

/// Estimates kernel parameters from a training set.
///
/// Deterministic: the same points in the same order always give the same
/// estimate.
///
/// # Examples
///
/// ```
/// use treekde::controller::AdaptiveParameterController;
/// use treekde::KdeConfig;
///
/// let rows: Vec<Vec<f64>> = (0..500)
///     .map(|i| vec![f64::from(i % 25), f64::from(i / 25)])
///     .collect();
/// let points: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
///
/// let controller = AdaptiveParameterController::new(&KdeConfig::default()).unwrap();
/// let estimate = controller.estimate(&points).unwrap();
/// assert_eq!(estimate.sample_size, 500);
/// assert!(estimate.cutoff >= estimate.quantile_estimate);
/// ```
#[derive(Clone, Debug)]
pub struct AdaptiveParameterController {
    selector: BandwidthSelector,
    family: KernelFamily,
    leaf_capacity: usize,
    split_by_width: bool,
    levels: QuantileLevels,
    eval_cap: usize,
    initial_reservoir: usize,
    reservoir_growth: usize,
    cutoff_widen_factor: f64,
    max_retries: usize,
}

impl AdaptiveParameterController {
    /// Creates a controller from the relevant fields of `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(config: &KdeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            selector: BandwidthSelector::new(config.bandwidth_multiplier)?
                .with_min_bandwidth(config.min_bandwidth)?,
            family: config.kernel,
            leaf_capacity: config.leaf_capacity,
            split_by_width: config.split_by_width,
            levels: QuantileLevels::from_config(config),
            eval_cap: config.eval_cap,
            initial_reservoir: config.initial_reservoir,
            reservoir_growth: config.reservoir_growth,
            cutoff_widen_factor: config.cutoff_widen_factor,
            max_retries: config.max_retries,
        })
    }

    /// Runs the reservoir loop over `points`, taken in the given order.
    ///
    /// # Errors
    ///
    /// Returns an input error for empty or ragged points and
    /// `Error::ConvergenceExhausted` when the cutoff keeps overshooting.
    pub fn estimate(&self, points: &[&[f64]]) -> Result<ParameterEstimate> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("estimate_parameters", n = points.len()).entered();

        check_points(points)?;
        let n = points.len();
        let mut size = self.initial_reservoir.min(n);
        let mut cutoff: Option<f64> = None;
        let mut tolerance = 0.0;
        let mut retries = 0;
        let mut total_retries = 0;

        loop {
            let sample = &points[..size];
            let bandwidth = self.selector.find_bandwidth(sample)?;
            let kernel = Kernel::new(self.family, &bandwidth)?;
            let tree = SpatialPartitionTree::build(
                sample.to_vec(),
                self.leaf_capacity,
                self.split_by_width,
            )?;
            let evaluator = TreeDensityEvaluator::new(tree, kernel)?.with_tolerance(tolerance);

            // a zero cutoff certifies nothing useful, so evaluate full values
            let active_cutoff = cutoff.filter(|c| *c > 0.0);
            let mut densities =
                sample_densities(&evaluator, size.min(self.eval_cap), active_cutoff);
            let q = quantile::quantiles(
                &mut densities,
                &[self.levels.target, self.levels.cutoff, self.levels.tolerance],
            );
            let observed = SampleQuantiles {
                target: q[0],
                cutoff: q[1],
                tolerance: q[2],
            };

            match assess(active_cutoff, observed, self.cutoff_widen_factor) {
                Step::Retry { widened_cutoff } => {
                    retries += 1;
                    total_retries += 1;
                    trace_info!(
                        sample_size = size,
                        retries,
                        quantile = observed.target,
                        widened_cutoff,
                        "cutoff overshot, retrying"
                    );
                    if retries > self.max_retries {
                        return Err(Error::ConvergenceExhausted {
                            sample_size: size,
                            retries,
                        });
                    }
                    cutoff = Some(widened_cutoff);
                }
                Step::Accept {
                    cutoff: accepted_cutoff,
                    tolerance: accepted_tolerance,
                    quantile_estimate,
                } => {
                    trace_info!(
                        sample_size = size,
                        cutoff = accepted_cutoff,
                        tolerance = accepted_tolerance,
                        quantile = quantile_estimate,
                        "parameters estimated"
                    );
                    if size == n {
                        return Ok(ParameterEstimate {
                            bandwidth,
                            cutoff: accepted_cutoff,
                            tolerance: accepted_tolerance,
                            quantile_estimate,
                            sample_size: size,
                            retries: total_retries,
                        });
                    }
                    cutoff = Some(accepted_cutoff);
                    tolerance = accepted_tolerance;
                    retries = 0;
                    size = size.saturating_mul(self.reservoir_growth).min(n);
                }
            }
        }
    }
}

/// Leave-one-out densities of the first `count` points of the evaluator's
/// tree. With a cutoff, dense points only report their certified lower bound.
fn sample_densities(
    evaluator: &TreeDensityEvaluator<'_>,
    count: usize,
    cutoff: Option<f64>,
) -> Vec<f64> {
    let tree = evaluator.tree();
    let density_of = |id: usize| {
        let q = tree.point(id);
        match cutoff {
            Some(c) => evaluator.classify(q, c, Some(id)).value(),
            None => evaluator.density_excluding(q, id),
        }
    };

    #[cfg(feature = "parallel")]
    let ids = (0..count).into_par_iter();
    #[cfg(not(feature = "parallel"))]
    let ids = 0..count;
    ids.map(density_of).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(target: f64, cutoff: f64, tolerance: f64) -> SampleQuantiles {
        SampleQuantiles {
            target,
            cutoff,
            tolerance,
        }
    }

    #[test]
    fn levels_follow_percentile() {
        let config = KdeConfig::default();
        let levels = QuantileLevels::from_config(&config);
        assert!((levels.target - 0.01).abs() < 1e-12);
        assert!((levels.cutoff - 0.015).abs() < 1e-12);
        assert!((levels.tolerance - 0.008).abs() < 1e-12);
    }

    #[test]
    fn levels_are_clamped() {
        let config = KdeConfig {
            target_percentile: 0.1,
            cutoff_multiplier: 20.0,
            ..KdeConfig::default()
        };
        assert!((QuantileLevels::from_config(&config).cutoff - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn first_iteration_always_accepts() {
        let step = assess(None, observed(0.2, 0.3, 0.1), 4.0);
        assert_eq!(
            step,
            Step::Accept {
                cutoff: 0.3,
                tolerance: 0.05,
                quantile_estimate: 0.2
            }
        );
    }

    #[test]
    fn overshoot_widens_cutoff() {
        let step = assess(Some(0.1), observed(0.2, 0.3, 0.1), 4.0);
        assert_eq!(
            step,
            Step::Retry {
                widened_cutoff: 0.4
            }
        );
    }

    #[test]
    fn target_below_cutoff_accepts() {
        let step = assess(Some(0.25), observed(0.2, 0.3, 0.1), 4.0);
        assert!(matches!(step, Step::Accept { .. }));
    }

    #[test]
    fn tolerance_is_never_negative() {
        let Step::Accept { tolerance, .. } = assess(None, observed(0.1, 0.2, 0.3), 4.0) else {
            panic!("expected accept");
        };
        assert!(tolerance.abs() < f64::EPSILON);
    }

    #[test]
    fn single_point_estimates_without_error() {
        let points: Vec<&[f64]> = vec![&[1.0, 2.0]];
        let controller = AdaptiveParameterController::new(&KdeConfig::default()).unwrap();
        let estimate = controller.estimate(&points).unwrap();
        assert_eq!(estimate.sample_size, 1);
        assert_eq!(estimate.bandwidth.len(), 2);
        assert!(estimate.cutoff.abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_empty_points() {
        let controller = AdaptiveParameterController::new(&KdeConfig::default()).unwrap();
        assert!(matches!(controller.estimate(&[]), Err(Error::EmptyInput)));
    }
}
