//! Scoring configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bandwidth::DEFAULT_MIN_BANDWIDTH;
use crate::error::{Error, Result};
use crate::kernel::KernelFamily;
use crate::pipeline::SplitPolicy;

/// Every tunable of the scoring pipeline.
///
/// Construct with [`KdeConfig::default`] or [`KdeConfig::builder`]; the
/// pipeline validates the configuration again before it runs.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `kernel` | [`KernelFamily::Gaussian`] |
/// | `leaf_capacity` | 20 |
/// | `split_by_width` | `false` |
/// | `use_grid` | `true` |
/// | `grid_scales` | `[0.5, 0.25]` |
/// | `target_percentile` | 0.99 |
/// | `bandwidth_multiplier` | 1.0 |
/// | `tolerance_multiplier` | 0.2 |
/// | `cutoff_multiplier` | 1.5 |
/// | `eval_cap` | 10 000 |
/// | `initial_reservoir` | 200 |
/// | `reservoir_growth` | 4 |
/// | `cutoff_widen_factor` | 4.0 |
/// | `max_retries` | 8 |
/// | `min_bandwidth` | 1e-6 |
/// | `split` | [`SplitPolicy::SelfScore`] |
/// | `seed` | 0 |
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KdeConfig {
    /// Kernel family.
    pub kernel: KernelFamily,
    /// Maximum number of points in a tree leaf.
    pub leaf_capacity: usize,
    /// Cut along the widest dimension instead of cycling through dimensions.
    pub split_by_width: bool,
    /// Consult the grid cache before the tree.
    pub use_grid: bool,
    /// Grid cell sizes as fractions of the bandwidth.
    pub grid_scales: Vec<f64>,
    /// Fraction of points expected to be inliers, in `(0, 1)`.
    pub target_percentile: f64,
    /// Factor applied to Scott's-rule bandwidths.
    pub bandwidth_multiplier: f64,
    /// Sets the tolerance from the density spread just below the target
    /// quantile, in `[0, 1]`.
    pub tolerance_multiplier: f64,
    /// Places the cutoff quantile this many times above the target quantile.
    pub cutoff_multiplier: f64,
    /// Maximum number of sample points evaluated per controller iteration.
    pub eval_cap: usize,
    /// Reservoir size of the first controller iteration.
    pub initial_reservoir: usize,
    /// Factor by which the reservoir grows between iterations.
    pub reservoir_growth: usize,
    /// Factor applied to an unstable cutoff before retrying.
    pub cutoff_widen_factor: f64,
    /// Consecutive cutoff retries allowed before giving up.
    pub max_retries: usize,
    /// Floor for degenerate bandwidths.
    pub min_bandwidth: f64,
    /// Which points train the model and which get scored.
    pub split: SplitPolicy,
    /// Seed for the point shuffle.
    pub seed: u64,
}

impl Default for KdeConfig {
    fn default() -> Self {
        Self {
            kernel: KernelFamily::Gaussian,
            leaf_capacity: 20,
            split_by_width: false,
            use_grid: true,
            grid_scales: vec![0.5, 0.25],
            target_percentile: 0.99,
            bandwidth_multiplier: 1.0,
            tolerance_multiplier: 0.2,
            cutoff_multiplier: 1.5,
            eval_cap: 10_000,
            initial_reservoir: 200,
            reservoir_growth: 4,
            cutoff_widen_factor: 4.0,
            max_retries: 8,
            min_bandwidth: DEFAULT_MIN_BANDWIDTH,
            split: SplitPolicy::SelfScore,
            seed: 0,
        }
    }
}

impl KdeConfig {
    /// Starts a builder from the defaults.
    #[must_use]
    pub fn builder() -> KdeConfigBuilder {
        KdeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity == 0 {
            return Err(Error::InvalidLeafCapacity);
        }
        if self.use_grid {
            if self.grid_scales.is_empty() {
                return Err(Error::EmptyGridScales);
            }
            if let Some(&bad) = self
                .grid_scales
                .iter()
                .find(|s| !(s.is_finite() && **s > 0.0))
            {
                return Err(Error::InvalidGridScale(bad));
            }
        }
        if !(self.target_percentile > 0.0 && self.target_percentile < 1.0) {
            return Err(Error::InvalidPercentile(self.target_percentile));
        }
        check_range("bandwidth multiplier", self.bandwidth_multiplier, |v| v > 0.0)?;
        check_range("tolerance multiplier", self.tolerance_multiplier, |v| {
            (0.0..=1.0).contains(&v)
        })?;
        check_range("cutoff multiplier", self.cutoff_multiplier, |v| v > 0.0)?;
        check_range("cutoff widen factor", self.cutoff_widen_factor, |v| v > 1.0)?;
        if self.eval_cap == 0 {
            return Err(Error::InvalidReservoir("evaluation cap must be at least 1"));
        }
        if self.initial_reservoir == 0 {
            return Err(Error::InvalidReservoir(
                "initial reservoir must hold at least 1 point",
            ));
        }
        if self.reservoir_growth < 2 {
            return Err(Error::InvalidReservoir(
                "reservoir growth factor must be at least 2",
            ));
        }
        if !(self.min_bandwidth.is_finite() && self.min_bandwidth > 0.0) {
            return Err(Error::InvalidBandwidth(self.min_bandwidth));
        }
        if let SplitPolicy::Disjoint { train_fraction } = self.split {
            if !(train_fraction > 0.0 && train_fraction < 1.0) {
                return Err(Error::InvalidTrainFraction(train_fraction));
            }
        }
        Ok(())
    }
}

fn check_range(name: &'static str, value: f64, ok: impl Fn(f64) -> bool) -> Result<()> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(Error::InvalidMultiplier { name, value })
    }
}

/// A fluent builder for [`KdeConfig`].
///
/// # Examples
///
/// ```
/// use treekde::prelude::*;
///
/// let config = KdeConfig::builder()
///     .kernel(KernelFamily::Epanechnikov)
///     .grid_scales(vec![0.25])
///     .target_percentile(0.995)
///     .split(SplitPolicy::Disjoint { train_fraction: 0.5 })
///     .seed(7)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.leaf_capacity, 20);
/// assert!(KdeConfig::builder().target_percentile(1.0).build().is_err());
/// ```
#[derive(Clone, Debug)]
pub struct KdeConfigBuilder {
    config: KdeConfig,
}

impl KdeConfigBuilder {
    /// Set the kernel family.
    #[must_use]
    pub fn kernel(mut self, kernel: KernelFamily) -> Self {
        self.config.kernel = kernel;
        self
    }

    /// Set the maximum number of points per tree leaf.
    #[must_use]
    pub fn leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.config.leaf_capacity = leaf_capacity;
        self
    }

    /// Cut tree ranges along their widest dimension.
    #[must_use]
    pub fn split_by_width(mut self, split_by_width: bool) -> Self {
        self.config.split_by_width = split_by_width;
        self
    }

    /// Enable or disable the grid cache.
    #[must_use]
    pub fn use_grid(mut self, use_grid: bool) -> Self {
        self.config.use_grid = use_grid;
        self
    }

    /// Set the grid cell sizes as fractions of the bandwidth.
    #[must_use]
    pub fn grid_scales(mut self, grid_scales: Vec<f64>) -> Self {
        self.config.grid_scales = grid_scales;
        self
    }

    /// Set the expected inlier fraction.
    #[must_use]
    pub fn target_percentile(mut self, target_percentile: f64) -> Self {
        self.config.target_percentile = target_percentile;
        self
    }

    /// Set the bandwidth multiplier.
    #[must_use]
    pub fn bandwidth_multiplier(mut self, bandwidth_multiplier: f64) -> Self {
        self.config.bandwidth_multiplier = bandwidth_multiplier;
        self
    }

    /// Set the tolerance multiplier.
    #[must_use]
    pub fn tolerance_multiplier(mut self, tolerance_multiplier: f64) -> Self {
        self.config.tolerance_multiplier = tolerance_multiplier;
        self
    }

    /// Set the cutoff multiplier.
    #[must_use]
    pub fn cutoff_multiplier(mut self, cutoff_multiplier: f64) -> Self {
        self.config.cutoff_multiplier = cutoff_multiplier;
        self
    }

    /// Set the per-iteration evaluation cap.
    #[must_use]
    pub fn eval_cap(mut self, eval_cap: usize) -> Self {
        self.config.eval_cap = eval_cap;
        self
    }

    /// Set the initial reservoir size.
    #[must_use]
    pub fn initial_reservoir(mut self, initial_reservoir: usize) -> Self {
        self.config.initial_reservoir = initial_reservoir;
        self
    }

    /// Set the reservoir growth factor.
    #[must_use]
    pub fn reservoir_growth(mut self, reservoir_growth: usize) -> Self {
        self.config.reservoir_growth = reservoir_growth;
        self
    }

    /// Set the factor applied to an unstable cutoff.
    #[must_use]
    pub fn cutoff_widen_factor(mut self, cutoff_widen_factor: f64) -> Self {
        self.config.cutoff_widen_factor = cutoff_widen_factor;
        self
    }

    /// Set the number of consecutive retries allowed.
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set the bandwidth floor.
    #[must_use]
    pub fn min_bandwidth(mut self, min_bandwidth: f64) -> Self {
        self.config.min_bandwidth = min_bandwidth;
        self
    }

    /// Set the train/score split.
    #[must_use]
    pub fn split(mut self, split: SplitPolicy) -> Self {
        self.config.split = split;
        self
    }

    /// Set the shuffle seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found by [`KdeConfig::validate`].
    pub fn build(self) -> Result<KdeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_are_valid() {
        KdeConfig::default().validate().unwrap();
        assert_eq!(KdeConfig::builder().build().unwrap(), KdeConfig::default());
    }

    #[test]
    fn builder_sets_fields() {
        let config = KdeConfig::builder()
            .leaf_capacity(5)
            .split_by_width(true)
            .use_grid(false)
            .grid_scales(Vec::new())
            .eval_cap(100)
            .seed(42)
            .build()
            .unwrap();
        assert_eq!(config.leaf_capacity, 5);
        assert!(config.split_by_width);
        assert!(!config.use_grid);
        assert_eq!(config.eval_cap, 100);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn empty_scales_only_matter_with_grid() {
        assert!(matches!(
            KdeConfig::builder().grid_scales(Vec::new()).build(),
            Err(Error::EmptyGridScales)
        ));
        assert!(matches!(
            KdeConfig::builder().grid_scales(vec![0.5, 0.0]).build(),
            Err(Error::InvalidGridScale(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let cases = [
            KdeConfig::builder().leaf_capacity(0).build(),
            KdeConfig::builder().target_percentile(0.0).build(),
            KdeConfig::builder().target_percentile(f64::NAN).build(),
            KdeConfig::builder().bandwidth_multiplier(0.0).build(),
            KdeConfig::builder().tolerance_multiplier(1.5).build(),
            KdeConfig::builder().cutoff_multiplier(-1.0).build(),
            KdeConfig::builder().cutoff_widen_factor(1.0).build(),
            KdeConfig::builder().eval_cap(0).build(),
            KdeConfig::builder().initial_reservoir(0).build(),
            KdeConfig::builder().reservoir_growth(1).build(),
            KdeConfig::builder().min_bandwidth(0.0).build(),
            KdeConfig::builder()
                .split(SplitPolicy::Disjoint {
                    train_fraction: 1.0,
                })
                .build(),
        ];
        for case in cases {
            let err = case.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{err}");
        }
    }
}
