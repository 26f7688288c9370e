/// Broad classification of [`Error`] variants.
///
/// Configuration and input errors are fatal and surface immediately.
/// Convergence errors come from the adaptive parameter controller giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An invalid setting in [`KdeConfig`](crate::KdeConfig) or a kernel setup.
    Configuration,
    /// The point set itself is unusable (empty, ragged, zero-dimensional).
    Input,
    /// Parameter estimation did not stabilize within the retry budget.
    Convergence,
}

/// Errors returned by tree construction, kernel setup, configuration and scoring.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a kernel family name is not recognized.
    #[error("unknown kernel family '{0}': expected 'gaussian' or 'epanechnikov'")]
    InvalidKernel(String),

    /// Returned when a multiplier or growth factor is outside its valid range.
    #[error("invalid {name}: {value} is out of range")]
    InvalidMultiplier {
        /// The name of the offending setting.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Returned when grid pruning is enabled without any grid scales.
    #[error("grid pruning is enabled but no grid scales were given")]
    EmptyGridScales,

    /// Returned when a grid scale factor is not strictly positive.
    #[error("invalid grid scale: {0} must be positive")]
    InvalidGridScale(f64),

    /// Returned when the leaf capacity is zero.
    #[error("leaf capacity must be at least 1")]
    InvalidLeafCapacity,

    /// Returned when the target percentile is outside (0.0, 1.0).
    #[error("invalid target percentile: {0} must be in (0.0, 1.0)")]
    InvalidPercentile(f64),

    /// Returned when the training fraction of a disjoint split is outside (0.0, 1.0).
    #[error("invalid train fraction: {0} must be in (0.0, 1.0)")]
    InvalidTrainFraction(f64),

    /// Returned when the reservoir size, growth factor or evaluation cap is unusable.
    #[error("invalid reservoir setting: {0}")]
    InvalidReservoir(&'static str),

    /// Returned when a bandwidth entry is not strictly positive and finite.
    #[error("invalid bandwidth: {0} must be positive")]
    InvalidBandwidth(f64),

    /// Returned when the bandwidth vector length doesn't match the point dimension.
    #[error("bandwidth dimension mismatch: expected {expected} bandwidths but got {got}")]
    BandwidthDimensionMismatch {
        /// The expected number of bandwidths.
        expected: usize,
        /// The actual number of bandwidths provided.
        got: usize,
    },

    /// Returned when an operation receives no points.
    #[error("point set is empty")]
    EmptyInput,

    /// Returned when points have zero dimensions.
    #[error("points must have at least one dimension")]
    ZeroDimensions,

    /// Returned when points have inconsistent dimensions.
    #[error(
        "dimension mismatch: expected {expected} dimensions but point {point_index} has {got}"
    )]
    DimensionMismatch {
        /// The expected number of dimensions.
        expected: usize,
        /// The actual number of dimensions in the point.
        got: usize,
        /// The index of the point with mismatched dimensions.
        point_index: usize,
    },

    /// Returned when the adaptive controller keeps widening the cutoff without
    /// reaching a stable quantile estimate.
    #[error(
        "parameter estimation did not converge: {retries} cutoff retries at sample size {sample_size}"
    )]
    ConvergenceExhausted {
        /// The reservoir size at which estimation gave up.
        sample_size: usize,
        /// The number of consecutive retries performed.
        retries: usize,
    },
}

impl Error {
    /// Returns the broad category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKernel(_)
            | Self::InvalidMultiplier { .. }
            | Self::EmptyGridScales
            | Self::InvalidGridScale(_)
            | Self::InvalidLeafCapacity
            | Self::InvalidPercentile(_)
            | Self::InvalidTrainFraction(_)
            | Self::InvalidReservoir(_)
            | Self::InvalidBandwidth(_)
            | Self::BandwidthDimensionMismatch { .. } => ErrorKind::Configuration,
            Self::EmptyInput | Self::ZeroDimensions | Self::DimensionMismatch { .. } => {
                ErrorKind::Input
            }
            Self::ConvergenceExhausted { .. } => ErrorKind::Convergence,
        }
    }
}

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// Checks that `points` is non-empty and every point has the same, non-zero
/// dimension. Returns that dimension.
pub(crate) fn check_points<P: AsRef<[f64]>>(points: &[P]) -> Result<usize> {
    let Some(first) = points.first() else {
        return Err(Error::EmptyInput);
    };
    let dim = first.as_ref().len();
    if dim == 0 {
        return Err(Error::ZeroDimensions);
    }
    for (i, p) in points.iter().enumerate() {
        let got = p.as_ref().len();
        if got != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got,
                point_index: i,
            });
        }
    }
    Ok(dim)
}
