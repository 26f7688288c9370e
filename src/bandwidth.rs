//! Per-dimension bandwidth selection.
//!
//! Bandwidths follow Scott's rule, `h_d = c · σ_d · n^(-1/(k+4))`, with a
//! robust spread estimate `σ_d = IQR_d / 1.349` so a handful of extreme
//! outliers cannot inflate the smoothing scale they are meant to stand out
//! against. When the inter-quartile range collapses to zero the population
//! standard deviation is used instead, and a dimension with no spread at all
//! is floored to a small positive bandwidth.

use crate::error::{Error, Result, check_points};
use crate::quantile;

/// Ratio between the inter-quartile range and the standard deviation of a
/// normal distribution.
const IQR_TO_SIGMA: f64 = 1.349;

/// Default floor applied to degenerate dimensions.
pub const DEFAULT_MIN_BANDWIDTH: f64 = 1e-6;

/// Derives a bandwidth vector from sample spread statistics.
///
/// # Examples
///
/// ```
/// use treekde::bandwidth::BandwidthSelector;
///
/// let sample: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i), 1.0]).collect();
/// let rows: Vec<&[f64]> = sample.iter().map(Vec::as_slice).collect();
///
/// let bw = BandwidthSelector::new(1.0).unwrap().find_bandwidth(&rows).unwrap();
/// assert!(bw[0] > 1.0);
/// // constant dimension is floored, not zero
/// assert!(bw[1] > 0.0 && bw[1] < 1e-3);
/// ```
#[derive(Clone, Debug)]
pub struct BandwidthSelector {
    multiplier: f64,
    min_bandwidth: f64,
}

impl BandwidthSelector {
    /// Creates a selector that scales Scott's-rule bandwidths by `multiplier`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMultiplier` if `multiplier` is not positive and finite.
    pub fn new(multiplier: f64) -> Result<Self> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(Error::InvalidMultiplier {
                name: "bandwidth multiplier",
                value: multiplier,
            });
        }
        Ok(Self {
            multiplier,
            min_bandwidth: DEFAULT_MIN_BANDWIDTH,
        })
    }

    /// Sets the floor used for dimensions with no spread.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBandwidth` if `floor` is not positive and finite.
    pub fn with_min_bandwidth(mut self, floor: f64) -> Result<Self> {
        if !(floor.is_finite() && floor > 0.0) {
            return Err(Error::InvalidBandwidth(floor));
        }
        self.min_bandwidth = floor;
        Ok(self)
    }

    /// The configured multiplier.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Computes one bandwidth per dimension of `sample`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyInput`, `Error::ZeroDimensions` or
    /// `Error::DimensionMismatch` for unusable samples.
    #[allow(clippy::cast_precision_loss)]
    pub fn find_bandwidth(&self, sample: &[&[f64]]) -> Result<Vec<f64>> {
        let dim = check_points(sample)?;
        let n = sample.len() as f64;
        let scale = self.multiplier * n.powf(-1.0 / (dim as f64 + 4.0));

        let mut column = Vec::with_capacity(sample.len());
        let bandwidth = (0..dim)
            .map(|d| {
                column.clear();
                column.extend(sample.iter().map(|p| p[d]));
                let h = scale * robust_spread(&mut column);
                if h.is_finite() && h >= self.min_bandwidth {
                    h
                } else {
                    trace_warn!(
                        dimension = d,
                        raw = h,
                        floor = self.min_bandwidth,
                        "degenerate spread, flooring bandwidth"
                    );
                    self.min_bandwidth
                }
            })
            .collect();
        Ok(bandwidth)
    }
}

/// `IQR / 1.349`, falling back to the population standard deviation when the
/// quartiles coincide. Sorts `values` in place.
#[allow(clippy::cast_precision_loss)]
fn robust_spread(values: &mut [f64]) -> f64 {
    let q = quantile::quantiles(values, &[0.25, 0.75]);
    let iqr = q[1] - q[0];
    if iqr > 0.0 {
        return iqr / IQR_TO_SIGMA;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_rows(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn scotts_rule_with_iqr() {
        // 0..=100 uniform grid: IQR = 50
        let data: Vec<Vec<f64>> = (0..=100).map(|i| vec![f64::from(i)]).collect();
        let bw = BandwidthSelector::new(1.0)
            .unwrap()
            .find_bandwidth(&as_rows(&data))
            .unwrap();
        let expected = 50.0 / IQR_TO_SIGMA * 101_f64.powf(-0.2);
        assert!((bw[0] - expected).abs() < 1e-9, "bw = {}", bw[0]);
    }

    #[test]
    fn multiplier_scales_linearly() {
        let data: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![f64::from(i), f64::from(i * i)])
            .collect();
        let rows = as_rows(&data);
        let one = BandwidthSelector::new(1.0).unwrap().find_bandwidth(&rows).unwrap();
        let two = BandwidthSelector::new(2.0).unwrap().find_bandwidth(&rows).unwrap();
        for (a, b) in one.iter().zip(&two) {
            assert!((2.0 * a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_iqr_falls_back_to_std_dev() {
        // 9 zeros and one 10: quartiles coincide, std dev does not
        let mut data = vec![vec![0.0]; 9];
        data.push(vec![10.0]);
        let bw = BandwidthSelector::new(1.0)
            .unwrap()
            .find_bandwidth(&as_rows(&data))
            .unwrap();
        let expected = 3.0 * 10_f64.powf(-0.2);
        assert!((bw[0] - expected).abs() < 1e-9, "bw = {}", bw[0]);
    }

    #[test]
    fn constant_dimension_is_floored() {
        let data = vec![vec![1.0, 2.0]; 20];
        let selector = BandwidthSelector::new(1.0)
            .unwrap()
            .with_min_bandwidth(0.01)
            .unwrap();
        let bw = selector.find_bandwidth(&as_rows(&data)).unwrap();
        assert_eq!(bw, vec![0.01, 0.01]);
    }

    #[test]
    fn rejects_bad_settings_and_input() {
        assert!(matches!(
            BandwidthSelector::new(0.0),
            Err(Error::InvalidMultiplier { .. })
        ));
        assert!(matches!(
            BandwidthSelector::new(-1.0),
            Err(Error::InvalidMultiplier { .. })
        ));
        assert!(matches!(
            BandwidthSelector::new(1.0).unwrap().with_min_bandwidth(0.0),
            Err(Error::InvalidBandwidth(_))
        ));
        let empty: Vec<&[f64]> = Vec::new();
        assert!(matches!(
            BandwidthSelector::new(1.0).unwrap().find_bandwidth(&empty),
            Err(Error::EmptyInput)
        ));
    }
}
