//! Density kernels with per-dimension bandwidths.
//!
//! Both families are radial in bandwidth-scaled space: with
//! `u² = Σ (offset_d / h_d)²`, the density depends on `u²` alone and is
//! monotone non-increasing in it. That monotonicity is what lets the tree
//! evaluator turn distance bounds into contribution bounds.
//!
//! | Family | Profile | Support |
//! |--------|---------|---------|
//! | Gaussian | `exp(-u² / 2)` | unbounded |
//! | Epanechnikov | `1 - u²` | `u² < 1` |
//!
//! Each profile is normalized so the density integrates to 1 for the given
//! bandwidth vector.

use core::f64::consts::PI;
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The closed set of supported kernel families.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum KernelFamily {
    /// Gaussian kernel, equivalent to a product of per-dimension normals.
    #[default]
    Gaussian,
    /// Epanechnikov kernel, zero outside the bandwidth-scaled unit ellipsoid.
    Epanechnikov,
}

impl FromStr for KernelFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" | "normal" => Ok(Self::Gaussian),
            "epanechnikov" | "epa" => Ok(Self::Epanechnikov),
            _ => Err(Error::InvalidKernel(s.to_string())),
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gaussian => f.write_str("gaussian"),
            Self::Epanechnikov => f.write_str("epanechnikov"),
        }
    }
}

/// A kernel family bound to a bandwidth vector.
///
/// Stateless once built, so a single `Kernel` can be shared by any number of
/// concurrent density evaluations.
///
/// # Examples
///
/// ```
/// use treekde::kernel::{Kernel, KernelFamily};
///
/// let k = Kernel::new(KernelFamily::Gaussian, &[1.0, 1.0]).unwrap();
/// let at_mode = k.density(&[0.0, 0.0]);
/// assert!((at_mode - 1.0 / (2.0 * std::f64::consts::PI)).abs() < 1e-12);
/// assert!(k.density(&[1.0, 0.0]) < at_mode);
/// ```
#[derive(Clone, Debug)]
pub struct Kernel {
    family: KernelFamily,
    bandwidth: Vec<f64>,
    inv_bandwidth: Vec<f64>,
    /// Normalization constant, already divided by the product of bandwidths.
    norm: f64,
}

impl Kernel {
    /// Binds `family` to `bandwidth`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ZeroDimensions` if `bandwidth` is empty and
    /// `Error::InvalidBandwidth` if any entry is not positive and finite.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(family: KernelFamily, bandwidth: &[f64]) -> Result<Self> {
        if bandwidth.is_empty() {
            return Err(Error::ZeroDimensions);
        }
        if let Some(&bad) = bandwidth.iter().find(|h| !(h.is_finite() && **h > 0.0)) {
            return Err(Error::InvalidBandwidth(bad));
        }

        let dim = bandwidth.len();
        let log_det: f64 = bandwidth.iter().map(|h| h.ln()).sum();
        let norm = match family {
            KernelFamily::Gaussian => (-0.5 * dim as f64 * (2.0 * PI).ln() - log_det).exp(),
            KernelFamily::Epanechnikov => {
                (dim as f64 + 2.0) / (2.0 * unit_ball_volume(dim)) * (-log_det).exp()
            }
        };

        Ok(Self {
            family,
            bandwidth: bandwidth.to_vec(),
            inv_bandwidth: bandwidth.iter().map(|h| 1.0 / h).collect(),
            norm,
        })
    }

    /// The kernel family.
    #[must_use]
    pub fn family(&self) -> KernelFamily {
        self.family
    }

    /// The bandwidth vector this kernel was built with.
    #[must_use]
    pub fn bandwidth(&self) -> &[f64] {
        &self.bandwidth
    }

    /// Element-wise reciprocal of the bandwidth vector.
    #[must_use]
    pub fn inv_bandwidth(&self) -> &[f64] {
        &self.inv_bandwidth
    }

    /// Number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.bandwidth.len()
    }

    /// Density at `offset` from the kernel's mode.
    #[must_use]
    pub fn density(&self, offset: &[f64]) -> f64 {
        let u2: f64 = offset
            .iter()
            .zip(&self.inv_bandwidth)
            .map(|(x, s)| (x * s) * (x * s))
            .sum();
        self.density_scaled_sq(u2)
    }

    /// Density at a point whose bandwidth-scaled squared distance from the
    /// mode is `u2`.
    #[must_use]
    pub fn density_scaled_sq(&self, u2: f64) -> f64 {
        match self.family {
            KernelFamily::Gaussian => self.norm * (-0.5 * u2).exp(),
            KernelFamily::Epanechnikov => {
                if u2 < 1.0 {
                    self.norm * (1.0 - u2)
                } else {
                    0.0
                }
            }
        }
    }

    /// Bandwidth-scaled squared distance between `a` and `b`.
    #[must_use]
    pub fn scaled_sq_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .zip(&self.inv_bandwidth)
            .map(|((x, y), s)| {
                let z = (x - y) * s;
                z * z
            })
            .sum()
    }

    /// Density at the mode, the largest value the kernel takes.
    #[must_use]
    pub fn max_density(&self) -> f64 {
        self.norm
    }
}

/// Volume of the unit ball in `dim` dimensions.
#[allow(clippy::cast_precision_loss)]
fn unit_ball_volume(dim: usize) -> f64 {
    // V_0 = 1, V_1 = 2, V_d = 2π/d · V_{d-2}
    let mut v = if dim % 2 == 0 { 1.0 } else { 2.0 };
    let mut d = if dim % 2 == 0 { 2 } else { 3 };
    while d <= dim {
        v *= 2.0 * PI / d as f64;
        d += 2;
    }
    v
}
