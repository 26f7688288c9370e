#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Tree-accelerated kernel density estimation for anomaly scoring.
//!
//! Every point of a numeric data set gets a score: zero when the point sits in
//! a dense region, otherwise the negative log of its estimated density. Dense
//! points are certified cheaply by a grid of density lower bounds or by a
//! bounded tree traversal; only the sparse ones get a precise density.
//! Bandwidth, cutoff and tolerance are estimated from the data itself.
//!
//! # Getting Started
//!
//! ```
//! use treekde::prelude::*;
//!
//! let mut points: Vec<Vec<f64>> = (0..300)
//!     .map(|i| {
//!         let t = f64::from(i) * 0.02;
//!         vec![t.sin(), t.cos(), t]
//!     })
//!     .collect();
//! points.push(vec![40.0, -40.0, 3.0]);
//!
//! let report = ScoringPipeline::new(KdeConfig::default())
//!     .unwrap()
//!     .score(&points)
//!     .unwrap();
//!
//! assert_eq!(report.scores[300], report.max_score());
//! assert!(report.scores[0].is_some());
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`ScoringPipeline`] | Split, estimate, build and score in one call. |
//! | [`KdeConfig`] | Every tunable, with validated defaults. |
//! | [`AdaptiveParameterController`](controller::AdaptiveParameterController) | Estimate bandwidth, cutoff and tolerance from a growing reservoir. |
//! | [`TreeDensityEvaluator`](evaluator::TreeDensityEvaluator) | Full-value and threshold-mode density queries over a tree. |
//! | [`SpatialPartitionTree`](tree::SpatialPartitionTree) | k-d style tree with per-node bounds, counts and means. |
//! | [`GridCascade`](grid::GridCascade) | Multi-resolution grid of certified density lower bounds. |
//! | [`Kernel`](kernel::Kernel) | Gaussian or Epanechnikov kernel bound to a bandwidth vector. |
//! | [`BandwidthSelector`](bandwidth::BandwidthSelector) | Robust Scott's-rule bandwidths. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `parallel` | Data-parallel scoring and sample evaluation via [`rayon`](https://docs.rs/rayon) | on |
//! | `serde` | `Serialize`/`Deserialize` on configuration and report types | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at each pipeline phase | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod bandwidth;
pub mod bbox;
pub mod config;
pub mod controller;
mod error;
pub mod evaluator;
pub mod grid;
pub mod kernel;
pub mod pipeline;
mod quantile;
mod rng_util;
pub mod tree;

pub use config::{KdeConfig, KdeConfigBuilder};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{ScoreReport, ScoringDiagnostics, ScoringPipeline, SplitPolicy};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use treekde::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bandwidth::BandwidthSelector;
    pub use crate::config::{KdeConfig, KdeConfigBuilder};
    pub use crate::controller::{AdaptiveParameterController, ParameterEstimate};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::evaluator::{CutoffDecision, TraversalStats, TreeDensityEvaluator};
    pub use crate::grid::{GridAnswer, GridCascade, GridPruneCache};
    pub use crate::kernel::{Kernel, KernelFamily};
    pub use crate::pipeline::{ScoreReport, ScoringDiagnostics, ScoringPipeline, SplitPolicy};
    pub use crate::tree::SpatialPartitionTree;
}
