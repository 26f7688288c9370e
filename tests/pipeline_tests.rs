#[path = "../benches/datasets.rs"]
#[allow(dead_code)]
mod datasets;

use treekde::kernel::KernelFamily;
use treekde::{Error, ErrorKind, KdeConfig, ScoringPipeline, SplitPolicy};

fn score_default(points: &[Vec<f64>]) -> treekde::ScoreReport {
    ScoringPipeline::new(KdeConfig::default())
        .unwrap()
        .score(points)
        .unwrap()
}

#[test]
fn gaussian_cloud_flags_about_one_percent() {
    let points = datasets::gaussian_cloud(1_000, 3, 1);
    let report = score_default(&points);

    assert_eq!(report.scores.len(), 1_000);
    assert!(report.scores.iter().all(Option::is_some));
    let flagged = report.n_flagged();
    assert!(
        (5..=30).contains(&flagged),
        "expected roughly 1-1.5% flagged, got {flagged}"
    );
}

#[test]
fn points_near_the_mode_score_zero() {
    let points = datasets::gaussian_cloud(1_000, 3, 2);
    let report = score_default(&points);
    for (i, p) in points.iter().enumerate() {
        let radius = p.iter().map(|x| x * x).sum::<f64>().sqrt();
        if radius < 0.1 {
            assert_eq!(report.scores[i], Some(0.0), "point {i} at radius {radius}");
        }
    }
}

#[test]
fn far_outlier_gets_the_maximum_score() {
    let mut points = datasets::gaussian_cloud(1_000, 3, 3);
    points.push(vec![100.0, 100.0, 100.0]);
    let report = score_default(&points);

    let outlier = report.scores[1_000].unwrap();
    assert!(outlier > 0.0);
    assert_eq!(report.max_score(), Some(outlier));
}

#[test]
fn scores_are_zero_or_above_the_cutoff_score() {
    let points = datasets::two_clusters(1_200, 2, 4);
    let report = score_default(&points);
    let cutoff = report.parameters.cutoff;
    let tolerance = report.parameters.tolerance;
    for (_, score) in report.scored() {
        assert!(score >= 0.0);
        if score > 0.0 {
            // nonzero scores come from densities at or below the cutoff
            assert!((-score).exp() <= cutoff + tolerance + 1e-12);
        }
    }
}

#[test]
fn scoring_is_deterministic_for_a_seed() {
    let points = datasets::cloud_with_outliers(800, 3, 3, 5);
    let a = score_default(&points);
    let b = score_default(&points);
    assert_eq!(a, b);
}

#[test]
fn disjoint_split_scores_only_held_out_points() {
    let points = datasets::gaussian_cloud(1_000, 2, 6);
    let config = KdeConfig::builder()
        .split(SplitPolicy::Disjoint {
            train_fraction: 0.3,
        })
        .seed(9)
        .build()
        .unwrap();
    let report = ScoringPipeline::new(config)
        .unwrap()
        .score(&points)
        .unwrap();

    assert_eq!(report.diagnostics.n_train, 300);
    assert_eq!(report.diagnostics.n_scored, 700);
    assert_eq!(report.scores.iter().filter(|s| s.is_none()).count(), 300);
    assert_eq!(report.scored().count(), 700);
}

#[test]
fn seed_changes_the_disjoint_split() {
    let points = datasets::gaussian_cloud(200, 2, 7);
    let split = SplitPolicy::Disjoint {
        train_fraction: 0.5,
    };
    let held_out = |seed| {
        let config = KdeConfig::builder().split(split).seed(seed).build().unwrap();
        let report = ScoringPipeline::new(config)
            .unwrap()
            .score(&points)
            .unwrap();
        report
            .scores
            .iter()
            .map(Option::is_some)
            .collect::<Vec<_>>()
    };
    assert_eq!(held_out(1), held_out(1));
    assert_ne!(held_out(1), held_out(2));
}

#[test]
fn diagnostics_account_for_every_scored_point() {
    let points = datasets::cloud_with_outliers(1_500, 3, 5, 8);
    let report = score_default(&points);
    let d = &report.diagnostics;
    assert_eq!(d.grid_hits + d.tree_above + d.tree_below, d.n_scored);
    assert_eq!(d.n_scored, points.len());
    assert_eq!(d.grid_cells.len(), 2);
    assert!(d.tree_below >= 5);
    assert!(d.traversal.nodes_visited > 0);
    assert!(!d.density_cdf.is_empty());
    assert!(d.density_cdf.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[test]
fn epanechnikov_pipeline_flags_outliers() {
    let points = datasets::cloud_with_outliers(1_000, 2, 3, 10);
    let config = KdeConfig::builder()
        .kernel(KernelFamily::Epanechnikov)
        .grid_scales(vec![0.5, 0.25])
        .build()
        .unwrap();
    let report = ScoringPipeline::new(config)
        .unwrap()
        .score(&points)
        .unwrap();
    for i in 1_000..1_003 {
        assert!(report.scores[i].unwrap() > 0.0);
    }
}

#[test]
fn single_point_sits_at_the_cutoff_and_scores_zero() {
    let report = score_default(&[vec![1.0, 2.0, 3.0]]);
    assert_eq!(report.scores.len(), 1);
    // its leave-one-out density and the cutoff are both zero
    assert!(report.parameters.cutoff.abs() < f64::EPSILON);
    assert_eq!(report.scores[0], Some(0.0));
    assert_eq!(report.n_flagged(), 0);
}

#[test]
fn densities_at_a_zero_cutoff_are_not_flagged() {
    // most points are isolated beyond the Epanechnikov support, so the cutoff
    // quantile is zero and zero-density points sit exactly on it
    let mut points: Vec<Vec<f64>> = (0..200).map(|i| vec![f64::from(i) * 1e3]).collect();
    points.extend((0..2).map(|i| vec![0.5 + f64::from(i) * 1e-3]));
    let config = KdeConfig::builder()
        .kernel(KernelFamily::Epanechnikov)
        .bandwidth_multiplier(1e-6)
        .build()
        .unwrap();
    let report = ScoringPipeline::new(config)
        .unwrap()
        .score(&points)
        .unwrap();
    assert!(report.parameters.cutoff.abs() < f64::EPSILON);
    assert!(report.scored().all(|(_, s)| s == 0.0));
}

#[test]
fn rejects_bad_input_and_config() {
    let pipeline = ScoringPipeline::new(KdeConfig::default()).unwrap();

    let empty: Vec<Vec<f64>> = Vec::new();
    assert!(matches!(pipeline.score(&empty), Err(Error::EmptyInput)));

    let ragged = vec![vec![0.0, 1.0], vec![2.0]];
    let err = pipeline.score(&ragged).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    let bad = KdeConfig {
        target_percentile: 1.5,
        ..KdeConfig::default()
    };
    assert!(matches!(
        ScoringPipeline::new(bad),
        Err(Error::InvalidPercentile(_))
    ));
    assert!(matches!(
        "boxcar".parse::<KernelFamily>(),
        Err(Error::InvalidKernel(_))
    ));
}
