#[path = "../benches/datasets.rs"]
#[allow(dead_code)]
mod datasets;

use treekde::evaluator::{CutoffDecision, TraversalStats, TreeDensityEvaluator};
use treekde::kernel::{Kernel, KernelFamily};
use treekde::tree::SpatialPartitionTree;

fn build(
    points: &[Vec<f64>],
    family: KernelFamily,
    h: f64,
    leaf_capacity: usize,
    tolerance: f64,
) -> TreeDensityEvaluator<'_> {
    let tree = SpatialPartitionTree::from_rows(points, leaf_capacity, false).unwrap();
    let kernel = Kernel::new(family, &vec![h; tree.dim()]).unwrap();
    TreeDensityEvaluator::new(tree, kernel)
        .unwrap()
        .with_tolerance(tolerance)
}

#[test]
fn approximation_stays_within_tolerance() {
    let points = datasets::gaussian_cloud(3_000, 3, 21);
    let queries = datasets::gaussian_cloud(60, 3, 22);
    for family in [KernelFamily::Gaussian, KernelFamily::Epanechnikov] {
        for tolerance in [1e-5, 1e-3] {
            let eval = build(&points, family, 0.4, 16, tolerance);
            for q in &queries {
                let fast = eval.density(q);
                let exact = eval.brute_force_density(q, None);
                assert!(
                    (fast - exact).abs() <= tolerance,
                    "{family} tol {tolerance}: {fast} vs {exact}"
                );
            }
        }
    }
}

#[test]
fn leave_one_out_stays_within_tolerance() {
    let points = datasets::gaussian_cloud(2_000, 3, 23);
    let tolerance = 1e-3;
    for family in [KernelFamily::Gaussian, KernelFamily::Epanechnikov] {
        let eval = build(&points, family, 0.4, 16, tolerance);
        let mut stats = TraversalStats::default();
        for (i, q) in points.iter().enumerate().step_by(13) {
            let fast = eval.density_with_stats(q, Some(i), &mut stats);
            let exact = eval.brute_force_density(q, Some(i));
            assert!(
                (fast - exact).abs() <= tolerance,
                "{family} point {i}: {fast} vs {exact}"
            );
            assert!((eval.density_excluding(q, i) - fast).abs() < 1e-15);
        }
        assert!(stats.nodes_pruned > 0);
    }
}

#[test]
fn single_leaf_tree_is_exact() {
    let points = datasets::gaussian_cloud(50, 2, 4);
    let eval = build(&points, KernelFamily::Gaussian, 0.5, 100, 1.0);
    for (i, q) in points.iter().enumerate() {
        let fast = eval.density_excluding(q, i);
        let exact = eval.brute_force_density(q, Some(i));
        assert!((fast - exact).abs() < 1e-12);
    }
}

#[test]
fn leave_one_out_uses_full_normalizer() {
    let points = vec![vec![0.0], vec![0.0]];
    let eval = build(&points, KernelFamily::Gaussian, 1.0, 1, 0.0);
    let mode = eval.kernel().max_density();
    assert!((eval.density(&[0.0]) - mode).abs() < 1e-12);
    assert!((eval.density_excluding(&[0.0], 0) - mode / 2.0).abs() < 1e-12);
}

#[test]
fn pruning_reduces_kernel_evaluations() {
    let points = datasets::gaussian_cloud(5_000, 2, 8);
    let exact = build(&points, KernelFamily::Gaussian, 0.2, 16, 0.0);
    let loose = build(&points, KernelFamily::Gaussian, 0.2, 16, 1e-2);

    let mut exact_stats = TraversalStats::default();
    let mut loose_stats = TraversalStats::default();
    for q in datasets::gaussian_cloud(20, 2, 9) {
        let _ = exact.density_with_stats(&q, None, &mut exact_stats);
        let _ = loose.density_with_stats(&q, None, &mut loose_stats);
    }
    assert!(loose_stats.kernel_evaluations < exact_stats.kernel_evaluations);
    assert!(loose_stats.nodes_pruned > 0);
}

#[test]
fn classify_is_consistent_with_exact_density() {
    let points = datasets::cloud_with_outliers(2_000, 3, 3, 31);
    let tolerance = 1e-4;
    let eval = build(&points, KernelFamily::Gaussian, 0.3, 16, tolerance);

    // median leave-one-out density as cutoff: half the points on each side
    let mut exact: Vec<f64> = (0..points.len())
        .step_by(10)
        .map(|i| eval.brute_force_density(&points[i], Some(i)))
        .collect();
    exact.sort_unstable_by(f64::total_cmp);
    let cutoff = exact[exact.len() / 2];

    let mut above = 0;
    let mut below = 0;
    for i in (0..points.len()).step_by(10) {
        let q = &points[i];
        let truth = eval.brute_force_density(q, Some(i));
        match eval.classify(q, cutoff, Some(i)) {
            CutoffDecision::Above { lower_bound } => {
                above += 1;
                assert!(lower_bound <= truth + 1e-12);
                assert!(truth > cutoff - tolerance);
            }
            CutoffDecision::Below { density } => {
                below += 1;
                assert!((density - truth).abs() <= tolerance);
                assert!(truth <= cutoff + tolerance);
            }
        }
    }
    assert!(above > 0 && below > 0);
}

#[test]
fn outliers_have_negligible_density() {
    let points = datasets::cloud_with_outliers(1_000, 3, 2, 5);
    let eval = build(&points, KernelFamily::Gaussian, 0.3, 20, 1e-6);
    let outlier = points.len() - 1;
    let decision = eval.classify(&points[outlier], 1e-3, Some(outlier));
    assert!(!decision.is_above());
    assert!(decision.value() < 1e-12);
}

#[test]
fn evaluator_is_shareable_across_threads() {
    fn assert_sync<T: Send + Sync>() {}
    assert_sync::<TreeDensityEvaluator<'static>>();

    let points = datasets::gaussian_cloud(500, 2, 12);
    let eval = build(&points, KernelFamily::Gaussian, 0.3, 10, 0.0);
    let serial: Vec<f64> = points.iter().take(8).map(|q| eval.density(q)).collect();
    let eval = &eval;
    let threaded: Vec<f64> = std::thread::scope(|s| {
        let handles: Vec<_> = points
            .iter()
            .take(8)
            .map(|q| s.spawn(move || eval.density(q)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(serial, threaded);
}
