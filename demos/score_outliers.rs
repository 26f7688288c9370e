//! Scoring outliers in a noisy ring.
//!
//! Draws points around a circle, plants a few far-off points, then scores
//! everything with the default configuration and prints the most anomalous
//! points together with the estimated parameters and pipeline counters.
//!
//! Run with: `cargo run --example score_outliers`

use std::f64::consts::PI;

use treekde::prelude::*;

fn main() -> Result<()> {
    let mut rng = fastrand::Rng::with_seed(7);

    // A ring of radius 5 with a little radial noise
    let mut points: Vec<Vec<f64>> = (0..5_000)
        .map(|_| {
            let angle = rng.f64() * 2.0 * PI;
            let radius = 5.0 + (rng.f64() - 0.5) * 0.6;
            vec![radius * angle.cos(), radius * angle.sin()]
        })
        .collect();

    // The empty center and a few far points are the anomalies
    points.push(vec![0.0, 0.0]);
    points.push(vec![12.0, -1.0]);
    points.push(vec![-20.0, 20.0]);

    let config = KdeConfig::builder().leaf_capacity(16).seed(1).build()?;
    let report = ScoringPipeline::new(config)?.score(&points)?;

    let params = &report.parameters;
    println!("Estimated parameters");
    println!("  bandwidth = {:?}", params.bandwidth);
    println!("  cutoff    = {:.3e}", params.cutoff);
    println!("  tolerance = {:.3e}", params.tolerance);
    println!("  retries   = {}", params.retries);

    let d = &report.diagnostics;
    println!("Scored {} points", d.n_scored);
    println!("  grid hits  = {} (cells per level {:?})", d.grid_hits, d.grid_cells);
    println!("  tree above = {}", d.tree_above);
    println!("  tree below = {}", d.tree_below);

    let mut ranked: Vec<(usize, f64)> = report.scored().filter(|(_, s)| *s > 0.0).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    println!("Top anomalies");
    for (i, score) in ranked.iter().take(10) {
        println!("  #{i:<5} {:?} score = {score:.2}", points[*i]);
    }
    Ok(())
}
