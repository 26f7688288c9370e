#![cfg(feature = "serde")]

#[path = "../benches/datasets.rs"]
#[allow(dead_code)]
mod datasets;

use treekde::kernel::KernelFamily;
use treekde::{KdeConfig, ScoreReport, ScoringPipeline, SplitPolicy};

#[test]
fn config_round_trip() {
    let config = KdeConfig::builder()
        .kernel(KernelFamily::Epanechnikov)
        .split(SplitPolicy::Disjoint {
            train_fraction: 0.25,
        })
        .grid_scales(vec![0.4])
        .seed(11)
        .build()
        .unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: KdeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}

#[test]
fn partial_config_fills_defaults() {
    let json = r#"{
        "kernel": "epanechnikov",
        "leaf_capacity": 8,
        "split": { "disjoint": { "train_fraction": 0.5 } }
    }"#;
    let config: KdeConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.kernel, KernelFamily::Epanechnikov);
    assert_eq!(config.leaf_capacity, 8);
    assert_eq!(
        config.split,
        SplitPolicy::Disjoint {
            train_fraction: 0.5
        }
    );
    assert_eq!(config.eval_cap, KdeConfig::default().eval_cap);
    config.validate().unwrap();
}

#[test]
fn unknown_kernel_name_is_rejected() {
    let result = serde_json::from_str::<KdeConfig>(r#"{ "kernel": "tophat" }"#);
    assert!(result.is_err());
}

#[test]
fn report_round_trip() {
    let points = datasets::cloud_with_outliers(300, 2, 2, 3);
    let report = ScoringPipeline::new(KdeConfig::default())
        .unwrap()
        .score(&points)
        .unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let back: ScoreReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.scores.len(), report.scores.len());
    assert_eq!(back.diagnostics.n_scored, report.diagnostics.n_scored);
    assert_eq!(back.parameters.sample_size, report.parameters.sample_size);
}
