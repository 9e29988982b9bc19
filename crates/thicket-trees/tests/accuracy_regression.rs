//! Accuracy regression tests for thicket-trees.
//!
//! These tests verify that algorithmic changes do not degrade forest and
//! boosting accuracy on a deterministic synthetic dataset.

use ndarray::{Array2, s};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use thicket_trees::{BoostingConfig, ForestConfig, MaxFeatures, Target, Task};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic classification dataset
// ---------------------------------------------------------------------------

/// Generate a 300-sample, 10-feature, 3-class classification dataset.
///
/// Features 0-2 are informative (class * 3.0 + noise in [0, 0.5]).
/// Features 3-9 are pure noise in [0, 0.5].
/// Samples are assigned round-robin across classes.
fn make_classification() -> (Array2<f64>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n_classes = 3;
    let x = Array2::from_shape_fn((300, 10), |(i, f)| {
        let base = if f < 3 { (i % n_classes) as f64 * 3.0 } else { 0.0 };
        base + rng.r#gen::<f64>() * 0.5
    });
    let labels = (0..300).map(|i| i % n_classes).collect();
    (x, labels)
}

fn accuracy(pred: &ndarray::Array1<f64>, labels: &[usize]) -> f64 {
    let correct = pred
        .iter()
        .zip(labels)
        .filter(|&(&p, &l)| p as usize == l)
        .count();
    correct as f64 / labels.len() as f64
}

/// Hold-out accuracy on the last 100 rows must exceed 0.85 for every family.
#[test]
fn holdout_accuracy_above_threshold() {
    let (x, labels) = make_classification();
    let train_x = x.slice(s![..200, ..]);
    let test_x = x.slice(s![200.., ..]);
    let train_y = Target::classes_with(labels[..200].to_vec(), 3);

    let rf = ForestConfig::random_forest(Task::Classification, 50)
        .unwrap()
        .fit(train_x, &train_y)
        .unwrap();
    let et = ForestConfig::extra_trees(Task::Classification, 50)
        .unwrap()
        .with_max_features(MaxFeatures::Fixed(1))
        .fit(train_x, &train_y)
        .unwrap();
    let gb = BoostingConfig::new(Task::Classification, 30)
        .unwrap()
        .fit(train_x, &train_y)
        .unwrap();

    for (name, pred) in [
        ("random forest", rf.predict(test_x).unwrap()),
        ("completely random forest", et.predict(test_x).unwrap()),
        ("gradient boosting", gb.predict(test_x).unwrap()),
    ] {
        let acc = accuracy(&pred, &labels[200..]);
        assert!(acc > 0.85, "{name} hold-out accuracy {acc} <= 0.85");
    }
}

/// Same config and seed must produce identical probabilities across runs.
#[test]
fn deterministic_predictions() {
    let (x, labels) = make_classification();
    let y = Target::classes(labels);
    let cfg = ForestConfig::random_forest(Task::Classification, 40)
        .unwrap()
        .with_seed(7);

    let a = cfg.fit(x.view(), &y).unwrap().predict_proba(x.view()).unwrap();
    let b = cfg.fit(x.view(), &y).unwrap().predict_proba(x.view()).unwrap();
    assert_eq!(a, b, "probabilities differ across runs with the same seed");
}

/// Forest probabilities over any row subset equal the same rows of a
/// whole-matrix prediction.
#[test]
fn row_slices_predict_like_whole_matrix() {
    let (x, labels) = make_classification();
    let forest = ForestConfig::extra_trees(Task::Classification, 20)
        .unwrap()
        .fit(x.view(), &Target::classes(labels))
        .unwrap();
    let whole = forest.predict_proba(x.view()).unwrap();
    let part = forest.predict_proba(x.slice(s![37..91, ..])).unwrap();
    assert_eq!(part, whole.slice(s![37..91, ..]));
}
