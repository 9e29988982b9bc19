//! Criterion benchmarks for thicket-trees: forest training and prediction.

use criterion::{Criterion, criterion_group, criterion_main};
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use thicket_trees::{BoostingConfig, ForestConfig, Target, Task};

fn make_classification(n_samples: usize, n_features: usize, n_classes: usize) -> (Array2<f64>, Target) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_samples, n_features), |(i, f)| {
        let base = if f < 3 { (i % n_classes) as f64 * 3.0 } else { 0.0 };
        base + rng.r#gen::<f64>() * 0.5
    });
    let labels = (0..n_samples).map(|i| i % n_classes).collect();
    (x, Target::classes(labels))
}

fn bench_forest_train(c: &mut Criterion) {
    let (x, y) = make_classification(500, 20, 5);
    let cfg = ForestConfig::random_forest(Task::Classification, 50).unwrap();

    c.bench_function("rf_train_500x20_5class_50trees", |b| {
        b.iter(|| cfg.fit(x.view(), &y).unwrap());
    });
}

fn bench_extra_trees_train(c: &mut Criterion) {
    let (x, y) = make_classification(500, 20, 5);
    let cfg = ForestConfig::extra_trees(Task::Classification, 50).unwrap();

    c.bench_function("et_train_500x20_5class_50trees", |b| {
        b.iter(|| cfg.fit(x.view(), &y).unwrap());
    });
}

fn bench_forest_predict(c: &mut Criterion) {
    let (x, y) = make_classification(500, 20, 5);
    let forest = ForestConfig::random_forest(Task::Classification, 50)
        .unwrap()
        .fit(x.view(), &y)
        .unwrap();

    c.bench_function("rf_predict_proba_500x20_50trees", |b| {
        b.iter(|| forest.predict_proba(x.view()).unwrap());
    });
}

fn bench_boosting_train(c: &mut Criterion) {
    let (x, y) = make_classification(500, 20, 5);
    let cfg = BoostingConfig::new(Task::Classification, 20).unwrap();

    c.bench_function("gbdt_train_500x20_5class_20stages", |b| {
        b.iter(|| cfg.fit(x.view(), &y).unwrap());
    });
}

criterion_group!(
    benches,
    bench_forest_train,
    bench_extra_trees_train,
    bench_forest_predict,
    bench_boosting_train
);
criterion_main!(benches);
