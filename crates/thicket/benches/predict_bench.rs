//! Criterion benchmarks for thicket: batched prediction, cache load and the
//! batch-size heuristic.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use thicket::{
    Estimator, EstimatorDescriptor, EstimatorKind, Footprint, Params, Target, Task,
    forest_batch_size,
};

fn make_classification(n_samples: usize, n_features: usize, n_classes: usize) -> (Array2<f64>, Target) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_samples, n_features), |(i, f)| {
        let base = if f < 3 { (i % n_classes) as f64 * 3.0 } else { 0.0 };
        base + rng.r#gen::<f64>() * 0.5
    });
    let labels = (0..n_samples).map(|i| i % n_classes).collect();
    (x, Target::classes(labels))
}

fn fitted_forest(x: &Array2<f64>, y: &Target) -> Estimator {
    let desc = EstimatorDescriptor::new(
        EstimatorKind::RandomForestClassifier,
        "bench-rf",
        Params::new().with("n_estimators", 50),
    );
    let mut est = Estimator::new(&desc);
    est.fit(x.view(), y, None).unwrap();
    est
}

fn bench_batched_predict(c: &mut Criterion) {
    let (x, y) = make_classification(2_000, 20, 5);
    let mut est = fitted_forest(&x, &y);

    c.bench_function("predict_proba_2000x20_single_pass", |b| {
        b.iter(|| est.predict_proba(x.view(), None, Some(0)).unwrap());
    });
    c.bench_function("predict_proba_2000x20_batch_100", |b| {
        b.iter(|| est.predict_proba(x.view(), None, Some(100)).unwrap());
    });
}

fn bench_cached_predict(c: &mut Criterion) {
    let (x, y) = make_classification(500, 20, 5);
    let dir = tempfile::tempdir().unwrap();
    let desc = EstimatorDescriptor::new(
        EstimatorKind::ExtraTreesClassifier,
        "bench-et",
        Params::new().with("n_estimators", 50),
    );
    let mut est = Estimator::new(&desc);
    est.fit(x.view(), &y, Some(dir.path())).unwrap();

    c.bench_function("predict_proba_500x20_from_cache", |b| {
        b.iter(|| est.predict_proba(x.view(), Some(dir.path()), None).unwrap());
    });
}

fn bench_batch_heuristic(c: &mut Criterion) {
    let footprint = Footprint {
        n_estimators: 500,
        n_outputs: 10,
        task: Task::Classification,
    };
    c.bench_function("forest_batch_size", |b| {
        b.iter(|| forest_batch_size(black_box(footprint), black_box(1_000_000), black_box(8_000_000_000)));
    });
}

criterion_group!(benches, bench_batched_predict, bench_cached_predict, bench_batch_heuristic);
criterion_main!(benches);
