//! The estimator wrapper: uniform fit and predict over any [`Backend`],
//! with optional disk caching and batched prediction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, s};
use thicket_trees::{Target, Task};
use tracing::{Span, debug, info, info_span, warn};

use crate::batch::default_batch_size;
use crate::cache::{self, CacheEnvelope, CachePolicy, FORMAT_VERSION};
use crate::descriptor::EstimatorDescriptor;
use crate::error::ThicketError;
use crate::model::{Backend, Model};
use crate::params::Params;

/// A named model with a uniform lifecycle.
///
/// With a cache directory, `fit` persists the trained model and drops it from
/// memory, and `predict_proba` reloads it from disk for the duration of the
/// call. Without one, the model stays in memory.
#[derive(Debug)]
pub struct Estimator {
    name: String,
    backend: Arc<dyn Backend>,
    params: Params,
    cache_policy: CachePolicy,
    model: Option<Box<dyn Model>>,
    span: Span,
}

impl Estimator {
    /// Wrap a built-in estimator kind.
    #[must_use]
    pub fn new(descriptor: &EstimatorDescriptor) -> Self {
        Self::with_backend(
            descriptor.name.clone(),
            descriptor.kind.backend(),
            descriptor.params.clone(),
        )
    }

    /// Wrap an arbitrary backend.
    #[must_use]
    pub fn with_backend(name: impl Into<String>, backend: Arc<dyn Backend>, params: Params) -> Self {
        let name = name.into();
        let span = info_span!("estimator", name = %name, backend = backend.id());
        Self {
            name,
            backend,
            params,
            cache_policy: CachePolicy::default(),
            model: None,
            span,
        }
    }

    /// Set how existing cache files are treated by [`Estimator::fit`].
    #[must_use]
    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    /// Return the estimator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the backend's task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.backend.task()
    }

    /// Return the hyperparameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Return the cache policy.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// True when a trained model is held in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.model.is_some()
    }

    /// Cache file this estimator uses inside `cache_dir`.
    #[must_use]
    pub fn cache_path(&self, cache_dir: Option<&Path>) -> Option<PathBuf> {
        cache_dir.map(|dir| cache::cache_path(dir, &self.name))
    }

    /// Train the model, or skip training when a usable cache file exists.
    ///
    /// With `cache_dir`, the trained model is written to the cache and
    /// released from memory.
    ///
    /// # Errors
    ///
    /// | Variant                        | When                                    |
    /// |--------------------------------|-----------------------------------------|
    /// | [`ThicketError::InvalidParam`] | the hyperparameters are rejected        |
    /// | [`ThicketError::Model`]        | the model library fails to train        |
    /// | cache write errors             | see [`cache::write`]                    |
    /// | cache read errors              | [`CachePolicy::Revalidate`] only, for files that can't be opened |
    pub fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &Target,
        cache_dir: Option<&Path>,
    ) -> Result<(), ThicketError> {
        let span = self.span.clone();
        let _guard = span.enter();

        let path = self.cache_path(cache_dir);
        if let Some(path) = &path
            && path.exists()
            && self.cache_is_current(path)?
        {
            info!(path = %path.display(), "found cached estimator, skipping fit");
            return Ok(());
        }

        info!(n_samples = x.nrows(), n_features = x.ncols(), "fitting estimator");
        let mut model = self.backend.build(&self.params)?;
        model.fit(x, y)?;

        match path {
            Some(path) => {
                let envelope = CacheEnvelope {
                    format_version: FORMAT_VERSION,
                    name: self.name.clone(),
                    backend: self.backend.id().to_string(),
                    params: self.params.fingerprint(),
                    model: model.encode()?,
                };
                cache::write(&path, &envelope)?;
                info!(path = %path.display(), "saved estimator to cache");
                self.model = None;
            }
            None => self.model = Some(model),
        }
        Ok(())
    }

    fn cache_is_current(&self, path: &Path) -> Result<bool, ThicketError> {
        match self.cache_policy {
            CachePolicy::Reuse => Ok(true),
            CachePolicy::Revalidate => {
                let envelope = match cache::read(path) {
                    Ok(envelope) => envelope,
                    Err(
                        err @ (ThicketError::DecodeCache { .. }
                        | ThicketError::IncompatibleCacheVersion { .. }),
                    ) => {
                        warn!(path = %path.display(), error = %err, "unreadable cache file, refitting");
                        return Ok(false);
                    }
                    Err(err) => return Err(err),
                };
                let current = envelope.backend == self.backend.id()
                    && envelope.params == self.params.fingerprint();
                if !current {
                    warn!(
                        path = %path.display(),
                        cached_backend = %envelope.backend,
                        "cached estimator is stale, refitting"
                    );
                }
                Ok(current)
            }
        }
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Model>, ThicketError> {
        info!(path = %path.display(), "loading estimator from cache");
        let envelope = cache::read(path)?;
        if envelope.backend != self.backend.id() {
            return Err(ThicketError::CacheBackendMismatch {
                expected: self.backend.id().to_string(),
                found: envelope.backend,
                path: path.to_path_buf(),
            });
        }
        if envelope.params != self.params.fingerprint() {
            warn!(
                path = %path.display(),
                "cached estimator was trained with different hyperparameters"
            );
        }
        self.backend.decode(&envelope.model)
    }

    /// Predict `(n_rows, n_outputs)` probabilities or regression values.
    ///
    /// With `cache_dir` the model is loaded from its cache file for this call
    /// only. `batch_size` of `None` or `Some(0)` uses the model's default
    /// heuristic; a positive batch size predicts in row slices of that size,
    /// with the model's progress output silenced until the last slice.
    ///
    /// # Errors
    ///
    /// | Variant                                  | When                              |
    /// |------------------------------------------|-----------------------------------|
    /// | [`ThicketError::NotFitted`]              | no cache dir and no in-memory model |
    /// | cache read and decode errors             | see [`cache::read`]               |
    /// | [`ThicketError::CacheBackendMismatch`]   | the file holds another backend    |
    /// | [`ThicketError::BatchShapeMismatch`]     | batches disagree on output width  |
    /// | [`ThicketError::Model`]                  | the model library fails           |
    pub fn predict_proba(
        &mut self,
        x: ArrayView2<'_, f64>,
        cache_dir: Option<&Path>,
        batch_size: Option<usize>,
    ) -> Result<Array2<f64>, ThicketError> {
        let span = self.span.clone();
        let _guard = span.enter();

        let mut loaded: Box<dyn Model>;
        let model: &mut dyn Model = match self.cache_path(cache_dir) {
            Some(path) => {
                loaded = self.load(&path)?;
                loaded.as_mut()
            }
            None => match self.model.as_deref_mut() {
                Some(model) => model,
                None => {
                    return Err(ThicketError::NotFitted {
                        name: self.name.clone(),
                    });
                }
            },
        };

        let n_rows = x.nrows();
        let batch = match batch_size {
            Some(b) if b > 0 => b,
            _ => default_batch_size(model, n_rows),
        };
        if batch == 0 || n_rows == 0 {
            return model.predict_proba(x);
        }

        let saved = model.verbose();
        if saved.is_some() {
            model.set_verbose(0);
        }
        let result = predict_in_batches(model, x, batch);
        if let Some(verbose) = saved {
            model.set_verbose(verbose);
        }
        result
    }

    /// Predicted class index (as `f64`) or regression value for each row.
    ///
    /// # Errors
    ///
    /// Same as [`Estimator::predict_proba`].
    pub fn predict(
        &mut self,
        x: ArrayView2<'_, f64>,
        cache_dir: Option<&Path>,
        batch_size: Option<usize>,
    ) -> Result<Array1<f64>, ThicketError> {
        let proba = self.predict_proba(x, cache_dir, batch_size)?;
        Ok(match self.task() {
            Task::Regression => proba.column(0).to_owned(),
            Task::Classification => crate::metrics::argmax_rows(proba.view()),
        })
    }
}

/// Predict `x` in row slices of `batch` and write each into one output matrix.
///
/// The output is allocated once the first slice reveals the prediction width.
fn predict_in_batches(
    model: &dyn Model,
    x: ArrayView2<'_, f64>,
    batch: usize,
) -> Result<Array2<f64>, ThicketError> {
    let n_rows = x.nrows();
    let mut out: Option<Array2<f64>> = None;
    for start in (0..n_rows).step_by(batch) {
        let end = (start + batch).min(n_rows);
        debug!(start, end, n_rows, batch, "batch predict_proba");
        let part = model.predict_proba(x.slice(s![start..end, ..]))?;
        let out = out.get_or_insert_with(|| Array2::zeros((n_rows, part.ncols())));
        if part.ncols() != out.ncols() {
            return Err(ThicketError::BatchShapeMismatch {
                expected: out.ncols(),
                got: part.ncols(),
                offset: start,
            });
        }
        out.slice_mut(s![start..end, ..]).assign(&part);
    }
    Ok(out.unwrap_or_else(|| Array2::zeros((0, 0))))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::Array2;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::batch::Footprint;
    use crate::descriptor::EstimatorKind;

    /// Predicts the row mean of `x` (scaled) in every output column and
    /// counts calls, for observing wrapper behaviour without real training.
    #[derive(Debug, Default)]
    pub(crate) struct CountingBackend {
        pub(crate) fits: AtomicUsize,
        pub(crate) predict_rows: Mutex<Vec<usize>>,
        pub(crate) verbose_seen: Mutex<Vec<u8>>,
        pub(crate) footprint: Option<Footprint>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct CountingModel {
        n_outputs: usize,
        scale: f64,
        verbose: u8,
        #[serde(skip)]
        backend: Option<Arc<CountingBackend>>,
    }

    #[derive(Debug)]
    pub(crate) struct CountingHandle(pub(crate) Arc<CountingBackend>);

    impl Backend for CountingHandle {
        fn id(&self) -> &str {
            "counting"
        }

        fn task(&self) -> Task {
            Task::Classification
        }

        fn build(&self, params: &Params) -> Result<Box<dyn Model>, ThicketError> {
            let mut r = params.reader("counting");
            let verbose = r.usize("verbose")?.unwrap_or(1) as u8;
            r.finish();
            Ok(Box::new(CountingModel {
                n_outputs: 0,
                scale: 0.0,
                verbose,
                backend: Some(Arc::clone(&self.0)),
            }))
        }

        fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Model>, ThicketError> {
            let mut model: CountingModel =
                bincode::deserialize(bytes).map_err(|source| ThicketError::DecodeModel {
                    name: "counting".into(),
                    source,
                })?;
            model.backend = Some(Arc::clone(&self.0));
            Ok(Box::new(model))
        }
    }

    impl Model for CountingModel {
        fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Target) -> Result<(), ThicketError> {
            if let Some(backend) = &self.backend {
                backend.fits.fetch_add(1, Ordering::SeqCst);
            }
            self.n_outputs = y.n_outputs();
            self.scale = 1.0 / (1.0 + x.sum().abs());
            Ok(())
        }

        fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ThicketError> {
            if let Some(backend) = &self.backend {
                backend.predict_rows.lock().unwrap().push(x.nrows());
                backend.verbose_seen.lock().unwrap().push(self.verbose);
            }
            let mut out = Array2::zeros((x.nrows(), self.n_outputs));
            for (mut row, xr) in out.outer_iter_mut().zip(x.outer_iter()) {
                row.fill(xr.sum() * self.scale);
            }
            Ok(out)
        }

        fn encode(&self) -> Result<Vec<u8>, ThicketError> {
            bincode::serialize(self).map_err(|source| ThicketError::EncodeModel {
                name: "counting".into(),
                source,
            })
        }

        fn verbose(&self) -> Option<u8> {
            Some(self.verbose)
        }

        fn set_verbose(&mut self, verbose: u8) {
            self.verbose = verbose;
        }

        fn footprint(&self) -> Option<Footprint> {
            self.backend.as_ref().and_then(|b| b.footprint)
        }
    }

    fn make_data(n: usize) -> (Array2<f64>, Target) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| (i * 3 + j) as f64 * 0.1);
        let y = Target::classes_with((0..n).map(|i| i % 2).collect(), 2);
        (x, y)
    }

    fn counting() -> (Arc<CountingBackend>, Estimator) {
        let state = Arc::new(CountingBackend::default());
        let est = Estimator::with_backend(
            "mock",
            Arc::new(CountingHandle(Arc::clone(&state))),
            Params::new(),
        );
        (state, est)
    }

    #[test]
    fn fit_without_cache_keeps_model_in_memory() {
        let (state, mut est) = counting();
        let (x, y) = make_data(12);
        est.fit(x.view(), &y, None).unwrap();
        assert!(est.is_in_memory());
        assert_eq!(state.fits.load(Ordering::SeqCst), 1);
        assert_eq!(est.predict_proba(x.view(), None, None).unwrap().dim(), (12, 2));
    }

    #[test]
    fn second_fit_with_cache_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut est) = counting();
        let (x, y) = make_data(12);
        est.fit(x.view(), &y, Some(dir.path())).unwrap();
        assert!(!est.is_in_memory());
        assert!(dir.path().join("mock.bin").exists());
        est.fit(x.view(), &y, Some(dir.path())).unwrap();
        assert_eq!(state.fits.load(Ordering::SeqCst), 1);
        assert!(!est.is_in_memory());
    }

    #[test]
    fn cached_predictions_match_in_memory_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut cached) = counting();
        let (_, mut memory) = counting();
        let (x, y) = make_data(15);
        cached.fit(x.view(), &y, Some(dir.path())).unwrap();
        memory.fit(x.view(), &y, None).unwrap();
        assert_eq!(
            cached.predict_proba(x.view(), Some(dir.path()), None).unwrap(),
            memory.predict_proba(x.view(), None, None).unwrap()
        );
        assert!(!cached.is_in_memory());
    }

    #[test]
    fn batched_output_equals_single_pass() {
        let (state, mut est) = counting();
        let (x, y) = make_data(25);
        est.fit(x.view(), &y, None).unwrap();
        let whole = est.predict_proba(x.view(), None, None).unwrap();
        let batched = est.predict_proba(x.view(), None, Some(10)).unwrap();
        assert_eq!(whole, batched);
        assert_eq!(*state.predict_rows.lock().unwrap(), vec![25, 10, 10, 5]);
    }

    #[test]
    fn batching_silences_then_restores_verbose() {
        let (state, mut est) = counting();
        let (x, y) = make_data(20);
        est.fit(x.view(), &y, None).unwrap();
        est.predict_proba(x.view(), None, Some(7)).unwrap();
        est.predict_proba(x.view(), None, None).unwrap();
        assert_eq!(*state.verbose_seen.lock().unwrap(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn default_batch_uses_footprint() {
        let state = Arc::new(CountingBackend {
            footprint: Some(Footprint {
                n_estimators: usize::MAX / 64,
                n_outputs: 1_000,
                task: Task::Classification,
            }),
            ..CountingBackend::default()
        });
        let mut est = Estimator::with_backend(
            "huge",
            Arc::new(CountingHandle(Arc::clone(&state))),
            Params::new(),
        );
        let (x, y) = make_data(25);
        est.fit(x.view(), &y, None).unwrap();
        est.predict_proba(x.view(), None, None).unwrap();
        assert_eq!(*state.predict_rows.lock().unwrap(), vec![10, 10, 5]);
    }

    #[test]
    fn predict_before_fit_errors() {
        let (_, mut est) = counting();
        let (x, _) = make_data(3);
        assert!(matches!(
            est.predict_proba(x.view(), None, None),
            Err(ThicketError::NotFitted { ref name }) if name == "mock"
        ));
    }

    #[test]
    fn predict_from_missing_cache_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut est) = counting();
        let (x, _) = make_data(3);
        assert!(matches!(
            est.predict_proba(x.view(), Some(dir.path()), None),
            Err(ThicketError::CacheRead { .. })
        ));
    }

    #[test]
    fn revalidate_refits_on_changed_params() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(CountingBackend::default());
        let backend: Arc<dyn Backend> = Arc::new(CountingHandle(Arc::clone(&state)));
        let (x, y) = make_data(12);

        Estimator::with_backend("mock", Arc::clone(&backend), Params::new().with("verbose", 1))
            .fit(x.view(), &y, Some(dir.path()))
            .unwrap();

        let changed = Params::new().with("verbose", 2);
        Estimator::with_backend("mock", Arc::clone(&backend), changed.clone())
            .fit(x.view(), &y, Some(dir.path()))
            .unwrap();
        assert_eq!(state.fits.load(Ordering::SeqCst), 1, "reuse must not refit");

        let mut revalidating = Estimator::with_backend("mock", Arc::clone(&backend), changed)
            .with_cache_policy(CachePolicy::Revalidate);
        revalidating.fit(x.view(), &y, Some(dir.path())).unwrap();
        assert_eq!(state.fits.load(Ordering::SeqCst), 2);
        revalidating.fit(x.view(), &y, Some(dir.path())).unwrap();
        assert_eq!(state.fits.load(Ordering::SeqCst), 2, "fresh cache must be reused");
    }

    #[test]
    fn revalidate_refits_over_unreadable_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (state, est) = counting();
        let mut est = est.with_cache_policy(CachePolicy::Revalidate);
        let path = est.cache_path(Some(dir.path())).unwrap();
        std::fs::write(&path, b"not an envelope").unwrap();
        let (x, y) = make_data(8);

        est.fit(x.view(), &y, Some(dir.path())).unwrap();
        assert_eq!(state.fits.load(Ordering::SeqCst), 1);
        let proba = est.predict_proba(x.view(), Some(dir.path()), None).unwrap();
        assert_eq!(proba.dim(), (8, 2));
    }

    #[test]
    fn loading_another_backends_cache_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut est) = counting();
        let (x, y) = make_data(12);
        est.fit(x.view(), &y, Some(dir.path())).unwrap();

        let desc = EstimatorDescriptor::new(EstimatorKind::RandomForestClassifier, "mock", Params::new());
        let mut rf = Estimator::new(&desc);
        assert!(matches!(
            rf.predict_proba(x.view(), Some(dir.path()), None),
            Err(ThicketError::CacheBackendMismatch { .. })
        ));
    }

    #[test]
    fn real_forest_twenty_rows() {
        let desc = EstimatorDescriptor::new(
            EstimatorKind::RandomForestClassifier,
            "rf",
            Params::new().with("n_estimators", 10),
        );
        let mut est = Estimator::new(&desc);
        let (x, _) = make_data(20);
        let y = Target::classes_with((0..20).map(|i| i % 3).collect(), 3);
        est.fit(x.view(), &y, None).unwrap();
        let proba = est.predict_proba(x.view(), None, None).unwrap();
        assert_eq!(proba.dim(), (20, 3));
        for row in proba.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(est.predict(x.view(), None, None).unwrap().len(), 20);
    }

    #[test]
    fn empty_input_keeps_output_width() {
        let (_, mut est) = counting();
        let (x, y) = make_data(4);
        est.fit(x.view(), &y, None).unwrap();
        let empty = Array2::<f64>::zeros((0, 3));
        let batched = est.predict_proba(empty.view(), None, Some(5)).unwrap();
        let single = est.predict_proba(empty.view(), None, None).unwrap();
        assert_eq!(batched.dim(), (0, 2));
        assert_eq!(batched.dim(), single.dim());
    }
}
