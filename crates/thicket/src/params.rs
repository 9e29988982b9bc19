//! Hyperparameter maps handed to model constructors.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

use crate::error::ThicketError;

/// Hyperparameters for one estimator, keyed by name.
///
/// Values are arbitrary JSON so any parameter a backend understands can be
/// passed through unchanged. Keys are kept sorted, which makes
/// [`Params::fingerprint`] canonical.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    /// An empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set `key` to `value`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON text of the map, used to detect stale cache entries.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        // A BTreeMap of JSON values always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Start typed extraction on behalf of `backend`.
    #[must_use]
    pub fn reader<'a>(&'a self, backend: &'a str) -> ParamReader<'a> {
        ParamReader {
            params: self,
            backend,
            seen: BTreeSet::new(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Typed accessor over [`Params`] that remembers which keys were consumed.
///
/// Call [`ParamReader::finish`] once every known key has been read; it logs
/// the keys nobody asked for.
#[derive(Debug)]
pub struct ParamReader<'a> {
    params: &'a Params,
    backend: &'a str,
    seen: BTreeSet<&'a str>,
}

impl<'a> ParamReader<'a> {
    fn lookup(&mut self, key: &'a str) -> Option<&'a Value> {
        self.seen.insert(key);
        self.params.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, key: &str, expected: &'static str, got: &Value) -> ThicketError {
        ThicketError::InvalidParam {
            backend: self.backend.to_string(),
            key: key.to_string(),
            expected,
            got: got.to_string(),
        }
    }

    /// A non-negative integer.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidParam`] when the value is not a non-negative integer.
    pub fn usize(&mut self, key: &'a str) -> Result<Option<usize>, ThicketError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(key, "a non-negative integer", v)),
        }
    }

    /// A signed integer.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidParam`] when the value is not an integer.
    pub fn i64(&mut self, key: &'a str) -> Result<Option<i64>, ThicketError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| self.invalid(key, "an integer", v)),
        }
    }

    /// A 64-bit seed.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidParam`] when the value is not a non-negative integer.
    pub fn u64(&mut self, key: &'a str) -> Result<Option<u64>, ThicketError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "a non-negative integer", v)),
        }
    }

    /// A number.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidParam`] when the value is not numeric.
    pub fn f64(&mut self, key: &'a str) -> Result<Option<f64>, ThicketError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| self.invalid(key, "a number", v)),
        }
    }

    /// A boolean.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidParam`] when the value is not a boolean.
    pub fn bool(&mut self, key: &'a str) -> Result<Option<bool>, ThicketError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| self.invalid(key, "a boolean", v)),
        }
    }

    /// A raw value for keys with several accepted shapes.
    pub fn raw(&mut self, key: &'a str) -> Option<&'a Value> {
        self.lookup(key)
    }

    /// Build an [`ThicketError::InvalidParam`] for a value read via [`ParamReader::raw`].
    #[must_use]
    pub fn reject(&self, key: &str, expected: &'static str, got: &Value) -> ThicketError {
        self.invalid(key, expected, got)
    }

    /// Warn about keys that were never read.
    pub fn finish(self) {
        for (key, _) in self.params.iter() {
            if !self.seen.contains(key) {
                warn!(backend = self.backend, key, "ignoring unrecognised hyperparameter");
            }
        }
    }
}
