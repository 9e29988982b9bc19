//! On-disk model cache.
//!
//! Each estimator owns one file, `<cache_dir>/<sanitized name>.bin`, holding
//! a bincode [`CacheEnvelope`]: the format version, the estimator name, the
//! backend id, a fingerprint of the hyperparameters and the encoded model.
//! Files are written to a temporary sibling and renamed into place, so a
//! crash never leaves a truncated cache entry behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ThicketError;

/// Current cache file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Extension of cache files.
pub const CACHE_EXTENSION: &str = "bin";

/// What to do when a cache file already exists at fit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Any existing file counts as a completed fit.
    #[default]
    Reuse,
    /// Refit when the recorded hyperparameters or backend differ.
    Revalidate,
}

/// Contents of one cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// Format version the file was written with.
    pub format_version: u32,
    /// Estimator name.
    pub name: String,
    /// [`crate::Backend::id`] of the model.
    pub backend: String,
    /// [`crate::Params::fingerprint`] at fit time.
    pub params: String,
    /// [`crate::Model::encode`] output.
    pub model: Vec<u8>,
}

/// Replace every character outside `[A-Za-z0-9._-]` with `-`.
///
/// Slashes become dashes, so nested names such as `layer-0/rf/fold-1` map to
/// a single flat file.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Cache file for the estimator `name` inside `cache_dir`.
#[must_use]
pub fn cache_path(cache_dir: &Path, name: &str) -> PathBuf {
    cache_dir.join(format!("{}.{CACHE_EXTENSION}", sanitize_name(name)))
}

/// Write `envelope` to `path`, creating parent directories.
///
/// # Errors
///
/// | Variant                           | When                             |
/// |-----------------------------------|----------------------------------|
/// | [`ThicketError::CacheDirCreate`]  | the parent directory can't be made |
/// | [`ThicketError::EncodeModel`]     | the envelope fails to serialize  |
/// | [`ThicketError::CacheWrite`]      | writing or renaming fails        |
pub fn write(path: &Path, envelope: &CacheEnvelope) -> Result<(), ThicketError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ThicketError::CacheDirCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let bytes = bincode::serialize(envelope).map_err(|source| ThicketError::EncodeModel {
        name: envelope.name.clone(),
        source,
    })?;
    let tmp = path.with_extension(format!("{CACHE_EXTENSION}.tmp"));
    fs::write(&tmp, &bytes).map_err(|source| ThicketError::CacheWrite {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| ThicketError::CacheWrite {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote cache file");
    Ok(())
}

/// Read and version-check the envelope at `path`.
///
/// # Errors
///
/// | Variant                                 | When                          |
/// |-----------------------------------------|-------------------------------|
/// | [`ThicketError::CacheRead`]             | the file can't be read        |
/// | [`ThicketError::DecodeCache`]           | the bytes are not an envelope |
/// | [`ThicketError::IncompatibleCacheVersion`] | the format version differs |
pub fn read(path: &Path) -> Result<CacheEnvelope, ThicketError> {
    let bytes = fs::read(path).map_err(|source| ThicketError::CacheRead {
        path: path.to_path_buf(),
        source,
    })?;
    let envelope: CacheEnvelope =
        bincode::deserialize(&bytes).map_err(|source| ThicketError::DecodeCache {
            path: path.to_path_buf(),
            source,
        })?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(ThicketError::IncompatibleCacheVersion {
            expected: FORMAT_VERSION,
            found: envelope.format_version,
            path: path.to_path_buf(),
        });
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> CacheEnvelope {
        CacheEnvelope {
            format_version: FORMAT_VERSION,
            name: "rf".into(),
            backend: "random_forest_classifier".into(),
            params: "{}".into(),
            model: vec![1, 2, 3],
        }
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_name("layer-0/rf_1.fold-2"), "layer-0-rf_1.fold-2");
        assert_eq!(sanitize_name("a b:c"), "a-b-c");
        assert_eq!(sanitize_name("ünï"), "-n-");
    }

    #[test]
    fn path_joins_dir_and_extension() {
        let path = cache_path(Path::new("/tmp/cache"), "layer-0/rf");
        assert_eq!(path, Path::new("/tmp/cache/layer-0-rf.bin"));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = cache_path(&dir.path().join("nested"), "rf");
        write(&path, &envelope()).unwrap();
        assert_eq!(read(&path).unwrap(), envelope());
        assert!(!path.with_extension("bin.tmp").exists());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = cache_path(dir.path(), "rf");
        let stale = CacheEnvelope {
            format_version: FORMAT_VERSION + 1,
            ..envelope()
        };
        write(&path, &stale).unwrap();
        assert!(matches!(
            read(&path),
            Err(ThicketError::IncompatibleCacheVersion { found, .. }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = cache_path(dir.path(), "rf");
        fs::write(&path, b"not a cache file").unwrap();
        assert!(matches!(read(&path), Err(ThicketError::DecodeCache { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read(&dir.path().join("absent.bin")),
            Err(ThicketError::CacheRead { .. })
        ));
    }
}
