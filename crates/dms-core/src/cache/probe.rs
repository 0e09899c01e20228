//! Probe identities, results, and the memoizing probe wrapper.
//!
//! A *probe* extracts metadata from a media file by running an external tool
//! (ffprobe in the usual deployment).  The serving component asks for the
//! same files over and over, and the answer only changes when the file
//! changes, so every probe goes through [`CachedProber`]:
//!
//! ```text
//! serving component ──probe(key)──► CachedProber ──hit──► ProbeCache
//!                                        │
//!                                        └─miss──► inner Prober ──► ProbeCache::set
//! ```
//!
//! The cache key is the file path *plus* its modification time, so editing or
//! replacing a file naturally misses the cache instead of returning stale
//! metadata.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::BoundedResultCache;

/// The result of one probe: an opaque JSON document produced by the probe tool.
pub type ProbeResult = serde_json::Value;

/// The cache shared between the supervisor and the serving component.
pub type ProbeCache = BoundedResultCache<ProbeKey, ProbeResult>;

/// Identity of a probe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeKey {
    /// Path of the probed media file.
    pub path: PathBuf,
    /// Modification time of the file in nanoseconds since the Unix epoch.
    pub modified_ns: u64,
}

impl ProbeKey {
    /// Creates a key from an explicit path and modification fingerprint.
    pub fn new(path: impl Into<PathBuf>, modified_ns: u64) -> Self {
        Self {
            path: path.into(),
            modified_ns,
        }
    }

    /// Builds the key for `path` from the file's current modification time.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Io`] if the file metadata cannot be read.
    pub fn for_file(path: &Path) -> Result<Self, ProbeError> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|source| ProbeError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        // Times before the epoch collapse to zero; they still identify the file.
        let modified_ns = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Ok(Self::new(path, modified_ns))
    }
}

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The file could not be inspected.
    #[error("I/O error probing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The probe tool ran but reported a failure.
    #[error("probe of {path} failed: {reason}")]
    Failed { path: PathBuf, reason: String },
}

/// Something that can extract metadata from a media file.
///
/// The production implementation shells out to the probe tool; it belongs to
/// the serving component and is outside this crate.
pub trait Prober: Send + Sync {
    /// Probes the file identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`] when the file cannot be probed.
    fn probe(&self, key: &ProbeKey) -> Result<ProbeResult, ProbeError>;
}

/// A [`Prober`] decorator that memoizes successful results in a [`ProbeCache`].
///
/// Failures are passed through and never cached, so a transient failure is
/// retried on the next request.
pub struct CachedProber<P> {
    inner: P,
    cache: Arc<ProbeCache>,
}

impl<P: Prober> CachedProber<P> {
    /// Wraps `inner`, storing results in `cache`.
    pub fn new(inner: P, cache: Arc<ProbeCache>) -> Self {
        Self { inner, cache }
    }

    /// The cache this prober reads and fills.
    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }
}

impl<P: Prober> Prober for CachedProber<P> {
    fn probe(&self, key: &ProbeKey) -> Result<ProbeResult, ProbeError> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(hit);
        }

        debug!("probe cache miss for {}", key.path.display());
        let result = self.inner.probe(key)?;
        self.cache.set(key.clone(), result.clone());
        Ok(result)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
