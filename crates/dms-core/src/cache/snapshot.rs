//! JSON snapshot persistence for [`BoundedResultCache`].
//!
//! The snapshot file is a JSON array of `{"key": ..., "value": ...}` records.
//! It is read once at startup and written once at shutdown.
//!
//! # Atomic replacement
//!
//! [`save_snapshot`] never writes to the destination path directly:
//!
//! 1. The entries are copied out of the cache (the lock is released before
//!    any I/O happens).
//! 2. They are written to a fresh temporary file *in the same directory* as
//!    the destination, so the final rename never crosses a file system.
//! 3. The temporary file is flushed and synced.
//! 4. It is renamed over the destination.  If the platform refuses to rename
//!    over an existing file, the destination is removed and the rename is
//!    retried.
//!
//! Any failure before the rename deletes the temporary file and leaves the
//! previous snapshot untouched, so a crash mid-save can at worst lose the
//! *new* data, never corrupt the old file.

use std::fs::{self, File};
use std::hash::Hash;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::{NamedTempFile, PersistError};
use thiserror::Error;
use tracing::{debug, info};

use super::{BoundedResultCache, CacheItem, ResultStore};

/// Error type for snapshot load and save operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file exists but could not be read.
    #[error("I/O error reading cache snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot file is not a valid JSON array of cache items.
    #[error("malformed cache snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The cache entries could not be encoded as JSON.
    #[error("failed to encode cache snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    /// Creating, writing or syncing the temporary file failed.
    #[error("I/O error writing cache snapshot next to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The temporary file could not be moved over the destination.
    #[error("failed to replace cache snapshot {path}: {source}")]
    Replace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Loads the snapshot at `path` into `cache` and returns the number of items
/// read.
///
/// Each item is re-inserted with [`BoundedResultCache::set`], so sizes are
/// recomputed and the capacity policy applies as usual.  A missing file is not
/// an error: the cache is left as it was and `Ok(0)` is returned.
///
/// # Errors
///
/// Returns [`SnapshotError::Read`] for I/O errors other than "not found" and
/// [`SnapshotError::Parse`] for malformed content.  The whole document is
/// parsed before anything is inserted, so on error the cache is unchanged.
pub fn load_snapshot<K, V, S>(
    cache: &BoundedResultCache<K, V, S>,
    path: &Path,
) -> Result<usize, SnapshotError>
where
    K: Serialize + DeserializeOwned + Eq + Hash + Clone,
    V: Serialize + DeserializeOwned + Clone,
    S: ResultStore<K, V>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no cache snapshot at {}; starting empty", path.display());
            return Ok(0);
        }
        Err(source) => {
            return Err(SnapshotError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let items: Vec<CacheItem<K, V>> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let count = items.len();
    for item in items {
        cache.set(item.key, item.value);
    }
    info!("added {count} items from cache snapshot {}", path.display());
    Ok(count)
}

/// Atomically writes every entry of `cache` to `path` and returns the number
/// of items saved.
///
/// # Errors
///
/// Returns [`SnapshotError::Encode`], [`SnapshotError::Write`] or
/// [`SnapshotError::Replace`].  In every error case the temporary file is
/// removed and the file previously at `path` is left untouched.
pub fn save_snapshot<K, V, S>(
    cache: &BoundedResultCache<K, V, S>,
    path: &Path,
) -> Result<usize, SnapshotError>
where
    K: Serialize + Eq + Hash + Clone,
    V: Serialize + Clone,
    S: ResultStore<K, V>,
{
    let items = cache.items();
    let write_err = |source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = temp_file_beside(path).map_err(write_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, &items).map_err(SnapshotError::Encode)?;
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;

    persist_over(tmp, path)?;
    info!("saved cache with {} items to {}", items.len(), path.display());
    Ok(items.len())
}

/// Creates a temporary file in the destination's directory, named after it.
fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "cache-snapshot".into());

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
}

/// Renames `tmp` over `path`, removing the destination and retrying once if
/// the first rename fails.
fn persist_over(tmp: NamedTempFile, path: &Path) -> Result<(), SnapshotError> {
    let replace_err = |source| SnapshotError::Replace {
        path: path.to_path_buf(),
        source,
    };

    let PersistError { error, file: tmp } = match tmp.persist(path) {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };
    debug!(
        "renaming over {} failed ({error}); removing it and retrying",
        path.display()
    );

    // Dropping `tmp` on any early return deletes the temporary file.
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(replace_err(e)),
    }
    tmp.persist(path)
        .map(|_| ())
        .map_err(|e| replace_err(e.error))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
