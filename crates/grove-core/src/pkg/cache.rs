//! Write-once content cache for package artifacts.
//!
//! Items are keyed by `name#version`. The filesystem implementation stores a
//! BLAKE3 digest next to every item and checks it on each read.

use super::error::PkgError;
use grove_util::fs::{atomic_write, remove_path, temp_sibling};
use grove_util::hash::blake3_file;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cache key for a resolved package.
#[must_use]
pub fn item_key(name: &str, version: &str) -> String {
    format!("{name}#{version}")
}

/// Content-addressable artifact store. No eviction.
pub trait ContentCache: Send + Sync {
    fn has(&self, key: &str) -> bool;

    /// Open a stored item for reading.
    ///
    /// # Errors
    ///
    /// Returns `PKG_CACHE_INTEGRITY` if the item does not match its recorded
    /// digest (the item is removed), or `PKG_CACHE_ERROR` on I/O failure.
    fn read(&self, key: &str) -> Result<Box<dyn Read + Send>, PkgError>;

    /// Store an item by draining `contents`. Writing an existing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `PKG_CACHE_ERROR` on I/O failure.
    fn write(&self, key: &str, contents: &mut dyn Read) -> Result<(), PkgError>;
}

/// Filesystem-backed [`ContentCache`].
#[derive(Debug, Clone)]
pub struct FsContentCache {
    root: PathBuf,
}

impl FsContentCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stored item. `/` in scoped names is percent-encoded.
    #[must_use]
    pub fn item_path(&self, key: &str) -> PathBuf {
        self.root.join(key.replace('/', "%2F"))
    }

    fn digest_path(&self, key: &str) -> PathBuf {
        let mut path = self.item_path(key).into_os_string();
        path.push(".blake3");
        PathBuf::from(path)
    }

    fn evict(&self, key: &str) {
        for path in [self.item_path(key), self.digest_path(key)] {
            if let Err(e) = remove_path(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove corrupt cache item");
            }
        }
    }
}

impl ContentCache for FsContentCache {
    fn has(&self, key: &str) -> bool {
        self.item_path(key).is_file() && self.digest_path(key).is_file()
    }

    fn read(&self, key: &str) -> Result<Box<dyn Read + Send>, PkgError> {
        let item = self.item_path(key);
        let expected = fs::read_to_string(self.digest_path(key))
            .map_err(|e| PkgError::cache_error(format!("Failed to read digest for {key}: {e}")))?;
        let expected = expected.trim();

        let actual = blake3_file(&item)
            .map_err(|e| PkgError::cache_error(format!("Failed to hash {}: {e}", item.display())))?;

        if actual != expected {
            self.evict(key);
            return Err(PkgError::cache_integrity(key, expected, &actual));
        }

        let file = File::open(&item)
            .map_err(|e| PkgError::cache_error(format!("Failed to open {}: {e}", item.display())))?;
        Ok(Box::new(file))
    }

    fn write(&self, key: &str, contents: &mut dyn Read) -> Result<(), PkgError> {
        if self.has(key) {
            debug!(key, "Cache item already present");
            return Ok(());
        }

        fs::create_dir_all(&self.root).map_err(|e| {
            PkgError::cache_error(format!("Failed to create {}: {e}", self.root.display()))
        })?;

        let item = self.item_path(key);
        let temp = temp_sibling(&item);
        let result = (|| -> io::Result<()> {
            let mut file = File::create(&temp)?;
            io::copy(contents, &mut file)?;
            file.sync_all()?;
            drop(file);

            let digest = blake3_file(&temp)?;
            fs::rename(&temp, &item)?;
            atomic_write(&self.digest_path(key), digest.as_bytes())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(PkgError::cache_error(format!("Failed to cache {key}: {e}")));
        }

        debug!(key, path = %item.display(), "Cached item");
        Ok(())
    }
}
