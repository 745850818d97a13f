//! Digest-addressed local cache store
//!
//! Each manifest digest owns one directory. The directory is a hit only once
//! its `artifacts/` subtree exists, and that subtree is moved into place by a
//! single rename after extraction finished in a staging directory.
//!
//! ```text
//! <root>/<digest-hash>/artifacts/<group-path>/<artifact>/<version>/<file>[.sha1]
//! <root>/<digest-hash>/.extracting/          (owner only, while fetching)
//! ```

use crate::cache::key::ArtifactCoordinate;
use crate::error::{ArtcacheError, ArtcacheResult};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Marker subtree holding the extracted Maven layout
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Scratch directory the owning fetch extracts into
pub const STAGING_DIR: &str = ".extracting";

/// Extension of checksum sidecar files
pub const SHA1_EXTENSION: &str = "sha1";

/// Hands out directories for cache keys.
///
/// Quotas and eviction are the allocator's concern, not the store's.
pub trait StorageAllocator: Send + Sync {
    /// A usable, creatable directory path for `key`
    fn access_directory(&self, key: &str) -> ArtcacheResult<PathBuf>;
}

/// Allocator mapping each key to a child of a fixed root
#[derive(Debug, Clone)]
pub struct DirectoryAllocator {
    root: PathBuf,
}

impl DirectoryAllocator {
    /// Create the allocator, creating `root` if needed
    pub fn new(root: impl Into<PathBuf>) -> ArtcacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            ArtcacheError::io(format!("creating cache root {}", root.display()), e)
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageAllocator for DirectoryAllocator {
    fn access_directory(&self, key: &str) -> ArtcacheResult<PathBuf> {
        Ok(self.root.join(key))
    }
}

/// State of a digest directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Nothing on disk
    Miss,
    /// Directory exists without the artifacts subtree (crashed or failed fetch)
    Partial,
    /// Fully extracted, immutable
    Complete,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::Partial => write!(f, "partial"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Filesystem view of cached digests
#[derive(Clone)]
pub struct LocalCacheStore {
    allocator: Arc<dyn StorageAllocator>,
}

impl LocalCacheStore {
    pub fn new(allocator: Arc<dyn StorageAllocator>) -> Self {
        Self { allocator }
    }

    /// Directory owned by `digest_hash`
    pub fn entry_dir(&self, digest_hash: &str) -> ArtcacheResult<PathBuf> {
        self.allocator.access_directory(digest_hash)
    }

    /// Current state of the entry for `digest_hash`
    pub fn state(&self, digest_hash: &str) -> ArtcacheResult<EntryState> {
        let dir = self.entry_dir(digest_hash)?;
        Ok(if dir.join(ARTIFACTS_DIR).is_dir() {
            EntryState::Complete
        } else if dir.is_dir() {
            EntryState::Partial
        } else {
            EntryState::Miss
        })
    }

    /// Root of the extracted artifacts if the entry is complete
    pub fn lookup(&self, digest_hash: &str) -> ArtcacheResult<Option<PathBuf>> {
        match self.state(digest_hash)? {
            EntryState::Complete => {
                debug!("Local cache hit for {}", digest_hash);
                Ok(Some(self.entry_dir(digest_hash)?.join(ARTIFACTS_DIR)))
            }
            state => {
                debug!("Local cache {} for {}", state, digest_hash);
                Ok(None)
            }
        }
    }

    /// Prepare a clean staging directory for the owning fetch.
    ///
    /// Leftovers from an earlier failed or crashed fetch are discarded.
    pub fn stage(&self, digest_hash: &str) -> ArtcacheResult<Staging> {
        let entry_dir = self.entry_dir(digest_hash)?;
        let dir = entry_dir.join(STAGING_DIR);

        if dir.exists() {
            debug!("Removing stale staging directory {}", dir.display());
            fs::remove_dir_all(&dir).map_err(|e| {
                ArtcacheError::io(format!("removing stale staging dir {}", dir.display()), e)
            })?;
        }
        fs::create_dir_all(&dir).map_err(|e| {
            ArtcacheError::io(format!("creating staging dir {}", dir.display()), e)
        })?;

        Ok(Staging { entry_dir, dir })
    }
}

/// Scratch space for one fetch of one digest
#[derive(Debug)]
pub struct Staging {
    entry_dir: PathBuf,
    dir: PathBuf,
}

impl Staging {
    /// Directory to download and extract into
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Move the extracted `artifacts/` subtree into place.
    ///
    /// Returns `None` when the archive had no `artifacts/` root.
    pub fn commit(self) -> ArtcacheResult<Option<PathBuf>> {
        let extracted = self.dir.join(ARTIFACTS_DIR);
        if !extracted.is_dir() {
            warn!(
                "Archive extracted into {} has no {}/ directory",
                self.entry_dir.display(),
                ARTIFACTS_DIR
            );
            return Ok(None);
        }

        let target = self.entry_dir.join(ARTIFACTS_DIR);
        fs::rename(&extracted, &target).map_err(|e| {
            ArtcacheError::io(format!("publishing {}", target.display()), e)
        })?;

        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!("Failed to remove staging dir {}: {}", self.dir.display(), e);
        }
        Ok(Some(target))
    }
}

/// Location of a coordinate's file under an artifacts root, if present.
///
/// Only regular files count; a symlink at the path is not followed.
pub fn resolve_file(artifacts_root: &Path, coordinate: &ArtifactCoordinate) -> Option<PathBuf> {
    let path = artifacts_root.join(coordinate.repository_path());
    is_regular_file(&path).then_some(path)
}

/// Read the `<file>.sha1` sidecar, trimmed
pub fn read_sha1(file: &Path) -> ArtcacheResult<Option<String>> {
    let mut sidecar = file.as_os_str().to_owned();
    sidecar.push(".");
    sidecar.push(SHA1_EXTENSION);
    let sidecar = PathBuf::from(sidecar);

    if !is_regular_file(&sidecar) {
        return Ok(None);
    }
    let content = fs::read_to_string(&sidecar)
        .map_err(|e| ArtcacheError::io(format!("reading {}", sidecar.display()), e))?;
    Ok(Some(content.trim().to_string()))
}

fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_file())
}
