//! On-disk layout of one repository inside the shared cache.
//!
//! ```text
//! <cache>/models--org--name/
//! ├── blobs/<etag>
//! ├── info/<revision>
//! ├── refs/<revision>
//! └── snapshots/<commit>/<path> -> ../../blobs/<etag>
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::repo::RepoType;

pub const REPO_ID_SEPARATOR: &str = "--";

/// Paths of one repository's cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    repo_dir: PathBuf,
}

impl CacheStore {
    pub fn new(cache_root: impl AsRef<Path>, repo_type: RepoType, id: &str) -> Self {
        Self {
            repo_dir: cache_root.as_ref().join(flat_folder_name(repo_type, id)),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Where the content with tag `etag` is stored.
    pub fn blob_path(&self, etag: &str) -> Result<PathBuf> {
        let etag = hubcache_fs::check_file_name(etag)?;
        Ok(self.repo_dir.join("blobs").join(etag))
    }

    pub fn snapshot_dir(&self, commit: &str) -> Result<PathBuf> {
        let commit = hubcache_fs::check_file_name(commit)?;
        Ok(self.repo_dir.join("snapshots").join(commit))
    }

    /// Where the repository file `name` appears for `commit`. `name` is
    /// confined to the snapshot directory.
    pub fn snapshot_path(&self, commit: &str, name: &str) -> Result<PathBuf> {
        let relative = hubcache_fs::clean_relative_path(name)?;
        Ok(self.snapshot_dir(commit)?.join(relative))
    }

    /// Revisions may be branch names with slashes, such as `refs/pr/1`.
    pub fn ref_path(&self, revision: &str) -> Result<PathBuf> {
        Ok(self
            .repo_dir
            .join("refs")
            .join(hubcache_fs::clean_relative_path(revision)?))
    }

    pub fn info_path(&self, revision: &str) -> Result<PathBuf> {
        Ok(self
            .repo_dir
            .join("info")
            .join(hubcache_fs::clean_relative_path(revision)?))
    }

    /// The commit last recorded for `revision`, if any.
    pub fn read_ref(&self, revision: &str) -> Result<Option<String>> {
        let path = self.ref_path(revision)?;
        match std::fs::read_to_string(&path) {
            Ok(commit) => Ok(Some(commit.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    /// Record `commit` for `revision`. Returns whether the file changed.
    pub fn write_ref(&self, revision: &str, commit: &str) -> Result<bool> {
        if self.read_ref(revision)?.as_deref() == Some(commit) {
            return Ok(false);
        }
        let path = self.ref_path(revision)?;
        hubcache_fs::atomic_write(&path, commit.as_bytes())?;
        debug!(revision, commit, "updated ref");
        Ok(true)
    }

    /// Point `snapshot` at `blob`, replacing whatever was there.
    pub fn link_snapshot(&self, snapshot: &Path, blob: &Path) -> Result<()> {
        hubcache_fs::link_relative(snapshot, blob)?;
        Ok(())
    }
}

/// `models--google--gemma-2-2b-it` for the model `google/gemma-2-2b-it`.
pub fn flat_folder_name(repo_type: RepoType, id: &str) -> String {
    std::iter::once(repo_type.as_str())
        .chain(id.split('/'))
        .collect::<Vec<_>>()
        .join(REPO_ID_SEPARATOR)
}
