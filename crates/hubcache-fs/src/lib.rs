//! Filesystem primitives for a content-addressed cache shared between processes.
//!
//! - [`FileLock`]: exclusive advisory lock keyed by a path
//! - [`link_relative`]: snapshot links that survive moving the cache
//! - [`clean_relative_path`]: confinement of untrusted repository file names
//! - [`atomic_write`]: small files replaced through a temporary sibling

mod error;
mod link;
mod lock;
mod sanitize;

pub use error::{Error, Result};
pub use link::{link_relative, relative_path};
pub use lock::FileLock;
pub use sanitize::{check_file_name, clean_relative_path};

use error::io_at;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `path` with `suffix` appended to its final component, e.g. `blob` → `blob.lock`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Whether something readable exists at `path`. Dangling links count as absent.
pub fn exists(path: impl AsRef<Path>) -> bool {
    std::fs::metadata(path).is_ok()
}

/// Write `content` to a hidden sibling of `path`, then rename it into place.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new(""));
    if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(io_at(parent))?;
    }

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let written = std::fs::write(&tmp_path, content)
        .map_err(io_at(&tmp_path))
        .and_then(|()| std::fs::rename(&tmp_path, path).map_err(io_at(path)));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    written
}
