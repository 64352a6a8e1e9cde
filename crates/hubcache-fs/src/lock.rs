use crate::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a file, shared with every other process that
/// locks the same path.
///
/// The lock is released when the guard is dropped. The lock file itself is
/// left on disk: removing it is up to whoever knows no further caller needs it.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    fn open(path: &Path) -> Result<File> {
        File::options()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| Error::Lock {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Try once to take the lock. Returns `Ok(None)` if someone else holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = Self::open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(Error::Lock {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to unlock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.lock");

        let held = FileLock::try_acquire(&path).unwrap().expect("first lock");
        assert!(FileLock::try_acquire(&path).unwrap().is_none());

        drop(held);
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_lock_file_survives_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("info.lock");

        {
            let lock = FileLock::try_acquire(&path).unwrap().unwrap();
            assert_eq!(lock.path(), path.as_path());
        }
        assert!(path.exists());
    }

    #[test]
    fn test_missing_parent_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("x.lock");

        let err = FileLock::try_acquire(&path).unwrap_err();
        assert!(matches!(err, Error::Lock { .. }));
    }
}
