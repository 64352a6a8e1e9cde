//! Waiting on cross-process file locks without blocking the runtime.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use hubcache_fs::FileLock;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::data::LockBackoff;
use crate::error::{Error, Result};

fn next_delay(backoff: LockBackoff) -> Duration {
    if backoff.max <= backoff.min {
        return backoff.min;
    }
    rand::thread_rng().gen_range(backoff.min..=backoff.max)
}

/// Take the exclusive lock at `path`, polling while another holder has it.
///
/// There is no timeout: the wait ends when the lock is acquired or when
/// `cancel` fires, whichever comes first.
pub async fn acquire_exclusive(
    path: &Path,
    cancel: &CancellationToken,
    backoff: LockBackoff,
) -> Result<FileLock> {
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(lock) = FileLock::try_acquire(path)? {
            return Ok(lock);
        }

        let delay = next_delay(backoff);
        debug!(path = %path.display(), ?delay, "lock held elsewhere, waiting");
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Run `f` while holding the exclusive lock at `path`.
///
/// The lock is released when `f` completes, whether it succeeded or not.
pub async fn with_exclusive<F, Fut, T>(
    path: &Path,
    cancel: &CancellationToken,
    backoff: LockBackoff,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let _lock = acquire_exclusive(path, cancel, backoff).await?;
    f().await
}
