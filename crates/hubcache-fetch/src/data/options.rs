use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::progress::Progress;

/// Progress callback shared between the fetcher and its callers.
pub type ProgressFn = dyn Fn(&Progress) + Send + Sync;

/// Phases of a single download.
///
/// Connecting → Downloading → Committing → Completed. A download that finds
/// its destination already in place jumps straight to Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPhase {
    /// Waiting for the destination lock or the first response bytes.
    #[default]
    Connecting,

    /// Streaming the body into the temporary sibling file.
    Downloading,

    /// Renaming the temporary file onto the destination.
    Committing,

    Completed,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPhase::Connecting => write!(f, "Connecting"),
            FetchPhase::Downloading => write!(f, "Downloading"),
            FetchPhase::Committing => write!(f, "Committing"),
            FetchPhase::Completed => write!(f, "Completed"),
        }
    }
}

/// Interval range used to poll a destination lock held by another process.
///
/// Each retry sleeps a uniformly random duration in `[min, max]`, so that
/// competing processes do not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockBackoff {
    pub min: Duration,
    pub max: Duration,
}

impl Default for LockBackoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(2),
        }
    }
}

/// Configuration shared by every request a [`Fetcher`](crate::Fetcher) makes.
///
/// # Examples
///
/// ```
/// use hubcache_fetch::FetchOptions;
///
/// let options = FetchOptions::default()
///     .header("Authorization", "Bearer token")
///     .header("User-Agent", "MyApp/1.0");
/// assert_eq!(options.headers.len(), 2);
/// ```
#[derive(Clone)]
pub struct FetchOptions {
    /// Headers sent with every probe and download.
    pub headers: Arc<[(String, String)]>,

    /// How to poll a destination lock that another process holds.
    pub lock_backoff: LockBackoff,

    /// Invoked for every download this fetcher performs, in addition to any
    /// per-call callback.
    pub on_progress: Option<Arc<ProgressFn>>,
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("FetchOptions")
            .field("headers", &names)
            .field("lock_backoff", &self.lock_backoff)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: Arc::new([]),
            lock_backoff: LockBackoff::default(),
            on_progress: None,
        }
    }
}

impl FetchOptions {
    /// Add a single HTTP header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers: Vec<_> = self.headers.iter().cloned().collect();
        headers.push((key.into(), value.into()));
        self.headers = Arc::from(headers);
        self
    }

    #[must_use]
    pub fn lock_backoff(mut self, lock_backoff: LockBackoff) -> Self {
        self.lock_backoff = lock_backoff;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, on_progress: Arc<ProgressFn>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }
}
