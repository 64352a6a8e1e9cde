//! Error types for hubcache.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to download repository info from {url}")]
    Resolution {
        url: String,
        #[source]
        source: hubcache_fetch::Error,
    },

    #[error("failed to parse repository info in {path:?}: {source}")]
    InfoParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("repository info from {url} does not name a commit")]
    MissingCommit { url: String },

    #[error("resource {file:?} of {repo} has no content tag, its cached copy could not be identified")]
    MissingContentTag { file: String, repo: String },

    #[error("resource {file:?} redirects from {from} to {to}, refusing to send credentials there")]
    UnsafeRedirect {
        file: String,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Fetch(#[from] hubcache_fetch::Error),

    #[error("repository {repo} contains illegal file name {name:?}")]
    InvalidFileName { repo: String, name: String },

    #[error(transparent)]
    Fs(#[from] hubcache_fs::Error),

    #[error("file I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    /// Whether this error only reports that the batch was being torn down.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Fetch(e) | Error::Resolution { source: e, .. } => e.is_cancelled(),
            _ => false,
        }
    }
}
