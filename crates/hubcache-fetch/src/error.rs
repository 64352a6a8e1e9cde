//! Error types for hubcache-fetch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] hubcache_fs::Error),

    #[error("file I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn network<E: std::error::Error>(url: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }

    /// Whether this error only reflects the cancellation of the surrounding work.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
