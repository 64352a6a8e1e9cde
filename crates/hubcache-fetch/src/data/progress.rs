use crate::data::options::FetchPhase;

/// State of a single download, passed to progress callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: FetchPhase,

    /// Cumulative bytes written to the temporary file.
    pub bytes_downloaded: u64,

    /// Total expected bytes, if the server declared a length.
    pub total_bytes: Option<u64>,
}

impl Progress {
    pub(crate) fn new(phase: FetchPhase, bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            phase,
            bytes_downloaded,
            total_bytes,
        }
    }
}
