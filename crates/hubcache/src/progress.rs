//! Progress of a batch of downloads, summed over its files.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::error::Error;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

const SPINNER_TEMPLATE: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}]";

const TICK: &str = "-\\|/ ";

/// Point-in-time totals of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStatus {
    pub bytes_downloaded: u64,

    /// Files whose content was not cached and had to be transferred.
    pub require_download: usize,

    pub completed: usize,

    pub failed: bool,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Downloaded {}/{} files, {} downloaded",
            self.completed,
            self.require_download,
            HumanBytes(self.bytes_downloaded)
        )
    }
}

struct Tally {
    per_file: Vec<u64>,
    status: BatchStatus,
    last_emit: Option<Instant>,
}

/// Shared by the workers of one batch.
///
/// Per-file callbacks report cumulative byte counts; only the growth since
/// the previous report is added to the total. Status goes to `tracing` at
/// most once per [`STATUS_INTERVAL`], and to a spinner when enabled.
pub struct BatchProgress {
    tally: Mutex<Tally>,
    spinner: Option<ProgressBar>,
}

impl BatchProgress {
    pub fn new(files: usize) -> Self {
        Self {
            tally: Mutex::new(Tally {
                per_file: vec![0; files],
                status: BatchStatus::default(),
                last_emit: None,
            }),
            spinner: None,
        }
    }

    #[must_use]
    pub fn with_spinner(mut self) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
            spinner.set_style(style.tick_chars(TICK));
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> BatchStatus {
        self.lock().status
    }

    pub fn download_required(&self) {
        self.lock().status.require_download += 1;
    }

    /// `file` has now written `cumulative` bytes in total.
    pub fn record(&self, file: usize, cumulative: u64) {
        let mut tally = self.lock();
        let Some(seen) = tally.per_file.get_mut(file) else {
            return;
        };
        let delta = cumulative.saturating_sub(*seen);
        *seen = (*seen).max(cumulative);
        tally.status.bytes_downloaded += delta;
        self.maybe_emit(tally);
    }

    pub fn file_completed(&self) {
        let mut tally = self.lock();
        tally.status.completed += 1;
        self.maybe_emit(tally);
    }

    pub fn fail(&self) {
        self.lock().status.failed = true;
    }

    /// Final status line, for batches that transferred anything.
    pub fn finish(&self, error: Option<&Error>) {
        let status = self.status();
        if status.require_download == 0 {
            if let Some(spinner) = &self.spinner {
                spinner.finish_and_clear();
            }
            return;
        }

        match error {
            Some(e) => {
                warn!(
                    completed = status.completed,
                    required = status.require_download,
                    bytes = status.bytes_downloaded,
                    error = %e,
                    "{status}: failed"
                );
                if let Some(spinner) = &self.spinner {
                    spinner.abandon_with_message(format!("{status}: error - {e}"));
                }
            }
            None => {
                info!(
                    completed = status.completed,
                    required = status.require_download,
                    bytes = status.bytes_downloaded,
                    "{status}"
                );
                if let Some(spinner) = &self.spinner {
                    spinner.finish_with_message(status.to_string());
                }
            }
        }
    }

    fn maybe_emit(&self, mut tally: MutexGuard<'_, Tally>) {
        let now = Instant::now();
        if tally
            .last_emit
            .is_some_and(|last| now.duration_since(last) < STATUS_INTERVAL)
        {
            return;
        }
        tally.last_emit = Some(now);
        let status = tally.status;
        drop(tally);

        info!(
            completed = status.completed,
            required = status.require_download,
            bytes = status.bytes_downloaded,
            "{status}"
        );
        if let Some(spinner) = &self.spinner {
            spinner.set_message(status.to_string());
        }
    }
}
