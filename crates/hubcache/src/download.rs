//! Batch download of repository files into the shared cache.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use hubcache_fetch::{Fetcher, Gate, HttpClient, Progress};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::progress::BatchProgress;
use crate::repo::Repo;
use crate::store::CacheStore;

/// One file that is not in the snapshot yet.
struct Job {
    slot: usize,
    name: String,
    url: String,
    snapshot: PathBuf,
}

/// State shared by every worker of one batch.
struct Batch<C: HttpClient> {
    repo_id: String,
    fetcher: Fetcher<Arc<C>>,
    gate: Gate,
    store: CacheStore,
    cancel: CancellationToken,
    progress: BatchProgress,
}

impl<C: HttpClient + 'static> Repo<C> {
    /// Download `names` at the resolved commit and return their snapshot
    /// paths, in the order given.
    ///
    /// Files already in the snapshot are not probed. The others are fetched
    /// concurrently, bounded by the repository's [`Gate`]. The first failure
    /// cancels the rest of the batch; files completed before it stay cached.
    ///
    /// The returned paths are shared with other processes and must be
    /// treated as read-only.
    pub async fn download_files<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<PathBuf>> {
        self.download_files_until(names, &CancellationToken::new())
            .await
    }

    /// [`download_files`](Self::download_files), also stopping when `cancel`
    /// fires. Resolving the revision observes `cancel` too.
    pub async fn download_files_until<S: AsRef<str>>(
        &mut self,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let commit = self
            .resolve_info_until(false, cancel)
            .await?
            .commit_hash
            .clone();
        let store = self.store();

        let mut paths = Vec::with_capacity(names.len());
        let mut jobs = Vec::new();
        for (slot, name) in names.iter().enumerate() {
            let name = name.as_ref();
            let snapshot = store.snapshot_path(&commit, name).map_err(|_| Error::InvalidFileName {
                repo: self.id.clone(),
                name: name.to_string(),
            })?;

            if hubcache_fs::exists(&snapshot) {
                debug!(file = name, "cached");
            } else {
                jobs.push(Job {
                    slot,
                    name: name.to_string(),
                    url: self.resolve_url(&commit, name),
                    snapshot: snapshot.clone(),
                });
            }
            paths.push(snapshot);
        }

        if jobs.is_empty() {
            return Ok(paths);
        }

        let progress = BatchProgress::new(names.len());
        let batch = Arc::new(Batch {
            repo_id: self.id.clone(),
            fetcher: self.fetcher(),
            gate: self.gate.clone(),
            store,
            cancel: cancel.child_token(),
            progress: if self.progress_bar {
                progress.with_spinner()
            } else {
                progress
            },
        });

        // Workers are detached tasks; stop them if this future is dropped.
        let _stop_workers = batch.cancel.clone().drop_guard();
        let mut workers: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|job| tokio::spawn(Arc::clone(&batch).run(job)))
            .collect();

        let mut first_error = None;
        while let Some(joined) = workers.next().await {
            let outcome = joined.map_err(Error::from).and_then(|result| result);
            let Err(e) = outcome else { continue };

            if first_error.is_none() {
                debug!(repo = %self.id, error = %e, "batch failed, cancelling");
                batch.cancel.cancel();
                batch.progress.fail();
                first_error = Some(e);
            } else if e.is_cancelled() {
                debug!(repo = %self.id, "worker stopped");
            } else {
                warn!(repo = %self.id, error = %e, "worker failed after batch error");
            }
        }

        batch.progress.finish(first_error.as_ref());
        match first_error {
            Some(e) => Err(e),
            None => Ok(paths),
        }
    }

    /// Shortcut for a single file.
    pub async fn download_file(&mut self, name: &str) -> Result<PathBuf> {
        let mut paths = self.download_files(&[name]).await?;
        paths.pop().ok_or_else(|| Error::InvalidFileName {
            repo: self.id.clone(),
            name: name.to_string(),
        })
    }
}

impl<C: HttpClient> Batch<C> {
    async fn run(self: Arc<Self>, job: Job) -> Result<()> {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(hubcache_fetch::Error::Cancelled.into()),
            permit = self.gate.acquire() => permit,
        };

        let metadata = self.fetcher.probe(&job.url, &self.cancel).await?;
        if metadata.etag.is_empty() {
            return Err(Error::MissingContentTag {
                file: job.name,
                repo: self.repo_id.clone(),
            });
        }
        if metadata.is_redirected_from(&job.url) {
            return Err(Error::UnsafeRedirect {
                file: job.name,
                from: job.url,
                to: metadata.location,
            });
        }

        let blob = self.store.blob_path(&metadata.etag)?;
        if hubcache_fs::exists(&blob) {
            debug!(file = %job.name, etag = %metadata.etag, "blob already cached");
        } else {
            self.progress.download_required();
            let progress = &self.progress;
            let slot = job.slot;
            let report = move |p: &Progress| progress.record(slot, p.bytes_downloaded);
            let report: &(dyn Fn(&Progress) + Send + Sync) = &report;
            self.fetcher
                .fetch(&job.url, &blob, false, &self.cancel, Some(report))
                .await?;
            self.progress.file_completed();
        }

        self.store.link_snapshot(&job.snapshot, &blob)?;
        debug!(file = %job.name, snapshot = %job.snapshot.display(), "linked");
        Ok(())
    }
}
