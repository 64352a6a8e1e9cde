use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{FileMetadata, is_redirect, is_success};
use crate::data::{FetchOptions, FetchPhase, Progress, ProgressFn};
use crate::effects::http::HttpClient;
use crate::effects::lock::with_exclusive;
use crate::error::{Error, Result};

/// Downloads single files to their final location under a per-destination lock.
///
/// The destination only ever appears complete: bytes are streamed into a
/// `.downloading` sibling which is renamed into place once synced.
pub struct Fetcher<C: HttpClient> {
    client: C,
    options: FetchOptions,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(client: C) -> Self {
        Self::with_options(client, FetchOptions::default())
    }

    pub fn with_options(client: C, options: FetchOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Header-only request for `url`. Redirects are reported, not followed.
    pub async fn probe(&self, url: &str, cancel: &CancellationToken) -> Result<FileMetadata> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let headers = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.head(url, &self.options.headers) => {
                response.map_err(Error::network(url))?
            }
        };

        if !is_success(headers.status) && !is_redirect(headers.status) {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: headers.status,
            });
        }

        let metadata = FileMetadata::from_headers(&headers, url);
        debug!(url, etag = %metadata.etag, size = metadata.size, "probed");
        Ok(metadata)
    }

    /// Download `url` to `dest` unless `dest` already exists.
    ///
    /// With `force_refresh` an existing `dest` is deleted first. Concurrent
    /// callers for the same `dest`, in this process or another, serialize on
    /// `dest.lock`; the ones that lose the race find the file in place and
    /// return without transferring anything. The lock file is removed once
    /// `dest` is in place and kept after a failure.
    ///
    /// `on_progress` may borrow from the caller; it is only used during this
    /// call.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        force_refresh: bool,
        cancel: &CancellationToken,
        on_progress: Option<&(dyn Fn(&Progress) + Send + Sync)>,
    ) -> Result<()> {
        let reporter = Reporter {
            shared: self.options.on_progress.as_deref(),
            call: on_progress,
        };

        if hubcache_fs::exists(dest) {
            if !force_refresh {
                debug!(path = %dest.display(), "already present");
                reporter.report(FetchPhase::Completed, 0, None);
                return Ok(());
            }
            tokio::fs::remove_file(dest).await.map_err(Error::io(dest))?;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::io(parent))?;
        }

        reporter.report(FetchPhase::Connecting, 0, None);

        let lock_path = hubcache_fs::with_suffix(dest, ".lock");
        let lock_ref = lock_path.as_path();
        let reporter = &reporter;
        with_exclusive(lock_ref, cancel, self.options.lock_backoff, move || async move {
            let result = if hubcache_fs::exists(dest) {
                debug!(path = %dest.display(), "fetched by another holder");
                reporter.report(FetchPhase::Completed, 0, None);
                Ok(())
            } else {
                self.download(url, dest, cancel, reporter).await
            };

            // Waiters that already opened the lock file keep locking that inode,
            // so it may only go once `dest` is in place.
            if result.is_ok() {
                if let Err(e) = tokio::fs::remove_file(lock_ref).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %lock_ref.display(), error = %e, "failed to remove lock file");
                    }
                }
            }
            result
        })
        .await
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> Result<()> {
        let tmp = hubcache_fs::with_suffix(dest, ".downloading");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(Error::io(&tmp))?;

        let written = self
            .write_body(url, &tmp, &mut file, cancel, reporter)
            .await;
        drop(file);

        let committed = match written {
            Ok((bytes, total)) => {
                reporter.report(FetchPhase::Committing, bytes, total);
                tokio::fs::rename(&tmp, dest)
                    .await
                    .map_err(Error::io(dest))
                    .map(|()| (bytes, total))
            }
            Err(e) => Err(e),
        };

        match committed {
            Ok((bytes, total)) => {
                debug!(url, path = %dest.display(), bytes, "downloaded");
                reporter.report(FetchPhase::Completed, bytes, total);
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %tmp.display(), error = %cleanup, "failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }

    async fn write_body(
        &self,
        url: &str,
        tmp: &Path,
        file: &mut tokio::fs::File,
        cancel: &CancellationToken,
        reporter: &Reporter<'_>,
    ) -> Result<(u64, Option<u64>)> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.stream(url, &self.options.headers) => {
                response.map_err(Error::network(url))?
            }
        };

        if !is_success(response.status) {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        let total = response.content_length;
        let mut body = response.body;
        let mut bytes = 0u64;
        reporter.report(FetchPhase::Downloading, bytes, total);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(Error::network(url))?;

            file.write_all(&chunk).await.map_err(Error::io(tmp))?;
            bytes += chunk.len() as u64;
            reporter.report(FetchPhase::Downloading, bytes, total);
        }

        file.flush().await.map_err(Error::io(tmp))?;
        file.sync_all().await.map_err(Error::io(tmp))?;
        Ok((bytes, total))
    }
}

/// Fans a progress update out to the fetcher-wide and the per-call callback.
struct Reporter<'a> {
    shared: Option<&'a ProgressFn>,
    call: Option<&'a (dyn Fn(&Progress) + Send + Sync + 'a)>,
}

impl Reporter<'_> {
    fn report(&self, phase: FetchPhase, bytes: u64, total: Option<u64>) {
        if self.shared.is_none() && self.call.is_none() {
            return;
        }
        let progress = Progress::new(phase, bytes, total);
        for callback in [self.shared, self.call].into_iter().flatten() {
            callback(&progress);
        }
    }
}
