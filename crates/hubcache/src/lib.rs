//! Download files from a Hugging Face Hub repository into the cache layout
//! shared with other hub clients.
//!
//! A [`Repo`] resolves its revision to a commit, then
//! [`download_files`](Repo::download_files) fetches each requested file into
//! `blobs/<etag>` and links it from `snapshots/<commit>/<path>`. Several
//! processes may work on the same cache at once: every blob is written under
//! its own lock file and only ever appears complete.
//!
//! ```no_run
//! # async fn run() -> hubcache::Result<()> {
//! use hubcache::{Repo, Session};
//!
//! let session = Session::new();
//! let mut repo = Repo::new("google/gemma-2-2b-it", &session)?;
//! let config = repo.download_file("config.json").await?;
//! println!("{}", config.display());
//! # Ok(())
//! # }
//! ```
//!
//! Nothing is printed by default: status goes through `tracing`, so install a
//! subscriber to see it, or enable [`Repo::with_progress_bar`].

mod config;
mod download;
mod error;
mod info;
mod progress;
mod repo;
mod session;
mod store;

pub use config::{DEFAULT_ENDPOINT, DEFAULT_MAX_PARALLEL, DEFAULT_REVISION, HubConfig};
pub use error::{Error, Result};
pub use info::{FileInfo, RepoInfo, SafeTensorsInfo};
pub use progress::{BatchProgress, BatchStatus};
pub use repo::{Repo, RepoType};
pub use session::Session;
pub use store::{CacheStore, REPO_ID_SEPARATOR, flat_folder_name};

pub use hubcache_fetch::{Gate, GatePermit, HttpClient, LockBackoff};
#[cfg(feature = "reqwest")]
pub use hubcache_fetch::ReqwestClient;
