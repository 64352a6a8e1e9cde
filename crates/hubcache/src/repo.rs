use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hubcache_fetch::{FetchOptions, Fetcher, Gate, HttpClient, LockBackoff};
use serde::Deserialize;

use crate::config::HubConfig;
use crate::info::RepoInfo;
use crate::store::CacheStore;

/// Kind of repository on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    #[default]
    Model,
    Dataset,
    Space,
}

impl RepoType {
    /// Plural form used in API paths and cache folder names.
    pub fn as_str(self) -> &'static str {
        match self {
            RepoType::Model => "models",
            RepoType::Dataset => "datasets",
            RepoType::Space => "spaces",
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository on the hub, pinned to a revision, with its local cache.
///
/// Build it with [`Repo::new`] (or [`Repo::with_client`] for a custom
/// [`HttpClient`]) and adjust it with the `with_*` methods:
///
/// ```no_run
/// # async fn run() -> hubcache::Result<()> {
/// use hubcache::{Repo, Session};
///
/// let session = Session::new();
/// let mut repo = Repo::new("google/gemma-2-2b-it", &session)?
///     .with_auth("hf_token")
///     .with_progress_bar(true);
/// let names = repo.file_names().await?;
/// let paths = repo.download_files(&names).await?;
/// # Ok(())
/// # }
/// ```
pub struct Repo<C: HttpClient> {
    pub(crate) id: String,
    pub(crate) repo_type: RepoType,
    pub(crate) revision: String,
    pub(crate) endpoint: String,
    pub(crate) auth_token: Option<String>,
    pub(crate) cache_dir: PathBuf,
    pub(crate) gate: Gate,
    pub(crate) progress_bar: bool,
    pub(crate) lock_backoff: LockBackoff,
    pub(crate) client: Arc<C>,
    pub(crate) info: Option<RepoInfo>,
}

#[cfg(feature = "reqwest")]
impl Repo<hubcache_fetch::ReqwestClient> {
    /// Repository `id` (e.g. `owner/name`) configured from the environment.
    pub fn new(id: impl Into<String>, session: &crate::Session) -> crate::Result<Self> {
        Self::from_config(id, &HubConfig::from_env(), session)
    }

    pub fn from_config(
        id: impl Into<String>,
        config: &HubConfig,
        session: &crate::Session,
    ) -> crate::Result<Self> {
        let client = hubcache_fetch::ReqwestClient::new(session.user_agent())
            .map_err(|e| crate::Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(id, config, client))
    }
}

impl<C: HttpClient> Repo<C> {
    pub fn with_client(id: impl Into<String>, config: &HubConfig, client: C) -> Self {
        Self {
            id: id.into(),
            repo_type: RepoType::default(),
            revision: config.revision.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: None,
            cache_dir: config.cache_dir.clone(),
            gate: Gate::new(config.max_parallel),
            progress_bar: false,
            lock_backoff: LockBackoff::default(),
            client: Arc::new(client),
            info: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, repo_type: RepoType) -> Self {
        self.repo_type = repo_type;
        self.info = None;
        self
    }

    /// Branch, tag or commit hash to resolve. Defaults to `main`.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self.info = None;
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self.info = None;
        self
    }

    /// Bearer token sent with every request. An empty token disables
    /// authentication.
    #[must_use]
    pub fn with_auth(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth_token = (!token.is_empty()).then_some(token);
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self.info = None;
        self
    }

    /// Give this repository its own gate admitting `max_parallel` files at
    /// once. Non-positive means unlimited.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: i64) -> Self {
        self.gate = Gate::new(max_parallel);
        self
    }

    /// Share `gate` with other repositories so that their downloads count
    /// against one limit.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    /// Show a terminal spinner while files download. Off by default.
    #[must_use]
    pub fn with_progress_bar(mut self, progress_bar: bool) -> Self {
        self.progress_bar = progress_bar;
        self
    }

    #[must_use]
    pub fn with_lock_backoff(mut self, lock_backoff: LockBackoff) -> Self {
        self.lock_backoff = lock_backoff;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repo_type(&self) -> RepoType {
        self.repo_type
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> CacheStore {
        CacheStore::new(&self.cache_dir, self.repo_type, &self.id)
    }

    /// `GET` endpoint describing the repository at its revision.
    pub fn info_url(&self) -> String {
        format!(
            "{}/api/{}/{}/revision/{}",
            self.endpoint, self.repo_type, self.id, self.revision
        )
    }

    pub(crate) fn resolve_url(&self, commit: &str, name: &str) -> String {
        match self.repo_type {
            RepoType::Model => format!("{}/{}/resolve/{}/{}", self.endpoint, self.id, commit, name),
            other => format!(
                "{}/{}/{}/resolve/{}/{}",
                self.endpoint, other, self.id, commit, name
            ),
        }
    }

    pub(crate) fn fetcher(&self) -> Fetcher<Arc<C>> {
        let mut options = FetchOptions::default().lock_backoff(self.lock_backoff);
        if let Some(token) = &self.auth_token {
            options = options.header("Authorization", format!("Bearer {token}"));
        }
        Fetcher::with_options(Arc::clone(&self.client), options)
    }
}

impl<C: HttpClient> fmt::Display for Repo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl<C: HttpClient> fmt::Debug for Repo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repo")
            .field("id", &self.id)
            .field("repo_type", &self.repo_type)
            .field("revision", &self.revision)
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.auth_token.is_some())
            .field("cache_dir", &self.cache_dir)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
