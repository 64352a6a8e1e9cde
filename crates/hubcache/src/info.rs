use std::collections::BTreeMap;
use std::path::Path;

use hubcache_fetch::HttpClient;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::repo::Repo;

/// Repository description served by `/api/<type>/<id>/revision/<revision>`.
///
/// Only the fields this crate uses are kept; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepoInfo {
    pub id: String,

    #[serde(rename = "modelId", alias = "model_id")]
    pub model_id: Option<String>,

    pub author: Option<String>,

    /// Commit the revision resolved to. Authoritative for the snapshot.
    #[serde(rename = "sha")]
    pub commit_hash: String,

    pub tags: Vec<String>,

    pub siblings: Vec<FileInfo>,

    pub safetensors: Option<SafeTensorsInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "rfilename")]
    pub name: String,
}

/// Parameter counts of the safetensors weights, per dtype.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SafeTensorsInfo {
    pub total: u64,
    pub parameters: BTreeMap<String, u64>,
}

impl<C: HttpClient> Repo<C> {
    /// Info resolved so far, if any.
    pub fn info(&self) -> Option<&RepoInfo> {
        self.info.as_ref()
    }

    pub fn commit_hash(&self) -> Option<&str> {
        self.info.as_ref().map(|info| info.commit_hash.as_str())
    }

    /// Resolve the revision, using the on-disk copy under `info/` when there
    /// is one. `force_refresh` downloads it again.
    ///
    /// On failure the previously resolved info, if any, is kept.
    pub async fn resolve_info(&mut self, force_refresh: bool) -> Result<&RepoInfo> {
        self.resolve_info_until(force_refresh, &CancellationToken::new())
            .await
    }

    /// [`resolve_info`](Self::resolve_info), giving up when `cancel` fires
    /// while waiting for the info lock or the download.
    pub async fn resolve_info_until(
        &mut self,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<&RepoInfo> {
        let info = match self.info.take() {
            Some(info) if !force_refresh => info,
            previous => match self.load_info(force_refresh, cancel).await {
                Ok(info) => info,
                Err(e) => {
                    self.info = previous;
                    return Err(e);
                }
            },
        };
        Ok(&*self.info.insert(info))
    }

    async fn load_info(&self, force_refresh: bool, cancel: &CancellationToken) -> Result<RepoInfo> {
        let store = self.store();
        let path = store.info_path(&self.revision)?;
        let url = self.info_url();

        self.fetcher()
            .fetch(&url, &path, force_refresh, cancel, None)
            .await
            .map_err(|source| Error::Resolution {
                url: url.clone(),
                source,
            })?;

        let info = read_info(&path).await?;
        if info.commit_hash.is_empty() {
            return Err(Error::MissingCommit { url });
        }
        hubcache_fs::check_file_name(&info.commit_hash)?;

        store.write_ref(&self.revision, &info.commit_hash)?;
        debug!(repo = %self.id, revision = %self.revision, commit = %info.commit_hash, "resolved");
        Ok(info)
    }

    /// Names of the files in the repository at the resolved commit.
    ///
    /// Fails on the first name that is absolute or contains `..`.
    pub async fn file_names(&mut self) -> Result<Vec<String>> {
        let repo = self.id.clone();
        let info = self.resolve_info(false).await?;
        info.siblings
            .iter()
            .map(|sibling| {
                let name = &sibling.name;
                if name.starts_with('/') || Path::new(name).is_absolute() || name.contains("..") {
                    Err(Error::InvalidFileName {
                        repo: repo.clone(),
                        name: name.clone(),
                    })
                } else {
                    Ok(name.clone())
                }
            })
            .collect()
    }

    /// Download URL of `name` at the resolved commit.
    pub async fn file_url(&mut self, name: &str) -> Result<String> {
        let commit = self.resolve_info(false).await?.commit_hash.clone();
        Ok(self.resolve_url(&commit, name))
    }
}

async fn read_info(path: &Path) -> Result<RepoInfo> {
    let raw = tokio::fs::read(path).await.map_err(Error::io(path))?;
    serde_json::from_slice(&raw).map_err(|source| Error::InfoParse {
        path: path.to_path_buf(),
        source,
    })
}
