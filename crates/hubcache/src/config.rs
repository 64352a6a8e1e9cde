use std::ffi::OsString;
use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_REVISION: &str = "main";
pub const DEFAULT_MAX_PARALLEL: i64 = 20;

/// Settings shared by every [`Repo`](crate::Repo) built from them.
///
/// Deserializable so it can be embedded in a caller's own configuration
/// file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the hub, without a trailing `/`.
    pub endpoint: String,

    /// Root of the shared cache, e.g. `~/.cache/huggingface/hub`.
    pub cache_dir: PathBuf,

    /// Files downloaded at once per repository. Non-positive means unlimited.
    pub max_parallel: i64,

    pub revision: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_dir: cache_dir_from(|key| std::env::var_os(key)),
            max_parallel: DEFAULT_MAX_PARALLEL,
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `HF_ENDPOINT`, `HF_HUB_CACHE`, `HF_HOME` and
    /// `XDG_CACHE_HOME`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var_os(key))
    }

    fn from_vars(var: impl Fn(&str) -> Option<OsString>) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        let endpoint = var("HF_ENDPOINT")
            .map(|v| v.to_string_lossy().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Self {
            endpoint,
            cache_dir: cache_dir_from(var),
            max_parallel: DEFAULT_MAX_PARALLEL,
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

fn cache_dir_from(var: impl Fn(&str) -> Option<OsString>) -> PathBuf {
    let var = |key: &str| var(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    if let Some(dir) = var("HF_HUB_CACHE") {
        return dir;
    }
    if let Some(dir) = var("HF_HOME") {
        return dir.join("hub");
    }
    let cache = var("XDG_CACHE_HOME")
        .or_else(|| home::home_dir().map(|home| home.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"));
    cache.join("huggingface").join("hub")
}
