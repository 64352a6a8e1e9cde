use std::collections::HashMap;

pub const HEADER_REPO_COMMIT: &str = "x-repo-commit";
pub const HEADER_LINKED_ETAG: &str = "x-linked-etag";
pub const HEADER_LINKED_SIZE: &str = "x-linked-size";
pub const HEADER_ETAG: &str = "etag";
pub const HEADER_LOCATION: &str = "location";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";

/// Response headers of a header-only probe, with lower-cased names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteHeaders {
    pub status: u16,
    headers: HashMap<String, String>,
}

impl RemoteHeaders {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive lookup; empty values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// What a probe tells about one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Strong identity of the content, used as the blob name. Empty if the
    /// server sent none.
    pub etag: String,

    /// Where the content actually lives; the requested URL unless the server
    /// redirected.
    pub location: String,

    /// Declared size in bytes, 0 if unknown.
    pub size: u64,

    /// Commit the file was resolved at, if the server said so.
    pub commit_hash: Option<String>,
}

impl FileMetadata {
    /// Extract metadata from probe headers.
    ///
    /// `X-Linked-Etag` wins over `ETag` and `X-Linked-Size` over
    /// `Content-Length`, since for large files the former describe the stored
    /// object rather than the pointer returned by the server.
    pub fn from_headers(headers: &RemoteHeaders, url: &str) -> Self {
        let etag = headers
            .get(HEADER_LINKED_ETAG)
            .or_else(|| headers.get(HEADER_ETAG))
            .map(normalize_etag)
            .unwrap_or_default();

        let location = headers.get(HEADER_LOCATION).unwrap_or(url).to_string();

        let size = headers
            .get(HEADER_LINKED_SIZE)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&n| n > 0)
            .or_else(|| {
                headers
                    .get(HEADER_CONTENT_LENGTH)
                    .and_then(|s| s.trim().parse::<u64>().ok())
            })
            .unwrap_or(0);

        Self {
            etag,
            location,
            size,
            commit_hash: headers.get(HEADER_REPO_COMMIT).map(str::to_string),
        }
    }

    /// Whether fetching `url` would actually be served from another location.
    pub fn is_redirected_from(&self, url: &str) -> bool {
        self.location != url
    }
}

/// Strip the weak marker and surrounding quotes: `W/"abc"` → `abc`.
pub fn normalize_etag(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    raw.trim_matches('"').to_string()
}
