//! End-to-end tests of revision resolution and batch downloads against an
//! in-memory hub.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use hubcache::{Error, Gate, HttpClient, HubConfig, LockBackoff, Repo, RepoType};
use hubcache_fetch::{BoxStream, HttpResponse, RemoteHeaders};
use hubcache_fs::FileLock;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

const ENDPOINT: &str = "https://hub.test";
const REPO: &str = "org/model";
const COMMIT: &str = "abc123";

#[derive(Debug)]
struct TestError(String);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TestError {}

#[derive(Clone)]
enum Body {
    Full(String),
    Stall(String),
}

#[derive(Clone)]
struct Probe {
    headers: RemoteHeaders,
    delay: Duration,
}

/// Serves an info document, `HEAD` probes and file bodies, counting each.
#[derive(Default)]
struct TestHub {
    bodies: Mutex<HashMap<String, Body>>,
    probes: Mutex<HashMap<String, Probe>>,
    gets: Mutex<Vec<String>>,
    heads: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn info_url() -> String {
    format!("{ENDPOINT}/api/models/{REPO}/revision/main")
}

fn file_url(name: &str) -> String {
    format!("{ENDPOINT}/{REPO}/resolve/{COMMIT}/{name}")
}

fn info_document(commit: &str, files: &[&str]) -> String {
    let siblings: Vec<String> = files
        .iter()
        .map(|f| format!("{{\"rfilename\": \"{f}\"}}"))
        .collect();
    format!(
        "{{\"id\": \"{REPO}\", \"modelId\": \"{REPO}\", \"sha\": \"{commit}\", \"siblings\": [{}]}}",
        siblings.join(", ")
    )
}

impl TestHub {
    fn new() -> Self {
        let hub = Self::default();
        hub.set_info(&info_document(COMMIT, &["config.json", "weights/model.bin"]));
        hub
    }

    fn set_info(&self, document: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(info_url(), Body::Full(document.to_string()));
    }

    fn file(self, name: &str, etag: &str, content: &str) -> Self {
        self.probe(
            name,
            RemoteHeaders::new(200)
                .with("X-Repo-Commit", COMMIT)
                .with("ETag", format!("\"{etag}\""))
                .with("Content-Length", content.len().to_string()),
            Duration::ZERO,
        );
        self.bodies
            .lock()
            .unwrap()
            .insert(file_url(name), Body::Full(content.to_string()));
        self
    }

    fn stalled_file(self, name: &str, etag: &str) -> Self {
        let hub = self.file(name, etag, "");
        hub.bodies
            .lock()
            .unwrap()
            .insert(file_url(name), Body::Stall("partial".to_string()));
        hub
    }

    fn probe(&self, name: &str, headers: RemoteHeaders, delay: Duration) {
        self.probes
            .lock()
            .unwrap()
            .insert(file_url(name), Probe { headers, delay });
    }

    fn gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HttpClient for TestHub {
    type Error = TestError;

    async fn stream(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse<TestError>, TestError> {
        self.gets.lock().unwrap().push(url.to_string());
        let body = self.bodies.lock().unwrap().get(url).cloned();

        let body: BoxStream<'static, Result<Bytes, TestError>> = match body {
            None => {
                return Ok(HttpResponse {
                    status: 404,
                    content_length: None,
                    body: Box::pin(stream::empty()),
                });
            }
            Some(Body::Full(content)) => Box::pin(stream::iter(vec![Ok(Bytes::from(content))])),
            Some(Body::Stall(first)) => Box::pin(futures_util::StreamExt::chain(
                stream::iter(vec![Ok(Bytes::from(first))]),
                stream::pending(),
            )),
        };
        Ok(HttpResponse {
            status: 200,
            content_length: None,
            body,
        })
    }

    async fn head(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<RemoteHeaders, TestError> {
        self.heads.lock().unwrap().push(url.to_string());
        self.enter();
        let probe = self.probes.lock().unwrap().get(url).cloned();
        let delay = probe.as_ref().map_or(Duration::ZERO, |p| p.delay);
        tokio::time::sleep(delay.max(Duration::from_millis(5))).await;
        self.leave();
        Ok(probe.map_or_else(|| RemoteHeaders::new(404), |p| p.headers))
    }
}

fn repo(hub: TestHub, cache: &TempDir) -> Repo<TestHub> {
    let config = HubConfig {
        endpoint: ENDPOINT.to_string(),
        cache_dir: cache.path().to_path_buf(),
        max_parallel: 20,
        revision: "main".to_string(),
    };
    Repo::with_client(REPO, &config, hub).with_lock_backoff(LockBackoff {
        min: Duration::from_millis(5),
        max: Duration::from_millis(15),
    })
}

fn repo_dir(cache: &TempDir) -> std::path::PathBuf {
    cache.path().join("models--org--model")
}

fn leftovers(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".downloading"))
        .collect()
}

#[tokio::test]
async fn test_two_files_land_in_snapshot() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new()
        .file("config.json", "e1", "{\"hidden\": 8}")
        .file("weights/model.bin", "e2", "0123456789");
    let mut repo = repo(hub, &cache);

    let paths = repo
        .download_files(&["config.json", "weights/model.bin"])
        .await
        .unwrap();

    let snapshots = repo_dir(&cache).join("snapshots").join(COMMIT);
    assert_eq!(
        paths,
        vec![
            snapshots.join("config.json"),
            snapshots.join("weights/model.bin")
        ]
    );
    assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "{\"hidden\": 8}");
    assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "0123456789");

    let blobs = repo_dir(&cache).join("blobs");
    assert!(blobs.join("e1").is_file());
    assert!(blobs.join("e2").is_file());
    assert_eq!(
        std::fs::read_to_string(repo_dir(&cache).join("refs/main")).unwrap(),
        COMMIT
    );
    assert!(repo_dir(&cache).join("info/main").is_file());

    #[cfg(unix)]
    {
        assert_eq!(
            std::fs::read_link(&paths[0]).unwrap(),
            Path::new("../../blobs/e1")
        );
        assert_eq!(
            std::fs::read_link(&paths[1]).unwrap(),
            Path::new("../../../blobs/e2")
        );
    }
    assert!(leftovers(&blobs).is_empty());
    assert_eq!(repo.commit_hash(), Some(COMMIT));
}

#[tokio::test]
async fn test_second_call_transfers_nothing() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new()
        .file("config.json", "e1", "{}")
        .file("weights/model.bin", "e2", "bin");
    let mut repo = repo(hub, &cache);
    let names = ["config.json", "weights/model.bin"];

    let first = repo.download_files(&names).await.unwrap();
    let gets = repo.client().gets().len();
    let heads = repo.client().heads().len();
    assert_eq!(gets, 3);
    assert_eq!(heads, 2);

    let second = repo.download_files(&names).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(repo.client().gets().len(), gets);
    assert_eq!(repo.client().heads().len(), heads);
}

#[tokio::test]
async fn test_cached_info_is_reused_across_handles() {
    let cache = tempdir().unwrap();
    let mut first = repo(TestHub::new().file("config.json", "e1", "{}"), &cache);
    first.download_file("config.json").await.unwrap();

    let mut second = repo(TestHub::new().file("config.json", "e1", "{}"), &cache);
    let path = second.download_file("config.json").await.unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    assert!(second.client().gets().is_empty());
    assert!(second.client().heads().is_empty());
}

#[tokio::test]
async fn test_shared_tag_stored_once() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new()
        .file("a/LICENSE", "same", "MIT")
        .file("b/LICENSE", "same", "MIT");
    let mut repo = repo(hub, &cache);

    let paths = repo
        .download_files(&["a/LICENSE", "b/LICENSE"])
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "MIT");
    assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "MIT");

    let blob_gets = repo
        .client()
        .gets()
        .iter()
        .filter(|u| u.contains("/resolve/"))
        .count();
    assert_eq!(blob_gets, 1);
    let blobs: Vec<_> = std::fs::read_dir(repo_dir(&cache).join("blobs"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(blobs, vec!["same"]);
}

#[tokio::test]
async fn test_empty_request_makes_no_calls() {
    let cache = tempdir().unwrap();
    let mut repo = repo(TestHub::new(), &cache);

    let paths = repo.download_files::<&str>(&[]).await.unwrap();
    assert!(paths.is_empty());
    assert!(repo.client().gets().is_empty());
    assert!(repo.client().heads().is_empty());
    assert!(!repo_dir(&cache).exists());
}

#[tokio::test]
async fn test_failing_probe_keeps_completed_files() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new()
        .file("a.txt", "ea", "alpha")
        .stalled_file("c.bin", "ec");
    hub.probe(
        "b.txt",
        RemoteHeaders::new(500),
        Duration::from_millis(100),
    );
    let mut repo = repo(hub, &cache);

    let err = repo
        .download_files(&["a.txt", "b.txt", "c.bin"])
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Fetch(hubcache_fetch::Error::HttpStatus { status: 500, ref url }) if url == &file_url("b.txt")),
        "{err}"
    );

    let snapshots = repo_dir(&cache).join("snapshots").join(COMMIT);
    assert_eq!(std::fs::read_to_string(snapshots.join("a.txt")).unwrap(), "alpha");
    assert!(!snapshots.join("c.bin").exists());
    assert!(!repo_dir(&cache).join("blobs/ec").exists());
    assert!(leftovers(&repo_dir(&cache).join("blobs")).is_empty());
}

#[tokio::test]
async fn test_missing_content_tag() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new();
    hub.probe(
        "config.json",
        RemoteHeaders::new(200).with("Content-Length", "2"),
        Duration::ZERO,
    );
    let mut repo = repo(hub, &cache);

    let err = repo.download_file("config.json").await.unwrap_err();
    assert!(
        matches!(err, Error::MissingContentTag { ref file, ref repo } if file == "config.json" && repo == REPO),
        "{err}"
    );
}

#[tokio::test]
async fn test_redirect_is_refused() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new();
    hub.probe(
        "config.json",
        RemoteHeaders::new(302)
            .with("ETag", "\"e1\"")
            .with("Location", "https://elsewhere.test/config.json"),
        Duration::ZERO,
    );
    let mut repo = repo(hub, &cache).with_auth("secret");

    let err = repo.download_file("config.json").await.unwrap_err();
    match err {
        Error::UnsafeRedirect { file, from, to } => {
            assert_eq!(file, "config.json");
            assert_eq!(from, file_url("config.json"));
            assert_eq!(to, "https://elsewhere.test/config.json");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(
        !repo
            .client()
            .gets()
            .iter()
            .any(|u| u.contains("elsewhere"))
    );
}

#[tokio::test]
async fn test_gate_bounds_concurrent_files() {
    let cache = tempdir().unwrap();
    let mut hub = TestHub::new();
    let names: Vec<String> = (0..6).map(|i| format!("shard-{i}.bin")).collect();
    for (i, name) in names.iter().enumerate() {
        hub = hub.file(name, &format!("e{i}"), "x");
    }
    let mut repo = repo(hub, &cache).with_max_parallel(2);

    repo.download_files(&names).await.unwrap();
    assert!(repo.client().max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(repo.gate().in_use(), 0);
}

#[tokio::test]
async fn test_shared_gate_across_repositories() {
    let cache = tempdir().unwrap();
    let gate = Gate::new(1);
    let mut repo = repo(TestHub::new().file("config.json", "e1", "{}"), &cache).with_gate(gate.clone());

    let held = gate.acquire().await;
    let blocked = tokio::time::timeout(Duration::from_millis(100), repo.download_file("config.json")).await;
    assert!(blocked.is_err(), "download must wait for the shared gate");

    drop(held);
    let path = repo.download_file("config.json").await.unwrap();
    assert!(path.is_file());
}

#[tokio::test]
async fn test_unsafe_names() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new().file("../../etc/passwd", "e1", "root");
    let mut repo = repo(hub, &cache);

    let err = repo.download_file("..").await.unwrap_err();
    assert!(matches!(err, Error::InvalidFileName { .. }), "{err}");

    let path = repo.download_file("../../etc/passwd").await.unwrap();
    assert_eq!(
        path,
        repo_dir(&cache).join("snapshots").join(COMMIT).join("etc/passwd")
    );
}

#[tokio::test]
async fn test_file_names_and_url() {
    let cache = tempdir().unwrap();
    let mut repo = repo(TestHub::new(), &cache);

    assert_eq!(
        repo.file_names().await.unwrap(),
        vec!["config.json", "weights/model.bin"]
    );
    assert_eq!(
        repo.file_url("config.json").await.unwrap(),
        file_url("config.json")
    );

    repo.client()
        .set_info(&info_document(COMMIT, &["ok.txt", "../escape.txt"]));
    repo.resolve_info(true).await.unwrap();
    let err = repo.file_names().await.unwrap_err();
    assert!(matches!(err, Error::InvalidFileName { ref name, .. } if name == "../escape.txt"));
}

#[tokio::test]
async fn test_refresh_updates_ref() {
    let cache = tempdir().unwrap();
    let mut repo = repo(TestHub::new(), &cache);
    let refs = repo_dir(&cache).join("refs/main");

    repo.resolve_info(false).await.unwrap();
    assert_eq!(std::fs::read_to_string(&refs).unwrap(), COMMIT);

    repo.client().set_info(&info_document("def456", &[]));
    repo.resolve_info(false).await.unwrap();
    assert_eq!(repo.commit_hash(), Some(COMMIT));

    let info = repo.resolve_info(true).await.unwrap();
    assert_eq!(info.commit_hash, "def456");
    assert_eq!(std::fs::read_to_string(&refs).unwrap(), "def456");
}

#[tokio::test]
async fn test_resolution_failures() {
    let cache = tempdir().unwrap();
    let hub = TestHub::new();
    hub.bodies.lock().unwrap().remove(&info_url());
    let mut repo = repo(hub, &cache);

    let err = repo.resolve_info(false).await.unwrap_err();
    assert!(matches!(err, Error::Resolution { ref url, .. } if url == &info_url()), "{err}");
    assert!(repo.info().is_none());

    repo.client().set_info("not json");
    let err = repo.resolve_info(false).await.unwrap_err();
    assert!(matches!(err, Error::InfoParse { .. }), "{err}");

    repo.client().set_info(&info_document(COMMIT, &[]));
    repo.resolve_info(true).await.unwrap();
    assert_eq!(repo.commit_hash(), Some(COMMIT));

    repo.client().set_info("{}");
    let err = repo.resolve_info(true).await.unwrap_err();
    assert!(matches!(err, Error::MissingCommit { .. }), "{err}");
    assert_eq!(repo.commit_hash(), Some(COMMIT));
}

#[tokio::test]
async fn test_cancel_while_info_lock_is_held() {
    let cache = tempdir().unwrap();
    let mut repo = repo(TestHub::new().file("config.json", "e1", "{}"), &cache);
    let info_dir = repo_dir(&cache).join("info");
    std::fs::create_dir_all(&info_dir).unwrap();
    let _held = FileLock::try_acquire(info_dir.join("main.lock"))
        .unwrap()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        repo.download_files_until(&["config.json"], &cancel),
    )
    .await
    .expect("cancellation must end the wait for the info lock")
    .unwrap_err();
    assert!(err.is_cancelled(), "{err}");
    assert!(matches!(err, Error::Resolution { .. }), "{err}");
    assert!(repo.info().is_none());
    assert!(repo.client().gets().is_empty());
    assert!(repo.client().heads().is_empty());
}

#[tokio::test]
async fn test_dataset_urls() {
    let cache = tempdir().unwrap();
    let mut repo = repo(TestHub::new(), &cache).with_type(RepoType::Dataset);
    assert_eq!(
        repo.info_url(),
        format!("{ENDPOINT}/api/datasets/{REPO}/revision/main")
    );
    let err = repo.resolve_info(false).await.unwrap_err();
    assert!(matches!(err, Error::Resolution { .. }));
    assert!(cache.path().join("datasets--org--model").exists());
}
