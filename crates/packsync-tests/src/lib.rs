//! Shared fixtures for packsync integration tests
//!
//! Builders for on-disk pack release snapshots and a fault-injecting source
//! adapter wrapper, so scenario tests can exercise the full sync pipeline
//! against realistic layouts.

use async_trait::async_trait;
use packsync_manifest::{FileEntry, Manifest, PackmodeGraph};
use packsync_sync::source::MANIFEST_FILE_NAME;
use packsync_types::{
    ByteStream, Error, Identity, Origin, Packmode, RelPath, Result, SourceAdapter,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// One file of a release fixture: path, content, packmode tags
pub type ReleaseFile<'a> = (&'a str, &'a [u8], &'a [&'a str]);

/// Build a pack release snapshot directory: manifest plus payload files
///
/// Every packmode named by a file (other than the root) is declared in the
/// graph with the given dependency edges.
pub async fn build_release(
    version: &str,
    dependencies: &[(&str, &[&str])],
    files: &[ReleaseFile<'_>],
) -> TempDir {
    let dir = TempDir::new().unwrap();
    write_release(dir.path(), version, dependencies, files).await;
    dir
}

/// Write a release snapshot into an existing directory
pub async fn write_release(
    root: &Path,
    version: &str,
    dependencies: &[(&str, &[&str])],
    files: &[ReleaseFile<'_>],
) {
    let mut edges: BTreeMap<Packmode, BTreeSet<Packmode>> = dependencies
        .iter()
        .map(|(name, parents)| {
            (
                packmode(name),
                parents.iter().map(|p| packmode(p)).collect(),
            )
        })
        .collect();
    for (_, _, tags) in files {
        for tag in *tags {
            if *tag != Packmode::ROOT {
                edges.entry(packmode(tag)).or_default();
            }
        }
    }

    let graph = PackmodeGraph::new(edges).unwrap();
    let entries = files
        .iter()
        .map(|(path, content, tags)| {
            FileEntry::new(
                rel(path),
                Identity::of_bytes(content),
                tags.iter().map(|t| packmode(t)).collect(),
                Origin::new(*path),
            )
            .unwrap()
        })
        .collect();
    let manifest = Manifest::new(version.parse().unwrap(), graph, entries).unwrap();

    tokio::fs::write(root.join(MANIFEST_FILE_NAME), manifest.to_json().unwrap())
        .await
        .unwrap();
    for (path, content, _) in files {
        let full = rel(path).to_fs_path(root);
        tokio::fs::create_dir_all(full.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(full, content).await.unwrap();
    }
}

/// Shorthand for a validated relative path
pub fn rel(path: &str) -> RelPath {
    RelPath::new(path).unwrap()
}

/// Shorthand for a validated packmode tag
pub fn packmode(name: &str) -> Packmode {
    Packmode::new(name).unwrap()
}

/// Source adapter wrapper that injects transient failures per origin
pub struct FlakySource<S> {
    inner: S,
    outages: HashMap<String, u32>,
    attempts: std::sync::Mutex<HashMap<String, u32>>,
    fetches: AtomicU32,
}

impl<S: SourceAdapter> FlakySource<S> {
    /// Wrap a source with no failures configured
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            outages: HashMap::new(),
            attempts: std::sync::Mutex::new(HashMap::new()),
            fetches: AtomicU32::new(0),
        }
    }

    /// Fail the first `times` fetches of the given origin
    pub fn with_outage(mut self, origin: &str, times: u32) -> Self {
        self.outages.insert(origin.to_string(), times);
        self
    }

    /// Total number of fetch calls observed
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: SourceAdapter> SourceAdapter for FlakySource<S> {
    async fn fetch(&self, origin: &Origin) -> Result<ByteStream> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = origin.as_str().to_string();
        if let Some(&budget) = self.outages.get(&key) {
            let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
            let seen = attempts.entry(key.clone()).or_insert(0);
            *seen += 1;
            if *seen <= budget {
                return Err(Error::source_unavailable(key, "injected outage"));
            }
        }
        self.inner.fetch(origin).await
    }

    async fn fetch_manifest(&self) -> Result<Vec<u8>> {
        self.inner.fetch_manifest().await
    }
}
