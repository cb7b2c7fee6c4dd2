//! Durable installation state
//!
//! The installation state is the local, mutable record of what has actually
//! been applied: path to on-disk identity, plus the manifest version and
//! active packmode set of the last sync. It is read before every diff and
//! persisted after every completed operation, which is what makes an
//! interrupted sync resumable.

use async_trait::async_trait;
use packsync_types::{Error, Identity, PackVersion, Packmode, RelPath, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the state record inside an installation directory
pub const STATE_FILE_NAME: &str = ".packsync-state.json";

/// Record of what a local installation currently contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    /// Manifest version this installation was last synced to
    #[serde(rename = "manifest-version")]
    pub manifest_version: PackVersion,
    /// Active packmode selection of the last sync
    #[serde(rename = "active-packmodes")]
    pub active_packmodes: BTreeSet<Packmode>,
    /// Identity actually on disk, per path
    pub files: BTreeMap<RelPath, Identity>,
}

impl InstallationState {
    /// State of a never-synced installation
    pub fn fresh() -> Self {
        Self {
            manifest_version: PackVersion::zero(),
            active_packmodes: BTreeSet::new(),
            files: BTreeMap::new(),
        }
    }

    /// Record that a path now holds the given content
    pub fn record_file(&mut self, path: RelPath, identity: Identity) {
        self.files.insert(path, identity);
    }

    /// Record that a path no longer exists
    pub fn forget_file(&mut self, path: &RelPath) {
        self.files.remove(path);
    }

    /// Find any recorded path holding the given content, for local
    /// deduplicated copies instead of refetches
    pub fn path_with_identity(&self, identity: &Identity) -> Option<&RelPath> {
        self.files
            .iter()
            .find(|(_, id)| *id == identity)
            .map(|(path, _)| path)
    }
}

impl Default for InstallationState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Durable, crash-safe storage for installation state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted state, `None` on first install
    async fn load(&self) -> Result<Option<InstallationState>>;

    /// Durably persist the state
    async fn save(&self, state: &InstallationState) -> Result<()>;
}

/// State store backed by a JSON file inside the installation directory
///
/// Saves are atomic: the document is written to a sibling temporary file,
/// synced, then renamed over the previous record, so a crash never leaves a
/// half-written state file.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Create a store for the given installation directory
    pub fn for_install_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    /// Path of the backing state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<InstallationState>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at '{}', fresh install", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::state(format!(
                    "failed to read state file '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let state = serde_json::from_slice(&bytes).map_err(|e| {
            Error::state(format!(
                "corrupt state file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(state))
    }

    async fn save(&self, state: &InstallationState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::state(format!("failed to serialize state: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        let write = async {
            fs::write(&tmp, &bytes).await?;
            let file = fs::File::open(&tmp).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &self.path).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::state(format!(
                "failed to persist state file '{}': {}",
                self.path.display(),
                e
            )));
        }

        debug!(
            "Persisted state for {} files to '{}'",
            state.files.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> InstallationState {
        let mut state = InstallationState::fresh();
        state.manifest_version = "1.4.2".parse().unwrap();
        state
            .active_packmodes
            .insert(Packmode::new("client").unwrap());
        state.record_file(
            RelPath::new("mods/a.jar").unwrap(),
            Identity::of_bytes(b"a"),
        );
        state
    }

    #[tokio::test]
    async fn test_load_missing_is_fresh_install() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::for_install_dir(dir.path());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::for_install_dir(dir.path());

        let state = sample_state();
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_record() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::for_install_dir(dir.path());

        let mut state = sample_state();
        store.save(&state).await.unwrap();

        state.forget_file(&RelPath::new("mods/a.jar").unwrap());
        state.manifest_version = "1.5.0".parse().unwrap();
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.files.is_empty());
        assert_eq!(loaded.manifest_version, "1.5.0".parse().unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::for_install_dir(dir.path());
        fs::write(store.path(), b"{ not json").await.unwrap();

        assert!(matches!(
            store.load().await.unwrap_err(),
            Error::State { .. }
        ));
    }

    #[test]
    fn test_path_with_identity_finds_duplicates() {
        let mut state = InstallationState::fresh();
        let identity = Identity::of_bytes(b"shared");
        state.record_file(RelPath::new("mods/a.jar").unwrap(), identity.clone());

        assert_eq!(
            state.path_with_identity(&identity).map(|p| p.as_str()),
            Some("mods/a.jar")
        );
        assert!(state
            .path_with_identity(&Identity::of_bytes(b"other"))
            .is_none());
    }
}
