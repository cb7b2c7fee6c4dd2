//! Apply engine
//!
//! Executes a change plan against a locked installation directory, pulling
//! bytes through a source adapter. Removals run first, sequentially; fetch
//! operations run on a bounded worker pool. Every write is staged in a
//! temporary file, verified against the expected identity, then atomically
//! renamed into place, so the installation is never observed holding a
//! half-written or mismatched file. The installation state is persisted
//! after each completed operation, which makes an interrupted apply
//! resumable from exactly where it stopped.

use crate::lock::InstallLock;
use crate::plan::{ChangePlan, Operation};
use crate::retry::with_retry;
use crate::state::{InstallationState, StateStore};
use futures::StreamExt;
use packsync_types::{
    ByteStream, CancelFlag, Error, ErrorKind, Identity, Origin, RelPath, Result, RetryConfig,
    SourceAdapter, WorkerCount,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Name of the staging directory for in-flight downloads
pub const STAGING_DIR_NAME: &str = ".packsync-tmp";

/// Buffer size for streaming fetched content to disk
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Apply engine options
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Worker pool size for concurrent fetches
    pub workers: WorkerCount,
    /// Retry policy for transient source failures
    pub retry: RetryConfig,
}

/// One failed operation with its reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOp {
    /// Path the operation targeted
    pub path: RelPath,
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable reason
    pub message: String,
}

/// Outcome of one apply call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Operations applied successfully
    pub applied: u64,
    /// Operations that failed
    pub failed: u64,
    /// Operations skipped due to cancellation
    pub skipped: u64,
    /// Failed paths with reasons
    pub failures: Vec<FailedOp>,
}

impl ApplyReport {
    /// A sync with zero failures and zero skips is complete
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    fn tally(&mut self, outcome: OpOutcome) {
        match outcome {
            OpOutcome::Applied => self.applied += 1,
            OpOutcome::Skipped => self.skipped += 1,
            OpOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(failure);
            }
        }
    }
}

enum OpOutcome {
    Applied,
    Skipped,
    Failed(FailedOp),
}

/// Removes a staged temporary file on every exit path
struct TempGuard {
    path: Option<PathBuf>,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn defuse(&mut self) {
        self.path = None;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Executes change plans against an installation directory
#[derive(Debug, Clone, Default)]
pub struct ApplyEngine {
    options: ApplyOptions,
}

impl ApplyEngine {
    /// Create an apply engine with the given options
    pub fn new(options: ApplyOptions) -> Self {
        Self { options }
    }

    /// Apply a change plan
    ///
    /// Requires the caller to hold the installation lock; partial failures
    /// never abort the remaining independent operations. Returns the
    /// updated installation state alongside the report.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply(
        &self,
        plan: ChangePlan,
        origins: &BTreeMap<RelPath, Origin>,
        source: &dyn SourceAdapter,
        install_dir: &Path,
        state: InstallationState,
        store: &dyn StateStore,
        _lock: &InstallLock,
        cancel: &CancelFlag,
    ) -> Result<(InstallationState, ApplyReport)> {
        if plan.is_empty() {
            return Ok((state, ApplyReport::default()));
        }
        info!("Applying {}", plan);

        let staging = install_dir.join(STAGING_DIR_NAME);
        fs::create_dir_all(&staging).await.map_err(|e| {
            Error::filesystem(format!(
                "failed to create staging directory '{}': {}",
                staging.display(),
                e
            ))
        })?;

        let mut report = ApplyReport::default();
        let state = Mutex::new(state);
        let fetched: Mutex<HashMap<Identity, RelPath>> = Mutex::new(HashMap::new());

        // Removals first, one at a time, so a renamed file never collides
        // with its old name on case-insensitive filesystems.
        for op in plan.removes() {
            let outcome = if cancel.is_cancelled() {
                OpOutcome::Skipped
            } else {
                self.run_remove(op.path(), install_dir, &state, store).await
            };
            report.tally(outcome);
        }

        let fetch_ops: Vec<Operation> = plan.fetches().cloned().collect();
        let outcomes: Vec<OpOutcome> = futures::stream::iter(fetch_ops.into_iter().map(|op| {
            self.run_fetch(
                op, origins, source, install_dir, &staging, &state, store, &fetched, cancel,
            )
        }))
        .buffer_unordered(self.options.workers.get())
        .collect()
        .await;
        for outcome in outcomes {
            report.tally(outcome);
        }

        let _ = fs::remove_dir_all(&staging).await;

        info!(
            "Apply finished: {} applied, {} failed, {} skipped",
            report.applied, report.failed, report.skipped
        );
        Ok((state.into_inner(), report))
    }

    async fn run_remove(
        &self,
        path: &RelPath,
        install_dir: &Path,
        state: &Mutex<InstallationState>,
        store: &dyn StateStore,
    ) -> OpOutcome {
        let fs_path = path.to_fs_path(install_dir);
        let removed = match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(()),
            // Already gone counts as removed; the state record was stale.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::filesystem(format!(
                "failed to remove '{}': {}",
                fs_path.display(),
                e
            ))),
        };

        match removed {
            Ok(()) => {
                debug!("Removed '{}'", path);
                let mut state = state.lock().await;
                state.forget_file(path);
                match store.save(&state).await {
                    Ok(()) => OpOutcome::Applied,
                    Err(e) => OpOutcome::Failed(FailedOp {
                        path: path.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                }
            }
            Err(e) => {
                warn!("Remove failed for '{}': {}", path, e);
                OpOutcome::Failed(FailedOp {
                    path: path.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_fetch(
        &self,
        op: Operation,
        origins: &BTreeMap<RelPath, Origin>,
        source: &dyn SourceAdapter,
        install_dir: &Path,
        staging: &Path,
        state: &Mutex<InstallationState>,
        store: &dyn StateStore,
        fetched: &Mutex<HashMap<Identity, RelPath>>,
        cancel: &CancelFlag,
    ) -> OpOutcome {
        if cancel.is_cancelled() {
            return OpOutcome::Skipped;
        }
        let Some(expected) = op.fetch_identity().cloned() else {
            return OpOutcome::Applied;
        };
        let path = op.path().clone();
        let final_path = path.to_fs_path(install_dir);

        // Dedup hint: content already fetched for a sibling path this run
        // can be copied locally instead of refetched.
        let local_hit = fetched.lock().await.get(&expected).cloned();
        if let Some(done_path) = local_hit {
            let local = self
                .copy_local(&done_path, &expected, install_dir, staging, &final_path)
                .await;
            if local.is_ok() {
                debug!("Deduplicated '{}' from '{}'", path, done_path);
                return self
                    .commit(path, expected, state, store, fetched)
                    .await;
            }
            debug!("Local dedup copy for '{}' failed, fetching", path);
        }

        let Some(origin) = origins.get(&path).cloned() else {
            return OpOutcome::Failed(FailedOp {
                path: path.clone(),
                kind: ErrorKind::SourceNotFound,
                message: format!("no origin known for '{}'", path),
            });
        };

        let result = self
            .fetch_with_policy(&origin, &expected, &path, source, staging, &final_path)
            .await;

        match result {
            Ok(()) => self.commit(path, expected, state, store, fetched).await,
            Err(e) => {
                warn!("Operation failed for '{}': {}", path, e);
                OpOutcome::Failed(FailedOp {
                    path,
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Transient failures retry with backoff; an identity mismatch gets
    /// exactly one extra attempt before it is reported.
    async fn fetch_with_policy(
        &self,
        origin: &Origin,
        expected: &Identity,
        path: &RelPath,
        source: &dyn SourceAdapter,
        staging: &Path,
        final_path: &Path,
    ) -> Result<()> {
        let mut integrity_retried = false;
        loop {
            let attempt = with_retry(&self.options.retry, path.as_str(), || async {
                let stream = source.fetch(origin).await?;
                self.stage_and_install(stream, expected, path, staging, final_path)
                    .await
            })
            .await;

            match attempt {
                Err(e @ Error::Integrity { .. }) if !integrity_retried => {
                    warn!("Integrity mismatch for '{}', retrying once: {}", path, e);
                    integrity_retried = true;
                }
                other => return other,
            }
        }
    }

    /// Stream content to a staged temporary file while hashing, verify the
    /// identity, then atomically move it into place.
    async fn stage_and_install(
        &self,
        mut stream: ByteStream,
        expected: &Identity,
        path: &RelPath,
        staging: &Path,
        final_path: &Path,
    ) -> Result<()> {
        let tmp = staging.join(format!("{}.part", uuid::Uuid::new_v4()));
        let mut guard = TempGuard::new(tmp.clone());

        let mut file = fs::File::create(&tmp).await.map_err(|e| {
            Error::filesystem(format!("failed to create '{}': {}", tmp.display(), e))
        })?;

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut size = 0u64;
        loop {
            let read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| Error::source_unavailable(path.as_str(), e.to_string()))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
            file.write_all(&buffer[..read]).await.map_err(|e| {
                Error::filesystem(format!("failed to write '{}': {}", tmp.display(), e))
            })?;
        }

        let actual = Identity {
            hash: hasher.finalize().to_hex().to_string(),
            size,
        };
        if actual != *expected {
            return Err(Error::Integrity {
                path: path.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        file.sync_all().await.map_err(|e| {
            Error::filesystem(format!("failed to sync '{}': {}", tmp.display(), e))
        })?;
        drop(file);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::filesystem(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        fs::rename(&tmp, final_path).await.map_err(|e| {
            Error::filesystem(format!(
                "failed to move '{}' into place: {}",
                final_path.display(),
                e
            ))
        })?;
        guard.defuse();
        Ok(())
    }

    async fn copy_local(
        &self,
        from: &RelPath,
        expected: &Identity,
        install_dir: &Path,
        staging: &Path,
        final_path: &Path,
    ) -> Result<()> {
        let from_path = from.to_fs_path(install_dir);
        let file = fs::File::open(&from_path).await.map_err(|e| {
            Error::filesystem(format!("failed to open '{}': {}", from_path.display(), e))
        })?;
        self.stage_and_install(Box::pin(file), expected, from, staging, final_path)
            .await
    }

    async fn commit(
        &self,
        path: RelPath,
        identity: Identity,
        state: &Mutex<InstallationState>,
        store: &dyn StateStore,
        fetched: &Mutex<HashMap<Identity, RelPath>>,
    ) -> OpOutcome {
        {
            let mut state = state.lock().await;
            state.record_file(path.clone(), identity.clone());
            if let Err(e) = store.save(&state).await {
                return OpOutcome::Failed(FailedOp {
                    path,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
        fetched.lock().await.insert(identity, path.clone());
        debug!("Applied '{}'", path);
        OpOutcome::Applied
    }
}
