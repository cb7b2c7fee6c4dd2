//! Sync engine
//!
//! Drives one full synchronization: acquire the installation lock, load the
//! local state, fetch and validate the published manifest, resolve the
//! active packmode selection to a target file set, diff, and apply. The
//! whole flow holds the lock, so two syncs on one installation can never
//! interleave.

use crate::apply::{ApplyEngine, ApplyOptions, ApplyReport};
use crate::diff::diff;
use crate::lock::InstallLock;
use crate::plan::ChangePlan;
use crate::state::{InstallationState, JsonStateStore, StateStore};
use packsync_manifest::{resolve_target, Manifest};
use packsync_types::{
    CancelFlag, Origin, PackVersion, Packmode, RelPath, RequestId, Result, RetryConfig,
    SourceAdapter, WorkerCount,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options controlling one sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute and report the change plan without touching the installation
    pub dry_run: bool,
    /// Worker pool size for concurrent fetches
    pub workers: WorkerCount,
    /// Retry policy for transient source failures
    pub retry: RetryConfig,
}

/// One sync request against an installation directory
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Unique identifier of this request, carried through log output
    pub request_id: RequestId,
    /// Installation directory to synchronize
    pub install_dir: PathBuf,
    /// Packmode selection; `None` keeps the installation's current selection
    pub active_packmodes: Option<BTreeSet<Packmode>>,
    /// Sync options
    pub options: SyncOptions,
}

impl SyncRequest {
    /// Create a request with default options
    pub fn new<P: AsRef<Path>>(install_dir: P) -> Self {
        Self {
            request_id: RequestId::new_v4(),
            install_dir: install_dir.as_ref().to_path_buf(),
            active_packmodes: None,
            options: SyncOptions::default(),
        }
    }

    /// Select the active packmodes for this installation
    pub fn with_packmodes<I: IntoIterator<Item = Packmode>>(mut self, packmodes: I) -> Self {
        self.active_packmodes = Some(packmodes.into_iter().collect());
        self
    }

    /// Plan only, apply nothing
    pub fn dry_run(mut self) -> Self {
        self.options.dry_run = true;
        self
    }
}

/// How a sync run concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The installation already matched the target
    UpToDate,
    /// Dry run: the plan was computed but nothing was applied
    DryRun,
    /// Operations were applied; see the report for per-file results
    Applied,
}

/// Result of one sync run
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Identifier of the request that produced this result
    pub request_id: RequestId,
    /// Manifest version the sync targeted
    pub manifest_version: PackVersion,
    /// Expanded packmode closure the sync targeted
    pub active_packmodes: BTreeSet<Packmode>,
    /// How the run concluded
    pub outcome: SyncOutcome,
    /// The plan that was computed (empty when already up to date)
    pub plan: ChangePlan,
    /// Per-operation results (empty for dry runs and up-to-date installs)
    pub report: ApplyReport,
}

impl SyncResult {
    /// Check whether the installation now fully matches the target
    pub fn is_synced(&self) -> bool {
        match self.outcome {
            SyncOutcome::UpToDate => true,
            SyncOutcome::DryRun => false,
            SyncOutcome::Applied => self.report.is_complete(),
        }
    }
}

/// Drives manifest-based synchronization of installations
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    cancel: CancelFlag,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancellation handle for in-flight syncs
    ///
    /// Cancellation is cooperative: operations already running complete or
    /// are discarded, remaining operations are skipped, and the installation
    /// stays consistent.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run one synchronization against the given source
    pub async fn sync(
        &self,
        request: SyncRequest,
        source: &dyn SourceAdapter,
    ) -> Result<SyncResult> {
        let request_id = request.request_id;
        info!(
            "Sync {} starting for '{}'",
            request_id,
            request.install_dir.display()
        );

        let lock = InstallLock::acquire(&request.install_dir)?;
        let store = JsonStateStore::for_install_dir(&request.install_dir);
        let state = store.load().await?.unwrap_or_default();

        let manifest = Manifest::from_json(&source.fetch_manifest().await?)?;
        let active = self.select_packmodes(&request, &state, &manifest);
        let closure = manifest.packmodes().closure(&active)?;

        // Same version, same selection, last run complete: nothing to check.
        if state.manifest_version == manifest.version() && state.active_packmodes == closure {
            info!(
                "Sync {}: already at {} with packmodes [{}]",
                request_id,
                manifest.version(),
                join(&closure)
            );
            return Ok(SyncResult {
                request_id,
                manifest_version: manifest.version(),
                active_packmodes: closure,
                outcome: SyncOutcome::UpToDate,
                plan: ChangePlan::default(),
                report: ApplyReport::default(),
            });
        }

        let target = resolve_target(&manifest, &active)?;
        let plan = diff(&target, &state);
        info!(
            "Sync {}: {} -> {} with packmodes [{}]: {}",
            request_id,
            state.manifest_version,
            manifest.version(),
            join(&closure),
            plan
        );

        if request.options.dry_run {
            return Ok(SyncResult {
                request_id,
                manifest_version: manifest.version(),
                active_packmodes: closure,
                outcome: SyncOutcome::DryRun,
                plan,
                report: ApplyReport::default(),
            });
        }

        let origins = origins_for(&manifest, &target);
        let apply = ApplyEngine::new(ApplyOptions {
            workers: request.options.workers,
            retry: request.options.retry.clone(),
        });
        let (mut state, report) = apply
            .apply(
                plan.clone(),
                &origins,
                source,
                &request.install_dir,
                state,
                &store,
                &lock,
                &self.cancel,
            )
            .await?;

        // The version marker advances only once every operation landed, so
        // the next run's quick check cannot mask unfinished work.
        if report.is_complete() {
            state.manifest_version = manifest.version();
            state.active_packmodes = closure.clone();
            store.save(&state).await?;
        }

        Ok(SyncResult {
            request_id,
            manifest_version: manifest.version(),
            active_packmodes: closure,
            outcome: SyncOutcome::Applied,
            plan,
            report,
        })
    }

    /// Packmode selection precedence: explicit request, then the
    /// installation's previous selection, then everything the manifest
    /// defines (a full mirror).
    fn select_packmodes(
        &self,
        request: &SyncRequest,
        state: &InstallationState,
        manifest: &Manifest,
    ) -> BTreeSet<Packmode> {
        if let Some(active) = &request.active_packmodes {
            return active.clone();
        }
        if !state.active_packmodes.is_empty() {
            debug!("Keeping previous packmode selection");
            return state.active_packmodes.clone();
        }
        manifest.packmodes().defined()
    }
}

fn origins_for(manifest: &Manifest, target: &packsync_manifest::TargetSet) -> BTreeMap<RelPath, Origin> {
    target
        .keys()
        .filter_map(|path| {
            manifest
                .entry(path)
                .map(|entry| (path.clone(), entry.origin.clone()))
        })
        .collect()
}

fn join(packmodes: &BTreeSet<Packmode>) -> String {
    packmodes
        .iter()
        .map(Packmode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DirSource, MANIFEST_FILE_NAME};
    use packsync_manifest::{FileEntry, PackmodeGraph};
    use packsync_types::Identity;
    use tempfile::TempDir;
    use tokio::fs;

    fn pm(name: &str) -> Packmode {
        Packmode::new(name).unwrap()
    }

    fn entry(path: &str, content: &[u8], packmodes: &[&str]) -> FileEntry {
        FileEntry::new(
            RelPath::new(path).unwrap(),
            Identity::of_bytes(content),
            packmodes.iter().map(|p| pm(p)).collect(),
            Origin::new(path),
        )
        .unwrap()
    }

    /// Lay out a snapshot directory: manifest plus payload files
    async fn snapshot(version: &str, files: &[(&str, &[u8], &[&str])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let graph = PackmodeGraph::new(
            [(pm("client"), BTreeSet::new())].into_iter().collect(),
        )
        .unwrap();
        let entries = files
            .iter()
            .map(|(p, c, modes)| entry(p, c, modes))
            .collect();
        let manifest = Manifest::new(version.parse().unwrap(), graph, entries).unwrap();

        fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            manifest.to_json().unwrap(),
        )
        .await
        .unwrap();
        for (p, content, _) in files {
            let path = RelPath::new(p).unwrap().to_fs_path(dir.path());
            fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            fs::write(path, content).await.unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_fresh_install_full_sync() {
        let release = snapshot(
            "1.0.0",
            &[
                ("mods/a.jar", b"alpha", &["client"]),
                ("mods/b.jar", b"beta", &["server"]),
            ],
        )
        .await;
        let install = TempDir::new().unwrap();
        let engine = SyncEngine::new();

        let result = engine
            .sync(
                SyncRequest::new(install.path()).with_packmodes([pm("client")]),
                &DirSource::new(release.path()),
            )
            .await
            .unwrap();

        assert!(result.is_synced());
        assert_eq!(result.outcome, SyncOutcome::Applied);
        assert_eq!(result.report.applied, 2);
        assert_eq!(
            fs::read(install.path().join("mods/a.jar")).await.unwrap(),
            b"alpha"
        );
    }

    #[tokio::test]
    async fn test_second_sync_is_up_to_date() {
        let release = snapshot("1.0.0", &[("mods/a.jar", b"alpha", &["server"])]).await;
        let install = TempDir::new().unwrap();
        let engine = SyncEngine::new();
        let source = DirSource::new(release.path());

        let first = engine
            .sync(SyncRequest::new(install.path()), &source)
            .await
            .unwrap();
        assert_eq!(first.outcome, SyncOutcome::Applied);

        let second = engine
            .sync(SyncRequest::new(install.path()), &source)
            .await
            .unwrap();
        assert_eq!(second.outcome, SyncOutcome::UpToDate);
        assert!(second.plan.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let release = snapshot("1.0.0", &[("mods/a.jar", b"alpha", &["server"])]).await;
        let install = TempDir::new().unwrap();

        let result = SyncEngine::new()
            .sync(
                SyncRequest::new(install.path()).dry_run(),
                &DirSource::new(release.path()),
            )
            .await
            .unwrap();

        assert_eq!(result.outcome, SyncOutcome::DryRun);
        assert_eq!(result.plan.len(), 1);
        assert!(!install.path().join("mods/a.jar").exists());
        assert!(!result.is_synced());
    }

    #[tokio::test]
    async fn test_version_upgrade_replaces_changed_files() {
        let install = TempDir::new().unwrap();
        let engine = SyncEngine::new();

        let v1 = snapshot(
            "1.0.0",
            &[
                ("mods/a.jar", b"a-v1", &["server"]),
                ("config/c.cfg", b"cfg", &["server"]),
            ],
        )
        .await;
        engine
            .sync(SyncRequest::new(install.path()), &DirSource::new(v1.path()))
            .await
            .unwrap();

        let v2 = snapshot(
            "1.1.0",
            &[
                ("mods/a.jar", b"a-v2", &["server"]),
                ("config/c.cfg", b"cfg", &["server"]),
            ],
        )
        .await;
        let result = engine
            .sync(SyncRequest::new(install.path()), &DirSource::new(v2.path()))
            .await
            .unwrap();

        // only the changed file moves
        assert_eq!(result.report.applied, 1);
        assert_eq!(result.plan.summary(), (0, 0, 1));
        assert_eq!(
            fs::read(install.path().join("mods/a.jar")).await.unwrap(),
            b"a-v2"
        );
    }

    #[tokio::test]
    async fn test_packmode_switch_swaps_content() {
        let release = snapshot(
            "1.0.0",
            &[
                ("mods/client-only.jar", b"c", &["client"]),
                ("mods/shared.jar", b"s", &["client", "server"]),
            ],
        )
        .await;
        let install = TempDir::new().unwrap();
        let engine = SyncEngine::new();
        let source = DirSource::new(release.path());

        engine
            .sync(
                SyncRequest::new(install.path()).with_packmodes([pm("client")]),
                &source,
            )
            .await
            .unwrap();
        assert!(install.path().join("mods/client-only.jar").exists());

        let result = engine
            .sync(
                SyncRequest::new(install.path()).with_packmodes([Packmode::server()]),
                &source,
            )
            .await
            .unwrap();

        assert!(result.is_synced());
        assert!(!install.path().join("mods/client-only.jar").exists());
        assert!(install.path().join("mods/shared.jar").exists());
    }

    #[tokio::test]
    async fn test_packmode_selection_persists_across_syncs() {
        let release = snapshot(
            "1.0.0",
            &[("mods/client-only.jar", b"c", &["client"])],
        )
        .await;
        let install = TempDir::new().unwrap();
        let engine = SyncEngine::new();
        let source = DirSource::new(release.path());

        engine
            .sync(
                SyncRequest::new(install.path()).with_packmodes([Packmode::server()]),
                &source,
            )
            .await
            .unwrap();

        // no explicit selection: the previous server-only choice sticks
        let result = engine
            .sync(SyncRequest::new(install.path()), &source)
            .await
            .unwrap();
        assert_eq!(result.outcome, SyncOutcome::UpToDate);
        assert!(!install.path().join("mods/client-only.jar").exists());
    }

    #[tokio::test]
    async fn test_missing_manifest_is_source_error() {
        let empty = TempDir::new().unwrap();
        let install = TempDir::new().unwrap();

        let err = SyncEngine::new()
            .sync(SyncRequest::new(install.path()), &DirSource::new(empty.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            packsync_types::Error::SourceNotFound { .. }
        ));
        // the lock was released on the error path
        assert!(!install.path().join(crate::lock::LOCK_FILE_NAME).exists());
    }
}
