//! Exclusive installation lock
//!
//! One sync at a time per installation: the directory and its state record
//! are protected by a lock file created with `create_new`, so a concurrent
//! attempt fails fast with `AlreadySyncing` instead of interleaving writes.

use packsync_types::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the lock inside an installation directory
pub const LOCK_FILE_NAME: &str = ".packsync.lock";

/// Scoped exclusive lock on an installation directory
///
/// Held for the duration of a sync; the lock file is removed on drop,
/// including every early-return and panic-unwind path.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    /// Acquire the lock, failing fast on contention
    pub fn acquire<P: AsRef<Path>>(install_dir: P) -> Result<Self> {
        let install_dir = install_dir.as_ref();
        std::fs::create_dir_all(install_dir).map_err(|e| {
            Error::filesystem(format!(
                "failed to create installation directory '{}': {}",
                install_dir.display(),
                e
            ))
        })?;

        let path = install_dir.join(LOCK_FILE_NAME);
        let created = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);

        match created {
            Ok(mut file) => {
                // Best effort: the pid helps a human diagnose a stale lock.
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired installation lock '{}'", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::AlreadySyncing {
                    path: install_dir.to_path_buf(),
                })
            }
            Err(e) => Err(Error::filesystem(format!(
                "failed to create lock file '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(
                "Failed to remove lock file '{}': {}",
                self.path.display(),
                e
            );
        } else {
            debug!("Released installation lock '{}'", self.path.display());
        }
    }
}
