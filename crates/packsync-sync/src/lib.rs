//! Differential sync engine for packsync
//!
//! This crate turns a published pack manifest plus an active packmode
//! selection into the minimal set of file operations needed to bring a local
//! installation up to date, then applies them with atomicity and
//! resumability guarantees:
//!
//! - **Diff Engine**: Compares a resolved target set against the recorded
//!   installation state and produces an ordered change plan
//! - **Apply Engine**: Executes a plan against a locked installation
//!   directory through a bounded worker pool, staging every write in a
//!   temporary file and persisting state after each completed operation
//! - **Installation State**: Durable record of what is actually on disk,
//!   read before every diff and updated after every successful operation
//! - **Source Adapters**: A local-directory adapter for snapshot layouts;
//!   HTTP/FTP transports plug in through the same trait
//!
//! # Examples
//!
//! ```rust,no_run
//! use packsync_sync::{DirSource, SyncEngine, SyncRequest};
//!
//! # async fn example() -> packsync_types::Result<()> {
//! let source = DirSource::new("/srv/pack-release");
//! let engine = SyncEngine::default();
//! let result = engine.sync(SyncRequest::new("/home/mc/pack"), &source).await?;
//! println!("applied {} operations", result.report.applied);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod apply;
pub mod diff;
pub mod engine;
pub mod lock;
pub mod plan;
pub mod retry;
pub mod source;
pub mod state;

pub use apply::{ApplyEngine, ApplyOptions, ApplyReport, FailedOp};
pub use diff::diff;
pub use engine::{SyncEngine, SyncOptions, SyncOutcome, SyncRequest, SyncResult};
pub use lock::InstallLock;
pub use plan::{ChangePlan, Operation};
pub use source::DirSource;
pub use state::{InstallationState, JsonStateStore, StateStore};
