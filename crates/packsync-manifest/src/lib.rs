//! Pack manifest data model and packmode resolution for packsync
//!
//! A [`Manifest`] is the declarative description of a pack release: every
//! file the pack contains, its content identity, the packmodes it belongs
//! to, and the origin reference a source adapter needs to fetch it. This
//! crate provides:
//!
//! - **Manifest model**: Immutable, validated manifests with a monotonic
//!   version marker and JSON (de)serialization
//! - **Packmode graph**: Dependency declarations between packmodes with
//!   cycle and undefined-reference detection
//! - **Packmode resolver**: Deterministic computation of the concrete
//!   target file set for an active packmode selection
//!
//! # Examples
//!
//! ```rust
//! use packsync_manifest::{Manifest, resolve_target};
//! use packsync_types::Packmode;
//! use std::collections::BTreeSet;
//!
//! # fn example(manifest: &Manifest) -> packsync_types::Result<()> {
//! let active = BTreeSet::from([Packmode::new("client")?]);
//! let target = resolve_target(manifest, &active)?;
//! println!("target contains {} files", target.len());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod entry;
pub mod graph;
pub mod manifest;
pub mod resolver;

pub use entry::FileEntry;
pub use graph::PackmodeGraph;
pub use manifest::Manifest;
pub use resolver::{resolve_target, TargetSet};
