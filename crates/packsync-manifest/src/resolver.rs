//! Packmode resolver
//!
//! Turns a manifest plus an active packmode selection into the concrete
//! target file set for an installation. Pure and deterministic: the same
//! (manifest, active set) pair always yields the same target set, which is
//! what makes syncs reproducible and test fixtures cheap.

use crate::Manifest;
use packsync_types::{Identity, Packmode, RelPath, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Concrete target file set: path to expected content identity
pub type TargetSet = BTreeMap<RelPath, Identity>;

/// Compute the target file set for an active packmode selection
///
/// The active set is first expanded to its dependency closure (always
/// including the root packmode), then every entry whose packmode set
/// intersects the closure is included.
pub fn resolve_target(manifest: &Manifest, active: &BTreeSet<Packmode>) -> Result<TargetSet> {
    let closure = manifest.packmodes().closure(active)?;

    let mut target = TargetSet::new();
    for entry in manifest.entries() {
        if entry.in_any_packmode(&closure) {
            // Paths are unique per validated manifest, so this never clobbers.
            target.insert(entry.path.clone(), entry.identity.clone());
        }
    }

    debug!(
        "Resolved {} of {} entries for packmodes [{}]",
        target.len(),
        manifest.len(),
        closure
            .iter()
            .map(Packmode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(target)
}
