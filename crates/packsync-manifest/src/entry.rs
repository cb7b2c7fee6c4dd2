//! Manifest file entries

use packsync_types::{Error, Identity, Origin, Packmode, RelPath, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One file known to a manifest
///
/// The identity is immutable once assigned: a changed file is a new
/// `FileEntry`, never a mutation of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Normalized relative path, unique within a manifest
    pub path: RelPath,
    /// Content identity (hash + length)
    #[serde(flatten)]
    pub identity: Identity,
    /// Non-empty set of packmodes this file belongs to
    pub packmodes: BTreeSet<Packmode>,
    /// Opaque reference a source adapter uses to retrieve the bytes
    pub origin: Origin,
}

impl FileEntry {
    /// Create a file entry, rejecting an empty packmode set
    pub fn new(
        path: RelPath,
        identity: Identity,
        packmodes: BTreeSet<Packmode>,
        origin: Origin,
    ) -> Result<Self> {
        if packmodes.is_empty() {
            return Err(Error::manifest_conflict(format!(
                "entry '{}' has no packmodes",
                path
            )));
        }
        Ok(Self {
            path,
            identity,
            packmodes,
            origin,
        })
    }

    /// Check whether this entry belongs to any of the given packmodes
    pub fn in_any_packmode(&self, packmodes: &BTreeSet<Packmode>) -> bool {
        self.packmodes.iter().any(|p| packmodes.contains(p))
    }
}
