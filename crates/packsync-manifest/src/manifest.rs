//! The pack manifest model
//!
//! A manifest is immutable once published: a new pack release is a new
//! `Manifest` value with a higher version marker, never a mutation.

use crate::{FileEntry, PackmodeGraph};
use packsync_types::{Error, Identity, PackVersion, Packmode, RelPath, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Declarative description of a pack's full file set at one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    version: PackVersion,
    packmodes: PackmodeGraph,
    entries: BTreeMap<RelPath, FileEntry>,
}

/// Serialized manifest document (`pack-manifest.json`)
///
/// The packmode graph is carried as its raw dependency map so that graph
/// validation failures surface as manifest conflicts, not parse errors.
#[derive(Serialize, Deserialize)]
struct ManifestDoc {
    #[serde(rename = "pack-version")]
    version: PackVersion,
    packmodes: BTreeMap<Packmode, BTreeSet<Packmode>>,
    files: Vec<FileEntry>,
}

impl Manifest {
    /// Create a validated manifest
    ///
    /// Rejects duplicate paths with [`Error::ManifestConflict`] rather than
    /// silently picking one entry, and rejects entries tagged with a
    /// packmode the graph does not declare.
    pub fn new(
        version: PackVersion,
        packmodes: PackmodeGraph,
        entries: Vec<FileEntry>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            for packmode in &entry.packmodes {
                if !packmodes.contains(packmode) {
                    return Err(Error::UndefinedPackmode {
                        packmode: packmode.to_string(),
                        referenced_by: format!("entry '{}'", entry.path),
                    });
                }
            }
            if let Some(previous) = map.insert(entry.path.clone(), entry) {
                return Err(Error::manifest_conflict(format!(
                    "duplicate path '{}' in manifest version {}",
                    previous.path, version
                )));
            }
        }

        debug!("Built manifest {} with {} entries", version, map.len());
        Ok(Self {
            version,
            packmodes,
            entries: map,
        })
    }

    /// An empty manifest at version 0.0.0, the state of a fresh install
    pub fn empty() -> Self {
        Self {
            version: PackVersion::zero(),
            packmodes: PackmodeGraph::default(),
            entries: BTreeMap::new(),
        }
    }

    /// The version marker of this manifest
    pub fn version(&self) -> PackVersion {
        self.version
    }

    /// The packmode dependency graph
    pub fn packmodes(&self) -> &PackmodeGraph {
        &self.packmodes
    }

    /// Look up an entry by path
    pub fn entry(&self, path: &RelPath) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    /// Iterate over all entries in path order
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Subset manifest containing only entries matching the predicate
    ///
    /// Keeps the version and packmode graph; a subset of a valid manifest
    /// is always valid.
    pub fn filter<F: Fn(&FileEntry) -> bool>(&self, predicate: F) -> Self {
        Self {
            version: self.version,
            packmodes: self.packmodes.clone(),
            entries: self
                .entries
                .iter()
                .filter(|(_, entry)| predicate(entry))
                .map(|(path, entry)| (path.clone(), entry.clone()))
                .collect(),
        }
    }

    /// The set of content identities this manifest references
    pub fn identity_set(&self) -> BTreeSet<&Identity> {
        self.entries.values().map(|e| &e.identity).collect()
    }

    /// Structural equality by identity set
    ///
    /// Two manifests with equal identity sets describe the same content,
    /// which makes "target already satisfied" detection cheap.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.identity_set() == other.identity_set()
    }

    /// Parse and validate a manifest from its JSON document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let doc: ManifestDoc = serde_json::from_slice(bytes)
            .map_err(|e| Error::parse(format!("invalid pack manifest: {}", e)))?;
        Self::new(doc.version, PackmodeGraph::new(doc.packmodes)?, doc.files)
    }

    /// Serialize the manifest to its JSON document
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let doc = ManifestDoc {
            version: self.version,
            packmodes: self.packmodes.clone().into(),
            files: self.entries.values().cloned().collect(),
        };
        serde_json::to_vec_pretty(&doc)
            .map_err(|e| Error::parse(format!("failed to serialize manifest: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packsync_types::{Origin, Packmode};

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

    fn graph(names: &[&str]) -> PackmodeGraph {
        PackmodeGraph::new(names.iter().map(|n| (pm(n), BTreeSet::new())).collect()).unwrap()
    }

    fn manifest() -> Manifest {
        Manifest::new(
            "1.2.0".parse().unwrap(),
            graph(&["client"]),
            vec![
                entry("mods/a.jar", b"a-v1", &["client"]),
                entry("config/c.cfg", b"cfg", &["client", "server"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_path_is_a_conflict() {
        let err = Manifest::new(
            "1.0.0".parse().unwrap(),
            graph(&["client"]),
            vec![
                entry("mods/a.jar", b"one", &["client"]),
                entry("mods/a.jar", b"two", &["server"]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ManifestConflict { .. }));
    }

    #[test]
    fn test_undefined_packmode_assignment_rejected() {
        let err = Manifest::new(
            "1.0.0".parse().unwrap(),
            graph(&["client"]),
            vec![entry("mods/a.jar", b"a", &["client-lite"])],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UndefinedPackmode { .. }));
    }

    #[test]
    fn test_lookup_and_filter() {
        let m = manifest();
        assert_eq!(m.len(), 2);
        assert!(m.entry(&RelPath::new("mods/a.jar").unwrap()).is_some());

        let server_only = m.filter(|e| e.packmodes.contains(&Packmode::server()));
        assert_eq!(server_only.len(), 1);
        assert_eq!(server_only.version(), m.version());
    }

    #[test]
    fn test_content_eq_ignores_paths() {
        let a = Manifest::new(
            "1.0.0".parse().unwrap(),
            graph(&["client"]),
            vec![entry("mods/old-name.jar", b"payload", &["client"])],
        )
        .unwrap();
        let b = Manifest::new(
            "1.0.1".parse().unwrap(),
            graph(&["client"]),
            vec![entry("mods/new-name.jar", b"payload", &["client"])],
        )
        .unwrap();
        assert!(a.content_eq(&b));
        assert!(!a.content_eq(&Manifest::empty()));
    }

    #[test]
    fn test_json_round_trip() {
        let m = manifest();
        let bytes = m.to_json().unwrap();
        let parsed = Manifest::from_json(&bytes).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_from_json_validates() {
        let doc = format!(
            r#"{{
            "pack-version": "1.0.0",
            "packmodes": {{}},
            "files": [
                {{"path": "mods/a.jar", "hash": "{}", "size": 1, "packmodes": ["ghost"], "origin": "mods/a.jar"}}
            ]
        }}"#,
            "0".repeat(64)
        );
        assert!(matches!(
            Manifest::from_json(doc.as_bytes()).unwrap_err(),
            Error::UndefinedPackmode { .. }
        ));
    }

    #[test]
    fn test_from_json_rejects_malformed_hash() {
        // A digest that is not plain lowercase hex must fail at parse time,
        // not survive into display or integrity checks.
        let doc = r#"{
            "pack-version": "1.0.0",
            "packmodes": {},
            "files": [
                {"path": "mods/a.jar", "hash": "aaaééé", "size": 1, "packmodes": ["server"], "origin": "mods/a.jar"}
            ]
        }"#;
        assert!(matches!(
            Manifest::from_json(doc.as_bytes()).unwrap_err(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            Manifest::from_json(b"not json").unwrap_err(),
            Error::Parse { .. }
        ));
    }
}
