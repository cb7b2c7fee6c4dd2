//! Diff engine
//!
//! Compares a resolved target file set against the recorded installation
//! state and produces an ordered change plan. Purely a map comparison:
//! identities are already known on both sides, so the common already-in-sync
//! case costs O(1) per path and never touches content.

use crate::plan::{ChangePlan, Operation};
use crate::state::InstallationState;
use packsync_manifest::TargetSet;
use packsync_types::{Identity, RelPath};
use std::collections::BTreeMap;
use tracing::debug;

/// Compute the change plan transforming the local state into the target
///
/// Per path in the union of target and local keys: target-only is an add,
/// local-only a remove, identity mismatch a replace (the remove and
/// recreate are coalesced so the path never transits through a deleted
/// state), and matching identities produce no operation.
///
/// Removals are ordered before adds and replaces so a renamed file never
/// collides with its old name on case-insensitive filesystems.
pub fn diff(target: &TargetSet, local: &InstallationState) -> ChangePlan {
    let mut removes = Vec::new();
    let mut fetches = Vec::new();
    let mut wanted: BTreeMap<&Identity, Vec<RelPath>> = BTreeMap::new();

    for (path, local_identity) in &local.files {
        match target.get(path) {
            None => removes.push(Operation::Remove { path: path.clone() }),
            Some(target_identity) if target_identity != local_identity => {
                wanted
                    .entry(target_identity)
                    .or_default()
                    .push(path.clone());
                fetches.push(Operation::Replace {
                    path: path.clone(),
                    old: local_identity.clone(),
                    new: target_identity.clone(),
                });
            }
            Some(_) => {} // already satisfied
        }
    }

    for (path, identity) in target {
        if !local.files.contains_key(path) {
            wanted.entry(identity).or_default().push(path.clone());
            fetches.push(Operation::Add {
                path: path.clone(),
                identity: identity.clone(),
            });
        }
    }

    let duplicate_fetches: BTreeMap<Identity, Vec<RelPath>> = wanted
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(identity, paths)| (identity.clone(), paths))
        .collect();

    let mut ops = removes;
    ops.extend(fetches);

    let plan = ChangePlan {
        ops,
        duplicate_fetches,
    };
    debug!("Computed change plan: {}", plan);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use packsync_types::RelPath;

    fn path(s: &str) -> RelPath {
        RelPath::new(s).unwrap()
    }

    fn local(files: &[(&str, &[u8])]) -> InstallationState {
        let mut state = InstallationState::fresh();
        for (p, content) in files {
            state.record_file(path(p), Identity::of_bytes(content));
        }
        state
    }

    fn target(files: &[(&str, &[u8])]) -> TargetSet {
        files
            .iter()
            .map(|(p, content)| (path(p), Identity::of_bytes(content)))
            .collect()
    }

    #[test]
    fn test_all_four_cases() {
        let target = target(&[
            ("mods/kept.jar", b"same"),
            ("mods/changed.jar", b"v2"),
            ("mods/new.jar", b"new"),
        ]);
        let local = local(&[
            ("mods/kept.jar", b"same"),
            ("mods/changed.jar", b"v1"),
            ("mods/gone.jar", b"old"),
        ]);

        let plan = diff(&target, &local);
        assert_eq!(plan.summary(), (1, 1, 1));

        // kept.jar produces no operation at all
        assert!(plan.ops.iter().all(|op| op.path().as_str() != "mods/kept.jar"));
    }

    #[test]
    fn test_same_path_change_is_one_replace() {
        let plan = diff(
            &target(&[("config/c.cfg", b"v2")]),
            &local(&[("config/c.cfg", b"v1")]),
        );

        assert_eq!(plan.ops.len(), 1);
        assert!(matches!(plan.ops[0], Operation::Replace { .. }));
    }

    #[test]
    fn test_removes_ordered_before_fetches() {
        let plan = diff(
            &target(&[("mods/b.jar", b"b"), ("mods/d.jar", b"d")]),
            &local(&[("mods/a.jar", b"a"), ("mods/c.jar", b"c")]),
        );

        let first_fetch = plan.ops.iter().position(|op| !op.is_remove()).unwrap();
        let last_remove = plan
            .ops
            .iter()
            .rposition(Operation::is_remove)
            .unwrap();
        assert!(last_remove < first_fetch);
    }

    #[test]
    fn test_in_sync_plan_is_empty() {
        let files: &[(&str, &[u8])] = &[("mods/a.jar", b"a"), ("config/c.cfg", b"c")];
        let plan = diff(&target(files), &local(files));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_fresh_install_is_all_adds() {
        let plan = diff(
            &target(&[("mods/a.jar", b"a"), ("mods/b.jar", b"b")]),
            &InstallationState::fresh(),
        );
        assert_eq!(plan.summary(), (2, 0, 0));
    }

    #[test]
    fn test_duplicate_identities_hinted() {
        let shared: &[u8] = b"shared bytes";
        let plan = diff(
            &target(&[("mods/a.jar", shared), ("mods/b.jar", shared), ("mods/c.jar", b"unique")]),
            &InstallationState::fresh(),
        );

        assert_eq!(plan.duplicate_fetches.len(), 1);
        let paths = &plan.duplicate_fetches[&Identity::of_bytes(shared)];
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_packmode_switch_scenario() {
        // Manifest: a.jar {client}, b.jar {server}, c.cfg {client,server};
        // active set {server}; local disk has a.jar and a matching c.cfg.
        let target = target(&[("mods/b.jar", b"b"), ("config/c.cfg", b"c")]);
        let local = local(&[("mods/a.jar", b"a"), ("config/c.cfg", b"c")]);

        let plan = diff(&target, &local);
        assert_eq!(plan.ops.len(), 2);
        assert_eq!(
            plan.ops[0],
            Operation::Remove {
                path: path("mods/a.jar")
            }
        );
        assert!(matches!(
            &plan.ops[1],
            Operation::Add { path, .. } if path.as_str() == "mods/b.jar"
        ));
    }

    #[test]
    fn test_diff_then_apply_then_diff_is_empty() {
        // Simulate a completed apply by replaying the plan into the state.
        let target = target(&[("mods/a.jar", b"a2"), ("mods/new.jar", b"n")]);
        let mut local = local(&[("mods/a.jar", b"a1"), ("mods/old.jar", b"o")]);

        for op in &diff(&target, &local).ops {
            match op {
                Operation::Remove { path } => local.forget_file(path),
                Operation::Add { path, identity } | Operation::Replace {
                    path,
                    new: identity,
                    ..
                } => local.record_file(path.clone(), identity.clone()),
            }
        }

        assert!(diff(&target, &local).is_empty());
    }
}
