//! Packmode dependency graph
//!
//! Packmodes may declare parent packmodes: selecting `client-hd` also pulls
//! in everything tagged `client` if `client-hd` depends on `client`. Every
//! packmode implicitly depends on the root packmode `server`, which itself
//! may not declare dependencies.

use packsync_types::{Error, Packmode, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Dependency declarations between packmodes
///
/// Maps each declared packmode to its parent packmodes. Validated on
/// construction: the root packmode may not appear as a key, dependencies
/// must be declared, and the graph must be acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Packmode, BTreeSet<Packmode>>")]
#[serde(into = "BTreeMap<Packmode, BTreeSet<Packmode>>")]
pub struct PackmodeGraph {
    parents: BTreeMap<Packmode, BTreeSet<Packmode>>,
}

impl PackmodeGraph {
    /// Create a validated packmode graph
    pub fn new(parents: BTreeMap<Packmode, BTreeSet<Packmode>>) -> Result<Self> {
        if parents.contains_key(&Packmode::server()) {
            return Err(Error::manifest_conflict(format!(
                "packmode '{}' cannot declare dependencies",
                Packmode::ROOT
            )));
        }

        let graph = Self { parents };
        graph.check_defined()?;
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// All declared packmodes plus the implicit root
    pub fn defined(&self) -> BTreeSet<Packmode> {
        let mut all: BTreeSet<Packmode> = self.parents.keys().cloned().collect();
        all.insert(Packmode::server());
        all
    }

    /// Check whether a packmode is declared (or is the root)
    pub fn contains(&self, packmode: &Packmode) -> bool {
        packmode.is_root() || self.parents.contains_key(packmode)
    }

    /// Expand an active packmode selection to its dependency closure
    ///
    /// The closure always contains the root packmode. Selecting an
    /// undeclared packmode is an error.
    pub fn closure(&self, active: &BTreeSet<Packmode>) -> Result<BTreeSet<Packmode>> {
        for packmode in active {
            if !self.contains(packmode) {
                return Err(Error::UndefinedPackmode {
                    packmode: packmode.to_string(),
                    referenced_by: "active packmode selection".to_string(),
                });
            }
        }

        let mut closure = BTreeSet::from([Packmode::server()]);
        let mut stack: Vec<Packmode> = active.iter().cloned().collect();
        while let Some(packmode) = stack.pop() {
            if closure.insert(packmode.clone()) {
                if let Some(parents) = self.parents.get(&packmode) {
                    stack.extend(parents.iter().cloned());
                }
            }
        }
        Ok(closure)
    }

    fn check_defined(&self) -> Result<()> {
        for (packmode, parents) in &self.parents {
            for parent in parents {
                if !self.contains(parent) {
                    return Err(Error::UndefinedPackmode {
                        packmode: parent.to_string(),
                        referenced_by: format!("packmode '{}'", packmode),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: BTreeMap<&Packmode, Mark> = self
            .parents
            .keys()
            .map(|p| (p, Mark::Unvisited))
            .collect();

        // Depth-first walk along parent edges; a back edge is a cycle.
        fn visit<'a>(
            node: &'a Packmode,
            parents: &'a BTreeMap<Packmode, BTreeSet<Packmode>>,
            marks: &mut BTreeMap<&'a Packmode, Mark>,
            path: &mut Vec<&'a Packmode>,
        ) -> Result<()> {
            match marks.get(node).copied() {
                None | Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => {
                    let start = path.iter().position(|p| *p == node).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|p| p.to_string()).collect();
                    cycle.push(node.to_string());
                    return Err(Error::CircularDependency { cycle });
                }
                Some(Mark::Unvisited) => {}
            }

            marks.insert(node, Mark::InProgress);
            path.push(node);
            if let Some(deps) = parents.get(node) {
                for dep in deps {
                    visit(dep, parents, marks, path)?;
                }
            }
            path.pop();
            marks.insert(node, Mark::Done);
            Ok(())
        }

        let mut path = Vec::new();
        for node in self.parents.keys() {
            visit(node, &self.parents, &mut marks, &mut path)?;
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<Packmode, BTreeSet<Packmode>>> for PackmodeGraph {
    type Error = Error;

    fn try_from(parents: BTreeMap<Packmode, BTreeSet<Packmode>>) -> Result<Self> {
        Self::new(parents)
    }
}

impl From<PackmodeGraph> for BTreeMap<Packmode, BTreeSet<Packmode>> {
    fn from(graph: PackmodeGraph) -> Self {
        graph.parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pm(name: &str) -> Packmode {
        Packmode::new(name).unwrap()
    }

    fn graph(edges: &[(&str, &[&str])]) -> Result<PackmodeGraph> {
        PackmodeGraph::new(
            edges
                .iter()
                .map(|(name, parents)| (pm(name), parents.iter().map(|p| pm(p)).collect()))
                .collect(),
        )
    }

    #[test]
    fn test_closure_includes_implicit_root() {
        let g = graph(&[("client", &[]), ("client-hd", &["client"])]).unwrap();
        let closure = g.closure(&BTreeSet::from([pm("client-hd")])).unwrap();

        assert!(closure.contains(&Packmode::server()));
        assert!(closure.contains(&pm("client")));
        assert!(closure.contains(&pm("client-hd")));
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn test_empty_selection_is_just_root() {
        let g = graph(&[("client", &[])]).unwrap();
        let closure = g.closure(&BTreeSet::new()).unwrap();
        assert_eq!(closure, BTreeSet::from([Packmode::server()]));
    }

    #[test]
    fn test_undefined_active_packmode_rejected() {
        let g = graph(&[("client", &[])]).unwrap();
        let err = g.closure(&BTreeSet::from([pm("nope")])).unwrap_err();
        assert!(matches!(err, Error::UndefinedPackmode { .. }));
    }

    #[test]
    fn test_undefined_dependency_rejected() {
        let err = graph(&[("client", &["missing"])]).unwrap_err();
        assert!(matches!(err, Error::UndefinedPackmode { .. }));
    }

    #[test]
    fn test_root_cannot_declare_dependencies() {
        let err = graph(&[("server", &["client"]), ("client", &[])]).unwrap_err();
        assert!(matches!(err, Error::ManifestConflict { .. }));
    }

    #[test]
    fn test_cycle_detected() {
        let err = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]).unwrap_err();
        match err {
            Error::CircularDependency { cycle } => {
                assert!(cycle.len() >= 3);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let g = graph(&[
            ("base", &[]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("top", &["left", "right"]),
        ])
        .unwrap();
        let closure = g.closure(&BTreeSet::from([pm("top")])).unwrap();
        assert_eq!(closure.len(), 5);
    }

    #[test]
    fn test_root_always_selectable() {
        let g = PackmodeGraph::default();
        let closure = g.closure(&BTreeSet::from([Packmode::server()])).unwrap();
        assert_eq!(closure, BTreeSet::from([Packmode::server()]));
    }
}
