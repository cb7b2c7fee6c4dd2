//! Change plans
//!
//! A change plan is the transient output of one diff: an ordered sequence
//! of add/remove/replace operations transforming the local installation
//! into the target state. Plans are consumed once and never persisted; an
//! interrupted sync recomputes a fresh plan from disk state.

use packsync_types::{Identity, RelPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One operation of a change plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a file that does not exist locally
    Add {
        /// Path to create
        path: RelPath,
        /// Expected content identity
        identity: Identity,
    },
    /// Delete a local file absent from the target
    Remove {
        /// Path to delete
        path: RelPath,
    },
    /// Atomically swap a file's content for a new identity
    Replace {
        /// Path to replace
        path: RelPath,
        /// Identity currently recorded on disk
        old: Identity,
        /// Expected new identity
        new: Identity,
    },
}

impl Operation {
    /// The path this operation touches
    pub fn path(&self) -> &RelPath {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }

    /// The identity this operation needs to fetch, if any
    pub fn fetch_identity(&self) -> Option<&Identity> {
        match self {
            Self::Add { identity, .. } => Some(identity),
            Self::Replace { new, .. } => Some(new),
            Self::Remove { .. } => None,
        }
    }

    /// Check whether this is a removal
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { path, identity } => write!(f, "ADD     {} ({})", path, identity),
            Self::Remove { path } => write!(f, "REMOVE  {}", path),
            Self::Replace { path, old, new } => {
                write!(f, "REPLACE {} ({} -> {})", path, old, new)
            }
        }
    }
}

/// Ordered sequence of operations plus fetch-deduplication hints
///
/// The hint map lists identities needed by more than one add/replace; the
/// apply engine may fetch such content once and copy it locally. It is an
/// optimization hint, never a correctness requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePlan {
    /// Operations in apply order: removals first, then fetches
    pub ops: Vec<Operation>,
    /// Identities wanted at more than one path
    pub duplicate_fetches: BTreeMap<Identity, Vec<RelPath>>,
}

impl ChangePlan {
    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// An empty plan is a valid, successful outcome: already up to date
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over removal operations
    pub fn removes(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter(|op| op.is_remove())
    }

    /// Iterate over operations that fetch content
    pub fn fetches(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter(|op| !op.is_remove())
    }

    /// Counts of (adds, removes, replaces)
    pub fn summary(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for op in &self.ops {
            match op {
                Operation::Add { .. } => counts.0 += 1,
                Operation::Remove { .. } => counts.1 += 1,
                Operation::Replace { .. } => counts.2 += 1,
            }
        }
        counts
    }
}

impl fmt::Display for ChangePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (adds, removes, replaces) = self.summary();
        write!(
            f,
            "{} operations ({} add, {} remove, {} replace)",
            self.len(),
            adds,
            removes,
            replaces
        )
    }
}
