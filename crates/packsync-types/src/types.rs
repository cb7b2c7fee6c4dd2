//! Core data types for packsync
//!
//! Normalized relative paths, packmode tags, pack versions, and the opaque
//! origin references handed to source adapters.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Unique identifier for sync requests
pub type RequestId = uuid::Uuid;

/// Normalized relative path, the unique key of a file within a manifest
///
/// Always uses forward slashes, never absolute, never contains `.` or `..`
/// components. Construction is the only place normalization happens, so two
/// equal `RelPath` values always address the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Create a normalized relative path
    pub fn new<S: AsRef<str>>(raw: S) -> Result<Self> {
        let normalized = raw.as_ref().replace('\\', "/");
        let trimmed = normalized.trim_matches('/');

        if trimmed.is_empty() {
            return Err(Error::parse("relative path must not be empty"));
        }
        if normalized.starts_with('/') || has_drive_prefix(&normalized) {
            return Err(Error::parse(format!(
                "path '{}' must be relative",
                raw.as_ref()
            )));
        }
        for component in trimmed.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(Error::parse(format!(
                    "path '{}' contains an invalid component",
                    raw.as_ref()
                )));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the normalized path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve this path against an installation directory
    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        for component in self.0.split('/') {
            path.push(component);
        }
        path
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RelPath> for String {
    fn from(path: RelPath) -> Self {
        path.0
    }
}

/// A packmode tag partitioning pack content into installable subsets
///
/// Names are lowercase ASCII letters and dashes, e.g. `client-lite`. The
/// root packmode `server` always exists and is implicitly depended on by
/// every other packmode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Packmode(String);

impl Packmode {
    /// Name of the implicit root packmode
    pub const ROOT: &'static str = "server";

    /// Create a validated packmode tag
    pub fn new<S: AsRef<str>>(name: S) -> Result<Self> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(Error::parse("packmode name must not be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '-')
        {
            return Err(Error::parse(format!(
                "packmode '{}' must be lowercase letters and dashes",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The implicit root packmode every installation includes
    pub fn server() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Check whether this is the root packmode
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Get the packmode name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Packmode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Packmode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Packmode> for String {
    fn from(packmode: Packmode) -> Self {
        packmode.0
    }
}

/// Monotonic pack version marker of the form `major.minor.patch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackVersion {
    /// Major version component
    pub major: u32,
    /// Minor version component
    pub minor: u32,
    /// Patch version component
    pub patch: u32,
}

impl PackVersion {
    /// Create a pack version from its components
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The initial version of a never-synced installation
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }
}

impl FromStr for PackVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::parse(format!(
                "version '{}' must have the form major.minor.patch",
                s
            )));
        }
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| Error::parse(format!("version '{}' has a non-numeric component", s)))
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl fmt::Display for PackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for PackVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PackVersion> for String {
    fn from(version: PackVersion) -> Self {
        version.to_string()
    }
}

/// Opaque reference a source adapter uses to retrieve content
///
/// The core never interprets it; an adapter may treat it as an archive
/// member name, a URL suffix, or an FTP path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin(String);

impl Origin {
    /// Create an origin reference
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self(reference.into())
    }

    /// Get the raw reference string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cooperative cancellation flag shared between a sync driver and the
/// apply engine
///
/// Checked between operations only; an in-flight fetch either completes
/// or is abandoned with its temporary file discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a new, unset cancellation flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
