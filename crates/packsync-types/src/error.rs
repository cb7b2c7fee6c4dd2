//! Error types and handling for packsync
//!
//! The error taxonomy distinguishes fatal pre-flight failures (an ambiguous
//! manifest, a concurrent sync holding the installation lock) from per-file
//! failures that are collected into an apply report without aborting the
//! remaining operations.

use std::path::PathBuf;

/// Main error type for packsync operations
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The manifest is ambiguous and must be fixed upstream
    #[error("manifest conflict: {message}")]
    ManifestConflict {
        /// Description of the conflicting entries
        message: String,
    },

    /// A packmode is referenced but never defined
    #[error("packmode '{packmode}' is undefined (referenced by {referenced_by})")]
    UndefinedPackmode {
        /// Name of the undefined packmode
        packmode: String,
        /// The entry or packmode that references it
        referenced_by: String,
    },

    /// The packmode dependency graph contains a cycle
    #[error("circular packmode dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The packmode names forming the cycle
        cycle: Vec<String>,
    },

    /// Fetched content does not match the expected identity
    #[error("integrity mismatch for '{path}': expected {expected}, got {actual}")]
    Integrity {
        /// Path the content was fetched for
        path: String,
        /// Expected identity
        expected: String,
        /// Identity actually observed
        actual: String,
    },

    /// The content source failed transiently (network, FTP, timeout)
    #[error("source unavailable for '{origin}': {message}")]
    SourceUnavailable {
        /// Origin reference the fetch was issued for
        origin: String,
        /// Underlying transport error
        message: String,
    },

    /// The content source has no content for the requested origin
    #[error("source has no content for '{origin}'")]
    SourceNotFound {
        /// Origin reference that was not found
        origin: String,
    },

    /// Local filesystem operation failed (permissions, disk full)
    #[error("filesystem error: {message}")]
    Filesystem {
        /// Error message including the affected path
        message: String,
    },

    /// Another sync already holds the installation lock
    #[error("another sync is already running on '{}'", path.display())]
    AlreadySyncing {
        /// Installation directory the lock protects
        path: PathBuf,
    },

    /// Operation cancelled cooperatively
    #[error("operation cancelled")]
    Cancelled,

    /// Manifest or document could not be parsed
    #[error("parse error: {message}")]
    Parse {
        /// Description of the malformed input
        message: String,
    },

    /// Installation state could not be loaded or persisted
    #[error("installation state error: {message}")]
    State {
        /// Description of the state failure
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Ambiguous manifest
    ManifestConflict,
    /// Content identity mismatch
    Integrity,
    /// Transient source failure
    SourceUnavailable,
    /// Permanent missing content
    SourceNotFound,
    /// Local filesystem failure
    Filesystem,
    /// Lock contention
    AlreadySyncing,
    /// Cooperative cancellation
    Cancelled,
    /// Malformed input
    Parse,
    /// State persistence failure
    State,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ManifestConflict { .. }
            | Self::UndefinedPackmode { .. }
            | Self::CircularDependency { .. } => ErrorKind::ManifestConflict,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::AlreadySyncing { .. } => ErrorKind::AlreadySyncing,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::State { .. } => ErrorKind::State,
        }
    }

    /// Check if this error should trigger a backoff retry
    ///
    /// Only transient source failures qualify. Integrity mismatches get a
    /// single extra attempt, which the apply engine handles separately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }

    /// Check if this error aborts the sync before any operation runs
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ManifestConflict | ErrorKind::AlreadySyncing
        )
    }

    /// Create a new manifest conflict error
    pub fn manifest_conflict<S: Into<String>>(message: S) -> Self {
        Self::ManifestConflict {
            message: message.into(),
        }
    }

    /// Create a new transient source error
    pub fn source_unavailable<O: Into<String>, S: Into<String>>(origin: O, message: S) -> Self {
        Self::SourceUnavailable {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create a new missing-content source error
    pub fn source_not_found<O: Into<String>>(origin: O) -> Self {
        Self::SourceNotFound {
            origin: origin.into(),
        }
    }

    /// Create a new filesystem error
    pub fn filesystem<S: Into<String>>(message: S) -> Self {
        Self::Filesystem {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new state persistence error
    pub fn state<S: Into<String>>(message: S) -> Self {
        Self::State {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Filesystem {
            message: error.to_string(),
        }
    }
}
