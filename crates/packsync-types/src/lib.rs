//! Core type system and error handling for packsync
//!
//! This crate provides the foundational types shared across the packsync
//! workspace. It includes:
//!
//! - **Error handling**: Structured error types covering the whole sync
//!   taxonomy, with retry and fatality classification
//! - **Content addressing**: Path-independent file identities (hash + length)
//! - **Core types**: Normalized relative paths, packmode tags, pack versions
//! - **Traits**: The `SourceAdapter` capability consumed by the sync engine
//! - **Configuration**: Validated retry and worker-pool settings
//!
//! # Examples
//!
//! ```rust
//! use packsync_types::Identity;
//!
//! let a = Identity::of_bytes(b"forge-1.12.2.jar contents");
//! let b = Identity::of_bytes(b"forge-1.12.2.jar contents");
//! assert_eq!(a, b);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod identity;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{RetryConfig, WorkerCount};
pub use error::{Error, ErrorKind};
pub use identity::Identity;
pub use result::Result;
pub use traits::{ByteStream, SourceAdapter};
pub use types::{CancelFlag, Origin, PackVersion, Packmode, RelPath, RequestId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_content_addressed() {
        let a = Identity::of_bytes(b"same bytes");
        let b = Identity::of_bytes(b"same bytes");
        let c = Identity::of_bytes(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.size, 10);
    }

    #[test]
    fn test_error_classification() {
        let transient = Error::source_unavailable("mods/a.jar", "connection reset");
        assert!(transient.is_retryable());
        assert!(!transient.is_fatal());

        let conflict = Error::manifest_conflict("duplicate path 'mods/a.jar'");
        assert!(conflict.is_fatal());
        assert!(!conflict.is_retryable());
    }
}
