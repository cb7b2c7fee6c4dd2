//! Core traits for packsync operations
//!
//! The sync engine consumes content through the [`SourceAdapter`] capability
//! and never knows whether bytes come from a local snapshot directory, a zip
//! archive, an HTTP server, or FTP.

use crate::{Origin, Result};
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Byte stream returned by a source adapter fetch
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Pluggable fetcher for pack content
///
/// Implementations must report distinguishable outcomes so the apply engine
/// can decide whether to retry: [`Error::SourceNotFound`] for permanently
/// missing content, [`Error::SourceUnavailable`] for transient transport
/// failures, anything else for permanent errors.
///
/// [`Error::SourceNotFound`]: crate::Error::SourceNotFound
/// [`Error::SourceUnavailable`]: crate::Error::SourceUnavailable
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Open a byte stream for the content behind an origin reference
    async fn fetch(&self, origin: &Origin) -> Result<ByteStream>;

    /// Fetch the raw bytes of the published pack manifest
    ///
    /// The serialization format is the adapter's concern; the sync engine
    /// parses whatever document the adapter hands back.
    async fn fetch_manifest(&self) -> Result<Vec<u8>>;
}
