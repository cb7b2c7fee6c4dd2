//! Local-directory source adapter
//!
//! Serves content from a pack snapshot directory: a `pack-manifest.json` at
//! the root plus payload files addressed by their origin reference. This is
//! the transport used for local zip-extracted releases and for test
//! fixtures; HTTP and FTP adapters implement the same trait externally.

use async_trait::async_trait;
use packsync_types::{ByteStream, Error, Origin, Result, SourceAdapter};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the manifest document inside a snapshot directory
pub const MANIFEST_FILE_NAME: &str = "pack-manifest.json";

/// Source adapter reading from a local snapshot directory
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Create an adapter rooted at a snapshot directory
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, origin: &Origin) -> Result<PathBuf> {
        // Origins are resolved like manifest paths: relative, no escapes.
        let relative = packsync_types::RelPath::new(origin.as_str())
            .map_err(|_| Error::source_not_found(origin.as_str()))?;
        Ok(relative.to_fs_path(&self.root))
    }
}

#[async_trait]
impl SourceAdapter for DirSource {
    async fn fetch(&self, origin: &Origin) -> Result<ByteStream> {
        let path = self.resolve(origin)?;
        debug!("Opening '{}' for origin '{}'", path.display(), origin);

        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::source_not_found(origin.as_str()))
            }
            Err(e) => Err(Error::source_unavailable(origin.as_str(), e.to_string())),
        }
    }

    async fn fetch_manifest(&self) -> Result<Vec<u8>> {
        let path = self.root.join(MANIFEST_FILE_NAME);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::source_not_found(MANIFEST_FILE_NAME))
            }
            Err(e) => Err(Error::source_unavailable(MANIFEST_FILE_NAME, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn read_all(mut stream: ByteStream) -> Vec<u8> {
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_fetch_reads_content() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("mods")).await.unwrap();
        fs::write(dir.path().join("mods/a.jar"), b"jar bytes")
            .await
            .unwrap();

        let source = DirSource::new(dir.path());
        let stream = source.fetch(&Origin::new("mods/a.jar")).await.unwrap();
        assert_eq!(read_all(stream).await, b"jar bytes");
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = DirSource::new(dir.path());

        let err = source.fetch(&Origin::new("mods/ghost.jar")).await.err().unwrap();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_escaping_origin_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = DirSource::new(dir.path());

        let err = source
            .fetch(&Origin::new("../../etc/passwd"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE_NAME), b"{}")
            .await
            .unwrap();

        let source = DirSource::new(dir.path());
        assert_eq!(source.fetch_manifest().await.unwrap(), b"{}");

        let empty = DirSource::new(dir.path().join("missing"));
        assert!(matches!(
            empty.fetch_manifest().await.unwrap_err(),
            Error::SourceNotFound { .. }
        ));
    }
}
