//! Content addressing for pack files
//!
//! An [`Identity`] is the path-independent fingerprint of a file's content:
//! a blake3 digest plus the byte length. Two files with equal identities are
//! interchangeable regardless of where they live or how they got there.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Buffer size for streaming hash computation
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hex digest length of a 256-bit blake3 hash
const HASH_HEX_LEN: usize = 64;

/// Content identity: blake3 hash (hex) plus byte length
///
/// Deserialization validates the digest, so an identity read from an
/// adapter-supplied document is always 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawIdentity")]
pub struct Identity {
    /// Hex-encoded blake3 digest of the content
    pub hash: String,
    /// Content length in bytes
    pub size: u64,
}

/// Unvalidated identity as it appears on the wire
#[derive(Deserialize)]
struct RawIdentity {
    hash: String,
    size: u64,
}

impl TryFrom<RawIdentity> for Identity {
    type Error = Error;

    fn try_from(raw: RawIdentity) -> Result<Self> {
        if raw.hash.len() != HASH_HEX_LEN
            || !raw
                .hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(Error::parse(format!(
                "content hash '{}' is not a {}-character lowercase hex digest",
                raw.hash, HASH_HEX_LEN
            )));
        }
        Ok(Self {
            hash: raw.hash,
            size: raw.size,
        })
    }
}

impl Identity {
    /// Compute the identity of an in-memory byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self {
            hash: blake3::hash(bytes).to_hex().to_string(),
            size: bytes.len() as u64,
        }
    }

    /// Compute the identity of a byte stream without buffering it whole
    pub async fn of_reader<R: AsyncRead + Unpin>(mut reader: R) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
        }

        Ok(Self {
            hash: hasher.finalize().to_hex().to_string(),
            size,
        })
    }

    /// Short hash prefix for log output
    pub fn short(&self) -> &str {
        self.hash.get(..8).unwrap_or(&self.hash)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}B", self.short(), self.size)
    }
}
