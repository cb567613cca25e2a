//! Content digests for blobs, layers and manifests.
//!
//! Everything the store keeps is addressed by a [`Digest`] of the form
//! `sha256:<64 hex chars>`. Besides hashing raw bytes this module knows how to
//! recover a digest from the blob paths used inside `docker save` archives and
//! how to produce canonical JSON, so that serializing the same document twice
//! always hashes to the same digest.

use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const ALGORITHM: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest '{0}': expected sha256:<64 hex chars>")]
pub struct InvalidDigest(pub String);

impl Digest {
    /// Hashes `bytes` with sha256.
    pub fn of(bytes: &[u8]) -> Self {
        Digest(format!("{}:{}", ALGORITHM, hex::encode(Sha256::digest(bytes))))
    }

    /// The hex part, without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM.len() + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in logs and reports.
    pub fn short(&self) -> &str {
        &self.hex()[..12]
    }

    /// Recovers the digest of a layer blob from its path inside an image archive.
    ///
    /// Only OCI style `blobs/sha256/<hex>` paths carry one; legacy
    /// `<id>/layer.tar` directories are named by layer id, not content.
    pub fn from_blob_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if parent.file_name().and_then(|s| s.to_str()) == Some(ALGORITHM) {
                if let Some(hex) = path.file_name().and_then(|s| s.to_str()) {
                    return Self::from_hex(hex).ok();
                }
            }
        }

        None
    }

    fn from_hex(hex: &str) -> Result<Self, InvalidDigest> {
        format!("{}:{}", ALGORITHM, hex).parse()
    }
}

impl FromStr for Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix(ALGORITHM)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| InvalidDigest(s.to_string()))?;

        let valid = hex.len() == 64
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(InvalidDigest(s.to_string()));
        }

        Ok(Digest(s.to_string()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializes `value` as JSON with object keys sorted.
///
/// Going through `serde_json::Value` drops the iteration order of any
/// `HashMap` inside `value`; the resulting bytes depend only on its content.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}
