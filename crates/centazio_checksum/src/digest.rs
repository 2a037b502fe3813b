//! Checksum algorithms and checksum value types.

use crate::canonical::to_canonical_json;
use crate::error::{ChecksumError, ChecksumResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! checksum_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an already computed digest.
            pub fn new(digest: impl Into<String>) -> Self {
                Self(digest.into())
            }

            /// Returns the hex digest.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

checksum_type!(
    /// Checksum of a raw staged payload, used to dedupe on ingest.
    StagedEntityChecksum
);
checksum_type!(
    /// Checksum of a system entity's meaningful fields.
    SystemEntityChecksum
);
checksum_type!(
    /// Checksum of a core entity's meaningful fields.
    CoreEntityChecksum
);

/// A digest function used for change detection.
///
/// Implementations must be deterministic: the same bytes always produce the
/// same digest, across processes and platforms.
pub trait ChecksumAlgorithm: Send + Sync {
    /// Returns the lowercase hex digest of `bytes`.
    fn digest(&self, bytes: &[u8]) -> String;

    /// Checksums a raw payload exactly as received.
    fn checksum_raw(&self, data: &str) -> StagedEntityChecksum {
        StagedEntityChecksum(self.digest(data.as_bytes()))
    }

    /// Checksums an entity's declared subset of meaningful fields.
    ///
    /// `id` is the entity's canonical id. It is not part of the digest, but
    /// it must be assigned: hashing an entity that still carries a
    /// placeholder id fails with [`ChecksumError::MissingId`].
    fn checksum_subject(&self, label: &str, id: Option<&str>, subject: &Value) -> ChecksumResult<String> {
        match id {
            Some(id) if !id.trim().is_empty() => {}
            _ => return Err(ChecksumError::missing_id(label)),
        }
        Ok(self.digest(&to_canonical_json(subject)?))
    }
}

/// SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Checksum;

impl ChecksumAlgorithm for Sha256Checksum {
    fn digest(&self, bytes: &[u8]) -> String {
        let hash = Sha256::digest(bytes);
        let mut out = String::with_capacity(hash.len() * 2);
        for byte in hash {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}
