//! # Centazio Checksum
//!
//! Change detection for Centazio.
//!
//! Every entity declares a *checksum subject*: an explicit projection of the
//! fields that carry meaning. Ids, timestamps and other cosmetic fields stay
//! out of the subject, so a record that is re-delivered or touched without a
//! meaningful edit hashes to the same value.
//!
//! This crate provides:
//! - Canonical JSON encoding (sorted keys, no whitespace)
//! - The [`ChecksumAlgorithm`] trait and a SHA-256 implementation
//! - Checksum value types for staged, system and core entities
//!
//! ## Usage
//!
//! ```
//! use centazio_checksum::{ChecksumAlgorithm, Sha256Checksum};
//! use serde_json::json;
//!
//! let subject = json!({"name": "Jane", "email": "jane@example.com"});
//! let checksum = Sha256Checksum
//!     .checksum_subject("CoreCustomer", Some("c-1"), &subject)
//!     .unwrap();
//! assert_eq!(checksum.len(), 64);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod canonical;
mod digest;
mod error;

pub use canonical::{to_canonical_json, CanonicalEncoder};
pub use digest::{
    ChecksumAlgorithm, CoreEntityChecksum, Sha256Checksum, StagedEntityChecksum,
    SystemEntityChecksum,
};
pub use error::{ChecksumError, ChecksumResult};
