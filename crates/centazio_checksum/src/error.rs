//! Error types for the checksum crate.

use thiserror::Error;

/// Result type for checksum operations.
pub type ChecksumResult<T> = Result<T, ChecksumError>;

/// Errors that can occur while computing a checksum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// The entity has no canonical id yet.
    ///
    /// Checksumming placeholders would let two distinct records collide on
    /// the same digest, so this is always a hard error.
    #[error("cannot checksum {entity}: id has not been assigned")]
    MissingId {
        /// Short description of the entity being checksummed.
        entity: String,
    },

    /// The checksum subject could not be serialized.
    #[error("serialization failed: {message}")]
    SerializationFailed {
        /// Description of the failure.
        message: String,
    },
}

impl ChecksumError {
    /// Creates a missing id error.
    pub fn missing_id(entity: impl Into<String>) -> Self {
        Self::MissingId {
            entity: entity.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::SerializationFailed {
            message: message.into(),
        }
    }
}
