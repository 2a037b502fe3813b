//! Entity traits and checksum helpers.
//!
//! Entities are plain serde types. Stores keep them as JSON and hand back
//! typed values only through checked deserialization, so no store ever
//! downcasts an erased entity.

use crate::error::CoreResult;
use crate::types::{CoreEntityId, CoreEntityTypeName, SystemEntityId};
use centazio_checksum::{ChecksumAlgorithm, CoreEntityChecksum, SystemEntityChecksum};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A canonical, system-agnostic record.
pub trait CoreEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The declared core type this entity belongs to.
    fn core_type() -> CoreEntityTypeName;

    /// The canonical id, or `None` while the entity is a fresh candidate.
    fn core_id(&self) -> Option<&CoreEntityId>;

    /// Assigns the canonical id.
    fn set_core_id(&mut self, id: CoreEntityId);

    /// A short human-readable label used in logs and messages.
    fn display_name(&self) -> String;

    /// The meaningful fields used for change detection.
    ///
    /// Never include ids or timestamps here.
    fn checksum_subject(&self) -> Value;
}

/// A record in an external system's native shape.
pub trait SystemEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The id assigned by the external system, or `None` before creation.
    fn system_id(&self) -> Option<&SystemEntityId>;

    /// Assigns the external id.
    fn set_system_id(&mut self, id: SystemEntityId);

    /// When the external system last changed this record.
    fn last_updated(&self) -> DateTime<Utc>;

    /// A short human-readable label used in logs and messages.
    fn display_name(&self) -> String;

    /// The meaningful fields used for change detection.
    ///
    /// Never include ids or timestamps here.
    fn checksum_subject(&self) -> Value;
}

/// Checksums a core entity's declared subset.
///
/// Fails if the entity has no core id yet.
pub fn core_checksum<E: CoreEntity>(
    algorithm: &dyn ChecksumAlgorithm,
    entity: &E,
) -> CoreResult<CoreEntityChecksum> {
    let label = format!("{}[{}]", E::core_type(), entity.display_name());
    let digest = algorithm.checksum_subject(
        &label,
        entity.core_id().map(CoreEntityId::as_str),
        &entity.checksum_subject(),
    )?;
    Ok(CoreEntityChecksum::new(digest))
}

/// Checksums a system entity's declared subset.
///
/// Fails if the entity has no system id yet.
pub fn system_checksum<E: SystemEntity>(
    algorithm: &dyn ChecksumAlgorithm,
    entity: &E,
) -> CoreResult<SystemEntityChecksum> {
    let digest = algorithm.checksum_subject(
        &entity.display_name(),
        entity.system_id().map(SystemEntityId::as_str),
        &entity.checksum_subject(),
    )?;
    Ok(SystemEntityChecksum::new(digest))
}


#[cfg(test)]
mod tests {
    use super::test_entities::Person;
    use super::*;
    use crate::error::CoreError;
    use centazio_checksum::{ChecksumError, Sha256Checksum};

    fn person(id: Option<&str>, name: &str, updated_secs: i64) -> Person {
        Person {
            id: id.map(CoreEntityId::new),
            name: name.into(),
            updated: DateTime::from_timestamp(updated_secs, 0).unwrap(),
        }
    }

    #[test]
    fn checksum_requires_core_id() {
        let err = core_checksum(&Sha256Checksum, &person(None, "Jane", 0)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Checksum(ChecksumError::MissingId { .. })
        ));
    }

    #[test]
    fn checksum_ignores_non_meaningful_fields() {
        let a = core_checksum(&Sha256Checksum, &person(Some("1"), "Jane", 0)).unwrap();
        let b = core_checksum(&Sha256Checksum, &person(Some("1"), "Jane", 999)).unwrap();
        let c = core_checksum(&Sha256Checksum, &person(Some("1"), "Janet", 0)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
