//! Error types for Centazio core.

use crate::types::{CoreEntityId, CoreEntityTypeName, LifecycleStage, ObjectName, SystemEntityId, SystemName};
use centazio_checksum::ChecksumError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Which key of a `CoreToSysMap` row collided on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    /// (system, core type, core id) already mapped.
    CoreId(CoreEntityId),
    /// (system, core type, system id) already mapped.
    SystemId(SystemEntityId),
}

/// Errors raised by the entity and control stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Checksum computation failed.
    #[error("checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// Entity (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A staged payload was empty.
    #[error("empty payload staged for {system}/{system_entity_type}")]
    EmptyPayload {
        /// Source system.
        system: SystemName,
        /// Source entity type.
        system_entity_type: String,
    },

    /// An update referenced a staged entity that does not exist.
    #[error("staged entity not found: {id}")]
    StagedEntityNotFound {
        /// Id of the missing row.
        id: Uuid,
    },

    /// `create_system_state` found an existing row.
    #[error("system state already exists: {system}/{stage}")]
    DuplicateSystemState {
        /// System name.
        system: SystemName,
        /// Lifecycle stage.
        stage: LifecycleStage,
    },

    /// `save_system_state` found no row to save over.
    #[error("system state not found: {system}/{stage}")]
    SystemStateNotFound {
        /// System name.
        system: SystemName,
        /// Lifecycle stage.
        stage: LifecycleStage,
    },

    /// `create_object_state` found an existing row.
    #[error("object state already exists: {system}/{stage}/{object}")]
    DuplicateObjectState {
        /// System name.
        system: SystemName,
        /// Lifecycle stage.
        stage: LifecycleStage,
        /// Object name.
        object: ObjectName,
    },

    /// `save_object_state` found no row to save over.
    #[error("object state not found: {system}/{stage}/{object}")]
    ObjectStateNotFound {
        /// System name.
        system: SystemName,
        /// Lifecycle stage.
        stage: LifecycleStage,
        /// Object name.
        object: ObjectName,
    },

    /// A mapping create collided with an existing row.
    ///
    /// This signals a bounce-back or concurrency bug upstream and is never
    /// retried.
    #[error("duplicate CoreToSystemMap for {system}/{core_type}: {key:?}")]
    DuplicateMapping {
        /// Target system.
        system: SystemName,
        /// Core entity type.
        core_type: CoreEntityTypeName,
        /// The colliding key.
        key: MapKey,
    },

    /// Core storage has no table for this core type.
    #[error("core entity type not declared: {0}")]
    UnknownCoreType(CoreEntityTypeName),

    /// A typed read asked for the wrong core type.
    #[error("core entity type mismatch: stored {stored}, requested {requested}")]
    CoreTypeMismatch {
        /// Type recorded on the row.
        stored: CoreEntityTypeName,
        /// Type the caller asked for.
        requested: CoreEntityTypeName,
    },

    /// An entity reached storage without an id.
    #[error("missing id: {0}")]
    MissingId(String),

    /// The storage backend failed, e.g. a lost connection.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl CoreError {
    /// Returns true for errors that indicate inconsistent data rather than
    /// infrastructure failure.
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateMapping { .. }
                | CoreError::DuplicateSystemState { .. }
                | CoreError::DuplicateObjectState { .. }
                | CoreError::MissingId(_)
                | CoreError::Checksum(ChecksumError::MissingId { .. })
        )
    }
}
