//! # Centazio Core
//!
//! Data model and stores for the Centazio sync pipeline.
//!
//! This crate provides:
//! - Names, ids and lifecycle stages
//! - Entity traits with checksum-subject declarations
//! - Staged entity store (raw payloads awaiting promotion)
//! - Core storage (canonical entities with provenance)
//! - Core-to-system mappings with unique indexes on both ids
//! - Control repository (system and object run state, checkpoints)
//! - A pluggable clock
//!
//! Every store is an async trait with an in-memory implementation.
//!
//! ## Key Invariants
//!
//! - Staging the same payload twice for a (system, type) stores it once
//! - A mapping row is unique by core id and by system id
//! - Control rows are created and saved explicitly, never upserted
//! - Checkpoints never move backwards

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod core_storage;
mod ctl;
mod entity;
mod error;
mod map;
mod staged;
mod types;

pub use clock::{Clock, SystemClock, TestClock};
pub use core_storage::{CoreEntityAndMeta, CoreStorage, CoreStorageMeta, InMemoryCoreStorage};
pub use ctl::{
    AbortVote, CtlRepository, InMemoryCtlRepository, ObjectState, OperationStatus, StartOutcome,
    SystemRunStatus, SystemState,
};
pub use entity::{core_checksum, system_checksum, CoreEntity, SystemEntity};
pub use error::{CoreError, CoreResult, MapKey};
pub use map::{
    CoreAndPendingCreateMap, CoreAndPendingUpdateMap, CoreToSysMap, CoreToSysMapStore,
    InMemoryCoreToSysMapStore, MapStatus, NewCoreToSysMap,
};
pub use staged::{InMemoryStagedEntityStore, StagedEntity, StagedEntityStore};
pub use types::{
    CoreEntityId, CoreEntityTypeName, LifecycleStage, ObjectName, SystemEntityId,
    SystemEntityTypeName, SystemName,
};
