//! Core-to-system mappings.
//!
//! Every core entity that has ever been associated with an external record
//! has exactly one mapping row per system. The rows are what keep a record
//! written to system B from coming back as a brand-new core entity when B
//! later reports it.

mod memory;

pub use memory::InMemoryCoreToSysMapStore;

use crate::core_storage::CoreEntityAndMeta;
use crate::error::CoreResult;
use crate::types::{CoreEntityId, CoreEntityTypeName, SystemEntityId, SystemName};
use async_trait::async_trait;
use centazio_checksum::SystemEntityChecksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State of the last write through a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapStatus {
    /// The external record was created (or first promoted) successfully.
    Created,
    /// The external record was updated successfully.
    Updated,
    /// The last update attempt failed.
    UpdateFailed,
}

/// One (system, core type) mapping between a core id and a system id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreToSysMap {
    /// External system.
    pub system: SystemName,
    /// Core entity type.
    pub core_type: CoreEntityTypeName,
    /// Canonical id.
    pub core_id: CoreEntityId,
    /// Id in `system`.
    pub system_id: SystemEntityId,
    /// Last write status.
    pub status: MapStatus,
    /// Checksum of the system entity as last written or read.
    pub checksum: SystemEntityChecksum,
    /// When the row was created.
    pub date_created: DateTime<Utc>,
    /// When the row was last updated.
    pub date_updated: DateTime<Utc>,
    /// When the last successful write happened.
    pub date_last_success: Option<DateTime<Utc>>,
    /// When the last failed write happened.
    pub date_last_error: Option<DateTime<Utc>>,
    /// Detail of the last failed write.
    pub last_error: Option<String>,
}

impl CoreToSysMap {
    /// Records a successful update with the new checksum.
    pub fn updated(mut self, checksum: SystemEntityChecksum, now: DateTime<Utc>) -> Self {
        self.status = MapStatus::Updated;
        self.checksum = checksum;
        self.date_updated = now;
        self.date_last_success = Some(now);
        self.last_error = None;
        self
    }

    /// Records a failed write. The checksum is kept so the change is retried.
    pub fn failed(mut self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.status = MapStatus::UpdateFailed;
        self.date_updated = now;
        self.date_last_error = Some(now);
        self.last_error = Some(error.into());
        self
    }
}

/// A mapping to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCoreToSysMap {
    /// Canonical id.
    pub core_id: CoreEntityId,
    /// Id in the target system.
    pub system_id: SystemEntityId,
    /// Checksum of the system entity.
    pub checksum: SystemEntityChecksum,
}

/// A core entity with no mapping yet for the target system.
#[derive(Debug, Clone)]
pub struct CoreAndPendingCreateMap {
    /// The core entity.
    pub core: CoreEntityAndMeta,
    /// The target system.
    pub system: SystemName,
}

/// A core entity already mapped in the target system.
#[derive(Debug, Clone)]
pub struct CoreAndPendingUpdateMap {
    /// The core entity.
    pub core: CoreEntityAndMeta,
    /// Its existing mapping.
    pub map: CoreToSysMap,
}

/// Storage for core-to-system mappings.
///
/// # Invariants
///
/// For every (system, core type) no two rows share a core id and no two
/// rows share a system id.
#[async_trait]
pub trait CoreToSysMapStore: Send + Sync {
    /// Inserts new mappings.
    ///
    /// Any collision on either key, against stored rows or within the
    /// batch, fails with [`crate::CoreError::DuplicateMapping`] and nothing
    /// is inserted.
    async fn create(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<NewCoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>>;

    /// Updates status, checksum and error fields of existing mappings,
    /// matched by core id.
    ///
    /// Rows that do not exist are skipped silently. Returns the rows that
    /// were updated.
    async fn update(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<CoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>>;

    /// Splits core entities into those not yet mapped in `system` and those
    /// already mapped.
    async fn get_new_and_existing_mappings_from_cores(
        &self,
        system: &SystemName,
        cores: Vec<CoreEntityAndMeta>,
    ) -> CoreResult<(Vec<CoreAndPendingCreateMap>, Vec<CoreAndPendingUpdateMap>)>;

    /// Resolves system ids to the core ids they are already mapped to.
    ///
    /// Ids with no mapping are absent from the result.
    async fn get_pre_existing_system_id_to_core_id_map(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        system_ids: &[SystemEntityId],
    ) -> CoreResult<HashMap<SystemEntityId, CoreEntityId>>;

    /// Resolves core ids to their system ids in `system`.
    ///
    /// Used by write handlers to translate references to other entities.
    async fn get_system_ids_for_core_ids(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        core_ids: &[CoreEntityId],
    ) -> CoreResult<HashMap<CoreEntityId, SystemEntityId>>;

    /// Returns every mapping for (system, core type).
    async fn get_all(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
    ) -> CoreResult<Vec<CoreToSysMap>>;
}
