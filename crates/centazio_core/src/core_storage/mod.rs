//! Core storage: the canonical entity store.

mod memory;

pub use memory::InMemoryCoreStorage;

use crate::entity::CoreEntity;
use crate::error::{CoreError, CoreResult};
use crate::types::{CoreEntityId, CoreEntityTypeName, SystemEntityId, SystemEntityTypeName, SystemName};
use async_trait::async_trait;
use centazio_checksum::CoreEntityChecksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provenance and change-tracking columns stored with every core entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStorageMeta {
    /// Declared core type.
    pub core_type: CoreEntityTypeName,
    /// Canonical id.
    pub core_id: CoreEntityId,
    /// System the record was first promoted from.
    pub original_system: SystemName,
    /// Entity type in the originating system.
    pub original_system_type: SystemEntityTypeName,
    /// Id in the originating system.
    pub original_system_id: SystemEntityId,
    /// Label for logs.
    pub display_name: String,
    /// Checksum of the entity's meaningful fields.
    pub checksum: CoreEntityChecksum,
    /// When the row was created.
    pub date_created: DateTime<Utc>,
    /// When a meaningful change was last stored.
    pub date_updated: DateTime<Utc>,
    /// System whose change produced the current value.
    pub last_update_system: SystemName,
}

/// A stored core entity with its metadata.
///
/// The entity is kept as JSON; [`CoreEntityAndMeta::entity`] restores the
/// concrete type after checking the declared core type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreEntityAndMeta {
    /// The serialized core entity.
    pub data: Value,
    /// Provenance and checksum.
    pub meta: CoreStorageMeta,
}

impl CoreEntityAndMeta {
    /// Wraps a typed entity.
    pub fn from_entity<E: CoreEntity>(entity: &E, meta: CoreStorageMeta) -> CoreResult<Self> {
        if meta.core_type != E::core_type() {
            return Err(CoreError::CoreTypeMismatch {
                stored: meta.core_type,
                requested: E::core_type(),
            });
        }
        if entity.core_id() != Some(&meta.core_id) {
            return Err(CoreError::MissingId(format!(
                "{}[{}] does not carry core id {}",
                meta.core_type,
                entity.display_name(),
                meta.core_id
            )));
        }
        Ok(Self {
            data: serde_json::to_value(entity)?,
            meta,
        })
    }

    /// Restores the typed entity.
    pub fn entity<E: CoreEntity>(&self) -> CoreResult<E> {
        if self.meta.core_type != E::core_type() {
            return Err(CoreError::CoreTypeMismatch {
                stored: self.meta.core_type.clone(),
                requested: E::core_type(),
            });
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Shorthand for `meta.core_id`.
    pub fn core_id(&self) -> &CoreEntityId {
        &self.meta.core_id
    }
}

/// The canonical entity store: one table per declared core type, keyed by
/// core id.
#[async_trait]
pub trait CoreStorage: Send + Sync {
    /// Loads one entity.
    async fn get(
        &self,
        core_type: &CoreEntityTypeName,
        core_id: &CoreEntityId,
    ) -> CoreResult<Option<CoreEntityAndMeta>>;

    /// Loads every entity in `core_ids` that exists.
    async fn get_existing(
        &self,
        core_type: &CoreEntityTypeName,
        core_ids: &[CoreEntityId],
    ) -> CoreResult<Vec<CoreEntityAndMeta>>;

    /// Returns entities updated after `after`, ordered by update date,
    /// excluding those whose last update came from `exclude_system`.
    async fn get_for_write(
        &self,
        core_type: &CoreEntityTypeName,
        after: DateTime<Utc>,
        exclude_system: &SystemName,
    ) -> CoreResult<Vec<CoreEntityAndMeta>>;

    /// Inserts or replaces entities.
    ///
    /// On replace, creation date and original-system provenance of the
    /// stored row are kept.
    async fn upsert(
        &self,
        core_type: &CoreEntityTypeName,
        entities: Vec<CoreEntityAndMeta>,
    ) -> CoreResult<Vec<CoreEntityAndMeta>>;

    /// Returns every entity of a type.
    async fn get_all(&self, core_type: &CoreEntityTypeName) -> CoreResult<Vec<CoreEntityAndMeta>>;
}
