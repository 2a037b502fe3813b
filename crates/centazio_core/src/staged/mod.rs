//! Staged entities: the append-only landing zone for raw external payloads.

mod memory;

pub use memory::InMemoryStagedEntityStore;

use crate::error::CoreResult;
use crate::types::{SystemEntityTypeName, SystemName};
use async_trait::async_trait;
use centazio_checksum::StagedEntityChecksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw payload captured by Read, pending promotion.
///
/// `data` and `checksum` never change after creation. Promotion sets
/// exactly one of `date_promoted` or `ignore_reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntity {
    /// Row id.
    pub id: Uuid,
    /// Source system.
    pub system: SystemName,
    /// Source entity type.
    pub system_entity_type: SystemEntityTypeName,
    /// When the payload was staged.
    pub date_staged: DateTime<Utc>,
    /// The payload exactly as received.
    pub data: String,
    /// Checksum of `data`.
    pub checksum: StagedEntityChecksum,
    /// When the payload was promoted.
    pub date_promoted: Option<DateTime<Utc>>,
    /// Why promotion skipped this payload.
    pub ignore_reason: Option<String>,
}

impl StagedEntity {
    /// Marks this entity as promoted.
    pub fn promoted(mut self, now: DateTime<Utc>) -> Self {
        self.date_promoted = Some(now);
        self
    }

    /// Marks this entity as ignored.
    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.ignore_reason = Some(reason.into());
        self
    }

    /// Returns true once promotion has handled this entity either way.
    pub fn is_processed(&self) -> bool {
        self.date_promoted.is_some() || self.ignore_reason.is_some()
    }
}

/// Storage for staged entities.
///
/// # Invariants
///
/// - At most one row per (system, type, checksum)
/// - `update` only touches `date_promoted` and `ignore_reason`
/// - Any failure is returned as is; there is no partial-write recovery
#[async_trait]
pub trait StagedEntityStore: Send + Sync {
    /// Maximum rows returned by one `get`.
    fn page_size(&self) -> usize;

    /// Stages payloads for (system, type).
    ///
    /// Payloads whose checksum already exists for (system, type) are
    /// skipped, as are repeats within the batch. Returns only the rows that
    /// were actually inserted.
    async fn stage(
        &self,
        system: &SystemName,
        system_entity_type: &SystemEntityTypeName,
        payloads: Vec<String>,
    ) -> CoreResult<Vec<StagedEntity>>;

    /// Returns rows staged at or after `after`, ordered by staging date and
    /// bounded by the page size.
    ///
    /// Unless `include_promoted` is set, rows already promoted or ignored are
    /// left out.
    async fn get(
        &self,
        system: &SystemName,
        system_entity_type: &SystemEntityTypeName,
        after: DateTime<Utc>,
        include_promoted: bool,
    ) -> CoreResult<Vec<StagedEntity>>;

    /// Persists promotion fields of existing rows.
    async fn update(&self, batch: Vec<StagedEntity>) -> CoreResult<()>;

    /// Retention sweep. With `promoted` set, deletes rows promoted before
    /// `before`; otherwise deletes rows staged before `before`.
    ///
    /// Returns the number of deleted rows.
    async fn delete_before(&self, before: DateTime<Utc>, promoted: bool) -> CoreResult<usize>;
}
