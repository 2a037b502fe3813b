//! In-memory staged entity store.

use super::{StagedEntity, StagedEntityStore};
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::types::{SystemEntityTypeName, SystemName};
use async_trait::async_trait;
use centazio_checksum::{ChecksumAlgorithm, StagedEntityChecksum};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

type DedupKey = (SystemName, SystemEntityTypeName, StagedEntityChecksum);

#[derive(Default)]
struct Inner {
    rows: HashMap<Uuid, StagedEntity>,
    checksums: HashSet<DedupKey>,
}

/// An in-memory staged entity store.
///
/// Suitable for tests and single-process deployments that do not need
/// durability.
pub struct InMemoryStagedEntityStore {
    inner: RwLock<Inner>,
    page_size: usize,
    checksum: Arc<dyn ChecksumAlgorithm>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStagedEntityStore {
    /// Creates an empty store.
    pub fn new(page_size: usize, checksum: Arc<dyn ChecksumAlgorithm>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            page_size: page_size.max(1),
            checksum,
            clock,
        }
    }

    /// Returns the total number of rows.
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }
}

#[async_trait]
impl StagedEntityStore for InMemoryStagedEntityStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn stage(
        &self,
        system: &SystemName,
        system_entity_type: &SystemEntityTypeName,
        payloads: Vec<String>,
    ) -> CoreResult<Vec<StagedEntity>> {
        if payloads.iter().any(|p| p.trim().is_empty()) {
            return Err(CoreError::EmptyPayload {
                system: system.clone(),
                system_entity_type: system_entity_type.to_string(),
            });
        }

        let now = self.clock.now();
        let mut inner = self.inner.write();
        let mut staged = Vec::new();

        for data in payloads {
            let checksum = self.checksum.checksum_raw(&data);
            let key = (system.clone(), system_entity_type.clone(), checksum.clone());
            if !inner.checksums.insert(key) {
                continue;
            }

            let entity = StagedEntity {
                id: Uuid::new_v4(),
                system: system.clone(),
                system_entity_type: system_entity_type.clone(),
                date_staged: now,
                data,
                checksum,
                date_promoted: None,
                ignore_reason: None,
            };
            inner.rows.insert(entity.id, entity.clone());
            staged.push(entity);
        }

        tracing::debug!(%system, %system_entity_type, staged = staged.len(), "staged payloads");
        Ok(staged)
    }

    async fn get(
        &self,
        system: &SystemName,
        system_entity_type: &SystemEntityTypeName,
        after: DateTime<Utc>,
        include_promoted: bool,
    ) -> CoreResult<Vec<StagedEntity>> {
        let inner = self.inner.read();
        let mut rows: Vec<StagedEntity> = inner
            .rows
            .values()
            .filter(|e| &e.system == system && &e.system_entity_type == system_entity_type)
            .filter(|e| e.date_staged >= after)
            .filter(|e| include_promoted || !e.is_processed())
            .cloned()
            .collect();

        rows.sort_by(|a, b| a.date_staged.cmp(&b.date_staged).then(a.id.cmp(&b.id)));
        rows.truncate(self.page_size);
        Ok(rows)
    }

    async fn update(&self, batch: Vec<StagedEntity>) -> CoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(missing) = batch.iter().find(|e| !inner.rows.contains_key(&e.id)) {
            return Err(CoreError::StagedEntityNotFound { id: missing.id });
        }
        for entity in batch {
            if let Some(row) = inner.rows.get_mut(&entity.id) {
                row.date_promoted = entity.date_promoted;
                row.ignore_reason = entity.ignore_reason;
            }
        }
        Ok(())
    }

    async fn delete_before(&self, before: DateTime<Utc>, promoted: bool) -> CoreResult<usize> {
        let mut inner = self.inner.write();
        let doomed: Vec<(Uuid, DedupKey)> = inner
            .rows
            .values()
            .filter(|e| {
                if promoted {
                    e.date_promoted.is_some_and(|d| d < before)
                } else {
                    e.date_staged < before
                }
            })
            .map(|e| {
                (
                    e.id,
                    (e.system.clone(), e.system_entity_type.clone(), e.checksum.clone()),
                )
            })
            .collect();

        for (id, key) in &doomed {
            inner.rows.remove(id);
            inner.checksums.remove(key);
        }
        Ok(doomed.len())
    }
}
