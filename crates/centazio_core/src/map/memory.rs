//! In-memory mapping store.

use super::{
    CoreAndPendingCreateMap, CoreAndPendingUpdateMap, CoreToSysMap, CoreToSysMapStore, MapStatus,
    NewCoreToSysMap,
};
use crate::clock::Clock;
use crate::core_storage::CoreEntityAndMeta;
use crate::error::{CoreError, CoreResult, MapKey};
use crate::types::{CoreEntityId, CoreEntityTypeName, SystemEntityId, SystemName};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type CoreKey = (SystemName, CoreEntityTypeName, CoreEntityId);
type SystemKey = (SystemName, CoreEntityTypeName, SystemEntityId);

#[derive(Default)]
struct Inner {
    by_core_id: HashMap<CoreKey, CoreToSysMap>,
    by_system_id: HashMap<SystemKey, CoreEntityId>,
}

/// An in-memory mapping store with unique indexes on both id directions.
pub struct InMemoryCoreToSysMapStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCoreToSysMapStore {
    /// Creates an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }
}

#[async_trait]
impl CoreToSysMapStore for InMemoryCoreToSysMapStore {
    async fn create(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<NewCoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        let duplicate = |key: MapKey| CoreError::DuplicateMapping {
            system: system.clone(),
            core_type: core_type.clone(),
            key,
        };

        // Validate the whole batch first so a collision inserts nothing.
        let mut batch_core_ids = HashSet::new();
        let mut batch_system_ids = HashSet::new();
        for map in &maps {
            let core_key = (system.clone(), core_type.clone(), map.core_id.clone());
            if inner.by_core_id.contains_key(&core_key) || !batch_core_ids.insert(&map.core_id) {
                return Err(duplicate(MapKey::CoreId(map.core_id.clone())));
            }
            let system_key = (system.clone(), core_type.clone(), map.system_id.clone());
            if inner.by_system_id.contains_key(&system_key)
                || !batch_system_ids.insert(&map.system_id)
            {
                return Err(duplicate(MapKey::SystemId(map.system_id.clone())));
            }
        }

        let mut created = Vec::with_capacity(maps.len());
        for map in maps {
            let row = CoreToSysMap {
                system: system.clone(),
                core_type: core_type.clone(),
                core_id: map.core_id.clone(),
                system_id: map.system_id.clone(),
                status: MapStatus::Created,
                checksum: map.checksum,
                date_created: now,
                date_updated: now,
                date_last_success: Some(now),
                date_last_error: None,
                last_error: None,
            };
            inner.by_system_id.insert(
                (system.clone(), core_type.clone(), map.system_id),
                map.core_id.clone(),
            );
            inner
                .by_core_id
                .insert((system.clone(), core_type.clone(), map.core_id), row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn update(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<CoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        let mut inner = self.inner.write();
        let mut updated = Vec::with_capacity(maps.len());
        for map in maps {
            let key = (system.clone(), core_type.clone(), map.core_id.clone());
            let Some(row) = inner.by_core_id.get_mut(&key) else {
                tracing::debug!(%system, %core_type, core_id = %map.core_id, "mapping update skipped, row not found");
                continue;
            };
            row.status = map.status;
            row.checksum = map.checksum;
            row.date_updated = map.date_updated;
            row.date_last_success = map.date_last_success;
            row.date_last_error = map.date_last_error;
            row.last_error = map.last_error;
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn get_new_and_existing_mappings_from_cores(
        &self,
        system: &SystemName,
        cores: Vec<CoreEntityAndMeta>,
    ) -> CoreResult<(Vec<CoreAndPendingCreateMap>, Vec<CoreAndPendingUpdateMap>)> {
        let inner = self.inner.read();
        let mut to_create = Vec::new();
        let mut to_update = Vec::new();
        for core in cores {
            let key = (system.clone(), core.meta.core_type.clone(), core.meta.core_id.clone());
            match inner.by_core_id.get(&key) {
                Some(map) => to_update.push(CoreAndPendingUpdateMap {
                    map: map.clone(),
                    core,
                }),
                None => to_create.push(CoreAndPendingCreateMap {
                    core,
                    system: system.clone(),
                }),
            }
        }
        Ok((to_create, to_update))
    }

    async fn get_pre_existing_system_id_to_core_id_map(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        system_ids: &[SystemEntityId],
    ) -> CoreResult<HashMap<SystemEntityId, CoreEntityId>> {
        let inner = self.inner.read();
        Ok(system_ids
            .iter()
            .filter_map(|id| {
                inner
                    .by_system_id
                    .get(&(system.clone(), core_type.clone(), id.clone()))
                    .map(|core_id| (id.clone(), core_id.clone()))
            })
            .collect())
    }

    async fn get_system_ids_for_core_ids(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        core_ids: &[CoreEntityId],
    ) -> CoreResult<HashMap<CoreEntityId, SystemEntityId>> {
        let inner = self.inner.read();
        Ok(core_ids
            .iter()
            .filter_map(|id| {
                inner
                    .by_core_id
                    .get(&(system.clone(), core_type.clone(), id.clone()))
                    .map(|map| (id.clone(), map.system_id.clone()))
            })
            .collect())
    }

    async fn get_all(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        let inner = self.inner.read();
        let mut maps: Vec<CoreToSysMap> = inner
            .by_core_id
            .values()
            .filter(|m| &m.system == system && &m.core_type == core_type)
            .cloned()
            .collect();
        maps.sort_by(|a, b| a.core_id.cmp(&b.core_id));
        Ok(maps)
    }
}
