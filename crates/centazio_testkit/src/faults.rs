//! Store wrappers that fail on demand.
//!
//! Each wrapper delegates to an inner store and fails a configurable number
//! of upcoming calls with [`CoreError::Backend`], so scenarios can interrupt
//! an operation between two writes and check that a retry converges.

use async_trait::async_trait;
use centazio_core::{
    CoreAndPendingCreateMap, CoreAndPendingUpdateMap, CoreEntityAndMeta, CoreEntityId,
    CoreEntityTypeName, CoreError, CoreResult, CoreStorage, CoreToSysMap, CoreToSysMapStore,
    NewCoreToSysMap, SystemEntityId, SystemName,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A countdown of calls left to fail.
#[derive(Debug, Default)]
struct FailBudget(AtomicUsize);

impl FailBudget {
    fn set(&self, n: usize) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn check(&self, call: &str) -> CoreResult<()> {
        let tripped = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            tracing::debug!(call, "injected store failure");
            return Err(CoreError::Backend(format!("injected failure in {call}")));
        }
        Ok(())
    }
}

/// Core storage whose `upsert` can be made to fail.
pub struct FaultyCoreStorage {
    inner: Arc<dyn CoreStorage>,
    upserts: FailBudget,
}

impl FaultyCoreStorage {
    /// Wraps `inner` with no failures armed.
    pub fn new(inner: Arc<dyn CoreStorage>) -> Self {
        Self {
            inner,
            upserts: FailBudget::default(),
        }
    }

    /// Fails the next `n` upserts.
    pub fn fail_upserts(&self, n: usize) {
        self.upserts.set(n);
    }
}

#[async_trait]
impl CoreStorage for FaultyCoreStorage {
    async fn get(
        &self,
        core_type: &CoreEntityTypeName,
        core_id: &CoreEntityId,
    ) -> CoreResult<Option<CoreEntityAndMeta>> {
        self.inner.get(core_type, core_id).await
    }

    async fn get_existing(
        &self,
        core_type: &CoreEntityTypeName,
        core_ids: &[CoreEntityId],
    ) -> CoreResult<Vec<CoreEntityAndMeta>> {
        self.inner.get_existing(core_type, core_ids).await
    }

    async fn get_for_write(
        &self,
        core_type: &CoreEntityTypeName,
        after: DateTime<Utc>,
        exclude_system: &SystemName,
    ) -> CoreResult<Vec<CoreEntityAndMeta>> {
        self.inner.get_for_write(core_type, after, exclude_system).await
    }

    async fn upsert(
        &self,
        core_type: &CoreEntityTypeName,
        entities: Vec<CoreEntityAndMeta>,
    ) -> CoreResult<Vec<CoreEntityAndMeta>> {
        self.upserts.check("core upsert")?;
        self.inner.upsert(core_type, entities).await
    }

    async fn get_all(&self, core_type: &CoreEntityTypeName) -> CoreResult<Vec<CoreEntityAndMeta>> {
        self.inner.get_all(core_type).await
    }
}

/// Mapping store whose `create` and `update` can be made to fail.
pub struct FaultyMapStore {
    inner: Arc<dyn CoreToSysMapStore>,
    creates: FailBudget,
    updates: FailBudget,
}

impl FaultyMapStore {
    /// Wraps `inner` with no failures armed.
    pub fn new(inner: Arc<dyn CoreToSysMapStore>) -> Self {
        Self {
            inner,
            creates: FailBudget::default(),
            updates: FailBudget::default(),
        }
    }

    /// Fails the next `n` creates.
    pub fn fail_creates(&self, n: usize) {
        self.creates.set(n);
    }

    /// Fails the next `n` updates.
    pub fn fail_updates(&self, n: usize) {
        self.updates.set(n);
    }
}

#[async_trait]
impl CoreToSysMapStore for FaultyMapStore {
    async fn create(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<NewCoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        self.creates.check("mapping create")?;
        self.inner.create(system, core_type, maps).await
    }

    async fn update(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<CoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        self.updates.check("mapping update")?;
        self.inner.update(system, core_type, maps).await
    }

    async fn get_new_and_existing_mappings_from_cores(
        &self,
        system: &SystemName,
        cores: Vec<CoreEntityAndMeta>,
    ) -> CoreResult<(Vec<CoreAndPendingCreateMap>, Vec<CoreAndPendingUpdateMap>)> {
        self.inner.get_new_and_existing_mappings_from_cores(system, cores).await
    }

    async fn get_pre_existing_system_id_to_core_id_map(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        system_ids: &[SystemEntityId],
    ) -> CoreResult<HashMap<SystemEntityId, CoreEntityId>> {
        self.inner
            .get_pre_existing_system_id_to_core_id_map(system, core_type, system_ids)
            .await
    }

    async fn get_system_ids_for_core_ids(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        core_ids: &[CoreEntityId],
    ) -> CoreResult<HashMap<CoreEntityId, SystemEntityId>> {
        self.inner.get_system_ids_for_core_ids(system, core_type, core_ids).await
    }

    async fn get_all(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        self.inner.get_all(system, core_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Customer;
    use crate::fixtures::start_time;
    use centazio_checksum::CoreEntityChecksum;
    use centazio_core::{CoreEntity, CoreStorageMeta, InMemoryCoreStorage, SystemEntityTypeName};
    use serde_json::json;

    fn row(id: &str) -> CoreEntityAndMeta {
        CoreEntityAndMeta {
            meta: CoreStorageMeta {
                core_type: Customer::core_type(),
                core_id: CoreEntityId::new(id),
                original_system: SystemName::new("Crm"),
                original_system_type: SystemEntityTypeName::new("Contact"),
                original_system_id: SystemEntityId::new(id),
                display_name: id.into(),
                checksum: CoreEntityChecksum::new(id),
                date_created: start_time(),
                date_updated: start_time(),
                last_update_system: SystemName::new("Crm"),
            },
            data: json!({ "id": id, "name": id, "email": "x@example.com" }),
        }
    }

    #[tokio::test]
    async fn armed_failures_are_consumed_then_calls_pass_through() {
        let inner = Arc::new(InMemoryCoreStorage::new([Customer::core_type()]));
        let faulty = FaultyCoreStorage::new(inner.clone());
        faulty.fail_upserts(2);

        for _ in 0..2 {
            let err = faulty.upsert(&Customer::core_type(), vec![row("C1")]).await.unwrap_err();
            assert!(matches!(err, CoreError::Backend(_)));
            assert!(!err.is_consistency_error());
        }
        faulty.upsert(&Customer::core_type(), vec![row("C1")]).await.unwrap();
        assert_eq!(inner.get_all(&Customer::core_type()).await.unwrap().len(), 1);
    }
}
