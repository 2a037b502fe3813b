//! Shared fixtures for the engine's unit tests.

use crate::config::EngineSettings;
use crate::context::{EngineContext, OperationContext, Stores};
use async_trait::async_trait;
use centazio_checksum::Sha256Checksum;
use centazio_core::{
    CoreAndPendingCreateMap, CoreAndPendingUpdateMap, CoreEntity, CoreEntityAndMeta, CoreEntityId,
    CoreEntityTypeName, CoreError, CoreResult, CoreStorage, CoreToSysMap, CoreToSysMapStore,
    InMemoryCoreStorage, InMemoryCoreToSysMapStore, InMemoryCtlRepository,
    InMemoryStagedEntityStore, LifecycleStage, NewCoreToSysMap, ObjectName, SystemEntity,
    SystemEntityId, SystemName, TestClock,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Option<CoreEntityId>,
    pub name: String,
}

impl CoreEntity for Person {
    fn core_type() -> CoreEntityTypeName {
        CoreEntityTypeName::new("Person")
    }
    fn core_id(&self) -> Option<&CoreEntityId> {
        self.id.as_ref()
    }
    fn set_core_id(&mut self, id: CoreEntityId) {
        self.id = Some(id);
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
    fn checksum_subject(&self) -> Value {
        json!({ "name": self.name })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Option<SystemEntityId>,
    pub name: String,
    pub updated: DateTime<Utc>,
}

impl SystemEntity for Contact {
    fn system_id(&self) -> Option<&SystemEntityId> {
        self.id.as_ref()
    }
    fn set_system_id(&mut self, id: SystemEntityId) {
        self.id = Some(id);
    }
    fn last_updated(&self) -> DateTime<Utc> {
        self.updated
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
    fn checksum_subject(&self) -> Value {
        json!({ "name": self.name })
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn contact_json(id: &str, name: &str, updated: DateTime<Utc>) -> String {
    serde_json::to_string(&Contact {
        id: Some(SystemEntityId::new(id)),
        name: name.into(),
        updated,
    })
    .unwrap()
}

pub struct Harness {
    pub ctx: EngineContext,
    pub clock: Arc<TestClock>,
    pub staged: Arc<InMemoryStagedEntityStore>,
    pub core: Arc<InMemoryCoreStorage>,
    pub maps: Arc<InMemoryCoreToSysMapStore>,
    pub ctl: Arc<InMemoryCtlRepository>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let clock = Arc::new(TestClock::new(start()));
        let checksum = Arc::new(Sha256Checksum);
        let staged = Arc::new(InMemoryStagedEntityStore::new(
            page_size,
            checksum.clone(),
            clock.clone(),
        ));
        let core = Arc::new(InMemoryCoreStorage::new([Person::core_type()]));
        let maps = Arc::new(InMemoryCoreToSysMapStore::new(clock.clone()));
        let ctl = Arc::new(InMemoryCtlRepository::new(clock.clone()));
        let stores = Stores {
            staged: staged.clone(),
            core: core.clone(),
            ctl: ctl.clone(),
            maps: maps.clone(),
        };
        let ctx = EngineContext::new(
            stores,
            clock.clone(),
            checksum,
            EngineSettings::new().with_staged_page_size(page_size),
        );
        Self {
            ctx,
            clock,
            staged,
            core,
            maps,
            ctl,
        }
    }

    /// A context whose stores are rewired by `f`.
    pub fn ctx_with(&self, f: impl FnOnce(&mut Stores)) -> EngineContext {
        let mut ctx = self.ctx.clone();
        f(&mut ctx.stores);
        ctx
    }

    pub fn op_ctx<'a>(
        &'a self,
        system: &'a SystemName,
        stage: LifecycleStage,
        object: &'a ObjectName,
        checkpoint: DateTime<Utc>,
    ) -> OperationContext<'a> {
        OperationContext {
            engine: &self.ctx,
            system,
            stage,
            object,
            checkpoint,
        }
    }
}

pub fn op_ctx_on<'a>(
    engine: &'a EngineContext,
    system: &'a SystemName,
    stage: LifecycleStage,
    object: &'a ObjectName,
    checkpoint: DateTime<Utc>,
) -> OperationContext<'a> {
    OperationContext {
        engine,
        system,
        stage,
        object,
        checkpoint,
    }
}

/// Takes one failure off `budget`, returning true while any were left.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn backend_down() -> CoreError {
    CoreError::Backend("connection reset".into())
}

/// Map store whose `create` fails for the first `n` calls.
pub struct FailingMaps {
    pub inner: Arc<InMemoryCoreToSysMapStore>,
    pub creates_to_fail: AtomicUsize,
}

impl FailingMaps {
    pub fn new(inner: Arc<InMemoryCoreToSysMapStore>, n: usize) -> Self {
        Self {
            inner,
            creates_to_fail: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl CoreToSysMapStore for FailingMaps {
    async fn create(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<NewCoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>> {
        if take_failure(&self.creates_to_fail) {
            return Err(backend_down());
        }
        self.inner.create(system, core_type, maps).await
    }

    async fn update(
        &self,
        system: &SystemName,
        core_type: &CoreEntityTypeName,
        maps: Vec<CoreToSysMap>,
    ) -> CoreResult<Vec<CoreToSysMap>> {
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

/// Core storage whose `upsert` fails for the first `n` calls.
pub struct FailingCore {
    pub inner: Arc<InMemoryCoreStorage>,
    pub upserts_to_fail: AtomicUsize,
}

impl FailingCore {
    pub fn new(inner: Arc<InMemoryCoreStorage>, n: usize) -> Self {
        Self {
            inner,
            upserts_to_fail: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl CoreStorage for FailingCore {
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
        if take_failure(&self.upserts_to_fail) {
            return Err(backend_down());
        }
        self.inner.upsert(core_type, entities).await
    }

    async fn get_all(&self, core_type: &CoreEntityTypeName) -> CoreResult<Vec<CoreEntityAndMeta>> {
        self.inner.get_all(core_type).await
    }
}
