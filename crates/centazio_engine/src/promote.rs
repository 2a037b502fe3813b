//! Promote: staged entities to core storage.
//!
//! One run takes a page of unprocessed staged rows and, before committing:
//!
//! 1. resolves each record's system id to the core id it is already mapped
//!    to, so a record this engine wrote out is recognized when it comes back
//! 2. collapses several versions of the same core entity to the one the
//!    source system changed last, staging order breaking ties
//! 3. drops candidates whose checksum matches the stored core entity
//!
//! Mappings of survivors are created or refreshed before the survivors are
//! upserted, so a run that fails after the mapping step resolves the same
//! records to the same core ids when retried. Every fetched staged row is
//! then marked promoted or ignored.

use crate::context::OperationContext;
use crate::error::{EngineResult, HandlerResult};
use crate::operation::{Operation, OperationConfig, OperationResult};
use async_trait::async_trait;
use centazio_checksum::{CoreEntityChecksum, SystemEntityChecksum};
use centazio_core::{
    core_checksum, system_checksum, CoreEntity, CoreEntityAndMeta, CoreError, CoreEntityId, CoreStorageMeta,
    NewCoreToSysMap, StagedEntity, SystemEntity, SystemEntityId, SystemEntityTypeName,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// What to do with one staged record.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionDecision<C> {
    /// Store this core entity.
    Promote(C),
    /// Skip the record. The reason is kept on the staged row.
    Ignore(String),
}

/// Converts system entities into core entities.
#[async_trait]
pub trait PromoteHandler: Send + Sync + 'static {
    /// The system entity type staged payloads deserialize to.
    type System: SystemEntity;
    /// The core entity type produced.
    type Core: CoreEntity;

    /// Converts `system_entity`.
    ///
    /// `existing` is the core entity this record is already mapped to, if
    /// any. Its id is kept whatever the handler returns.
    async fn promote(
        &self,
        system_entity: Self::System,
        existing: Option<Self::Core>,
    ) -> HandlerResult<PromotionDecision<Self::Core>>;
}

/// Promotes staged entities of one system entity type.
pub struct PromoteOperation<H> {
    config: OperationConfig,
    system_entity_type: SystemEntityTypeName,
    handler: H,
}

impl<H: PromoteHandler> PromoteOperation<H> {
    /// Creates a promotion of `config.object`.
    pub fn new(config: OperationConfig, handler: H) -> Self {
        let system_entity_type = SystemEntityTypeName::new(config.object.as_str());
        Self {
            config,
            system_entity_type,
            handler,
        }
    }
}

struct Candidate<C> {
    staged: StagedEntity,
    system_id: SystemEntityId,
    system_checksum: SystemEntityChecksum,
    updated: DateTime<Utc>,
    core: C,
}

#[derive(Default)]
struct Tally {
    promoted: usize,
    unchanged: usize,
    ignored: usize,
    superseded: usize,
}

#[async_trait]
impl<H: PromoteHandler> Operation for PromoteOperation<H> {
    fn config(&self) -> &OperationConfig {
        &self.config
    }

    #[tracing::instrument(level = "debug", skip_all, fields(system = %ctx.system, object = %ctx.object))]
    async fn run(&self, ctx: &OperationContext<'_>) -> EngineResult<OperationResult> {
        let stores = ctx.stores();
        let checksum = ctx.engine.checksum.as_ref();
        let core_type = H::Core::core_type();
        let now = ctx.now();

        let staged = stores
            .staged
            .get(ctx.system, &self.system_entity_type, ctx.checkpoint, false)
            .await?;
        if staged.is_empty() {
            return Ok(OperationResult::success("nothing to promote"));
        }
        let max_staged = staged.iter().map(|s| s.date_staged).max();
        tracing::debug!(fetched = staged.len(), "promoting staged page");

        let mut tally = Tally::default();
        let mut processed = Vec::with_capacity(staged.len());

        let mut parsed = Vec::with_capacity(staged.len());
        for row in staged {
            match serde_json::from_str::<H::System>(&row.data) {
                Ok(entity) => match entity.system_id().cloned() {
                    Some(id) => parsed.push((row, id, entity)),
                    None => {
                        tracing::warn!(staged_id = %row.id, "ignoring payload without system id");
                        tally.ignored += 1;
                        processed.push(row.ignored("payload has no system id"));
                    }
                },
                Err(e) => {
                    tracing::warn!(staged_id = %row.id, error = %e, "ignoring unparseable payload");
                    tally.ignored += 1;
                    processed.push(row.ignored(format!("payload could not be parsed: {e}")));
                }
            }
        }

        let system_ids: Vec<SystemEntityId> = parsed.iter().map(|(_, id, _)| id.clone()).collect();
        let mapped = stores
            .maps
            .get_pre_existing_system_id_to_core_id_map(ctx.system, &core_type, &system_ids)
            .await?;
        let mapped_core_ids: Vec<CoreEntityId> = mapped
            .values()
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let existing: HashMap<CoreEntityId, CoreEntityAndMeta> = stores
            .core
            .get_existing(&core_type, &mapped_core_ids)
            .await?
            .into_iter()
            .map(|e| (e.core_id().clone(), e))
            .collect();

        let mut new_core_ids: HashMap<SystemEntityId, CoreEntityId> = HashMap::new();
        let mut candidates: Vec<Candidate<H::Core>> = Vec::new();
        for (row, system_id, entity) in parsed {
            let mapped_id = mapped.get(&system_id).cloned();
            let existing_core = match mapped_id.as_ref().and_then(|id| existing.get(id)) {
                Some(stored) => Some(stored.entity::<H::Core>()?),
                None => None,
            };
            let entity_checksum = system_checksum(checksum, &entity)?;
            let updated = entity.last_updated();

            let decision = match self.handler.promote(entity, existing_core).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(staged_id = %row.id, error = %e, "promote handler failed");
                    return Ok(OperationResult::error(
                        format!("promotion of {} from {} failed", self.system_entity_type, ctx.system),
                        e,
                    ));
                }
            };

            match decision {
                PromotionDecision::Ignore(reason) => {
                    tracing::warn!(staged_id = %row.id, %reason, "staged entity ignored");
                    tally.ignored += 1;
                    processed.push(row.ignored(reason));
                }
                PromotionDecision::Promote(mut core) => {
                    let core_id = match mapped_id {
                        Some(id) => id,
                        None => new_core_ids
                            .entry(system_id.clone())
                            .or_insert_with(|| {
                                core.core_id().cloned().unwrap_or_else(CoreEntityId::generate)
                            })
                            .clone(),
                    };
                    core.set_core_id(core_id);
                    candidates.push(Candidate {
                        staged: row,
                        system_id,
                        system_checksum: entity_checksum,
                        updated,
                        core,
                    });
                }
            }
        }

        // Newest source version of each core entity wins.
        let mut latest: HashMap<CoreEntityId, (DateTime<Utc>, usize)> = HashMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(id) = candidate.core.core_id() {
                let newest = latest.entry(id.clone()).or_insert((candidate.updated, index));
                if candidate.updated >= newest.0 {
                    *newest = (candidate.updated, index);
                }
            }
        }

        let mut upserts = Vec::new();
        let mut touched = Vec::new();
        let mut map_checksums: HashMap<CoreEntityId, (SystemEntityId, SystemEntityChecksum)> =
            HashMap::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            let Candidate {
                staged,
                system_id,
                system_checksum,
                core,
                ..
            } = candidate;
            let candidate_checksum: CoreEntityChecksum = core_checksum(checksum, &core)?;
            let core_id = core
                .core_id()
                .cloned()
                .ok_or_else(|| CoreError::MissingId(core.display_name()))?;

            if latest.get(&core_id).map(|(_, i)| *i) != Some(index) {
                tally.superseded += 1;
                processed.push(staged.promoted(now));
                continue;
            }

            let row = match existing.get(&core_id) {
                Some(stored) if stored.meta.checksum == candidate_checksum => {
                    tally.unchanged += 1;
                    stored.clone()
                }
                Some(stored) => {
                    let meta = CoreStorageMeta {
                        display_name: core.display_name(),
                        checksum: candidate_checksum,
                        date_updated: now,
                        last_update_system: ctx.system.clone(),
                        ..stored.meta.clone()
                    };
                    let row = CoreEntityAndMeta::from_entity(&core, meta)?;
                    upserts.push(row.clone());
                    row
                }
                None => {
                    let meta = CoreStorageMeta {
                        core_type: core_type.clone(),
                        core_id: core_id.clone(),
                        original_system: ctx.system.clone(),
                        original_system_type: self.system_entity_type.clone(),
                        original_system_id: system_id.clone(),
                        display_name: core.display_name(),
                        checksum: candidate_checksum,
                        date_created: now,
                        date_updated: now,
                        last_update_system: ctx.system.clone(),
                    };
                    let row = CoreEntityAndMeta::from_entity(&core, meta)?;
                    upserts.push(row.clone());
                    row
                }
            };

            map_checksums.insert(core_id, (system_id, system_checksum));
            touched.push(row);
            processed.push(staged.promoted(now));
        }

        // Mappings go first: a retry after a later failure resolves the
        // record to the same core id instead of minting a new one.
        let (to_create, to_update) = stores
            .maps
            .get_new_and_existing_mappings_from_cores(ctx.system, touched)
            .await?;
        let new_maps: Vec<NewCoreToSysMap> = to_create
            .into_iter()
            .filter_map(|pending| {
                let (system_id, checksum) = map_checksums.get(pending.core.core_id())?.clone();
                Some(NewCoreToSysMap {
                    core_id: pending.core.core_id().clone(),
                    system_id,
                    checksum,
                })
            })
            .collect();
        let refreshed_maps: Vec<_> = to_update
            .into_iter()
            .filter_map(|pending| {
                let (_, checksum) = map_checksums.get(&pending.map.core_id)?;
                (checksum != &pending.map.checksum).then(|| pending.map.updated(checksum.clone(), now))
            })
            .collect();
        if !new_maps.is_empty() {
            stores.maps.create(ctx.system, &core_type, new_maps).await?;
        }
        if !refreshed_maps.is_empty() {
            stores.maps.update(ctx.system, &core_type, refreshed_maps).await?;
        }

        tally.promoted = upserts.len();
        if !upserts.is_empty() {
            stores.core.upsert(&core_type, upserts).await?;
        }

        stores.staged.update(processed).await?;

        tracing::info!(
            promoted = tally.promoted,
            unchanged = tally.unchanged,
            ignored = tally.ignored,
            superseded = tally.superseded,
            "promote complete"
        );
        Ok(OperationResult::success(format!(
            "promoted {}, unchanged {}, ignored {}, superseded {}",
            tally.promoted, tally.unchanged, tally.ignored, tally.superseded
        ))
        .with_affected(tally.promoted)
        .with_checkpoint(max_staged))
    }
}
