//! Write: core storage to an external system.

use crate::context::OperationContext;
use crate::error::{EngineResult, HandlerResult};
use crate::operation::{Operation, OperationConfig, OperationResult};
use async_trait::async_trait;
use centazio_checksum::SystemEntityChecksum;
use centazio_core::{
    system_checksum, CoreEntity, CoreEntityId, CoreToSysMap, NewCoreToSysMap, SystemEntity,
    SystemEntityId,
};

/// Converts core entities into a target system's shape and performs the
/// external create and update calls.
#[async_trait]
pub trait WriteHandler: Send + Sync + 'static {
    /// The core entity type written.
    type Core: CoreEntity;
    /// The target system's entity type.
    type System: SystemEntity;

    /// Converts `core`. `system_id` is set when the entity is already mapped
    /// in the target system.
    async fn convert(
        &self,
        core: &Self::Core,
        system_id: Option<&SystemEntityId>,
    ) -> HandlerResult<Self::System>;

    /// Creates `entity` in the target system and returns it with the id the
    /// system assigned.
    async fn create(&self, entity: Self::System) -> HandlerResult<Self::System>;

    /// Updates an existing record in the target system.
    async fn update(&self, entity: Self::System) -> HandlerResult<()>;
}

/// Writes changed core entities of one type to the function's system.
///
/// Entities whose last change came from the target system are never
/// selected, and mapped entities whose converted checksum matches the
/// mapping are not sent.
pub struct WriteOperation<H> {
    config: OperationConfig,
    handler: H,
}

impl<H: WriteHandler> WriteOperation<H> {
    /// Creates a write. `config.object` should name the core type.
    pub fn new(config: OperationConfig, handler: H) -> Self {
        Self { config, handler }
    }
}

struct PendingUpdate<S> {
    map: CoreToSysMap,
    entity: S,
    checksum: SystemEntityChecksum,
}

#[async_trait]
impl<H: WriteHandler> Operation for WriteOperation<H> {
    fn config(&self) -> &OperationConfig {
        &self.config
    }

    #[tracing::instrument(level = "debug", skip_all, fields(system = %ctx.system, object = %ctx.object))]
    async fn run(&self, ctx: &OperationContext<'_>) -> EngineResult<OperationResult> {
        let stores = ctx.stores();
        let checksum = ctx.engine.checksum.as_ref();
        let core_type = H::Core::core_type();

        let cores = stores
            .core
            .get_for_write(&core_type, ctx.checkpoint, ctx.system)
            .await?;
        if cores.is_empty() {
            return Ok(OperationResult::success("nothing to write"));
        }
        let max_updated = cores.iter().map(|c| c.meta.date_updated).max();

        let (to_create, to_update) = stores
            .maps
            .get_new_and_existing_mappings_from_cores(ctx.system, cores)
            .await?;
        tracing::debug!(creates = to_create.len(), updates = to_update.len(), "write candidates");

        let now = ctx.now();
        let mut failures: Vec<String> = Vec::new();
        let mut changed_maps = Vec::with_capacity(to_update.len());

        // Convert everything before the first external call. A record that
        // fails to convert is reported and skipped; the rest still go out.
        let mut creates: Vec<(CoreEntityId, H::System)> = Vec::with_capacity(to_create.len());
        for pending in to_create {
            let core: H::Core = pending.core.entity()?;
            match self.handler.convert(&core, None).await {
                Ok(entity) => creates.push((pending.core.core_id().clone(), entity)),
                Err(e) => failures.push(self.conversion_failed(ctx, pending.core.core_id(), &e)),
            }
        }

        let mut unchanged = 0;
        let mut updates: Vec<PendingUpdate<H::System>> = Vec::with_capacity(to_update.len());
        for pending in to_update {
            let core: H::Core = pending.core.entity()?;
            let mut entity = match self.handler.convert(&core, Some(&pending.map.system_id)).await {
                Ok(entity) => entity,
                Err(e) => {
                    failures.push(self.conversion_failed(ctx, pending.core.core_id(), &e));
                    changed_maps.push(pending.map.failed(e.to_string(), now));
                    continue;
                }
            };
            entity.set_system_id(pending.map.system_id.clone());
            let entity_checksum = system_checksum(checksum, &entity)?;
            if entity_checksum == pending.map.checksum {
                unchanged += 1;
                continue;
            }
            updates.push(PendingUpdate {
                map: pending.map,
                entity,
                checksum: entity_checksum,
            });
        }

        let mut new_maps = Vec::with_capacity(creates.len());
        for (core_id, entity) in creates {
            match self.handler.create(entity).await {
                Ok(created) => match created.system_id().cloned() {
                    Some(system_id) => new_maps.push(NewCoreToSysMap {
                        core_id,
                        system_id,
                        checksum: system_checksum(checksum, &created)?,
                    }),
                    None => failures.push(format!("create of {core_id} returned no system id")),
                },
                Err(e) => {
                    tracing::warn!(%core_id, error = %e, "external create failed");
                    failures.push(format!("create of {core_id} failed: {e}"));
                }
            }
        }

        let mut updated = 0;
        for PendingUpdate {
            map,
            entity,
            checksum: new_checksum,
        } in updates
        {
            match self.handler.update(entity).await {
                Ok(()) => {
                    updated += 1;
                    changed_maps.push(map.updated(new_checksum, now));
                }
                Err(e) => {
                    tracing::warn!(core_id = %map.core_id, system_id = %map.system_id, error = %e, "external update failed");
                    failures.push(format!("update of {} failed: {e}", map.core_id));
                    changed_maps.push(map.failed(e.to_string(), now));
                }
            }
        }

        let created = new_maps.len();
        if !new_maps.is_empty() {
            stores.maps.create(ctx.system, &core_type, new_maps).await?;
        }
        if !changed_maps.is_empty() {
            stores.maps.update(ctx.system, &core_type, changed_maps).await?;
        }

        let written = created + updated;
        let message = format!(
            "created {created}, updated {updated}, unchanged {unchanged}, failed {}",
            failures.len()
        );
        tracing::info!(created, updated, unchanged, failed = failures.len(), "write complete");

        if failures.is_empty() {
            Ok(OperationResult::success(message)
                .with_affected(written)
                .with_checkpoint(max_updated))
        } else {
            Ok(OperationResult::error(message, failures.join("; ")).with_affected(written))
        }
    }
}

impl<H: WriteHandler> WriteOperation<H> {
    fn conversion_failed(
        &self,
        ctx: &OperationContext<'_>,
        core_id: &CoreEntityId,
        error: &crate::error::HandlerError,
    ) -> String {
        tracing::warn!(%core_id, error = %error, "write conversion failed");
        format!(
            "conversion of {} {core_id} for {} failed: {error}",
            H::Core::core_type(),
            ctx.system
        )
    }
}
