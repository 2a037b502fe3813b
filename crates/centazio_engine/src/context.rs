//! Shared runtime dependencies handed to every operation.

use crate::config::EngineSettings;
use centazio_checksum::ChecksumAlgorithm;
use centazio_core::{
    Clock, CoreStorage, CoreToSysMapStore, CtlRepository, LifecycleStage, ObjectName, SystemName,
    StagedEntityStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The four stores the pipeline reads and writes.
#[derive(Clone)]
pub struct Stores {
    /// Staged entities.
    pub staged: Arc<dyn StagedEntityStore>,
    /// Canonical entities.
    pub core: Arc<dyn CoreStorage>,
    /// Control state.
    pub ctl: Arc<dyn CtlRepository>,
    /// Core-to-system mappings.
    pub maps: Arc<dyn CoreToSysMapStore>,
}

/// Stores plus clock, checksum algorithm and settings.
#[derive(Clone)]
pub struct EngineContext {
    /// Stores.
    pub stores: Stores,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Checksum algorithm.
    pub checksum: Arc<dyn ChecksumAlgorithm>,
    /// Settings.
    pub settings: EngineSettings,
}

impl EngineContext {
    /// Creates a context.
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        checksum: Arc<dyn ChecksumAlgorithm>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            stores,
            clock,
            checksum,
            settings,
        }
    }

    /// Returns the current time from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// What one operation run sees: the engine context plus its own
/// coordinates and checkpoint.
pub struct OperationContext<'a> {
    /// Engine context.
    pub engine: &'a EngineContext,
    /// System the function belongs to.
    pub system: &'a SystemName,
    /// Stage of the function.
    pub stage: LifecycleStage,
    /// Object the operation works on.
    pub object: &'a ObjectName,
    /// Checkpoint from the object state.
    pub checkpoint: DateTime<Utc>,
}

impl OperationContext<'_> {
    /// Shorthand for the stores.
    pub fn stores(&self) -> &Stores {
        &self.engine.stores
    }

    /// Current time.
    pub fn now(&self) -> DateTime<Utc> {
        self.engine.now()
    }
}
