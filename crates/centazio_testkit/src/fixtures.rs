//! Test fixtures: in-memory stores wired into an engine context.

use centazio_checksum::Sha256Checksum;
use centazio_core::{
    CoreEntityTypeName, CtlRepository, InMemoryCoreStorage, InMemoryCoreToSysMapStore,
    InMemoryCtlRepository, InMemoryStagedEntityStore, LifecycleStage, ObjectName, ObjectState,
    SystemName, TestClock,
};
use centazio_engine::{EngineContext, EngineSettings, FunctionRunner, Stores};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Once};

/// The instant every [`TestEngine`] clock starts at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// An engine over in-memory stores and a frozen clock.
///
/// The concrete stores stay reachable for assertions.
pub struct TestEngine {
    /// The context handed to runners.
    pub ctx: EngineContext,
    /// The shared clock.
    pub clock: Arc<TestClock>,
    /// Staged entities.
    pub staged: Arc<InMemoryStagedEntityStore>,
    /// Core storage.
    pub core: Arc<InMemoryCoreStorage>,
    /// Mappings.
    pub maps: Arc<InMemoryCoreToSysMapStore>,
    /// Control state.
    pub ctl: Arc<InMemoryCtlRepository>,
}

impl TestEngine {
    /// Creates an engine declaring `core_types`, with default settings and
    /// the first-time checkpoint at the epoch.
    pub fn new(core_types: impl IntoIterator<Item = CoreEntityTypeName>) -> Self {
        Self::with_settings(core_types, EngineSettings::default())
    }

    /// Creates an engine with explicit settings.
    pub fn with_settings(
        core_types: impl IntoIterator<Item = CoreEntityTypeName>,
        settings: EngineSettings,
    ) -> Self {
        init_tracing();
        let clock = Arc::new(TestClock::new(start_time()));
        let checksum = Arc::new(Sha256Checksum);
        let staged = Arc::new(InMemoryStagedEntityStore::new(
            settings.staged_page_size,
            checksum.clone(),
            clock.clone(),
        ));
        let core = Arc::new(InMemoryCoreStorage::new(core_types));
        let maps = Arc::new(InMemoryCoreToSysMapStore::new(clock.clone()));
        let ctl = Arc::new(InMemoryCtlRepository::new(clock.clone()));

        let stores = Stores {
            staged: staged.clone(),
            core: core.clone(),
            ctl: ctl.clone(),
            maps: maps.clone(),
        };
        let ctx = EngineContext::new(stores, clock.clone(), checksum, settings);
        Self {
            ctx,
            clock,
            staged,
            core,
            maps,
            ctl,
        }
    }

    /// A runner over this engine's context.
    pub fn runner(&self) -> FunctionRunner {
        FunctionRunner::new(self.ctx.clone())
    }

    /// A runner whose stores are first rewired by `rewire`, e.g. to wrap one
    /// in a [`crate::faults`] wrapper.
    pub fn runner_with(&self, rewire: impl FnOnce(&mut Stores)) -> FunctionRunner {
        let mut ctx = self.ctx.clone();
        rewire(&mut ctx.stores);
        FunctionRunner::new(ctx)
    }

    /// Loads the object state of (system, stage, object), if it exists.
    pub async fn object_state(
        &self,
        system: &str,
        stage: LifecycleStage,
        object: &str,
    ) -> Option<ObjectState> {
        let system_state = self
            .ctl
            .get_system_state(&SystemName::new(system), stage)
            .await
            .ok()??;
        self.ctl
            .get_object_state(&system_state, &ObjectName::new(object))
            .await
            .ok()?
    }
}
