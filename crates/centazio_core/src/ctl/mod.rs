//! Control state: per-system and per-object run tracking.

mod memory;

pub use memory::InMemoryCtlRepository;

use crate::error::CoreResult;
use crate::types::{LifecycleStage, ObjectName, SystemName};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a function is currently executing for a (system, stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemRunStatus {
    /// Not running.
    Idle,
    /// A function run is in progress.
    Running,
}

/// Outcome of the last operation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Never ran.
    Unknown,
    /// Completed successfully.
    Success,
    /// Failed.
    Error,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Unknown => "Unknown",
            OperationStatus::Success => "Success",
            OperationStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Whether later operations in the same run may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortVote {
    /// Later operations run.
    Continue,
    /// Later operations in this run are skipped.
    Abort,
}

/// Run state for one (system, stage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// System name.
    pub system: SystemName,
    /// Lifecycle stage.
    pub stage: LifecycleStage,
    /// Inactive states skip their function entirely.
    pub active: bool,
    /// Idle or Running.
    pub status: SystemRunStatus,
    /// When the row was created.
    pub date_created: DateTime<Utc>,
    /// When the row was last saved.
    pub date_updated: DateTime<Utc>,
    /// When the last run started.
    pub last_started: Option<DateTime<Utc>>,
    /// When the last run completed.
    pub last_completed: Option<DateTime<Utc>>,
}

impl SystemState {
    /// Creates an idle, active state.
    pub fn new(system: SystemName, stage: LifecycleStage, now: DateTime<Utc>) -> Self {
        Self {
            system,
            stage,
            active: true,
            status: SystemRunStatus::Idle,
            date_created: now,
            date_updated: now,
            last_started: None,
            last_completed: None,
        }
    }

    /// Idle → Running.
    pub fn started(mut self, now: DateTime<Utc>) -> Self {
        self.status = SystemRunStatus::Running;
        self.last_started = Some(now);
        self
    }

    /// Running → Idle.
    pub fn completed(mut self, now: DateTime<Utc>) -> Self {
        self.status = SystemRunStatus::Idle;
        self.last_completed = Some(now);
        self
    }

    /// True if marked Running for longer than `threshold`.
    ///
    /// A process that died mid-run leaves its state Running; past the
    /// threshold the state may be re-entered.
    pub fn is_stale_running(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == SystemRunStatus::Running
            && self.last_started.map_or(true, |started| now - started > threshold)
    }
}

/// Result of [`CtlRepository::try_start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The caller now holds the state as Running.
    Started {
        /// The state as saved.
        state: SystemState,
        /// A stale Running state was taken over.
        reclaimed: bool,
    },
    /// The state is inactive. Nothing was saved.
    Inactive(SystemState),
    /// Another run holds the state. Nothing was saved.
    AlreadyRunning(SystemState),
}

/// Run state for one (system, stage, object).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    /// System name.
    pub system: SystemName,
    /// Lifecycle stage.
    pub stage: LifecycleStage,
    /// Object the operation works on.
    pub object: ObjectName,
    /// Inactive states skip their operation.
    pub active: bool,
    /// When the row was created.
    pub date_created: DateTime<Utc>,
    /// When the row was last saved.
    pub date_updated: DateTime<Utc>,
    /// Last-processed timestamp watermark.
    pub checkpoint: DateTime<Utc>,
    /// Result of the last run.
    pub last_result: OperationStatus,
    /// Abort vote of the last run.
    pub last_abort_vote: AbortVote,
    /// When the last run started.
    pub last_start: Option<DateTime<Utc>>,
    /// When the last run completed.
    pub last_completed: Option<DateTime<Utc>>,
    /// When the last successful run started.
    pub last_success_start: Option<DateTime<Utc>>,
    /// When the last successful run completed.
    pub last_success_completed: Option<DateTime<Utc>>,
    /// Human-readable summary of the last run.
    pub last_run_message: Option<String>,
    /// Failure detail of the last run, if it failed.
    pub last_run_exception: Option<String>,
}

impl ObjectState {
    /// Creates a fresh, active state for `system_state`.
    pub fn new(
        system_state: &SystemState,
        object: ObjectName,
        checkpoint: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            system: system_state.system.clone(),
            stage: system_state.stage,
            object,
            active: true,
            date_created: now,
            date_updated: now,
            checkpoint,
            last_result: OperationStatus::Unknown,
            last_abort_vote: AbortVote::Continue,
            last_start: None,
            last_completed: None,
            last_success_start: None,
            last_success_completed: None,
            last_run_message: None,
            last_run_exception: None,
        }
    }

    /// Moves the checkpoint forward. Never moves it backwards.
    pub fn advance_checkpoint(&mut self, observed: DateTime<Utc>) {
        if observed > self.checkpoint {
            self.checkpoint = observed;
        }
    }
}

/// Repository of control state.
///
/// `create_*` fails if a row already exists; `save_*` fails if none does.
/// There is no implicit upsert.
#[async_trait]
pub trait CtlRepository: Send + Sync {
    /// Loads a system state.
    async fn get_system_state(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
    ) -> CoreResult<Option<SystemState>>;

    /// Creates a system state.
    async fn create_system_state(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
    ) -> CoreResult<SystemState>;

    /// Saves an existing system state.
    async fn save_system_state(&self, state: SystemState) -> CoreResult<SystemState>;

    /// Loads an object state.
    async fn get_object_state(
        &self,
        system_state: &SystemState,
        object: &ObjectName,
    ) -> CoreResult<Option<ObjectState>>;

    /// Creates an object state. The parent system state must exist.
    async fn create_object_state(
        &self,
        system_state: &SystemState,
        object: &ObjectName,
        checkpoint: DateTime<Utc>,
    ) -> CoreResult<ObjectState>;

    /// Saves an existing object state.
    async fn save_object_state(&self, state: ObjectState) -> CoreResult<ObjectState>;

    /// Lists the object states of a system state.
    async fn get_object_states(&self, system_state: &SystemState) -> CoreResult<Vec<ObjectState>>;

    /// Atomically moves the (system, stage) state from Idle, or from a
    /// Running state older than `stale_after`, to Running.
    ///
    /// The state is created first if absent. Of two concurrent callers at
    /// most one gets [`StartOutcome::Started`].
    async fn try_start(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> CoreResult<StartOutcome>;

    /// Loads a system state, creating it if absent.
    async fn get_or_create_system_state(
        &self,
        system: &SystemName,
        stage: LifecycleStage,
    ) -> CoreResult<SystemState> {
        match self.get_system_state(system, stage).await? {
            Some(state) => Ok(state),
            None => self.create_system_state(system, stage).await,
        }
    }

    /// Loads an object state, creating it at `checkpoint` if absent.
    async fn get_or_create_object_state(
        &self,
        system_state: &SystemState,
        object: &ObjectName,
        checkpoint: DateTime<Utc>,
    ) -> CoreResult<ObjectState> {
        match self.get_object_state(system_state, object).await? {
            Some(state) => Ok(state),
            None => self.create_object_state(system_state, object, checkpoint).await,
        }
    }
}
