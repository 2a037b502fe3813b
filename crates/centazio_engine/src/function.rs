//! Functions and the function runner.
//!
//! A function is an ordered list of operations for one (system, stage).
//! The runner drives the control state around a run:
//!
//! ```text
//! claim SystemState atomically, creating it if absent
//!   inactive            -> skip
//!   Running, not stale  -> skip
//!   otherwise           -> Running
//!   for each operation, in order:
//!     earlier Abort vote, trigger mismatch or inactive object -> skip
//!     run, persist ObjectState, advance checkpoint on Success only
//! Running -> Idle   (always)
//! ```

use crate::context::{EngineContext, OperationContext};
use crate::error::{EngineError, EngineResult};
use crate::operation::{Operation, OperationOutcome, SkipReason};
use crate::trigger::{FunctionTrigger, ObjectChangeTrigger};
use centazio_core::{
    AbortVote, LifecycleStage, ObjectName, ObjectState, OperationStatus, StartOutcome,
    SystemName, SystemState,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// An ordered list of operations for one (system, stage).
pub struct Function {
    name: String,
    system: SystemName,
    stage: LifecycleStage,
    operations: Vec<Arc<dyn Operation>>,
}

impl Function {
    /// Creates a function with no operations.
    pub fn new(name: impl Into<String>, system: impl Into<SystemName>, stage: LifecycleStage) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            stage,
            operations: Vec::new(),
        }
    }

    /// Appends an operation.
    pub fn with_operation(mut self, operation: impl Operation + 'static) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// System the function works for.
    pub fn system(&self) -> &SystemName {
        &self.system
    }

    /// Lifecycle stage.
    pub fn stage(&self) -> LifecycleStage {
        self.stage
    }

    /// Operations in run order.
    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    /// Distinct cron expressions used by the operations.
    pub fn cron_expressions(&self) -> BTreeSet<String> {
        self.operations
            .iter()
            .filter_map(|op| op.config().cron.clone())
            .collect()
    }

    /// Returns true if any operation reacts to `trigger`.
    pub fn listens_to(&self, trigger: &ObjectChangeTrigger) -> bool {
        self.operations
            .iter()
            .any(|op| op.config().triggers.contains(trigger))
    }
}

/// Why a whole function run was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionSkipReason {
    /// The system state is inactive.
    Inactive,
    /// Another run holds the system state.
    AlreadyRunning,
}

/// Outcome of one operation within a function run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRunRecord {
    /// Object of the operation.
    pub object: ObjectName,
    /// What happened.
    pub outcome: OperationOutcome,
}

/// Result of a function run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRunResult {
    /// Function name.
    pub function: String,
    /// System.
    pub system: SystemName,
    /// Stage.
    pub stage: LifecycleStage,
    /// Set if the function did not run at all.
    pub skipped: Option<FunctionSkipReason>,
    /// One record per operation, in order.
    pub operations: Vec<OperationRunRecord>,
}

impl FunctionRunResult {
    fn skipped(function: &Function, reason: FunctionSkipReason) -> Self {
        Self {
            function: function.name.clone(),
            system: function.system.clone(),
            stage: function.stage,
            skipped: Some(reason),
            operations: Vec::new(),
        }
    }

    /// Change triggers for operations that succeeded and changed data.
    pub fn change_triggers(&self) -> Vec<ObjectChangeTrigger> {
        self.operations
            .iter()
            .filter_map(|record| match &record.outcome {
                OperationOutcome::Completed(result) if result.is_success() && result.affected > 0 => {
                    Some(ObjectChangeTrigger {
                        system: self.system.clone(),
                        stage: self.stage,
                        object: record.object.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the outcome recorded for `object`.
    pub fn outcome(&self, object: &str) -> Option<&OperationOutcome> {
        self.operations
            .iter()
            .find(|r| r.object.as_str() == object)
            .map(|r| &r.outcome)
    }
}

/// Runs functions against the control repository.
pub struct FunctionRunner {
    ctx: EngineContext,
}

impl FunctionRunner {
    /// Creates a runner.
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// The engine context.
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Runs `function` for `triggers`.
    ///
    /// The system state is always returned to Idle. A store failure inside
    /// an operation is recorded on its object state and then returned.
    #[tracing::instrument(level = "info", skip_all, fields(function = %function.name, system = %function.system, stage = %function.stage))]
    pub async fn run(
        &self,
        function: &Function,
        triggers: &[FunctionTrigger],
    ) -> EngineResult<FunctionRunResult> {
        let ctl = &self.ctx.stores.ctl;
        let threshold = self.ctx.settings.stale_running_threshold();
        let state = match ctl
            .try_start(&function.system, function.stage, self.ctx.now(), threshold)
            .await?
        {
            StartOutcome::Started { state, reclaimed } => {
                if reclaimed {
                    tracing::warn!(last_started = ?state.last_started, "re-entered stale running state");
                }
                state
            }
            StartOutcome::Inactive(_) => {
                tracing::info!("system state inactive, skipping");
                return Ok(FunctionRunResult::skipped(function, FunctionSkipReason::Inactive));
            }
            StartOutcome::AlreadyRunning(_) => {
                tracing::warn!("function already running, skipping");
                return Ok(FunctionRunResult::skipped(function, FunctionSkipReason::AlreadyRunning));
            }
        };

        let outcome = self.run_operations(function, &state, triggers).await;
        let reset = ctl.save_system_state(state.completed(self.ctx.now())).await;

        let operations = match (outcome, reset) {
            (Ok(operations), Ok(_)) => operations,
            (Err(e), reset) => {
                if let Err(reset_err) = reset {
                    tracing::error!(error = %reset_err, "failed to reset system state to idle");
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e.into()),
        };

        let result = FunctionRunResult {
            function: function.name.clone(),
            system: function.system.clone(),
            stage: function.stage,
            skipped: None,
            operations,
        };
        tracing::info!(operations = result.operations.len(), "function run complete");
        Ok(result)
    }

    async fn run_operations(
        &self,
        function: &Function,
        state: &SystemState,
        triggers: &[FunctionTrigger],
    ) -> EngineResult<Vec<OperationRunRecord>> {
        let ctl = &self.ctx.stores.ctl;
        let mut records = Vec::with_capacity(function.operations.len());
        let mut aborted = false;

        for operation in &function.operations {
            let config = operation.config();
            let object = config.object.clone();

            if aborted {
                tracing::warn!(%object, "skipped after abort vote");
                records.push(OperationRunRecord {
                    object,
                    outcome: OperationOutcome::Skipped(SkipReason::Aborted),
                });
                continue;
            }
            if !config.accepts(triggers) {
                tracing::debug!(%object, "not triggered");
                records.push(OperationRunRecord {
                    object,
                    outcome: OperationOutcome::Skipped(SkipReason::NotTriggered),
                });
                continue;
            }

            let first_time = config
                .first_time_checkpoint
                .unwrap_or(self.ctx.settings.first_time_checkpoint);
            let mut object_state = ctl.get_or_create_object_state(state, &object, first_time).await?;
            if !object_state.active {
                tracing::info!(%object, "object state inactive, skipping");
                records.push(OperationRunRecord {
                    object,
                    outcome: OperationOutcome::Skipped(SkipReason::Inactive),
                });
                continue;
            }

            let started = self.ctx.now();
            object_state.last_start = Some(started);
            let op_ctx = OperationContext {
                engine: &self.ctx,
                system: &function.system,
                stage: function.stage,
                object: &object,
                checkpoint: object_state.checkpoint,
            };

            let result = match operation.run(&op_ctx).await {
                Ok(result) => result,
                Err(e) => {
                    record_store_failure(object_state, &e, self.ctx.now(), ctl.as_ref()).await;
                    return Err(e);
                }
            };

            let completed = self.ctx.now();
            object_state.last_completed = Some(completed);
            object_state.last_result = result.status;
            object_state.last_abort_vote = result.abort_vote;
            object_state.last_run_message = Some(result.message.clone());
            object_state.last_run_exception = result.exception.clone();
            if result.status == OperationStatus::Success {
                object_state.last_success_start = Some(started);
                object_state.last_success_completed = Some(completed);
                if let Some(observed) = result.checkpoint {
                    object_state.advance_checkpoint(observed);
                }
            } else {
                tracing::warn!(%object, message = %result.message, exception = ?result.exception, "operation failed");
            }
            ctl.save_object_state(object_state).await?;

            if result.abort_vote == AbortVote::Abort {
                tracing::warn!(%object, "operation voted abort");
                aborted = true;
            }
            records.push(OperationRunRecord {
                object,
                outcome: OperationOutcome::Completed(result),
            });
        }
        Ok(records)
    }
}

async fn record_store_failure(
    mut object_state: ObjectState,
    error: &EngineError,
    now: chrono::DateTime<chrono::Utc>,
    ctl: &dyn centazio_core::CtlRepository,
) {
    let inconsistent = matches!(error, EngineError::Store(e) if e.is_consistency_error());
    tracing::error!(object = %object_state.object, error = %error, inconsistent, "operation store failure");
    object_state.last_completed = Some(now);
    object_state.last_result = OperationStatus::Error;
    object_state.last_abort_vote = AbortVote::Abort;
    object_state.last_run_message = Some(if inconsistent {
        format!("{} failed on inconsistent stored data", object_state.object)
    } else {
        format!("{} failed with a store error", object_state.object)
    });
    object_state.last_run_exception = Some(error.to_string());
    if let Err(save_err) = ctl.save_object_state(object_state).await {
        tracing::error!(error = %save_err, "failed to record operation failure");
    }
}
