//! Operations: the unit of work inside a function.

use crate::context::OperationContext;
use crate::error::EngineResult;
use crate::trigger::{FunctionTrigger, ObjectChangeTrigger};
use async_trait::async_trait;
use centazio_core::{AbortVote, ObjectName, OperationStatus};
use chrono::{DateTime, Utc};
use std::fmt;

/// Static configuration of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationConfig {
    /// Object the operation works on.
    pub object: ObjectName,
    /// Cron schedule, if the operation runs on a timer.
    pub cron: Option<String>,
    /// Change triggers the operation reacts to.
    pub triggers: Vec<ObjectChangeTrigger>,
    /// Checkpoint for the first run. Falls back to the engine default.
    pub first_time_checkpoint: Option<DateTime<Utc>>,
}

impl OperationConfig {
    /// Creates a config with no schedule and no triggers.
    pub fn new(object: impl Into<ObjectName>) -> Self {
        Self {
            object: object.into(),
            cron: None,
            triggers: Vec::new(),
            first_time_checkpoint: None,
        }
    }

    /// Sets the cron schedule.
    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = Some(cron.into());
        self
    }

    /// Adds a change trigger.
    pub fn with_trigger(mut self, trigger: ObjectChangeTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Sets the first-run checkpoint.
    pub fn with_first_time_checkpoint(mut self, checkpoint: DateTime<Utc>) -> Self {
        self.first_time_checkpoint = Some(checkpoint);
        self
    }

    /// Returns true if any of `triggers` should run this operation.
    pub fn accepts(&self, triggers: &[FunctionTrigger]) -> bool {
        triggers.iter().any(|trigger| match trigger {
            FunctionTrigger::Timer { cron } => self.cron.as_deref() == Some(cron.as_str()),
            FunctionTrigger::ObjectChange(change) => self.triggers.contains(change),
            FunctionTrigger::Manual => true,
        })
    }
}

/// Result of one operation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Success or Error.
    pub status: OperationStatus,
    /// Whether later operations in the run may proceed.
    pub abort_vote: AbortVote,
    /// Human-readable summary.
    pub message: String,
    /// Failure detail.
    pub exception: Option<String>,
    /// Number of entities staged, promoted or written.
    pub affected: usize,
    /// Highest data timestamp actually processed.
    pub checkpoint: Option<DateTime<Utc>>,
}

impl OperationResult {
    /// A successful result that lets the run continue.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Success,
            abort_vote: AbortVote::Continue,
            message: message.into(),
            exception: None,
            affected: 0,
            checkpoint: None,
        }
    }

    /// A failed result. Failures always vote Abort.
    pub fn error(message: impl Into<String>, exception: impl fmt::Display) -> Self {
        Self {
            status: OperationStatus::Error,
            abort_vote: AbortVote::Abort,
            message: message.into(),
            exception: Some(exception.to_string()),
            affected: 0,
            checkpoint: None,
        }
    }

    /// Sets the affected count.
    pub fn with_affected(mut self, affected: usize) -> Self {
        self.affected = affected;
        self
    }

    /// Sets the observed checkpoint.
    pub fn with_checkpoint(mut self, checkpoint: Option<DateTime<Utc>>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Votes to stop later operations in this run.
    pub fn with_abort(mut self) -> Self {
        self.abort_vote = AbortVote::Abort;
        self
    }

    /// Returns true for a Success status.
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// Returns true if the result votes Abort.
    pub fn is_abort(&self) -> bool {
        self.abort_vote == AbortVote::Abort
    }
}

/// Why an operation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Its object state is inactive.
    Inactive,
    /// None of the run's triggers match it.
    NotTriggered,
    /// An earlier operation in the run voted Abort.
    Aborted,
}

/// What happened to one operation in a function run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation ran.
    Completed(OperationResult),
    /// The operation was skipped.
    Skipped(SkipReason),
}

/// A pipeline operation.
///
/// `run` returns `Err` only for store failures. Handler failures are
/// reported as an `Error` result.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Static configuration.
    fn config(&self) -> &OperationConfig;

    /// Runs the operation once.
    async fn run(&self, ctx: &OperationContext<'_>) -> EngineResult<OperationResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use centazio_core::LifecycleStage;

    #[test]
    fn accepts_matching_triggers_only() {
        let change = ObjectChangeTrigger::new("Crm", LifecycleStage::Read, "Contact");
        let config = OperationConfig::new("Contact")
            .with_cron("*/5 * * * * *")
            .with_trigger(change.clone());

        assert!(config.accepts(&[FunctionTrigger::timer("*/5 * * * * *")]));
        assert!(!config.accepts(&[FunctionTrigger::timer("0 * * * * *")]));
        assert!(config.accepts(&[change.into()]));
        assert!(!config.accepts(&[ObjectChangeTrigger::new("Tasks", LifecycleStage::Read, "Contact").into()]));
        assert!(config.accepts(&[FunctionTrigger::Manual]));
        assert!(!config.accepts(&[]));
    }

    #[test]
    fn unscheduled_operation_ignores_timers() {
        let config = OperationConfig::new("Contact");
        assert!(!config.accepts(&[FunctionTrigger::timer("* * * * * *")]));
    }

    #[test]
    fn errors_vote_abort() {
        let result = OperationResult::error("read failed", "timeout");
        assert_eq!(result.status, OperationStatus::Error);
        assert!(result.is_abort());
        assert_eq!(result.exception.as_deref(), Some("timeout"));

        let ok = OperationResult::success("ok").with_affected(3);
        assert!(ok.is_success());
        assert!(!ok.is_abort());
        assert!(ok.with_abort().is_abort());
    }
}
