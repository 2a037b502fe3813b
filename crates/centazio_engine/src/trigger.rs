//! Function triggers.

use centazio_core::{LifecycleStage, ObjectName, SystemName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Emitted when an operation succeeds and changed something.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectChangeTrigger {
    /// System of the operation.
    pub system: SystemName,
    /// Stage of the operation.
    pub stage: LifecycleStage,
    /// Object of the operation.
    pub object: ObjectName,
}

impl ObjectChangeTrigger {
    /// Creates a trigger.
    pub fn new(
        system: impl Into<SystemName>,
        stage: LifecycleStage,
        object: impl Into<ObjectName>,
    ) -> Self {
        Self {
            system: system.into(),
            stage,
            object: object.into(),
        }
    }
}

impl fmt::Display for ObjectChangeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.system, self.stage, self.object)
    }
}

/// Why a function is being run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionTrigger {
    /// A cron tick.
    Timer {
        /// The cron expression that fired.
        cron: String,
    },
    /// Another operation changed data.
    ObjectChange(ObjectChangeTrigger),
    /// An explicit host request. Every operation accepts it.
    Manual,
}

impl FunctionTrigger {
    /// A cron tick trigger.
    pub fn timer(cron: impl Into<String>) -> Self {
        FunctionTrigger::Timer { cron: cron.into() }
    }
}

impl From<ObjectChangeTrigger> for FunctionTrigger {
    fn from(trigger: ObjectChangeTrigger) -> Self {
        FunctionTrigger::ObjectChange(trigger)
    }
}
