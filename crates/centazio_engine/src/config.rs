//! Engine settings.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by the runners, the scheduler and the retention sweep.
///
/// Loaded from JSON; fields missing from the document take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Page bound for staged entity reads.
    pub staged_page_size: usize,
    /// Checkpoint given to an object that has never run.
    pub first_time_checkpoint: DateTime<Utc>,
    /// A system state left `Running` longer than this is re-entered.
    pub stale_running_threshold_secs: u64,
    /// Staged entity retention.
    pub retention: RetentionSettings,
}

impl EngineSettings {
    /// Creates settings with defaults.
    pub fn new() -> Self {
        Self {
            staged_page_size: 1000,
            first_time_checkpoint: DateTime::<Utc>::UNIX_EPOCH,
            stale_running_threshold_secs: 60 * 60,
            retention: RetentionSettings::default(),
        }
    }

    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::settings(format!("invalid settings JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::settings(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Sets the staged page size.
    pub fn with_staged_page_size(mut self, size: usize) -> Self {
        self.staged_page_size = size;
        self
    }

    /// Sets the first-time checkpoint.
    pub fn with_first_time_checkpoint(mut self, checkpoint: DateTime<Utc>) -> Self {
        self.first_time_checkpoint = checkpoint;
        self
    }

    /// Sets the stale-running threshold.
    pub fn with_stale_running_threshold_secs(mut self, secs: u64) -> Self {
        self.stale_running_threshold_secs = secs;
        self
    }

    /// Sets the retention settings.
    pub fn with_retention(mut self, retention: RetentionSettings) -> Self {
        self.retention = retention;
        self
    }

    /// The stale-running threshold as a duration.
    pub fn stale_running_threshold(&self) -> Duration {
        Duration::seconds(i64::try_from(self.stale_running_threshold_secs).unwrap_or(i64::MAX))
    }

    fn validate(&self) -> EngineResult<()> {
        if self.staged_page_size == 0 {
            return Err(EngineError::settings("staged_page_size must be at least 1"));
        }
        Ok(())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// How long staged entities are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Days to keep staged rows regardless of state. `None` disables.
    pub staged_days: Option<u32>,
    /// Days to keep promoted rows. `None` disables.
    pub promoted_days: Option<u32>,
}

impl RetentionSettings {
    /// Retention that never deletes anything.
    pub fn disabled() -> Self {
        Self {
            staged_days: None,
            promoted_days: None,
        }
    }
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            staged_days: Some(30),
            promoted_days: Some(7),
        }
    }
}
