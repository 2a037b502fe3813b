//! Staged entity retention sweep.

use crate::config::RetentionSettings;
use crate::error::EngineResult;
use centazio_core::{Clock, StagedEntityStore};
use chrono::Duration;

/// Rows deleted by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Rows deleted by staging age.
    pub staged_deleted: usize,
    /// Rows deleted by promotion age.
    pub promoted_deleted: usize,
}

/// Deletes staged rows older than the configured windows.
///
/// Promoted rows go first so the report attributes them to the shorter
/// window.
#[tracing::instrument(level = "info", skip_all)]
pub async fn sweep(
    store: &dyn StagedEntityStore,
    settings: &RetentionSettings,
    clock: &dyn Clock,
) -> EngineResult<RetentionReport> {
    let now = clock.now();
    let mut report = RetentionReport::default();

    if let Some(days) = settings.promoted_days {
        report.promoted_deleted = store
            .delete_before(now - Duration::days(i64::from(days)), true)
            .await?;
    }
    if let Some(days) = settings.staged_days {
        report.staged_deleted = store
            .delete_before(now - Duration::days(i64::from(days)), false)
            .await?;
    }

    tracing::info!(
        staged_deleted = report.staged_deleted,
        promoted_deleted = report.promoted_deleted,
        "retention sweep complete"
    );
    Ok(report)
}
