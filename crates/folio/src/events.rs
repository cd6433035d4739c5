//! Structured events for cache invalidation and audit subscribers.

use std::path::Path;
use std::sync::Arc;

use crate::backup::BackupRecord;
use crate::error::UpdateError;
use crate::updater::{RestoreReport, UpdateReport};

/// Observer notified as the updater changes files.
///
/// Callbacks run on the thread performing the operation, after the file
/// lock has been released for success events.
pub trait UpdateObserver: Send + Sync {
    /// A file was updated (`content.updated`).
    fn content_updated(&self, report: &UpdateReport);

    /// A backup was taken (`backup.created`).
    fn backup_created(&self, record: &BackupRecord);

    /// A file was restored from a backup (`content.restored`).
    fn content_restored(&self, report: &RestoreReport);

    /// An update or restore failed (`update.failed`).
    fn update_failed(&self, path: &Path, error: &UpdateError);

    /// A failed write could not be rolled back (`data.at_risk`).
    fn data_at_risk(&self, path: &Path, error: &UpdateError);
}

impl<T> UpdateObserver for Arc<T>
where
    T: UpdateObserver + ?Sized,
{
    fn content_updated(&self, report: &UpdateReport) {
        (**self).content_updated(report);
    }

    fn backup_created(&self, record: &BackupRecord) {
        (**self).backup_created(record);
    }

    fn content_restored(&self, report: &RestoreReport) {
        (**self).content_restored(report);
    }

    fn update_failed(&self, path: &Path, error: &UpdateError) {
        (**self).update_failed(path, error);
    }

    fn data_at_risk(&self, path: &Path, error: &UpdateError) {
        (**self).data_at_risk(path, error);
    }
}

/// Default observer that records events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredUpdateObserver;

impl StructuredUpdateObserver {
    /// Builds a new observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl UpdateObserver for StructuredUpdateObserver {
    fn content_updated(&self, report: &UpdateReport) {
        tracing::info!(
            target: "folio::events",
            event = "content.updated",
            path = %report.path.display(),
            strategy = report.strategy,
            locator = %report.locator_kind,
            backup_id = report.backup_id.as_deref(),
            history_id = report.history_id,
            bytes = report.bytes_written,
            batch_id = report.batch_id.as_deref(),
            "content updated"
        );
    }

    fn backup_created(&self, record: &BackupRecord) {
        tracing::info!(
            target: "folio::events",
            event = "backup.created",
            path = %record.source_path.display(),
            backup_id = %record.id,
            size = record.size,
            "backup created"
        );
    }

    fn content_restored(&self, report: &RestoreReport) {
        tracing::info!(
            target: "folio::events",
            event = "content.restored",
            path = %report.path.display(),
            restored_from = %report.restored_from,
            pre_restore_backup = report.pre_restore_backup.as_deref(),
            history_id = report.history_id,
            "content restored"
        );
    }

    fn update_failed(&self, path: &Path, error: &UpdateError) {
        if error.is_security_rejection() {
            tracing::warn!(
                target: "folio::events",
                event = "update.failed",
                path = %path.display(),
                security = true,
                error = %error,
                "update rejected by path policy"
            );
        } else {
            tracing::warn!(
                target: "folio::events",
                event = "update.failed",
                path = %path.display(),
                transient = error.is_transient(),
                error = %error,
                "update failed"
            );
        }
    }

    fn data_at_risk(&self, path: &Path, error: &UpdateError) {
        tracing::error!(
            target: "folio::events",
            event = "data.at_risk",
            path = %path.display(),
            error = %error,
            error_debug = ?error,
            "file may be damaged and needs operator attention"
        );
    }
}
