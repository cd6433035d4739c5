//! Results returned by the updater.

use std::path::PathBuf;

use crate::error::UpdateError;
use crate::request::{LocatorKind, UpdateRequest};

/// A successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// The file that changed.
    pub path: PathBuf,
    /// Name of the strategy that applied the change.
    pub strategy: &'static str,
    /// Kind of locator used.
    pub locator_kind: LocatorKind,
    /// Backup taken before the change, if requested.
    pub backup_id: Option<String>,
    /// Identifier of the history entry.
    pub history_id: u64,
    /// Size of the new content.
    pub bytes_written: usize,
    /// Batch the update belonged to.
    pub batch_id: Option<String>,
}

/// A successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// The file that was restored.
    pub path: PathBuf,
    /// The backup whose content was restored.
    pub restored_from: String,
    /// Backup of the content the restore replaced, when the file existed.
    pub pre_restore_backup: Option<String>,
    /// Identifier of the history entry.
    pub history_id: u64,
    /// Size of the restored content.
    pub bytes_written: usize,
}

/// One item of a batch and how it went.
#[derive(Debug)]
pub struct BatchItem {
    /// The request as submitted.
    pub request: UpdateRequest,
    /// Its result.
    pub outcome: Result<UpdateReport, UpdateError>,
}

/// Results of a batch, in submission order.
#[derive(Debug)]
pub struct BatchResult {
    /// Number of requests submitted.
    pub total: usize,
    /// Number that succeeded.
    pub succeeded: usize,
    /// Number that failed.
    pub failed: usize,
    /// Shared identifier recorded in history for every item.
    pub batch_id: String,
    /// Per-item results, in submission order.
    pub results: Vec<BatchItem>,
}

impl BatchResult {
    pub(crate) fn new(batch_id: String, results: Vec<BatchItem>) -> Self {
        let succeeded = results.iter().filter(|item| item.outcome.is_ok()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            batch_id,
            results,
        }
    }

    /// Whether every item succeeded.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Iterates over the failed items.
    pub fn failures(&self) -> impl Iterator<Item = &BatchItem> {
        self.results.iter().filter(|item| item.outcome.is_err())
    }
}

/// What retention maintenance removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Backups deleted.
    pub backups_removed: usize,
    /// History entries deleted.
    pub history_entries_removed: usize,
}
