//! The update orchestrator.
//!
//! [`FileUpdater`] ties the engine together. Every update runs the same
//! pipeline:
//!
//! 1. Check the path against the [`PathPolicy`].
//! 2. Take the file lock (or check a lock taken earlier via
//!    [`FileUpdater::lock`]).
//! 3. Read the current bytes and, when requested, back them up.
//! 4. Select a strategy and apply the locator in memory.
//! 5. Validate the proposed content.
//! 6. Write atomically, retrying once and putting the original back if the
//!    write keeps failing.
//! 7. Record the change in the history ledger, rolling the write back if the
//!    ledger refuses it.
//! 8. Release the lock and notify the observer.
//!
//! A failure at any step leaves the file as it was before the call, apart
//! from the [`UpdateError::DataRisk`] case where the rollback itself failed.

mod batch;
mod report;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use folio_config::{Config, ConfigError};
use thiserror::Error;
use time::OffsetDateTime;

use crate::backup::{BackupError, BackupRecord, BackupStore};
use crate::commit::{AtomicFileWriter, ContentWriter};
use crate::error::UpdateError;
use crate::events::{StructuredUpdateObserver, UpdateObserver};
use crate::history::{
    HistoryAction, HistoryEntry, HistoryError, HistoryLedger, NewHistoryEntry,
};
use crate::locks::{LockError, LockGuard, LockManager, LockToken};
use crate::policy::{AllowedPath, PathPolicy};
use crate::request::UpdateRequest;
use crate::strategy::{StrategyError, StrategySet, UpdateStrategy};
use crate::verification::{ContentValidator, StructuralValidator, ValidationResult};

pub use report::{BatchItem, BatchResult, PruneReport, RestoreReport, UpdateReport};

/// Errors raised while assembling a [`FileUpdater`] from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The backup store could not be opened.
    #[error("failed to open the backup store: {0}")]
    Backup(#[from] BackupError),
    /// The history ledger could not be opened.
    #[error("failed to open the history ledger: {0}")]
    History(#[from] HistoryError),
}

/// How the pipeline obtains the file lock.
#[derive(Debug, Clone, Copy)]
enum LockMode<'t> {
    /// Acquire the lock for the duration of the call.
    Acquire,
    /// The caller already holds the lock under this token.
    Held(&'t LockToken),
}

/// Applies changes to files with backups, locking, validation and history.
pub struct FileUpdater {
    policy: PathPolicy,
    backups: BackupStore,
    locks: LockManager,
    history: HistoryLedger,
    strategies: StrategySet,
    validator: Arc<dyn ContentValidator>,
    observer: Arc<dyn UpdateObserver>,
    writer: Arc<dyn ContentWriter>,
    lock_timeout: Duration,
    validate_by_default: bool,
    backup_retention: Duration,
    history_retention: Duration,
    batch_sequence: AtomicU64,
}

impl FileUpdater {
    /// Creates an updater from its components with the standard strategies,
    /// structural validation, logging observer and atomic writer.
    #[must_use]
    pub fn new(
        policy: PathPolicy,
        backups: BackupStore,
        locks: LockManager,
        history: HistoryLedger,
    ) -> Self {
        let defaults = Config::default();
        Self {
            policy,
            backups,
            locks,
            history,
            strategies: StrategySet::standard(defaults.marker_prefix()),
            validator: Arc::new(StructuralValidator::new()),
            observer: Arc::new(StructuredUpdateObserver::new()),
            writer: Arc::new(AtomicFileWriter),
            lock_timeout: defaults.lock_timeout(),
            validate_by_default: defaults.validate_by_default(),
            backup_retention: defaults.backup_retention(),
            history_retention: defaults.history_retention(),
            batch_sequence: AtomicU64::new(0),
        }
    }

    /// Assembles an updater from configuration. Relative paths in the
    /// configuration are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails its checks or the backup
    /// store or history ledger cannot be opened.
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Self, SetupError> {
        config.check()?;
        let policy = PathPolicy::from_config(config, base_dir);
        let backups = BackupStore::open(base_dir.join(config.backup_root()))?;
        let history = HistoryLedger::open(base_dir.join(config.history_path()))?;
        let locks = LockManager::new(config.lock_stale_after());
        tracing::info!(
            target: "folio::updater",
            base_dir = %base_dir.display(),
            backups = %backups.root().display(),
            history = %history.path().display(),
            lock_timeout_ms = config.lock_timeout_ms,
            "file updater configured"
        );
        Ok(Self::new(policy, backups, locks, history)
            .with_strategies(StrategySet::standard(config.marker_prefix()))
            .with_lock_timeout(config.lock_timeout())
            .with_validation_default(config.validate_by_default())
            .with_retention(config.backup_retention(), config.history_retention()))
    }

    /// Replaces the content validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ContentValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the writer used for target files.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn ContentWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Registers an additional strategy after the existing ones.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn UpdateStrategy>) -> Self {
        self.strategies.register(strategy);
        self
    }

    /// Replaces the strategy set.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = strategies;
        self
    }

    /// Sets how long an update waits for a contended lock.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether requests without an explicit choice are validated.
    #[must_use]
    pub const fn with_validation_default(mut self, validate: bool) -> Self {
        self.validate_by_default = validate;
        self
    }

    /// Sets the retention windows applied by [`FileUpdater::prune`].
    #[must_use]
    pub const fn with_retention(mut self, backups: Duration, history: Duration) -> Self {
        self.backup_retention = backups;
        self.history_retention = history;
        self
    }

    /// The path policy in force.
    #[must_use]
    pub const fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Applies one change.
    ///
    /// # Errors
    ///
    /// Returns the [`UpdateError`] of the first pipeline step that failed.
    pub fn update(&self, request: UpdateRequest) -> Result<UpdateReport, UpdateError> {
        self.run_update(&request, LockMode::Acquire, None)
    }

    /// Applies one change under a lock taken earlier with
    /// [`FileUpdater::lock`].
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::LockNotHeld`] if `token` does not hold the
    /// target's lock, or any other pipeline error.
    pub fn update_with_lock(
        &self,
        request: UpdateRequest,
        token: &LockToken,
    ) -> Result<UpdateReport, UpdateError> {
        self.run_update(&request, LockMode::Held(token), None)
    }

    /// Restores `path` from the backup `backup_id`.
    ///
    /// The current content is backed up first, so the restore can itself be
    /// undone.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::BackupNotFound`] or
    /// [`UpdateError::BackupMismatch`] for bad identifiers, or the error of
    /// the step that failed.
    pub fn restore(&self, path: &Path, backup_id: &str) -> Result<RestoreReport, UpdateError> {
        let result = self.execute_restore(path, backup_id);
        match &result {
            Ok(report) => self.observer.content_restored(report),
            Err(error) => self.notify_failure(path, error),
        }
        result
    }

    /// Takes the lock on `path` for a multi-step editing session.
    ///
    /// The lock is held until [`FileUpdater::unlock`] is called or it goes
    /// stale.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::PathRejected`] or [`UpdateError::LockTimeout`].
    pub fn lock(&self, path: &Path) -> Result<LockToken, UpdateError> {
        let allowed = self.policy.validate(path)?;
        Ok(self.acquire(&allowed)?.into_token())
    }

    /// Releases a lock taken with [`FileUpdater::lock`]. Returns whether the
    /// token still held a lock.
    pub fn unlock(&self, token: &LockToken) -> bool {
        self.locks.release(*token)
    }

    /// History entries recorded for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::PathRejected`] or
    /// [`UpdateError::HistoryFailed`].
    pub fn history(&self, path: &Path) -> Result<Vec<HistoryEntry>, UpdateError> {
        let allowed = self.policy.validate(path)?;
        self.history
            .entries_for(allowed.as_path())
            .map_err(UpdateError::HistoryFailed)
    }

    /// Backups taken from `path`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::PathRejected`].
    pub fn backups(&self, path: &Path) -> Result<Vec<BackupRecord>, UpdateError> {
        let allowed = self.policy.validate(path)?;
        Ok(self.backups.list(Some(allowed.as_path())))
    }

    /// Removes backups and history entries older than the configured
    /// retention windows, measured back from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::BackupFailed`] or
    /// [`UpdateError::HistoryFailed`].
    pub fn prune(&self, now: OffsetDateTime) -> Result<PruneReport, UpdateError> {
        let mut report = PruneReport::default();
        if let Some(cutoff) = cutoff(now, self.backup_retention) {
            report.backups_removed = self
                .backups
                .prune(cutoff)
                .map_err(UpdateError::BackupFailed)?
                .len();
        }
        if let Some(cutoff) = cutoff(now, self.history_retention) {
            report.history_entries_removed = self
                .history
                .prune(cutoff)
                .map_err(UpdateError::HistoryFailed)?;
        }
        Ok(report)
    }

    fn run_update(
        &self,
        request: &UpdateRequest,
        mode: LockMode<'_>,
        batch_id: Option<&str>,
    ) -> Result<UpdateReport, UpdateError> {
        let result = self.execute_update(request, mode, batch_id);
        match &result {
            Ok(report) => self.observer.content_updated(report),
            Err(error) => self.notify_failure(request.target_file(), error),
        }
        result
    }

    fn notify_failure(&self, path: &Path, error: &UpdateError) {
        if error.is_data_risk() {
            self.observer.data_at_risk(path, error);
        }
        self.observer.update_failed(path, error);
    }

    fn execute_update(
        &self,
        request: &UpdateRequest,
        mode: LockMode<'_>,
        batch_id: Option<&str>,
    ) -> Result<UpdateReport, UpdateError> {
        let path = self.policy.validate(request.target_file())?;
        let _guard = match mode {
            LockMode::Acquire => Some(self.acquire(&path)?),
            LockMode::Held(token) => {
                if !self.locks.holds(path.as_path(), *token) {
                    return Err(UpdateError::LockNotHeld {
                        path: path.into_path_buf(),
                        token: *token,
                    });
                }
                None
            }
        };

        let bytes = fs::read(path.as_path())
            .map_err(|error| UpdateError::file_read(path.as_path(), error))?;
        let backup = if request.options().create_backup {
            let record = self
                .backups
                .backup_contents(&path, &bytes)
                .map_err(UpdateError::BackupFailed)?;
            self.observer.backup_created(&record);
            Some(record)
        } else {
            None
        };
        let original = String::from_utf8(bytes).map_err(|error| {
            UpdateError::file_read(
                path.as_path(),
                io::Error::new(io::ErrorKind::InvalidData, error),
            )
        })?;

        let strategy = self.strategies.select(request).ok_or_else(|| {
            UpdateError::StrategyNotFound {
                path: path.as_path().to_path_buf(),
                source: StrategyError::Unsupported {
                    kind: request.locator().kind().to_string(),
                },
            }
        })?;
        let applied = strategy
            .apply(&original, request)
            .map_err(|source| strategy_error(&path, source))?;

        let validate = request
            .options()
            .validate_result
            .unwrap_or(self.validate_by_default);
        if validate
            && let ValidationResult::Failed { failures } =
                self.validator
                    .validate(path.as_path(), &original, &applied.content)?
        {
            return Err(UpdateError::ValidationFailed {
                path: path.into_path_buf(),
                failures,
            });
        }

        self.write_or_roll_back(
            &path,
            applied.content.as_bytes(),
            original.as_bytes(),
            backup.as_ref(),
        )?;

        let backup_id = backup.map(|record| record.id);
        let action = if batch_id.is_some() {
            HistoryAction::BatchUpdate
        } else {
            HistoryAction::Update
        };
        let entry = self.record(
            &path,
            NewHistoryEntry {
                file_path: path.as_path().to_path_buf(),
                action,
                old_fragment: applied.old_fragment,
                new_fragment: request.locator().new_fragment().to_owned(),
                locator_kind: Some(request.locator().kind()),
                actor: request.actor().to_owned(),
                backup_id: backup_id.clone(),
                restored_from: None,
                batch_id: batch_id.map(str::to_owned),
            },
            Some(original.as_bytes()),
        )?;

        tracing::info!(
            target: "folio::updater",
            path = %path,
            strategy = strategy.name(),
            history_id = entry.id,
            "update applied"
        );
        Ok(UpdateReport {
            path: path.into_path_buf(),
            strategy: strategy.name(),
            locator_kind: request.locator().kind(),
            backup_id,
            history_id: entry.id,
            bytes_written: applied.content.len(),
            batch_id: batch_id.map(str::to_owned),
        })
    }

    fn execute_restore(&self, path: &Path, backup_id: &str) -> Result<RestoreReport, UpdateError> {
        let allowed = self.policy.validate(path)?;
        let _guard = self.acquire(&allowed)?;

        let record = self
            .backups
            .get(backup_id)
            .ok_or_else(|| UpdateError::BackupNotFound {
                id: backup_id.to_owned(),
            })?;
        if record.source_path != allowed.as_path() {
            return Err(UpdateError::BackupMismatch {
                id: backup_id.to_owned(),
                path: allowed.into_path_buf(),
            });
        }

        let current = match fs::read(allowed.as_path()) {
            Ok(bytes) => Some(bytes),
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => return Err(UpdateError::file_read(allowed.as_path(), error)),
        };
        let pre_restore = match &current {
            Some(bytes) => {
                let snapshot = self
                    .backups
                    .backup_contents(&allowed, bytes)
                    .map_err(UpdateError::BackupFailed)?;
                self.observer.backup_created(&snapshot);
                Some(snapshot)
            }
            None => None,
        };

        let restored = self.backups.contents(backup_id).map_err(backup_error)?;
        self.write_or_roll_back(
            &allowed,
            &restored,
            current.as_deref().unwrap_or_default(),
            pre_restore.as_ref(),
        )?;

        let pre_restore_backup = pre_restore.map(|snapshot| snapshot.id);
        let entry = self.record(
            &allowed,
            NewHistoryEntry {
                file_path: allowed.as_path().to_path_buf(),
                action: HistoryAction::Restore,
                old_fragment: current
                    .as_deref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default(),
                new_fragment: String::from_utf8_lossy(&restored).into_owned(),
                locator_kind: None,
                actor: String::new(),
                backup_id: pre_restore_backup.clone(),
                restored_from: Some(record.id.clone()),
                batch_id: None,
            },
            current.as_deref(),
        )?;

        tracing::info!(
            target: "folio::updater",
            path = %allowed,
            restored_from = %record.id,
            history_id = entry.id,
            "backup restored"
        );
        Ok(RestoreReport {
            path: allowed.into_path_buf(),
            restored_from: record.id,
            pre_restore_backup,
            history_id: entry.id,
            bytes_written: restored.len(),
        })
    }

    fn acquire(&self, path: &AllowedPath) -> Result<LockGuard<'_>, UpdateError> {
        self.locks
            .acquire(path.as_path(), self.lock_timeout)
            .map_err(|error| match error {
                LockError::Timeout { path, waited } => UpdateError::LockTimeout { path, waited },
                LockError::Held { path, .. } => UpdateError::LockTimeout {
                    path,
                    waited: Duration::ZERO,
                },
            })
    }

    /// Writes `contents`, retrying once. When both attempts fail the
    /// previous content is written back, preferring the verified backup
    /// bytes over the in-memory copy.
    fn write_or_roll_back(
        &self,
        path: &AllowedPath,
        contents: &[u8],
        previous: &[u8],
        backup: Option<&BackupRecord>,
    ) -> Result<(), UpdateError> {
        let Err(first) = self.writer.write(path.as_path(), contents) else {
            return Ok(());
        };
        tracing::warn!(
            target: "folio::updater",
            path = %path,
            error = %first,
            "write failed, retrying once"
        );
        let Err(write_error) = self.writer.write(path.as_path(), contents) else {
            return Ok(());
        };

        let backup_bytes = backup.and_then(|record| self.backups.contents(&record.id).ok());
        let previous = backup_bytes.as_deref().unwrap_or(previous);
        match self.writer.write(path.as_path(), previous) {
            Ok(()) => Err(UpdateError::WriteFailed {
                path: path.as_path().to_path_buf(),
                source: write_error,
                restored: true,
            }),
            Err(restore_error) => Err(UpdateError::DataRisk {
                path: path.as_path().to_path_buf(),
                write_error,
                restore_error,
            }),
        }
    }

    /// Appends a history entry. If the ledger refuses it, the file is put
    /// back to `previous` (or removed when it did not exist) so that no
    /// change goes unrecorded.
    fn record(
        &self,
        path: &AllowedPath,
        pending: NewHistoryEntry,
        previous: Option<&[u8]>,
    ) -> Result<HistoryEntry, UpdateError> {
        let error = match self.history.append(pending) {
            Ok(entry) => return Ok(entry),
            Err(error) => error,
        };
        tracing::error!(
            target: "folio::updater",
            path = %path,
            error = %error,
            "history append failed, rolling back"
        );
        let rollback = match previous {
            Some(bytes) => self.writer.write(path.as_path(), bytes),
            None => fs::remove_file(path.as_path()),
        };
        match rollback {
            Ok(()) => Err(UpdateError::HistoryFailed(error)),
            Err(restore_error) => Err(UpdateError::DataRisk {
                path: path.as_path().to_path_buf(),
                write_error: io::Error::other(format!("history append failed: {error}")),
                restore_error,
            }),
        }
    }
}

impl fmt::Debug for FileUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpdater")
            .field("policy", &self.policy)
            .field("backups", &self.backups.root())
            .field("history", &self.history.path())
            .field("strategies", &self.strategies)
            .field("lock_timeout", &self.lock_timeout)
            .field("validate_by_default", &self.validate_by_default)
            .finish_non_exhaustive()
    }
}

fn strategy_error(path: &AllowedPath, source: StrategyError) -> UpdateError {
    let path = path.as_path().to_path_buf();
    match source {
        StrategyError::Ambiguous { .. } => UpdateError::StrategyAmbiguous { path, source },
        _ => UpdateError::StrategyNotFound { path, source },
    }
}

fn backup_error(error: BackupError) -> UpdateError {
    match error {
        BackupError::NotFound { id } => UpdateError::BackupNotFound { id },
        other => UpdateError::BackupFailed(other),
    }
}

fn cutoff(now: OffsetDateTime, retention: Duration) -> Option<OffsetDateTime> {
    time::Duration::try_from(retention)
        .ok()
        .and_then(|window| now.checked_sub(window))
}
