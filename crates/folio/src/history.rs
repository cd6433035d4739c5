//! Append-only ledger of applied changes.
//!
//! Entries are stored one JSON object per line. Appends are serialised by a
//! mutex that also guards the identifier counter, so identifiers increase in
//! file order.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::commit::atomic_write;
use crate::request::LocatorKind;

/// What kind of change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// A single update.
    Update,
    /// A restore from backup.
    Restore,
    /// One item of a batch update.
    BatchUpdate,
}

/// A recorded change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic identifier.
    pub id: u64,
    /// The changed file.
    pub file_path: PathBuf,
    /// What happened.
    pub action: HistoryAction,
    /// The fragment before the change.
    pub old_fragment: String,
    /// The fragment after the change.
    pub new_fragment: String,
    /// Locator kind used, for updates.
    pub locator_kind: Option<LocatorKind>,
    /// Opaque attribution.
    pub actor: String,
    /// Backup taken before the change.
    pub backup_id: Option<String>,
    /// Backup restored, for restores.
    pub restored_from: Option<String>,
    /// Shared identifier of a batch.
    pub batch_id: Option<String>,
    /// When the entry was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An entry before the ledger assigns its identifier and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    /// The changed file.
    pub file_path: PathBuf,
    /// What happened.
    pub action: HistoryAction,
    /// The fragment before the change.
    pub old_fragment: String,
    /// The fragment after the change.
    pub new_fragment: String,
    /// Locator kind used, for updates.
    pub locator_kind: Option<LocatorKind>,
    /// Opaque attribution.
    pub actor: String,
    /// Backup taken before the change.
    pub backup_id: Option<String>,
    /// Backup restored, for restores.
    pub restored_from: Option<String>,
    /// Shared identifier of a batch.
    pub batch_id: Option<String>,
}

/// Errors raised by the ledger.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The ledger file could not be read or written.
    #[error("history I/O failed for {path}: {source}")]
    Io {
        /// The ledger file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// An entry could not be encoded.
    #[error("failed to encode history entry: {0}")]
    Encode(#[source] serde_json::Error),
}

/// JSON-lines history ledger.
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    next_id: Mutex<u64>,
}

impl HistoryLedger {
    /// Opens the ledger at `path`, creating parent directories as needed and
    /// continuing identifiers after the highest recorded one.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or an
    /// existing ledger cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let next_id = read_entries(&path)?
            .iter()
            .map(|entry| entry.id)
            .max()
            .map_or(1, |max| max.saturating_add(1));
        Ok(Self {
            path,
            next_id: Mutex::new(next_id),
        })
    }

    /// Location of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an entry, assigning its identifier and timestamp.
    ///
    /// The line is flushed to disk before returning. The identifier is only
    /// consumed when the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub fn append(&self, pending: NewHistoryEntry) -> Result<HistoryEntry, HistoryError> {
        let mut next_id = self.lock();
        let entry = HistoryEntry {
            id: *next_id,
            file_path: pending.file_path,
            action: pending.action,
            old_fragment: pending.old_fragment,
            new_fragment: pending.new_fragment,
            locator_kind: pending.locator_kind,
            actor: pending.actor,
            backup_id: pending.backup_id,
            restored_from: pending.restored_from,
            batch_id: pending.batch_id,
            created_at: OffsetDateTime::now_utc(),
        };
        let mut line = serde_json::to_vec(&entry).map_err(HistoryError::Encode)?;
        line.push(b'\n');

        let io_error = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_error)?;
        file.write_all(&line).map_err(io_error)?;
        file.sync_data().map_err(io_error)?;

        *next_id = next_id.saturating_add(1);
        drop(next_id);
        tracing::debug!(
            target: "folio::history",
            id = entry.id,
            path = %entry.file_path.display(),
            action = ?entry.action,
            "history entry appended"
        );
        Ok(entry)
    }

    /// All entries in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let _guard = self.lock();
        read_entries(&self.path)
    }

    /// Entries recorded for `path`, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but cannot be read.
    pub fn entries_for(&self, path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.entries()?;
        entries.retain(|entry| entry.file_path == path);
        Ok(entries)
    }

    /// Removes entries created before `cutoff`, returning how many were
    /// removed. The ledger is rewritten atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or rewritten.
    pub fn prune(&self, cutoff: OffsetDateTime) -> Result<usize, HistoryError> {
        let _guard = self.lock();
        let entries = read_entries(&self.path)?;
        let before = entries.len();
        let kept: Vec<&HistoryEntry> = entries
            .iter()
            .filter(|entry| entry.created_at >= cutoff)
            .collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut contents = Vec::new();
        for entry in kept {
            serde_json::to_writer(&mut contents, entry).map_err(HistoryError::Encode)?;
            contents.push(b'\n');
        }
        atomic_write(&self.path, &contents).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(
            target: "folio::history",
            removed,
            cutoff = %cutoff,
            "pruned history"
        );
        Ok(removed)
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.next_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HistoryError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(error) => tracing::warn!(
                target: "folio::history",
                path = %path.display(),
                line = index + 1,
                error = %error,
                "skipping malformed history line"
            ),
        }
    }
    Ok(entries)
}
