//! Timestamped, content-addressed backups.
//!
//! Each backup is stored as two files under the backup root: `<id>.bak`
//! holding the raw bytes and `<id>.json` holding the [`BackupRecord`]. The
//! in-memory index is rebuilt from the metadata files when the store is
//! opened, so backups survive restarts.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

use crate::commit::atomic_write;
use crate::policy::AllowedPath;

const DATA_EXTENSION: &str = "bak";
const METADATA_EXTENSION: &str = "json";

/// Metadata describing one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Opaque identifier, unique within the store.
    pub id: String,
    /// The file the backup was taken from.
    pub source_path: PathBuf,
    /// Where the backup bytes are stored.
    pub stored_path: PathBuf,
    /// When the backup was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Size of the backed-up content in bytes.
    pub size: u64,
    /// SHA-256 of the backed-up content, hex encoded.
    pub content_hash: String,
}

/// Errors raised by the backup store.
#[derive(Debug, Error)]
pub enum BackupError {
    /// A file could not be read or written.
    #[error("backup I/O failed for {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Metadata could not be encoded.
    #[error("failed to encode backup metadata for {id}: {source}")]
    Metadata {
        /// The backup identifier.
        id: String,
        /// Underlying serialisation error.
        source: serde_json::Error,
    },
    /// No backup exists with this identifier.
    #[error("no backup with id {id}")]
    NotFound {
        /// The requested identifier.
        id: String,
    },
    /// The stored bytes no longer match the recorded hash.
    #[error("backup {id} is corrupted: expected hash {expected}, found {actual}")]
    Corrupted {
        /// The backup identifier.
        id: String,
        /// Hash recorded when the backup was taken.
        expected: String,
        /// Hash of the bytes currently stored.
        actual: String,
    },
}

impl BackupError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Stores and restores file backups.
#[derive(Debug)]
pub struct BackupStore {
    root: PathBuf,
    index: RwLock<HashMap<String, BackupRecord>>,
    sequence: AtomicU64,
}

impl BackupStore {
    /// Opens the store at `root`, creating the directory if needed and
    /// indexing existing metadata. Unreadable metadata files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be created or listed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|error| BackupError::io(&root, error))?;
        let mut index = HashMap::new();
        let entries = fs::read_dir(&root).map_err(|error| BackupError::io(&root, error))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(METADATA_EXTENSION) {
                continue;
            }
            match read_metadata(&path) {
                Ok(record) => {
                    index.insert(record.id.clone(), record);
                }
                Err(error) => tracing::warn!(
                    target: "folio::backup",
                    path = %path.display(),
                    error = %error,
                    "skipping unreadable backup metadata"
                ),
            }
        }
        tracing::debug!(
            target: "folio::backup",
            root = %root.display(),
            backups = index.len(),
            "backup store opened"
        );
        Ok(Self {
            root,
            index: RwLock::new(index),
            sequence: AtomicU64::new(0),
        })
    }

    /// Directory holding the backups.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backs up the current content of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the backup cannot be
    /// written.
    pub fn backup(&self, path: &AllowedPath) -> Result<BackupRecord, BackupError> {
        let contents =
            fs::read(path.as_path()).map_err(|error| BackupError::io(path.as_path(), error))?;
        self.backup_contents(path, &contents)
    }

    /// Backs up `contents`, previously read from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup files cannot be written.
    pub fn backup_contents(
        &self,
        path: &AllowedPath,
        contents: &[u8],
    ) -> Result<BackupRecord, BackupError> {
        let created_at = OffsetDateTime::now_utc();
        let content_hash = hex_digest(contents);
        let id = self.next_id(path.as_path(), created_at, &content_hash);
        let stored_path = self.root.join(format!("{id}.{DATA_EXTENSION}"));
        let metadata_path = self.root.join(format!("{id}.{METADATA_EXTENSION}"));

        let record = BackupRecord {
            id: id.clone(),
            source_path: path.as_path().to_path_buf(),
            stored_path: stored_path.clone(),
            created_at,
            size: u64::try_from(contents.len()).unwrap_or(u64::MAX),
            content_hash,
        };
        let metadata = serde_json::to_vec_pretty(&record).map_err(|source| {
            BackupError::Metadata {
                id: id.clone(),
                source,
            }
        })?;

        atomic_write(&stored_path, contents)
            .map_err(|error| BackupError::io(&stored_path, error))?;
        if let Err(error) = atomic_write(&metadata_path, &metadata) {
            // The data file is useless without metadata.
            discard_orphaned_data(&stored_path);
            return Err(BackupError::io(&metadata_path, error));
        }

        self.index_mut().insert(id, record.clone());
        tracing::info!(
            target: "folio::backup",
            id = %record.id,
            source = %record.source_path.display(),
            size = record.size,
            "backup created"
        );
        Ok(record)
    }

    /// Returns the stored bytes of a backup after checking their hash.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] for unknown identifiers,
    /// [`BackupError::Corrupted`] when the bytes no longer match, or an I/O
    /// error.
    pub fn contents(&self, id: &str) -> Result<Vec<u8>, BackupError> {
        let record = self.get(id).ok_or_else(|| BackupError::NotFound { id: id.to_owned() })?;
        let contents = fs::read(&record.stored_path)
            .map_err(|error| BackupError::io(&record.stored_path, error))?;
        let actual = hex_digest(&contents);
        if actual != record.content_hash {
            return Err(BackupError::Corrupted {
                id: record.id,
                expected: record.content_hash,
                actual,
            });
        }
        Ok(contents)
    }

    /// Atomically copies a backup back onto its source path.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] for unknown identifiers, or an error
    /// if the backup cannot be read or the source cannot be written.
    pub fn restore(&self, id: &str) -> Result<BackupRecord, BackupError> {
        let contents = self.contents(id)?;
        let record = self.get(id).ok_or_else(|| BackupError::NotFound { id: id.to_owned() })?;
        atomic_write(&record.source_path, &contents)
            .map_err(|error| BackupError::io(&record.source_path, error))?;
        tracing::info!(
            target: "folio::backup",
            id = %record.id,
            source = %record.source_path.display(),
            "backup restored"
        );
        Ok(record)
    }

    /// Returns the backup with this identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<BackupRecord> {
        self.index().get(id).cloned()
    }

    /// Lists backups, oldest first, optionally only those taken from `path`.
    #[must_use]
    pub fn list(&self, path: Option<&Path>) -> Vec<BackupRecord> {
        let mut records: Vec<BackupRecord> = self
            .index()
            .values()
            .filter(|record| path.is_none_or(|path| record.source_path == path))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Deletes backups created before `cutoff`, returning their identifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if a backup file cannot be removed. Backups removed
    /// before the failure stay removed.
    pub fn prune(&self, cutoff: OffsetDateTime) -> Result<Vec<String>, BackupError> {
        let mut index = self.index_mut();
        let mut expired: Vec<BackupRecord> = index
            .values()
            .filter(|record| record.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut removed = Vec::with_capacity(expired.len());
        for record in expired {
            let metadata_path = self.root.join(format!("{}.{METADATA_EXTENSION}", record.id));
            remove_if_present(&metadata_path)?;
            remove_if_present(&record.stored_path)?;
            index.remove(&record.id);
            removed.push(record.id);
        }
        drop(index);
        if !removed.is_empty() {
            tracing::info!(
                target: "folio::backup",
                removed = removed.len(),
                cutoff = %cutoff,
                "pruned backups"
            );
        }
        Ok(removed)
    }

    fn next_id(&self, path: &Path, created_at: OffsetDateTime, content_hash: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = created_at.unix_timestamp_nanos();
        let mut hasher = Sha256::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        hasher.update(nanos.to_string().as_bytes());
        hasher.update(content_hash.as_bytes());
        hasher.update(sequence.to_string().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let short = digest.get(..16).unwrap_or(&digest);
        format!("{nanos}-{short}")
    }

    fn index(&self) -> RwLockReadGuard<'_, HashMap<String, BackupRecord>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, BackupRecord>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn discard_orphaned_data(stored_path: &Path) {
    if let Err(error) = fs::remove_file(stored_path) {
        tracing::warn!(
            target: "folio::backup",
            path = %stored_path.display(),
            error = %error,
            "failed to remove orphaned backup data"
        );
    }
}

fn read_metadata(path: &Path) -> Result<BackupRecord, String> {
    let bytes = fs::read(path).map_err(|error| error.to_string())?;
    serde_json::from_slice(&bytes).map_err(|error| error.to_string())
}

fn remove_if_present(path: &Path) -> Result<(), BackupError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(BackupError::io(path, error)),
    }
}

/// SHA-256 of `bytes` as lower-case hex.
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
