//! Error taxonomy for the content update engine.
//!
//! Every failure an update, batch item or restore can meet is a variant of
//! [`UpdateError`]. Component errors ([`PathViolation`], [`BackupError`],
//! [`StrategyError`], [`HistoryError`]) are carried inside the variants so
//! callers can match on the kind of failure and still reach the detail.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backup::BackupError;
use crate::history::HistoryError;
use crate::locks::LockToken;
use crate::policy::PathViolation;
use crate::strategy::StrategyError;
use crate::verification::ValidationFailure;

/// Errors surfaced by [`FileUpdater`](crate::FileUpdater) operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The path failed policy checks. Never retried.
    #[error("path {path} rejected: {violation}")]
    PathRejected {
        /// The path as supplied by the caller.
        path: PathBuf,
        /// Which check rejected it.
        violation: PathViolation,
    },

    /// The target could not be read or is not UTF-8 text.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// The target file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Another writer held the file for longer than the lock timeout.
    #[error("timed out after {waited:?} waiting for the lock on {path}")]
    LockTimeout {
        /// The contended file.
        path: PathBuf,
        /// How long the request waited.
        waited: Duration,
    },

    /// The supplied lock token does not hold the lock on the target.
    #[error("lock {token} does not hold {path}")]
    LockNotHeld {
        /// The target file.
        path: PathBuf,
        /// The token the caller presented.
        token: LockToken,
    },

    /// Taking the pre-change backup failed; nothing was modified.
    #[error("backup failed: {0}")]
    BackupFailed(#[source] BackupError),

    /// No backup exists with the requested identifier.
    #[error("no backup with id {id}")]
    BackupNotFound {
        /// The requested identifier.
        id: String,
    },

    /// The backup exists but was taken from a different file.
    #[error("backup {id} was not taken from {path}")]
    BackupMismatch {
        /// The requested identifier.
        id: String,
        /// The file the caller asked to restore.
        path: PathBuf,
    },

    /// The locator did not identify any content, or no strategy applies.
    #[error("could not locate the content to change in {path}: {source}")]
    StrategyNotFound {
        /// The target file.
        path: PathBuf,
        /// Why the strategy could not apply the change.
        source: StrategyError,
    },

    /// The locator matched more than one location.
    #[error("the content to change in {path} is ambiguous: {source}")]
    StrategyAmbiguous {
        /// The target file.
        path: PathBuf,
        /// Details of the ambiguity.
        source: StrategyError,
    },

    /// The modified content failed validation; the file is untouched.
    #[error("the change to {path} failed validation: {}", FailureList(failures))]
    ValidationFailed {
        /// The target file.
        path: PathBuf,
        /// Problems introduced by the change.
        failures: Vec<ValidationFailure>,
    },

    /// Writing the modified content failed after a retry.
    #[error("failed to write {path}: {source} (original restored: {restored})")]
    WriteFailed {
        /// The target file.
        path: PathBuf,
        /// The final write error.
        source: io::Error,
        /// Whether the original bytes were put back.
        restored: bool,
    },

    /// Writing failed and putting the original back failed too.
    #[error(
        "{path} may be damaged: write failed ({write_error}) and restoring the original failed ({restore_error})"
    )]
    DataRisk {
        /// The target file.
        path: PathBuf,
        /// The final write error.
        write_error: io::Error,
        /// The error raised while restoring the original bytes.
        restore_error: io::Error,
    },

    /// The history ledger could not record the change, which was rolled back.
    #[error("history could not be recorded: {0}")]
    HistoryFailed(#[source] HistoryError),

    /// The content validator could not run.
    #[error("content validator unavailable: {message}")]
    ValidatorUnavailable {
        /// Description of why the validator could not run.
        message: String,
    },

    /// A batch worker stopped before reporting this item.
    #[error("batch worker stopped before updating {path}")]
    WorkerPanicked {
        /// The item's target file.
        path: PathBuf,
    },
}

impl UpdateError {
    /// Creates a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a validator unavailable error.
    pub fn validator_unavailable(message: impl Into<String>) -> Self {
        Self::ValidatorUnavailable {
            message: message.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::ValidatorUnavailable { .. }
        )
    }

    /// Whether the request was refused by path policy.
    #[must_use]
    pub const fn is_security_rejection(&self) -> bool {
        matches!(self, Self::PathRejected { .. })
    }

    /// Whether the target file may have been left damaged.
    #[must_use]
    pub const fn is_data_risk(&self) -> bool {
        matches!(self, Self::DataRisk { .. })
    }

    /// A short message suitable for the person who made the edit.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::PathRejected { .. } | Self::BackupMismatch { .. } => {
                "You cannot make this change."
            }
            Self::LockTimeout { .. } | Self::ValidatorUnavailable { .. } => {
                "This content is being changed by someone else. Try again shortly."
            }
            Self::LockNotHeld { .. } => "Your editing session has expired. Reload and try again.",
            Self::ValidationFailed { .. } => {
                "This change would break the page, so it was not applied."
            }
            Self::StrategyNotFound { .. } => {
                "The content to change could not be found. Reload and try again."
            }
            Self::StrategyAmbiguous { .. } => {
                "This content appears more than once. Select it more precisely."
            }
            Self::BackupNotFound { .. } => "That restore point no longer exists.",
            Self::FileRead { .. } => "The content could not be read.",
            Self::BackupFailed(_)
            | Self::WriteFailed { .. }
            | Self::HistoryFailed(_)
            | Self::WorkerPanicked { .. } => "The change could not be saved. Nothing was modified.",
            Self::DataRisk { .. } => {
                "The change could not be saved and the page may need attention. An operator has been alerted."
            }
        }
    }
}

struct FailureList<'a>(&'a [ValidationFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rejected() -> UpdateError {
        UpdateError::PathRejected {
            path: PathBuf::from("../../etc/passwd"),
            violation: PathViolation::Traversal,
        }
    }

    fn timed_out() -> UpdateError {
        UpdateError::LockTimeout {
            path: PathBuf::from("a.html"),
            waited: Duration::from_secs(5),
        }
    }

    fn invalid() -> UpdateError {
        UpdateError::ValidationFailed {
            path: PathBuf::from("a.html"),
            failures: vec![
                ValidationFailure::new(PathBuf::from("a.html"), "stray end tag </b>")
                    .at_location(2, 4),
            ],
        }
    }

    #[rstest]
    #[case::rejected(rejected(), false, true)]
    #[case::timed_out(timed_out(), true, false)]
    #[case::invalid(invalid(), false, false)]
    fn classifies_errors(
        #[case] error: UpdateError,
        #[case] transient: bool,
        #[case] security: bool,
    ) {
        assert_eq!(error.is_transient(), transient);
        assert_eq!(error.is_security_rejection(), security);
    }

    #[test]
    fn user_messages_follow_the_failure_kind() {
        assert_eq!(rejected().user_message(), "You cannot make this change.");
        assert!(timed_out().user_message().contains("Try again shortly"));
        assert!(invalid().user_message().contains("break the page"));
    }

    #[test]
    fn validation_failures_are_listed_in_display() {
        let display = invalid().to_string();
        assert!(display.contains("a.html:2:4: stray end tag </b>"), "{display}");
    }
}
