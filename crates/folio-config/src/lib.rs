//! Shared configuration for the Folio content update engine.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file, then `FOLIO_*` environment variables, then
//! command-line flags. The resolved [`Config`] is handed to the engine's
//! constructors at composition time; nothing in the engine reads
//! configuration from ambient global state.
//!
//! List-valued settings (allowed roots, extensions and denied paths) are
//! appended across layers, so a deployment widens the defaults rather than
//! replacing them.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_BACKUP_RETENTION_DAYS, DEFAULT_HISTORY_RETENTION_DAYS, DEFAULT_LOCK_STALE_AFTER_MS,
    DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MARKER_PREFIX, default_allowed_extensions,
    default_allowed_roots, default_backup_root, default_denied_paths, default_history_path,
    default_log_filter, default_log_format, default_marker_prefix,
};
pub use logging::{LogFormat, LogFormatParseError};

const SECONDS_PER_DAY: u64 = 86_400;

/// Resolved configuration for the update engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "FOLIO")]
pub struct Config {
    /// Directories whose descendants may be edited.
    #[ortho_config(default = defaults::default_allowed_roots())]
    pub allowed_roots: Vec<String>,
    /// File-name suffixes (without the leading dot) that may be edited.
    #[ortho_config(default = defaults::default_allowed_extensions())]
    pub allowed_extensions: Vec<String>,
    /// Path fragments that are rejected even under an allowed root.
    #[ortho_config(default = defaults::default_denied_paths())]
    pub denied_paths: Vec<String>,
    /// Directory receiving backup copies.
    #[ortho_config(default = defaults::default_backup_root())]
    pub backup_root: Utf8PathBuf,
    /// JSON-lines file receiving the history ledger.
    #[ortho_config(default = defaults::default_history_path())]
    pub history_path: Utf8PathBuf,
    /// How long a writer waits for a conflicting lock, in milliseconds.
    #[ortho_config(default = defaults::DEFAULT_LOCK_TIMEOUT_MS)]
    pub lock_timeout_ms: u64,
    /// Age after which a held lock is considered abandoned, in milliseconds.
    #[ortho_config(default = defaults::DEFAULT_LOCK_STALE_AFTER_MS)]
    pub lock_stale_after_ms: u64,
    /// Backups older than this many days are removed by `prune`.
    #[ortho_config(default = defaults::DEFAULT_BACKUP_RETENTION_DAYS)]
    pub backup_retention_days: u32,
    /// History entries older than this many days are removed by `prune`.
    #[ortho_config(default = defaults::DEFAULT_HISTORY_RETENTION_DAYS)]
    pub history_retention_days: u32,
    /// Whether updates validate their result unless the request says otherwise.
    #[ortho_config(default = true)]
    pub validate_by_default: bool,
    /// Prefix used in sentinel comments (`<!-- folio:start name -->`).
    #[ortho_config(default = defaults::default_marker_prefix())]
    pub marker_prefix: String,
    /// Tracing filter expression.
    #[ortho_config(default = defaults::default_log_filter())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_roots: default_allowed_roots(),
            allowed_extensions: default_allowed_extensions(),
            denied_paths: default_denied_paths(),
            backup_root: default_backup_root(),
            history_path: default_history_path(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            lock_stale_after_ms: DEFAULT_LOCK_STALE_AFTER_MS,
            backup_retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            history_retention_days: DEFAULT_HISTORY_RETENTION_DAYS,
            validate_by_default: true,
            marker_prefix: default_marker_prefix(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Directories whose descendants may be edited.
    #[must_use]
    pub fn allowed_roots(&self) -> &[String] {
        &self.allowed_roots
    }

    /// Editable file-name suffixes.
    #[must_use]
    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Rejected path fragments.
    #[must_use]
    pub fn denied_paths(&self) -> &[String] {
        &self.denied_paths
    }

    /// Directory receiving backup copies.
    #[must_use]
    pub fn backup_root(&self) -> &Utf8Path {
        &self.backup_root
    }

    /// File receiving the history ledger.
    #[must_use]
    pub fn history_path(&self) -> &Utf8Path {
        &self.history_path
    }

    /// Maximum time a writer blocks on a conflicting lock.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Maximum time a lock may be held before it is treated as abandoned.
    #[must_use]
    pub const fn lock_stale_after(&self) -> Duration {
        Duration::from_millis(self.lock_stale_after_ms)
    }

    /// Retention window for backups.
    #[must_use]
    pub const fn backup_retention(&self) -> Duration {
        Duration::from_secs(self.backup_retention_days as u64 * SECONDS_PER_DAY)
    }

    /// Retention window for history entries.
    #[must_use]
    pub const fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_days as u64 * SECONDS_PER_DAY)
    }

    /// Whether updates validate their result by default.
    #[must_use]
    pub const fn validate_by_default(&self) -> bool {
        self.validate_by_default
    }

    /// Prefix used in sentinel comments.
    #[must_use]
    pub fn marker_prefix(&self) -> &str {
        &self.marker_prefix
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Checks the resolved values for combinations the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.allowed_roots.iter().all(|root| root.trim().is_empty()) {
            return Err(ConfigError::NoAllowedRoots);
        }
        if self
            .allowed_extensions
            .iter()
            .all(|ext| ext.trim().trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::NoAllowedExtensions);
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::ZeroLockTimeout);
        }
        if self.lock_stale_after_ms < self.lock_timeout_ms {
            return Err(ConfigError::StaleBeforeTimeout {
                stale_after_ms: self.lock_stale_after_ms,
                timeout_ms: self.lock_timeout_ms,
            });
        }
        if self.marker_prefix.trim().is_empty() || self.marker_prefix.contains(char::is_whitespace)
        {
            return Err(ConfigError::InvalidMarkerPrefix {
                prefix: self.marker_prefix.clone(),
            });
        }
        Ok(())
    }
}

/// Problems detected by [`Config::check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Every configured root was blank.
    #[error("at least one allowed root directory must be configured")]
    NoAllowedRoots,
    /// Every configured extension was blank.
    #[error("at least one allowed file extension must be configured")]
    NoAllowedExtensions,
    /// Writers would never wait for a lock.
    #[error("lock timeout must be greater than zero")]
    ZeroLockTimeout,
    /// Locks would be reclaimed before a waiting writer gives up.
    #[error(
        "lock staleness threshold ({stale_after_ms} ms) must not be shorter than the lock timeout ({timeout_ms} ms)"
    )]
    StaleBeforeTimeout {
        /// Configured staleness threshold.
        stale_after_ms: u64,
        /// Configured lock timeout.
        timeout_ms: u64,
    },
    /// Marker prefixes must be a single non-empty token.
    #[error("marker prefix '{prefix}' must be a single non-empty token")]
    InvalidMarkerPrefix {
        /// The rejected prefix.
        prefix: String,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_pass_checks() {
        assert_eq!(Config::default().check(), Ok(()));
    }

    #[test]
    fn default_durations_are_derived_from_millis() {
        let config = Config::default();
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.lock_stale_after(), Duration::from_secs(60));
        assert_eq!(
            config.backup_retention(),
            Duration::from_secs(30 * SECONDS_PER_DAY)
        );
    }

    #[rstest]
    #[case::no_roots(
        Config { allowed_roots: vec![" ".to_owned()], ..Config::default() },
        ConfigError::NoAllowedRoots
    )]
    #[case::no_extensions(
        Config { allowed_extensions: vec![".".to_owned()], ..Config::default() },
        ConfigError::NoAllowedExtensions
    )]
    #[case::zero_timeout(
        Config { lock_timeout_ms: 0, ..Config::default() },
        ConfigError::ZeroLockTimeout
    )]
    #[case::stale_too_short(
        Config { lock_stale_after_ms: 10, lock_timeout_ms: 20, ..Config::default() },
        ConfigError::StaleBeforeTimeout { stale_after_ms: 10, timeout_ms: 20 }
    )]
    #[case::spaced_prefix(
        Config { marker_prefix: "my cms".to_owned(), ..Config::default() },
        ConfigError::InvalidMarkerPrefix { prefix: "my cms".to_owned() }
    )]
    fn check_rejects_unusable_values(#[case] config: Config, #[case] expected: ConfigError) {
        assert_eq!(config.check(), Err(expected));
    }
}
