use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default time a writer waits for a conflicting lock, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default age after which a held lock is treated as abandoned, in milliseconds.
pub const DEFAULT_LOCK_STALE_AFTER_MS: u64 = 60_000;

/// Default number of days backups are retained by `prune`.
pub const DEFAULT_BACKUP_RETENTION_DAYS: u32 = 30;

/// Default number of days history entries are retained by `prune`.
pub const DEFAULT_HISTORY_RETENTION_DAYS: u32 = 365;

/// Default prefix used in sentinel comments around editable regions.
pub const DEFAULT_MARKER_PREFIX: &str = "folio";

/// Directories holding templates and translation resources.
pub fn default_allowed_roots() -> Vec<String> {
    ["resources/views", "resources/lang", "lang"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Template, markup and translation resource extensions.
pub fn default_allowed_extensions() -> Vec<String> {
    [
        "blade.php",
        "php",
        "html",
        "htm",
        "twig",
        "json",
        "yaml",
        "yml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Path fragments that are never editable even under an allowed root.
pub fn default_denied_paths() -> Vec<String> {
    ["/.env", "/vendor/", "/node_modules/", "/.git/", "/config/"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Directory receiving backup copies.
pub fn default_backup_root() -> Utf8PathBuf {
    Utf8PathBuf::from("storage/folio/backups")
}

/// File receiving the append-only history ledger.
pub fn default_history_path() -> Utf8PathBuf {
    Utf8PathBuf::from("storage/folio/history.jsonl")
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned marker prefix.
pub fn default_marker_prefix() -> String {
    DEFAULT_MARKER_PREFIX.to_owned()
}
