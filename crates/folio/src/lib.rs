//! File-backed content update engine.
//!
//! Folio writes in-page edits (text, attribute values, links and
//! translations) back into the template and translation files they were
//! rendered from. Each change is:
//!
//! - **confined** to allow-listed roots and file types by the
//!   [`PathPolicy`], before any file is touched
//! - **recoverable**, through a content-hashed backup taken before the write
//!   and restorable by identifier
//! - **serialised** per file by the [`LockManager`], so concurrent editors
//!   never interleave
//! - **located** by an [`UpdateStrategy`] chosen from the request's
//!   [`Locator`]: exact text, line number, CSS-like selector or named marker
//!   comments
//! - **validated**, so a change that would break the page's structure is
//!   refused
//! - **written atomically** and recorded in an append-only history ledger
//!
//! [`FileUpdater`] drives the pipeline; [`UpdateObserver`] receives events
//! for cache invalidation and audit.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use folio::{FileUpdater, Locator, UpdateRequest};
//! use folio_config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let updater = FileUpdater::from_config(&Config::default(), Path::new("/srv/site"))?;
//! let report = updater.update(UpdateRequest::new(
//!     "resources/views/home.blade.php",
//!     Locator::text("Welcome to Our Site", "Welcome to Acme"),
//! ))?;
//! println!("backup {:?}, history #{}", report.backup_id, report.history_id);
//! # Ok(())
//! # }
//! ```

mod backup;
mod commit;
mod error;
mod events;
mod history;
mod locks;
mod policy;
mod request;
mod strategy;
pub mod telemetry;
mod updater;
mod verification;

pub use backup::{BackupError, BackupRecord, BackupStore};
pub use commit::{AtomicFileWriter, ContentWriter};
pub use error::UpdateError;
pub use events::{StructuredUpdateObserver, UpdateObserver};
pub use history::{HistoryAction, HistoryEntry, HistoryError, HistoryLedger, NewHistoryEntry};
pub use locks::{Lock, LockError, LockGuard, LockManager, LockToken};
pub use policy::{AllowedPath, PathPolicy, PathViolation};
pub use request::{Locator, LocatorKind, SourceHint, UpdateOptions, UpdateRequest};
pub use strategy::{
    Applied, LineStrategy, MarkerAwareStrategy, SelectorStrategy, StrategyError, StrategySet,
    TextStrategy, UpdateStrategy,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use updater::{
    BatchItem, BatchResult, FileUpdater, PruneReport, RestoreReport, SetupError, UpdateReport,
};
pub use verification::{
    ConfigurableValidator, ContentValidator, StructuralValidator, ValidationFailure,
    ValidationResult,
};

#[cfg(test)]
mod tests;
