//! Atomic file writes.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Writes whole files on behalf of the updater.
///
/// The default implementation is [`AtomicFileWriter`]. Alternative writers
/// exist for tests that need to observe or fail writes.
pub trait ContentWriter: Send + Sync {
    /// Replaces the content of `path` with `contents`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the previous content must be left in
    /// place when an error is returned.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Writes through a temporary file that is fsync'd and renamed into place.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicFileWriter;

impl ContentWriter for AtomicFileWriter {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        atomic_write(path, contents)
    }
}

/// Writes the provided bytes to the path using an atomic persist step.
///
/// Data is flushed and fsync'd before the temporary file is renamed into
/// place so readers never observe a partially written payload. Permissions of
/// an existing target are carried over to the replacement.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(".folio-");
    if let Ok(metadata) = fs::metadata(path) {
        builder.permissions(metadata.permissions());
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
