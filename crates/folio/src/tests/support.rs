//! Shared fixtures for the engine test suites.

use std::fs;
use std::path::{Path, PathBuf};

use folio_config::Config;
use rstest::fixture;
use tempfile::TempDir;

use crate::FileUpdater;

/// A throwaway site with `resources/views` and `resources/lang` roots.
pub(crate) struct Site {
    _dir: TempDir,
    base: PathBuf,
}

impl Site {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let base = dir.path().canonicalize().expect("canonical temp dir");
        fs::create_dir_all(base.join("resources/views")).expect("views root");
        fs::create_dir_all(base.join("resources/lang")).expect("lang root");
        Self { _dir: dir, base }
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base
    }

    pub(crate) fn views(&self) -> PathBuf {
        self.base.join("resources/views")
    }

    pub(crate) fn lang(&self) -> PathBuf {
        self.base.join("resources/lang")
    }

    pub(crate) fn config(&self) -> Config {
        Config {
            allowed_roots: vec!["resources/views".to_owned(), "resources/lang".to_owned()],
            lock_timeout_ms: 2_000,
            ..Config::default()
        }
    }

    pub(crate) fn backup_root(&self) -> PathBuf {
        self.base.join(self.config().backup_root())
    }

    pub(crate) fn history_path(&self) -> PathBuf {
        self.base.join(self.config().history_path())
    }

    pub(crate) fn updater(&self) -> FileUpdater {
        FileUpdater::from_config(&self.config(), &self.base).expect("build updater")
    }

    /// Writes a template under the views root and returns its path.
    pub(crate) fn template(&self, name: &str, content: &str) -> PathBuf {
        write(&self.views().join(name), content.as_bytes())
    }

    /// Writes a translation file under the lang root and returns its path.
    pub(crate) fn translation(&self, name: &str, content: &str) -> PathBuf {
        write(&self.lang().join(name), content.as_bytes())
    }

    pub(crate) fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }

    /// Number of backup data files on disk.
    pub(crate) fn stored_backups(&self) -> usize {
        fs::read_dir(self.backup_root()).map_or(0, |entries| {
            entries
                .flatten()
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "bak"))
                .count()
        })
    }
}

pub(crate) fn write(path: &Path, contents: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
    path.to_path_buf()
}

#[fixture]
pub(crate) fn site() -> Site {
    Site::new()
}
