//! Document kind detection from file names.
//!
//! Editable resources are either markup templates, structured data files, or
//! PHP files returning translation arrays. The kind decides which structural
//! checks apply to a file.

use std::fmt;
use std::path::Path;

/// Kinds of editable document that receive structural checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// HTML-like templates (`.html`, `.htm`, `.xhtml`, `.blade.php`, `.twig`,
    /// `.vue`, `.svelte`).
    Markup,
    /// JSON documents (`.json`).
    Json,
    /// YAML documents (`.yaml`, `.yml`).
    Yaml,
    /// Plain PHP files, typically returning translation arrays (`.php`).
    PhpArray,
}

const MARKUP_SUFFIXES: &[&str] = &[
    ".blade.php",
    ".html",
    ".htm",
    ".xhtml",
    ".twig",
    ".vue",
    ".svelte",
];

impl DocumentKind {
    /// Detects the kind from a file name.
    ///
    /// Matching is case-insensitive and compound suffixes are checked first,
    /// so `welcome.blade.php` is markup while `messages.php` is a PHP array.
    /// Returns `None` for anything else.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        if MARKUP_SUFFIXES
            .iter()
            .any(|suffix| lowered.ends_with(suffix))
        {
            return Some(Self::Markup);
        }
        let extension = Path::new(&lowered).extension()?.to_str()?.to_owned();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "php" => Some(Self::PhpArray),
            _ => None,
        }
    }

    /// Detects the kind from a path by examining its file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::from_file_name)
    }

    /// Returns the lower-case identifier for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::PhpArray => "php",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
