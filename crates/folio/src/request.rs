//! Update requests and the locators that describe where a change applies.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Optional disambiguation for text locators.
///
/// Produced by the page scanner that maps rendered content back to source:
/// the line the fragment starts on and/or which occurrence it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHint {
    /// One-based line on which the fragment starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// One-based ordinal of the occurrence within the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<usize>,
}

impl SourceHint {
    /// A hint pointing at the fragment starting on `line`.
    #[must_use]
    pub const fn at_line(line: u32) -> Self {
        Self {
            line: Some(line),
            occurrence: None,
        }
    }

    /// A hint selecting the `occurrence`-th match.
    #[must_use]
    pub const fn nth(occurrence: usize) -> Self {
        Self {
            line: None,
            occurrence: Some(occurrence),
        }
    }

    /// Whether the hint carries any information.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.line.is_none() && self.occurrence.is_none()
    }
}

/// Where in a file a change applies, and what it changes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Replace an exact substring.
    Text {
        /// The fragment currently in the file.
        old_text: String,
        /// The replacement.
        new_text: String,
        /// Disambiguation when the fragment occurs more than once.
        #[serde(default)]
        hint: SourceHint,
    },
    /// Replace the content of a one-based line.
    Line {
        /// One-based line number.
        line_number: usize,
        /// The replacement line, without a terminator.
        new_line: String,
    },
    /// Replace the inner content of the element matched by a selector.
    Selector {
        /// CSS-like selector matching exactly one element.
        selector: String,
        /// The replacement content.
        new_value: String,
    },
    /// Replace (or add) an attribute of the element matched by a selector.
    Attribute {
        /// CSS-like selector matching exactly one element.
        selector: String,
        /// Attribute name.
        attribute: String,
        /// The new attribute value, unescaped.
        new_value: String,
    },
    /// Replace the region between a pair of named sentinel comments.
    Marker {
        /// Region name.
        name: String,
        /// The replacement content.
        new_value: String,
    },
}

impl Locator {
    /// A text locator without a hint.
    pub fn text(old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self::Text {
            old_text: old_text.into(),
            new_text: new_text.into(),
            hint: SourceHint::default(),
        }
    }

    /// A text locator with a hint.
    pub fn text_with_hint(
        old_text: impl Into<String>,
        new_text: impl Into<String>,
        hint: SourceHint,
    ) -> Self {
        Self::Text {
            old_text: old_text.into(),
            new_text: new_text.into(),
            hint,
        }
    }

    /// A line locator.
    pub fn line(line_number: usize, new_line: impl Into<String>) -> Self {
        Self::Line {
            line_number,
            new_line: new_line.into(),
        }
    }

    /// A selector locator replacing inner content.
    pub fn selector(selector: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            new_value: new_value.into(),
        }
    }

    /// A selector locator replacing an attribute value.
    pub fn attribute(
        selector: impl Into<String>,
        attribute: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            selector: selector.into(),
            attribute: attribute.into(),
            new_value: new_value.into(),
        }
    }

    /// A marker locator.
    pub fn marker(name: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self::Marker {
            name: name.into(),
            new_value: new_value.into(),
        }
    }

    /// The kind of locator.
    #[must_use]
    pub const fn kind(&self) -> LocatorKind {
        match self {
            Self::Text { .. } => LocatorKind::Text,
            Self::Line { .. } => LocatorKind::Line,
            Self::Selector { .. } => LocatorKind::Selector,
            Self::Attribute { .. } => LocatorKind::Attribute,
            Self::Marker { .. } => LocatorKind::Marker,
        }
    }

    /// The replacement this locator carries.
    #[must_use]
    pub fn new_fragment(&self) -> &str {
        match self {
            Self::Text { new_text, .. } => new_text,
            Self::Line { new_line, .. } => new_line,
            Self::Selector { new_value, .. }
            | Self::Attribute { new_value, .. }
            | Self::Marker { new_value, .. } => new_value,
        }
    }
}

/// Discriminant of [`Locator`], recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    /// [`Locator::Text`].
    Text,
    /// [`Locator::Line`].
    Line,
    /// [`Locator::Selector`].
    Selector,
    /// [`Locator::Attribute`].
    Attribute,
    /// [`Locator::Marker`].
    Marker,
}

impl LocatorKind {
    /// Lower-case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Line => "line",
            Self::Selector => "selector",
            Self::Attribute => "attribute",
            Self::Marker => "marker",
        }
    }
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Take a backup before modifying the file.
    pub create_backup: bool,
    /// Validate the result; `None` uses the configured default.
    pub validate_result: Option<bool>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            validate_result: None,
        }
    }
}

/// A single change to one file.
///
/// Requests are immutable once built; the builder methods consume and return
/// the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    target_file: PathBuf,
    locator: Locator,
    #[serde(default)]
    options: UpdateOptions,
    #[serde(default)]
    actor: String,
}

impl UpdateRequest {
    /// Creates a request with default options and no actor.
    pub fn new(target_file: impl Into<PathBuf>, locator: Locator) -> Self {
        Self {
            target_file: target_file.into(),
            locator,
            options: UpdateOptions::default(),
            actor: String::new(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub const fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Skips the pre-change backup.
    #[must_use]
    pub const fn without_backup(mut self) -> Self {
        self.options.create_backup = false;
        self
    }

    /// Forces validation on or off for this request.
    #[must_use]
    pub const fn with_validation(mut self, validate: bool) -> Self {
        self.options.validate_result = Some(validate);
        self
    }

    /// Attributes the change to `actor`.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// The file to change, as supplied.
    #[must_use]
    pub fn target_file(&self) -> &Path {
        &self.target_file
    }

    /// Where the change applies.
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Request options.
    #[must_use]
    pub const fn options(&self) -> UpdateOptions {
        self.options
    }

    /// Opaque attribution string.
    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }
}
