//! Validation of proposed content before it is written.
//!
//! The updater hands every proposed change to a [`ContentValidator`] along
//! with the original content. Implementations are injected through the trait
//! so tests can substitute configurable doubles.

mod test_doubles;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use folio_markup::{StructuralIssue, StructureChecker};

use crate::error::UpdateError;

pub use test_doubles::ConfigurableValidator;

/// Describes one problem found in proposed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    file: PathBuf,
    line: Option<u32>,
    column: Option<u32>,
    message: String,
}

impl ValidationFailure {
    /// Builds a new validation failure.
    #[must_use]
    pub fn new(file: PathBuf, message: impl Into<String>) -> Self {
        Self {
            file,
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// Attaches a location to this failure.
    #[must_use]
    pub const fn at_location(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Path to the affected file.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Optional line number (one-based).
    #[must_use]
    pub const fn line(&self) -> Option<u32> {
        self.line
    }

    /// Optional column number (one-based).
    #[must_use]
    pub const fn column(&self) -> Option<u32> {
        self.column
    }

    /// Human-readable message describing the problem.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of validating proposed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The content may be written.
    Passed,
    /// The change introduces problems.
    Failed {
        /// Details about each problem.
        failures: Vec<ValidationFailure>,
    },
}

impl ValidationResult {
    /// Returns true when validation passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns the failures, if any.
    #[must_use]
    pub fn failures(&self) -> Option<&[ValidationFailure]> {
        match self {
            Self::Passed => None,
            Self::Failed { failures } => Some(failures),
        }
    }
}

/// Checks that a proposed change leaves the file structurally sound.
pub trait ContentValidator: Send + Sync {
    /// Validates `modified`, the proposed replacement for `original`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ValidatorUnavailable`] when the check cannot
    /// run at all.
    fn validate(
        &self,
        path: &Path,
        original: &str,
        modified: &str,
    ) -> Result<ValidationResult, UpdateError>;
}

/// Validator backed by [`StructureChecker`].
///
/// Only issues absent from the original content are reported, so a file
/// that was already malformed can still receive edits that do not make it
/// worse. Issues are compared by message, ignoring position, because an edit
/// shifts the location of everything after it.
#[derive(Debug, Default)]
pub struct StructuralValidator {
    checker: StructureChecker,
}

impl StructuralValidator {
    /// Creates a validator with a lazily initialised parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            checker: StructureChecker::new(),
        }
    }

    fn check(&self, path: &Path, content: &str) -> Result<Vec<StructuralIssue>, UpdateError> {
        self.checker
            .check_file(path, content)
            .map_err(|error| UpdateError::validator_unavailable(error.to_string()))
    }
}

impl ContentValidator for StructuralValidator {
    fn validate(
        &self,
        path: &Path,
        original: &str,
        modified: &str,
    ) -> Result<ValidationResult, UpdateError> {
        if !StructureChecker::supports_file(path) {
            return Ok(ValidationResult::Passed);
        }

        let mut existing: HashMap<String, usize> = HashMap::new();
        for issue in self.check(path, original)? {
            *existing.entry(issue.message().to_owned()).or_default() += 1;
        }

        let failures: Vec<ValidationFailure> = self
            .check(path, modified)?
            .into_iter()
            .filter(|issue| match existing.get_mut(issue.message()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    false
                }
                _ => true,
            })
            .map(|issue| to_failure(path, &issue))
            .collect();

        if failures.is_empty() {
            Ok(ValidationResult::Passed)
        } else {
            tracing::debug!(
                target: "folio::validation",
                path = %path.display(),
                failures = failures.len(),
                "proposed content failed validation"
            );
            Ok(ValidationResult::Failed { failures })
        }
    }
}

fn to_failure(path: &Path, issue: &StructuralIssue) -> ValidationFailure {
    let failure = ValidationFailure::new(path.to_path_buf(), issue.message());
    match (issue.line(), issue.column()) {
        (Some(line), Some(column)) => failure.at_location(line, column),
        _ => failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn validate(path: &str, original: &str, modified: &str) -> ValidationResult {
        StructuralValidator::new()
            .validate(Path::new(path), original, modified)
            .expect("validator runs")
    }

    #[rstest]
    #[case::html("page.html", "<div><p>a</p></div>", "<div><p>b</p></div>")]
    #[case::json("lang/en.json", r#"{"a":"x"}"#, r#"{"a":"y"}"#)]
    #[case::yaml("lang/en.yaml", "a: x\n", "a: y\n")]
    #[case::php("lang/en/messages.php", "<?php return ['a' => 'x'];", "<?php return ['a' => 'y'];")]
    #[case::unknown("notes.txt", "", "<<<")]
    fn well_formed_changes_pass(
        #[case] path: &str,
        #[case] original: &str,
        #[case] modified: &str,
    ) {
        assert!(validate(path, original, modified).passed());
    }

    #[rstest]
    #[case::stray_end_tag("page.html", "<div><p>a</p></div>", "<div><p>a</span></p></div>")]
    #[case::unclosed_element("page.blade.php", "<div>a</div>", "<div>a")]
    #[case::json("lang/en.json", r#"{"a":"x"}"#, r#"{"a":"x""#)]
    #[case::yaml("lang/en.yml", "a: x\n", "a: [x\n")]
    #[case::php("lang/en/messages.php", "<?php return ['a' => 'x'];", "<?php return ['a' => 'x';")]
    fn breaking_changes_fail(#[case] path: &str, #[case] original: &str, #[case] modified: &str) {
        let result = validate(path, original, modified);
        let failures = result.failures().expect("should fail");
        assert!(!failures.is_empty());
        assert!(failures.iter().all(|failure| failure.file() == Path::new(path)));
    }

    #[test]
    fn pre_existing_issues_are_not_reported() {
        let original = "<div>\n<p>a</span></p>\n</div>";
        let modified = "<div>\n<p>b</span></p>\n</div>";
        assert!(validate("page.html", original, modified).passed());
    }

    #[test]
    fn additional_copies_of_an_existing_issue_are_reported() {
        let original = "<div><p>a</span></p></div>";
        let modified = "<div><p>a</span></span></p></div>";
        assert!(!validate("page.html", original, modified).passed());
    }

    #[test]
    fn failure_display_includes_location() {
        let failure = ValidationFailure::new(PathBuf::from("page.html"), "stray end tag </span>")
            .at_location(3, 7);
        assert_eq!(failure.to_string(), "page.html:3:7: stray end tag </span>");
    }
}
