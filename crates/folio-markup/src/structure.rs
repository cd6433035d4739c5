//! Structural checks for editable documents.
//!
//! [`StructureChecker`] inspects a document according to its
//! [`DocumentKind`] and reports every structural issue found. Files with
//! unrecognised names pass through unchecked.
//!
//! Markup checks go beyond Tree-sitter error nodes, because the HTML grammar
//! recovers silently from the mistakes an edit is most likely to introduce:
//!
//! - stray end tags (`</span>` with no open `<span>`);
//! - non-void elements whose end tag is missing, unless HTML allows the end
//!   tag to be omitted (`<p>`, `<li>`, `<td>` and friends).

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use crate::document::VOID_ELEMENTS;
use crate::error::MarkupError;
use crate::kind::DocumentKind;
use crate::parser::{MarkupParser, ParseResult};
use crate::php;
use crate::position::point_to_one_based;

/// Elements whose end tag HTML allows to be omitted.
const OPTIONAL_END_TAGS: &[&str] = &[
    "html", "head", "body", "p", "li", "dt", "dd", "option", "optgroup", "colgroup", "thead",
    "tbody", "tfoot", "tr", "td", "th", "rp", "rt",
];

/// A structural problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralIssue {
    line: Option<u32>,
    column: Option<u32>,
    message: String,
}

impl StructuralIssue {
    /// Builds an issue without a known location.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// Builds an issue at a one-based location.
    #[must_use]
    pub fn at(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            message: message.into(),
        }
    }

    /// One-based line, when known.
    #[must_use]
    pub const fn line(&self) -> Option<u32> {
        self.line
    }

    /// One-based column, when known.
    #[must_use]
    pub const fn column(&self) -> Option<u32> {
        self.column
    }

    /// Human-readable description of the problem.
    ///
    /// Messages do not embed positions, so the same problem carries the same
    /// message before and after an edit moves it.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
            write!(f, ": ")?;
        }
        f.write_str(&self.message)
    }
}

/// Checks documents for structural damage.
///
/// The markup parser is created on first use and reused behind a mutex, so
/// a single checker can be shared across threads.
pub struct StructureChecker {
    parser: Mutex<Option<MarkupParser>>,
}

impl StructureChecker {
    /// Creates a checker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parser: Mutex::new(None),
        }
    }

    /// Whether files at `path` receive structural checks.
    #[must_use]
    pub fn supports_file(path: &Path) -> bool {
        DocumentKind::from_path(path).is_some()
    }

    /// Checks a document, selecting the checks from the file name.
    ///
    /// Returns an empty list for clean documents and for files whose kind is
    /// not recognised.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup parser cannot be initialised or the
    /// shared parser lock is poisoned.
    pub fn check_file(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<Vec<StructuralIssue>, MarkupError> {
        match DocumentKind::from_path(path) {
            None => Ok(Vec::new()),
            Some(DocumentKind::Markup) => self.check_markup(content),
            Some(DocumentKind::Json) => Ok(check_json(content)),
            Some(DocumentKind::Yaml) => Ok(check_yaml(content)),
            Some(DocumentKind::PhpArray) => Ok(php::check(content)),
        }
    }

    /// Checks markup regardless of file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup parser cannot be initialised or the
    /// shared parser lock is poisoned.
    pub fn check_markup(&self, content: &str) -> Result<Vec<StructuralIssue>, MarkupError> {
        let mut guard = self
            .parser
            .lock()
            .map_err(|_| MarkupError::internal_error("markup parser lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(MarkupParser::new()?);
        }
        let parser = guard
            .as_mut()
            .ok_or_else(|| MarkupError::internal_error("markup parser missing after init"))?;
        let parsed = parser.parse(content)?;
        drop(guard);
        Ok(markup_issues(&parsed))
    }
}

impl Default for StructureChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StructureChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureChecker").finish_non_exhaustive()
    }
}

fn markup_issues(parsed: &ParseResult) -> Vec<StructuralIssue> {
    let mut issues: Vec<StructuralIssue> = parsed
        .errors()
        .into_iter()
        .map(|error| {
            let message = if error.context.is_empty() {
                error.message
            } else {
                format!("{} near `{}`", error.message, error.context)
            };
            StructuralIssue::at(error.line, error.column, message)
        })
        .collect();
    collect_tag_issues(parsed.root_node(), parsed.source(), &mut issues);
    issues
}

fn collect_tag_issues(
    node: tree_sitter::Node<'_>,
    source: &str,
    issues: &mut Vec<StructuralIssue>,
) {
    match node.kind() {
        "erroneous_end_tag" => {
            let name = child_text(node, "erroneous_end_tag_name", source);
            let (line, column) = point_to_one_based(node.start_position());
            issues.push(StructuralIssue::at(
                line,
                column,
                format!("stray end tag </{name}>"),
            ));
        }
        "element" => {
            if let Some(name) = unclosed_element_name(node, source) {
                let (line, column) = point_to_one_based(node.start_position());
                issues.push(StructuralIssue::at(
                    line,
                    column,
                    format!("element <{name}> is never closed"),
                ));
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_tag_issues(child, source, issues);
    }
}

fn unclosed_element_name(node: tree_sitter::Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let mut start_tag = None;
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "start_tag" => start_tag = Some(child),
            "end_tag" | "self_closing_tag" => return None,
            _ => {}
        }
    }
    let name = child_text(start_tag?, "tag_name", source).to_ascii_lowercase();
    let exempt = VOID_ELEMENTS.contains(&name.as_str())
        || OPTIONAL_END_TAGS.contains(&name.as_str());
    (!exempt).then_some(name)
}

fn child_text<'s>(node: tree_sitter::Node<'_>, kind: &str, source: &'s str) -> &'s str {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == kind);
    found
        .and_then(|child| source.get(child.byte_range()))
        .unwrap_or_default()
}

fn check_json(content: &str) -> Vec<StructuralIssue> {
    match serde_json::from_str::<serde::de::IgnoredAny>(content) {
        Ok(_) => Vec::new(),
        Err(error) => {
            let line = u32::try_from(error.line()).unwrap_or(u32::MAX);
            let column = u32::try_from(error.column()).unwrap_or(u32::MAX);
            vec![StructuralIssue::at(line, column, json_message(&error))]
        }
    }
}

fn json_message(error: &serde_json::Error) -> String {
    // serde_json appends " at line N column M"; the location is kept apart.
    let text = error.to_string();
    text.rsplit_once(" at line ")
        .map_or(text.clone(), |(message, _)| message.to_owned())
}

fn check_yaml(content: &str) -> Vec<StructuralIssue> {
    match serde_saphyr::from_str::<serde::de::IgnoredAny>(content) {
        Ok(_) => Vec::new(),
        Err(error) => vec![StructuralIssue::new(format!("invalid YAML: {error}"))],
    }
}
