//! Tree-sitter HTML parsing wrapper with error recovery.
//!
//! Templates are parsed with the HTML grammar. Template-language constructs
//! (`{{ … }}`, `@if`, `{% … %}`) appear as text nodes, which keeps element
//! structure and byte offsets intact for span-preserving edits.

use std::ops::Range;

use crate::error::MarkupError;
use crate::position::point_to_one_based;

/// Result of parsing markup.
///
/// Tree-sitter is error-tolerant, so a parse result may contain both a valid
/// tree and error nodes.
#[derive(Debug)]
pub struct ParseResult {
    tree: tree_sitter::Tree,
    source: String,
}

impl ParseResult {
    /// Returns the parsed syntax tree.
    #[must_use]
    pub const fn tree(&self) -> &tree_sitter::Tree {
        &self.tree
    }

    /// Returns the source that was parsed.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns whether the tree contains ERROR or MISSING nodes.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Collects all ERROR and MISSING nodes with their positions.
    #[must_use]
    pub fn errors(&self) -> Vec<SyntaxErrorInfo> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), &self.source, &mut errors);
        errors
    }

    /// Returns the root node of the syntax tree.
    #[must_use]
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }
}

/// Information about a syntax error found during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxErrorInfo {
    /// Byte range of the error in the source.
    pub byte_range: Range<usize>,
    /// Line number (one-based) where the error starts.
    pub line: u32,
    /// Column number (one-based) where the error starts.
    pub column: u32,
    /// A snippet of the problematic source text.
    pub context: String,
    /// Human-readable description of the error.
    pub message: String,
}

impl SyntaxErrorInfo {
    fn from_node(node: tree_sitter::Node<'_>, source: &str) -> Self {
        let byte_range = node.byte_range();
        let context = source
            .get(byte_range.clone())
            .map(truncate_context)
            .unwrap_or_default();

        let message = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            "syntax error".to_owned()
        };

        let (line, column) = point_to_one_based(node.start_position());

        Self {
            byte_range,
            line,
            column,
            context,
            message,
        }
    }
}

fn truncate_context(text: &str) -> String {
    if text.chars().count() > 50 {
        let truncated: String = text.chars().take(47).collect();
        format!("{truncated}...")
    } else {
        text.to_owned()
    }
}

/// Tree-sitter parser configured with the HTML grammar.
pub struct MarkupParser {
    inner: tree_sitter::Parser,
}

impl MarkupParser {
    /// Creates a new parser.
    ///
    /// # Errors
    ///
    /// Returns an error if the grammar cannot be loaded into Tree-sitter.
    pub fn new() -> Result<Self, MarkupError> {
        let mut inner = tree_sitter::Parser::new();
        inner
            .set_language(&tree_sitter_html::LANGUAGE.into())
            .map_err(|e| MarkupError::parser_init(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parses markup and returns the result.
    ///
    /// # Errors
    ///
    /// Returns an error if Tree-sitter fails to produce a tree, which only
    /// happens when parsing is cancelled or misconfigured.
    pub fn parse(&mut self, source: &str) -> Result<ParseResult, MarkupError> {
        let tree = self
            .inner
            .parse(source, None)
            .ok_or_else(|| MarkupError::parse("parsing failed"))?;
        Ok(ParseResult {
            tree,
            source: source.to_owned(),
        })
    }
}

impl std::fmt::Debug for MarkupParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupParser").finish_non_exhaustive()
    }
}

fn collect_error_nodes(
    node: tree_sitter::Node<'_>,
    source: &str,
    errors: &mut Vec<SyntaxErrorInfo>,
) {
    if node.is_error() || node.is_missing() {
        errors.push(SyntaxErrorInfo::from_node(node, source));
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, source, errors);
    }
}
