//! Tree-sitter powered markup analysis for the Folio content engine.
//!
//! This crate provides the pieces of template handling that the update
//! engine needs without committing to any one template language:
//!
//! - **Element lookup** via [`MarkupDocument`] and [`Selector`], returning
//!   byte spans so edits splice into the original source and leave every
//!   other byte untouched
//! - **Structural checks** via [`StructureChecker`] for markup, JSON, YAML and
//!   PHP translation arrays
//! - **Document classification** via [`DocumentKind`]
//!
//! # Example: Locating Content
//!
//! ```
//! use folio_markup::{MarkupDocument, Selector};
//!
//! let source = "<main><h1 class=\"title\">Welcome</h1></main>";
//! let document = MarkupDocument::parse(source)?;
//! let selector = Selector::compile("main > h1.title")?;
//!
//! let matches = document.select(&selector);
//! assert_eq!(matches.len(), 1);
//! # Ok::<(), folio_markup::MarkupError>(())
//! ```
//!
//! # Example: Structural Checks
//!
//! ```
//! use std::path::Path;
//! use folio_markup::StructureChecker;
//!
//! let checker = StructureChecker::new();
//! let issues = checker.check_file(Path::new("page.html"), "<div>Text</span></div>")?;
//! assert!(!issues.is_empty());
//! # Ok::<(), folio_markup::MarkupError>(())
//! ```

mod document;
mod error;
mod kind;
mod parser;
mod php;
mod position;
mod selector;
mod structure;

pub use document::{Attribute, AttributeValue, Element, MarkupDocument};
pub use error::MarkupError;
pub use kind::DocumentKind;
pub use parser::{MarkupParser, ParseResult, SyntaxErrorInfo};
pub use selector::Selector;
pub use structure::{StructuralIssue, StructureChecker};

#[cfg(test)]
mod tests;
