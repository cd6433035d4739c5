//! Error types for markup analysis.

use thiserror::Error;

/// Errors from parsing markup or compiling selectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MarkupError {
    /// Failed to initialise the Tree-sitter parser with the HTML grammar.
    #[error("failed to initialise markup parser: {message}")]
    ParserInitError {
        /// Description of the failure.
        message: String,
    },

    /// Tree-sitter did not produce a syntax tree.
    #[error("failed to parse markup: {message}")]
    ParseError {
        /// Description of the failure.
        message: String,
    },

    /// A selector could not be compiled.
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// The selector text as supplied.
        selector: String,
        /// Description of the problem.
        message: String,
    },

    /// Internal error indicating a bug or poisoned shared state.
    #[error("internal error: {message}")]
    InternalError {
        /// Description of the internal error.
        message: String,
    },
}

impl MarkupError {
    /// Creates a parser initialisation error.
    #[must_use]
    pub fn parser_init(message: impl Into<String>) -> Self {
        Self::ParserInitError {
            message: message.into(),
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Creates an invalid selector error.
    #[must_use]
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
