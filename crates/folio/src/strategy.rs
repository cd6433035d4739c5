//! Locate-and-replace strategies.
//!
//! Each [`UpdateStrategy`] understands one family of [`Locator`]s. The
//! [`StrategySet`] picks the highest-priority strategy that can handle a
//! request; ties go to the strategy registered first.

mod line;
mod marker;
mod selector;
mod text;

use std::sync::Arc;

use folio_markup::MarkupError;
use thiserror::Error;

use crate::request::UpdateRequest;

pub use line::LineStrategy;
pub use marker::MarkerAwareStrategy;
pub use selector::SelectorStrategy;
pub use text::TextStrategy;

/// Why a strategy could not apply a change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The locator did not match anything.
    #[error("{what} was not found")]
    NotFound {
        /// Description of what was looked for.
        what: String,
    },
    /// The locator matched more than one location.
    #[error("{what} matched {count} locations")]
    Ambiguous {
        /// Description of what was looked for.
        what: String,
        /// Number of matches.
        count: usize,
    },
    /// The locator itself is malformed.
    #[error("invalid locator: {message}")]
    InvalidLocator {
        /// What is wrong with it.
        message: String,
    },
    /// A line locator pointed past the end of the file.
    #[error("line {line} is out of range (file has {line_count} lines)")]
    LineOutOfRange {
        /// Requested one-based line.
        line: usize,
        /// Number of lines in the file.
        line_count: usize,
    },
    /// Inner content was requested for an element that cannot have any.
    #[error("<{tag}> matched by `{selector}` has no inner content")]
    NoInnerContent {
        /// The selector used.
        selector: String,
        /// Tag name of the matched element.
        tag: String,
    },
    /// No registered strategy handles this kind of locator.
    #[error("no strategy handles {kind} locators")]
    Unsupported {
        /// Locator kind.
        kind: String,
    },
    /// The selector could not be compiled or the document parsed.
    #[error(transparent)]
    Markup(#[from] MarkupError),
}

impl StrategyError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub(crate) fn ambiguous(what: impl Into<String>, count: usize) -> Self {
        Self::Ambiguous {
            what: what.into(),
            count,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidLocator {
            message: message.into(),
        }
    }
}

/// The outcome of applying a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The full modified content.
    pub content: String,
    /// The fragment that was replaced, for history.
    pub old_fragment: String,
}

/// A locate-and-replace algorithm.
pub trait UpdateStrategy: Send + Sync {
    /// Stable identifier reported in [`UpdateReport`](crate::UpdateReport).
    fn name(&self) -> &'static str;

    /// Whether this strategy understands the request's locator.
    fn can_handle(&self, request: &UpdateRequest) -> bool;

    /// Higher values win when several strategies can handle a request.
    fn priority(&self) -> i32;

    /// Produces the modified content.
    ///
    /// # Errors
    ///
    /// Returns a [`StrategyError`] when the locator does not identify exactly
    /// one location in `original`.
    fn apply(&self, original: &str, request: &UpdateRequest) -> Result<Applied, StrategyError>;
}

/// Ordered collection of strategies.
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: Vec<Arc<dyn UpdateStrategy>>,
}

impl StrategySet {
    /// An empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in strategies, using `marker_prefix` for sentinel comments.
    #[must_use]
    pub fn standard(marker_prefix: &str) -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(TextStrategy));
        set.register(Arc::new(LineStrategy));
        set.register(Arc::new(SelectorStrategy));
        set.register(Arc::new(MarkerAwareStrategy::new(marker_prefix)));
        set
    }

    /// Adds a strategy after those already registered.
    pub fn register(&mut self, strategy: Arc<dyn UpdateStrategy>) {
        self.strategies.push(strategy);
    }

    /// The highest-priority strategy able to handle `request`.
    #[must_use]
    pub fn select(&self, request: &UpdateRequest) -> Option<&dyn UpdateStrategy> {
        let mut best: Option<&Arc<dyn UpdateStrategy>> = None;
        for strategy in self.strategies.iter().filter(|s| s.can_handle(request)) {
            if best.is_none_or(|current| strategy.priority() > current.priority()) {
                best = Some(strategy);
            }
        }
        best.map(|strategy| &**strategy)
    }

    /// Names of the registered strategies, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.iter().map(|strategy| strategy.name())
    }
}

impl std::fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Replaces `range` of `original` with `replacement`.
pub(crate) fn splice(original: &str, range: std::ops::Range<usize>, replacement: &str) -> String {
    let mut content = String::with_capacity(original.len() + replacement.len());
    content.push_str(original.get(..range.start).unwrap_or_default());
    content.push_str(replacement);
    content.push_str(original.get(range.end..).unwrap_or_default());
    content
}
