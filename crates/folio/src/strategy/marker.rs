//! Replacement between named sentinel comments.
//!
//! A region is delimited by a start and an end comment carrying the
//! configured prefix and the region name:
//!
//! ```text
//! <!-- folio:start hero -->
//! ...editable content...
//! <!-- folio:end hero -->
//! ```
//!
//! Blade comments (`{{-- folio:start hero --}}`) are recognised too.

use super::{Applied, StrategyError, UpdateStrategy, splice};
use crate::request::{Locator, UpdateRequest};

const COMMENT_FORMS: &[(&str, &str)] = &[("<!--", "-->"), ("{{--", "--}}")];

/// Replaces the text strictly between a pair of named sentinel comments.
#[derive(Debug, Clone)]
pub struct MarkerAwareStrategy {
    start_token: String,
    end_token: String,
}

impl MarkerAwareStrategy {
    /// Creates a strategy recognising `<prefix>:start` and `<prefix>:end`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            start_token: format!("{prefix}:start"),
            end_token: format!("{prefix}:end"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentinel {
    Start,
    End,
}

/// A sentinel comment found in the source.
#[derive(Debug, Clone, Copy)]
struct Found {
    sentinel: Sentinel,
    /// Offset of the comment opener.
    open: usize,
    /// Offset just past the comment closer.
    close: usize,
}

impl MarkerAwareStrategy {
    fn classify(&self, body: &str, name: &str) -> Option<Sentinel> {
        let mut tokens = body.split_whitespace();
        let (Some(keyword), Some(found_name), None) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return None;
        };
        if found_name != name {
            return None;
        }
        if keyword == self.start_token {
            Some(Sentinel::Start)
        } else if keyword == self.end_token {
            Some(Sentinel::End)
        } else {
            None
        }
    }

    fn scan(&self, source: &str, name: &str) -> Vec<Found> {
        let mut found = Vec::new();
        for (opener, closer) in COMMENT_FORMS {
            let mut cursor = 0;
            while let Some(relative) = source.get(cursor..).and_then(|rest| rest.find(opener)) {
                let open = cursor + relative;
                let body_start = open + opener.len();
                let Some(body_len) = source.get(body_start..).and_then(|rest| rest.find(closer))
                else {
                    break;
                };
                let close = body_start + body_len + closer.len();
                let body = source.get(body_start..body_start + body_len).unwrap_or_default();
                if let Some(sentinel) = self.classify(body, name) {
                    found.push(Found {
                        sentinel,
                        open,
                        close,
                    });
                }
                cursor = close;
            }
        }
        found.sort_by_key(|marker| marker.open);
        found
    }
}

impl UpdateStrategy for MarkerAwareStrategy {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn can_handle(&self, request: &UpdateRequest) -> bool {
        matches!(request.locator(), Locator::Marker { .. })
    }

    fn priority(&self) -> i32 {
        40
    }

    fn apply(&self, original: &str, request: &UpdateRequest) -> Result<Applied, StrategyError> {
        let Locator::Marker { name, new_value } = request.locator() else {
            return Err(StrategyError::invalid("marker strategy needs a marker locator"));
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(StrategyError::invalid(format!(
                "marker name {name:?} must be a single non-empty token"
            )));
        }

        let markers = self.scan(original, name);
        let pick = |sentinel: Sentinel, token: &str| {
            let matching: Vec<&Found> = markers.iter().filter(|m| m.sentinel == sentinel).collect();
            let what = format!("`{token} {name}` marker");
            match matching.as_slice() {
                [] => Err(StrategyError::not_found(what)),
                [only] => Ok(**only),
                several => Err(StrategyError::ambiguous(what, several.len())),
            }
        };
        let start = pick(Sentinel::Start, &self.start_token)?;
        let end = pick(Sentinel::End, &self.end_token)?;
        if end.open < start.close {
            return Err(StrategyError::not_found(format!(
                "`{} {name}` marker after its start marker",
                self.end_token
            )));
        }

        let region = start.close..end.open;
        Ok(Applied {
            old_fragment: original.get(region.clone()).unwrap_or_default().to_owned(),
            content: splice(original, region, new_value),
        })
    }
}
